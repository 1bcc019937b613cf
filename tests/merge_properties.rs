use std::sync::Arc;

use chrono::{DateTime, Utc};

use timelines::{InMemoryResolver, MergeClient, TimelineItem};

fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn linked(secs: i64, href: &str) -> TimelineItem {
    TimelineItem::linked(ts(secs), href)
}

fn client(resolver: InMemoryResolver) -> MergeClient {
    MergeClient::new(Arc::new(resolver))
}

fn uris(list: &[&str]) -> Vec<String> {
    list.iter().map(|uri| uri.to_string()).collect()
}

#[test]
fn interleaves_two_timelines_newest_first() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        1000,
        vec![
            linked(100, "a/100"),
            linked(90, "a/90"),
            linked(80, "a/80"),
        ],
    );
    resolver.add_timeline("mem://b", 1000, vec![linked(95, "b/95"), linked(85, "b/85")]);

    let items = client(resolver)
        .query_descending(&uris(&["mem://a", "mem://b"]), ts(1000), 3)
        .unwrap();

    let hrefs: Vec<&str> = items.iter().map(|item| item.href.as_str()).collect();
    assert_eq!(hrefs, vec!["a/100", "b/95", "a/90"]);
}

#[test]
fn timestamps_never_increase_and_limit_is_respected() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        50,
        (0..20).map(|i| linked(40 + i * 13, &format!("a/{i}"))).collect(),
    );
    resolver.add_timeline(
        "mem://b",
        70,
        (0..20).map(|i| linked(45 + i * 11, &format!("b/{i}"))).collect(),
    );

    let items = client(resolver)
        .query_descending(&uris(&["mem://a", "mem://b"]), ts(100_000), 12)
        .unwrap();

    assert_eq!(items.len(), 12);
    for pair in items.windows(2) {
        assert!(pair[0].timestamp >= pair[1].timestamp);
    }
}

#[test]
fn duplicate_href_across_timelines_emits_once() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        1000,
        vec![linked(100, "shared/post"), linked(90, "a/90")],
    );
    resolver.add_timeline(
        "mem://b",
        1000,
        vec![linked(95, "shared/post"), linked(85, "b/85")],
    );

    let (items, stats) = client(resolver)
        .query_descending_with_stats(&uris(&["mem://a", "mem://b"]), ts(1000), 10)
        .unwrap();

    let shared: Vec<&TimelineItem> = items
        .iter()
        .filter(|item| item.href == "shared/post")
        .collect();
    assert_eq!(shared.len(), 1);
    // the newer instance wins; the mirrored copy is rejected, not reordered
    assert_eq!(shared[0].timestamp, ts(100));
    assert_eq!(stats.duplicate_rejects, 1);
    assert_eq!(items.len(), 3);
}

#[test]
fn identical_content_collapses_to_one_identity() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        1000,
        vec![TimelineItem::text(ts(100), "the same words")],
    );
    resolver.add_timeline(
        "mem://b",
        1000,
        vec![TimelineItem::text(ts(95), "the same words")],
    );

    let items = client(resolver)
        .query_descending(&uris(&["mem://a", "mem://b"]), ts(1000), 10)
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].timestamp, ts(100));
}

#[test]
fn retracted_identity_is_excluded_from_any_timeline() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline("mem://a", 1000, vec![linked(100, "a/100")]);
    resolver.add_timeline(
        "mem://b",
        1000,
        vec![linked(95, "shared/retracted"), linked(85, "b/85")],
    );
    // retraction recorded on A, instance only reachable through B
    resolver.retract("mem://a", "shared/retracted");

    let (items, stats) = client(resolver)
        .query_descending_with_stats(&uris(&["mem://a", "mem://b"]), ts(1000), 10)
        .unwrap();

    assert!(items.iter().all(|item| item.href != "shared/retracted"));
    assert_eq!(stats.retraction_rejects, 1);
    assert_eq!(items.len(), 2);
}

#[test]
fn retraction_matches_derived_content_identity() {
    let retracted_identity = TimelineItem::text(ts(0), "withdrawn words").identity();

    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        1000,
        vec![linked(100, "a/100")],
    );
    // the same content resubmitted on another timeline derives the same
    // identity and stays excluded
    resolver.add_timeline(
        "mem://b",
        1000,
        vec![TimelineItem::text(ts(95), "withdrawn words")],
    );
    resolver.retract("mem://a", retracted_identity);

    let items = client(resolver)
        .query_descending(&uris(&["mem://a", "mem://b"]), ts(1000), 10)
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].href, "a/100");
}

#[test]
fn cutoff_before_all_items_yields_empty_result() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline("mem://a", 1000, vec![linked(50, "a/50")]);

    let items = client(resolver)
        .query_descending(&uris(&["mem://a"]), ts(40), 10)
        .unwrap();

    assert!(items.is_empty());
}

#[test]
fn item_exactly_at_cutoff_is_excluded() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        1000,
        vec![linked(50, "a/50"), linked(40, "a/40")],
    );

    // the cutoff is exclusive
    let items = client(resolver)
        .query_descending(&uris(&["mem://a"]), ts(50), 10)
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].href, "a/40");
}

#[test]
fn repeated_queries_return_identical_results() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        100,
        (0..15).map(|i| linked(30 + i * 17, &format!("a/{i}"))).collect(),
    );
    resolver.add_timeline(
        "mem://b",
        150,
        (0..15).map(|i| linked(35 + i * 19, &format!("b/{i}"))).collect(),
    );
    let merge = client(resolver);
    let query_uris = uris(&["mem://a", "mem://b"]);

    let first = merge.query_descending(&query_uris, ts(1000), 10).unwrap();
    let second = merge.query_descending(&query_uris, ts(1000), 10).unwrap();

    assert_eq!(first, second);
}

#[test]
fn equal_timestamps_order_by_timeline_uri() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline("mem://b", 1000, vec![linked(100, "b/100")]);
    resolver.add_timeline("mem://a", 1000, vec![linked(100, "a/100")]);
    resolver.add_timeline("mem://c", 1000, vec![linked(100, "c/100")]);

    let items = client(resolver)
        .query_descending(&uris(&["mem://b", "mem://a", "mem://c"]), ts(1000), 10)
        .unwrap();

    let hrefs: Vec<&str> = items.iter().map(|item| item.href.as_str()).collect();
    assert_eq!(hrefs, vec!["a/100", "b/100", "c/100"]);
}

#[test]
fn stats_track_per_timeline_contributions() {
    let mut resolver = InMemoryResolver::new();
    resolver.add_timeline(
        "mem://a",
        1000,
        vec![linked(100, "a/100"), linked(90, "a/90")],
    );
    resolver.add_timeline("mem://b", 1000, vec![linked(95, "b/95")]);

    let (items, stats) = client(resolver)
        .query_descending_with_stats(&uris(&["mem://a", "mem://b"]), ts(1000), 10)
        .unwrap();

    assert_eq!(stats.emitted, items.len());
    assert_eq!(stats.per_timeline["mem://a"], 2);
    assert_eq!(stats.per_timeline["mem://b"], 1);

    let shares = stats.timeline_shares();
    assert_eq!(shares[0].timeline, "mem://a");
    assert_eq!(shares[0].count, 2);
    assert!((shares[0].share - 2.0 / 3.0).abs() < 1e-6);
    assert!((shares[1].share - 1.0 / 3.0).abs() < 1e-6);
}
