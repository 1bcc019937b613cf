//! Descending k-way merge across chunked timelines.
//!
//! Ownership model:
//! - `MergeClient` holds only the resolver; all merge state (heap, seen
//!   identities, loaded-chunk map, stats) is owned by one query invocation
//!   and dropped when it returns. Nothing is cached across queries.
//! - Chunks are fetched lazily: a timeline's next-older chunk is requested
//!   only once its current chunk runs out of candidates and the merge still
//!   needs output, which bounds network cost to the chunks the limit needs.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::constants::merge::MERGE_ITERATION_CEILING;
use crate::data::{ChunkBody, Manifest, TimelineItem};
use crate::errors::QueryError;
use crate::resolver::Resolver;
use crate::types::{ItemIdentity, TimelineUri};

/// A timeline's current entry in the merge heap.
struct Candidate {
    timeline: TimelineUri,
    item: TimelineItem,
    /// Position of `item` within the timeline's currently loaded chunk.
    index: usize,
    identity: ItemIdentity,
}

impl Candidate {
    fn new(timeline: TimelineUri, item: TimelineItem, index: usize) -> Self {
        let identity = item.identity();
        Self {
            timeline,
            item,
            index,
            identity,
        }
    }
}

// Max-heap order: latest timestamp first. Equal timestamps break ties by
// ascending timeline URI, then ascending identity, so results are
// reproducible regardless of heap internals.
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.item
            .timestamp
            .cmp(&other.item.timestamp)
            .then_with(|| other.timeline.cmp(&self.timeline))
            .then_with(|| other.identity.cmp(&self.identity))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Counters accumulated while one query drains the merge heap.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryStats {
    /// Candidates popped from the heap.
    pub considered: usize,
    /// Items appended to the result.
    pub emitted: usize,
    /// Candidates rejected because their identity was already emitted.
    pub duplicate_rejects: usize,
    /// Candidates rejected by a retraction set.
    pub retraction_rejects: usize,
    /// Chunks fetched by boundary crawls after the initial batched load.
    pub chunks_crawled: usize,
    /// Timelines that ran out of chunks, or failed a crawl, mid-merge.
    pub exhausted_timelines: usize,
    /// Emitted item counts keyed by source timeline.
    pub per_timeline: HashMap<TimelineUri, usize>,
}

/// One timeline's share of a query's emitted items.
#[derive(Clone, Debug, PartialEq)]
pub struct TimelineShare {
    /// Timeline the count belongs to.
    pub timeline: TimelineUri,
    /// Items the timeline contributed.
    pub count: usize,
    /// Fraction of all emitted items.
    pub share: f64,
}

impl QueryStats {
    /// Candidates suppressed by the dedup and retraction filters combined.
    pub fn rejected(&self) -> usize {
        self.duplicate_rejects + self.retraction_rejects
    }

    /// Per-timeline emission shares, largest contributors first.
    ///
    /// Read together with `chunks_crawled` this shows what a result cost to
    /// assemble: which timelines dominated the output and how many boundary
    /// fetches the merge spent getting there. Empty when nothing was emitted.
    pub fn timeline_shares(&self) -> Vec<TimelineShare> {
        if self.emitted == 0 {
            return Vec::new();
        }
        let mut shares: Vec<TimelineShare> = self
            .per_timeline
            .iter()
            .map(|(timeline, count)| TimelineShare {
                timeline: timeline.clone(),
                count: *count,
                share: *count as f64 / self.emitted as f64,
            })
            .collect();
        shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.timeline.cmp(&b.timeline)));
        shares
    }
}

/// Client that merges chunked timelines through a [`Resolver`].
///
/// Queries do not share mutable state; one client may serve any number of
/// sequential or concurrent queries.
pub struct MergeClient {
    resolver: Arc<dyn Resolver>,
}

impl MergeClient {
    /// Create a client on top of a resolver.
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self { resolver }
    }

    /// Return up to `limit` items across `timelines` with timestamps strictly
    /// before `until`, globally ordered newest first.
    ///
    /// Fails only when a batched resolver stage fails outright or the query
    /// is cancelled; a timeline whose mid-merge crawl fails simply stops
    /// contributing while the others continue.
    pub fn query_descending(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TimelineItem>, QueryError> {
        let (items, _) = self.run_query(timelines, until, limit, &CancelToken::new())?;
        Ok(items)
    }

    /// Like [`MergeClient::query_descending`], also reporting merge counters.
    pub fn query_descending_with_stats(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
        limit: usize,
    ) -> Result<(Vec<TimelineItem>, QueryStats), QueryError> {
        self.run_query(timelines, until, limit, &CancelToken::new())
    }

    /// Like [`MergeClient::query_descending_with_stats`], observing `cancel`
    /// between resolver calls and merge iterations.
    pub fn query_descending_cancellable(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<(Vec<TimelineItem>, QueryStats), QueryError> {
        self.run_query(timelines, until, limit, cancel)
    }

    fn run_query(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
        limit: usize,
        cancel: &CancelToken,
    ) -> Result<(Vec<TimelineItem>, QueryStats), QueryError> {
        cancel.ensure_active()?;
        let manifests = self.resolver.resolve_timelines(timelines)?;
        cancel.ensure_active()?;
        let removed = self.resolver.removed_items(timelines)?;
        // Retraction is identity-based, not instance-based: an identity
        // retracted on any queried timeline is excluded wherever it surfaces.
        let retracted: HashSet<ItemIdentity> = removed.into_values().flatten().collect();
        let mut chunks = self.load_chunks(timelines, until, cancel)?;

        let mut heap = BinaryHeap::new();
        for (timeline, chunk) in &chunks {
            if let Some(candidate) = seed_candidate(timeline, chunk, until) {
                heap.push(candidate);
            }
        }

        let mut result = Vec::new();
        let mut seen: HashSet<ItemIdentity> = HashSet::new();
        let mut stats = QueryStats::default();
        let mut iterations = 0usize;

        while result.len() < limit && !heap.is_empty() && iterations < MERGE_ITERATION_CEILING {
            iterations += 1;
            cancel.ensure_active()?;
            let Some(candidate) = heap.pop() else {
                break;
            };
            stats.considered += 1;

            if seen.contains(&candidate.identity) {
                stats.duplicate_rejects += 1;
            } else if retracted.contains(&candidate.identity) {
                stats.retraction_rejects += 1;
            } else {
                seen.insert(candidate.identity.clone());
                stats.emitted += 1;
                *stats
                    .per_timeline
                    .entry(candidate.timeline.clone())
                    .or_insert(0) += 1;
                result.push(candidate.item.clone());
            }

            // Advance the timeline's cursor whether or not the item was
            // emitted; rejection must never stall progress through a chunk.
            let next_index = candidate.index + 1;
            let in_chunk = chunks
                .get(&candidate.timeline)
                .and_then(|chunk| chunk.items.get(next_index))
                .cloned();
            if let Some(item) = in_chunk {
                heap.push(Candidate::new(candidate.timeline, item, next_index));
            } else if let Some(next) =
                self.crawl_previous(&manifests, &mut chunks, &candidate, cancel, &mut stats)?
            {
                heap.push(next);
            }
        }

        if iterations >= MERGE_ITERATION_CEILING && result.len() < limit && !heap.is_empty() {
            debug!(
                emitted = result.len(),
                limit, "iteration ceiling reached, result truncated"
            );
        }

        Ok((result, stats))
    }

    /// Look up and load the chunk covering `until` for each timeline.
    fn load_chunks(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<IndexMap<TimelineUri, ChunkBody>, QueryError> {
        cancel.ensure_active()?;
        let cursors = self.resolver.lookup_chunk_cursors(timelines, until)?;
        cancel.ensure_active()?;
        self.resolver.load_chunk_bodies(&cursors)
    }

    /// Fetch the chunk preceding `candidate`'s and seed its first item.
    ///
    /// `Ok(None)` marks the timeline exhausted for this query: no older chunk
    /// remains, the fetched chunk was empty, or the fetch failed. Resolver
    /// failures here are absorbed so one flaky timeline cannot abort the
    /// whole merge; only cancellation propagates.
    fn crawl_previous(
        &self,
        manifests: &IndexMap<TimelineUri, Manifest>,
        chunks: &mut IndexMap<TimelineUri, ChunkBody>,
        candidate: &Candidate,
        cancel: &CancelToken,
        stats: &mut QueryStats,
    ) -> Result<Option<Candidate>, QueryError> {
        cancel.ensure_active()?;
        let Some(manifest) = manifests.get(&candidate.timeline) else {
            warn!(timeline = %candidate.timeline, "no manifest for loaded timeline, exhausting");
            stats.exhausted_timelines += 1;
            return Ok(None);
        };

        let mut previous = manifest.chunk_at(candidate.item.timestamp);
        if chunks
            .get(&candidate.timeline)
            .is_some_and(|chunk| chunk.chunk_id == previous)
        {
            // The boundary item's timestamp still maps into the loaded chunk;
            // force progress toward strictly older chunks.
            previous -= 1;
        }
        if previous < manifest.first_chunk {
            debug!(timeline = %candidate.timeline, "no chunks precede the loaded one");
            stats.exhausted_timelines += 1;
            return Ok(None);
        }

        let scope = [candidate.timeline.clone()];
        let mut fetched = match self.load_chunks(&scope, manifest.chunk_start(previous), cancel) {
            Ok(fetched) => fetched,
            Err(QueryError::Cancelled) => return Err(QueryError::Cancelled),
            Err(err) => {
                warn!(timeline = %candidate.timeline, error = %err, "crawl failed, exhausting timeline");
                stats.exhausted_timelines += 1;
                return Ok(None);
            }
        };
        let Some(chunk) = fetched.swap_remove(&candidate.timeline) else {
            stats.exhausted_timelines += 1;
            return Ok(None);
        };
        if chunk.items.is_empty() {
            stats.exhausted_timelines += 1;
            return Ok(None);
        }

        stats.chunks_crawled += 1;
        debug!(timeline = %candidate.timeline, chunk_id = chunk.chunk_id, items = chunk.items.len(), "crawled previous chunk");
        let first = chunk.items[0].clone();
        chunks.insert(candidate.timeline.clone(), chunk);
        Ok(Some(Candidate::new(candidate.timeline.clone(), first, 0)))
    }
}

/// Locate the first item in `chunk` older than `until` and build its
/// candidate, if any.
///
/// Items are sorted newest first, so this is a binary search over the
/// monotonic predicate `timestamp >= until`. An empty chunk, or one whose
/// items are all at or past the cutoff, seeds nothing.
fn seed_candidate(timeline: &TimelineUri, chunk: &ChunkBody, until: DateTime<Utc>) -> Option<Candidate> {
    let index = chunk
        .items
        .partition_point(|item| item.timestamp >= until);
    let item = chunk.items.get(index)?;
    Some(Candidate::new(timeline.clone(), item.clone(), index))
}
