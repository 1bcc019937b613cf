//! Resolver interfaces backing the merge client.
//!
//! Ownership model:
//! - `Resolver` is the merge-facing collaborator contract: manifests,
//!   retraction sets, chunk cursor lookup, and chunk body loading, each
//!   batched across timelines.
//! - `InMemoryResolver` serves tests and small local datasets.
//! - `HttpResolver` (feature `http`) talks to real timeline hosts.
//!
//! Cursor tokens are opaque to the merge core: a resolver may encode anything
//! that lets it find the chunk again, which keeps lookup decoupled from load
//! and leaves room for resolver-side caching.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::data::{ChunkBody, Manifest, TimelineItem};
use crate::errors::QueryError;
use crate::types::{ChunkId, CursorToken, ItemIdentity, TimelineUri};

#[cfg(feature = "http")]
mod http;
#[cfg(feature = "http")]
pub use http::HttpResolver;

/// Merge-facing collaborator contract, keyed by timeline URI throughout.
///
/// For a fixed backing dataset, every operation should be deterministic;
/// result maps preserve request order so queries stay reproducible.
pub trait Resolver: Send + Sync {
    /// Resolve manifests for every requested timeline.
    ///
    /// Must fail when any requested timeline cannot be resolved; a partial
    /// manifest set is not an accepted outcome.
    fn resolve_timelines(
        &self,
        timelines: &[TimelineUri],
    ) -> Result<IndexMap<TimelineUri, Manifest>, QueryError>;

    /// Retraction sets per timeline. An absent entry means an empty set.
    fn removed_items(
        &self,
        timelines: &[TimelineUri],
    ) -> Result<HashMap<TimelineUri, HashSet<ItemIdentity>>, QueryError>;

    /// Opaque tokens identifying the chunk covering `until`, per timeline.
    ///
    /// An absent entry means no chunk on that timeline covers the instant.
    fn lookup_chunk_cursors(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
    ) -> Result<IndexMap<TimelineUri, CursorToken>, QueryError>;

    /// Resolve previously issued cursor tokens to chunk bodies.
    ///
    /// An absent entry means the chunk is gone (for example expired between
    /// lookup and load).
    fn load_chunk_bodies(
        &self,
        cursors: &IndexMap<TimelineUri, CursorToken>,
    ) -> Result<IndexMap<TimelineUri, ChunkBody>, QueryError>;
}

/// One timeline's backing state inside `InMemoryResolver`.
struct TimelineFixture {
    manifest: Manifest,
    chunks: BTreeMap<ChunkId, Vec<TimelineItem>>,
    removed: HashSet<ItemIdentity>,
}

/// In-memory resolver for tests and small datasets.
///
/// Populate it before wrapping in an `Arc`; the `Resolver` methods only read.
/// Cursor lookup picks the nearest stored chunk at or below the computed
/// chunk id, the way a host-side index would skip windows it never published.
#[derive(Default)]
pub struct InMemoryResolver {
    timelines: HashMap<TimelineUri, TimelineFixture>,
}

impl InMemoryResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a timeline and distribute `items` into chunks by timestamp.
    ///
    /// Items within each chunk are ordered newest first. Calling this again
    /// for the same URI adds to the existing timeline.
    ///
    /// # Panics
    ///
    /// Panics when `chunk_size` is not positive. Validating manifests is the
    /// resolver's job; the merge core assumes every chunk size it sees is
    /// usable for chunk arithmetic.
    pub fn add_timeline(
        &mut self,
        uri: impl Into<TimelineUri>,
        chunk_size: i64,
        items: Vec<TimelineItem>,
    ) {
        assert!(chunk_size > 0, "chunk_size must be positive, got {chunk_size}");
        let uri = uri.into();
        let fixture = self.fixture_mut(uri, chunk_size);
        for item in items {
            let chunk = item.timestamp.timestamp().div_euclid(chunk_size);
            fixture.chunks.entry(chunk).or_default().push(item);
        }
        for chunk in fixture.chunks.values_mut() {
            chunk.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        }
        Self::sync_bounds(fixture);
    }

    /// Place a chunk at an explicit id, overriding timestamp-based placement.
    ///
    /// Useful for shaping gaps and deliberately empty chunks in fixtures.
    ///
    /// # Panics
    ///
    /// Panics when `chunk_size` is not positive, like
    /// [`InMemoryResolver::add_timeline`].
    pub fn insert_chunk(
        &mut self,
        uri: impl Into<TimelineUri>,
        chunk_size: i64,
        chunk_id: ChunkId,
        mut items: Vec<TimelineItem>,
    ) {
        assert!(chunk_size > 0, "chunk_size must be positive, got {chunk_size}");
        let fixture = self.fixture_mut(uri.into(), chunk_size);
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        fixture.chunks.insert(chunk_id, items);
        Self::sync_bounds(fixture);
    }

    /// Record `identity` in a timeline's retraction set.
    ///
    /// The timeline must already exist via `add_timeline` or `insert_chunk`.
    pub fn retract(&mut self, uri: &str, identity: impl Into<ItemIdentity>) {
        if let Some(fixture) = self.timelines.get_mut(uri) {
            fixture.removed.insert(identity.into());
        }
    }

    fn fixture_mut(&mut self, uri: TimelineUri, chunk_size: i64) -> &mut TimelineFixture {
        self.timelines
            .entry(uri)
            .or_insert_with(|| TimelineFixture {
                manifest: Manifest {
                    version: "1".to_string(),
                    chunk_size,
                    first_chunk: 0,
                    last_chunk: 0,
                    ascending: None,
                    descending: None,
                    metadata: None,
                },
                chunks: BTreeMap::new(),
                removed: HashSet::new(),
            })
    }

    fn sync_bounds(fixture: &mut TimelineFixture) {
        if let (Some(first), Some(last)) = (
            fixture.chunks.keys().next().copied(),
            fixture.chunks.keys().next_back().copied(),
        ) {
            fixture.manifest.first_chunk = first;
            fixture.manifest.last_chunk = last;
        }
    }

    fn fixture(&self, uri: &str) -> Result<&TimelineFixture, QueryError> {
        self.timelines
            .get(uri)
            .ok_or_else(|| QueryError::TimelineUnavailable {
                timeline: uri.to_string(),
                reason: "unknown timeline".to_string(),
            })
    }
}

impl Resolver for InMemoryResolver {
    fn resolve_timelines(
        &self,
        timelines: &[TimelineUri],
    ) -> Result<IndexMap<TimelineUri, Manifest>, QueryError> {
        let mut manifests = IndexMap::new();
        for uri in timelines {
            manifests.insert(uri.clone(), self.fixture(uri)?.manifest.clone());
        }
        Ok(manifests)
    }

    fn removed_items(
        &self,
        timelines: &[TimelineUri],
    ) -> Result<HashMap<TimelineUri, HashSet<ItemIdentity>>, QueryError> {
        let mut removed = HashMap::new();
        for uri in timelines {
            let fixture = self.fixture(uri)?;
            if !fixture.removed.is_empty() {
                removed.insert(uri.clone(), fixture.removed.clone());
            }
        }
        Ok(removed)
    }

    fn lookup_chunk_cursors(
        &self,
        timelines: &[TimelineUri],
        until: DateTime<Utc>,
    ) -> Result<IndexMap<TimelineUri, CursorToken>, QueryError> {
        let mut cursors = IndexMap::new();
        for uri in timelines {
            let fixture = self.fixture(uri)?;
            let target = fixture
                .manifest
                .chunk_at(until)
                .min(fixture.manifest.last_chunk);
            if let Some((chunk_id, _)) = fixture.chunks.range(..=target).next_back() {
                cursors.insert(uri.clone(), chunk_id.to_string());
            }
        }
        Ok(cursors)
    }

    fn load_chunk_bodies(
        &self,
        cursors: &IndexMap<TimelineUri, CursorToken>,
    ) -> Result<IndexMap<TimelineUri, ChunkBody>, QueryError> {
        let mut bodies = IndexMap::new();
        for (uri, token) in cursors {
            let fixture = self.fixture(uri)?;
            let chunk_id: ChunkId =
                token
                    .parse()
                    .map_err(|_| QueryError::TimelineInconsistent {
                        timeline: uri.clone(),
                        details: format!("unparseable cursor token '{token}'"),
                    })?;
            if let Some(items) = fixture.chunks.get(&chunk_id) {
                bodies.insert(
                    uri.clone(),
                    ChunkBody {
                        uri: uri.clone(),
                        chunk_id,
                        items: items.clone(),
                    },
                );
            }
        }
        Ok(bodies)
    }
}
