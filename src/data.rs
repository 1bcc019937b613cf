use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hash::content_identity;

pub use crate::types::{ChunkId, ItemIdentity, TimelineUri};

/// Access endpoint templates published in a manifest.
///
/// Both fields are URL templates interpreted by a resolver; the merge core
/// treats them as opaque.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Endpoint {
    /// Cursor lookup endpoint for this traversal direction.
    pub iterator: String,
    /// Chunk body endpoint for this traversal direction.
    pub body: String,
}

/// Per-timeline chunking metadata served at the timeline URI.
///
/// Invariant: `chunk_size > 0` seconds. Resolvers validate this before
/// handing a manifest to the merge core.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version advertised by the host.
    #[serde(default)]
    pub version: String,
    /// Chunk duration in seconds.
    pub chunk_size: i64,
    /// Oldest chunk id the timeline retains.
    pub first_chunk: ChunkId,
    /// Newest chunk id the timeline has published.
    pub last_chunk: ChunkId,
    /// Oldest-first access endpoints, when the host offers them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ascending: Option<Endpoint>,
    /// Newest-first access endpoints used by descending queries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<Endpoint>,
    /// Free-form host metadata carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Manifest {
    /// Chunk id covering instant `t`: `floor(unix_seconds(t) / chunk_size)`.
    ///
    /// Monotonically non-increasing as `t` decreases.
    pub fn chunk_at(&self, t: DateTime<Utc>) -> ChunkId {
        t.timestamp().div_euclid(self.chunk_size)
    }

    /// Start instant of chunk `chunk`: `chunk * chunk_size` as an absolute time.
    pub fn chunk_start(&self, chunk: ChunkId) -> DateTime<Utc> {
        DateTime::from_timestamp(chunk.saturating_mul(self.chunk_size), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// One timeline's bounded batch of items for a single time window.
///
/// Items are sorted by timestamp in strictly descending order and the body is
/// immutable for the duration of one query.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkBody {
    /// Timeline this chunk belongs to.
    pub uri: TimelineUri,
    /// Position of this chunk on the timeline's time axis.
    pub chunk_id: ChunkId,
    /// Items in the chunk, newest first.
    #[serde(default)]
    pub items: Vec<TimelineItem>,
}

/// A single published item within a chunk.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineItem {
    /// Publication instant used for ordering and chunk placement.
    pub timestamp: DateTime<Utc>,
    /// Inline item payload; may be empty for link-only items.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// MIME type of `content`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    /// Canonical reference for the item; preferred identity when present.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub href: String,
}

impl TimelineItem {
    /// Build a link-only item identified by `href`.
    pub fn linked(timestamp: DateTime<Utc>, href: impl Into<String>) -> Self {
        Self {
            timestamp,
            content: String::new(),
            content_type: String::new(),
            href: href.into(),
        }
    }

    /// Build an inline text item identified by its content hash.
    pub fn text(timestamp: DateTime<Utc>, content: impl Into<String>) -> Self {
        Self {
            timestamp,
            content: content.into(),
            content_type: "text/plain".to_string(),
            href: String::new(),
        }
    }

    /// Deduplication and retraction-matching key for this item.
    ///
    /// `href` wins when non-empty; otherwise the identity is a deterministic
    /// content hash in `urn:sha256:<hex>` form, so identical content across
    /// timelines collapses to one identity.
    pub fn identity(&self) -> ItemIdentity {
        if !self.href.is_empty() {
            return self.href.clone();
        }
        content_identity(&self.content)
    }
}
