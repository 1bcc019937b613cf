/// Opaque timeline identifier (URI-like, owned externally).
/// Examples: `https://feeds.example.net/alice`, `mem://fixture_a`
pub type TimelineUri = String;
/// Deterministic dedup and retraction key derived from an item.
/// Examples: `https://example.net/posts/42`, `urn:sha256:9f86d08188...`
pub type ItemIdentity = String;
/// Opaque chunk-lookup token interpreted only by the resolver that issued it.
/// Example: `28839`
pub type CursorToken = String;
/// Position of a chunk on a timeline's time axis: `floor(unix_seconds / chunk_size)`.
/// Example: `28839`
pub type ChunkId = i64;
