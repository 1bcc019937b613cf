#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Cooperative cancellation and deadline handling for queries.
pub mod cancel;
/// Centralized constants used across the merge loop and resolvers.
pub mod constants;
/// Manifest, chunk, and item data model shared with resolvers.
pub mod data;
mod hash;
/// Merge client and the descending k-way merge loop.
pub mod merge;
/// Resolver collaborator trait and built-in resolvers.
pub mod resolver;
/// Shared type aliases.
pub mod types;

mod errors;

pub use cancel::CancelToken;
pub use data::{ChunkBody, Endpoint, Manifest, TimelineItem};
pub use errors::QueryError;
pub use merge::{MergeClient, QueryStats, TimelineShare};
#[cfg(feature = "http")]
pub use resolver::HttpResolver;
pub use resolver::{InMemoryResolver, Resolver};
pub use types::{ChunkId, CursorToken, ItemIdentity, TimelineUri};
