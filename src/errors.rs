use thiserror::Error;

use crate::types::TimelineUri;

/// Error type for query-fatal resolver, configuration, and cancellation failures.
///
/// Per-timeline crawl failures mid-merge are not represented here; those only
/// exhaust the affected timeline's contribution to the result.
#[derive(Debug, Error)]
pub enum QueryError {
    /// A resolver could not serve a timeline during a batched query stage.
    #[error("timeline '{timeline}' is unavailable: {reason}")]
    TimelineUnavailable {
        /// Timeline the resolver failed on.
        timeline: TimelineUri,
        /// Resolver-supplied failure description.
        reason: String,
    },
    /// A resolver returned a malformed manifest or chunk payload.
    #[error("timeline '{timeline}' returned inconsistent data: {details}")]
    TimelineInconsistent {
        /// Timeline whose payload was malformed.
        timeline: TimelineUri,
        /// What was wrong with the payload.
        details: String,
    },
    /// A batched resolver call failed without a specific timeline attribution.
    #[error("resolver failure: {0}")]
    Resolver(String),
    /// The query's cancellation token fired or its deadline passed.
    #[error("query cancelled")]
    Cancelled,
    /// Invalid client construction or resolver misuse.
    #[error("configuration error: {0}")]
    Configuration(String),
}
