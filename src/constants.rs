/// Constants used by the merge loop runtime behavior.
pub mod merge {
    /// Hard ceiling on merge loop iterations for one query.
    ///
    /// Guards against manifest or chunk-data anomalies that would otherwise
    /// crawl forever. Hitting the ceiling silently truncates the result
    /// rather than failing the query.
    pub const MERGE_ITERATION_CEILING: usize = 1000;
}

/// Constants used by item identity derivation.
pub mod identity {
    /// URN prefix for content-derived identities (`urn:sha256:<hex>`).
    pub const CONTENT_URN_PREFIX: &str = "urn:sha256:";
}

/// Constants used by the HTTP resolver wire conventions.
#[cfg(feature = "http")]
pub mod http {
    use std::time::Duration;

    /// Path suffix appended to a timeline URI for its retraction list.
    pub const REMOVED_SUFFIX: &str = "/removed";
    /// Query parameter carrying the cutoff instant for cursor lookups.
    pub const PARAM_UNTIL: &str = "until";
    /// Query parameter carrying the opaque cursor token for body loads.
    pub const PARAM_CURSOR: &str = "cursor";
    /// Per-request timeout applied to resolver HTTP calls.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}
