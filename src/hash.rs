use sha2::{Digest, Sha256};

use crate::constants::identity::CONTENT_URN_PREFIX;
use crate::types::ItemIdentity;

/// Derive the URN-form identity for item content.
///
/// Identical content always maps to the same identity, so the same item
/// mirrored across timelines collapses to one result entry.
pub(crate) fn content_identity(content: &str) -> ItemIdentity {
    let digest = Sha256::digest(content.as_bytes());
    format!("{CONTENT_URN_PREFIX}{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_identity_is_deterministic() {
        let a = content_identity("hello world");
        let b = content_identity("hello world");
        assert_eq!(a, b);
        assert!(a.starts_with(CONTENT_URN_PREFIX));
        // sha-256 renders to 64 hex characters
        assert_eq!(a.len(), CONTENT_URN_PREFIX.len() + 64);
    }

    #[test]
    fn content_identity_separates_distinct_content() {
        assert_ne!(content_identity("alpha"), content_identity("beta"));
    }
}
