//! System-prompt fingerprinting (§4.5): lowercase hex SHA-256 of the
//! canonical system prompt text.

use sha2::{Digest, Sha256};

/// The canonical system prompt for a request is the concatenation of all
/// Anthropic system blocks in order. Its fingerprint is the lowercase hex
/// SHA-256 of that concatenation.
pub fn fingerprint(system_blocks: &[impl AsRef<str>]) -> String {
    let canonical: String = system_blocks.iter().map(|b| b.as_ref()).collect();
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: the same system prompt always fingerprints the same, and distinct
    /// prompts fingerprint differently (§8: "warming a node twice ... produces the same
    /// fingerprint").
    #[test]
    fn fingerprint_is_deterministic_and_distinguishes_content() {
        let a = fingerprint(&["You are a helpful assistant."]);
        let b = fingerprint(&["You are a helpful assistant."]);
        let c = fingerprint(&["You are a pirate."]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit() && !ch.is_ascii_uppercase()));
    }

    /// **Scenario**: multiple system blocks are concatenated in order before hashing, so
    /// block boundaries matter.
    #[test]
    fn concatenates_blocks_in_order() {
        let joined = fingerprint(&["ab", "cd"]);
        let single = fingerprint(&["abcd"]);
        let reordered = fingerprint(&["cd", "ab"]);
        assert_eq!(joined, single);
        assert_ne!(joined, reordered);
    }
}
