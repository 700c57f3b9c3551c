//! Prompt helpers for fingerprinting instruction versions in logs.

use sha2::{Digest, Sha256};

/// Compute a stable SHA-256 fingerprint for a prompt string.
pub fn hash_prompt(prompt: &str) -> String {
    let digest = Sha256::digest(prompt.as_bytes());
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// First 12 hex characters of [`hash_prompt`], for log lines.
pub fn short_fingerprint(prompt: &str) -> String {
    let mut hash = hash_prompt(prompt);
    hash.truncate(12);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_prompt_stable() {
        let first = hash_prompt("billing persona");
        let second = hash_prompt("billing persona");
        let different = hash_prompt("leak persona");

        assert_eq!(first, second);
        assert_ne!(first, different);
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn test_short_fingerprint_is_prefix() {
        let full = hash_prompt("x");
        assert_eq!(short_fingerprint("x"), full[..12]);
    }
}
