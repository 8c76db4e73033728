use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 of `value` as lowercase hex.
///
/// Deterministic: used for license keys and hardware IDs so they can be
/// looked up by equality. Never use this for passwords.
pub fn hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Compares a raw value against a stored digest in constant time.
pub fn matches(value: &str, digest: &str) -> bool {
    let candidate = hash(value);
    candidate.as_bytes().ct_eq(digest.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic_and_fixed_length() {
        assert_eq!(hash("hw-1"), hash("hw-1"));
        assert_ne!(hash("hw-1"), hash("hw-2"));
        assert_eq!(hash("").len(), 64);
        assert_eq!(hash(&"k".repeat(10_000)).len(), 64);
    }

    #[test]
    fn hash_matches_known_vector() {
        assert_eq!(
            hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn matches_compares_against_digest() {
        let stored = hash("board-123-disk-456");
        assert!(matches("board-123-disk-456", &stored));
        assert!(!matches("board-123-disk-457", &stored));
        assert!(!matches("board-123-disk-456", ""));
    }
}
