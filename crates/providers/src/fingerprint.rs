//! Credential fingerprinting for the engine registry's cache key (spec §4.F).

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// SHA-256 over the credential fields in sorted key order, so two
/// differently-ordered maps of the same secrets collide on purpose while
/// distinct secrets never do.
pub fn fingerprint(fields: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in fields {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

/// The fingerprint used when an adapter needs no credentials at all.
pub fn anonymous_fingerprint() -> String {
    "anonymous".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_fields_same_fingerprint_regardless_of_insertion_order() {
        let mut a = BTreeMap::new();
        a.insert("key".to_string(), "abc".to_string());
        a.insert("region".to_string(), "eu".to_string());

        let mut b = BTreeMap::new();
        b.insert("region".to_string(), "eu".to_string());
        b.insert("key".to_string(), "abc".to_string());

        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn distinct_secrets_do_not_collide() {
        let mut a = BTreeMap::new();
        a.insert("key".to_string(), "abc".to_string());
        let mut b = BTreeMap::new();
        b.insert("key".to_string(), "xyz".to_string());
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }
}
