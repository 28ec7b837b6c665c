use sha3::{Digest, Keccak256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Pseudorandom `0x`-prefixed keccak256 id for history records.
pub fn generate_record_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let mut hasher = Keccak256::new();
    hasher.update(timestamp.to_string().as_bytes());
    // two saves in the same nanosecond must still differ
    hasher.update(uuid::Uuid::new_v4().as_bytes());

    let hash_result = hasher.finalize();
    let hash_hex = hex::encode(hash_result);

    format!("0x{}", hash_hex)
}

#[cfg(test)]
mod tests {
    use super::generate_record_id;

    #[test]
    fn test_record_ids_are_unique_hex() {
        let a = generate_record_id();
        let b = generate_record_id();

        assert_ne!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
        assert!(a[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
