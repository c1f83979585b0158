use sha2::{Digest, Sha256};

/// Unsalted SHA-256 of the password, lowercase hex (64 chars).
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// True iff `hash_password(candidate)` equals `stored_hash`.
pub fn verify_password(stored_hash: &str, candidate: &str) -> bool {
    let computed = hash_password(candidate);
    let a = computed.as_bytes();
    let b = stored_hash.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    // Fold over every byte so the comparison time does not depend on the
    // position of the first mismatch.
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
