use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// 32 random bytes, hex-encoded. Only the caller ever sees this value.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 hex digest; the form in which tokens are stored.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
