//! Password reset token generation and hashing.
//!
//! The caller-facing token is random and leaves the process exactly once,
//! inside the reset URL; only its SHA-256 digest is ever persisted.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const RESET_TOKEN_BYTES: usize = 32;
const RESET_TOKEN_TTL_HOURS: i64 = 1;

/// Generates a fresh caller-facing reset token (hex-encoded random bytes).
pub fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hex digest under which a reset token is persisted and looked up.
pub fn hash_reset_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Absolute expiry for a reset token issued at `now`.
pub fn reset_token_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(RESET_TOKEN_TTL_HOURS)
}

/// Builds the caller-facing reset URL embedding the unhashed token.
pub fn reset_url(frontend_base_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password/{}",
        frontend_base_url.trim_end_matches('/'),
        token
    )
}
