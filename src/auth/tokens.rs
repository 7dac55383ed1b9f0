//! Random token generation and hashing for verification, reset, phone OTP,
//! and session flows.
//!
//! Raw tokens are only ever handed to the user (email link, SMS, cookie); the
//! store keeps a SHA-256 hash so a database read never yields a usable token.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::Duration;
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Verification links are valid for 24 hours.
#[must_use]
pub fn verification_token_ttl() -> Duration {
    Duration::hours(24)
}

/// Password-reset links are valid for one hour.
#[must_use]
pub fn reset_token_ttl() -> Duration {
    Duration::hours(1)
}

/// Phone OTP codes are valid for ten minutes.
#[must_use]
pub fn phone_code_ttl() -> Duration {
    Duration::minutes(10)
}

/// 32 random bytes, URL-safe base64. Used for email-verification and
/// password-reset links.
pub fn generate_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate token")?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Random session token for the auth cookie; same entropy as link tokens.
pub fn generate_session_token() -> Result<String> {
    generate_token()
}

/// Hash a token so raw values never touch the store.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// 6 decimal digits for phone verification.
#[must_use]
pub fn generate_phone_code() -> String {
    let code: u32 = OsRng.gen_range(0..1_000_000);
    format!("{code:06}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    #[test]
    fn generate_token_has_32_bytes_of_entropy() {
        let decoded_len = generate_token()
            .ok()
            .and_then(|token| URL_SAFE_NO_PAD.decode(token.as_bytes()).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(32));
    }

    #[test]
    fn hash_token_stable_and_distinct() {
        let first = hash_token("token");
        let second = hash_token("token");
        let other = hash_token("other");
        assert_eq!(first, second);
        assert_ne!(first, other);
        assert_eq!(first.len(), 32);
    }

    #[test]
    fn phone_code_is_six_digits() {
        for _ in 0..32 {
            let code = generate_phone_code();
            assert_eq!(code.len(), 6);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
