//! # Custodia (User Authentication & Account Security)
//!
//! `custodia` is a user authentication and account-management service:
//! credential and OAuth login, email/phone verification, TOTP two-factor
//! authentication, session issuance, device and login-history tracking, rate
//! limiting, and admin role/subscription management.
//!
//! ## Security model
//!
//! - **Lockout:** five failed credential checks lock an account for fifteen
//!   minutes. The counter is advanced through an atomic increment-and-check
//!   on the store, so racing requests cannot stretch the budget. Locked
//!   accounts are rejected before any password hash comparison.
//! - **Rate limiting:** fixed-window buckets (login, api, password-reset,
//!   totp-verify) keyed by caller identity, independent of the lockout state.
//! - **Two-factor:** TOTP (SHA-1, 6 digits, 30 s step, one step of skew) with
//!   Argon2id-hashed single-use backup codes. Disabling clears the secret and
//!   backup codes together with the flag.
//! - **Tokens:** verification/reset tokens are 32 random bytes stored only as
//!   SHA-256 hashes and consumed exactly once; phone codes are 6 digits with
//!   a 10-minute expiry. Session tokens follow the same hashed-at-rest rule.
//! - **Enumeration safety:** unknown accounts and wrong passwords leave the
//!   HTTP boundary as the same generic response.

pub mod account;
pub mod admin;
pub mod api;
pub mod auth;
pub mod cli;
pub mod device;
pub mod email;
pub mod lockout;
pub mod notify;
pub mod password;
pub mod rate_limit;
pub mod store;
pub mod totp;

pub use api::{APP_USER_AGENT, GIT_COMMIT_HASH};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
