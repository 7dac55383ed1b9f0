//! Authentication core: the account security state machine.
//!
//! The orchestrator in [`login`] coordinates rate limiting, lockout, password
//! verification, two-factor checks, and device bookkeeping into a single
//! typed decision. Callers branch on [`AuthError`] discriminants; no control
//! flow rides on panics or string matching.

pub mod login;
pub mod phone;
pub mod recovery;
pub mod register;
pub mod session;
pub(crate) mod state;
pub mod tokens;
pub mod twofa;
pub mod verification;

pub use login::{login, oauth_sign_in, Credentials, OAuthProfile};
pub use state::{AuthConfig, AuthState};

use crate::store::StoreError;

/// Typed outcome taxonomy for the authentication flows.
///
/// Every variant except `Storage` is an expected, user-distinguishable
/// result. Mail failures never appear here; they are logged at the
/// dispatcher and the triggering operation still succeeds.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("too many attempts")]
    RateLimited,
    #[error("account not found")]
    AccountNotFound,
    #[error("email not verified")]
    AccountUnverified,
    #[error("account temporarily locked")]
    AccountLocked,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("two-factor code required")]
    TwoFactorRequired,
    #[error("invalid two-factor code")]
    InvalidTwoFactorCode,
    #[error("invalid or expired token")]
    TokenExpiredOrInvalid,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl AuthError {
    /// Message safe to show an external caller. `AccountNotFound` and
    /// `InvalidCredentials` merge into one line so responses cannot be used
    /// to enumerate accounts, and lock/rate errors carry no unlock times.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::AccountNotFound | Self::InvalidCredentials => "Invalid email or password",
            Self::RateLimited => "Too many attempts, please try again later",
            Self::AccountUnverified => "Please verify your email before logging in",
            Self::AccountLocked => "Account is temporarily locked, please try again later",
            Self::TwoFactorRequired => "Two-factor authentication code required",
            Self::InvalidTwoFactorCode => "Invalid two-factor authentication code",
            Self::TokenExpiredOrInvalid => "Invalid or expired token",
            Self::Storage(_) => "Internal error",
        }
    }

    /// Stable machine-readable discriminant for API clients; a well-designed
    /// client re-prompts for the code on `two_factor_required` without asking
    /// for the password again.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountNotFound | Self::InvalidCredentials => "invalid_credentials",
            Self::RateLimited => "rate_limited",
            Self::AccountUnverified => "account_unverified",
            Self::AccountLocked => "account_locked",
            Self::TwoFactorRequired => "two_factor_required",
            Self::InvalidTwoFactorCode => "invalid_two_factor_code",
            Self::TokenExpiredOrInvalid => "token_invalid",
            Self::Storage(_) => "internal_error",
        }
    }
}
