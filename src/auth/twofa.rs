//! Two-factor enrollment and lifecycle.
//!
//! `disabled -> pending(secret, backup codes issued) -> enabled` on the first
//! verified code; `enabled -> disabled` only through the explicit disable,
//! which clears the secret and backup codes together with the flag.

use super::state::AuthState;
use super::AuthError;
use crate::account::{Account, TwoFactorState};
use crate::rate_limit::{RateLimitAction, RateLimitDecision};
use crate::store::AccountStore;
use crate::totp::Enrollment;

/// Stage a fresh secret and backup-code batch on the account and return the
/// material the client renders (secret, otpauth URI, QR, plaintext codes).
/// Re-running setup replaces the staged material.
///
/// # Errors
/// Storage failures and QR/secret generation failures abort the setup.
pub async fn setup(state: &AuthState, account: &mut Account) -> Result<Enrollment, AuthError> {
    let (enrollment, code_hashes) = state
        .totp()
        .begin_enrollment(&account.email)
        .map_err(|err| AuthError::Storage(crate::store::StoreError::Backend(err)))?;

    // Replace secret and codes; an already-enabled account keeps its flag.
    account.totp_secret = Some(enrollment.secret.clone());
    account.backup_code_hashes = code_hashes;
    state.store().save(account).await?;
    Ok(enrollment)
}

/// First successful code verification flips `pending -> enabled`.
///
/// # Errors
/// `RateLimited` when the totp-verify bucket is exhausted;
/// `InvalidTwoFactorCode` for a wrong code or when no secret is staged.
pub async fn verify_and_enable(
    state: &AuthState,
    account: &mut Account,
    code: &str,
) -> Result<(), AuthError> {
    if state
        .rate_limiter()
        .consume(RateLimitAction::TotpVerify, &account.email)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    let Some(secret) = account.totp_secret.clone() else {
        return Err(AuthError::InvalidTwoFactorCode);
    };
    if !state.totp().verify_code(&secret, code) {
        return Err(AuthError::InvalidTwoFactorCode);
    }

    account.enable_two_factor();
    state.store().save(account).await?;
    Ok(())
}

/// Explicit disable: flag, secret, and backup codes clear in one save.
pub async fn disable(state: &AuthState, account: &mut Account) -> Result<(), AuthError> {
    account.disable_two_factor();
    state.store().save(account).await?;
    Ok(())
}

/// Current enrollment phase, derived from the account fields.
#[must_use]
pub fn status(account: &Account) -> TwoFactorState {
    account.two_factor_state()
}
