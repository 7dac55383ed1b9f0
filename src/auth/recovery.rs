//! Password recovery and change.

use super::state::AuthState;
use super::tokens;
use super::AuthError;
use crate::account::Account;
use crate::email::password_reset_email;
use crate::rate_limit::{RateLimitAction, RateLimitDecision};
use crate::store::{AccountStore, StoreError};
use chrono::Utc;
use secrecy::SecretString;
use tracing::warn;

/// Stage a reset token and send the reset link.
///
/// # Errors
/// `RateLimited` once the password-reset bucket for this email is exhausted;
/// `AccountNotFound` for unknown emails (callers present this opaquely).
pub async fn forgot_password(state: &AuthState, email: &str) -> Result<(), AuthError> {
    let normalized = Account::normalize_email(email);
    if state
        .rate_limiter()
        .consume(RateLimitAction::PasswordReset, &normalized)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    let mut account = state
        .store()
        .find_by_email(&normalized)
        .await?
        .ok_or(AuthError::AccountNotFound)?;

    let token = tokens::generate_token()
        .map_err(|err| AuthError::Storage(StoreError::Backend(err)))?;
    account.reset_token_hash = Some(tokens::hash_token(&token));
    account.reset_token_expires_at = Some(Utc::now() + tokens::reset_token_ttl());
    state.store().save(&account).await?;

    let message = password_reset_email(
        &account.email,
        state.config().frontend_base_url(),
        &token,
    );
    if let Err(err) = state.mailer().send(&message) {
        warn!(account_id = %account.id, "password reset email failed: {err}");
    }
    Ok(())
}

/// Consume a reset token and set the new password. Single use: the token and
/// expiry clear in the same update that writes the digest.
///
/// # Errors
/// `TokenExpiredOrInvalid` for unknown, consumed, or expired tokens.
pub async fn reset_password(
    state: &AuthState,
    token: &str,
    new_password: &SecretString,
) -> Result<Account, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::TokenExpiredOrInvalid);
    }
    let new_hash = crate::password::hash(new_password)
        .map_err(|err| AuthError::Storage(StoreError::Backend(err)))?;
    state
        .store()
        .reset_password_by_token(&tokens::hash_token(token), &new_hash)
        .await?
        .ok_or(AuthError::TokenExpiredOrInvalid)
}

/// Authenticated password change; re-checks the current password first.
///
/// # Errors
/// `InvalidCredentials` when the current password does not match (or the
/// account has no password at all, i.e. OAuth-only).
pub async fn change_password(
    state: &AuthState,
    account: &mut Account,
    current_password: &SecretString,
    new_password: &SecretString,
) -> Result<(), AuthError> {
    let current_ok = account
        .password_hash
        .as_deref()
        .is_some_and(|digest| crate::password::verify(current_password, digest));
    if !current_ok {
        return Err(AuthError::InvalidCredentials);
    }

    let new_hash = crate::password::hash(new_password)
        .map_err(|err| AuthError::Storage(StoreError::Backend(err)))?;
    account.password_hash = Some(new_hash);
    state.store().save(account).await?;
    Ok(())
}
