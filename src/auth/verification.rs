//! Email verification: consume the link token, or reissue one.

use super::state::AuthState;
use super::tokens;
use super::AuthError;
use crate::account::Account;
use crate::email::verification_email;
use crate::store::{AccountStore, StoreError};
use chrono::Utc;
use tracing::warn;

/// Consume a verification token and activate the account. Single use: the
/// token and its expiry clear in the same update that sets the flag.
///
/// # Errors
/// `TokenExpiredOrInvalid` for unknown, consumed, or expired tokens.
pub async fn verify_email(state: &AuthState, token: &str) -> Result<Account, AuthError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::TokenExpiredOrInvalid);
    }
    let token_hash = tokens::hash_token(token);
    state
        .store()
        .consume_verification_token(&token_hash)
        .await?
        .ok_or(AuthError::TokenExpiredOrInvalid)
}

/// Reissue a verification token. Intentionally opaque: unknown emails and
/// already-verified accounts return `Ok` so the endpoint cannot be used to
/// probe for accounts.
pub async fn resend_verification(state: &AuthState, email: &str) -> Result<(), AuthError> {
    let Some(mut account) = state.store().find_by_email(email).await? else {
        return Ok(());
    };
    if account.email_verified {
        return Ok(());
    }

    let token = tokens::generate_token()
        .map_err(|err| AuthError::Storage(StoreError::Backend(err)))?;
    account.verification_token_hash = Some(tokens::hash_token(&token));
    account.verification_token_expires_at = Some(Utc::now() + tokens::verification_token_ttl());
    state.store().save(&account).await?;

    let message = verification_email(
        &account.email,
        state.config().frontend_base_url(),
        &token,
    );
    if let Err(err) = state.mailer().send(&message) {
        warn!(account_id = %account.id, "verification resend failed: {err}");
    }
    Ok(())
}
