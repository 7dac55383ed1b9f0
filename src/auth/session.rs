//! Session issuance over the store port.
//!
//! The orchestrator returns identity claims; this module turns them into a
//! random bearer token whose hash (never the raw value) is stored alongside
//! the claims. Lookups resolve unexpired tokens back to the claims; revoke is
//! idempotent.

use super::state::AuthState;
use super::tokens;
use super::AuthError;
use crate::account::Identity;
use crate::store::{AccountStore, StoreError};
use chrono::Duration;

/// Mint a session for freshly issued identity claims; returns the raw token
/// for the cookie.
pub async fn issue(state: &AuthState, identity: &Identity) -> Result<String, AuthError> {
    let token = tokens::generate_session_token()
        .map_err(|err| AuthError::Storage(StoreError::Backend(err)))?;
    let ttl = Duration::seconds(state.config().session_ttl_seconds());
    state
        .store()
        .insert_session(&tokens::hash_token(&token), identity, ttl)
        .await?;
    Ok(token)
}

/// Resolve a presented token to its claims, if the session is still live.
pub async fn authenticate(state: &AuthState, token: &str) -> Result<Option<Identity>, AuthError> {
    let claims = state
        .store()
        .lookup_session(&tokens::hash_token(token))
        .await?;
    Ok(claims)
}

/// Drop the session; unknown tokens are a no-op.
pub async fn revoke(state: &AuthState, token: &str) -> Result<(), AuthError> {
    state
        .store()
        .delete_session(&tokens::hash_token(token))
        .await?;
    Ok(())
}
