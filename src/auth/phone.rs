//! Phone verification: 6-digit OTP with a 10-minute expiry, issued against a
//! live email-verification token and consumed exactly once.
//!
//! SMS transport is out of scope; the code is logged so local flows can
//! complete end to end.

use super::state::AuthState;
use super::tokens;
use super::AuthError;
use crate::account::Account;
use crate::store::AccountStore;
use chrono::Utc;
use tracing::info;

/// Issue (or reissue) a phone verification code. The caller proves control
/// of the registration by presenting a still-valid email verification token.
///
/// # Errors
/// `TokenExpiredOrInvalid` when the presented token is unknown or expired.
pub async fn request_code(state: &AuthState, verification_token: &str) -> Result<(), AuthError> {
    let token = verification_token.trim();
    if token.is_empty() {
        return Err(AuthError::TokenExpiredOrInvalid);
    }

    let mut account = state
        .store()
        .find_by_verification_token(&tokens::hash_token(token))
        .await?
        .ok_or(AuthError::TokenExpiredOrInvalid)?;

    let code = tokens::generate_phone_code();
    account.phone_code = Some(code.clone());
    account.phone_code_expires_at = Some(Utc::now() + tokens::phone_code_ttl());
    state.store().save(&account).await?;

    // SMS delivery is an external collaborator; log for local development.
    info!(
        account_id = %account.id,
        phone = account.phone.as_deref().unwrap_or("unset"),
        "phone verification code issued: {code}"
    );
    Ok(())
}

/// Consume a phone code; marks the phone verified and clears the code and
/// its expiry in the same update.
///
/// # Errors
/// `TokenExpiredOrInvalid` for malformed, unknown, consumed, or expired
/// codes.
pub async fn verify_phone(state: &AuthState, code: &str) -> Result<Account, AuthError> {
    let code = code.trim();
    if code.len() != 6 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AuthError::TokenExpiredOrInvalid);
    }
    state
        .store()
        .consume_phone_code(code)
        .await?
        .ok_or(AuthError::TokenExpiredOrInvalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::auth::state::test_support::memory_state;
    use crate::store::AccountStore;

    #[tokio::test]
    async fn request_and_verify_round_trip() {
        let (store, state) = memory_state();
        let token = tokens::generate_token().expect("token");
        store
            .create(NewAccount {
                email: "a@example.com".to_string(),
                phone: Some("+15555550123".to_string()),
                verification_token_hash: Some(tokens::hash_token(&token)),
                verification_token_expires_at: Some(
                    Utc::now() + tokens::verification_token_ttl(),
                ),
                ..NewAccount::default()
            })
            .await
            .expect("create");

        request_code(&state, &token).await.expect("request code");
        let account = store
            .find_by_email("a@example.com")
            .await
            .expect("find")
            .expect("exists");
        let code = account.phone_code.clone().expect("code staged");
        assert_eq!(code.len(), 6);
        assert!(account.phone_code_expires_at.is_some());
        // Issuing a code must not consume the email verification token.
        assert!(account.verification_token_hash.is_some());

        let verified = verify_phone(&state, &code).await.expect("verify");
        assert!(verified.phone_verified);
        assert!(verified.phone_code.is_none());
        assert!(verified.phone_code_expires_at.is_none());

        let err = verify_phone(&state, &code).await.expect_err("second use");
        assert!(matches!(err, AuthError::TokenExpiredOrInvalid));
    }

    #[tokio::test]
    async fn request_code_requires_a_live_verification_token() {
        let (_store, state) = memory_state();
        let err = request_code(&state, "bogus").await.expect_err("unknown token");
        assert!(matches!(err, AuthError::TokenExpiredOrInvalid));
        let err = request_code(&state, "  ").await.expect_err("blank token");
        assert!(matches!(err, AuthError::TokenExpiredOrInvalid));
    }

    #[tokio::test]
    async fn malformed_codes_rejected() {
        let (_store, state) = memory_state();
        for code in ["12345", "1234567", "12a456", ""] {
            let err = verify_phone(&state, code).await.expect_err("malformed");
            assert!(matches!(err, AuthError::TokenExpiredOrInvalid));
        }
    }
}
