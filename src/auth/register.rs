//! Credentials registration: create the account, stage the email
//! verification token, send the verification link.

use super::state::AuthState;
use super::tokens;
use super::AuthError;
use crate::account::{Account, NewAccount, Provider};
use crate::email::verification_email;
use crate::store::{AccountStore, StoreError};
use chrono::Utc;
use secrecy::SecretString;
use tracing::warn;

#[derive(Debug)]
pub struct Registration {
    pub email: String,
    pub password: SecretString,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Create a credentials account. The verification token is committed with
/// the account; the email itself is best-effort.
///
/// # Errors
/// `Storage(DuplicateEmail)` when the email is already registered; other
/// storage/hashing failures abort the registration.
pub async fn register(state: &AuthState, registration: &Registration) -> Result<Account, AuthError> {
    let password_hash = crate::password::hash(&registration.password)
        .map_err(|err| AuthError::Storage(StoreError::Backend(err)))?;

    let token = tokens::generate_token()
        .map_err(|err| AuthError::Storage(StoreError::Backend(err)))?;
    let token_hash = tokens::hash_token(&token);

    let account = state
        .store()
        .create(NewAccount {
            email: Account::normalize_email(&registration.email),
            name: registration.name.clone(),
            password_hash: Some(password_hash),
            phone: registration.phone.clone(),
            email_verified: false,
            verification_token_hash: Some(token_hash),
            verification_token_expires_at: Some(Utc::now() + tokens::verification_token_ttl()),
            provider: Provider::Credentials,
            ..NewAccount::default()
        })
        .await?;

    let message = verification_email(
        &account.email,
        state.config().frontend_base_url(),
        &token,
    );
    if let Err(err) = state.mailer().send(&message) {
        // The token is durable; the user can request a resend.
        warn!(account_id = %account.id, "verification email failed: {err}");
    }

    Ok(account)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::state::test_support::memory_state;
    use crate::store::AccountStore;

    fn registration(email: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: SecretString::from("Secret123!".to_string()),
            name: Some("Tester".to_string()),
            phone: None,
        }
    }

    #[tokio::test]
    async fn register_creates_an_unverified_account_with_a_token() {
        let (store, state) = memory_state();
        let account = register(&state, &registration("New@Example.com "))
            .await
            .expect("register");

        assert_eq!(account.email, "new@example.com");
        assert!(!account.email_verified);
        assert!(account.password_hash.is_some());
        assert!(account.verification_token_hash.is_some());
        assert!(account.verification_token_expires_at.is_some());
        assert_ne!(
            account.password_hash.as_deref(),
            Some("Secret123!"),
            "password must never be stored in plaintext"
        );

        let persisted = store
            .find_by_email("new@example.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(persisted.id, account.id);
    }

    #[tokio::test]
    async fn duplicate_email_is_a_typed_conflict() {
        let (_store, state) = memory_state();
        register(&state, &registration("a@example.com"))
            .await
            .expect("first register");

        let err = register(&state, &registration("A@example.com"))
            .await
            .expect_err("duplicate");
        assert!(matches!(
            err,
            AuthError::Storage(StoreError::DuplicateEmail)
        ));
    }
}
