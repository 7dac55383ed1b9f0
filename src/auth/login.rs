//! The login orchestrator.
//!
//! Credential flow, strictly sequential:
//!
//! ```text
//! rate check -> account lookup -> verified check -> lock check
//!            -> password check -> two-factor check -> record success
//!            -> issue identity claims
//! ```
//!
//! Each step either advances or returns a typed [`AuthError`]. The rate check
//! runs before any database work; the lock check runs after the account is
//! loaded but before the password comparison, so a locked account never burns
//! a hash verification. A storage failure anywhere fails the whole attempt;
//! no identity is issued unless the final persist committed.
//!
//! The OAuth path trusts the external provider's verification and skips the
//! password, two-factor, lockout, and rate-limit machinery entirely.

use super::state::AuthState;
use super::AuthError;
use crate::account::{Account, Identity, NewAccount, NotificationKind, Provider};
use crate::device::{self, RequestMetadata};
use crate::lockout;
use crate::notify;
use crate::rate_limit::{RateLimitAction, RateLimitDecision};
use crate::store::AccountStore;
use crate::totp;
use chrono::Utc;
use secrecy::SecretString;
use tracing::{debug, warn};

/// Login input. `totp_code` accepts either a 6-digit TOTP code or a backup
/// code.
#[derive(Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
    pub totp_code: Option<String>,
}

/// Profile asserted by an external OAuth provider after code exchange.
#[derive(Clone, Debug)]
pub struct OAuthProfile {
    pub provider: Provider,
    pub provider_id: String,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Run the credential login state machine and return identity claims for the
/// session the caller will mint.
///
/// # Errors
/// Returns the terminal [`AuthError`] for the step that rejected the attempt.
pub async fn login(
    state: &AuthState,
    credentials: &Credentials,
    metadata: &RequestMetadata,
) -> Result<Identity, AuthError> {
    let email = Account::normalize_email(&credentials.email);

    // Volume throttle first, keyed by caller identity, before any lookup.
    let rate_key = format!("{}:{}", metadata.ip, email);
    if state.rate_limiter().consume(RateLimitAction::Login, &rate_key)
        == RateLimitDecision::Limited
    {
        return Err(AuthError::RateLimited);
    }

    let mut account = state
        .store()
        .find_by_email(&email)
        .await?
        .ok_or(AuthError::AccountNotFound)?;

    if !account.email_verified {
        return Err(AuthError::AccountUnverified);
    }

    let now = Utc::now();
    if lockout::is_locked(&account, now) {
        // Short-circuit before the hash comparison: no cost burned, no
        // counter movement that would extend the lock.
        return Err(AuthError::AccountLocked);
    }

    let password_ok = account
        .password_hash
        .as_deref()
        .is_some_and(|digest| crate::password::verify(&credentials.password, digest));
    if !password_ok {
        let status = lockout::register_failure(state.store(), &account).await?;
        debug!(
            account_id = %account.id,
            failed_attempts = status.failed_attempts,
            "password check failed"
        );
        device::record_failure(&mut account, metadata, now);
        state.store().save(&account).await?;
        return Err(AuthError::InvalidCredentials);
    }

    if account.two_factor_enabled {
        let Some(secret) = account.totp_secret.clone() else {
            // Enabled with no secret is an invalid record; fail closed.
            warn!(account_id = %account.id, "two-factor enabled without a secret");
            return Err(AuthError::InvalidTwoFactorCode);
        };
        let Some(code) = credentials.totp_code.as_deref() else {
            return Err(AuthError::TwoFactorRequired);
        };

        // Invalid codes do not touch the lockout counter; their backoff is
        // this dedicated bucket.
        if state
            .rate_limiter()
            .consume(RateLimitAction::TotpVerify, &email)
            == RateLimitDecision::Limited
        {
            return Err(AuthError::RateLimited);
        }

        let code_ok = state.totp().verify_code(&secret, code)
            || totp::consume_backup_code(&mut account, code);
        if !code_ok {
            device::record_failure(&mut account, metadata, now);
            state.store().save(&account).await?;
            return Err(AuthError::InvalidTwoFactorCode);
        }
    }

    lockout::clear(state.store(), &account).await?;
    let recorded = device::record_success(&mut account, metadata, now);
    // One save covers device merge, history append, and any consumed backup
    // code. If it fails, the caller gets an error, not an identity.
    state.store().save(&account).await?;

    if recorded.new_device && account.preferences.login_alerts {
        let message = format!(
            "A new login to your account was detected from {}",
            metadata.ip
        );
        notify::notify(
            state.store(),
            state.mailer(),
            &mut account,
            NotificationKind::Security,
            "New device login",
            &message,
        )
        .await?;
    }

    Ok(Identity::from(&account))
}

/// OAuth sign-in: create the account on first contact, refresh the provider
/// binding afterwards. The external provider already verified the email.
///
/// # Errors
/// `InvalidCredentials` when called with the credentials pseudo-provider;
/// storage errors otherwise.
pub async fn oauth_sign_in(
    state: &AuthState,
    profile: &OAuthProfile,
) -> Result<Identity, AuthError> {
    if profile.provider == Provider::Credentials {
        return Err(AuthError::InvalidCredentials);
    }

    let email = Account::normalize_email(&profile.email);
    if let Some(mut account) = state.store().find_by_email(&email).await? {
        account.provider = profile.provider.clone();
        account.provider_id = Some(profile.provider_id.clone());
        account.email_verified = true;
        state.store().save(&account).await?;
        return Ok(Identity::from(&account));
    }

    let account = state
        .store()
        .create(NewAccount {
            email,
            name: profile.name.clone(),
            image: profile.image.clone(),
            email_verified: true,
            provider: profile.provider.clone(),
            provider_id: Some(profile.provider_id.clone()),
            ..NewAccount::default()
        })
        .await?;
    Ok(Identity::from(&account))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{Role, Subscription};
    use crate::auth::state::test_support::{memory_state, memory_state_with_limiter};
    use crate::password;
    use crate::rate_limit::FixedWindowLimiter;
    use crate::store::memory::MemoryStore;
    use crate::store::AccountStore;
    use crate::totp::BackupCodeBatch;
    use chrono::Duration;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;
    use totp_rs::{Algorithm, Secret, TOTP};

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

    fn metadata() -> RequestMetadata {
        RequestMetadata {
            ip: "203.0.113.7".to_string(),
            user_agent: CHROME_WIN.to_string(),
            location: None,
        }
    }

    fn credentials(email: &str, password: &str, totp_code: Option<&str>) -> Credentials {
        Credentials {
            email: email.to_string(),
            password: SecretString::from(password.to_string()),
            totp_code: totp_code.map(str::to_string),
        }
    }

    async fn seeded_account(store: &MemoryStore, email: &str, password: &str) -> Account {
        let hash = password::hash(&SecretString::from(password.to_string())).expect("hash");
        let created = store
            .create(NewAccount {
                email: email.to_string(),
                password_hash: Some(hash),
                email_verified: true,
                ..NewAccount::default()
            })
            .await
            .expect("create");
        created
    }

    fn current_code(secret: &str) -> String {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .expect("secret bytes");
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some("custodia".to_string()),
            "test".to_string(),
        )
        .expect("totp");
        totp.generate_current().expect("code")
    }

    #[tokio::test]
    async fn successful_login_issues_identity_and_records_device() {
        let (store, state) = memory_state();
        seeded_account(&store, "a@x.com", "Secret123!").await;

        let identity = login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect("login");
        assert_eq!(identity.email, "a@x.com");
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.subscription, Subscription::Free);
        assert!(identity.email_verified);

        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.devices.len(), 1);
        assert_eq!(account.login_history.len(), 1);
        assert!(account.login_history[0].success);
        assert!(account.last_login.is_some());
        assert_eq!(account.failed_login_attempts, 0);
    }

    #[tokio::test]
    async fn normalized_email_matches() {
        let (store, state) = memory_state();
        seeded_account(&store, "a@x.com", "Secret123!").await;

        let result = login(
            &state,
            &credentials("  A@X.COM ", "Secret123!", None),
            &metadata(),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn unknown_account_is_a_distinct_internal_error() {
        let (_store, state) = memory_state();
        let err = login(
            &state,
            &credentials("nobody@x.com", "Secret123!", None),
            &metadata(),
        )
        .await
        .expect_err("should fail");
        assert!(matches!(err, AuthError::AccountNotFound));
    }

    #[tokio::test]
    async fn unverified_account_rejected_without_side_effects() {
        let (store, state) = memory_state();
        let hash = password::hash(&SecretString::from("Secret123!".to_string())).expect("hash");
        store
            .create(NewAccount {
                email: "a@x.com".to_string(),
                password_hash: Some(hash),
                email_verified: false,
                ..NewAccount::default()
            })
            .await
            .expect("create");

        let err = login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect_err("should fail");
        assert!(matches!(err, AuthError::AccountUnverified));

        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert!(account.login_history.is_empty());
        assert_eq!(account.failed_login_attempts, 0);
    }

    #[tokio::test]
    async fn bad_password_increments_and_appends_failure_history() {
        let (store, state) = memory_state();
        seeded_account(&store, "a@x.com", "Secret123!").await;

        let err = login(&state, &credentials("a@x.com", "wrong", None), &metadata())
            .await
            .expect_err("should fail");
        assert!(matches!(err, AuthError::InvalidCredentials));

        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.failed_login_attempts, 1);
        assert_eq!(account.login_history.len(), 1);
        assert!(!account.login_history[0].success);
        assert!(account.devices.is_empty());
    }

    #[tokio::test]
    async fn fifth_failure_locks_and_correct_password_is_then_rejected() {
        let (store, state) = memory_state();
        let account = seeded_account(&store, "a@x.com", "Secret123!").await;
        // Four prior failures in this lock cycle.
        store.set_security_state(account.id, 4, None).await;

        let err = login(&state, &credentials("a@x.com", "wrong", None), &metadata())
            .await
            .expect_err("fifth failure");
        assert!(matches!(err, AuthError::InvalidCredentials));

        // Correct password within the lock window still rejected, before any
        // hash comparison could reset anything.
        let err = login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect_err("locked");
        assert!(matches!(err, AuthError::AccountLocked));
    }

    #[tokio::test]
    async fn expired_lock_allows_login_and_resets_counter() {
        let (store, state) = memory_state();
        let account = seeded_account(&store, "a@x.com", "Secret123!").await;
        store
            .set_security_state(account.id, 5, Some(Utc::now() - Duration::seconds(1)))
            .await;

        let identity = login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect("login");
        assert_eq!(identity.email, "a@x.com");

        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.failed_login_attempts, 0);
        assert!(account.lock_until.is_none());
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_any_lookup() {
        let limiter = Arc::new(FixedWindowLimiter::new().with_budget(
            RateLimitAction::Login,
            1,
            StdDuration::from_secs(3600),
        ));
        let (store, state) = memory_state_with_limiter(limiter);
        seeded_account(&store, "a@x.com", "Secret123!").await;

        login(&state, &credentials("a@x.com", "wrong", None), &metadata())
            .await
            .expect_err("first attempt fails on password");

        let err = login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect_err("second attempt rate limited");
        assert!(matches!(err, AuthError::RateLimited));

        // No additional history entry: the throttle fired before the store.
        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.login_history.len(), 1);
        assert_eq!(account.failed_login_attempts, 1);
    }

    #[tokio::test]
    async fn two_factor_required_when_enabled_and_code_missing() {
        let (store, state) = memory_state();
        let mut account = seeded_account(&store, "a@x.com", "Secret123!").await;
        account.stage_two_factor(state.totp().generate_secret(), Vec::new());
        assert!(account.enable_two_factor());
        store.save(&account).await.expect("save");

        let err = login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect_err("code missing");
        assert!(matches!(err, AuthError::TwoFactorRequired));
    }

    #[tokio::test]
    async fn invalid_code_rejected_without_touching_lockout_counter() {
        let (store, state) = memory_state();
        let mut account = seeded_account(&store, "a@x.com", "Secret123!").await;
        account.stage_two_factor(state.totp().generate_secret(), Vec::new());
        assert!(account.enable_two_factor());
        store.save(&account).await.expect("save");

        let err = login(
            &state,
            &credentials("a@x.com", "Secret123!", Some("000000")),
            &metadata(),
        )
        .await
        .expect_err("bad code");
        assert!(matches!(err, AuthError::InvalidTwoFactorCode));

        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.failed_login_attempts, 0);
    }

    #[tokio::test]
    async fn valid_code_completes_the_login() {
        let (store, state) = memory_state();
        let mut account = seeded_account(&store, "a@x.com", "Secret123!").await;
        let secret = state.totp().generate_secret();
        account.stage_two_factor(secret.clone(), Vec::new());
        assert!(account.enable_two_factor());
        store.save(&account).await.expect("save");

        let code = current_code(&secret);
        let identity = login(
            &state,
            &credentials("a@x.com", "Secret123!", Some(&code)),
            &metadata(),
        )
        .await
        .expect("login");
        assert_eq!(identity.email, "a@x.com");
    }

    #[tokio::test]
    async fn backup_code_is_accepted_once() {
        let (store, state) = memory_state();
        let mut account = seeded_account(&store, "a@x.com", "Secret123!").await;
        let batch = BackupCodeBatch::generate().expect("batch");
        account.stage_two_factor(state.totp().generate_secret(), batch.code_hashes.clone());
        assert!(account.enable_two_factor());
        store.save(&account).await.expect("save");
        let backup = batch.codes.first().expect("code").clone();

        login(
            &state,
            &credentials("a@x.com", "Secret123!", Some(&backup)),
            &metadata(),
        )
        .await
        .expect("backup code login");

        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.backup_code_hashes.len(), batch.code_hashes.len() - 1);

        // Replay of the consumed code fails.
        let err = login(
            &state,
            &credentials("a@x.com", "Secret123!", Some(&backup)),
            &metadata(),
        )
        .await
        .expect_err("replayed backup code");
        assert!(matches!(err, AuthError::InvalidTwoFactorCode));
    }

    #[tokio::test]
    async fn totp_attempts_have_their_own_bucket() {
        let limiter = Arc::new(
            FixedWindowLimiter::new()
                .with_budget(RateLimitAction::Login, 100, StdDuration::from_secs(3600))
                .with_budget(RateLimitAction::TotpVerify, 2, StdDuration::from_secs(3600)),
        );
        let (store, state) = memory_state_with_limiter(limiter);
        let mut account = seeded_account(&store, "a@x.com", "Secret123!").await;
        let secret = state.totp().generate_secret();
        account.stage_two_factor(secret.clone(), Vec::new());
        assert!(account.enable_two_factor());
        store.save(&account).await.expect("save");

        for _ in 0..2 {
            let err = login(
                &state,
                &credentials("a@x.com", "Secret123!", Some("000000")),
                &metadata(),
            )
            .await
            .expect_err("bad code");
            assert!(matches!(err, AuthError::InvalidTwoFactorCode));
        }

        let code = current_code(&secret);
        let err = login(
            &state,
            &credentials("a@x.com", "Secret123!", Some(&code)),
            &metadata(),
        )
        .await
        .expect_err("bucket exhausted");
        assert!(matches!(err, AuthError::RateLimited));
    }

    #[tokio::test]
    async fn new_device_login_alert_is_created() {
        let (store, state) = memory_state();
        seeded_account(&store, "a@x.com", "Secret123!").await;

        login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect("login");
        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.notifications.len(), 1);
        assert_eq!(account.notifications[0].kind, NotificationKind::Security);

        // Same device again: no second alert.
        login(&state, &credentials("a@x.com", "Secret123!", None), &metadata())
            .await
            .expect("login");
        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.notifications.len(), 1);
    }

    #[tokio::test]
    async fn oauth_first_sign_in_creates_a_verified_account() {
        let (store, state) = memory_state();
        let identity = oauth_sign_in(
            &state,
            &OAuthProfile {
                provider: Provider::Google,
                provider_id: "google-123".to_string(),
                email: "new@x.com".to_string(),
                name: Some("New User".to_string()),
                image: None,
            },
        )
        .await
        .expect("oauth sign-in");
        assert_eq!(identity.role, Role::User);
        assert_eq!(identity.subscription, Subscription::Free);
        assert!(identity.email_verified);

        let account = store
            .find_by_email("new@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert!(account.password_hash.is_none());
        assert_eq!(account.provider, Provider::Google);
        assert_eq!(account.provider_id.as_deref(), Some("google-123"));
    }

    #[tokio::test]
    async fn oauth_repeat_sign_in_updates_the_provider_binding() {
        let (store, state) = memory_state();
        let account = seeded_account(&store, "a@x.com", "Secret123!").await;
        assert_eq!(account.provider, Provider::Credentials);

        oauth_sign_in(
            &state,
            &OAuthProfile {
                provider: Provider::Github,
                provider_id: "gh-9".to_string(),
                email: "a@x.com".to_string(),
                name: None,
                image: None,
            },
        )
        .await
        .expect("oauth sign-in");

        let account = store
            .find_by_email("a@x.com")
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(account.provider, Provider::Github);
        assert_eq!(account.provider_id.as_deref(), Some("gh-9"));
        assert!(account.email_verified);
    }

    #[tokio::test]
    async fn oauth_rejects_the_credentials_pseudo_provider() {
        let (_store, state) = memory_state();
        let err = oauth_sign_in(
            &state,
            &OAuthProfile {
                provider: Provider::Credentials,
                provider_id: "x".to_string(),
                email: "a@x.com".to_string(),
                name: None,
                image: None,
            },
        )
        .await
        .expect_err("should fail");
        assert!(matches!(err, AuthError::InvalidCredentials));
    }
}
