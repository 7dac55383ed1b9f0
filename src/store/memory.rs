//! In-process account store for tests and local development.
//!
//! One async mutex guards the whole state, which makes every port operation
//! atomic, including the increment-and-check used by the lockout policy.

use super::{AccountStore, LockStatus, StoreError};
use crate::account::{Account, Identity, NewAccount, Preferences};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug)]
struct SessionEntry {
    claims: Identity,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    emails: HashMap<String, Uuid>,
    sessions: HashMap<Vec<u8>, SessionEntry>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: place an account into an arbitrary lockout state, bypassing
    /// the atomic-operations-only rule that `save` enforces.
    #[cfg(test)]
    pub(crate) async fn set_security_state(
        &self,
        id: Uuid,
        failed_login_attempts: u32,
        lock_until: Option<DateTime<Utc>>,
    ) {
        let mut inner = self.inner.lock().await;
        if let Some(account) = inner.accounts.get_mut(&id) {
            account.failed_login_attempts = failed_login_attempts;
            account.lock_until = lock_until;
        }
    }
}

fn build_account(new_account: NewAccount, now: DateTime<Utc>) -> Account {
    Account {
        id: Uuid::new_v4(),
        email: Account::normalize_email(&new_account.email),
        name: new_account.name,
        image: new_account.image,
        password_hash: new_account.password_hash,
        phone: new_account.phone,
        phone_verified: false,
        phone_code: None,
        phone_code_expires_at: None,
        email_verified: new_account.email_verified,
        verification_token_hash: new_account.verification_token_hash,
        verification_token_expires_at: new_account.verification_token_expires_at,
        reset_token_hash: None,
        reset_token_expires_at: None,
        role: Default::default(),
        subscription: Default::default(),
        provider: new_account.provider,
        provider_id: new_account.provider_id,
        two_factor_enabled: false,
        totp_secret: None,
        backup_code_hashes: Vec::new(),
        last_login: None,
        failed_login_attempts: 0,
        lock_until: None,
        devices: BTreeMap::new(),
        login_history: Vec::new(),
        notifications: Vec::new(),
        preferences: Preferences::default(),
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn create(&self, new_account: NewAccount) -> Result<Account, StoreError> {
        let mut inner = self.inner.lock().await;
        let email = Account::normalize_email(&new_account.email);
        if inner.emails.contains_key(&email) {
            return Err(StoreError::DuplicateEmail);
        }
        let account = build_account(new_account, Utc::now());
        inner.emails.insert(email, account.id);
        inner.accounts.insert(account.id, account.clone());
        Ok(account)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().await;
        let normalized = Account::normalize_email(email);
        Ok(inner
            .emails
            .get(&normalized)
            .and_then(|id| inner.accounts.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.get(&id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let inner = self.inner.lock().await;
        let mut accounts: Vec<Account> = inner.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    async fn save(&self, account: &Account) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let existing = inner
            .accounts
            .get(&account.id)
            .ok_or(StoreError::NotFound)?;
        let mut updated = account.clone();
        // Security counters only move through the atomic operations; a stale
        // snapshot must not roll them back.
        updated.failed_login_attempts = existing.failed_login_attempts;
        updated.lock_until = existing.lock_until;
        updated.updated_at = Utc::now();
        inner.accounts.insert(updated.id, updated);
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        threshold: u32,
        lock_for: Duration,
    ) -> Result<LockStatus, StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        let now = Utc::now();
        account.failed_login_attempts += 1;
        if account.failed_login_attempts >= threshold {
            account.lock_until = Some(now + lock_for);
        }
        account.updated_at = now;
        Ok(LockStatus {
            failed_attempts: account.failed_login_attempts,
            lock_until: account.lock_until,
        })
    }

    async fn reset_login_attempts(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let account = inner.accounts.get_mut(&id).ok_or(StoreError::NotFound)?;
        account.failed_login_attempts = 0;
        account.lock_until = None;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn find_by_verification_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        Ok(inner
            .accounts
            .values()
            .find(|account| {
                account.verification_token_hash.as_deref() == Some(token_hash)
                    && account
                        .verification_token_expires_at
                        .is_some_and(|expiry| expiry > now)
            })
            .cloned())
    }

    async fn consume_verification_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let account = inner.accounts.values_mut().find(|account| {
            account.verification_token_hash.as_deref() == Some(token_hash)
                && account
                    .verification_token_expires_at
                    .is_some_and(|expiry| expiry > now)
        });
        let Some(account) = account else {
            return Ok(None);
        };
        account.email_verified = true;
        account.verification_token_hash = None;
        account.verification_token_expires_at = None;
        account.updated_at = now;
        Ok(Some(account.clone()))
    }

    async fn reset_password_by_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
    ) -> Result<Option<Account>, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let account = inner.accounts.values_mut().find(|account| {
            account.reset_token_hash.as_deref() == Some(token_hash)
                && account
                    .reset_token_expires_at
                    .is_some_and(|expiry| expiry > now)
        });
        let Some(account) = account else {
            return Ok(None);
        };
        account.password_hash = Some(new_password_hash.to_string());
        account.reset_token_hash = None;
        account.reset_token_expires_at = None;
        account.updated_at = now;
        Ok(Some(account.clone()))
    }

    async fn consume_phone_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let account = inner.accounts.values_mut().find(|account| {
            account.phone_code.as_deref() == Some(code)
                && account
                    .phone_code_expires_at
                    .is_some_and(|expiry| expiry > now)
        });
        let Some(account) = account else {
            return Ok(None);
        };
        account.phone_verified = true;
        account.phone_code = None;
        account.phone_code_expires_at = None;
        account.updated_at = now;
        Ok(Some(account.clone()))
    }

    async fn insert_session(
        &self,
        token_hash: &[u8],
        claims: &Identity,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        // Opportunistic sweep so abandoned sessions do not accumulate.
        inner.sessions.retain(|_, entry| entry.expires_at > now);
        inner.sessions.insert(
            token_hash.to_vec(),
            SessionEntry {
                claims: claims.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn lookup_session(&self, token_hash: &[u8]) -> Result<Option<Identity>, StoreError> {
        let inner = self.inner.lock().await;
        let now = Utc::now();
        Ok(inner
            .sessions
            .get(token_hash)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.claims.clone()))
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(token_hash);
        Ok(())
    }
}
