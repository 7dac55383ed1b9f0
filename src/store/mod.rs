//! Account persistence port.
//!
//! The core treats storage as a document store with find/create/save plus a
//! few operations that must be atomic on the backend: the failed-login
//! counter, single-use token consumption, and session rows. Two
//! implementations ship: [`memory::MemoryStore`] for tests and local
//! development, and [`postgres::PgStore`] for deployments.

pub mod memory;
pub mod postgres;

use crate::account::{Account, Identity, NewAccount};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,
    #[error("account not found")]
    NotFound,
    #[error("storage backend failure: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Result of an atomic failed-login increment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockStatus {
    pub failed_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,
}

impl LockStatus {
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.is_some_and(|until| until > now)
    }
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create an account; fails with [`StoreError::DuplicateEmail`] when the
    /// normalized email already exists.
    async fn create(&self, new_account: NewAccount) -> Result<Account, StoreError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Accounts ordered by creation time, newest first (admin dashboard
    /// read model).
    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError>;

    /// Persist the account document. Last-write-wins is acceptable for
    /// device/history/notification updates. The failed-login counter and
    /// `lock_until` are NOT written here; they only move through the atomic
    /// operations below, so a stale in-memory snapshot cannot roll them back.
    async fn save(&self, account: &Account) -> Result<(), StoreError>;

    /// Atomic increment-and-check of the failed-login counter. Sets
    /// `lock_until = now + lock_for` in the same update once the counter
    /// reaches `threshold`, so racing requests cannot stretch the budget.
    async fn record_failed_login(
        &self,
        id: Uuid,
        threshold: u32,
        lock_for: Duration,
    ) -> Result<LockStatus, StoreError>;

    /// Reset the counter and clear the lock, atomically with respect to
    /// concurrent `record_failed_login` calls.
    async fn reset_login_attempts(&self, id: Uuid) -> Result<(), StoreError>;

    /// Non-consuming lookup by an unexpired verification token (used to gate
    /// phone-code issuance on a live verification link).
    async fn find_by_verification_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError>;

    /// Single-use email verification: marks the account verified and clears
    /// token + expiry in one update. `None` when the token is unknown,
    /// already consumed, or expired.
    async fn consume_verification_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError>;

    /// Single-use password reset: sets the new digest and clears token +
    /// expiry in one update. `None` when the token is unknown, already
    /// consumed, or expired.
    async fn reset_password_by_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
    ) -> Result<Option<Account>, StoreError>;

    /// Single-use phone OTP: marks the phone verified and clears code +
    /// expiry in one update.
    async fn consume_phone_code(&self, code: &str) -> Result<Option<Account>, StoreError>;

    /// Store a session under the token hash with the identity claims to be
    /// returned on lookup.
    async fn insert_session(
        &self,
        token_hash: &[u8],
        claims: &Identity,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// Resolve an unexpired session to its claims.
    async fn lookup_session(&self, token_hash: &[u8]) -> Result<Option<Identity>, StoreError>;

    /// Idempotent logout.
    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_status_expiry() {
        let now = Utc::now();
        let status = LockStatus {
            failed_attempts: 5,
            lock_until: Some(now + Duration::minutes(15)),
        };
        assert!(status.is_locked(now));
        assert!(!status.is_locked(now + Duration::minutes(16)));

        let unlocked = LockStatus {
            failed_attempts: 2,
            lock_until: None,
        };
        assert!(!unlocked.is_locked(now));
    }
}
