//! Account lockout policy.
//!
//! Per-account failure tracking, independent of the request-volume rate
//! limiter: five failed credential checks lock the account for fifteen
//! minutes. The counter lives on the account record and is advanced through
//! the store's atomic increment-and-check so concurrent failures cannot
//! stretch the budget.
//!
//! States: `unlocked(failed_count)` -> `locked(until)` -> `unlocked(0)`.
//! An expired lock is not cleared eagerly; the next successful check resets
//! it together with the counter.

use crate::account::Account;
use crate::store::{AccountStore, LockStatus, StoreError};
use chrono::{DateTime, Duration, Utc};

pub const MAX_FAILED_ATTEMPTS: u32 = 5;
const LOCK_MINUTES: i64 = 15;

#[must_use]
pub fn lock_duration() -> Duration {
    Duration::minutes(LOCK_MINUTES)
}

/// Whether a login attempt must be rejected before any password comparison.
#[must_use]
pub fn is_locked(account: &Account, now: DateTime<Utc>) -> bool {
    account.is_locked(now)
}

/// Failure path: atomic increment, locking at the threshold.
pub async fn register_failure(
    store: &dyn AccountStore,
    account: &Account,
) -> Result<LockStatus, StoreError> {
    store
        .record_failed_login(account.id, MAX_FAILED_ATTEMPTS, lock_duration())
        .await
}

/// Success path: counter back to zero, lock cleared.
pub async fn clear(store: &dyn AccountStore, account: &Account) -> Result<(), StoreError> {
    store.reset_login_attempts(account.id).await
}
