//! Postgres-backed account store.
//!
//! Hot security fields are columns so the lockout counter can be advanced
//! with a single conditional UPDATE; devices, login history, notifications,
//! backup-code hashes, and preferences ride along as JSONB documents.
//! Schema: `db/schema.sql`.

use super::{AccountStore, LockStatus, StoreError};
use crate::account::{
    Account, Device, Identity, LoginEvent, NewAccount, Notification, Preferences, Provider, Role,
    Subscription,
};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::BTreeMap;
use tracing::Instrument;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = r"
    id, email, name, image, password_hash,
    phone, phone_verified, phone_code, phone_code_expires_at,
    email_verified, verification_token_hash, verification_token_expires_at,
    reset_token_hash, reset_token_expires_at,
    role, subscription, provider, provider_id,
    two_factor_enabled, totp_secret, backup_code_hashes,
    last_login, failed_login_attempts, lock_until,
    devices, login_history, notifications, preferences,
    created_at, updated_at
";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &'static str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn backend(err: impl Into<anyhow::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &PgRow,
    column: &str,
) -> Result<T, StoreError> {
    let value: serde_json::Value = row
        .try_get(column)
        .with_context(|| format!("missing column {column}"))
        .map_err(backend)?;
    serde_json::from_value(value)
        .with_context(|| format!("malformed JSON document in column {column}"))
        .map_err(backend)
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let role: String = row.try_get("role").map_err(backend)?;
    let role = Role::parse(&role).ok_or_else(|| backend(anyhow!("unknown role {role}")))?;
    let subscription: String = row.try_get("subscription").map_err(backend)?;
    let subscription = Subscription::parse(&subscription)
        .ok_or_else(|| backend(anyhow!("unknown subscription {subscription}")))?;
    let provider: String = row.try_get("provider").map_err(backend)?;
    let provider =
        Provider::parse(&provider).ok_or_else(|| backend(anyhow!("unknown provider {provider}")))?;
    let failed_login_attempts: i32 = row.try_get("failed_login_attempts").map_err(backend)?;

    let devices: BTreeMap<String, Device> = json_column(row, "devices")?;
    let login_history: Vec<LoginEvent> = json_column(row, "login_history")?;
    let notifications: Vec<Notification> = json_column(row, "notifications")?;
    let preferences: Preferences = json_column(row, "preferences")?;
    let backup_code_hashes: Vec<String> = json_column(row, "backup_code_hashes")?;

    Ok(Account {
        id: row.try_get("id").map_err(backend)?,
        email: row.try_get("email").map_err(backend)?,
        name: row.try_get("name").map_err(backend)?,
        image: row.try_get("image").map_err(backend)?,
        password_hash: row.try_get("password_hash").map_err(backend)?,
        phone: row.try_get("phone").map_err(backend)?,
        phone_verified: row.try_get("phone_verified").map_err(backend)?,
        phone_code: row.try_get("phone_code").map_err(backend)?,
        phone_code_expires_at: row.try_get("phone_code_expires_at").map_err(backend)?,
        email_verified: row.try_get("email_verified").map_err(backend)?,
        verification_token_hash: row.try_get("verification_token_hash").map_err(backend)?,
        verification_token_expires_at: row
            .try_get("verification_token_expires_at")
            .map_err(backend)?,
        reset_token_hash: row.try_get("reset_token_hash").map_err(backend)?,
        reset_token_expires_at: row.try_get("reset_token_expires_at").map_err(backend)?,
        role,
        subscription,
        provider,
        provider_id: row.try_get("provider_id").map_err(backend)?,
        two_factor_enabled: row.try_get("two_factor_enabled").map_err(backend)?,
        totp_secret: row.try_get("totp_secret").map_err(backend)?,
        backup_code_hashes,
        last_login: row.try_get("last_login").map_err(backend)?,
        failed_login_attempts: u32::try_from(failed_login_attempts).unwrap_or(0),
        lock_until: row.try_get("lock_until").map_err(backend)?,
        devices,
        login_history,
        notifications,
        preferences,
        created_at: row.try_get("created_at").map_err(backend)?,
        updated_at: row.try_get("updated_at").map_err(backend)?,
    })
}

fn to_json<T: serde::Serialize>(value: &T, what: &'static str) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(value)
        .with_context(|| format!("failed to serialize {what}"))
        .map_err(backend)
}

#[async_trait]
impl AccountStore for PgStore {
    async fn create(&self, new_account: NewAccount) -> Result<Account, StoreError> {
        let query = format!(
            r"
            INSERT INTO accounts
                (email, name, image, password_hash, phone, email_verified,
                 verification_token_hash, verification_token_expires_at,
                 provider, provider_id, preferences)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let preferences = to_json(&Preferences::default(), "preferences")?;
        let row = sqlx::query(&query)
            .bind(Account::normalize_email(&new_account.email))
            .bind(&new_account.name)
            .bind(&new_account.image)
            .bind(&new_account.password_hash)
            .bind(&new_account.phone)
            .bind(new_account.email_verified)
            .bind(new_account.verification_token_hash.as_deref())
            .bind(new_account.verification_token_expires_at)
            .bind(new_account.provider.as_str())
            .bind(&new_account.provider_id)
            .bind(preferences)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT"))
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    StoreError::DuplicateEmail
                } else {
                    backend(anyhow!(err).context("failed to insert account"))
                }
            })?;
        account_from_row(&row)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(Account::normalize_email(email))
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await
            .context("failed to lookup account by email")
            .map_err(backend)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await
            .context("failed to lookup account by id")
            .map_err(backend)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at DESC");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT"))
            .await
            .context("failed to list accounts")
            .map_err(backend)?;
        rows.iter().map(account_from_row).collect()
    }

    async fn save(&self, account: &Account) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts SET
                name = $2, image = $3, password_hash = $4,
                phone = $5, phone_verified = $6, phone_code = $7, phone_code_expires_at = $8,
                email_verified = $9,
                verification_token_hash = $10, verification_token_expires_at = $11,
                reset_token_hash = $12, reset_token_expires_at = $13,
                role = $14, subscription = $15, provider = $16, provider_id = $17,
                two_factor_enabled = $18, totp_secret = $19, backup_code_hashes = $20,
                last_login = $21,
                devices = $22, login_history = $23, notifications = $24, preferences = $25,
                updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(&account.name)
            .bind(&account.image)
            .bind(&account.password_hash)
            .bind(&account.phone)
            .bind(account.phone_verified)
            .bind(&account.phone_code)
            .bind(account.phone_code_expires_at)
            .bind(account.email_verified)
            .bind(account.verification_token_hash.as_deref())
            .bind(account.verification_token_expires_at)
            .bind(account.reset_token_hash.as_deref())
            .bind(account.reset_token_expires_at)
            .bind(account.role.as_str())
            .bind(account.subscription.as_str())
            .bind(account.provider.as_str())
            .bind(&account.provider_id)
            .bind(account.two_factor_enabled)
            .bind(&account.totp_secret)
            .bind(to_json(&account.backup_code_hashes, "backup codes")?)
            .bind(account.last_login)
            .bind(to_json(&account.devices, "devices")?)
            .bind(to_json(&account.login_history, "login history")?)
            .bind(to_json(&account.notifications, "notifications")?)
            .bind(to_json(&account.preferences, "preferences")?)
            .execute(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to save account")
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        threshold: u32,
        lock_for: Duration,
    ) -> Result<LockStatus, StoreError> {
        // Increment and lock in one statement so concurrent failures cannot
        // stretch the attempt budget.
        let query = r"
            UPDATE accounts SET
                failed_login_attempts = failed_login_attempts + 1,
                lock_until = CASE
                    WHEN failed_login_attempts + 1 >= $2
                        THEN NOW() + ($3 * INTERVAL '1 second')
                    ELSE lock_until
                END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING failed_login_attempts, lock_until
        ";
        let row = sqlx::query(query)
            .bind(id)
            .bind(i64::from(threshold))
            .bind(lock_for.num_seconds())
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to record failed login")
            .map_err(backend)?
            .ok_or(StoreError::NotFound)?;

        let failed: i32 = row.try_get("failed_login_attempts").map_err(backend)?;
        let lock_until: Option<DateTime<Utc>> = row.try_get("lock_until").map_err(backend)?;
        Ok(LockStatus {
            failed_attempts: u32::try_from(failed).unwrap_or(0),
            lock_until,
        })
    }

    async fn reset_login_attempts(&self, id: Uuid) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts SET
                failed_login_attempts = 0,
                lock_until = NULL,
                updated_at = NOW()
            WHERE id = $1
        ";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to reset login attempts")
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_by_verification_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError> {
        let query = format!(
            r"
            SELECT {ACCOUNT_COLUMNS} FROM accounts
            WHERE verification_token_hash = $1
              AND verification_token_expires_at > NOW()
            "
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT"))
            .await
            .context("failed to lookup account by verification token")
            .map_err(backend)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn consume_verification_token(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Account>, StoreError> {
        // Consume-and-clear in one statement keeps the token single-use even
        // when two verification requests race.
        let query = format!(
            r"
            UPDATE accounts SET
                email_verified = TRUE,
                verification_token_hash = NULL,
                verification_token_expires_at = NULL,
                updated_at = NOW()
            WHERE verification_token_hash = $1
              AND verification_token_expires_at > NOW()
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to consume verification token")
            .map_err(backend)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn reset_password_by_token(
        &self,
        token_hash: &[u8],
        new_password_hash: &str,
    ) -> Result<Option<Account>, StoreError> {
        let query = format!(
            r"
            UPDATE accounts SET
                password_hash = $2,
                reset_token_hash = NULL,
                reset_token_expires_at = NULL,
                updated_at = NOW()
            WHERE reset_token_hash = $1
              AND reset_token_expires_at > NOW()
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(token_hash)
            .bind(new_password_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to reset password by token")
            .map_err(backend)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn consume_phone_code(&self, code: &str) -> Result<Option<Account>, StoreError> {
        let query = format!(
            r"
            UPDATE accounts SET
                phone_verified = TRUE,
                phone_code = NULL,
                phone_code_expires_at = NULL,
                updated_at = NOW()
            WHERE phone_code = $1
              AND phone_code_expires_at > NOW()
            RETURNING {ACCOUNT_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(code)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to consume phone code")
            .map_err(backend)?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn insert_session(
        &self,
        token_hash: &[u8],
        claims: &Identity,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO account_sessions (session_hash, account_id, claims, expires_at)
            VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
        ";
        sqlx::query(query)
            .bind(token_hash)
            .bind(claims.id)
            .bind(to_json(claims, "session claims")?)
            .bind(ttl.num_seconds())
            .execute(&self.pool)
            .instrument(query_span("INSERT"))
            .await
            .context("failed to insert session")
            .map_err(backend)?;
        Ok(())
    }

    async fn lookup_session(&self, token_hash: &[u8]) -> Result<Option<Identity>, StoreError> {
        let query = r"
            UPDATE account_sessions
            SET last_seen_at = NOW()
            WHERE session_hash = $1
              AND expires_at > NOW()
            RETURNING claims
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE"))
            .await
            .context("failed to lookup session")
            .map_err(backend)?;
        let Some(row) = row else {
            return Ok(None);
        };
        let claims: serde_json::Value = row.try_get("claims").map_err(backend)?;
        let claims = serde_json::from_value(claims)
            .context("malformed session claims")
            .map_err(backend)?;
        Ok(Some(claims))
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        // Logout is idempotent; zero deleted rows is fine.
        let query = "DELETE FROM account_sessions WHERE session_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE"))
            .await
            .context("failed to delete session")
            .map_err(backend)?;
        Ok(())
    }
}
