//! Account model: identity, credentials, verification state, security
//! counters, devices, login history, and notifications.
//!
//! Accounts are plain data. Policy lives in free functions and services
//! (`lockout`, `device`, `auth`) that take an account plus a store handle, so
//! the security rules are testable without a live database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Admin,
    Moderator,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::Moderator => "moderator",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "moderator" => Some(Self::Moderator),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    #[default]
    Free,
    Premium,
    Enterprise,
}

impl Subscription {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "free" => Some(Self::Free),
            "premium" => Some(Self::Premium),
            "enterprise" => Some(Self::Enterprise),
            _ => None,
        }
    }
}

/// Identity provider that created or last touched the account.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Credentials,
    Google,
    Github,
}

impl Provider {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credentials => "credentials",
            Self::Google => "google",
            Self::Github => "github",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "credentials" => Some(Self::Credentials),
            "google" => Some(Self::Google),
            "github" => Some(Self::Github),
            _ => None,
        }
    }
}

/// A recognized client device, keyed in [`Account::devices`] by its stable
/// fingerprint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Device {
    pub id: String,
    pub device_type: String,
    pub browser: String,
    pub os: String,
    pub ip: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub last_active: DateTime<Utc>,
    #[serde(default)]
    pub is_current_device: bool,
}

/// Append-only login audit entry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LoginEvent {
    pub timestamp: DateTime<Utc>,
    pub ip: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub success: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Security,
    Info,
    Warning,
}

/// Server-created notification. Read/delete are the only client-initiated
/// mutations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Preferences {
    pub email_notifications: bool,
    pub login_alerts: bool,
    pub newsletter: bool,
    pub theme: Theme,
    pub remember_me: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            login_alerts: true,
            newsletter: false,
            theme: Theme::System,
            remember_me: false,
        }
    }
}

/// Root account entity, one per normalized email.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,

    /// PHC-format digest; absent for OAuth-only accounts. Never plaintext.
    pub password_hash: Option<String>,

    pub phone: Option<String>,
    pub phone_verified: bool,
    pub phone_code: Option<String>,
    pub phone_code_expires_at: Option<DateTime<Utc>>,

    pub email_verified: bool,
    pub verification_token_hash: Option<Vec<u8>>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    pub reset_token_hash: Option<Vec<u8>>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,

    pub role: Role,
    pub subscription: Subscription,
    pub provider: Provider,
    pub provider_id: Option<String>,

    pub two_factor_enabled: bool,
    pub totp_secret: Option<String>,
    pub backup_code_hashes: Vec<String>,

    pub last_login: Option<DateTime<Utc>>,
    pub failed_login_attempts: u32,
    pub lock_until: Option<DateTime<Utc>>,

    pub devices: BTreeMap<String, Device>,
    pub login_history: Vec<LoginEvent>,
    pub notifications: Vec<Notification>,
    pub preferences: Preferences,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted by [`crate::store::AccountStore::create`].
#[derive(Clone, Debug, Default)]
pub struct NewAccount {
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub password_hash: Option<String>,
    pub phone: Option<String>,
    pub email_verified: bool,
    pub verification_token_hash: Option<Vec<u8>>,
    pub verification_token_expires_at: Option<DateTime<Utc>>,
    pub provider: Provider,
    pub provider_id: Option<String>,
}

/// Minimal identity claims issued on a successful login. The orchestrator
/// returns these; session/token minting is the HTTP layer's job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
    pub subscription: Subscription,
    pub email_verified: bool,
}

impl From<&Account> for Identity {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            name: account.name.clone(),
            role: account.role,
            subscription: account.subscription,
            email_verified: account.email_verified,
        }
    }
}

/// Two-factor enrollment phase derived from the account fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TwoFactorState {
    Disabled,
    Pending,
    Enabled,
}

impl Account {
    /// Normalize an email for lookup/uniqueness checks.
    #[must_use]
    pub fn normalize_email(email: &str) -> String {
        email.trim().to_lowercase()
    }

    #[must_use]
    pub fn two_factor_state(&self) -> TwoFactorState {
        match (self.two_factor_enabled, self.totp_secret.as_deref()) {
            (true, _) => TwoFactorState::Enabled,
            (false, Some(_)) => TwoFactorState::Pending,
            (false, None) => TwoFactorState::Disabled,
        }
    }

    /// Stage a secret and backup-code hashes: `disabled -> pending`.
    pub fn stage_two_factor(&mut self, secret: String, backup_code_hashes: Vec<String>) {
        self.two_factor_enabled = false;
        self.totp_secret = Some(secret);
        self.backup_code_hashes = backup_code_hashes;
    }

    /// `pending -> enabled`. Returns false when no secret has been staged;
    /// enabled with no secret is an invalid state and is never produced here.
    pub fn enable_two_factor(&mut self) -> bool {
        if self.totp_secret.is_none() {
            return false;
        }
        self.two_factor_enabled = true;
        true
    }

    /// Explicit disable: clears the secret and backup codes together with the
    /// flag so no dangling secret survives.
    pub fn disable_two_factor(&mut self) {
        self.two_factor_enabled = false;
        self.totp_secret = None;
        self.backup_code_hashes.clear();
    }

    /// Whether the account is locked at `now` per the lockout policy.
    #[must_use]
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.is_some_and(|until| until > now)
    }
}
