//! Auth configuration and the dependency-injected runtime context.
//!
//! One `AuthState` is built at startup and passed to every flow; there is no
//! module-level shared state. Tests swap in the memory store, a noop limiter,
//! or a recording mailer without touching global anything.

use crate::email::EmailSender;
use crate::rate_limit::RateLimiter;
use crate::store::AccountStore;
use crate::totp::TotpEngine;
use std::sync::Arc;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_TOTP_ISSUER: &str = "custodia";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    totp_issuer: String,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    /// Cookies are marked Secure only when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

/// Explicitly constructed context holding one instance of each stateful
/// collaborator: store handle, rate limiter, mailer, TOTP engine.
pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn AccountStore>,
    rate_limiter: Arc<dyn RateLimiter>,
    mailer: Arc<dyn EmailSender>,
    totp: TotpEngine,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn AccountStore>,
        rate_limiter: Arc<dyn RateLimiter>,
        mailer: Arc<dyn EmailSender>,
    ) -> Self {
        let totp = TotpEngine::new(config.totp_issuer().to_string());
        Self {
            config,
            store,
            rate_limiter,
            mailer,
            totp,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn AccountStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn EmailSender {
        self.mailer.as_ref()
    }

    #[must_use]
    pub fn totp(&self) -> &TotpEngine {
        &self.totp
    }
}
