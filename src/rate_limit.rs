//! Rate limiting primitives for auth flows.
//!
//! Fixed-window point buckets keyed by (action, caller key). Consumption and
//! the limit check happen under one lock, so concurrent requests cannot
//! double-spend the last point. This throttle is independent of the account
//! lockout policy; both apply on the login path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum RateLimitAction {
    Login,
    Api,
    PasswordReset,
    TotpVerify,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    /// Consume one point; returns `Limited` once the bucket is exhausted for
    /// the remainder of its window. Never blocks.
    fn consume(&self, action: RateLimitAction, key: &str) -> RateLimitDecision;

    /// Clear a bucket early. Not invoked after successful logins; failed-login
    /// forgiveness is the lockout policy's business.
    fn reset(&self, action: RateLimitAction, key: &str);
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn consume(&self, _action: RateLimitAction, _key: &str) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn reset(&self, _action: RateLimitAction, _key: &str) {}
}

#[derive(Clone, Copy, Debug)]
struct Budget {
    points: u32,
    window: Duration,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// In-process fixed-window limiter.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    budgets: HashMap<RateLimitAction, Budget>,
    windows: Mutex<HashMap<(RateLimitAction, String), Window>>,
}

impl FixedWindowLimiter {
    /// Default budgets: login 5/15 min, api 100/60 s, password-reset 3/60 min,
    /// totp-verify 3/5 min.
    #[must_use]
    pub fn new() -> Self {
        let mut budgets = HashMap::new();
        budgets.insert(
            RateLimitAction::Login,
            Budget {
                points: 5,
                window: Duration::from_secs(15 * 60),
            },
        );
        budgets.insert(
            RateLimitAction::Api,
            Budget {
                points: 100,
                window: Duration::from_secs(60),
            },
        );
        budgets.insert(
            RateLimitAction::PasswordReset,
            Budget {
                points: 3,
                window: Duration::from_secs(60 * 60),
            },
        );
        budgets.insert(
            RateLimitAction::TotpVerify,
            Budget {
                points: 3,
                window: Duration::from_secs(5 * 60),
            },
        );
        Self {
            budgets,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Override one bucket's budget (tests and tuning).
    #[must_use]
    pub fn with_budget(mut self, action: RateLimitAction, points: u32, window: Duration) -> Self {
        self.budgets.insert(action, Budget { points, window });
        self
    }
}

impl Default for FixedWindowLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter for FixedWindowLimiter {
    fn consume(&self, action: RateLimitAction, key: &str) -> RateLimitDecision {
        let Some(budget) = self.budgets.get(&action).copied() else {
            return RateLimitDecision::Allowed;
        };

        let now = Instant::now();
        // Keep serving on a poisoned lock; the window map stays usable.
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());

        let entry = windows
            .entry((action, key.to_string()))
            .or_insert(Window {
                started: now,
                count: 0,
            });

        if now.duration_since(entry.started) >= budget.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= budget.points {
            return RateLimitDecision::Limited;
        }
        entry.count += 1;
        RateLimitDecision::Allowed
    }

    fn reset(&self, action: RateLimitAction, key: &str) {
        let mut windows = self
            .windows
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        windows.remove(&(action, key.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn noop_rate_limiter_allows() {
        let limiter = NoopRateLimiter;
        assert_eq!(
            limiter.consume(RateLimitAction::Login, "1.2.3.4"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn budget_exhausts_on_the_next_consumption() {
        let limiter = FixedWindowLimiter::new();
        for _ in 0..5 {
            assert_eq!(
                limiter.consume(RateLimitAction::Login, "1.2.3.4"),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            limiter.consume(RateLimitAction::Login, "1.2.3.4"),
            RateLimitDecision::Limited
        );
        // Other keys and buckets are unaffected.
        assert_eq!(
            limiter.consume(RateLimitAction::Login, "5.6.7.8"),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.consume(RateLimitAction::TotpVerify, "1.2.3.4"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn window_expiry_refills_the_bucket() {
        let limiter = FixedWindowLimiter::new().with_budget(
            RateLimitAction::Login,
            2,
            Duration::from_millis(40),
        );
        assert_eq!(
            limiter.consume(RateLimitAction::Login, "k"),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.consume(RateLimitAction::Login, "k"),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.consume(RateLimitAction::Login, "k"),
            RateLimitDecision::Limited
        );
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(
            limiter.consume(RateLimitAction::Login, "k"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn reset_clears_a_bucket_early() {
        let limiter = FixedWindowLimiter::new().with_budget(
            RateLimitAction::PasswordReset,
            1,
            Duration::from_secs(3600),
        );
        assert_eq!(
            limiter.consume(RateLimitAction::PasswordReset, "a@example.com"),
            RateLimitDecision::Allowed
        );
        assert_eq!(
            limiter.consume(RateLimitAction::PasswordReset, "a@example.com"),
            RateLimitDecision::Limited
        );
        limiter.reset(RateLimitAction::PasswordReset, "a@example.com");
        assert_eq!(
            limiter.consume(RateLimitAction::PasswordReset, "a@example.com"),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn no_over_admission_under_concurrency() {
        let limiter = Arc::new(FixedWindowLimiter::new().with_budget(
            RateLimitAction::Login,
            50,
            Duration::from_secs(3600),
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = Arc::clone(&limiter);
            handles.push(std::thread::spawn(move || {
                let mut allowed = 0u32;
                for _ in 0..25 {
                    if limiter.consume(RateLimitAction::Login, "shared") == RateLimitDecision::Allowed
                    {
                        allowed += 1;
                    }
                }
                allowed
            }));
        }

        let total: u32 = handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked"))
            .sum();
        assert_eq!(total, 50);
    }
}
