//! Device fingerprinting and login-history bookkeeping.
//!
//! `parse` is the pure collaborator that normalizes raw client signals;
//! unknown fields come back as "unknown" and it never fails. Devices are
//! keyed by a stable fingerprint derived from (browser, os), so repeated
//! logins from the same client merge into one record instead of accumulating
//! duplicates.

use crate::account::{Account, Device, LoginEvent};
use chrono::{DateTime, Utc};

pub const UNKNOWN: &str = "unknown";

/// Raw request signals carried into the login flow by the HTTP layer.
/// `location` is best-effort, resolved upstream (CDN geo headers).
#[derive(Clone, Debug, Default)]
pub struct RequestMetadata {
    pub ip: String,
    pub user_agent: String,
    pub location: Option<String>,
}

/// Normalized client signals.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSignals {
    pub device_type: String,
    pub browser: String,
    pub os: String,
}

/// Normalize a user agent and IP into device signals. Pure; unknown inputs
/// degrade to the `unknown` sentinel.
#[must_use]
pub fn parse(user_agent: &str, _ip: &str) -> DeviceSignals {
    let ua = user_agent.to_ascii_lowercase();

    let browser = if ua.contains("edg/") || ua.contains("edge/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("firefox/") {
        "Firefox"
    } else if ua.contains("chrome/") || ua.contains("crios/") {
        "Chrome"
    } else if ua.contains("safari/") {
        "Safari"
    } else if ua.contains("curl/") {
        "curl"
    } else {
        UNKNOWN
    };

    let os = if ua.contains("windows") {
        "Windows"
    } else if ua.contains("iphone") || ua.contains("ipad") {
        "iOS"
    } else if ua.contains("mac os x") || ua.contains("macintosh") {
        "macOS"
    } else if ua.contains("android") {
        "Android"
    } else if ua.contains("linux") {
        "Linux"
    } else {
        UNKNOWN
    };

    let device_type = if ua.contains("ipad") || ua.contains("tablet") {
        "tablet"
    } else if ua.contains("mobile") || ua.contains("iphone") || ua.contains("android") {
        "mobile"
    } else {
        "desktop"
    };

    DeviceSignals {
        device_type: device_type.to_string(),
        browser: browser.to_string(),
        os: os.to_string(),
    }
}

/// Stable device id: same browser/OS pair, same fingerprint.
#[must_use]
pub fn fingerprint(signals: &DeviceSignals) -> String {
    format!("{}-{}", signals.browser, signals.os).to_lowercase()
}

/// Outcome of merging a login into the account's device list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedLogin {
    pub new_device: bool,
}

/// Merge a successful login into the device map and append the history
/// entry. The caller persists the account afterwards, so devices and history
/// land in one update.
pub fn record_success(
    account: &mut Account,
    metadata: &RequestMetadata,
    now: DateTime<Utc>,
) -> RecordedLogin {
    let signals = parse(&metadata.user_agent, &metadata.ip);
    let id = fingerprint(&signals);

    let new_device = !account.devices.contains_key(&id);
    for device in account.devices.values_mut() {
        device.is_current_device = false;
    }
    let entry = account.devices.entry(id.clone()).or_insert_with(|| Device {
        id,
        device_type: signals.device_type.clone(),
        browser: signals.browser.clone(),
        os: signals.os.clone(),
        ip: metadata.ip.clone(),
        location: metadata.location.clone(),
        last_active: now,
        is_current_device: true,
    });
    entry.last_active = now;
    entry.ip = metadata.ip.clone();
    entry.location = metadata.location.clone();
    entry.is_current_device = true;

    account.last_login = Some(now);
    push_history(account, metadata, now, true);

    RecordedLogin { new_device }
}

/// Append a failed-attempt entry; no device bookkeeping for failures.
pub fn record_failure(account: &mut Account, metadata: &RequestMetadata, now: DateTime<Utc>) {
    push_history(account, metadata, now, false);
}

fn push_history(account: &mut Account, metadata: &RequestMetadata, now: DateTime<Utc>, success: bool) {
    account.login_history.push(LoginEvent {
        timestamp: now,
        ip: metadata.ip.clone(),
        user_agent: metadata.user_agent.clone(),
        location: metadata.location.clone(),
        success,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::{NewAccount, Preferences};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
    const FIREFOX_LINUX: &str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:115.0) Gecko/20100101 Firefox/115.0";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) \
                                 AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 \
                                 Mobile/15E148 Safari/604.1";

    fn account() -> Account {
        Account {
            id: Uuid::new_v4(),
            email: "a@example.com".to_string(),
            name: None,
            image: None,
            password_hash: None,
            phone: None,
            phone_verified: false,
            phone_code: None,
            phone_code_expires_at: None,
            email_verified: true,
            verification_token_hash: None,
            verification_token_expires_at: None,
            reset_token_hash: None,
            reset_token_expires_at: None,
            role: Default::default(),
            subscription: Default::default(),
            provider: Default::default(),
            provider_id: None,
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
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn metadata(user_agent: &str, ip: &str) -> RequestMetadata {
        RequestMetadata {
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            location: None,
        }
    }

    #[test]
    fn parse_recognizes_common_agents() {
        let signals = parse(CHROME_WIN, "1.2.3.4");
        assert_eq!(signals.browser, "Chrome");
        assert_eq!(signals.os, "Windows");
        assert_eq!(signals.device_type, "desktop");

        let signals = parse(FIREFOX_LINUX, "1.2.3.4");
        assert_eq!(signals.browser, "Firefox");
        assert_eq!(signals.os, "Linux");

        let signals = parse(SAFARI_IPHONE, "1.2.3.4");
        assert_eq!(signals.browser, "Safari");
        assert_eq!(signals.os, "iOS");
        assert_eq!(signals.device_type, "mobile");
    }

    #[test]
    fn parse_defaults_to_unknown() {
        let signals = parse("", "1.2.3.4");
        assert_eq!(signals.browser, UNKNOWN);
        assert_eq!(signals.os, UNKNOWN);
        assert_eq!(signals.device_type, "desktop");
    }

    #[test]
    fn fingerprint_is_stable_per_browser_os_pair() {
        let first = fingerprint(&parse(CHROME_WIN, "1.2.3.4"));
        let second = fingerprint(&parse(CHROME_WIN, "9.9.9.9"));
        assert_eq!(first, "chrome-windows");
        assert_eq!(first, second);
        assert_ne!(first, fingerprint(&parse(FIREFOX_LINUX, "1.2.3.4")));
    }

    #[test]
    fn repeat_logins_merge_into_one_device() {
        let mut account = account();
        let now = Utc::now();

        let first = record_success(&mut account, &metadata(CHROME_WIN, "1.2.3.4"), now);
        assert!(first.new_device);
        assert_eq!(account.devices.len(), 1);

        let later = now + chrono::Duration::hours(1);
        let second = record_success(&mut account, &metadata(CHROME_WIN, "5.6.7.8"), later);
        assert!(!second.new_device);
        assert_eq!(account.devices.len(), 1);

        let device = account.devices.get("chrome-windows").expect("device");
        assert_eq!(device.ip, "5.6.7.8");
        assert_eq!(device.last_active, later);
        assert_eq!(account.login_history.len(), 2);
        assert_eq!(account.last_login, Some(later));
    }

    #[test]
    fn exactly_one_current_device() {
        let mut account = account();
        let now = Utc::now();
        record_success(&mut account, &metadata(CHROME_WIN, "1.2.3.4"), now);
        record_success(&mut account, &metadata(FIREFOX_LINUX, "1.2.3.4"), now);

        let current: Vec<_> = account
            .devices
            .values()
            .filter(|device| device.is_current_device)
            .collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].id, "firefox-linux");
    }

    #[test]
    fn failures_append_history_without_devices() {
        let mut account = account();
        record_failure(&mut account, &metadata(CHROME_WIN, "1.2.3.4"), Utc::now());
        assert!(account.devices.is_empty());
        assert_eq!(account.login_history.len(), 1);
        assert!(!account.login_history[0].success);
        assert_eq!(account.login_history[0].user_agent, CHROME_WIN);
    }
}
