//! Notification dispatcher.
//!
//! Notifications are the durable record of security-relevant events; email is
//! an optional, best-effort side channel gated on the account's preferences.
//! A mail failure is logged and never rolls back the appended notification.

use crate::account::{Account, Notification, NotificationKind};
use crate::email::{notification_email, EmailSender};
use crate::store::{AccountStore, StoreError};
use chrono::Utc;
use tracing::warn;
use ulid::Ulid;

/// Append a notification to the account, persist it, and attempt email
/// delivery when the account opted in.
///
/// # Errors
/// Only storage failures propagate; the notification is the durable side
/// effect and mail trouble must not fail the triggering operation.
pub async fn notify(
    store: &dyn AccountStore,
    mailer: &dyn EmailSender,
    account: &mut Account,
    kind: NotificationKind,
    title: &str,
    message: &str,
) -> Result<Notification, StoreError> {
    let notification = Notification {
        id: Ulid::new().to_string(),
        kind,
        title: title.to_string(),
        message: message.to_string(),
        read: false,
        created_at: Utc::now(),
    };
    account.notifications.push(notification.clone());
    store.save(account).await?;

    if account.preferences.email_notifications {
        let email = notification_email(&account.email, title, message);
        if let Err(err) = mailer.send(&email) {
            warn!(account_id = %account.id, "notification email failed: {err}");
        }
    }

    Ok(notification)
}

/// Mark one notification read. Returns false when the id is unknown.
pub async fn mark_read(
    store: &dyn AccountStore,
    account: &mut Account,
    notification_id: &str,
) -> Result<bool, StoreError> {
    let Some(notification) = account
        .notifications
        .iter_mut()
        .find(|notification| notification.id == notification_id)
    else {
        return Ok(false);
    };
    notification.read = true;
    store.save(account).await?;
    Ok(true)
}

/// Delete one notification. Returns false when the id is unknown.
pub async fn delete(
    store: &dyn AccountStore,
    account: &mut Account,
    notification_id: &str,
) -> Result<bool, StoreError> {
    let before = account.notifications.len();
    account
        .notifications
        .retain(|notification| notification.id != notification_id);
    if account.notifications.len() == before {
        return Ok(false);
    }
    store.save(account).await?;
    Ok(true)
}
