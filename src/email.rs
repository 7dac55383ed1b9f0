//! Outbound email port.
//!
//! Delivery is best-effort everywhere this service sends mail: the durable
//! record (account fields, notifications) is committed first and a failed
//! send is logged, never propagated. The default sender logs instead of
//! delivering, which is what local development wants.

use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
}

#[derive(Debug, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailError(pub String);

/// Email delivery abstraction.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or report a [`MailError`].
    fn send(&self, message: &EmailMessage) -> Result<(), MailError>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            "email send stub"
        );
        Ok(())
    }
}

/// Build the verification email around the frontend link.
#[must_use]
pub fn verification_email(to: &str, frontend_base_url: &str, token: &str) -> EmailMessage {
    let base = frontend_base_url.trim_end_matches('/');
    let url = format!("{base}/verify-email?token={token}");
    EmailMessage {
        to: to.to_string(),
        subject: "Verify your email address".to_string(),
        html_body: format!(
            "<div><h1>Email Verification</h1>\
             <p>Please click the link below to verify your email address:</p>\
             <a href=\"{url}\">Verify Email</a>\
             <p>This link will expire in 24 hours.</p></div>"
        ),
    }
}

/// Build the password-reset email around the frontend link.
#[must_use]
pub fn password_reset_email(to: &str, frontend_base_url: &str, token: &str) -> EmailMessage {
    let base = frontend_base_url.trim_end_matches('/');
    let url = format!("{base}/reset-password?token={token}");
    EmailMessage {
        to: to.to_string(),
        subject: "Reset your password".to_string(),
        html_body: format!(
            "<div><h1>Password Reset Request</h1>\
             <p>Please click the link below to reset your password:</p>\
             <a href=\"{url}\">Reset Password</a>\
             <p>This link will expire in 1 hour.</p>\
             <p>If you didn't request this, please ignore this email.</p></div>"
        ),
    }
}

/// Plain title/message wrapper used by the notification dispatcher.
#[must_use]
pub fn notification_email(to: &str, title: &str, message: &str) -> EmailMessage {
    EmailMessage {
        to: to.to_string(),
        subject: title.to_string(),
        html_body: format!("<div><h1>{title}</h1><p>{message}</p></div>"),
    }
}
