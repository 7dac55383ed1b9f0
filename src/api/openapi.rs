//! OpenAPI document for the HTTP surface.
//!
//! Add new endpoints to `paths(...)` so they are documented alongside the
//! routes registered in `api::new`.

use crate::account::{
    Device, Identity, LoginEvent, Notification, NotificationKind, Role, Subscription,
    TwoFactorState,
};
use crate::api::handlers::{admin, auth, health, me};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::register::register,
        auth::login::login,
        auth::login::oauth,
        auth::session::session,
        auth::session::logout,
        auth::verification::verify_email,
        auth::verification::resend_verification,
        auth::password::forgot_password,
        auth::password::reset_password,
        auth::password::change_password,
        auth::phone::verify_phone,
        auth::phone::resend_phone_code,
        auth::twofa::setup,
        auth::twofa::verify,
        auth::twofa::disable,
        auth::twofa::status,
        me::profile,
        me::list_notifications,
        me::mark_notification_read,
        me::delete_notification,
        admin::list_users,
        admin::set_role,
        admin::set_subscription,
    ),
    components(schemas(
        health::Health,
        auth::types::ErrorResponse,
        auth::types::MessageResponse,
        auth::types::RegisterRequest,
        auth::types::LoginRequest,
        auth::types::LoginResponse,
        auth::types::OAuthSignInRequest,
        auth::types::VerifyEmailRequest,
        auth::types::ResendVerificationRequest,
        auth::types::ForgotPasswordRequest,
        auth::types::ResetPasswordRequest,
        auth::types::ChangePasswordRequest,
        auth::types::VerifyPhoneRequest,
        auth::types::ResendPhoneCodeRequest,
        auth::types::TwoFactorSetupResponse,
        auth::types::TwoFactorVerifyRequest,
        auth::types::TwoFactorStatusResponse,
        me::ProfileResponse,
        admin::AdminUserSummary,
        admin::RoleRequest,
        admin::SubscriptionRequest,
        admin::RoleResponse,
        admin::SubscriptionResponse,
        Identity,
        Role,
        Subscription,
        Device,
        LoginEvent,
        Notification,
        NotificationKind,
        TwoFactorState,
    )),
    tags(
        (name = "auth", description = "Authentication, verification, and two-factor flows"),
        (name = "me", description = "Account self-service"),
        (name = "admin", description = "Dashboard mutations"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_documents_the_core_routes() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/health",
            "/v1/auth/register",
            "/v1/auth/login",
            "/v1/auth/session",
            "/v1/auth/2fa/setup",
            "/v1/admin/users/{id}/role",
        ] {
            assert!(
                paths.iter().any(|path| *path == expected),
                "missing documented path {expected}"
            );
        }
    }
}
