//! Account self-service endpoints: profile projection and notifications.
//!
//! Notifications are server-created; read and delete are the only mutations a
//! client may perform here.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::auth::session::require_auth;
use crate::account::{Account, Device, Notification};
use crate::auth::AuthState;
use crate::notify;
use crate::store::AccountStore;

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub subscription: String,
    pub email_verified: bool,
    pub phone_verified: bool,
    pub two_factor_enabled: bool,
    pub devices: Vec<Device>,
    pub last_login: Option<String>,
}

/// Profile projection for the dashboard.
#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Account profile", body = ProfileResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "me"
)]
pub async fn profile(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };
    let response = ProfileResponse {
        id: account.id.to_string(),
        email: account.email.clone(),
        name: account.name.clone(),
        role: account.role.as_str().to_string(),
        subscription: account.subscription.as_str().to_string(),
        email_verified: account.email_verified,
        phone_verified: account.phone_verified,
        two_factor_enabled: account.two_factor_enabled,
        devices: account.devices.values().cloned().collect(),
        last_login: account.last_login.map(|at| at.to_rfc3339()),
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// List notifications, newest first.
#[utoipa::path(
    get,
    path = "/v1/me/notifications",
    responses(
        (status = 200, description = "Notifications", body = [Notification]),
        (status = 401, description = "Unauthorized")
    ),
    tag = "me"
)]
pub async fn list_notifications(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };
    let mut notifications = account.notifications;
    notifications.reverse();
    (StatusCode::OK, Json(notifications)).into_response()
}

/// Mark one notification read.
#[utoipa::path(
    post,
    path = "/v1/me/notifications/{id}/read",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Marked read"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown notification")
    ),
    tag = "me"
)]
pub async fn mark_notification_read(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let mut account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };
    match notify::mark_read(auth_state.store(), &mut account, &id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to mark notification read: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Delete one notification.
#[utoipa::path(
    delete,
    path = "/v1/me/notifications/{id}",
    params(("id" = String, Path, description = "Notification id")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Unknown notification")
    ),
    tag = "me"
)]
pub async fn delete_notification(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let mut account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };
    match notify::delete(auth_state.store(), &mut account, &id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            error!("Failed to delete notification: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn load_account(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<Account, axum::response::Response> {
    let identity = require_auth(headers, auth_state)
        .await
        .map_err(IntoResponse::into_response)?;
    match auth_state.store().find_by_id(identity.id).await {
        Ok(Some(account)) => Ok(account),
        Ok(None) => Err(StatusCode::UNAUTHORIZED.into_response()),
        Err(err) => {
            error!("Failed to load account: {err}");
            Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::email::LogEmailSender;
    use crate::rate_limit::NoopRateLimiter;
    use crate::store::memory::MemoryStore;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("https://app.custodia.test".to_string()),
            Arc::new(MemoryStore::new()),
            Arc::new(NoopRateLimiter),
            Arc::new(LogEmailSender),
        ))
    }

    #[tokio::test]
    async fn endpoints_require_a_session() {
        let state = auth_state();
        let response = profile(HeaderMap::new(), Extension(Arc::clone(&state)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = list_notifications(HeaderMap::new(), Extension(state))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
