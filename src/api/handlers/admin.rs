//! Admin dashboard endpoints: user listing and role/subscription mutations.

use axum::{
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use super::auth::session::require_auth;
use crate::account::{Identity, Role, Subscription};
use crate::admin::{self, AdminError};
use crate::auth::AuthState;
use crate::store::AccountStore;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserSummary {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub subscription: String,
    pub email_verified: bool,
    pub two_factor_enabled: bool,
    pub failed_login_attempts: u32,
    pub locked: bool,
    pub last_login: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct SubscriptionRequest {
    pub subscription: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleResponse {
    pub message: String,
    pub role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubscriptionResponse {
    pub message: String,
    pub subscription: String,
}

/// List accounts for the dashboard, newest first.
#[utoipa::path(
    get,
    path = "/v1/admin/users",
    responses(
        (status = 200, description = "Accounts", body = [AdminUserSummary]),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required")
    ),
    tag = "admin"
)]
pub async fn list_users(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let _admin = match require_admin(&headers, &auth_state).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };

    match auth_state.store().list_accounts().await {
        Ok(accounts) => {
            let now = chrono::Utc::now();
            let summaries: Vec<AdminUserSummary> = accounts
                .iter()
                .map(|account| AdminUserSummary {
                    id: account.id.to_string(),
                    email: account.email.clone(),
                    name: account.name.clone(),
                    role: account.role.as_str().to_string(),
                    subscription: account.subscription.as_str().to_string(),
                    email_verified: account.email_verified,
                    two_factor_enabled: account.two_factor_enabled,
                    failed_login_attempts: account.failed_login_attempts,
                    locked: account.is_locked(now),
                    last_login: account.last_login.map(|at| at.to_rfc3339()),
                    created_at: account.created_at.to_rfc3339(),
                })
                .collect();
            (StatusCode::OK, Json(summaries)).into_response()
        }
        Err(err) => {
            error!("Failed to list accounts: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Change a user's role. Self-modification is refused.
#[utoipa::path(
    patch,
    path = "/v1/admin/users/{id}/role",
    params(("id" = String, Path, description = "Target account id")),
    request_body = RoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleResponse),
        (status = 400, description = "Invalid role or self-modification"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Unknown account")
    ),
    tag = "admin"
)]
pub async fn set_role(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RoleRequest>>,
) -> axum::response::Response {
    let actor = match require_admin(&headers, &auth_state).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let Some(target_id) = parse_id(&id) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    let Some(role) = Role::parse(&request.role) else {
        return (StatusCode::BAD_REQUEST, "Unknown role").into_response();
    };

    match admin::set_role(&auth_state, &actor, target_id, role).await {
        Ok(role) => (
            StatusCode::OK,
            Json(RoleResponse {
                message: "Role updated successfully".to_string(),
                role: role.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(err) => admin_error_response(&err),
    }
}

/// Change a user's subscription tier.
#[utoipa::path(
    patch,
    path = "/v1/admin/users/{id}/subscription",
    params(("id" = String, Path, description = "Target account id")),
    request_body = SubscriptionRequest,
    responses(
        (status = 200, description = "Subscription updated", body = SubscriptionResponse),
        (status = 400, description = "Invalid subscription"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "Unknown account")
    ),
    tag = "admin"
)]
pub async fn set_subscription(
    Path(id): Path<String>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<SubscriptionRequest>>,
) -> axum::response::Response {
    let actor = match require_admin(&headers, &auth_state).await {
        Ok(identity) => identity,
        Err(response) => return response,
    };
    let Some(target_id) = parse_id(&id) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    let Some(subscription) = Subscription::parse(&request.subscription) else {
        return (StatusCode::BAD_REQUEST, "Unknown subscription").into_response();
    };

    match admin::set_subscription(&auth_state, &actor, target_id, subscription).await {
        Ok(subscription) => (
            StatusCode::OK,
            Json(SubscriptionResponse {
                message: "Subscription updated successfully".to_string(),
                subscription: subscription.as_str().to_string(),
            }),
        )
            .into_response(),
        Err(err) => admin_error_response(&err),
    }
}

fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id.trim()).ok()
}

fn admin_error_response(err: &AdminError) -> axum::response::Response {
    match err {
        AdminError::Forbidden => StatusCode::FORBIDDEN.into_response(),
        AdminError::SelfModification => {
            (StatusCode::BAD_REQUEST, "Cannot modify your own role").into_response()
        }
        AdminError::TargetNotFound => StatusCode::NOT_FOUND.into_response(),
        AdminError::Storage(inner) => {
            error!("admin mutation storage failure: {inner}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Session plus admin role, or the error response to return.
async fn require_admin(
    headers: &HeaderMap,
    auth_state: &AuthState,
) -> Result<Identity, axum::response::Response> {
    let identity = require_auth(headers, auth_state)
        .await
        .map_err(IntoResponse::into_response)?;
    if identity.role != Role::Admin {
        return Err(StatusCode::FORBIDDEN.into_response());
    }
    Ok(identity)
}
