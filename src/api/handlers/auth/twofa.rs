//! Two-factor endpoints: setup, verify-and-enable, disable, status.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::login::error_response;
use super::session::require_auth;
use super::types::{TwoFactorSetupResponse, TwoFactorStatusResponse, TwoFactorVerifyRequest};
use crate::account::Account;
use crate::auth::{twofa, AuthState};
use crate::store::AccountStore;

/// Stage a fresh secret; returns the QR/URI and the one-time backup codes.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/setup",
    responses(
        (status = 200, description = "Enrollment material", body = TwoFactorSetupResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth"
)]
pub async fn setup(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let mut account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };

    match twofa::setup(&auth_state, &mut account).await {
        Ok(enrollment) => (
            StatusCode::OK,
            Json(TwoFactorSetupResponse {
                secret: enrollment.secret,
                provisioning_uri: enrollment.provisioning_uri,
                qr_code_url: enrollment.qr_code_data_url,
                backup_codes: enrollment.backup_codes,
            }),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to start 2FA setup: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Verify the first code and enable two-factor.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/verify",
    request_body = TwoFactorVerifyRequest,
    responses(
        (status = 204, description = "Two-factor enabled"),
        (status = 401, description = "Unauthorized or invalid code"),
        (status = 429, description = "Too many attempts")
    ),
    tag = "auth"
)]
pub async fn verify(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<TwoFactorVerifyRequest>>,
) -> axum::response::Response {
    let mut account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    match twofa::verify_and_enable(&auth_state, &mut account, &request.code).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

/// Disable two-factor; clears secret and backup codes together.
#[utoipa::path(
    post,
    path = "/v1/auth/2fa/disable",
    responses(
        (status = 204, description = "Two-factor disabled"),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth"
)]
pub async fn disable(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let mut account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };

    match twofa::disable(&auth_state, &mut account).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

/// Current enrollment phase plus remaining backup codes.
#[utoipa::path(
    get,
    path = "/v1/auth/2fa/status",
    responses(
        (status = 200, description = "Two-factor status", body = TwoFactorStatusResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth"
)]
pub async fn status(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> axum::response::Response {
    let account = match load_account(&headers, &auth_state).await {
        Ok(account) => account,
        Err(response) => return response,
    };
    (
        StatusCode::OK,
        Json(TwoFactorStatusResponse {
            state: twofa::status(&account),
            backup_codes_remaining: account.backup_code_hashes.len(),
        }),
    )
        .into_response()
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
