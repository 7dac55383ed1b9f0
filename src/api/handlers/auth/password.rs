//! Password recovery and change endpoints.

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
use super::types::{
    ChangePasswordRequest, ErrorResponse, ForgotPasswordRequest, MessageResponse,
    ResetPasswordRequest,
};
use super::utils::valid_email;
use crate::account::Account;
use crate::auth::{recovery, AuthError, AuthState};
use crate::password::MIN_PASSWORD_LEN;
use crate::store::AccountStore;
use secrecy::ExposeSecret;

/// Request a password-reset link. Responds identically whether or not the
/// account exists.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email queued if the account exists", body = MessageResponse),
        (status = 429, description = "Rate limited", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let accepted = (
        StatusCode::OK,
        Json(MessageResponse {
            message: "If an account exists for that address, a reset email has been sent"
                .to_string(),
        }),
    )
        .into_response();

    let email = Account::normalize_email(&request.email);
    if !valid_email(&email) {
        return accepted;
    }

    match recovery::forgot_password(&auth_state, &email).await {
        // Unknown accounts read the same as known ones.
        Ok(()) | Err(AuthError::AccountNotFound) => accepted,
        Err(err @ AuthError::RateLimited) => error_response(&err),
        Err(err) => {
            error!("Forgot-password failed: {err}");
            accepted
        }
    }
}

/// Consume a reset token and set the new password.
#[utoipa::path(
    post,
    path = "/v1/auth/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired token", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if request.password.expose_secret().len() < MIN_PASSWORD_LEN {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Password must be at least 8 characters long".to_string(),
                code: "invalid_request".to_string(),
            }),
        )
            .into_response();
    }

    match recovery::reset_password(&auth_state, &request.token, &request.password).await {
        Ok(_account) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password reset successful".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Authenticated password change.
#[utoipa::path(
    post,
    path = "/v1/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Current password incorrect", body = ErrorResponse),
        (status = 401, description = "Unauthorized")
    ),
    tag = "auth"
)]
pub async fn change_password(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ChangePasswordRequest>>,
) -> axum::response::Response {
    let identity = match require_auth(&headers, &auth_state).await {
        Ok(identity) => identity,
        Err(status) => return status.into_response(),
    };
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if request.new_password.expose_secret().len() < MIN_PASSWORD_LEN {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Password must be at least 8 characters long".to_string(),
                code: "invalid_request".to_string(),
            }),
        )
            .into_response();
    }

    let mut account = match auth_state.store().find_by_id(identity.id).await {
        Ok(Some(account)) => account,
        Ok(None) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Failed to load account: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match recovery::change_password(
        &auth_state,
        &mut account,
        &request.current_password,
        &request.new_password,
    )
    .await
    {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Password updated successfully".to_string(),
            }),
        )
            .into_response(),
        Err(AuthError::InvalidCredentials) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "Current password is incorrect".to_string(),
                code: "invalid_credentials".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}
