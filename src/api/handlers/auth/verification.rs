//! Email verification endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::login::error_response;
use super::types::{MessageResponse, ResendVerificationRequest, VerifyEmailRequest};
use super::utils::{extract_client_ip, valid_email};
use crate::account::Account;
use crate::auth::{verification, AuthState};
use crate::rate_limit::{RateLimitAction, RateLimitDecision};

/// Consume the emailed token and activate the account.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired token"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    // Volume throttle before any token work.
    if rate_limited(&headers, &auth_state) {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited").into_response();
    }

    match verification::verify_email(&auth_state, &request.token).await {
        Ok(_account) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Email verified successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Reissue a verification email. Always 204 to avoid account probing.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 204, description = "Resend accepted")
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let email = Account::normalize_email(&request.email);
    if !valid_email(&email) {
        // Invalid addresses also read as accepted.
        return StatusCode::NO_CONTENT.into_response();
    }
    if rate_limited(&headers, &auth_state) {
        return StatusCode::NO_CONTENT.into_response();
    }

    if let Err(err) = verification::resend_verification(&auth_state, &email).await {
        // Keep the response opaque; the failure is ours, not the caller's.
        error!("Failed to resend verification: {err}");
    }
    StatusCode::NO_CONTENT.into_response()
}

fn rate_limited(headers: &HeaderMap, auth_state: &AuthState) -> bool {
    let key = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    auth_state
        .rate_limiter()
        .consume(RateLimitAction::Api, &key)
        == RateLimitDecision::Limited
}
