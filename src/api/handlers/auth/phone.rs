//! Phone verification endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::login::error_response;
use super::types::{MessageResponse, ResendPhoneCodeRequest, VerifyPhoneRequest};
use super::utils::extract_client_ip;
use crate::auth::{phone, AuthState};
use crate::rate_limit::{RateLimitAction, RateLimitDecision};

/// Issue (or reissue) the SMS verification code.
#[utoipa::path(
    post,
    path = "/v1/auth/resend-phone-code",
    request_body = ResendPhoneCodeRequest,
    responses(
        (status = 200, description = "Verification code sent", body = MessageResponse),
        (status = 400, description = "Invalid or expired token"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn resend_phone_code(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResendPhoneCodeRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if rate_limited(&headers, &auth_state) {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited").into_response();
    }

    match phone::request_code(&auth_state, &request.token).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Verification code sent successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

/// Consume the 6-digit code and mark the phone verified.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-phone",
    request_body = VerifyPhoneRequest,
    responses(
        (status = 200, description = "Phone verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired code"),
        (status = 429, description = "Rate limited")
    ),
    tag = "auth"
)]
pub async fn verify_phone(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<VerifyPhoneRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };
    if rate_limited(&headers, &auth_state) {
        return (StatusCode::TOO_MANY_REQUESTS, "Rate limited").into_response();
    }

    match phone::verify_phone(&auth_state, &request.code).await {
        Ok(_account) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Phone number verified successfully".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

fn rate_limited(headers: &HeaderMap, auth_state: &AuthState) -> bool {
    let key = extract_client_ip(headers).unwrap_or_else(|| "unknown".to_string());
    auth_state
        .rate_limiter()
        .consume(RateLimitAction::Api, &key)
        == RateLimitDecision::Limited
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
    async fn unknown_code_is_rejected() {
        let response = verify_phone(
            HeaderMap::new(),
            Extension(auth_state()),
            Some(Json(VerifyPhoneRequest {
                code: "123456".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn resend_requires_a_valid_token() {
        let response = resend_phone_code(
            HeaderMap::new(),
            Extension(auth_state()),
            Some(Json(ResendPhoneCodeRequest {
                token: "bogus".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
