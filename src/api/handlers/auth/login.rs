//! Login endpoints: credentials and the OAuth completion hook.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::error;

use super::session::session_cookie;
use super::types::{ErrorResponse, LoginRequest, LoginResponse, OAuthSignInRequest};
use super::utils::{request_metadata, valid_email};
use crate::account::{Account, Identity, Provider};
use crate::auth::{self, session, AuthError, AuthState, Credentials, OAuthProfile};

/// Map a typed auth failure onto the externally visible response. Account
/// existence and bad passwords are indistinguishable here.
pub(super) fn error_response(err: &AuthError) -> axum::response::Response {
    let status = match err {
        AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        AuthError::AccountNotFound
        | AuthError::InvalidCredentials
        | AuthError::TwoFactorRequired
        | AuthError::InvalidTwoFactorCode => StatusCode::UNAUTHORIZED,
        AuthError::AccountUnverified | AuthError::AccountLocked => StatusCode::FORBIDDEN,
        AuthError::TokenExpiredOrInvalid => StatusCode::BAD_REQUEST,
        AuthError::Storage(inner) => {
            error!("auth flow storage failure: {inner}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: err.public_message().to_string(),
            code: err.code().to_string(),
        }),
    )
        .into_response()
}

/// Credentials login. On success the response carries the identity claims
/// and sets the session cookie.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = LoginResponse),
        (status = 401, description = "Invalid credentials or two-factor failure", body = ErrorResponse),
        (status = 403, description = "Unverified or locked account", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let email = Account::normalize_email(&request.email);
    if !valid_email(&email) {
        // Format failures share the generic message; they are not a probe
        // oracle either way.
        return error_response(&AuthError::InvalidCredentials);
    }

    let credentials = Credentials {
        email,
        password: request.password,
        totp_code: request.totp_code,
    };
    let metadata = request_metadata(&headers);

    match auth::login(&auth_state, &credentials, &metadata).await {
        Ok(identity) => issue_and_respond(&auth_state, identity).await,
        Err(err) => error_response(&err),
    }
}

/// Completion hook called by the OAuth gateway after code exchange. The
/// gateway has already verified the external identity.
#[utoipa::path(
    post,
    path = "/v1/auth/oauth",
    request_body = OAuthSignInRequest,
    responses(
        (status = 200, description = "Sign-in completed", body = LoginResponse),
        (status = 400, description = "Unknown provider", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn oauth(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<OAuthSignInRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let provider = match Provider::parse(&request.provider) {
        Some(provider) if provider != Provider::Credentials => provider,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Unknown identity provider".to_string(),
                    code: "unknown_provider".to_string(),
                }),
            )
                .into_response()
        }
    };

    let profile = OAuthProfile {
        provider,
        provider_id: request.provider_id,
        email: request.email,
        name: request.name,
        image: request.image,
    };

    match auth::oauth_sign_in(&auth_state, &profile).await {
        Ok(identity) => issue_and_respond(&auth_state, identity).await,
        Err(err) => error_response(&err),
    }
}

async fn issue_and_respond(auth_state: &AuthState, identity: Identity) -> axum::response::Response {
    let token = match session::issue(auth_state, &identity).await {
        Ok(token) => token,
        Err(err) => return error_response(&err),
    };

    let mut response_headers = HeaderMap::new();
    match session_cookie(auth_state, &token) {
        Ok(cookie) => {
            response_headers.insert(SET_COOKIE, cookie);
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    (
        StatusCode::OK,
        response_headers,
        Json(LoginResponse { identity }),
    )
        .into_response()
}
