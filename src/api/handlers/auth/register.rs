//! Registration endpoint.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::error;

use super::types::{ErrorResponse, MessageResponse, RegisterRequest};
use super::utils::valid_email;
use crate::account::Account;
use crate::auth::register::{register as register_account, Registration};
use crate::auth::{AuthError, AuthState};
use crate::password::MIN_PASSWORD_LEN;
use crate::store::StoreError;

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created, verification email queued", body = MessageResponse),
        (status = 400, description = "Invalid input or email already registered", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> axum::response::Response {
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload").into_response();
    };

    let email = Account::normalize_email(&request.email);
    if !valid_email(&email) {
        return bad_request("Please provide a valid email address");
    }
    if request.password.expose_secret().len() < MIN_PASSWORD_LEN {
        return bad_request("Password must be at least 8 characters long");
    }

    let registration = Registration {
        email,
        password: request.password,
        name: request.name,
        phone: request.phone,
    };

    match register_account(&auth_state, &registration).await {
        Ok(_account) => (
            StatusCode::CREATED,
            Json(MessageResponse {
                message:
                    "Registration successful. Please check your email to verify your account."
                        .to_string(),
            }),
        )
            .into_response(),
        Err(AuthError::Storage(StoreError::DuplicateEmail)) => {
            bad_request("Email already registered")
        }
        Err(err) => {
            error!("Registration failed: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Registration failed".to_string(),
                    code: "internal_error".to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn bad_request(message: &str) -> axum::response::Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.to_string(),
            code: "invalid_request".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthConfig;
    use crate::email::LogEmailSender;
    use crate::rate_limit::NoopRateLimiter;
    use crate::store::memory::MemoryStore;
    use secrecy::SecretString;

    fn auth_state() -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("https://app.custodia.test".to_string()),
            Arc::new(MemoryStore::new()),
            Arc::new(NoopRateLimiter),
            Arc::new(LogEmailSender),
        ))
    }

    fn request(email: &str, password: &str) -> Json<RegisterRequest> {
        Json(RegisterRequest {
            email: email.to_string(),
            password: SecretString::from(password.to_string()),
            name: None,
            phone: None,
        })
    }

    #[tokio::test]
    async fn register_creates_and_rejects_duplicates() {
        let state = auth_state();
        let response = register(Extension(Arc::clone(&state)), Some(request("a@x.com", "Secret123!")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = register(Extension(state), Some(request("a@x.com", "Secret123!")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn register_validates_input() {
        let state = auth_state();
        let response = register(Extension(Arc::clone(&state)), None).await.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = register(Extension(Arc::clone(&state)), Some(request("bad", "Secret123!")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = register(Extension(state), Some(request("a@x.com", "short")))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
