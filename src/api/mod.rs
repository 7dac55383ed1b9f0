//! HTTP server wiring: database pool, dependency-injected auth context,
//! tower layers, and route registration.

use crate::auth::{AuthConfig, AuthState};
use crate::email::LogEmailSender;
use crate::rate_limit::FixedWindowLimiter;
use crate::store::postgres::PgStore;
use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{delete, get, patch, post},
    Extension, Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub(crate) mod handlers;
mod openapi;

pub use openapi::ApiDoc;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Start the server.
///
/// # Errors
/// Returns an error when the database is unreachable, the frontend origin is
/// invalid, or the listener cannot bind.
pub async fn new(port: u16, dsn: String, auth_config: AuthConfig) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    // One instance of each stateful collaborator, built here and injected;
    // nothing module-level.
    let frontend_origin = frontend_origin(auth_config.frontend_base_url())?;
    let auth_state = Arc::new(AuthState::new(
        auth_config,
        Arc::new(PgStore::new(pool.clone())),
        Arc::new(FixedWindowLimiter::new()),
        Arc::new(LogEmailSender),
    ));

    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let app = router()
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(auth_state))
                .layer(Extension(pool)),
        );

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

/// All routes; extensions are layered by the caller.
fn router() -> Router {
    use handlers::{admin, auth, health, me, root};

    Router::new()
        .route("/", get(root::root))
        .route("/health", get(health::health).options(health::health))
        .route("/v1/auth/register", post(auth::register::register))
        .route("/v1/auth/login", post(auth::login::login))
        .route("/v1/auth/oauth", post(auth::login::oauth))
        .route("/v1/auth/session", get(auth::session::session))
        .route("/v1/auth/logout", post(auth::session::logout))
        .route("/v1/auth/verify-email", post(auth::verification::verify_email))
        .route(
            "/v1/auth/resend-verification",
            post(auth::verification::resend_verification),
        )
        .route(
            "/v1/auth/forgot-password",
            post(auth::password::forgot_password),
        )
        .route(
            "/v1/auth/reset-password",
            post(auth::password::reset_password),
        )
        .route(
            "/v1/auth/change-password",
            post(auth::password::change_password),
        )
        .route("/v1/auth/verify-phone", post(auth::phone::verify_phone))
        .route(
            "/v1/auth/resend-phone-code",
            post(auth::phone::resend_phone_code),
        )
        .route("/v1/auth/2fa/setup", post(auth::twofa::setup))
        .route("/v1/auth/2fa/verify", post(auth::twofa::verify))
        .route("/v1/auth/2fa/disable", post(auth::twofa::disable))
        .route("/v1/auth/2fa/status", get(auth::twofa::status))
        .route("/v1/me", get(me::profile))
        .route("/v1/me/notifications", get(me::list_notifications))
        .route(
            "/v1/me/notifications/:id/read",
            post(me::mark_notification_read),
        )
        .route("/v1/me/notifications/:id", delete(me::delete_notification))
        .route("/v1/admin/users", get(admin::list_users))
        .route("/v1/admin/users/:id/role", patch(admin::set_role))
        .route(
            "/v1/admin/users/:id/subscription",
            patch(admin::set_subscription),
        )
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
