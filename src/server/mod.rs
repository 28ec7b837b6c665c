pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limiter;
pub mod types;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, StatusCode, header, request};
use axum::{Router, middleware::from_fn_with_state, routing::get, routing::post};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::governor_conf::get_governor_conf;
use crate::server::handlers::{
    caption_handler, current_user_handler, federated_login_handler, hashtags_handler,
    list_images_handler, login_handler, save_image_handler, server_status_handler, signup_handler,
    upload_binary_handler,
};
use crate::server::middleware::require_user;
use crate::server::rate_limiter::is_whitelisted;
use crate::server::types::AppState;
use crate::utils::constants::SERVER_REQUEST_BODY_LIMIT;

/// Routes and handlers only. Used directly by tests, which have no socket
/// address for the rate limiter to key on.
pub fn app_routes(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/api/caption", post(caption_handler))
        .route("/api/upload", post(upload_binary_handler))
        .route(
            "/api/images",
            get(list_images_handler).post(save_image_handler),
        )
        .route_layer(from_fn_with_state(state.clone(), require_user));

    Router::new()
        .route("/", get(server_status_handler))
        .route("/api/hashtags", post(hashtags_handler))
        .route("/api/auth/signup", post(signup_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/federated", post(federated_login_handler))
        .route("/api/auth/me", get(current_user_handler))
        .merge(protected)
        .layer(DefaultBodyLimit::max(SERVER_REQUEST_BODY_LIMIT))
        .with_state(state)
}

pub fn build_router(
    state: Arc<AppState>,
    whitelisted_hosts: Vec<String>,
    rate_limit_burst: u32,
) -> Result<Router, anyhow::Error> {
    let governor_conf = Arc::new(get_governor_conf(rate_limit_burst)?);

    let allow_origin = if whitelisted_hosts.is_empty() {
        AllowOrigin::any()
    } else {
        AllowOrigin::predicate(move |origin: &HeaderValue, _: &request::Parts| {
            is_whitelisted(origin.to_str().ok().map(String::from), &whitelisted_hosts)
        })
    };
    let cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let timeout =
        TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(180));
    let request_body_limit = RequestBodyLimitLayer::new(SERVER_REQUEST_BODY_LIMIT);

    Ok(app_routes(state)
        .layer(GovernorLayer {
            config: governor_conf,
        })
        .layer(timeout)
        .layer(cors)
        .layer(request_body_limit)
        .layer(TraceLayer::new_for_http()))
}
