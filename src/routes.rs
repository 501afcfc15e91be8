use crate::{handlers, AppState};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Creates the Axum router and associates routes with handlers.
pub fn create_router(state: Arc<AppState>) -> Router {
    let config = &state.config;
    let cors = cors_layer(&config.cors_allowed_origins);
    let body_limit = DefaultBodyLimit::max(config.max_upload_bytes);
    let timeout = TimeoutLayer::new(config.request_timeout);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/a/auth/register", post(handlers::register))
        .route("/a/auth/login", post(handlers::login))
        .route("/a/auth/profile", get(handlers::profile))
        .route("/a/meme", get(handlers::list_memes).post(handlers::upload_meme))
        .route("/a/meme/{id}", get(handlers::get_meme_image))
        .route("/a/meme/{id}/delete", delete(handlers::delete_meme))
        .route("/a/meme/{id}/vote", put(handlers::vote_meme))
        // Middleware Layers
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(timeout)
        .layer(body_limit)
        .with_state(state)
}
