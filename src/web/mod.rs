//! HTTP layer
//!
//! Server-rendered pages on axum. Handlers translate requests into service
//! calls and render tera templates through the `ThemeEngine`.

pub mod accounts;
pub mod admin;
pub mod articles;
pub mod common;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    response::Redirect,
    routing::get,
    Router,
};
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};

pub use middleware::{AppState, Page, Viewer, WebError};

/// Room for the non-file fields of an upload form
const FORM_OVERHEAD: usize = 1024 * 1024;

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.upload.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(FORM_OVERHEAD);

    Router::new()
        .route("/", get(|| async { Redirect::to("/articles") }))
        .merge(articles::router())
        .merge(accounts::router())
        .merge(admin::router())
        .nest_service("/media", ServeDir::new(state.media.root()))
        .fallback(middleware::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        // Resolves the caller and guards /admin before any handler runs
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_gate,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
