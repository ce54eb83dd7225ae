//! Request pipeline pieces shared by every handler
//!
//! Contains:
//! - `AppState` with the services handlers call
//! - Caller resolution from the `session` cookie and the admin-area gate
//! - The `Page` extractor (caller, flash message, path)
//! - `WebError` and its mapping onto 404/500 pages and redirects
//! - Cookie helpers for the session and flash cookies

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::convert::Infallible;
use std::sync::Arc;

use crate::config::Config;
use crate::db::repositories::{
    SqlxArticleRepository, SqlxCategoryRepository, SqlxCommentRepository, SqlxSessionRepository,
    SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ArticleService, ArticleServiceError, CategoryService, CategoryServiceError, CommentService,
    CommentServiceError, MediaStore, UserService, UserServiceError,
};
use crate::theme::{ThemeEngine, ThemeError};

pub const SESSION_COOKIE: &str = "session";
pub const FLASH_COOKIE: &str = "flash";

const NOT_FOUND_PAGE: &str = include_str!("../../templates/errors/404.html");
const SERVER_ERROR_PAGE: &str = include_str!("../../templates/errors/500.html");

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub user_service: Arc<UserService>,
    pub article_service: Arc<ArticleService>,
    pub category_service: Arc<CategoryService>,
    pub comment_service: Arc<CommentService>,
    pub media: Arc<MediaStore>,
    pub theme: Arc<ThemeEngine>,
}

impl AppState {
    /// Wire repositories and services over one pool
    pub fn new(pool: DynDatabasePool, config: Config, theme: ThemeEngine) -> Self {
        let user_repo = Arc::new(SqlxUserRepository::new(pool.clone()));
        let session_repo = Arc::new(SqlxSessionRepository::new(pool.clone()));
        let article_repo = Arc::new(SqlxArticleRepository::new(pool.clone()));
        let category_repo = Arc::new(SqlxCategoryRepository::new(pool.clone()));
        let comment_repo = Arc::new(SqlxCommentRepository::new(pool));

        let user_service = UserService::with_session_ttl(
            user_repo,
            session_repo,
            config.session.ttl_days,
        );
        let article_service = ArticleService::new(
            article_repo.clone(),
            category_repo.clone(),
            comment_repo.clone(),
        );
        let category_service = CategoryService::new(category_repo);
        let comment_service = CommentService::new(comment_repo, article_repo);
        let media = MediaStore::new(config.upload.clone());

        Self {
            config: Arc::new(config),
            user_service: Arc::new(user_service),
            article_service: Arc::new(article_service),
            category_service: Arc::new(category_service),
            comment_service: Arc::new(comment_service),
            media: Arc::new(media),
            theme: Arc::new(theme),
        }
    }
}

// ============================================================================
// Caller identity
// ============================================================================

/// Who is making the request
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub user: Option<User>,
    /// Token of the session the user was resolved from
    pub session_token: Option<String>,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }
}

/// One-shot message read from the flash cookie
#[derive(Debug, Clone, Default)]
struct Flash(Option<String>);

/// Per-request view data: the caller, a pending flash message and the path
#[derive(Debug, Clone)]
pub struct Page {
    pub viewer: Viewer,
    pub flash: Option<String>,
    /// Path and query of the request
    pub path: String,
}

impl Page {
    pub fn user(&self) -> Option<&User> {
        self.viewer.user.as_ref()
    }

    /// The logged-in user, or a redirect to the login page
    pub fn require_user(&self) -> Result<&User, WebError> {
        self.viewer
            .user
            .as_ref()
            .ok_or_else(|| WebError::LoginRequired(self.path.clone()))
    }
}

impl<S> FromRequestParts<S> for Page
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let viewer = parts.extensions.get::<Viewer>().cloned().unwrap_or_default();
        let flash = parts
            .extensions
            .get::<Flash>()
            .and_then(|flash| flash.0.clone());
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| parts.uri.path().to_string());
        Ok(Page { viewer, flash, path })
    }
}

/// Resolve the caller from the session cookie
pub async fn resolve_viewer(state: &AppState, headers: &HeaderMap) -> Viewer {
    let Some(token) = cookie_value(headers, SESSION_COOKIE) else {
        return Viewer::anonymous();
    };
    match state.user_service.validate_session(&token).await {
        Ok(Some(user)) => Viewer {
            user: Some(user),
            session_token: Some(token),
        },
        Ok(None) => Viewer::anonymous(),
        Err(e) => {
            tracing::error!(error = %e, "session validation failed");
            Viewer::anonymous()
        }
    }
}

pub fn is_admin_path(path: &str) -> bool {
    path == "/admin" || path.starts_with("/admin/")
}

/// Outermost stage of the pipeline.
///
/// Resolves the caller and the flash message for every request, then hides
/// the `/admin` namespace behind a 404 from everyone but active superusers.
pub async fn admin_gate(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let viewer = resolve_viewer(&state, request.headers()).await;

    if is_admin_path(request.uri().path()) && !viewer.is_admin() {
        tracing::debug!(path = %request.uri().path(), "admin area hidden from caller");
        return WebError::NotFound.into_response();
    }

    let flash = cookie_value(request.headers(), FLASH_COOKIE)
        .and_then(|raw| urlencoding::decode(&raw).ok().map(|s| s.into_owned()))
        .filter(|message| !message.is_empty());

    request.extensions_mut().insert(viewer);
    request.extensions_mut().insert(Flash(flash));
    next.run(request).await
}

// ============================================================================
// Errors
// ============================================================================

/// Everything a handler can fail with
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Unknown id or slug, or something the caller may not know exists
    #[error("Not found")]
    NotFound,

    /// Anonymous caller on a page that needs a login; carries the path to return to
    #[error("Login required")]
    LoginRequired(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        match self {
            WebError::NotFound => (StatusCode::NOT_FOUND, Html(NOT_FOUND_PAGE)).into_response(),
            WebError::LoginRequired(next) => {
                Redirect::to(&format!("/account/login?next={}", urlencoding::encode(&next)))
                    .into_response()
            }
            WebError::BadRequest(message) => (StatusCode::BAD_REQUEST, message).into_response(),
            WebError::Internal(message) => {
                tracing::error!(error = %message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, Html(SERVER_ERROR_PAGE)).into_response()
            }
        }
    }
}

impl From<ThemeError> for WebError {
    fn from(e: ThemeError) -> Self {
        WebError::Internal(e.to_string())
    }
}

impl From<ArticleServiceError> for WebError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::NotFound(_) | ArticleServiceError::Forbidden => WebError::NotFound,
            ArticleServiceError::ValidationError(msg) => WebError::BadRequest(msg),
            ArticleServiceError::InternalError(e) => WebError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<CategoryServiceError> for WebError {
    fn from(e: CategoryServiceError) -> Self {
        match e {
            CategoryServiceError::NotFound(_) => WebError::NotFound,
            CategoryServiceError::ValidationError(msg) => WebError::BadRequest(msg),
            CategoryServiceError::InternalError(e) => WebError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<CommentServiceError> for WebError {
    fn from(e: CommentServiceError) -> Self {
        match e {
            CommentServiceError::NotFound(_) | CommentServiceError::Forbidden => WebError::NotFound,
            CommentServiceError::ValidationError(msg) => WebError::BadRequest(msg),
            CommentServiceError::InternalError(e) => WebError::Internal(format!("{:#}", e)),
        }
    }
}

impl From<UserServiceError> for WebError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::NotFound(_) => WebError::NotFound,
            UserServiceError::AuthenticationError(msg)
            | UserServiceError::ValidationError(msg)
            | UserServiceError::UserExists(msg) => WebError::BadRequest(msg),
            UserServiceError::InternalError(e) => WebError::Internal(format!("{:#}", e)),
        }
    }
}

/// Fallback for unmatched routes
pub async fn not_found() -> WebError {
    WebError::NotFound
}

// ============================================================================
// Cookies
// ============================================================================

/// Read one cookie from the `Cookie` header
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

fn cookie_header(
    name: &str,
    value: &str,
    max_age: i64,
    secure: bool,
) -> Result<HeaderValue, WebError> {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
        .map_err(|e| WebError::Internal(format!("Invalid cookie value: {}", e)))
}

pub fn session_cookie(config: &Config, token: &str) -> Result<HeaderValue, WebError> {
    cookie_header(
        SESSION_COOKIE,
        token,
        config.session.ttl_days.max(1) * 24 * 60 * 60,
        config.session.secure_cookies,
    )
}

pub fn clear_session_cookie(config: &Config) -> Result<HeaderValue, WebError> {
    cookie_header(SESSION_COOKIE, "", 0, config.session.secure_cookies)
}

pub fn flash_cookie(message: &str) -> Result<HeaderValue, WebError> {
    cookie_header(FLASH_COOKIE, &urlencoding::encode(message), 60, false)
}

pub fn clear_flash_cookie() -> HeaderValue {
    HeaderValue::from_static("flash=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Redirect (303) and leave a message for the next page
pub fn redirect_with_flash(to: &str, message: &str) -> Result<Response, WebError> {
    let mut response = Redirect::to(to).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, flash_cookie(message)?);
    Ok(response)
}
