//! Account pages
//!
//! Registration, email-or-username login, logout, the own/public profile
//! views and profile editing.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Form, Router,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use super::common::{parse_id, render_page, MultipartForm, PageQuery};
use super::middleware::{
    clear_session_cookie, flash_cookie, redirect_with_flash, session_cookie, AppState, Page,
    WebError,
};
use crate::models::{
    ArticleOrdering, ArticleStatus, AuthorStats, RegisterInput, UpdateProfileInput, User,
};
use crate::services::{MediaError, MediaKind, UserServiceError, INVALID_CREDENTIALS};

/// Build the account router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/account/register", get(register_form).post(register_submit))
        .route("/account/login", get(login_form).post(login_submit))
        .route("/account/logout", get(logout).post(logout))
        .route("/account/profile", get(own_profile))
        .route("/account/profile/status/{status}", get(own_profile_by_status))
        .route("/account/profile/user/{id}", get(user_profile))
        .route("/account/profile/edit", get(edit_form).post(edit_submit))
}

/// Log `user` in: new session cookie, flash message, redirect
async fn start_session_response(
    state: &AppState,
    user: &User,
    to: &str,
    message: &str,
) -> Result<Response, WebError> {
    let session = state.user_service.start_session(user.id).await?;
    let mut response = Redirect::to(to).into_response();
    let headers = response.headers_mut();
    headers.append(
        header::SET_COOKIE,
        session_cookie(&state.config, &session.id)?,
    );
    headers.append(header::SET_COOKIE, flash_cookie(message)?);
    Ok(response)
}

// ============================================================================
// Registration
// ============================================================================

/// Registration values echoed back into the form; passwords never are
#[derive(Debug, Default, Serialize)]
struct RegisterFormValues {
    email: String,
    username: String,
}

async fn render_register(
    state: &AppState,
    page: &Page,
    values: RegisterFormValues,
    error: Option<String>,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("form", &values);
    ctx.insert("error", &error);
    render_page(state, page, "account/register.html", ctx).await
}

/// GET /account/register
async fn register_form(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    render_register(&state, &page, RegisterFormValues::default(), None).await
}

/// POST /account/register - creates the user and logs them in
async fn register_submit(
    State(state): State<AppState>,
    page: Page,
    Form(input): Form<RegisterInput>,
) -> Result<Response, WebError> {
    let values = RegisterFormValues {
        email: input.email.clone(),
        username: input.username.clone(),
    };

    let avatar = state.media.random_avatar().await;
    match state.user_service.register(input, avatar).await {
        Ok(user) => start_session_response(&state, &user, "/", "Registration successful!").await,
        Err(UserServiceError::ValidationError(message))
        | Err(UserServiceError::UserExists(message)) => {
            render_register(&state, &page, values, Some(message)).await
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Login / logout
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct NextQuery {
    next: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoginForm {
    /// Email or username
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    next: String,
}

/// Only same-site paths are followed after login
fn safe_next(next: &str) -> &str {
    if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') {
        next
    } else {
        "/"
    }
}

async fn render_login(
    state: &AppState,
    page: &Page,
    username: &str,
    next: &str,
    error: Option<&str>,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("username", username);
    ctx.insert("next", next);
    ctx.insert("error", &error);
    render_page(state, page, "account/login.html", ctx).await
}

/// GET /account/login
async fn login_form(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<NextQuery>,
) -> Result<Response, WebError> {
    let next = query.next.unwrap_or_default();
    render_login(&state, &page, "", &next, None).await
}

/// POST /account/login
async fn login_submit(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<LoginForm>,
) -> Result<Response, WebError> {
    match state
        .user_service
        .authenticate(&form.username, &form.password)
        .await
    {
        Ok(user) => {
            let message = format!("You are logged in as {}", user.username);
            start_session_response(&state, &user, safe_next(&form.next), &message).await
        }
        Err(UserServiceError::AuthenticationError(_)) => {
            render_login(
                &state,
                &page,
                &form.username,
                &form.next,
                Some(INVALID_CREDENTIALS),
            )
            .await
        }
        Err(e) => Err(e.into()),
    }
}

/// GET|POST /account/logout
async fn logout(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    if let Some(token) = page.viewer.session_token.as_deref() {
        state.user_service.logout(token).await?;
    }
    let mut response = redirect_with_flash("/", "You have been logged out.")?;
    response
        .headers_mut()
        .append(header::SET_COOKIE, clear_session_cookie(&state.config)?);
    Ok(response)
}

// ============================================================================
// Profiles
// ============================================================================

#[derive(Debug, Serialize)]
struct StatusTab {
    key: &'static str,
    label: &'static str,
}

async fn render_profile(
    state: &AppState,
    page: &Page,
    profile_user: &User,
    status: ArticleStatus,
    query: &PageQuery,
    is_own_profile: bool,
) -> Result<Response, WebError> {
    let articles = state
        .article_service
        .list_by_author(
            profile_user.id,
            Some(status),
            query.request(state.config.pagination.profile),
            ArticleOrdering::Newest,
        )
        .await?;

    let user_stats = if is_own_profile {
        state.user_service.author_stats(profile_user.id).await?
    } else {
        AuthorStats::public(articles.total_count)
    };

    let tabs: Vec<StatusTab> = ArticleStatus::ALL
        .iter()
        .map(|s| StatusTab {
            key: s.as_str(),
            label: s.label(),
        })
        .collect();

    let mut ctx = TeraContext::new();
    ctx.insert("user_profile", &profile_user.summary());
    ctx.insert("profile_joined", &profile_user.created_at);
    ctx.insert("articles", &articles);
    ctx.insert("user_stats", &user_stats);
    ctx.insert("current_status", status.as_str());
    ctx.insert("status_tabs", &tabs);
    ctx.insert("is_own_profile", &is_own_profile);
    ctx.insert("page_query", "");
    render_page(state, page, "account/profile.html", ctx).await
}

/// GET /account/profile - own articles, published by default
async fn own_profile(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let user = page.require_user()?;
    render_profile(&state, &page, user, ArticleStatus::Published, &query, true).await
}

/// GET /account/profile/status/{status}
async fn own_profile_by_status(
    State(state): State<AppState>,
    page: Page,
    Path(status): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let user = page.require_user()?;
    let status = ArticleStatus::from_str(&status).ok_or(WebError::NotFound)?;
    render_profile(&state, &page, user, status, &query, true).await
}

/// GET /account/profile/user/{id} - someone's published articles
async fn user_profile(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let profile_user = state.user_service.get_by_id(id).await?;

    if page.user().is_some_and(|viewer| viewer.id == profile_user.id) {
        return Ok(Redirect::to("/account/profile").into_response());
    }
    render_profile(
        &state,
        &page,
        &profile_user,
        ArticleStatus::Published,
        &query,
        false,
    )
    .await
}

// ============================================================================
// Profile editing
// ============================================================================

#[derive(Debug, Serialize)]
struct ProfileFormValues {
    username: String,
    email: String,
    avatar: String,
}

async fn render_edit(
    state: &AppState,
    page: &Page,
    values: &ProfileFormValues,
    error: Option<String>,
) -> Result<Response, WebError> {
    let mut ctx = TeraContext::new();
    ctx.insert("form", values);
    ctx.insert("error", &error);
    render_page(state, page, "account/profile_edit.html", ctx).await
}

/// GET /account/profile/edit
async fn edit_form(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let user = page.require_user()?;
    let values = ProfileFormValues {
        username: user.username.clone(),
        email: user.email.clone(),
        avatar: user.avatar.clone(),
    };
    render_edit(&state, &page, &values, None).await
}

/// POST /account/profile/edit - multipart, `avatar` file optional
async fn edit_submit(
    State(state): State<AppState>,
    page: Page,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let user = page.require_user()?;
    let form = MultipartForm::read(multipart).await?;
    let values = ProfileFormValues {
        username: form.text("username"),
        email: form.text("email"),
        avatar: user.avatar.clone(),
    };

    let avatar = match form.file("avatar") {
        Some(upload) => match state
            .media
            .save(MediaKind::Avatar, &upload.content_type, &upload.data)
            .await
        {
            Ok(path) => Some(path),
            Err(MediaError::Io(e)) => {
                return Err(WebError::Internal(format!("Failed to store avatar: {}", e)))
            }
            Err(e) => return render_edit(&state, &page, &values, Some(e.to_string())).await,
        },
        None => None,
    };

    let input = UpdateProfileInput {
        username: Some(values.username.clone()),
        email: Some(values.email.clone()),
        avatar: avatar.clone(),
    };
    match state.user_service.update_profile(user.id, input).await {
        Ok(_) => redirect_with_flash("/account/profile", "Your profile was updated."),
        Err(UserServiceError::ValidationError(message))
        | Err(UserServiceError::UserExists(message)) => {
            if let Some(path) = avatar.as_deref() {
                if let Err(e) = state.media.remove(path).await {
                    tracing::warn!(path, error = %e, "failed to remove avatar");
                }
            }
            render_edit(&state, &page, &values, Some(message)).await
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_next() {
        assert_eq!(safe_next("/articles/create"), "/articles/create");
        assert_eq!(safe_next(""), "/");
        assert_eq!(safe_next("https://evil.example"), "/");
        assert_eq!(safe_next("//evil.example"), "/");
        assert_eq!(safe_next("/\\evil.example"), "/");
    }
}
