//! Admin area
//!
//! Every route here sits behind `admin_gate`, which answers 404 to anyone
//! but an active superuser. The screens drive the same services as the
//! public site.

use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use super::common::{page_query, parse_id, parse_page, render_page, PageQuery};
use super::middleware::{redirect_with_flash, AppState, Page, WebError};
use crate::models::{ArticleStatus, CreateCategoryInput, PageRequest};
use crate::services::{CategoryServiceError, UserServiceError};

const DASHBOARD_LIST_LIMIT: i64 = 5;

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin", get(dashboard))
        .route("/admin/articles", get(articles))
        .route("/admin/articles/{id}/status", post(set_article_status))
        .route("/admin/articles/{id}/delete", post(delete_article))
        .route("/admin/categories", get(categories).post(create_category))
        .route("/admin/categories/{id}/delete", post(delete_category))
        .route("/admin/comments", get(comments))
        .route("/admin/comments/{id}/delete", post(delete_comment))
        .route("/admin/users", get(users))
        .route("/admin/users/{id}/active", post(set_user_active))
        .route("/admin/users/{id}/delete", post(delete_user))
}

#[derive(Debug, Serialize)]
struct StatusCount {
    key: &'static str,
    label: &'static str,
    count: i64,
}

/// GET /admin
async fn dashboard(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let counts: Vec<StatusCount> = state
        .article_service
        .counts_by_status()
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount {
            key: status.as_str(),
            label: status.label(),
            count,
        })
        .collect();
    let top_authors = state.user_service.top_authors(DASHBOARD_LIST_LIMIT).await?;
    let most_commented = state
        .article_service
        .most_commented(DASHBOARD_LIST_LIMIT)
        .await?;

    let mut ctx = TeraContext::new();
    ctx.insert("status_counts", &counts);
    ctx.insert("top_authors", &top_authors);
    ctx.insert("most_commented", &most_commented);
    render_page(&state, &page, "admin/dashboard.html", ctx).await
}

// ============================================================================
// Articles
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ArticleListQuery {
    status: Option<String>,
    page: Option<String>,
}

/// GET /admin/articles?status= - moderation queue by default
async fn articles(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<ArticleListQuery>,
) -> Result<Response, WebError> {
    let status = query
        .status
        .as_deref()
        .and_then(ArticleStatus::from_str)
        .unwrap_or(ArticleStatus::Moderated);
    let request = PageRequest::new(
        parse_page(query.page.as_deref()),
        state.config.pagination.admin,
    );
    let articles = state.article_service.list_by_status(status, request).await?;

    let statuses: Vec<StatusCount> = state
        .article_service
        .counts_by_status()
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount {
            key: status.as_str(),
            label: status.label(),
            count,
        })
        .collect();

    let mut ctx = TeraContext::new();
    ctx.insert("articles", &articles);
    ctx.insert("current_status", status.as_str());
    ctx.insert("statuses", &statuses);
    ctx.insert("page_query", &page_query(&[("status", status.as_str())]));
    render_page(&state, &page, "admin/articles.html", ctx).await
}

#[derive(Debug, Default, Deserialize)]
struct StatusForm {
    #[serde(default)]
    status: String,
    /// Listing to return to
    #[serde(default)]
    from: String,
}

/// POST /admin/articles/{id}/status
async fn set_article_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let status = ArticleStatus::from_str(&form.status)
        .ok_or_else(|| WebError::BadRequest(format!("Unknown status: {}", form.status)))?;

    let article = state.article_service.set_status(id, status).await?;
    let back = ArticleStatus::from_str(&form.from).unwrap_or(status);
    redirect_with_flash(
        &format!("/admin/articles?status={}", back),
        &format!("\"{}\" is now {}.", article.title, status.label().to_lowercase()),
    )
}

/// POST /admin/articles/{id}/delete
async fn delete_article(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    state.article_service.delete(id).await?;
    redirect_with_flash("/admin/articles", "The article was deleted.")
}

// ============================================================================
// Categories
// ============================================================================

async fn render_categories(
    state: &AppState,
    page: &Page,
    form: &CreateCategoryInput,
    error: Option<String>,
) -> Result<Response, WebError> {
    let categories = state.category_service.list_with_counts().await?;

    let mut ctx = TeraContext::new();
    ctx.insert("category_counts", &categories);
    ctx.insert("form", form);
    ctx.insert("error", &error);
    render_page(state, page, "admin/categories.html", ctx).await
}

/// GET /admin/categories
async fn categories(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    let empty = CreateCategoryInput {
        name: String::new(),
        slug: String::new(),
    };
    render_categories(&state, &page, &empty, None).await
}

/// POST /admin/categories - a blank slug is derived from the name
async fn create_category(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<CreateCategoryInput>,
) -> Result<Response, WebError> {
    match state.category_service.create(form.clone()).await {
        Ok(category) => redirect_with_flash(
            "/admin/categories",
            &format!("Category \"{}\" was created.", category.name),
        ),
        Err(CategoryServiceError::ValidationError(message)) => {
            render_categories(&state, &page, &form, Some(message)).await
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /admin/categories/{id}/delete
async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    state.category_service.delete(id).await?;
    redirect_with_flash("/admin/categories", "The category was deleted.")
}

// ============================================================================
// Comments
// ============================================================================

/// GET /admin/comments - newest first
async fn comments(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let comments = state
        .comment_service
        .list_all(query.request(state.config.pagination.admin))
        .await?;

    let mut ctx = TeraContext::new();
    ctx.insert("comments", &comments);
    ctx.insert("page_query", "");
    render_page(&state, &page, "admin/comments.html", ctx).await
}

/// POST /admin/comments/{id}/delete
async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    state.comment_service.delete(id).await?;
    redirect_with_flash("/admin/comments", "The comment was deleted.")
}

// ============================================================================
// Users
// ============================================================================

/// GET /admin/users
async fn users(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let users = state
        .user_service
        .list(query.request(state.config.pagination.admin))
        .await?;

    let mut ctx = TeraContext::new();
    ctx.insert("users", &users);
    ctx.insert("page_query", "");
    render_page(&state, &page, "admin/users.html", ctx).await
}

#[derive(Debug, Default, Deserialize)]
struct ActiveForm {
    #[serde(default)]
    active: String,
}

/// POST /admin/users/{id}/active - `active=true|false`
async fn set_user_active(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
    Form(form): Form<ActiveForm>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let actor = page.require_user()?;
    let active = form.active == "true";

    match state.user_service.set_active(actor, id, active).await {
        Ok(user) => {
            let verb = if user.is_active { "activated" } else { "deactivated" };
            redirect_with_flash("/admin/users", &format!("{} was {}.", user.username, verb))
        }
        Err(UserServiceError::ValidationError(message)) => {
            redirect_with_flash("/admin/users", &message)
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /admin/users/{id}/delete - removes their articles and comments too
async fn delete_user(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let actor = page.require_user()?;

    match state.user_service.delete(actor, id).await {
        Ok(()) => redirect_with_flash("/admin/users", "The user was deleted."),
        Err(UserServiceError::ValidationError(message)) => {
            redirect_with_flash("/admin/users", &message)
        }
        Err(e) => Err(e.into()),
    }
}
