//! Article pages
//!
//! Listing, detail with comments, create/update/delete for authors, the
//! category listing and search.

use axum::{
    extract::{Multipart, Path, Query, State},
    response::Response,
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use super::common::{page_query, parse_id, render_page, MultipartForm, PageQuery};
use super::middleware::{redirect_with_flash, AppState, Page, WebError};
use crate::models::{
    ArticleIncludes, ArticleOrdering, ArticleStatus, CreateArticleInput, UpdateArticleInput,
};
use crate::services::{ArticleServiceError, CommentServiceError, MediaError, MediaKind};

/// Build the article router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/articles", get(list))
        .route("/articles/create", get(create_form).post(create_submit))
        .route("/articles/search", get(search))
        .route("/articles/category/{slug}", get(category))
        .route("/articles/update/{id}", get(update_form).post(update_submit))
        .route("/articles/delete/{id}", get(delete_confirm).post(delete_submit))
        .route("/articles/comments/{id}/delete", post(delete_comment))
        .route("/articles/{id}", get(detail).post(add_comment))
}

/// GET /articles - published articles, newest first
async fn list(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let articles = state
        .article_service
        .list_with_comment_counts(
            ArticleStatus::Published,
            query.request(state.config.pagination.articles),
        )
        .await?;

    let mut ctx = TeraContext::new();
    ctx.insert("articles", &articles);
    ctx.insert("page_query", "");
    render_page(&state, &page, "articles/list.html", ctx).await
}

// ============================================================================
// Detail and comments
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct CommentForm {
    #[serde(default)]
    content: String,
}

/// GET /articles/{id}
async fn detail(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    render_detail(&state, &page, parse_id(&id)?, &query, None).await
}

/// POST /articles/{id} - add a comment
async fn add_comment(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let user = page.require_user()?;

    // Comments go only where the caller can see the article
    state
        .article_service
        .get_visible(id, Some(user), ArticleIncludes::default())
        .await?;

    match state.comment_service.create(id, user.id, &form.content).await {
        Ok(_) => redirect_with_flash(&format!("/articles/{}", id), "Your comment was added."),
        Err(CommentServiceError::ValidationError(message)) => {
            let rejected = CommentDraft {
                content: form.content,
                error: message,
            };
            render_detail(&state, &page, id, &PageQuery::default(), Some(rejected)).await
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
struct CommentDraft {
    content: String,
    error: String,
}

async fn render_detail(
    state: &AppState,
    page: &Page,
    id: i64,
    query: &PageQuery,
    comment_draft: Option<CommentDraft>,
) -> Result<Response, WebError> {
    let detail = state
        .article_service
        .get_visible(id, page.user(), ArticleIncludes::categories())
        .await?;
    let comments = state
        .comment_service
        .list_for_article(id, query.request(state.config.pagination.comments))
        .await?;
    let author_stats = state
        .user_service
        .author_stats(detail.item.article.author_id)
        .await?;

    let mut ctx = TeraContext::new();
    ctx.insert(
        "can_edit",
        &page
            .user()
            .is_some_and(|user| user.id == detail.item.article.author_id),
    );
    ctx.insert("article", &detail);
    ctx.insert("comments", &comments);
    ctx.insert("author_stats", &author_stats);
    ctx.insert("comment_draft", &comment_draft);
    ctx.insert("page_query", "");
    render_page(state, page, "articles/detail.html", ctx).await
}

/// POST /articles/comments/{id}/delete - by the comment's author or a superuser
async fn delete_comment(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let user = page.require_user()?;

    match state.comment_service.delete_as(user, id).await {
        Ok(comment) => redirect_with_flash(
            &format!("/articles/{}", comment.article_id),
            "The comment was deleted.",
        ),
        Err(CommentServiceError::Forbidden) => {
            let comment = state.comment_service.get_by_id(id).await?;
            redirect_with_flash(
                &format!("/articles/{}", comment.article_id),
                "You can only delete your own comments.",
            )
        }
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Create / update / delete
// ============================================================================

/// Values echoed back into the article form
#[derive(Debug, Default, Serialize)]
struct ArticleFormValues {
    title: String,
    content: String,
    source: String,
    category_ids: Vec<i64>,
    /// Current image when editing
    image: Option<String>,
}

impl ArticleFormValues {
    fn from_form(form: &MultipartForm, image: Option<String>) -> Self {
        Self {
            title: form.text("title"),
            content: form.text("content"),
            source: form.text("source"),
            category_ids: form.ids("categories"),
            image,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FormMode {
    Create,
    Update(i64),
}

async fn render_article_form(
    state: &AppState,
    page: &Page,
    mode: FormMode,
    values: &ArticleFormValues,
    error: Option<String>,
) -> Result<Response, WebError> {
    let (action, heading) = match mode {
        FormMode::Create => ("/articles/create".to_string(), "New article"),
        FormMode::Update(id) => (format!("/articles/update/{}", id), "Edit article"),
    };

    let mut ctx = TeraContext::new();
    ctx.insert("form", values);
    ctx.insert("form_action", &action);
    ctx.insert("heading", heading);
    ctx.insert("is_update", &matches!(mode, FormMode::Update(_)));
    ctx.insert("error", &error);
    render_page(state, page, "articles/form.html", ctx).await
}

/// Store an uploaded image; rejected uploads become a form message
async fn store_image(
    state: &AppState,
    form: &MultipartForm,
) -> Result<Result<Option<String>, String>, WebError> {
    let Some(upload) = form.file("image") else {
        return Ok(Ok(None));
    };
    match state
        .media
        .save(MediaKind::ArticleImage, &upload.content_type, &upload.data)
        .await
    {
        Ok(path) => Ok(Ok(Some(path))),
        Err(MediaError::Io(e)) => Err(WebError::Internal(format!("Failed to store image: {}", e))),
        Err(e) => Ok(Err(e.to_string())),
    }
}

async fn discard_image(state: &AppState, image: Option<&str>) {
    if let Some(path) = image {
        if let Err(e) = state.media.remove(path).await {
            tracing::warn!(path, error = %e, "failed to remove image");
        }
    }
}

/// GET /articles/create
async fn create_form(State(state): State<AppState>, page: Page) -> Result<Response, WebError> {
    page.require_user()?;
    render_article_form(
        &state,
        &page,
        FormMode::Create,
        &ArticleFormValues::default(),
        None,
    )
    .await
}

/// POST /articles/create - new articles wait for moderation
async fn create_submit(
    State(state): State<AppState>,
    page: Page,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let user = page.require_user()?;
    let form = MultipartForm::read(multipart).await?;
    let values = ArticleFormValues::from_form(&form, None);

    let image = match store_image(&state, &form).await? {
        Ok(image) => image,
        Err(message) => {
            return render_article_form(&state, &page, FormMode::Create, &values, Some(message))
                .await
        }
    };

    let mut input = CreateArticleInput::new(
        user.id,
        values.title.clone(),
        values.content.clone(),
        values.category_ids.clone(),
    )
    .with_source(values.source.clone());
    input.image = image.clone();

    match state.article_service.create(input).await {
        Ok(article) => redirect_with_flash(
            &format!("/articles/{}", article.id),
            "Your article was sent for moderation.",
        ),
        Err(ArticleServiceError::ValidationError(message)) => {
            discard_image(&state, image.as_deref()).await;
            render_article_form(&state, &page, FormMode::Create, &values, Some(message)).await
        }
        Err(e) => {
            discard_image(&state, image.as_deref()).await;
            Err(e.into())
        }
    }
}

fn not_author_redirect(id: i64) -> Result<Response, WebError> {
    redirect_with_flash(
        &format!("/articles/{}", id),
        "Only the author can change this article.",
    )
}

/// GET /articles/update/{id}
async fn update_form(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let user = page.require_user()?;

    let detail = match state.article_service.get_owned(user, id).await {
        Ok(detail) => detail,
        Err(ArticleServiceError::Forbidden) => return not_author_redirect(id),
        Err(e) => return Err(e.into()),
    };

    let article = detail.item.article;
    let values = ArticleFormValues {
        title: article.title,
        content: article.content,
        source: article.source.unwrap_or_default(),
        category_ids: detail.item.categories.iter().map(|c| c.id).collect(),
        image: article.image,
    };
    render_article_form(&state, &page, FormMode::Update(id), &values, None).await
}

/// POST /articles/update/{id} - author only; the status is left as it is
async fn update_submit(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let user = page.require_user()?;

    let current = match state.article_service.get_owned(user, id).await {
        Ok(detail) => detail.item.article,
        Err(ArticleServiceError::Forbidden) => return not_author_redirect(id),
        Err(e) => return Err(e.into()),
    };

    let form = MultipartForm::read(multipart).await?;
    let values = ArticleFormValues::from_form(&form, current.image.clone());

    let new_image = match store_image(&state, &form).await? {
        Ok(image) => image,
        Err(message) => {
            return render_article_form(&state, &page, FormMode::Update(id), &values, Some(message))
                .await
        }
    };

    let mut input = UpdateArticleInput::new()
        .with_title(values.title.clone())
        .with_content(values.content.clone())
        .with_source(Some(values.source.clone()))
        .with_category_ids(values.category_ids.clone());
    if new_image.is_some() {
        input = input.with_image(new_image.clone());
    } else if form.has("remove_image") {
        input = input.with_image(None);
    }
    let replaces_image = input.image.is_set();

    match state.article_service.update_as(user, id, input).await {
        Ok(_) => {
            if replaces_image {
                discard_image(&state, current.image.as_deref()).await;
            }
            redirect_with_flash(&format!("/articles/{}", id), "The article was updated.")
        }
        Err(ArticleServiceError::ValidationError(message)) => {
            discard_image(&state, new_image.as_deref()).await;
            render_article_form(&state, &page, FormMode::Update(id), &values, Some(message)).await
        }
        Err(ArticleServiceError::Forbidden) => {
            discard_image(&state, new_image.as_deref()).await;
            not_author_redirect(id)
        }
        Err(e) => {
            discard_image(&state, new_image.as_deref()).await;
            Err(e.into())
        }
    }
}

/// GET /articles/delete/{id} - confirmation page
async fn delete_confirm(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let user = page.require_user()?;

    let detail = match state.article_service.get_owned(user, id).await {
        Ok(detail) => detail,
        Err(ArticleServiceError::Forbidden) => return not_author_redirect(id),
        Err(e) => return Err(e.into()),
    };

    let mut ctx = TeraContext::new();
    ctx.insert("article", &detail);
    render_page(&state, &page, "articles/confirm_delete.html", ctx).await
}

/// POST /articles/delete/{id}
async fn delete_submit(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<String>,
) -> Result<Response, WebError> {
    let id = parse_id(&id)?;
    let user = page.require_user()?;

    let image = match state.article_service.get_owned(user, id).await {
        Ok(detail) => detail.item.article.image,
        Err(ArticleServiceError::Forbidden) => return not_author_redirect(id),
        Err(e) => return Err(e.into()),
    };

    match state.article_service.delete_as(user, id).await {
        Ok(()) => {
            discard_image(&state, image.as_deref()).await;
            redirect_with_flash("/account/profile", "The article was deleted.")
        }
        Err(ArticleServiceError::Forbidden) => not_author_redirect(id),
        Err(e) => Err(e.into()),
    }
}

// ============================================================================
// Category and search
// ============================================================================

/// GET /articles/category/{slug} - published articles in one category
async fn category(
    State(state): State<AppState>,
    page: Page,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Response, WebError> {
    let (category, articles) = state
        .article_service
        .list_by_category(&slug, query.request(state.config.pagination.articles))
        .await?;

    let mut ctx = TeraContext::new();
    ctx.insert("category", &category);
    ctx.insert("articles", &articles);
    ctx.insert("page_query", "");
    render_page(&state, &page, "articles/category.html", ctx).await
}

#[derive(Debug, Default, Deserialize)]
struct SearchParams {
    q: Option<String>,
    query: Option<String>,
    sort: Option<String>,
    category: Option<String>,
    page: Option<String>,
}

#[derive(Debug, Serialize)]
struct SortOption {
    key: &'static str,
    label: &'static str,
}

/// GET /articles/search?query|q=&category=&sort=&page=
async fn search(
    State(state): State<AppState>,
    page: Page,
    Query(params): Query<SearchParams>,
) -> Result<Response, WebError> {
    let text = super::common::search_text(params.query.as_deref(), params.q.as_deref());
    let ordering = ArticleOrdering::parse_or_default(params.sort.as_deref());
    let category = params
        .category
        .as_deref()
        .map(str::trim)
        .filter(|slug| !slug.is_empty());
    let request = PageQuery {
        page: params.page.clone(),
    }
    .request(state.config.pagination.articles);

    let articles = state
        .article_service
        .search(&text, request, ordering, category)
        .await?;

    let sort_options: Vec<SortOption> = ArticleOrdering::ALL
        .iter()
        .map(|o| SortOption {
            key: o.key(),
            label: o.label(),
        })
        .collect();

    let mut ctx = TeraContext::new();
    ctx.insert("query", &text);
    ctx.insert("sort", ordering.key());
    ctx.insert("sort_options", &sort_options);
    ctx.insert("selected_category", &category.unwrap_or_default());
    ctx.insert("articles", &articles);
    ctx.insert(
        "page_query",
        &page_query(&[
            ("query", &text),
            ("sort", ordering.key()),
            ("category", category.unwrap_or_default()),
        ]),
    );
    render_page(&state, &page, "articles/search.html", ctx).await
}
