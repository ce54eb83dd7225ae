//! Article service
//!
//! The article data-access contract the site is built on:
//! - Paged listings by status, author, category and search query, each row
//!   annotated with its comment count
//! - Single-article fetch with optional eager loading of comments and categories
//! - Derived views: most commented, popular, without comments
//! - Validated create / partial update / delete, category set replaced atomically
//!
//! Unknown ids and slugs surface as `NotFound`; out-of-range pages clamp.

use crate::db::repositories::{ArticleRepository, CategoryRepository, CommentRepository};
use crate::models::{
    Article, ArticleDetail, ArticleFilter, ArticleIncludes, ArticleOrdering, ArticleStatus,
    ArticleWithMeta, Category, CreateArticleInput, PageRequest, Paged, Patch, UpdateArticleInput,
    User, SOURCE_MAX_LEN, TITLE_MAX_LEN,
};
use regex::Regex;
use std::sync::{Arc, OnceLock};

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    /// Article or category not found
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The user is not the article's author
    #[error("Forbidden")]
    Forbidden,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Article service
pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    category_repo: Arc<dyn CategoryRepository>,
    comment_repo: Arc<dyn CommentRepository>,
}

impl ArticleService {
    pub fn new(
        repo: Arc<dyn ArticleRepository>,
        category_repo: Arc<dyn CategoryRepository>,
        comment_repo: Arc<dyn CommentRepository>,
    ) -> Self {
        Self {
            repo,
            category_repo,
            comment_repo,
        }
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// Articles in one status, newest first, with comment counts
    pub async fn list_with_comment_counts(
        &self,
        status: ArticleStatus,
        page: PageRequest,
    ) -> Result<Paged<ArticleWithMeta>, ArticleServiceError> {
        self.paged(&ArticleFilter::status(status), ArticleOrdering::Newest, page)
            .await
    }

    /// Same listing as `list_with_comment_counts`; every listing carries counts
    pub async fn list_by_status(
        &self,
        status: ArticleStatus,
        page: PageRequest,
    ) -> Result<Paged<ArticleWithMeta>, ArticleServiceError> {
        self.list_with_comment_counts(status, page).await
    }

    /// An author's articles, optionally restricted to one status
    pub async fn list_by_author(
        &self,
        author_id: i64,
        status: Option<ArticleStatus>,
        page: PageRequest,
        ordering: ArticleOrdering,
    ) -> Result<Paged<ArticleWithMeta>, ArticleServiceError> {
        let filter = ArticleFilter {
            status,
            ..ArticleFilter::default().with_author(author_id)
        };
        self.paged(&filter, ordering, page).await
    }

    /// Published articles in a category, resolved by slug
    pub async fn list_by_category(
        &self,
        category_slug: &str,
        page: PageRequest,
    ) -> Result<(Category, Paged<ArticleWithMeta>), ArticleServiceError> {
        let category = self
            .category_repo
            .get_by_slug(category_slug)
            .await?
            .ok_or_else(|| ArticleServiceError::NotFound(format!("category {}", category_slug)))?;

        let filter = ArticleFilter::published().with_category(category.id);
        let articles = self.paged(&filter, ArticleOrdering::Newest, page).await?;
        Ok((category, articles))
    }

    /// Case-insensitive search over published titles and bodies.
    ///
    /// A blank query lists every published article. An unknown category slug
    /// matches nothing.
    pub async fn search(
        &self,
        query: &str,
        page: PageRequest,
        ordering: ArticleOrdering,
        category_slug: Option<&str>,
    ) -> Result<Paged<ArticleWithMeta>, ArticleServiceError> {
        let mut filter = ArticleFilter::published();

        let query = query.trim();
        if !query.is_empty() {
            filter = filter.with_search(query);
        }

        if let Some(slug) = category_slug.map(str::trim).filter(|s| !s.is_empty()) {
            match self.category_repo.get_by_slug(slug).await? {
                Some(category) => filter = filter.with_category(category.id),
                None => return Ok(Paged::empty(page)),
            }
        }

        self.paged(&filter, ordering, page).await
    }

    /// Published articles with the most comments
    pub async fn most_commented(
        &self,
        limit: i64,
    ) -> Result<Vec<ArticleWithMeta>, ArticleServiceError> {
        let items = self
            .repo
            .list(&ArticleFilter::published(), ArticleOrdering::MostCommented, 0, limit)
            .await?;
        self.attach_categories(items).await
    }

    /// Same ranking as [`most_commented`](Self::most_commented); the sidebar's name for it
    pub async fn popular(&self, limit: i64) -> Result<Vec<ArticleWithMeta>, ArticleServiceError> {
        self.most_commented(limit).await
    }

    /// Published articles nobody has commented on yet
    pub async fn without_comments(
        &self,
        page: PageRequest,
    ) -> Result<Paged<ArticleWithMeta>, ArticleServiceError> {
        let filter = ArticleFilter {
            without_comments: true,
            ..ArticleFilter::published()
        };
        self.paged(&filter, ArticleOrdering::Newest, page).await
    }

    /// Number of articles in each status, in [`ArticleStatus::ALL`] order
    pub async fn counts_by_status(&self) -> Result<Vec<(ArticleStatus, i64)>, ArticleServiceError> {
        let mut counts = Vec::with_capacity(ArticleStatus::ALL.len());
        for status in ArticleStatus::ALL {
            counts.push((status, self.repo.count(&ArticleFilter::status(status)).await?));
        }
        Ok(counts)
    }

    async fn paged(
        &self,
        filter: &ArticleFilter,
        ordering: ArticleOrdering,
        page: PageRequest,
    ) -> Result<Paged<ArticleWithMeta>, ArticleServiceError> {
        let total = self.repo.count(filter).await?;
        let info = page.resolve(total);
        let items = self
            .repo
            .list(filter, ordering, info.offset(), info.limit())
            .await?;
        let items = self.attach_categories(items).await?;
        Ok(Paged::new(items, info, total))
    }

    async fn attach_categories(
        &self,
        mut items: Vec<ArticleWithMeta>,
    ) -> Result<Vec<ArticleWithMeta>, ArticleServiceError> {
        let ids: Vec<i64> = items.iter().map(|a| a.article.id).collect();
        let mut categories = self.category_repo.list_for_articles(&ids).await?;
        for item in &mut items {
            item.categories = categories.remove(&item.article.id).unwrap_or_default();
        }
        Ok(items)
    }

    // ========================================================================
    // Single article
    // ========================================================================

    /// Fetch one article, eager-loading what `includes` asks for
    pub async fn get_by_id(
        &self,
        id: i64,
        includes: ArticleIncludes,
    ) -> Result<ArticleDetail, ArticleServiceError> {
        let mut item = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ArticleServiceError::NotFound(format!("article {}", id)))?;

        if includes.categories {
            item.categories = self
                .category_repo
                .list_for_articles(&[id])
                .await?
                .remove(&id)
                .unwrap_or_default();
        }

        let comments = if includes.comments {
            self.comment_repo
                .list_for_article(id, 0, item.comment_count.max(1))
                .await?
        } else {
            Vec::new()
        };

        Ok(ArticleDetail { item, comments })
    }

    /// Fetch an article the viewer is allowed to see.
    ///
    /// Published articles are public; anything else is visible only to its
    /// author and to superusers, and reads as missing to everyone else.
    pub async fn get_visible(
        &self,
        id: i64,
        viewer: Option<&User>,
        includes: ArticleIncludes,
    ) -> Result<ArticleDetail, ArticleServiceError> {
        let detail = self.get_by_id(id, includes).await?;
        let article = &detail.item.article;
        let visible = article.status == ArticleStatus::Published
            || viewer.is_some_and(|user| user.can_manage(article.author_id));
        if !visible {
            return Err(ArticleServiceError::NotFound(format!("article {}", id)));
        }
        Ok(detail)
    }

    /// Fetch an article for editing by its author
    pub async fn get_owned(&self, user: &User, id: i64) -> Result<ArticleDetail, ArticleServiceError> {
        let detail = self.get_by_id(id, ArticleIncludes::categories()).await?;
        if detail.item.article.author_id != user.id {
            tracing::warn!(article_id = id, user_id = user.id, "article access refused");
            return Err(ArticleServiceError::Forbidden);
        }
        Ok(detail)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Validate and insert an article with its categories
    pub async fn create(&self, mut input: CreateArticleInput) -> Result<Article, ArticleServiceError> {
        input.title = validate_title(&input.title)?;
        validate_content(&input.content)?;
        input.source = normalize_source(input.source)?;
        self.validate_categories(&input.category_ids).await?;

        let article = self.repo.create(&input).await?;
        tracing::info!(
            article_id = article.id,
            author_id = article.author_id,
            status = %article.status,
            "article created"
        );
        Ok(article)
    }

    /// Apply a partial update; only `Set` fields change
    pub async fn update(
        &self,
        id: i64,
        mut input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        if self.repo.get_by_id(id).await?.is_none() {
            return Err(ArticleServiceError::NotFound(format!("article {}", id)));
        }

        if let Patch::Set(title) = &input.title {
            input.title = Patch::Set(validate_title(title)?);
        }
        if let Patch::Set(content) = &input.content {
            validate_content(content)?;
        }
        if let Patch::Set(source) = std::mem::take(&mut input.source) {
            input.source = Patch::Set(normalize_source(source)?);
        }
        if let Patch::Set(category_ids) = &input.category_ids {
            self.validate_categories(category_ids).await?;
        }

        self.repo.update(id, &input).await?;
        tracing::info!(article_id = id, "article updated");

        let updated = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ArticleServiceError::NotFound(format!("article {}", id)))?;
        Ok(updated.article)
    }

    /// Update on behalf of a user; only the author may
    pub async fn update_as(
        &self,
        user: &User,
        id: i64,
        input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        self.get_owned(user, id).await?;
        self.update(id, input).await
    }

    /// Change only the moderation status
    pub async fn set_status(
        &self,
        id: i64,
        status: ArticleStatus,
    ) -> Result<Article, ArticleServiceError> {
        self.update(id, UpdateArticleInput::new().with_status(status)).await
    }

    pub async fn delete(&self, id: i64) -> Result<(), ArticleServiceError> {
        if self.repo.get_by_id(id).await?.is_none() {
            return Err(ArticleServiceError::NotFound(format!("article {}", id)));
        }
        self.repo.delete(id).await?;
        tracing::info!(article_id = id, "article deleted");
        Ok(())
    }

    /// Delete on behalf of a user; only the author may
    pub async fn delete_as(&self, user: &User, id: i64) -> Result<(), ArticleServiceError> {
        self.get_owned(user, id).await?;
        self.delete(id).await
    }

    async fn validate_categories(&self, ids: &[i64]) -> Result<(), ArticleServiceError> {
        if ids.is_empty() {
            return Err(ArticleServiceError::ValidationError(
                "Choose at least one category".to_string(),
            ));
        }
        let existing = self.category_repo.existing_ids(ids).await?;
        if let Some(missing) = ids.iter().find(|id| !existing.contains(id)) {
            return Err(ArticleServiceError::ValidationError(format!(
                "Unknown category: {}",
                missing
            )));
        }
        Ok(())
    }
}

/// Trimmed title, or the rule it breaks
fn validate_title(title: &str) -> Result<String, ArticleServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ArticleServiceError::ValidationError(
            "Article title cannot be empty".to_string(),
        ));
    }
    if title.chars().count() > TITLE_MAX_LEN {
        return Err(ArticleServiceError::ValidationError(format!(
            "Article title cannot exceed {} characters",
            TITLE_MAX_LEN
        )));
    }
    Ok(title.to_string())
}

fn validate_content(content: &str) -> Result<(), ArticleServiceError> {
    if content.trim().is_empty() {
        return Err(ArticleServiceError::ValidationError(
            "Article content cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn source_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^https?://[^\s/?#.][^\s/?#]*(?:[/?#]\S*)?$").ok())
        .as_ref()
}

/// Blank sources become `None`; anything else must be an http(s) URL
pub(crate) fn normalize_source(source: Option<String>) -> Result<Option<String>, ArticleServiceError> {
    let Some(source) = source else {
        return Ok(None);
    };
    let source = source.trim();
    if source.is_empty() {
        return Ok(None);
    }
    if source.chars().count() > SOURCE_MAX_LEN {
        return Err(ArticleServiceError::ValidationError(format!(
            "Source URL cannot exceed {} characters",
            SOURCE_MAX_LEN
        )));
    }
    if !source_url_pattern().is_some_and(|re| re.is_match(source)) {
        return Err(ArticleServiceError::ValidationError(
            "Enter a valid URL".to_string(),
        ));
    }
    Ok(Some(source.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxArticleRepository, SqlxCategoryRepository, SqlxCommentRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use chrono::Utc;
    use proptest::prelude::*;

    async fn setup_test_service() -> (DynDatabasePool, ArticleService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        for sql in [
            "INSERT INTO users (username, email, password_hash) VALUES ('alice', 'alice@example.com', 'h')",
            "INSERT INTO users (username, email, password_hash) VALUES ('bob', 'bob@example.com', 'h')",
            "INSERT INTO categories (name, slug) VALUES ('Tech', 'tech')",
            "INSERT INTO categories (name, slug) VALUES ('Art', 'art')",
        ] {
            pool.execute(sql).await.expect("Failed to seed");
        }

        let service = ArticleService::new(
            SqlxArticleRepository::boxed(pool.clone()),
            SqlxCategoryRepository::boxed(pool.clone()),
            SqlxCommentRepository::boxed(pool.clone()),
        );
        (pool, service)
    }

    fn user(id: i64, is_superuser: bool) -> User {
        User {
            id,
            username: format!("user{}", id),
            email: format!("user{}@example.com", id),
            password_hash: String::new(),
            avatar: String::new(),
            is_staff: is_superuser,
            is_superuser,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn draft(author_id: i64, title: &str, category_ids: Vec<i64>) -> CreateArticleInput {
        CreateArticleInput::new(author_id, title.to_string(), "Some body".to_string(), category_ids)
    }

    async fn publish(service: &ArticleService, author_id: i64, title: &str, category_ids: Vec<i64>) -> Article {
        service
            .create(draft(author_id, title, category_ids).with_status(ArticleStatus::Published))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_then_get_has_exact_categories() {
        let (_pool, service) = setup_test_service().await;
        let article = service.create(draft(1, "Hello", vec![2, 1])).await.unwrap();
        assert_eq!(article.status, ArticleStatus::Moderated);

        let detail = service.get_by_id(article.id, ArticleIncludes::all()).await.unwrap();
        let mut ids: Vec<i64> = detail.item.categories.iter().map(|c| c.id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert!(detail.comments.is_empty());
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (_pool, service) = setup_test_service().await;

        for input in [
            draft(1, "   ", vec![1]),
            draft(1, &"t".repeat(TITLE_MAX_LEN + 1), vec![1]),
            CreateArticleInput::new(1, "Title".into(), " ".into(), vec![1]),
            draft(1, "No categories", vec![]),
            draft(1, "Unknown category", vec![1, 99]),
            draft(1, "Bad source", vec![1]).with_source("ftp://example.com"),
        ] {
            assert!(matches!(
                service.create(input).await,
                Err(ArticleServiceError::ValidationError(_))
            ));
        }
        assert_eq!(
            service.list_by_author(1, None, PageRequest::first(10), ArticleOrdering::Newest)
                .await
                .unwrap()
                .total_count,
            0
        );
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let (_pool, service) = setup_test_service().await;
        assert!(matches!(
            service.get_by_id(7, ArticleIncludes::default()).await,
            Err(ArticleServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_by_id_eager_loads_comments_newest_first() {
        let (pool, service) = setup_test_service().await;
        let article = publish(&service, 1, "Talked about", vec![1]).await;
        for text in ["first", "second"] {
            pool.execute(&format!(
                "INSERT INTO comments (article_id, author_id, content, created_at) VALUES ({}, 2, '{}', '2026-01-0{}T00:00:00Z')",
                article.id,
                text,
                if text == "first" { 1 } else { 2 }
            ))
            .await
            .unwrap();
        }

        let detail = service.get_by_id(article.id, ArticleIncludes::all()).await.unwrap();
        assert_eq!(detail.item.comment_count, 2);
        let contents: Vec<&str> = detail.comments.iter().map(|c| c.comment.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);
        assert_eq!(detail.comments[0].author.username, "bob");
    }

    #[tokio::test]
    async fn test_list_by_author_filters_and_orders() {
        let (_pool, service) = setup_test_service().await;
        publish(&service, 1, "a-pub-1", vec![1]).await;
        service.create(draft(1, "a-mod", vec![1])).await.unwrap();
        publish(&service, 2, "b-pub", vec![1]).await;
        publish(&service, 1, "a-pub-2", vec![1]).await;

        let page = service
            .list_by_author(1, Some(ArticleStatus::Published), PageRequest::first(10), ArticleOrdering::Newest)
            .await
            .unwrap();
        let titles: Vec<&str> = page.items.iter().map(|a| a.article.title.as_str()).collect();
        assert_eq!(titles, vec!["a-pub-2", "a-pub-1"]);
        assert!(page
            .items
            .iter()
            .all(|a| a.article.author_id == 1 && a.article.status == ArticleStatus::Published));
    }

    #[tokio::test]
    async fn test_list_by_category_only_published() {
        let (_pool, service) = setup_test_service().await;
        publish(&service, 1, "one", vec![1]).await;
        publish(&service, 1, "two", vec![1, 2]).await;
        let rejected = service.create(draft(1, "three", vec![1])).await.unwrap();
        service.set_status(rejected.id, ArticleStatus::Rejected).await.unwrap();

        let (category, page) = service
            .list_by_category("tech", PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(category.name, "Tech");
        assert_eq!(page.total_count, 2);
        assert!(page.items.iter().all(|a| a.categories.iter().any(|c| c.slug == "tech")));

        assert!(matches!(
            service.list_by_category("nope", PageRequest::first(10)).await,
            Err(ArticleServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search_examples() {
        let (_pool, service) = setup_test_service().await;
        publish(&service, 1, "Hello World", vec![1]).await;
        service.create(draft(1, "Hello draft", vec![1])).await.unwrap();

        let found = service
            .search("hello", PageRequest::first(10), ArticleOrdering::Newest, None)
            .await
            .unwrap();
        assert_eq!(found.total_count, 1);
        assert_eq!(found.items[0].article.title, "Hello World");
        assert_eq!(found.items[0].author.username, "alice");

        let none = service
            .search("nonexistent-token", PageRequest::first(10), ArticleOrdering::Newest, None)
            .await
            .unwrap();
        assert_eq!(none.total_count, 0);
        assert!(!none.is_paginated);
        assert!(none.items.is_empty());
    }

    #[tokio::test]
    async fn test_search_ignores_cyrillic_case() {
        let (_pool, service) = setup_test_service().await;
        publish(&service, 1, "Привет Мир", vec![1]).await;

        for query in ["Привет", "привет", "ПРИВЕТ"] {
            let found = service
                .search(query, PageRequest::first(10), ArticleOrdering::Newest, None)
                .await
                .unwrap();
            assert_eq!(found.total_count, 1, "{}", query);
            assert_eq!(found.items[0].article.title, "Привет Мир");
        }
    }

    #[tokio::test]
    async fn test_search_with_category_and_blank_query() {
        let (_pool, service) = setup_test_service().await;
        publish(&service, 1, "Rust news", vec![1]).await;
        publish(&service, 1, "Rust art", vec![2]).await;

        let in_art = service
            .search("rust", PageRequest::first(10), ArticleOrdering::Newest, Some("art"))
            .await
            .unwrap();
        assert_eq!(in_art.total_count, 1);
        assert_eq!(in_art.items[0].article.title, "Rust art");

        let everything = service
            .search("  ", PageRequest::first(10), ArticleOrdering::TitleAsc, None)
            .await
            .unwrap();
        let titles: Vec<&str> = everything.items.iter().map(|a| a.article.title.as_str()).collect();
        assert_eq!(titles, vec!["Rust art", "Rust news"]);

        let unknown = service
            .search("rust", PageRequest::first(10), ArticleOrdering::Newest, Some("missing"))
            .await
            .unwrap();
        assert_eq!(unknown.total_count, 0);
    }

    #[tokio::test]
    async fn test_out_of_range_page_clamps() {
        let (_pool, service) = setup_test_service().await;
        for i in 0..3 {
            publish(&service, 1, &format!("p{}", i), vec![1]).await;
        }
        let page = service
            .list_by_status(ArticleStatus::Published, PageRequest::new(50, 2))
            .await
            .unwrap();
        assert_eq!(page.page_info.number, 2);
        assert_eq!(page.items.len(), 1);
        assert!(page.is_paginated);
    }

    #[tokio::test]
    async fn test_status_listings_agree() {
        let (pool, service) = setup_test_service().await;
        let older = publish(&service, 1, "older", vec![1]).await;
        let newer = publish(&service, 2, "newer", vec![2]).await;
        service.create(draft(1, "pending", vec![1])).await.unwrap();
        pool.execute(&format!(
            "INSERT INTO comments (article_id, author_id, content) VALUES ({}, 2, 'hi')",
            older.id
        ))
        .await
        .unwrap();

        let counted = service
            .list_with_comment_counts(ArticleStatus::Published, PageRequest::first(10))
            .await
            .unwrap();
        let by_status = service
            .list_by_status(ArticleStatus::Published, PageRequest::first(10))
            .await
            .unwrap();

        let summary = |paged: &Paged<ArticleWithMeta>| -> Vec<(i64, i64)> {
            paged.items.iter().map(|a| (a.article.id, a.comment_count)).collect()
        };
        assert_eq!(summary(&counted), vec![(newer.id, 0), (older.id, 1)]);
        assert_eq!(summary(&by_status), summary(&counted));
        assert_eq!(by_status.total_count, 2);
    }

    #[tokio::test]
    async fn test_derived_views() {
        let (pool, service) = setup_test_service().await;
        let quiet = publish(&service, 1, "quiet", vec![1]).await;
        let loud = publish(&service, 1, "loud", vec![1]).await;
        pool.execute(&format!(
            "INSERT INTO comments (article_id, author_id, content) VALUES ({}, 2, 'hi')",
            loud.id
        ))
        .await
        .unwrap();

        let top = service.most_commented(1).await.unwrap();
        assert_eq!(top[0].article.id, loud.id);
        assert_eq!(service.popular(5).await.unwrap().len(), 2);

        let silent = service.without_comments(PageRequest::first(10)).await.unwrap();
        assert_eq!(silent.total_count, 1);
        assert_eq!(silent.items[0].article.id, quiet.id);
    }

    #[tokio::test]
    async fn test_update_title_only() {
        let (_pool, service) = setup_test_service().await;
        let article = publish(&service, 1, "Before", vec![1, 2]).await;

        let updated = service
            .update(article.id, UpdateArticleInput::new().with_title("  After  "))
            .await
            .unwrap();
        assert_eq!(updated.title, "After");
        assert_eq!(updated.content, "Some body");
        assert_eq!(updated.status, ArticleStatus::Published);

        let detail = service.get_by_id(article.id, ArticleIncludes::categories()).await.unwrap();
        assert_eq!(detail.item.categories.len(), 2);
    }

    #[tokio::test]
    async fn test_update_blank_source_clears_it() {
        let (_pool, service) = setup_test_service().await;
        let article = service
            .create(draft(1, "Sourced", vec![1]).with_source("https://example.com/x"))
            .await
            .unwrap();
        assert_eq!(article.source.as_deref(), Some("https://example.com/x"));

        let updated = service
            .update(article.id, UpdateArticleInput::new().with_source(Some("   ".into())))
            .await
            .unwrap();
        assert_eq!(updated.source, None);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing() {
        let (_pool, service) = setup_test_service().await;
        assert!(matches!(
            service.update(5, UpdateArticleInput::new().with_title("x")).await,
            Err(ArticleServiceError::NotFound(_))
        ));
        assert!(matches!(service.delete(5).await, Err(ArticleServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_non_author_cannot_update_or_delete() {
        let (_pool, service) = setup_test_service().await;
        let article = publish(&service, 1, "Mine", vec![1]).await;
        let bob = user(2, false);

        assert!(matches!(
            service
                .update_as(&bob, article.id, UpdateArticleInput::new().with_title("Stolen"))
                .await,
            Err(ArticleServiceError::Forbidden)
        ));
        assert!(matches!(
            service.delete_as(&bob, article.id).await,
            Err(ArticleServiceError::Forbidden)
        ));

        let detail = service.get_by_id(article.id, ArticleIncludes::default()).await.unwrap();
        assert_eq!(detail.item.article.title, "Mine");

        service.delete_as(&user(1, false), article.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_visible_hides_unpublished() {
        let (_pool, service) = setup_test_service().await;
        let article = service.create(draft(1, "Pending", vec![1])).await.unwrap();

        for viewer in [None, Some(user(2, false))] {
            assert!(matches!(
                service.get_visible(article.id, viewer.as_ref(), ArticleIncludes::default()).await,
                Err(ArticleServiceError::NotFound(_))
            ));
        }
        for viewer in [user(1, false), user(2, true)] {
            assert!(service
                .get_visible(article.id, Some(&viewer), ArticleIncludes::default())
                .await
                .is_ok());
        }
    }

    #[tokio::test]
    async fn test_counts_by_status() {
        let (_pool, service) = setup_test_service().await;
        publish(&service, 1, "p", vec![1]).await;
        service.create(draft(1, "m1", vec![1])).await.unwrap();
        service.create(draft(1, "m2", vec![1])).await.unwrap();

        let counts = service.counts_by_status().await.unwrap();
        assert_eq!(
            counts,
            vec![
                (ArticleStatus::Moderated, 2),
                (ArticleStatus::Published, 1),
                (ArticleStatus::Rejected, 0),
            ]
        );
    }

    #[test]
    fn test_normalize_source() {
        assert_eq!(normalize_source(None).unwrap(), None);
        assert_eq!(normalize_source(Some("".into())).unwrap(), None);
        assert_eq!(
            normalize_source(Some(" https://example.com/a?b=c ".into())).unwrap(),
            Some("https://example.com/a?b=c".to_string())
        );
        assert!(normalize_source(Some("example.com".into())).is_err());
        assert!(normalize_source(Some("javascript:alert(1)".into())).is_err());
        let long = format!("https://example.com/{}", "a".repeat(SOURCE_MAX_LEN));
        assert!(normalize_source(Some(long)).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_http_urls_accepted(host in "[a-z]{1,20}\\.[a-z]{2,5}", path in "[a-z0-9/]{0,30}") {
            let url = format!("https://{}/{}", host, path);
            prop_assert_eq!(normalize_source(Some(url.clone())).unwrap(), Some(url));
        }
    }
}
