//! Article repository
//!
//! Database operations for articles.
//!
//! This module provides:
//! - `ArticleRepository` trait defining the interface for article data access
//! - `SqlxArticleRepository` implementing the trait for SQLite and MySQL
//!
//! Listings are composed from an [`ArticleFilter`] and an [`ArticleOrdering`]
//! into one SELECT over the `a` alias, annotated with the comment count.
//! Writes touching the category set run inside a transaction.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{
    Article, ArticleFilter, ArticleOrdering, ArticleStatus, ArticleWithMeta, CreateArticleInput,
    Patch, UpdateArticleInput, UserSummary,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article together with its category set
    async fn create(&self, input: &CreateArticleInput) -> Result<Article>;

    /// Get article by ID with author and comment count; categories are not loaded
    async fn get_by_id(&self, id: i64) -> Result<Option<ArticleWithMeta>>;

    /// List articles matching the filter; categories are not loaded
    async fn list(
        &self,
        filter: &ArticleFilter,
        ordering: ArticleOrdering,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ArticleWithMeta>>;

    /// Count articles matching the filter
    async fn count(&self, filter: &ArticleFilter) -> Result<i64>;

    /// Apply a partial update; a set category list replaces the whole set
    async fn update(&self, id: i64, input: &UpdateArticleInput) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based article repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(&self, input: &CreateArticleInput) -> Result<Article> {
        match self.pool.backend() {
            Backend::Sqlite(p) => create_article_sqlite(p, input).await,
            Backend::Mysql(p) => create_article_mysql(p, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<ArticleWithMeta>> {
        let sql = format!("{} WHERE a.id = ?", ARTICLE_META_SELECT);
        let binds = vec![Bind::Int(id)];
        let mut rows = match self.pool.backend() {
            Backend::Sqlite(p) => fetch_articles_sqlite(p, &sql, &binds).await,
            Backend::Mysql(p) => fetch_articles_mysql(p, &sql, &binds).await,
        }
        .context("Failed to get article by ID")?;
        Ok(rows.pop())
    }

    async fn list(
        &self,
        filter: &ArticleFilter,
        ordering: ArticleOrdering,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<ArticleWithMeta>> {
        let (where_clause, mut binds) = build_where(filter);
        let sql = format!(
            "{}{} ORDER BY {} LIMIT ? OFFSET ?",
            ARTICLE_META_SELECT,
            where_clause,
            ordering.order_by_sql()
        );
        binds.push(Bind::Int(limit));
        binds.push(Bind::Int(offset));

        let result = match self.pool.backend() {
            Backend::Sqlite(p) => fetch_articles_sqlite(p, &sql, &binds).await,
            Backend::Mysql(p) => fetch_articles_mysql(p, &sql, &binds).await,
        };
        result.context("Failed to list articles")
    }

    async fn count(&self, filter: &ArticleFilter) -> Result<i64> {
        let (where_clause, binds) = build_where(filter);
        let sql = format!("SELECT COUNT(*) AS count FROM articles a{}", where_clause);

        let result = match self.pool.backend() {
            Backend::Sqlite(p) => count_articles_sqlite(p, &sql, &binds).await,
            Backend::Mysql(p) => count_articles_mysql(p, &sql, &binds).await,
        };
        result.context("Failed to count articles")
    }

    async fn update(&self, id: i64, input: &UpdateArticleInput) -> Result<()> {
        match self.pool.backend() {
            Backend::Sqlite(p) => update_article_sqlite(p, id, input).await,
            Backend::Mysql(p) => update_article_mysql(p, id, input).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM articles WHERE id = ?";
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
        };
        result.context("Failed to delete article")
    }
}

// ============================================================================
// Query composition
// ============================================================================

const ARTICLE_META_SELECT: &str = r#"
    SELECT a.id, a.title, a.content, a.author_id, a.status, a.source, a.image,
           a.created_at, a.updated_at,
           u.username AS author_username, u.avatar AS author_avatar,
           (SELECT COUNT(*) FROM comments cm WHERE cm.article_id = a.id) AS comment_count
    FROM articles a
    INNER JOIN users u ON u.id = a.author_id
"#;

/// A bound query parameter
#[derive(Debug, Clone, PartialEq)]
enum Bind {
    Int(i64),
    Text(String),
    OptText(Option<String>),
    Time(DateTime<Utc>),
}

/// Escape `%`, `_` and the `!` escape character so user input matches literally
pub(crate) fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for ch in query.chars() {
        if matches!(ch, '!' | '%' | '_') {
            escaped.push('!');
        }
        escaped.push(ch);
    }
    escaped
}

/// Lowercase form stored next to title and content for searching
pub(crate) fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// WHERE clause (with leading space, or empty) and its parameters
fn build_where(filter: &ArticleFilter) -> (String, Vec<Bind>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("a.status = ?");
        binds.push(Bind::Text(status.as_str().to_string()));
    }
    if let Some(author_id) = filter.author_id {
        conditions.push("a.author_id = ?");
        binds.push(Bind::Int(author_id));
    }
    if let Some(category_id) = filter.category_id {
        conditions.push(
            "EXISTS (SELECT 1 FROM article_categories ac WHERE ac.article_id = a.id AND ac.category_id = ?)",
        );
        binds.push(Bind::Int(category_id));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        // Folded in Rust: SQLite's LOWER() is ASCII-only
        conditions.push("(a.title_folded LIKE ? ESCAPE '!' OR a.content_folded LIKE ? ESCAPE '!')");
        let pattern = format!("%{}%", escape_like(&fold_case(search)));
        binds.push(Bind::Text(pattern.clone()));
        binds.push(Bind::Text(pattern));
    }
    if filter.without_comments {
        conditions.push("NOT EXISTS (SELECT 1 FROM comments cm WHERE cm.article_id = a.id)");
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

/// SET clause for a partial update; `updated_at` is always written
fn build_assignments(input: &UpdateArticleInput, now: DateTime<Utc>) -> (String, Vec<Bind>) {
    let mut sets = Vec::new();
    let mut binds = Vec::new();

    if let Patch::Set(title) = &input.title {
        sets.push("title = ?");
        sets.push("title_folded = ?");
        binds.push(Bind::Text(title.clone()));
        binds.push(Bind::Text(fold_case(title)));
    }
    if let Patch::Set(content) = &input.content {
        sets.push("content = ?");
        sets.push("content_folded = ?");
        binds.push(Bind::Text(content.clone()));
        binds.push(Bind::Text(fold_case(content)));
    }
    if let Patch::Set(source) = &input.source {
        sets.push("source = ?");
        binds.push(Bind::OptText(source.clone()));
    }
    if let Patch::Set(image) = &input.image {
        sets.push("image = ?");
        binds.push(Bind::OptText(image.clone()));
    }
    if let Patch::Set(status) = &input.status {
        sets.push("status = ?");
        binds.push(Bind::Text(status.as_str().to_string()));
    }
    sets.push("updated_at = ?");
    binds.push(Bind::Time(now));

    (sets.join(", "), binds)
}

/// Category ids without duplicates, in ascending order
fn unique_ids(ids: &[i64]) -> BTreeSet<i64> {
    ids.iter().copied().collect()
}

fn parse_status(value: &str) -> ArticleStatus {
    ArticleStatus::from_str(value).unwrap_or_default()
}

const INSERT_ARTICLE_SQL: &str = r#"
    INSERT INTO articles (title, content, title_folded, content_folded, author_id, status, source, image, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
"#;

const INSERT_ARTICLE_CATEGORY_SQL: &str =
    "INSERT INTO article_categories (article_id, category_id) VALUES (?, ?)";

const DELETE_ARTICLE_CATEGORIES_SQL: &str = "DELETE FROM article_categories WHERE article_id = ?";

fn article_from_input(id: i64, input: &CreateArticleInput, now: DateTime<Utc>) -> Article {
    Article {
        id,
        title: input.title.clone(),
        content: input.content.clone(),
        author_id: input.author_id,
        status: input.status,
        source: input.source.clone(),
        image: input.image.clone(),
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

fn bind_all_sqlite<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    for bind in binds {
        query = match bind {
            Bind::Int(v) => query.bind(*v),
            Bind::Text(v) => query.bind(v.as_str()),
            Bind::OptText(v) => query.bind(v.as_deref()),
            Bind::Time(v) => query.bind(*v),
        };
    }
    query
}

async fn fetch_articles_sqlite(
    pool: &SqlitePool,
    sql: &str,
    binds: &[Bind],
) -> Result<Vec<ArticleWithMeta>> {
    let rows = bind_all_sqlite(sqlx::query(sql), binds).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_article_meta_sqlite).collect())
}

async fn count_articles_sqlite(pool: &SqlitePool, sql: &str, binds: &[Bind]) -> Result<i64> {
    let row = bind_all_sqlite(sqlx::query(sql), binds).fetch_one(pool).await?;
    Ok(row.get::<i64, _>("count"))
}

async fn create_article_sqlite(pool: &SqlitePool, input: &CreateArticleInput) -> Result<Article> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(INSERT_ARTICLE_SQL)
        .bind(&input.title)
        .bind(&input.content)
        .bind(fold_case(&input.title))
        .bind(fold_case(&input.content))
        .bind(input.author_id)
        .bind(input.status.as_str())
        .bind(input.source.as_deref())
        .bind(input.image.as_deref())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create article")?;
    let id = result.last_insert_rowid();

    for category_id in unique_ids(&input.category_ids) {
        sqlx::query(INSERT_ARTICLE_CATEGORY_SQL)
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to assign article category")?;
    }

    tx.commit().await.context("Failed to commit article")?;
    Ok(article_from_input(id, input, now))
}

async fn update_article_sqlite(
    pool: &SqlitePool,
    id: i64,
    input: &UpdateArticleInput,
) -> Result<()> {
    let (assignments, mut binds) = build_assignments(input, Utc::now());
    binds.push(Bind::Int(id));
    let sql = format!("UPDATE articles SET {} WHERE id = ?", assignments);

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    bind_all_sqlite(sqlx::query(&sql), &binds)
        .execute(&mut *tx)
        .await
        .context("Failed to update article")?;

    if let Patch::Set(category_ids) = &input.category_ids {
        sqlx::query(DELETE_ARTICLE_CATEGORIES_SQL)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear article categories")?;
        for category_id in unique_ids(category_ids) {
            sqlx::query(INSERT_ARTICLE_CATEGORY_SQL)
                .bind(id)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to assign article category")?;
        }
    }

    tx.commit().await.context("Failed to commit article update")?;
    Ok(())
}

fn row_to_article_meta_sqlite(row: &sqlx::sqlite::SqliteRow) -> ArticleWithMeta {
    let status: String = row.get("status");
    let article = Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        status: parse_status(&status),
        source: row.get("source"),
        image: row.get("image"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    ArticleWithMeta {
        author: UserSummary {
            id: article.author_id,
            username: row.get("author_username"),
            avatar: row.get("author_avatar"),
        },
        comment_count: row.get("comment_count"),
        categories: Vec::new(),
        article,
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

fn bind_all_mysql<'q>(
    mut query: sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments>,
    binds: &'q [Bind],
) -> sqlx::query::Query<'q, sqlx::MySql, sqlx::mysql::MySqlArguments> {
    for bind in binds {
        query = match bind {
            Bind::Int(v) => query.bind(*v),
            Bind::Text(v) => query.bind(v.as_str()),
            Bind::OptText(v) => query.bind(v.as_deref()),
            Bind::Time(v) => query.bind(*v),
        };
    }
    query
}

async fn fetch_articles_mysql(
    pool: &MySqlPool,
    sql: &str,
    binds: &[Bind],
) -> Result<Vec<ArticleWithMeta>> {
    let rows = bind_all_mysql(sqlx::query(sql), binds).fetch_all(pool).await?;
    Ok(rows.iter().map(row_to_article_meta_mysql).collect())
}

async fn count_articles_mysql(pool: &MySqlPool, sql: &str, binds: &[Bind]) -> Result<i64> {
    let row = bind_all_mysql(sqlx::query(sql), binds).fetch_one(pool).await?;
    Ok(row.get::<i64, _>("count"))
}

async fn create_article_mysql(pool: &MySqlPool, input: &CreateArticleInput) -> Result<Article> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let result = sqlx::query(INSERT_ARTICLE_SQL)
        .bind(&input.title)
        .bind(&input.content)
        .bind(fold_case(&input.title))
        .bind(fold_case(&input.content))
        .bind(input.author_id)
        .bind(input.status.as_str())
        .bind(input.source.as_deref())
        .bind(input.image.as_deref())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .context("Failed to create article")?;
    let id = result.last_insert_id() as i64;

    for category_id in unique_ids(&input.category_ids) {
        sqlx::query(INSERT_ARTICLE_CATEGORY_SQL)
            .bind(id)
            .bind(category_id)
            .execute(&mut *tx)
            .await
            .context("Failed to assign article category")?;
    }

    tx.commit().await.context("Failed to commit article")?;
    Ok(article_from_input(id, input, now))
}

async fn update_article_mysql(pool: &MySqlPool, id: i64, input: &UpdateArticleInput) -> Result<()> {
    let (assignments, mut binds) = build_assignments(input, Utc::now());
    binds.push(Bind::Int(id));
    let sql = format!("UPDATE articles SET {} WHERE id = ?", assignments);

    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    bind_all_mysql(sqlx::query(&sql), &binds)
        .execute(&mut *tx)
        .await
        .context("Failed to update article")?;

    if let Patch::Set(category_ids) = &input.category_ids {
        sqlx::query(DELETE_ARTICLE_CATEGORIES_SQL)
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear article categories")?;
        for category_id in unique_ids(category_ids) {
            sqlx::query(INSERT_ARTICLE_CATEGORY_SQL)
                .bind(id)
                .bind(category_id)
                .execute(&mut *tx)
                .await
                .context("Failed to assign article category")?;
        }
    }

    tx.commit().await.context("Failed to commit article update")?;
    Ok(())
}

fn row_to_article_meta_mysql(row: &sqlx::mysql::MySqlRow) -> ArticleWithMeta {
    let status: String = row.get("status");
    let article = Article {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author_id: row.get("author_id"),
        status: parse_status(&status),
        source: row.get("source"),
        image: row.get("image"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    };
    ArticleWithMeta {
        author: UserSummary {
            id: article.author_id,
            username: row.get("author_username"),
            avatar: row.get("author_avatar"),
        },
        comment_count: row.get("comment_count"),
        categories: Vec::new(),
        article,
    }
}
