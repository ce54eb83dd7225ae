//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Comment, CommentWithMeta, CreateCommentInput, UserSummary};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Comments on one article, newest first
    async fn list_for_article(
        &self,
        article_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<CommentWithMeta>>;

    async fn count_for_article(&self, article_id: i64) -> Result<i64>;

    /// Comments across all articles, newest first
    async fn list_all(&self, offset: i64, limit: i64) -> Result<Vec<CommentWithMeta>>;

    async fn count_all(&self) -> Result<i64>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const COMMENT_META_SELECT: &str = r#"
    SELECT c.id, c.article_id, c.author_id, c.content, c.created_at, c.updated_at,
           u.username AS author_username, u.avatar AS author_avatar,
           a.title AS article_title
    FROM comments c
    INNER JOIN users u ON u.id = c.author_id
    INNER JOIN articles a ON a.id = c.article_id
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, input: &CreateCommentInput) -> Result<Comment> {
        match self.pool.backend() {
            Backend::Sqlite(p) => create_comment_sqlite(p, input).await,
            Backend::Mysql(p) => create_comment_mysql(p, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = "SELECT id, article_id, author_id, content, created_at, updated_at FROM comments WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get comment by ID")?;
                Ok(row.as_ref().map(row_to_comment_sqlite))
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get comment by ID")?;
                Ok(row.as_ref().map(row_to_comment_mysql))
            }
        }
    }

    async fn list_for_article(
        &self,
        article_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<CommentWithMeta>> {
        let sql = format!(
            "{} WHERE c.article_id = ? ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            COMMENT_META_SELECT
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(&sql)
                    .bind(article_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list comments for article")?;
                Ok(rows.iter().map(row_to_comment_meta_sqlite).collect())
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(&sql)
                    .bind(article_id)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list comments for article")?;
                Ok(rows.iter().map(row_to_comment_meta_mysql).collect())
            }
        }
    }

    async fn count_for_article(&self, article_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM comments WHERE article_id = ?";
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(article_id)
                .fetch_one(p)
                .await
                .map(|r| r.get::<i64, _>("count")),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(article_id)
                .fetch_one(p)
                .await
                .map(|r| r.get::<i64, _>("count")),
        };
        result.context("Failed to count comments for article")
    }

    async fn list_all(&self, offset: i64, limit: i64) -> Result<Vec<CommentWithMeta>> {
        let sql = format!(
            "{} ORDER BY c.created_at DESC, c.id DESC LIMIT ? OFFSET ?",
            COMMENT_META_SELECT
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list comments")?;
                Ok(rows.iter().map(row_to_comment_meta_sqlite).collect())
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(&sql)
                    .bind(limit)
                    .bind(offset)
                    .fetch_all(p)
                    .await
                    .context("Failed to list comments")?;
                Ok(rows.iter().map(row_to_comment_meta_mysql).collect())
            }
        }
    }

    async fn count_all(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM comments";
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .fetch_one(p)
                .await
                .map(|r| r.get::<i64, _>("count")),
            Backend::Mysql(p) => sqlx::query(sql)
                .fetch_one(p)
                .await
                .map(|r| r.get::<i64, _>("count")),
        };
        result.context("Failed to count comments")
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM comments WHERE id = ?";
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
        };
        result.context("Failed to delete comment")
    }
}

fn comment_from_input(id: i64, input: &CreateCommentInput, now: chrono::DateTime<Utc>) -> Comment {
    Comment {
        id,
        article_id: input.article_id,
        author_id: input.author_id,
        content: input.content.clone(),
        created_at: now,
        updated_at: now,
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_comment_sqlite(pool: &SqlitePool, input: &CreateCommentInput) -> Result<Comment> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO comments (article_id, author_id, content, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.article_id)
    .bind(input.author_id)
    .bind(&input.content)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(comment_from_input(result.last_insert_rowid(), input, now))
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        article_id: row.get("article_id"),
        author_id: row.get("author_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_comment_meta_sqlite(row: &sqlx::sqlite::SqliteRow) -> CommentWithMeta {
    let comment = row_to_comment_sqlite(row);
    CommentWithMeta {
        author: UserSummary {
            id: comment.author_id,
            username: row.get("author_username"),
            avatar: row.get("author_avatar"),
        },
        article_title: row.get("article_title"),
        comment,
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_comment_mysql(pool: &MySqlPool, input: &CreateCommentInput) -> Result<Comment> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO comments (article_id, author_id, content, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(input.article_id)
    .bind(input.author_id)
    .bind(&input.content)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(comment_from_input(result.last_insert_id() as i64, input, now))
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    Comment {
        id: row.get("id"),
        article_id: row.get("article_id"),
        author_id: row.get("author_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn row_to_comment_meta_mysql(row: &sqlx::mysql::MySqlRow) -> CommentWithMeta {
    let comment = row_to_comment_mysql(row);
    CommentWithMeta {
        author: UserSummary {
            id: comment.author_id,
            username: row.get("author_username"),
            avatar: row.get("author_avatar"),
        },
        article_title: row.get("article_title"),
        comment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCommentRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (username, email, password_hash) VALUES ('alice', 'alice@example.com', 'h')",
        )
        .await
        .expect("Failed to create user");
        pool.execute(
            "INSERT INTO articles (title, content, author_id, status) VALUES ('First', 'body', 1, 'published')",
        )
        .await
        .expect("Failed to create article");
        pool.execute(
            "INSERT INTO articles (title, content, author_id, status) VALUES ('Second', 'body', 1, 'published')",
        )
        .await
        .expect("Failed to create article");
        let repo = SqlxCommentRepository::new(pool.clone());
        (pool, repo)
    }

    fn input(article_id: i64, content: &str) -> CreateCommentInput {
        CreateCommentInput {
            article_id,
            author_id: 1,
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get_comment() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&input(1, "Nice post")).await.unwrap();

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.content, "Nice post");
        assert_eq!(found.article_id, 1);
        assert!(repo.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_for_missing_article_fails() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(repo.create(&input(999, "orphan")).await.is_err());
    }

    #[tokio::test]
    async fn test_list_for_article_newest_first_with_meta() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&input(1, "one")).await.unwrap();
        repo.create(&input(1, "two")).await.unwrap();
        repo.create(&input(2, "elsewhere")).await.unwrap();
        repo.create(&input(1, "three")).await.unwrap();

        let comments = repo.list_for_article(1, 0, 20).await.unwrap();
        let contents: Vec<&str> = comments.iter().map(|c| c.comment.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two", "one"]);
        assert_eq!(comments[0].author.username, "alice");
        assert_eq!(comments[0].article_title, "First");

        assert_eq!(repo.count_for_article(1).await.unwrap(), 3);
        assert_eq!(repo.count_for_article(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_for_article_pages() {
        let (_pool, repo) = setup_test_repo().await;
        for i in 0..5 {
            repo.create(&input(1, &format!("c{}", i))).await.unwrap();
        }

        let page = repo.list_for_article(1, 2, 2).await.unwrap();
        let contents: Vec<&str> = page.iter().map(|c| c.comment.content.as_str()).collect();
        assert_eq!(contents, vec!["c2", "c1"]);
    }

    #[tokio::test]
    async fn test_list_all_and_count_all() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&input(1, "a")).await.unwrap();
        repo.create(&input(2, "b")).await.unwrap();

        let all = repo.list_all(0, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].comment.content, "b");
        assert_eq!(all[0].article_title, "Second");
        assert_eq!(repo.count_all().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_delete_comment() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&input(1, "bye")).await.unwrap();
        repo.delete(created.id).await.unwrap();
        assert!(repo.get_by_id(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_comments_cascade_with_article() {
        let (pool, repo) = setup_test_repo().await;
        repo.create(&input(1, "gone soon")).await.unwrap();
        pool.execute("DELETE FROM articles WHERE id = 1").await.unwrap();
        assert_eq!(repo.count_for_article(1).await.unwrap(), 0);
        assert_eq!(repo.count_all().await.unwrap(), 0);
    }
}
