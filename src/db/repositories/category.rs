//! Category repository
//!
//! Database operations for categories and their article memberships.
//!
//! This module provides:
//! - `CategoryRepository` trait defining the interface for category data access
//! - `SqlxCategoryRepository` implementing the trait for SQLite and MySQL

use crate::db::{Backend, DynDatabasePool};
use crate::models::{Category, CategoryWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Category repository trait
#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, name: &str, slug: &str) -> Result<Category>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// All categories ordered by name
    async fn list(&self) -> Result<Vec<Category>>;

    /// All categories with their published-article counts, ordered by name
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>>;

    /// Categories holding the most published articles, empty ones left out
    async fn top_with_counts(&self, limit: i64) -> Result<Vec<CategoryWithCount>>;

    /// Which of the given ids exist
    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>>;

    async fn exists_by_slug(&self, slug: &str) -> Result<bool>;

    /// Categories of each given article, keyed by article id, each ordered by name
    async fn list_for_articles(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Category>>>;

    async fn delete(&self, id: i64) -> Result<()>;
}

/// SQLx-based category repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxCategoryRepository {
    pool: DynDatabasePool,
}

impl SqlxCategoryRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CategoryRepository for SqlxCategoryRepository {
    async fn create(&self, name: &str, slug: &str) -> Result<Category> {
        match self.pool.backend() {
            Backend::Sqlite(p) => create_category_sqlite(p, name, slug).await,
            Backend::Mysql(p) => create_category_mysql(p, name, slug).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Category>> {
        let sql = "SELECT id, name, slug, created_at FROM categories WHERE id = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(sql)
                    .bind(id)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by ID")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        let sql = "SELECT id, name, slug, created_at FROM categories WHERE slug = ?";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let row = sqlx::query(sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.as_ref().map(row_to_category_sqlite))
            }
            Backend::Mysql(p) => {
                let row = sqlx::query(sql)
                    .bind(slug)
                    .fetch_optional(p)
                    .await
                    .context("Failed to get category by slug")?;
                Ok(row.as_ref().map(row_to_category_mysql))
            }
        }
    }

    async fn list(&self) -> Result<Vec<Category>> {
        let sql = "SELECT id, name, slug, created_at FROM categories ORDER BY name, id";
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let rows = sqlx::query(sql)
                    .fetch_all(p)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_sqlite).collect())
            }
            Backend::Mysql(p) => {
                let rows = sqlx::query(sql)
                    .fetch_all(p)
                    .await
                    .context("Failed to list categories")?;
                Ok(rows.iter().map(row_to_category_mysql).collect())
            }
        }
    }

    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>> {
        let sql = format!("{} ORDER BY c.name, c.id", COUNTED_CATEGORIES_SQL);
        match self.pool.backend() {
            Backend::Sqlite(p) => counted_categories_sqlite(p, &sql, None).await,
            Backend::Mysql(p) => counted_categories_mysql(p, &sql, None).await,
        }
    }

    async fn top_with_counts(&self, limit: i64) -> Result<Vec<CategoryWithCount>> {
        let sql = format!(
            "{} HAVING COUNT(a.id) > 0 ORDER BY article_count DESC, c.name, c.id LIMIT ?",
            COUNTED_CATEGORIES_SQL
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => counted_categories_sqlite(p, &sql, Some(limit)).await,
            Backend::Mysql(p) => counted_categories_mysql(p, &sql, Some(limit)).await,
        }
    }

    async fn existing_ids(&self, ids: &[i64]) -> Result<Vec<i64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT id FROM categories WHERE id IN ({}) ORDER BY id",
            placeholders(ids.len())
        );
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                let rows = query.fetch_all(p).await.context("Failed to check category ids")?;
                Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
            }
            Backend::Mysql(p) => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id);
                }
                let rows = query.fetch_all(p).await.context("Failed to check category ids")?;
                Ok(rows.iter().map(|row| row.get::<i64, _>("id")).collect())
            }
        }
    }

    async fn exists_by_slug(&self, slug: &str) -> Result<bool> {
        Ok(self.get_by_slug(slug).await?.is_some())
    }

    async fn list_for_articles(&self, article_ids: &[i64]) -> Result<HashMap<i64, Vec<Category>>> {
        if article_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            r#"
            SELECT ac.article_id, c.id, c.name, c.slug, c.created_at
            FROM article_categories ac
            INNER JOIN categories c ON c.id = ac.category_id
            WHERE ac.article_id IN ({})
            ORDER BY c.name, c.id
            "#,
            placeholders(article_ids.len())
        );

        let mut grouped: HashMap<i64, Vec<Category>> = HashMap::new();
        match self.pool.backend() {
            Backend::Sqlite(p) => {
                let mut query = sqlx::query(&sql);
                for id in article_ids {
                    query = query.bind(*id);
                }
                let rows = query
                    .fetch_all(p)
                    .await
                    .context("Failed to load article categories")?;
                for row in &rows {
                    grouped
                        .entry(row.get("article_id"))
                        .or_default()
                        .push(row_to_category_sqlite(row));
                }
            }
            Backend::Mysql(p) => {
                let mut query = sqlx::query(&sql);
                for id in article_ids {
                    query = query.bind(*id);
                }
                let rows = query
                    .fetch_all(p)
                    .await
                    .context("Failed to load article categories")?;
                for row in &rows {
                    grouped
                        .entry(row.get("article_id"))
                        .or_default()
                        .push(row_to_category_mysql(row));
                }
            }
        }
        Ok(grouped)
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM categories WHERE id = ?";
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
        };
        result.context("Failed to delete category")
    }
}

/// `?, ?, ?` for an IN list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

const COUNTED_CATEGORIES_SQL: &str = r#"
    SELECT c.id, c.name, c.slug, c.created_at, COUNT(a.id) AS article_count
    FROM categories c
    LEFT JOIN article_categories ac ON ac.category_id = c.id
    LEFT JOIN articles a ON a.id = ac.article_id AND a.status = 'published'
    GROUP BY c.id, c.name, c.slug, c.created_at
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_category_sqlite(pool: &SqlitePool, name: &str, slug: &str) -> Result<Category> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO categories (name, slug, created_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(slug)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        slug: slug.to_string(),
        created_at: now,
    })
}

async fn counted_categories_sqlite(
    pool: &SqlitePool,
    sql: &str,
    limit: Option<i64>,
) -> Result<Vec<CategoryWithCount>> {
    let mut query = sqlx::query(sql);
    if let Some(limit) = limit {
        query = query.bind(limit);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to count articles per category")?;

    Ok(rows
        .iter()
        .map(|row| CategoryWithCount {
            category: row_to_category_sqlite(row),
            article_count: row.get("article_count"),
        })
        .collect())
}

fn row_to_category_sqlite(row: &sqlx::sqlite::SqliteRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_category_mysql(pool: &MySqlPool, name: &str, slug: &str) -> Result<Category> {
    let now = Utc::now();

    let result = sqlx::query("INSERT INTO categories (name, slug, created_at) VALUES (?, ?, ?)")
        .bind(name)
        .bind(slug)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create category")?;

    Ok(Category {
        id: result.last_insert_id() as i64,
        name: name.to_string(),
        slug: slug.to_string(),
        created_at: now,
    })
}

async fn counted_categories_mysql(
    pool: &MySqlPool,
    sql: &str,
    limit: Option<i64>,
) -> Result<Vec<CategoryWithCount>> {
    let mut query = sqlx::query(sql);
    if let Some(limit) = limit {
        query = query.bind(limit);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to count articles per category")?;

    Ok(rows
        .iter()
        .map(|row| CategoryWithCount {
            category: row_to_category_mysql(row),
            article_count: row.get("article_count"),
        })
        .collect())
}

fn row_to_category_mysql(row: &sqlx::mysql::MySqlRow) -> Category {
    Category {
        id: row.get("id"),
        name: row.get("name"),
        slug: row.get("slug"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxCategoryRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        pool.execute(
            "INSERT INTO users (username, email, password_hash) VALUES ('alice', 'alice@example.com', 'h')",
        )
        .await
        .expect("Failed to create user");
        let repo = SqlxCategoryRepository::new(pool.clone());
        (pool, repo)
    }

    async fn insert_article(pool: &DynDatabasePool, status: &str, category_ids: &[i64]) -> i64 {
        let rows = pool
            .execute(&format!(
                "INSERT INTO articles (title, content, author_id, status) VALUES ('t', 'c', 1, '{}')",
                status
            ))
            .await
            .unwrap();
        assert_eq!(rows, 1);
        let Backend::Sqlite(p) = pool.backend() else {
            panic!("expected sqlite");
        };
        let id: i64 = sqlx::query("SELECT MAX(id) AS id FROM articles")
            .fetch_one(p)
            .await
            .unwrap()
            .get("id");
        for category_id in category_ids {
            pool.execute(&format!(
                "INSERT INTO article_categories (article_id, category_id) VALUES ({}, {})",
                id, category_id
            ))
            .await
            .unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_create_and_get_category() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create("Tech", "tech").await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        let by_slug = repo.get_by_slug("tech").await.unwrap().unwrap();
        assert_eq!(by_id, by_slug);
        assert!(repo.get_by_slug("missing").await.unwrap().is_none());
        assert!(repo.exists_by_slug("tech").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_slug_fails() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create("Tech", "tech").await.unwrap();
        assert!(repo.create("Technology", "tech").await.is_err());
    }

    #[tokio::test]
    async fn test_list_orders_by_name() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create("Science", "science").await.unwrap();
        repo.create("Art", "art").await.unwrap();
        repo.create("Music", "music").await.unwrap();

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Art", "Music", "Science"]);
    }

    #[tokio::test]
    async fn test_counts_include_only_published() {
        let (pool, repo) = setup_test_repo().await;
        let tech = repo.create("Tech", "tech").await.unwrap();
        let art = repo.create("Art", "art").await.unwrap();

        insert_article(&pool, "published", &[tech.id]).await;
        insert_article(&pool, "published", &[tech.id, art.id]).await;
        insert_article(&pool, "rejected", &[tech.id]).await;

        let counts = repo.list_with_counts().await.unwrap();
        let by_slug: HashMap<_, _> = counts
            .iter()
            .map(|c| (c.category.slug.as_str(), c.article_count))
            .collect();
        assert_eq!(by_slug["tech"], 2);
        assert_eq!(by_slug["art"], 1);
    }

    #[tokio::test]
    async fn test_top_with_counts_skips_empty_categories() {
        let (pool, repo) = setup_test_repo().await;
        let tech = repo.create("Tech", "tech").await.unwrap();
        let art = repo.create("Art", "art").await.unwrap();
        repo.create("Empty", "empty").await.unwrap();

        insert_article(&pool, "published", &[tech.id]).await;
        insert_article(&pool, "published", &[tech.id]).await;
        insert_article(&pool, "published", &[art.id]).await;

        let top = repo.top_with_counts(5).await.unwrap();
        let slugs: Vec<&str> = top.iter().map(|c| c.category.slug.as_str()).collect();
        assert_eq!(slugs, vec!["tech", "art"]);

        assert_eq!(repo.top_with_counts(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_existing_ids() {
        let (_pool, repo) = setup_test_repo().await;
        let a = repo.create("A", "a").await.unwrap();
        let b = repo.create("B", "b").await.unwrap();

        let found = repo.existing_ids(&[b.id, 999, a.id]).await.unwrap();
        assert_eq!(found, vec![a.id, b.id]);
        assert!(repo.existing_ids(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_for_articles_groups_by_article() {
        let (pool, repo) = setup_test_repo().await;
        let tech = repo.create("Tech", "tech").await.unwrap();
        let art = repo.create("Art", "art").await.unwrap();
        let first = insert_article(&pool, "published", &[tech.id, art.id]).await;
        let second = insert_article(&pool, "published", &[]).await;

        let grouped = repo.list_for_articles(&[first, second]).await.unwrap();
        let names: Vec<&str> = grouped[&first].iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Art", "Tech"]);
        assert!(!grouped.contains_key(&second));
    }

    #[tokio::test]
    async fn test_delete_category_detaches_articles() {
        let (pool, repo) = setup_test_repo().await;
        let tech = repo.create("Tech", "tech").await.unwrap();
        let article = insert_article(&pool, "published", &[tech.id]).await;

        repo.delete(tech.id).await.unwrap();

        assert!(repo.get_by_id(tech.id).await.unwrap().is_none());
        assert!(repo.list_for_articles(&[article]).await.unwrap().is_empty());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
