//! User repository
//!
//! Database operations for users, plus the per-author aggregate counts
//! used by profile pages and author rankings.

use crate::db::{Backend, DynDatabasePool};
use crate::models::{ArticleStatus, CreateUserInput, TopAuthor, UpdateProfileInput, User, UserSummary};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

const USER_COLUMNS: &str = "id, username, email, password_hash, avatar, is_staff, is_superuser, is_active, created_at, updated_at";

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: &CreateUserInput) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Lowest-id user whose email or username equals `identifier`
    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>>;

    /// Check whether another user already uses this email
    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Check whether another user already uses this username
    async fn username_taken(&self, username: &str, exclude_id: Option<i64>) -> Result<bool>;

    /// Apply profile changes; `None` fields are left as they are
    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> Result<User>;

    async fn set_active(&self, id: i64, active: bool) -> Result<()>;

    /// Delete a user; articles and comments go with them
    async fn delete(&self, id: i64) -> Result<()>;

    /// List users ordered by id
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>>;

    async fn count(&self) -> Result<i64>;

    /// Authors with at least one published article, most published first
    async fn top_authors(&self, limit: i64) -> Result<Vec<TopAuthor>>;

    /// Count one author's articles in one status
    async fn count_articles(&self, author_id: i64, status: ArticleStatus) -> Result<i64>;

    /// Count comments written by one author
    async fn count_comments(&self, author_id: i64) -> Result<i64>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(p) => create_user_sqlite(p, input).await,
            Backend::Mysql(p) => create_user_mysql(p, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => get_user_by_id_sqlite(p, id).await,
            Backend::Mysql(p) => get_user_by_id_mysql(p, id).await,
        }
    }

    async fn find_by_login(&self, identifier: &str) -> Result<Option<User>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => find_user_by_login_sqlite(p, identifier).await,
            Backend::Mysql(p) => find_user_by_login_mysql(p, identifier).await,
        }
    }

    async fn email_taken(&self, email: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = match self.pool.backend() {
            Backend::Sqlite(p) => count_matching_sqlite(p, "email", email, exclude_id).await?,
            Backend::Mysql(p) => count_matching_mysql(p, "email", email, exclude_id).await?,
        };
        Ok(count > 0)
    }

    async fn username_taken(&self, username: &str, exclude_id: Option<i64>) -> Result<bool> {
        let count = match self.pool.backend() {
            Backend::Sqlite(p) => count_matching_sqlite(p, "username", username, exclude_id).await?,
            Backend::Mysql(p) => count_matching_mysql(p, "username", username, exclude_id).await?,
        };
        Ok(count > 0)
    }

    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> Result<User> {
        match self.pool.backend() {
            Backend::Sqlite(p) => update_profile_sqlite(p, id, input).await?,
            Backend::Mysql(p) => update_profile_mysql(p, id, input).await?,
        }
        self.get_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("User {} disappeared during update", id))
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        let sql = "UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?";
        let now = Utc::now();
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).bind(active).bind(now).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(sql).bind(active).bind(now).bind(id).execute(p).await.map(|_| ()),
        };
        result.context("Failed to update user activity flag")
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = "DELETE FROM users WHERE id = ?";
        let result = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
            Backend::Mysql(p) => sqlx::query(sql).bind(id).execute(p).await.map(|_| ()),
        };
        result.context("Failed to delete user")
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => list_users_sqlite(p, offset, limit).await,
            Backend::Mysql(p) => list_users_mysql(p, offset, limit).await,
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM users";
        let count = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).fetch_one(p).await.map(|r| r.get::<i64, _>("count")),
            Backend::Mysql(p) => sqlx::query(sql).fetch_one(p).await.map(|r| r.get::<i64, _>("count")),
        };
        count.context("Failed to count users")
    }

    async fn top_authors(&self, limit: i64) -> Result<Vec<TopAuthor>> {
        match self.pool.backend() {
            Backend::Sqlite(p) => top_authors_sqlite(p, limit).await,
            Backend::Mysql(p) => top_authors_mysql(p, limit).await,
        }
    }

    async fn count_articles(&self, author_id: i64, status: ArticleStatus) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM articles WHERE author_id = ? AND status = ?";
        let count = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql)
                .bind(author_id)
                .bind(status.as_str())
                .fetch_one(p)
                .await
                .map(|r| r.get::<i64, _>("count")),
            Backend::Mysql(p) => sqlx::query(sql)
                .bind(author_id)
                .bind(status.as_str())
                .fetch_one(p)
                .await
                .map(|r| r.get::<i64, _>("count")),
        };
        count.with_context(|| format!("Failed to count {} articles of author {}", status, author_id))
    }

    async fn count_comments(&self, author_id: i64) -> Result<i64> {
        let sql = "SELECT COUNT(*) AS count FROM comments WHERE author_id = ?";
        let count = match self.pool.backend() {
            Backend::Sqlite(p) => sqlx::query(sql).bind(author_id).fetch_one(p).await.map(|r| r.get::<i64, _>("count")),
            Backend::Mysql(p) => sqlx::query(sql).bind(author_id).fetch_one(p).await.map(|r| r.get::<i64, _>("count")),
        };
        count.with_context(|| format!("Failed to count comments of author {}", author_id))
    }
}

const TOP_AUTHORS_SQL: &str = r#"
    SELECT u.id, u.username, u.avatar, COUNT(a.id) AS published_articles
    FROM users u
    INNER JOIN articles a ON a.author_id = u.id AND a.status = 'published'
    GROUP BY u.id, u.username, u.avatar
    ORDER BY published_articles DESC, u.id ASC
    LIMIT ?
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, avatar, is_staff, is_superuser, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&input.password_hash)
    .bind(&input.avatar)
    .bind(input.is_staff)
    .bind(input.is_superuser)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(user_from_input(result.last_insert_rowid(), input, now))
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;
    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn find_user_by_login_sqlite(pool: &SqlitePool, identifier: &str) -> Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE email = ? OR username = ? ORDER BY id LIMIT 1",
        USER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(pool)
        .await
        .context("Failed to look up user by login")?;
    Ok(row.as_ref().map(row_to_user_sqlite))
}

async fn count_matching_sqlite(
    pool: &SqlitePool,
    column: &str,
    value: &str,
    exclude_id: Option<i64>,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS count FROM users WHERE {} = ? AND id <> ?",
        column
    );
    let row = sqlx::query(&sql)
        .bind(value)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to check {} uniqueness", column))?;
    Ok(row.get("count"))
}

async fn update_profile_sqlite(pool: &SqlitePool, id: i64, input: &UpdateProfileInput) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = COALESCE(?, username),
            email = COALESCE(?, email),
            avatar = COALESCE(?, avatar),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&input.avatar)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update user profile")?;
    Ok(())
}

async fn list_users_sqlite(pool: &SqlitePool, offset: i64, limit: i64) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", USER_COLUMNS);
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;
    Ok(rows.iter().map(row_to_user_sqlite).collect())
}

async fn top_authors_sqlite(pool: &SqlitePool, limit: i64) -> Result<Vec<TopAuthor>> {
    let rows = sqlx::query(TOP_AUTHORS_SQL)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to rank authors")?;

    Ok(rows
        .iter()
        .map(|row| TopAuthor {
            user: UserSummary {
                id: row.get("id"),
                username: row.get("username"),
                avatar: row.get("avatar"),
            },
            published_articles: row.get("published_articles"),
        })
        .collect())
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        avatar: row.get("avatar"),
        is_staff: row.get("is_staff"),
        is_superuser: row.get("is_superuser"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_user_mysql(pool: &MySqlPool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, avatar, is_staff, is_superuser, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, TRUE, ?, ?)
        "#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&input.password_hash)
    .bind(&input.avatar)
    .bind(input.is_staff)
    .bind(input.is_superuser)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(user_from_input(result.last_insert_id() as i64, input, now))
}

async fn get_user_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;
    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn find_user_by_login_mysql(pool: &MySqlPool, identifier: &str) -> Result<Option<User>> {
    let sql = format!(
        "SELECT {} FROM users WHERE email = ? OR username = ? ORDER BY id LIMIT 1",
        USER_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(pool)
        .await
        .context("Failed to look up user by login")?;
    Ok(row.as_ref().map(row_to_user_mysql))
}

async fn count_matching_mysql(
    pool: &MySqlPool,
    column: &str,
    value: &str,
    exclude_id: Option<i64>,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) AS count FROM users WHERE {} = ? AND id <> ?",
        column
    );
    let row = sqlx::query(&sql)
        .bind(value)
        .bind(exclude_id.unwrap_or(0))
        .fetch_one(pool)
        .await
        .with_context(|| format!("Failed to check {} uniqueness", column))?;
    Ok(row.get("count"))
}

async fn update_profile_mysql(pool: &MySqlPool, id: i64, input: &UpdateProfileInput) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = COALESCE(?, username),
            email = COALESCE(?, email),
            avatar = COALESCE(?, avatar),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&input.username)
    .bind(&input.email)
    .bind(&input.avatar)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await
    .context("Failed to update user profile")?;
    Ok(())
}

async fn list_users_mysql(pool: &MySqlPool, offset: i64, limit: i64) -> Result<Vec<User>> {
    let sql = format!("SELECT {} FROM users ORDER BY id LIMIT ? OFFSET ?", USER_COLUMNS);
    let rows = sqlx::query(&sql)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;
    Ok(rows.iter().map(row_to_user_mysql).collect())
}

async fn top_authors_mysql(pool: &MySqlPool, limit: i64) -> Result<Vec<TopAuthor>> {
    let rows = sqlx::query(TOP_AUTHORS_SQL)
        .bind(limit)
        .fetch_all(pool)
        .await
        .context("Failed to rank authors")?;

    Ok(rows
        .iter()
        .map(|row| TopAuthor {
            user: UserSummary {
                id: row.get("id"),
                username: row.get("username"),
                avatar: row.get("avatar"),
            },
            published_articles: row.get("published_articles"),
        })
        .collect())
}

fn row_to_user_mysql(row: &sqlx::mysql::MySqlRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        avatar: row.get("avatar"),
        is_staff: row.get("is_staff"),
        is_superuser: row.get("is_superuser"),
        is_active: row.get("is_active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn user_from_input(id: i64, input: &CreateUserInput, now: chrono::DateTime<Utc>) -> User {
    User {
        id,
        username: input.username.clone(),
        email: input.email.clone(),
        password_hash: input.password_hash.clone(),
        avatar: input.avatar.clone(),
        is_staff: input.is_staff,
        is_superuser: input.is_superuser,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use crate::models::DEFAULT_AVATAR;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn input(username: &str, email: &str) -> CreateUserInput {
        CreateUserInput {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            avatar: DEFAULT_AVATAR.to_string(),
            is_staff: false,
            is_superuser: false,
        }
    }

    async fn insert_article(pool: &DynDatabasePool, author_id: i64, status: &str) {
        pool.execute(&format!(
            "INSERT INTO articles (title, content, author_id, status) VALUES ('t', 'c', {}, '{}')",
            author_id, status
        ))
        .await
        .expect("Failed to insert article");
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&input("alice", "alice@example.com")).await.unwrap();
        assert!(created.id > 0);
        assert!(created.is_active);

        let found = repo.get_by_id(created.id).await.unwrap().expect("user");
        assert_eq!(found.username, "alice");
        assert_eq!(found.email, "alice@example.com");
        assert_eq!(found.avatar, DEFAULT_AVATAR);
        assert!(!found.is_superuser);
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected_by_schema() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&input("alice", "same@example.com")).await.unwrap();
        assert!(repo.create(&input("bob", "same@example.com")).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_login_matches_email_or_username() {
        let (_pool, repo) = setup_test_repo().await;
        let alice = repo.create(&input("alice", "alice@example.com")).await.unwrap();

        let by_name = repo.find_by_login("alice").await.unwrap().expect("by username");
        let by_email = repo
            .find_by_login("alice@example.com")
            .await
            .unwrap()
            .expect("by email");
        assert_eq!(by_name.id, alice.id);
        assert_eq!(by_email.id, alice.id);
        assert!(repo.find_by_login("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_login_prefers_lowest_id() {
        let (_pool, repo) = setup_test_repo().await;
        // One user's username equals another's email
        let first = repo.create(&input("carol", "x@example.com")).await.unwrap();
        repo.create(&input("x@example.com", "dave@example.com")).await.unwrap();

        let found = repo.find_by_login("x@example.com").await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_uniqueness_checks_exclude_self() {
        let (_pool, repo) = setup_test_repo().await;
        let alice = repo.create(&input("alice", "alice@example.com")).await.unwrap();

        assert!(repo.email_taken("alice@example.com", None).await.unwrap());
        assert!(!repo.email_taken("alice@example.com", Some(alice.id)).await.unwrap());
        assert!(repo.username_taken("alice", None).await.unwrap());
        assert!(!repo.username_taken("bob", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_profile_changes_only_given_fields() {
        let (_pool, repo) = setup_test_repo().await;
        let alice = repo.create(&input("alice", "alice@example.com")).await.unwrap();

        let updated = repo
            .update_profile(
                alice.id,
                &UpdateProfileInput {
                    avatar: Some("avatars/new.png".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.avatar, "avatars/new.png");
        assert_eq!(updated.username, "alice");
        assert_eq!(updated.email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_set_active() {
        let (_pool, repo) = setup_test_repo().await;
        let alice = repo.create(&input("alice", "alice@example.com")).await.unwrap();
        repo.set_active(alice.id, false).await.unwrap();
        assert!(!repo.get_by_id(alice.id).await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_list_and_count() {
        let (_pool, repo) = setup_test_repo().await;
        for i in 0..3 {
            repo.create(&input(&format!("u{}", i), &format!("u{}@example.com", i)))
                .await
                .unwrap();
        }
        assert_eq!(repo.count().await.unwrap(), 3);
        let page = repo.list(1, 10).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].username, "u1");
    }

    #[tokio::test]
    async fn test_top_authors_counts_only_published() {
        let (pool, repo) = setup_test_repo().await;
        let alice = repo.create(&input("alice", "alice@example.com")).await.unwrap();
        let bob = repo.create(&input("bob", "bob@example.com")).await.unwrap();
        let carol = repo.create(&input("carol", "carol@example.com")).await.unwrap();

        insert_article(&pool, alice.id, "published").await;
        insert_article(&pool, bob.id, "published").await;
        insert_article(&pool, bob.id, "published").await;
        insert_article(&pool, carol.id, "moderated").await;

        let top = repo.top_authors(5).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].user.username, "bob");
        assert_eq!(top[0].published_articles, 2);
        assert_eq!(top[1].user.username, "alice");

        let limited = repo.top_authors(1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_top_authors_ties_keep_row_order() {
        let (pool, repo) = setup_test_repo().await;
        let alice = repo.create(&input("alice", "alice@example.com")).await.unwrap();
        let bob = repo.create(&input("bob", "bob@example.com")).await.unwrap();
        insert_article(&pool, bob.id, "published").await;
        insert_article(&pool, alice.id, "published").await;

        let top = repo.top_authors(5).await.unwrap();
        assert_eq!(top[0].user.id, alice.id);
        assert_eq!(top[1].user.id, bob.id);
    }

    #[tokio::test]
    async fn test_count_articles_and_comments() {
        let (pool, repo) = setup_test_repo().await;
        let alice = repo.create(&input("alice", "alice@example.com")).await.unwrap();
        insert_article(&pool, alice.id, "published").await;
        insert_article(&pool, alice.id, "rejected").await;
        insert_article(&pool, alice.id, "rejected").await;
        pool.execute("INSERT INTO comments (article_id, author_id, content) VALUES (1, 1, 'hi')")
            .await
            .unwrap();

        assert_eq!(repo.count_articles(alice.id, ArticleStatus::Published).await.unwrap(), 1);
        assert_eq!(repo.count_articles(alice.id, ArticleStatus::Moderated).await.unwrap(), 0);
        assert_eq!(repo.count_articles(alice.id, ArticleStatus::Rejected).await.unwrap(), 2);
        assert_eq!(repo.count_comments(alice.id).await.unwrap(), 1);
    }
}
