//! User service
//!
//! Implements business logic for accounts:
//! - Registration with form-level validation
//! - Authentication by email *or* username, inactive accounts refused
//! - Database-backed login sessions
//! - Author statistics and the top-authors ranking
//! - Profile editing and the admin-side user operations

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{
    ArticleStatus, AuthorStats, CreateUserInput, PageRequest, Paged, RegisterInput, Session,
    TopAuthor, UpdateProfileInput, User, DEFAULT_AVATAR, USERNAME_MAX_LEN,
};
use crate::services::password::{check_password_policy, hash_password, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

/// Default session lifetime in days
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

/// Shown for every failed login, whatever the cause
pub const INVALID_CREDENTIALS: &str =
    "Please enter a correct email or username and password.";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Bad credentials or inactive account
    #[error("{0}")]
    AuthenticationError(String),

    #[error("{0}")]
    ValidationError(String),

    /// Username or email already in use
    #[error("{0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for accounts, authentication and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_ttl_days: i64,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, session_repo: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_ttl(user_repo, session_repo, DEFAULT_SESSION_TTL_DAYS)
    }

    pub fn with_session_ttl(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_ttl_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_ttl_days: session_ttl_days.max(1),
        }
    }

    // ========================================================================
    // Registration and authentication
    // ========================================================================

    /// Register a new user with the given avatar path.
    ///
    /// A duplicate email or username fails before any row is written.
    pub async fn register(&self, input: RegisterInput, avatar: String) -> Result<User, UserServiceError> {
        let username = validate_username(&input.username)?;
        let email = validate_email(&input.email)?;

        if input.password1 != input.password2 {
            return Err(UserServiceError::ValidationError(
                "The two password fields didn't match.".to_string(),
            ));
        }
        check_password_policy(&input.password1).map_err(UserServiceError::ValidationError)?;

        if self.user_repo.email_taken(&email, None).await? {
            return Err(UserServiceError::UserExists(
                "A user with that email already exists.".to_string(),
            ));
        }
        if self.user_repo.username_taken(&username, None).await? {
            return Err(UserServiceError::UserExists(
                "A user with that username already exists.".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password1).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&CreateUserInput {
                username,
                email,
                password_hash,
                avatar,
                is_staff: false,
                is_superuser: false,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "user registered");
        Ok(user)
    }

    /// Check credentials, matching the identifier against email or username.
    ///
    /// Unknown identifier, wrong password and inactive account all produce
    /// the same [`INVALID_CREDENTIALS`] message.
    pub async fn authenticate(&self, identifier: &str, password: &str) -> Result<User, UserServiceError> {
        let identifier = identifier.trim();
        let failed = || UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string());

        if identifier.is_empty() || password.is_empty() {
            return Err(failed());
        }

        let Some(user) = self.user_repo.find_by_login(identifier).await? else {
            tracing::warn!(identifier, "login failed: unknown user");
            return Err(failed());
        };

        let valid = verify_password(password, &user.password_hash).unwrap_or_else(|e| {
            tracing::error!(user_id = user.id, error = %e, "stored password hash unreadable");
            false
        });
        if !valid {
            tracing::warn!(user_id = user.id, "login failed: bad password");
            return Err(failed());
        }
        if !user.is_active {
            tracing::warn!(user_id = user.id, "login failed: inactive account");
            return Err(failed());
        }

        Ok(user)
    }

    /// Authenticate and open a session
    pub async fn login(&self, identifier: &str, password: &str) -> Result<(User, Session), UserServiceError> {
        let user = self.authenticate(identifier, password).await?;
        let session = self.start_session(user.id).await?;
        tracing::info!(user_id = user.id, "user logged in");
        Ok((user, session))
    }

    /// Open a new session for a user
    pub async fn start_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_ttl_days),
            created_at: now,
        };
        Ok(self.session_repo.create(&session).await?)
    }

    pub async fn logout(&self, token: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(token)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// The active user behind a session token, if any.
    ///
    /// Expired sessions are deleted on sight.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let Some(session) = self.session_repo.get_by_id(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            self.session_repo.delete(token).await?;
            return Ok(None);
        }

        let user = self.user_repo.get_by_id(session.user_id).await?;
        Ok(user.filter(|u| u.is_active))
    }

    /// Delete every expired session, returning how many went
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        Ok(self.session_repo.delete_expired().await?)
    }

    /// Create the configured superuser unless that username or email exists
    pub async fn ensure_superuser(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, UserServiceError> {
        let username = validate_username(username)?;
        let email = validate_email(email)?;

        if self.user_repo.username_taken(&username, None).await?
            || self.user_repo.email_taken(&email, None).await?
        {
            return Ok(None);
        }

        let password_hash = hash_password(password).context("Failed to hash password")?;
        let user = self
            .user_repo
            .create(&CreateUserInput {
                username,
                email,
                password_hash,
                avatar: DEFAULT_AVATAR.to_string(),
                is_staff: true,
                is_superuser: true,
            })
            .await?;
        tracing::info!(user_id = user.id, username = %user.username, "superuser created");
        Ok(Some(user))
    }

    // ========================================================================
    // Lookups and statistics
    // ========================================================================

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await?
            .ok_or(UserServiceError::NotFound(id))
    }

    /// Authors ranked by published articles
    pub async fn top_authors(&self, limit: i64) -> Result<Vec<TopAuthor>, UserServiceError> {
        Ok(self.user_repo.top_authors(limit).await?)
    }

    /// Article counts per status and the number of comments written,
    /// each from its own count query
    pub async fn author_stats(&self, author_id: i64) -> Result<AuthorStats, UserServiceError> {
        self.get_by_id(author_id).await?;

        let published = self
            .user_repo
            .count_articles(author_id, ArticleStatus::Published)
            .await?;
        let moderated = self
            .user_repo
            .count_articles(author_id, ArticleStatus::Moderated)
            .await?;
        let rejected = self
            .user_repo
            .count_articles(author_id, ArticleStatus::Rejected)
            .await?;
        let comments = self.user_repo.count_comments(author_id).await?;

        Ok(AuthorStats::new(published, moderated, rejected, comments))
    }

    // ========================================================================
    // Profile and administration
    // ========================================================================

    /// Change a user's own username, email or avatar
    pub async fn update_profile(
        &self,
        user_id: i64,
        mut input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        self.get_by_id(user_id).await?;

        if let Some(username) = input.username.take() {
            let username = validate_username(&username)?;
            if self.user_repo.username_taken(&username, Some(user_id)).await? {
                return Err(UserServiceError::UserExists(
                    "A user with that username already exists.".to_string(),
                ));
            }
            input.username = Some(username);
        }
        if let Some(email) = input.email.take() {
            let email = validate_email(&email)?;
            if self.user_repo.email_taken(&email, Some(user_id)).await? {
                return Err(UserServiceError::UserExists(
                    "A user with that email already exists.".to_string(),
                ));
            }
            input.email = Some(email);
        }

        let user = self.user_repo.update_profile(user_id, &input).await?;
        tracing::info!(user_id, "profile updated");
        Ok(user)
    }

    pub async fn list(&self, page: PageRequest) -> Result<Paged<User>, UserServiceError> {
        let total = self.user_repo.count().await?;
        let info = page.resolve(total);
        let users = self.user_repo.list(info.offset(), info.limit()).await?;
        Ok(Paged::new(users, info, total))
    }

    /// Activate or deactivate an account; nobody can deactivate themselves
    pub async fn set_active(&self, actor: &User, user_id: i64, active: bool) -> Result<User, UserServiceError> {
        if actor.id == user_id && !active {
            return Err(UserServiceError::ValidationError(
                "You cannot deactivate your own account.".to_string(),
            ));
        }
        self.get_by_id(user_id).await?;
        self.user_repo.set_active(user_id, active).await?;
        if !active {
            self.session_repo.delete_by_user(user_id).await?;
        }
        tracing::info!(actor_id = actor.id, user_id, active, "user activity changed");
        self.get_by_id(user_id).await
    }

    /// Delete an account with its articles and comments
    pub async fn delete(&self, actor: &User, user_id: i64) -> Result<(), UserServiceError> {
        if actor.id == user_id {
            return Err(UserServiceError::ValidationError(
                "You cannot delete your own account.".to_string(),
            ));
        }
        self.get_by_id(user_id).await?;
        self.user_repo.delete(user_id).await?;
        tracing::info!(actor_id = actor.id, user_id, "user deleted");
        Ok(())
    }
}

fn username_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\w.@+-]+$").ok()).as_ref()
}

/// Trimmed username, or the rule it breaks
pub(crate) fn validate_username(username: &str) -> Result<String, UserServiceError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username cannot be empty.".to_string(),
        ));
    }
    if username.chars().count() > USERNAME_MAX_LEN {
        return Err(UserServiceError::ValidationError(format!(
            "Username cannot exceed {} characters.",
            USERNAME_MAX_LEN
        )));
    }
    if !username_pattern().is_some_and(|re| re.is_match(username)) {
        return Err(UserServiceError::ValidationError(
            "Username may contain only letters, numbers, and @/./+/-/_ characters.".to_string(),
        ));
    }
    Ok(username.to_string())
}

/// Trimmed email, or the rule it breaks
pub(crate) fn validate_email(email: &str) -> Result<String, UserServiceError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(UserServiceError::ValidationError(
            "Enter a valid email address.".to_string(),
        ));
    }
    Ok(email.to_string())
}
