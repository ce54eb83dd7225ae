//! User model
//!
//! Users register themselves, write articles and comments, and may carry
//! the staff/superuser flags that open the admin area.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum username length in characters
pub const USERNAME_MAX_LEN: usize = 150;

/// Avatar used when no avatar files are available
pub const DEFAULT_AVATAR: &str = "avatars/default.png";

/// User entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Unique display name, also accepted as a login identifier
    pub username: String,
    /// Unique email, also accepted as a login identifier
    pub email: String,
    /// Password hash (argon2 PHC string)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Avatar path relative to the media root
    pub avatar: String,
    pub is_staff: bool,
    pub is_superuser: bool,
    /// Inactive accounts cannot log in
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Check if the user may enter the admin area
    pub fn is_admin(&self) -> bool {
        self.is_superuser && self.is_active
    }

    /// Authors and superusers may change an article or comment
    pub fn can_manage(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_superuser
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

/// The author fields listings show next to articles and comments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
    pub avatar: String,
}

/// Input for inserting a user (password already hashed)
#[derive(Debug, Clone)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub is_staff: bool,
    pub is_superuser: bool,
}

/// Profile changes a user can make to their own account
#[derive(Debug, Clone, Default)]
pub struct UpdateProfileInput {
    pub username: Option<String>,
    pub email: Option<String>,
    /// New avatar path relative to the media root
    pub avatar: Option<String>,
}

/// Registration form contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password1: String,
    #[serde(default)]
    pub password2: String,
}

/// Author ranked by published articles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopAuthor {
    #[serde(flatten)]
    pub user: UserSummary,
    pub published_articles: i64,
}

/// Per-author article and comment counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorStats {
    pub published_count: i64,
    pub moderated_count: i64,
    pub rejected_count: i64,
    pub total_articles: i64,
    /// Comments written by the author
    pub comments_count: i64,
}

impl AuthorStats {
    pub fn new(published: i64, moderated: i64, rejected: i64, comments: i64) -> Self {
        Self {
            published_count: published,
            moderated_count: moderated,
            rejected_count: rejected,
            total_articles: published + moderated + rejected,
            comments_count: comments,
        }
    }

    /// What a visitor may see of someone else's profile
    pub fn public(published: i64) -> Self {
        Self::new(published, 0, 0, 0)
    }
}
