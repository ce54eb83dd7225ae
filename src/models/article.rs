//! Article model
//!
//! This module provides:
//! - `Article` entity and its `ArticleStatus` lifecycle
//! - `ArticleWithMeta` / `ArticleDetail` read views joined with author,
//!   categories, comment counts and comments
//! - Input types for creating and partially updating articles
//! - `ArticleFilter` and `ArticleOrdering` for listing queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Category, CommentWithMeta, Patch, UserSummary};

/// Maximum title length in characters
pub const TITLE_MAX_LEN: usize = 200;

/// Maximum source URL length in characters
pub const SOURCE_MAX_LEN: usize = 200;

/// Article entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    /// Body text, shown escaped
    pub content: String,
    pub author_id: i64,
    pub status: ArticleStatus,
    /// URL the article was taken from
    pub source: Option<String>,
    /// Image path relative to the media root
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Article lifecycle stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArticleStatus {
    /// Waiting for an administrator
    #[default]
    Moderated,
    /// Visible to everyone
    Published,
    Rejected,
}

impl ArticleStatus {
    pub const ALL: [ArticleStatus; 3] = [
        ArticleStatus::Moderated,
        ArticleStatus::Published,
        ArticleStatus::Rejected,
    ];

    /// Database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Moderated => "moderated",
            ArticleStatus::Published => "published",
            ArticleStatus::Rejected => "rejected",
        }
    }

    /// Parse the database/URL representation
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "moderated" => Some(ArticleStatus::Moderated),
            "published" => Some(ArticleStatus::Published),
            "rejected" => Some(ArticleStatus::Rejected),
            _ => None,
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ArticleStatus::Moderated => "In moderation",
            ArticleStatus::Published => "Published",
            ArticleStatus::Rejected => "Rejected",
        }
    }
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Article joined with what listings display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleWithMeta {
    #[serde(flatten)]
    pub article: Article,
    pub author: UserSummary,
    pub comment_count: i64,
    /// Empty unless categories were requested
    #[serde(default)]
    pub categories: Vec<Category>,
}

/// A single article with optionally eager-loaded relations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDetail {
    #[serde(flatten)]
    pub item: ArticleWithMeta,
    /// Newest first; empty unless comments were requested
    #[serde(default)]
    pub comments: Vec<CommentWithMeta>,
}

/// What `get_by_id` loads besides the article row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArticleIncludes {
    pub comments: bool,
    pub categories: bool,
}

impl ArticleIncludes {
    pub fn all() -> Self {
        Self {
            comments: true,
            categories: true,
        }
    }

    pub fn categories() -> Self {
        Self {
            comments: false,
            categories: true,
        }
    }
}

/// Input for creating a new article
#[derive(Debug, Clone)]
pub struct CreateArticleInput {
    pub author_id: i64,
    pub title: String,
    pub content: String,
    /// Full category set; replaces nothing because the article is new
    pub category_ids: Vec<i64>,
    pub source: Option<String>,
    pub image: Option<String>,
    pub status: ArticleStatus,
}

impl CreateArticleInput {
    pub fn new(author_id: i64, title: String, content: String, category_ids: Vec<i64>) -> Self {
        Self {
            author_id,
            title,
            content,
            category_ids,
            source: None,
            image: None,
            status: ArticleStatus::default(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_status(mut self, status: ArticleStatus) -> Self {
        self.status = status;
        self
    }
}

/// Partial update; only `Set` fields are written
#[derive(Debug, Clone, Default)]
pub struct UpdateArticleInput {
    pub title: Patch<String>,
    pub content: Patch<String>,
    pub source: Patch<Option<String>>,
    pub image: Patch<Option<String>>,
    pub status: Patch<ArticleStatus>,
    /// Replaces the whole category set when set
    pub category_ids: Patch<Vec<i64>>,
}

impl UpdateArticleInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Patch::Set(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Patch::Set(content.into());
        self
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = Patch::Set(source);
        self
    }

    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.image = Patch::Set(image);
        self
    }

    pub fn with_status(mut self, status: ArticleStatus) -> Self {
        self.status = Patch::Set(status);
        self
    }

    pub fn with_category_ids(mut self, category_ids: Vec<i64>) -> Self {
        self.category_ids = Patch::Set(category_ids);
        self
    }

    /// Check if any field is set
    pub fn has_changes(&self) -> bool {
        self.title.is_set()
            || self.content.is_set()
            || self.source.is_set()
            || self.image.is_set()
            || self.status.is_set()
            || self.category_ids.is_set()
    }
}

/// Row filter for article listings; all set conditions must hold
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticleFilter {
    pub status: Option<ArticleStatus>,
    pub author_id: Option<i64>,
    pub category_id: Option<i64>,
    /// Case-insensitive substring of title or content
    pub search: Option<String>,
    /// Only articles nobody has commented on
    pub without_comments: bool,
}

impl ArticleFilter {
    pub fn status(status: ArticleStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn published() -> Self {
        Self::status(ArticleStatus::Published)
    }

    pub fn with_author(mut self, author_id: i64) -> Self {
        self.author_id = Some(author_id);
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_search(mut self, query: impl Into<String>) -> Self {
        self.search = Some(query.into());
        self
    }
}

/// Whitelisted sort orders for article listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArticleOrdering {
    #[default]
    Newest,
    Oldest,
    TitleAsc,
    TitleDesc,
    MostCommented,
    LeastCommented,
    RecentlyUpdated,
    LeastRecentlyUpdated,
}

impl ArticleOrdering {
    pub const ALL: [ArticleOrdering; 8] = [
        ArticleOrdering::Newest,
        ArticleOrdering::Oldest,
        ArticleOrdering::TitleAsc,
        ArticleOrdering::TitleDesc,
        ArticleOrdering::MostCommented,
        ArticleOrdering::LeastCommented,
        ArticleOrdering::RecentlyUpdated,
        ArticleOrdering::LeastRecentlyUpdated,
    ];

    /// Parse a `sort` parameter such as `-created_at`
    pub fn parse(key: &str) -> Option<Self> {
        match key.trim() {
            "-created_at" => Some(Self::Newest),
            "created_at" => Some(Self::Oldest),
            "title" => Some(Self::TitleAsc),
            "-title" => Some(Self::TitleDesc),
            "-comment_count" => Some(Self::MostCommented),
            "comment_count" => Some(Self::LeastCommented),
            "-updated_at" => Some(Self::RecentlyUpdated),
            "updated_at" => Some(Self::LeastRecentlyUpdated),
            _ => None,
        }
    }

    /// Parse with fallback to newest-first for unknown or missing keys
    pub fn parse_or_default(key: Option<&str>) -> Self {
        key.and_then(Self::parse).unwrap_or_default()
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Newest => "-created_at",
            Self::Oldest => "created_at",
            Self::TitleAsc => "title",
            Self::TitleDesc => "-title",
            Self::MostCommented => "-comment_count",
            Self::LeastCommented => "comment_count",
            Self::RecentlyUpdated => "-updated_at",
            Self::LeastRecentlyUpdated => "updated_at",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Newest => "Newest first",
            Self::Oldest => "Oldest first",
            Self::TitleAsc => "Title A-Z",
            Self::TitleDesc => "Title Z-A",
            Self::MostCommented => "Most commented",
            Self::LeastCommented => "Least commented",
            Self::RecentlyUpdated => "Recently updated",
            Self::LeastRecentlyUpdated => "Least recently updated",
        }
    }

    /// ORDER BY clause over the `a` (articles) alias and `comment_count`
    pub fn order_by_sql(&self) -> &'static str {
        match self {
            Self::Newest => "a.created_at DESC, a.id DESC",
            Self::Oldest => "a.created_at ASC, a.id DESC",
            Self::TitleAsc => "a.title ASC, a.id DESC",
            Self::TitleDesc => "a.title DESC, a.id DESC",
            Self::MostCommented => "comment_count DESC, a.id DESC",
            Self::LeastCommented => "comment_count ASC, a.id DESC",
            Self::RecentlyUpdated => "a.updated_at DESC, a.id DESC",
            Self::LeastRecentlyUpdated => "a.updated_at ASC, a.id DESC",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_is_moderated() {
        assert_eq!(ArticleStatus::default(), ArticleStatus::Moderated);
    }

    #[test]
    fn test_status_parse() {
        for status in ArticleStatus::ALL {
            assert_eq!(ArticleStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(
            ArticleStatus::from_str(" Published "),
            Some(ArticleStatus::Published)
        );
        assert_eq!(ArticleStatus::from_str("draft"), None);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ArticleStatus::Rejected).unwrap();
        assert_eq!(json, "\"rejected\"");
    }

    #[test]
    fn test_ordering_parse_round_trips_keys() {
        for ordering in ArticleOrdering::ALL {
            assert_eq!(ArticleOrdering::parse(ordering.key()), Some(ordering));
        }
    }

    #[test]
    fn test_ordering_unknown_key_falls_back() {
        assert_eq!(
            ArticleOrdering::parse_or_default(Some("id; DROP TABLE articles")),
            ArticleOrdering::Newest
        );
        assert_eq!(ArticleOrdering::parse_or_default(None), ArticleOrdering::Newest);
    }

    #[test]
    fn test_every_ordering_breaks_ties_by_id() {
        for ordering in ArticleOrdering::ALL {
            assert!(ordering.order_by_sql().ends_with("a.id DESC"));
        }
    }

    #[test]
    fn test_update_input_has_changes() {
        assert!(!UpdateArticleInput::new().has_changes());
        assert!(UpdateArticleInput::new().with_title("x").has_changes());
        assert!(UpdateArticleInput::new().with_source(None).has_changes());
    }

    #[test]
    fn test_create_input_defaults_to_moderated() {
        let input = CreateArticleInput::new(1, "t".into(), "c".into(), vec![1]);
        assert_eq!(input.status, ArticleStatus::Moderated);
        assert!(input.source.is_none());
        assert!(input.image.is_none());
    }
}
