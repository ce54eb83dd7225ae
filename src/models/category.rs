//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum category name length in characters
pub const NAME_MAX_LEN: usize = 100;

/// Maximum slug length in characters (`categories.slug` column width)
pub const SLUG_MAX_LEN: usize = 100;

/// Category entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// Unique URL identifier
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Category with the number of published articles in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryWithCount {
    #[serde(flatten)]
    pub category: Category,
    pub article_count: i64,
}

/// Input for creating a category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    /// Generated from the name when empty
    #[serde(default)]
    pub slug: String,
}
