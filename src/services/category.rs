//! Category service
//!
//! Listing, slug resolution and admin-side creation/deletion of categories.

use crate::db::repositories::CategoryRepository;
use crate::models::{
    Category, CategoryWithCount, CreateCategoryInput, NAME_MAX_LEN, SLUG_MAX_LEN,
};
use std::sync::Arc;

/// How many categories the sidebar shows
pub const TOP_CATEGORIES_LIMIT: i64 = 5;

/// Error types for category service operations
#[derive(Debug, thiserror::Error)]
pub enum CategoryServiceError {
    #[error("Category not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Category service
pub struct CategoryService {
    repo: Arc<dyn CategoryRepository>,
}

impl CategoryService {
    pub fn new(repo: Arc<dyn CategoryRepository>) -> Self {
        Self { repo }
    }

    /// All categories ordered by name
    pub async fn list(&self) -> Result<Vec<Category>, CategoryServiceError> {
        Ok(self.repo.list().await?)
    }

    /// All categories annotated with their published-article counts
    pub async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        Ok(self.repo.list_with_counts().await?)
    }

    /// Busiest categories, only those with at least one published article
    pub async fn top_categories(&self) -> Result<Vec<CategoryWithCount>, CategoryServiceError> {
        Ok(self.repo.top_with_counts(TOP_CATEGORIES_LIMIT).await?)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Category, CategoryServiceError> {
        self.repo
            .get_by_slug(slug)
            .await?
            .ok_or_else(|| CategoryServiceError::NotFound(slug.to_string()))
    }

    /// Create a category, deriving the slug from the name when none is given
    pub async fn create(&self, input: CreateCategoryInput) -> Result<Category, CategoryServiceError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category name cannot be empty".to_string(),
            ));
        }
        if name.chars().count() > NAME_MAX_LEN {
            return Err(CategoryServiceError::ValidationError(format!(
                "Category name cannot exceed {} characters",
                NAME_MAX_LEN
            )));
        }

        // Lowercasing can lengthen a name, so a generated slug is cut to fit
        let slug = match input.slug.trim() {
            "" => truncate_slug(generate_slug(name)),
            given => generate_slug(given),
        };
        if slug.chars().count() > SLUG_MAX_LEN {
            return Err(CategoryServiceError::ValidationError(format!(
                "Category slug cannot exceed {} characters",
                SLUG_MAX_LEN
            )));
        }
        if slug.is_empty() {
            return Err(CategoryServiceError::ValidationError(
                "Category slug cannot be empty".to_string(),
            ));
        }
        if self.repo.exists_by_slug(&slug).await? {
            return Err(CategoryServiceError::ValidationError(format!(
                "Category with slug '{}' already exists",
                slug
            )));
        }

        let category = self.repo.create(name, &slug).await?;
        tracing::info!(category_id = category.id, slug = %category.slug, "category created");
        Ok(category)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CategoryServiceError> {
        if self.repo.get_by_id(id).await?.is_none() {
            return Err(CategoryServiceError::NotFound(id.to_string()));
        }
        self.repo.delete(id).await?;
        tracing::info!(category_id = id, "category deleted");
        Ok(())
    }
}

/// Build a URL slug from a name.
///
/// Letters and digits of any script are kept (lowercased); every run of
/// other characters becomes a single hyphen, with none at either end.
pub fn generate_slug(name: &str) -> String {
    let mut result = String::new();
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !result.is_empty() {
                result.push('-');
            }
            pending_hyphen = false;
            result.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    result
}

/// At most `SLUG_MAX_LEN` characters, never ending in a hyphen
fn truncate_slug(slug: String) -> String {
    if slug.chars().count() <= SLUG_MAX_LEN {
        return slug;
    }
    let cut: String = slug.chars().take(SLUG_MAX_LEN).collect();
    cut.trim_end_matches('-').to_string()
}
