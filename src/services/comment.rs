//! Comment service

use std::sync::Arc;

use crate::db::repositories::{ArticleRepository, CommentRepository};
use crate::models::{Comment, CommentWithMeta, CreateCommentInput, PageRequest, Paged, User};

/// Error types for comment service operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// The user may not change this comment
    #[error("Forbidden")]
    Forbidden,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Comment service
pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    article_repo: Arc<dyn ArticleRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, article_repo: Arc<dyn ArticleRepository>) -> Self {
        Self { repo, article_repo }
    }

    /// One page of an article's comments, newest first
    pub async fn list_for_article(
        &self,
        article_id: i64,
        page: PageRequest,
    ) -> Result<Paged<CommentWithMeta>, CommentServiceError> {
        let total = self.repo.count_for_article(article_id).await?;
        let info = page.resolve(total);
        let items = self
            .repo
            .list_for_article(article_id, info.offset(), info.limit())
            .await?;
        Ok(Paged::new(items, info, total))
    }

    /// One page of all comments, newest first
    pub async fn list_all(
        &self,
        page: PageRequest,
    ) -> Result<Paged<CommentWithMeta>, CommentServiceError> {
        let total = self.repo.count_all().await?;
        let info = page.resolve(total);
        let items = self.repo.list_all(info.offset(), info.limit()).await?;
        Ok(Paged::new(items, info, total))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Comment, CommentServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| CommentServiceError::NotFound(format!("comment {}", id)))
    }

    /// Add a comment to an existing article
    pub async fn create(
        &self,
        article_id: i64,
        author_id: i64,
        content: &str,
    ) -> Result<Comment, CommentServiceError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CommentServiceError::ValidationError(
                "Comment cannot be empty".to_string(),
            ));
        }
        if self.article_repo.get_by_id(article_id).await?.is_none() {
            return Err(CommentServiceError::NotFound(format!("article {}", article_id)));
        }

        let comment = self
            .repo
            .create(&CreateCommentInput {
                article_id,
                author_id,
                content: content.to_string(),
            })
            .await?;
        tracing::info!(comment_id = comment.id, article_id, author_id, "comment created");
        Ok(comment)
    }

    pub async fn delete(&self, id: i64) -> Result<(), CommentServiceError> {
        self.get_by_id(id).await?;
        self.repo.delete(id).await?;
        tracing::info!(comment_id = id, "comment deleted");
        Ok(())
    }

    /// Delete on behalf of a user; only the author or a superuser may.
    ///
    /// Returns the deleted comment so callers can redirect to its article.
    pub async fn delete_as(&self, user: &User, id: i64) -> Result<Comment, CommentServiceError> {
        let comment = self.get_by_id(id).await?;
        if !user.can_manage(comment.author_id) {
            tracing::warn!(comment_id = id, user_id = user.id, "comment delete refused");
            return Err(CommentServiceError::Forbidden);
        }
        self.repo.delete(id).await?;
        tracing::info!(comment_id = id, user_id = user.id, "comment deleted");
        Ok(comment)
    }
}
