//! Data models
//!
//! Database entities (User, Session, Category, Article, Comment), the
//! read views listings render, and input types for writes.

mod article;
mod category;
mod comment;
mod pagination;
mod patch;
mod session;
mod user;

pub use article::{
    Article, ArticleDetail, ArticleFilter, ArticleIncludes, ArticleOrdering, ArticleStatus,
    ArticleWithMeta, CreateArticleInput, UpdateArticleInput, SOURCE_MAX_LEN, TITLE_MAX_LEN,
};
pub use category::{
    Category, CategoryWithCount, CreateCategoryInput, NAME_MAX_LEN, SLUG_MAX_LEN,
};
pub use comment::{Comment, CommentWithMeta, CreateCommentInput};
pub use pagination::{PageInfo, PageRequest, Paged};
pub use patch::Patch;
pub use session::Session;
pub use user::{
    AuthorStats, CreateUserInput, RegisterInput, TopAuthor, UpdateProfileInput, User,
    UserSummary, DEFAULT_AVATAR, USERNAME_MAX_LEN,
};
