//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They own
//! validation, not-found signalling, pagination and authorization checks.

pub mod article;
pub mod category;
pub mod comment;
pub mod media;
pub mod password;
pub mod user;

pub use article::{ArticleService, ArticleServiceError};
pub use category::{generate_slug, CategoryService, CategoryServiceError, TOP_CATEGORIES_LIMIT};
pub use comment::{CommentService, CommentServiceError};
pub use media::{MediaError, MediaKind, MediaStore};
pub use password::{check_password_policy, hash_password, verify_password};
pub use user::{UserService, UserServiceError, INVALID_CREDENTIALS};
