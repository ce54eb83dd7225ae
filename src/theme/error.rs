//! Template engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    /// A template failed to parse or render
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Reading the override directory failed
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
