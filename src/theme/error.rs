//! Template engine error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThemeError {
    /// Template could not be parsed or rendered
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Embedded template is not valid UTF-8
    #[error("Invalid template encoding: {0}")]
    InvalidEncoding(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
