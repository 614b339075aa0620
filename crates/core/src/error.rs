//! Error types for distill operations.
//!
//! [`DistillError`] covers everything that can fail at a component's public
//! boundary. Per-rule boilerplate filtering failures are reported separately as
//! [`FilterError`] values, which are collected rather than propagated, and
//! external extractor failures as [`ExtractorError`].
//!
//! # Example
//!
//! ```rust
//! use distill_core::{DistillError, Result};
//!
//! fn require_content(html: &str) -> Result<&str> {
//!     if html.trim().is_empty() {
//!         return Err(DistillError::NoContent);
//!     }
//!     Ok(html)
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

/// Main error type for distill operations.
#[derive(Error, Debug)]
pub enum DistillError {
    /// Invalid URL provided.
    ///
    /// Returned when a base URL cannot be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTML parsing errors.
    ///
    /// Returned when HTML cannot be parsed or a CSS selector is invalid.
    #[error("Failed to parse HTML: {0}")]
    HtmlParseError(String),

    /// No content could be extracted from the document.
    #[error("No content could be extracted from the document")]
    NoContent,

    /// Pipeline configuration errors.
    ///
    /// Returned when a configuration is rejected at construction time, for
    /// example when every extraction stage is disabled at once.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Site configuration errors.
    ///
    /// Returned when parsing site configuration files fails.
    #[error("Site configuration error: {0}")]
    SiteConfigError(String),

    /// Markdown rendering errors.
    #[error("Failed to render Markdown: {0}")]
    RenderError(String),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while applying a single boilerplate rule.
///
/// The rule engine never stops on these; it records them and moves on to the
/// next rule.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum FilterError {
    /// The rule's selector could not be compiled.
    #[error("rule '{rule}' has an invalid selector '{selector}': {message}")]
    InvalidSelector { rule: String, selector: String, message: String },

    /// A matched node could not be unwrapped (it has no parent to receive its children).
    #[error("rule '{rule}' could not unwrap a <{tag}> element: {message}")]
    Unwrap { rule: String, tag: String, message: String },
}

/// Failure reported by an external article-extraction component.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractorError {
    /// The component ran but could not produce an article.
    #[error("{extractor} failed: {message}")]
    Failed { extractor: String, message: String },
}

/// Result type alias for DistillError.
pub type Result<T> = std::result::Result<T, DistillError>;
