//! Seam for external article-extraction components.
//!
//! The pipeline treats an extractor as a black box: it is handed its own
//! clone of the cleaned document, may mutate it freely, and either returns an
//! article, returns nothing, or fails. Nothing and failure are both gate
//! failures for the stage, never pipeline errors.

use serde::Serialize;

use crate::error::ExtractorError;
use crate::parse::Document;

/// What an external extractor found.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedArticle {
    /// Article body as an HTML fragment
    pub content: String,
    pub title: Option<String>,
    pub byline: Option<String>,
    pub excerpt: Option<String>,
}

/// An article-extraction component the pipeline can invoke.
pub trait ArticleExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Extracts the article from `document`, which the extractor owns.
    fn extract(&self, document: Document) -> Result<Option<ExtractedArticle>, ExtractorError>;
}

impl<F> ArticleExtractor for F
where
    F: Fn(Document) -> Result<Option<ExtractedArticle>, ExtractorError> + Send + Sync,
{
    fn name(&self) -> &str {
        "closure"
    }

    fn extract(&self, document: Document) -> Result<Option<ExtractedArticle>, ExtractorError> {
        self(document)
    }
}
