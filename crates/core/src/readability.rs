//! Default external article extractor.
//!
//! A readability-style extractor: paragraph-level nodes are scored on their
//! own prose signals, the score flows up to the parent and grandparent, and
//! the best ancestor plus its qualifying siblings becomes the article. It
//! works on the clone it is given and is free to strip it.
//!
//! # Example
//!
//! ```rust
//! use distill_core::{ArticleExtractor, ReadabilityConfig, ReadabilityExtractor};
//! use distill_core::parse::Document;
//!
//! let config = ReadabilityConfig::builder().char_threshold(0).build();
//! let extractor = ReadabilityExtractor::with_config(config);
//! let html = format!("<html><body><article><p>{}</p></article></body></html>", "Some prose, here. ".repeat(20));
//! let article = extractor.extract(Document::parse(&html).unwrap()).unwrap();
//! assert!(article.is_some());
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use ego_tree::NodeId;
use regex::Regex;

use crate::error::ExtractorError;
use crate::extractor::{ArticleExtractor, ExtractedArticle};
use crate::metadata::Metadata;
use crate::parse::{Document, Element};
use crate::scoring::{ScoreConfig, base_tag_score, class_id_weight, link_density};

static UNLIKELY_CANDIDATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)-ad-|ai2html|banner|breadcrumbs|combx|comment|community|cover-wrap|disqus|extra|footer|gdpr|header|legends|menu|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|yom-remote",
    )
    .expect("valid unlikely candidates regex")
});

static MAYBE_CANDIDATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)and|article|body|column|content|main|shadow").expect("valid maybe candidate regex"));

const PARAGRAPH_TAGS: &[&str] = &["p", "pre", "td", "blockquote"];
const PROTECTED_TAGS: &[&str] = &["html", "body", "article", "main", "a"];

/// Configuration for the readability extractor.
///
/// # Example
///
/// ```rust
/// use distill_core::ReadabilityConfig;
///
/// let config = ReadabilityConfig::builder()
///     .min_score(25.0)
///     .char_threshold(500)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ReadabilityConfig {
    /// Minimum score of the top candidate (default: 20.0).
    pub min_score: f64,

    /// Minimum character count for a usable article (default: 500).
    pub char_threshold: usize,

    /// Shortest paragraph that gets scored (default: 25).
    pub min_paragraph_len: usize,

    /// Maximum elements to parse (0 = unlimited, default: 0).
    pub max_elems_to_parse: usize,

    /// Whether to remove unlikely candidates (default: true).
    pub remove_unlikely: bool,

    /// Siblings scoring at least this share of the top score are kept (default: 0.2).
    pub sibling_threshold: f64,
}

impl Default for ReadabilityConfig {
    fn default() -> Self {
        Self {
            min_score: 20.0,
            char_threshold: 500,
            min_paragraph_len: 25,
            max_elems_to_parse: 0,
            remove_unlikely: true,
            sibling_threshold: 0.2,
        }
    }
}

impl ReadabilityConfig {
    /// Creates a new builder for ReadabilityConfig.
    pub fn builder() -> ReadabilityConfigBuilder {
        ReadabilityConfigBuilder::new()
    }
}

/// Builder for ReadabilityConfig.
pub struct ReadabilityConfigBuilder {
    config: ReadabilityConfig,
}

impl ReadabilityConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self { config: ReadabilityConfig::default() }
    }

    /// Sets the minimum score threshold.
    pub fn min_score(mut self, value: f64) -> Self {
        self.config.min_score = value;
        self
    }

    /// Sets the character threshold.
    pub fn char_threshold(mut self, value: usize) -> Self {
        self.config.char_threshold = value;
        self
    }

    /// Sets the shortest scored paragraph.
    pub fn min_paragraph_len(mut self, value: usize) -> Self {
        self.config.min_paragraph_len = value;
        self
    }

    /// Sets the maximum elements to parse.
    pub fn max_elems_to_parse(mut self, value: usize) -> Self {
        self.config.max_elems_to_parse = value;
        self
    }

    /// Sets whether to remove unlikely candidates.
    pub fn remove_unlikely(mut self, value: bool) -> Self {
        self.config.remove_unlikely = value;
        self
    }

    /// Sets the sibling score threshold.
    pub fn sibling_threshold(mut self, value: f64) -> Self {
        self.config.sibling_threshold = value;
        self
    }

    /// Builds the config.
    pub fn build(self) -> ReadabilityConfig {
        self.config
    }
}

impl Default for ReadabilityConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Readability-style [`ArticleExtractor`].
#[derive(Debug, Clone, Default)]
pub struct ReadabilityExtractor {
    config: ReadabilityConfig,
    score_config: ScoreConfig,
}

impl ReadabilityExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ReadabilityConfig) -> Self {
        Self { config, score_config: ScoreConfig::default() }
    }

    pub fn config(&self) -> &ReadabilityConfig {
        &self.config
    }

    fn strip_unlikely_candidates(&self, doc: &mut Document) -> usize {
        let unlikely: Vec<NodeId> = doc
            .root()
            .descendant_elements()
            .into_iter()
            .filter(|el| {
                let hints = el.class_and_id();
                !PROTECTED_TAGS.contains(&el.tag_name().as_str())
                    && !el.is_preformatted()
                    && UNLIKELY_CANDIDATES.is_match(&hints)
                    && !MAYBE_CANDIDATE.is_match(&hints)
            })
            .map(|el| el.id())
            .collect();

        unlikely.into_iter().filter(|id| doc.remove(*id)).count()
    }

    /// Scores paragraphs and credits their parent (full) and grandparent (half).
    fn score_ancestors(&self, doc: &Document) -> HashMap<NodeId, f64> {
        let mut scores: HashMap<NodeId, f64> = HashMap::new();

        for paragraph in doc.root().descendant_elements() {
            if !PARAGRAPH_TAGS.contains(&paragraph.tag_name().as_str()) {
                continue;
            }
            let text = paragraph.text();
            let text_len = paragraph.text_len();
            if text_len < self.config.min_paragraph_len {
                continue;
            }

            let content_score = 1.0 + text.matches(',').count() as f64 + (text_len as f64 / 100.0).floor().min(3.0);

            let parent = paragraph.parent_element();
            let grandparent = parent.as_ref().and_then(Element::parent_element);
            for (ancestor, share) in [(parent, 1.0), (grandparent, 0.5)] {
                let Some(ancestor) = ancestor else { continue };
                if matches!(ancestor.tag_name().as_str(), "html" | "body") {
                    continue;
                }
                let entry = scores
                    .entry(ancestor.id())
                    .or_insert_with(|| base_tag_score(&ancestor) + class_id_weight(&ancestor, &self.score_config));
                *entry += content_score * share;
            }
        }

        for (id, score) in scores.iter_mut() {
            if let Some(el) = doc.element(*id) {
                *score *= 1.0 - link_density(&el);
            }
        }

        scores
    }

    fn collect_article(&self, doc: &Document, top: NodeId, top_score: f64, scores: &HashMap<NodeId, f64>) -> String {
        let Some(top_el) = doc.element(top) else {
            return String::new();
        };

        let Some(parent) = top_el.parent_element() else {
            return top_el.outer_html();
        };

        let sibling_floor = (top_score * self.config.sibling_threshold).max(10.0);
        let mut parts = Vec::new();

        for sibling in parent.child_elements() {
            let keep = if sibling.id() == top {
                true
            } else if scores.get(&sibling.id()).is_some_and(|score| *score >= sibling_floor) {
                true
            } else if sibling.tag_name() == "p" {
                let text = sibling.text();
                let text_len = sibling.text_len();
                let ld = link_density(&sibling);
                (text_len > 80 && ld < 0.25) || (text_len > 0 && ld == 0.0 && text.contains(". "))
            } else {
                false
            };

            if keep {
                parts.push(sibling.outer_html());
            }
        }

        format!("<div>{}</div>", parts.join("\n"))
    }
}

impl ArticleExtractor for ReadabilityExtractor {
    fn name(&self) -> &str {
        "readability"
    }

    fn extract(&self, mut document: Document) -> Result<Option<ExtractedArticle>, ExtractorError> {
        if self.config.max_elems_to_parse > 0 {
            let count = document.element_count();
            if count > self.config.max_elems_to_parse {
                return Err(ExtractorError::Failed {
                    extractor: self.name().to_string(),
                    message: format!("document has {} elements, limit is {}", count, self.config.max_elems_to_parse),
                });
            }
        }

        let metadata = document.extract_metadata();

        if self.config.remove_unlikely {
            let removed = self.strip_unlikely_candidates(&mut document);
            tracing::trace!(removed, "stripped unlikely candidates");
        }

        let scores = self.score_ancestors(&document);
        let best = scores
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(id, score)| (*id, *score));

        let Some((top, top_score)) = best else {
            return Ok(None);
        };
        if top_score < self.config.min_score {
            tracing::debug!(top_score, "readability candidate below minimum score");
            return Ok(None);
        }

        let content = self.collect_article(&document, top, top_score, &scores);
        let text_len = Document::parse_fragment(&content).root().text_len();
        if text_len < self.config.char_threshold {
            tracing::debug!(text_len, "readability article shorter than the character threshold");
            return Ok(None);
        }

        let Metadata { title, byline, excerpt, .. } = metadata;
        Ok(Some(ExtractedArticle { content, title, byline, excerpt }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article_page() -> String {
        format!(
            r#"<html><head><title>Test Article</title><meta name="author" content="Test Author"></head>
            <body>
                <div class="sidebar"><p>Sidebar text that is long enough to be scored, sadly.</p></div>
                <div id="story">
                    <p>{}</p>
                    <p>{}</p>
                    <p>{}</p>
                </div>
                <div class="comments"><p>Nice post, thanks for sharing, really.</p></div>
            </body></html>"#,
            "The first paragraph has prose, commas, and clauses. ".repeat(5),
            "A second paragraph continues, at length, with detail. ".repeat(5),
            "The third one wraps up the story, neatly. ".repeat(5)
        )
    }

    #[test]
    fn test_readability_config_builder() {
        let config = ReadabilityConfig::builder()
            .min_score(30.0)
            .char_threshold(1000)
            .max_elems_to_parse(500)
            .remove_unlikely(false)
            .sibling_threshold(0.3)
            .build();

        assert_eq!(config.min_score, 30.0);
        assert_eq!(config.char_threshold, 1000);
        assert_eq!(config.max_elems_to_parse, 500);
        assert!(!config.remove_unlikely);
        assert_eq!(config.sibling_threshold, 0.3);
    }

    #[test]
    fn test_extracts_story_with_metadata() {
        let doc = Document::parse(&article_page()).unwrap();
        let article = ReadabilityExtractor::new().extract(doc).unwrap().unwrap();

        assert!(article.content.contains("The first paragraph"));
        assert!(article.content.contains("wraps up the story"));
        assert!(!article.content.contains("Sidebar text"));
        assert!(!article.content.contains("Nice post"));
        assert_eq!(article.title.as_deref(), Some("Test Article"));
        assert_eq!(article.byline.as_deref(), Some("Test Author"));
    }

    #[test]
    fn test_navigation_only_page_yields_nothing() {
        let html = r##"<html><body><nav><a href="#">Link 1</a><a href="#">Link 2</a></nav></body></html>"##;
        let doc = Document::parse(html).unwrap();
        assert_eq!(ReadabilityExtractor::new().extract(doc).unwrap(), None);
    }

    #[test]
    fn test_element_limit_is_an_error() {
        let config = ReadabilityConfig::builder().max_elems_to_parse(3).build();
        let doc = Document::parse(&article_page()).unwrap();
        let err = ReadabilityExtractor::with_config(config).extract(doc).unwrap_err();
        assert!(err.to_string().starts_with("readability failed"));
    }
}
