//! Markdown rendering of extracted content.
//!
//! The pipeline hands its HTML fragment to a [`MarkdownRenderer`]. The
//! default [`HtmdRenderer`] converts with `htmd` when the `markdown` feature
//! is enabled and falls back to plain text otherwise.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{DistillError, Result};
use crate::metadata::Metadata;
use crate::pipeline::SourceMetadata;

static BLANK_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid blank run regex"));

/// Converts an HTML fragment to its final text form.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, html: &str) -> Result<String>;
}

impl<F> MarkdownRenderer for F
where
    F: Fn(&str) -> Result<String> + Send + Sync,
{
    fn render(&self, html: &str) -> Result<String> {
        self(html)
    }
}

/// Configuration for Markdown rendering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    /// Include TOML front matter with metadata
    pub include_frontmatter: bool,
    /// Include title as H1 heading at the start of content
    pub include_title_heading: bool,
    /// Strip images from output
    pub strip_images: bool,
}

/// Default renderer backed by `htmd`
#[derive(Debug, Clone, Default)]
pub struct HtmdRenderer {
    config: RenderConfig,
}

impl HtmdRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Renders `html` with the configured front matter and title heading.
    pub fn render_document(&self, html: &str, metadata: &Metadata, source: &SourceMetadata) -> Result<String> {
        Ok(compose_document(&self.config, &self.render(html)?, metadata, source))
    }
}

impl MarkdownRenderer for HtmdRenderer {
    fn render(&self, html: &str) -> Result<String> {
        let html = if self.config.strip_images { strip_images(html)? } else { html.to_string() };
        let markdown = html_to_markdown(&html)?;
        Ok(normalize_blank_lines(&markdown))
    }
}

/// Prefixes rendered `body` with the front matter and title heading `config` asks for.
pub fn compose_document(config: &RenderConfig, body: &str, metadata: &Metadata, source: &SourceMetadata) -> String {
    let mut output = String::new();

    if config.include_frontmatter {
        output.push_str(&frontmatter(metadata, source));
        output.push('\n');
    }

    if config.include_title_heading
        && let Some(title) = metadata.title.as_ref().or(source.title.as_ref())
    {
        output.push_str(&format!("# {}\n\n", title.trim()));
    }

    output.push_str(body);
    output
}

/// TOML front matter block (`+++` delimited) for a clipping
pub fn frontmatter(metadata: &Metadata, source: &SourceMetadata) -> String {
    let mut block = String::from("+++\n");
    let title = metadata.title.as_ref().or(source.title.as_ref());

    let fields = [
        ("title", title),
        ("author", metadata.byline.as_ref()),
        ("date", metadata.published.as_ref()),
        ("site", metadata.site_name.as_ref()),
        ("excerpt", metadata.excerpt.as_ref()),
        ("language", metadata.language.as_ref()),
        ("url", source.url.as_ref()),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            block.push_str(&format!("{key} = {}\n", toml_escape_string(value)));
        }
    }
    block.push_str(&format!("captured_at = {}\n", toml_escape_string(&source.captured_at)));

    block.push_str("+++\n");
    block
}

/// Escape a string for TOML format
fn toml_escape_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n"))
}

/// Collapses runs of blank lines to one and trims the ends
fn normalize_blank_lines(markdown: &str) -> String {
    let collapsed = BLANK_RUNS.replace_all(markdown, "\n\n");
    let mut out = collapsed.trim().to_string();
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(feature = "markdown")]
fn html_to_markdown(html: &str) -> Result<String> {
    htmd::convert(html).map_err(|e| DistillError::RenderError(e.to_string()))
}

/// Fallback HTML to text conversion when the markdown feature is disabled
#[cfg(not(feature = "markdown"))]
fn html_to_markdown(html: &str) -> Result<String> {
    let doc = scraper::Html::parse_fragment(html);
    Ok(doc.root_element().text().collect::<String>())
}

/// Strip all img tags from HTML
pub(crate) fn strip_images(html: &str) -> Result<String> {
    let mut output = Vec::new();
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![lol_html::element!("img, picture", |el| {
                el.remove();
                Ok(())
            })],
            ..Default::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return Ok(html.to_string());
    }

    String::from_utf8(output).map_err(|e| DistillError::RenderError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceMetadata {
        SourceMetadata {
            url: Some("https://example.com/post".to_string()),
            title: Some("Source Title".to_string()),
            captured_at: "2026-01-02T03:04:05Z".to_string(),
        }
    }

    #[cfg(feature = "markdown")]
    #[test]
    fn test_render_basic_markdown() {
        let html = r#"<h1>Title</h1><p>Check out <a href="https://example.com">this link</a>.</p>"#;
        let markdown = HtmdRenderer::new().render(html).unwrap();

        assert!(markdown.contains("# Title"));
        assert!(markdown.contains("[this link](https://example.com)"));
        assert!(markdown.ends_with('\n'));
    }

    #[cfg(feature = "markdown")]
    #[test]
    fn test_render_keeps_code_fenced() {
        let markdown = HtmdRenderer::new().render("<pre><code>let x = 1;</code></pre>").unwrap();
        assert!(markdown.contains("```"));
        assert!(markdown.contains("let x = 1;"));
    }

    #[test]
    fn test_strip_images() {
        let config = RenderConfig { strip_images: true, ..Default::default() };
        let html = r#"<p>Look <img src="a.png" alt="pic"> here</p>"#;
        let markdown = HtmdRenderer::with_config(config).render(html).unwrap();
        assert!(!markdown.contains("a.png"));
        assert!(markdown.contains("Look"));
    }

    #[test]
    fn test_render_document_with_frontmatter_and_title() {
        let config = RenderConfig { include_frontmatter: true, include_title_heading: true, strip_images: false };
        let metadata = Metadata { byline: Some("Jane \"JD\" Doe".to_string()), ..Default::default() };

        let renderer = HtmdRenderer::with_config(config);
        let out = renderer.render_document("<p>Body text.</p>", &metadata, &source()).unwrap();

        assert!(out.starts_with("+++\ntitle = \"Source Title\"\n"));
        assert!(out.contains("author = \"Jane \\\"JD\\\" Doe\""));
        assert!(out.contains("url = \"https://example.com/post\""));
        assert!(out.contains("captured_at = \"2026-01-02T03:04:05Z\""));
        assert!(out.contains("+++\n\n# Source Title\n\n"));
        assert!(out.contains("Body text."));
    }

    #[test]
    fn test_closure_renderer() {
        let upper = |html: &str| -> Result<String> { Ok(html.to_uppercase()) };
        assert_eq!(upper.render("<p>a</p>").unwrap(), "<P>A</P>");
    }

    #[test]
    fn test_normalize_blank_lines() {
        assert_eq!(normalize_blank_lines("\n\na\n\n\n\n\nb\n\n"), "a\n\nb\n");
        assert_eq!(normalize_blank_lines("   \n"), "");
    }
}
