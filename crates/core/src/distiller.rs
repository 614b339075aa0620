//! End-to-end clipping: pipeline, Markdown rendering and output validation.
//!
//! # Example
//!
//! ```rust
//! use distill_core::{Distiller, PageSource, RenderConfig};
//!
//! let html = format!(
//!     "<html><head><title>Notes</title></head><body><article><h1>Notes</h1><p>{}</p></article></body></html>",
//!     "A plain sentence about the topic. ".repeat(30)
//! );
//! let source = PageSource::from_html(&html, None).unwrap();
//!
//! let distiller = Distiller::builder()
//!     .render_config(RenderConfig { include_frontmatter: true, ..Default::default() })
//!     .build()
//!     .unwrap();
//! let clipping = distiller.distill(&source).unwrap();
//!
//! assert!(clipping.markdown.starts_with("+++\n"));
//! assert!(clipping.report.overall_score <= 100.0);
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::metadata::Metadata;
use crate::pipeline::{PageSource, Pipeline, PipelineConfig, PipelineContent, PipelineResult};
use crate::quality::{ProcessingStats, QualityOptions, QualityReport, QualityValidator};
use crate::render::{HtmdRenderer, MarkdownRenderer, RenderConfig, compose_document, strip_images};

/// Everything produced for one page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clipping {
    /// Pipeline outcome; `content` holds the rendered body
    pub result: PipelineResult,
    /// HTML fragment the winning stage selected
    pub html: String,
    /// Final document, with front matter and title heading when configured
    pub markdown: String,
    pub metadata: Metadata,
    /// Output quality of the rendered body
    pub report: QualityReport,
}

/// Runs a [`Pipeline`], renders its output and scores the rendering.
pub struct Distiller {
    pipeline: Arc<Pipeline>,
    renderer: Arc<dyn MarkdownRenderer>,
    render: RenderConfig,
    quality: QualityOptions,
    validator: QualityValidator,
}

impl fmt::Debug for Distiller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Distiller")
            .field("pipeline", &self.pipeline)
            .field("render", &self.render)
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl Distiller {
    /// Distiller over `pipeline` with the default renderer and quality options.
    pub fn new(pipeline: Pipeline) -> Self {
        let quality = QualityOptions { strict_mode: pipeline.config().strict_quality_mode, ..Default::default() };
        Self {
            pipeline: Arc::new(pipeline),
            renderer: Arc::new(HtmdRenderer::new()),
            render: RenderConfig::default(),
            quality,
            validator: QualityValidator::new(),
        }
    }

    pub fn builder() -> DistillerBuilder {
        DistillerBuilder::new()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn quality_options(&self) -> &QualityOptions {
        &self.quality
    }

    /// Extracts, renders and validates `source`.
    ///
    /// Extraction itself never fails; only rendering errors surface here.
    pub fn distill(&self, source: &PageSource) -> Result<Clipping> {
        let mut result = self.pipeline.execute(source);
        let html = result.content.as_str().to_string();

        let input = if self.render.strip_images { strip_images(&html)? } else { html.clone() };
        let body = self.renderer.render(&input)?;

        let metadata = source.document.extract_metadata();
        let markdown = compose_document(&self.render, &body, &metadata, &result.source_metadata);

        let stats = ProcessingStats::from_result(&result);
        let report = self.validator.validate(&body, &source.document, &stats, &self.quality);

        tracing::debug!(
            stage = %result.stage,
            output_score = report.overall_score,
            passes = report.passes_threshold,
            "clipping rendered"
        );

        result.content = PipelineContent::Rendered(body);
        Ok(Clipping { result, html, markdown, metadata, report })
    }
}

/// Builder for [`Distiller`]
#[derive(Default)]
pub struct DistillerBuilder {
    pipeline: Option<Pipeline>,
    config: Option<PipelineConfig>,
    renderer: Option<Arc<dyn MarkdownRenderer>>,
    render: RenderConfig,
    quality: Option<QualityOptions>,
}

impl DistillerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a prepared pipeline. Takes precedence over [`Self::config`].
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Build a default pipeline from `config`
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn renderer<R: MarkdownRenderer + 'static>(mut self, renderer: R) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    pub fn render_config(mut self, render: RenderConfig) -> Self {
        self.render = render;
        self
    }

    /// Output validation options. Strict mode is also switched on by
    /// `PipelineConfig::strict_quality_mode`.
    pub fn quality_options(mut self, quality: QualityOptions) -> Self {
        self.quality = Some(quality);
        self
    }

    /// Fails only when the pipeline config is rejected.
    pub fn build(self) -> Result<Distiller> {
        let pipeline = match self.pipeline {
            Some(pipeline) => pipeline,
            None => Pipeline::new(self.config.unwrap_or_default())?,
        };

        let mut quality = self.quality.unwrap_or_default();
        quality.strict_mode |= pipeline.config().strict_quality_mode;

        Ok(Distiller {
            pipeline: Arc::new(pipeline),
            renderer: self.renderer.unwrap_or_else(|| Arc::new(HtmdRenderer::new())),
            render: self.render,
            quality,
            validator: QualityValidator::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DistillError;
    use crate::pipeline::Stage;
    use url::Url;

    fn article_page() -> String {
        let paragraphs = (0..6)
            .map(|i| format!("<p>Paragraph {i} explains the topic in plain words and with care. It reads well.</p>"))
            .collect::<String>();
        format!(
            r#"<html><head><title>Field Notes</title><meta name="author" content="Ada Lovelace"></head><body>
                <nav><a href="/">Home</a></nav>
                <article><h1>Field Notes</h1>{paragraphs}<img src="/figure.png" alt="figure"></article>
            </body></html>"#
        )
    }

    fn source() -> PageSource {
        PageSource::from_html(&article_page(), Url::parse("https://example.com/notes").ok()).unwrap()
    }

    #[test]
    fn test_distill_renders_winning_stage() {
        let clipping = Distiller::builder().build().unwrap().distill(&source()).unwrap();

        assert_eq!(clipping.result.stage, Stage::Semantic);
        assert!(clipping.html.starts_with("<article>"));
        assert!(!clipping.result.content.is_html());
        assert_eq!(clipping.result.content.as_str(), clipping.markdown);
        assert!(!clipping.markdown.contains("Home"));
        assert_eq!(clipping.metadata.byline.as_deref(), Some("Ada Lovelace"));
        assert!((0.0..=100.0).contains(&clipping.report.overall_score));
    }

    #[test]
    fn test_distill_with_frontmatter_and_image_stripping() {
        let render = RenderConfig { include_frontmatter: true, include_title_heading: false, strip_images: true };
        let distiller = Distiller::builder().render_config(render).build().unwrap();
        let clipping = distiller.distill(&source()).unwrap();

        assert!(clipping.markdown.starts_with("+++\ntitle = \"Field Notes\"\n"));
        assert!(clipping.markdown.contains("url = \"https://example.com/notes\""));
        assert!(!clipping.markdown.contains("figure.png"));
        assert!(clipping.html.contains("figure.png"));
    }

    #[test]
    fn test_custom_renderer() {
        let distiller = Distiller::builder()
            .renderer(|html: &str| -> Result<String> { Ok(format!("LEN {}", html.len())) })
            .build()
            .unwrap();
        let clipping = distiller.distill(&source()).unwrap();

        assert_eq!(clipping.markdown, format!("LEN {}", clipping.html.len()));
    }

    #[test]
    fn test_render_error_surfaces() {
        let distiller = Distiller::builder()
            .renderer(|_: &str| -> Result<String> { Err(DistillError::RenderError("boom".to_string())) })
            .build()
            .unwrap();

        assert!(matches!(distiller.distill(&source()), Err(DistillError::RenderError(_))));
    }

    #[test]
    fn test_strict_mode_follows_pipeline_config() {
        let config = PipelineConfig { strict_quality_mode: true, ..Default::default() };
        let distiller = Distiller::builder().config(config.clone()).build().unwrap();
        assert!(distiller.quality_options().strict_mode);

        let distiller = Distiller::new(Pipeline::new(config).unwrap());
        assert!(distiller.quality_options().strict_mode);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            enable_semantic_stage: false,
            enable_external_extractor_stage: false,
            enable_heuristic_stage: false,
            ..Default::default()
        };
        assert!(matches!(Distiller::builder().config(config).build(), Err(DistillError::ConfigError(_))));
    }
}
