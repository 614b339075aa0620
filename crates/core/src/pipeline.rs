//! Stage sequencing with per-stage quality gates.
//!
//! Stages run in a fixed order and the first one whose output clears its
//! gate (and the caller's quality floor) wins:
//!
//! 1. site-specific extractor, on the untouched document
//! 2. semantic containers (`article`, `main`, `[role="main"]`, `[role="article"]`)
//! 3. external article extractor, on a clone
//! 4. heuristic candidate scoring and pruning, which always passes
//!
//! Every rejected stage leaves a `"<stage>-gate-failed"` marker in
//! [`PipelineResult::fallbacks_used`]. A blown time budget or a panic inside a
//! stage ends the run early with the raw body and a score of zero.
//!
//! # Example
//!
//! ```rust
//! use distill_core::{PageSource, Pipeline, PipelineConfig, Stage};
//!
//! let html = format!("<html><body><article><h1>Title</h1><p>{}</p></article></body></html>", "word ".repeat(200));
//! let source = PageSource::from_html(&html, None).unwrap();
//! let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
//!
//! let result = pipeline.execute(&source);
//! assert_eq!(result.stage, Stage::Semantic);
//! assert!(result.fallbacks_used.is_empty());
//! ```

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use scraper::Selector;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use url::Url;

use crate::candidates::{PruneConfig, find_best_candidate, prune_node};
use crate::error::{DistillError, FilterError, Result};
use crate::extractor::ArticleExtractor;
use crate::filter::{apply_rules, cleanup_empty_elements, remove_hidden_elements, should_bypass_deeper_extraction};
use crate::gate::{GateContext, QualityGate, QualityGateResult, StageThresholds};
use crate::parse::{Document, normalized_len};
use crate::readability::ReadabilityExtractor;
use crate::rules::RuleRegistry;
use crate::scoring::ScoreConfig;
use crate::siteconfig::{SiteExtractor, SiteExtractors};

/// Marker recorded when the time budget runs out.
pub const TIMEOUT_MARKER: &str = "timeout";

/// Marker recorded when a stage panics.
pub const PIPELINE_ERROR_MARKER: &str = "pipeline-error";

static SEMANTIC_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    [r#"article"#, r#"main"#, r#"[role="main"]"#, r#"[role="article"]"#]
        .iter()
        .map(|selector| Selector::parse(selector).expect("valid semantic selector"))
        .collect()
});

/// An extraction stage, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    SiteSpecific,
    Semantic,
    ExternalExtractor,
    Heuristic,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [Stage::SiteSpecific, Stage::Semantic, Stage::ExternalExtractor, Stage::Heuristic];

    pub fn name(self) -> &'static str {
        match self {
            Stage::SiteSpecific => "site-specific",
            Stage::Semantic => "semantic",
            Stage::ExternalExtractor => "external-extractor",
            Stage::Heuristic => "heuristic",
        }
    }

    /// Marker recorded when this stage's output is rejected.
    pub fn fallback_marker(self) -> String {
        format!("{}-gate-failed", self.name())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Orchestrator state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    NotStarted,
    SiteSpecific,
    Semantic,
    ExternalExtractor,
    Heuristic,
    Done,
    Failed,
}

impl From<Stage> for PipelineState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::SiteSpecific => PipelineState::SiteSpecific,
            Stage::Semantic => PipelineState::Semantic,
            Stage::ExternalExtractor => PipelineState::ExternalExtractor,
            Stage::Heuristic => PipelineState::Heuristic,
        }
    }
}

/// Per-request pipeline configuration.
///
/// Unknown fields are rejected when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub enable_semantic_stage: bool,
    pub enable_external_extractor_stage: bool,
    pub enable_heuristic_stage: bool,
    /// Floor (0 to 100) a gated stage must clear on top of its own threshold
    pub min_quality_score: f64,
    /// Time budget checked at every stage entry; 0 disables it
    pub timeout_ms: u64,
    /// Log stage transitions and gate verdicts at `info` instead of `debug`
    pub debug: bool,
    /// Require every output quality metric to clear 70
    pub strict_quality_mode: bool,
    pub thresholds: StageThresholds,
    pub scoring: ScoreConfig,
    pub pruning: PruneConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enable_semantic_stage: true,
            enable_external_extractor_stage: true,
            enable_heuristic_stage: true,
            min_quality_score: 0.0,
            timeout_ms: 5000,
            debug: false,
            strict_quality_mode: false,
            thresholds: StageThresholds::default(),
            scoring: ScoreConfig::default(),
            pruning: PruneConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| DistillError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations no request could run under.
    pub fn validate(&self) -> Result<()> {
        if !self.enable_semantic_stage && !self.enable_external_extractor_stage && !self.enable_heuristic_stage {
            return Err(DistillError::ConfigError("every extraction stage is disabled".to_string()));
        }

        if !(0.0..=100.0).contains(&self.min_quality_score) {
            return Err(DistillError::ConfigError(format!(
                "min_quality_score must be between 0 and 100, got {}",
                self.min_quality_score
            )));
        }

        let thresholds = [
            ("site_specific", self.thresholds.site_specific),
            ("semantic", self.thresholds.semantic),
            ("external_extractor", self.thresholds.external_extractor),
        ];
        for (name, value) in thresholds {
            if !(0.0..=100.0).contains(&value) {
                return Err(DistillError::ConfigError(format!(
                    "threshold {name} must be between 0 and 100, got {value}"
                )));
            }
        }

        Ok(())
    }
}

/// A page handed to the pipeline.
#[derive(Debug, Clone)]
pub struct PageSource {
    pub document: Document,
    pub base_url: Option<Url>,
    pub title: Option<String>,
}

impl PageSource {
    pub fn new(document: Document, base_url: Option<Url>, title: Option<String>) -> Self {
        Self { document, base_url, title }
    }

    /// Preprocesses and parses `html`, reading the title from the page metadata.
    pub fn from_html(html: &str, base_url: Option<Url>) -> Result<Self> {
        let document = Document::parse_with_preprocessing(html, base_url.clone())?;
        let title = document.extract_title();
        Ok(Self { document, base_url, title })
    }

    pub fn host(&self) -> Option<&str> {
        self.base_url.as_ref().and_then(|url| url.host_str())
    }
}

/// Where the content came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceMetadata {
    pub url: Option<String>,
    pub title: Option<String>,
    /// RFC 3339 capture time
    pub captured_at: String,
}

impl SourceMetadata {
    fn capture(source: &PageSource) -> Self {
        Self {
            url: source.base_url.as_ref().map(Url::to_string),
            title: source.title.clone(),
            captured_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        }
    }
}

/// Extracted content, before or after rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PipelineContent {
    /// HTML fragment chosen by a stage
    Html(String),
    /// Text form produced by a Markdown renderer
    Rendered(String),
}

impl PipelineContent {
    pub fn as_str(&self) -> &str {
        match self {
            PipelineContent::Html(text) | PipelineContent::Rendered(text) => text,
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, PipelineContent::Html(_))
    }
}

/// Outcome of one pipeline run. Always populated, even on total failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    pub content: PipelineContent,
    /// Last stage attempted
    pub stage: Stage,
    pub quality_score: f64,
    /// Markers for every stage rejected before `stage`, plus any terminal marker
    pub fallbacks_used: Vec<String>,
    pub extraction_time_ms: u64,
    pub source_metadata: SourceMetadata,
    /// Gate verdict for `stage`; `None` after a timeout or a panic
    pub gate: Option<QualityGateResult>,
    pub filter_errors: Vec<FilterError>,
    pub bypassed_deeper_extraction: bool,
}

impl PipelineResult {
    /// Whether the run ended on a timeout or a panic.
    pub fn is_degraded(&self) -> bool {
        self.fallbacks_used.iter().any(|marker| marker == TIMEOUT_MARKER || marker == PIPELINE_ERROR_MARKER)
    }
}

/// Elapsed-time source for the time budget.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started: Instant,
    offset: Duration,
}

impl Stopwatch {
    pub fn start() -> Self {
        Self { started: Instant::now(), offset: Duration::ZERO }
    }

    /// A stopwatch that reports `offset` more than has really elapsed.
    pub fn started_ago(offset: Duration) -> Self {
        Self { started: Instant::now(), offset }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed() + self.offset
    }
}

/// The extraction orchestrator.
///
/// Holds no per-request state, so one instance can serve concurrent requests.
pub struct Pipeline {
    config: PipelineConfig,
    gate: QualityGate,
    rules: Arc<RuleRegistry>,
    extractor: Option<Arc<dyn ArticleExtractor>>,
    site_extractors: SiteExtractors,
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("extractor", &self.extractor.as_ref().map(|extractor| extractor.name()))
            .field("site_extractors", &self.site_extractors)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Validates `config` and builds a pipeline with the default extractor and rule tables.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let gate = QualityGate::new(config.thresholds.clone());

        Ok(Self {
            config,
            gate,
            rules: Arc::new(RuleRegistry::default()),
            extractor: Some(Arc::new(ReadabilityExtractor::new())),
            site_extractors: SiteExtractors::new(),
        })
    }

    pub fn with_extractor<E: ArticleExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Some(Arc::new(extractor));
        self
    }

    /// Drops the external extractor; its stage is then skipped.
    pub fn without_extractor(mut self) -> Self {
        self.extractor = None;
        self
    }

    pub fn with_site_extractors(mut self, site_extractors: SiteExtractors) -> Self {
        self.site_extractors = site_extractors;
        self
    }

    /// Shares a rule registry, so custom rules added to it apply to later requests.
    pub fn with_rules(mut self, rules: Arc<RuleRegistry>) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn rules(&self) -> &Arc<RuleRegistry> {
        &self.rules
    }

    /// Runs every stage needed for `source`. Never fails.
    pub fn execute(&self, source: &PageSource) -> PipelineResult {
        self.execute_with(source, Stopwatch::start())
    }

    /// Runs the pipeline against an explicit stopwatch.
    pub fn execute_with(&self, source: &PageSource, stopwatch: Stopwatch) -> PipelineResult {
        let raw_body = source.document.body_html();
        let mut run = Run::new(self, source, stopwatch);

        let outcome = catch_unwind(AssertUnwindSafe(|| run.run()));

        let (attempt, marker) = match outcome {
            Ok(Ok(attempt)) => (Some(attempt), None),
            Ok(Err(Interrupted)) => (None, Some(TIMEOUT_MARKER)),
            Err(_) => {
                tracing::warn!(state = ?run.state, "stage panicked; returning the raw body");
                (None, Some(PIPELINE_ERROR_MARKER))
            }
        };

        let Run { mut fallbacks, filter_errors, bypassed, .. } = run;
        let extraction_time_ms = u64::try_from(stopwatch.elapsed().as_millis()).unwrap_or(u64::MAX);
        let source_metadata = SourceMetadata::capture(source);

        match attempt {
            Some(attempt) => {
                let quality_score = attempt.gate.score;
                tracing::info!(stage = %attempt.stage, score = quality_score, ?fallbacks, "extraction finished");
                PipelineResult {
                    content: PipelineContent::Html(attempt.content.unwrap_or(raw_body)),
                    stage: attempt.stage,
                    quality_score,
                    fallbacks_used: fallbacks,
                    extraction_time_ms,
                    source_metadata,
                    gate: Some(attempt.gate),
                    filter_errors,
                    bypassed_deeper_extraction: bypassed,
                }
            }
            None => {
                if let Some(marker) = marker {
                    fallbacks.push(marker.to_string());
                }
                tracing::info!(fallbacks = ?fallbacks, elapsed_ms = extraction_time_ms, "pipeline failed");
                PipelineResult {
                    content: PipelineContent::Html(raw_body),
                    stage: Stage::Heuristic,
                    quality_score: 0.0,
                    fallbacks_used: fallbacks,
                    extraction_time_ms,
                    source_metadata,
                    gate: None,
                    filter_errors,
                    bypassed_deeper_extraction: bypassed,
                }
            }
        }
    }
}

/// The time budget ran out at a stage entry.
#[derive(Debug)]
struct Interrupted;

/// One stage's output and verdict.
#[derive(Debug)]
struct Attempt {
    stage: Stage,
    content: Option<String>,
    gate: QualityGateResult,
}

/// Mutable state of a single request.
struct Run<'a> {
    pipeline: &'a Pipeline,
    source: &'a PageSource,
    stopwatch: Stopwatch,
    state: PipelineState,
    context: GateContext,
    fallbacks: Vec<String>,
    filter_errors: Vec<FilterError>,
    bypassed: bool,
}

impl<'a> Run<'a> {
    fn new(pipeline: &'a Pipeline, source: &'a PageSource, stopwatch: Stopwatch) -> Self {
        let original_text_len = source.document.body().map(|body| normalized_len(&body.text())).unwrap_or(0);
        Self {
            pipeline,
            source,
            stopwatch,
            state: PipelineState::NotStarted,
            context: GateContext { original_text_len },
            fallbacks: Vec::new(),
            filter_errors: Vec::new(),
            bypassed: false,
        }
    }

    fn config(&self) -> &'a PipelineConfig {
        &self.pipeline.config
    }

    fn run(&mut self) -> std::result::Result<Attempt, Interrupted> {
        let pipeline = self.pipeline;
        let mut last: Option<Attempt> = None;

        if let Some(host) = self.source.host()
            && let Some(extractor) = pipeline.site_extractors.find(host)
        {
            let attempt = self.site_specific(extractor)?;
            if self.accepts(&attempt.gate) {
                return Ok(self.finish(attempt));
            }
            if !extractor.autodetect_on_failure() && attempt.content.is_some() {
                tracing::debug!(extractor = extractor.name(), "site config disables autodetection");
                return Ok(self.finish(attempt));
            }
            last = Some(self.reject(attempt));
        }

        self.check_deadline()?;
        let document = self.pre_clean();

        if self.config().enable_semantic_stage {
            let attempt = self.semantic(&document)?;
            if self.accepts(&attempt.gate) {
                return Ok(self.finish(attempt));
            }
            last = Some(self.reject(attempt));
        }

        if self.config().enable_external_extractor_stage
            && !self.bypassed
            && let Some(extractor) = pipeline.extractor.as_deref()
        {
            let attempt = self.external(extractor, &document)?;
            if self.accepts(&attempt.gate) {
                return Ok(self.finish(attempt));
            }
            last = Some(self.reject(attempt));
        }

        match last {
            Some(attempt) if !self.config().enable_heuristic_stage => {
                self.fallbacks.pop();
                Ok(self.finish(attempt))
            }
            _ => {
                let attempt = self.heuristic(&document)?;
                Ok(self.finish(attempt))
            }
        }
    }

    fn site_specific(&mut self, extractor: &dyn SiteExtractor) -> std::result::Result<Attempt, Interrupted> {
        self.enter(Stage::SiteSpecific)?;

        let content = match extractor.extract(&self.source.document) {
            Ok(article) => article.map(|article| article.content),
            Err(e) => {
                tracing::warn!(extractor = extractor.name(), error = %e, "site extractor failed");
                None
            }
        };
        Ok(self.gate(Stage::SiteSpecific, content))
    }

    /// Applies the safe rules (and the aggressive ones on technical pages) to a copy.
    fn pre_clean(&mut self) -> Document {
        let mut document = self.source.document.clone();
        let tables = self.pipeline.rules.snapshot();

        self.filter_errors.extend(apply_rules(&mut document, &tables.safe));
        let hidden = remove_hidden_elements(&mut document);
        let emptied = cleanup_empty_elements(&mut document);

        let root = document.body().unwrap_or_else(|| document.root());
        self.bypassed = should_bypass_deeper_extraction(&root);

        if self.bypassed {
            self.filter_errors.extend(apply_rules(&mut document, &tables.aggressive));
            cleanup_empty_elements(&mut document);
        }

        tracing::debug!(
            safe_version = tables.safe.version(),
            hidden,
            emptied,
            bypass = self.bypassed,
            errors = self.filter_errors.len(),
            "pre-clean finished"
        );
        document
    }

    fn semantic(&mut self, document: &Document) -> std::result::Result<Attempt, Interrupted> {
        self.enter(Stage::Semantic)?;

        let content = SEMANTIC_SELECTORS
            .iter()
            .find_map(|selector| document.select_compiled(selector).into_iter().next())
            .map(|element| element.outer_html());
        Ok(self.gate(Stage::Semantic, content))
    }

    fn external(
        &mut self, extractor: &dyn ArticleExtractor, document: &Document,
    ) -> std::result::Result<Attempt, Interrupted> {
        self.enter(Stage::ExternalExtractor)?;

        let content = match extractor.extract(document.clone()) {
            Ok(Some(article)) => Some(article.content),
            Ok(None) => {
                tracing::debug!(extractor = extractor.name(), "extractor found nothing");
                None
            }
            Err(e) => {
                tracing::warn!(extractor = extractor.name(), error = %e, "extractor failed");
                None
            }
        };
        Ok(self.gate(Stage::ExternalExtractor, content))
    }

    fn heuristic(&mut self, document: &Document) -> std::result::Result<Attempt, Interrupted> {
        self.enter(Stage::Heuristic)?;

        let config = self.config();
        let root = document.body().unwrap_or_else(|| document.root());
        let selection = find_best_candidate(&root, &config.scoring);

        let winner = selection.candidate.as_ref().and_then(|candidate| document.element(candidate.node));
        let content = match winner {
            Some(element) => prune_node(&element, &config.pruning).fragment_html(),
            None => {
                tracing::debug!("no candidate; falling back to the body");
                prune_node(&root, &config.pruning).fragment_html()
            }
        };
        Ok(self.gate(Stage::Heuristic, Some(content)))
    }

    fn gate(&self, stage: Stage, content: Option<String>) -> Attempt {
        let gate = self.pipeline.gate.validate(stage, content.as_deref(), &self.context);
        if self.config().debug {
            tracing::info!(%stage, score = gate.score, passed = gate.passed, reasons = ?gate.reasons, "gate verdict");
        } else {
            tracing::debug!(%stage, score = gate.score, passed = gate.passed, "gate verdict");
        }
        Attempt { stage, content, gate }
    }

    fn accepts(&self, gate: &QualityGateResult) -> bool {
        gate.passed && gate.score >= self.config().min_quality_score
    }

    fn reject(&mut self, attempt: Attempt) -> Attempt {
        self.fallbacks.push(attempt.stage.fallback_marker());
        attempt
    }

    fn finish(&mut self, attempt: Attempt) -> Attempt {
        self.transition(PipelineState::Done);
        attempt
    }

    fn enter(&mut self, stage: Stage) -> std::result::Result<(), Interrupted> {
        self.check_deadline()?;
        self.transition(stage.into());
        Ok(())
    }

    fn check_deadline(&mut self) -> std::result::Result<(), Interrupted> {
        let budget = self.config().timeout_ms;
        let elapsed = self.stopwatch.elapsed();
        if budget > 0 && elapsed > Duration::from_millis(budget) {
            let elapsed_ms = elapsed.as_millis();
            tracing::warn!(budget_ms = budget, elapsed_ms, state = ?self.state, "time budget exceeded");
            self.transition(PipelineState::Failed);
            return Err(Interrupted);
        }
        Ok(())
    }

    fn transition(&mut self, next: PipelineState) {
        if self.config().debug {
            tracing::info!(from = ?self.state, to = ?next, "pipeline transition");
        } else {
            tracing::debug!(from = ?self.state, to = ?next, "pipeline transition");
        }
        self.state = next;
    }
}
