//! End-to-end output quality validation.
//!
//! After the chosen content has been rendered, [`QualityValidator`] scores the
//! whole transformation on five independent 0 to 100 metrics and combines
//! them with fixed weights:
//!
//! | metric | weight |
//! |--------|--------|
//! | content preservation | 0.25 |
//! | structure integrity | 0.20 |
//! | output format quality | 0.20 |
//! | readability | 0.15 |
//! | completeness | 0.20 |
//!
//! Fenced code regions are excluded from the formatting and readability
//! checks.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parse::{Document, Element, normalized_len};
use crate::pipeline::{PIPELINE_ERROR_MARKER, PipelineResult, TIMEOUT_MARKER};

const WEIGHT_CONTENT: f64 = 0.25;
const WEIGHT_STRUCTURE: f64 = 0.20;
const WEIGHT_FORMAT: f64 = 0.20;
const WEIGHT_READABILITY: f64 = 0.15;
const WEIGHT_COMPLETENESS: f64 = 0.20;

const STRICT_METRIC_FLOOR: f64 = 70.0;
const MIN_CONTENT_PRESERVATION: f64 = 50.0;
const MIN_STRUCTURE_INTEGRITY: f64 = 40.0;

/// Regions whose lists are boilerplate and not expected in the output
const CHROME_TAGS: &[&str] = &["nav", "header", "footer", "aside", "menu"];

static RAW_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</?(div|span|p|table|tr|td|th|tbody|thead|script|style|iframe|section|article|nav|aside|font|center|br|img)\b[^>]*>",
    )
    .expect("valid raw markup regex")
});
static BLANK_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t]*\n[ \t]*\n[ \t]*\n").expect("valid blank run regex"));
static EMPTY_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\(\s*\)").expect("valid empty link regex"));
static UNCLOSED_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\]\([^)\s]*$").expect("valid unclosed link regex"));
static HEADING_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(#{1,6})\s+\S").expect("valid heading line regex"));
static LIST_ITEM_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([-*+]|\d+[.)])\s+\S").expect("valid list item regex"));
static SENTENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\p{L}\p{N}][^.!?。！？]*([.!?](\s|$)|[。！？])").expect("valid sentence regex")
});
static MARKDOWN_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[#*_`>\[\]()|]").expect("valid markdown noise regex"));

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueKind {
    Error,
    Warning,
    Info,
}

/// Which aspect of the output an issue concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Content,
    Structure,
    Formatting,
    Metadata,
}

/// A single finding about the output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Issue {
    /// 1 (cosmetic) to 10 (extraction failed)
    pub severity: u8,
    pub kind: IssueKind,
    pub category: IssueCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Issue {
    fn new(severity: u8, kind: IssueKind, category: IssueCategory, message: impl Into<String>) -> Self {
        Self { severity: severity.clamp(1, 10), kind, category, message: message.into(), suggestion: None }
    }

    fn suggest(mut self, suggestion: &str) -> Self {
        self.suggestion = Some(suggestion.to_string());
        self
    }
}

/// The five metric scores, each in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub content_preservation: f64,
    pub structure_integrity: f64,
    pub output_format_quality: f64,
    pub readability: f64,
    pub completeness: f64,
}

impl QualityMetrics {
    /// Fixed weighted sum of the metrics.
    pub fn overall(&self) -> f64 {
        self.content_preservation * WEIGHT_CONTENT
            + self.structure_integrity * WEIGHT_STRUCTURE
            + self.output_format_quality * WEIGHT_FORMAT
            + self.readability * WEIGHT_READABILITY
            + self.completeness * WEIGHT_COMPLETENESS
    }

    fn all(&self) -> [(&'static str, f64); 5] {
        [
            ("content preservation", self.content_preservation),
            ("structure integrity", self.structure_integrity),
            ("output format quality", self.output_format_quality),
            ("readability", self.readability),
            ("completeness", self.completeness),
        ]
    }
}

/// Result of validating one rendered output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub metrics: QualityMetrics,
    pub issues: Vec<Issue>,
    pub recommendations: Vec<String>,
    pub passes_threshold: bool,
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passes_threshold { "PASS" } else { "FAIL" };
        writeln!(f, "Output quality: {:.1}/100 ({verdict})", self.overall_score)?;
        for (name, value) in self.metrics.all() {
            writeln!(f, "  {name}: {value:.1}")?;
        }

        if !self.issues.is_empty() {
            writeln!(f, "Issues:")?;
            for issue in &self.issues {
                writeln!(f, "  [{:?} {}] {:?}: {}", issue.kind, issue.severity, issue.category, issue.message)?;
            }
        }

        if !self.recommendations.is_empty() {
            writeln!(f, "Recommendations:")?;
            for recommendation in &self.recommendations {
                writeln!(f, "  - {recommendation}")?;
            }
        }
        Ok(())
    }
}

/// Facts about how the output was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingStats {
    pub processing_time_ms: u64,
    pub fallbacks_used: Vec<String>,
    pub errors: Vec<String>,
}

impl ProcessingStats {
    /// Stats recorded by a pipeline run; rule failures count as errors.
    pub fn from_result(result: &PipelineResult) -> Self {
        Self {
            processing_time_ms: result.extraction_time_ms,
            fallbacks_used: result.fallbacks_used.clone(),
            errors: result.filter_errors.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Validation options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityOptions {
    /// Overall score needed to pass
    pub min_score: f64,
    /// Require every metric to clear 70
    pub strict_mode: bool,
    /// Rendered output shorter than this many characters is capped on content preservation
    pub min_output_len: usize,
    /// Original text length above which sub-millisecond processing looks incomplete
    pub fast_processing_text_len: usize,
}

impl Default for QualityOptions {
    fn default() -> Self {
        Self { min_score: 60.0, strict_mode: false, min_output_len: 100, fast_processing_text_len: 10_000 }
    }
}

/// Scores rendered output against the page it came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityValidator;

impl QualityValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validates `rendered` (the final text form) produced from `original`.
    pub fn validate(
        &self, rendered: &str, original: &Document, stats: &ProcessingStats, options: &QualityOptions,
    ) -> QualityReport {
        let mut issues = Vec::new();
        let text = MarkdownText::split(rendered);
        let root = original.body().unwrap_or_else(|| original.root());
        let original_len = normalized_len(&root.text());

        let metrics = QualityMetrics {
            content_preservation: content_preservation(rendered, original_len, options, &mut issues),
            structure_integrity: structure_integrity(&text, &root, &mut issues),
            output_format_quality: output_format_quality(&text, &mut issues),
            readability: readability(&text, &mut issues),
            completeness: completeness(stats, original_len, options, &mut issues),
        };
        let overall_score = metrics.overall();

        let passes_threshold = overall_score >= options.min_score
            && if options.strict_mode {
                metrics.all().iter().all(|(_, value)| *value >= STRICT_METRIC_FLOOR)
            } else {
                metrics.content_preservation >= MIN_CONTENT_PRESERVATION
                    && metrics.structure_integrity >= MIN_STRUCTURE_INTEGRITY
            };

        let recommendations = recommendations(&metrics, &issues);
        tracing::debug!(overall = overall_score, passes = passes_threshold, issues = issues.len(), "output quality");

        QualityReport { overall_score, metrics, issues, recommendations, passes_threshold }
    }
}

/// Rendered text with fenced code regions set aside.
struct MarkdownText<'a> {
    /// Lines outside fenced code
    prose: Vec<&'a str>,
    fenced_regions: usize,
    unclosed_fence: bool,
}

impl<'a> MarkdownText<'a> {
    fn split(rendered: &'a str) -> Self {
        let mut prose = Vec::new();
        let mut fenced_regions = 0;
        let mut open_fence: Option<&str> = None;

        for line in rendered.lines() {
            let trimmed = line.trim_start();
            let marker = if trimmed.starts_with("```") {
                Some("```")
            } else if trimmed.starts_with("~~~") {
                Some("~~~")
            } else {
                None
            };

            match (open_fence, marker) {
                (None, Some(marker)) => open_fence = Some(marker),
                (Some(open), Some(marker)) if open == marker && trimmed.trim_end() == marker => {
                    open_fence = None;
                    fenced_regions += 1;
                }
                (None, None) => prose.push(line),
                _ => {}
            }
        }

        Self { prose, fenced_regions, unclosed_fence: open_fence.is_some() }
    }

    fn prose_text(&self) -> String {
        self.prose.join("\n")
    }

    fn headings(&self) -> Vec<usize> {
        self.prose
            .iter()
            .filter_map(|line| HEADING_LINE.captures(line).map(|caps| caps[1].len()))
            .collect()
    }

    fn list_items(&self) -> usize {
        self.prose.iter().filter(|line| LIST_ITEM_LINE.is_match(line)).count()
    }
}

fn content_preservation(
    rendered: &str, original_len: usize, options: &QualityOptions, issues: &mut Vec<Issue>,
) -> f64 {
    let rendered_len = normalized_len(rendered);

    let mut score: f64 = if original_len == 0 {
        if rendered_len == 0 { 0.0 } else { 100.0 }
    } else {
        let reduction = (1.0 - rendered_len as f64 / original_len as f64).max(0.0);
        if reduction > 0.95 {
            issues.push(
                Issue::new(9, IssueKind::Error, IssueCategory::Content, format!(
                    "output keeps only {:.1}% of the page text",
                    (1.0 - reduction) * 100.0
                ))
                .suggest("check whether the wrong container was extracted"),
            );
            10.0
        } else if reduction > 0.90 {
            issues.push(
                Issue::new(7, IssueKind::Error, IssueCategory::Content, format!(
                    "output keeps only {:.1}% of the page text",
                    (1.0 - reduction) * 100.0
                ))
                .suggest("check whether part of the article was pruned"),
            );
            30.0
        } else if reduction < 0.10 {
            issues.push(Issue::new(
                3,
                IssueKind::Info,
                IssueCategory::Content,
                "output is nearly as long as the page; boilerplate may not have been filtered",
            ));
            85.0
        } else {
            100.0
        }
    };

    if rendered_len < options.min_output_len {
        score = score.min(20.0);
        issues.push(
            Issue::new(6, IssueKind::Warning, IssueCategory::Content, format!(
                "output is only {rendered_len} characters long"
            ))
            .suggest("verify that the page actually contains an article"),
        );
    }

    score.clamp(0.0, 100.0)
}

fn structure_integrity(text: &MarkdownText<'_>, root: &Element<'_>, issues: &mut Vec<Issue>) -> f64 {
    let elements = root.descendant_elements();
    let count = |tags: &[&str], skip_chrome: bool| {
        elements
            .iter()
            .filter(|el| tags.contains(&el.tag_name().as_str()))
            .filter(|el| !skip_chrome || !el.is_within(CHROME_TAGS))
            .count()
    };

    let source_headings = count(&["h1", "h2", "h3", "h4", "h5", "h6"], true);
    let source_items = count(&["li"], true);
    let source_code = count(&["pre"], false);

    let checks = [
        ("headings", source_headings, text.headings().len(), 30.0, 5, IssueKind::Warning),
        ("list items", source_items, text.list_items(), 20.0, 4, IssueKind::Warning),
        ("code blocks", source_code, text.fenced_regions, 50.0, 8, IssueKind::Error),
    ];

    let mut score: f64 = 100.0;
    for (name, source, rendered, max_penalty, severity, kind) in checks {
        if source == 0 {
            continue;
        }
        let ratio = (rendered as f64 / source as f64).min(1.0);
        if ratio < 1.0 {
            score -= max_penalty * (1.0 - ratio);
            issues.push(Issue::new(severity, kind, IssueCategory::Structure, format!(
                "{rendered} of {source} {name} survived rendering"
            )));
        }
    }

    score.clamp(0.0, 100.0)
}

fn output_format_quality(text: &MarkdownText<'_>, issues: &mut Vec<Issue>) -> f64 {
    let prose = text.prose_text();
    let mut score: f64 = 100.0;

    let raw_tags = RAW_MARKUP.find_iter(&prose).count();
    if raw_tags > 0 {
        score -= (raw_tags as f64 * 5.0).min(30.0);
        issues.push(
            Issue::new(5, IssueKind::Warning, IssueCategory::Formatting, format!(
                "{raw_tags} raw HTML tags leaked into the output"
            ))
            .suggest("convert or strip leftover HTML before rendering"),
        );
    }

    let blank_runs = BLANK_RUN.find_iter(&prose).count();
    if blank_runs > 0 {
        score -= (blank_runs as f64 * 5.0).min(15.0);
        issues.push(Issue::new(3, IssueKind::Info, IssueCategory::Formatting, format!(
            "{blank_runs} runs of three or more blank lines"
        )));
    }

    let bad_links = EMPTY_LINK.find_iter(&prose).count()
        + text.prose.iter().filter(|line| UNCLOSED_LINK.is_match(line)).count();
    if bad_links > 0 {
        score -= (bad_links as f64 * 5.0).min(20.0);
        issues.push(Issue::new(4, IssueKind::Warning, IssueCategory::Formatting, format!(
            "{bad_links} malformed links"
        )));
    }

    let headings = text.headings();
    let skips = headings.windows(2).filter(|pair| pair[1] > pair[0] + 1).count();
    if skips > 0 {
        score -= (skips as f64 * 5.0).min(15.0);
        issues.push(Issue::new(3, IssueKind::Info, IssueCategory::Formatting, format!(
            "{skips} heading level skips"
        )));
    }

    if text.unclosed_fence {
        score -= 10.0;
        issues.push(Issue::new(4, IssueKind::Warning, IssueCategory::Formatting, "unclosed code fence"));
    }

    score.clamp(0.0, 100.0)
}

fn readability(text: &MarkdownText<'_>, issues: &mut Vec<Issue>) -> f64 {
    let prose = text.prose_text();
    let plain = MARKDOWN_NOISE.replace_all(&prose, " ");
    let words = count_words(&plain);

    if words == 0 {
        if text.fenced_regions == 0 {
            issues.push(Issue::new(6, IssueKind::Warning, IssueCategory::Content, "output has no readable text"));
            return 0.0;
        }
        return 60.0;
    }

    let mut score: f64 = 100.0;
    let sentences = SENTENCE.find_iter(&plain).count();

    if sentences == 0 && words > 20 {
        score -= 40.0;
        issues.push(Issue::new(5, IssueKind::Warning, IssueCategory::Content, "no sentence-like structure"));
    } else if sentences > 0 {
        let average = words as f64 / sentences as f64;
        if average > 35.0 {
            score -= 20.0;
            issues.push(Issue::new(3, IssueKind::Info, IssueCategory::Content, format!(
                "average sentence length is {average:.0} words"
            )));
        } else if average > 25.0 {
            score -= 10.0;
        }
    }

    let paragraphs = prose.split("\n\n").filter(|block| !block.trim().is_empty()).count();
    if words > 300 && paragraphs <= 1 {
        score -= 25.0;
        issues.push(
            Issue::new(4, IssueKind::Warning, IssueCategory::Formatting, "single wall of text")
                .suggest("keep paragraph boundaries when rendering"),
        );
    }

    if words < 30 {
        score -= 30.0;
        let message = format!("very short output ({words} words)");
        issues.push(Issue::new(4, IssueKind::Info, IssueCategory::Content, message));
    }

    score.clamp(0.0, 100.0)
}

/// Counts words, taking each CJK ideograph or kana as one word since those
/// scripts do not separate words with spaces.
fn count_words(text: &str) -> usize {
    text.split_whitespace()
        .map(|token| {
            let ideographs = token.chars().filter(|c| is_cjk(*c)).count();
            let has_other = token.chars().any(|c| c.is_alphanumeric() && !is_cjk(c));
            if ideographs == 0 { 1 } else { ideographs + usize::from(has_other) }
        })
        .sum()
}

fn is_cjk(c: char) -> bool {
    let code = c as u32;
    (0x4E00..=0x9FFF).contains(&code)
        || (0x3400..=0x4DBF).contains(&code)
        || (0x20000..=0x2A6DF).contains(&code)
        || (0x3040..=0x30FF).contains(&code)
}

fn completeness(
    stats: &ProcessingStats, original_len: usize, options: &QualityOptions, issues: &mut Vec<Issue>,
) -> f64 {
    let mut score: f64 = 100.0;

    let mut fallback_penalty: f64 = 0.0;
    for marker in &stats.fallbacks_used {
        if marker == TIMEOUT_MARKER || marker == PIPELINE_ERROR_MARKER {
            score -= 50.0;
            issues.push(
                Issue::new(9, IssueKind::Error, IssueCategory::Metadata, format!("extraction ended with {marker}"))
                    .suggest("raise the time budget or inspect the page for pathological markup"),
            );
        } else {
            fallback_penalty += 10.0;
            issues.push(Issue::new(2, IssueKind::Info, IssueCategory::Metadata, format!("fallback used: {marker}")));
        }
    }
    score -= fallback_penalty.min(30.0);

    if !stats.errors.is_empty() {
        score -= (stats.errors.len() as f64 * 10.0).min(40.0);
        for error in &stats.errors {
            let message = format!("processing error: {error}");
            issues.push(Issue::new(5, IssueKind::Warning, IssueCategory::Metadata, message));
        }
    }

    if stats.processing_time_ms == 0 && original_len > options.fast_processing_text_len {
        score -= 5.0;
        issues.push(Issue::new(1, IssueKind::Info, IssueCategory::Metadata, "processing finished suspiciously fast"));
    }

    score.clamp(0.0, 100.0)
}

fn recommendations(metrics: &QualityMetrics, issues: &[Issue]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |text: &str| {
        if !out.iter().any(|existing| existing == text) {
            out.push(text.to_string());
        }
    };

    if metrics.content_preservation < 50.0 {
        push("try a different extraction stage or check that the page is not mostly navigation");
    }
    if metrics.structure_integrity < 60.0 {
        push("preserve headings, lists and code blocks when rendering");
    }
    if metrics.output_format_quality < 70.0 {
        push("clean up leftover HTML and blank lines in the rendered output");
    }
    if metrics.readability < 60.0 {
        push("break long passages into paragraphs and check sentence structure");
    }
    if metrics.completeness < 70.0 {
        push("investigate the fallbacks and errors recorded during processing");
    }

    for issue in issues.iter().filter(|issue| issue.severity >= 5) {
        if let Some(suggestion) = &issue.suggestion {
            push(suggestion);
        }
    }

    out
}
