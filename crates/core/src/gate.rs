//! Per-stage quality gates.
//!
//! Each stage's raw HTML output is scored out of 100 from a handful of shared
//! signals. The stage passes when the score reaches its threshold; the
//! heuristic stage has no threshold and always passes.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::parse::{Document, normalized_len};
use crate::pipeline::Stage;
use crate::scoring::link_density;

const HEADING_TAGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];
const BLOCK_TAGS: &[&str] = &["p", "pre", "blockquote", "li", "table"];

/// Pass marks for the gated stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageThresholds {
    pub site_specific: f64,
    pub semantic: f64,
    pub external_extractor: f64,
}

impl Default for StageThresholds {
    fn default() -> Self {
        Self { site_specific: 60.0, semantic: 60.0, external_extractor: 40.0 }
    }
}

impl StageThresholds {
    /// Threshold for `stage`; `None` for the heuristic stage.
    pub fn threshold_for(&self, stage: Stage) -> Option<f64> {
        match stage {
            Stage::SiteSpecific => Some(self.site_specific),
            Stage::Semantic => Some(self.semantic),
            Stage::ExternalExtractor => Some(self.external_extractor),
            Stage::Heuristic => None,
        }
    }
}

/// Shared facts about the page a stage's output is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GateContext {
    /// Normalized text length of the page body before extraction
    pub original_text_len: usize,
}

/// Verdict for one stage's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityGateResult {
    pub stage_name: String,
    pub passed: bool,
    /// Confidence score, 0 to 100
    pub score: f64,
    /// Threshold the score was compared against (0 for the heuristic stage)
    pub threshold: f64,
    pub signals: BTreeMap<String, f64>,
    pub reasons: Vec<String>,
}

/// Scores stage output against per-stage thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityGate {
    pub thresholds: StageThresholds,
    /// Text length that earns the full length score
    pub target_len: usize,
    /// Output shorter than this is capped at `short_output_cap`
    pub min_len: usize,
    pub short_output_cap: f64,
    /// Longer output with at most one block is an unbroken blob
    pub blob_len: usize,
    pub blob_penalty: f64,
    /// Extracted/original length ratio below which content counts as lost
    pub min_length_ratio: f64,
    pub content_loss_penalty: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            thresholds: StageThresholds::default(),
            target_len: 500,
            min_len: 100,
            short_output_cap: 20.0,
            blob_len: 2000,
            blob_penalty: 30.0,
            min_length_ratio: 0.1,
            content_loss_penalty: 30.0,
        }
    }
}

impl QualityGate {
    pub fn new(thresholds: StageThresholds) -> Self {
        Self { thresholds, ..Default::default() }
    }

    /// Scores `raw_output` for `stage`.
    ///
    /// `None` means the stage found nothing and always yields a zero-score
    /// failure.
    pub fn validate(&self, stage: Stage, raw_output: Option<&str>, context: &GateContext) -> QualityGateResult {
        let threshold = self.thresholds.threshold_for(stage);
        let mut result = QualityGateResult {
            stage_name: stage.name().to_string(),
            passed: false,
            score: 0.0,
            threshold: threshold.unwrap_or(0.0),
            signals: BTreeMap::new(),
            reasons: Vec::new(),
        };

        let Some(html) = raw_output else {
            result.reasons.push("no candidate found".to_string());
            return result;
        };

        let fragment = Document::parse_fragment(html);
        let root = fragment.root();
        let text_len = normalized_len(&root.text());

        let elements = root.descendant_elements();
        let headings = elements.iter().filter(|el| HEADING_TAGS.contains(&el.tag_name().as_str())).count();
        let blocks: Vec<_> = elements.iter().filter(|el| BLOCK_TAGS.contains(&el.tag_name().as_str())).collect();
        let code_blocks = blocks.iter().filter(|el| el.tag_name() == "pre").count();
        let longest_block = blocks.iter().map(|el| el.text_len()).max().unwrap_or(text_len);
        let ld = link_density(&root);

        result.signals.insert("text_length".to_string(), text_len as f64);
        result.signals.insert("heading_count".to_string(), headings as f64);
        result.signals.insert("block_count".to_string(), blocks.len() as f64);
        result.signals.insert("link_density".to_string(), ld);
        if text_len > 0 {
            result.signals.insert("longest_block_ratio".to_string(), (longest_block as f64 / text_len as f64).min(1.0));
        }

        if text_len == 0 {
            result.reasons.push("output is empty or whitespace only".to_string());
            result.passed = threshold.is_none();
            return result;
        }

        let target_len = self.target_len.max(1) as f64;
        let mut score = (text_len as f64 / target_len).min(1.0) * 40.0;
        if headings > 0 {
            score += 10.0;
        }
        score += blocks.len().min(5) as f64 * 6.0;
        score += 20.0 * (1.0 - ld);

        if headings == 0 && blocks.is_empty() {
            result.reasons.push("no heading or paragraph structure".to_string());
        }

        if text_len > self.blob_len && blocks.len() <= 1 && code_blocks == 0 {
            score -= self.blob_penalty;
            result.reasons.push(format!("single unbroken text blob of {text_len} characters"));
        }

        if stage == Stage::ExternalExtractor && context.original_text_len > 0 {
            let ratio = text_len as f64 / context.original_text_len as f64;
            result.signals.insert("length_ratio".to_string(), ratio);
            if ratio < self.min_length_ratio {
                score -= self.content_loss_penalty;
                result.reasons.push(format!("extracted only {:.1}% of the original text", ratio * 100.0));
            }
        }

        if text_len < self.min_len {
            score = score.min(self.short_output_cap);
            result.reasons.push(format!("output is shorter than {} characters", self.min_len));
        }

        result.score = score.clamp(0.0, 100.0);
        result.passed = match threshold {
            Some(threshold) => result.score >= threshold,
            None => true,
        };
        if let Some(threshold) = threshold
            && !result.passed
        {
            result.reasons.push(format!("score {:.1} is below the threshold of {:.1}", result.score, threshold));
        }

        result
    }
}

/// Renders a gate result as a multi-line, human-readable report.
pub fn generate_report(result: &QualityGateResult) -> String {
    let mut report = String::new();
    let status = if result.passed { "PASSED" } else { "FAILED" };

    let _ = writeln!(report, "Quality gate: {}", result.stage_name);
    let _ = writeln!(report, "Status: {} (score {:.1} / threshold {:.1})", status, result.score, result.threshold);

    if !result.signals.is_empty() {
        let _ = writeln!(report, "Signals:");
        for (name, value) in &result.signals {
            let _ = writeln!(report, "  {name}: {value:.2}");
        }
    }

    if !result.reasons.is_empty() {
        let _ = writeln!(report, "Reasons:");
        for reason in &result.reasons {
            let _ = writeln!(report, "  - {reason}");
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn article_html() -> String {
        format!("<article><h1>T</h1><p>{}</p></article>", "word ".repeat(200))
    }

    #[test]
    fn test_none_is_zero_and_failing() {
        let gate = QualityGate::default();
        for stage in [Stage::SiteSpecific, Stage::Semantic, Stage::ExternalExtractor, Stage::Heuristic] {
            let result = gate.validate(stage, None, &GateContext::default());
            assert!(!result.passed);
            assert_eq!(result.score, 0.0);
            assert_eq!(result, gate.validate(stage, None, &GateContext::default()));
        }
    }

    #[test]
    fn test_whitespace_only_scores_zero() {
        let result =
            QualityGate::default().validate(Stage::Semantic, Some("<div>   \n\t </div>"), &GateContext::default());
        assert_eq!(result.score, 0.0);
        assert!(!result.passed);
        assert!(result.reasons.iter().any(|r| r.contains("whitespace")));
    }

    #[test]
    fn test_article_with_heading_passes_semantic() {
        let result = QualityGate::default().validate(Stage::Semantic, Some(&article_html()), &GateContext::default());
        assert!(result.passed);
        assert!(result.score >= 60.0);
        assert_eq!(result.signals["heading_count"], 1.0);
    }

    #[test]
    fn test_short_output_is_capped() {
        let context = GateContext::default();
        let result = QualityGate::default().validate(Stage::Semantic, Some("<h1>Hi</h1><p>Tiny.</p>"), &context);
        assert!(result.score <= 20.0);
        assert!(!result.passed);
    }

    #[test]
    fn test_blob_is_penalised() {
        let blob = format!("<div>{}</div>", "blob ".repeat(600));
        let result = QualityGate::default().validate(Stage::Semantic, Some(&blob), &GateContext::default());
        assert!(result.reasons.iter().any(|r| r.contains("blob")));
        assert!(!result.passed);
    }

    #[test]
    fn test_external_content_loss_is_penalised() {
        let html = article_html();
        let gate = QualityGate::default();
        let healthy = gate.validate(Stage::ExternalExtractor, Some(&html), &GateContext { original_text_len: 1500 });
        let lossy = gate.validate(Stage::ExternalExtractor, Some(&html), &GateContext { original_text_len: 100_000 });

        assert!(healthy.passed);
        assert!(lossy.score < healthy.score);
        assert!(lossy.signals["length_ratio"] < 0.1);
    }

    #[test]
    fn test_heuristic_always_passes() {
        let result = QualityGate::default().validate(Stage::Heuristic, Some("<p>x</p>"), &GateContext::default());
        assert!(result.passed);
        assert_eq!(result.threshold, 0.0);
    }

    #[rstest]
    #[case::site_specific(Stage::SiteSpecific)]
    #[case::semantic(Stage::Semantic)]
    #[case::external(Stage::ExternalExtractor)]
    #[case::heuristic(Stage::Heuristic)]
    fn test_passed_implies_threshold_met(#[case] stage: Stage) {
        let gate = QualityGate::default();
        let inputs = [
            String::new(),
            "<p>short</p>".to_string(),
            article_html(),
            format!("<ul>{}</ul>", "<li><a href='/'>link item</a></li>".repeat(30)),
            format!("<div>{}</div>", "blob ".repeat(600)),
        ];
        for input in &inputs {
            let result = gate.validate(stage, Some(input), &GateContext { original_text_len: 2000 });
            assert!((0.0..=100.0).contains(&result.score));
            if result.passed {
                assert!(result.score >= result.threshold);
            }
        }
    }

    #[test]
    fn test_generate_report() {
        let gate = QualityGate::default();
        let result = gate.validate(Stage::Semantic, Some("<p>Tiny.</p>"), &GateContext::default());
        let report = generate_report(&result);

        assert!(report.starts_with("Quality gate: semantic\n"));
        assert!(report.contains("Status: FAILED"));
        assert!(report.contains("text_length"));
        assert!(report.contains("- output is shorter than 100 characters"));
    }
}
