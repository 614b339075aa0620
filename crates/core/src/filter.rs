//! Boilerplate filtering over the arena document.
//!
//! Rules are applied in order. Each rule's matches are collected before any
//! mutation, then removed or unwrapped one by one. A node that was already
//! detached by an earlier match (because an ancestor was removed) is skipped.
//! A rule that fails is recorded as a [`FilterError`] and the remaining rules
//! still run.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::error::FilterError;
use crate::parse::{Document, Element, compile_selector};
use crate::rules::{RuleAction, RuleSet};

/// Container tags removed by [`cleanup_empty_elements`] when they hold nothing.
const EMPTY_CONTAINER_TAGS: &[&str] = &["p", "div", "span", "section", "article", "aside", "header", "footer", "nav"];

/// Technical-content score at or above which deeper extraction is skipped.
pub const BYPASS_THRESHOLD: f64 = 6.0;

static HIGHLIGHT_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(highlight|hljs|prettyprint|sourcecode|codehilite|prism|shiki|language-[\w+#-]+|lang-[\w+#-]+)\b")
        .expect("valid highlight class regex")
});

static API_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*((parameters|params|returns?|return value|arguments|args|methods|examples?|syntax|api( reference)?|reference|usage|properties|attributes|raises|throws|exceptions)\s*:?|[A-Za-z_][\w.:]*\([^)]*\)\s*(->.*|:.*)?)\s*$",
    )
    .expect("valid api heading regex")
});

/// Most headings counted towards the technical score.
const MAX_SCORED_HEADINGS: usize = 2;

/// Applies every rule in `rules` to `doc`, in order.
///
/// Returns one [`FilterError`] per failed rule application. Failures never
/// stop the remaining rules.
pub fn apply_rules(doc: &mut Document, rules: &RuleSet) -> Vec<FilterError> {
    let mut errors = Vec::new();

    for rule in rules.rules() {
        let selector = match compile_selector(&rule.selector) {
            Ok(selector) => selector,
            Err(e) => {
                tracing::warn!(rule = %rule.description, selector = %rule.selector, "skipping rule: {e}");
                errors.push(FilterError::InvalidSelector {
                    rule: rule.description.clone(),
                    selector: rule.selector.clone(),
                    message: e.to_string(),
                });
                continue;
            }
        };

        let matches: Vec<_> = doc.select_compiled(&selector).iter().map(|el| (el.id(), el.tag_name())).collect();
        let mut applied = 0usize;

        for (id, tag) in matches {
            if !doc.is_attached(id) {
                continue;
            }
            let done = match rule.action {
                RuleAction::Remove => doc.remove(id),
                RuleAction::Unwrap => doc.unwrap_element(id),
            };
            if done {
                applied += 1;
            } else if rule.action == RuleAction::Unwrap {
                tracing::warn!(rule = %rule.description, tag = %tag, "could not unwrap element");
                errors.push(FilterError::Unwrap {
                    rule: rule.description.clone(),
                    tag,
                    message: "element has no parent".to_string(),
                });
            }
        }

        if applied > 0 {
            tracing::trace!(rule = %rule.description, applied, "applied rule");
        }
    }

    errors
}

/// Removes hidden elements, leaving anything inside `pre`/`code` alone.
///
/// Returns the number of subtrees removed.
pub fn remove_hidden_elements(doc: &mut Document) -> usize {
    let hidden: Vec<_> = doc
        .root()
        .self_and_descendants()
        .into_iter()
        .filter(|el| el.is_hidden() && !el.is_preformatted())
        .map(|el| el.id())
        .collect();

    hidden.into_iter().filter(|id| doc.remove(*id)).count()
}

/// Removes empty container elements until none are left.
///
/// A container is empty when it has no non-whitespace text and no child
/// elements other than `<br>`. An empty container that still holds whitespace
/// or a `<br>` and sits between two sibling nodes is replaced by a single
/// space, so the words around it stay apart. Removing a child can empty its
/// parent, so the pass repeats, at most once per level of tree depth.
pub fn cleanup_empty_elements(doc: &mut Document) -> usize {
    let max_passes = doc.depth().max(1);
    let mut removed = 0;

    for _ in 0..max_passes {
        let empty: Vec<_> = doc
            .root()
            .descendant_elements()
            .into_iter()
            .filter(is_empty_container)
            .map(|el| (el.id(), separates_text(&el)))
            .collect();

        if empty.is_empty() {
            break;
        }
        removed += empty
            .into_iter()
            .filter(|(id, separator)| if *separator { doc.replace_with_text(*id, " ") } else { doc.remove(*id) })
            .count();
    }

    removed
}

fn separates_text(el: &Element<'_>) -> bool {
    let has_spacing = !el.text().is_empty() || !el.child_elements().is_empty();
    has_spacing && el.is_between_siblings()
}

fn is_empty_container(el: &Element<'_>) -> bool {
    EMPTY_CONTAINER_TAGS.contains(&el.tag_name().as_str())
        && !el.is_preformatted()
        && el.text().trim().is_empty()
        && el.child_elements().iter().all(|child| child.tag_name() == "br")
}

/// Evidence that a subtree is primarily technical documentation or code.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TechnicalSignals {
    /// Number of outermost `pre`/`code` blocks
    pub code_blocks: usize,
    /// Elements carrying a syntax-highlighting class
    pub highlight_markers: usize,
    /// Headings that look like API reference sections or call signatures
    pub api_headings: usize,
    /// Share of text inside code blocks (0.0 to 1.0)
    pub code_text_ratio: f64,
}

impl TechnicalSignals {
    /// Scans `root` and its descendants.
    pub fn collect(root: &Element<'_>) -> Self {
        let mut signals = Self::default();
        let mut code_len = 0usize;

        for el in root.self_and_descendants() {
            let tag = el.tag_name();

            if matches!(tag.as_str(), "pre" | "code")
                && !el.parent_element().is_some_and(|parent| parent.is_preformatted())
            {
                code_len += el.text_len();
                if tag == "pre" || el.text().contains('\n') {
                    signals.code_blocks += 1;
                }
            }

            if el.attr("class").is_some_and(|class| HIGHLIGHT_CLASS.is_match(class)) {
                signals.highlight_markers += 1;
            }

            if matches!(tag.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6") && API_HEADING.is_match(el.text().trim())
            {
                signals.api_headings += 1;
            }
        }

        let total_len = root.text_len();
        if total_len > 0 {
            signals.code_text_ratio = (code_len as f64 / total_len as f64).min(1.0);
        }

        signals
    }

    /// Weighted technical-content score.
    ///
    /// API-style headings only count on pages that carry code blocks or
    /// highlighting markers, and at most [`MAX_SCORED_HEADINGS`] of them.
    pub fn score(&self) -> f64 {
        let has_code = self.code_blocks > 0 || self.highlight_markers > 0;
        let headings = if has_code { self.api_headings.min(MAX_SCORED_HEADINGS) } else { 0 };

        self.code_blocks as f64 * 2.0
            + self.highlight_markers.min(5) as f64
            + headings as f64 * 1.5
            + self.code_text_ratio * 10.0
    }

    pub fn is_technical(&self) -> bool {
        self.score() >= BYPASS_THRESHOLD
    }
}

/// Whether `root` is technical enough to skip prose-oriented extraction.
pub fn should_bypass_deeper_extraction(root: &Element<'_>) -> bool {
    let signals = TechnicalSignals::collect(root);
    let bypass = signals.is_technical();
    tracing::debug!(score = signals.score(), bypass, "technical content signals");
    bypass
}
