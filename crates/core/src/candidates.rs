//! Candidate selection and pruning.
//!
//! Every container element under a root is scored independently; the best
//! one is the article container. [`prune_node`] then trims stragglers inside
//! the winner on a separate copy, leaving the input document untouched.

use std::sync::LazyLock;

use ego_tree::NodeId;
use scraper::Selector;
use serde::{Deserialize, Serialize};

use crate::filter::cleanup_empty_elements;
use crate::parse::{Document, Element};
use crate::scoring::{NEGATIVE_PATTERNS, POSITIVE_PATTERNS, ScoreConfig, ScoreResult, calculate_score, link_density};

/// Tags that are considered potential content containers
pub const CANDIDATE_TAGS: &[&str] = &["div", "section", "article", "main"];

/// Tags removed from a pruned candidate wherever they appear
const CHROME_TAGS: &[&str] = &["nav", "aside", "form", "button", "input", "select", "textarea", "footer"];

/// Block tags whose own signals are checked during pruning
const PRUNABLE_BLOCK_TAGS: &[&str] = &["div", "section", "ul", "ol", "dl", "table", "p", "header", "figure"];

static CODE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("pre, code").expect("valid code selector"));
static MEDIA_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img, picture, video, figure").expect("valid media selector"));

/// A scored candidate element
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Handle of the element in the scored document
    pub node: NodeId,
    /// The final score
    pub score: f64,
    /// How the score was reached
    pub breakdown: ScoreResult,
}

/// Outcome of a candidate search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSelection {
    /// The winner, when one cleared the minimum score
    pub candidate: Option<Candidate>,
    /// Every scored candidate, in document order
    pub all_candidates: Vec<Candidate>,
}

/// Configuration for pruning the winning candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PruneConfig {
    /// Link density above which a short block is dropped
    pub max_link_density: f64,
    /// Blocks with at least this much text are never dropped for keywords or links
    pub min_keep_text_len: usize,
    /// Elements nested deeper than this are not examined
    pub max_prune_depth: usize,
}

impl Default for PruneConfig {
    fn default() -> Self {
        Self { max_link_density: 0.5, min_keep_text_len: 200, max_prune_depth: 64 }
    }
}

fn candidate_priority(tag_name: &str) -> u8 {
    match tag_name {
        "article" | "main" => 3,
        "section" => 2,
        "div" => 1,
        _ => 0,
    }
}

/// Scores every container under `root` (including `root` itself) and picks the best.
///
/// Ties keep the higher-priority tag, then the earlier element. When the best
/// score is below `config.min_score`, no candidate is returned.
pub fn find_best_candidate(root: &Element<'_>, config: &ScoreConfig) -> CandidateSelection {
    let max_elements = if config.max_elements == 0 { usize::MAX } else { config.max_elements };

    let all_candidates: Vec<Candidate> = root
        .self_and_descendants()
        .into_iter()
        .filter(|el| CANDIDATE_TAGS.contains(&el.tag_name().as_str()))
        .take(max_elements)
        .map(|el| {
            let breakdown = calculate_score(&el, config);
            Candidate { node: el.id(), score: breakdown.final_score, breakdown }
        })
        .collect();

    let mut best: Option<&Candidate> = None;
    for candidate in &all_candidates {
        let better = match best {
            None => true,
            Some(current) => {
                candidate.score > current.score
                    || (candidate.score == current.score
                        && candidate_priority(&candidate.breakdown.tag_name)
                            > candidate_priority(&current.breakdown.tag_name))
            }
        };
        if better {
            best = Some(candidate);
        }
    }

    let candidate = best.filter(|c| c.score >= config.min_score).cloned();

    match &candidate {
        Some(c) => {
            tracing::debug!(
                tag = %c.breakdown.tag_name,
                score = c.score,
                scanned = all_candidates.len(),
                "best candidate"
            )
        }
        None => tracing::debug!(scanned = all_candidates.len(), "no candidate cleared the minimum score"),
    }

    CandidateSelection { candidate, all_candidates }
}

/// Returns a cleaned copy of `element` as a fragment document.
///
/// `body` and `html` elements contribute their children; anything else is
/// copied whole. Chrome elements, short negative-keyword blocks and short
/// link-dense blocks without media are removed. Code blocks and anything
/// holding one are never touched.
pub fn prune_node(element: &Element<'_>, config: &PruneConfig) -> Document {
    let is_page_root = matches!(element.tag_name().as_str(), "body" | "html");
    let source = if is_page_root { element.inner_html() } else { element.outer_html() };
    let mut fragment = Document::parse_fragment(&source);

    let root = fragment.root();
    let mut doomed = Vec::new();
    let mut stack: Vec<(Element<'_>, usize)> = root.child_elements().into_iter().map(|el| (el, 1)).collect();
    stack.reverse();

    while let Some((el, depth)) = stack.pop() {
        let is_candidate_itself = depth == 1 && !is_page_root;

        if !is_candidate_itself && should_prune(&el, config) {
            doomed.push(el.id());
            continue;
        }

        if depth < config.max_prune_depth && !el.is_preformatted() {
            for child in el.child_elements().into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
    }

    let removed = doomed.into_iter().filter(|id| fragment.remove(*id)).count();
    let emptied = cleanup_empty_elements(&mut fragment);
    tracing::debug!(removed, emptied, "pruned candidate");

    fragment
}

fn contains_code(el: &Element<'_>) -> bool {
    el.is_preformatted() || !el.select_compiled(&CODE_SELECTOR).is_empty()
}

fn should_prune(el: &Element<'_>, config: &PruneConfig) -> bool {
    if contains_code(el) {
        return false;
    }

    let tag = el.tag_name();
    if CHROME_TAGS.contains(&tag.as_str()) {
        return true;
    }

    if !PRUNABLE_BLOCK_TAGS.contains(&tag.as_str()) {
        return false;
    }

    let text_len = el.text_len();
    if text_len >= config.min_keep_text_len {
        return false;
    }

    let hints = el.class_and_id();
    if NEGATIVE_PATTERNS.is_match(&hints) && !POSITIVE_PATTERNS.is_match(&hints) {
        return true;
    }

    let has_media = !el.select_compiled(&MEDIA_SELECTOR).is_empty();
    text_len > 0 && !has_media && link_density(el) > config.max_link_density
}
