use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::parse::Element;

/// Configuration for the content scoring algorithm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScoreConfig {
    /// Minimum score a candidate needs to be selected
    pub min_score: f64,
    /// Weight for positive tag/class/ID patterns
    pub positive_weight: f64,
    /// Weight for negative tag/class/ID patterns
    pub negative_weight: f64,
    /// Link density above which the multiplicative penalty applies
    pub link_density_threshold: f64,
    /// Points per paragraph-like child
    pub paragraph_bonus: f64,
    /// Cap on the paragraph bonus
    pub max_paragraph_bonus: f64,
    /// Points per character of non-link text per element
    pub text_density_scale: f64,
    /// Cap on the text density score
    pub max_text_density_score: f64,
    /// Maximum content density score from character count
    pub max_char_density_score: f64,
    /// Maximum content density score from comma count
    pub max_comma_density_score: f64,
    /// Characters per point for content density scoring
    pub chars_per_point: usize,
    /// Text length above which an element counts as content-rich
    pub content_rich_len: usize,
    /// Maximum number of elements scored per search
    pub max_elements: usize,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            min_score: 20.0,
            positive_weight: 25.0,
            negative_weight: -25.0,
            link_density_threshold: 0.33,
            paragraph_bonus: 5.0,
            max_paragraph_bonus: 25.0,
            text_density_scale: 0.1,
            max_text_density_score: 30.0,
            max_char_density_score: 3.0,
            max_comma_density_score: 3.0,
            chars_per_point: 100,
            content_rich_len: 500,
            max_elements: 1000,
        }
    }
}

/// Result of scoring an element
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreResult {
    /// The element's tag name
    pub tag_name: String,
    /// The element's class attribute (if present)
    pub class: Option<String>,
    /// The element's id attribute (if present)
    pub id: Option<String>,
    /// Base score from tag type
    pub base_score: f64,
    /// Weight adjustment from tag/class/ID patterns
    pub class_weight: f64,
    /// Score from non-link text per element
    pub text_density: f64,
    /// Score from character and comma counts
    pub content_density: f64,
    /// Score from paragraph-like children
    pub paragraph_bonus: f64,
    /// Link density (0.0 to 1.0)
    pub link_density: f64,
    /// Multiplier applied for link density (1.0 when below the threshold)
    pub link_penalty: f64,
    /// Final calculated score
    pub final_score: f64,
}

/// Calculate the base score for an element based on its tag name
///
/// Scores are assigned based on how likely a tag is to contain main content:
/// - ARTICLE, MAIN: +10 (primary content container)
/// - SECTION: +8 (content section)
/// - DIV: +5 (generic container)
/// - TD, BLOCKQUOTE: +3 (content elements)
/// - PRE: 0 (kept neutral)
/// - FORM, ADDRESS, lists: -3
/// - headings, TH, HEADER, FOOTER, NAV, ASIDE: -5
pub fn base_tag_score(element: &Element<'_>) -> f64 {
    match element.tag_name().as_str() {
        "article" | "main" => 10.0,
        "section" => 8.0,
        "div" => 5.0,
        "td" | "blockquote" => 3.0,
        "pre" => 0.0,
        "form" => -3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" | "header" | "footer" | "nav" | "aside" => -5.0,
        _ => 0.0,
    }
}

/// Patterns that suggest an element contains main content
pub static POSITIVE_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(article|body|content|entry|hentry|h-entry|main|page|post|text|blog|story|prose|markdown|docs?-?content)")
        .expect("valid positive pattern regex")
});

/// Patterns that suggest an element does NOT contain main content
pub static NEGATIVE_PATTERNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(banner|breadcrumbs?|combx|comment|community|disqus|extra|foot|header|menu|nav|related|remark|rss|shoutbox|sidebar|sponsor|ad-break|agegate|pagination|pager|popup|promo|share|social|widget|aside)",
    )
    .expect("valid negative pattern regex")
});

/// Calculate the tag/class/ID weight adjustment for an element
///
/// Returns +positive_weight if the element's tag, id or one of its classes
/// matches positive patterns, or negative_weight if one matches negative
/// patterns (but not positive). The id is checked before classes.
pub fn class_id_weight(element: &Element<'_>, config: &ScoreConfig) -> f64 {
    let tag = element.tag_name();
    let names = std::iter::once(tag.as_str())
        .chain(element.attr("id"))
        .chain(element.attr("class").into_iter().flat_map(str::split_whitespace));

    for name in names {
        if POSITIVE_PATTERNS.is_match(name) {
            return config.positive_weight;
        }
        if NEGATIVE_PATTERNS.is_match(name) {
            return config.negative_weight;
        }
    }

    0.0
}

/// Calculate content density score based on text length and comma count
///
/// This gives higher scores to elements with:
/// - More text content (up to max_char_density_score)
/// - More commas (indicates prose, up to max_comma_density_score)
pub fn content_density_score(element: &Element<'_>, config: &ScoreConfig) -> f64 {
    let text = element.text();
    let chars_per_point = config.chars_per_point.max(1);
    let char_score = ((text.chars().count() / chars_per_point) as f64).min(config.max_char_density_score);
    let comma_count = text.matches(',').count();
    let comma_score = (comma_count as f64).min(config.max_comma_density_score);

    char_score + comma_score
}

/// Total length of anchor text inside an element
pub fn link_text_len(element: &Element<'_>) -> usize {
    element
        .self_and_descendants()
        .iter()
        .filter(|el| el.tag_name() == "a")
        .map(|link| link.text_len())
        .sum()
}

/// Calculate the link density of an element
///
/// Link density is the ratio of link text characters to total text characters.
/// Returns a value from 0.0 (no links) to 1.0 (all text is in links).
pub fn link_density(element: &Element<'_>) -> f64 {
    let text_length = element.text_len();

    if text_length == 0 {
        return 0.0;
    }

    (link_text_len(element) as f64 / text_length as f64).min(1.0)
}

/// Non-link text characters per element in the subtree, scaled and capped
pub fn text_density_score(element: &Element<'_>, config: &ScoreConfig) -> f64 {
    let element_count = element.self_and_descendants().len().max(1);
    let prose_len = element.text_len().saturating_sub(link_text_len(element));
    let density = prose_len as f64 / element_count as f64;

    (density * config.text_density_scale).min(config.max_text_density_score)
}

/// Number of direct `p`, `pre` and `blockquote` children
pub fn paragraph_children(element: &Element<'_>) -> usize {
    element
        .child_elements()
        .iter()
        .filter(|child| matches!(child.tag_name().as_str(), "p" | "pre" | "blockquote"))
        .count()
}

/// Calculate the final score for an element
///
/// The final score is the sum of:
/// - Base tag score
/// - Tag/class/ID weight adjustment
/// - Text density
/// - Content density
/// - Paragraph bonus
///
/// When link density exceeds the threshold, a positive sum is multiplied by
/// `1 - link_density`. The penalty is halved for elements with positive
/// patterns or a lot of text.
pub fn calculate_score(element: &Element<'_>, config: &ScoreConfig) -> ScoreResult {
    let tag_name = element.tag_name();
    let class = element.attr("class").map(|s| s.to_string());
    let id = element.attr("id").map(|s| s.to_string());

    let base_score = base_tag_score(element);
    let class_weight = class_id_weight(element, config);
    let text_density = text_density_score(element, config);
    let content_density = content_density_score(element, config);
    let paragraph_bonus = (paragraph_children(element) as f64 * config.paragraph_bonus).min(config.max_paragraph_bonus);
    let ld = link_density(element);

    let raw_score = base_score + class_weight + text_density + content_density + paragraph_bonus;

    let has_positive_pattern = class_weight > 0.0;
    let is_content_rich = element.text_len() > config.content_rich_len;

    let link_penalty = if ld <= config.link_density_threshold || raw_score <= 0.0 {
        1.0
    } else if has_positive_pattern || is_content_rich {
        1.0 - (ld * 0.5)
    } else {
        1.0 - ld
    };

    let final_score = raw_score * link_penalty;

    ScoreResult {
        tag_name,
        class,
        id,
        base_score,
        class_weight,
        text_density,
        content_density,
        paragraph_bonus,
        link_density: ld,
        link_penalty,
        final_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::Document;
    use rstest::rstest;

    fn first<'a>(doc: &'a Document, selector: &str) -> Element<'a> {
        doc.select(selector).unwrap().into_iter().next().unwrap()
    }

    #[rstest]
    #[case("<article>Content</article>", "article", 10.0)]
    #[case("<main>Content</main>", "main", 10.0)]
    #[case("<section>Content</section>", "section", 8.0)]
    #[case("<div>Content</div>", "div", 5.0)]
    #[case("<blockquote>Quote</blockquote>", "blockquote", 3.0)]
    #[case("<pre>Code</pre>", "pre", 0.0)]
    #[case("<form>Form</form>", "form", -3.0)]
    #[case("<nav>Nav</nav>", "nav", -5.0)]
    #[case("<header>Header</header>", "header", -5.0)]
    fn test_base_tag_score(#[case] html: &str, #[case] selector: &str, #[case] expected: f64) {
        let doc = Document::parse(html).unwrap();
        assert_eq!(base_tag_score(&first(&doc, selector)), expected);
    }

    #[rstest]
    #[case(r#"<div class="article-content">x</div>"#, 25.0)]
    #[case(r#"<div id="main-content">x</div>"#, 25.0)]
    #[case(r#"<div class="sidebar">x</div>"#, -25.0)]
    #[case(r#"<div class="share-widget">x</div>"#, -25.0)]
    #[case(r#"<div class="container" id="wrapper">x</div>"#, 0.0)]
    #[case(r#"<div id="main-article" class="sidebar">x</div>"#, 25.0)]
    fn test_class_id_weight(#[case] html: &str, #[case] expected: f64) {
        let doc = Document::parse(html).unwrap();
        assert_eq!(class_id_weight(&first(&doc, "div"), &ScoreConfig::default()), expected);
    }

    #[test]
    fn test_class_weight_uses_tag_name() {
        let doc = Document::parse("<article>x</article><aside>y</aside>").unwrap();
        let config = ScoreConfig::default();
        assert_eq!(class_id_weight(&first(&doc, "article"), &config), 25.0);
        assert_eq!(class_id_weight(&first(&doc, "aside"), &config), -25.0);
    }

    #[test]
    fn test_content_density_with_commas() {
        let html = r#"<div>Text with commas, more commas, even more commas, and additional commas here.</div>"#;
        let doc = Document::parse(html).unwrap();
        assert_eq!(content_density_score(&first(&doc, "div"), &ScoreConfig::default()), 3.0);
    }

    #[test]
    fn test_content_density_max_char_score() {
        let html = format!(r#"<div>{}</div>"#, "a".repeat(500));
        let doc = Document::parse(&html).unwrap();
        assert_eq!(content_density_score(&first(&doc, "div"), &ScoreConfig::default()), 3.0);
    }

    #[test]
    fn test_link_density() {
        let doc = Document::parse(
            r##"<div id="none">Plain text only.</div>
                <div id="all"><a href="#">Link text</a></div>
                <div id="mixed">Some text <a href="#">link</a> more text</div>"##,
        )
        .unwrap();

        assert_eq!(link_density(&first(&doc, "#none")), 0.0);
        assert_eq!(link_density(&first(&doc, "#all")), 1.0);
        let mixed = link_density(&first(&doc, "#mixed"));
        assert!(mixed > 0.0 && mixed < 1.0);
    }

    #[test]
    fn test_text_density_prefers_prose_over_wrappers() {
        let html = format!(
            concat!(
                r#"<div id="wrapper"><div><a href="/">a</a></div><div><a href="/">b</a></div>"#,
                r#"<div id="prose"><p>{}</p></div></div>"#
            ),
            "Readable prose sentence. ".repeat(10)
        );
        let doc = Document::parse(&html).unwrap();
        let config = ScoreConfig::default();

        let wrapper = text_density_score(&first(&doc, "#wrapper"), &config);
        let prose = text_density_score(&first(&doc, "#prose"), &config);
        assert!(prose > wrapper);
    }

    #[test]
    fn test_paragraph_bonus_is_capped() {
        let html = format!("<div>{}</div>", "<p>Para.</p>".repeat(12));
        let doc = Document::parse(&html).unwrap();
        let result = calculate_score(&first(&doc, "div"), &ScoreConfig::default());
        assert_eq!(result.paragraph_bonus, 25.0);
    }

    #[test]
    fn test_calculate_score_combined() {
        let html = r##"<article class="main-content" id="post">
            <p>This is a long piece of text that should score well, with multiple commas, to indicate prose content.</p>
            <p><a href="#">Small link</a> and more text here to increase character count, more commas, more content.</p>
        </article>"##;

        let doc = Document::parse(html).unwrap();
        let result = calculate_score(&first(&doc, "article"), &ScoreConfig::default());

        assert_eq!(result.tag_name, "article");
        assert_eq!(result.class, Some("main-content".to_string()));
        assert_eq!(result.id, Some("post".to_string()));
        assert_eq!(result.base_score, 10.0);
        assert_eq!(result.class_weight, 25.0);
        assert_eq!(result.paragraph_bonus, 10.0);
        assert!(result.link_density > 0.0 && result.link_density < 0.3);
        assert_eq!(result.link_penalty, 1.0);
        assert!(result.final_score > 45.0);
    }

    #[test]
    fn test_calculate_score_nav_penalized() {
        let html = r##"<nav class="menu">
            <a href="#">Link 1</a>
            <a href="#">Link 2</a>
            <a href="#">Link 3</a>
        </nav>"##;

        let doc = Document::parse(html).unwrap();
        let result = calculate_score(&first(&doc, "nav"), &ScoreConfig::default());

        assert_eq!(result.base_score, -5.0);
        assert_eq!(result.class_weight, -25.0);
        assert!(result.link_density > 0.8);
        assert!(result.final_score < 0.0);
    }

    #[test]
    fn test_calculate_score_link_density_penalty() {
        let html = r##"
            <div>
                <a href="#">Link 1</a>
                <a href="#">Link 2</a>
                <a href="#">Link 3</a>
                <a href="#">Link 4</a>
                <a href="#">Link 5</a>
            </div>
        "##;
        let doc = Document::parse(html).unwrap();
        let result = calculate_score(&first(&doc, "div"), &ScoreConfig::default());

        let raw_score = result.base_score
            + result.class_weight
            + result.text_density
            + result.content_density
            + result.paragraph_bonus;
        assert!(result.link_penalty < 1.0);
        assert!(result.final_score < raw_score);
    }

    #[test]
    fn test_score_config_rejects_unknown_fields() {
        assert!(serde_json::from_str::<ScoreConfig>(r#"{"min_score": 10.0}"#).is_ok());
        assert!(serde_json::from_str::<ScoreConfig>(r#"{"min_scor": 10.0}"#).is_err());
    }
}
