//! HTML parsing and in-place DOM manipulation.
//!
//! [`Document`] owns an arena tree (scraper's `Html` over `ego_tree`). Nodes
//! are addressed by [`NodeId`] handles, so boilerplate removal and unwrapping
//! are arena operations: detach a node, or move its children in front of it
//! and then detach it. A detached node keeps its own subtree but is no longer
//! reachable from the document root, which is why every query here starts at
//! the root element rather than scanning the whole arena.
//!
//! # Example
//!
//! ```rust
//! use distill_core::parse::Document;
//!
//! let mut doc = Document::parse("<body><nav>Menu</nav><p>Hello</p></body>").unwrap();
//! let nav = doc.select("nav").unwrap()[0].id();
//! doc.remove(nav);
//! assert!(!doc.text_content().contains("Menu"));
//! ```

use std::sync::LazyLock;

use ego_tree::NodeId;
use regex::Regex;
use scraper::node::Text;
use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::{DistillError, PreprocessConfig, Result, preprocess};

static HIDDEN_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(display\s*:\s*none|visibility\s*:\s*hidden)").expect("valid hidden-style regex"));

/// Tags whose content is preformatted source or output.
pub const PREFORMATTED_TAGS: &[&str] = &["pre", "code"];

/// A parsed, mutable HTML document.
///
/// Cloning a Document copies the whole arena, which is how stages that need an
/// untouched copy (the external extractor, the pruner) protect the live tree.
#[derive(Debug, Clone)]
pub struct Document {
    html: Html,
    base_url: Option<Url>,
}

impl Document {
    /// Parses a full HTML document without preprocessing.
    pub fn parse(html: &str) -> Result<Self> {
        let html = Html::parse_document(html);
        Ok(Self { html, base_url: None })
    }

    /// Parses an HTML fragment (no implied `<head>`/`<body>`).
    ///
    /// The fragment's nodes live under a synthetic `<html>` root element; use
    /// [`Document::fragment_html`] to serialise them back without it.
    pub fn parse_fragment(html: &str) -> Self {
        Self { html: Html::parse_fragment(html), base_url: None }
    }

    /// Parses HTML after running the streaming preprocessor.
    ///
    /// Scripts, styles and other non-content tags are dropped before the tree
    /// is built, and relative links are resolved against `base_url`.
    pub fn parse_with_preprocessing(html: &str, base_url: Option<Url>) -> Result<Self> {
        let config = PreprocessConfig { base_url: base_url.clone(), ..Default::default() };

        let cleaned = preprocess::preprocess_html(html, &config);
        let html = Html::parse_document(&cleaned);

        Ok(Self { html, base_url })
    }

    /// Sets the base URL the document's relative links resolve against.
    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Gets the base URL used for preprocessing.
    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Gets the underlying `scraper::Html`.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Serialises the whole document.
    pub fn as_string(&self) -> String {
        self.html.html()
    }

    /// The root element (`<html>` for documents and fragments alike).
    pub fn root(&self) -> Element<'_> {
        Element { element: self.html.root_element() }
    }

    /// The `<body>` element, if the document has one.
    pub fn body(&self) -> Option<Element<'_>> {
        self.select("body").ok()?.into_iter().next()
    }

    /// Inner HTML of `<body>`, or of the root element when there is no body.
    pub fn body_html(&self) -> String {
        match self.body() {
            Some(body) => body.inner_html(),
            None => self.root().inner_html(),
        }
    }

    /// Serialises a fragment's nodes without the synthetic root element.
    pub fn fragment_html(&self) -> String {
        self.root().inner_html()
    }

    /// Selects attached elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`DistillError::HtmlParseError`] if the selector is invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use distill_core::parse::Document;
    ///
    /// let html = r#"<p class="content">First</p><p class="content">Second</p>"#;
    /// let doc = Document::parse(html).unwrap();
    /// let elements = doc.select("p.content").unwrap();
    /// assert_eq!(elements.len(), 2);
    /// ```
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = compile_selector(selector)?;
        Ok(self.select_compiled(&sel))
    }

    /// Selects attached elements using a pre-compiled selector.
    pub fn select_compiled(&'_ self, selector: &Selector) -> Vec<Element<'_>> {
        self.html.root_element().select(selector).map(|el| Element { element: el }).collect()
    }

    /// Looks up an element by handle.
    pub fn element(&self, id: NodeId) -> Option<Element<'_>> {
        let node = self.html.tree.get(id)?;
        ElementRef::wrap(node).map(|element| Element { element })
    }

    /// Gets the text of the `<title>` element.
    pub fn title(&self) -> Option<String> {
        let title = self.select("title").ok()?.into_iter().next()?;
        let text = title.text();
        let text = text.trim();
        if text.is_empty() { None } else { Some(text.to_string()) }
    }

    /// Gets all text reachable from the root element.
    pub fn text_content(&self) -> String {
        self.root().text()
    }

    /// Detaches a node (and its subtree) from the tree.
    ///
    /// Returns `false` when the handle is unknown or already detached.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if !self.is_attached(id) || id == self.html.tree.root().id() {
            return false;
        }
        match self.html.tree.get_mut(id) {
            Some(mut node) => {
                node.detach();
                true
            }
            None => false,
        }
    }

    /// Replaces a node with its children, keeping their order and position.
    ///
    /// Returns `false` when the node has no parent to receive the children.
    pub fn unwrap_element(&mut self, id: NodeId) -> bool {
        let children: Vec<NodeId> = match self.html.tree.get(id) {
            Some(node) if node.parent().is_some() => node.children().map(|child| child.id()).collect(),
            _ => return false,
        };

        for child in children {
            if let Some(mut child_node) = self.html.tree.get_mut(child) {
                child_node.detach();
            }
            if let Some(mut node) = self.html.tree.get_mut(id) {
                node.insert_id_before(child);
            }
        }

        if let Some(mut node) = self.html.tree.get_mut(id) {
            node.detach();
        }
        true
    }

    /// Replaces a node (and its subtree) with a single text node.
    ///
    /// Returns `false` when the node is the root, unknown or already detached.
    pub fn replace_with_text(&mut self, id: NodeId, text: &str) -> bool {
        if !self.is_attached(id) || id == self.html.tree.root().id() {
            return false;
        }
        match self.html.tree.get_mut(id) {
            Some(mut node) => {
                node.insert_before(Node::Text(Text { text: text.into() }));
                node.detach();
                true
            }
            None => false,
        }
    }

    /// Whether the node is still reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let root_id = self.html.tree.root().id();
        if id == root_id {
            return true;
        }
        self.html
            .tree
            .get(id)
            .and_then(|node| node.ancestors().last())
            .is_some_and(|top| top.id() == root_id)
    }

    /// Maximum nesting depth of the attached tree.
    pub fn depth(&self) -> usize {
        self.html.tree.root().descendants().map(|node| node.ancestors().count()).max().unwrap_or(0)
    }

    /// Number of attached elements.
    pub fn element_count(&self) -> usize {
        self.html.tree.root().descendants().filter(|node| node.value().is_element()).count()
    }

    /// Verifies that every attached node's parent handle points at the node
    /// holding it in its child list.
    pub fn check_tree(&self) -> bool {
        self.html.tree.root().descendants().all(|node| {
            node.children()
                .all(|child| child.parent().map(|parent| parent.id()) == Some(node.id()))
        })
    }
}

/// Compiles a CSS selector, mapping the parse error into [`DistillError`].
pub fn compile_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| DistillError::HtmlParseError(format!("Invalid selector: {}", e)))
}

/// A borrowed element of a [`Document`].
#[derive(Clone, Debug)]
pub struct Element<'a> {
    element: ElementRef<'a>,
}

impl<'a> Element<'a> {
    /// The element's arena handle.
    pub fn id(&self) -> NodeId {
        self.element.id()
    }

    /// Gets the inner HTML of this element.
    pub fn inner_html(&self) -> String {
        self.element.inner_html()
    }

    /// Gets the outer HTML of this element.
    pub fn outer_html(&self) -> String {
        self.element.html()
    }

    /// Gets the text content of this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Number of characters of text, with whitespace runs collapsed.
    pub fn text_len(&self) -> usize {
        normalized_len(&self.text())
    }

    /// Gets the value of an attribute.
    pub fn attr(&self, name: &str) -> Option<&'a str> {
        self.element.value().attr(name)
    }

    /// Gets the lowercase tag name.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }

    /// Class and id attributes joined with a space, for keyword matching.
    pub fn class_and_id(&self) -> String {
        let class = self.attr("class").unwrap_or_default();
        let id = self.attr("id").unwrap_or_default();
        format!("{} {}", class, id)
    }

    /// Selects descendant elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`DistillError::HtmlParseError`] if the selector is invalid.
    pub fn select(&self, selector: &str) -> Result<Vec<Element<'a>>> {
        let sel = compile_selector(selector)?;
        Ok(self.select_compiled(&sel))
    }

    /// Selects descendant elements using a pre-compiled selector.
    pub fn select_compiled(&self, selector: &Selector) -> Vec<Element<'a>> {
        self.element.select(selector).map(|el| Element { element: el }).collect()
    }

    /// Child elements, in order.
    pub fn child_elements(&self) -> Vec<Element<'a>> {
        self.element.children().filter_map(ElementRef::wrap).map(|element| Element { element }).collect()
    }

    /// Descendant elements in document order (excluding self).
    pub fn descendant_elements(&self) -> Vec<Element<'a>> {
        self.element
            .descendants()
            .skip(1)
            .filter_map(ElementRef::wrap)
            .map(|element| Element { element })
            .collect()
    }

    /// This element followed by its descendant elements, in document order.
    pub fn self_and_descendants(&self) -> Vec<Element<'a>> {
        self.element.descendants().filter_map(ElementRef::wrap).map(|element| Element { element }).collect()
    }

    /// The closest ancestor element.
    pub fn parent_element(&self) -> Option<Element<'a>> {
        self.element.parent().and_then(ElementRef::wrap).map(|element| Element { element })
    }

    /// Whether the element has sibling nodes on both sides, so that dropping
    /// it would join whatever text surrounds it.
    pub fn is_between_siblings(&self) -> bool {
        self.element.prev_sibling().is_some() && self.element.next_sibling().is_some()
    }

    /// Whether this element or one of its ancestors has one of `tags`.
    pub fn is_within(&self, tags: &[&str]) -> bool {
        if tags.contains(&self.tag_name().as_str()) {
            return true;
        }
        self.element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|ancestor| tags.contains(&ancestor.value().name()))
    }

    /// Whether this element sits in a preformatted (`pre`/`code`) context.
    pub fn is_preformatted(&self) -> bool {
        self.is_within(PREFORMATTED_TAGS)
    }

    /// Computed hidden flag.
    ///
    /// Without a layout engine an element counts as hidden when it carries the
    /// `hidden` attribute, `aria-hidden="true"`, is a hidden input, or has an
    /// inline `display:none` / `visibility:hidden` style.
    pub fn is_hidden(&self) -> bool {
        let el = self.element.value();
        if el.attr("hidden").is_some() {
            return true;
        }
        if el.attr("aria-hidden").is_some_and(|v| v.trim().eq_ignore_ascii_case("true")) {
            return true;
        }
        if el.name().eq_ignore_ascii_case("input") && el.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("hidden"))
        {
            return true;
        }
        el.attr("style").is_some_and(|style| HIDDEN_STYLE.is_match(style))
    }
}

/// Character count of `text` with whitespace runs collapsed to one space.
pub fn normalized_len(text: &str) -> usize {
    let mut count = 0;
    let mut in_space = true;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                count += 1;
                in_space = true;
            }
        } else {
            count += 1;
            in_space = false;
        }
    }
    if in_space && count > 0 { count - 1 } else { count }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <title>Test Page</title>
        </head>
        <body>
            <h1>Heading</h1>
            <p class="content">Paragraph 1</p>
            <p class="content">Paragraph 2</p>
            <a href="https://example.com">Link</a>
        </body>
        </html>
    "#;

    #[test]
    fn test_parse_document() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        assert_eq!(doc.title(), Some("Test Page".to_string()));
    }

    #[test]
    fn test_select_elements() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let elements = doc.select("p.content").unwrap();

        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].text(), "Paragraph 1");
        assert_eq!(elements[1].text(), "Paragraph 2");
    }

    #[test]
    fn test_invalid_selector() {
        let doc = Document::parse(SAMPLE_HTML).unwrap();
        let result = doc.select("[[invalid");

        assert!(matches!(result, Err(DistillError::HtmlParseError(_))));
    }

    #[test]
    fn test_remove_detaches_subtree() {
        let mut doc = Document::parse(SAMPLE_HTML).unwrap();
        let first = doc.select("p.content").unwrap()[0].id();

        assert!(doc.remove(first));
        assert!(!doc.is_attached(first));
        assert!(!doc.text_content().contains("Paragraph 1"));
        assert_eq!(doc.select("p.content").unwrap().len(), 1);
        assert!(!doc.remove(first), "a detached node cannot be removed twice");
        assert!(doc.check_tree());
    }

    #[test]
    fn test_unwrap_keeps_children_in_place() {
        let mut doc = Document::parse("<div id='outer'><span>a</span><font><b>b</b>c</font><i>d</i></div>").unwrap();
        let font = doc.select("font").unwrap()[0].id();

        assert!(doc.unwrap_element(font));

        let outer = doc.select("#outer").unwrap();
        assert_eq!(outer[0].inner_html(), "<span>a</span><b>b</b>c<i>d</i>");
        assert!(doc.select("font").unwrap().is_empty());
        assert!(doc.check_tree());
    }

    #[test]
    fn test_is_hidden() {
        let html = r#"
            <div id="a" style="display: none">x</div>
            <div id="b" hidden>x</div>
            <div id="c" aria-hidden="true">x</div>
            <input id="d" type="hidden">
            <div id="e" style="color: red">x</div>
        "#;
        let doc = Document::parse(html).unwrap();
        for id in ["a", "b", "c", "d"] {
            let el = &doc.select(&format!("#{}", id)).unwrap()[0];
            assert!(el.is_hidden(), "#{} should be hidden", id);
        }
        assert!(!doc.select("#e").unwrap()[0].is_hidden());
    }

    #[test]
    fn test_is_preformatted() {
        let doc = Document::parse("<pre><span class='x'>let</span></pre><p><span class='y'>no</span></p>").unwrap();
        assert!(doc.select("span.x").unwrap()[0].is_preformatted());
        assert!(!doc.select("span.y").unwrap()[0].is_preformatted());
    }

    #[test]
    fn test_fragment_html_round_trip() {
        let doc = Document::parse_fragment("<p>One</p><p>Two</p>");
        assert_eq!(doc.fragment_html(), "<p>One</p><p>Two</p>");
    }

    #[test]
    fn test_body_html() {
        let doc = Document::parse("<html><body><pre><code>x = 1</code></pre></body></html>").unwrap();
        assert_eq!(doc.body_html(), "<pre><code>x = 1</code></pre>");
    }

    #[test]
    fn test_normalized_len() {
        assert_eq!(normalized_len("  a   b \n c  "), 5);
        assert_eq!(normalized_len(""), 0);
        assert_eq!(normalized_len("   "), 0);
    }

    #[test]
    fn test_replace_with_text() {
        let mut doc = Document::parse("<p>Hello<span> </span>world</p>").unwrap();
        let span = doc.select("span").unwrap()[0].id();

        assert!(doc.replace_with_text(span, " "));
        assert!(!doc.replace_with_text(span, " "));
        assert_eq!(doc.select("p").unwrap()[0].inner_html(), "Hello world");
        assert!(doc.check_tree());
    }
}
