use url::Url;

/// Configuration for the streaming pass that runs before the tree is built
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    /// Whether to remove script tags
    pub remove_scripts: bool,
    /// Whether to remove style tags
    pub remove_styles: bool,
    /// Whether to remove noscript and template tags
    pub remove_noscript: bool,
    /// Whether to remove iframe tags
    pub remove_iframes: bool,
    /// Whether to remove svg and canvas tags
    pub remove_graphics: bool,
    /// Whether to drop HTML comments
    pub remove_comments: bool,
    /// Whether to convert relative URLs to absolute
    pub convert_urls: bool,
    /// Base URL for converting relative URLs
    pub base_url: Option<Url>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            remove_scripts: true,
            remove_styles: true,
            remove_noscript: true,
            remove_iframes: true,
            remove_graphics: true,
            remove_comments: true,
            convert_urls: true,
            base_url: None,
        }
    }
}

/// Preprocess raw HTML before parsing.
///
/// Every step is best effort: when the rewriter rejects the input, the step
/// returns its input unchanged.
pub fn preprocess_html(html: &str, config: &PreprocessConfig) -> String {
    let mut processed = remove_unwanted_tags(html, config);

    if config.convert_urls
        && let Some(base_url) = &config.base_url
    {
        processed = convert_relative_urls(&processed, base_url);
    }

    processed
}

fn unwanted_tag_selectors(config: &PreprocessConfig) -> Vec<&'static str> {
    let mut selectors = Vec::new();
    if config.remove_scripts {
        selectors.push("script");
    }
    if config.remove_styles {
        selectors.push("style");
    }
    if config.remove_noscript {
        selectors.extend(["noscript", "template"]);
    }
    if config.remove_iframes {
        selectors.push("iframe");
    }
    if config.remove_graphics {
        selectors.extend(["svg", "canvas"]);
    }
    selectors
}

/// Remove script, style, noscript, template, iframe, svg, and canvas tags,
/// and comments when configured.
///
/// JSON-LD scripts survive so metadata can still be read from them.
fn remove_unwanted_tags(html: &str, config: &PreprocessConfig) -> String {
    let selectors = unwanted_tag_selectors(config);
    if selectors.is_empty() && !config.remove_comments {
        return html.to_string();
    }

    let mut document_content_handlers = Vec::new();
    if config.remove_comments {
        document_content_handlers.push(lol_html::doc_comments!(|comment| {
            comment.remove();
            Ok(())
        }));
    }

    let mut output = String::new();
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: selectors
                .into_iter()
                .map(|selector| {
                    lol_html::element!(selector, |el| {
                        let structured_data = el.tag_name() == "script"
                            && el
                                .get_attribute("type")
                                .is_some_and(|t| t.trim().eq_ignore_ascii_case("application/ld+json"));
                        if !structured_data {
                            el.remove();
                        }
                        Ok(())
                    })
                })
                .collect(),
            document_content_handlers,
            ..Default::default()
        },
        |c: &[u8]| {
            output.push_str(&String::from_utf8_lossy(c));
        },
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    if output.is_empty() { html.to_string() } else { output }
}

/// Convert relative URLs to absolute URLs
pub fn convert_relative_urls(html: &str, base_url: &Url) -> String {
    let mut output = String::new();
    let mut rewriter = lol_html::HtmlRewriter::new(
        lol_html::Settings {
            element_content_handlers: vec![
                lol_html::element!("a[href]", |el| {
                    if let Some(href) = el.get_attribute("href")
                        && !href.starts_with('#')
                        && let Ok(absolute) = base_url.join(&href)
                    {
                        el.set_attribute("href", absolute.as_str()).ok();
                    }
                    Ok(())
                }),
                lol_html::element!("img[src]", |el| {
                    if let Some(src) = el.get_attribute("src")
                        && let Ok(absolute) = base_url.join(&src)
                    {
                        el.set_attribute("src", absolute.as_str()).ok();
                    }
                    Ok(())
                }),
            ],
            ..Default::default()
        },
        |c: &[u8]| {
            output.push_str(&String::from_utf8_lossy(c));
        },
    );

    if rewriter.write(html.as_bytes()).is_err() || rewriter.end().is_err() {
        return html.to_string();
    }

    if output.is_empty() { html.to_string() } else { output }
}
