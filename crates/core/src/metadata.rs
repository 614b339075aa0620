use serde::Serialize;

use crate::parse::Document;

/// Page-level metadata read from structured data, meta tags and markup
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub byline: Option<String>,
    pub excerpt: Option<String>,
    pub site_name: Option<String>,
    pub language: Option<String>,
    pub published: Option<String>,
}

const BYLINE_PATTERNS: &[&str] = &["byline", "author", "by-author", "writer"];
const MAX_BYLINE_LEN: usize = 100;
const MAX_EXCERPT_LEN: usize = 300;

impl Document {
    /// Extract title with priority fallback:
    /// 1. JSON-LD `headline`
    /// 2. Open Graph `og:title`
    /// 3. Twitter `twitter:title`
    /// 4. `<title>` element
    /// 5. First `<h1>` element
    pub fn extract_title(&self) -> Option<String> {
        self.json_ld_str("headline")
            .or_else(|| self.meta_content("og:title"))
            .or_else(|| self.meta_content("twitter:title"))
            .or_else(|| self.title())
            .or_else(|| self.first_text("h1"))
    }

    /// Extract byline with priority fallback:
    /// 1. JSON-LD `author` (string, object or first array entry)
    /// 2. Meta `author`
    /// 3. `[rel="author"]` / `[itemprop="author"]` text
    /// 4. Short text of an element whose class or id looks like a byline
    pub fn extract_byline(&self) -> Option<String> {
        if let Some(author) = self.json_ld().as_ref().and_then(|ld| ld.get("author")).and_then(author_name) {
            return Some(author);
        }

        if let Some(author) = self.meta_content("author") {
            return Some(author);
        }

        if let Some(author) = self.first_text(r#"[rel="author"], [itemprop="author"]"#) {
            return Some(author);
        }

        BYLINE_PATTERNS.iter().find_map(|pattern| {
            let selector = format!(r#"[class*="{pattern}"], [id*="{pattern}"]"#);
            self.select(&selector).ok()?.iter().take(3).find_map(|el| {
                let text = el.text();
                let text = text.trim();
                (!text.is_empty() && text.len() < MAX_BYLINE_LEN).then(|| text.to_string())
            })
        })
    }

    /// Extract excerpt with priority fallback:
    /// 1. JSON-LD `description`
    /// 2. Open Graph `og:description`
    /// 3. Meta `description`
    /// 4. First paragraph longer than 50 characters, truncated
    pub fn extract_excerpt(&self) -> Option<String> {
        if let Some(desc) = self
            .json_ld_str("description")
            .or_else(|| self.meta_content("og:description"))
            .or_else(|| self.meta_content("description"))
        {
            return Some(desc);
        }

        self.select("p").ok()?.iter().take(5).find_map(|el| {
            let text = el.text();
            let text = text.trim();
            if text.len() <= 50 {
                return None;
            }
            if text.chars().count() > MAX_EXCERPT_LEN {
                let cut: String = text.chars().take(MAX_EXCERPT_LEN).collect();
                Some(format!("{}...", cut.trim_end()))
            } else {
                Some(text.to_string())
            }
        })
    }

    /// Extract site name with priority fallback:
    /// 1. JSON-LD `publisher.name`
    /// 2. Open Graph `og:site_name`
    /// 3. Domain from the base URL
    pub fn extract_site_name(&self) -> Option<String> {
        if let Some(name) = self
            .json_ld()
            .as_ref()
            .and_then(|ld| ld.get("publisher"))
            .and_then(|publisher| publisher.get("name"))
            .and_then(|name| name.as_str())
        {
            return Some(name.to_string());
        }

        self.meta_content("og:site_name")
            .or_else(|| self.base_url().and_then(|url| url.domain()).map(|domain| domain.to_string()))
    }

    /// Language from `<html lang>` or the `og:locale` meta tag
    pub fn extract_language(&self) -> Option<String> {
        self.root()
            .attr("lang")
            .map(str::trim)
            .filter(|lang| !lang.is_empty())
            .map(str::to_string)
            .or_else(|| self.meta_content("og:locale"))
    }

    /// Publication date from JSON-LD, `article:published_time` or `<time datetime>`
    pub fn extract_published(&self) -> Option<String> {
        self.json_ld_str("datePublished")
            .or_else(|| self.meta_content("article:published_time"))
            .or_else(|| {
                let time = self.select("time[datetime]").ok()?.into_iter().next()?;
                time.attr("datetime").map(str::to_string)
            })
    }

    /// Extract all metadata at once
    pub fn extract_metadata(&self) -> Metadata {
        Metadata {
            title: self.extract_title(),
            byline: self.extract_byline(),
            excerpt: self.extract_excerpt(),
            site_name: self.extract_site_name(),
            language: self.extract_language(),
            published: self.extract_published(),
        }
    }

    /// Get meta tag content by name or property attribute
    fn meta_content(&self, key: &str) -> Option<String> {
        let selector = format!(r#"meta[name="{key}"], meta[property="{key}"]"#);
        let elements = self.select(&selector).ok()?;
        elements
            .iter()
            .filter_map(|el| el.attr("content"))
            .map(str::trim)
            .find(|content| !content.is_empty())
            .map(str::to_string)
    }

    fn first_text(&self, selector: &str) -> Option<String> {
        self.select(selector).ok()?.iter().find_map(|el| {
            let text = el.text();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        })
    }

    /// First JSON-LD object on the page (the first element of a top-level array)
    fn json_ld(&self) -> Option<serde_json::Value> {
        self.select(r#"script[type="application/ld+json"]"#).ok()?.iter().find_map(|el| {
            let value = serde_json::from_str::<serde_json::Value>(el.text().trim()).ok()?;
            match value {
                serde_json::Value::Array(items) => items.into_iter().find(|item| item.is_object()),
                other => Some(other),
            }
        })
    }

    fn json_ld_str(&self, key: &str) -> Option<String> {
        self.json_ld()?.get(key)?.as_str().map(str::to_string)
    }
}

/// Author name from a JSON-LD `author` field (string, object or array)
fn author_name(author: &serde_json::Value) -> Option<String> {
    match author {
        serde_json::Value::String(name) => Some(name.clone()),
        serde_json::Value::Object(obj) => obj.get("name")?.as_str().map(str::to_string),
        serde_json::Value::Array(items) => items.first().and_then(author_name),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML_WITH_META: &str = r#"
        <!DOCTYPE html>
        <html lang="en">
        <head>
            <meta charset="UTF-8">
            <title>Test Page Title</title>
            <meta name="author" content="John Doe">
            <meta name="description" content="This is a test description of the page.">
            <meta property="og:title" content="OG Title">
            <meta property="og:site_name" content="Example Site">
            <script type="application/ld+json">
            {
                "@context": "https://schema.org",
                "@type": "Article",
                "headline": "JSON-LD Headline",
                "author": { "@type": "Person", "name": "Jane Smith" },
                "datePublished": "2024-01-15T10:30:00Z",
                "description": "JSON-LD Description",
                "publisher": { "@type": "Organization", "name": "JSON-LD Publisher" }
            }
            </script>
        </head>
        <body>
            <h1>Main Heading</h1>
            <p>This is the first paragraph of the content. It has enough words to serve as an excerpt.</p>
        </body>
        </html>
    "#;

    const HTML_WITHOUT_META: &str = r#"
        <!DOCTYPE html>
        <html>
        <head><title>Simple Page</title></head>
        <body>
            <h1>Heading</h1>
            <div class="post-byline">By Sam Writer</div>
            <p>This is a substantial paragraph that should be used as an excerpt because it is long enough.</p>
        </body>
        </html>
    "#;

    #[test]
    fn test_extract_metadata_from_json_ld() {
        let doc = Document::parse(HTML_WITH_META).unwrap();
        let metadata = doc.extract_metadata();

        assert_eq!(metadata.title.as_deref(), Some("JSON-LD Headline"));
        assert_eq!(metadata.byline.as_deref(), Some("Jane Smith"));
        assert_eq!(metadata.excerpt.as_deref(), Some("JSON-LD Description"));
        assert_eq!(metadata.site_name.as_deref(), Some("JSON-LD Publisher"));
        assert_eq!(metadata.language.as_deref(), Some("en"));
        assert_eq!(metadata.published.as_deref(), Some("2024-01-15T10:30:00Z"));
    }

    #[test]
    fn test_extract_metadata_fallbacks() {
        let doc = Document::parse(HTML_WITHOUT_META).unwrap();
        let metadata = doc.extract_metadata();

        assert_eq!(metadata.title.as_deref(), Some("Simple Page"));
        assert_eq!(metadata.byline.as_deref(), Some("By Sam Writer"));
        assert!(metadata.excerpt.unwrap().contains("substantial paragraph"));
        assert_eq!(metadata.site_name, None);
        assert_eq!(metadata.language, None);
    }

    #[test]
    fn test_title_falls_back_to_h1() {
        let doc = Document::parse("<body><h1>  Only Heading </h1></body>").unwrap();
        assert_eq!(doc.extract_title().as_deref(), Some("Only Heading"));
    }

    #[test]
    fn test_meta_author_and_og_site_name() {
        let html =
            r#"<head><meta name="author" content="John Doe"><meta property="og:site_name" content="OG Site"></head>"#;
        let doc = Document::parse(html).unwrap();
        assert_eq!(doc.extract_byline().as_deref(), Some("John Doe"));
        assert_eq!(doc.extract_site_name().as_deref(), Some("OG Site"));
    }

    #[test]
    fn test_author_array_from_json_ld() {
        let html = r#"
            <head><script type="application/ld+json">
            [{"@type": "Article", "author": [{"name": "First Author"}, {"name": "Second Author"}]}]
            </script></head>
        "#;
        let doc = Document::parse(html).unwrap();
        assert_eq!(doc.extract_byline().as_deref(), Some("First Author"));
    }

    #[test]
    fn test_long_excerpt_is_truncated() {
        let html = format!("<body><p>{}</p></body>", "Long sentence goes on. ".repeat(40));
        let doc = Document::parse(&html).unwrap();
        let excerpt = doc.extract_excerpt().unwrap();
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.chars().count() <= MAX_EXCERPT_LEN + 3);
    }
}
