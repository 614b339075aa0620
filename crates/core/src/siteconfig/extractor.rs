//! Site-specific extractors.
//!
//! A [`SiteExtractor`] knows one family of hosts well enough to pull the
//! article out directly. The pipeline asks the [`SiteExtractors`] registry
//! for the first extractor matching the page host and runs it before any
//! generic stage.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ExtractorError, Result};
use crate::extractor::ExtractedArticle;
use crate::parse::Document;
use crate::siteconfig::directives::SiteConfig;
use crate::siteconfig::loader::{ConfigLoaderBuilder, host_matches};

/// An extractor dedicated to particular hosts.
pub trait SiteExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this extractor handles pages from `host`.
    fn matches(&self, host: &str) -> bool;

    /// Extracts the article from the untouched page. Must not assume it may
    /// mutate `document`.
    fn extract(&self, document: &Document) -> std::result::Result<Option<ExtractedArticle>, ExtractorError>;

    /// Whether the generic stages may run after this extractor's output is rejected.
    fn autodetect_on_failure(&self) -> bool {
        true
    }
}

/// Extractor driven by a [`SiteConfig`] file.
#[derive(Debug, Clone)]
pub struct SiteConfigExtractor {
    name: String,
    config: SiteConfig,
}

impl SiteConfigExtractor {
    pub fn new(config: SiteConfig) -> Self {
        let name = format!("site-config:{}", config.host.as_deref().unwrap_or("*"));
        Self { name, config }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    fn apply_replacements(&self, document: &Document) -> std::result::Result<Document, ExtractorError> {
        if self.config.text_replacements.is_empty() {
            return Ok(document.clone());
        }

        let mut html = document.as_string();
        for (find, replace) in &self.config.text_replacements {
            if !find.is_empty() {
                html = html.replace(find, replace);
            }
        }
        Document::parse(&html)
            .map(|doc| doc.with_base_url(document.base_url().cloned()))
            .map_err(|e| self.failure(e.to_string()))
    }

    fn strip(&self, document: &mut Document) -> usize {
        let id_or_class = self
            .config
            .strip_id_or_class
            .iter()
            .filter(|pattern| !pattern.is_empty() && !pattern.contains('"'))
            .map(|pattern| format!(r#"[id*="{pattern}"], [class*="{pattern}"]"#));
        let selectors: Vec<String> = self.config.strip.iter().cloned().chain(id_or_class).collect();

        let mut removed = 0;
        for selector in &selectors {
            let ids: Vec<_> = match document.select(selector) {
                Ok(elements) => elements.iter().map(|el| el.id()).collect(),
                Err(e) => {
                    tracing::warn!(extractor = %self.name, selector = %selector, error = %e, "invalid strip selector");
                    continue;
                }
            };
            removed += ids.into_iter().filter(|id| document.remove(*id)).count();
        }
        removed
    }

    fn first_match(&self, document: &Document, selectors: &[String]) -> Option<Vec<String>> {
        selectors.iter().find_map(|selector| match document.select(selector) {
            Ok(elements) if !elements.is_empty() => Some(elements.iter().map(|el| el.outer_html()).collect()),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(extractor = %self.name, selector = %selector, error = %e, "invalid selector");
                None
            }
        })
    }

    fn failure(&self, message: String) -> ExtractorError {
        ExtractorError::Failed { extractor: self.name.clone(), message }
    }
}

impl SiteExtractor for SiteConfigExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, host: &str) -> bool {
        self.config.host.as_deref().is_some_and(|pattern| host_matches(pattern, host))
    }

    fn extract(&self, document: &Document) -> std::result::Result<Option<ExtractedArticle>, ExtractorError> {
        let mut working = self.apply_replacements(document)?;
        let stripped = self.strip(&mut working);

        let Some(bodies) = self.first_match(&working, &self.config.body) else {
            tracing::debug!(extractor = %self.name, stripped, "no body selector matched");
            return Ok(None);
        };

        let content = match bodies.as_slice() {
            [single] => single.clone(),
            many => format!("<div>{}</div>", many.concat()),
        };

        let title = self.first_match(&working, &self.config.title).and_then(|titles| {
            let fragment = Document::parse_fragment(titles.first()?);
            let text = fragment.root().text();
            let text = text.trim();
            (!text.is_empty()).then(|| text.to_string())
        });

        Ok(Some(ExtractedArticle { content, title, ..Default::default() }))
    }

    fn autodetect_on_failure(&self) -> bool {
        self.config.should_autodetect()
    }
}

/// Ordered registry of site extractors; the first match wins.
#[derive(Clone, Default)]
pub struct SiteExtractors {
    extractors: Vec<Arc<dyn SiteExtractor>>,
}

impl SiteExtractors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding one [`SiteConfigExtractor`] per config file in `dir`
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let configs = ConfigLoaderBuilder::new().custom_dir(dir).build().load_all()?;
        Ok(Self::from_configs(configs))
    }

    /// Registry over configs that carry a host and at least one body selector
    pub fn from_configs(configs: impl IntoIterator<Item = SiteConfig>) -> Self {
        let mut registry = Self::new();
        for config in configs {
            if config.host.is_some() && config.has_extraction_config() {
                registry.register(SiteConfigExtractor::new(config));
            }
        }
        registry
    }

    pub fn register<E: SiteExtractor + 'static>(&mut self, extractor: E) {
        self.extractors.push(Arc::new(extractor));
    }

    /// First extractor that handles `host`
    pub fn find(&self, host: &str) -> Option<&dyn SiteExtractor> {
        self.extractors.iter().find(|extractor| extractor.matches(host)).map(|extractor| extractor.as_ref())
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}

impl fmt::Debug for SiteExtractors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.extractors.iter().map(|extractor| extractor.name())).finish()
    }
}
