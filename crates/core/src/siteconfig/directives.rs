use crate::error::{DistillError, Result};

/// A single line of a site config file
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Host the config applies to (defaults to the file stem)
    Host(String),

    /// CSS selectors for content extraction
    Title(String),
    Body(String),

    /// Strip directives for removing unwanted elements
    Strip(String),
    StripIdOrClass(String),

    /// Text replacement
    FindString(String),
    ReplaceString(String),

    /// Fall through to the generic stages when the body selectors miss
    AutodetectOnFailure(bool),

    /// Testing
    TestUrl(String),
}

/// Site configuration containing all directives for a host
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SiteConfig {
    pub host: Option<String>,

    /// Extraction selectors (multiple allowed, evaluated in order)
    pub title: Vec<String>,
    pub body: Vec<String>,

    pub strip: Vec<String>,
    pub strip_id_or_class: Vec<String>,

    /// Text replacement (paired)
    pub text_replacements: Vec<(String, String)>,

    pub autodetect_on_failure: Option<bool>,

    pub test_urls: Vec<String>,
}

impl SiteConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directive to this config
    pub fn add_directive(&mut self, directive: Directive) {
        match directive {
            Directive::Host(host) => self.host = Some(host.to_lowercase()),
            Directive::Title(selector) => self.title.push(selector),
            Directive::Body(selector) => self.body.push(selector),
            Directive::Strip(selector) => self.strip.push(selector),
            Directive::StripIdOrClass(pattern) => self.strip_id_or_class.push(pattern),
            Directive::FindString(find) => self.text_replacements.push((find, String::new())),
            Directive::ReplaceString(replace) => match self.text_replacements.last_mut() {
                Some(last) if last.1.is_empty() => last.1 = replace,
                _ => self.text_replacements.push((String::new(), replace)),
            },
            Directive::AutodetectOnFailure(value) => self.autodetect_on_failure = Some(value),
            Directive::TestUrl(url) => self.test_urls.push(url),
        }
    }

    /// Merge another config into this one.
    /// Lists are appended; the host and boolean options are taken from `other` when set.
    pub fn merge(&mut self, other: &SiteConfig) {
        if other.host.is_some() {
            self.host.clone_from(&other.host);
        }
        self.title.extend(other.title.iter().cloned());
        self.body.extend(other.body.iter().cloned());
        self.strip.extend(other.strip.iter().cloned());
        self.strip_id_or_class.extend(other.strip_id_or_class.iter().cloned());
        self.text_replacements.extend(other.text_replacements.iter().cloned());
        if other.autodetect_on_failure.is_some() {
            self.autodetect_on_failure = other.autodetect_on_failure;
        }
        self.test_urls.extend(other.test_urls.iter().cloned());
    }

    /// Whether the generic stages may run when this config finds nothing (default: true)
    pub fn should_autodetect(&self) -> bool {
        self.autodetect_on_failure.unwrap_or(true)
    }

    /// Check if this config can extract anything on its own
    pub fn has_extraction_config(&self) -> bool {
        !self.body.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
            && self.title.is_empty()
            && self.strip.is_empty()
            && self.strip_id_or_class.is_empty()
            && self.text_replacements.is_empty()
    }
}

/// Parse a `directive: value` line
pub fn parse_directive(line: &str) -> Result<Directive> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Err(DistillError::SiteConfigError("Empty or comment line".to_string()));
    }

    let Some((key, value)) = line.split_once(':') else {
        return Err(DistillError::SiteConfigError(format!("Invalid directive format: {line}")));
    };
    let value = value.trim().to_string();

    match key.trim() {
        "host" => Ok(Directive::Host(value)),
        "title" => Ok(Directive::Title(value)),
        "body" => Ok(Directive::Body(value)),
        "strip" => Ok(Directive::Strip(value)),
        "strip_id_or_class" => Ok(Directive::StripIdOrClass(value)),
        "find_string" => Ok(Directive::FindString(value)),
        "replace_string" => Ok(Directive::ReplaceString(value)),
        "autodetect_on_failure" => Ok(Directive::AutodetectOnFailure(parse_boolean(&value)?)),
        "test_url" => Ok(Directive::TestUrl(value)),
        other => Err(DistillError::SiteConfigError(format!("Unknown directive: {other}"))),
    }
}

fn parse_boolean(value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "yes" | "true" | "1" => Ok(true),
        "no" | "false" | "0" => Ok(false),
        _ => Err(DistillError::SiteConfigError(format!("Invalid boolean value: {value}"))),
    }
}
