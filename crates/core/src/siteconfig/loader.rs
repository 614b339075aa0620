use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DistillError, Result};
use crate::siteconfig::directives::SiteConfig;
use crate::siteconfig::parser::ConfigParser;

/// Loads site configs from a custom directory and a standard directory.
///
/// Files in the custom directory win over files of the same name in the
/// standard one.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    custom_dir: Option<PathBuf>,
    standard_dir: Option<PathBuf>,
    cache: HashMap<String, SiteConfig>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loader over the user's config directory (`<config_dir>/distill/sites`)
    pub fn from_default_dir() -> Self {
        let mut builder = ConfigLoaderBuilder::new();
        if let Some(dir) = Self::default_custom_dir() {
            builder = builder.custom_dir(dir);
        }
        builder.build()
    }

    /// Default custom config directory, when the platform has one
    pub fn default_custom_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("distill").join("sites"))
    }

    /// Load configuration for a URL
    pub fn load_for_url(&mut self, url: &str) -> Result<SiteConfig> {
        let url = url::Url::parse(url).map_err(|e| DistillError::InvalidUrl(e.to_string()))?;
        let host = url
            .host_str()
            .ok_or_else(|| DistillError::InvalidUrl("No domain found in URL".to_string()))?;
        self.load_for_domain(host)
    }

    /// Load configuration for a domain, merging every matching file.
    ///
    /// The most specific file is merged last; an `autodetect_on_failure: no`
    /// in a general file stops the search for more specific ones.
    pub fn load_for_domain(&mut self, domain: &str) -> Result<SiteConfig> {
        let domain = domain.to_lowercase();
        if let Some(config) = self.cache.get(&domain) {
            return Ok(config.clone());
        }

        let mut merged = SiteConfig::new();
        for path in self.find_config_files(&domain).iter().rev() {
            match ConfigParser::parse_file(path) {
                Ok(config) => {
                    merged.merge(&config);
                    if merged.autodetect_on_failure == Some(false) {
                        break;
                    }
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping site config"),
            }
        }

        if merged.host.is_none() && !merged.is_empty() {
            merged.host = Some(domain.clone());
        }

        self.cache.insert(domain, merged.clone());
        Ok(merged)
    }

    /// Load every `*.txt` file from both directories.
    ///
    /// A file without a `host:` directive applies to the host named by its
    /// file stem (a leading `.` is ignored). Unparsable files are skipped.
    pub fn load_all(&self) -> Result<Vec<SiteConfig>> {
        let mut configs: Vec<SiteConfig> = Vec::new();
        let mut seen: Vec<String> = Vec::new();

        for dir in [&self.custom_dir, &self.standard_dir].into_iter().flatten() {
            if !dir.is_dir() {
                continue;
            }

            let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "txt"))
                .collect();
            paths.sort();

            for path in paths {
                let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else { continue };
                if seen.iter().any(|name| name == stem) {
                    continue;
                }

                match ConfigParser::parse_file(&path) {
                    Ok(mut config) => {
                        if config.host.is_none() {
                            config.host = Some(stem.trim_start_matches('.').to_lowercase());
                        }
                        seen.push(stem.to_string());
                        configs.push(config);
                    }
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping site config"),
                }
            }
        }

        tracing::debug!(count = configs.len(), "loaded site configs");
        Ok(configs)
    }

    /// Find all config files for a domain in priority order
    fn find_config_files(&self, domain: &str) -> Vec<PathBuf> {
        let names = generate_config_names(domain);
        let mut files = Vec::new();

        for dir in [&self.custom_dir, &self.standard_dir].into_iter().flatten() {
            for name in &names {
                let path = dir.join(name);
                if path.exists() && !files.contains(&path) {
                    files.push(path);
                }
            }
        }

        files
    }

    /// Clear the config cache
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

/// Possible config file names for a domain, most specific first
fn generate_config_names(domain: &str) -> Vec<String> {
    let mut names = vec![format!("{domain}.txt")];

    if let Some(without_www) = domain.strip_prefix("www.") {
        names.push(format!("{without_www}.txt"));
    }

    names.push(format!(".{domain}.txt"));
    if let Some(without_www) = domain.strip_prefix("www.") {
        names.push(format!(".{without_www}.txt"));
    }

    let parts: Vec<&str> = domain.split('.').collect();
    for i in 1..parts.len().saturating_sub(1) {
        let parent = parts[i..].join(".");
        if parent.contains('.') {
            names.push(format!("{parent}.txt"));
            names.push(format!(".{parent}.txt"));
        }
    }

    names.dedup();
    names
}

/// Whether a config written for `pattern` applies to `host`.
///
/// Matches the exact host, the host without `www.`, and any subdomain of the
/// pattern.
pub fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_start_matches('.').to_lowercase();
    let host = host.to_lowercase();
    let host = host.as_str();
    if pattern.is_empty() {
        return false;
    }

    let bare = host.strip_prefix("www.").unwrap_or(host);
    let bare_pattern = pattern.strip_prefix("www.").unwrap_or(&pattern);

    host == pattern || bare == bare_pattern || host.ends_with(&format!(".{bare_pattern}"))
}

/// Builder for ConfigLoader
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    custom_dir: Option<PathBuf>,
    standard_dir: Option<PathBuf>,
}

impl ConfigLoaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom config directory
    pub fn custom_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.custom_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set standard config directory
    pub fn standard_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.standard_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> ConfigLoader {
        ConfigLoader { custom_dir: self.custom_dir, standard_dir: self.standard_dir, cache: HashMap::new() }
    }
}
