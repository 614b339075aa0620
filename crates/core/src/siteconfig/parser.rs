use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{DistillError, Result};
use crate::siteconfig::directives::{SiteConfig, parse_directive};

/// Site config file parser
#[derive(Debug)]
pub struct ConfigParser;

impl ConfigParser {
    /// Parse a single site config file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<SiteConfig> {
        let file = std::fs::File::open(&path).map_err(|e| {
            DistillError::SiteConfigError(format!("Cannot open file {}: {}", path.as_ref().display(), e))
        })?;

        Self::parse_reader(BufReader::new(file))
    }

    /// Parse a site config from a reader
    pub fn parse_reader<R: BufRead>(reader: R) -> Result<SiteConfig> {
        let mut config = SiteConfig::new();

        for (index, line) in reader.lines().enumerate() {
            let line_number = index + 1;
            let line =
                line.map_err(|e| DistillError::SiteConfigError(format!("Read error at line {line_number}: {e}")))?;
            Self::parse_line(&mut config, &line, line_number)?;
        }

        Ok(config)
    }

    /// Parse a site config from a string
    pub fn parse_string(content: &str) -> Result<SiteConfig> {
        let mut config = SiteConfig::new();

        for (index, line) in content.lines().enumerate() {
            Self::parse_line(&mut config, line, index + 1)?;
        }

        Ok(config)
    }

    fn parse_line(config: &mut SiteConfig, line: &str, line_number: usize) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let directive = parse_directive(line)
            .map_err(|e| DistillError::SiteConfigError(format!("Parse error at line {line_number}: {e}")))?;
        config.add_directive(directive);
        Ok(())
    }
}
