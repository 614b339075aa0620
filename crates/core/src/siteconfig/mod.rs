pub mod directives;
pub mod extractor;
pub mod loader;
pub mod parser;

pub use directives::{Directive, SiteConfig};
pub use extractor::{SiteConfigExtractor, SiteExtractor, SiteExtractors};
pub use loader::{ConfigLoader, ConfigLoaderBuilder, host_matches};
pub use parser::ConfigParser;
