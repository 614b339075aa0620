pub mod candidates;
pub mod distiller;
pub mod error;
pub mod extractor;
pub mod filter;
pub mod gate;
pub mod metadata;
pub mod parse;
pub mod pipeline;
pub mod preprocess;
pub mod quality;
pub mod readability;
pub mod render;
pub mod rules;
pub mod scoring;
pub mod siteconfig;

#[doc(hidden)]
pub use candidates::{Candidate, CandidateSelection, PruneConfig, find_best_candidate, prune_node};
pub use distiller::{Clipping, Distiller, DistillerBuilder};
pub use error::{DistillError, ExtractorError, FilterError, Result};
pub use extractor::{ArticleExtractor, ExtractedArticle};
pub use filter::{
    TechnicalSignals, apply_rules, cleanup_empty_elements, remove_hidden_elements, should_bypass_deeper_extraction,
};
pub use gate::{GateContext, QualityGate, QualityGateResult, StageThresholds, generate_report};
pub use metadata::Metadata;
pub use parse::{Document, Element};
pub use pipeline::{
    PIPELINE_ERROR_MARKER, PageSource, Pipeline, PipelineConfig, PipelineContent, PipelineResult, PipelineState,
    SourceMetadata, Stage, Stopwatch, TIMEOUT_MARKER,
};
#[doc(hidden)]
pub use preprocess::PreprocessConfig;
pub use preprocess::preprocess_html;
pub use quality::{
    Issue, IssueCategory, IssueKind, ProcessingStats, QualityMetrics, QualityOptions, QualityReport, QualityValidator,
};
pub use readability::{ReadabilityConfig, ReadabilityConfigBuilder, ReadabilityExtractor};
pub use render::{HtmdRenderer, MarkdownRenderer, RenderConfig, frontmatter};
pub use rules::{FilterRule, RuleAction, RuleRegistry, RuleSet, RuleTable, RuleTables};
#[doc(hidden)]
pub use scoring::{
    ScoreConfig, ScoreResult, base_tag_score, calculate_score, class_id_weight, content_density_score, link_density,
};
pub use siteconfig::{
    ConfigLoader, ConfigLoaderBuilder, ConfigParser, Directive, SiteConfig, SiteConfigExtractor, SiteExtractor,
    SiteExtractors,
};
