use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;
use clap::Parser;
use distill_core::{
    ConfigLoader, DistillError, Distiller, PageSource, Pipeline, PipelineConfig, QualityOptions, RenderConfig,
    SiteExtractors, generate_report,
};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;
use url::Url;

mod echo;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Output format for extracted content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Markdown,
    Html,
    Json,
    Report,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "html" => Ok(Self::Html),
            "json" => Ok(Self::Json),
            "report" => Ok(Self::Report),
            _ => Err(format!("Invalid format: {s}. Valid options: markdown, html, json, report")),
        }
    }
}

/// Extract the main content of a saved web page as clean Markdown
#[derive(Parser, Debug)]
#[command(name = "distill")]
#[command(author = "Distill Contributors")]
#[command(version)]
#[command(about = "Extract article content from HTML with per-stage quality gates", long_about = None)]
struct Args {
    /// Local HTML file, or "-" for stdin
    #[arg(value_name = "INPUT")]
    input: String,

    /// URL the page was saved from; resolves relative links and selects site configs
    #[arg(long, value_name = "URL")]
    url: Option<String>,

    /// Output file (default: stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Output format (markdown, html, json, report)
    #[arg(short, long, default_value = "markdown", value_name = "FORMAT")]
    format: OutputFormat,

    /// Pipeline configuration file (JSON); flags below override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Site config directory (default: <config_dir>/distill/sites)
    #[arg(long, value_name = "DIR")]
    sites: Option<PathBuf>,

    /// Skip the semantic container stage
    #[arg(long)]
    no_semantic: bool,

    /// Skip the external extractor stage
    #[arg(long)]
    no_external: bool,

    /// Minimum gate score a stage needs to be accepted (0-100)
    #[arg(long, value_name = "SCORE")]
    min_quality: Option<f64>,

    /// Time budget in milliseconds; 0 disables it
    #[arg(long, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Require every output quality metric to clear the strict floor
    #[arg(long)]
    strict: bool,

    /// Exit with an error when the output quality check fails
    #[arg(long)]
    fail_on_low_quality: bool,

    /// Include TOML frontmatter (Markdown only)
    #[arg(long)]
    frontmatter: bool,

    /// Start the Markdown with the title as a heading
    #[arg(long)]
    title_heading: bool,

    /// Strip images from output
    #[arg(long)]
    no_images: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                PipelineConfig::from_json(&json).with_context(|| format!("Invalid config file: {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if self.no_semantic {
            config.enable_semantic_stage = false;
        }
        if self.no_external {
            config.enable_external_extractor_stage = false;
        }
        if let Some(score) = self.min_quality {
            config.min_quality_score = score;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if self.strict {
            config.strict_quality_mode = true;
        }
        config.debug |= self.verbose;
        Ok(config)
    }

    fn site_extractors(&self) -> anyhow::Result<SiteExtractors> {
        match &self.sites {
            Some(dir) => SiteExtractors::from_dir(dir)
                .with_context(|| format!("Failed to load site configs from {}", dir.display())),
            None => {
                let configs = ConfigLoader::from_default_dir().load_all().context("Failed to load site configs")?;
                Ok(SiteExtractors::from_configs(configs))
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "distill_core=debug" } else { "warn" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).with_target(false).init();
}

fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).context("Failed to read from stdin")?;
        Ok(buffer)
    } else {
        fs::read_to_string(input).with_context(|| format!("Failed to read file: {input}"))
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.verbose {
        echo::print_banner();
        echo::print_info("Debug logging enabled");
        eprintln!();
    }

    if args.verbose {
        let from = if args.input == "-" { "stdin".to_string() } else { format!("file {}", args.input.bright_white()) };
        echo::print_step(1, 4, &format!("Reading from {from}"));
    }
    let html = read_input(&args.input)?;
    if args.verbose {
        echo::print_field("Size", &echo::format_size(html.len()));
        eprintln!();
    }

    let base_url = args
        .url
        .as_deref()
        .map(|url| Url::parse(url).map_err(|e| DistillError::InvalidUrl(format!("{url}: {e}"))))
        .transpose()?;

    if args.verbose {
        echo::print_step(2, 4, "Configuring pipeline");
    }
    let config = args.pipeline_config()?;
    let sites = args.site_extractors()?;
    if args.verbose && !sites.is_empty() {
        echo::print_field("Site configs", &sites.len().to_string());
    }
    let quality = QualityOptions { strict_mode: config.strict_quality_mode, ..Default::default() };
    let pipeline = Pipeline::new(config).context("Invalid pipeline configuration")?.with_site_extractors(sites);

    let render = RenderConfig {
        include_frontmatter: args.frontmatter,
        include_title_heading: args.title_heading,
        strip_images: args.no_images,
    };
    let distiller = Distiller::builder().pipeline(pipeline).render_config(render).quality_options(quality).build()?;

    if args.verbose {
        echo::print_step(3, 4, "Extracting main content");
    }
    let source = PageSource::from_html(&html, base_url).context("Failed to parse HTML")?;
    if args.verbose
        && let Some(title) = &source.title
    {
        echo::print_field("Title", title);
    }

    let clipping = distiller.distill(&source).context("Failed to render Markdown")?;
    if clipping.html.trim().is_empty() {
        return Err(DistillError::NoContent).context("Nothing to extract");
    }

    if args.verbose {
        echo::print_pipeline_summary(&clipping.result);
        echo::print_quality_summary(&clipping);
        echo::print_step(4, 4, "Writing output");
        echo::print_field("Format", &format!("{:?}", args.format));
        eprintln!();
    }

    let output = match args.format {
        OutputFormat::Markdown => clipping.markdown.clone(),
        OutputFormat::Html => clipping.html.clone(),
        OutputFormat::Json => {
            let mut json = serde_json::to_string_pretty(&clipping).context("Failed to serialize result")?;
            json.push('\n');
            json
        }
        OutputFormat::Report => {
            let mut report = match &clipping.result.gate {
                Some(gate) => generate_report(gate),
                None => format!("Pipeline ended early: {}\n", clipping.result.fallbacks_used.join(", ")),
            };
            report.push('\n');
            report.push_str(&clipping.report.to_string());
            report
        }
    };

    match args.output {
        Some(path) => {
            fs::write(&path, output).with_context(|| format!("Failed to write to file: {}", path.display()))?;
            echo::print_success(&format!("Output written to {}", path.display().bright_white()));
        }
        None => print!("{output}"),
    }

    if args.fail_on_low_quality && !clipping.report.passes_threshold {
        anyhow::bail!("Output quality {:.1}/100 is below the threshold", clipping.report.overall_score);
    }

    Ok(())
}
