use distill_core::{Clipping, PipelineResult};
use owo_colors::OwoColorize;

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Distill".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Layered article extraction with quality gates\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{step}/{total}]").dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print a labelled value
pub fn print_field(label: &str, value: &str) {
    eprintln!("  {} {}", format!("{label}:").dimmed(), value.bright_white());
}

/// Print timing information with color coding
pub fn print_timing(label: &str, ms: u64) {
    let label = format!("{label}:");
    if ms < 50 {
        eprintln!("  {} {:>8}ms ({})", label.dimmed(), ms, "fast".dimmed());
    } else if ms < 100 {
        eprintln!("  {} {:>8}ms ({})", label.dimmed(), ms, "moderate".bright_yellow());
    } else {
        eprintln!("  {} {:>8}ms ({})", label.dimmed(), ms, "slow".bright_red());
    }
}

/// Print which stage won and how it got there
pub fn print_pipeline_summary(result: &PipelineResult) {
    eprintln!("\n{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Extraction Details".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());

    print_field("Stage", result.stage.name());
    print_field("Gate score", &format!("{:.1}", result.quality_score));
    if !result.fallbacks_used.is_empty() {
        print_field("Fallbacks", &result.fallbacks_used.join(", "));
    }
    if result.bypassed_deeper_extraction {
        print_field("Technical page", "external extractor skipped");
    }
    if !result.filter_errors.is_empty() {
        print_field("Rule errors", &result.filter_errors.len().to_string());
    }
    print_timing("Extraction", result.extraction_time_ms);
    eprintln!();
}

/// Print the output quality verdict
pub fn print_quality_summary(clipping: &Clipping) {
    let report = &clipping.report;
    let score = format!("{:.1}/100", report.overall_score);

    if report.passes_threshold {
        print_success(&format!("Output quality {score}"));
    } else {
        print_warning(&format!("Output quality {score} is below the threshold"));
        for recommendation in &report.recommendations {
            eprintln!("    {} {}", "-".dimmed(), recommendation.dimmed());
        }
    }
}

/// Format file size for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
