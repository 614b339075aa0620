use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("distill")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Distill Contributors")
        .about("Extract article content from HTML with per-stage quality gates")
        .arg(clap::arg!(<INPUT> "Local HTML file, or '-' for stdin"))
        .arg(clap::arg!(--url <URL> "URL the page was saved from").value_name("URL"))
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            clap::arg!(-f --format <FORMAT> "Output format (markdown, html, json, report)")
                .value_name("FORMAT")
                .default_value("markdown")
                .value_parser(["markdown", "html", "json", "report"]),
        )
        .arg(
            clap::arg!(-c --config <FILE> "Pipeline configuration file (JSON)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            clap::arg!(--sites <DIR> "Site config directory")
                .value_name("DIR")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--"no-semantic" "Skip the semantic container stage"))
        .arg(clap::arg!(--"no-external" "Skip the external extractor stage"))
        .arg(clap::arg!(--"min-quality" <SCORE> "Minimum gate score a stage needs to be accepted"))
        .arg(clap::arg!(--"timeout-ms" <MS> "Time budget in milliseconds; 0 disables it"))
        .arg(clap::arg!(--strict "Require every output quality metric to clear the strict floor"))
        .arg(clap::arg!(--"fail-on-low-quality" "Exit with an error when the output quality check fails"))
        .arg(clap::arg!(--frontmatter "Include TOML frontmatter (Markdown only)"))
        .arg(clap::arg!(--"title-heading" "Start the Markdown with the title as a heading"))
        .arg(clap::arg!(--"no-images" "Strip images from output"))
        .arg(clap::arg!(-v --verbose "Enable debug logging"));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "distill", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "distill", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "distill", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "distill", &completions_dir).unwrap();

    println!("cargo:warning=Shell completions generated in: {}", completions_dir.display());
}
