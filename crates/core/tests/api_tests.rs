//! Library API integration tests
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use distill_core::*;
use rstest::rstest;

fn scenario_page() -> String {
    format!(
        "<html><body><nav><a href=\"/\">Home</a> <a href=\"/about\">About</a></nav>\
         <article><h1>T</h1><p>{}</p></article><footer>Copyright and legal links</footer></body></html>",
        "word ".repeat(200)
    )
}

fn div_page() -> String {
    format!(
        "<html><head><title>Div Page</title></head><body>\
         <div class=\"menu\"><a href=\"/\">Home</a></div>\
         <div class=\"post-body\"><h2>Notes</h2><p>{}</p><p>{}</p></div></body></html>",
        "Plain prose in a div, with commas, and more. ".repeat(12),
        "A second paragraph follows the first one here. ".repeat(10)
    )
}

fn encyclopedia_page() -> String {
    let prose = "Rust is a general-purpose language that emphasizes performance and memory safety. ".repeat(6);
    format!(
        "<html><body><article><h1>Rust (programming language)</h1><p>{prose}</p>\
         <h2>History (early years)</h2><p>{prose}</p><h2>Usage</h2><p>{prose}</p>\
         <h2>Examples</h2><p>{prose}</p><pre>fn</pre></article></body></html>"
    )
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn nothing(_: Document) -> std::result::Result<Option<ExtractedArticle>, ExtractorError> {
    Ok(None)
}

fn deeply_nested(depth: usize) -> String {
    format!("<html><body>{}<p>leaf text</p>{}</body></html>", "<div>".repeat(depth), "</div>".repeat(depth))
}

#[test]
fn test_scenario_safe_rules_scoring_and_gate() {
    init_tracing();
    let mut doc = Document::parse(&scenario_page()).unwrap();
    let errors = apply_rules(&mut doc, &RuleSet::safe());
    assert!(errors.is_empty());

    let text = doc.text_content();
    assert!(!text.contains("Home"));
    assert!(!text.contains("Copyright"));
    assert!(text.contains("word word"));

    let body = doc.body().unwrap();
    let selection = find_best_candidate(&body, &ScoreConfig::default());
    let best = selection.candidate.unwrap();
    assert_eq!(best.breakdown.tag_name, "article");

    let article = doc.element(best.node).unwrap().outer_html();
    let gate = QualityGate::default().validate(Stage::Semantic, Some(&article), &GateContext::default());
    assert!(gate.passed);
    assert!(gate.score >= 60.0);
}

#[test]
fn test_scenario_bare_code_page_skips_external_stage() {
    let source = PageSource::from_html("<pre><code>def f(): pass</code></pre>", None).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let result = pipeline.execute(&source);

    assert!(result.bypassed_deeper_extraction);
    assert_eq!(result.stage, Stage::Heuristic);
    assert!(!result.fallbacks_used.iter().any(|marker| marker.starts_with("external-extractor")));
    assert_eq!(result.content.as_str(), "<pre><code>def f(): pass</code></pre>");
}

#[test]
fn test_scenario_extractor_returning_nothing() {
    let source = PageSource::from_html(&div_page(), None).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap().with_extractor(nothing);
    let result = pipeline.execute(&source);

    assert_eq!(result.stage, Stage::Heuristic);
    assert!(result.fallbacks_used.contains(&Stage::ExternalExtractor.fallback_marker()));
}

#[test]
fn test_scenario_timeout_before_any_stage() {
    let source = PageSource::from_html(&scenario_page(), None).unwrap();
    let pipeline = Pipeline::new(PipelineConfig { timeout_ms: 50, ..Default::default() }).unwrap();
    let result = pipeline.execute_with(&source, Stopwatch::started_ago(Duration::from_secs(5)));

    assert_eq!(result.stage, Stage::Heuristic);
    assert_eq!(result.quality_score, 0.0);
    assert!(result.fallbacks_used.iter().any(|marker| marker == TIMEOUT_MARKER));
    assert_eq!(result.content.as_str(), source.document.body_html());
}

#[test]
fn test_pipeline_keeps_spaces_from_empty_inline_elements() {
    init_tracing();
    let html = format!(
        "<html><body><article><h1>Greeting</h1><p>Hello<span> </span>world and more. {}</p></article></body></html>",
        "word ".repeat(200)
    );
    let source = PageSource::from_html(&html, None).unwrap();
    let result = Pipeline::new(PipelineConfig::default()).unwrap().execute(&source);

    assert_eq!(result.stage, Stage::Semantic);
    assert!(result.content.as_str().contains("Hello world and more"));
    assert!(!result.content.as_str().contains("Helloworld"));
}

#[test]
fn test_prose_page_with_reference_style_headings_is_not_bypassed() {
    init_tracing();
    let source = PageSource::from_html(&encyclopedia_page(), None).unwrap();
    let result = Pipeline::new(PipelineConfig::default()).unwrap().execute(&source);

    assert!(!result.bypassed_deeper_extraction);
    assert_eq!(result.stage, Stage::Semantic);
}

#[test]
fn test_safe_rules_idempotent_on_pages() {
    for html in [scenario_page(), div_page()] {
        let mut doc = Document::parse(&html).unwrap();
        apply_rules(&mut doc, &RuleSet::safe());
        let once = doc.as_string();
        apply_rules(&mut doc, &RuleSet::safe());
        assert_eq!(doc.as_string(), once);
    }
}

#[test]
fn test_gate_monotonicity() {
    let gate = QualityGate::default();
    let output = "<h2>Section</h2><p>Some text, with commas, and a full sentence.</p>".repeat(4);

    for stage in [Stage::SiteSpecific, Stage::Semantic, Stage::ExternalExtractor] {
        let result = gate.validate(stage, Some(&output), &GateContext::default());
        let threshold = gate.thresholds.threshold_for(stage).unwrap();
        assert_eq!(result.passed, result.score >= threshold);

        let stricter = QualityGate::new(StageThresholds {
            site_specific: threshold + 10.0,
            semantic: threshold + 10.0,
            external_extractor: threshold + 10.0,
        });
        let strict_result = stricter.validate(stage, Some(&output), &GateContext::default());
        assert_eq!(strict_result.score, result.score);
        assert!(!strict_result.passed || result.passed);
    }
}

#[rstest]
#[case::empty("")]
#[case::single_text_node("just some text")]
#[case::deeply_nested(&deeply_nested(400))]
#[case::only_chrome("<nav><a href=\"/\">Home</a></nav><footer>f</footer>")]
fn test_orchestrator_totality(#[case] html: &str) {
    let source = PageSource::from_html(html, None).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let result = pipeline.execute(&source);

    assert!(Stage::ORDER.contains(&result.stage));
    assert!((0.0..=100.0).contains(&result.quality_score));
    assert!(!result.source_metadata.captured_at.is_empty());
}

#[test]
fn test_fallback_markers_follow_stage_order() {
    let source = PageSource::from_html(&div_page(), None).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap().with_extractor(nothing);
    let result = pipeline.execute(&source);

    let positions: Vec<usize> = result
        .fallbacks_used
        .iter()
        .filter_map(|marker| Stage::ORDER.iter().position(|stage| &stage.fallback_marker() == marker))
        .collect();
    assert_eq!(positions, vec![1, 2]);
    assert!(!result.fallbacks_used.contains(&result.stage.fallback_marker()));
}

#[test]
fn test_scoring_is_deterministic() {
    let doc = Document::parse(&div_page()).unwrap();
    let config = ScoreConfig::default();
    let first = find_best_candidate(&doc.root(), &config);

    for _ in 0..3 {
        assert_eq!(find_best_candidate(&doc.root(), &config), first);
    }

    let source = PageSource::from_html(&div_page(), None).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let a = pipeline.execute(&source);
    let b = pipeline.execute(&source);
    assert_eq!(a.content, b.content);
    assert_eq!(a.quality_score, b.quality_score);
}

#[rstest]
#[case::article(scenario_page())]
#[case::divs(div_page())]
#[case::empty(String::new())]
#[case::markup_only("<div><span></span></div>".to_string())]
fn test_output_metrics_are_bounded(#[case] html: String) {
    let distiller = Distiller::builder().build().unwrap();
    let source = PageSource::from_html(&html, None).unwrap();
    let clipping = distiller.distill(&source).unwrap();
    let report = &clipping.report;

    assert!((0.0..=100.0).contains(&report.overall_score));
    for value in [
        report.metrics.content_preservation,
        report.metrics.structure_integrity,
        report.metrics.output_format_quality,
        report.metrics.readability,
        report.metrics.completeness,
    ] {
        assert!((0.0..=100.0).contains(&value));
    }
    assert!(report.issues.iter().all(|issue| (1..=10).contains(&issue.severity)));
}

#[test]
fn test_concurrent_requests_share_pipeline() {
    let rules = Arc::new(RuleRegistry::default());
    let pipeline =
        Arc::new(Pipeline::new(PipelineConfig::default()).unwrap().with_rules(Arc::clone(&rules)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let pipeline = Arc::clone(&pipeline);
            let rules = Arc::clone(&rules);
            thread::spawn(move || {
                if i % 2 == 0 {
                    rules.add_custom_rule(RuleTable::Safe, FilterRule::remove("promo", ".promo"));
                }
                let html = if i % 3 == 0 { scenario_page() } else { div_page() };
                let source = PageSource::from_html(&html, None).unwrap();
                pipeline.execute(&source)
            })
        })
        .collect();

    for handle in handles {
        let result = handle.join().unwrap();
        assert!(!result.is_degraded());
        assert!(!result.content.as_str().is_empty());
    }
    assert_eq!(rules.snapshot().safe.version(), 1 + 4);
}

#[test]
fn test_custom_rule_applies_to_later_requests() {
    let html = format!(
        "<html><body><article><h1>Title</h1><div class=\"promo\">Buy now</div><p>{}</p></article></body></html>",
        "Prose sentence here. ".repeat(40)
    );
    let source = PageSource::from_html(&html, None).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();

    assert!(pipeline.execute(&source).content.as_str().contains("Buy now"));

    pipeline.rules().add_custom_rule(RuleTable::Safe, FilterRule::remove("promo", ".promo"));
    assert!(!pipeline.execute(&source).content.as_str().contains("Buy now"));
}

#[test]
fn test_site_config_directory_drives_site_stage() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    std::fs::write(
        temp_dir.path().join("news.example.com.txt"),
        "title: h1.headline\nbody: div.story\nstrip: .ad\n",
    )
    .unwrap();

    let html = format!(
        "<html><body><h1 class=\"headline\">Headline</h1><div class=\"story\"><h2>Lead</h2><p>{}</p>\
         <div class=\"ad\">Advert</div><p>{}</p></div></body></html>",
        "Reported facts, with sources, in order. ".repeat(10),
        "Further reporting fills out the story here. ".repeat(8)
    );
    let url = url::Url::parse("https://news.example.com/story/1").unwrap();
    let source = PageSource::from_html(&html, Some(url)).unwrap();

    let sites = SiteExtractors::from_dir(temp_dir.path()).unwrap();
    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap().with_site_extractors(sites);
    let result = pipeline.execute(&source);

    assert_eq!(result.stage, Stage::SiteSpecific);
    assert!(result.fallbacks_used.is_empty());
    assert!(!result.content.as_str().contains("Advert"));
    assert_eq!(result.source_metadata.url.as_deref(), Some("https://news.example.com/story/1"));
}

#[test]
fn test_distill_result_serializes() {
    let source = PageSource::from_html(&scenario_page(), None).unwrap();
    let clipping = Distiller::builder().build().unwrap().distill(&source).unwrap();
    let json = serde_json::to_value(&clipping).unwrap();

    assert_eq!(json["result"]["stage"], "semantic");
    assert_eq!(json["result"]["content"]["kind"], "rendered");
    assert!(json["report"]["overall_score"].is_number());
    assert!(json["markdown"].as_str().unwrap().contains("word word"));
}
