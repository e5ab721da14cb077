use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use counsel_core::{
    agent::{GenerateRequest, Generation, ModelBackend, Sampling},
    client::{ModelClient, Pricing, RetryPolicy},
    error::{ConfigError, PipelineError, ProviderError},
    pipeline::{mean_quality, PipelineEvent, ReportPipeline},
    registry::PersonaRegistry,
    types::{CaseInput, Persona, ReportPlan, SectionSpec, SectionState, TokenUsage},
    validator::QualityValidator,
};
use tokio::sync::broadcast;
use tracing_test::traced_test;

// ── helpers ──────────────────────────────────────────────────────────────────

const GOOD_BODY: &str = "First, the complaint alleges patent infringement of claim 1 by the accused product. Based on the claim chart, each element of the claim appears in the product, which indicates a strong literal infringement position. However, the defendant will argue that the patent is invalid because prior art anticipates the claimed method.

Second, the damages exposure is significant. According to the sales figures, the accused product generated substantial revenue, and the evidence suggests a reasonable royalty between three and five percent. Furthermore, willful infringement could support enhanced damages given that the defendant received notice in early 2023.

Key findings:
- Infringement is likely on claim 1.
- Validity faces a moderate prior art challenge.
- Damages may exceed ten million dollars.

Therefore, the plaintiff holds the stronger position. Moreover, the defendant's design-around options appear limited due to the breadth of the independent claims. Consequently, early settlement discussions are worth pursuing.

In conclusion, liability risk for the defendant is high, damages exposure is material, and the recommended strategy is to pursue a preliminary injunction while preparing for trial.";

const POOR_TEXT: &str = "This case is about many things. Generally speaking it is bad.";

const SECTIONS: [(&str, &str); 6] = [
    ("liability", "Liability Assessment"),
    ("validity", "Patent Validity"),
    ("damages", "Damages Exposure"),
    ("market", "Market Impact"),
    ("risk", "Risk Matrix"),
    ("strategy", "Strategic Recommendations"),
];

#[derive(Clone, Copy, Debug)]
enum Reply {
    Good,
    Poor,
    Transient,
    Fatal,
}

/// Answers from a queue of scripted replies, then with `fallback`. Good
/// replies carry the section title so every section's text is distinct.
struct ScriptedBackend {
    queue: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(script: &[Reply]) -> Arc<Self> {
        Self::with_fallback(script, Reply::Good)
    }

    fn with_fallback(script: &[Reply], fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            queue: Mutex::new(script.iter().copied().collect()),
            fallback,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

fn title_of(prompt: &str) -> String {
    prompt
        .split("TASK: Write the ")
        .nth(1)
        .and_then(|rest| rest.split(" section for").next())
        .unwrap_or("Untitled")
        .to_string()
}

fn good_text(title: &str) -> String {
    format!("## {title}\n\n{GOOD_BODY}")
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "test-model"
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<Generation, ProviderError> {
        self.prompts.lock().unwrap().push(request.prompt.clone());
        let reply = self.queue.lock().unwrap().pop_front().unwrap_or(self.fallback);
        let usage = TokenUsage::new(100, 400);
        match reply {
            Reply::Good => Ok(Generation { text: good_text(&title_of(&request.prompt)), usage }),
            Reply::Poor => Ok(Generation { text: POOR_TEXT.into(), usage }),
            Reply::Transient => Err(ProviderError::Transient { message: "503 overloaded".into(), status: Some(503) }),
            Reply::Fatal => Err(ProviderError::Fatal { message: "401 bad credentials".into(), status: Some(401) }),
        }
    }
}

fn persona(id: &str) -> Persona {
    Persona {
        id: id.into(),
        role_title: "senior patent litigator".into(),
        expertise_description: "Patent infringement, validity and damages.".into(),
        communication_style: "Precise.".into(),
        frameworks: vec!["Claim-by-claim analysis".into()],
        min_word_count: 120,
    }
}

fn section(index: usize, id: &str, title: &str, persona_id: &str) -> SectionSpec {
    SectionSpec {
        id: id.into(),
        title: title.into(),
        persona_id: persona_id.into(),
        instruction: format!("Write the {title}."),
        required_elements: vec!["liability".into(), "damages".into()],
        domain_terms: vec!["infringement".into(), "patent".into(), "claim".into(), "prior art".into()],
        ordering_index: index,
        min_words: None,
    }
}

/// Six sections stored out of order; `ordering_index` decides the run order.
fn plan() -> ReportPlan {
    let mut sections: Vec<SectionSpec> = SECTIONS
        .iter()
        .enumerate()
        .map(|(i, (id, title))| section(i, id, title, if i % 2 == 0 { "litigator" } else { "analyst" }))
        .collect();
    sections.reverse();
    ReportPlan { name: "test_plan".into(), label: "Test Plan".into(), sections }
}

fn registry() -> Arc<PersonaRegistry> {
    Arc::new(PersonaRegistry::new(vec![persona("litigator"), persona("analyst")]).unwrap())
}

fn build(backend: Arc<ScriptedBackend>, retry: RetryPolicy) -> (ReportPipeline, broadcast::Receiver<PipelineEvent>) {
    let client = ModelClient::new(backend, retry, Pricing::default());
    ReportPipeline::new(client, registry(), Arc::new(plan()), QualityValidator::default(), Sampling::default())
        .unwrap()
}

fn case() -> CaseInput {
    CaseInput::new(
        "Acme Corp v. Widget Co",
        "Acme Corp, plaintiff, alleges that Widget Co, defendant, infringes its patent on \
         wireless charging by selling the Widget Pad.",
    )
}

fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(e) = rx.try_recv() {
        events.push(e);
    }
    events
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_six_sections_accepted_in_order() {
    let backend = ScriptedBackend::new(&[]);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let report = pipeline.generate_report(&case()).await.unwrap();

    let ids: Vec<&str> = report.sections.iter().map(|s| s.section_id.as_str()).collect();
    assert_eq!(ids, SECTIONS.iter().map(|(id, _)| *id).collect::<Vec<_>>());
    for s in &report.sections {
        assert_eq!(s.state, SectionState::Accepted);
        assert_eq!(s.attempts, 1);
        assert!(s.overall >= 0.70, "{} scored {}", s.section_id, s.overall);
        assert!(s.text.starts_with(&format!("## {}", s.title)));
    }
    assert!(report.attempts.iter().all(|a| a.passed && a.accepted));

    let meta = &report.metadata;
    assert_eq!(meta.total_attempts, 6);
    assert_eq!(meta.degraded_sections, 0);
    assert_eq!(meta.total_usage, TokenUsage::new(600, 2400));
    // 0.1 * 0.00025 + 0.4 * 0.00125 per call
    assert!((meta.total_cost - 6.0 * 0.000525).abs() < 1e-12);
    assert_eq!(meta.model, "test-model");
    assert_eq!(meta.plan, "test_plan");
    assert!((meta.overall_quality - mean_quality(&report.sections)).abs() < 1e-12);
    assert_eq!(backend.prompts().len(), 6);
}

#[tokio::test]
async fn test_forward_context_holds_exactly_prior_sections() {
    let backend = ScriptedBackend::new(&[]);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let report = pipeline.generate_report(&case()).await.unwrap();
    let prompts = backend.prompts();

    assert!(!prompts[0].contains("PREVIOUS SECTIONS OF THIS REPORT"));
    for (k, prompt) in prompts.iter().enumerate() {
        let mut last_pos = 0;
        for (j, prior) in report.sections.iter().enumerate() {
            let entry = format!("### {}\n{}", prior.title, prior.text);
            let found = prompt.find(&entry);
            if j < k {
                let pos = found.unwrap_or_else(|| panic!("prompt {k} is missing section {j}"));
                assert!(pos >= last_pos, "prompt {k} lists section {j} out of order");
                last_pos = pos;
            } else {
                assert!(found.is_none(), "prompt {k} leaks section {j}");
            }
        }
    }
}

#[tokio::test]
async fn test_concurrent_reports_share_one_pipeline() {
    let backend = ScriptedBackend::new(&[]);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let first = case();
    let mut second = case();
    second.case_name = "Beta LLC v. Gamma Inc".into();

    let (a, b) = tokio::join!(pipeline.generate_report(&first), pipeline.generate_report(&second));
    assert_eq!(a.unwrap().sections.len(), 6);
    assert_eq!(b.unwrap().case_name, "Beta LLC v. Gamma Inc");
    assert_eq!(backend.prompts().len(), 12);
}

// =============================================================================
// Quality gate
// =============================================================================

#[tokio::test]
async fn test_revalidation_matches_gate_scores() {
    let personas = vec![
        Persona { min_word_count: 200, ..persona("litigator") },
        Persona { min_word_count: 200, ..persona("analyst") },
    ];
    let client = ModelClient::new(ScriptedBackend::new(&[]), RetryPolicy::immediate(3), Pricing::default());
    let (pipeline, _rx) = ReportPipeline::new(
        client,
        Arc::new(PersonaRegistry::new(personas).unwrap()),
        Arc::new(plan()),
        QualityValidator::default(),
        Sampling::default(),
    )
    .unwrap();

    let report = pipeline.generate_report(&case()).await.unwrap();
    let validation = pipeline.validator().validate_report(&report, pipeline.plan());

    assert_eq!(validation.section_scores.len(), 6);
    for (section, rescored) in report.sections.iter().zip(&validation.section_scores) {
        assert_eq!(section.min_words, Some(200));
        // The persona floor is above the text length, so the gate score sits below 1.
        assert!(section.overall < 1.0, "{}: {}", section.section_id, section.overall);
        assert_eq!(rescored.overall, section.overall, "{}", section.section_id);
    }
    assert_eq!(validation.overall, report.metadata.overall_quality);
}

#[tokio::test]
async fn test_quality_retry_adds_feedback_and_keeps_only_final_text() {
    let backend = ScriptedBackend::new(&[Reply::Poor, Reply::Good]);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let report = pipeline.generate_report(&case()).await.unwrap();
    let prompts = backend.prompts();

    let first = &report.sections[0];
    assert_eq!(first.state, SectionState::Accepted);
    assert_eq!(first.attempts, 2);

    let attempts: Vec<_> = report.attempts_for("liability").collect();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0].attempt_number, 1);
    assert!(!attempts[0].passed && !attempts[0].accepted);
    assert_eq!(attempts[0].raw_output.as_deref(), Some(POOR_TEXT));
    assert!(attempts[1].passed && attempts[1].accepted);

    assert!(!prompts[0].contains("CORRECTION REQUIRED"));
    assert!(prompts[1].contains("CORRECTION REQUIRED"));
    assert!(prompts[1].contains("- coherence low"));
    assert!(prompts[1..].iter().all(|p| !p.contains(POOR_TEXT)));
    assert_eq!(report.metadata.total_attempts, 7);
}

#[tokio::test]
async fn test_degraded_section_counts_as_zero() {
    let backend = ScriptedBackend::new(&[Reply::Good, Reply::Good, Reply::Poor, Reply::Poor, Reply::Poor]);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let report = pipeline.generate_report(&case()).await.unwrap();

    let damages = report.section("damages").unwrap();
    assert!(damages.is_degraded());
    assert_eq!(damages.overall, 0.0);
    assert_eq!(damages.attempts, 3);
    assert!(damages.text.starts_with("[DEGRADED SECTION: Damages Exposure]"));
    assert!(damages.degraded_reason.as_deref().unwrap().contains("below threshold"));
    assert!(damages.quality.coherence > 0.0);

    let attempts: Vec<_> = report.attempts_for("damages").collect();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| !a.passed));
    assert_eq!(attempts.iter().filter(|a| a.accepted).count(), 1);
    assert!(attempts[2].accepted);

    let others: f64 = report.sections.iter().filter(|s| !s.is_degraded()).map(|s| s.overall).sum();
    assert!((report.metadata.overall_quality - others / 6.0).abs() < 1e-12);
    assert_eq!(report.metadata.degraded_sections, 1);

    // The placeholder still flows forward; the rejected drafts never do.
    let prompts = backend.prompts();
    let market_prompt = prompts.iter().find(|p| title_of(p) == "Market Impact").unwrap();
    assert!(market_prompt.contains("[DEGRADED SECTION: Damages Exposure]"));
    assert!(!market_prompt.contains(POOR_TEXT));
    assert!(!report.executive_summary.contains("Damages Exposure:"));
}

#[tokio::test]
#[traced_test]
async fn test_degradation_is_logged_with_section() {
    let backend = ScriptedBackend::new(&[Reply::Poor, Reply::Poor, Reply::Poor]);
    let (pipeline, _rx) = build(backend, RetryPolicy::immediate(3));
    pipeline.generate_report(&case()).await.unwrap();
    assert!(logs_contain("section below quality gate"));
    assert!(logs_contain("section degraded"));
    assert!(logs_contain("section=liability"));
}

// =============================================================================
// Provider failures
// =============================================================================

#[tokio::test]
#[traced_test]
async fn test_provider_errors_are_logged_with_section_and_timing() {
    let backend = ScriptedBackend::new(&[Reply::Transient, Reply::Good, Reply::Fatal]);
    let (pipeline, _rx) = build(backend, RetryPolicy::immediate(3));
    pipeline.generate_report(&case()).await.unwrap();

    logs_assert(|lines: &[&str]| {
        let find = |needle: &str| lines.iter().find(|l| l.contains(needle)).copied();
        let transient = find("transient model error").ok_or("no transient error logged")?;
        let fatal = find("fatal model error").ok_or("no fatal error logged")?;
        for (line, section) in [(transient, "section=liability"), (fatal, "section=validity")] {
            for field in [section, "attempt=1", "latency_ms=", "elapsed_ms="] {
                if !line.contains(field) {
                    return Err(format!("missing {field} in {line}"));
                }
            }
        }
        Ok(())
    });
}

#[tokio::test(start_paused = true)]
async fn test_transient_errors_back_off_then_succeed() {
    let backend = ScriptedBackend::new(&[Reply::Transient, Reply::Transient, Reply::Good]);
    let (pipeline, _rx) = build(backend, RetryPolicy::default());
    let started = tokio::time::Instant::now();
    let report = pipeline.generate_report(&case()).await.unwrap();

    let attempts: Vec<_> = report.attempts_for("liability").collect();
    assert_eq!(attempts.iter().map(|a| a.waited_ms).collect::<Vec<_>>(), vec![0, 1000, 2000]);
    assert!(attempts[0].error.as_deref().unwrap().contains("503"));
    assert!(attempts[0].quality.is_none());
    assert!(attempts[2].passed && attempts[2].accepted);
    assert_eq!(report.sections[0].state, SectionState::Accepted);
    assert_eq!(report.sections[0].attempts, 3);
    assert_eq!(report.sections[0].usage, TokenUsage::new(100, 400));
    assert!(started.elapsed() >= std::time::Duration::from_secs(3));
}

#[tokio::test]
async fn test_fatal_error_degrades_without_retry() {
    let backend = ScriptedBackend::new(&[Reply::Fatal]);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let report = pipeline.generate_report(&case()).await.unwrap();

    let first = &report.sections[0];
    assert!(first.is_degraded());
    assert_eq!(first.attempts, 1);
    assert!(first.degraded_reason.as_deref().unwrap().contains("bad credentials"));
    assert_eq!(report.sections.iter().filter(|s| s.is_degraded()).count(), 1);
    assert_eq!(backend.prompts().len(), 6);
}

#[tokio::test]
async fn test_provider_down_is_an_error() {
    let backend = ScriptedBackend::with_fallback(&[], Reply::Transient);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let err = pipeline.generate_report(&case()).await.unwrap_err();

    match err {
        PipelineError::ProviderUnavailable { last_error } => assert!(last_error.contains("503")),
        other => panic!("expected ProviderUnavailable, got {other:?}"),
    }
    assert_eq!(backend.prompts().len(), 18);
}

#[tokio::test]
async fn test_low_quality_everywhere_still_returns_report() {
    let backend = ScriptedBackend::with_fallback(&[], Reply::Poor);
    let (pipeline, _rx) = build(backend, RetryPolicy::immediate(2));
    let report = pipeline.generate_report(&case()).await.unwrap();
    assert_eq!(report.metadata.degraded_sections, 6);
    assert_eq!(report.metadata.overall_quality, 0.0);
    assert_eq!(report.metadata.total_attempts, 12);
}

// =============================================================================
// Configuration and input
// =============================================================================

#[test]
fn test_unknown_persona_rejected_at_construction() {
    let mut bad = plan();
    bad.sections[0].persona_id = "ghost".into();
    let client = ModelClient::new(ScriptedBackend::new(&[]), RetryPolicy::immediate(1), Pricing::default());
    let err = ReportPipeline::new(client, registry(), Arc::new(bad), QualityValidator::default(), Sampling::default())
        .err()
        .unwrap();
    assert!(matches!(err, ConfigError::UnknownPersona { ref persona, .. } if persona == "ghost"));
}

#[tokio::test]
async fn test_empty_complaint_rejected_before_any_call() {
    let backend = ScriptedBackend::new(&[]);
    let (pipeline, _rx) = build(backend.clone(), RetryPolicy::immediate(3));
    let err = pipeline.generate_report(&CaseInput::new("Acme", "   ")).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));
    assert!(backend.prompts().is_empty());
}

// =============================================================================
// Events and summary
// =============================================================================

#[tokio::test]
async fn test_events_follow_section_lifecycle() {
    let backend = ScriptedBackend::new(&[Reply::Poor]);
    let (pipeline, mut rx) = build(backend, RetryPolicy::immediate(3));
    pipeline.generate_report(&case()).await.unwrap();
    let events = drain(&mut rx);

    let states: Vec<SectionState> = events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::Section { section, state, .. } if section == "liability" => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            SectionState::Generating,
            SectionState::Validating,
            SectionState::Retrying,
            SectionState::Generating,
            SectionState::Validating,
            SectionState::Accepted,
        ]
    );
    assert_eq!(events.iter().filter(|e| e.kind() == "attempt").count(), 7);
    assert!(matches!(events.last(), Some(PipelineEvent::Report { .. })));
}

#[tokio::test]
async fn test_executive_summary_lists_sections_and_urgency() {
    let backend = ScriptedBackend::new(&[]);
    let (pipeline, _rx) = build(backend, RetryPolicy::immediate(3));
    let report = pipeline.generate_report(&case()).await.unwrap();
    let summary = &report.executive_summary;

    assert!(summary.starts_with("EXECUTIVE SUMMARY - Acme Corp v. Widget Co"));
    for (_, title) in SECTIONS {
        assert!(summary.contains(&format!("{title}:\n")), "summary missing {title}");
    }
    assert!(summary.contains("Overall Confidence: "));
    assert!(summary.contains(&format!("Key Issues Identified: {}", report.brief.key_issues.len())));
    assert!(summary.contains("Urgency Level: medium"));
}
