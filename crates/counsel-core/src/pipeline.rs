use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

pub use crate::types::PipelineEvent;

use crate::{
    agent::{GenerateRequest, Sampling},
    case,
    client::{Call, ModelClient},
    error::{ConfigError, PipelineError, ProviderError},
    instruction::build_prompt,
    registry::PersonaRegistry,
    types::{
        CaseBrief, CaseInput, ForwardContext, GenerationAttempt, Persona, QualityScore, Report,
        ReportMetadata, ReportPlan, ReportSection, SectionSpec, SectionState, TokenUsage,
    },
    validator::QualityValidator,
};

/// Drives one report at a time through the plan's sections, in order.
///
/// Holds only shared read-only state, so a single pipeline can serve any
/// number of concurrent reports.
pub struct ReportPipeline {
    client: ModelClient,
    registry: Arc<PersonaRegistry>,
    plan: Arc<ReportPlan>,
    validator: QualityValidator,
    sampling: Sampling,
    event_tx: broadcast::Sender<PipelineEvent>,
}

/// Everything one section produced.
struct SectionRun {
    section: ReportSection,
    attempts: Vec<GenerationAttempt>,
    any_success: bool,
    provider_error: Option<ProviderError>,
}

/// How the attempt loop for a section ended.
enum Resolution {
    Accepted { text: String, score: QualityScore },
    Degraded { reason: String, last_score: Option<QualityScore> },
}

impl ReportPipeline {
    pub fn new(
        client: ModelClient,
        registry: Arc<PersonaRegistry>,
        plan: Arc<ReportPlan>,
        validator: QualityValidator,
        sampling: Sampling,
    ) -> Result<(Self, broadcast::Receiver<PipelineEvent>), ConfigError> {
        registry.validate_plan(&plan)?;
        let (tx, rx) = broadcast::channel(256);
        let p = Self { client, registry, plan, validator, sampling, event_tx: tx };
        Ok((p, rx))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    /// Lets other components publish onto the same event stream.
    pub fn event_sender(&self) -> broadcast::Sender<PipelineEvent> {
        self.event_tx.clone()
    }

    pub fn plan(&self) -> &ReportPlan {
        &self.plan
    }

    pub fn registry(&self) -> &PersonaRegistry {
        &self.registry
    }

    pub fn validator(&self) -> &QualityValidator {
        &self.validator
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    /// Generates every section and assembles the report.
    ///
    /// Sections that never clear the quality gate are degraded, not
    /// errors. Only configuration problems and a provider that never
    /// answered a single call abort the request.
    pub async fn generate_report(&self, case: &CaseInput) -> Result<Report, PipelineError> {
        case.validate()?;
        self.registry.validate_plan(&self.plan)?;

        let started = Instant::now();
        let brief = case::brief(case);
        info!(
            case = %case.case_name,
            case_type = %case.case_type,
            urgency = %case.urgency,
            plan = %self.plan.name,
            "starting report"
        );

        let mut context = ForwardContext::new();
        let mut sections = Vec::with_capacity(self.plan.sections.len());
        let mut attempts = Vec::new();
        let mut any_success = false;
        let mut last_provider_error: Option<ProviderError> = None;

        for spec in self.plan.ordered() {
            let persona = self.registry.resolve(spec)?;
            let run = self.run_section(case, &brief, spec, persona, &context).await;

            any_success |= run.any_success;
            if run.provider_error.is_some() {
                last_provider_error = run.provider_error;
            }
            context.push(&run.section.section_id, &run.section.title, &run.section.text);
            sections.push(run.section);
            attempts.extend(run.attempts);
        }

        if !any_success {
            if let Some(e) = last_provider_error {
                error!(case = %case.case_name, "no section reached the model provider: {e}");
                return Err(PipelineError::ProviderUnavailable { last_error: e.to_string() });
            }
        }

        let report = self.assemble(case, brief, sections, attempts, started.elapsed().as_millis() as u64);
        info!(
            case = %report.case_name,
            overall_quality = report.metadata.overall_quality,
            degraded = report.metadata.degraded_sections,
            tokens = report.metadata.total_usage.total(),
            cost = report.metadata.total_cost,
            elapsed_ms = report.metadata.total_latency_ms,
            "report complete"
        );
        self.emit(PipelineEvent::Report {
            case_name: report.case_name.clone(),
            overall_quality: report.metadata.overall_quality,
            message: format!(
                "{} sections, {} degraded, quality {:.2}",
                report.sections.len(),
                report.metadata.degraded_sections,
                report.metadata.overall_quality
            ),
        });
        Ok(report)
    }

    // ── Section state machine ─────────────────────────────────────────────

    async fn run_section(
        &self,
        case: &CaseInput,
        brief: &CaseBrief,
        spec: &SectionSpec,
        persona: &Persona,
        context: &ForwardContext,
    ) -> SectionRun {
        let started = Instant::now();
        let spec = spec.with_default_min_words(persona.min_word_count);
        let mut budget = self.client.retry().budget();
        let mut attempts: Vec<GenerationAttempt> = Vec::new();
        let mut feedback: Option<String> = None;
        let mut any_success = false;
        let mut provider_error: Option<ProviderError> = None;
        let mut last_score: Option<QualityScore> = None;

        let resolution = loop {
            self.transition(case, &spec, SectionState::Generating, budget.used() + 1);
            let prompt = build_prompt(persona, &spec, case, brief, context, feedback.as_deref());
            let request = GenerateRequest { prompt, sampling: self.sampling };
            let outcome = self
                .client
                .generate(&request, &mut budget)
                .instrument(info_span!("section", section = %spec.id))
                .await;
            let terminal_error = outcome.last_error().cloned();

            let mut passed: Option<(String, QualityScore)> = None;
            for call in outcome.calls {
                match &call.result {
                    Ok(_) => any_success = true,
                    Err(e) => provider_error = Some(e.clone()),
                }
                let attempt = self.record_call(case, &spec, &request.prompt, call);
                if let Some(score) = &attempt.quality {
                    if score.passed {
                        passed = Some((attempt.raw_output.clone().unwrap_or_default(), score.clone()));
                    }
                    last_score = Some(score.clone());
                }
                attempts.push(attempt);
            }

            if let Some((text, score)) = passed {
                break Resolution::Accepted { text, score };
            }
            // The client only ends on an error when it was fatal or the
            // budget ran out, so there is nothing left to retry.
            if let Some(e) = terminal_error {
                break Resolution::Degraded {
                    reason: format!("provider error after {} attempts: {e}", budget.used()),
                    last_score: last_score.clone(),
                };
            }
            if budget.is_exhausted() {
                let overall = last_score.as_ref().map_or(0.0, |s| s.overall);
                break Resolution::Degraded {
                    reason: format!(
                        "quality {:.2} below threshold {:.2} after {} attempts",
                        overall,
                        self.validator.threshold(),
                        budget.used()
                    ),
                    last_score: last_score.clone(),
                };
            }

            let score = last_score.as_ref();
            feedback = score.map(QualityScore::feedback_text);
            warn!(
                section = %spec.id,
                attempt = budget.used(),
                overall = score.map_or(0.0, |s| s.overall),
                coherence = score.map_or(0.0, |s| s.breakdown.coherence),
                groundedness = score.map_or(0.0, |s| s.breakdown.groundedness),
                completeness = score.map_or(0.0, |s| s.breakdown.completeness),
                structure = score.map_or(0.0, |s| s.breakdown.structure),
                "section below quality gate, retrying with feedback"
            );
            self.transition(case, &spec, SectionState::Retrying, budget.used());
        };

        if let Some(last) = attempts.last_mut() {
            last.accepted = true;
        }
        let usage = attempts.iter().fold(TokenUsage::default(), |acc, a| acc + a.usage);
        let cost = attempts.iter().map(|a| a.cost).sum();
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let section = match resolution {
            Resolution::Accepted { text, score } => {
                info!(
                    section = %spec.id,
                    attempt = budget.used(),
                    overall = score.overall,
                    elapsed_ms,
                    "section accepted"
                );
                self.transition(case, &spec, SectionState::Accepted, budget.used());
                ReportSection {
                    section_id: spec.id.clone(),
                    title: spec.title.clone(),
                    persona_id: persona.id.clone(),
                    state: SectionState::Accepted,
                    text,
                    quality: score.breakdown,
                    overall: score.overall,
                    attempts: budget.used(),
                    usage,
                    cost,
                    latency_ms: elapsed_ms,
                    degraded_reason: None,
                    min_words: spec.min_words,
                }
            }
            Resolution::Degraded { reason, last_score } => {
                let breakdown = last_score.as_ref().map(|s| s.breakdown).unwrap_or_default();
                error!(
                    section = %spec.id,
                    attempt = budget.used(),
                    coherence = breakdown.coherence,
                    groundedness = breakdown.groundedness,
                    completeness = breakdown.completeness,
                    structure = breakdown.structure,
                    elapsed_ms,
                    "section degraded: {reason}"
                );
                self.transition(case, &spec, SectionState::Degraded, budget.used());
                ReportSection {
                    section_id: spec.id.clone(),
                    title: spec.title.clone(),
                    persona_id: persona.id.clone(),
                    state: SectionState::Degraded,
                    text: degraded_placeholder(&spec.title, &reason),
                    quality: breakdown,
                    overall: 0.0,
                    attempts: budget.used(),
                    usage,
                    cost,
                    latency_ms: elapsed_ms,
                    degraded_reason: Some(reason),
                    min_words: spec.min_words,
                }
            }
        };

        SectionRun { section, attempts, any_success, provider_error }
    }

    /// Turns one provider call into a recorded attempt, scoring the text
    /// when the call succeeded.
    fn record_call(&self, case: &CaseInput, spec: &SectionSpec, prompt: &str, call: Call) -> GenerationAttempt {
        let mut attempt = GenerationAttempt {
            section_id: spec.id.clone(),
            attempt_number: call.attempt,
            prompt_text: prompt.to_string(),
            raw_output: None,
            error: None,
            usage: TokenUsage::default(),
            cost: 0.0,
            latency_ms: call.latency.as_millis() as u64,
            waited_ms: call.waited.as_millis() as u64,
            quality: None,
            passed: false,
            accepted: false,
        };
        match call.result {
            Ok(generation) => {
                self.transition(case, spec, SectionState::Validating, call.attempt);
                let score = self.validator.score(&generation.text, spec);
                attempt.cost = self.client.cost(generation.usage);
                attempt.usage = generation.usage;
                attempt.passed = score.passed;
                self.emit(PipelineEvent::Attempt {
                    case_name: case.case_name.clone(),
                    section: spec.id.clone(),
                    attempt: call.attempt,
                    overall: Some(score.overall),
                    message: format!("scored {:.2}", score.overall),
                });
                attempt.raw_output = Some(generation.text);
                attempt.quality = Some(score);
            }
            Err(e) => {
                self.emit(PipelineEvent::Attempt {
                    case_name: case.case_name.clone(),
                    section: spec.id.clone(),
                    attempt: call.attempt,
                    overall: None,
                    message: e.to_string(),
                });
                attempt.error = Some(e.to_string());
            }
        }
        attempt
    }

    // ── Report assembly ───────────────────────────────────────────────────

    fn assemble(
        &self,
        case: &CaseInput,
        brief: CaseBrief,
        sections: Vec<ReportSection>,
        attempts: Vec<GenerationAttempt>,
        total_latency_ms: u64,
    ) -> Report {
        let total_usage = attempts.iter().fold(TokenUsage::default(), |acc, a| acc + a.usage);
        let total_cost = attempts.iter().map(|a| a.cost).sum();
        let overall_quality = mean_quality(&sections);
        let degraded_sections = sections.iter().filter(|s| s.is_degraded()).count();
        let executive_summary = executive_summary(case, &brief, &sections, overall_quality);
        Report {
            case_name: case.case_name.clone(),
            case_type: case.case_type,
            urgency: case.urgency,
            brief,
            executive_summary,
            metadata: ReportMetadata {
                model: self.client.model().to_string(),
                plan: self.plan.name.clone(),
                total_usage,
                total_cost,
                total_latency_ms,
                overall_quality,
                degraded_sections,
                total_attempts: attempts.len(),
                generated_at: Utc::now(),
            },
            sections,
            attempts,
        }
    }

    fn transition(&self, case: &CaseInput, spec: &SectionSpec, state: SectionState, attempt: u32) {
        self.emit(PipelineEvent::Section {
            case_name: case.case_name.clone(),
            section: spec.id.clone(),
            state,
            message: format!("{} attempt {attempt}: {state}", spec.title),
        });
    }

    fn emit(&self, event: PipelineEvent) {
        let _ = self.event_tx.send(event);
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Mean section score with degraded sections counted as zero.
pub fn mean_quality(sections: &[ReportSection]) -> f64 {
    if sections.is_empty() {
        return 0.0;
    }
    sections.iter().map(|s| if s.is_degraded() { 0.0 } else { s.overall }).sum::<f64>() / sections.len() as f64
}

pub fn degraded_placeholder(title: &str, reason: &str) -> String {
    format!(
        "[DEGRADED SECTION: {title}] This section could not be generated to the required quality \
         standard ({reason}). It contains no analysis and must be reviewed manually."
    )
}

const SUMMARY_MIN_PARAGRAPH: usize = 50;
const SUMMARY_EXCERPT_CHARS: usize = 200;

/// First substantive paragraph of every non-degraded section, followed by
/// overall confidence, issue count and urgency.
pub fn executive_summary(case: &CaseInput, brief: &CaseBrief, sections: &[ReportSection], overall: f64) -> String {
    let mut s = format!("EXECUTIVE SUMMARY - {}\n{}\n\n", case.case_name, "=".repeat(50));
    for section in sections.iter().filter(|s| !s.is_degraded()) {
        let paragraph = section
            .text
            .split("\n\n")
            .map(str::trim)
            .find(|p| p.chars().count() > SUMMARY_MIN_PARAGRAPH);
        if let Some(p) = paragraph {
            let excerpt: String = p.chars().take(SUMMARY_EXCERPT_CHARS).collect();
            s.push_str(&format!("{}:\n{}...\n\n", section.title, excerpt));
        }
    }
    s.push_str(&format!("Overall Confidence: {:.1}%\n", overall * 100.0));
    s.push_str(&format!("Key Issues Identified: {}\n", brief.key_issues.len()));
    s.push_str(&format!("Urgency Level: {}\n", case.urgency));
    s
}
