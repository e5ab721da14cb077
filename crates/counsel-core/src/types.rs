use std::fmt;
use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// ── Case Input ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CaseType {
    #[default]
    #[serde(rename = "IP", alias = "ip", alias = "Intellectual Property")]
    Ip,
    #[serde(alias = "contract")]
    Contract,
    #[serde(alias = "corporate")]
    Corporate,
    #[serde(alias = "antitrust")]
    Antitrust,
    #[serde(alias = "employment")]
    Employment,
    #[serde(alias = "regulatory")]
    Regulatory,
    #[serde(alias = "other")]
    Other,
}

impl CaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ip => "IP",
            Self::Contract => "Contract",
            Self::Corporate => "Corporate",
            Self::Antitrust => "Antitrust",
            Self::Employment => "Employment",
            Self::Regulatory => "Regulatory",
            Self::Other => "Other",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Ip => "Intellectual Property",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for CaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Low,
    #[default]
    #[serde(alias = "standard")]
    Medium,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A case submitted for analysis. Never mutated once the pipeline starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseInput {
    pub case_name: String,
    pub complaint_text: String,
    #[serde(default)]
    pub case_type: CaseType,
    #[serde(default)]
    pub urgency: Urgency,
    #[serde(default)]
    pub additional_context: Option<String>,
}

impl CaseInput {
    pub fn new(case_name: impl Into<String>, complaint_text: impl Into<String>) -> Self {
        Self {
            case_name: case_name.into(),
            complaint_text: complaint_text.into(),
            case_type: CaseType::default(),
            urgency: Urgency::default(),
            additional_context: None,
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.case_name.trim().is_empty() {
            return Err(PipelineError::InvalidInput("case_name is empty".into()));
        }
        if self.complaint_text.trim().is_empty() {
            return Err(PipelineError::InvalidInput("complaint_text is empty".into()));
        }
        Ok(())
    }
}

/// Facts pulled out of the complaint once per report and shared by every
/// section prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseBrief {
    pub parties: Vec<String>,
    pub key_issues: Vec<String>,
}

// ── Personas & Report Plans ──────────────────────────────────────────────

/// A fixed expert profile injected into section prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub role_title: String,
    pub expertise_description: String,
    pub communication_style: String,
    /// Named analytical frameworks, in the order the persona applies them.
    pub frameworks: Vec<String>,
    /// Default minimum length, in words, of sections this persona writes.
    pub min_word_count: usize,
}

/// One section of the report and how it is judged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpec {
    pub id: String,
    pub title: String,
    pub persona_id: String,
    pub instruction: String,
    /// Elements a complete section must mention. May be empty.
    pub required_elements: Vec<String>,
    /// Terminology expected in a grounded section. Empty falls back to a
    /// generic list in the validator.
    pub domain_terms: Vec<String>,
    pub ordering_index: usize,
    /// Overrides the persona's `min_word_count` when set.
    pub min_words: Option<usize>,
}

impl SectionSpec {
    /// Copy of this section with the minimum length filled in from the persona
    /// when the section does not set one itself.
    pub fn with_default_min_words(&self, persona_min: usize) -> Self {
        let mut spec = self.clone();
        if spec.min_words.is_none() {
            spec.min_words = Some(persona_min);
        }
        spec
    }
}

/// The ordered set of sections a report is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPlan {
    pub name: String,
    pub label: String,
    pub sections: Vec<SectionSpec>,
}

impl ReportPlan {
    pub fn get_section(&self, id: &str) -> Option<&SectionSpec> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// Sections sorted by `ordering_index`.
    pub fn ordered(&self) -> Vec<&SectionSpec> {
        let mut sections: Vec<&SectionSpec> = self.sections.iter().collect();
        sections.sort_by_key(|s| s.ordering_index);
        sections
    }
}

// ── Usage & Quality ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl TokenUsage {
    pub fn new(input: u64, output: u64) -> Self {
        Self { input, output }
    }

    pub fn total(&self) -> u64 {
        self.input + self.output
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self { input: self.input + rhs.input, output: self.output + rhs.output }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    pub coherence: f64,
    pub groundedness: f64,
    pub completeness: f64,
    pub structure: f64,
}

impl QualityBreakdown {
    /// Dimensions as (name, score) pairs, in fixed order.
    pub fn dimensions(&self) -> [(&'static str, f64); 4] {
        [
            ("coherence", self.coherence),
            ("groundedness", self.groundedness),
            ("completeness", self.completeness),
            ("structure", self.structure),
        ]
    }
}

/// Validator verdict for one piece of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    #[serde(flatten)]
    pub breakdown: QualityBreakdown,
    pub overall: f64,
    pub passed: bool,
    /// Correction hints for the weakest dimensions, lowest score first.
    pub feedback: Vec<String>,
}

impl QualityScore {
    pub fn feedback_text(&self) -> String {
        self.feedback.join("\n")
    }
}

// ── Generation & Report ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SectionState {
    Pending,
    Generating,
    Validating,
    Retrying,
    Accepted,
    Degraded,
}

impl SectionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted | Self::Degraded)
    }
}

impl fmt::Display for SectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Generating => "GENERATING",
            Self::Validating => "VALIDATING",
            Self::Retrying => "RETRYING",
            Self::Accepted => "ACCEPTED",
            Self::Degraded => "DEGRADED",
        };
        f.write_str(s)
    }
}

/// One model call made for a section. Superseded attempts are kept with
/// `accepted = false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    pub section_id: String,
    /// Starts at 1 for every section.
    pub attempt_number: u32,
    pub prompt_text: String,
    pub raw_output: Option<String>,
    /// Provider error, when the call failed.
    pub error: Option<String>,
    pub usage: TokenUsage,
    pub cost: f64,
    pub latency_ms: u64,
    /// Backoff waited before this call was made.
    pub waited_ms: u64,
    /// Absent when the provider call failed.
    pub quality: Option<QualityScore>,
    /// Cleared the quality gate.
    pub passed: bool,
    /// Final attempt for its section. Exactly one per section.
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub section_id: String,
    pub title: String,
    pub persona_id: String,
    pub state: SectionState,
    pub text: String,
    pub quality: QualityBreakdown,
    /// Zero for degraded sections.
    pub overall: f64,
    pub attempts: u32,
    pub usage: TokenUsage,
    pub cost: f64,
    pub latency_ms: u64,
    pub degraded_reason: Option<String>,
    /// Length floor the gate applied, after persona defaults.
    #[serde(default)]
    pub min_words: Option<usize>,
}

impl ReportSection {
    pub fn is_degraded(&self) -> bool {
        self.state == SectionState::Degraded
    }
}

/// Final text of the sections resolved so far, in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardContext {
    entries: Vec<ContextEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextEntry {
    pub section_id: String,
    pub title: String,
    pub text: String,
}

impl ForwardContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, section_id: &str, title: &str, text: &str) {
        self.entries.push(ContextEntry {
            section_id: section_id.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Section texts in order, without headings.
    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }

    /// Full join of every entry under its title.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("### {}\n{}", e.title, e.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub model: String,
    pub plan: String,
    pub total_usage: TokenUsage,
    pub total_cost: f64,
    pub total_latency_ms: u64,
    /// Mean of section scores, degraded sections counted as 0.
    pub overall_quality: f64,
    pub degraded_sections: usize,
    pub total_attempts: usize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub case_name: String,
    pub case_type: CaseType,
    pub urgency: Urgency,
    pub brief: CaseBrief,
    pub executive_summary: String,
    pub sections: Vec<ReportSection>,
    pub attempts: Vec<GenerationAttempt>,
    pub metadata: ReportMetadata,
}

impl Report {
    pub fn section(&self, id: &str) -> Option<&ReportSection> {
        self.sections.iter().find(|s| s.section_id == id)
    }

    pub fn attempts_for<'a>(&'a self, section_id: &'a str) -> impl Iterator<Item = &'a GenerationAttempt> + 'a {
        self.attempts.iter().filter(move |a| a.section_id == section_id)
    }
}

/// Outcome of re-scoring a finished report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportValidation {
    pub overall: f64,
    pub passed: bool,
    pub section_scores: Vec<SectionValidation>,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionValidation {
    pub section_id: String,
    pub title: String,
    pub overall: f64,
    pub passed: bool,
    pub degraded: bool,
}

// ── Events ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Section {
        case_name: String,
        section: String,
        state: SectionState,
        message: String,
    },
    Attempt {
        case_name: String,
        section: String,
        attempt: u32,
        overall: Option<f64>,
        message: String,
    },
    Report {
        case_name: String,
        overall_quality: f64,
        message: String,
    },
    Alert {
        case_name: String,
        message: String,
    },
}

impl PipelineEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Section { .. } => "section",
            Self::Attempt { .. } => "attempt",
            Self::Report { .. } => "report",
            Self::Alert { .. } => "alert",
        }
    }

    pub fn section(&self) -> Option<&str> {
        match self {
            Self::Section { section, .. } | Self::Attempt { section, .. } => Some(section),
            Self::Report { .. } | Self::Alert { .. } => None,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Section { message, .. }
            | Self::Attempt { message, .. }
            | Self::Report { message, .. }
            | Self::Alert { message, .. } => message,
        }
    }
}
