//! Heuristic quality scoring for generated sections.
//!
//! Every function here is a pure function of the text and its section definition.
//! Each sub-signal is clamped to `[0, 1]` before it is weighted, so every
//! dimension and the overall score stay in `[0, 1]`.

use std::collections::HashSet;

use crate::types::{
    QualityBreakdown, QualityScore, Report, ReportPlan, ReportValidation, SectionSpec,
    SectionValidation,
};

pub const DEFAULT_THRESHOLD: f64 = 0.70;
pub const DEFAULT_MIN_WORDS: usize = 150;

pub const WEIGHT_COHERENCE: f64 = 0.30;
pub const WEIGHT_GROUNDEDNESS: f64 = 0.30;
pub const WEIGHT_COMPLETENESS: f64 = 0.25;
pub const WEIGHT_STRUCTURE: f64 = 0.15;

const CONNECTORS: &[&str] = &[
    "therefore", "however", "furthermore", "moreover", "consequently", "additionally",
    "nevertheless", "in addition", "as a result", "accordingly", "thus", "hence", "meanwhile",
    "conversely",
];

const STRUCTURE_MARKERS: &[&str] = &[
    "first", "second", "third", "finally", "next", "in conclusion", "to summarize", "in summary",
];

const REASONING_MARKERS: &[&str] = &[
    "based on", "because", "due to", "as a result", "evidence suggests", "analysis shows",
    "according to", "demonstrates", "indicates", "supported by", "given that",
];

const CONCLUSION_MARKERS: &[&str] = &[
    "in conclusion", "in summary", "to summarize", "conclusion", "summary", "therefore", "overall",
];

const FILLER_PHRASES: &[&str] = &[
    "it is important to note", "it should be noted", "needless to say", "it goes without saying",
    "at the end of the day", "in today's world", "as we all know", "generally speaking",
    "various factors", "many things",
];

const GENERIC_TERMS: &[&str] = &["analysis", "assessment", "conclusion"];

/// Prose range for average sentence length, in words.
const SENTENCE_LEN_MIN: f64 = 12.0;
const SENTENCE_LEN_MAX: f64 = 30.0;
/// Below this many words coherence is scaled down proportionally.
const SHORT_TEXT_WORDS: usize = 40;
/// Coefficient of variation of sentence length that earns full credit.
const TARGET_LENGTH_CV: f64 = 0.35;
const FILLER_PENALTY: f64 = 0.05;
const FILLER_PENALTY_CAP: f64 = 0.25;

fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 {
        0.0
    } else {
        clamp01(n as f64 / d as f64)
    }
}

// ── Text features ────────────────────────────────────────────────────────

/// Normalised view of a text: lowercase words separated by single spaces,
/// plus sentence and paragraph boundaries.
#[derive(Debug, Clone)]
pub struct TextFeatures {
    normalized: String,
    pub word_count: usize,
    pub paragraphs: Vec<String>,
    /// Word count of every sentence with at least three words.
    pub sentence_lengths: Vec<usize>,
    pub lines: Vec<String>,
}

fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let joined = mapped.split_whitespace().collect::<Vec<_>>().join(" ");
    format!(" {joined} ")
}

fn split_sentences(line: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            sentences.push(std::mem::take(&mut current));
        }
    }
    if !current.trim().is_empty() {
        sentences.push(current);
    }
    sentences
}

impl TextFeatures {
    pub fn new(text: &str) -> Self {
        let normalized = normalize(text);
        let word_count = normalized.split_whitespace().count();

        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                if !current.is_empty() {
                    paragraphs.push(current.join("\n"));
                    current.clear();
                }
            } else {
                current.push(line.trim());
            }
        }
        if !current.is_empty() {
            paragraphs.push(current.join("\n"));
        }

        let lines: Vec<String> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        let sentence_lengths = lines
            .iter()
            .flat_map(|l| split_sentences(l))
            .map(|s| s.split_whitespace().filter(|w| w.chars().any(char::is_alphanumeric)).count())
            .filter(|&n| n >= 3)
            .collect();

        Self { normalized, word_count, paragraphs, sentence_lengths, lines }
    }

    /// True when `phrase` occurs at a word start. A trailing plural `s` on
    /// the phrase is optional, so "claims" also matches "claim".
    pub fn mentions(&self, phrase: &str) -> bool {
        let needle = normalize(phrase);
        let needle = needle.trim_end();
        if needle.trim().is_empty() {
            return false;
        }
        if self.normalized.contains(needle) {
            return true;
        }
        match needle.strip_suffix('s') {
            Some(stem) if stem.trim().len() >= 3 => self.normalized.contains(stem),
            _ => false,
        }
    }

    fn count_mentions(&self, phrases: &[&str]) -> usize {
        phrases.iter().filter(|p| self.mentions(p)).count()
    }

    pub fn average_sentence_length(&self) -> f64 {
        if self.sentence_lengths.is_empty() {
            return 0.0;
        }
        self.sentence_lengths.iter().sum::<usize>() as f64 / self.sentence_lengths.len() as f64
    }

    /// Coefficient of variation of sentence length; 0 below three sentences.
    pub fn sentence_length_cv(&self) -> f64 {
        let n = self.sentence_lengths.len();
        if n < 3 {
            return 0.0;
        }
        let mean = self.average_sentence_length();
        if mean == 0.0 {
            return 0.0;
        }
        let var = self
            .sentence_lengths
            .iter()
            .map(|&l| (l as f64 - mean).powi(2))
            .sum::<f64>()
            / n as f64;
        var.sqrt() / mean
    }

    fn numbered_lines(&self) -> usize {
        self.lines.iter().filter(|l| is_numbered(l)).count()
    }
}

fn is_numbered(line: &str) -> bool {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    digits > 0 && matches!(line[digits..].chars().next(), Some('.') | Some(')'))
}

fn is_header(line: &str) -> bool {
    if line.starts_with('#') {
        return true;
    }
    if line.starts_with("**") && line.ends_with("**") && line.len() > 4 {
        return true;
    }
    let words = line.split_whitespace().count();
    if line.ends_with(':') && words <= 8 {
        return true;
    }
    let letters: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 4 && words <= 8 && letters.iter().all(|c| c.is_uppercase())
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("- ") || line.starts_with("* ") || line.starts_with("• ") || is_numbered(line)
}

// ── Dimensions ───────────────────────────────────────────────────────────

/// Paragraphing, connectors, prose sentence length, depth and ordering
/// markers. Texts under forty words are scaled down.
pub fn coherence(f: &TextFeatures) -> f64 {
    let paragraphs = clamp01((f.paragraphs.len() as f64 - 1.0) / 3.0);
    let connectors = ratio(f.count_mentions(CONNECTORS), 4);

    let avg = f.average_sentence_length();
    let sentence_len = if avg == 0.0 {
        0.0
    } else if avg < SENTENCE_LEN_MIN {
        clamp01(avg / SENTENCE_LEN_MIN)
    } else if avg > SENTENCE_LEN_MAX {
        clamp01(SENTENCE_LEN_MAX / avg)
    } else {
        1.0
    };

    let depth = ratio(f.sentence_lengths.len(), 8);
    let markers = ratio(f.count_mentions(STRUCTURE_MARKERS) + f.numbered_lines().min(3), 3);

    let raw = 0.25 * paragraphs + 0.25 * connectors + 0.20 * sentence_len + 0.15 * depth + 0.15 * markers;
    let short_penalty = ratio(f.word_count, SHORT_TEXT_WORDS);
    clamp01(raw * short_penalty)
}

fn terms_for(spec: &SectionSpec) -> Vec<&str> {
    if spec.domain_terms.is_empty() {
        GENERIC_TERMS.to_vec()
    } else {
        spec.domain_terms.iter().map(String::as_str).collect()
    }
}

/// Terms from `spec` (or the generic list) that the text does not mention.
pub fn missing_terms<'a>(f: &TextFeatures, spec: &'a SectionSpec) -> Vec<&'a str> {
    if spec.domain_terms.is_empty() {
        return GENERIC_TERMS.iter().copied().filter(|t| !f.mentions(t)).collect();
    }
    spec.domain_terms.iter().map(String::as_str).filter(|t| !f.mentions(t)).collect()
}

pub fn missing_elements<'a>(f: &TextFeatures, spec: &'a SectionSpec) -> Vec<&'a str> {
    spec.required_elements.iter().map(String::as_str).filter(|e| !f.mentions(e)).collect()
}

/// Domain terminology, reasoning markers and required elements, minus a
/// penalty for filler phrasing.
pub fn groundedness(f: &TextFeatures, spec: &SectionSpec) -> f64 {
    let terms = terms_for(spec);
    let target = terms.len().div_ceil(2).max(1);
    let term_signal = ratio(f.count_mentions(&terms), target);
    let reasoning = ratio(f.count_mentions(REASONING_MARKERS), 4);

    let raw = if spec.required_elements.is_empty() {
        (0.40 * term_signal + 0.30 * reasoning) / 0.70
    } else {
        let present = spec.required_elements.len() - missing_elements(f, spec).len();
        let elements = ratio(present, spec.required_elements.len());
        0.40 * term_signal + 0.30 * reasoning + 0.30 * elements
    };

    let filler = (f.count_mentions(FILLER_PHRASES) as f64 * FILLER_PENALTY).min(FILLER_PENALTY_CAP);
    clamp01(clamp01(raw) - filler)
}

pub fn min_words(spec: &SectionSpec) -> usize {
    spec.min_words.unwrap_or(DEFAULT_MIN_WORDS).max(1)
}

/// Mean of element coverage and length adequacy. Without required
/// elements only length adequacy counts.
pub fn completeness(f: &TextFeatures, spec: &SectionSpec) -> f64 {
    let length = ratio(f.word_count, min_words(spec));
    if spec.required_elements.is_empty() {
        return length;
    }
    let present = spec.required_elements.len() - missing_elements(f, spec).len();
    let coverage = ratio(present, spec.required_elements.len());
    clamp01((coverage + length) / 2.0)
}

fn conclusion_signal(f: &TextFeatures) -> f64 {
    let Some(last) = f.paragraphs.last() else {
        return 0.0;
    };
    let last = TextFeatures::new(last);
    if last.count_mentions(CONCLUSION_MARKERS) > 0 {
        1.0
    } else if f.count_mentions(CONCLUSION_MARKERS) > 0 {
        0.5
    } else {
        0.0
    }
}

/// Headers or list markers, sentence-length variation and a closing
/// conclusion.
pub fn structure(f: &TextFeatures) -> f64 {
    let marked = f.lines.iter().filter(|l| is_header(l) || is_list_item(l)).count();
    let markers = ratio(marked, 3);
    let variation = clamp01(f.sentence_length_cv() / TARGET_LENGTH_CV);
    clamp01(0.35 * markers + 0.35 * variation + 0.30 * conclusion_signal(f))
}

pub fn combine(b: &QualityBreakdown) -> f64 {
    clamp01(
        WEIGHT_COHERENCE * b.coherence
            + WEIGHT_GROUNDEDNESS * b.groundedness
            + WEIGHT_COMPLETENESS * b.completeness
            + WEIGHT_STRUCTURE * b.structure,
    )
}

// ── Validator ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityValidator {
    threshold: f64,
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self { threshold: DEFAULT_THRESHOLD }
    }
}

impl QualityValidator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn score(&self, text: &str, spec: &SectionSpec) -> QualityScore {
        let f = TextFeatures::new(text);
        let breakdown = QualityBreakdown {
            coherence: coherence(&f),
            groundedness: groundedness(&f, spec),
            completeness: completeness(&f, spec),
            structure: structure(&f),
        };
        let overall = combine(&breakdown);
        let passed = overall >= self.threshold;
        let feedback = if passed { Vec::new() } else { self.feedback(&f, spec, &breakdown) };
        QualityScore { breakdown, overall, passed, feedback }
    }

    /// Hints for every dimension under the threshold, lowest first. When
    /// none is individually under it, the single weakest dimension.
    fn feedback(&self, f: &TextFeatures, spec: &SectionSpec, b: &QualityBreakdown) -> Vec<String> {
        let mut dims = b.dimensions().to_vec();
        dims.sort_by(|x, y| x.1.total_cmp(&y.1));
        let weak: Vec<_> = dims.iter().filter(|(_, s)| *s < self.threshold).copied().collect();
        let chosen = if weak.is_empty() { dims[..1].to_vec() } else { weak };
        chosen
            .into_iter()
            .map(|(name, score)| dimension_hint(name, score, f, spec))
            .collect()
    }

    /// Re-scores every section of a finished report against `plan`, using
    /// the length floor each section was gated with. Degraded sections count
    /// as zero.
    pub fn validate_report(&self, report: &Report, plan: &ReportPlan) -> ReportValidation {
        let mut section_scores = Vec::with_capacity(report.sections.len());
        let mut issues = Vec::new();
        let mut weak_dims: Vec<(f64, String)> = Vec::new();

        for section in &report.sections {
            if section.is_degraded() {
                issues.push(format!(
                    "{}: degraded ({})",
                    section.title,
                    section.degraded_reason.as_deref().unwrap_or("no reason recorded")
                ));
                section_scores.push(SectionValidation {
                    section_id: section.section_id.clone(),
                    title: section.title.clone(),
                    overall: 0.0,
                    passed: false,
                    degraded: true,
                });
                continue;
            }

            let mut spec = plan
                .get_section(&section.section_id)
                .cloned()
                .unwrap_or_else(|| generic_spec(&section.section_id, &section.title));
            if section.min_words.is_some() {
                spec.min_words = section.min_words;
            }
            let score = self.score(&section.text, &spec);
            if !score.passed {
                issues.extend(score.feedback.iter().map(|fb| format!("{}: {fb}", section.title)));
            }
            for (name, value) in score.breakdown.dimensions() {
                if value < self.threshold {
                    weak_dims.push((value, format!("Strengthen {name} in {}", section.title)));
                }
            }
            section_scores.push(SectionValidation {
                section_id: section.section_id.clone(),
                title: section.title.clone(),
                overall: score.overall,
                passed: score.passed,
                degraded: false,
            });
        }

        let overall = if section_scores.is_empty() {
            0.0
        } else {
            section_scores.iter().map(|s| s.overall).sum::<f64>() / section_scores.len() as f64
        };

        let mut recommendations: Vec<String> = report
            .sections
            .iter()
            .filter(|s| s.is_degraded())
            .map(|s| format!("Regenerate {}", s.title))
            .collect();
        weak_dims.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut seen: HashSet<String> = recommendations.iter().cloned().collect();
        for (_, rec) in weak_dims {
            if seen.insert(rec.clone()) {
                recommendations.push(rec);
            }
        }
        recommendations.truncate(5);

        ReportValidation { overall, passed: overall >= self.threshold, section_scores, issues, recommendations }
    }
}

fn generic_spec(id: &str, title: &str) -> SectionSpec {
    SectionSpec {
        id: id.to_string(),
        title: title.to_string(),
        persona_id: String::new(),
        instruction: String::new(),
        required_elements: Vec::new(),
        domain_terms: Vec::new(),
        ordering_index: 0,
        min_words: None,
    }
}

fn preview(items: &[&str]) -> String {
    items.iter().take(5).copied().collect::<Vec<_>>().join(", ")
}

fn dimension_hint(name: &str, score: f64, f: &TextFeatures, spec: &SectionSpec) -> String {
    match name {
        "coherence" => format!(
            "coherence low ({score:.2}): split the analysis into several paragraphs, keep sentences \
             between {:.0} and {:.0} words and link ideas with connectors such as therefore, \
             however and consequently",
            SENTENCE_LEN_MIN, SENTENCE_LEN_MAX
        ),
        "groundedness" => {
            let missing = missing_terms(f, spec);
            let terms = if missing.is_empty() {
                String::new()
            } else {
                format!(" (missing: {})", preview(&missing))
            };
            format!(
                "groundedness low ({score:.2}): use {} terminology{terms} and justify each point \
                 with explicit reasoning such as \"based on\", \"because\" or \"given that\"; avoid \
                 generic filler",
                spec.title
            )
        }
        "completeness" => {
            let missing = missing_elements(f, spec);
            let elements = if missing.is_empty() {
                String::new()
            } else {
                format!("cover the missing elements ({}) and ", preview(&missing))
            };
            format!(
                "completeness low ({score:.2}): {elements}write at least {} words (currently {})",
                min_words(spec),
                f.word_count
            )
        }
        _ => format!(
            "structure low ({score:.2}): add headings or numbered points, vary sentence length \
             and close with an explicit conclusion"
        ),
    }
}
