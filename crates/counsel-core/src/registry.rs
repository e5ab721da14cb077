use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::error::ConfigError;
use crate::instruction::render_persona;
use crate::types::{Persona, ReportPlan, SectionSpec};

/// Word count a persona definition needs to be considered complete.
const PERSONA_MIN_WORDS: usize = 150;
const PERSONA_PASS_SCORE: f64 = 0.8;

const CAPABILITY_KEYWORDS: &[(&str, &str)] = &[
    ("litigation", "Litigation strategy"),
    ("patent", "Patent analysis"),
    ("quantitative", "Quantitative analysis"),
    ("financial", "Financial modeling"),
    ("valuation", "IP valuation"),
    ("competitive", "Competitive intelligence"),
    ("risk", "Risk assessment"),
    ("strategic", "Strategic planning"),
];

/// Read-only persona lookup built once at start-up.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonaAudit {
    pub persona_id: String,
    pub score: f64,
    pub passed: bool,
    pub word_count: usize,
    pub issues: Vec<String>,
}

impl PersonaRegistry {
    pub fn new(personas: Vec<Persona>) -> Result<Self, ConfigError> {
        let mut index = HashMap::with_capacity(personas.len());
        for (i, p) in personas.iter().enumerate() {
            if index.insert(p.id.clone(), i).is_some() {
                return Err(ConfigError::DuplicatePersona(p.id.clone()));
            }
        }
        let registry = Self { personas, index };
        for audit in registry.audit() {
            if !audit.passed {
                warn!(persona = %audit.persona_id, score = audit.score, "weak persona definition: {}", audit.issues.join("; "));
            }
        }
        Ok(registry)
    }

    pub fn get(&self, id: &str) -> Option<&Persona> {
        self.index.get(id).map(|&i| &self.personas[i])
    }

    /// Persona bound to `section`, or a configuration error naming both.
    pub fn resolve(&self, section: &SectionSpec) -> Result<&Persona, ConfigError> {
        self.get(&section.persona_id).ok_or_else(|| ConfigError::UnknownPersona {
            section: section.id.clone(),
            persona: section.persona_id.clone(),
        })
    }

    pub fn all(&self) -> &[Persona] {
        &self.personas
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }

    /// Rejects empty plans, repeated section ids and unknown personas.
    pub fn validate_plan(&self, plan: &ReportPlan) -> Result<(), ConfigError> {
        if plan.sections.is_empty() {
            return Err(ConfigError::EmptyPlan(plan.name.clone()));
        }
        let mut seen = HashSet::new();
        for section in &plan.sections {
            if !seen.insert(section.id.as_str()) {
                return Err(ConfigError::DuplicateSection(section.id.clone()));
            }
            self.resolve(section)?;
        }
        Ok(())
    }

    pub fn audit(&self) -> Vec<PersonaAudit> {
        self.personas.iter().map(audit_persona).collect()
    }
}

/// Scores a persona definition 0.2 per satisfied check.
pub fn audit_persona(persona: &Persona) -> PersonaAudit {
    let word_count = render_persona(persona).split_whitespace().count();
    let checks = [
        (!persona.role_title.trim().is_empty(), "missing role definition"),
        (!persona.expertise_description.trim().is_empty(), "missing expertise areas"),
        (!persona.communication_style.trim().is_empty(), "missing communication style"),
        (!persona.frameworks.is_empty(), "missing analytical frameworks"),
        (word_count >= PERSONA_MIN_WORDS, "definition shorter than 150 words"),
    ];
    let score = checks.iter().filter(|(ok, _)| *ok).count() as f64 * 0.2;
    let issues = checks.iter().filter(|(ok, _)| !ok).map(|(_, msg)| msg.to_string()).collect();
    PersonaAudit {
        persona_id: persona.id.clone(),
        score,
        passed: score >= PERSONA_PASS_SCORE - 1e-9,
        word_count,
        issues,
    }
}

pub fn capabilities(persona: &Persona) -> Vec<String> {
    let text = render_persona(persona).to_lowercase();
    let caps: Vec<String> = CAPABILITY_KEYWORDS
        .iter()
        .filter(|(kw, _)| text.contains(kw))
        .map(|(_, label)| label.to_string())
        .collect();
    if caps.is_empty() {
        vec!["Analysis".into(), "Assessment".into(), "Recommendations".into()]
    } else {
        caps
    }
}

/// Focus areas are the persona's named frameworks.
pub fn focus_areas(persona: &Persona) -> Vec<String> {
    if persona.frameworks.is_empty() {
        vec!["Legal analysis".into(), "Strategic insights".into()]
    } else {
        persona.frameworks.clone()
    }
}
