pub mod ip;

use counsel_core::error::ConfigError;
use counsel_core::registry::PersonaRegistry;
use counsel_core::types::{CaseType, ReportPlan, SectionSpec};

/// Return all built-in report plans.
pub fn all_plans() -> Vec<ReportPlan> {
    vec![ip::ip_plan()]
}

/// Look up a built-in plan by name.
pub fn get_plan(name: &str) -> Option<ReportPlan> {
    match name {
        "ip" => get_plan("ip_litigation"),
        _ => all_plans().into_iter().find(|p| p.name == name),
    }
}

/// Plan used for a case type. Every type currently shares the IP
/// litigation plan; its sections are framed generally enough to apply.
pub fn plan_for(case_type: CaseType) -> ReportPlan {
    let plan = ip::ip_plan();
    tracing::debug!(case_type = ?case_type, plan = %plan.name, "report plan selected");
    plan
}

/// Registry holding every built-in persona.
pub fn default_registry() -> Result<PersonaRegistry, ConfigError> {
    PersonaRegistry::new(ip::personas::all_personas())
}

// ── Shared section builder ───────────────────────────────────────────────

pub(crate) fn section(
    index: usize,
    id: &str,
    title: &str,
    persona_id: &str,
    instruction: &str,
    required_elements: &[&str],
    domain_terms: &[&str],
) -> SectionSpec {
    SectionSpec {
        id: id.into(),
        title: title.into(),
        persona_id: persona_id.into(),
        instruction: instruction.into(),
        required_elements: required_elements.iter().map(|s| s.to_string()).collect(),
        domain_terms: domain_terms.iter().map(|s| s.to_string()).collect(),
        ordering_index: index,
        min_words: None,
    }
}
