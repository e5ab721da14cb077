use counsel_core::types::CaseType;
use counsel_domains::ip::personas::{IP_LITIGATION_EXPERT, IP_VALUATION_SPECIALIST, PATENT_RESEARCHER};

#[test]
fn test_ip_plan_has_six_sections_in_order() {
    let plan = counsel_domains::ip::ip_plan();
    let ids: Vec<&str> = plan.ordered().iter().map(|s| s.id.as_str()).collect();
    assert_eq!(
        ids,
        &[
            "liability_assessment",
            "damage_calculation",
            "prior_art_analysis",
            "competitive_landscape",
            "risk_assessment",
            "strategic_recommendations",
        ]
    );
}

#[test]
fn test_sections_bound_to_three_personas() {
    let plan = counsel_domains::ip::ip_plan();
    let persona = |id: &str| plan.get_section(id).unwrap().persona_id.clone();
    assert_eq!(persona("liability_assessment"), IP_LITIGATION_EXPERT);
    assert_eq!(persona("damage_calculation"), IP_LITIGATION_EXPERT);
    assert_eq!(persona("prior_art_analysis"), IP_VALUATION_SPECIALIST);
    assert_eq!(persona("competitive_landscape"), IP_VALUATION_SPECIALIST);
    assert_eq!(persona("risk_assessment"), PATENT_RESEARCHER);
    assert_eq!(persona("strategic_recommendations"), PATENT_RESEARCHER);
}

#[test]
fn test_every_section_has_elements_and_terms() {
    for section in counsel_domains::ip::ip_plan().sections {
        assert_eq!(section.required_elements.len(), 4, "{}", section.id);
        assert!(section.domain_terms.len() >= 10, "{}", section.id);
        assert!(!section.instruction.is_empty());
        assert!(section.min_words.is_none());
    }
}

#[test]
fn test_default_registry_validates_builtin_plans() {
    let registry = counsel_domains::default_registry().unwrap();
    assert_eq!(registry.len(), 3);
    for plan in counsel_domains::all_plans() {
        registry.validate_plan(&plan).unwrap();
    }
}

#[test]
fn test_builtin_personas_pass_audit() {
    let registry = counsel_domains::default_registry().unwrap();
    for audit in registry.audit() {
        assert!(audit.passed, "{} scored {}: {:?}", audit.persona_id, audit.score, audit.issues);
        assert!(audit.word_count >= 150);
    }
}

#[test]
fn test_plan_lookup() {
    assert_eq!(counsel_domains::get_plan("ip").unwrap().name, "ip_litigation");
    assert!(counsel_domains::get_plan("nope").is_none());
    assert_eq!(counsel_domains::plan_for(CaseType::Contract).name, "ip_litigation");
}
