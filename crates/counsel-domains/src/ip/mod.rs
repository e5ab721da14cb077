pub mod personas;

use counsel_core::types::ReportPlan;

use crate::section;
use personas::{IP_LITIGATION_EXPERT, IP_VALUATION_SPECIALIST, PATENT_RESEARCHER};

pub fn ip_plan() -> ReportPlan {
    ReportPlan {
        name: "ip_litigation".into(),
        label: "IP Litigation Analysis".into(),
        sections: vec![
            section(
                0,
                "liability_assessment",
                "Liability Assessment",
                IP_LITIGATION_EXPERT,
                LIABILITY_INSTRUCTION,
                &["claims", "evidence", "probability", "precedent"],
                &[
                    "liability", "negligence", "breach", "duty", "causation", "claim", "evidence",
                    "plaintiff", "defendant", "infringement", "standard of care", "proximate cause",
                    "damages",
                ],
            ),
            section(
                1,
                "damage_calculation",
                "Damage Calculation",
                IP_LITIGATION_EXPERT,
                DAMAGES_INSTRUCTION,
                &["damages", "calculation", "amount", "methodology"],
                &[
                    "damages", "compensation", "calculation", "quantum", "lost profits", "royalty",
                    "economic", "financial", "valuation", "monetary", "price erosion", "market share",
                ],
            ),
            section(
                2,
                "prior_art_analysis",
                "Prior Art Analysis",
                IP_VALUATION_SPECIALIST,
                PRIOR_ART_INSTRUCTION,
                &["patents", "prior art", "validity", "obviousness"],
                &[
                    "prior art", "patent", "novelty", "obviousness", "claims", "invention",
                    "disclosure", "reference", "validity", "prosecution", "patent landscape",
                    "citation",
                ],
            ),
            section(
                3,
                "competitive_landscape",
                "Competitive Landscape",
                IP_VALUATION_SPECIALIST,
                COMPETITIVE_INSTRUCTION,
                &["competitors", "market", "position", "licensing"],
                &[
                    "competitors", "market share", "positioning", "competitive", "industry",
                    "advantage", "differentiation", "licensing", "market dynamics", "technology",
                ],
            ),
            section(
                4,
                "risk_assessment",
                "Risk Assessment",
                PATENT_RESEARCHER,
                RISK_INSTRUCTION,
                &["risks", "probability", "impact", "mitigation"],
                &[
                    "risk", "probability", "impact", "mitigation", "exposure", "likelihood",
                    "severity", "contingency", "vulnerability", "threat", "uncertainty",
                ],
            ),
            section(
                5,
                "strategic_recommendations",
                "Strategic Recommendations",
                PATENT_RESEARCHER,
                STRATEGY_INSTRUCTION,
                &["recommendations", "action", "timeline", "resources"],
                &[
                    "recommendation", "strategy", "implementation", "action", "timeline",
                    "priority", "resource", "objective", "milestone", "initiative", "outcome",
                ],
            ),
        ],
    }
}

const LIABILITY_INSTRUCTION: &str = "\
Assess liability:
- Identify each potential claim and the party it runs against
- Evaluate the strength of the evidence for and against each claim
- Estimate the probability of success for each claim as a percentage
- Cite the precedents or legal principles that control the outcome";

const DAMAGES_INSTRUCTION: &str = "\
Calculate potential damages:
- Identify the categories of damages available (actual, statutory, enhanced)
- Give specific dollar ranges for each category
- Explain the calculation methodology and the data it relies on
- Account for mitigation and apportionment factors";

const PRIOR_ART_INSTRUCTION: &str = "\
Analyse prior art and validity:
- Identify the existing patents and publications most relevant to the asserted claims
- Assess the strongest validity challenges
- Evaluate obviousness arguments and secondary considerations
- Conclude on freedom to operate";

const COMPETITIVE_INSTRUCTION: &str = "\
Analyse the competitive implications:
- Identify the competitors affected by the dispute
- Assess how each party's market position could change
- Evaluate licensing and cross-licensing opportunities
- Predict how competitors are likely to respond";

const RISK_INSTRUCTION: &str = "\
Assess risk:
- Identify the legal risks with their probability and impact
- Evaluate the business risks that follow from each outcome
- Analyse reputational exposure
- Propose a mitigation strategy for each material risk";

const STRATEGY_INSTRUCTION: &str = "\
Provide strategic recommendations:
- Set out three to five specific action items
- Prioritise them by impact and urgency
- Estimate the resources and timeline each requires
- Define how success will be measured";
