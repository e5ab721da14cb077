use crate::types::{CaseBrief, CaseInput, ForwardContext, Persona, SectionSpec};

const REASONING_INSTRUCTIONS: &str = "\
Reason step by step before writing. Structure the analysis as follows:
1. First, identify the legal issues that bear on this section
2. Second, analyse the relevant facts
3. Third, apply the governing legal principles and your frameworks
4. Finally, state your conclusions and the confidence you place in them

Justify each point explicitly (\"based on\", \"because\", \"given that\"). Use headings or \
numbered points, separate ideas into paragraphs, and end with a short conclusion.";

/// Renders the persona block placed at the top of every prompt.
pub fn render_persona(persona: &Persona) -> String {
    let mut s = format!("You are a {}.\n\n{}\n", persona.role_title, persona.expertise_description);
    s.push_str(&format!("\nCommunication style: {}\n", persona.communication_style));
    if !persona.frameworks.is_empty() {
        s.push_str("\nAnalytical frameworks you apply, in order:\n");
        for (i, fw) in persona.frameworks.iter().enumerate() {
            s.push_str(&format!("{}. {}\n", i + 1, fw));
        }
    }
    s
}

/// Build the prompt for one attempt at one section.
///
/// The base prompt holds the persona, reasoning instructions, every prior
/// section in report order, the case and the section task. On a retry
/// `feedback` is appended as a correction directive.
pub fn build_prompt(
    persona: &Persona,
    section: &SectionSpec,
    case: &CaseInput,
    brief: &CaseBrief,
    context: &ForwardContext,
    feedback: Option<&str>,
) -> String {
    let mut s = render_persona(persona);

    s.push_str("\n---\n\nREASONING INSTRUCTIONS:\n");
    s.push_str(REASONING_INSTRUCTIONS);

    if !context.is_empty() {
        s.push_str("\n\n---\n\nPREVIOUS SECTIONS OF THIS REPORT:\n\n");
        s.push_str(&context.render());
    }

    s.push_str(&format!("\n\n---\n\nTASK: Write the {} section for the following case.\n\n", section.title));
    s.push_str(&format!("Case Name: {}\n", case.case_name));
    s.push_str(&format!("Case Type: {}\n", case.case_type.label()));
    s.push_str(&format!("Urgency: {}\n", case.urgency));
    if !brief.parties.is_empty() {
        s.push_str(&format!("Parties: {}\n", brief.parties.join(", ")));
    }
    if !brief.key_issues.is_empty() {
        s.push_str(&format!("Key Issues: {}\n", brief.key_issues.join(", ")));
    }
    s.push_str(&format!("\nComplaint:\n{}\n", case.complaint_text.trim()));
    if let Some(extra) = case.additional_context.as_deref().filter(|c| !c.trim().is_empty()) {
        s.push_str(&format!("\nAdditional Context:\n{}\n", extra.trim()));
    }

    s.push('\n');
    s.push_str(section.instruction.trim());
    s.push('\n');
    if !section.required_elements.is_empty() {
        s.push_str(&format!("\nThe section must address: {}.\n", section.required_elements.join(", ")));
    }
    let min_words = section.min_words.unwrap_or(persona.min_word_count);
    s.push_str(&format!("Write at least {min_words} words.\n"));

    if let Some(fb) = feedback.filter(|f| !f.trim().is_empty()) {
        s.push_str("\n---\n\nCORRECTION REQUIRED: the previous draft of this section failed the quality review.\n");
        s.push_str("Address every point below in the rewrite:\n");
        for line in fb.lines().filter(|l| !l.trim().is_empty()) {
            s.push_str(&format!("- {}\n", line.trim()));
        }
    }

    s
}
