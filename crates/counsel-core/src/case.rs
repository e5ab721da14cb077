use crate::types::{CaseBrief, CaseInput, CaseType};

const PARTY_ROLES: &[&str] = &["plaintiff", "plaintiffs", "defendant", "defendants"];
/// Only the opening lines of a complaint are scanned for party names.
const PARTY_SCAN_LINES: usize = 10;
const MAX_NAME_WORDS: usize = 4;

const IP_TERMS: &[&str] = &["patent", "trademark", "copyright", "trade secret", "infringement"];
const CONTRACT_TERMS: &[&str] = &["breach", "performance", "termination", "damages"];

fn bare(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}

fn is_capitalized(word: &str) -> bool {
    bare(word).chars().next().is_some_and(char::is_uppercase)
}

fn is_role(word: &str) -> bool {
    PARTY_ROLES.contains(&bare(word).to_lowercase().as_str())
}

fn name_from(words: &[&str]) -> Option<String> {
    let name: Vec<&str> = words.iter().map(|w| bare(w)).filter(|w| !w.is_empty()).collect();
    (!name.is_empty()).then(|| name.join(" "))
}

/// Pulls party names from the words around "plaintiff" / "defendant" in
/// the opening lines. Prefers the capitalised run before the role word
/// ("Acme Corp, plaintiff"), then the one after it ("Defendant Widget Co").
pub fn extract_parties(complaint: &str) -> Vec<String> {
    let mut parties: Vec<String> = Vec::new();
    for line in complaint.lines().take(PARTY_SCAN_LINES) {
        let words: Vec<&str> = line.split_whitespace().collect();
        for (i, word) in words.iter().enumerate() {
            if !is_role(word) {
                continue;
            }
            let start = words[..i]
                .iter()
                .rev()
                .take(MAX_NAME_WORDS)
                .take_while(|w| is_capitalized(w) && !is_role(w))
                .count();
            let before = name_from(&words[i - start..i]);
            let after = || {
                let len = words[i + 1..]
                    .iter()
                    .take(MAX_NAME_WORDS)
                    .take_while(|w| is_capitalized(w) && !is_role(w))
                    .count();
                name_from(&words[i + 1..i + 1 + len])
            };
            if let Some(name) = before.or_else(after) {
                if !parties.contains(&name) {
                    parties.push(name);
                }
            }
        }
    }
    if parties.is_empty() {
        vec!["Party A".to_string(), "Party B".to_string()]
    } else {
        parties
    }
}

fn title_case(term: &str) -> String {
    term.split(' ')
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn extract_key_issues(complaint: &str, case_type: CaseType) -> Vec<String> {
    let lower = complaint.to_lowercase();
    let issues: Vec<String> = match case_type {
        CaseType::Ip => IP_TERMS
            .iter()
            .filter(|t| lower.contains(*t))
            .map(|t| format!("{} dispute", title_case(t)))
            .collect(),
        CaseType::Contract => CONTRACT_TERMS
            .iter()
            .filter(|t| lower.contains(*t))
            .map(|t| format!("Contract {t}"))
            .collect(),
        _ => Vec::new(),
    };
    if issues.is_empty() {
        vec![
            "Primary legal dispute".to_string(),
            "Damages assessment".to_string(),
            "Remedy determination".to_string(),
        ]
    } else {
        issues
    }
}

pub fn brief(case: &CaseInput) -> CaseBrief {
    CaseBrief {
        parties: extract_parties(&case.complaint_text),
        key_issues: extract_key_issues(&case.complaint_text, case.case_type),
    }
}
