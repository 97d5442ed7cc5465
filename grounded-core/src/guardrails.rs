//! Grounding contract, refusal gate and post-hoc response validation.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::rows::{RowRef, TabName};

/// The only text a refusal may contain
pub const REFUSAL: &str = "Not available in the current Google Sheet data.";

// A "Sources" heading on its own line or followed by a colon; list numbering
// and markdown emphasis in front of it are tolerated.
static SOURCES_HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t#*_>-]*(?:\d+[.)][ \t]*)?[*_]*sources[*_]*[ \t]*(?::|$)").expect("sources heading regex"));

/// Refuse before calling the model when there is nothing to ground on.
pub fn needs_refusal(has_evidence: bool, has_analysis: bool) -> bool {
    !has_evidence && !has_analysis
}

/// Fixed grounding contract appended to the operator meta-prompt
pub fn guardrail_system_prompt() -> String {
    [
        "You are a strictly grounded assistant.".to_string(),
        "You MUST answer ONLY using the provided Evidence JSON rows and/or the provided Analysis JSON. No external knowledge.".to_string(),
        format!("If the answer cannot be derived, respond EXACTLY with: \"{REFUSAL}\""),
        "Output format MUST be exactly:".to_string(),
        "1. Answer (short)".to_string(),
        "2. Key numbers (bullets)".to_string(),
        "3. Sources (bullets: \"tab: <name>, rows: <comma-separated row numbers>\")".to_string(),
        "If refusing, output ONLY the refusal sentence and nothing else.".to_string(),
    ]
    .join("\n")
}

/// Citations for one tab, row numbers ascending and unique
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceGroup {
    pub tab: TabName,
    pub row_numbers: Vec<usize>,
}

/// Group references by tab (first-seen tab order), dedupe and sort rows.
pub fn group_sources(sources: &[RowRef]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    for s in sources {
        match groups.iter_mut().find(|g| g.tab == s.tab) {
            Some(g) => g.row_numbers.push(s.row_number),
            None => groups.push(SourceGroup {
                tab: s.tab,
                row_numbers: vec![s.row_number],
            }),
        }
    }
    for g in &mut groups {
        g.row_numbers.sort_unstable();
        g.row_numbers.dedup();
    }
    groups
}

/// `tab: <name>, rows: a, b, c`
pub fn format_source_line(group: &SourceGroup) -> String {
    let rows: Vec<String> = group.row_numbers.iter().map(|n| n.to_string()).collect();
    format!("tab: {}, rows: {}", group.tab, rows.join(", "))
}

pub fn has_sources_section(text: &str) -> bool {
    SOURCES_HEADING_RE.is_match(text)
}

/// Deterministic answer used when the model leaves out its Sources section
pub fn fallback_answer(sources: &[RowRef]) -> String {
    let mut lines = vec![
        "Answer".to_string(),
        "I can answer using the provided Google Sheet evidence and computed analysis.".to_string(),
        String::new(),
        "Key numbers".to_string(),
        "- (see Analysis JSON in UI)".to_string(),
        String::new(),
        "Sources".to_string(),
    ];
    lines.extend(group_sources(sources).iter().map(|g| format!("- {}", format_source_line(g))));
    lines.join("\n")
}

/// Final text after validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub text: String,
    pub refusal: bool,
}

/// Enforce the grounding contract on a completion.
///
/// - refusal expected: always the refusal sentence
/// - no Sources section: replaced by [`fallback_answer`]
/// - model refused on its own (exact sentence): honored
/// - otherwise the trimmed text passes through
pub fn post_validate_response(response_text: &str, refusal_expected: bool, sources: &[RowRef]) -> Validated {
    if refusal_expected {
        return Validated {
            text: REFUSAL.to_string(),
            refusal: true,
        };
    }

    let t = response_text.trim();
    if !has_sources_section(t) {
        return Validated {
            text: fallback_answer(sources),
            refusal: false,
        };
    }

    if t == REFUSAL {
        return Validated {
            text: REFUSAL.to_string(),
            refusal: true,
        };
    }

    Validated {
        text: t.to_string(),
        refusal: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs() -> Vec<RowRef> {
        vec![
            RowRef::new(TabName::Sales, 5),
            RowRef::new(TabName::Crm, 3),
            RowRef::new(TabName::Sales, 2),
            RowRef::new(TabName::Sales, 5),
        ]
    }

    #[test]
    fn test_needs_refusal_truth_table() {
        assert!(needs_refusal(false, false));
        assert!(!needs_refusal(true, false));
        assert!(!needs_refusal(false, true));
        assert!(!needs_refusal(true, true));
    }

    #[test]
    fn test_group_sources_dedupes_and_sorts() {
        let groups = group_sources(&refs());
        assert_eq!(
            groups,
            vec![
                SourceGroup {
                    tab: TabName::Sales,
                    row_numbers: vec![2, 5],
                },
                SourceGroup {
                    tab: TabName::Crm,
                    row_numbers: vec![3],
                },
            ]
        );
        assert_eq!(format_source_line(&groups[0]), "tab: sales, rows: 2, 5");
    }

    #[test]
    fn test_refusal_expected_ignores_model_text() {
        let v = post_validate_response("The answer is 42.\nSources:\n- tab: sales, rows: 2", true, &refs());
        assert_eq!(v.text, REFUSAL);
        assert!(v.refusal);
    }

    #[test]
    fn test_missing_sources_gets_fallback() {
        let v = post_validate_response("The answer is 42.", false, &refs());
        assert!(!v.refusal);
        assert!(!v.text.contains("42"));
        assert!(v.text.contains("(see Analysis JSON in UI)"));
        assert!(v.text.contains("- tab: sales, rows: 2, 5"));
        assert!(v.text.contains("- tab: crm, rows: 3"));
    }

    #[test]
    fn test_sources_section_detection() {
        assert!(has_sources_section("Answer\nx\nSources\n- tab: sales, rows: 2"));
        assert!(has_sources_section("Answer: x\n\nsources: tab: sales, rows: 2"));
        assert!(has_sources_section("1. Answer\n2. Key numbers\n3. Sources\n- tab: crm, rows: 4"));
        assert!(has_sources_section("**Sources:**\n- tab: crm, rows: 4"));
        assert!(!has_sources_section("The answer is 42."));
        assert!(!has_sources_section("Our sources say it is 42."));
    }

    #[test]
    fn test_compliant_answer_passes_through() {
        let text = "  Answer\nNorth hit 80%.\n\nKey numbers\n- target: 100\n\nSources\n- tab: sales, rows: 2\n";
        let v = post_validate_response(text, false, &refs());
        assert_eq!(v.text, text.trim());
        assert!(!v.refusal);
    }

    #[test]
    fn test_bare_model_refusal_with_evidence_gets_fallback() {
        let v = post_validate_response(&format!("  {REFUSAL}\n"), false, &refs());
        assert_eq!(v.text, fallback_answer(&refs()));
        assert!(!v.refusal);
    }

    #[test]
    fn test_contract_mentions_refusal_and_format() {
        let p = guardrail_system_prompt();
        assert!(p.contains(REFUSAL));
        assert!(p.contains("tab: <name>, rows: <comma-separated row numbers>"));
    }
}
