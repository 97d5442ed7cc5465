//! System and user turns sent to the completion function.

use crate::analytics::Analysis;
use crate::guardrails::guardrail_system_prompt;
use crate::rows::{DEFAULT_META_PROMPT, Row, Settings};

/// Operator meta-prompt, or the default when blank
pub fn meta_prompt(settings: &Settings) -> &str {
    match settings.meta_prompt.trim() {
        "" => DEFAULT_META_PROMPT,
        p => p,
    }
}

pub fn build_system_prompt(settings: &Settings) -> String {
    [
        meta_prompt(settings).to_string(),
        format!("Your name is {}.", settings.assistant_name.trim()),
        format!("Answer in language: {}.", settings.answer_language.trim()),
        String::new(),
        guardrail_system_prompt(),
    ]
    .join("\n")
}

/// Question, evidence rows and analysis as pretty JSON.
pub fn build_user_prompt(question: &str, evidence_rows: &[Row], analysis: Option<&Analysis>) -> serde_json::Result<String> {
    Ok([
        format!("User question:\n{question}"),
        String::new(),
        format!(
            "Evidence JSON rows (may be empty):\n{}",
            serde_json::to_string_pretty(evidence_rows)?
        ),
        String::new(),
        format!("Analysis JSON (may be null):\n{}", serde_json::to_string_pretty(&analysis)?),
    ]
    .join("\n"))
}
