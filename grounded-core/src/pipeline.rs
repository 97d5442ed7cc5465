//! Question answering pipeline:
//! intent + evidence -> scope -> analysis -> prompt -> completion -> validation.

use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::analytics::{Analysis, compute_analysis};
use crate::completion::{Completion, CompletionError};
use crate::guardrails::{REFUSAL, SourceGroup, group_sources, needs_refusal, post_validate_response};
use crate::intent::{Intent, detect_intent};
use crate::prompt::{build_system_prompt, build_user_prompt};
use crate::retrieval::{Evidence, RetrievalFilters, retrieve_evidence};
use crate::rows::{Dataset, Row, RowRef, Settings, TabName};
use crate::scope::{Scope, normalize_scope};

#[derive(Error, Debug)]
pub enum QaError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("failed to serialize prompt: {0}")]
    Prompt(#[from] serde_json::Error),
}

/// Everything decided before the completion call
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Plan {
    pub intent: Intent,
    pub evidence: Evidence,
    pub scope: Scope,
    pub analysis: Option<Analysis>,
    pub refusal_expected: bool,
    /// Evidence origins followed by analysis sources, deduplicated
    pub sources: Vec<RowRef>,
}

/// Diagnostic trail of one answer, kept for auditing
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Trace {
    pub intent: Intent,
    pub selected_tabs: Vec<TabName>,
    pub filters: RetrievalFilters,
    pub retrieved: Vec<RowRef>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QaResponse {
    pub answer: String,
    pub sources: Vec<SourceGroup>,
    pub analysis: Option<Analysis>,
    pub refusal: bool,
    pub trace: Trace,
}

/// Run every deterministic stage for `question`. Never calls the model.
pub fn plan_question(question: &str, data: &Dataset, settings: &Settings) -> Plan {
    let intent = detect_intent(question);
    let evidence = retrieve_evidence(
        question,
        data,
        settings.max_rows_context,
        settings.min_retrieval_score,
    );
    let scope = normalize_scope(&evidence.filters, question);
    let analysis = compute_analysis(intent, data, &scope);
    let refusal_expected = needs_refusal(!evidence.rows.is_empty(), analysis.is_some());

    let mut seen = HashSet::new();
    let sources: Vec<RowRef> = evidence
        .references()
        .into_iter()
        .chain(analysis.iter().flat_map(|a| a.sources.iter().copied()))
        .filter(|r| seen.insert(*r))
        .collect();

    debug!(
        %intent,
        evidence = evidence.rows.len(),
        has_analysis = analysis.is_some(),
        refusal_expected,
        "planned question"
    );

    Plan {
        intent,
        evidence,
        scope,
        analysis,
        refusal_expected,
        sources,
    }
}

/// Answer `question` strictly from `data`.
///
/// The completion is skipped when there is nothing to ground on. Completion
/// failures abort the request; non-compliant model output does not.
pub async fn answer_question(
    question: &str,
    data: &Dataset,
    settings: &Settings,
    completion: &dyn Completion,
) -> Result<QaResponse, QaError> {
    let plan = plan_question(question, data, settings);

    let response_text = if plan.refusal_expected {
        REFUSAL.to_string()
    } else {
        let system = build_system_prompt(settings);
        let rows: Vec<Row> = plan.evidence.rows.iter().map(|r| r.row.clone()).collect();
        let user = build_user_prompt(question, &rows, plan.analysis.as_ref())?;

        let started = Instant::now();
        let text = completion.complete(&system, &user).await?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "completion returned");
        text
    };

    let validated = post_validate_response(&response_text, plan.refusal_expected, &plan.sources);
    info!(
        intent = %plan.intent,
        refusal = validated.refusal,
        sources = plan.sources.len(),
        "answered question"
    );

    Ok(QaResponse {
        answer: validated.text,
        sources: group_sources(&plan.sources),
        analysis: plan.analysis,
        refusal: validated.refusal,
        trace: Trace {
            intent: plan.intent,
            selected_tabs: plan.evidence.selected_tabs.clone(),
            filters: plan.evidence.filters.clone(),
            retrieved: plan.evidence.references(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::SalesRow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Scripted completion that records the prompts it was given
    struct Scripted {
        reply: Result<String, u16>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                reply: Err(status),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Completion for Scripted {
        async fn complete(&self, system: &str, user: &str) -> Result<String, CompletionError> {
            self.calls.lock().unwrap().push((system.to_string(), user.to_string()));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(status) => Err(CompletionError::Status {
                    status: *status,
                    body: "quota".to_string(),
                }),
            }
        }
    }

    fn north_sales() -> Dataset {
        Dataset {
            sales: vec![SalesRow {
                source: RowRef::new(TabName::Sales, 2),
                month: "2025-01".to_string(),
                territory: "North".to_string(),
                brick: "B1".to_string(),
                rep: "Ali".to_string(),
                product: "Paracetamol".to_string(),
                target: Some(100.0),
                achieved: Some(80.0),
            }],
            ..Dataset::default()
        }
    }

    #[tokio::test]
    async fn test_refusal_skips_completion() {
        let llm = Scripted::ok("made up");
        let r = answer_question("anything?", &Dataset::default(), &Settings::default(), &llm)
            .await
            .unwrap();
        assert_eq!(r.answer, REFUSAL);
        assert!(r.refusal);
        assert!(r.sources.is_empty());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_grounded_answer_passes_through() {
        let reply = "Answer\nNorth achieved 80%.\n\nKey numbers\n- target: 100\n\nSources\n- tab: sales, rows: 2";
        let llm = Scripted::ok(reply);
        let r = answer_question(
            "target vs achieved for North in 2025-01",
            &north_sales(),
            &Settings::default(),
            &llm,
        )
        .await
        .unwrap();
        assert_eq!(r.answer, reply);
        assert!(!r.refusal);
        assert_eq!(r.trace.intent, Intent::TargetVsAchieved);
        assert_eq!(r.sources.len(), 1);
        assert_eq!(r.sources[0].row_numbers, vec![2]);

        let calls = llm.calls.lock().unwrap();
        assert!(calls[0].1.contains("\"achievement_pct\": 80.0"));
    }

    #[tokio::test]
    async fn test_non_compliant_answer_is_replaced() {
        let llm = Scripted::ok("The answer is 42.");
        let r = answer_question(
            "target vs achieved for North in 2025-01",
            &north_sales(),
            &Settings::default(),
            &llm,
        )
        .await
        .unwrap();
        assert!(!r.refusal);
        assert!(r.answer.contains("- tab: sales, rows: 2"));
        assert!(!r.answer.contains("42"));
    }

    #[tokio::test]
    async fn test_completion_failure_propagates() {
        let llm = Scripted::failing(429);
        let err = answer_question(
            "target vs achieved for North in 2025-01",
            &north_sales(),
            &Settings::default(),
            &llm,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            QaError::Completion(CompletionError::Status { status: 429, .. })
        ));
    }

    #[test]
    fn test_plan_merges_evidence_and_analysis_sources() {
        let plan = plan_question(
            "target vs achieved for North in 2025-01",
            &north_sales(),
            &Settings::default(),
        );
        assert!(!plan.refusal_expected);
        assert_eq!(plan.sources, vec![RowRef::new(TabName::Sales, 2)]);
    }
}
