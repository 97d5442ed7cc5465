//! grounded-core: retrieval, analytics and guardrails for answering questions
//! strictly from sheet data.

pub mod rows;
pub mod tokenize;
pub mod canon;
pub mod intent;
pub mod retrieval;
pub mod scope;
pub mod analytics;
pub mod guardrails;
pub mod prompt;
pub mod completion;
pub mod pipeline;

pub use rows::{
    CrmRow, Dataset, GlossaryRow, GroundingMode, Row, RowRef, SalesRow, Settings, SettingsRow,
    StockRow, TabName,
};
pub use tokenize::{token_overlap_score, tokenize};
pub use canon::CanonicalMap;
pub use intent::{detect_intent, Intent};
pub use retrieval::{retrieve_evidence, Evidence, RetrievalFilters, RetrievedRow};
pub use scope::{normalize_scope, GroupBy, Scope};
pub use analytics::{compute_analysis, Analysis, Metrics, TableRow};
pub use guardrails::{group_sources, needs_refusal, post_validate_response, SourceGroup, REFUSAL};
pub use prompt::{build_system_prompt, build_user_prompt};
pub use completion::{Completion, CompletionError};
pub use pipeline::{answer_question, plan_question, Plan, QaError, QaResponse, Trace};
