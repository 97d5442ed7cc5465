//! Aggregation scope: filter values with blanks dropped, plus grouping knobs
//! read from the question.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::retrieval::RetrievalFilters;

static TOP_K_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\btop\s+(\d+)").expect("top-k regex"));

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Territory,
    Brick,
    Product,
    Rep,
}

/// Sparse scope handed to the aggregation functions
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Scope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub week: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub territory: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brick: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rep: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distributor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

fn non_blank(v: &Option<String>) -> Option<String> {
    v.as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl Scope {
    /// Copy the filters, dropping blank values.
    pub fn from_filters(f: &RetrievalFilters) -> Self {
        Self {
            month: non_blank(&f.month),
            week: non_blank(&f.week),
            territory: non_blank(&f.territory),
            brick: non_blank(&f.brick),
            rep: non_blank(&f.rep),
            product: non_blank(&f.product),
            distributor: non_blank(&f.distributor),
            sku: non_blank(&f.sku),
            group_by: None,
            top_k: None,
        }
    }

    /// Add `top_k` ("top N") and `group_by` ("by product|brick|territory|rep").
    /// When several grouping phrases appear, the later one in that list wins.
    pub fn with_question_knobs(mut self, question: &str) -> Self {
        let q = question.to_lowercase();

        if let Some(k) = TOP_K_RE
            .captures(&q)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<usize>().ok())
        {
            self.top_k = Some(k);
        }

        for (phrase, group) in [
            ("by product", GroupBy::Product),
            ("by brick", GroupBy::Brick),
            ("by territory", GroupBy::Territory),
            ("by rep", GroupBy::Rep),
        ] {
            if q.contains(phrase) {
                self.group_by = Some(group);
            }
        }

        self
    }
}

/// Scope for a question: normalized filters plus question knobs.
pub fn normalize_scope(filters: &RetrievalFilters, question: &str) -> Scope {
    Scope::from_filters(filters).with_question_knobs(question)
}
