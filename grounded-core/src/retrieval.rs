//! Evidence retrieval: pick candidate tabs, pull coarse filters out of the
//! question, apply them, then rank surviving rows by token overlap.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use crate::canon::CanonicalMap;
use crate::rows::{Dataset, Row, RowRef, TabName};
use crate::tokenize::{token_overlap_score, tokenize};

/// Labels recognized in `label: value` form
const FILTER_LABELS: &str = "month|week|territory|brick|rep|product|distributor|sku";

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({FILTER_LABELS})\s*:\s*")).expect("filter label regex")
});

const MAX_FILTER_VALUE_LEN: usize = 40;

/// Sparse scope constraints pulled from a question. `None` = unconstrained.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetrievalFilters {
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
}

impl RetrievalFilters {
    pub fn is_empty(&self) -> bool {
        *self == RetrievalFilters::default()
    }
}

/// A scored evidence row
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RetrievedRow {
    pub reference: RowRef,
    pub score: usize,
    pub row: Row,
}

/// Output of [`retrieve_evidence`]
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Evidence {
    pub rows: Vec<RetrievedRow>,
    pub selected_tabs: Vec<TabName>,
    pub filters: RetrievalFilters,
}

impl Evidence {
    pub fn references(&self) -> Vec<RowRef> {
        self.rows.iter().map(|r| r.reference).collect()
    }
}

fn is_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | ' ')
}

/// Extract `label: value` pairs. Each value runs until the next label, or the
/// first character outside `[a-z0-9-_/ ]`, capped at 40 characters.
fn labelled_values(question: &str) -> Vec<(String, String)> {
    let matches: Vec<_> = LABEL_RE.captures_iter(question).collect();
    let mut out = Vec::new();

    for (i, caps) in matches.iter().enumerate() {
        let (Some(whole), Some(label)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = matches
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(question.len());

        let value: String = question[whole.end()..end]
            .chars()
            .take_while(|c| is_value_char(*c))
            .take(MAX_FILTER_VALUE_LEN)
            .collect();
        let value = value.trim();
        if value.len() >= 2 {
            out.push((label.as_str().to_lowercase(), value.to_string()));
        }
    }

    out
}

/// Best-effort filter extraction.
///
/// Month and week are kept literal; the other values are canonicalized. Any
/// question token found in the glossary claims `product` if nothing else did.
pub fn extract_filters(question: &str, canon: &CanonicalMap) -> RetrievalFilters {
    let mut f = RetrievalFilters::default();

    for (label, value) in labelled_values(question) {
        let slot = match label.as_str() {
            "month" => &mut f.month,
            "week" => &mut f.week,
            "territory" => &mut f.territory,
            "brick" => &mut f.brick,
            "rep" => &mut f.rep,
            "product" => &mut f.product,
            "distributor" => &mut f.distributor,
            "sku" => &mut f.sku,
            _ => continue,
        };
        if slot.is_some() {
            continue;
        }
        let value = match label.as_str() {
            "month" | "week" | "sku" => value,
            _ => canon.canonicalize(&value),
        };
        *slot = Some(value);
    }

    if f.product.is_none() {
        f.product = tokenize(question)
            .iter()
            .find_map(|t| canon.get(t).map(str::to_string));
    }

    f
}

/// Candidate tabs by keyword; all business tabs when nothing matches.
pub fn select_tabs(question: &str) -> Vec<TabName> {
    let q = question.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| q.contains(k));

    let mut tabs = Vec::new();
    if has(&["stock", "quantity", "sku", "inventory"]) {
        tabs.push(TabName::Stock);
    }
    if has(&["target", "achieved", "sales", "month", "brick", "territory"]) {
        tabs.push(TabName::Sales);
    }
    if has(&["crm", "visit", "coverage", "doctor", "week"]) {
        tabs.push(TabName::Crm);
    }

    if tabs.is_empty() {
        return TabName::BUSINESS.to_vec();
    }
    tabs
}

fn eq_opt(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().is_none_or(|f| f == value)
}

fn eq_opt_ci(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().is_none_or(|f| f.to_lowercase() == value.to_lowercase())
}

/// Whether a row survives the table-specific filter set.
pub fn row_matches(row: &Row, f: &RetrievalFilters) -> bool {
    match row {
        Row::Sales(r) => {
            eq_opt_ci(&f.month, &r.month)
                && eq_opt(&f.territory, &r.territory)
                && eq_opt(&f.brick, &r.brick)
                && eq_opt(&f.rep, &r.rep)
                && eq_opt(&f.product, &r.product)
        }
        Row::Crm(r) => {
            eq_opt_ci(&f.week, &r.week) && eq_opt(&f.territory, &r.territory) && eq_opt(&f.rep, &r.rep)
        }
        Row::Stock(r) => {
            eq_opt(&f.distributor, &r.distributor)
                && eq_opt(&f.product, &r.product)
                && eq_opt(&f.sku, &r.sku)
        }
        Row::Settings(_) | Row::Glossary(_) => true,
    }
}

/// Retrieve up to `max_rows` evidence rows scoring at least `min_score`.
///
/// Ordering: score descending, then row number ascending; rows with equal
/// keys keep the tab order they were encountered in. An empty result is
/// valid and drives the refusal path.
pub fn retrieve_evidence(question: &str, data: &Dataset, max_rows: usize, min_score: usize) -> Evidence {
    let canon = CanonicalMap::from_glossary(&data.glossary);
    let filters = extract_filters(question, &canon);
    let selected_tabs = select_tabs(question);
    debug!(?selected_tabs, ?filters, "evidence scope");

    let mut scored: Vec<RetrievedRow> = Vec::new();
    for tab in &selected_tabs {
        for row in data.rows(*tab) {
            if !row_matches(&row, &filters) {
                continue;
            }
            let score = token_overlap_score(question, &row.text());
            if score < min_score {
                continue;
            }
            scored.push(RetrievedRow {
                reference: row.source(),
                score,
                row,
            });
        }
    }

    scored.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then(a.reference.row_number.cmp(&b.reference.row_number))
    });
    scored.truncate(max_rows);
    debug!(kept = scored.len(), "evidence ranked");

    Evidence {
        rows: scored,
        selected_tabs,
        filters,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rows::{CrmRow, GlossaryRow, SalesRow, StockRow};

    fn sales(n: usize, month: &str, territory: &str, brick: &str, product: &str) -> SalesRow {
        SalesRow {
            source: RowRef::new(TabName::Sales, n),
            month: month.to_string(),
            territory: territory.to_string(),
            brick: brick.to_string(),
            rep: "Ali".to_string(),
            product: product.to_string(),
            target: Some(100.0),
            achieved: Some(80.0),
        }
    }

    fn stock(n: usize, distributor: &str, product: &str) -> StockRow {
        StockRow {
            source: RowRef::new(TabName::Stock, n),
            distributor: distributor.to_string(),
            product: product.to_string(),
            sku: format!("SKU-{n}"),
            quantity: Some(10.0),
            last_updated: "2025-01-31".to_string(),
        }
    }

    fn glossary() -> Vec<GlossaryRow> {
        vec![GlossaryRow {
            source: RowRef::new(TabName::Glossary, 2),
            term: "Paracetamol".to_string(),
            synonyms: "panadol,pcm".to_string(),
            canonical: "Paracetamol".to_string(),
        }]
    }

    #[test]
    fn test_extract_labelled_filters() {
        let canon = CanonicalMap::from_glossary(&glossary());
        let f = extract_filters("Sales for territory: North, month: 2025-01 product: pcm?", &canon);
        assert_eq!(f.territory.as_deref(), Some("North"));
        assert_eq!(f.month.as_deref(), Some("2025-01"));
        assert_eq!(f.product.as_deref(), Some("Paracetamol"));
        assert_eq!(f.week, None);
    }

    #[test]
    fn test_value_stops_at_next_label() {
        let canon = CanonicalMap::default();
        let f = extract_filters("territory: North brick: B12", &canon);
        assert_eq!(f.territory.as_deref(), Some("North"));
        assert_eq!(f.brick.as_deref(), Some("B12"));
    }

    #[test]
    fn test_too_short_value_is_ignored() {
        let canon = CanonicalMap::default();
        let f = extract_filters("rep: X", &canon);
        assert_eq!(f.rep, None);
        assert!(f.is_empty());
    }

    #[test]
    fn test_glossary_token_claims_product() {
        let canon = CanonicalMap::from_glossary(&glossary());
        let f = extract_filters("how much panadol is left", &canon);
        assert_eq!(f.product.as_deref(), Some("Paracetamol"));
    }

    #[test]
    fn test_select_tabs() {
        assert_eq!(select_tabs("stock at Alpha"), vec![TabName::Stock]);
        assert_eq!(select_tabs("target for territory North"), vec![TabName::Sales]);
        assert_eq!(select_tabs("doctor visits this week"), vec![TabName::Crm]);
        assert_eq!(select_tabs("hello there"), TabName::BUSINESS.to_vec());
    }

    #[test]
    fn test_retrieve_filters_scores_and_ranks() {
        let data = Dataset {
            sales: vec![
                sales(2, "2025-01", "North", "B1", "Paracetamol"),
                sales(3, "2025-01", "South", "B2", "Paracetamol"),
                sales(4, "2025-02", "North", "B1", "Paracetamol"),
            ],
            glossary: glossary(),
            ..Dataset::default()
        };
        let ev = retrieve_evidence("sales month: 2025-01 North B1", &data, 10, 1);
        assert_eq!(ev.selected_tabs, vec![TabName::Sales]);
        let refs: Vec<usize> = ev.rows.iter().map(|r| r.reference.row_number).collect();
        // row 4 filtered by month; row 2 outranks row 3
        assert_eq!(refs, vec![2, 3]);
        assert!(ev.rows[0].score > ev.rows[1].score);
    }

    #[test]
    fn test_retrieve_ties_break_on_row_number_and_truncate() {
        let data = Dataset {
            stock: vec![stock(5, "Alpha", "X"), stock(3, "Alpha", "Y"), stock(4, "Alpha", "Z")],
            ..Dataset::default()
        };
        let ev = retrieve_evidence("stock alpha", &data, 2, 1);
        let refs: Vec<usize> = ev.rows.iter().map(|r| r.reference.row_number).collect();
        assert_eq!(refs, vec![3, 4]);
    }

    #[test]
    fn test_min_score_and_empty_tables() {
        let data = Dataset {
            crm: vec![CrmRow {
                source: RowRef::new(TabName::Crm, 2),
                week: "W01".to_string(),
                territory: "East".to_string(),
                rep: "Sara".to_string(),
                doctor: "Dr Khan".to_string(),
                specialty: "GP".to_string(),
                visits: Some(2.0),
                coverage_flag: Some(true),
            }],
            ..Dataset::default()
        };
        assert!(retrieve_evidence("doctor visits", &data, 10, 5).rows.is_empty());
        assert!(retrieve_evidence("anything at all", &Dataset::default(), 10, 0).rows.is_empty());
    }
}
