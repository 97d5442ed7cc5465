//! Typed rows for the five sheet tabs, plus the settings they resolve to.
//!
//! Every row carries its origin `(tab, row_number)` so any fact derived from
//! it can be cited back to the sheet.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sheet tabs the assistant knows about
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TabName {
    Settings,
    Stock,
    Sales,
    Crm,
    Glossary,
}

impl TabName {
    /// Tabs that hold business data (searched for evidence)
    pub const BUSINESS: [TabName; 3] = [TabName::Stock, TabName::Sales, TabName::Crm];

    pub const ALL: [TabName; 5] = [
        TabName::Settings,
        TabName::Stock,
        TabName::Sales,
        TabName::Crm,
        TabName::Glossary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TabName::Settings => "settings",
            TabName::Stock => "stock",
            TabName::Sales => "sales",
            TabName::Crm => "crm",
            TabName::Glossary => "glossary",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        TabName::ALL.into_iter().find(|t| t.as_str() == name.trim())
    }
}

impl fmt::Display for TabName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Origin of a row: tab plus 1-based sheet row number (header is row 1)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct RowRef {
    pub tab: TabName,
    pub row_number: usize,
}

impl RowRef {
    pub fn new(tab: TabName, row_number: usize) -> Self {
        Self { tab, row_number }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsRow {
    pub source: RowRef,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StockRow {
    pub source: RowRef,
    pub distributor: String,
    pub product: String,
    pub sku: String,
    pub quantity: Option<f64>,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesRow {
    pub source: RowRef,
    /// Month label as written in the sheet, ideally `YYYY-MM`
    pub month: String,
    pub territory: String,
    pub brick: String,
    pub rep: String,
    pub product: String,
    pub target: Option<f64>,
    pub achieved: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrmRow {
    pub source: RowRef,
    pub week: String,
    pub territory: String,
    pub rep: String,
    pub doctor: String,
    pub specialty: String,
    pub visits: Option<f64>,
    pub coverage_flag: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlossaryRow {
    pub source: RowRef,
    pub term: String,
    /// Comma-separated alternate spellings
    pub synonyms: String,
    pub canonical: String,
}

/// A row from any tab. Serializes as the inner row.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Row {
    Settings(SettingsRow),
    Stock(StockRow),
    Sales(SalesRow),
    Crm(CrmRow),
    Glossary(GlossaryRow),
}

impl Row {
    pub fn source(&self) -> RowRef {
        match self {
            Row::Settings(r) => r.source,
            Row::Stock(r) => r.source,
            Row::Sales(r) => r.source,
            Row::Crm(r) => r.source,
            Row::Glossary(r) => r.source,
        }
    }

    /// Plain-text projection of the domain fields, used for relevance scoring.
    /// The origin tag is left out.
    pub fn text(&self) -> String {
        let fields: Vec<String> = match self {
            Row::Settings(r) => vec![r.key.clone(), r.value.clone()],
            Row::Stock(r) => vec![
                r.distributor.clone(),
                r.product.clone(),
                r.sku.clone(),
                num_text(r.quantity),
                r.last_updated.clone(),
            ],
            Row::Sales(r) => vec![
                r.month.clone(),
                r.territory.clone(),
                r.brick.clone(),
                r.rep.clone(),
                r.product.clone(),
                num_text(r.target),
                num_text(r.achieved),
            ],
            Row::Crm(r) => vec![
                r.week.clone(),
                r.territory.clone(),
                r.rep.clone(),
                r.doctor.clone(),
                r.specialty.clone(),
                num_text(r.visits),
                r.coverage_flag.map(|b| b.to_string()).unwrap_or_default(),
            ],
            Row::Glossary(r) => vec![r.term.clone(), r.synonyms.clone(), r.canonical.clone()],
        };
        fields.join(" ")
    }
}

fn num_text(v: Option<f64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_default()
}

/// Immutable bundle of all tabs for one cache window
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub settings: Vec<SettingsRow>,
    pub stock: Vec<StockRow>,
    pub sales: Vec<SalesRow>,
    pub crm: Vec<CrmRow>,
    pub glossary: Vec<GlossaryRow>,
}

impl Dataset {
    /// All rows of a tab, wrapped as [`Row`]
    pub fn rows(&self, tab: TabName) -> Vec<Row> {
        match tab {
            TabName::Settings => self.settings.iter().cloned().map(Row::Settings).collect(),
            TabName::Stock => self.stock.iter().cloned().map(Row::Stock).collect(),
            TabName::Sales => self.sales.iter().cloned().map(Row::Sales).collect(),
            TabName::Crm => self.crm.iter().cloned().map(Row::Crm).collect(),
            TabName::Glossary => self.glossary.iter().cloned().map(Row::Glossary).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroundingMode {
    #[default]
    Strict,
}

/// Grounding configuration resolved from the settings tab
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    pub meta_prompt: String,
    pub assistant_name: String,
    pub grounding_mode: GroundingMode,
    pub cache_ttl_seconds: u64,
    pub max_rows_context: usize,
    pub min_retrieval_score: usize,
    pub answer_language: String,
}

pub const DEFAULT_META_PROMPT: &str = "You are a grounded assistant.";

impl Default for Settings {
    fn default() -> Self {
        Self {
            meta_prompt: DEFAULT_META_PROMPT.to_string(),
            assistant_name: "Fateen".to_string(),
            grounding_mode: GroundingMode::Strict,
            cache_ttl_seconds: 120,
            max_rows_context: 12,
            min_retrieval_score: 2,
            answer_language: "en".to_string(),
        }
    }
}
