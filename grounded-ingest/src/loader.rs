//! Load sheet tabs exported as CSV (`<dir>/<tab>.csv`, header row first).
//!
//! Rows keep their physical sheet row number so citations point at the same
//! row a person would see in the spreadsheet (header = row 1).

use anyhow::{Context, Result};
use grounded_core::{CanonicalMap, Dataset, TabName};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::normalize;

/// One data row keyed by trimmed header name
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub row_number: usize,
    cells: HashMap<String, String>,
}

impl RawRow {
    pub fn new(row_number: usize, cells: HashMap<String, String>) -> Self {
        Self { row_number, cells }
    }

    /// Cell for `column`, or "" when the column is missing
    pub fn get(&self, column: &str) -> &str {
        self.cells.get(column).map(String::as_str).unwrap_or("")
    }
}

pub fn tab_path(dir: &Path, tab: TabName) -> PathBuf {
    dir.join(format!("{}.csv", tab.as_str()))
}

/// Read one tab. A missing file is an empty tab.
pub fn read_tab(path: impl AsRef<Path>) -> Result<Vec<RawRow>> {
    let path = path.as_ref();
    if !path.exists() {
        debug!(path = %path.display(), "tab file missing, treating as empty");
        return Ok(Vec::new());
    }

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;

    let headers: Vec<String> = rdr
        .headers()
        .with_context(|| format!("reading header of {}", path.display()))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    let mut skipped = 0usize;

    // record index, not text line: quoted cells may span lines
    for (i, result) in rdr.records().enumerate() {
        let record = result.with_context(|| format!("reading {}", path.display()))?;
        let row_number = i + 2;

        if record.iter().all(|c| c.trim().is_empty()) {
            skipped += 1;
            continue;
        }

        let cells = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();

        rows.push(RawRow::new(row_number, cells));
    }

    debug!(path = %path.display(), rows = rows.len(), skipped, "read tab");
    Ok(rows)
}

/// Load every tab from `dir` into a normalized [`Dataset`].
///
/// The glossary is read first so stock, sales and CRM values can be
/// canonicalized on the way in.
pub fn load_dataset(dir: impl AsRef<Path>) -> Result<Dataset> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        anyhow::bail!("data directory not found: {}", dir.display());
    }

    let glossary: Vec<_> = read_tab(tab_path(dir, TabName::Glossary))?
        .iter()
        .map(normalize::glossary_row)
        .collect();
    let canon = CanonicalMap::from_glossary(&glossary);

    let settings = read_tab(tab_path(dir, TabName::Settings))?
        .iter()
        .map(normalize::settings_row)
        .collect();
    let stock = read_tab(tab_path(dir, TabName::Stock))?
        .iter()
        .map(|r| normalize::stock_row(r, &canon))
        .collect();
    let sales = read_tab(tab_path(dir, TabName::Sales))?
        .iter()
        .map(|r| normalize::sales_row(r, &canon))
        .collect();
    let crm = read_tab(tab_path(dir, TabName::Crm))?
        .iter()
        .map(|r| normalize::crm_row(r, &canon))
        .collect();

    let data = Dataset {
        settings,
        stock,
        sales,
        crm,
        glossary,
    };

    info!(
        dir = %dir.display(),
        stock = data.stock.len(),
        sales = data.sales.len(),
        crm = data.crm.len(),
        glossary = data.glossary.len(),
        canonical_terms = canon.len(),
        "loaded dataset"
    );
    Ok(data)
}
