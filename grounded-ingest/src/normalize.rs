//! Cell parsing and typed-row construction.
//!
//! Unparseable numbers and booleans become `None`; they are excluded from
//! sums downstream but never fail the load.

use grounded_core::{CanonicalMap, CrmRow, GlossaryRow, RowRef, SalesRow, SettingsRow, StockRow, TabName};

use crate::loader::RawRow;

/// Parse a numeric cell. Thousands separators are accepted.
pub fn to_number(cell: &str) -> Option<f64> {
    let s = cell.trim().replace(',', "");
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Parse a boolean cell: `true/yes/y/1` or `false/no/n/0`, any case.
pub fn to_bool(cell: &str) -> Option<bool> {
    match cell.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Some(true),
        "false" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

fn text(raw: &RawRow, col: &str) -> String {
    raw.get(col).trim().to_string()
}

pub fn settings_row(raw: &RawRow) -> SettingsRow {
    SettingsRow {
        source: RowRef::new(TabName::Settings, raw.row_number),
        key: text(raw, "key"),
        value: text(raw, "value"),
    }
}

pub fn glossary_row(raw: &RawRow) -> GlossaryRow {
    GlossaryRow {
        source: RowRef::new(TabName::Glossary, raw.row_number),
        term: text(raw, "term"),
        synonyms: text(raw, "synonyms"),
        canonical: text(raw, "canonical"),
    }
}

pub fn stock_row(raw: &RawRow, canon: &CanonicalMap) -> StockRow {
    StockRow {
        source: RowRef::new(TabName::Stock, raw.row_number),
        distributor: canon.canonicalize(raw.get("distributor")),
        product: canon.canonicalize(raw.get("product")),
        sku: text(raw, "sku"),
        quantity: to_number(raw.get("quantity")),
        last_updated: text(raw, "last_updated"),
    }
}

pub fn sales_row(raw: &RawRow, canon: &CanonicalMap) -> SalesRow {
    SalesRow {
        source: RowRef::new(TabName::Sales, raw.row_number),
        month: text(raw, "month"),
        territory: canon.canonicalize(raw.get("territory")),
        brick: canon.canonicalize(raw.get("brick")),
        rep: canon.canonicalize(raw.get("rep")),
        product: canon.canonicalize(raw.get("product")),
        target: to_number(raw.get("target")),
        achieved: to_number(raw.get("achieved")),
    }
}

pub fn crm_row(raw: &RawRow, canon: &CanonicalMap) -> CrmRow {
    CrmRow {
        source: RowRef::new(TabName::Crm, raw.row_number),
        week: text(raw, "week"),
        territory: canon.canonicalize(raw.get("territory")),
        rep: canon.canonicalize(raw.get("rep")),
        doctor: canon.canonicalize(raw.get("doctor")),
        specialty: canon.canonicalize(raw.get("specialty")),
        visits: to_number(raw.get("visits")),
        coverage_flag: to_bool(raw.get("coverage_flag")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(row_number: usize, pairs: &[(&str, &str)]) -> RawRow {
        RawRow::new(
            row_number,
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        )
    }

    #[test]
    fn test_to_number() {
        assert_eq!(to_number(" 1,200.5 "), Some(1200.5));
        assert_eq!(to_number("-3"), Some(-3.0));
        assert_eq!(to_number(""), None);
        assert_eq!(to_number("n/a"), None);
        assert_eq!(to_number("inf"), None);
    }

    #[test]
    fn test_to_bool() {
        for s in ["TRUE", "yes", "Y", "1"] {
            assert_eq!(to_bool(s), Some(true), "{s}");
        }
        for s in ["false", "No", "n", " 0 "] {
            assert_eq!(to_bool(s), Some(false), "{s}");
        }
        assert_eq!(to_bool("maybe"), None);
        assert_eq!(to_bool(""), None);
    }

    #[test]
    fn test_sales_row_canonicalizes_dimensions_only() {
        let canon = CanonicalMap::from_glossary(&[GlossaryRow {
            source: RowRef::new(TabName::Glossary, 2),
            term: "North".to_string(),
            synonyms: "north region, nr".to_string(),
            canonical: "North".to_string(),
        }]);
        let row = sales_row(
            &raw(
                4,
                &[
                    ("month", " 2025-01 "),
                    ("territory", "NR"),
                    ("target", "1,000"),
                    ("achieved", "oops"),
                ],
            ),
            &canon,
        );
        assert_eq!(row.source, RowRef::new(TabName::Sales, 4));
        assert_eq!(row.month, "2025-01");
        assert_eq!(row.territory, "North");
        assert_eq!(row.brick, "");
        assert_eq!(row.target, Some(1000.0));
        assert_eq!(row.achieved, None);
    }

    #[test]
    fn test_crm_row_parses_flag_and_visits() {
        let row = crm_row(
            &raw(2, &[("week", "W05"), ("visits", "3"), ("coverage_flag", "yes")]),
            &CanonicalMap::default(),
        );
        assert_eq!(row.visits, Some(3.0));
        assert_eq!(row.coverage_flag, Some(true));
    }
}
