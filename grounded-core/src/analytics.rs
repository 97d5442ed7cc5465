//! Deterministic aggregations over a dataset snapshot.
//!
//! Each function returns `None` when no rows match its scope ("no evidence",
//! not a fault). Results carry bounded preview tables and the `(tab, row)`
//! citations of every row that fed a metric or table row.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::intent::Intent;
use crate::rows::{CrmRow, Dataset, RowRef, SalesRow, StockRow};
use crate::scope::{GroupBy, Scope};

/// Preview table cap
pub const MAX_TABLE_ROWS: usize = 50;
/// Groups returned by `top_under_target` unless the scope says otherwise
pub const DEFAULT_TOP_K: usize = 5;

/// Label used for rows whose grouping key is blank
const BLANK_GROUP: &str = "(blank)";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Metrics {
    StockLookup {
        total_quantity: f64,
        rows: usize,
    },
    StockSummary {
        unique_pairs: usize,
    },
    TargetVsAchieved {
        target: f64,
        achieved: f64,
        achievement_pct: Option<f64>,
    },
    Groups {
        groups: usize,
    },
    Visits {
        total_visits: f64,
        unique_doctors: usize,
        unique_reps: usize,
        avg_visits_per_doctor: Option<f64>,
        avg_visits_per_rep: Option<f64>,
    },
    Months {
        months: usize,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum TableRow {
    Stock {
        distributor: String,
        product: String,
        sku: String,
        quantity: Option<f64>,
        last_updated: String,
    },
    StockPair {
        distributor: String,
        product: String,
        total_quantity: f64,
    },
    Sales {
        month: String,
        territory: String,
        brick: String,
        rep: String,
        product: String,
        target: Option<f64>,
        achieved: Option<f64>,
    },
    Gap {
        group: String,
        target: f64,
        achieved: f64,
        gap: f64,
        achievement_pct: Option<f64>,
    },
    Coverage {
        group: String,
        coverage_pct: Option<f64>,
        covered: usize,
        total: usize,
    },
    Month {
        month: String,
        target: f64,
        achieved: f64,
        achievement_pct: Option<f64>,
    },
}

/// Structured result of one aggregation
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Analysis {
    #[serde(rename = "type")]
    pub kind: Intent,
    pub scope: Scope,
    pub metrics: Metrics,
    pub table: Vec<TableRow>,
    pub notes: Vec<String>,
    pub sources: Vec<RowRef>,
}

/// Sum of the present values; `None` counts as nothing.
pub fn sum(values: impl IntoIterator<Item = Option<f64>>) -> f64 {
    values.into_iter().flatten().sum()
}

/// `n / d * 100`, or `None` if `d` is zero or either side is not finite.
pub fn pct(n: f64, d: f64) -> Option<f64> {
    if !n.is_finite() || !d.is_finite() || d == 0.0 {
        return None;
    }
    Some(n / d * 100.0)
}

/// Deduplicated references in first-seen order
fn dedup_refs(refs: impl IntoIterator<Item = RowRef>) -> Vec<RowRef> {
    let mut seen = HashSet::new();
    refs.into_iter().filter(|r| seen.insert(*r)).collect()
}

fn eq_opt(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().is_none_or(|f| f == value)
}

fn eq_opt_ci(filter: &Option<String>, value: &str) -> bool {
    filter.as_deref().is_none_or(|f| f.to_lowercase() == value.to_lowercase())
}

fn group_key(value: &str) -> String {
    if value.is_empty() {
        BLANK_GROUP.to_string()
    } else {
        value.to_string()
    }
}

/// Accumulator for grouped aggregations. Groups keep first-seen order so
/// equal sort keys resolve the same way on every call.
struct Grouped<T> {
    index: HashMap<String, usize>,
    groups: Vec<(String, T)>,
}

impl<T: Default> Grouped<T> {
    fn new() -> Self {
        Self {
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    fn entry(&mut self, key: String) -> &mut T {
        let idx = match self.index.get(&key) {
            Some(i) => *i,
            None => {
                self.groups.push((key.clone(), T::default()));
                self.index.insert(key, self.groups.len() - 1);
                self.groups.len() - 1
            }
        };
        &mut self.groups[idx].1
    }

    fn len(&self) -> usize {
        self.groups.len()
    }

    fn into_vec(self) -> Vec<(String, T)> {
        self.groups
    }
}

#[derive(Default)]
struct TargetTotals {
    target: f64,
    achieved: f64,
}

#[derive(Default)]
struct CoverageTotals {
    covered: usize,
    total: usize,
}

fn sales_in_scope<'a>(data: &'a Dataset, scope: &Scope, use_month: bool) -> Vec<&'a SalesRow> {
    data.sales
        .iter()
        .filter(|r| {
            (!use_month || eq_opt_ci(&scope.month, &r.month))
                && eq_opt(&scope.territory, &r.territory)
                && eq_opt(&scope.brick, &r.brick)
                && eq_opt(&scope.rep, &r.rep)
                && eq_opt(&scope.product, &r.product)
        })
        .collect()
}

fn crm_in_scope<'a>(data: &'a Dataset, scope: &Scope) -> Vec<&'a CrmRow> {
    data.crm
        .iter()
        .filter(|r| {
            eq_opt_ci(&scope.week, &r.week) && eq_opt(&scope.territory, &r.territory) && eq_opt(&scope.rep, &r.rep)
        })
        .collect()
}

/// Stock rows filtered by distributor/product/sku.
pub fn stock_lookup(data: &Dataset, scope: &Scope) -> Option<Analysis> {
    let rows: Vec<&StockRow> = data
        .stock
        .iter()
        .filter(|r| {
            eq_opt(&scope.distributor, &r.distributor)
                && eq_opt(&scope.product, &r.product)
                && eq_opt(&scope.sku, &r.sku)
        })
        .collect();
    if rows.is_empty() {
        return None;
    }

    Some(Analysis {
        kind: Intent::StockLookup,
        scope: scope.clone(),
        metrics: Metrics::StockLookup {
            total_quantity: sum(rows.iter().map(|r| r.quantity)),
            rows: rows.len(),
        },
        table: rows
            .iter()
            .take(MAX_TABLE_ROWS)
            .map(|r| TableRow::Stock {
                distributor: r.distributor.clone(),
                product: r.product.clone(),
                sku: r.sku.clone(),
                quantity: r.quantity,
                last_updated: r.last_updated.clone(),
            })
            .collect(),
        notes: vec!["Stock rows are listed; totals are sum(quantity) over matched rows.".to_string()],
        sources: dedup_refs(rows.iter().map(|r| r.source)),
    })
}

/// Stock grouped by (distributor, product), largest totals first.
pub fn stock_summary(data: &Dataset, _scope: &Scope) -> Option<Analysis> {
    if data.stock.is_empty() {
        return None;
    }

    let mut by_pair: Grouped<(String, String, f64)> = Grouped::new();
    for r in &data.stock {
        let slot = by_pair.entry(format!("{}||{}", r.distributor, r.product));
        slot.0 = r.distributor.clone();
        slot.1 = r.product.clone();
        slot.2 += r.quantity.unwrap_or(0.0);
    }
    let unique_pairs = by_pair.len();

    let mut pairs: Vec<(String, String, f64)> = by_pair.into_vec().into_iter().map(|(_, p)| p).collect();
    pairs.sort_by(|a, b| b.2.total_cmp(&a.2));
    pairs.truncate(MAX_TABLE_ROWS);

    Some(Analysis {
        kind: Intent::StockSummary,
        scope: Scope::default(),
        metrics: Metrics::StockSummary { unique_pairs },
        table: pairs
            .into_iter()
            .map(|(distributor, product, total_quantity)| TableRow::StockPair {
                distributor,
                product,
                total_quantity,
            })
            .collect(),
        notes: vec!["Summary is aggregated by (distributor, product).".to_string()],
        sources: dedup_refs(data.stock.iter().map(|r| r.source)),
    })
}

/// Summed target and achieved over matched sales rows.
pub fn target_vs_achieved(data: &Dataset, scope: &Scope) -> Option<Analysis> {
    let rows = sales_in_scope(data, scope, true);
    if rows.is_empty() {
        return None;
    }

    let target = sum(rows.iter().map(|r| r.target));
    let achieved = sum(rows.iter().map(|r| r.achieved));

    Some(Analysis {
        kind: Intent::TargetVsAchieved,
        scope: scope.clone(),
        metrics: Metrics::TargetVsAchieved {
            target,
            achieved,
            achievement_pct: pct(achieved, target),
        },
        table: rows.iter().take(MAX_TABLE_ROWS).map(|r| sales_table_row(r)).collect(),
        notes: vec!["Totals are summed across matched sales rows.".to_string()],
        sources: dedup_refs(rows.iter().map(|r| r.source)),
    })
}

fn sales_table_row(r: &SalesRow) -> TableRow {
    TableRow::Sales {
        month: r.month.clone(),
        territory: r.territory.clone(),
        brick: r.brick.clone(),
        rep: r.rep.clone(),
        product: r.product.clone(),
        target: r.target,
        achieved: r.achieved,
    }
}

/// Groups with the largest `target - achieved` gap for an optional month.
///
/// Grouping defaults to brick when a territory was named, territory otherwise.
pub fn top_under_target(data: &Dataset, scope: &Scope) -> Option<Analysis> {
    let rows: Vec<&SalesRow> = data
        .sales
        .iter()
        .filter(|r| eq_opt_ci(&scope.month, &r.month))
        .collect();
    if rows.is_empty() {
        return None;
    }

    let group_by = scope.group_by.unwrap_or(if scope.territory.is_some() {
        GroupBy::Brick
    } else {
        GroupBy::Territory
    });
    let top_k = scope.top_k.unwrap_or(DEFAULT_TOP_K).min(MAX_TABLE_ROWS);

    let mut by: Grouped<TargetTotals> = Grouped::new();
    for r in &rows {
        let key = match group_by {
            GroupBy::Product => &r.product,
            GroupBy::Brick => &r.brick,
            GroupBy::Rep => &r.rep,
            GroupBy::Territory => &r.territory,
        };
        let slot = by.entry(group_key(key));
        slot.target += r.target.unwrap_or(0.0);
        slot.achieved += r.achieved.unwrap_or(0.0);
    }
    let groups = by.len();

    let mut table: Vec<TableRow> = by
        .into_vec()
        .into_iter()
        .map(|(group, t)| TableRow::Gap {
            group,
            target: t.target,
            achieved: t.achieved,
            gap: t.target - t.achieved,
            achievement_pct: pct(t.achieved, t.target),
        })
        .collect();
    table.sort_by(|a, b| gap_of(b).total_cmp(&gap_of(a)));
    table.truncate(top_k);

    Some(Analysis {
        kind: Intent::TopUnderTarget,
        scope: Scope {
            month: scope.month.clone(),
            group_by: Some(group_by),
            top_k: Some(top_k),
            ..Scope::default()
        },
        metrics: Metrics::Groups { groups },
        table,
        notes: vec!["Gap = target - achieved. Sorted by largest gap.".to_string()],
        sources: dedup_refs(rows.iter().map(|r| r.source)),
    })
}

fn gap_of(row: &TableRow) -> f64 {
    match row {
        TableRow::Gap { gap, .. } => *gap,
        _ => 0.0,
    }
}

/// Share of CRM rows with `coverage_flag == true`, per rep or territory.
pub fn coverage_percent(data: &Dataset, scope: &Scope) -> Option<Analysis> {
    let rows = crm_in_scope(data, scope);
    if rows.is_empty() {
        return None;
    }

    // CRM rows only carry rep and territory
    let group_by = match scope.group_by {
        Some(GroupBy::Rep) => GroupBy::Rep,
        Some(_) => GroupBy::Territory,
        None if scope.rep.is_some() => GroupBy::Rep,
        None => GroupBy::Territory,
    };

    let mut by: Grouped<CoverageTotals> = Grouped::new();
    for r in &rows {
        let key = match group_by {
            GroupBy::Rep => &r.rep,
            _ => &r.territory,
        };
        let slot = by.entry(group_key(key));
        slot.total += 1;
        if r.coverage_flag == Some(true) {
            slot.covered += 1;
        }
    }
    let groups = by.len();

    let mut table: Vec<TableRow> = by
        .into_vec()
        .into_iter()
        .map(|(group, c)| TableRow::Coverage {
            group,
            coverage_pct: pct(c.covered as f64, c.total as f64),
            covered: c.covered,
            total: c.total,
        })
        .collect();
    table.sort_by(|a, b| coverage_of(b).total_cmp(&coverage_of(a)));
    table.truncate(MAX_TABLE_ROWS);

    Some(Analysis {
        kind: Intent::CoveragePercent,
        scope: Scope {
            group_by: Some(group_by),
            ..scope.clone()
        },
        metrics: Metrics::Groups { groups },
        table,
        notes: vec!["Coverage% = covered / total (rows where coverage_flag is true).".to_string()],
        sources: dedup_refs(rows.iter().map(|r| r.source)),
    })
}

fn coverage_of(row: &TableRow) -> f64 {
    match row {
        TableRow::Coverage { coverage_pct, .. } => coverage_pct.unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Visit totals and per-doctor / per-rep averages. Aggregate only, no table.
pub fn avg_visits(data: &Dataset, scope: &Scope) -> Option<Analysis> {
    let rows = crm_in_scope(data, scope);
    if rows.is_empty() {
        return None;
    }

    let valid: Vec<&&CrmRow> = rows.iter().filter(|r| r.visits.is_some()).collect();
    let total_visits = sum(valid.iter().map(|r| r.visits));
    let unique_doctors = valid.iter().map(|r| r.doctor.as_str()).collect::<HashSet<_>>().len();
    let unique_reps = valid.iter().map(|r| r.rep.as_str()).collect::<HashSet<_>>().len();

    let per = |n: usize| (n > 0).then(|| total_visits / n as f64);

    Some(Analysis {
        kind: Intent::AvgVisits,
        scope: scope.clone(),
        metrics: Metrics::Visits {
            total_visits,
            unique_doctors,
            unique_reps,
            avg_visits_per_doctor: per(unique_doctors),
            avg_visits_per_rep: per(unique_reps),
        },
        table: Vec::new(),
        notes: vec!["Averages are based on rows with numeric visits.".to_string()],
        sources: dedup_refs(rows.iter().map(|r| r.source)),
    })
}

/// Target/achieved per month label, sorted lexicographically by label.
///
/// Only zero-padded labels such as `2025-01` sort in calendar order.
pub fn trend_mom(data: &Dataset, scope: &Scope) -> Option<Analysis> {
    let rows = sales_in_scope(data, scope, false);
    if rows.is_empty() {
        return None;
    }

    let mut by_month: Grouped<TargetTotals> = Grouped::new();
    for r in &rows {
        let slot = by_month.entry(group_key(&r.month));
        slot.target += r.target.unwrap_or(0.0);
        slot.achieved += r.achieved.unwrap_or(0.0);
    }
    let months = by_month.len();

    let mut series = by_month.into_vec();
    series.sort_by(|a, b| a.0.cmp(&b.0));
    series.truncate(MAX_TABLE_ROWS);

    Some(Analysis {
        kind: Intent::TrendMom,
        scope: scope.clone(),
        metrics: Metrics::Months { months },
        table: series
            .into_iter()
            .map(|(month, t)| TableRow::Month {
                month,
                target: t.target,
                achieved: t.achieved,
                achievement_pct: pct(t.achieved, t.target),
            })
            .collect(),
        notes: vec!["Sorted by month string; prefer ISO-like months (e.g., 2025-01).".to_string()],
        sources: dedup_refs(rows.iter().map(|r| r.source)),
    })
}

/// Run the aggregation for `intent`. `Unknown` has none.
pub fn compute_analysis(intent: Intent, data: &Dataset, scope: &Scope) -> Option<Analysis> {
    match intent {
        Intent::StockLookup => stock_lookup(data, scope),
        Intent::StockSummary => stock_summary(data, scope),
        Intent::TargetVsAchieved => target_vs_achieved(data, scope),
        Intent::TopUnderTarget => top_under_target(data, scope),
        Intent::CoveragePercent => coverage_percent(data, scope),
        Intent::AvgVisits => avg_visits(data, scope),
        Intent::TrendMom => trend_mom(data, scope),
        Intent::Unknown => None,
    }
}
