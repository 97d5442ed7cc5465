//! Keyword heuristics mapping a question to an analytic intent.
//!
//! No LLM involved; the first matching branch wins.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    StockLookup,
    StockSummary,
    TargetVsAchieved,
    TopUnderTarget,
    CoveragePercent,
    AvgVisits,
    TrendMom,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::StockLookup => "stock_lookup",
            Intent::StockSummary => "stock_summary",
            Intent::TargetVsAchieved => "target_vs_achieved",
            Intent::TopUnderTarget => "top_under_target",
            Intent::CoveragePercent => "coverage_percent",
            Intent::AvgVisits => "avg_visits",
            Intent::TrendMom => "trend_mom",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Detect the analytic intent of a question.
///
/// Priority: stock > target/achievement > coverage > visits > trend.
pub fn detect_intent(question: &str) -> Intent {
    let q = question.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| q.contains(k));

    if has(&["stock", "inventory", "quantity", "sku"]) {
        if has(&["summary", "total", "by distributor", "by product"]) {
            return Intent::StockSummary;
        }
        return Intent::StockLookup;
    }

    if has(&["target", "achieved", "achievement"]) {
        if has(&["top", "worst", "under", "below"]) {
            return Intent::TopUnderTarget;
        }
        return Intent::TargetVsAchieved;
    }

    if has(&["coverage", "coverage_flag"]) {
        return Intent::CoveragePercent;
    }

    if has(&["average visits", "avg visits", "visits per"]) {
        return Intent::AvgVisits;
    }

    if has(&["trend", "month over month", "mom"]) {
        return Intent::TrendMom;
    }

    Intent::Unknown
}
