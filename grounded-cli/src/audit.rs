//! Append-only JSONL audit of answered questions (`~/.grounded/audit.jsonl`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use grounded_core::{QaResponse, RowRef, TabName};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::state::ensure_grounded_home;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub question: String,
    pub selected_tabs: Vec<TabName>,
    pub retrieved_row_refs: Vec<RowRef>,
    pub analysis: Option<serde_json::Value>,
    pub response: String,
    pub refusal: bool,
}

impl AuditEntry {
    pub fn from_response(user: &str, question: &str, resp: &QaResponse) -> Result<Self> {
        let analysis = resp
            .analysis
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("serialize analysis")?;
        Ok(Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user: user.to_string(),
            question: question.to_string(),
            selected_tabs: resp.trace.selected_tabs.clone(),
            retrieved_row_refs: resp.trace.retrieved.clone(),
            analysis,
            response: resp.answer.clone(),
            refusal: resp.refusal,
        })
    }
}

pub fn audit_path() -> Result<PathBuf> {
    Ok(ensure_grounded_home()?.join("audit.jsonl"))
}

/// `$USER`, falling back to "local"
pub fn current_user() -> String {
    std::env::var("USER")
        .ok()
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

pub fn append(path: &Path, entry: &AuditEntry) -> Result<()> {
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    let line = serde_json::to_string(entry).context("serialize audit entry")?;
    writeln!(f, "{line}").with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Last `n` entries, oldest first. Lines that fail to parse are skipped.
pub fn tail(path: &Path, n: usize) -> Result<Vec<AuditEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let entries: Vec<AuditEntry> = s
        .lines()
        .filter(|l| !l.trim().is_empty())
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(e) => Some(e),
            Err(err) => {
                tracing::warn!(error = %err, "skipping unreadable audit line");
                None
            }
        })
        .collect();
    let skip = entries.len().saturating_sub(n);
    Ok(entries.into_iter().skip(skip).collect())
}

pub fn print_entries(entries: &[AuditEntry]) {
    if entries.is_empty() {
        println!("(no audit entries)");
        return;
    }
    for e in entries {
        let first_line = e.response.lines().next().unwrap_or("");
        println!(
            "{} {} {}{} | rows={} | {}",
            e.timestamp.to_rfc3339(),
            e.id,
            if e.refusal { "[refusal] " } else { "" },
            e.question,
            e.retrieved_row_refs.len(),
            first_line
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(question: &str, refusal: bool) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            user: "tester".to_string(),
            question: question.to_string(),
            selected_tabs: vec![TabName::Stock],
            retrieved_row_refs: vec![RowRef::new(TabName::Stock, 2)],
            analysis: None,
            response: "Answer\nmore".to_string(),
            refusal,
        }
    }

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("grounded-audit-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir.join("audit.jsonl")
    }

    #[test]
    fn test_append_then_tail() {
        let path = scratch("tail");
        for q in ["one", "two", "three"] {
            append(&path, &entry(q, false)).unwrap();
        }
        let last = tail(&path, 2).unwrap();
        let qs: Vec<&str> = last.iter().map(|e| e.question.as_str()).collect();
        assert_eq!(qs, vec!["two", "three"]);
        assert_eq!(last[0].retrieved_row_refs, vec![RowRef::new(TabName::Stock, 2)]);
    }

    #[test]
    fn test_tail_skips_garbage_and_missing_file() {
        let path = scratch("garbage");
        assert!(tail(&path, 5).unwrap().is_empty());

        append(&path, &entry("kept", true)).unwrap();
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(f, "{{not json").unwrap();

        let all = tail(&path, 10).unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].refusal);
    }

    #[test]
    fn test_entry_serializes_expected_fields() {
        let v = serde_json::to_value(entry("q", false)).unwrap();
        assert_eq!(v["selected_tabs"][0], "stock");
        assert_eq!(v["retrieved_row_refs"][0]["row_number"], 2);
        assert!(v["timestamp"].as_str().unwrap().contains('T'));
    }
}
