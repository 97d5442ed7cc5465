//! Settings tab: key/value parsing and write-back.

use anyhow::{Context, Result};
use grounded_core::{GroundingMode, Settings, SettingsRow, TabName};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::loader::tab_path;

/// Keys the settings tab is expected to carry
pub const SETTING_KEYS: [&str; 7] = [
    "meta_prompt",
    "assistant_name",
    "grounding_mode",
    "cache_ttl_seconds",
    "max_rows_context",
    "min_retrieval_score",
    "answer_language",
];

/// Resolve settings rows against `defaults`. Blank or unparseable values
/// keep the default.
pub fn parse_settings(rows: &[SettingsRow], defaults: &Settings) -> Settings {
    let kv: HashMap<&str, &str> = rows
        .iter()
        .map(|r| (r.key.trim(), r.value.trim()))
        .filter(|(_, v)| !v.is_empty())
        .collect();

    let text = |key: &str, default: &str| kv.get(key).map(|v| v.to_string()).unwrap_or_else(|| default.to_string());

    fn num<T: std::str::FromStr>(kv: &HashMap<&str, &str>, key: &str, default: T) -> T {
        match kv.get(key) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!(key, value = *v, "unparseable setting, using default");
                default
            }),
            None => default,
        }
    }

    if let Some(mode) = kv.get("grounding_mode").filter(|m| !m.eq_ignore_ascii_case("strict")) {
        warn!(mode = *mode, "unsupported grounding_mode, using strict");
    }

    Settings {
        meta_prompt: text("meta_prompt", &defaults.meta_prompt),
        assistant_name: text("assistant_name", &defaults.assistant_name),
        grounding_mode: GroundingMode::Strict,
        cache_ttl_seconds: num(&kv, "cache_ttl_seconds", defaults.cache_ttl_seconds),
        max_rows_context: num(&kv, "max_rows_context", defaults.max_rows_context),
        min_retrieval_score: num(&kv, "min_retrieval_score", defaults.min_retrieval_score),
        answer_language: text("answer_language", &defaults.answer_language),
    }
}

/// Update `key` in `<dir>/settings.csv`, appending it when absent.
/// Creates the file with a `key,value` header if needed.
pub fn write_setting_value(dir: impl AsRef<Path>, key: &str, value: &str) -> Result<()> {
    let path = tab_path(dir.as_ref(), TabName::Settings);

    let mut header: Vec<String> = vec!["key".to_string(), "value".to_string()];
    let mut records: Vec<Vec<String>> = Vec::new();

    if path.exists() {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_path(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let mut all = rdr.records();
        if let Some(first) = all.next() {
            header = first?.iter().map(|h| h.trim().to_string()).collect();
        }
        for rec in all {
            records.push(rec?.iter().map(str::to_string).collect());
        }
    }

    let key_idx = header.iter().position(|h| h == "key").unwrap_or(0);
    let val_idx = header.iter().position(|h| h == "value").unwrap_or(1);
    let width = header.len().max(key_idx.max(val_idx) + 1);

    let existing = records
        .iter_mut()
        .find(|r| r.get(key_idx).map(|k| k.trim()) == Some(key));

    match existing {
        Some(rec) => {
            if rec.len() < width {
                rec.resize(width, String::new());
            }
            rec[val_idx] = value.to_string();
            info!(key, "updated setting");
        }
        None => {
            let mut rec = vec![String::new(); width];
            rec[key_idx] = key.to_string();
            rec[val_idx] = value.to_string();
            records.push(rec);
            info!(key, "appended setting");
        }
    }

    let mut wtr = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    wtr.write_record(&header)?;
    for rec in &records {
        wtr.write_record(rec)?;
    }
    wtr.flush().with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::read_tab;
    use crate::normalize::settings_row;
    use grounded_core::RowRef;
    use std::fs;
    use std::path::PathBuf;

    fn row(n: usize, key: &str, value: &str) -> SettingsRow {
        SettingsRow {
            source: RowRef::new(TabName::Settings, n),
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("grounded-settings-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_parse_settings_defaults_and_overrides() {
        let rows = vec![
            row(2, "meta_prompt", "You answer for the sales team."),
            row(3, "max_rows_context", "20"),
            row(4, "min_retrieval_score", "abc"),
            row(5, "assistant_name", "  "),
        ];
        let s = parse_settings(&rows, &Settings::default());
        assert_eq!(s.meta_prompt, "You answer for the sales team.");
        assert_eq!(s.max_rows_context, 20);
        assert_eq!(s.min_retrieval_score, 2);
        assert_eq!(s.assistant_name, "Fateen");
        assert_eq!(s.cache_ttl_seconds, 120);
        assert_eq!(s.grounding_mode, GroundingMode::Strict);
    }

    #[test]
    fn test_parse_settings_uses_supplied_defaults() {
        let defaults = Settings {
            cache_ttl_seconds: 30,
            ..Settings::default()
        };
        assert_eq!(parse_settings(&[], &defaults).cache_ttl_seconds, 30);
    }

    #[test]
    fn test_write_setting_creates_updates_and_appends() {
        let dir = scratch_dir("write");

        write_setting_value(&dir, "meta_prompt", "first").unwrap();
        write_setting_value(&dir, "assistant_name", "Nora").unwrap();
        write_setting_value(&dir, "meta_prompt", "second, with comma").unwrap();

        let rows: Vec<SettingsRow> = read_tab(dir.join("settings.csv"))
            .unwrap()
            .iter()
            .map(settings_row)
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].key, "meta_prompt");
        assert_eq!(rows[0].value, "second, with comma");
        assert_eq!(rows[1].value, "Nora");
    }
}
