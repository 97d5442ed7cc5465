use anyhow::{Context, Result};
use grounded_core::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::llm::Provider;
use crate::state::ensure_grounded_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub llm: LlmSection,
    pub data: DataSection,
    pub defaults: DefaultsSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: Provider,
    pub model: String,
    /// Provider default when unset
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSection {
    /// Directory holding `<tab>.csv` exports
    pub dir: PathBuf,
}

/// Used for keys the settings tab leaves blank
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsSection {
    pub cache_ttl_seconds: u64,
    pub max_rows_context: usize,
    pub min_retrieval_score: usize,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAI,
            model: "gpt-4.1-mini".to_string(),
            base_url: None,
            temperature: 0.0,
            timeout_secs: 60,
        }
    }
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./sheet"),
        }
    }
}

impl Default for DefaultsSection {
    fn default() -> Self {
        let s = Settings::default();
        Self {
            cache_ttl_seconds: s.cache_ttl_seconds,
            max_rows_context: s.max_rows_context,
            min_retrieval_score: s.min_retrieval_score,
        }
    }
}

impl Config {
    pub fn settings_defaults(&self) -> Settings {
        Settings {
            cache_ttl_seconds: self.defaults.cache_ttl_seconds,
            max_rows_context: self.defaults.max_rows_context,
            min_retrieval_score: self.defaults.min_retrieval_score,
            ..Settings::default()
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_grounded_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    let p = config_path()?;
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).context("parse config.toml")
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.llm.provider, Provider::OpenAI);
        assert_eq!(cfg.llm.model, "gpt-4.1-mini");
        assert_eq!(cfg.llm.timeout_secs, 60);
        assert_eq!(cfg.data.dir, PathBuf::from("./sheet"));
        assert_eq!(cfg.defaults.max_rows_context, 12);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
[llm]
provider = "anthropic"
model = "claude-sonnet-4-5"

[defaults]
min_retrieval_score = 3
"#,
        )
        .unwrap();
        assert_eq!(cfg.llm.provider, Provider::Anthropic);
        assert_eq!(cfg.llm.timeout_secs, 60);
        assert_eq!(cfg.defaults.min_retrieval_score, 3);
        assert_eq!(cfg.defaults.cache_ttl_seconds, 120);

        let s = cfg.settings_defaults();
        assert_eq!(s.min_retrieval_score, 3);
        assert_eq!(s.assistant_name, "Fateen");
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut cfg = Config::default();
        cfg.llm.base_url = Some("http://localhost:8080".to_string());
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.llm.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(back.data.dir, cfg.data.dir);
    }
}
