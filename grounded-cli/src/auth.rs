use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};

use crate::llm::Provider;
use crate::state::ensure_grounded_home;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthState {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
}

impl AuthState {
    /// Key for `provider`. The environment wins over auth.json.
    pub fn key_for(&self, provider: Provider) -> Option<String> {
        let (var, stored) = match provider {
            Provider::OpenAI => ("OPENAI_API_KEY", &self.openai_api_key),
            Provider::Anthropic => ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
        };
        std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| stored.clone())
    }
}

fn auth_path() -> Result<std::path::PathBuf> {
    Ok(ensure_grounded_home()?.join("auth.json"))
}

pub fn load_auth() -> Result<AuthState> {
    let p = auth_path()?;
    if !p.exists() {
        return Ok(AuthState::default());
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_auth(auth: &AuthState) -> Result<()> {
    let p = auth_path()?;
    let s = serde_json::to_string_pretty(auth)?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

fn prompt_secret(label: &str) -> Result<String> {
    print!("{}: ", label);
    io::stdout().flush().ok();
    let mut s = String::new();
    io::stdin().read_line(&mut s)?;
    Ok(s.trim().to_string())
}

pub fn set_openai_key() -> Result<()> {
    let mut auth = load_auth()?;
    let key = prompt_secret("Paste OpenAI API key (starts with sk-)")?;
    if !key.starts_with("sk-") {
        bail!("key didn't look like an OpenAI API key (expected prefix sk-)");
    }
    auth.openai_api_key = Some(key);
    save_auth(&auth)?;
    println!("Saved OpenAI API key to ~/.grounded/auth.json");
    Ok(())
}

pub fn set_anthropic_key() -> Result<()> {
    let mut auth = load_auth()?;
    let key = prompt_secret("Paste Anthropic API key (starts with sk-ant-)")?;
    if !key.starts_with("sk-ant-") {
        bail!("key didn't look like an Anthropic API key (expected prefix sk-ant-)");
    }
    auth.anthropic_api_key = Some(key);
    save_auth(&auth)?;
    println!("Saved Anthropic API key to ~/.grounded/auth.json");
    Ok(())
}
