use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// `$GROUNDED_HOME`, or `~/.grounded`
pub fn grounded_home() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("GROUNDED_HOME") {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".grounded"))
}

pub fn ensure_grounded_home() -> Result<PathBuf> {
    let dir = grounded_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}
