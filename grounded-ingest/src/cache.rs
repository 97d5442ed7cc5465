//! TTL cache around a dataset provider.
//!
//! The core never sees this: each request receives an already resolved
//! [`Snapshot`]. The TTL comes from the settings the snapshot itself loaded.

use anyhow::Result;
use grounded_core::{Dataset, Settings};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::loader::load_dataset;
use crate::settings::parse_settings;

/// Dataset plus the settings resolved from it
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub dataset: Dataset,
    pub settings: Settings,
    pub loaded_at: Instant,
}

impl Snapshot {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.settings.cache_ttl_seconds)
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now.duration_since(self.loaded_at) < self.ttl()
    }
}

/// Anything that can produce the current dataset and settings
pub trait DatasetProvider {
    fn load(&self) -> Result<(Dataset, Settings)>;
}

/// Sheet exported as a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvDirectory {
    pub dir: PathBuf,
    /// Fallbacks for keys the settings tab leaves out
    pub defaults: Settings,
}

impl CsvDirectory {
    pub fn new(dir: impl Into<PathBuf>, defaults: Settings) -> Self {
        Self {
            dir: dir.into(),
            defaults,
        }
    }
}

impl DatasetProvider for CsvDirectory {
    fn load(&self) -> Result<(Dataset, Settings)> {
        let dataset = load_dataset(&self.dir)?;
        let settings = parse_settings(&dataset.settings, &self.defaults);
        Ok((dataset, settings))
    }
}

pub struct SnapshotCache<P> {
    provider: P,
    current: Option<Arc<Snapshot>>,
}

impl<P: DatasetProvider> SnapshotCache<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            current: None,
        }
    }

    /// Cached snapshot while fresh, otherwise a reload.
    pub fn get(&mut self) -> Result<Arc<Snapshot>> {
        if let Some(snap) = &self.current {
            if snap.is_fresh(Instant::now()) {
                return Ok(Arc::clone(snap));
            }
        }
        self.reload()
    }

    /// Drop the cached snapshot and load a new one.
    pub fn force_refresh(&mut self) -> Result<Arc<Snapshot>> {
        self.current = None;
        self.reload()
    }

    fn reload(&mut self) -> Result<Arc<Snapshot>> {
        let (dataset, settings) = self.provider.load()?;
        let snap = Arc::new(Snapshot {
            dataset,
            settings,
            loaded_at: Instant::now(),
        });
        info!(ttl_secs = snap.settings.cache_ttl_seconds, "snapshot refreshed");
        self.current = Some(Arc::clone(&snap));
        Ok(snap)
    }
}
