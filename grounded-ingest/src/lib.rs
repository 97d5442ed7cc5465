//! grounded-ingest: sheet tabs from CSV exports, value normalization,
//! settings, and the snapshot cache.

pub mod loader;
pub mod normalize;
pub mod settings;
pub mod cache;

pub use loader::{load_dataset, read_tab, RawRow};
pub use normalize::{to_bool, to_number};
pub use settings::{parse_settings, write_setting_value, SETTING_KEYS};
pub use cache::{CsvDirectory, DatasetProvider, Snapshot, SnapshotCache};
