use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::limits::DEFAULT_SEGMENT_MINUTES;

/// Process settings, read from `SLOTLEDGER_*` environment variables.
/// Missing or unparseable values fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub segment_minutes: u32,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            segment_minutes: DEFAULT_SEGMENT_MINUTES,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            lookup(key).and_then(|s| s.parse().ok())
        }

        let defaults = Self::default();
        Self {
            data_dir: lookup("SLOTLEDGER_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            segment_minutes: parsed(&lookup, "SLOTLEDGER_SEGMENT_MINUTES").unwrap_or(defaults.segment_minutes),
            compact_threshold: parsed(&lookup, "SLOTLEDGER_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed(&lookup, "SLOTLEDGER_COMPACT_INTERVAL_SECS")
                .map_or(defaults.compact_interval, Duration::from_secs),
            metrics_port: parsed(&lookup, "SLOTLEDGER_METRICS_PORT"),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("ledger.wal")
    }
}
