use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
pub const DEFAULT_COMPACT_INTERVAL_SECS: u64 = 30;

/// Runtime settings, read from `CABIN_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// One `<resource>.wal` per resource lives here.
    pub data_dir: PathBuf,
    /// JSON array of household members.
    pub users_file: PathBuf,
    /// WAL appends before the compactor rewrites the log.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = PathBuf::from(
            lookup("CABIN_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()),
        );
        let users_file = lookup("CABIN_USERS_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("users.json"));
        let compact_threshold = lookup("CABIN_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        let compact_interval = lookup("CABIN_COMPACT_INTERVAL_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_COMPACT_INTERVAL_SECS));

        Self {
            data_dir,
            users_file,
            compact_threshold,
            compact_interval,
        }
    }
}
