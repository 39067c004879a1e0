use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Path of the SQLite database, `:memory:` for an in-process store.
    pub storage_path: String,
    /// How often the expiry loop scans for due leases.
    #[serde(with = "humantime_serde", default = "default_expiry_poll_period")]
    pub expiry_poll_period: Duration,
    /// How long an event id may stay missing before the gap filler declares
    /// it dead.
    #[serde(with = "humantime_serde", default = "default_gap_grace_period")]
    pub gap_grace_period: Duration,
    /// How often the gap filler sweeps the log.
    #[serde(with = "humantime_serde", default = "default_gap_sweep_period")]
    pub gap_sweep_period: Duration,
}

fn default_expiry_poll_period() -> Duration {
    Duration::from_secs(10)
}

fn default_gap_grace_period() -> Duration {
    Duration::from_secs(60)
}

fn default_gap_sweep_period() -> Duration {
    Duration::from_secs(10)
}

impl Config {
    #[must_use]
    pub fn new(storage_path: impl Into<String>) -> Self {
        Self {
            storage_path: storage_path.into(),
            expiry_poll_period: default_expiry_poll_period(),
            gap_grace_period: default_gap_grace_period(),
            gap_sweep_period: default_gap_sweep_period(),
        }
    }

    #[must_use]
    pub fn using_inmemory_storage(&self) -> bool {
        goku_storage::is_in_memory(&self.storage_path)
    }

    pub fn sanitize(&self) -> anyhow::Result<()> {
        if !self.using_inmemory_storage() {
            let path = std::path::Path::new(&self.storage_path);
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty()
                    && !dir.exists()
                    && std::fs::DirBuilder::new()
                        .recursive(true)
                        .create(dir)
                        .is_err()
                {
                    return Err(anyhow::Error::msg("Failed to create storage directory"));
                }
            }
        }

        Ok(())
    }
}
