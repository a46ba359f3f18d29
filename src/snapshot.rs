use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::world::{World, WorldSnapshot};

/// On-disk envelope around a [`WorldSnapshot`].
#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotFile {
    pub written_at: DateTime<Utc>,
    #[serde(flatten)]
    pub snapshot: WorldSnapshot,
}

pub struct SnapshotWriter {
    dir: PathBuf,
    interval: u64,
}

impl SnapshotWriter {
    pub fn new(dir: impl AsRef<Path>, interval: u64) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            interval,
        }
    }

    pub fn interval(&self) -> u64 {
        self.interval
    }

    /// Writes `<dir>/<scenario>/tick_NNNNNN.json` when the world's tick is a
    /// multiple of the interval. An interval of 0 disables snapshots.
    pub fn maybe_write(&self, world: &World, scenario: &str) -> Result<Option<PathBuf>> {
        if self.interval == 0 || world.tick() % self.interval != 0 {
            return Ok(None);
        }
        let dir = self.dir.join(scenario);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create snapshot dir {}", dir.display()))?;
        let path = dir.join(format!("tick_{:06}.json", world.tick()));
        let file = SnapshotFile {
            written_at: Utc::now(),
            snapshot: world.snapshot(scenario),
        };
        let json = serde_json::to_string_pretty(&file)?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
        log::debug!("wrote snapshot {}", path.display());
        Ok(Some(path))
    }
}
