//! Optional `rompy.toml` configuration.
//!
//! Discovery prefers a file in the working directory, then the platform
//! config dir. The file only supplies *defaults*; `OMP_*` environment
//! variables always win (see `icv`). A file that fails to parse is treated
//! as absent so a stray config can never take the runtime down.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Default, Clone)]
pub struct ConfigFileData {
    #[serde(default)]
    pub runtime: FileConfig,
}

/// `[runtime]` table of `rompy.toml`.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct FileConfig {
    /// Default `num_threads` list for top-level and nested regions.
    #[serde(default)]
    pub num_threads: Option<Vec<i64>>,
    /// Default runtime schedule, same grammar as `OMP_SCHEDULE`.
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub max_active_levels: Option<i64>,
    #[serde(default)]
    pub thread_limit: Option<i64>,
}

impl FileConfig {
    /// Best-effort config path following platform conventions.
    pub fn discover_path() -> PathBuf {
        let local = PathBuf::from("rompy.toml");
        if local.exists() {
            return local;
        }
        if let Some(dir) = dirs::config_dir() {
            return dir.join("rompy").join("rompy.toml");
        }
        PathBuf::from("rompy.toml")
    }

    pub fn discover() -> FileConfig {
        Self::load_from(&Self::discover_path())
    }

    pub fn load_from(path: &std::path::Path) -> FileConfig {
        let Ok(content) = std::fs::read_to_string(path) else {
            debug!(target: "config", path = %path.display(), "no config file");
            return FileConfig::default();
        };
        match toml::from_str::<ConfigFileData>(&content) {
            Ok(data) => {
                info!(target: "config", path = %path.display(), "loaded runtime config");
                data.runtime
            }
            Err(err) => {
                info!(
                    target: "config",
                    path = %path.display(),
                    error = %err,
                    "config unparseable, using defaults"
                );
                FileConfig::default()
            }
        }
    }
}
