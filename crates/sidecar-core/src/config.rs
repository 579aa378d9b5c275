//! Shared segment placement and JSON config loading.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where named shared-memory segments are created.
///
/// On Linux `/dev/shm/<prefix><name>` is exactly what `shm_open("/<prefix><name>")`
/// resolves to, so processes that use either API see the same segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub dir: PathBuf,
    pub prefix: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let dir = PathBuf::from("/dev/shm");

        #[cfg(not(target_os = "linux"))]
        let dir = std::env::temp_dir();

        Self {
            dir,
            prefix: "sidecar-".to_string(),
        }
    }
}

impl ChannelConfig {
    /// Config rooted at an arbitrary directory (tests use a temp dir).
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}{}", self.prefix, name))
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(Error::InvalidConfig("channel prefix must not be empty".into()));
        }
        if self.prefix.contains('/') {
            return Err(Error::InvalidConfig(format!(
                "channel prefix {:?} must not contain '/'",
                self.prefix
            )));
        }
        Ok(())
    }
}

/// Read a JSON config file. A missing file yields `T::default()`; a file that
/// exists but does not parse is an error.
pub fn load_json_or_default<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No config at {}, using defaults", path.display());
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}
