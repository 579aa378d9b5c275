//! Interception layer configuration.
//!
//! Read once, from the JSON file named by `SIDECAR_CONFIG`, when the mailbox is
//! first mapped. A missing file gives the defaults below.

use crate::error::{Result, ShimError};
use crate::hotkey::{default_launch_chord, default_toggle_chord, ControlId};
use serde::{Deserialize, Serialize};
use sidecar_core::{load_json_or_default, ChannelConfig, MixMode};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "SIDECAR_CONFIG";
pub const LOG_ENV: &str = "SIDECAR_LOG";
pub const DEFAULT_CONFIG_PATH: &str = "/data/UserData/sidecar/config/features.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    pub mix_mode: MixMode,
    /// Allow the toggle chord to switch to the alternate display.
    pub shadow_ui_enabled: bool,
    /// Allow the launch chord to replace the process.
    pub standalone_enabled: bool,
    /// Copy the full source frame to the mirror channel while displaying.
    pub display_mirror_enabled: bool,
    pub launch_command: PathBuf,
    /// Module directory hosted inside the intercepted process.
    pub inprocess_module: Option<PathBuf>,
    pub inprocess_module_config: String,
    pub toggle_chord: Vec<ControlId>,
    pub launch_chord: Vec<ControlId>,
    /// Ticks the worker may trail before its audio is replaced with silence. 0 disables.
    pub max_producer_lag: u32,
    pub overrun_budget_us: u64,
    pub overrun_skip_threshold: u32,
    pub channels: ChannelConfig,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            mix_mode: MixMode::Add,
            shadow_ui_enabled: true,
            standalone_enabled: false,
            display_mirror_enabled: false,
            launch_command: PathBuf::from("/data/UserData/sidecar/start.sh"),
            inprocess_module: None,
            inprocess_module_config: "{}".to_string(),
            toggle_chord: default_toggle_chord(),
            launch_chord: default_launch_chord(),
            max_producer_lag: 0,
            overrun_budget_us: 2850,
            overrun_skip_threshold: 3,
            channels: ChannelConfig::default(),
        }
    }
}

impl ShimConfig {
    /// Load from `SIDECAR_CONFIG`, or the default location.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = load_json_or_default(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.standalone_enabled && self.launch_command.as_os_str().is_empty() {
            return Err(ShimError::InvalidConfig(
                "standalone_enabled requires launch_command".into(),
            ));
        }
        if self.overrun_budget_us == 0 {
            return Err(ShimError::InvalidConfig(
                "overrun_budget_us must be > 0".into(),
            ));
        }
        if self.overrun_skip_threshold == 0 {
            return Err(ShimError::InvalidConfig(
                "overrun_skip_threshold must be > 0".into(),
            ));
        }
        self.channels.validate()?;
        Ok(())
    }
}
