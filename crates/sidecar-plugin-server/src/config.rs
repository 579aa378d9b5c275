//! Worker configuration.

use serde::{Deserialize, Serialize};
use sidecar_core::ChannelConfig;
use sidecar_plugin::{PluginError, Result, RING_DEPTH};
use std::path::PathBuf;
use std::time::Duration;

pub const MAX_SLOTS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Module hosted in every slot. `None` runs the worker with empty slots.
    pub module_dir: Option<PathBuf>,
    /// Opaque JSON handed to each slot's instance; missing entries get `"{}"`.
    pub slot_configs: Vec<String>,
    pub slot_count: usize,
    pub poll_interval_us: u64,
    /// Render on a background thread into a small queue instead of inline.
    pub render_thread: bool,
    pub render_ahead_blocks: usize,
    /// Blocks rendered when more than a ring's worth of ticks is due.
    pub max_catch_up: usize,
    pub channels: ChannelConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            module_dir: None,
            slot_configs: Vec::new(),
            slot_count: 4,
            poll_interval_us: 1000,
            render_thread: false,
            render_ahead_blocks: 2,
            max_catch_up: 1,
            channels: ChannelConfig::default(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 || self.slot_count > MAX_SLOTS {
            return Err(PluginError::InvalidConfig(format!(
                "slot_count {} out of range (1-{})",
                self.slot_count, MAX_SLOTS
            )));
        }
        if self.slot_configs.len() > self.slot_count {
            return Err(PluginError::InvalidConfig(format!(
                "{} slot configs for {} slots",
                self.slot_configs.len(),
                self.slot_count
            )));
        }
        if self.poll_interval_us == 0 {
            return Err(PluginError::InvalidConfig(
                "poll_interval_us must be > 0".into(),
            ));
        }
        if self.render_ahead_blocks == 0 {
            return Err(PluginError::InvalidConfig(
                "render_ahead_blocks must be > 0".into(),
            ));
        }
        if self.max_catch_up == 0 || self.max_catch_up > RING_DEPTH {
            return Err(PluginError::InvalidConfig(format!(
                "max_catch_up {} out of range (1-{})",
                self.max_catch_up, RING_DEPTH
            )));
        }
        self.channels.validate()?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_micros(self.poll_interval_us)
    }

    pub fn slot_config(&self, slot: usize) -> &str {
        self.slot_configs.get(slot).map(String::as_str).unwrap_or("{}")
    }
}
