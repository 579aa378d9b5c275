//! Error types for the interception layer.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShimError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Launch failed: {0}")]
    Launch(String),

    #[error(transparent)]
    Plugin(#[from] sidecar_plugin::PluginError),

    #[error(transparent)]
    Core(#[from] sidecar_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ShimError>;
