//! Centralized error type for the sidecar umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] sidecar_core::Error),

    #[error("Plugin: {0}")]
    Plugin(#[from] sidecar_plugin::PluginError),

    #[error("Shim: {0}")]
    Shim(#[from] sidecar_shim::ShimError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
