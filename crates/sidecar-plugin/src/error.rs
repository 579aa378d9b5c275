//! Error types for plugin hosting and shared channels

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Opening,
    EntryPoint,
    Instantiation,
    Initialization,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::EntryPoint => write!(f, "resolving entry point"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Initialization => write!(f, "initializing module"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Module load failed at {stage} stage: {path}\n  Reason: {reason}")]
    LoadFailed {
        path: PathBuf,
        stage: LoadStage,
        reason: String,
    },

    #[error("Module error at {stage}: code {code}")]
    ModuleError { stage: LoadStage, code: i32 },

    #[error("Shared memory error: {0}")]
    SharedMemory(String),

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Unknown parameter key: {0}")]
    UnknownKey(String),

    #[error("Invalid slot {slot} (have {count})")]
    InvalidSlot { slot: usize, count: usize },

    #[error("No instance loaded in slot {0}")]
    NoInstance(usize),

    #[error("Parameter request failed with code {code}")]
    Rpc { code: u8 },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] sidecar_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PluginError>;
