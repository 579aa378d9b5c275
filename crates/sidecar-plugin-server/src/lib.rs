//! Worker process for sidecar
//!
//! The worker attaches to the shared channels created by the interception layer,
//! hosts a fixed number of plugin slots, renders their mix into the audio ring on
//! the interception layer's clock and answers parameter requests. It runs until
//! the control block's `should_exit` flag is raised.
//!
//! This crate is used by the `sidecar-worker` binary. Hosts embedding the
//! protocol directly should use `sidecar-plugin`.

pub mod config;
pub mod render_thread;
pub mod server;
pub mod slots;
pub mod status;

// Re-exports
pub use config::WorkerConfig;
pub use render_thread::RenderThread;
pub use server::{Worker, WorkerStats};
pub use slots::{MidiBatch, SlotHost};

pub use sidecar_plugin::{PluginError, Result};
