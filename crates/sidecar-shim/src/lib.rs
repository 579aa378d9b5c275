//! Interception layer for sidecar
//!
//! Loaded into the unmodified host process (as an `LD_PRELOAD` library with the
//! `preload` feature), it sits in front of the two calls the host uses to talk to
//! the device:
//!
//! - **mapping**: the first mapping of the 4096-byte mailbox is cached and the
//!   shared channels are created next to it
//! - **device control**: every call runs one [`Interceptor::tick`] (gestures,
//!   MIDI forwarding, worker audio mix, in-process plugin, display slice) before
//!   the real call
//!
//! Everything is reachable without the preload hooks through [`Interceptor`] and a
//! [`DeviceTransport`], which is how the tests drive it.
//!
//! ## Example
//!
//! ```ignore
//! use sidecar_shim::{ExecLauncher, Interceptor, LibcTransport, ShimConfig};
//!
//! let transport = LibcTransport::resolve().expect("libc");
//! let mut shim = Interceptor::new(transport, ShimConfig::from_env()?, Box::new(ExecLauncher));
//! ```

pub mod config;
pub mod error;
pub mod hotkey;
pub mod launcher;
pub mod transport;

mod inprocess;
mod interceptor;
mod logging;

#[cfg(feature = "preload")]
mod preload;

pub use config::ShimConfig;
pub use error::{Result, ShimError};
pub use hotkey::{ControlId, Gestures, HotkeyRecognizer};
pub use inprocess::InProcessPlugin;
pub use interceptor::{Interceptor, TickStats};
pub use launcher::{ExecLauncher, Launcher};
pub use logging::init_logging;
pub use transport::{DeviceTransport, LibcTransport};
