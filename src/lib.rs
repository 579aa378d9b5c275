//! # sidecar - cross-process real-time sync
//!
//! Lets unmodified hardware-control software keep running while an interception
//! layer mixes in audio, MIDI handling and an alternate display produced by
//! independent worker processes.
//!
//! ## Architecture
//!
//! sidecar is an umbrella crate over:
//! - **sidecar-core** - mailbox layout, USB-MIDI packets, display slicing, saturating mix
//! - **sidecar-plugin** - plugin ABI and loader, shared channels, audio exchange, parameter RPC
//! - **sidecar-plugin-server** - the `sidecar-worker` process hosting plugin slots
//! - **sidecar-shim** - the interception layer loaded into the host process
//!
//! ## Quick Start
//!
//! ```ignore
//! use sidecar::prelude::*;
//!
//! // Worker side: attach to the channels the interception layer created
//! let mut worker = Worker::from_config(WorkerConfig::default())?;
//! worker.run().await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `preload` - export the interposed `mmap`/`ioctl` symbols

/// Re-export of sidecar-core for direct access
pub use sidecar_core as core;
pub use sidecar_plugin as plugin;
pub use sidecar_plugin_server as worker;
pub use sidecar_shim as shim;

mod error;
pub use error::{Error, Result};

pub mod prelude {
    pub use crate::{Error, Result};

    pub use sidecar_core::{ChannelConfig, Mailbox, MixMode, UsbMidiPacket};
    pub use sidecar_plugin::{
        AudioConsumer, AudioProducer, ChannelSet, ControlBlock, ParamClient, ParamServer,
        PluginInstance, PluginModule, RpcConfig, RpcMode,
    };
    pub use sidecar_plugin_server::{SlotHost, Worker, WorkerConfig};
    pub use sidecar_shim::{DeviceTransport, Interceptor, ShimConfig, TickStats};
}
