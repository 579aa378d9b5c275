//! Plugin hosting and shared channels for sidecar
//!
//! Everything both sides of the process boundary need:
//!
//! - **ABI**: versioned C callback tables ([`abi`]) and a loader that probes v2
//!   before falling back to v1 ([`PluginModule`])
//! - **Channels**: named shared-memory segments ([`ChannelSet`]) and the control
//!   and parameter block layouts ([`protocol`])
//! - **Audio exchange**: the triple-buffered producer/consumer pair with drift
//!   correction ([`AudioProducer`], [`AudioConsumer`])
//! - **Parameter RPC**: polling request/response over the parameter block
//!   ([`ParamClient`], [`ParamServer`])
//!
//! ## Usage
//!
//! ```ignore
//! use sidecar_plugin::{abi::HostApiV1, PluginModule};
//!
//! let module = PluginModule::load("/data/modules/linein".as_ref(), HostApiV1::detached(44100, 128))?;
//! let mut instance = module.instantiate("{}")?;
//! instance.set_param("gain", "0.8")?;
//! ```

pub mod abi;
pub mod error;
pub use error::{LoadStage, PluginError, Result};

mod channels;
pub use channels::ChannelSet;

mod exchange;
pub use exchange::{blocks_to_render, read_index, AudioConsumer, AudioProducer, ConsumeOutcome};

mod instance;
pub use instance::{PluginInstance, V1Instance, V2Instance};

mod loader;
pub use loader::{EntryPoint, PluginModule};

pub mod protocol;
pub use protocol::{ControlBlock, ParamBlock, RING_DEPTH};

mod rpc;
pub use rpc::{error_code, ParamClient, ParamServer, ParamTarget, RpcConfig, RpcMode};

pub mod shared_memory;
pub use shared_memory::SharedSegment;
