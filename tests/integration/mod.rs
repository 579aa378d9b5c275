//! Integration test modules for sidecar
//!
//! - interception: MIDI forwarding, audio mixing, gestures, display slicing
//! - worker: host/worker audio exchange and shutdown
//! - rpc: parameter RPC against worker and in-process servers

pub mod interception;
pub mod rpc;
pub mod worker;
