//! Polling parameter RPC over the shared parameter block.
//!
//! One request is outstanding at a time. The caller busy-waits with a bounded
//! timeout; the server answers from its own loop via [`ParamServer::poll`].
//!
//! In [`RpcMode::Compat`] the caller does not use ids at all, so two concurrent
//! callers can corrupt each other. [`RpcMode::Sequenced`] claims the block with a
//! compare-exchange and only accepts a response that echoes its request id.
//!
//! A caller that times out withdraws its request if the server has not taken
//! it yet, so a failed SET is never applied later. Once the server has taken
//! it, the caller waits one more timeout for the answer.

use crate::error::{PluginError, Result};
use crate::protocol::{
    ParamBlock, PARAM_KEY_LEN, PARAM_VALUE_LEN, REQUEST_CLAIMED, REQUEST_GET, REQUEST_NONE,
    REQUEST_SERVING, REQUEST_SET, RPC_BAD_REQUEST, RPC_NO_INSTANCE, RPC_OK, RPC_REJECTED,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RpcMode {
    #[default]
    Compat,
    Sequenced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    pub poll_interval_us: u64,
    pub timeout_ms: u64,
    pub mode: RpcMode,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            poll_interval_us: 1000,
            timeout_ms: 100,
            mode: RpcMode::Compat,
        }
    }
}

impl RpcConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_us == 0 {
            return Err(PluginError::InvalidConfig(
                "rpc poll_interval_us must be > 0".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(PluginError::InvalidConfig("rpc timeout_ms must be > 0".into()));
        }
        Ok(())
    }
}

/// Map a hosting error to the code written into the `error` field.
pub fn error_code(err: &PluginError) -> u8 {
    match err {
        PluginError::InvalidSlot { .. } | PluginError::UnknownKey(_) => RPC_REJECTED,
        PluginError::NoInstance(_) => RPC_NO_INSTANCE,
        _ => RPC_BAD_REQUEST,
    }
}

/// Whatever owns the addressed plugin instances.
pub trait ParamTarget {
    fn set_param(&mut self, slot: usize, key: &str, value: &str) -> Result<()>;

    fn get_param(&mut self, slot: usize, key: &str, buf: &mut [u8]) -> Result<usize>;
}

/// Caller side. Never used from a real-time thread.
pub struct ParamClient<'a> {
    block: &'a ParamBlock,
    config: RpcConfig,
    next_id: AtomicU32,
    // Serialises callers within this process.
    lock: Mutex<()>,
}

impl<'a> ParamClient<'a> {
    pub fn new(block: &'a ParamBlock, config: RpcConfig) -> Self {
        Self {
            block,
            config,
            next_id: AtomicU32::new(1),
            lock: Mutex::new(()),
        }
    }

    pub fn set(&self, slot: u8, key: &str, value: &str) -> Result<()> {
        if value.len() >= PARAM_VALUE_LEN {
            return Err(PluginError::Protocol(format!(
                "value for {key} is {} bytes, limit {}",
                value.len(),
                PARAM_VALUE_LEN - 1
            )));
        }
        self.request(REQUEST_SET, slot, key, value.as_bytes())
            .map(|_| ())
    }

    pub fn get(&self, slot: u8, key: &str) -> Result<String> {
        let bytes = self.request(REQUEST_GET, slot, key, &[])?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    fn request(&self, kind: u8, slot: u8, key: &str, value: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() || key.len() >= PARAM_KEY_LEN {
            return Err(PluginError::Protocol(format!(
                "key must be 1..{} bytes",
                PARAM_KEY_LEN
            )));
        }

        let _guard = self.lock.lock();
        let deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);
        let block = self.block;

        let id = match self.config.mode {
            RpcMode::Compat => 0,
            RpcMode::Sequenced => {
                self.claim(deadline)?;
                self.fresh_id()
            }
        };

        block.slot.store(slot, Ordering::Relaxed);
        block.write_key(key);
        if kind == REQUEST_SET {
            block.write_value(value);
        }
        block.response_ready.store(0, Ordering::Relaxed);
        block.error.store(RPC_OK, Ordering::Relaxed);
        block.request_id.store(id, Ordering::Relaxed);
        block.request_type.store(kind, Ordering::Release);

        let mut deadline = deadline;
        let mut taken = false;
        loop {
            let ready = block.response_ready.load(Ordering::Acquire) != 0;
            let matches = self.config.mode == RpcMode::Compat
                || block.response_id.load(Ordering::Acquire) == id;
            if ready && matches {
                break;
            }
            if Instant::now() >= deadline {
                let withdrawn = block
                    .request_type
                    .compare_exchange(kind, REQUEST_NONE, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok();
                if withdrawn || taken {
                    return Err(self.timed_out(kind, key));
                }
                taken = true;
                deadline = Instant::now() + Duration::from_millis(self.config.timeout_ms);
                continue;
            }
            std::thread::sleep(Duration::from_micros(self.config.poll_interval_us));
        }

        let code = block.error.load(Ordering::Acquire);
        if code != RPC_OK {
            return Err(PluginError::Rpc { code });
        }

        let mut out = Vec::new();
        if kind == REQUEST_GET {
            let len = block.result_len.load(Ordering::Acquire).max(0) as usize;
            block.read_value(len, &mut out);
        }
        Ok(out)
    }

    fn timed_out(&self, kind: u8, key: &str) -> PluginError {
        PluginError::Timeout {
            operation: format!("{} {}", if kind == REQUEST_SET { "set" } else { "get" }, key),
            duration_ms: self.config.timeout_ms,
        }
    }

    fn claim(&self, deadline: Instant) -> Result<()> {
        loop {
            if self
                .block
                .request_type
                .compare_exchange(REQUEST_NONE, REQUEST_CLAIMED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PluginError::Timeout {
                    operation: "waiting for idle parameter block".to_string(),
                    duration_ms: self.config.timeout_ms,
                });
            }
            std::thread::sleep(Duration::from_micros(self.config.poll_interval_us));
        }
    }

    fn fresh_id(&self) -> u32 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

/// Server side: one non-blocking poll per loop iteration.
///
/// Buffers are allocated once, so polling from the tick path does not allocate.
pub struct ParamServer {
    key: Vec<u8>,
    set_value: Vec<u8>,
    value: Vec<u8>,
}

impl Default for ParamServer {
    fn default() -> Self {
        Self::new()
    }
}

impl ParamServer {
    pub fn new() -> Self {
        Self {
            key: Vec::with_capacity(PARAM_KEY_LEN),
            set_value: Vec::with_capacity(PARAM_VALUE_LEN),
            value: vec![0u8; PARAM_VALUE_LEN],
        }
    }

    /// Answer the pending request, if any. Returns true when a response was published.
    pub fn poll(&mut self, block: &ParamBlock, target: &mut dyn ParamTarget) -> bool {
        let kind = block.request_type.load(Ordering::Acquire);
        if matches!(kind, REQUEST_NONE | REQUEST_CLAIMED | REQUEST_SERVING) {
            return false;
        }
        // Lost to a caller withdrawing after its timeout.
        if block
            .request_type
            .compare_exchange(kind, REQUEST_SERVING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let id = block.request_id.load(Ordering::Relaxed);
        let slot = block.slot.load(Ordering::Relaxed) as usize;
        block.read_key(&mut self.key);
        let Ok(key) = std::str::from_utf8(&self.key) else {
            Self::respond(block, id, RPC_BAD_REQUEST, -1);
            return true;
        };

        let (code, len) = match kind {
            REQUEST_SET => {
                block.read_value(PARAM_VALUE_LEN, &mut self.set_value);
                let Ok(value) = std::str::from_utf8(&self.set_value) else {
                    Self::respond(block, id, RPC_BAD_REQUEST, -1);
                    return true;
                };
                match target.set_param(slot, key, value) {
                    Ok(()) => (RPC_OK, 0),
                    Err(e) => {
                        tracing::debug!("set {} on slot {} failed: {}", key, slot, e);
                        (error_code(&e), -1)
                    }
                }
            }
            REQUEST_GET => {
                // Leave room for a terminating NUL.
                let cap = PARAM_VALUE_LEN - 1;
                match target.get_param(slot, key, &mut self.value[..cap]) {
                    Ok(n) => {
                        let n = n.min(cap);
                        block.write_value(&self.value[..n]);
                        (RPC_OK, n as i32)
                    }
                    Err(e) => {
                        tracing::debug!("get {} on slot {} failed: {}", key, slot, e);
                        (error_code(&e), -1)
                    }
                }
            }
            _ => (RPC_BAD_REQUEST, -1),
        };

        Self::respond(block, id, code, len);
        true
    }

    fn respond(block: &ParamBlock, id: u32, code: u8, len: i32) {
        block.error.store(code, Ordering::Relaxed);
        block.result_len.store(len, Ordering::Relaxed);
        block.response_id.store(id, Ordering::Relaxed);
        block.response_ready.store(1, Ordering::Release);
        block.request_type.store(REQUEST_NONE, Ordering::Release);
    }
}
