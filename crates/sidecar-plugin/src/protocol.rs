//! Layouts of the shared control and parameter blocks, plus channel names and sizes.
//!
//! Every field has exactly one designated writer. Fields are atomics so any
//! process can read them without tearing; there are no cross-process locks.

use sidecar_core::display::DISPLAY_BUFFER_SIZE;
use sidecar_core::mailbox::{AUDIO_BLOCK_BYTES, MIDI_BUFFER_SIZE};
use std::sync::atomic::{AtomicI32, AtomicU16, AtomicU32, AtomicU8, Ordering};

/// Depth of the shared audio ring.
pub const RING_DEPTH: usize = 3;

pub const AUDIO_RING_NAME: &str = "audio";
pub const MOVE_AUDIO_IN_NAME: &str = "movein";
pub const MIDI_NAME: &str = "midi";
pub const DISPLAY_NAME: &str = "display";
pub const DISPLAY_LIVE_NAME: &str = "display-live";
pub const CONTROL_NAME: &str = "control";
pub const PARAM_NAME: &str = "param";

pub const AUDIO_RING_SIZE: usize = RING_DEPTH * AUDIO_BLOCK_BYTES;
pub const MOVE_AUDIO_IN_SIZE: usize = AUDIO_BLOCK_BYTES;
pub const MIDI_SIZE: usize = MIDI_BUFFER_SIZE;
pub const DISPLAY_SIZE: usize = DISPLAY_BUFFER_SIZE;
pub const CONTROL_SIZE: usize = 64;

pub const PARAM_KEY_LEN: usize = 64;
pub const PARAM_VALUE_LEN: usize = 65_536;
pub const PARAM_SIZE: usize = std::mem::size_of::<ParamBlock>();

/// Types that may be viewed in place inside a shared segment.
///
/// # Safety
/// Implementors must be `repr(C)`, contain only atomics (or padding that is never
/// read), and accept the all-zero bit pattern as a valid initial state.
pub unsafe trait SharedLayout: Sized {}

/// Cross-process flags and cursors. 64 bytes.
///
/// | field | writer |
/// |---|---|
/// | `display_mode` | interception layer (toggle gesture) |
/// | `shadow_ready` | worker |
/// | `should_exit` | either side, one-shot |
/// | `midi_ready` | interception layer, +1 per forwarded batch |
/// | `write_idx` | worker |
/// | `read_idx` | interception layer |
/// | `ui_slot`, `ui_flags`, `ui_patch_index`, `ui_request_id` | UI worker |
/// | `shim_counter` | interception layer, +1 per tick |
/// | `selected_slot`, `shift_held` | interception layer |
/// | `producer_counter` | worker |
#[repr(C)]
#[derive(Debug)]
pub struct ControlBlock {
    pub display_mode: AtomicU8,
    pub shadow_ready: AtomicU8,
    pub should_exit: AtomicU8,
    pub midi_ready: AtomicU8,
    pub write_idx: AtomicU8,
    pub read_idx: AtomicU8,
    pub ui_slot: AtomicU8,
    pub ui_flags: AtomicU8,
    pub ui_patch_index: AtomicU16,
    _reserved0: AtomicU16,
    pub ui_request_id: AtomicU32,
    pub shim_counter: AtomicU32,
    pub selected_slot: AtomicU8,
    pub shift_held: AtomicU8,
    _reserved1: [AtomicU8; 2],
    pub producer_counter: AtomicU32,
    _reserved2: [AtomicU8; 36],
}

const _: () = assert!(std::mem::size_of::<ControlBlock>() == CONTROL_SIZE);

unsafe impl SharedLayout for ControlBlock {}

impl ControlBlock {
    pub fn is_set(flag: &AtomicU8) -> bool {
        flag.load(Ordering::Acquire) != 0
    }

    pub fn set(flag: &AtomicU8, on: bool) {
        flag.store(on as u8, Ordering::Release);
    }

    /// Flip `display_mode` and return the new value.
    pub fn toggle_display_mode(&self) -> bool {
        self.display_mode.fetch_xor(1, Ordering::AcqRel) == 0
    }

    pub fn request_exit(&self) {
        self.should_exit.store(1, Ordering::Release);
    }
}

pub const REQUEST_NONE: u8 = 0;
pub const REQUEST_SET: u8 = 1;
pub const REQUEST_GET: u8 = 2;
/// Held by a sequenced caller while it fills in the request fields.
pub const REQUEST_CLAIMED: u8 = 3;
/// Held by the server while it runs a request; the caller can no longer withdraw it.
pub const REQUEST_SERVING: u8 = 4;

pub const RPC_OK: u8 = 0;
/// Slot out of range or unknown key.
pub const RPC_REJECTED: u8 = 1;
pub const RPC_NO_INSTANCE: u8 = 2;
pub const RPC_BAD_REQUEST: u8 = 3;

/// Single outstanding parameter request.
///
/// The caller writes `slot`, `key`, `value`, `request_id` and finally
/// `request_type`. The server writes `value`, `error`, `result_len`,
/// `response_id`, then `response_ready`, then resets `request_type` to idle.
#[repr(C)]
#[derive(Debug)]
pub struct ParamBlock {
    pub request_type: AtomicU8,
    pub slot: AtomicU8,
    pub response_ready: AtomicU8,
    pub error: AtomicU8,
    pub result_len: AtomicI32,
    pub request_id: AtomicU32,
    pub response_id: AtomicU32,
    key: [AtomicU8; PARAM_KEY_LEN],
    value: [AtomicU8; PARAM_VALUE_LEN],
}

unsafe impl SharedLayout for ParamBlock {}

fn store_str(dst: &[AtomicU8], text: &[u8]) {
    for (cell, &b) in dst.iter().zip(text) {
        cell.store(b, Ordering::Relaxed);
    }
    if let Some(cell) = dst.get(text.len()) {
        cell.store(0, Ordering::Relaxed);
    }
}

fn load_str(src: &[AtomicU8], out: &mut Vec<u8>) {
    out.clear();
    for cell in src {
        let b = cell.load(Ordering::Relaxed);
        if b == 0 {
            break;
        }
        out.push(b);
    }
}

impl ParamBlock {
    /// Writes a NUL-terminated key. Callers check the length first.
    pub fn write_key(&self, key: &str) {
        store_str(&self.key, key.as_bytes());
    }

    pub fn read_key(&self, out: &mut Vec<u8>) {
        load_str(&self.key, out);
    }

    pub fn write_value(&self, value: &[u8]) {
        store_str(&self.value, value);
    }

    /// Reads up to `len` bytes, stopping early at a NUL.
    pub fn read_value(&self, len: usize, out: &mut Vec<u8>) {
        load_str(&self.value[..len.min(PARAM_VALUE_LEN)], out);
    }
}
