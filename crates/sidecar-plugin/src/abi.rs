//! C ABI shared with loadable audio modules.
//!
//! A module is a shared library (`<module_dir>/dsp.so`) exporting
//! [`ENTRY_V2`], [`ENTRY_V1`], or both. The host passes a [`HostApiV1`] to the
//! entry point and receives a callback table back. Every string crossing this
//! boundary is NUL-terminated UTF-8, and audio is interleaved stereo `i16`.
//!
//! v1 modules have exactly one implicit instance. v2 modules hand out an opaque
//! handle per [`PluginApiV2::create_instance`] call and take that handle as the
//! first argument of every other callback.

use std::ffi::{c_char, c_int, c_void};

pub const API_VERSION_1: u32 = 1;
pub const API_VERSION_2: u32 = 2;

pub const ENTRY_V1: &[u8] = b"sidecar_plugin_init_v1\0";
pub const ENTRY_V2: &[u8] = b"sidecar_plugin_init_v2\0";

/// File name of the module library inside its directory.
pub const MODULE_LIBRARY: &str = "dsp.so";

pub type LogFn = unsafe extern "C" fn(msg: *const c_char);
pub type MidiSendFn = unsafe extern "C" fn(msg: *const u8, len: c_int) -> c_int;

/// Capabilities the host hands to a module.
///
/// `mapped_memory` is only non-null for in-process hosting, where the module may
/// read incoming audio directly at `mapped_memory + audio_in_offset`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct HostApiV1 {
    pub api_version: u32,
    pub sample_rate: c_int,
    pub frames_per_block: c_int,
    pub mapped_memory: *mut u8,
    pub audio_out_offset: c_int,
    pub audio_in_offset: c_int,
    pub log: Option<LogFn>,
    pub midi_send_internal: Option<MidiSendFn>,
    pub midi_send_external: Option<MidiSendFn>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginApiV1 {
    pub api_version: u32,
    pub on_load:
        Option<unsafe extern "C" fn(module_dir: *const c_char, json_config: *const c_char) -> c_int>,
    pub on_unload: Option<unsafe extern "C" fn()>,
    pub on_midi: Option<unsafe extern "C" fn(msg: *const u8, len: c_int, source: c_int)>,
    pub set_param: Option<unsafe extern "C" fn(key: *const c_char, value: *const c_char)>,
    /// Returns bytes written, or a negative value for an unknown key.
    pub get_param:
        Option<unsafe extern "C" fn(key: *const c_char, buf: *mut c_char, buf_len: c_int) -> c_int>,
    pub render_block: Option<unsafe extern "C" fn(out_interleaved: *mut i16, frames: c_int)>,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PluginApiV2 {
    pub api_version: u32,
    pub create_instance: Option<
        unsafe extern "C" fn(module_dir: *const c_char, json_config: *const c_char) -> *mut c_void,
    >,
    pub destroy_instance: Option<unsafe extern "C" fn(instance: *mut c_void)>,
    pub on_midi:
        Option<unsafe extern "C" fn(instance: *mut c_void, msg: *const u8, len: c_int, source: c_int)>,
    pub set_param: Option<
        unsafe extern "C" fn(instance: *mut c_void, key: *const c_char, value: *const c_char),
    >,
    pub get_param: Option<
        unsafe extern "C" fn(
            instance: *mut c_void,
            key: *const c_char,
            buf: *mut c_char,
            buf_len: c_int,
        ) -> c_int,
    >,
    pub render_block:
        Option<unsafe extern "C" fn(instance: *mut c_void, out_interleaved: *mut i16, frames: c_int)>,
}

pub type InitV1Fn = unsafe extern "C" fn(host: *const HostApiV1) -> *mut PluginApiV1;
pub type InitV2Fn = unsafe extern "C" fn(host: *const HostApiV1) -> *mut PluginApiV2;

/// Default logger handed to modules: forwards into `tracing`.
pub unsafe extern "C" fn forward_log(msg: *const c_char) {
    if msg.is_null() {
        return;
    }
    let text = std::ffi::CStr::from_ptr(msg).to_string_lossy();
    tracing::info!(target: "sidecar::plugin", "{}", text);
}

impl HostApiV1 {
    /// Host table for out-of-process hosting: no mailbox access.
    pub fn detached(sample_rate: u32, frames_per_block: usize) -> Self {
        Self {
            api_version: API_VERSION_1,
            sample_rate: sample_rate as c_int,
            frames_per_block: frames_per_block as c_int,
            mapped_memory: std::ptr::null_mut(),
            audio_out_offset: 0,
            audio_in_offset: 0,
            log: Some(forward_log),
            midi_send_internal: None,
            midi_send_external: None,
        }
    }

    /// Host table for in-process hosting with direct mailbox access.
    pub fn with_mailbox(mailbox: sidecar_core::Mailbox) -> Self {
        use sidecar_core::mailbox::{AUDIO_IN_OFFSET, AUDIO_OUT_OFFSET, SAMPLE_RATE};

        Self {
            mapped_memory: mailbox.as_ptr(),
            audio_out_offset: AUDIO_OUT_OFFSET as c_int,
            audio_in_offset: AUDIO_IN_OFFSET as c_int,
            ..Self::detached(SAMPLE_RATE, sidecar_core::FRAMES_PER_BLOCK)
        }
    }
}
