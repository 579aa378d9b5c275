//! Plugin instance trait and the v1/v2 ABI wrappers behind it.

use crate::abi::{PluginApiV1, PluginApiV2};
use crate::error::{LoadStage, PluginError, Result};
use crate::loader::PluginModule;
use crate::protocol::{PARAM_KEY_LEN, PARAM_VALUE_LEN};
use sidecar_core::{AudioBlock, MidiSource, FRAMES_PER_BLOCK};
use std::ffi::{c_char, c_int, c_void, CString};
use std::path::Path;
use std::sync::Arc;

/// Uniform interface over v1 and v2 module instances.
///
/// Worker slots and the in-process host only ever see this trait, so tests can
/// substitute plain Rust implementations.
pub trait PluginInstance: Send {
    fn api_version(&self) -> u32;

    fn on_midi(&mut self, msg: &[u8], source: MidiSource);

    /// Unknown keys must leave the instance untouched. ABI modules have no
    /// status for a set, so for them that check is the module's own.
    fn set_param(&mut self, key: &str, value: &str) -> Result<()>;

    /// Writes the value into `buf` and returns its length.
    fn get_param(&mut self, key: &str, buf: &mut [u8]) -> Result<usize>;

    /// Fill `out` with exactly one block. `out` is zeroed before the module runs,
    /// so a module that writes nothing yields silence.
    fn render_block(&mut self, out: &mut AudioBlock);

    fn get_param_string(&mut self, key: &str) -> Result<String> {
        let mut buf = vec![0u8; PARAM_VALUE_LEN];
        let len = self.get_param(key, &mut buf)?;
        buf.truncate(len);
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn c_string(text: &str, what: &str) -> Result<CString> {
    CString::new(text).map_err(|_| PluginError::Protocol(format!("{what} contains a NUL byte")))
}

fn c_path(path: &Path) -> Result<CString> {
    c_string(&path.to_string_lossy(), "module path")
}

/// NUL-terminated copies of keys and values, reused across calls so the
/// parameter path does not allocate.
struct CStrings {
    buf: Vec<u8>,
}

impl CStrings {
    fn new() -> Self {
        Self {
            buf: Vec::with_capacity(PARAM_KEY_LEN + PARAM_VALUE_LEN + 2),
        }
    }

    fn push(&mut self, text: &str, what: &str) -> Result<usize> {
        if text.as_bytes().contains(&0) {
            return Err(PluginError::Protocol(format!("{what} contains a NUL byte")));
        }
        let start = self.buf.len();
        self.buf.extend_from_slice(text.as_bytes());
        self.buf.push(0);
        Ok(start)
    }

    /// Valid until the next call.
    fn key(&mut self, key: &str) -> Result<*const c_char> {
        self.buf.clear();
        self.push(key, "parameter key")?;
        Ok(self.buf.as_ptr().cast())
    }

    /// Valid until the next call.
    fn key_value(&mut self, key: &str, value: &str) -> Result<(*const c_char, *const c_char)> {
        self.buf.clear();
        let k = self.push(key, "parameter key")?;
        let v = self.push(value, "parameter value")?;
        Ok((self.buf[k..].as_ptr().cast(), self.buf[v..].as_ptr().cast()))
    }
}

/// Call a module getter and turn its snprintf-style return into a length.
fn read_param(
    key: &str,
    c_key: *const c_char,
    buf: &mut [u8],
    call: impl FnOnce(*const c_char, *mut c_char, c_int) -> c_int,
) -> Result<usize> {
    if buf.is_empty() {
        return Err(PluginError::Protocol("empty parameter buffer".into()));
    }
    buf.fill(0);
    let len = c_int::try_from(buf.len()).unwrap_or(c_int::MAX);
    let rc = call(c_key, buf.as_mut_ptr() as *mut c_char, len);
    if rc < 0 {
        return Err(PluginError::UnknownKey(key.to_string()));
    }
    // snprintf reports the untruncated length; the NUL bounds what was actually written.
    let written = (rc as usize).min(buf.len());
    Ok(buf[..written].iter().position(|&b| b == 0).unwrap_or(written))
}

/// The single implicit instance of a v1 module.
pub struct V1Instance {
    module: Arc<PluginModule>,
    api: PluginApiV1,
    strings: CStrings,
}

// SAFETY: the callback table points into the module library, kept alive by `module`.
unsafe impl Send for V1Instance {}

impl V1Instance {
    pub(crate) fn new(module: Arc<PluginModule>, api: PluginApiV1, json_config: &str) -> Result<Self> {
        let dir = c_path(module.dir())?;
        let config = c_string(json_config, "module config")?;

        if let Some(on_load) = api.on_load {
            let rc = unsafe { on_load(dir.as_ptr(), config.as_ptr()) };
            if rc != 0 {
                return Err(PluginError::ModuleError {
                    stage: LoadStage::Initialization,
                    code: rc,
                });
            }
        }
        Ok(Self {
            module,
            api,
            strings: CStrings::new(),
        })
    }
}

impl PluginInstance for V1Instance {
    fn api_version(&self) -> u32 {
        crate::abi::API_VERSION_1
    }

    fn on_midi(&mut self, msg: &[u8], source: MidiSource) {
        if let Some(on_midi) = self.api.on_midi {
            unsafe { on_midi(msg.as_ptr(), msg.len() as c_int, source as c_int) };
        }
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<()> {
        let Some(set) = self.api.set_param else {
            return Err(PluginError::UnknownKey(key.to_string()));
        };
        let (c_key, c_value) = self.strings.key_value(key, value)?;
        unsafe { set(c_key, c_value) };
        Ok(())
    }

    fn get_param(&mut self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let Some(get) = self.api.get_param else {
            return Err(PluginError::UnknownKey(key.to_string()));
        };
        let c_key = self.strings.key(key)?;
        read_param(key, c_key, buf, |k, b, n| unsafe { get(k, b, n) })
    }

    fn render_block(&mut self, out: &mut AudioBlock) {
        out.fill(0);
        if let Some(render) = self.api.render_block {
            unsafe { render(out.as_mut_ptr(), FRAMES_PER_BLOCK as c_int) };
        }
    }
}

impl Drop for V1Instance {
    fn drop(&mut self) {
        if let Some(on_unload) = self.api.on_unload {
            unsafe { on_unload() };
        }
        self.module.release_v1();
    }
}

/// One handle returned by a v2 module's `create_instance`.
pub struct V2Instance {
    _module: Arc<PluginModule>,
    api: PluginApiV2,
    handle: *mut c_void,
    strings: CStrings,
}

// SAFETY: the handle is only used through `&mut self`; the module outlives it.
unsafe impl Send for V2Instance {}

impl V2Instance {
    pub(crate) fn new(module: Arc<PluginModule>, api: PluginApiV2, json_config: &str) -> Result<Self> {
        let Some(create) = api.create_instance else {
            return Err(PluginError::LoadFailed {
                path: module.dir().to_path_buf(),
                stage: LoadStage::Instantiation,
                reason: "module has no create_instance".to_string(),
            });
        };
        let dir = c_path(module.dir())?;
        let config = c_string(json_config, "module config")?;

        let handle = unsafe { create(dir.as_ptr(), config.as_ptr()) };
        if handle.is_null() {
            return Err(PluginError::LoadFailed {
                path: module.dir().to_path_buf(),
                stage: LoadStage::Instantiation,
                reason: "create_instance returned null".to_string(),
            });
        }
        Ok(Self {
            _module: module,
            api,
            handle,
            strings: CStrings::new(),
        })
    }
}

impl PluginInstance for V2Instance {
    fn api_version(&self) -> u32 {
        crate::abi::API_VERSION_2
    }

    fn on_midi(&mut self, msg: &[u8], source: MidiSource) {
        if let Some(on_midi) = self.api.on_midi {
            unsafe { on_midi(self.handle, msg.as_ptr(), msg.len() as c_int, source as c_int) };
        }
    }

    fn set_param(&mut self, key: &str, value: &str) -> Result<()> {
        let Some(set) = self.api.set_param else {
            return Err(PluginError::UnknownKey(key.to_string()));
        };
        let (c_key, c_value) = self.strings.key_value(key, value)?;
        unsafe { set(self.handle, c_key, c_value) };
        Ok(())
    }

    fn get_param(&mut self, key: &str, buf: &mut [u8]) -> Result<usize> {
        let Some(get) = self.api.get_param else {
            return Err(PluginError::UnknownKey(key.to_string()));
        };
        let handle = self.handle;
        let c_key = self.strings.key(key)?;
        read_param(key, c_key, buf, |k, b, n| unsafe { get(handle, k, b, n) })
    }

    fn render_block(&mut self, out: &mut AudioBlock) {
        out.fill(0);
        if let Some(render) = self.api.render_block {
            unsafe { render(self.handle, out.as_mut_ptr(), FRAMES_PER_BLOCK as c_int) };
        }
    }
}

impl Drop for V2Instance {
    fn drop(&mut self) {
        if let Some(destroy) = self.api.destroy_instance {
            unsafe { destroy(self.handle) };
        }
    }
}
