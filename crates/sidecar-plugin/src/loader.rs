//! Module loading with v2-then-v1 entry point probing.

use crate::abi::{
    HostApiV1, InitV1Fn, InitV2Fn, PluginApiV1, PluginApiV2, API_VERSION_1, API_VERSION_2, ENTRY_V1,
    ENTRY_V2, MODULE_LIBRARY,
};
use crate::error::{LoadStage, PluginError, Result};
use crate::instance::{PluginInstance, V1Instance, V2Instance};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Entry point of a module, resolved either from a library or handed in directly.
#[derive(Clone, Copy)]
pub enum EntryPoint {
    V1(InitV1Fn),
    V2(InitV2Fn),
}

#[derive(Clone, Copy)]
pub(crate) enum ModuleApi {
    V1(PluginApiV1),
    V2(PluginApiV2),
}

/// A module whose entry point has run.
///
/// Instances keep the module alive through an `Arc`; the library is unloaded when
/// the last instance and the module handle are gone.
pub struct PluginModule {
    api: ModuleApi,
    dir: PathBuf,
    // Boxed so the address handed to the entry point stays valid; modules may keep it.
    host: Box<HostApiV1>,
    v1_claimed: AtomicBool,
    // Declared last so it is dropped after everything that may call into it.
    _library: Option<libloading::Library>,
}

// SAFETY: the raw pointers inside the host and callback tables refer either to the
// mailbox mapping (process lifetime) or to code and statics of the loaded library,
// which is kept alive by `_library`.
unsafe impl Send for PluginModule {}
unsafe impl Sync for PluginModule {}

impl PluginModule {
    /// Open `<module_dir>/dsp.so`, probing the v2 entry point first.
    pub fn load(module_dir: &Path, host: HostApiV1) -> Result<Arc<Self>> {
        let path = module_dir.join(MODULE_LIBRARY);

        let library = unsafe { libloading::Library::new(&path) }.map_err(|e| {
            PluginError::LoadFailed {
                path: path.clone(),
                stage: LoadStage::Opening,
                reason: e.to_string(),
            }
        })?;

        let entry = unsafe {
            if let Ok(init) = library.get::<InitV2Fn>(ENTRY_V2) {
                EntryPoint::V2(*init)
            } else if let Ok(init) = library.get::<InitV1Fn>(ENTRY_V1) {
                EntryPoint::V1(*init)
            } else {
                return Err(PluginError::LoadFailed {
                    path,
                    stage: LoadStage::EntryPoint,
                    reason: "neither v2 nor v1 entry point is exported".to_string(),
                });
            }
        };

        let module = unsafe { Self::bind(entry, module_dir, host, Some(library)) }?;
        tracing::info!(
            "Loaded module {} (api v{})",
            module_dir.display(),
            module.api_version()
        );
        Ok(module)
    }

    /// Bind a module from an entry point that is already linked into this process.
    ///
    /// # Safety
    /// `entry` must follow the module ABI and return a table that stays valid for
    /// the life of the process.
    pub unsafe fn from_entry(
        entry: EntryPoint,
        module_dir: &Path,
        host: HostApiV1,
    ) -> Result<Arc<Self>> {
        Self::bind(entry, module_dir, host, None)
    }

    unsafe fn bind(
        entry: EntryPoint,
        module_dir: &Path,
        host: HostApiV1,
        library: Option<libloading::Library>,
    ) -> Result<Arc<Self>> {
        let host = Box::new(host);
        let host_ptr: *const HostApiV1 = &*host;
        let fail = |reason: String| PluginError::LoadFailed {
            path: module_dir.to_path_buf(),
            stage: LoadStage::EntryPoint,
            reason,
        };

        let api = match entry {
            EntryPoint::V2(init) => {
                let table = init(host_ptr);
                if table.is_null() {
                    return Err(fail("v2 entry point returned null".into()));
                }
                let table = *table;
                if table.api_version != API_VERSION_2 {
                    return Err(fail(format!(
                        "api version mismatch: {} vs {}",
                        table.api_version, API_VERSION_2
                    )));
                }
                ModuleApi::V2(table)
            }
            EntryPoint::V1(init) => {
                let table = init(host_ptr);
                if table.is_null() {
                    return Err(fail("v1 entry point returned null".into()));
                }
                let table = *table;
                if table.api_version != API_VERSION_1 {
                    return Err(fail(format!(
                        "api version mismatch: {} vs {}",
                        table.api_version, API_VERSION_1
                    )));
                }
                ModuleApi::V1(table)
            }
        };

        Ok(Arc::new(Self {
            api,
            dir: module_dir.to_path_buf(),
            host,
            v1_claimed: AtomicBool::new(false),
            _library: library,
        }))
    }

    pub fn api_version(&self) -> u32 {
        match self.api {
            ModuleApi::V1(_) => API_VERSION_1,
            ModuleApi::V2(_) => API_VERSION_2,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn host(&self) -> &HostApiV1 {
        &self.host
    }

    /// Create an instance with an opaque JSON config passed through untouched.
    ///
    /// A v1 module supports a single instance at a time.
    pub fn instantiate(self: &Arc<Self>, json_config: &str) -> Result<Box<dyn PluginInstance>> {
        match self.api {
            ModuleApi::V1(api) => {
                if self.v1_claimed.swap(true, Ordering::AcqRel) {
                    return Err(PluginError::LoadFailed {
                        path: self.dir.clone(),
                        stage: LoadStage::Instantiation,
                        reason: "v1 module already has an instance".to_string(),
                    });
                }
                match V1Instance::new(Arc::clone(self), api, json_config) {
                    Ok(instance) => Ok(Box::new(instance)),
                    Err(e) => {
                        self.v1_claimed.store(false, Ordering::Release);
                        Err(e)
                    }
                }
            }
            ModuleApi::V2(api) => Ok(Box::new(V2Instance::new(
                Arc::clone(self),
                api,
                json_config,
            )?)),
        }
    }

    pub(crate) fn release_v1(&self) {
        self.v1_claimed.store(false, Ordering::Release);
    }
}
