//! Interposed `mmap` and `ioctl` for LD_PRELOAD builds.
//!
//! The interceptor is created on the first mailbox-sized mapping. Both hooks
//! only `try_lock` it: a call made while the interceptor is busy (including
//! mappings made by the interceptor itself) goes straight to the real function.

use crate::config::ShimConfig;
use crate::interceptor::Interceptor;
use crate::launcher::ExecLauncher;
use crate::logging::init_logging;
use crate::transport::{DeviceTransport, LibcTransport};
use libc::{c_int, c_ulong, c_void, off_t, size_t};
use parking_lot::Mutex;
use sidecar_core::MAILBOX_SIZE;
use std::sync::OnceLock;

static INTERCEPTOR: Mutex<Option<Interceptor<LibcTransport>>> = parking_lot::const_mutex(None);

fn real() -> Option<LibcTransport> {
    static REAL: OnceLock<Option<LibcTransport>> = OnceLock::new();
    *REAL.get_or_init(LibcTransport::resolve)
}

fn build(transport: LibcTransport) -> Interceptor<LibcTransport> {
    init_logging();
    let config = ShimConfig::from_env().unwrap_or_else(|e| {
        tracing::warn!("Using default config: {}", e);
        ShimConfig::default()
    });
    Interceptor::new(transport, config, Box::new(ExecLauncher))
}

/// # Safety
/// Called by the host with `mmap(2)` arguments.
#[no_mangle]
pub unsafe extern "C" fn mmap(
    addr: *mut c_void,
    len: size_t,
    prot: c_int,
    flags: c_int,
    fd: c_int,
    offset: off_t,
) -> *mut c_void {
    let Some(transport) = real() else {
        *libc::__errno_location() = libc::ENOSYS;
        return libc::MAP_FAILED;
    };
    if len != MAILBOX_SIZE {
        return transport.map_region(addr, len, prot, flags, fd, offset);
    }
    match INTERCEPTOR.try_lock() {
        Some(mut guard) => guard
            .get_or_insert_with(|| build(transport))
            .map_region(addr, len, prot, flags, fd, offset),
        None => transport.map_region(addr, len, prot, flags, fd, offset),
    }
}

/// # Safety
/// Called by the host with `ioctl(2)` arguments.
#[no_mangle]
pub unsafe extern "C" fn ioctl(fd: c_int, request: c_ulong, arg: *mut c_void) -> c_int {
    let Some(transport) = real() else {
        *libc::__errno_location() = libc::ENOSYS;
        return -1;
    };
    match INTERCEPTOR.try_lock() {
        Some(mut guard) => match guard.as_mut() {
            Some(interceptor) => interceptor.control(fd, request, arg),
            None => transport.control(fd, request, arg),
        },
        None => transport.control(fd, request, arg),
    }
}
