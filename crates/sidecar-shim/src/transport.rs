//! The two device calls the interceptor sits in front of.

use libc::{c_int, c_ulong, c_void, off_t, size_t};

/// Mapping establishment and the per-tick device-control call.
///
/// Production wraps the next definitions of `mmap` and `ioctl` in link order;
/// tests substitute an in-memory mailbox.
pub trait DeviceTransport {
    /// # Safety
    /// Same contract as `mmap(2)`.
    unsafe fn map_region(
        &self,
        addr: *mut c_void,
        len: size_t,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: off_t,
    ) -> *mut c_void;

    /// # Safety
    /// Same contract as `ioctl(2)`.
    unsafe fn control(&self, fd: c_int, request: c_ulong, arg: *mut c_void) -> c_int;
}

type MmapFn = unsafe extern "C" fn(*mut c_void, size_t, c_int, c_int, c_int, off_t) -> *mut c_void;
type IoctlFn = unsafe extern "C" fn(c_int, c_ulong, *mut c_void) -> c_int;

/// The real libc calls, resolved with `dlsym(RTLD_NEXT, ..)`.
#[derive(Clone, Copy)]
pub struct LibcTransport {
    mmap: MmapFn,
    ioctl: IoctlFn,
}

impl LibcTransport {
    /// Look up the next `mmap` and `ioctl`. `None` if either is missing.
    pub fn resolve() -> Option<Self> {
        // SAFETY: dlsym with NUL-terminated names; non-null results are the
        // libc functions with the declared signatures.
        unsafe {
            let mmap = libc::dlsym(libc::RTLD_NEXT, b"mmap\0".as_ptr().cast());
            let ioctl = libc::dlsym(libc::RTLD_NEXT, b"ioctl\0".as_ptr().cast());
            if mmap.is_null() || ioctl.is_null() {
                return None;
            }
            Some(Self {
                mmap: std::mem::transmute::<*mut c_void, MmapFn>(mmap),
                ioctl: std::mem::transmute::<*mut c_void, IoctlFn>(ioctl),
            })
        }
    }
}

impl DeviceTransport for LibcTransport {
    unsafe fn map_region(
        &self,
        addr: *mut c_void,
        len: size_t,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: off_t,
    ) -> *mut c_void {
        (self.mmap)(addr, len, prot, flags, fd, offset)
    }

    unsafe fn control(&self, fd: c_int, request: c_ulong, arg: *mut c_void) -> c_int {
        (self.ioctl)(fd, request, arg)
    }
}
