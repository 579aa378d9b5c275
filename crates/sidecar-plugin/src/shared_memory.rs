//! File-backed shared memory segments.

use crate::error::{PluginError, Result};
use crate::protocol::SharedLayout;
use memmap2::MmapMut;
use std::cell::UnsafeCell;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// One named segment mapped into this process.
///
/// Uses `UnsafeCell` for interior mutability since the mapped region is shared
/// between processes and written through `&self`. Each byte range has a single
/// writer by convention, so plain copies are used for bulk data and typed views
/// ([`SharedLayout`]) for fields that need atomic access.
pub struct SharedSegment {
    mmap: UnsafeCell<MmapMut>,
    path: PathBuf,
    len: usize,
    /// Creator owns the file and removes it on drop.
    owns_memory: bool,
}

impl SharedSegment {
    /// Create (or reset) a zero-filled segment of `len` bytes.
    pub fn create(path: &Path, len: usize) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o666);
        }

        let file = options.open(path).map_err(|e| {
            PluginError::SharedMemory(format!(
                "Failed to create shared memory file {}: {}",
                path.display(),
                e
            ))
        })?;

        file.set_len(len as u64).map_err(|e| {
            PluginError::SharedMemory(format!("Failed to set file size: {}", e))
        })?;

        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            PluginError::SharedMemory(format!("Failed to create memory map: {}", e))
        })?;

        Ok(Self {
            mmap: UnsafeCell::new(mmap),
            path: path.to_path_buf(),
            len,
            owns_memory: true,
        })
    }

    /// Map an existing segment that is at least `len` bytes long.
    pub fn open(path: &Path, len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                PluginError::SharedMemory(format!(
                    "Failed to open shared memory file {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let actual = file.metadata()?.len();
        if actual < len as u64 {
            return Err(PluginError::SharedMemory(format!(
                "{} is {} bytes, expected at least {}",
                path.display(),
                actual,
                len
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file) }.map_err(|e| {
            PluginError::SharedMemory(format!("Failed to open memory map: {}", e))
        })?;

        Ok(Self {
            mmap: UnsafeCell::new(mmap),
            path: path.to_path_buf(),
            len,
            owns_memory: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn base(&self) -> *mut u8 {
        // SAFETY: only the pointer is taken; no reference to the map escapes.
        unsafe { (*self.mmap.get()).as_mut_ptr() }
    }

    /// Typed view of the start of the segment.
    pub fn view<T: SharedLayout>(&self) -> Result<&T> {
        if std::mem::size_of::<T>() > self.len {
            return Err(PluginError::SharedMemory(format!(
                "{} is too small for a {}-byte block",
                self.path.display(),
                std::mem::size_of::<T>()
            )));
        }
        // SAFETY: mappings are page aligned, the size is checked above, and
        // `SharedLayout` types are all-atomic with zero as a valid state.
        Ok(unsafe { &*(self.base() as *const T) })
    }

    /// Caller must be the single writer of this range.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= self.len, "write past end of segment");
        // SAFETY: bounds checked above; single-writer convention.
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.base().add(offset), data.len())
        };
    }

    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= self.len, "read past end of segment");
        // SAFETY: bounds checked above. A concurrent writer may tear the copy,
        // which is acceptable for audio and display data.
        unsafe { std::ptr::copy_nonoverlapping(self.base().add(offset), out.as_mut_ptr(), out.len()) };
    }

    /// Native-endian `i16` samples.
    pub fn write_samples(&self, offset: usize, samples: &[i16]) {
        let bytes = std::mem::size_of_val(samples);
        assert!(offset + bytes <= self.len, "write past end of segment");
        unsafe {
            std::ptr::copy_nonoverlapping(
                samples.as_ptr() as *const u8,
                self.base().add(offset),
                bytes,
            )
        };
    }

    pub fn read_samples(&self, offset: usize, out: &mut [i16]) {
        let bytes = std::mem::size_of_val(out);
        assert!(offset + bytes <= self.len, "read past end of segment");
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(offset), out.as_mut_ptr() as *mut u8, bytes)
        };
    }

    pub fn fill(&self, byte: u8) {
        unsafe { std::ptr::write_bytes(self.base(), byte, self.len) };
    }
}

// SAFETY: see the type docs; writers are partitioned by convention and typed views
// only expose atomics.
unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl Drop for SharedSegment {
    fn drop(&mut self) {
        if self.owns_memory {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
