//! Test helpers and fixtures for sidecar integration tests
//!
//! The interception layer runs against [`FakeDevice`], an in-memory mailbox, and
//! launches through [`RecordingLauncher`]. Workers attach to the same channel
//! directory inside a [`tempfile::TempDir`], so a whole host/worker pair runs
//! inside one test process.

#![allow(dead_code)]

use parking_lot::Mutex;
use sidecar::core::mailbox::MIDI_IN_OFFSET;
use sidecar::core::{AudioBlock, ChannelConfig, Mailbox, MidiSource, MAILBOX_SIZE, SAMPLES_PER_BLOCK};
use sidecar::plugin::{ControlBlock, PluginError, PluginInstance};
use sidecar::shim::{DeviceTransport, Interceptor, Launcher, ShimConfig};
use sidecar::worker::WorkerConfig;
use std::cell::UnsafeCell;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// File descriptor the fake device accepts; anything negative fails.
pub const DEVICE_FD: libc::c_int = 3;

/// In-memory stand-in for the hardware mailbox.
pub struct FakeDevice {
    memory: Box<UnsafeCell<[u64; MAILBOX_SIZE / 8]>>,
    pub control_calls: AtomicUsize,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            memory: Box::new(UnsafeCell::new([0; MAILBOX_SIZE / 8])),
            control_calls: AtomicUsize::new(0),
        }
    }
}

impl DeviceTransport for FakeDevice {
    unsafe fn map_region(
        &self,
        _addr: *mut libc::c_void,
        len: libc::size_t,
        _prot: libc::c_int,
        _flags: libc::c_int,
        fd: libc::c_int,
        _offset: libc::off_t,
    ) -> *mut libc::c_void {
        if fd < 0 || len != MAILBOX_SIZE {
            return libc::MAP_FAILED;
        }
        self.memory.get().cast()
    }

    unsafe fn control(
        &self,
        fd: libc::c_int,
        _request: libc::c_ulong,
        _arg: *mut libc::c_void,
    ) -> libc::c_int {
        self.control_calls.fetch_add(1, Ordering::SeqCst);
        if fd < 0 {
            -1
        } else {
            0
        }
    }
}

/// Records launch requests instead of replacing the test process.
#[derive(Default, Clone)]
pub struct RecordingLauncher {
    pub launched: Arc<Mutex<Vec<PathBuf>>>,
}

impl Launcher for RecordingLauncher {
    fn launch(&mut self, command: &Path) -> sidecar::shim::Result<()> {
        self.launched.lock().push(command.to_path_buf());
        Ok(())
    }
}

/// An interception layer with its mailbox mapped and channels in a temp dir.
pub struct ShimFixture {
    pub dir: tempfile::TempDir,
    pub shim: Interceptor<FakeDevice>,
    pub launcher: RecordingLauncher,
}

impl ShimFixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(configure: impl FnOnce(&mut ShimConfig)) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let mut config = ShimConfig {
            channels: ChannelConfig::in_dir(dir.path()),
            ..Default::default()
        };
        configure(&mut config);

        let launcher = RecordingLauncher::default();
        let mut shim = Interceptor::new(FakeDevice::new(), config, Box::new(launcher.clone()));
        let mapped = unsafe {
            shim.map_region(
                std::ptr::null_mut(),
                MAILBOX_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                DEVICE_FD,
                0,
            )
        };
        assert_ne!(mapped, libc::MAP_FAILED);

        Self {
            dir,
            shim,
            launcher,
        }
    }

    pub fn channels(&self) -> ChannelConfig {
        self.shim.config().channels.clone()
    }

    pub fn mailbox(&self) -> Mailbox {
        self.shim.mailbox().expect("mailbox mapped")
    }

    pub fn control(&self) -> &ControlBlock {
        self.shim.channels().control().expect("control channel")
    }

    /// One device-control call.
    pub fn tick(&mut self) -> libc::c_int {
        unsafe { self.shim.control(DEVICE_FD, 0, std::ptr::null_mut()) }
    }

    /// Replace the incoming MIDI queue with `packets`, zero elsewhere.
    pub fn set_midi_in(&self, packets: &[[u8; 4]]) {
        let mut region = [0u8; 256];
        for (i, p) in packets.iter().enumerate() {
            region[i * 4..i * 4 + 4].copy_from_slice(p);
        }
        self.mailbox().write_bytes(MIDI_IN_OFFSET, &region);
    }

    pub fn set_audio_out(&self, pattern: &[i16]) {
        self.mailbox().write_audio_out(&block_of(pattern));
    }

    pub fn audio_out(&self) -> AudioBlock {
        let mut out = [0i16; SAMPLES_PER_BLOCK];
        self.mailbox().read_audio_out(&mut out);
        out
    }

    /// Worker configuration attached to this fixture's channels.
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            slot_count: 2,
            poll_interval_us: 200,
            channels: self.channels(),
            ..Default::default()
        }
    }
}

/// A block starting with `pattern`, zero after it.
pub fn block_of(pattern: &[i16]) -> AudioBlock {
    let mut block = [0i16; SAMPLES_PER_BLOCK];
    block[..pattern.len()].copy_from_slice(pattern);
    block
}

/// Plugin instance rendering a constant level, with a single `level` parameter.
pub struct LevelPlugin {
    pub level: i16,
    pub midi_messages: Arc<AtomicUsize>,
}

impl LevelPlugin {
    pub fn boxed(level: i16) -> (Box<dyn PluginInstance>, Arc<AtomicUsize>) {
        let midi_messages = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Self {
                level,
                midi_messages: Arc::clone(&midi_messages),
            }),
            midi_messages,
        )
    }
}

impl PluginInstance for LevelPlugin {
    fn api_version(&self) -> u32 {
        2
    }

    fn on_midi(&mut self, _msg: &[u8], _source: MidiSource) {
        self.midi_messages.fetch_add(1, Ordering::SeqCst);
    }

    fn set_param(&mut self, key: &str, value: &str) -> sidecar::plugin::Result<()> {
        if key != "level" {
            return Err(PluginError::UnknownKey(key.into()));
        }
        self.level = value
            .parse()
            .map_err(|_| PluginError::Protocol(format!("bad level {value}")))?;
        Ok(())
    }

    fn get_param(&mut self, key: &str, buf: &mut [u8]) -> sidecar::plugin::Result<usize> {
        if key != "level" {
            return Err(PluginError::UnknownKey(key.into()));
        }
        let text = self.level.to_string();
        let n = text.len().min(buf.len());
        buf[..n].copy_from_slice(&text.as_bytes()[..n]);
        Ok(n)
    }

    fn render_block(&mut self, out: &mut AudioBlock) {
        out.fill(self.level);
    }
}
