//! Byte layout of the hardware mailbox.
//!
//! The mailbox is a single 4096-byte region owned by the device driver and mapped
//! once per process. Its content changes outside our control, so every access
//! through [`Mailbox`] is volatile and byte-wise.
//!
//! ```text
//! [   0,  256)  outgoing MIDI queue (64 USB-MIDI packets)
//!       80      display slice index (1-based)      } inside the outgoing
//! [  84,  256)  display slice data                 } MIDI region
//! [ 256,  768)  outgoing audio, 128 interleaved stereo i16 frames
//! [2048, 2304)  incoming MIDI queue
//! [2304, 2816)  incoming audio
//! ```
//!
//! The driver consumes the outgoing MIDI region during the device-control call, so
//! anything written there for a tick must be written before that call.

use std::ptr::NonNull;

pub const MAILBOX_SIZE: usize = 4096;

pub const MIDI_OUT_OFFSET: usize = 0;
pub const AUDIO_OUT_OFFSET: usize = 256;
pub const MIDI_IN_OFFSET: usize = 2048;
pub const AUDIO_IN_OFFSET: usize = 2304;

pub const DISPLAY_SLICE_INDEX_OFFSET: usize = 80;
pub const DISPLAY_SLICE_OFFSET: usize = 84;

/// 64 USB-MIDI packets.
pub const MIDI_BUFFER_SIZE: usize = 256;

pub const SAMPLE_RATE: u32 = 44_100;
pub const FRAMES_PER_BLOCK: usize = 128;
pub const CHANNELS: usize = 2;
pub const SAMPLES_PER_BLOCK: usize = FRAMES_PER_BLOCK * CHANNELS;
pub const AUDIO_BLOCK_BYTES: usize = SAMPLES_PER_BLOCK * std::mem::size_of::<i16>();

/// One interleaved stereo block.
pub type AudioBlock = [i16; SAMPLES_PER_BLOCK];

/// Volatile view over a mapped mailbox.
///
/// The view is `Copy`; it does not own the mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mailbox {
    base: NonNull<u8>,
}

// SAFETY: the mailbox is process-shared memory; all access is volatile and the
// single-writer-per-region convention is upheld by the callers.
unsafe impl Send for Mailbox {}
unsafe impl Sync for Mailbox {}

impl Mailbox {
    /// # Safety
    /// `base` must point at a mapping of at least [`MAILBOX_SIZE`] bytes that stays
    /// valid for as long as this view (or any copy of it) is used.
    pub unsafe fn from_raw(base: NonNull<u8>) -> Self {
        Self { base }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        assert!(offset < MAILBOX_SIZE);
        // SAFETY: offset is bounds-checked against the mapping size.
        unsafe { std::ptr::read_volatile(self.base.as_ptr().add(offset)) }
    }

    #[inline]
    pub fn write_u8(&self, offset: usize, value: u8) {
        assert!(offset < MAILBOX_SIZE);
        // SAFETY: offset is bounds-checked against the mapping size.
        unsafe { std::ptr::write_volatile(self.base.as_ptr().add(offset), value) }
    }

    pub fn read_bytes(&self, offset: usize, out: &mut [u8]) {
        assert!(offset + out.len() <= MAILBOX_SIZE);
        let src = self.base.as_ptr();
        for (i, byte) in out.iter_mut().enumerate() {
            // SAFETY: range checked above.
            *byte = unsafe { std::ptr::read_volatile(src.add(offset + i)) };
        }
    }

    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        assert!(offset + data.len() <= MAILBOX_SIZE);
        let dst = self.base.as_ptr();
        for (i, byte) in data.iter().enumerate() {
            // SAFETY: range checked above.
            unsafe { std::ptr::write_volatile(dst.add(offset + i), *byte) };
        }
    }

    pub fn read_midi_in(&self, out: &mut [u8; MIDI_BUFFER_SIZE]) {
        self.read_bytes(MIDI_IN_OFFSET, out);
    }

    pub fn read_midi_out(&self, out: &mut [u8; MIDI_BUFFER_SIZE]) {
        self.read_bytes(MIDI_OUT_OFFSET, out);
    }

    pub fn read_audio_out(&self, out: &mut AudioBlock) {
        self.read_block(AUDIO_OUT_OFFSET, out);
    }

    pub fn write_audio_out(&self, block: &AudioBlock) {
        self.write_block(AUDIO_OUT_OFFSET, block);
    }

    pub fn read_audio_in(&self, out: &mut AudioBlock) {
        self.read_block(AUDIO_IN_OFFSET, out);
    }

    /// Stage one display slice. `index` is the 1-based slice number the firmware expects.
    pub fn write_display_slice(&self, index: u8, data: &[u8]) {
        self.write_u8(DISPLAY_SLICE_INDEX_OFFSET, index);
        self.write_bytes(DISPLAY_SLICE_OFFSET, data);
    }

    fn read_block(&self, offset: usize, out: &mut AudioBlock) {
        let mut bytes = [0u8; AUDIO_BLOCK_BYTES];
        self.read_bytes(offset, &mut bytes);
        for (sample, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
            *sample = i16::from_ne_bytes([pair[0], pair[1]]);
        }
    }

    fn write_block(&self, offset: usize, block: &AudioBlock) {
        let mut bytes = [0u8; AUDIO_BLOCK_BYTES];
        for (pair, sample) in bytes.chunks_exact_mut(2).zip(block.iter()) {
            pair.copy_from_slice(&sample.to_ne_bytes());
        }
        self.write_bytes(offset, &bytes);
    }
}
