//! 128x64 1-bit display frames and their slice transmission.
//!
//! A frame is 1024 bytes and does not fit into the mailbox's display staging
//! area, so it is sent as six slices over six ticks: five of 172 bytes and a
//! final one of 164. If the source frame changes mid-way the panel shows slices
//! from two frames until the next full pass.

use std::ops::Range;

pub const DISPLAY_WIDTH: usize = 128;
pub const DISPLAY_HEIGHT: usize = 64;
pub const DISPLAY_BUFFER_SIZE: usize = DISPLAY_WIDTH * DISPLAY_HEIGHT / 8;

pub const SLICE_COUNT: usize = 6;
pub const SLICE_SIZE: usize = 172;
pub const LAST_SLICE_SIZE: usize = DISPLAY_BUFFER_SIZE - SLICE_SIZE * (SLICE_COUNT - 1);

/// Byte length of slice `index` (0-based).
pub const fn slice_len(index: usize) -> usize {
    if index == SLICE_COUNT - 1 {
        LAST_SLICE_SIZE
    } else {
        SLICE_SIZE
    }
}

/// Byte range of slice `index` (0-based) within a frame.
pub const fn slice_range(index: usize) -> Range<usize> {
    let start = index * SLICE_SIZE;
    start..start + slice_len(index)
}

pub type DisplayFrame = [u8; DISPLAY_BUFFER_SIZE];

/// Page-major packing: byte `(y / 8) * 128 + x`, bit `y % 8`.
pub fn set_pixel(frame: &mut DisplayFrame, x: usize, y: usize, on: bool) {
    if x >= DISPLAY_WIDTH || y >= DISPLAY_HEIGHT {
        return;
    }
    let byte = (y / 8) * DISPLAY_WIDTH + x;
    let bit = 1u8 << (y % 8);
    if on {
        frame[byte] |= bit;
    } else {
        frame[byte] &= !bit;
    }
}

pub fn get_pixel(frame: &DisplayFrame, x: usize, y: usize) -> bool {
    if x >= DISPLAY_WIDTH || y >= DISPLAY_HEIGHT {
        return false;
    }
    frame[(y / 8) * DISPLAY_WIDTH + x] & (1u8 << (y % 8)) != 0
}

/// Which slice goes out on the next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceCursor {
    next: usize,
}

impl SliceCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 0-based index of the slice that will be sent next.
    pub fn position(&self) -> usize {
        self.next
    }

    /// Return the current slice index and move to the following one (mod 6).
    pub fn advance(&mut self) -> usize {
        let current = self.next;
        self.next = (self.next + 1) % SLICE_COUNT;
        current
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
