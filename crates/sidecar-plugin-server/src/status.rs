//! Glyph-free status frame drawn into the display channel.
//!
//! Layout: a one-pixel border, one horizontal activity bar per slot (length
//! proportional to the slot's last peak), a marker left of the selected slot,
//! and a filled square in the top-right corner while shift is held.

use sidecar_core::display::{set_pixel, DISPLAY_HEIGHT, DISPLAY_WIDTH};
use sidecar_core::DisplayFrame;

const BAR_LEFT: usize = 8;
const BAR_RIGHT: usize = DISPLAY_WIDTH - 4;
const BAR_HEIGHT: usize = 4;
const ROW_PITCH: usize = 7;
const FIRST_ROW: usize = 12;
const SHIFT_SIZE: usize = 5;

fn fill_rect(frame: &mut DisplayFrame, x0: usize, y0: usize, w: usize, h: usize) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            set_pixel(frame, x, y, true);
        }
    }
}

/// Bar length in pixels for a peak level.
pub fn bar_width(peak: u16) -> usize {
    let span = BAR_RIGHT - BAR_LEFT;
    (peak as usize * span) / i16::MAX as usize
}

pub fn draw_status(frame: &mut DisplayFrame, peaks: &[Option<u16>], selected_slot: usize, shift: bool) {
    frame.fill(0);

    for x in 0..DISPLAY_WIDTH {
        set_pixel(frame, x, 0, true);
        set_pixel(frame, x, DISPLAY_HEIGHT - 1, true);
    }
    for y in 0..DISPLAY_HEIGHT {
        set_pixel(frame, 0, y, true);
        set_pixel(frame, DISPLAY_WIDTH - 1, y, true);
    }

    if shift {
        fill_rect(frame, DISPLAY_WIDTH - 3 - SHIFT_SIZE, 2, SHIFT_SIZE, SHIFT_SIZE);
    }

    for (i, peak) in peaks.iter().enumerate() {
        let y = FIRST_ROW + i * ROW_PITCH;
        if y + BAR_HEIGHT >= DISPLAY_HEIGHT - 1 {
            break;
        }
        if i == selected_slot {
            fill_rect(frame, 3, y, 2, BAR_HEIGHT);
        }
        // Loaded slot: baseline tick plus level bar.
        if let Some(level) = peak {
            set_pixel(frame, BAR_LEFT, y + BAR_HEIGHT - 1, true);
            fill_rect(frame, BAR_LEFT, y, bar_width(*level), BAR_HEIGHT);
        }
    }
}
