//! Interception layer integration tests
//!
//! Each test drives ticks through `Interceptor::control` against an in-memory
//! mailbox and checks what lands in the mailbox and the shared channels.

use sidecar::prelude::*;
use sidecar::shim::hotkey::{ControlId, SHIFT};
use std::sync::atomic::Ordering;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::*;

const NOTE_ON: [u8; 4] = [0x09, 0x90, 0x3C, 0x7F];
const TOGGLE_CHORD: [[u8; 4]; 3] = [
    [0x0B, 0xB0, 0x31, 0x7F],
    [0x09, 0x90, 0x08, 0x7F],
    [0x09, 0x90, 0x09, 0x7F],
];

/// One Note-On in the incoming queue is forwarded verbatim and bumps `midi_ready`.
#[test]
fn test_note_on_forwarded_after_one_tick() {
    let mut fx = ShimFixture::new();
    fx.set_midi_in(&[NOTE_ON]);
    let before = fx.control().midi_ready.load(Ordering::Acquire);

    assert_eq!(fx.tick(), 0);

    let mut forwarded = [0u8; 4];
    fx.shim
        .channels()
        .midi
        .as_ref()
        .unwrap()
        .read_bytes(0, &mut forwarded);
    assert_eq!(forwarded, NOTE_ON);
    assert_eq!(fx.control().midi_ready.load(Ordering::Acquire), before + 1);
}

/// Ring slot `{100, -200}` summed into mailbox `{50, 100}` gives `{150, -100}`.
#[test]
fn test_ring_slot_summed_into_mailbox() {
    let mut fx = ShimFixture::new();
    let control = fx.control();
    ControlBlock::set(&control.shadow_ready, true);
    let slot = sidecar::plugin::read_index(control.write_idx.load(Ordering::Acquire) as usize);

    fx.shim
        .channels()
        .audio
        .as_ref()
        .unwrap()
        .write_samples(slot * sidecar::core::mailbox::AUDIO_BLOCK_BYTES, &[100, -200]);
    fx.set_audio_out(&[50, 100]);
    fx.tick();

    assert_eq!(&fx.audio_out()[..2], &[150, -100]);
}

/// Sums clamp at the int16 range instead of wrapping.
#[test]
fn test_mix_saturates() {
    let mut fx = ShimFixture::new();
    ControlBlock::set(&fx.control().shadow_ready, true);
    let slot = sidecar::plugin::read_index(0);
    fx.shim
        .channels()
        .audio
        .as_ref()
        .unwrap()
        .write_samples(
            slot * sidecar::core::mailbox::AUDIO_BLOCK_BYTES,
            &[10000, -10000],
        );
    fx.set_audio_out(&[30000, -30000]);
    fx.tick();

    assert_eq!(&fx.audio_out()[..2], &[i16::MAX, i16::MIN]);
}

/// Holding the chord toggles once; holding longer does nothing; re-pressing toggles again.
#[test]
fn test_toggle_once_per_chord_press() {
    let mut fx = ShimFixture::new();
    let display_mode = |fx: &ShimFixture| ControlBlock::is_set(&fx.control().display_mode);

    fx.set_midi_in(&TOGGLE_CHORD);
    fx.tick();
    assert!(display_mode(&fx));

    for _ in 0..5 {
        fx.tick();
    }
    fx.set_midi_in(&[NOTE_ON]);
    fx.tick();
    assert!(display_mode(&fx));

    // release shift, press it again
    fx.set_midi_in(&[[0x0B, 0xB0, 0x31, 0x00]]);
    fx.tick();
    assert!(display_mode(&fx));
    fx.set_midi_in(&[[0x0B, 0xB0, 0x31, 0x7F]]);
    fx.tick();
    assert!(!display_mode(&fx));
}

/// The launch gesture only fires when enabled, and only once.
#[test]
fn test_launch_gesture_gated_and_one_shot() {
    let chord = [[0x0B, 0xB0, 0x31, 0x7F], [0x09, 0x90, 0x07, 0x7F]];

    let mut disabled = ShimFixture::with_config(|c| {
        c.launch_chord = vec![SHIFT, ControlId::Note(7)];
    });
    disabled.set_midi_in(&chord);
    disabled.tick();
    assert!(disabled.launcher.launched.lock().is_empty());

    let mut fx = ShimFixture::with_config(|c| {
        c.standalone_enabled = true;
        c.launch_chord = vec![SHIFT, ControlId::Note(7)];
    });
    fx.set_midi_in(&chord);
    fx.tick();
    fx.set_midi_in(&[[0x0B, 0xB0, 0x31, 0x00]]);
    fx.tick();
    fx.set_midi_in(&chord);
    fx.tick();
    assert_eq!(fx.launcher.launched.lock().len(), 1);
}

/// Six ticks in display mode transmit one whole frame, slice by slice.
#[test]
fn test_frame_sent_in_six_slices() {
    use sidecar::core::display::slice_range;
    use sidecar::core::mailbox::{DISPLAY_SLICE_INDEX_OFFSET, DISPLAY_SLICE_OFFSET};
    use sidecar::core::DISPLAY_BUFFER_SIZE;

    let mut fx = ShimFixture::new();
    let frame: Vec<u8> = (0..DISPLAY_BUFFER_SIZE).map(|i| (i * 7 % 256) as u8).collect();
    fx.shim
        .channels()
        .display
        .as_ref()
        .unwrap()
        .write_bytes(0, &frame);
    ControlBlock::set(&fx.control().display_mode, true);

    let mut received = vec![0u8; DISPLAY_BUFFER_SIZE];
    for _ in 0..6 {
        fx.tick();
        let index = fx.mailbox().read_u8(DISPLAY_SLICE_INDEX_OFFSET) as usize - 1;
        let range = slice_range(index);
        let len = range.len();
        fx.mailbox()
            .read_bytes(DISPLAY_SLICE_OFFSET, &mut received[range.start..range.start + len]);
    }
    assert_eq!(received, frame);
    assert_eq!(fx.shim.stats().display_slices, 6);
}

/// A failing device call is returned unchanged.
#[test]
fn test_device_errors_pass_through() {
    let mut fx = ShimFixture::new();
    let result = unsafe { fx.shim.control(-1, 0, std::ptr::null_mut()) };
    assert_eq!(result, -1);
    assert_eq!(fx.shim.transport().control_calls.load(Ordering::SeqCst), 1);
}
