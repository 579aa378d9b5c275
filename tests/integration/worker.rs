//! Host/worker integration tests
//!
//! A worker attaches to the channels a fixture's interception layer created and
//! is stepped by hand between ticks, so the interleaving is deterministic.

use sidecar::prelude::*;
use std::sync::atomic::Ordering;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::*;

fn worker_with_levels(fx: &ShimFixture, levels: &[i16]) -> Worker {
    let mut host = SlotHost::new(levels.len().max(1));
    for (slot, &level) in levels.iter().enumerate() {
        host.insert(slot, LevelPlugin::boxed(level).0).unwrap();
    }
    Worker::new(fx.worker_config(), host).unwrap()
}

/// Rendered audio reaches the mailbox two ticks after it was produced.
#[test]
fn test_worker_audio_arrives_two_blocks_late() {
    let mut fx = ShimFixture::new();
    let mut worker = worker_with_levels(&fx, &[40, 2]);
    ControlBlock::set(&fx.control().shadow_ready, true);

    let mut outputs = Vec::new();
    for _ in 0..4 {
        fx.set_audio_out(&[1]);
        fx.tick();
        outputs.push(fx.audio_out()[0]);
        assert!(worker.step());
    }

    // ticks 1 and 2 read slots nothing has been written to yet
    assert_eq!(outputs, vec![1, 1, 43, 43]);
    assert_eq!(worker.stats().blocks_rendered, 4);
    assert_eq!(fx.shim.stats().underruns, 0);
}

/// A stalled worker catches up by one block rather than a ring's worth.
#[test]
fn test_stalled_worker_renders_one_block() {
    let mut fx = ShimFixture::new();
    let mut worker = worker_with_levels(&fx, &[5]);

    for _ in 0..10 {
        fx.tick();
    }
    worker.step();
    assert_eq!(worker.stats().blocks_rendered, 1);

    fx.tick();
    worker.step();
    assert_eq!(worker.stats().blocks_rendered, 2);
}

/// Forwarded MIDI is delivered to the selected slot on the worker's next step.
#[test]
fn test_forwarded_midi_reaches_selected_slot() {
    let mut fx = ShimFixture::new();
    let mut host = SlotHost::new(2);
    let (first, first_midi) = LevelPlugin::boxed(0);
    let (second, second_midi) = LevelPlugin::boxed(0);
    host.insert(0, first).unwrap();
    host.insert(1, second).unwrap();
    let mut worker = Worker::new(fx.worker_config(), host).unwrap();

    fx.control().selected_slot.store(1, Ordering::Release);
    fx.set_midi_in(&[[0x09, 0x90, 0x3C, 0x7F]]);
    fx.tick();
    worker.step();

    assert_eq!(first_midi.load(Ordering::SeqCst), 0);
    assert_eq!(second_midi.load(Ordering::SeqCst), 1);
}

/// A track button press on the device picks the slot that receives cable-0 notes.
#[test]
fn test_track_button_routes_notes() {
    let mut fx = ShimFixture::new();
    let mut host = SlotHost::new(4);
    let mut counters = Vec::new();
    for slot in 0..4 {
        let (plugin, midi) = LevelPlugin::boxed(0);
        host.insert(slot, plugin).unwrap();
        counters.push(midi);
    }
    let mut worker = Worker::new(fx.worker_config(), host).unwrap();

    // CC 41 is the third track button from the right
    fx.set_midi_in(&[[0x0B, 0xB0, 41, 0x7F]]);
    fx.tick();
    worker.step();
    assert_eq!(fx.control().selected_slot.load(Ordering::Acquire), 2);
    let before: Vec<usize> = counters.iter().map(|c| c.load(Ordering::SeqCst)).collect();

    fx.set_midi_in(&[[0x09, 0x90, 0x3C, 0x7F]]);
    fx.tick();
    worker.step();

    let delivered: Vec<usize> = counters
        .iter()
        .zip(&before)
        .map(|(c, b)| c.load(Ordering::SeqCst) - b)
        .collect();
    assert_eq!(delivered, vec![0, 0, 1, 0]);
}

/// The worker's status frame shows up in the mailbox while display mode is on.
#[test]
fn test_status_frame_transmitted() {
    use sidecar::core::mailbox::{DISPLAY_SLICE_INDEX_OFFSET, DISPLAY_SLICE_OFFSET};

    let mut fx = ShimFixture::new();
    let mut worker = worker_with_levels(&fx, &[100]);
    ControlBlock::set(&fx.control().display_mode, true);

    worker.step();
    fx.tick();

    assert_eq!(fx.mailbox().read_u8(DISPLAY_SLICE_INDEX_OFFSET), 1);
    // top border row of the first slice
    assert_ne!(fx.mailbox().read_u8(DISPLAY_SLICE_OFFSET), 0);
}

/// Shutting the host down stops a running worker and clears `shadow_ready`.
#[tokio::test]
async fn test_worker_exits_on_host_shutdown() {
    let mut fx = ShimFixture::new();
    let mut worker = worker_with_levels(&fx, &[1]);
    let worker_view = ChannelSet::open(&fx.channels());

    fx.shim.shutdown();
    worker.run().await.unwrap();

    let control = worker_view.control().unwrap();
    assert!(ControlBlock::is_set(&control.should_exit));
    assert!(!ControlBlock::is_set(&control.shadow_ready));
}

/// Workers refuse to start without the host's channels.
#[test]
fn test_worker_requires_channels() {
    let dir = tempfile::tempdir().unwrap();
    let config = WorkerConfig {
        channels: ChannelConfig::in_dir(dir.path()),
        ..Default::default()
    };
    let err = Worker::from_config(config).err().unwrap();
    let err: sidecar::Error = err.into();
    assert!(matches!(err, sidecar::Error::Plugin(_)));
}
