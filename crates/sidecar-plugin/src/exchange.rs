//! Triple-buffered audio exchange between a worker and the interception layer.
//!
//! The interception layer's `shim_counter` is the clock. The producer renders as
//! many blocks as ticks have passed since it last looked (bounded by the ring
//! depth), and the consumer always reads two slots behind the producer's write
//! cursor. Neither side ever waits for the other.

use crate::protocol::{ControlBlock, RING_DEPTH};
use crate::shared_memory::SharedSegment;
use sidecar_core::mailbox::AUDIO_BLOCK_BYTES;
use sidecar_core::{mix_into, AudioBlock, MixMode, SAMPLES_PER_BLOCK};
use std::sync::atomic::Ordering;

const SILENCE: AudioBlock = [0; SAMPLES_PER_BLOCK];

/// Number of blocks to render when `due` ticks have elapsed.
///
/// Up to the ring depth every due block is rendered. Past it the producer has
/// stalled and only `max_catch_up` blocks (at least 1, at most the depth) are
/// rendered so unread slots are not overwritten.
pub fn blocks_to_render(due: u32, max_catch_up: usize) -> usize {
    match due as usize {
        0 => 0,
        n if n <= RING_DEPTH => n,
        _ => max_catch_up.clamp(1, RING_DEPTH),
    }
}

/// Slot the consumer reads for a given producer write cursor.
#[inline]
pub fn read_index(write_idx: usize) -> usize {
    (write_idx % RING_DEPTH + RING_DEPTH - 2) % RING_DEPTH
}

/// Worker side.
pub struct AudioProducer {
    last_seen: u32,
    max_catch_up: usize,
    scratch: AudioBlock,
}

impl AudioProducer {
    pub fn new(max_catch_up: usize) -> Self {
        Self {
            last_seen: 0,
            max_catch_up,
            scratch: SILENCE,
        }
    }

    /// Start counting from the consumer's current clock instead of from zero.
    pub fn sync_to(&mut self, control: &ControlBlock) {
        self.last_seen = control.shim_counter.load(Ordering::Acquire);
    }

    pub fn last_seen(&self) -> u32 {
        self.last_seen
    }

    /// Render whatever is due into the ring. Returns the number of blocks written.
    pub fn step(
        &mut self,
        ring: &SharedSegment,
        control: &ControlBlock,
        mut render: impl FnMut(&mut AudioBlock),
    ) -> usize {
        let counter = control.shim_counter.load(Ordering::Acquire);
        let count = blocks_to_render(counter.wrapping_sub(self.last_seen), self.max_catch_up);

        for _ in 0..count {
            self.scratch = SILENCE;
            render(&mut self.scratch);

            let slot = control.write_idx.load(Ordering::Relaxed) as usize % RING_DEPTH;
            ring.write_samples(slot * AUDIO_BLOCK_BYTES, &self.scratch);
            control
                .write_idx
                .store(((slot + 1) % RING_DEPTH) as u8, Ordering::Release);
        }

        self.last_seen = counter;
        control.producer_counter.store(counter, Ordering::Release);
        count
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// A ring slot was mixed in.
    Mixed { slot: usize },
    /// No worker is ready; the block was left untouched.
    Idle,
    /// The worker fell too far behind; silence was contributed.
    Underrun,
}

/// Interception-layer side. Runs once per tick and never blocks.
pub struct AudioConsumer {
    mode: MixMode,
    max_producer_lag: u32,
    scratch: AudioBlock,
}

impl AudioConsumer {
    pub fn new(mode: MixMode, max_producer_lag: u32) -> Self {
        Self {
            mode,
            max_producer_lag,
            scratch: SILENCE,
        }
    }

    pub fn mode(&self) -> MixMode {
        self.mode
    }

    /// Advance `shim_counter` by one tick and return the new value.
    pub fn advance_clock(control: &ControlBlock) -> u32 {
        control
            .shim_counter
            .fetch_add(1, Ordering::AcqRel)
            .wrapping_add(1)
    }

    /// Advance the clock, pick the slot two behind the producer and mix it into `out`.
    pub fn step(
        &mut self,
        ring: &SharedSegment,
        control: &ControlBlock,
        out: &mut AudioBlock,
    ) -> ConsumeOutcome {
        let counter = Self::advance_clock(control);

        let write_idx = control.write_idx.load(Ordering::Acquire) as usize;
        let slot = read_index(write_idx);
        control.read_idx.store(slot as u8, Ordering::Release);

        if !ControlBlock::is_set(&control.shadow_ready) {
            return ConsumeOutcome::Idle;
        }

        if self.max_producer_lag > 0 {
            let produced = control.producer_counter.load(Ordering::Acquire);
            if counter.wrapping_sub(produced) > self.max_producer_lag {
                mix_into(out, &SILENCE, self.mode);
                return ConsumeOutcome::Underrun;
            }
        }

        ring.read_samples(slot * AUDIO_BLOCK_BYTES, &mut self.scratch);
        mix_into(out, &self.scratch, self.mode);
        ConsumeOutcome::Mixed { slot }
    }
}
