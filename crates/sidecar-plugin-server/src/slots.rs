//! Plugin slots hosted by the worker.

use crate::config::WorkerConfig;
use sidecar_core::midi::packets;
use sidecar_core::{mix_into, AudioBlock, MixMode, UsbMidiPacket, SAMPLES_PER_BLOCK};
use sidecar_plugin::abi::HostApiV1;
use sidecar_plugin::{ParamTarget, PluginError, PluginInstance, PluginModule, Result};
use smallvec::SmallVec;

pub type MidiBatch = SmallVec<[UsbMidiPacket; 16]>;

struct Slot {
    instance: Box<dyn PluginInstance>,
    /// Peak absolute sample of the last rendered block.
    peak: u16,
}

/// Fixed number of slots, each optionally holding an instance.
pub struct SlotHost {
    slots: Vec<Option<Slot>>,
    scratch: AudioBlock,
}

impl SlotHost {
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: (0..slot_count).map(|_| None).collect(),
            scratch: [0; SAMPLES_PER_BLOCK],
        }
    }

    /// Instantiate the configured module into every slot.
    ///
    /// A v1 module only fills slot 0. A module that fails to load leaves every
    /// slot empty rather than failing the worker.
    pub fn from_config(config: &WorkerConfig) -> Self {
        let mut host = Self::new(config.slot_count);
        let Some(dir) = &config.module_dir else {
            return host;
        };

        let module = match PluginModule::load(
            dir,
            HostApiV1::detached(
                sidecar_core::mailbox::SAMPLE_RATE,
                sidecar_core::FRAMES_PER_BLOCK,
            ),
        ) {
            Ok(module) => module,
            Err(e) => {
                tracing::warn!("Worker running without a module: {}", e);
                return host;
            }
        };

        for slot in 0..config.slot_count {
            match module.instantiate(config.slot_config(slot)) {
                Ok(instance) => host.slots[slot] = Some(Slot { instance, peak: 0 }),
                Err(e) => tracing::warn!("Slot {} left empty: {}", slot, e),
            }
        }
        host
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn insert(&mut self, slot: usize, instance: Box<dyn PluginInstance>) -> Result<()> {
        let count = self.slots.len();
        let entry = self
            .slots
            .get_mut(slot)
            .ok_or(PluginError::InvalidSlot { slot, count })?;
        *entry = Some(Slot { instance, peak: 0 });
        Ok(())
    }

    pub fn remove(&mut self, slot: usize) -> Option<Box<dyn PluginInstance>> {
        self.slots.get_mut(slot)?.take().map(|s| s.instance)
    }

    pub fn is_loaded(&self, slot: usize) -> bool {
        matches!(self.slots.get(slot), Some(Some(_)))
    }

    /// Peak level of each slot's last block, `None` for empty slots.
    pub fn peaks(&self) -> impl Iterator<Item = Option<u16>> + '_ {
        self.slots.iter().map(|s| s.as_ref().map(|s| s.peak))
    }

    /// Collect the deliverable packets of a forwarded queue region.
    pub fn parse_batch(region: &[u8]) -> MidiBatch {
        packets(region).filter(UsbMidiPacket::is_parseable).collect()
    }

    /// Cable 0 goes to the selected slot; other cables go to every loaded slot.
    /// Returns the number of deliveries made.
    pub fn route_midi(&mut self, batch: &[UsbMidiPacket], selected_slot: usize) -> usize {
        let mut delivered = 0;
        for packet in batch {
            let message = packet.message();
            let msg = &message[..packet.message_len()];
            let source = packet.source();

            if packet.cable() == 0 {
                if let Some(Some(slot)) = self.slots.get_mut(selected_slot) {
                    slot.instance.on_midi(msg, source);
                    delivered += 1;
                }
            } else {
                for slot in self.slots.iter_mut().flatten() {
                    slot.instance.on_midi(msg, source);
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// Render every loaded slot and sum them into `out` with saturation.
    pub fn render_mix(&mut self, out: &mut AudioBlock) {
        out.fill(0);
        for slot in self.slots.iter_mut().flatten() {
            slot.instance.render_block(&mut self.scratch);
            slot.peak = self
                .scratch
                .iter()
                .map(|s| s.unsigned_abs())
                .max()
                .unwrap_or(0);
            mix_into(out, &self.scratch, MixMode::Add);
        }
    }

    fn instance(&mut self, slot: usize) -> Result<&mut dyn PluginInstance> {
        let count = self.slots.len();
        match self.slots.get_mut(slot) {
            None => Err(PluginError::InvalidSlot { slot, count }),
            Some(None) => Err(PluginError::NoInstance(slot)),
            Some(Some(s)) => Ok(s.instance.as_mut()),
        }
    }
}

impl ParamTarget for SlotHost {
    fn set_param(&mut self, slot: usize, key: &str, value: &str) -> Result<()> {
        self.instance(slot)?.set_param(key, value)
    }

    fn get_param(&mut self, slot: usize, key: &str, buf: &mut [u8]) -> Result<usize> {
        self.instance(slot)?.get_param(key, buf)
    }
}
