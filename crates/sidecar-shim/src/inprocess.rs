//! A plugin hosted inside the intercepted process.
//!
//! MIDI is queued on a bounded lock-free queue and dispatched right before the
//! plugin renders, so the instance only ever runs on the tick path.

use crate::error::Result;
use crossbeam::queue::ArrayQueue;
use sidecar_core::midi::{packets, PACKETS_PER_QUEUE};
use sidecar_core::{AudioBlock, Mailbox, UsbMidiPacket, SAMPLES_PER_BLOCK};
use sidecar_plugin::abi::HostApiV1;
use sidecar_plugin::{ParamTarget, PluginError, PluginInstance, PluginModule};
use std::path::Path;

pub struct InProcessPlugin {
    instance: Box<dyn PluginInstance>,
    midi: ArrayQueue<UsbMidiPacket>,
    block: AudioBlock,
    dropped: u64,
}

impl InProcessPlugin {
    /// Load `module_dir` with direct access to the mailbox.
    pub fn load(module_dir: &Path, json_config: &str, mailbox: Mailbox) -> Result<Self> {
        let module = PluginModule::load(module_dir, HostApiV1::with_mailbox(mailbox))?;
        let instance = module.instantiate(json_config)?;
        tracing::info!(
            "Hosting {} in-process (API v{})",
            module_dir.display(),
            module.api_version()
        );
        Ok(Self::new(instance))
    }

    pub fn new(instance: Box<dyn PluginInstance>) -> Self {
        Self {
            instance,
            midi: ArrayQueue::new(PACKETS_PER_QUEUE * 2),
            block: [0; SAMPLES_PER_BLOCK],
            dropped: 0,
        }
    }

    /// Queue every parseable packet of an incoming region. Returns the number queued.
    pub fn queue_midi(&mut self, region: &[u8]) -> usize {
        let mut queued = 0;
        for packet in packets(region).filter(UsbMidiPacket::is_parseable) {
            if self.midi.push(packet).is_ok() {
                queued += 1;
            } else {
                self.dropped += 1;
            }
        }
        queued
    }

    /// Deliver queued MIDI to the instance.
    pub fn dispatch_midi(&mut self) -> usize {
        let mut delivered = 0;
        while let Some(packet) = self.midi.pop() {
            let message = packet.message();
            self.instance
                .on_midi(&message[..packet.message_len()], packet.source());
            delivered += 1;
        }
        delivered
    }

    pub fn render(&mut self) -> &AudioBlock {
        self.instance.render_block(&mut self.block);
        &self.block
    }

    /// Packets discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// The in-process plugin answers as slot 0.
impl ParamTarget for InProcessPlugin {
    fn set_param(&mut self, slot: usize, key: &str, value: &str) -> sidecar_plugin::Result<()> {
        if slot != 0 {
            return Err(PluginError::InvalidSlot { slot, count: 1 });
        }
        self.instance.set_param(key, value)
    }

    fn get_param(&mut self, slot: usize, key: &str, buf: &mut [u8]) -> sidecar_plugin::Result<usize> {
        if slot != 0 {
            return Err(PluginError::InvalidSlot { slot, count: 1 });
        }
        self.instance.get_param(key, buf)
    }
}
