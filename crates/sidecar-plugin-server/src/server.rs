//! Worker process main loop.
//!
//! Each iteration: check `should_exit`, deliver newly forwarded MIDI, render
//! whatever audio is due into the ring, answer one parameter request, and redraw
//! the status frame while the alternate display is active.

use crate::config::WorkerConfig;
use crate::render_thread::RenderThread;
use crate::slots::SlotHost;
use crate::status::draw_status;
use parking_lot::Mutex;
use sidecar_core::{DisplayFrame, DISPLAY_BUFFER_SIZE};
use sidecar_plugin::protocol::MIDI_SIZE;
use sidecar_plugin::{
    AudioProducer, ChannelSet, ControlBlock, ParamServer, PluginError, Result,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub iterations: u64,
    pub blocks_rendered: u64,
    pub midi_batches: u64,
    pub rpc_requests: u64,
}

pub struct Worker {
    config: WorkerConfig,
    channels: ChannelSet,
    host: Arc<Mutex<SlotHost>>,
    producer: AudioProducer,
    render_thread: Option<RenderThread>,
    param_server: ParamServer,
    last_midi_ready: u8,
    status: DisplayFrame,
    stats: WorkerStats,
}

impl Worker {
    /// Attach to the channels described by `config` and host `host`'s slots.
    pub fn new(config: WorkerConfig, host: SlotHost) -> Result<Self> {
        config.validate()?;

        let channels = ChannelSet::open(&config.channels);
        let control = channels.control().ok_or_else(|| {
            PluginError::SharedMemory("control channel unavailable".to_string())
        })?;
        if channels.audio.is_none() {
            return Err(PluginError::SharedMemory(
                "audio ring unavailable".to_string(),
            ));
        }

        let mut producer = AudioProducer::new(config.max_catch_up);
        producer.sync_to(control);
        let last_midi_ready = control.midi_ready.load(Ordering::Acquire);

        let host = Arc::new(Mutex::new(host));
        let render_thread = if config.render_thread {
            Some(RenderThread::spawn(
                Arc::clone(&host),
                config.render_ahead_blocks,
                config.poll_interval() / 2,
            )?)
        } else {
            None
        };

        Ok(Self {
            config,
            channels,
            host,
            producer,
            render_thread,
            param_server: ParamServer::new(),
            last_midi_ready,
            status: [0; DISPLAY_BUFFER_SIZE],
            stats: WorkerStats::default(),
        })
    }

    /// Load the configured module into every slot, then attach.
    pub fn from_config(config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        let host = SlotHost::from_config(&config);
        Self::new(config, host)
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats
    }

    pub fn host(&self) -> &Arc<Mutex<SlotHost>> {
        &self.host
    }

    /// Run one loop iteration. Returns `false` once exit has been requested.
    pub fn step(&mut self) -> bool {
        let Some(control) = self.channels.control() else {
            return false;
        };
        if ControlBlock::is_set(&control.should_exit) {
            return false;
        }
        self.stats.iterations += 1;

        // MIDI forwarded since the last iteration
        let midi_ready = control.midi_ready.load(Ordering::Acquire);
        if midi_ready != self.last_midi_ready {
            self.last_midi_ready = midi_ready;
            if let Some(midi) = &self.channels.midi {
                let mut region = [0u8; MIDI_SIZE];
                midi.read_bytes(0, &mut region);
                let batch = SlotHost::parse_batch(&region);
                let selected = control.selected_slot.load(Ordering::Acquire) as usize;
                self.host.lock().route_midi(&batch, selected);
                self.stats.midi_batches += 1;
            }
        }

        // Audio due since the last iteration
        if let Some(ring) = &self.channels.audio {
            let host = &self.host;
            let render_thread = &self.render_thread;
            let rendered = self.producer.step(ring, control, |block| match render_thread {
                Some(rt) => {
                    rt.pop_into(block);
                }
                None => host.lock().render_mix(block),
            });
            self.stats.blocks_rendered += rendered as u64;
        }

        if let Some(param) = self.channels.param() {
            if self.param_server.poll(param, &mut *self.host.lock()) {
                self.stats.rpc_requests += 1;
            }
        }

        if ControlBlock::is_set(&control.display_mode) {
            if let Some(display) = &self.channels.display {
                let peaks: Vec<Option<u16>> = self.host.lock().peaks().collect();
                let selected = control.selected_slot.load(Ordering::Acquire) as usize;
                let shift = ControlBlock::is_set(&control.shift_held);
                draw_status(&mut self.status, &peaks, selected, shift);
                display.write_bytes(0, &self.status);
            }
        }

        true
    }

    /// Poll until `should_exit` is observed, then release everything.
    pub async fn run(&mut self) -> Result<()> {
        if let Some(control) = self.channels.control() {
            ControlBlock::set(&control.shadow_ready, true);
        }
        tracing::info!(
            "Worker running: {} slots, poll every {}us",
            self.config.slot_count,
            self.config.poll_interval_us
        );

        let interval = self.config.poll_interval();
        while self.step() {
            tokio::time::sleep(interval).await;
        }

        self.shutdown();
        tracing::info!("Worker stopped after {} iterations", self.stats.iterations);
        Ok(())
    }

    /// Clear `shadow_ready`, stop rendering and unmap every channel.
    pub fn shutdown(&mut self) {
        if let Some(control) = self.channels.control() {
            ControlBlock::set(&control.shadow_ready, false);
        }
        if let Some(mut rt) = self.render_thread.take() {
            rt.stop();
        }
        self.channels = ChannelSet::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::tests::Constant;
    use sidecar_core::mailbox::AUDIO_BLOCK_BYTES;
    use sidecar_core::{ChannelConfig, SAMPLES_PER_BLOCK};
    use sidecar_plugin::{read_index, ParamClient, RpcConfig};
    use std::time::Duration;

    struct Rig {
        _dir: tempfile::TempDir,
        owner: ChannelSet,
        config: WorkerConfig,
    }

    fn rig() -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let channels = ChannelConfig::in_dir(dir.path());
        let owner = ChannelSet::create(&channels);
        Rig {
            _dir: dir,
            owner,
            config: WorkerConfig {
                slot_count: 2,
                poll_interval_us: 200,
                channels,
                ..Default::default()
            },
        }
    }

    fn host_with_levels(levels: &[i16]) -> SlotHost {
        let mut host = SlotHost::new(levels.len());
        for (i, &level) in levels.iter().enumerate() {
            host.insert(i, Constant::boxed(level).0).unwrap();
        }
        host
    }

    #[test]
    fn test_new_requires_channels() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorkerConfig {
            channels: ChannelConfig::in_dir(dir.path()),
            ..Default::default()
        };
        assert!(matches!(
            Worker::new(config, SlotHost::new(4)),
            Err(PluginError::SharedMemory(_))
        ));
    }

    #[test]
    fn test_renders_due_blocks_into_ring() {
        let rig = rig();
        let control = rig.owner.control().unwrap();
        let mut worker = Worker::new(rig.config.clone(), host_with_levels(&[100, 200])).unwrap();

        control.shim_counter.fetch_add(2, Ordering::AcqRel);
        assert!(worker.step());
        assert_eq!(worker.stats().blocks_rendered, 2);
        assert_eq!(control.write_idx.load(Ordering::Acquire), 2);

        let mut block = [0i16; SAMPLES_PER_BLOCK];
        rig.owner
            .audio
            .as_ref()
            .unwrap()
            .read_samples(0, &mut block);
        assert!(block.iter().all(|&s| s == 300));

        // nothing further due
        assert!(worker.step());
        assert_eq!(worker.stats().blocks_rendered, 2);
    }

    #[test]
    fn test_forwards_midi_on_counter_change() {
        let rig = rig();
        let control = rig.owner.control().unwrap();

        let mut host = SlotHost::new(2);
        let (inst, midi) = Constant::boxed(0);
        host.insert(1, inst).unwrap();
        let mut worker = Worker::new(rig.config.clone(), host).unwrap();

        rig.owner
            .midi
            .as_ref()
            .unwrap()
            .write_bytes(0, &[0x09, 0x90, 0x3C, 0x7F]);
        control.selected_slot.store(1, Ordering::Release);

        // counter unchanged: nothing delivered
        worker.step();
        assert_eq!(midi.load(Ordering::SeqCst), 0);

        control.midi_ready.fetch_add(1, Ordering::AcqRel);
        worker.step();
        assert_eq!(midi.load(Ordering::SeqCst), 1);
        assert_eq!(worker.stats().midi_batches, 1);

        worker.step();
        assert_eq!(midi.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_draws_status_in_display_mode() {
        let rig = rig();
        let control = rig.owner.control().unwrap();
        let mut worker = Worker::new(rig.config.clone(), SlotHost::new(2)).unwrap();
        let display = rig.owner.display.as_ref().unwrap();

        worker.step();
        let mut frame = [0u8; DISPLAY_BUFFER_SIZE];
        display.read_bytes(0, &mut frame);
        assert!(frame.iter().all(|&b| b == 0));

        control.display_mode.store(1, Ordering::Release);
        worker.step();
        display.read_bytes(0, &mut frame);
        assert_ne!(frame[0], 0);
    }

    #[test]
    fn test_answers_param_requests() {
        let rig = rig();
        let mut host = SlotHost::new(2);
        host.insert(0, Constant::boxed(7).0).unwrap();
        let mut worker = Worker::new(rig.config.clone(), host).unwrap();
        let param = rig.owner.param().unwrap();

        let done = std::sync::atomic::AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                let client = ParamClient::new(
                    param,
                    RpcConfig {
                        poll_interval_us: 200,
                        timeout_ms: 1000,
                        ..Default::default()
                    },
                );
                assert_eq!(client.get(0, "level").unwrap(), "7");
                assert!(matches!(
                    client.get(1, "level"),
                    Err(PluginError::Rpc { code: 2 })
                ));
                done.store(true, Ordering::Release);
            });
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while !done.load(Ordering::Acquire) && std::time::Instant::now() < deadline {
                worker.step();
                std::thread::sleep(Duration::from_micros(200));
            }
        });
        assert!(worker.stats().rpc_requests >= 2);
    }

    #[test]
    fn test_render_thread_feeds_producer() {
        let rig = rig();
        let control = rig.owner.control().unwrap();
        let config = WorkerConfig {
            render_thread: true,
            render_ahead_blocks: 2,
            ..rig.config.clone()
        };
        let mut worker = Worker::new(config, host_with_levels(&[55])).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        control.shim_counter.fetch_add(1, Ordering::AcqRel);
        worker.step();

        let mut block = [0i16; SAMPLES_PER_BLOCK];
        rig.owner
            .audio
            .as_ref()
            .unwrap()
            .read_samples(0, &mut block);
        assert!(block.iter().all(|&s| s == 55));
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_run_exits_on_should_exit() {
        let rig = rig();
        let control = rig.owner.control().unwrap();
        let mut worker = Worker::new(rig.config.clone(), host_with_levels(&[1, 2])).unwrap();

        control.should_exit.store(1, Ordering::Release);
        worker.run().await.unwrap();

        assert_eq!(control.shadow_ready.load(Ordering::Acquire), 0);
        assert!(worker.channels.control.is_none());
    }

    #[test]
    fn test_ring_slot_matches_consumer_read() {
        let rig = rig();
        let control = rig.owner.control().unwrap();
        let mut worker = Worker::new(rig.config.clone(), host_with_levels(&[3])).unwrap();

        for _ in 0..3 {
            control.shim_counter.fetch_add(1, Ordering::AcqRel);
            worker.step();
        }
        let slot = read_index(control.write_idx.load(Ordering::Acquire) as usize);
        let mut block = [0i16; SAMPLES_PER_BLOCK];
        rig.owner
            .audio
            .as_ref()
            .unwrap()
            .read_samples(slot * AUDIO_BLOCK_BYTES, &mut block);
        assert_eq!(block[0], 3);
    }
}
