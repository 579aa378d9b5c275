//! Per-process interception context.
//!
//! The interceptor owns everything the two hooks need: the cached mailbox, the
//! channel set, gesture state, the audio consumer and an optional in-process
//! plugin. Each device-control call runs one tick, in this order, then the real
//! call:
//!
//! 1. scan incoming MIDI for gestures
//! 2. forward incoming MIDI to workers (`midi_ready` += 1)
//! 3. copy the outgoing audio to the move-in channel
//! 4. mix the worker's ring slot into the outgoing audio
//! 5. render and mix the in-process plugin
//! 6. stage the next display slice
//!
//! The hardware consumes the outgoing MIDI region during the real call, so every
//! write into the mailbox for a tick happens before it.
//!
//! A channel that failed to map disables only its step. Nothing here blocks or
//! returns an error into the host.

use crate::config::ShimConfig;
use crate::hotkey::HotkeyRecognizer;
use crate::inprocess::InProcessPlugin;
use crate::launcher::Launcher;
use crate::transport::DeviceTransport;
use libc::{c_int, c_ulong, c_void, off_t, size_t};
use sidecar_core::display::slice_range;
use sidecar_core::mailbox::MIDI_BUFFER_SIZE;
use sidecar_core::midi::has_parseable;
use sidecar_core::{
    mix_into, AudioBlock, DisplayFrame, Mailbox, MixMode, SliceCursor, DISPLAY_BUFFER_SIZE,
    MAILBOX_SIZE, SAMPLES_PER_BLOCK,
};
use sidecar_plugin::{AudioConsumer, ChannelSet, ConsumeOutcome, ControlBlock, ParamServer};
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Counters kept by the tick path.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub ticks: u64,
    pub midi_batches: u64,
    pub underruns: u64,
    pub skipped_renders: u64,
    pub display_slices: u64,
}

/// Skips one in-process render after `threshold` consecutive ticks over budget.
#[derive(Debug)]
struct OverrunGuard {
    budget: Duration,
    threshold: u32,
    consecutive: u32,
}

impl OverrunGuard {
    fn new(budget_us: u64, threshold: u32) -> Self {
        Self {
            budget: Duration::from_micros(budget_us),
            threshold,
            consecutive: 0,
        }
    }

    fn record(&mut self, elapsed: Duration) {
        if elapsed > self.budget {
            self.consecutive = self.consecutive.saturating_add(1);
        } else {
            self.consecutive = 0;
        }
    }

    fn take_skip(&mut self) -> bool {
        if self.consecutive >= self.threshold {
            self.consecutive = 0;
            true
        } else {
            false
        }
    }
}

pub struct Interceptor<T: DeviceTransport> {
    transport: T,
    config: ShimConfig,
    launcher: Box<dyn Launcher>,
    mailbox: Option<Mailbox>,
    channels: ChannelSet,
    hotkeys: HotkeyRecognizer,
    consumer: AudioConsumer,
    slices: SliceCursor,
    inprocess: Option<InProcessPlugin>,
    param_server: ParamServer,
    overrun: OverrunGuard,
    stats: TickStats,
    midi_in: [u8; MIDI_BUFFER_SIZE],
    audio: AudioBlock,
    frame: DisplayFrame,
}

impl<T: DeviceTransport> Interceptor<T> {
    pub fn new(transport: T, config: ShimConfig, launcher: Box<dyn Launcher>) -> Self {
        let hotkeys = HotkeyRecognizer::new(
            config.toggle_chord.clone(),
            config.launch_chord.clone(),
            config.shadow_ui_enabled,
            config.standalone_enabled,
        );
        let consumer = AudioConsumer::new(config.mix_mode, config.max_producer_lag);
        let overrun = OverrunGuard::new(config.overrun_budget_us, config.overrun_skip_threshold);

        Self {
            transport,
            config,
            launcher,
            mailbox: None,
            channels: ChannelSet::default(),
            hotkeys,
            consumer,
            slices: SliceCursor::new(),
            inprocess: None,
            param_server: ParamServer::new(),
            overrun,
            stats: TickStats::default(),
            midi_in: [0; MIDI_BUFFER_SIZE],
            audio: [0; SAMPLES_PER_BLOCK],
            frame: [0; DISPLAY_BUFFER_SIZE],
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    pub fn mailbox(&self) -> Option<Mailbox> {
        self.mailbox
    }

    pub fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    pub fn hotkeys(&self) -> &HotkeyRecognizer {
        &self.hotkeys
    }

    pub fn stats(&self) -> TickStats {
        self.stats
    }

    /// Hosted in-process plugin, replacing any previous one.
    pub fn host_inprocess(&mut self, plugin: Option<InProcessPlugin>) {
        self.inprocess = plugin;
    }

    pub fn has_inprocess(&self) -> bool {
        self.inprocess.is_some()
    }

    /// Hooked mapping call. The result is returned unchanged; the first
    /// successful mapping of exactly the mailbox size is cached.
    ///
    /// # Safety
    /// Same contract as `mmap(2)`.
    pub unsafe fn map_region(
        &mut self,
        addr: *mut c_void,
        len: size_t,
        prot: c_int,
        flags: c_int,
        fd: c_int,
        offset: off_t,
    ) -> *mut c_void {
        let mapped = self.transport.map_region(addr, len, prot, flags, fd, offset);
        if len == MAILBOX_SIZE && mapped != libc::MAP_FAILED {
            self.attach_mailbox(mapped.cast());
        }
        mapped
    }

    /// Cache the mailbox, create the channels and load the in-process plugin.
    /// Ignored once a mailbox is attached.
    ///
    /// # Safety
    /// `base` must point at [`MAILBOX_SIZE`] bytes that stay mapped for the
    /// lifetime of the interceptor.
    pub unsafe fn attach_mailbox(&mut self, base: *mut u8) {
        if self.mailbox.is_some() {
            return;
        }
        let Some(base) = NonNull::new(base) else {
            return;
        };
        let mailbox = Mailbox::from_raw(base);
        self.mailbox = Some(mailbox);
        tracing::info!("Mailbox mapped at {:p}", base);

        self.channels = ChannelSet::create(&self.config.channels);
        if !self.channels.is_complete() {
            tracing::warn!("Running with missing channels; dependent features disabled");
        }

        if let Some(dir) = &self.config.inprocess_module {
            match InProcessPlugin::load(dir, &self.config.inprocess_module_config, mailbox) {
                Ok(plugin) => self.inprocess = Some(plugin),
                Err(e) => tracing::warn!("In-process module not hosted: {}", e),
            }
        }
    }

    /// Hooked device-control call: one tick, then the real call.
    ///
    /// # Safety
    /// Same contract as `ioctl(2)`.
    pub unsafe fn control(&mut self, fd: c_int, request: c_ulong, arg: *mut c_void) -> c_int {
        self.tick();
        self.transport.control(fd, request, arg)
    }

    /// Everything that happens before the real device-control call.
    pub fn tick(&mut self) {
        let Some(mailbox) = self.mailbox else {
            return;
        };
        let started = Instant::now();
        self.stats.ticks += 1;

        mailbox.read_midi_in(&mut self.midi_in);
        self.handle_gestures();
        self.forward_midi();

        mailbox.read_audio_out(&mut self.audio);
        if let Some(move_in) = &self.channels.move_in {
            move_in.write_samples(0, &self.audio);
        }
        let mixed = self.mix_worker_audio();
        let rendered = self.mix_inprocess(mixed);
        if mixed || rendered {
            mailbox.write_audio_out(&self.audio);
        }

        self.send_display(mailbox);
        self.serve_params();

        self.overrun.record(started.elapsed());
    }

    fn handle_gestures(&mut self) {
        let gestures = self.hotkeys.scan(&self.midi_in);

        if let Some(control) = self.channels.control() {
            ControlBlock::set(&control.shift_held, self.hotkeys.shift_held());
            if let Some(slot) = gestures.select_slot {
                control.selected_slot.store(slot, Ordering::Release);
                control.ui_slot.store(slot, Ordering::Release);
            }
            if gestures.toggle_display {
                let on = control.toggle_display_mode();
                tracing::debug!("Display mode {}", if on { "on" } else { "off" });
            }
        }

        if gestures.launch {
            if let Err(e) = self.launcher.launch(&self.config.launch_command) {
                tracing::warn!("Launch failed: {}", e);
            }
        }
    }

    fn forward_midi(&mut self) {
        if !has_parseable(&self.midi_in) {
            return;
        }
        if let (Some(midi), Some(control)) = (&self.channels.midi, self.channels.control()) {
            midi.write_bytes(0, &self.midi_in);
            control.midi_ready.fetch_add(1, Ordering::AcqRel);
            self.stats.midi_batches += 1;
        }
        if let Some(plugin) = &mut self.inprocess {
            plugin.queue_midi(&self.midi_in);
        }
    }

    fn mix_worker_audio(&mut self) -> bool {
        let Some(control) = self.channels.control() else {
            return false;
        };
        let Some(ring) = &self.channels.audio else {
            // producers still count ticks
            AudioConsumer::advance_clock(control);
            return false;
        };
        match self.consumer.step(ring, control, &mut self.audio) {
            ConsumeOutcome::Mixed { .. } => true,
            ConsumeOutcome::Underrun => {
                self.stats.underruns += 1;
                true
            }
            ConsumeOutcome::Idle => false,
        }
    }

    fn mix_inprocess(&mut self, after_worker: bool) -> bool {
        let Some(plugin) = &mut self.inprocess else {
            return false;
        };
        plugin.dispatch_midi();
        if self.overrun.take_skip() {
            self.stats.skipped_renders += 1;
            return false;
        }
        // A worker block already replaced the original audio.
        let mode = if after_worker {
            MixMode::Add
        } else {
            self.config.mix_mode
        };
        mix_into(&mut self.audio, plugin.render(), mode);
        true
    }

    fn send_display(&mut self, mailbox: Mailbox) {
        let Some(control) = self.channels.control() else {
            return;
        };
        if !ControlBlock::is_set(&control.display_mode) {
            self.slices.reset();
            return;
        }
        let Some(display) = &self.channels.display else {
            return;
        };

        display.read_bytes(0, &mut self.frame);
        let index = self.slices.advance();
        mailbox.write_display_slice(index as u8 + 1, &self.frame[slice_range(index)]);
        self.stats.display_slices += 1;

        if self.config.display_mirror_enabled {
            if let Some(live) = &self.channels.display_live {
                live.write_bytes(0, &self.frame);
            }
        }
    }

    /// Answer slot-0 parameter requests while no worker owns the block.
    fn serve_params(&mut self) {
        let (Some(plugin), Some(param), Some(control)) = (
            &mut self.inprocess,
            self.channels.param(),
            self.channels.control(),
        ) else {
            return;
        };
        if ControlBlock::is_set(&control.shadow_ready) {
            return;
        }
        self.param_server.poll(param, plugin);
    }

    /// Ask workers to exit and release the channels.
    pub fn shutdown(&mut self) {
        if let Some(control) = self.channels.control() {
            control.request_exit();
        }
        self.inprocess = None;
        self.channels = ChannelSet::default();
    }
}

impl<T: DeviceTransport> Drop for Interceptor<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
