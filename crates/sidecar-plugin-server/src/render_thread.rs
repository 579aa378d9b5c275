//! Background rendering decoupled from the worker's poll loop.
//!
//! Poll loop → pop from block queue ← render thread → slot host.
//!
//! The render thread keeps a few blocks rendered ahead behind a short-held
//! `parking_lot` lock. When the queue is empty the poll loop writes silence
//! instead of waiting.

use crate::slots::SlotHost;
use parking_lot::Mutex;
use sidecar_core::AudioBlock;
use sidecar_plugin::{PluginError, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Shared {
    queue: Mutex<VecDeque<AudioBlock>>,
    capacity: usize,
    running: AtomicBool,
    starved: AtomicU64,
}

/// Render thread handle. Stops and joins the thread when dropped.
pub struct RenderThread {
    shared: Arc<Shared>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl RenderThread {
    pub fn spawn(host: Arc<Mutex<SlotHost>>, ahead: usize, idle: Duration) -> Result<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(ahead)),
            capacity: ahead.max(1),
            running: AtomicBool::new(true),
            starved: AtomicU64::new(0),
        });

        let thread_handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("sidecar-render".to_string())
                .spawn(move || Self::render_loop(&shared, &host, idle))
                .map_err(PluginError::Io)?
        };

        Ok(Self {
            shared,
            thread_handle: Some(thread_handle),
        })
    }

    fn render_loop(shared: &Shared, host: &Mutex<SlotHost>, idle: Duration) {
        let mut block = [0i16; sidecar_core::SAMPLES_PER_BLOCK];
        while shared.running.load(Ordering::Relaxed) {
            if shared.queue.lock().len() >= shared.capacity {
                thread::sleep(idle);
                continue;
            }
            // Render outside the queue lock so the poll loop never waits on DSP.
            host.lock().render_mix(&mut block);
            shared.queue.lock().push_back(block);
        }
    }

    /// Take the oldest rendered block, or silence if none is ready.
    pub fn pop_into(&self, out: &mut AudioBlock) -> bool {
        match self.shared.queue.lock().pop_front() {
            Some(block) => {
                *out = block;
                true
            }
            None => {
                out.fill(0);
                self.shared.starved.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn queued(&self) -> usize {
        self.shared.queue.lock().len()
    }

    /// Blocks replaced by silence because nothing was queued.
    pub fn starved(&self) -> u64 {
        self.shared.starved.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}
