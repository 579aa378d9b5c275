//! The set of named shared segments connecting the interception layer and workers.
//!
//! Each segment is optional: a segment that fails to map disables only the
//! features that use it.

use crate::error::Result;
use crate::protocol::{
    ControlBlock, ParamBlock, AUDIO_RING_NAME, AUDIO_RING_SIZE, CONTROL_NAME, CONTROL_SIZE,
    DISPLAY_LIVE_NAME, DISPLAY_NAME, DISPLAY_SIZE, MIDI_NAME, MIDI_SIZE, MOVE_AUDIO_IN_NAME,
    MOVE_AUDIO_IN_SIZE, PARAM_NAME, PARAM_SIZE,
};
use crate::shared_memory::SharedSegment;
use sidecar_core::ChannelConfig;

#[derive(Default)]
pub struct ChannelSet {
    pub audio: Option<SharedSegment>,
    pub move_in: Option<SharedSegment>,
    pub midi: Option<SharedSegment>,
    pub display: Option<SharedSegment>,
    pub display_live: Option<SharedSegment>,
    pub control: Option<SharedSegment>,
    pub param: Option<SharedSegment>,
}

const LAYOUT: [(&str, usize); 7] = [
    (AUDIO_RING_NAME, AUDIO_RING_SIZE),
    (MOVE_AUDIO_IN_NAME, MOVE_AUDIO_IN_SIZE),
    (MIDI_NAME, MIDI_SIZE),
    (DISPLAY_NAME, DISPLAY_SIZE),
    (DISPLAY_LIVE_NAME, DISPLAY_SIZE),
    (CONTROL_NAME, CONTROL_SIZE),
    (PARAM_NAME, PARAM_SIZE),
];

impl ChannelSet {
    /// Create every segment (owner side). Failures are logged and leave that slot empty.
    pub fn create(config: &ChannelConfig) -> Self {
        Self::build(config, "create", SharedSegment::create)
    }

    /// Attach to segments created by the interception layer (worker side).
    pub fn open(config: &ChannelConfig) -> Self {
        Self::build(config, "open", SharedSegment::open)
    }

    fn build(
        config: &ChannelConfig,
        verb: &str,
        map: impl Fn(&std::path::Path, usize) -> Result<SharedSegment>,
    ) -> Self {
        let mut segments = LAYOUT.iter().map(|&(name, size)| {
            let path = config.path_for(name);
            match map(&path, size) {
                Ok(seg) => Some(seg),
                Err(e) => {
                    tracing::warn!("Failed to {} channel {}: {}", verb, name, e);
                    None
                }
            }
        });

        let mut next = || segments.next().flatten();
        Self {
            audio: next(),
            move_in: next(),
            midi: next(),
            display: next(),
            display_live: next(),
            control: next(),
            param: next(),
        }
    }

    pub fn control(&self) -> Option<&ControlBlock> {
        self.control.as_ref().and_then(|s| s.view().ok())
    }

    pub fn param(&self) -> Option<&ParamBlock> {
        self.param.as_ref().and_then(|s| s.view().ok())
    }

    pub fn is_complete(&self) -> bool {
        self.audio.is_some()
            && self.move_in.is_some()
            && self.midi.is_some()
            && self.display.is_some()
            && self.display_live.is_some()
            && self.control.is_some()
            && self.param.is_some()
    }
}
