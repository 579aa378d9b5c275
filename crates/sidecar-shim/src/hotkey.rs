//! Chorded gesture recognition over the incoming MIDI queue.
//!
//! Touch state is level-triggered: each tick's queue updates per-control held
//! flags, then every chord is checked against the current state. A gesture fires
//! on the first tick all of its members are held.
//!
//! - **Toggle**: fires once per press of the chord; re-arms when any member is
//!   released.
//! - **Launch**: fires at most once for the lifetime of the recognizer.
//!
//! Track buttons (CC 40-43) select a slot on press, right to left: CC 43 is
//! slot 0 and CC 40 is slot 3.

use serde::{Deserialize, Serialize};
use sidecar_core::midi::packets;
use sidecar_core::mailbox::MIDI_BUFFER_SIZE;
use sidecar_core::UsbMidiPacket;

/// A physical control, addressed by the message that reports its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlId {
    /// Touch sensor reporting Note On velocity 127 while touched.
    Note(u8),
    /// Button reporting CC value 127 while held.
    Cc(u8),
}

pub const SHIFT: ControlId = ControlId::Cc(0x31);
pub const KNOB8_TOUCH: ControlId = ControlId::Note(7);
pub const VOLUME_TOUCH: ControlId = ControlId::Note(8);
pub const JOG_TOUCH: ControlId = ControlId::Note(9);

const PRESSED: u8 = 0x7F;

/// Track buttons, reported right to left.
pub const TRACK_BUTTONS: std::ops::RangeInclusive<u8> = 40..=43;

pub fn default_toggle_chord() -> Vec<ControlId> {
    vec![SHIFT, VOLUME_TOUCH, JOG_TOUCH]
}

pub fn default_launch_chord() -> Vec<ControlId> {
    vec![SHIFT, VOLUME_TOUCH, KNOB8_TOUCH]
}

/// Gestures recognised during one scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Gestures {
    pub toggle_display: bool,
    pub launch: bool,
    /// Slot picked by a track button press, when it changed the selection.
    pub select_slot: Option<u8>,
}

impl Gestures {
    pub fn any(&self) -> bool {
        self.toggle_display || self.launch || self.select_slot.is_some()
    }
}

struct Chord {
    members: Vec<ControlId>,
    enabled: bool,
}

impl Chord {
    fn new(members: Vec<ControlId>, enabled: bool) -> Self {
        Self { members, enabled }
    }

    fn is_held(&self, held: &[(ControlId, bool)]) -> bool {
        self.enabled
            && !self.members.is_empty()
            && self
                .members
                .iter()
                .all(|m| held.iter().any(|&(id, on)| id == *m && on))
    }
}

pub struct HotkeyRecognizer {
    held: Vec<(ControlId, bool)>,
    toggle: Chord,
    launch: Chord,
    toggle_latched: bool,
    launched: bool,
    selected_slot: u8,
    previous: [u8; MIDI_BUFFER_SIZE],
    primed: bool,
}

impl HotkeyRecognizer {
    pub fn new(
        toggle_chord: Vec<ControlId>,
        launch_chord: Vec<ControlId>,
        toggle_enabled: bool,
        launch_enabled: bool,
    ) -> Self {
        let mut held: Vec<(ControlId, bool)> = Vec::new();
        for id in std::iter::once(SHIFT)
            .chain(toggle_chord.iter().copied())
            .chain(launch_chord.iter().copied())
        {
            if !held.iter().any(|&(h, _)| h == id) {
                held.push((id, false));
            }
        }

        Self {
            held,
            toggle: Chord::new(toggle_chord, toggle_enabled),
            launch: Chord::new(launch_chord, launch_enabled),
            toggle_latched: false,
            launched: false,
            selected_slot: 0,
            previous: [0; MIDI_BUFFER_SIZE],
            primed: false,
        }
    }

    pub fn is_held(&self, id: ControlId) -> bool {
        self.held.iter().any(|&(h, on)| h == id && on)
    }

    pub fn shift_held(&self) -> bool {
        self.is_held(SHIFT)
    }

    pub fn has_launched(&self) -> bool {
        self.launched
    }

    pub fn selected_slot(&self) -> u8 {
        self.selected_slot
    }

    /// Update touch state from one tick's incoming queue and report gestures.
    ///
    /// A packet identical to the one seen at the same queue position on the
    /// previous tick is not re-applied.
    pub fn scan(&mut self, region: &[u8; MIDI_BUFFER_SIZE]) -> Gestures {
        let mut gestures = Gestures::default();

        for (i, packet) in packets(region).enumerate() {
            let at = i * 4;
            let seen = self.primed && self.previous[at..at + 4] == packet.bytes();
            self.previous[at..at + 4].copy_from_slice(&packet.bytes());
            if seen || !Self::is_control_packet(&packet) {
                continue;
            }

            if let Some((id, on)) = Self::decode(&packet) {
                self.apply(id, on);
            }

            if let Some(slot) = Self::track_press(&packet) {
                if slot != self.selected_slot {
                    self.selected_slot = slot;
                    gestures.select_slot = Some(slot);
                    tracing::debug!("Selected slot {}", slot);
                }
            }

            if self.toggle.is_held(&self.held) {
                if !self.toggle_latched {
                    self.toggle_latched = true;
                    gestures.toggle_display = true;
                    tracing::debug!("Display toggle chord");
                }
            } else {
                self.toggle_latched = false;
            }

            if !self.launched && self.launch.is_held(&self.held) {
                self.launched = true;
                gestures.launch = true;
                tracing::debug!("Launch chord");
            }
        }
        self.primed = true;

        gestures
    }

    fn is_control_packet(packet: &UsbMidiPacket) -> bool {
        let cin = packet.code_index();
        cin != 1
            && cin != 2
            && packet.cable() != 0xF
            && packet.message().iter().any(|&b| b != 0)
    }

    fn decode(packet: &UsbMidiPacket) -> Option<(ControlId, bool)> {
        if packet.is_control_change() {
            Some((ControlId::Cc(packet.data1()), packet.data2() == PRESSED))
        } else if packet.status() & 0xF0 == 0x90 {
            Some((ControlId::Note(packet.data1()), packet.data2() == PRESSED))
        } else if packet.status() & 0xF0 == 0x80 {
            Some((ControlId::Note(packet.data1()), false))
        } else {
            None
        }
    }

    fn track_press(packet: &UsbMidiPacket) -> Option<u8> {
        let cc = packet.data1();
        (packet.is_control_change() && TRACK_BUTTONS.contains(&cc) && packet.data2() > 0)
            .then(|| TRACK_BUTTONS.end() - cc)
    }

    fn apply(&mut self, id: ControlId, on: bool) {
        if let Some(entry) = self.held.iter_mut().find(|(h, _)| *h == id) {
            entry.1 = on;
        }
    }
}
