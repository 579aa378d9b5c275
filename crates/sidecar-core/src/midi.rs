//! USB-MIDI event packets.
//!
//! Byte 0 carries the cable number (high nibble) and the code index number
//! (low nibble); bytes 1..=3 are the MIDI message. An all-zero packet is an empty
//! queue slot.

use crate::mailbox::MIDI_BUFFER_SIZE;

pub const PACKET_SIZE: usize = 4;
pub const PACKETS_PER_QUEUE: usize = MIDI_BUFFER_SIZE / PACKET_SIZE;

/// Origin tag passed to plugin `on_midi` callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum MidiSource {
    /// The device's own controls (cable 0).
    Internal = 0,
    /// Anything plugged into the device (other cables).
    External = 1,
    /// Generated by the host itself.
    Host = 2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UsbMidiPacket([u8; PACKET_SIZE]);

impl UsbMidiPacket {
    pub const fn new(bytes: [u8; PACKET_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; PACKET_SIZE] {
        self.0
    }

    #[inline]
    pub fn cable(&self) -> u8 {
        self.0[0] >> 4
    }

    #[inline]
    pub fn code_index(&self) -> u8 {
        self.0[0] & 0x0F
    }

    #[inline]
    pub fn status(&self) -> u8 {
        self.0[1]
    }

    #[inline]
    pub fn data1(&self) -> u8 {
        self.0[2]
    }

    #[inline]
    pub fn data2(&self) -> u8 {
        self.0[3]
    }

    /// The 3-byte MIDI message.
    pub fn message(&self) -> [u8; 3] {
        [self.0[1], self.0[2], self.0[3]]
    }

    /// Meaningful bytes of [`message`](Self::message): program change and
    /// channel pressure carry one data byte, other channel messages two.
    pub fn message_len(&self) -> usize {
        match self.code_index() {
            0x0C | 0x0D => 2,
            _ => 3,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == [0; PACKET_SIZE]
    }

    /// Channel voice message with a status byte (CIN 0x8..=0xE), not on the
    /// firmware's housekeeping cable 0xF.
    pub fn is_parseable(&self) -> bool {
        if self.is_empty() || self.cable() == 0x0F {
            return false;
        }
        (0x08..=0x0E).contains(&self.code_index()) && self.status() & 0x80 != 0
    }

    pub fn is_note_on(&self) -> bool {
        self.status() & 0xF0 == 0x90
    }

    pub fn is_note_off(&self) -> bool {
        self.status() & 0xF0 == 0x80
    }

    pub fn is_control_change(&self) -> bool {
        self.status() & 0xF0 == 0xB0
    }

    pub fn source(&self) -> MidiSource {
        if self.cable() == 0 {
            MidiSource::Internal
        } else {
            MidiSource::External
        }
    }
}

/// Iterate the packets of a queue region in 4-byte strides.
pub fn packets(region: &[u8]) -> impl Iterator<Item = UsbMidiPacket> + '_ {
    region
        .chunks_exact(PACKET_SIZE)
        .map(|c| UsbMidiPacket([c[0], c[1], c[2], c[3]]))
}

pub fn has_parseable(region: &[u8]) -> bool {
    packets(region).any(|p| p.is_parseable())
}
