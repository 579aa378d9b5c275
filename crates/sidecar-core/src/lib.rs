//! Core data model shared by every process touching the hardware mailbox.
//!
//! - [`mailbox`] - fixed byte layout of the 4096-byte mailbox and a volatile view over it
//! - [`midi`] - USB-MIDI packet decoding
//! - [`display`] - 1-bit display frames and the 6-slice transmission scheme
//! - [`mix`] - saturating 16-bit block mixing
//! - [`config`] - where shared segments live and JSON config loading
//!
//! Nothing in this crate allocates or blocks on the audio path.

pub mod config;
pub mod display;
pub mod error;
pub mod mailbox;
pub mod midi;
pub mod mix;

pub use config::{load_json_or_default, ChannelConfig};
pub use display::{DisplayFrame, SliceCursor, DISPLAY_BUFFER_SIZE, SLICE_COUNT};
pub use error::{Error, Result};
pub use mailbox::{AudioBlock, Mailbox, FRAMES_PER_BLOCK, MAILBOX_SIZE, SAMPLES_PER_BLOCK};
pub use midi::{MidiSource, UsbMidiPacket};
pub use mix::{mix_into, MixMode};
