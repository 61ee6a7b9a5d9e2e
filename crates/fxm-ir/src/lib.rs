//! Core data model for the femtoxm tracker engine.
//!
//! This crate defines the module representation shared by the format
//! parsers and the playback engine. Every cross-entity reference is a
//! base+count index into a flat array (pattern → slots, instrument →
//! samples, sample → waveform data), so a loaded module is cheap to walk,
//! trivially relocatable, and serializable as a handful of blobs.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod instrument;
mod module;
mod sample;

pub use instrument::{AutoVibrato, Envelope, EnvelopePoint, Instrument};
pub use module::{FrequencyType, Module, Pattern, PatternSlot};
pub use sample::{LoopType, Sample};

/// Length of the pattern order table.
pub const PATTERN_ORDER_TABLE_LENGTH: usize = 256;

/// Number of playable notes (C-0 through B-7).
pub const NUM_NOTES: usize = 96;

/// Note value meaning "key off" once a module has been loaded.
/// (The wire format uses 97; the loader normalizes it.)
pub const KEY_OFF_NOTE: u8 = 128;

/// Maximum points in a volume or panning envelope.
pub const MAX_ENVELOPE_POINTS: usize = 12;

/// Maximum envelope point value.
pub const MAX_ENVELOPE_VALUE: u8 = 64;

/// Maximum rows in a single pattern.
pub const MAX_ROWS_PER_PATTERN: u16 = 256;

/// Maximum channel / sample volume.
pub const MAX_VOLUME: u8 = 64;

/// Maximum post-key-off fadeout volume.
pub const MAX_FADEOUT_VOLUME: u16 = 32768;

/// Panning range. One more than fits in the stored byte; this is FT2
/// behaviour and the mixer math relies on it.
pub const MAX_PANNING: u16 = 256;

pub const MIN_BPM: u8 = 32;
pub const MAX_BPM: u8 = 255;

/// Maximum ticks per row ("speed" in tracker terms).
pub const MAX_TEMPO: u8 = 31;

pub const MAX_PATTERNS: u16 = 256;
pub const MAX_INSTRUMENTS: u16 = 128;
pub const MAX_CHANNELS: u8 = u8::MAX;

/// Capacity of the fixed-size name strings, including headroom for the
/// 20/22-byte names of the wire format.
pub const NAME_LENGTH: usize = 24;

/// Bits of sub-frame precision in sample positions and steps.
pub const MICROSTEP_BITS: u32 = 12;

/// Microsteps per input sample frame.
pub const SAMPLE_MICROSTEPS: u32 = 1 << MICROSTEP_BITS;

/// Upper bound on sample length so `length << MICROSTEP_BITS` cannot
/// overflow a `u32` position.
pub const MAX_SAMPLE_LENGTH: u32 = u32::MAX / SAMPLE_MICROSTEPS;
