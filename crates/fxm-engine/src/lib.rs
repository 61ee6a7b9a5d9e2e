//! Realtime playback engine for femtoxm.
//!
//! A [`Context`] owns a parsed [`fxm_ir::Module`] and turns it into
//! interleaved stereo `f32` PCM. After construction the engine performs
//! no allocation, I/O or blocking: [`Context::generate_samples`] is safe
//! to call from an audio callback. A context belongs to a single thread;
//! mutate it between generate calls only.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod channel;
mod context;
mod effects;
mod frequency;
mod generator;

pub use channel::ChannelState;
pub use context::Context;
pub use frequency::{
    clamp_period, note_period, period_frequency, period_step, PERIOD_MAX_AMIGA, PERIOD_MAX_LINEAR,
    PERIOD_MIN_AMIGA, PERIOD_MIN_LINEAR,
};

/// Granularity of tick timing, in fractions of an output frame. Worst
/// case rounding is one frame of drift every `TICK_SUBSAMPLES` ticks.
pub const TICK_SUBSAMPLES: u32 = 1 << 13;

/// Length of the cross-fade window after a note trigger, in frames.
pub const RAMPING_POINTS: usize = 31;

/// Largest per-frame change of a channel's final volume, used to keep
/// volume steps from clicking.
pub const VOLUME_RAMP: f32 = 1.0 / 128.0;

/// Final scaling of the mixed output, a compromise between headroom and
/// loudness.
pub const AMPLIFICATION: f32 = 0.25;
