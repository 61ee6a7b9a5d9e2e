//! Format support for femtoxm.
//!
//! Two loaders produce the same [`fxm_ir::Module`]: the standard
//! FastTracker II wire format (`.xm`, version 0x0104+), and the compact
//! `fxm` image written by [`dump_fxm`] for embedded or read-only
//! deployment.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod delta;
mod fxm;
mod reader;
mod xm;

pub use fxm::{dump_fxm, load_fxm, DumpOptions, FXM_MAGIC, FXM_VERSION};
pub use xm::load_xm;

use core::fmt;

/// Error type for both loaders. Loading never leaves partial state behind;
/// the module is built by value and dropped wholesale on failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// Magic bytes do not identify the expected format
    BadMagic,
    /// Input ended before the structures it promised
    Truncated,
    /// XM file version below 0x0104
    UnsupportedVersion(u16),
    /// Channel count of zero or above the engine limit
    TooManyChannels(u16),
    /// More patterns than the format allows
    TooManyPatterns(u16),
    /// More instruments than the format allows
    TooManyInstruments(u16),
    /// Envelope points not strictly ordered, or loop start past loop end
    BadEnvelope,
    /// Sample too long for fixed-point position math
    BadSample,
    /// fxm image written by an incompatible serializer version
    UnsupportedFormatVersion(u8),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::BadMagic => write!(f, "bad magic bytes"),
            LoadError::Truncated => write!(f, "unexpected end of input"),
            LoadError::UnsupportedVersion(v) => {
                write!(f, "unsupported XM version {v:#06x} (need 0x0104+)")
            }
            LoadError::TooManyChannels(n) => write!(f, "unsupported channel count {n}"),
            LoadError::TooManyPatterns(n) => write!(f, "too many patterns ({n})"),
            LoadError::TooManyInstruments(n) => write!(f, "too many instruments ({n})"),
            LoadError::BadEnvelope => write!(f, "invalid envelope"),
            LoadError::BadSample => write!(f, "invalid sample"),
            LoadError::UnsupportedFormatVersion(v) => {
                write!(f, "incompatible fxm image version {v}")
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LoadError {}
