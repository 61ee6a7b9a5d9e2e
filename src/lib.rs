//! femtoxm — a deterministic, realtime-safe FastTracker II (`.xm`)
//! playback engine.
//!
//! The workspace splits into three crates re-exported here:
//! [`fxm_ir`] (the module data model), [`fxm_formats`] (the `.xm` loader
//! and the compact `fxm` serializer) and [`fxm_engine`] (the playback
//! context and sample generator).
//!
//! ```no_run
//! let data = std::fs::read("song.xm").unwrap();
//! let mut ctx = femtoxm::create_from_xm(&data, 48000).unwrap();
//! let mut buffer = vec![0.0f32; 2 * 512];
//! loop {
//!     ctx.generate_samples(&mut buffer);
//!     // hand `buffer` to the audio backend
//! }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

pub use fxm_engine::{Context, AMPLIFICATION, RAMPING_POINTS, TICK_SUBSAMPLES};
pub use fxm_formats::{dump_fxm, load_fxm, load_xm, DumpOptions, LoadError};
pub use fxm_ir as ir;

/// Parse a `.xm` byte buffer and build a playback context producing
/// audio at `rate` Hz.
pub fn create_from_xm(data: &[u8], rate: u32) -> Result<Context, LoadError> {
    Ok(Context::new(load_xm(data)?, rate))
}

/// Load a compact `fxm` image (written by [`dump_fxm`] or the `fxmize`
/// tool) and build a playback context producing audio at `rate` Hz.
pub fn create_from_fxm(data: &[u8], rate: u32) -> Result<Context, LoadError> {
    Ok(Context::new(load_fxm(data)?, rate))
}
