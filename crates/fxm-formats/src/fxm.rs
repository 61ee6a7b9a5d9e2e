//! Compact `fxm` image format.
//!
//! A post-load dump of a parsed [`Module`]: a six-byte header followed by
//! the flat arrays in a fixed order, every multi-byte field little-endian.
//! Loading is a single forward pass with no per-slot bit twiddling, which
//! makes it suitable for embedded and read-only deployment.
//!
//! Layout:
//!
//! ```text
//! magic            4  b"FXM1"
//! version          1  FXM_VERSION, load refuses anything else
//! flags            1  bit 0: waveforms delta-coded, bit 1: waveforms zeroed
//! module header:   name[24] tracker_name[24] length:u16 restart:u8
//!                  channels:u8 frequency_type:u8 tempo:u8 bpm:u8
//! counts:          patterns:u16 instruments:u16 samples:u16
//!                  slots:u32 waveform_frames:u32
//! order table      256 bytes
//! patterns         rows_index:u16 num_rows:u16 each
//! slots            5 bytes each
//! instruments      see `write_instrument`
//! samples          see `write_sample`
//! waveform data    i16 LE each
//! ```

use alloc::vec::Vec;
use arrayvec::ArrayString;

use fxm_ir::{
    AutoVibrato, Envelope, EnvelopePoint, FrequencyType, Instrument, Module, Pattern, PatternSlot,
    Sample, NAME_LENGTH, NUM_NOTES, PATTERN_ORDER_TABLE_LENGTH,
};

use crate::reader::Reader;
use crate::LoadError;

pub const FXM_MAGIC: [u8; 4] = *b"FXM1";
pub const FXM_VERSION: u8 = 1;

const FLAG_DELTA: u8 = 1 << 0;
const FLAG_ZEROED: u8 = 1 << 1;

/// Options for [`dump_fxm`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DumpOptions {
    /// Delta-code the waveform blob; decoded transparently on load.
    pub delta_samples: bool,
    /// Write an all-zero waveform blob (template images for targets that
    /// keep sample data elsewhere).
    pub zero_waveforms: bool,
}

/// Serialize a module into a compact image.
pub fn dump_fxm(module: &Module, options: DumpOptions) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&FXM_MAGIC);
    out.push(FXM_VERSION);
    let mut flags = 0u8;
    if options.delta_samples && !options.zero_waveforms {
        flags |= FLAG_DELTA;
    }
    if options.zero_waveforms {
        flags |= FLAG_ZEROED;
    }
    out.push(flags);

    write_name(&mut out, &module.name);
    write_name(&mut out, &module.tracker_name);
    write_u16(&mut out, module.length);
    out.push(module.restart_position);
    out.push(module.num_channels);
    out.push(match module.frequency_type {
        FrequencyType::Linear => 0,
        FrequencyType::Amiga => 1,
    });
    out.push(module.default_tempo);
    out.push(module.default_bpm);

    write_u16(&mut out, module.patterns.len() as u16);
    write_u16(&mut out, module.instruments.len() as u16);
    write_u16(&mut out, module.samples.len() as u16);
    write_u32(&mut out, module.pattern_slots.len() as u32);
    write_u32(&mut out, module.samples_data.len() as u32);

    out.extend_from_slice(&module.pattern_table);

    for pattern in &module.patterns {
        write_u16(&mut out, pattern.rows_index);
        write_u16(&mut out, pattern.num_rows);
    }
    for slot in &module.pattern_slots {
        out.extend_from_slice(&[
            slot.note,
            slot.instrument,
            slot.volume_column,
            slot.effect_type,
            slot.effect_param,
        ]);
    }
    for instrument in &module.instruments {
        write_instrument(&mut out, instrument);
    }
    for sample in &module.samples {
        write_sample(&mut out, sample);
    }

    if options.zero_waveforms {
        out.resize(out.len() + module.samples_data.len() * 2, 0);
    } else if options.delta_samples {
        let mut prev: i16 = 0;
        for &point in &module.samples_data {
            write_i16(&mut out, point.wrapping_sub(prev));
            prev = point;
        }
    } else {
        for &point in &module.samples_data {
            write_i16(&mut out, point);
        }
    }
    out
}

/// Load a module from a compact image.
pub fn load_fxm(data: &[u8]) -> Result<Module, LoadError> {
    let mut r = Reader::new(data);
    if r.bytes(4)? != FXM_MAGIC {
        return Err(LoadError::BadMagic);
    }
    let version = r.u8()?;
    if version != FXM_VERSION {
        return Err(LoadError::UnsupportedFormatVersion(version));
    }
    let flags = r.u8()?;

    let name = read_name(&mut r)?;
    let tracker_name = read_name(&mut r)?;
    let length = r.u16()?;
    let restart_position = r.u8()?;
    let num_channels = r.u8()?;
    if num_channels == 0 {
        return Err(LoadError::TooManyChannels(0));
    }
    let frequency_type = match r.u8()? {
        0 => FrequencyType::Linear,
        _ => FrequencyType::Amiga,
    };
    let default_tempo = r.u8()?;
    let default_bpm = r.u8()?;

    let num_patterns = r.u16()? as usize;
    let num_instruments = r.u16()? as usize;
    let num_samples = r.u16()? as usize;
    let num_slots = r.u32()? as usize;
    let num_points = r.u32()? as usize;

    let mut pattern_table = [0u8; PATTERN_ORDER_TABLE_LENGTH];
    pattern_table.copy_from_slice(r.bytes(PATTERN_ORDER_TABLE_LENGTH)?);

    let mut patterns = Vec::with_capacity(num_patterns);
    for _ in 0..num_patterns {
        patterns.push(Pattern { rows_index: r.u16()?, num_rows: r.u16()? });
    }
    let mut pattern_slots = Vec::with_capacity(num_slots);
    for _ in 0..num_slots {
        let b = r.bytes(5)?;
        pattern_slots.push(PatternSlot {
            note: b[0],
            instrument: b[1],
            volume_column: b[2],
            effect_type: b[3],
            effect_param: b[4],
        });
    }
    let mut instruments = Vec::with_capacity(num_instruments);
    for _ in 0..num_instruments {
        instruments.push(read_instrument(&mut r)?);
    }
    let mut samples = Vec::with_capacity(num_samples);
    for _ in 0..num_samples {
        samples.push(read_sample(&mut r)?);
    }
    let mut samples_data = Vec::with_capacity(num_points);
    let raw = r.bytes(num_points * 2)?;
    if flags & FLAG_DELTA != 0 {
        let mut acc: i16 = 0;
        for pair in raw.chunks_exact(2) {
            acc = acc.wrapping_add(i16::from_le_bytes([pair[0], pair[1]]));
            samples_data.push(acc);
        }
    } else {
        for pair in raw.chunks_exact(2) {
            samples_data.push(i16::from_le_bytes([pair[0], pair[1]]));
        }
    }

    Ok(Module {
        name,
        tracker_name,
        length,
        restart_position,
        num_channels,
        frequency_type,
        default_tempo,
        default_bpm,
        pattern_table,
        patterns,
        pattern_slots,
        instruments,
        samples,
        samples_data,
    })
}

fn write_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_i16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn write_name(out: &mut Vec<u8>, name: &ArrayString<NAME_LENGTH>) {
    let mut field = [0u8; NAME_LENGTH];
    field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&field);
}

fn read_name(r: &mut Reader<'_>) -> Result<ArrayString<NAME_LENGTH>, LoadError> {
    let bytes = r.bytes(NAME_LENGTH)?;
    let mut name = ArrayString::new();
    for &b in bytes {
        if b == 0 {
            break;
        }
        let _ = name.try_push(b as char);
    }
    Ok(name)
}

fn write_envelope(out: &mut Vec<u8>, envelope: &Option<Envelope>) {
    let Some(env) = envelope else {
        out.push(0);
        return;
    };
    out.push(1);
    out.push(env.points.len() as u8);
    match env.sustain_point {
        Some(p) => out.extend_from_slice(&[1, p]),
        None => out.extend_from_slice(&[0, 0]),
    }
    match env.loop_points {
        Some((start, end)) => out.extend_from_slice(&[1, start, end]),
        None => out.extend_from_slice(&[0, 0, 0]),
    }
    for point in &env.points {
        write_u16(out, point.frame);
        out.push(point.value);
    }
}

fn read_envelope(r: &mut Reader<'_>) -> Result<Option<Envelope>, LoadError> {
    if r.u8()? == 0 {
        return Ok(None);
    }
    let num_points = r.u8()? as usize;
    let has_sustain = r.u8()? != 0;
    let sustain = r.u8()?;
    let has_loop = r.u8()? != 0;
    let loop_start = r.u8()?;
    let loop_end = r.u8()?;

    let mut envelope = Envelope::default();
    if num_points > envelope.points.capacity() {
        return Err(LoadError::BadEnvelope);
    }
    for _ in 0..num_points {
        let frame = r.u16()?;
        let value = r.u8()?;
        if let Some(prev) = envelope.points.last() {
            if frame <= prev.frame {
                return Err(LoadError::BadEnvelope);
            }
        }
        envelope.points.push(EnvelopePoint { frame, value });
    }
    if has_sustain {
        envelope.sustain_point = Some(sustain);
    }
    if has_loop {
        if loop_start > loop_end {
            return Err(LoadError::BadEnvelope);
        }
        envelope.loop_points = Some((loop_start, loop_end));
    }
    Ok(Some(envelope))
}

fn write_instrument(out: &mut Vec<u8>, instrument: &Instrument) {
    write_name(out, &instrument.name);
    out.extend_from_slice(&instrument.sample_of_notes);
    write_u16(out, instrument.samples_index);
    out.push(instrument.num_samples);
    write_envelope(out, &instrument.volume_envelope);
    write_envelope(out, &instrument.panning_envelope);
    out.extend_from_slice(&[
        instrument.vibrato.waveform,
        instrument.vibrato.sweep,
        instrument.vibrato.depth,
        instrument.vibrato.rate,
    ]);
    write_u16(out, instrument.volume_fadeout);
}

fn read_instrument(r: &mut Reader<'_>) -> Result<Instrument, LoadError> {
    let name = read_name(r)?;
    let mut sample_of_notes = [0u8; NUM_NOTES];
    sample_of_notes.copy_from_slice(r.bytes(NUM_NOTES)?);
    let samples_index = r.u16()?;
    let num_samples = r.u8()?;
    let volume_envelope = read_envelope(r)?;
    let panning_envelope = read_envelope(r)?;
    let vibrato = AutoVibrato {
        waveform: r.u8()?,
        sweep: r.u8()?,
        depth: r.u8()?,
        rate: r.u8()?,
    };
    let volume_fadeout = r.u16()?;
    Ok(Instrument {
        name,
        sample_of_notes,
        samples_index,
        num_samples,
        volume_envelope,
        panning_envelope,
        volume_fadeout,
        vibrato,
        muted: false,
    })
}

fn write_sample(out: &mut Vec<u8>, sample: &Sample) {
    write_name(out, &sample.name);
    write_u32(out, sample.index);
    write_u32(out, sample.length);
    write_u32(out, sample.loop_length);
    out.extend_from_slice(&[
        sample.ping_pong as u8,
        sample.volume,
        sample.panning,
        sample.finetune as u8,
        sample.relative_note as u8,
    ]);
}

fn read_sample(r: &mut Reader<'_>) -> Result<Sample, LoadError> {
    let name = read_name(r)?;
    let index = r.u32()?;
    let length = r.u32()?;
    let loop_length = r.u32()?;
    let b = r.bytes(5)?;
    Ok(Sample {
        name,
        index,
        length,
        loop_length,
        ping_pong: b[0] != 0,
        volume: b[1],
        panning: b[2],
        finetune: b[3] as i8,
        relative_note: b[4] as i8,
    })
}
