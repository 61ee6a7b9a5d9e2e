//! FastTracker II `.xm` wire-format loader.
//!
//! Parses version 0x0104+ files: little-endian, self-sized headers,
//! presence-bit packed patterns, delta-coded sample data. Enumerated
//! fields are clamped (with a warning) where FT2 tolerates garbage, and
//! rejected where the engine's invariants would break.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use fxm_ir::{
    AutoVibrato, Envelope, EnvelopePoint, FrequencyType, Instrument, Module, Pattern, PatternSlot,
    Sample, KEY_OFF_NOTE, MAX_BPM, MAX_CHANNELS, MAX_ENVELOPE_POINTS, MAX_INSTRUMENTS, MAX_PANNING,
    MAX_PATTERNS, MAX_ROWS_PER_PATTERN, MAX_SAMPLE_LENGTH, MAX_TEMPO, MAX_VOLUME, MIN_BPM,
    NAME_LENGTH, NUM_NOTES, PATTERN_ORDER_TABLE_LENGTH,
};

use crate::delta;
use crate::reader::Reader;
use crate::LoadError;

const XM_MAGIC: &[u8; 17] = b"Extended Module: ";
const MIN_VERSION: u16 = 0x0104;

/// The wire format's key-off note, normalized to [`KEY_OFF_NOTE`] on load.
const WIRE_KEY_OFF: u8 = 97;

/// Parse a `.xm` byte buffer into a [`Module`].
pub fn load_xm(data: &[u8]) -> Result<Module, LoadError> {
    let mut r = Reader::new(data);

    if r.bytes(17)? != XM_MAGIC {
        return Err(LoadError::BadMagic);
    }
    let name = read_name(r.bytes(20)?);
    r.skip(1)?; // 0x1A marker; some trackers write garbage here
    let tracker_name = read_name(r.bytes(20)?);
    let version = r.u16()?;
    if version < MIN_VERSION {
        return Err(LoadError::UnsupportedVersion(version));
    }

    let header_start = r.position();
    let header_size = r.u32()? as usize;
    let mut length = r.u16()?;
    let restart_position = r.u16()?;
    let num_channels = r.u16()?;
    if num_channels == 0 || num_channels > MAX_CHANNELS as u16 {
        return Err(LoadError::TooManyChannels(num_channels));
    }
    let num_channels = num_channels as u8;
    let num_patterns = r.u16()?;
    if num_patterns > MAX_PATTERNS {
        return Err(LoadError::TooManyPatterns(num_patterns));
    }
    let num_instruments = r.u16()?;
    if num_instruments > MAX_INSTRUMENTS {
        return Err(LoadError::TooManyInstruments(num_instruments));
    }
    let flags = r.u16()?;
    let frequency_type = if flags & 1 != 0 {
        FrequencyType::Linear
    } else {
        FrequencyType::Amiga
    };
    let default_tempo = clamp_tempo(r.u16()?);
    let default_bpm = clamp_bpm(r.u16()?);

    let mut pattern_table = [0u8; PATTERN_ORDER_TABLE_LENGTH];
    pattern_table.copy_from_slice(r.bytes(PATTERN_ORDER_TABLE_LENGTH)?);

    if length as usize > PATTERN_ORDER_TABLE_LENGTH {
        log::warn!("song length {length} clamped to {PATTERN_ORDER_TABLE_LENGTH}");
        length = PATTERN_ORDER_TABLE_LENGTH as u16;
    }
    if length == 0 {
        length = 1;
    }
    let restart_position = if restart_position < length {
        restart_position as u8
    } else {
        log::warn!("restart position {restart_position} out of range, using 0");
        0
    };

    r.seek(header_start + header_size)?;

    let mut patterns = Vec::with_capacity(num_patterns.max(1) as usize);
    let mut pattern_slots = Vec::new();
    for _ in 0..num_patterns {
        let pattern = read_pattern(&mut r, num_channels, &mut pattern_slots)?;
        patterns.push(pattern);
    }
    if patterns.is_empty() {
        // A module with no stored patterns plays one empty 64-row pattern
        patterns.push(empty_pattern(num_channels, &mut pattern_slots));
    }

    // Order-table entries must reference stored patterns
    let num_patterns = patterns.len() as u16;
    for entry in pattern_table.iter_mut().take(length as usize) {
        if *entry as u16 >= num_patterns {
            log::warn!("order-table entry {entry} out of range, using pattern 0");
            *entry = 0;
        }
    }

    let mut instruments = Vec::with_capacity(num_instruments as usize);
    let mut samples = Vec::new();
    let mut samples_data = Vec::new();
    for _ in 0..num_instruments {
        let instrument = read_instrument(&mut r, &mut samples, &mut samples_data)?;
        instruments.push(instrument);
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

fn clamp_tempo(raw: u16) -> u8 {
    match raw {
        0 => 1,
        t if t > MAX_TEMPO as u16 => {
            log::warn!("tempo {raw} clamped to {MAX_TEMPO}");
            MAX_TEMPO
        }
        t => t as u8,
    }
}

fn clamp_bpm(raw: u16) -> u8 {
    if raw < MIN_BPM as u16 {
        log::warn!("bpm {raw} clamped to {MIN_BPM}");
        MIN_BPM
    } else if raw > MAX_BPM as u16 {
        log::warn!("bpm {raw} clamped to {MAX_BPM}");
        MAX_BPM
    } else {
        raw as u8
    }
}

/// Build a printable name from a fixed-size, possibly NUL-padded field.
fn read_name(bytes: &[u8]) -> ArrayString<NAME_LENGTH> {
    let mut name = ArrayString::new();
    for &b in bytes {
        if b == 0 {
            break;
        }
        let c = if (0x20..0x7F).contains(&b) { b as char } else { ' ' };
        let _ = name.try_push(c);
    }
    while name.ends_with(' ') {
        name.pop();
    }
    name
}

fn empty_pattern(num_channels: u8, slots: &mut Vec<PatternSlot>) -> Pattern {
    let rows_index = (slots.len() / num_channels as usize) as u16;
    slots.resize(slots.len() + 64 * num_channels as usize, PatternSlot::default());
    Pattern { rows_index, num_rows: 64 }
}

fn read_pattern(
    r: &mut Reader<'_>,
    num_channels: u8,
    slots: &mut Vec<PatternSlot>,
) -> Result<Pattern, LoadError> {
    let header_start = r.position();
    let header_length = r.u32()? as usize;
    let _packing_type = r.u8()?;
    let num_rows = r.u16()?.clamp(1, MAX_ROWS_PER_PATTERN);
    let packed_size = r.u16()? as usize;
    r.seek(header_start + header_length)?;

    let rows_index = (slots.len() / num_channels as usize) as u16;
    let slot_count = num_rows as usize * num_channels as usize;
    if packed_size == 0 {
        slots.resize(slots.len() + slot_count, PatternSlot::default());
    } else {
        let data_end = r.position() + packed_size;
        slots.reserve(slot_count);
        for _ in 0..slot_count {
            slots.push(read_slot(r)?);
        }
        r.seek(data_end)?;
    }
    Ok(Pattern { rows_index, num_rows })
}

fn read_slot(r: &mut Reader<'_>) -> Result<PatternSlot, LoadError> {
    let mut slot = PatternSlot::default();
    let first = r.u8()?;
    if first & 0x80 != 0 {
        // Presence bits select which of the five fields follow
        if first & 0x01 != 0 {
            slot.note = r.u8()?;
        }
        if first & 0x02 != 0 {
            slot.instrument = r.u8()?;
        }
        if first & 0x04 != 0 {
            slot.volume_column = r.u8()?;
        }
        if first & 0x08 != 0 {
            slot.effect_type = r.u8()?;
        }
        if first & 0x10 != 0 {
            slot.effect_param = r.u8()?;
        }
    } else {
        slot.note = first;
        slot.instrument = r.u8()?;
        slot.volume_column = r.u8()?;
        slot.effect_type = r.u8()?;
        slot.effect_param = r.u8()?;
    }
    slot.note = match slot.note {
        WIRE_KEY_OFF => KEY_OFF_NOTE,
        n if n > WIRE_KEY_OFF => 0,
        n => n,
    };
    Ok(slot)
}

fn read_instrument(
    r: &mut Reader<'_>,
    samples: &mut Vec<Sample>,
    samples_data: &mut Vec<i16>,
) -> Result<Instrument, LoadError> {
    let header_start = r.position();
    let header_size = r.u32()? as usize;
    if header_size < 29 {
        // Degenerate header; FT2 writes these for deleted instruments
        r.seek(header_start + header_size.max(4))?;
        return Ok(Instrument::default());
    }

    let name = read_name(r.bytes(22)?);
    let _instrument_type = r.u8()?;
    let num_samples = r.u16()?;

    let mut instrument = Instrument {
        name,
        samples_index: samples.len() as u16,
        num_samples: num_samples.min(u8::MAX as u16) as u8,
        ..Default::default()
    };

    if num_samples == 0 {
        r.seek(header_start + header_size)?;
        return Ok(instrument);
    }

    let _sample_header_size = r.u32()?;
    let note_map = r.bytes(NUM_NOTES)?;
    instrument.sample_of_notes.copy_from_slice(note_map);

    let mut volume_points = [(0u16, 0u16); MAX_ENVELOPE_POINTS];
    for p in &mut volume_points {
        *p = (r.u16()?, r.u16()?);
    }
    let mut panning_points = [(0u16, 0u16); MAX_ENVELOPE_POINTS];
    for p in &mut panning_points {
        *p = (r.u16()?, r.u16()?);
    }
    let num_volume_points = r.u8()?;
    let num_panning_points = r.u8()?;
    let volume_sustain = r.u8()?;
    let volume_loop_start = r.u8()?;
    let volume_loop_end = r.u8()?;
    let panning_sustain = r.u8()?;
    let panning_loop_start = r.u8()?;
    let panning_loop_end = r.u8()?;
    let volume_type = r.u8()?;
    let panning_type = r.u8()?;
    instrument.vibrato = AutoVibrato {
        waveform: r.u8()? & 0x03,
        sweep: r.u8()?,
        depth: r.u8()?,
        rate: r.u8()?,
    };
    instrument.volume_fadeout = r.u16()?;

    instrument.volume_envelope = build_envelope(
        &volume_points,
        num_volume_points,
        volume_type,
        volume_sustain,
        volume_loop_start,
        volume_loop_end,
    )?;
    instrument.panning_envelope = build_envelope(
        &panning_points,
        num_panning_points,
        panning_type,
        panning_sustain,
        panning_loop_start,
        panning_loop_end,
    )?;

    r.seek(header_start + header_size)?;

    // Sample headers first, then all sample data in the same order
    let mut data_lengths = Vec::with_capacity(num_samples as usize);
    for _ in 0..num_samples {
        let (sample, stored_bytes, sixteen_bit) = read_sample_header(r)?;
        samples.push(sample);
        data_lengths.push((stored_bytes, sixteen_bit));
    }
    let first_sample = instrument.samples_index as usize;
    for (i, &(stored_bytes, sixteen_bit)) in data_lengths.iter().enumerate() {
        let raw = r.bytes(stored_bytes)?;
        let sample = &mut samples[first_sample + i];
        sample.index = samples_data.len() as u32;
        let start = samples_data.len();
        if sixteen_bit {
            delta::decode16_to_points(raw, samples_data);
        } else {
            delta::decode8_to_points(raw, samples_data);
        }
        // Keep only the frames the metadata declared (looped samples are
        // truncated at the loop end)
        samples_data.truncate(start + sample.length as usize);
        let decoded = samples_data.len() - start;
        if (decoded as u32) < sample.length {
            log::warn!("sample data short ({decoded} of {} frames)", sample.length);
            sample.length = decoded as u32;
            sample.loop_length = sample.loop_length.min(sample.length);
        }
    }

    Ok(instrument)
}

fn build_envelope(
    points: &[(u16, u16); MAX_ENVELOPE_POINTS],
    num_points: u8,
    env_type: u8,
    sustain: u8,
    loop_start: u8,
    loop_end: u8,
) -> Result<Option<Envelope>, LoadError> {
    // Bit 0: envelope on. Fewer than 2 or more than 12 points disables.
    if env_type & 1 == 0 || num_points < 2 || num_points as usize > MAX_ENVELOPE_POINTS {
        return Ok(None);
    }
    let mut envelope = Envelope::default();
    for &(frame, value) in points.iter().take(num_points as usize) {
        if let Some(prev) = envelope.points.last() {
            if frame <= prev.frame {
                return Err(LoadError::BadEnvelope);
            }
        }
        envelope.points.push(EnvelopePoint {
            frame,
            value: value.min(fxm_ir::MAX_ENVELOPE_VALUE as u16) as u8,
        });
    }
    if env_type & 2 != 0 && sustain < num_points {
        envelope.sustain_point = Some(sustain);
    }
    if env_type & 4 != 0 && loop_end < num_points {
        if loop_start > loop_end {
            return Err(LoadError::BadEnvelope);
        }
        envelope.loop_points = Some((loop_start, loop_end));
    }
    Ok(Some(envelope))
}

/// Returns the parsed metadata plus (stored data bytes, is 16-bit).
fn read_sample_header(r: &mut Reader<'_>) -> Result<(Sample, usize, bool), LoadError> {
    let byte_length = r.u32()?;
    let mut loop_start = r.u32()?;
    let mut loop_length = r.u32()?;
    let volume = r.u8()?.min(MAX_VOLUME);
    let finetune = r.i8()?.clamp(-16, 15);
    let flags = r.u8()?;
    let panning = r.u8()?;
    let relative_note = r.i8()?;
    let _reserved = r.u8()?;
    let name = read_name(r.bytes(22)?);

    let sixteen_bit = flags & 0x10 != 0;
    let mut length = byte_length;
    if sixteen_bit {
        length /= 2;
        loop_start /= 2;
        loop_length /= 2;
    }
    if length > MAX_SAMPLE_LENGTH {
        return Err(LoadError::BadSample);
    }

    let loop_kind = flags & 0x03;
    if loop_kind == 0 {
        loop_length = 0;
    }
    if loop_start > length {
        log::warn!("loop start {loop_start} past sample end {length}, loop dropped");
        loop_length = 0;
        loop_start = 0;
    }
    if loop_start + loop_length > length {
        loop_length = length - loop_start;
    }

    let mut sample = Sample {
        name,
        index: 0,
        length,
        loop_length,
        ping_pong: loop_kind == 2 && loop_length > 0,
        volume,
        panning,
        finetune,
        relative_note,
    };
    if sample.loop_length > 0 {
        // Anything past the loop is unreachable; store length = loop end
        sample.length = loop_start + loop_length;
    }
    debug_assert!(sample.panning as u16 <= MAX_PANNING);
    Ok((sample, byte_length as usize, sixteen_bit))
}
