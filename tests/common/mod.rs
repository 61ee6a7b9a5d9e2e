//! Builds real `.xm` byte images for the integration tests.
//!
//! The scenario tests need precise control over patterns, instruments
//! and samples, so instead of binary fixtures they assemble wire-format
//! modules with this builder and feed them through the public loader.

#![allow(dead_code)]

/// One pattern cell, in wire-format values (note 1..=96, 97 = key off).
#[derive(Clone, Copy, Default)]
pub struct Cell {
    pub note: u8,
    pub instrument: u8,
    pub volume: u8,
    pub effect: u8,
    pub param: u8,
}

impl Cell {
    pub fn note(note: u8, instrument: u8) -> Self {
        Self { note, instrument, ..Default::default() }
    }

    pub fn effect(effect: u8, param: u8) -> Self {
        Self { effect, param, ..Default::default() }
    }

    pub fn with_effect(mut self, effect: u8, param: u8) -> Self {
        self.effect = effect;
        self.param = param;
        self
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = volume;
        self
    }

    pub fn key_off() -> Self {
        Self { note: 97, ..Default::default() }
    }
}

/// A pattern: `rows × channels` cells, row-major.
#[derive(Clone)]
pub struct PatternSpec {
    pub channels: u8,
    pub rows: Vec<Vec<Cell>>,
}

impl PatternSpec {
    pub fn new(channels: u8) -> Self {
        Self { channels, rows: Vec::new() }
    }

    /// Append a row given one cell per channel.
    pub fn row(mut self, cells: &[Cell]) -> Self {
        assert_eq!(cells.len(), self.channels as usize);
        self.rows.push(cells.to_vec());
        self
    }

    /// Append `count` empty rows.
    pub fn empty_rows(mut self, count: usize) -> Self {
        for _ in 0..count {
            self.rows.push(vec![Cell::default(); self.channels as usize]);
        }
        self
    }
}

#[derive(Clone)]
pub struct SampleSpec {
    pub data: Vec<i8>,
    /// 16-bit data; takes precedence over `data` when non-empty
    pub data16: Vec<i16>,
    pub loop_start: u32,
    pub loop_length: u32,
    /// 0 = none, 1 = forward, 2 = ping-pong
    pub loop_kind: u8,
    pub volume: u8,
    pub finetune: i8,
    pub panning: u8,
    pub relative_note: i8,
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            data16: Vec::new(),
            loop_start: 0,
            loop_length: 0,
            loop_kind: 0,
            volume: 64,
            finetune: 0,
            panning: 128,
            relative_note: 0,
        }
    }
}

impl SampleSpec {
    pub fn new(data: Vec<i8>) -> Self {
        Self { data, ..Default::default() }
    }

    pub fn new16(data16: Vec<i16>) -> Self {
        Self { data16, ..Default::default() }
    }

    pub fn forward_loop(mut self, start: u32, length: u32) -> Self {
        self.loop_start = start;
        self.loop_length = length;
        self.loop_kind = 1;
        self
    }

    pub fn ping_pong_loop(mut self, start: u32, length: u32) -> Self {
        self.loop_start = start;
        self.loop_length = length;
        self.loop_kind = 2;
        self
    }
}

#[derive(Clone, Default)]
pub struct InstrumentSpec {
    pub samples: Vec<SampleSpec>,
    /// (frame, value) points; enables the volume envelope when non-empty
    pub volume_envelope: Vec<(u16, u16)>,
    pub envelope_sustain: Option<u8>,
    pub envelope_loop: Option<(u8, u8)>,
    pub fadeout: u16,
    /// (waveform, sweep, depth, rate)
    pub vibrato: (u8, u8, u8, u8),
}

impl InstrumentSpec {
    pub fn with_sample(sample: SampleSpec) -> Self {
        Self { samples: vec![sample], ..Default::default() }
    }
}

pub struct XmBuilder {
    pub channels: u8,
    pub linear: bool,
    pub tempo: u16,
    pub bpm: u16,
    pub restart: u16,
    pub order: Vec<u8>,
    pub patterns: Vec<PatternSpec>,
    pub instruments: Vec<InstrumentSpec>,
}

impl XmBuilder {
    pub fn new(channels: u8) -> Self {
        Self {
            channels,
            linear: true,
            tempo: 6,
            bpm: 125,
            restart: 0,
            order: Vec::new(),
            patterns: Vec::new(),
            instruments: Vec::new(),
        }
    }

    pub fn amiga(mut self) -> Self {
        self.linear = false;
        self
    }

    pub fn tempo(mut self, tempo: u16) -> Self {
        self.tempo = tempo;
        self
    }

    pub fn order(mut self, order: &[u8]) -> Self {
        self.order = order.to_vec();
        self
    }

    pub fn pattern(mut self, pattern: PatternSpec) -> Self {
        assert_eq!(pattern.channels, self.channels);
        self.patterns.push(pattern);
        self
    }

    pub fn instrument(mut self, instrument: InstrumentSpec) -> Self {
        self.instruments.push(instrument);
        self
    }

    /// Serialize to XM wire format (version 0x0104, unpacked cells).
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"Extended Module: ");
        out.extend_from_slice(&pad(b"integration test", 20));
        out.push(0x1A);
        out.extend_from_slice(&pad(b"femtoxm builder", 20));
        out.extend_from_slice(&0x0104u16.to_le_bytes());

        // Song header: size field covers itself + 16 bytes + order table
        out.extend_from_slice(&276u32.to_le_bytes());
        out.extend_from_slice(&(self.order.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.restart.to_le_bytes());
        out.extend_from_slice(&(self.channels as u16).to_le_bytes());
        out.extend_from_slice(&(self.patterns.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.instruments.len() as u16).to_le_bytes());
        out.extend_from_slice(&(self.linear as u16).to_le_bytes());
        out.extend_from_slice(&self.tempo.to_le_bytes());
        out.extend_from_slice(&self.bpm.to_le_bytes());
        let mut order = [0u8; 256];
        order[..self.order.len()].copy_from_slice(&self.order);
        out.extend_from_slice(&order);

        for pattern in &self.patterns {
            self.write_pattern(&mut out, pattern);
        }
        for instrument in &self.instruments {
            self.write_instrument(&mut out, instrument);
        }
        out
    }

    fn write_pattern(&self, out: &mut Vec<u8>, pattern: &PatternSpec) {
        out.extend_from_slice(&9u32.to_le_bytes()); // header length
        out.push(0); // packing type
        out.extend_from_slice(&(pattern.rows.len() as u16).to_le_bytes());
        let packed_size = pattern.rows.len() * pattern.channels as usize * 5;
        out.extend_from_slice(&(packed_size as u16).to_le_bytes());
        for row in &pattern.rows {
            for cell in row {
                out.extend_from_slice(&[
                    cell.note,
                    cell.instrument,
                    cell.volume,
                    cell.effect,
                    cell.param,
                ]);
            }
        }
    }

    fn write_instrument(&self, out: &mut Vec<u8>, instrument: &InstrumentSpec) {
        if instrument.samples.is_empty() {
            out.extend_from_slice(&29u32.to_le_bytes());
            out.extend_from_slice(&pad(b"empty", 22));
            out.push(0);
            out.extend_from_slice(&0u16.to_le_bytes());
            return;
        }

        out.extend_from_slice(&263u32.to_le_bytes());
        out.extend_from_slice(&pad(b"instrument", 22));
        out.push(0);
        out.extend_from_slice(&(instrument.samples.len() as u16).to_le_bytes());
        out.extend_from_slice(&40u32.to_le_bytes()); // sample header size
        out.extend_from_slice(&[0u8; 96]); // note→sample map: sample 0

        let mut volume_points = [(0u16, 0u16); 12];
        for (i, &p) in instrument.volume_envelope.iter().enumerate() {
            volume_points[i] = p;
        }
        for (frame, value) in volume_points {
            out.extend_from_slice(&frame.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&[0u8; 48]); // panning envelope points

        out.push(instrument.volume_envelope.len() as u8);
        out.push(0); // panning points
        out.push(instrument.envelope_sustain.unwrap_or(0xFF));
        let (loop_start, loop_end) = instrument.envelope_loop.unwrap_or((0xFF, 0xFF));
        out.push(loop_start);
        out.push(loop_end);
        out.extend_from_slice(&[0xFF, 0xFF, 0xFF]); // panning sustain/loop
        let mut volume_type = 0u8;
        if !instrument.volume_envelope.is_empty() {
            volume_type |= 1;
        }
        if instrument.envelope_sustain.is_some() {
            volume_type |= 2;
        }
        if instrument.envelope_loop.is_some() {
            volume_type |= 4;
        }
        out.push(volume_type);
        out.push(0); // panning type
        let (waveform, sweep, depth, rate) = instrument.vibrato;
        out.extend_from_slice(&[waveform, sweep, depth, rate]);
        out.extend_from_slice(&instrument.fadeout.to_le_bytes());
        out.extend_from_slice(&[0u8; 22]); // reserved tail of the header

        for sample in &instrument.samples {
            let sixteen_bit = !sample.data16.is_empty();
            let (byte_length, loop_scale) = if sixteen_bit {
                (sample.data16.len() as u32 * 2, 2)
            } else {
                (sample.data.len() as u32, 1)
            };
            out.extend_from_slice(&byte_length.to_le_bytes());
            out.extend_from_slice(&(sample.loop_start * loop_scale).to_le_bytes());
            out.extend_from_slice(&(sample.loop_length * loop_scale).to_le_bytes());
            out.push(sample.volume);
            out.push(sample.finetune as u8);
            out.push((sample.loop_kind & 0x03) | if sixteen_bit { 0x10 } else { 0 });
            out.push(sample.panning);
            out.push(sample.relative_note as u8);
            out.push(0);
            out.extend_from_slice(&pad(b"sample", 22));
        }
        for sample in &instrument.samples {
            // Delta coding, as FT2 writes it
            if !sample.data16.is_empty() {
                let mut previous = 0i16;
                for &point in &sample.data16 {
                    out.extend_from_slice(&point.wrapping_sub(previous).to_le_bytes());
                    previous = point;
                }
            } else {
                let mut previous = 0i8;
                for &point in &sample.data {
                    out.push(point.wrapping_sub(previous) as u8);
                    previous = point;
                }
            }
        }
    }
}

fn pad(text: &[u8], len: usize) -> Vec<u8> {
    let mut field = vec![0u8; len];
    field[..text.len()].copy_from_slice(text);
    field
}

/// A deterministic, non-periodic 8-bit waveform for tests that need to
/// distinguish sample positions.
pub fn noise_wave(len: usize) -> Vec<i8> {
    let mut state = 0x2F6E2B1u32;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            (state >> 24) as i8
        })
        .collect()
}

/// A short 8-bit square wave.
pub fn square_wave(len: usize, period: usize) -> Vec<i8> {
    (0..len)
        .map(|i| if (i / period) % 2 == 0 { 100 } else { -100 })
        .collect()
}

/// Frames per tick at the default 125 BPM and 44100 Hz (exactly 882).
pub const FRAMES_PER_TICK: usize = 882;

/// Standard test rate.
pub const RATE: u32 = 44100;

/// Render `frames` stereo frames and return the interleaved buffer.
pub fn render(ctx: &mut femtoxm::Context, frames: usize) -> Vec<f32> {
    let mut buffer = vec![0.0f32; frames * 2];
    ctx.generate_samples(&mut buffer);
    buffer
}
