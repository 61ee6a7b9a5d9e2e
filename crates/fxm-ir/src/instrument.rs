//! Instrument, envelope and autovibrato types.

use arrayvec::{ArrayString, ArrayVec};

use crate::{MAX_ENVELOPE_POINTS, NAME_LENGTH, NUM_NOTES};

/// An instrument: a note→sample map, two envelopes and autovibrato.
#[derive(Clone, Debug)]
pub struct Instrument {
    /// Instrument name
    pub name: ArrayString<NAME_LENGTH>,
    /// Sample index (relative to `samples_index`) for each playable note
    pub sample_of_notes: [u8; NUM_NOTES],
    /// First sample of this instrument in the module's flat sample array
    pub samples_index: u16,
    /// Number of samples owned by this instrument
    pub num_samples: u8,
    /// Volume envelope (None = disabled)
    pub volume_envelope: Option<Envelope>,
    /// Panning envelope (None = disabled)
    pub panning_envelope: Option<Envelope>,
    /// Volume subtracted from the fadeout each tick after key-off
    pub volume_fadeout: u16,
    /// Instrument-level vibrato, applied to every note
    pub vibrato: AutoVibrato,
    /// Muted through the engine API; produces silence but state advances
    pub muted: bool,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: ArrayString::new(),
            sample_of_notes: [0; NUM_NOTES],
            samples_index: 0,
            num_samples: 0,
            volume_envelope: None,
            panning_envelope: None,
            volume_fadeout: 0,
            vibrato: AutoVibrato::default(),
            muted: false,
        }
    }
}

impl Instrument {
    /// Sample index within the module's flat array for a note (1..=96),
    /// or None when the instrument has no samples or the map points past
    /// its sample count.
    pub fn sample_for_note(&self, note: u8) -> Option<u16> {
        if note == 0 || note as usize > NUM_NOTES {
            return None;
        }
        let rel = self.sample_of_notes[note as usize - 1];
        if rel >= self.num_samples {
            return None;
        }
        Some(self.samples_index + rel as u16)
    }
}

/// Instrument-level vibrato settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AutoVibrato {
    /// Waveform (0=sine, 1=ramp down, 2=square, 3=random)
    pub waveform: u8,
    /// Ticks over which the depth ramps in after a trigger
    pub sweep: u8,
    /// Vibrato depth
    pub depth: u8,
    /// Phase advance per tick
    pub rate: u8,
}

/// A point in an envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Frame position (ticks since trigger)
    pub frame: u16,
    /// Value, 0..=64
    pub value: u8,
}

/// A volume or panning envelope. Points are strictly ordered by frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Envelope {
    /// 2..=12 points
    pub points: ArrayVec<EnvelopePoint, MAX_ENVELOPE_POINTS>,
    /// Point index the frame counter holds at while the note is sustained
    pub sustain_point: Option<u8>,
    /// Loop range as (start, end) point indices, start ≤ end
    pub loop_points: Option<(u8, u8)>,
}

impl Envelope {
    /// Linearly interpolated value at a frame. Before the first point the
    /// first value holds; past the last point the last value holds.
    pub fn value_at(&self, frame: u16) -> u8 {
        let mut prev = match self.points.first() {
            Some(p) => p,
            None => return 0,
        };
        if frame <= prev.frame {
            return prev.value;
        }
        for point in &self.points[1..] {
            if frame < point.frame {
                let t = (frame - prev.frame) as u32;
                let d = (point.frame - prev.frame) as u32;
                let a = prev.value as i32;
                let b = point.value as i32;
                return (a + (b - a) * t as i32 / d as i32) as u8;
            }
            prev = point;
        }
        prev.value
    }

    /// Frame of the given point index.
    pub fn point_frame(&self, index: u8) -> u16 {
        self.points.get(index as usize).map_or(0, |p| p.frame)
    }
}
