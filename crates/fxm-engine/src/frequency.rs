//! Period and frequency math for sample playback.
//!
//! Converts an effective note + finetune into a period, a period into a
//! playback frequency, and a frequency into a microstep increment for
//! stepping through waveform data. Two period systems exist: linear
//! (64 period units per semitone, used by most XM files) and classic
//! Amiga periods (table-driven, smaller period = higher pitch).

use fxm_ir::{FrequencyType, MICROSTEP_BITS};

/// Engine period limits. Values outside are clamped on every update.
pub const PERIOD_MIN_LINEAR: u16 = 1;
pub const PERIOD_MAX_LINEAR: u16 = 7680;
pub const PERIOD_MIN_AMIGA: u16 = 107;
pub const PERIOD_MAX_AMIGA: u16 = 7040;

/// PAL Amiga clock, the reference for Amiga-period playback rates.
const AMIGA_CLOCK: f32 = 7093789.2;

/// Rate of a C-4 sample at zero finetune.
const C4_RATE: f32 = 8363.0;

/// Amiga periods for one octave (C-2..C-3 in FT2 naming), sixteen
/// finetune steps per semitone interpolated between entries.
const AMIGA_PERIODS: [u16; 13] = [
    1712, 1616, 1525, 1440, 1357, 1281, 1209, 1141, 1077, 1017, 961, 907, 856,
];

/// Period for an effective note (0-based semitones, relative note already
/// folded in) and finetune in 1/16-semitone steps. Returns 0 when the
/// note is too high to represent, which cuts the channel.
pub fn note_period(frequency_type: FrequencyType, note: i16, finetune: i8) -> u16 {
    match frequency_type {
        FrequencyType::Linear => {
            let period = 7680 - 64 * note as i32 - 4 * finetune as i32;
            if period < PERIOD_MIN_LINEAR as i32 || period > PERIOD_MAX_LINEAR as i32 {
                0
            } else {
                period as u16
            }
        }
        FrequencyType::Amiga => {
            let period = amiga_period(16 * note as i32 + finetune as i32);
            if period < PERIOD_MIN_AMIGA as i32 || period > PERIOD_MAX_AMIGA as i32 {
                0
            } else {
                period as u16
            }
        }
    }
}

/// Table lookup with finetune interpolation, in 1/16-semitone steps from
/// C-0.
fn amiga_period(sixteenths: i32) -> i32 {
    let semitone = sixteenths.div_euclid(16);
    let frac = sixteenths.rem_euclid(16);
    let index = semitone.rem_euclid(12) as usize;
    let octave = semitone.div_euclid(12) - 2;
    let mut p1 = AMIGA_PERIODS[index] as i32;
    let mut p2 = AMIGA_PERIODS[index + 1] as i32;
    if octave > 0 {
        p1 >>= octave as u32;
        p2 >>= octave as u32;
    } else if octave < 0 {
        p1 <<= (-octave) as u32;
        p2 <<= (-octave) as u32;
    }
    p1 + (p2 - p1) * frac / 16
}

/// Playback frequency in Hz for a period.
pub fn period_frequency(frequency_type: FrequencyType, period: u16) -> f32 {
    if period == 0 {
        return 0.0;
    }
    match frequency_type {
        // 8363 * 2^((4608 - period) / 768): one octave per 768 units
        FrequencyType::Linear => C4_RATE * libm::exp2f((4608 - period as i32) as f32 / 768.0),
        FrequencyType::Amiga => AMIGA_CLOCK / (2.0 * period as f32),
    }
}

/// Microstep increment per output frame for a period at the given output
/// rate.
pub fn period_step(frequency_type: FrequencyType, period: u16, rate: u32) -> u32 {
    if period == 0 || rate == 0 {
        return 0;
    }
    let frequency = period_frequency(frequency_type, period);
    let step = frequency as f64 / rate as f64 * (1u32 << MICROSTEP_BITS) as f64;
    if step >= u32::MAX as f64 {
        u32::MAX
    } else {
        step as u32
    }
}

/// Clamp an intermediate period into the engine limits.
pub fn clamp_period(frequency_type: FrequencyType, period: i32) -> u16 {
    match frequency_type {
        FrequencyType::Linear => {
            period.clamp(PERIOD_MIN_LINEAR as i32, PERIOD_MAX_LINEAR as i32) as u16
        }
        FrequencyType::Amiga => {
            period.clamp(PERIOD_MIN_AMIGA as i32, PERIOD_MAX_AMIGA as i32) as u16
        }
    }
}

/// Shift a period up by whole semitones (arpeggio). Linear periods move
/// by 64 units per semitone; Amiga periods scale geometrically.
pub fn shift_period(frequency_type: FrequencyType, period: u16, semitones: u8) -> u16 {
    if semitones == 0 {
        return period;
    }
    match frequency_type {
        FrequencyType::Linear => {
            clamp_period(frequency_type, period as i32 - 64 * semitones as i32)
        }
        FrequencyType::Amiga => {
            let scaled = period as f32 * libm::exp2f(-(semitones as f32) / 12.0);
            clamp_period(frequency_type, scaled as i32)
        }
    }
}
