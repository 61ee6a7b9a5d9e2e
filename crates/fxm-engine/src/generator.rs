//! The sample generator: resampling, mixing and output.

use fxm_ir::{Sample, LoopType, MAX_VOLUME, MICROSTEP_BITS, SAMPLE_MICROSTEPS};

use crate::context::Context;
use crate::{AMPLIFICATION, RAMPING_POINTS, TICK_SUBSAMPLES, VOLUME_RAMP};

impl Context {
    /// Fill `output` with interleaved stereo frames
    /// (`output.len() / 2` frames). The only scheduling point of the
    /// engine: ticks fire from inside this loop. Never allocates.
    pub fn generate_samples(&mut self, output: &mut [f32]) {
        debug_assert!(output.len() % 2 == 0, "output buffer must be stereo-interleaved");
        for frame in output.chunks_exact_mut(2) {
            if self.halted() {
                frame[0] = 0.0;
                frame[1] = 0.0;
                continue;
            }
            if self.remaining_samples_in_tick <= 0 {
                self.tick();
            }
            self.remaining_samples_in_tick -= TICK_SUBSAMPLES as i64;
            let (left, right) = self.mix_frame();
            frame[0] = left;
            frame[1] = right;
            self.generated_samples = self.generated_samples.wrapping_add(1);
        }
    }

    /// Mix one stereo frame from all channels.
    fn mix_frame(&mut self) -> (f32, f32) {
        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for index in 0..self.channels.len() {
            let silenced = {
                let ch = &self.channels[index];
                ch.muted
                    || ch
                        .instrument
                        .is_some_and(|i| self.module.instruments[i as usize].muted)
            };
            let value = self.next_of_sample(index);
            let ch = &mut self.channels[index];
            if cfg!(feature = "ramping") {
                slide_towards(&mut ch.actual_volume[0], ch.target_volume[0], VOLUME_RAMP);
                slide_towards(&mut ch.actual_volume[1], ch.target_volume[1], VOLUME_RAMP);
            }
            let frame_count = ch.frame_count;
            ch.frame_count = frame_count.saturating_add(1);
            if silenced {
                continue;
            }
            let mut l = value * ch.actual_volume[0];
            let mut r = value * ch.actual_volume[1];
            if cfg!(feature = "ramping") && (frame_count as usize) < RAMPING_POINTS {
                // Cross-fade out of the waveform that was playing before
                // the trigger
                let t = frame_count as f32 / RAMPING_POINTS as f32;
                let tail = ch.end_of_previous_sample[frame_count as usize];
                l = lerp(tail * ch.actual_volume[0], l, t);
                r = lerp(tail * ch.actual_volume[1], r, t);
            }
            left += l;
            right += r;
        }
        let amplify = AMPLIFICATION * self.global_volume as f32 / MAX_VOLUME as f32;
        (
            (left * amplify).clamp(-1.0, 1.0),
            (right * amplify).clamp(-1.0, 1.0),
        )
    }

    /// Fetch the channel's current waveform value and advance its
    /// cursor, honouring the sample's loop mode.
    pub(crate) fn next_of_sample(&mut self, index: usize) -> f32 {
        let module = &self.module;
        let ch = &mut self.channels[index];
        let Some(sample_index) = ch.sample else { return 0.0 };
        if !ch.active {
            return 0.0;
        }
        let sample = &module.samples[sample_index as usize];
        if sample.length == 0 {
            return 0.0;
        }
        let data = module.waveform(sample);

        let cursor = (ch.sample_position >> MICROSTEP_BITS) as usize;
        let cursor = cursor.min(data.len() - 1);
        let a = data[cursor] as f32 / 32768.0;
        let value = if cfg!(feature = "linear-interpolation") {
            let fraction =
                (ch.sample_position & (SAMPLE_MICROSTEPS - 1)) as f32 / SAMPLE_MICROSTEPS as f32;
            let b = data[neighbour(sample, data.len(), cursor)] as f32 / 32768.0;
            a + (b - a) * fraction
        } else {
            a
        };

        // Advance, folding back into the loop window
        let end = (sample.length as u64) << MICROSTEP_BITS;
        match sample.loop_type() {
            LoopType::None => {
                let next = ch.sample_position as u64 + ch.step as u64;
                if next >= end {
                    ch.active = false;
                } else {
                    ch.sample_position = next as u32;
                }
            }
            LoopType::Forward => {
                let start = (sample.loop_start() as u64) << MICROSTEP_BITS;
                let mut next = ch.sample_position as u64 + ch.step as u64;
                if next >= end {
                    let span = (sample.loop_length as u64) << MICROSTEP_BITS;
                    next = start + (next - start) % span;
                }
                ch.sample_position = next as u32;
            }
            LoopType::PingPong => {
                let start = (sample.loop_start() as u64) << MICROSTEP_BITS;
                let mut next = ch.sample_position as i64
                    + if ch.ping { ch.step as i64 } else { -(ch.step as i64) };
                // Reflect at the window edges; bounded in case the step
                // dwarfs a tiny loop
                for _ in 0..8 {
                    if next >= end as i64 {
                        next = 2 * end as i64 - next - 1;
                        ch.ping = false;
                    } else if next < start as i64 && ch.sample_position as i64 >= start as i64 {
                        next = 2 * start as i64 - next;
                        ch.ping = true;
                    } else {
                        break;
                    }
                }
                ch.sample_position = next.clamp(0, end as i64 - 1) as u32;
            }
        }
        value
    }
}

/// Index of the second interpolation tap for a cursor position.
fn neighbour(sample: &Sample, len: usize, cursor: usize) -> usize {
    if cursor + 1 < len {
        return cursor + 1;
    }
    match sample.loop_type() {
        LoopType::Forward => sample.loop_start() as usize,
        _ => cursor,
    }
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Move `value` toward `target` by at most `rate`.
fn slide_towards(value: &mut f32, target: f32, rate: f32) {
    if *value < target {
        *value = (*value + rate).min(target);
    } else {
        *value = (*value - rate).max(target);
    }
}
