//! Playback context: scheduler state machine and the public API.

use alloc::vec;
use alloc::vec::Vec;

use fxm_ir::{
    Envelope, Module, MAX_ENVELOPE_VALUE, MAX_FADEOUT_VOLUME, MAX_PANNING, MAX_ROWS_PER_PATTERN,
    MAX_VOLUME,
};

use crate::channel::{waveform_value, ChannelState};
use crate::{frequency, TICK_SUBSAMPLES};

/// All playback state for one module.
///
/// Created once from a loaded module; everything the engine needs later
/// is allocated here, so the generate path stays allocation-free.
pub struct Context {
    pub(crate) module: Module,
    pub(crate) rate: u32,
    pub(crate) channels: Vec<ChannelState>,
    /// Visit counters per (order, row), drives loop detection
    row_loop_count: Vec<u8>,
    pub(crate) instrument_latest_trigger: Vec<u32>,
    pub(crate) sample_latest_trigger: Vec<u32>,
    pub(crate) generated_samples: u32,

    /// Time left in the current tick, in 1/`TICK_SUBSAMPLES` frames
    pub(crate) remaining_samples_in_tick: i64,
    pub(crate) current_table_index: u8,
    pub(crate) current_row: u16,
    pub(crate) current_tick: u8,
    /// Position of the row whose slots are being played. `current_row`
    /// already points past it; pattern delay and E6y need the real one.
    pub(crate) playing_table_index: u8,
    pub(crate) playing_row: u16,
    /// Pattern delay: how many extra times the current row plays
    pub(crate) extra_rows: u8,
    pub(crate) extra_rows_done: u8,
    pub(crate) position_jump: bool,
    pub(crate) pattern_break: bool,
    pub(crate) jump_dest: u8,
    pub(crate) jump_row: u8,

    /// Ticks per row, 1..=31
    pub(crate) tempo: u8,
    /// Beats per minute, 32..=255; a tick lasts 2.5/bpm seconds
    pub(crate) bpm: u8,
    pub(crate) global_volume: u8,

    loop_count: u8,
    max_loop_count: u8,
}

impl Context {
    /// Build a playback context for `module`, producing audio at `rate`
    /// Hz.
    pub fn new(module: Module, rate: u32) -> Self {
        let channels = vec![ChannelState::new(); module.num_channels as usize];
        let row_loop_count =
            vec![0; module.length as usize * MAX_ROWS_PER_PATTERN as usize];
        let instrument_latest_trigger = vec![0; module.instruments.len()];
        let sample_latest_trigger = vec![0; module.samples.len()];
        let tempo = module.default_tempo;
        let bpm = module.default_bpm;
        Self {
            module,
            rate,
            channels,
            row_loop_count,
            instrument_latest_trigger,
            sample_latest_trigger,
            generated_samples: 0,
            remaining_samples_in_tick: 0,
            current_table_index: 0,
            current_row: 0,
            current_tick: 0,
            playing_table_index: 0,
            playing_row: 0,
            extra_rows: 0,
            extra_rows_done: 0,
            position_jump: false,
            pattern_break: false,
            jump_dest: 0,
            jump_row: 0,
            tempo,
            bpm,
            global_volume: MAX_VOLUME,
            loop_count: 0,
            max_loop_count: 0,
        }
    }

    /// The module being played.
    pub fn module(&self) -> &Module {
        &self.module
    }

    /// Output sample rate in Hz.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    /// Rewind to the start of the module, as if freshly created. Mute
    /// flags survive.
    pub fn reset(&mut self) {
        for ch in &mut self.channels {
            let muted = ch.muted;
            *ch = ChannelState::new();
            ch.muted = muted;
        }
        self.row_loop_count.fill(0);
        self.instrument_latest_trigger.fill(0);
        self.sample_latest_trigger.fill(0);
        self.generated_samples = 0;
        self.remaining_samples_in_tick = 0;
        self.current_table_index = 0;
        self.current_row = 0;
        self.current_tick = 0;
        self.playing_table_index = 0;
        self.playing_row = 0;
        self.extra_rows = 0;
        self.extra_rows_done = 0;
        self.position_jump = false;
        self.pattern_break = false;
        self.jump_dest = 0;
        self.jump_row = 0;
        self.tempo = self.module.default_tempo;
        self.bpm = self.module.default_bpm;
        self.global_volume = MAX_VOLUME;
        self.loop_count = 0;
    }

    /// Jump to an arbitrary (order, row, tick) position. Channel state is
    /// left as-is; notes already playing keep ringing.
    pub fn seek(&mut self, table_index: u8, row: u16, tick: u8) {
        self.current_table_index =
            table_index.min(self.module.length.saturating_sub(1) as u8);
        self.current_row = row;
        self.current_tick = tick % self.tempo.max(1);
        self.playing_table_index = self.current_table_index;
        self.playing_row = 0;
        self.extra_rows = 0;
        self.extra_rows_done = 0;
        self.position_jump = false;
        self.pattern_break = false;
        self.jump_row = 0;
        self.remaining_samples_in_tick = 0;
    }

    /// Stop producing audio after the module has looped `n` times; 0
    /// plays forever.
    pub fn set_max_loop_count(&mut self, n: u8) {
        self.max_loop_count = n;
    }

    /// How many times playback has wrapped back to an already-played
    /// position.
    pub fn loop_count(&self) -> u8 {
        self.loop_count
    }

    /// Mute or unmute a channel. Returns the previous state.
    pub fn mute_channel(&mut self, index: usize, mute: bool) -> bool {
        let ch = &mut self.channels[index];
        core::mem::replace(&mut ch.muted, mute)
    }

    /// Mute or unmute every note played by an instrument (0-based index).
    /// Returns the previous state.
    pub fn mute_instrument(&mut self, index: usize, mute: bool) -> bool {
        core::mem::replace(&mut self.module.instruments[index].muted, mute)
    }

    /// Current playback position as (order, row, tick).
    pub fn position(&self) -> (u8, u16, u8) {
        (self.current_table_index, self.current_row, self.current_tick)
    }

    /// Total frames generated since creation or reset.
    pub fn generated_samples(&self) -> u32 {
        self.generated_samples
    }

    /// Frames elapsed since the channel last triggered a note.
    pub fn samples_since_channel_trigger(&self, index: usize) -> u32 {
        self.generated_samples
            .wrapping_sub(self.channels[index].latest_trigger)
    }

    /// Frames elapsed since the instrument last triggered.
    pub fn samples_since_instrument_trigger(&self, index: usize) -> u32 {
        self.generated_samples
            .wrapping_sub(self.instrument_latest_trigger[index])
    }

    /// Frames elapsed since the sample last triggered.
    pub fn samples_since_sample_trigger(&self, index: usize) -> u32 {
        self.generated_samples
            .wrapping_sub(self.sample_latest_trigger[index])
    }

    /// Inspect a channel (diagnostics, tests).
    pub fn channel(&self, index: usize) -> &ChannelState {
        &self.channels[index]
    }

    pub(crate) fn halted(&self) -> bool {
        self.max_loop_count > 0 && self.loop_count >= self.max_loop_count
    }

    /// Duration of a tick in 1/`TICK_SUBSAMPLES` frame units.
    pub(crate) fn samples_per_tick(&self) -> i64 {
        // rate * 2.5 / bpm frames per tick
        self.rate as i64 * 5 * TICK_SUBSAMPLES as i64 / (2 * self.bpm as i64)
    }

    /// Advance musical time by one tick. Called from the generate loop
    /// whenever `remaining_samples_in_tick` runs out.
    pub(crate) fn tick(&mut self) {
        if self.current_tick == 0 {
            if self.extra_rows_done < self.extra_rows {
                // Pattern delay: replay the row without advancing
                self.extra_rows_done += 1;
                self.process_row_slots();
            } else {
                self.extra_rows = 0;
                self.extra_rows_done = 0;
                self.row();
            }
        } else {
            for index in 0..self.channels.len() {
                self.tick_effects(index);
            }
        }
        for index in 0..self.channels.len() {
            self.channel_housekeeping(index);
        }
        self.current_tick += 1;
        if self.current_tick >= self.tempo {
            self.current_tick = 0;
        }
        self.remaining_samples_in_tick += self.samples_per_tick();
    }

    /// Process one row: apply pending jumps, count loops, run every
    /// channel's slot, then advance.
    fn row(&mut self) {
        if self.position_jump {
            self.current_table_index = self.jump_dest;
            self.current_row = self.jump_row as u16;
            self.position_jump = false;
            self.pattern_break = false;
            self.jump_row = 0;
            self.post_pattern_change();
        } else if self.pattern_break {
            self.current_table_index = self.current_table_index.wrapping_add(1);
            self.current_row = self.jump_row as u16;
            self.pattern_break = false;
            self.jump_row = 0;
            self.post_pattern_change();
        }

        let num_rows = self.module.num_rows_at_order(self.current_table_index);
        if self.current_row >= num_rows {
            // Break to a row past the destination pattern wraps to the top
            self.current_row = 0;
        }
        self.playing_table_index = self.current_table_index;
        self.playing_row = self.current_row;

        // E6y replays rows on purpose; don't count those as song loops
        if !self.channels.iter().any(|ch| ch.pattern_loop_count > 0) {
            let index = self.current_table_index as usize * MAX_ROWS_PER_PATTERN as usize
                + self.current_row as usize;
            let visits = self.row_loop_count[index];
            if visits > self.loop_count {
                self.loop_count = visits;
            }
            self.row_loop_count[index] = visits.saturating_add(1);
        }

        self.process_row_slots();

        self.current_row += 1;
        if !self.position_jump && !self.pattern_break && self.current_row >= num_rows {
            self.current_table_index = self.current_table_index.wrapping_add(1);
            self.current_row = 0;
            self.post_pattern_change();
        }
    }

    fn post_pattern_change(&mut self) {
        if self.current_table_index as u16 >= self.module.length {
            self.current_table_index = self.module.restart_position;
        }
    }

    /// Run every channel's slot at the playing position. Used both by
    /// `row` and by the pattern-delay replays, which fire after the row
    /// cursor has already moved on.
    fn process_row_slots(&mut self) {
        let pattern = *self.module.pattern_at_order(self.playing_table_index);
        debug_assert!(self.playing_row < pattern.num_rows);
        for index in 0..self.channels.len() {
            let slot = *self.module.slot(&pattern, self.playing_row, index as u8);
            self.channels[index].current = slot;
            self.handle_slot(index);
        }
    }

    /// Per-tick work every channel gets regardless of commands:
    /// envelopes, fadeout, autovibrato, then the derived step and mix
    /// volumes.
    fn channel_housekeeping(&mut self, index: usize) {
        let module = &self.module;
        let ch = &mut self.channels[index];

        if let Some(instrument_index) = ch.instrument {
            let instrument = &module.instruments[instrument_index as usize];
            ch.volume_envelope_value = match &instrument.volume_envelope {
                Some(env) => envelope_tick(env, ch.sustained, &mut ch.volume_envelope_frame),
                None => MAX_ENVELOPE_VALUE,
            };
            ch.panning_envelope_value = match &instrument.panning_envelope {
                Some(env) => envelope_tick(env, ch.sustained, &mut ch.panning_envelope_frame),
                None => MAX_ENVELOPE_VALUE / 2,
            };
            if !ch.sustained {
                ch.fadeout_volume = ch.fadeout_volume.saturating_sub(instrument.volume_fadeout);
            }
            let vibrato = instrument.vibrato;
            if vibrato.depth > 0 {
                let phase = ((ch.autovibrato_ticks as u32 * vibrato.rate as u32) >> 2) as u8;
                let value = waveform_value(vibrato.waveform, phase);
                let depth = if vibrato.sweep > 0 && ch.autovibrato_ticks < vibrato.sweep as u16 {
                    // Depth ramps in over the sweep
                    vibrato.depth as u32 * ch.autovibrato_ticks as u32 / vibrato.sweep as u32
                } else {
                    vibrato.depth as u32
                };
                ch.autovibrato_offset = ((value as i32 * depth as i32) >> 6) as i8;
                ch.autovibrato_ticks = ch.autovibrato_ticks.saturating_add(1);
            } else {
                ch.autovibrato_offset = 0;
            }
        }

        self.update_step(index);
        self.update_target_volumes(index);
    }

    fn update_step(&mut self, index: usize) {
        let frequency_type = self.module.frequency_type;
        let rate = self.rate;
        let ch = &mut self.channels[index];
        if ch.period == 0 {
            ch.step = 0;
            return;
        }
        let base = frequency::shift_period(frequency_type, ch.period, ch.arp_note_offset);
        let period = frequency::clamp_period(
            frequency_type,
            base as i32 - ch.vibrato_offset as i32 - ch.autovibrato_offset as i32,
        );
        ch.step = frequency::period_step(frequency_type, period, rate);
    }

    fn update_target_volumes(&mut self, index: usize) {
        let ch = &mut self.channels[index];
        let volume = (ch.volume as i16 + ch.volume_offset as i16)
            .clamp(0, MAX_VOLUME as i16) as f32
            / MAX_VOLUME as f32;
        let volume = volume
            * ch.fadeout_volume as f32 / MAX_FADEOUT_VOLUME as f32
            * ch.volume_envelope_value as f32 / MAX_ENVELOPE_VALUE as f32;
        let panning = ch.panning as f32 / MAX_PANNING as f32;
        let envelope = (ch.panning_envelope_value as f32 - 32.0) / 32.0;
        let panning = (panning + envelope * (0.5 - (panning - 0.5).abs())).clamp(0.0, 1.0);
        ch.target_volume[0] = volume * libm::sqrtf(1.0 - panning);
        ch.target_volume[1] = volume * libm::sqrtf(panning);
        if !cfg!(feature = "ramping") {
            ch.actual_volume = ch.target_volume;
        }
    }
}

/// Advance an envelope by one tick: loop wrap, sustain clamp, then a
/// linearly interpolated value.
fn envelope_tick(envelope: &Envelope, sustained: bool, frame: &mut u16) -> u8 {
    if let Some((start, end)) = envelope.loop_points {
        if *frame >= envelope.point_frame(end) {
            *frame = envelope.point_frame(start);
        }
    }
    if sustained {
        if let Some(point) = envelope.sustain_point {
            let sustain_frame = envelope.point_frame(point);
            if *frame >= sustain_frame {
                *frame = sustain_frame;
                return envelope.value_at(*frame);
            }
        }
    }
    let value = envelope.value_at(*frame);
    *frame = frame.saturating_add(1);
    value
}
