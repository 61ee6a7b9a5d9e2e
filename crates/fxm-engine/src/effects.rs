//! Volume-column and effect-column interpretation.
//!
//! Row (tick 0) handling lives in [`Context::handle_slot`]; everything
//! that repeats on later ticks lives in [`Context::tick_effects`]. Each
//! effect family keeps one per-channel memory byte: a zero parameter
//! reuses the last non-zero value, independently per family.

use fxm_ir::{MAX_VOLUME, MICROSTEP_BITS};

use crate::context::Context;
use crate::{frequency, RAMPING_POINTS};

/// How a trigger reuses the channel's previous state.
#[derive(Clone, Copy, Default)]
pub(crate) struct TriggerFlags {
    /// Keep the sample cursor (ghost instrument, tone portamento)
    pub keep_position: bool,
    /// Keep the current volume instead of the sample default
    pub keep_volume: bool,
    /// Keep the current period (retrigger without pitch reset)
    pub keep_period: bool,
}

impl Context {
    /// Tick-0 entry point for one channel's slot. The slot has already
    /// been copied into `channel.current`.
    pub(crate) fn handle_slot(&mut self, index: usize) {
        let slot = self.channels[index].current;

        // EDx defers the whole cell (trigger and volume column) to tick x
        if slot.effect_type == 0x0E
            && slot.effect_param >> 4 == 0x0D
            && slot.effect_param & 0x0F > 0
        {
            return;
        }

        // Transient offsets from the previous row die unless their
        // command continues this row
        let continues_vibrato = slot.effect_type == 0x04
            || slot.effect_type == 0x06
            || slot.volume_column >> 4 == 0x0B;
        let continues_tremolo = slot.effect_type == 0x07 || slot.effect_type == 0x1D;
        let ch = &mut self.channels[index];
        if !continues_vibrato {
            ch.vibrato_offset = 0;
        }
        if !continues_tremolo {
            ch.volume_offset = 0;
            ch.tremor_on = true;
        }
        // Tick 0 always plays the base note of an arpeggio
        ch.arp_note_offset = 0;

        self.handle_slot_now(index);
    }

    /// Process a cell: instrument column, note column, then the tick-0
    /// part of both command columns. Also called on the delay tick of
    /// EDx.
    pub(crate) fn handle_slot_now(&mut self, index: usize) {
        let slot = self.channels[index].current;
        let tone_portamento = slot.has_tone_portamento()
            && self.channels[index].instrument.is_some()
            && self.channels[index].sample.is_some();

        if slot.instrument > 0 {
            self.channels[index].next_instrument = slot.instrument;
            if tone_portamento {
                // Instrument next to a porta note: volume/envelope reset
                // only, the running sample continues
                self.trigger_note(
                    index,
                    TriggerFlags { keep_position: true, keep_period: true, keep_volume: false },
                );
            } else if !slot.has_note() && self.channels[index].sample.is_some() {
                // Ghost instrument: restart envelopes, keep the cursor
                self.trigger_note(
                    index,
                    TriggerFlags { keep_position: true, keep_period: true, keep_volume: false },
                );
            } else if slot.instrument as usize > self.module.instruments.len() {
                self.channels[index].cut_note();
                self.channels[index].instrument = None;
                self.channels[index].sample = None;
            } else {
                self.channels[index].instrument = Some(slot.instrument as u16 - 1);
            }
        }

        if slot.has_note() {
            self.handle_note(index, tone_portamento);
        } else if slot.is_key_off() {
            self.key_off(index);
        }

        self.volume_column_tick0(index);
        self.effect_column_tick0(index);
    }

    /// Note column with a playable note: slide target, trigger, or cut.
    fn handle_note(&mut self, index: usize, tone_portamento: bool) {
        let slot = self.channels[index].current;
        let frequency_type = self.module.frequency_type;

        if tone_portamento {
            let ch = &self.channels[index];
            let sample = &self.module.samples[ch.sample.unwrap() as usize];
            let note = slot.note as i16 - 1 + sample.relative_note as i16;
            let ch = &mut self.channels[index];
            ch.note = note;
            let target = frequency::note_period(frequency_type, note, ch.finetune);
            if target > 0 {
                ch.tone_portamento_target = target;
            }
            return;
        }

        let Some(instrument_index) = self.channels[index].instrument else {
            self.channels[index].cut_note();
            return;
        };
        let instrument = &self.module.instruments[instrument_index as usize];
        let Some(sample_index) = instrument.sample_for_note(slot.note) else {
            self.channels[index].cut_note();
            return;
        };

        let sample = &self.module.samples[sample_index as usize];
        let mut finetune = sample.finetune;
        // E5x overrides the sample finetune for this trigger
        if slot.effect_type == 0x0E && slot.effect_param >> 4 == 0x05 {
            finetune = ((slot.effect_param & 0x0F) as i8 - 8) * 2;
        }
        let note = slot.note as i16 - 1 + sample.relative_note as i16;

        let ch = &mut self.channels[index];
        ch.sample = Some(sample_index);
        ch.finetune = finetune;
        ch.note = note;
        // A bare note (no instrument column) keeps the current volume
        let keep_volume = slot.instrument == 0;
        self.trigger_note(
            index,
            TriggerFlags { keep_position: false, keep_period: false, keep_volume },
        );
    }

    /// Start (or restart) the channel's sample.
    pub(crate) fn trigger_note(&mut self, index: usize, flags: TriggerFlags) {
        if cfg!(feature = "ramping")
            && !flags.keep_position
            && self.channels[index].active
            && self.channels[index].sample.is_some()
        {
            self.capture_sample_tail(index);
        }

        let generated = self.generated_samples;
        let frequency_type = self.module.frequency_type;
        let sample_volume_panning = self.channels[index]
            .sample
            .map(|si| {
                let s = &self.module.samples[si as usize];
                (s.volume, s.panning)
            });

        let ch = &mut self.channels[index];
        if !flags.keep_position {
            ch.sample_position = 0;
            ch.ping = true;
            ch.active = ch.sample.is_some();
            ch.frame_count = 0;
        }
        if let Some((volume, panning)) = sample_volume_panning {
            if !flags.keep_volume {
                ch.volume = volume;
            }
            ch.panning = panning;
        }
        ch.sustained = true;
        ch.fadeout_volume = fxm_ir::MAX_FADEOUT_VOLUME;
        ch.volume_envelope_frame = 0;
        ch.panning_envelope_frame = 0;
        ch.volume_envelope_value = fxm_ir::MAX_ENVELOPE_VALUE;
        ch.panning_envelope_value = fxm_ir::MAX_ENVELOPE_VALUE / 2;
        ch.vibrato_offset = 0;
        ch.volume_offset = 0;
        ch.autovibrato_ticks = 0;
        ch.autovibrato_offset = 0;
        ch.arp_note_offset = 0;
        ch.tremor_on = true;
        ch.tremor_ticks = 0;
        if ch.vibrato_control & 4 == 0 {
            ch.vibrato_ticks = 0;
        }
        if ch.tremolo_control & 4 == 0 {
            ch.tremolo_ticks = 0;
        }
        if !flags.keep_period {
            ch.period = frequency::note_period(frequency_type, ch.note, ch.finetune);
            if ch.period == 0 {
                // Note out of the representable range
                ch.active = false;
            }
            ch.orig_period = ch.period;
        }
        ch.latest_trigger = generated;
        if let Some(instrument_index) = ch.instrument {
            self.instrument_latest_trigger[instrument_index as usize] = generated;
        }
        if let Some(sample_index) = self.channels[index].sample {
            self.sample_latest_trigger[sample_index as usize] = generated;
        }
    }

    /// Record the tail the old waveform would have produced, for the
    /// post-trigger cross-fade.
    fn capture_sample_tail(&mut self, index: usize) {
        let saved = {
            let ch = &self.channels[index];
            (ch.sample_position, ch.ping, ch.active)
        };
        let mut tail = [0.0f32; RAMPING_POINTS];
        for value in &mut tail {
            *value = self.next_of_sample(index);
        }
        let ch = &mut self.channels[index];
        (ch.sample_position, ch.ping, ch.active) = saved;
        ch.end_of_previous_sample = tail;
    }

    /// Key off: release sustain; without a volume envelope the note is
    /// cut outright.
    pub(crate) fn key_off(&mut self, index: usize) {
        let has_volume_envelope = self.channels[index]
            .instrument
            .map(|i| self.module.instruments[i as usize].volume_envelope.is_some())
            .unwrap_or(false);
        let ch = &mut self.channels[index];
        ch.sustained = false;
        if !has_volume_envelope {
            ch.cut_note();
        }
    }

    /// Volume column, tick 0.
    fn volume_column_tick0(&mut self, index: usize) {
        let v = self.channels[index].current.volume_column;
        let ch = &mut self.channels[index];
        match v >> 4 {
            // 0x10..=0x50: set volume 0..=64
            0x1..=0x5 => ch.volume = (v - 0x10).min(MAX_VOLUME),
            // 8x/9x: fine slides, once per row
            0x8 => ch.slide_volume(-((v & 0x0F) as i16)),
            0x9 => ch.slide_volume((v & 0x0F) as i16),
            // Ax: set vibrato speed without starting vibrato
            0xA => ch.vibrato_param = (v << 4) | (ch.vibrato_param & 0x0F),
            // Cx: set panning
            0xC => ch.panning = (v & 0x0F) << 4,
            // Fx: tone portamento parameter, shared with 3xx memory
            0xF => {
                if v & 0x0F > 0 {
                    ch.tone_portamento_param = (v & 0x0F) << 4;
                }
            }
            // Bx: vibrato depth latches here, runs on later ticks
            0xB => {
                if v & 0x0F > 0 {
                    ch.vibrato_param = (ch.vibrato_param & 0xF0) | (v & 0x0F);
                }
            }
            _ => {}
        }
    }

    /// Volume column, ticks 1 and later.
    fn volume_column_tick(&mut self, index: usize) {
        let v = self.channels[index].current.volume_column;
        match v >> 4 {
            0x6 => self.channels[index].slide_volume(-((v & 0x0F) as i16)),
            0x7 => self.channels[index].slide_volume((v & 0x0F) as i16),
            0xB => self.channels[index].run_vibrato(),
            0xD => self.channels[index].slide_panning(-((v & 0x0F) as i16)),
            0xE => self.channels[index].slide_panning((v & 0x0F) as i16),
            0xF => self.tone_portamento(index),
            _ => {}
        }
    }

    /// Effect column, tick 0: memory updates and immediate commands.
    fn effect_column_tick0(&mut self, index: usize) {
        let slot = self.channels[index].current;
        let param = slot.effect_param;
        match slot.effect_type {
            0x01 => update_memory(&mut self.channels[index].portamento_up_param, param),
            0x02 => update_memory(&mut self.channels[index].portamento_down_param, param),
            0x03 => update_memory(&mut self.channels[index].tone_portamento_param, param),
            0x04 => update_nibble_memory(&mut self.channels[index].vibrato_param, param),
            0x05 | 0x06 | 0x0A => {
                update_memory(&mut self.channels[index].volume_slide_param, param)
            }
            0x07 => update_nibble_memory(&mut self.channels[index].tremolo_param, param),
            0x08 => self.channels[index].panning = param,
            0x09 => {
                let ch = &mut self.channels[index];
                update_memory(&mut ch.sample_offset_param, param);
                if slot.has_note() && !slot.has_tone_portamento() {
                    self.apply_sample_offset(index);
                }
            }
            0x0B => {
                self.position_jump = true;
                self.jump_dest = param;
                self.jump_row = 0;
            }
            0x0C => self.channels[index].volume = param.min(MAX_VOLUME),
            0x0D => {
                self.pattern_break = true;
                // Parameter is binary-coded decimal
                self.jump_row = (param >> 4).min(9) * 10 + (param & 0x0F);
            }
            0x0E => self.extended_tick0(index, param),
            0x0F => match param {
                0 => {}
                1..=0x1F => self.tempo = param,
                _ => self.bpm = param,
            },
            // Gxx
            0x10 => self.global_volume = param.min(MAX_VOLUME),
            // Hxy
            0x11 => update_memory(&mut self.channels[index].global_volume_slide_param, param),
            // Kxx with zero delay keys off on the row itself
            0x14 => {
                if param == 0 {
                    self.key_off(index);
                }
            }
            // Lxx: jump both envelopes to a frame
            0x15 => {
                let ch = &mut self.channels[index];
                ch.volume_envelope_frame = param as u16;
                ch.panning_envelope_frame = param as u16;
            }
            // Pxy
            0x19 => update_memory(&mut self.channels[index].panning_slide_param, param),
            // Rxy
            0x1B => update_nibble_memory(&mut self.channels[index].multi_retrig_param, param),
            // Txy
            0x1D => {
                let ch = &mut self.channels[index];
                update_memory(&mut ch.tremor_param, param);
                if slot.has_note() {
                    ch.tremor_on = true;
                    ch.tremor_ticks = ch.tremor_param >> 4;
                }
            }
            // X1x / X2x
            0x21 => match param >> 4 {
                1 => {
                    let ch = &mut self.channels[index];
                    update_memory(&mut ch.extra_fine_portamento_up_param, param & 0x0F);
                    let delta = -(ch.extra_fine_portamento_up_param as i32);
                    self.pitch_slide(index, delta);
                }
                2 => {
                    let ch = &mut self.channels[index];
                    update_memory(&mut ch.extra_fine_portamento_down_param, param & 0x0F);
                    let delta = ch.extra_fine_portamento_down_param as i32;
                    self.pitch_slide(index, delta);
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// Exy sub-commands, tick 0.
    fn extended_tick0(&mut self, index: usize, param: u8) {
        let x = param & 0x0F;
        match param >> 4 {
            0x1 => {
                let ch = &mut self.channels[index];
                update_memory(&mut ch.fine_portamento_up_param, x);
                let delta = -4 * ch.fine_portamento_up_param as i32;
                self.pitch_slide(index, delta);
            }
            0x2 => {
                let ch = &mut self.channels[index];
                update_memory(&mut ch.fine_portamento_down_param, x);
                let delta = 4 * ch.fine_portamento_down_param as i32;
                self.pitch_slide(index, delta);
            }
            0x4 => self.channels[index].vibrato_control = x,
            // E5x is read at trigger time in handle_note
            0x6 => self.pattern_loop(index, x),
            0x7 => self.channels[index].tremolo_control = x,
            0xA => {
                let ch = &mut self.channels[index];
                update_memory(&mut ch.fine_volume_slide_up_param, x);
                let delta = ch.fine_volume_slide_up_param as i16;
                ch.slide_volume(delta);
            }
            0xB => {
                let ch = &mut self.channels[index];
                update_memory(&mut ch.fine_volume_slide_down_param, x);
                let delta = ch.fine_volume_slide_down_param as i16;
                ch.slide_volume(-delta);
            }
            0xC => {
                if x == 0 {
                    self.channels[index].cut_note();
                }
            }
            0xE => {
                // Nested delays are ignored while one is in progress
                if self.extra_rows == 0 && self.extra_rows_done == 0 {
                    self.extra_rows = x;
                }
            }
            _ => {}
        }
    }

    /// E6y: per-channel pattern loop.
    fn pattern_loop(&mut self, index: usize, y: u8) {
        if y == 0 {
            self.channels[index].pattern_loop_origin = self.playing_row;
            return;
        }
        if self.channels[index].pattern_loop_count < y {
            self.channels[index].pattern_loop_count += 1;
            self.position_jump = true;
            self.jump_dest = self.playing_table_index;
            self.jump_row = self.channels[index].pattern_loop_origin as u8;
        } else {
            self.channels[index].pattern_loop_count = 0;
        }
    }

    /// 9xx: move the cursor to `param * 256` frames; past the sample end
    /// nothing plays.
    fn apply_sample_offset(&mut self, index: usize) {
        let ch = &self.channels[index];
        let Some(sample_index) = ch.sample else { return };
        let offset_frames = (ch.sample_offset_param as u32) << 8;
        let length = self.module.samples[sample_index as usize].length;
        let ch = &mut self.channels[index];
        if offset_frames >= length {
            ch.active = false;
        } else {
            ch.sample_position = offset_frames << MICROSTEP_BITS;
        }
    }

    /// Per-tick entry point (ticks 1 and later).
    pub(crate) fn tick_effects(&mut self, index: usize) {
        let slot = self.channels[index].current;

        // A pending note delay swallows the whole cell until it fires
        if slot.effect_type == 0x0E && slot.effect_param >> 4 == 0x0D {
            let delay = slot.effect_param & 0x0F;
            if delay > 0 && self.current_tick == delay {
                self.handle_slot_now(index);
            }
            return;
        }

        self.volume_column_tick(index);
        self.effect_column_tick(index);
    }

    /// Effect column, ticks 1 and later.
    fn effect_column_tick(&mut self, index: usize) {
        let slot = self.channels[index].current;
        let param = slot.effect_param;
        match slot.effect_type {
            0x00 => {
                if param > 0 {
                    self.channels[index].arp_note_offset = match self.current_tick % 3 {
                        1 => param >> 4,
                        2 => param & 0x0F,
                        _ => 0,
                    };
                }
            }
            0x01 => {
                let delta = -4 * self.channels[index].portamento_up_param as i32;
                self.pitch_slide(index, delta);
            }
            0x02 => {
                let delta = 4 * self.channels[index].portamento_down_param as i32;
                self.pitch_slide(index, delta);
            }
            0x03 => self.tone_portamento(index),
            0x04 => self.channels[index].run_vibrato(),
            0x05 => {
                self.tone_portamento(index);
                self.volume_slide(index);
            }
            0x06 => {
                self.channels[index].run_vibrato();
                self.volume_slide(index);
            }
            0x07 => self.channels[index].run_tremolo(),
            0x0A => self.volume_slide(index),
            0x0E => match param >> 4 {
                0x9 => {
                    let x = param & 0x0F;
                    if x > 0 && self.current_tick % x == 0 {
                        self.retrigger(index, 0);
                    }
                }
                0xC => {
                    if self.current_tick == param & 0x0F {
                        self.channels[index].cut_note();
                    }
                }
                _ => {}
            },
            0x11 => {
                let param = self.channels[index].global_volume_slide_param;
                let delta = slide_delta(param);
                self.global_volume =
                    (self.global_volume as i16 + delta).clamp(0, MAX_VOLUME as i16) as u8;
            }
            0x14 => {
                if self.current_tick == param {
                    self.key_off(index);
                }
            }
            0x19 => {
                let param = self.channels[index].panning_slide_param;
                self.channels[index].slide_panning(slide_delta(param));
            }
            0x1B => {
                let memory = self.channels[index].multi_retrig_param;
                let interval = memory & 0x0F;
                if interval > 0 && self.current_tick % interval == 0 {
                    self.retrigger(index, memory >> 4);
                }
            }
            0x1D => self.channels[index].run_tremor(),
            _ => {}
        }
    }

    /// Axy-family slide using the shared volume-slide memory.
    fn volume_slide(&mut self, index: usize) {
        let param = self.channels[index].volume_slide_param;
        self.channels[index].slide_volume(slide_delta(param));
    }

    /// Move the base period, clamping into the mode's limits.
    fn pitch_slide(&mut self, index: usize, delta: i32) {
        let frequency_type = self.module.frequency_type;
        let ch = &mut self.channels[index];
        if ch.period == 0 {
            return;
        }
        ch.period = frequency::clamp_period(frequency_type, ch.period as i32 + delta);
    }

    /// 3xx: slide the period toward the stored target, 4 units per
    /// parameter step, never overshooting.
    fn tone_portamento(&mut self, index: usize) {
        let ch = &mut self.channels[index];
        let target = ch.tone_portamento_target;
        if target == 0 || ch.period == 0 {
            return;
        }
        let speed = 4 * ch.tone_portamento_param as u16;
        if ch.period > target {
            ch.period = ch.period.saturating_sub(speed).max(target);
        } else {
            ch.period = ch.period.saturating_add(speed).min(target);
        }
    }

    /// E9x / Rxy: restart the sample, optionally adjusting volume by the
    /// multi-retrig table.
    fn retrigger(&mut self, index: usize, volume_modifier: u8) {
        self.trigger_note(
            index,
            TriggerFlags { keep_position: false, keep_volume: true, keep_period: true },
        );
        let ch = &mut self.channels[index];
        let volume = ch.volume as i32;
        ch.volume = (match volume_modifier {
            0x0 | 0x8 => volume,
            0x1 => volume - 1,
            0x2 => volume - 2,
            0x3 => volume - 4,
            0x4 => volume - 8,
            0x5 => volume - 16,
            0x6 => volume * 2 / 3,
            0x7 => volume / 2,
            0x9 => volume + 1,
            0xA => volume + 2,
            0xB => volume + 4,
            0xC => volume + 8,
            0xD => volume + 16,
            0xE => volume * 3 / 2,
            _ => volume * 2,
        })
        .clamp(0, MAX_VOLUME as i32) as u8;
        // Retrigger restarts from the original pitch
        if ch.orig_period > 0 {
            ch.period = ch.orig_period;
        }
    }
}

/// Whole-byte effect memory: zero recalls the stored parameter.
fn update_memory(memory: &mut u8, param: u8) {
    if param > 0 {
        *memory = param;
    }
}

/// Nibble-wise effect memory (vibrato, tremolo, multi-retrig).
fn update_nibble_memory(memory: &mut u8, param: u8) {
    if param & 0x0F > 0 {
        *memory = (*memory & 0xF0) | (param & 0x0F);
    }
    if param >> 4 > 0 {
        *memory = (param & 0xF0) | (*memory & 0x0F);
    }
}

/// Decode an up/down slide nibble pair: x slides up, y slides down.
fn slide_delta(param: u8) -> i16 {
    let up = (param >> 4) as i16;
    let down = (param & 0x0F) as i16;
    if up > 0 { up } else { -down }
}
