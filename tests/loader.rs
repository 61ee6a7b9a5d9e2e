//! Loader integration tests against builder-produced wire images.

mod common;

use common::*;
use femtoxm::ir::{FrequencyType, LoopType, KEY_OFF_NOTE};
use femtoxm::{load_xm, LoadError};

fn one_note_module() -> XmBuilder {
    XmBuilder::new(2)
        .order(&[0])
        .pattern(
            PatternSpec::new(2)
                .row(&[Cell::note(49, 1).with_volume(0x50), Cell::key_off()])
                .empty_rows(3),
        )
        .instrument(InstrumentSpec::with_sample(SampleSpec::new(noise_wave(500))))
}

#[test]
fn parses_header_fields() {
    let module = load_xm(&one_note_module().tempo(9).build()).unwrap();
    assert_eq!(module.num_channels, 2);
    assert_eq!(module.length, 1);
    assert_eq!(module.default_tempo, 9);
    assert_eq!(module.default_bpm, 125);
    assert_eq!(module.frequency_type, FrequencyType::Linear);
    assert_eq!(module.patterns.len(), 1);
    assert_eq!(module.patterns[0].num_rows, 4);
    assert_eq!(module.pattern_slots.len(), 8);
}

#[test]
fn amiga_flag_selects_period_table() {
    let module = load_xm(&one_note_module().amiga().build()).unwrap();
    assert_eq!(module.frequency_type, FrequencyType::Amiga);
}

#[test]
fn key_off_note_is_normalized() {
    let module = load_xm(&one_note_module().build()).unwrap();
    let slot = module.slot(&module.patterns[0], 0, 1);
    assert_eq!(slot.note, KEY_OFF_NOTE);
    assert!(slot.is_key_off());
}

#[test]
fn sample_data_is_undeltad() {
    let wave = noise_wave(500);
    let module = load_xm(&one_note_module().build()).unwrap();
    let sample = &module.samples[0];
    assert_eq!(sample.length, 500);
    let stored = module.waveform(sample);
    for (a, b) in wave.iter().zip(stored) {
        assert_eq!((*a as i16) << 8, *b);
    }
}

#[test]
fn sixteen_bit_sample_data_is_undeltad() {
    let wave: Vec<i16> = (0..300).map(|i| (i * 37 % 20000) as i16 - 10000).collect();
    let data = XmBuilder::new(1)
        .order(&[0])
        .pattern(PatternSpec::new(1).row(&[Cell::note(49, 1)]).empty_rows(3))
        .instrument(InstrumentSpec::with_sample(SampleSpec::new16(wave.clone())))
        .build();
    let module = load_xm(&data).unwrap();
    assert_eq!(module.samples[0].length, 300);
    assert_eq!(module.waveform(&module.samples[0]), &wave[..]);
}

#[test]
fn looped_sample_is_truncated_at_loop_end() {
    let data = XmBuilder::new(1)
        .order(&[0])
        .pattern(PatternSpec::new(1).row(&[Cell::note(49, 1)]).empty_rows(3))
        .instrument(InstrumentSpec::with_sample(
            SampleSpec::new(noise_wave(1000)).forward_loop(100, 300),
        ))
        .build();
    let module = load_xm(&data).unwrap();
    let sample = &module.samples[0];
    // Frames past the loop end are unreachable and dropped
    assert_eq!(sample.length, 400);
    assert_eq!(sample.loop_length, 300);
    assert_eq!(sample.loop_start(), 100);
    assert_eq!(sample.loop_type(), LoopType::Forward);
    assert_eq!(module.samples_data.len(), 400);
}

#[test]
fn ping_pong_flag_survives_loading() {
    let data = XmBuilder::new(1)
        .order(&[0])
        .pattern(PatternSpec::new(1).row(&[Cell::note(49, 1)]).empty_rows(3))
        .instrument(InstrumentSpec::with_sample(
            SampleSpec::new(noise_wave(600)).ping_pong_loop(0, 600),
        ))
        .build();
    let module = load_xm(&data).unwrap();
    assert_eq!(module.samples[0].loop_type(), LoopType::PingPong);
}

#[test]
fn envelope_metadata_round_trips() {
    let mut spec = InstrumentSpec::with_sample(SampleSpec::new(noise_wave(100)));
    spec.volume_envelope = vec![(0, 64), (10, 32), (20, 48)];
    spec.envelope_sustain = Some(1);
    spec.envelope_loop = Some((0, 2));
    spec.fadeout = 1234;
    spec.vibrato = (2, 5, 9, 13);
    let data = XmBuilder::new(1)
        .order(&[0])
        .pattern(PatternSpec::new(1).row(&[Cell::note(49, 1)]).empty_rows(3))
        .instrument(spec)
        .build();
    let module = load_xm(&data).unwrap();
    let instrument = &module.instruments[0];
    let envelope = instrument.volume_envelope.as_ref().unwrap();
    assert_eq!(envelope.points.len(), 3);
    assert_eq!(envelope.points[1].frame, 10);
    assert_eq!(envelope.points[1].value, 32);
    assert_eq!(envelope.sustain_point, Some(1));
    assert_eq!(envelope.loop_points, Some((0, 2)));
    assert_eq!(instrument.volume_fadeout, 1234);
    assert_eq!(instrument.vibrato.sweep, 5);
    assert_eq!(instrument.vibrato.depth, 9);
    assert_eq!(instrument.vibrato.rate, 13);
    assert!(instrument.panning_envelope.is_none());
}

#[test]
fn rejects_zero_channels() {
    let mut data = one_note_module().build();
    // Channel-count field sits at offset 68 in the song header
    data[68] = 0;
    data[69] = 0;
    assert!(matches!(load_xm(&data), Err(LoadError::TooManyChannels(0))));
}

#[test]
fn rejects_old_version() {
    let mut data = one_note_module().build();
    // Version word at offset 58
    data[58] = 0x03;
    data[59] = 0x01;
    assert!(matches!(
        load_xm(&data),
        Err(LoadError::UnsupportedVersion(0x0103))
    ));
}

#[test]
fn rejects_truncation_everywhere() {
    let data = one_note_module().build();
    for len in [0, 10, 59, 80, 300, data.len() - 1] {
        assert!(
            load_xm(&data[..len]).is_err(),
            "accepted a {len}-byte prefix"
        );
    }
}

#[test]
fn out_of_range_order_entries_are_rewritten() {
    let mut builder = one_note_module();
    builder = builder.order(&[0, 9]); // pattern 9 does not exist
    let module = load_xm(&builder.build()).unwrap();
    assert_eq!(module.pattern_table[1], 0);
}
