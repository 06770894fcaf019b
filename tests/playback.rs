//! End-to-end playback tests against the public [`fm_sequencer_core::Player`]
//! API, using raw Standard MIDI File bytes built in-memory (no fixture
//! files) and a recording fake chip standing in for a real OPL3 emulator.

use fm_sequencer_core::numbers::Velocity;
use fm_sequencer_core::{
    Instrument, InstrumentBank, OperatorPatch, Player, PlayerConfig, VoiceCategory,
};

mod support;

#[derive(Default)]
struct FakeChip {
    categories: Vec<VoiceCategory>,
    note_on_log: Vec<(usize, Option<usize>)>,
    note_off_log: Vec<usize>,
}

impl FakeChip {
    fn with_categories(categories: Vec<VoiceCategory>) -> Self {
        Self { categories, ..Self::default() }
    }
}

impl fm_sequencer_core::Opl3Interface for FakeChip {
    fn set_patch(&mut self, _voice: usize, _patch: &OperatorPatch) {}

    fn note_on(&mut self, voice: usize, pair_slave_voice: Option<usize>, _freq_hz: f64) {
        self.note_on_log.push((voice, pair_slave_voice));
    }

    fn note_off(&mut self, voice: usize) {
        self.note_off_log.push(voice);
    }

    fn touch_note(
        &mut self,
        _voice: usize,
        _velocity: Velocity,
        _channel_volume: fm_sequencer_core::numbers::ControlValue,
        _expression: fm_sequencer_core::numbers::ControlValue,
        _brightness: fm_sequencer_core::numbers::ControlValue,
    ) {
    }

    fn set_pan(&mut self, _voice: usize, _midi_pan: fm_sequencer_core::numbers::ControlValue) {}

    fn write_register(&mut self, _chip: u8, _register: u8, _value: u8) {}

    fn reset(&mut self, _sample_rate: u32) {}

    fn channel_category(&self, voice: usize) -> VoiceCategory {
        self.categories[voice]
    }

    fn num_channels(&self) -> usize {
        self.categories.len()
    }

    fn num_chips(&self) -> u8 {
        1
    }

    fn rhythm_mode(&self) -> bool {
        false
    }
}

fn regular_chip(n: usize) -> FakeChip {
    FakeChip::with_categories(vec![VoiceCategory::Regular; n])
}

fn plain_instrument() -> Instrument {
    Instrument {
        patch: OperatorPatch::default(),
        slave_patch: None,
        finetune_semitones: 0.0,
        velocity_offset: 0,
        rhythm_category: None,
        fixed_note: None,
        fixed_sustain: false,
    }
}

fn four_op_instrument() -> Instrument {
    Instrument {
        patch: OperatorPatch::default(),
        slave_patch: Some(OperatorPatch::default()),
        finetune_semitones: 0.0,
        velocity_offset: 0,
        rhythm_category: None,
        fixed_note: None,
        fixed_sustain: false,
    }
}

fn write_vlq(bytes: &mut Vec<u8>, mut value: u32) {
    let mut stack = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value > 0 {
        stack.push((value & 0x7F) as u8 | 0x80);
        value >>= 7;
    }
    stack.reverse();
    bytes.extend_from_slice(&stack);
}

fn smf_with_track(division: u16, track_events: &[(u32, Vec<u8>)]) -> Vec<u8> {
    let mut header = Vec::new();
    header.extend_from_slice(b"MThd");
    header.extend_from_slice(&6u32.to_be_bytes());
    header.extend_from_slice(&0u16.to_be_bytes());
    header.extend_from_slice(&1u16.to_be_bytes());
    header.extend_from_slice(&division.to_be_bytes());

    let mut track = Vec::new();
    for (delta, bytes) in track_events {
        write_vlq(&mut track, *delta);
        track.extend_from_slice(bytes);
    }
    write_vlq(&mut track, 0);
    track.extend_from_slice(&[0xFF, 0x2F, 0x00]);

    let mut out = header;
    out.extend_from_slice(b"MTrk");
    out.extend_from_slice(&(track.len() as u32).to_be_bytes());
    out.extend_from_slice(&track);
    out
}

/// Scenario: minimal SMF, one NoteOn/NoteOff pair a quarter note apart.
/// Driving `tick(1.0, 1e-3)` should dispatch exactly one NoteOn and one
/// NoteOff to the chip.
#[test]
fn smf_minimal_note_on_then_off() {
    support::enable_logging();
    let bytes = smf_with_track(0x60, &[(0, vec![0x90, 0x40, 0x40]), (0x60, vec![0x80, 0x40, 0x40])]);

    let mut bank = InstrumentBank::default();
    bank.insert(0, 0, 0, plain_instrument());

    let mut player = Player::load(&bytes, regular_chip(4), bank, PlayerConfig::default()).expect("load");
    assert!((player.song_length_seconds() - 0.5).abs() < 1e-6);

    player.tick(1.0, 0.001);

    assert_eq!(player.chip().note_on_log.len(), 1);
    assert_eq!(player.chip().note_off_log.len(), 1);
    assert!(player.is_at_end());
}

/// Scenario: sustain pedal. NoteOff should not reach the chip until the
/// pedal is released, even though the MIDI NoteOff arrives earlier.
#[test]
fn sustain_pedal_holds_note_past_note_off() {
    support::enable_logging();
    let bytes = smf_with_track(
        0x60,
        &[
            (0, vec![0x90, 0x3C, 0x64]),
            (0, vec![0xB0, 0x40, 0x7F]), // CC64 = 127 (sustain on)
            (0x30, vec![0x80, 0x3C, 0x40]),
            (0x60, vec![0xB0, 0x40, 0x00]), // CC64 = 0 (sustain off)
        ],
    );

    let mut bank = InstrumentBank::default();
    bank.insert(0, 0, 0, plain_instrument());

    let mut player = Player::load(&bytes, regular_chip(4), bank, PlayerConfig::default()).expect("load");

    let mut guard = 0;
    while !player.is_at_end() && guard < 10_000 {
        player.tick(0.05, 0.001);
        guard += 1;
        if player.chip().note_off_log.len() > 0 && player.absolute_time_seconds() < 0.7 {
            panic!("note released before the sustain pedal lifted");
        }
    }

    assert_eq!(player.chip().note_off_log.len(), 1);
}

/// Scenario: 4-op allocation. A 4-op instrument claims a master voice and
/// its paired slave at `c+3` in the same call.
#[test]
fn four_op_note_claims_master_and_paired_slave() {
    support::enable_logging();
    let categories = vec![
        VoiceCategory::FourOpMaster,
        VoiceCategory::FourOpMaster,
        VoiceCategory::FourOpMaster,
        VoiceCategory::FourOpSlave,
        VoiceCategory::FourOpSlave,
        VoiceCategory::FourOpSlave,
    ];
    let chip = FakeChip::with_categories(categories);

    let bytes = smf_with_track(0x60, &[(0, vec![0x90, 0x40, 0x64])]);

    let mut bank = InstrumentBank::default();
    bank.insert(0, 0, 0, four_op_instrument());

    let mut player = Player::load(&bytes, chip, bank, PlayerConfig::default()).expect("load");
    player.tick(0.01, 0.001);

    let log = &player.chip().note_on_log;
    assert_eq!(log.len(), 2, "both the master and slave half should each receive a note_on");
    let (master, slave) = log[0];
    assert!(master < 3, "expected a master-half voice index, got {}", master);
    assert_eq!(slave, Some(master + 3));
    assert_eq!(log[1], (master + 3, None));
}
