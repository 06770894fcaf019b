//! The top-level struct composing the sequencer and the voice allocator
//! behind one [`RealtimeInterface`] impl: the only entry point hosts
//! actually drive.

use crate::config::PlayerConfig;
use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};
use crate::error::Result;
use crate::formats::cmf::CmfInstrumentBank;
use crate::formats::{self, SongMetadata};
use crate::sequencer::{RealtimeInterface, Sequencer};
use crate::voice::{Instrument, InstrumentBank, Opl3Interface, VoiceAllocator};
use crate::constants::{
    CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_RESET_ALL_CONTROLLERS, CC_SOFT_PEDAL, CC_SOSTENUTO, CC_SUSTAIN,
};
use log::debug;

/// Converts a CMF raw 16-byte instrument block into an [`Instrument`].
/// CMF's own operator layout doesn't line up byte-for-byte with the
/// generic 11-register `OperatorPatch` this crate's `Opl3Interface`
/// expects; taking the first 11 bytes as-is and ignoring CMF's two
/// trailing feedback/octave bytes is a deliberate simplification
/// (`DESIGN.md`), not a claim of bit-exact CMF fidelity.
fn cmf_patch_to_instrument(raw: &[u8; 16]) -> Instrument {
    let mut regs = [0u8; 11];
    regs.copy_from_slice(&raw[0..11]);
    Instrument {
        patch: crate::voice::OperatorPatch { regs },
        slave_patch: None,
        finetune_semitones: 0.0,
        velocity_offset: 0,
        rhythm_category: None,
        fixed_note: None,
        fixed_sustain: false,
    }
}

fn bank_from_embedded(embedded: &Option<CmfInstrumentBank>) -> InstrumentBank {
    let mut bank = InstrumentBank::default();
    if let Some(cmf_bank) = embedded {
        for program in 0..=255u8 {
            if let Some(raw) = cmf_bank.get(program) {
                bank.insert(0, 0, program, cmf_patch_to_instrument(raw));
            }
        }
    }
    bank
}

/// Owns a parsed score's sequencer and voice allocator and bridges one to
/// the other: every [`RealtimeInterface`] call the sequencer issues is
/// translated here into [`Opl3Interface`] register-level work.
pub struct Player<S: Opl3Interface> {
    sequencer: Sequencer,
    allocator: VoiceAllocator,
    chip: S,
    metadata: SongMetadata,
    song_length_seconds: f64,
    config: PlayerConfig,
}

impl<S: Opl3Interface> Player<S> {
    /// Parses `bytes` with [`formats::load`], builds a bank from whatever
    /// instrument data the file carries on its own (CMF only; every other
    /// format relies entirely on `bank`), and constructs a ready-to-tick
    /// player. `bank` entries win over embedded ones on lookup collision.
    pub fn load(bytes: &[u8], chip: S, mut bank: InstrumentBank, config: PlayerConfig) -> Result<Self> {
        let score = formats::load(bytes)?;
        for ((bank_msb, bank_lsb, program), instrument) in bank_from_embedded(&score.embedded_instruments).into_entries() {
            bank.insert_if_absent(bank_msb, bank_lsb, program, instrument);
        }

        let allocator = VoiceAllocator::new(&chip, config.volume_model, bank, config.retrigger_as_aftertouch);
        let song_length_seconds = score.timeline.song_length_seconds;
        let mut sequencer = Sequencer::new(
            score.division,
            score.tracks,
            score.banks,
            score.text_bank,
            score.loop_points,
            config.loop_enabled,
            config.loop_count,
        );
        sequencer.tempo_multiplier = config.tempo_multiplier;

        Ok(Self {
            sequencer,
            allocator,
            chip,
            metadata: score.metadata,
            song_length_seconds,
            config,
        })
    }

    pub fn metadata(&self) -> &SongMetadata {
        &self.metadata
    }

    pub fn song_length_seconds(&self) -> f64 {
        self.song_length_seconds
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn is_at_end(&self) -> bool {
        self.sequencer.is_at_end()
    }

    pub fn absolute_time_seconds(&self) -> f64 {
        self.sequencer.absolute_time_seconds()
    }

    pub fn chip(&self) -> &S {
        &self.chip
    }

    pub fn chip_mut(&mut self) -> &mut S {
        &mut self.chip
    }

    /// Advances playback by `elapsed_seconds` of wall-clock time and
    /// returns the number of seconds until the next event is due, exactly
    /// as [`Sequencer::tick`] does; also runs the voice allocator's own
    /// per-tick ageing, pitch and arpeggio passes at the same granularity.
    pub fn tick(&mut self, elapsed_seconds: f64, granularity_seconds: f64) -> f64 {
        let allocator = &mut self.allocator;
        let chip = &mut self.chip;
        let mut bridge = Bridge { allocator, chip };
        let wait = self.sequencer.tick(elapsed_seconds, granularity_seconds, &mut bridge);
        self.allocator.add_age(&mut self.chip, (elapsed_seconds * 1_000_000.0) as i64);
        self.allocator.tick_pitch(&mut self.chip, elapsed_seconds);
        self.allocator.tick_arpeggio(&mut self.chip);
        wait
    }

    pub fn seek(&mut self, target_seconds: f64) {
        let allocator = &mut self.allocator;
        let chip = &mut self.chip;
        let mut bridge = Bridge { allocator, chip };
        self.sequencer.seek(target_seconds, &mut bridge);
    }
}

/// A short-lived adapter implementing [`RealtimeInterface`] over borrowed
/// `&mut` references so [`Player::tick`] doesn't need to give the
/// sequencer a mutable borrow of the whole `Player`.
struct Bridge<'a, S: Opl3Interface> {
    allocator: &'a mut VoiceAllocator,
    chip: &'a mut S,
}

impl<'a, S: Opl3Interface> RealtimeInterface for Bridge<'a, S> {
    fn note_on(&mut self, channel: MidiChannel, key: NoteNumber, velocity: Velocity) {
        self.allocator.note_on(self.chip, channel, key, velocity);
    }

    fn note_off(&mut self, channel: MidiChannel, key: NoteNumber, velocity: Velocity) {
        self.allocator.note_off(self.chip, channel, key, velocity);
    }

    fn note_aftertouch(&mut self, channel: MidiChannel, key: NoteNumber, value: ControlValue) {
        self.allocator.set_note_aftertouch(channel, key, value);
    }

    fn channel_aftertouch(&mut self, channel: MidiChannel, value: ControlValue) {
        self.allocator.set_channel_aftertouch(channel, value);
    }

    fn controller_change(&mut self, channel: MidiChannel, controller: u8, value: ControlValue) {
        match controller {
            CC_SUSTAIN => self.allocator.set_sustain(self.chip, channel, value.get() >= 64),
            CC_SOSTENUTO => self.allocator.set_sostenuto(self.chip, channel, value.get() >= 64),
            CC_SOFT_PEDAL => self.allocator.set_soft_pedal(channel, value.get() >= 64),
            CC_ALL_NOTES_OFF | CC_ALL_SOUND_OFF => self.allocator.all_notes_off(self.chip, channel),
            CC_RESET_ALL_CONTROLLERS => self.allocator.reset_all_controllers(channel),
            _ => self.allocator.set_controller(channel, controller, value),
        }
    }

    fn patch_change(&mut self, channel: MidiChannel, program: Program) {
        self.allocator.set_program(channel, program);
    }

    fn pitch_bend(&mut self, channel: MidiChannel, value: PitchBend14) {
        self.allocator.set_pitch_bend(channel, value);
    }

    fn system_exclusive(&mut self, data: &[u8]) {
        debug!("sysex passthrough, {} bytes", data.len());
    }

    fn raw_opl(&mut self, register: u8, value: u8) {
        self.chip.write_register(0, register, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::cmf::CmfInstrumentBank;
    use crate::voice::VoiceCategory;

    struct SilentChip {
        categories: Vec<VoiceCategory>,
        note_on_calls: usize,
        note_off_calls: usize,
    }

    impl SilentChip {
        fn new(n: usize) -> Self {
            Self { categories: vec![VoiceCategory::Regular; n], note_on_calls: 0, note_off_calls: 0 }
        }
    }

    impl Opl3Interface for SilentChip {
        fn set_patch(&mut self, _voice: usize, _patch: &crate::voice::OperatorPatch) {}

        fn note_on(&mut self, _voice: usize, _pair_slave_voice: Option<usize>, _freq_hz: f64) {
            self.note_on_calls += 1;
        }

        fn note_off(&mut self, _voice: usize) {
            self.note_off_calls += 1;
        }

        fn touch_note(&mut self, _voice: usize, _velocity: Velocity, _channel_volume: ControlValue, _expression: ControlValue, _brightness: ControlValue) {}

        fn set_pan(&mut self, _voice: usize, _midi_pan: ControlValue) {}

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

    fn minimal_smf() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&6u32.to_be_bytes());
        bytes.extend_from_slice(&0u16.to_be_bytes());
        bytes.extend_from_slice(&1u16.to_be_bytes());
        bytes.extend_from_slice(&96u16.to_be_bytes());

        let mut track = Vec::new();
        track.extend_from_slice(&[0x00, 0x90, 0x3C, 0x64]); // NoteOn at delta 0
        track.extend_from_slice(&[0x60, 0x80, 0x3C, 0x40]); // NoteOff a quarter later
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]); // EndOfTrack

        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);
        bytes
    }

    #[test]
    fn load_then_tick_drives_one_note_on_and_off() {
        let mut bank = InstrumentBank::default();
        bank.insert(0, 0, 0, Instrument {
            patch: crate::voice::OperatorPatch::default(),
            slave_patch: None,
            finetune_semitones: 0.0,
            velocity_offset: 0,
            rhythm_category: None,
            fixed_note: None,
            fixed_sustain: false,
        });

        let mut player = Player::load(&minimal_smf(), SilentChip::new(4), bank, PlayerConfig::default()).expect("load");
        assert!((player.song_length_seconds() - 0.5).abs() < 1e-6);

        player.tick(1.0, 0.001);

        assert_eq!(player.chip().note_on_calls, 1);
        assert_eq!(player.chip().note_off_calls, 1);
        assert!(player.is_at_end());
    }

    #[test]
    fn seek_past_the_note_off_suppresses_note_on_but_still_releases() {
        let mut bank = InstrumentBank::default();
        bank.insert(0, 0, 0, Instrument {
            patch: crate::voice::OperatorPatch::default(),
            slave_patch: None,
            finetune_semitones: 0.0,
            velocity_offset: 0,
            rhythm_category: None,
            fixed_note: None,
            fixed_sustain: false,
        });

        let mut player = Player::load(&minimal_smf(), SilentChip::new(4), bank, PlayerConfig::default()).expect("load");
        player.seek(1.0);

        assert_eq!(player.chip().note_on_calls, 0, "seeking past a note-on should not sound it");
        assert!(player.is_at_end());
    }

    #[test]
    fn bank_from_embedded_is_empty_without_a_cmf_table() {
        let bank = bank_from_embedded(&None::<CmfInstrumentBank>);
        assert!(bank.into_entries().next().is_none());
    }

    #[test]
    fn cmf_patch_to_instrument_drops_the_two_trailing_bytes() {
        let raw = [7u8; 16];
        let instrument = cmf_patch_to_instrument(&raw);
        assert_eq!(instrument.patch.regs, [7u8; 11]);
        assert!(instrument.slave_patch.is_none());
    }
}
