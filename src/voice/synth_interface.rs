//! The voice allocator's own boundary to an external OPL3 chip, distinct
//! from [`crate::sequencer::interface::RealtimeInterface`]:
//! this one speaks in physical voice indices and raw register writes, not
//! MIDI channels.

use crate::core::numbers::{ControlValue, Velocity};

/// What kind of chip channel a physical voice index currently is, used by
/// the allocator to respect rhythm-mode's fixed bass/snare/tom/cymbal/
/// hi-hat assignment instead of treating every voice as interchangeable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoiceCategory {
    Regular,
    FourOpMaster,
    FourOpSlave,
    RhythmBass,
    RhythmSnare,
    RhythmTom,
    RhythmCymbal,
    RhythmHiHat,
}

impl VoiceCategory {
    pub(crate) fn is_rhythm(self) -> bool {
        !matches!(self, VoiceCategory::Regular | VoiceCategory::FourOpMaster | VoiceCategory::FourOpSlave)
    }
}

/// The patch data an [`Opl3Interface`] needs to program a voice: the four
/// (or two, for 2-op patches) operator register blocks plus feedback/
/// connection, opaque to the allocator beyond its own bookkeeping fields.
#[derive(Clone, Debug, Default)]
pub struct OperatorPatch {
    pub regs: [u8; 11],
}

/// The realtime boundary between the voice allocator and whatever actually
/// drives OPL3 hardware or an emulation of it. One voice index addresses
/// one two-operator chip channel (or the master half of a 4-op pair).
pub trait Opl3Interface {
    /// Loads operator registers for `voice` (and its slave half, if any,
    /// is set up by a second call) without starting a note.
    fn set_patch(&mut self, voice: usize, patch: &OperatorPatch);
    /// Starts (or re-pitches, if already sounding) `voice` at `freq_hz`.
    /// `pair_slave_voice` is `Some` for 4-op/pseudo-4-op notes, naming the
    /// second chip channel that must be kept in frequency lock-step.
    fn note_on(&mut self, voice: usize, pair_slave_voice: Option<usize>, freq_hz: f64);
    fn note_off(&mut self, voice: usize);
    /// Recomputes OPL total level from the four inputs; the allocator only
    /// conveys them, it never computes a final attenuation itself.
    fn touch_note(&mut self, voice: usize, velocity: Velocity, channel_volume: ControlValue, expression: ControlValue, brightness: ControlValue);
    fn set_pan(&mut self, voice: usize, midi_pan: ControlValue);
    fn write_register(&mut self, chip: u8, register: u8, value: u8);
    fn reset(&mut self, sample_rate: u32);
    fn channel_category(&self, voice: usize) -> VoiceCategory;
    fn num_channels(&self) -> usize;
    fn num_chips(&self) -> u8;
    fn rhythm_mode(&self) -> bool;
}
