//! A physical OPL3 chip channel and the MIDI notes currently sharing it.
//! Several notes can share one voice temporarily under arpeggio; `users`
//! records all of them.

use crate::core::numbers::MidiChannel;

/// One MIDI note's claim on a physical voice it shares with others.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LocationData {
    pub(crate) channel: MidiChannel,
    pub(crate) note: u8,
    /// Bit 0 = sustain pedal, bit 1 = sostenuto; nonzero keeps the user
    /// alive past its own NoteOff until the owning pedal releases.
    pub(crate) sustain_bits: u8,
    pub(crate) instrument: u16,
    pub(crate) is_percussion: bool,
    pub(crate) fixed_sustain: bool,
    /// False once the physical key has been released; a pedal (tracked via
    /// `sustain_bits`) is the only thing still keeping the note alive.
    pub(crate) key_down: bool,
    /// Microseconds of "on" budget before arpeggio/ageing may steal this
    /// user; decremented by `add_age` unless `fixed_sustain`.
    pub(crate) kon_budget_us: i64,
    /// Microseconds elapsed since note-on; vibrato activates once this
    /// passes the owning channel's `vibrato_delay_us`.
    pub(crate) vibdelay_us: u32,
}

pub(crate) const SUSTAIN_BIT: u8 = 0b01;
pub(crate) const SOSTENUTO_BIT: u8 = 0b10;

/// Up to this many notes may share one physical voice via arpeggio before
/// the allocator refuses to add another.
pub(crate) const MAX_USERS_PER_VOICE: usize = 6;

#[derive(Clone, Debug, Default)]
pub(crate) struct PhysicalVoice {
    /// Microseconds remaining before a fully released (empty) voice is
    /// considered completely cold; decays toward zero via `add_age`.
    pub(crate) koff_release_budget_us: i64,
    pub(crate) recent_instrument: Option<u16>,
    pub(crate) users: Vec<LocationData>,
}

impl PhysicalVoice {
    pub(crate) fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub(crate) fn find_user(&self, channel: MidiChannel, note: u8) -> Option<usize> {
        self.users.iter().position(|u| u.channel == channel && u.note == note)
    }
}
