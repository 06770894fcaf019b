//! The voice allocator and note engine: turns MIDI channel
//! events into physical OPL3 voice assignments, goodness-scored voice
//! stealing, pitch/vibrato/portamento/arpeggio per-tick updates, and
//! instrument bank lookup with its two fallback levels.

pub(crate) mod active_note;
pub(crate) mod allocator;
pub(crate) mod channel_state;
pub(crate) mod physical_voice;
pub(crate) mod pitch;
pub(crate) mod synth_interface;

pub(crate) use allocator::VoiceAllocator;
pub use pitch::VolumeModel;
pub use synth_interface::{Opl3Interface, OperatorPatch, VoiceCategory};

use std::collections::HashMap;

/// One OPL3 patch as the allocator knows it: register data plus the
/// bookkeeping fields the goodness score and pitch engine need. Hosts
/// build these from whatever bank format (WOPL, GENMIDI, ...) they load.
#[derive(Clone, Debug)]
pub struct Instrument {
    pub patch: OperatorPatch,
    /// Set for 4-op and pseudo-4-op instruments, which occupy the paired
    /// voice at `c+3` alongside their master half.
    pub slave_patch: Option<OperatorPatch>,
    pub finetune_semitones: f64,
    pub velocity_offset: i16,
    pub rhythm_category: Option<VoiceCategory>,
    /// Percussion patches that always sound a fixed key regardless of the
    /// NoteOn's own key (GM drum kit convention).
    pub fixed_note: Option<u8>,
    pub fixed_sustain: bool,
}

impl Instrument {
    pub(crate) fn is_four_op(&self) -> bool {
        self.slave_patch.is_some()
    }
}

/// Resolves `(bank_msb, bank_lsb, program)` to an [`Instrument`], falling
/// back first by dropping the LSB, then by dropping the bank entirely.
/// Percussion notes key on note number instead of program, under a
/// reserved `bank_msb` of 128.
#[derive(Default)]
pub struct InstrumentBank {
    patches: HashMap<(u8, u8, u8), Instrument>,
}

/// `bank_msb` value reserved for the percussion key space, never a real
/// General MIDI bank select value.
pub const PERCUSSION_BANK: u8 = 128;

impl InstrumentBank {
    pub fn insert(&mut self, bank_msb: u8, bank_lsb: u8, program: u8, instrument: Instrument) {
        self.patches.insert((bank_msb, bank_lsb, program), instrument);
    }

    pub fn insert_percussion(&mut self, note: u8, instrument: Instrument) {
        self.patches.insert((PERCUSSION_BANK, 0, note), instrument);
    }

    pub(crate) fn lookup(&self, bank_msb: u8, bank_lsb: u8, program: u8) -> Option<&Instrument> {
        self.patches
            .get(&(bank_msb, bank_lsb, program))
            .or_else(|| self.patches.get(&(bank_msb, 0, program)))
            .or_else(|| self.patches.get(&(0, 0, program)))
    }

    pub(crate) fn lookup_percussion(&self, note: u8) -> Option<&Instrument> {
        self.patches.get(&(PERCUSSION_BANK, 0, note))
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Inserts only if the slot is unoccupied; used to layer a file's own
    /// embedded instruments underneath an explicitly supplied bank.
    pub(crate) fn insert_if_absent(&mut self, bank_msb: u8, bank_lsb: u8, program: u8, instrument: Instrument) {
        self.patches.entry((bank_msb, bank_lsb, program)).or_insert(instrument);
    }

    pub(crate) fn into_entries(self) -> impl Iterator<Item = ((u8, u8, u8), Instrument)> {
        self.patches.into_iter()
    }
}
