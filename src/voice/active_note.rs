//! A sounding MIDI note as the voice allocator tracks it, as distinct from
//! the physical chip voices it occupies.

use crate::core::numbers::{NoteNumber, Velocity};

/// Which physical voice(s) currently sound this note. Two-op instruments
/// use one slot; 4-op and pseudo-4-op instruments occupy a pair.
pub(crate) type PhysVoiceRef = Option<usize>;

#[derive(Clone, Debug)]
pub(crate) struct ActiveNote {
    pub(crate) note: NoteNumber,
    pub(crate) velocity: Velocity,
    pub(crate) vibrato_active: bool,
    /// The note this voice is gliding toward, in fractional semitones.
    pub(crate) note_tone: f64,
    /// The note this voice is currently sounding, in fractional semitones;
    /// equals `note_tone` except mid-portamento-glide.
    pub(crate) current_tone: f64,
    /// Portamento glide rate in semitones/second; `0.0` means no glide.
    pub(crate) glide_rate: f64,
    /// Index into the instrument bank this note was triggered with.
    pub(crate) instrument: u16,
    pub(crate) is_percussion: bool,
    /// Static per-instrument detune, folded into the pitch every tick.
    pub(crate) finetune_semitones: f64,
    /// True for a note awaiting full teardown after its voices were
    /// stolen; kept around only so duplicate NoteOffs don't panic.
    pub(crate) is_blank: bool,
    pub(crate) is_on_extended_lifetime: bool,
    /// Remaining minimum-sounding time in seconds (drums: 30ms floor).
    pub(crate) ttl_s: f64,
    pub(crate) phys: [PhysVoiceRef; 2],
}

impl ActiveNote {
    pub(crate) fn new(note: NoteNumber, velocity: Velocity, instrument: u16, is_percussion: bool) -> Self {
        let tone = note.get() as f64;
        Self {
            note,
            velocity,
            vibrato_active: false,
            note_tone: tone,
            current_tone: tone,
            glide_rate: 0.0,
            instrument,
            is_percussion,
            finetune_semitones: 0.0,
            is_blank: false,
            is_on_extended_lifetime: false,
            ttl_s: 0.0,
            phys: [None, None],
        }
    }

    pub(crate) fn occupies(&self, voice: usize) -> bool {
        self.phys[0] == Some(voice) || self.phys[1] == Some(voice)
    }
}
