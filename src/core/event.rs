//! The normalised event model every format parser in [`crate::formats`]
//! converges on: a single tagged enum rather than per-kind structs behind a
//! trait object, since the set of event kinds is closed and small.
//!
//! Variable-length payloads (SysEx bytes, text) are kept out of line in a
//! [`crate::core::bank::ByteBank`] and referenced by [`BankRef`] rather than
//! owned inline, so that `Event` stays small and `Copy`-free but cheap to
//! move around during row sorting.

use crate::core::bank::BankRef;
use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};

/// A controller number treated as a restore-on-loop class. HMI's CC
/// 103..119 toggle whether a given controller's last value is reapplied
/// after a loop or branch jump; other formats default the whole mask on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ControllerClass(pub(crate) u8);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MetaKind {
    Text(BankRef),
    Copyright(BankRef),
    TrackName(BankRef),
    InstrumentName(BankRef),
    Lyric(BankRef),
    Marker(BankRef),
    CuePoint(BankRef),
    SetTempo { microseconds_per_quarter: u32 },
    EndOfTrack,

    /// Injected at tick 0 of track 0 only; drives `RealtimeInterface::song_start`.
    SongBeginHook,
    /// Forwards a single byte plus the originating track index to the host.
    CallbackTrigger { payload: u8 },
    /// Switches the device-channel-offset multiplexing for subsequent events.
    DeviceSwitch { device: u8 },
    /// A format-specific literal OPL register poke (IMF/KLM).
    RawOplPoke { register: u8, value: u8 },

    LoopStart,
    LoopEnd,
    LoopStackBegin {
        id: Option<u8>,
        count: u8,
        track_local: bool,
    },
    LoopStackEnd {
        id: Option<u8>,
        track_local: bool,
    },
    LoopStackBreak {
        id: Option<u8>,
        track_local: bool,
    },
    BranchLocation {
        id: u8,
    },
    BranchTo {
        id: u8,
    },
    RestoreOnLoopEnable(ControllerClass),
    RestoreOnLoopDisable(ControllerClass),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum EventKind {
    NoteOff {
        channel: MidiChannel,
        note: NoteNumber,
        velocity: Velocity,
    },
    NoteOn {
        channel: MidiChannel,
        note: NoteNumber,
        velocity: Velocity,
    },
    /// XMI's timed note-on: the matching NoteOff is synthesised by the
    /// per-track timed-note cache rather than appearing on the wire.
    NoteOnDurated {
        channel: MidiChannel,
        note: NoteNumber,
        velocity: Velocity,
        duration_ticks: u32,
    },
    Aftertouch {
        channel: MidiChannel,
        note: NoteNumber,
        value: ControlValue,
    },
    CtrlChange {
        channel: MidiChannel,
        controller: u8,
        value: ControlValue,
    },
    PatchChange {
        channel: MidiChannel,
        program: Program,
    },
    ChannelPressure {
        channel: MidiChannel,
        value: ControlValue,
    },
    PitchBend {
        channel: MidiChannel,
        value: PitchBend14,
    },
    SysEx {
        data: BankRef,
    },
    Meta(MetaKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Event {
    pub(crate) kind: EventKind,
}

impl Event {
    pub(crate) fn new(kind: EventKind) -> Self {
        Self { kind }
    }

    pub(crate) fn note_key(&self) -> Option<(MidiChannel, NoteNumber)> {
        match self.kind {
            EventKind::NoteOn { channel, note, .. } => Some((channel, note)),
            EventKind::NoteOff { channel, note, .. } => Some((channel, note)),
            EventKind::NoteOnDurated { channel, note, .. } => Some((channel, note)),
            _ => None,
        }
    }

    pub(crate) fn is_end_of_track(&self) -> bool {
        matches!(self.kind, EventKind::Meta(MetaKind::EndOfTrack))
    }

    pub(crate) fn is_note_on(&self) -> bool {
        matches!(
            self.kind,
            EventKind::NoteOn { .. } | EventKind::NoteOnDurated { .. }
        )
    }

    pub(crate) fn is_note_off(&self) -> bool {
        matches!(self.kind, EventKind::NoteOff { .. })
    }
}
