//! Per-row sort discipline. Each [`Row`] groups every event sharing one
//! absolute tick within one track; [`sort_row`] puts them into the
//! dispatch order the realtime interface must observe, then applies the
//! zero-length-note fix-up: its interaction with arpeggio allocation is a
//! known wart, kept as-is rather than redesigned.

use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::numbers::{MidiChannel, NoteNumber};

/// Absolute start tick, inter-row delay, and the half-open event range this
/// row owns within its track's flat event vector.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Row {
    pub(crate) absolute_tick: u64,
    /// Seconds until the next row begins; filled in by `build_timeline`.
    pub(crate) time_delay: f64,
    /// Absolute start time in seconds; filled in by `build_timeline`.
    pub(crate) time: f64,
    pub(crate) events_begin: u32,
    pub(crate) events_end: u32,
}

impl Row {
    pub(crate) fn new(absolute_tick: u64, events_begin: u32) -> Self {
        Self {
            absolute_tick,
            time_delay: 0.0,
            time: 0.0,
            events_begin,
            events_end: events_begin,
        }
    }

    pub(crate) fn len(&self) -> usize {
        (self.events_end - self.events_begin) as usize
    }
}

/// Tracks which `(channel, key)` pairs are currently sounding, in the
/// order a single track's rows are finalised. One instance is owned by the
/// per-track parse loop walking its own rows in tick order, rather than
/// shared globally across tracks.
pub(crate) struct NoteSoundingSet {
    bits: Box<[bool; 16 * 128]>,
}

impl NoteSoundingSet {
    pub(crate) fn new() -> Self {
        Self {
            bits: Box::new([false; 16 * 128]),
        }
    }

    fn index(channel: MidiChannel, note: NoteNumber) -> usize {
        (channel.get() as usize) * 128 + note.get() as usize
    }

    pub(crate) fn is_sounding(&self, channel: MidiChannel, note: NoteNumber) -> bool {
        self.bits[Self::index(channel, note)]
    }

    pub(crate) fn set_sounding(&mut self, channel: MidiChannel, note: NoteNumber, sounding: bool) {
        self.bits[Self::index(channel, note)] = sounding;
    }

    /// Applies the on/off effect of one event, in dispatch order, to the
    /// sounding set. Call once per event, in the row's final emitted order.
    pub(crate) fn apply(&mut self, event: &Event) {
        match event.kind {
            EventKind::NoteOn { channel, note, velocity } if velocity.get() > 0 => {
                self.set_sounding(channel, note, true)
            }
            EventKind::NoteOn { channel, note, .. } => self.set_sounding(channel, note, false),
            EventKind::NoteOnDurated { channel, note, .. } => self.set_sounding(channel, note, true),
            EventKind::NoteOff { channel, note, .. } => self.set_sounding(channel, note, false),
            _ => {}
        }
    }
}

fn priority(event: &Event) -> i8 {
    match event.kind {
        EventKind::SysEx { .. } => 0,
        EventKind::NoteOff { .. } => 1,
        EventKind::Meta(MetaKind::SongBeginHook) => -1,
        EventKind::Meta(MetaKind::EndOfTrack) => 20,
        EventKind::Meta(_) => 2,
        EventKind::Aftertouch { .. }
        | EventKind::CtrlChange { .. }
        | EventKind::PatchChange { .. }
        | EventKind::ChannelPressure { .. }
        | EventKind::PitchBend { .. } => 3,
        EventKind::NoteOn { .. } | EventKind::NoteOnDurated { .. } => 4,
    }
}

/// Sorts `events` (one row's worth) by the priority table, stably, then
/// applies the zero-length-note fix-up using `entry_sounding`, the set of
/// notes that were already on *before* this row ran. `entry_sounding` is
/// updated in place to reflect the row's net effect, ready for the next row.
pub(crate) fn sort_row(events: &mut Vec<Event>, entry_sounding: &mut NoteSoundingSet) {
    // Stable insertion sort on priority; row sizes are tiny (a handful of
    // simultaneous events), so this is both simple and fast enough.
    for i in 1..events.len() {
        let mut j = i;
        while j > 0 && priority(&events[j - 1]) > priority(&events[j]) {
            events.swap(j - 1, j);
            j -= 1;
        }
    }

    // Zero-length-note fix-up: a NoteOff that would silence a note already
    // sounding at row entry, when this row also carries a NoteOn for the
    // same (channel, key), is pushed past every other event in the row.
    let mut push_to_end: Vec<usize> = Vec::new();
    for (i, event) in events.iter().enumerate() {
        if let EventKind::NoteOff { channel, note, .. } = event.kind {
            if entry_sounding.is_sounding(channel, note) {
                let retriggered = events.iter().any(|other| {
                    matches!(other.kind, EventKind::NoteOn { channel: c, note: n, .. } if c == channel && n == note)
                });
                if retriggered {
                    push_to_end.push(i);
                }
            }
        }
    }
    for &i in push_to_end.iter().rev() {
        let e = events.remove(i);
        events.push(e);
    }

    for event in events.iter() {
        entry_sounding.apply(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::numbers::Velocity;

    fn chan(n: u8) -> MidiChannel {
        MidiChannel::new(n)
    }
    fn note(n: u8) -> NoteNumber {
        NoteNumber::new(n)
    }

    #[test]
    fn priority_orders_note_off_before_note_on() {
        let mut events = vec![
            Event::new(EventKind::NoteOn {
                channel: chan(0),
                note: note(60),
                velocity: Velocity::new(100),
            }),
            Event::new(EventKind::NoteOff {
                channel: chan(0),
                note: note(61),
                velocity: Velocity::new(0),
            }),
        ];
        let mut sounding = NoteSoundingSet::new();
        sort_row(&mut events, &mut sounding);
        assert!(events[0].is_note_off());
        assert!(events[1].is_note_on());
    }

    #[test]
    fn zero_length_note_fixup_pushes_off_to_end() {
        let mut sounding = NoteSoundingSet::new();
        sounding.set_sounding(chan(0), note(60), true);

        let mut events = vec![
            Event::new(EventKind::NoteOff {
                channel: chan(0),
                note: note(60),
                velocity: Velocity::new(0),
            }),
            Event::new(EventKind::NoteOn {
                channel: chan(0),
                note: note(60),
                velocity: Velocity::new(100),
            }),
        ];
        sort_row(&mut events, &mut sounding);
        assert!(events.last().unwrap().is_note_off());
    }
}
