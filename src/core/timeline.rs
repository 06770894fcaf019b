//! The flat per-track event bank, and `build_timeline`: the shared
//! post-parse pass every format parser in [`crate::formats`] funnels
//! through once all of its rows and tempo events exist.

use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::row::Row;
use crate::core::tempo::{TempoEvent, TempoTrack};
use crate::core::track::Track;
use log::{debug, trace};

/// Append-only flat event storage for one track. Rows address into this by
/// `[begin, end)` index range; indices stay valid across row-local sorting
/// because sorting only ever permutes within one row's own sub-slice.
#[derive(Default)]
pub(crate) struct EventBank {
    events: Vec<Event>,
}

impl EventBank {
    pub(crate) fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Appends `event` to the bank and widens `row`'s range to include it.
    /// Events for a row must be appended contiguously (no interleaving
    /// between rows), which every parser naturally satisfies by finishing
    /// one row before opening the next.
    pub(crate) fn append_event(&mut self, row: &mut Row, event: Event) {
        self.events.push(event);
        row.events_end = self.events.len() as u32;
    }

    pub(crate) fn events_for(&self, row: &Row) -> &[Event] {
        &self.events[row.events_begin as usize..row.events_end as usize]
    }

    pub(crate) fn events_for_mut(&mut self, row: &Row) -> &mut [Event] {
        &mut self.events[row.events_begin as usize..row.events_end as usize]
    }

    /// Sorts the row's event slice and applies the zero-length-note
    /// fix-up, threading the track's persistent sounding set through.
    pub(crate) fn finish_row(&mut self, row: &Row, sounding: &mut crate::core::row::NoteSoundingSet) {
        let start = row.events_begin as usize;
        let end = row.events_end as usize;
        let mut slice: Vec<Event> = self.events[start..end].to_vec();
        crate::core::row::sort_row(&mut slice, sounding);
        self.events[start..end].clone_from_slice(&slice);
    }
}

/// The byte offset/post-song tail the original source pads onto every
/// song's computed length, so a player doesn't cut off a decaying release.
pub(crate) const POST_SONG_TAIL_SECONDS: f64 = 1.0;

/// Result of walking the whole timeline once tempo is known.
pub(crate) struct TimelineSummary {
    pub(crate) song_length_seconds: f64,
    /// Absolute tick of the first `loop_start`/`loopstack_begin` event
    /// found, across every track, in track order. `None` if the song has
    /// no loop markers at all.
    pub(crate) global_loop_begin_tick: Option<u64>,
}

/// Walks every track's rows in order, assigning `row.time`/`row.time_delay`
/// from the tempo map, subdividing each inter-row gap at any tempo change
/// that falls inside it.
pub(crate) fn build_timeline(
    tracks: &mut [Track],
    banks: &[EventBank],
    division: u16,
    tempo_events: &[TempoEvent],
) -> TimelineSummary {
    let mut sorted_tempo = tempo_events.to_vec();
    sorted_tempo.sort_by_key(|t| t.absolute_tick);

    let mut song_length_seconds = 0.0f64;

    for (track_index, track) in tracks.iter_mut().enumerate() {
        let bank = &banks[track_index];
        let mut tempo_track = TempoTrack::new(division);
        let mut tempo_cursor = 0usize;
        let mut prev_tick = 0u64;

        for i in 0..track.rows.len() {
            let this_tick = track.rows[i].absolute_tick;

            // Apply every tempo change at or before this row's tick that we
            // have not yet consumed, before computing the gap leading up to
            // (not including) this row.
            let mut remaining_gap = this_tick.saturating_sub(prev_tick);
            let mut segment_start = prev_tick;
            let mut delay_seconds = 0.0f64;

            while tempo_cursor < sorted_tempo.len()
                && sorted_tempo[tempo_cursor].absolute_tick > segment_start
                && sorted_tempo[tempo_cursor].absolute_tick < this_tick
            {
                let change = sorted_tempo[tempo_cursor];
                let segment_len = change.absolute_tick - segment_start;
                delay_seconds += tempo_track.current().ticks_to_seconds(segment_len);
                tempo_track.set_tempo(change.microseconds_per_quarter);
                segment_start = change.absolute_tick;
                remaining_gap = this_tick - segment_start;
                tempo_cursor += 1;
            }
            delay_seconds += tempo_track.current().ticks_to_seconds(remaining_gap);

            if i > 0 {
                track.rows[i - 1].time_delay = delay_seconds;
                track.rows[i].time = track.rows[i - 1].time + track.rows[i - 1].time_delay;
            } else {
                track.rows[i].time = 0.0;
            }

            // Apply any tempo-change events carried directly in this row so
            // the *next* row's segment starts from the right tempo, and
            // advance past tempo events exactly at this tick.
            for event in bank.events_for(&track.rows[i]) {
                if let EventKind::Meta(MetaKind::SetTempo {
                    microseconds_per_quarter,
                }) = event.kind
                {
                    tempo_track.set_tempo(microseconds_per_quarter);
                }
            }
            while tempo_cursor < sorted_tempo.len()
                && sorted_tempo[tempo_cursor].absolute_tick == this_tick
            {
                tempo_cursor += 1;
            }

            prev_tick = this_tick;
        }

        if let Some(last) = track.rows.last_mut() {
            last.time_delay = POST_SONG_TAIL_SECONDS;
            let end = last.time + last.time_delay;
            if end > song_length_seconds {
                song_length_seconds = end;
            }
        }
    }

    let mut global_loop_begin_tick = None;
    'outer: for (track_index, track) in tracks.iter().enumerate() {
        let bank = &banks[track_index];
        for row in track.rows.iter() {
            for event in bank.events_for(row) {
                let is_loop_begin = matches!(
                    event.kind,
                    EventKind::Meta(MetaKind::LoopStart)
                        | EventKind::Meta(MetaKind::LoopStackBegin { .. })
                );
                if is_loop_begin {
                    global_loop_begin_tick = Some(row.absolute_tick);
                    trace!("global loop begin located at tick {}", row.absolute_tick);
                    break 'outer;
                }
            }
        }
    }

    if global_loop_begin_tick.is_none() {
        debug!("no loop markers found while building timeline");
    }

    TimelineSummary {
        song_length_seconds,
        global_loop_begin_tick,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::numbers::{MidiChannel, NoteNumber, Velocity};

    #[test]
    fn two_row_song_at_default_tempo() {
        let mut bank = EventBank::new();
        let mut row0 = Row::new(0, 0);
        bank.append_event(
            &mut row0,
            Event::new(EventKind::NoteOn {
                channel: MidiChannel::new(0),
                note: NoteNumber::new(60),
                velocity: Velocity::new(100),
            }),
        );
        let mut row1 = Row::new(96, row0.events_end);
        bank.append_event(&mut row1, Event::new(EventKind::Meta(MetaKind::EndOfTrack)));

        let mut track = Track::new(true);
        track.rows.push(row0);
        track.rows.push(row1);

        let summary = build_timeline(std::slice::from_mut(&mut track), &[bank], 96, &[]);
        assert!((track.rows[0].time_delay - 0.5).abs() < 1e-9);
        assert!((summary.song_length_seconds - (0.5 + POST_SONG_TAIL_SECONDS)).abs() < 1e-9);
    }
}
