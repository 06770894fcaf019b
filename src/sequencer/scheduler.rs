//! The deadline-driven scheduler. Owns every track's rows and cursor, the
//! global and per-track loop stacks, and the branch table; `tick` is the
//! only entry point a host calls once per audio buffer (or wall-clock
//! frame) to drive a [`RealtimeInterface`], sharing its loop/branch
//! bookkeeping with [`crate::sequencer::loop_state`].

use crate::core::bank::ByteBank;
use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::tempo::TempoTrack;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::sequencer::interface::RealtimeInterface;
use crate::sequencer::loop_state::{LoopState, PositionSnapshot, SimpleLoop, TrackCursor};
use log::{debug, warn};
use std::collections::HashMap;

/// Hard cap on `process_events` calls within one `tick`, guarding against a
/// zero-advance loop that would otherwise spin forever.
const ANTI_FREEZE_ITERATIONS: u32 = 10_000;
/// Extra wait injected when the anti-freeze cap trips, and again after the
/// song's very last row so a decaying release isn't cut short.
pub(crate) const POST_SONG_WAIT_SECONDS: f64 = 1.0;

/// Scans every track's rows once at load time and records each
/// `BranchLocation(id)` marker's row index, keyed by `(track_index, id)`,
/// so `BranchTo(id)` resolves no matter whether its target lies earlier or
/// later in the track than the marker that jumps to it.
fn build_branch_table(tracks: &[Track], banks: &[EventBank]) -> HashMap<(usize, u8), usize> {
    let mut table = HashMap::new();
    for (track_index, track) in tracks.iter().enumerate() {
        for (row_index, row) in track.rows.iter().enumerate() {
            for event in banks[track_index].events_for(row) {
                if let EventKind::Meta(MetaKind::BranchLocation { id }) = event.kind {
                    table.insert((track_index, id), row_index);
                }
            }
        }
    }
    table
}

struct TrackCursorLive {
    row_index: usize,
    delay_ticks: u64,
    terminal: bool,
    last_status: u8,
}

impl TrackCursorLive {
    fn new() -> Self {
        Self {
            row_index: 0,
            delay_ticks: 0,
            terminal: false,
            last_status: 0,
        }
    }
}

/// Walks a loaded score's rows in tick order and drives a realtime
/// interface. One instance owns exactly one loaded song; `Player` composes
/// this with the voice allocator.
pub(crate) struct Sequencer {
    tracks: Vec<Track>,
    banks: Vec<EventBank>,
    text_bank: ByteBank,
    tempo: TempoTrack,
    cursors: Vec<TrackCursorLive>,
    global_loop: LoopState,
    simple_loop: SimpleLoop,
    loop_begin_snapshot: Option<PositionSnapshot>,
    pending_global_jump: Option<PositionSnapshot>,
    branch_table: HashMap<(usize, u8), usize>,
    absolute_tick: u64,
    absolute_time_s: f64,
    wait_s: f64,
    at_end: bool,
    loop_enabled: bool,
    loop_infinite: bool,
    loops_left: u32,
    /// Set after a seek lands past the global loop end, so the song does
    /// not immediately re-trigger the loop it just skipped over.
    temporary_broken: bool,
    pub(crate) tempo_multiplier: f64,
}

impl Sequencer {
    /// `loop_count == 0` means infinite, matching `PlayerConfig::loop_count`.
    /// Takes the pieces of a [`ParsedScore`] it actually owns rather than
    /// the whole struct, so `Player` can keep the metadata and embedded
    /// instrument bank for itself.
    pub(crate) fn new(
        division: u16,
        tracks: Vec<Track>,
        banks: Vec<EventBank>,
        text_bank: ByteBank,
        loop_points: SimpleLoop,
        loop_enabled: bool,
        loop_count: u32,
    ) -> Self {
        let cursors = tracks.iter().map(|_| TrackCursorLive::new()).collect();
        let branch_table = build_branch_table(&tracks, &banks);
        Self {
            tracks,
            banks,
            text_bank,
            tempo: TempoTrack::new(division),
            cursors,
            global_loop: LoopState::new(),
            simple_loop: loop_points,
            loop_begin_snapshot: None,
            pending_global_jump: None,
            branch_table,
            absolute_tick: 0,
            absolute_time_s: 0.0,
            wait_s: 0.0,
            at_end: false,
            loop_enabled,
            loop_infinite: loop_count == 0,
            loops_left: loop_count,
            temporary_broken: false,
            tempo_multiplier: 1.0,
        }
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.at_end
    }

    pub(crate) fn absolute_time_seconds(&self) -> f64 {
        self.absolute_time_s
    }

    /// Deadline scheduler entry point. Returns the number of seconds the
    /// caller may safely sleep (or render PCM) before calling again.
    pub(crate) fn tick(
        &mut self,
        elapsed_seconds: f64,
        granularity_seconds: f64,
        interface: &mut impl RealtimeInterface,
    ) -> f64 {
        self.wait_s -= elapsed_seconds * self.tempo_multiplier;
        self.absolute_time_s += elapsed_seconds * self.tempo_multiplier;
        if self.wait_s < 0.0 {
            self.wait_s = 0.0;
        }

        let mut iterations = 0u32;
        while self.wait_s <= granularity_seconds * 0.5 && !self.at_end {
            self.process_events(false, interface);
            iterations += 1;
            if iterations >= ANTI_FREEZE_ITERATIONS {
                warn!("sequencer anti-freeze cap reached, injecting {}s of wait", POST_SONG_WAIT_SECONDS);
                self.wait_s += POST_SONG_WAIT_SECONDS;
                break;
            }
        }
        self.wait_s.max(0.0)
    }

    /// Rewinds to the very start of the song, clearing all cursor and loop
    /// state, in preparation for a [`Sequencer::seek`].
    fn rewind(&mut self) {
        for cursor in self.cursors.iter_mut() {
            *cursor = TrackCursorLive::new();
        }
        for track in self.tracks.iter_mut() {
            track.loop_state = LoopState::new();
            track.timed_notes.clear();
        }
        self.global_loop = LoopState::new();
        self.loop_begin_snapshot = None;
        self.pending_global_jump = None;
        self.absolute_tick = 0;
        self.absolute_time_s = 0.0;
        self.wait_s = 0.0;
        self.at_end = false;
        self.temporary_broken = false;
    }

    /// Rewinds and replays with loop jumps disabled and NoteOns suppressed
    /// until `target_seconds` of song time has played.
    pub(crate) fn seek(&mut self, target_seconds: f64, interface: &mut impl RealtimeInterface) {
        let loop_was_enabled = self.loop_enabled;
        self.loop_enabled = false;
        self.rewind();

        let mut iterations = 0u32;
        let mut stalled_iterations = 0u32;
        while self.absolute_time_s < target_seconds && !self.at_end {
            self.wait_s = 0.0;
            let advanced = self.process_events(true, interface);
            self.absolute_time_s += advanced;
            iterations += 1;
            if advanced == 0.0 {
                stalled_iterations += 1;
            } else {
                stalled_iterations = 0;
            }
            if iterations >= ANTI_FREEZE_ITERATIONS || stalled_iterations >= ANTI_FREEZE_ITERATIONS {
                warn!("seek toward {}s gave up after {} iterations", target_seconds, iterations);
                break;
            }
        }

        if let Some(loop_end) = self.simple_loop.end_tick {
            if self.absolute_tick > loop_end {
                self.temporary_broken = true;
            }
        }
        self.loop_enabled = loop_was_enabled;
    }

    /// Runs one pass of the row-advance algorithm: expire timed notes,
    /// dispatch due events, resolve loop/branch jumps, then compute the wait
    /// until the next row. Returns the number of song-seconds this call
    /// advanced, or `0.0` if it instead performed a loop/branch jump or hit
    /// song end.
    fn process_events(&mut self, is_seek: bool, interface: &mut impl RealtimeInterface) -> f64 {
        // Step 1: expire timed (XMI durated) notes.
        for track in self.tracks.iter_mut() {
            for (channel, note, velocity) in track.timed_notes.drain_expired() {
                interface.note_off(channel, note, velocity);
            }
        }

        // Step 2/3: dispatch every track whose delay has reached zero.
        let track_count = self.tracks.len();
        for track_index in 0..track_count {
            if self.cursors[track_index].terminal || self.cursors[track_index].delay_ticks > 0 {
                continue;
            }
            if self.cursors[track_index].row_index >= self.tracks[track_index].rows.len() {
                self.cursors[track_index].terminal = true;
                continue;
            }

            let row_index = self.cursors[track_index].row_index;
            let row = self.tracks[track_index].rows[row_index];
            let events: Vec<Event> = self.banks[track_index].events_for(&row).to_vec();
            for event in events {
                self.handle_event(track_index, event, is_seek, interface);
            }

            let next_index = row_index + 1;
            self.cursors[track_index].row_index = next_index;
            if next_index < self.tracks[track_index].rows.len() {
                let delta = self.tracks[track_index].rows[next_index]
                    .absolute_tick
                    .saturating_sub(row.absolute_tick);
                self.cursors[track_index].delay_ticks = delta;
            }
        }

        // Step 4: a loop/branch jump requested during dispatch wins
        // immediately, without advancing time this call.
        if let Some(snapshot) = self.pending_global_jump.take() {
            self.apply_global_snapshot(&snapshot, interface);
            return 0.0;
        }

        let all_terminal = self.cursors.iter().all(|c| c.terminal);
        if all_terminal {
            // Step 6: either loop back to the start, or end the song.
            if self.loop_enabled && !self.temporary_broken && (self.loop_infinite || self.loops_left > 0) {
                if let Some(snapshot) = self.loop_begin_snapshot.clone() {
                    if !self.loop_infinite {
                        self.loops_left -= 1;
                    }
                    interface.loop_start();
                    self.apply_global_snapshot(&snapshot, interface);
                    return 0.0;
                }
            }
            self.at_end = true;
            self.wait_s += POST_SONG_WAIT_SECONDS;
            return 0.0;
        }

        // Step 5: advance every track's delay, and the global clock, by
        // the shortest wait across every live track cursor and timed note.
        let mut shortest: Option<u64> = None;
        for cursor in self.cursors.iter() {
            if !cursor.terminal {
                shortest = Some(shortest.map_or(cursor.delay_ticks, |s| s.min(cursor.delay_ticks)));
            }
        }
        for track in self.tracks.iter() {
            if let Some(min_ttl) = track.timed_notes.min_ttl_ticks() {
                let ttl = min_ttl.max(0) as u64;
                shortest = Some(shortest.map_or(ttl, |s| s.min(ttl)));
            }
        }
        let delay_ticks = shortest.unwrap_or(0);

        for cursor in self.cursors.iter_mut() {
            if !cursor.terminal {
                cursor.delay_ticks = cursor.delay_ticks.saturating_sub(delay_ticks);
            }
        }
        for track in self.tracks.iter_mut() {
            track.timed_notes.tick(delay_ticks);
        }
        self.absolute_tick += delay_ticks;
        let seconds = self.tempo.current().ticks_to_seconds(delay_ticks);
        self.wait_s += seconds;
        seconds
    }

    fn handle_event(&mut self, track_index: usize, event: Event, is_seek: bool, interface: &mut impl RealtimeInterface) {
        match event.kind {
            EventKind::NoteOn { channel, note, velocity } => {
                if !is_seek {
                    if velocity.get() == 0 {
                        interface.note_off(channel, note, velocity);
                    } else {
                        interface.note_on(channel, note, velocity);
                    }
                }
            }
            EventKind::NoteOnDurated { channel, note, velocity, duration_ticks } => {
                if !is_seek {
                    interface.note_on(channel, note, velocity);
                }
                if !self.tracks[track_index].timed_notes.alloc(channel, note, velocity, duration_ticks) {
                    interface.debug_message("timed-note cache exhausted, duration will not be honoured");
                }
            }
            EventKind::NoteOff { channel, note, velocity } => {
                interface.note_off(channel, note, velocity);
            }
            EventKind::Aftertouch { channel, note, value } => {
                self.tracks[track_index].saved_state.set_note_aftertouch(channel, note, value.get());
                interface.note_aftertouch(channel, note, value);
            }
            EventKind::ChannelPressure { channel, value } => {
                self.tracks[track_index].saved_state.set_channel_pressure(channel, value);
                interface.channel_aftertouch(channel, value);
            }
            EventKind::CtrlChange { channel, controller, value } => {
                self.tracks[track_index].saved_state.set_controller(channel, controller, value.get());
                interface.controller_change(channel, controller, value);
            }
            EventKind::PatchChange { channel, program } => {
                self.tracks[track_index].saved_state.set_patch(channel, program);
                interface.patch_change(channel, program);
            }
            EventKind::PitchBend { channel, value } => {
                self.tracks[track_index].saved_state.set_pitch_bend(channel, value);
                interface.pitch_bend(channel, value);
            }
            EventKind::SysEx { data } => {
                interface.system_exclusive(self.text_bank.get(data));
            }
            EventKind::Meta(meta) => self.handle_meta(track_index, meta, interface),
        }
        interface.event(track_index);
    }

    fn handle_meta(&mut self, track_index: usize, meta: MetaKind, interface: &mut impl RealtimeInterface) {
        match meta {
            MetaKind::SetTempo { microseconds_per_quarter } => {
                self.tempo.set_tempo(microseconds_per_quarter);
            }
            MetaKind::EndOfTrack => {
                self.cursors[track_index].terminal = true;
            }
            MetaKind::SongBeginHook => interface.song_start(),
            MetaKind::CallbackTrigger { payload } => interface.callback_trigger(track_index, payload),
            MetaKind::DeviceSwitch { device } => interface.device_switch(track_index, device),
            MetaKind::RawOplPoke { register, value } => interface.raw_opl(register, value),
            MetaKind::LoopStart => {
                if self.loop_begin_snapshot.is_none() {
                    self.loop_begin_snapshot = Some(self.capture_global_snapshot());
                }
                interface.loop_start();
            }
            MetaKind::LoopEnd => {
                if self.simple_loop.valid
                    && self.loop_enabled
                    && !self.temporary_broken
                    && (self.loop_infinite || self.loops_left > 0)
                {
                    if let Some(snapshot) = self.loop_begin_snapshot.clone() {
                        if !self.loop_infinite {
                            self.loops_left -= 1;
                        }
                        self.pending_global_jump = Some(snapshot);
                    }
                }
                interface.loop_end();
            }
            MetaKind::LoopStackBegin { id, count, track_local } => {
                let snapshot = if track_local {
                    self.capture_track_snapshot(track_index)
                } else {
                    self.capture_global_snapshot()
                };
                let pushed = if track_local {
                    self.tracks[track_index].loop_state.push(count as u32, id, snapshot)
                } else {
                    self.global_loop.push(count as u32, id, snapshot)
                };
                if !pushed {
                    debug!("loop stack at max depth on track {}, loop disabled", track_index);
                    interface.debug_message("loop stack depth exceeded, loop disabled");
                }
            }
            MetaKind::LoopStackEnd { id, track_local } => {
                let restored = if track_local {
                    self.tracks[track_index].loop_state.end(id)
                } else {
                    self.global_loop.end(id)
                };
                if let Some(snapshot) = restored {
                    if track_local {
                        self.apply_track_snapshot(track_index, &snapshot, interface);
                    } else {
                        self.pending_global_jump = Some(snapshot);
                    }
                }
            }
            MetaKind::LoopStackBreak { id, track_local } => {
                if track_local {
                    self.tracks[track_index].loop_state.break_loop(id);
                } else {
                    self.global_loop.break_loop(id);
                }
            }
            MetaKind::BranchLocation { .. } => {
                // Recorded once at load time by `build_branch_table`; nothing
                // to do when the playhead actually passes over the marker.
            }
            MetaKind::BranchTo { id } => {
                if let Some(&target_row) = self.branch_table.get(&(track_index, id)) {
                    self.cursors[track_index].row_index = target_row;
                    self.cursors[track_index].delay_ticks = 0;
                    self.restore_track_state(track_index, interface);
                } else {
                    debug!("track {} branch_to({}) has no matching branch_location", track_index, id);
                    interface.debug_message("branch target does not exist, jump ignored");
                }
            }
            MetaKind::RestoreOnLoopEnable(class) => {
                self.tracks[track_index].saved_state.set_restore(class.0, true);
            }
            MetaKind::RestoreOnLoopDisable(class) => {
                self.tracks[track_index].saved_state.set_restore(class.0, false);
            }
            MetaKind::Text(r) | MetaKind::Copyright(r) | MetaKind::TrackName(r) | MetaKind::InstrumentName(r)
            | MetaKind::Lyric(r) | MetaKind::Marker(r) | MetaKind::CuePoint(r) => {
                interface.meta_event(0xFF, self.text_bank.get(r));
            }
        }
    }

    fn capture_global_snapshot(&self) -> PositionSnapshot {
        let tracks = self
            .cursors
            .iter()
            .enumerate()
            .map(|(i, c)| TrackCursor {
                row_index: c.row_index,
                delay_ticks: c.delay_ticks,
                last_status: c.last_status,
                saved_state: self.tracks[i].saved_state.clone(),
            })
            .collect();
        PositionSnapshot {
            absolute_time_s: self.absolute_time_s,
            wait_s: self.wait_s,
            began: true,
            absolute_ticks: self.absolute_tick,
            tracks,
        }
    }

    fn capture_track_snapshot(&self, track_index: usize) -> PositionSnapshot {
        let cursor = &self.cursors[track_index];
        let absolute_ticks = self.tracks[track_index]
            .rows
            .get(cursor.row_index)
            .map(|row| row.absolute_tick)
            .unwrap_or(self.absolute_tick);
        PositionSnapshot {
            absolute_time_s: self.absolute_time_s,
            wait_s: self.wait_s,
            began: true,
            absolute_ticks,
            tracks: vec![TrackCursor {
                row_index: cursor.row_index,
                delay_ticks: cursor.delay_ticks,
                last_status: cursor.last_status,
                saved_state: self.tracks[track_index].saved_state.clone(),
            }],
        }
    }

    fn apply_global_snapshot(&mut self, snapshot: &PositionSnapshot, interface: &mut impl RealtimeInterface) {
        self.absolute_time_s = snapshot.absolute_time_s;
        self.wait_s = snapshot.wait_s;
        self.absolute_tick = snapshot.absolute_ticks;
        for (track_index, cursor) in snapshot.tracks.iter().enumerate() {
            if track_index >= self.cursors.len() {
                break;
            }
            self.cursors[track_index].row_index = cursor.row_index;
            self.cursors[track_index].delay_ticks = cursor.delay_ticks;
            self.cursors[track_index].last_status = cursor.last_status;
            self.cursors[track_index].terminal = false;
            self.tracks[track_index].saved_state = cursor.saved_state.clone();
            self.restore_track_state(track_index, interface);
        }
    }

    fn apply_track_snapshot(&mut self, track_index: usize, snapshot: &PositionSnapshot, interface: &mut impl RealtimeInterface) {
        if let Some(cursor) = snapshot.tracks.first() {
            self.cursors[track_index].row_index = cursor.row_index;
            self.cursors[track_index].delay_ticks = cursor.delay_ticks;
            self.cursors[track_index].last_status = cursor.last_status;
            self.cursors[track_index].terminal = false;
            self.tracks[track_index].saved_state = cursor.saved_state.clone();
        }
        self.restore_track_state(track_index, interface);
    }

    /// Writes saved controller/patch/bend/aftertouch state back to the
    /// realtime interface after a loop or branch jump: `all_notes_off`,
    /// then every controller whose bit is set
    /// in the restore mask, then patch, pitch bend, and channel pressure.
    fn restore_track_state(&mut self, track_index: usize, interface: &mut impl RealtimeInterface) {
        let track = &self.tracks[track_index];
        for channel in track.saved_state.touched_channels() {
            interface.controller_change(channel, crate::constants::CC_ALL_NOTES_OFF, crate::core::numbers::ControlValue::new(0));
            for controller in 0u8..128 {
                if track.saved_state.should_restore(channel, controller) {
                    let value = track.saved_state.controller(channel, controller);
                    interface.controller_change(channel, controller, crate::core::numbers::ControlValue::new(value));
                }
            }
            interface.patch_change(channel, track.saved_state.patch(channel));
            interface.pitch_bend(channel, track.saved_state.pitch_bend(channel));
            interface.channel_aftertouch(channel, track.saved_state.channel_pressure(channel));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bank::ByteBank;
    use crate::core::event::{Event, EventKind, MetaKind};
    use crate::core::numbers::{MidiChannel, NoteNumber, Velocity};
    use crate::core::timeline::EventBank;
    use crate::core::track::Track;
    use crate::formats::ParsedScore;
    use crate::sequencer::interface::test_support::RecordingInterface;

    fn sequencer_from(score: ParsedScore, loop_enabled: bool, loop_count: u32) -> Sequencer {
        Sequencer::new(
            score.division,
            score.tracks,
            score.banks,
            score.text_bank,
            score.loop_points,
            loop_enabled,
            loop_count,
        )
    }

    fn one_row_score(events: Vec<EventKind>) -> ParsedScore {
        let mut bank = EventBank::new();
        let mut row = crate::core::row::Row::new(0, 0);
        for kind in events {
            bank.append_event(&mut row, Event::new(kind));
        }
        let mut end_row = crate::core::row::Row::new(96, row.events_end);
        bank.append_event(&mut end_row, Event::new(EventKind::Meta(MetaKind::EndOfTrack)));

        let mut track = Track::new(true);
        track.rows.push(row);
        track.rows.push(end_row);

        ParsedScore {
            division: 96,
            tracks: vec![track],
            banks: vec![bank],
            text_bank: ByteBank::new(),
            tempo_events: Vec::new(),
            timeline: crate::core::timeline::TimelineSummary {
                song_length_seconds: 1.5,
                global_loop_begin_tick: None,
            },
            loop_points: SimpleLoop::default(),
            metadata: crate::formats::SongMetadata::default(),
            embedded_instruments: None,
        }
    }

    #[test]
    fn minimal_song_reaches_end_and_pads_wait() {
        let score = one_row_score(vec![EventKind::NoteOn {
            channel: MidiChannel::new(0),
            note: NoteNumber::new(60),
            velocity: Velocity::new(100),
        }]);
        let mut sequencer = sequencer_from(score, false, 0);
        let mut interface = RecordingInterface::default();

        let mut wait = sequencer.tick(0.0, 0.001, &mut interface);
        let mut guard = 0;
        while !sequencer.is_at_end() && guard < 1000 {
            wait = sequencer.tick(wait.max(0.001), 0.001, &mut interface);
            guard += 1;
        }

        assert!(sequencer.is_at_end());
        assert!(interface.log.iter().any(|l| l.starts_with("note_on")));
    }

    #[test]
    fn seek_suppresses_note_on_but_keeps_controllers() {
        let score = one_row_score(vec![
            EventKind::CtrlChange {
                channel: MidiChannel::new(0),
                controller: 7,
                value: crate::core::numbers::ControlValue::new(100),
            },
            EventKind::NoteOn {
                channel: MidiChannel::new(0),
                note: NoteNumber::new(60),
                velocity: Velocity::new(100),
            },
        ]);
        let mut sequencer = sequencer_from(score, false, 0);
        let mut interface = RecordingInterface::default();
        sequencer.seek(0.4, &mut interface);

        assert!(!interface.log.iter().any(|l| l.starts_with("note_on")));
        assert!(interface.log.iter().any(|l| l.starts_with("cc 0 7")));
    }

    /// A track carrying a `LoopStart` marker at tick 0 and a `LoopEnd`
    /// marker partway through, looping enabled and infinite: every pass
    /// around the loop should fire `loop_end` exactly once.
    fn looping_score(loop_end_tick: u64) -> ParsedScore {
        let mut bank = EventBank::new();
        let mut start_row = crate::core::row::Row::new(0, 0);
        bank.append_event(&mut start_row, Event::new(EventKind::Meta(MetaKind::LoopStart)));
        let mut end_row = crate::core::row::Row::new(loop_end_tick, start_row.events_end);
        bank.append_event(&mut end_row, Event::new(EventKind::Meta(MetaKind::LoopEnd)));

        let mut track = Track::new(true);
        track.rows.push(start_row);
        track.rows.push(end_row);

        let mut loop_points = SimpleLoop::default();
        loop_points.observe_start(0);
        loop_points.observe_end(loop_end_tick);
        loop_points.finalize();

        ParsedScore {
            division: 96,
            tracks: vec![track],
            banks: vec![bank],
            text_bank: ByteBank::new(),
            tempo_events: Vec::new(),
            timeline: crate::core::timeline::TimelineSummary {
                song_length_seconds: 0.5,
                global_loop_begin_tick: Some(0),
            },
            loop_points,
            metadata: crate::formats::SongMetadata::default(),
            embedded_instruments: None,
        }
    }

    #[test]
    fn loop_markers_fire_loop_end_on_every_pass() {
        let score = looping_score(96);
        let mut sequencer = sequencer_from(score, true, 0);
        let mut interface = RecordingInterface::default();

        let mut guard = 0;
        while sequencer.absolute_time_seconds() < 10.0 && guard < 100_000 {
            sequencer.tick(0.01, 0.001, &mut interface);
            guard += 1;
        }

        let loop_ends = interface.log.iter().filter(|l| l.as_str() == "loop_end").count();
        assert!(loop_ends >= 18 && loop_ends <= 22, "expected about 20 loop_end calls, saw {}", loop_ends);
    }

    #[test]
    fn track_local_loop_stack_repeats_its_count_then_falls_through() {
        let mut bank = EventBank::new();

        let mut begin_row = crate::core::row::Row::new(100, 0);
        bank.append_event(
            &mut begin_row,
            Event::new(EventKind::Meta(MetaKind::LoopStackBegin { id: None, count: 3, track_local: true })),
        );
        bank.append_event(
            &mut begin_row,
            Event::new(EventKind::NoteOn {
                channel: MidiChannel::new(0),
                note: NoteNumber::new(60),
                velocity: Velocity::new(100),
            }),
        );
        let mut end_row = crate::core::row::Row::new(200, begin_row.events_end);
        bank.append_event(&mut end_row, Event::new(EventKind::Meta(MetaKind::LoopStackEnd { id: None, track_local: true })));
        let mut final_row = crate::core::row::Row::new(300, end_row.events_end);
        bank.append_event(&mut final_row, Event::new(EventKind::Meta(MetaKind::EndOfTrack)));

        let mut track = Track::new(true);
        track.rows.push(begin_row);
        track.rows.push(end_row);
        track.rows.push(final_row);

        let score = ParsedScore {
            division: 96,
            tracks: vec![track],
            banks: vec![bank],
            text_bank: ByteBank::new(),
            tempo_events: Vec::new(),
            timeline: crate::core::timeline::TimelineSummary { song_length_seconds: 1.5, global_loop_begin_tick: None },
            loop_points: SimpleLoop::default(),
            metadata: crate::formats::SongMetadata::default(),
            embedded_instruments: None,
        };
        let mut sequencer = sequencer_from(score, false, 0);
        let mut interface = RecordingInterface::default();

        let mut guard = 0;
        while !sequencer.is_at_end() && guard < 10_000 {
            sequencer.tick(0.1, 0.001, &mut interface);
            guard += 1;
        }

        let note_ons = interface.log.iter().filter(|l| l.starts_with("note_on")).count();
        assert_eq!(note_ons, 3, "a count=3 loop stack should play its body exactly three times");
    }
}
