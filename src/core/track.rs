//! Per-track state: saved controller/patch/bend state for loop and branch
//! restore, the device mask, and the timed-note cache that turns XMI's
//! synthetic `NoteOnDurated` into a real `NoteOff` on expiry. The
//! timed-note cache is a fixed 128-slot cache per track, ticked down every
//! row delay and popped via swap-with-last (not order-preserving).

use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};
use crate::core::row::{NoteSoundingSet, Row};
use crate::sequencer::loop_state::LoopState;

/// Bitset of `Device_*` flags a track belongs to, used by HMI/HMP
/// multi-device scores to decide which output device sees a track's events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct DeviceMask(pub(crate) u32);

impl DeviceMask {
    pub(crate) const NONE: DeviceMask = DeviceMask(0);

    pub(crate) fn contains(&self, device_bit: u32) -> bool {
        self.0 & device_bit != 0
    }
}

/// The subset of per-track state that must be written back to the realtime
/// interface after a loop or branch jump: `all_notes_off` on the affected
/// channel, then the controllers whose bit is set in `restore_mask`, patch,
/// pitch bend, and aftertouch. One instance per MIDI channel the track has
/// touched.
#[derive(Clone, Debug)]
pub(crate) struct TrackStateSaved {
    pub(crate) last_channel: MidiChannel,
    last_patch: Vec<Program>,
    last_pitch_bend: Vec<PitchBend14>,
    last_channel_pressure: Vec<ControlValue>,
    last_controller_value: Vec<Vec<u8>>,
    /// One bit per controller number (0..128); set means "reapply this
    /// controller's last value on loop/branch restore". HMI toggles these
    /// explicitly via CC 103..119; other formats default every bit on.
    restore_mask: Vec<u128>,
    note_aftertouch: Vec<Vec<u8>>,
    /// One bit per channel, set the first time this track writes a patch,
    /// bend, pressure, controller or note-aftertouch value on it.
    touched: u16,
}

impl TrackStateSaved {
    pub(crate) fn new(default_restore_all: bool) -> Self {
        let restore_word = if default_restore_all { u128::MAX } else { 0 };
        Self {
            last_channel: MidiChannel::default(),
            last_patch: vec![Program::default(); 16],
            last_pitch_bend: vec![PitchBend14::default(); 16],
            last_channel_pressure: vec![ControlValue::default(); 16],
            last_controller_value: vec![vec![0u8; 128]; 16],
            restore_mask: vec![restore_word; 16],
            note_aftertouch: vec![vec![0u8; 128]; 16],
            touched: 0,
        }
    }

    fn mark_touched(&mut self, channel: MidiChannel) {
        self.touched |= 1u16 << channel.get();
    }

    pub(crate) fn set_patch(&mut self, channel: MidiChannel, program: Program) {
        self.last_patch[channel.get() as usize] = program;
        self.mark_touched(channel);
    }

    pub(crate) fn patch(&self, channel: MidiChannel) -> Program {
        self.last_patch[channel.get() as usize]
    }

    pub(crate) fn set_pitch_bend(&mut self, channel: MidiChannel, value: PitchBend14) {
        self.last_pitch_bend[channel.get() as usize] = value;
        self.mark_touched(channel);
    }

    pub(crate) fn pitch_bend(&self, channel: MidiChannel) -> PitchBend14 {
        self.last_pitch_bend[channel.get() as usize]
    }

    pub(crate) fn set_channel_pressure(&mut self, channel: MidiChannel, value: ControlValue) {
        self.last_channel_pressure[channel.get() as usize] = value;
        self.mark_touched(channel);
    }

    pub(crate) fn channel_pressure(&self, channel: MidiChannel) -> ControlValue {
        self.last_channel_pressure[channel.get() as usize]
    }

    pub(crate) fn set_controller(&mut self, channel: MidiChannel, controller: u8, value: u8) {
        self.last_controller_value[channel.get() as usize][controller as usize & 0x7f] = value;
        self.mark_touched(channel);
    }

    pub(crate) fn controller(&self, channel: MidiChannel, controller: u8) -> u8 {
        self.last_controller_value[channel.get() as usize][controller as usize & 0x7f]
    }

    pub(crate) fn set_restore(&mut self, controller: u8, enabled: bool) {
        let bit = 1u128 << (controller as u32 & 0x7f);
        for word in self.restore_mask.iter_mut() {
            if enabled {
                *word |= bit;
            } else {
                *word &= !bit;
            }
        }
    }

    pub(crate) fn should_restore(&self, channel: MidiChannel, controller: u8) -> bool {
        let bit = 1u128 << (controller as u32 & 0x7f);
        self.restore_mask[channel.get() as usize] & bit != 0
    }

    pub(crate) fn set_note_aftertouch(&mut self, channel: MidiChannel, note: NoteNumber, value: u8) {
        self.note_aftertouch[channel.get() as usize][note.get() as usize] = value;
        self.mark_touched(channel);
    }

    pub(crate) fn note_aftertouch(&self, channel: MidiChannel, note: NoteNumber) -> u8 {
        self.note_aftertouch[channel.get() as usize][note.get() as usize]
    }

    /// Every channel this track has actually written a patch, bend,
    /// pressure, controller or note-aftertouch value on, used to scope
    /// state restore to channels that actually matter instead of blindly
    /// walking all sixteen.
    pub(crate) fn touched_channels(&self) -> impl Iterator<Item = MidiChannel> + '_ {
        (0..16u8).map(MidiChannel::new).filter(move |c| self.touched & (1u16 << c.get()) != 0)
    }
}

/// One cached `NoteOnDurated` awaiting its synthesised `NoteOff`.
#[derive(Clone, Copy, Debug)]
struct DuratedNote {
    ttl_ticks: i64,
    channel: MidiChannel,
    note: NoteNumber,
    velocity: Velocity,
}

/// Up to 128 active durated notes per track, evicting the oldest via a
/// swap-remove pop once the cap is hit.
#[derive(Default)]
pub(crate) struct TimedNoteCache {
    notes: Vec<DuratedNote>,
}

pub(crate) const TIMED_NOTE_CACHE_CAPACITY: usize = 128;

impl TimedNoteCache {
    pub(crate) fn new() -> Self {
        Self { notes: Vec::new() }
    }

    /// Mirrors `duratedNoteAlloc`: refuses silently once the cache is full.
    pub(crate) fn alloc(
        &mut self,
        channel: MidiChannel,
        note: NoteNumber,
        velocity: Velocity,
        duration_ticks: u32,
    ) -> bool {
        if self.notes.len() >= TIMED_NOTE_CACHE_CAPACITY {
            return false;
        }
        self.notes.push(DuratedNote {
            ttl_ticks: duration_ticks as i64,
            channel,
            note,
            velocity,
        });
        true
    }

    /// Mirrors `duratedNoteTick`: decrements every cached note's ttl.
    pub(crate) fn tick(&mut self, ticks: u64) {
        for n in self.notes.iter_mut() {
            n.ttl_ticks -= ticks as i64;
        }
    }

    /// Removes and returns every note whose ttl has expired, via
    /// swap-with-last like `duratedNotePop` (order is not preserved).
    pub(crate) fn drain_expired(&mut self) -> Vec<(MidiChannel, NoteNumber, Velocity)> {
        let mut expired = Vec::new();
        let mut i = 0;
        while i < self.notes.len() {
            if self.notes[i].ttl_ticks <= 0 {
                let n = self.notes[i];
                expired.push((n.channel, n.note, n.velocity));
                let last = self.notes.len() - 1;
                self.notes.swap(i, last);
                self.notes.pop();
            } else {
                i += 1;
            }
        }
        expired
    }

    pub(crate) fn clear(&mut self) {
        self.notes.clear();
    }

    /// The minimum ticks remaining across all cached notes, if any; used by
    /// the scheduler to compute the shortest delay across a tick.
    pub(crate) fn min_ttl_ticks(&self) -> Option<i64> {
        self.notes.iter().map(|n| n.ttl_ticks).min()
    }
}

/// A parsed track: its rows in tick order, and the saved state needed to
/// restore realtime output after a loop/branch jump.
pub(crate) struct Track {
    pub(crate) rows: Vec<Row>,
    pub(crate) device_mask: DeviceMask,
    pub(crate) disabled: bool,
    pub(crate) loop_state: LoopState,
    pub(crate) timed_notes: TimedNoteCache,
    pub(crate) saved_state: TrackStateSaved,
    pub(crate) sounding: NoteSoundingSet,
}

impl Track {
    pub(crate) fn new(default_restore_all: bool) -> Self {
        Self {
            rows: Vec::new(),
            device_mask: DeviceMask::NONE,
            disabled: false,
            loop_state: LoopState::new(),
            timed_notes: TimedNoteCache::new(),
            saved_state: TrackStateSaved::new(default_restore_all),
            sounding: NoteSoundingSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timed_note_cache_respects_capacity() {
        let mut cache = TimedNoteCache::new();
        let ch = MidiChannel::new(0);
        for i in 0..TIMED_NOTE_CACHE_CAPACITY {
            assert!(cache.alloc(ch, NoteNumber::new((i % 128) as u8), Velocity::new(100), 10));
        }
        assert!(!cache.alloc(ch, NoteNumber::new(5), Velocity::new(100), 10));
    }

    #[test]
    fn timed_note_expires_and_emits_note_off() {
        let mut cache = TimedNoteCache::new();
        let ch = MidiChannel::new(0);
        let note = NoteNumber::new(60);
        cache.alloc(ch, note, Velocity::new(100), 120);
        cache.tick(200);
        let expired = cache.drain_expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].1, note);
    }

    #[test]
    fn restore_mask_toggles_per_controller() {
        let mut state = TrackStateSaved::new(false);
        let ch = MidiChannel::new(0);
        assert!(!state.should_restore(ch, 7));
        state.set_restore(7, true);
        assert!(state.should_restore(ch, 7));
    }
}
