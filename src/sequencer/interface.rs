//! The realtime synth interface: the struct-of-callbacks
//! boundary the sequencer drives during playback. Modelled as a trait with
//! default no-op bodies for the optional hooks rather than a C-style
//! struct of function pointers. [`crate::player::Player`] is the only
//! implementor: it bridges every call here into
//! [`crate::voice::VoiceAllocator`] and the host's own
//! [`crate::voice::Opl3Interface`], so this trait itself stays internal.

use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};

/// Required and optional realtime callbacks the sequencer issues during
/// playback. `note_off` always carries a release velocity; hosts that
/// don't care can ignore it, covering both a bare note-off and a
/// velocity-carrying note-off with one method.
pub(crate) trait RealtimeInterface {
    fn note_on(&mut self, channel: MidiChannel, key: NoteNumber, velocity: Velocity);
    fn note_off(&mut self, channel: MidiChannel, key: NoteNumber, velocity: Velocity);
    fn note_aftertouch(&mut self, channel: MidiChannel, key: NoteNumber, value: ControlValue);
    fn channel_aftertouch(&mut self, channel: MidiChannel, value: ControlValue);
    fn controller_change(&mut self, channel: MidiChannel, controller: u8, value: ControlValue);
    fn patch_change(&mut self, channel: MidiChannel, program: Program);
    fn pitch_bend(&mut self, channel: MidiChannel, value: PitchBend14);
    fn system_exclusive(&mut self, data: &[u8]);

    /// Any meta event without a more specific hook above; `meta_type`
    /// mirrors the file-level SMF meta type byte where one exists.
    fn meta_event(&mut self, _meta_type: u8, _data: &[u8]) {}
    /// HMI/HMP multi-device scores switch which output device subsequent
    /// events on a track target.
    fn device_switch(&mut self, _track: usize, _device: u8) {}
    /// The channel-offset multiplexing currently in effect for `track`.
    fn current_device(&mut self, _track: usize) -> u8 {
        0
    }
    fn raw_opl(&mut self, _register: u8, _value: u8) {}
    fn pcm_render(&mut self, _buffer: &mut [i16]) {}
    fn song_start(&mut self) {}
    fn loop_start(&mut self) {}
    fn loop_end(&mut self) {}
    fn debug_message(&mut self, _message: &str) {}
    /// The callback-trigger meta's single-byte payload, plus the track it
    /// originated on.
    fn callback_trigger(&mut self, _track: usize, _payload: u8) {}
    /// Fires after every realtime callback above, with the track index that
    /// produced it; a catch-all hook for hosts that want a single place to
    /// observe the whole stream.
    fn event(&mut self, _track: usize) {}
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A recording `RealtimeInterface` used by scheduler/player tests: every
    /// call is appended to `log` as a short tag, so tests can assert on
    /// ordering without building a real synth.
    #[derive(Default)]
    pub(crate) struct RecordingInterface {
        pub(crate) log: Vec<String>,
    }

    impl RealtimeInterface for RecordingInterface {
        fn note_on(&mut self, channel: MidiChannel, key: NoteNumber, velocity: Velocity) {
            self.log.push(format!("note_on {} {} {}", channel.get(), key.get(), velocity.get()));
        }
        fn note_off(&mut self, channel: MidiChannel, key: NoteNumber, velocity: Velocity) {
            self.log.push(format!("note_off {} {} {}", channel.get(), key.get(), velocity.get()));
        }
        fn note_aftertouch(&mut self, channel: MidiChannel, key: NoteNumber, value: ControlValue) {
            self.log.push(format!("aftertouch {} {} {}", channel.get(), key.get(), value.get()));
        }
        fn channel_aftertouch(&mut self, channel: MidiChannel, value: ControlValue) {
            self.log.push(format!("chan_pressure {} {}", channel.get(), value.get()));
        }
        fn controller_change(&mut self, channel: MidiChannel, controller: u8, value: ControlValue) {
            self.log.push(format!("cc {} {} {}", channel.get(), controller, value.get()));
        }
        fn patch_change(&mut self, channel: MidiChannel, program: Program) {
            self.log.push(format!("patch {} {}", channel.get(), program.get()));
        }
        fn pitch_bend(&mut self, channel: MidiChannel, value: PitchBend14) {
            self.log.push(format!("bend {} {}", channel.get(), value.get()));
        }
        fn system_exclusive(&mut self, data: &[u8]) {
            self.log.push(format!("sysex {} bytes", data.len()));
        }
        fn song_start(&mut self) {
            self.log.push("song_start".to_string());
        }
        fn loop_start(&mut self) {
            self.log.push("loop_start".to_string());
        }
        fn loop_end(&mut self) {
            self.log.push("loop_end".to_string());
        }
        fn debug_message(&mut self, message: &str) {
            self.log.push(format!("debug: {}", message));
        }
    }
}
