//! Per-MIDI-channel state the voice allocator tracks on top of whatever
//! the sequencer already saves for loop restore. Sixteen of these exist
//! per active output device.

use crate::core::numbers::{ControlValue, NoteNumber, PitchBend14, Program};
use crate::voice::active_note::ActiveNote;
use std::collections::BTreeMap;

const DEFAULT_BEND_SENSITIVITY_CENTS: u32 = 200;
const DEFAULT_VIBRATO_DELAY_US: u32 = 700_000;
const DEFAULT_VIBRATO_SPEED: f64 = 10.0;

#[derive(Clone, Debug)]
pub(crate) struct MidiChannelState {
    pub(crate) bank_msb: u8,
    pub(crate) bank_lsb: u8,
    pub(crate) program: Program,
    pub(crate) volume: ControlValue,
    pub(crate) expression: ControlValue,
    pub(crate) pan: ControlValue,
    pub(crate) vibrato_depth: u8,
    pub(crate) vibrato_speed: f64,
    pub(crate) vibrato_delay_us: u32,
    pub(crate) vibrato_phase: f64,
    pub(crate) channel_aftertouch: ControlValue,
    pub(crate) note_aftertouch: [u8; 128],
    pub(crate) sustain: bool,
    pub(crate) sostenuto: bool,
    pub(crate) soft_pedal: bool,
    pub(crate) pitch_bend: PitchBend14,
    pub(crate) bend_sensitivity_cents: u32,
    pub(crate) brightness: ControlValue,
    pub(crate) full_range_brightness: bool,
    pub(crate) portamento_enable: bool,
    pub(crate) portamento_rate: f64,
    pub(crate) portamento_source: Option<NoteNumber>,
    pub(crate) rpn_msb: u8,
    pub(crate) rpn_lsb: u8,
    pub(crate) nrpn_msb: u8,
    pub(crate) nrpn_lsb: u8,
    pub(crate) gliding_notes: u32,
    pub(crate) extended_lifetime_notes: u32,
    pub(crate) active_notes: BTreeMap<NoteNumber, ActiveNote>,
}

impl Default for MidiChannelState {
    fn default() -> Self {
        Self {
            bank_msb: 0,
            bank_lsb: 0,
            program: Program::default(),
            volume: ControlValue::new(100),
            expression: ControlValue::new(127),
            pan: ControlValue::new(64),
            vibrato_depth: 0,
            vibrato_speed: DEFAULT_VIBRATO_SPEED,
            vibrato_delay_us: DEFAULT_VIBRATO_DELAY_US,
            vibrato_phase: 0.0,
            channel_aftertouch: ControlValue::default(),
            note_aftertouch: [0; 128],
            sustain: false,
            sostenuto: false,
            soft_pedal: false,
            pitch_bend: PitchBend14::default(),
            bend_sensitivity_cents: DEFAULT_BEND_SENSITIVITY_CENTS,
            brightness: ControlValue::new(127),
            full_range_brightness: false,
            portamento_enable: false,
            portamento_rate: 0.0,
            portamento_source: None,
            rpn_msb: 0x7f,
            rpn_lsb: 0x7f,
            nrpn_msb: 0x7f,
            nrpn_lsb: 0x7f,
            gliding_notes: 0,
            extended_lifetime_notes: 0,
            active_notes: BTreeMap::new(),
        }
    }
}

impl MidiChannelState {
    /// Bend in semitones, derived from the 14-bit wire value and the
    /// channel's RPN0 sensitivity.
    pub(crate) fn bend_semitones(&self) -> f64 {
        let centered = self.pitch_bend.get() as f64 - 8192.0;
        let cents_per_unit = self.bend_sensitivity_cents as f64 / 8192.0;
        (centered * cents_per_unit) / 100.0
    }

    pub(crate) fn brightness_for(&self, is_percussion: bool) -> ControlValue {
        if is_percussion {
            ControlValue::new(127)
        } else if self.full_range_brightness {
            self.brightness
        } else {
            ControlValue::new(self.brightness.get().min(127))
        }
    }
}
