//! Status-byte and meta-event tag constants shared by every format parser
//! in [`crate::formats`]. These are not MIDI-file-specific: XMI, HMI and
//! CMF all reuse the same channel-message status nibble even though their
//! containers differ.

/// The right four bits of a channel-voice status byte carry the channel number.
pub(crate) const STATUS_CHANNEL_MASK: u8 = 0b0000_1111;

/// The left four bits of a channel-voice status byte carry the message type.
pub(crate) const STATUS_TYPE_MASK: u8 = 0b1111_0000;

/// `0x8`: Note Off.
pub(crate) const STATUS_NOTE_OFF: u8 = 0x80;
/// `0x9`: Note On (velocity 0 means Note Off).
pub(crate) const STATUS_NOTE_ON: u8 = 0x90;
/// `0xA`: polyphonic key pressure / aftertouch.
pub(crate) const STATUS_POLY_PRESSURE: u8 = 0xA0;
/// `0xB`: control change, or channel mode when data byte 1 is 120..=127.
pub(crate) const STATUS_CONTROL: u8 = 0xB0;
/// `0xC`: program change.
pub(crate) const STATUS_PROGRAM: u8 = 0xC0;
/// `0xD`: channel pressure / aftertouch.
pub(crate) const STATUS_CHANNEL_PRESSURE: u8 = 0xD0;
/// `0xE`: pitch bend.
pub(crate) const STATUS_PITCH_BEND: u8 = 0xE0;
/// `0xF`: system message (meta/sysex live under this nibble in file formats).
pub(crate) const STATUS_SYSTEM: u8 = 0xF0;

/// `0xFF`: all meta-events begin with this byte, followed by a type byte and a VLQ length.
pub(crate) const META_EVENT: u8 = 0xFF;
/// `0xF0`: normal SysEx, `F0 <len> <bytes...>`.
pub(crate) const SYSEX_F0: u8 = 0xF0;
/// `0xF7`: escaped/continued SysEx, `F7 <len> <bytes...>`.
pub(crate) const SYSEX_F7: u8 = 0xF7;

/// First data byte at or above this value under `STATUS_CONTROL` is a channel-mode
/// message rather than a true controller.
pub(crate) const CHANNEL_MODE_THRESHOLD: u8 = 120;

// Meta-event type bytes used across SMF/RMI/XMI/HMI/CMF.
pub(crate) const META_TEXT: u8 = 0x01;
pub(crate) const META_COPYRIGHT: u8 = 0x02;
pub(crate) const META_TRACK_NAME: u8 = 0x03;
pub(crate) const META_INSTRUMENT_NAME: u8 = 0x04;
pub(crate) const META_LYRIC: u8 = 0x05;
pub(crate) const META_MARKER: u8 = 0x06;
pub(crate) const META_CUE_POINT: u8 = 0x07;
pub(crate) const META_CHANNEL_PREFIX: u8 = 0x20;
pub(crate) const META_END_OF_TRACK: u8 = 0x2F;
pub(crate) const META_SET_TEMPO: u8 = 0x51;
pub(crate) const META_SMPTE_OFFSET: u8 = 0x54;
pub(crate) const META_TIME_SIGNATURE: u8 = 0x58;
pub(crate) const META_KEY_SIGNATURE: u8 = 0x59;
pub(crate) const META_SEQUENCER_SPECIFIC: u8 = 0x7F;

// Controller numbers that carry cross-format meaning for the sequencer/voice
// engine, named here because every parser and the voice allocator both need them.
pub(crate) const CC_BANK_SELECT_MSB: u8 = 0;
pub(crate) const CC_BANK_SELECT_LSB: u8 = 32;
pub(crate) const CC_VOLUME: u8 = 7;
pub(crate) const CC_PAN: u8 = 10;
pub(crate) const CC_EXPRESSION: u8 = 11;
pub(crate) const CC_BRIGHTNESS: u8 = 74;
pub(crate) const CC_SUSTAIN: u8 = 64;
pub(crate) const CC_PORTAMENTO: u8 = 65;
pub(crate) const CC_SOSTENUTO: u8 = 66;
pub(crate) const CC_SOFT_PEDAL: u8 = 67;
pub(crate) const CC_PORTAMENTO_TIME: u8 = 5;
pub(crate) const CC_NRPN_LSB: u8 = 98;
pub(crate) const CC_NRPN_MSB: u8 = 99;
pub(crate) const CC_RPN_LSB: u8 = 100;
pub(crate) const CC_RPN_MSB: u8 = 101;
pub(crate) const CC_ALL_SOUND_OFF: u8 = 120;
pub(crate) const CC_RESET_ALL_CONTROLLERS: u8 = 121;
pub(crate) const CC_ALL_NOTES_OFF: u8 = 123;

/// SMF's "HMI-style" loop controllers: 110 starts a loop, 111 ends it,
/// unless overridden per §4.C by CC111-only (RPG Maker) or CC113 (EMIDI disable).
pub(crate) const CC_SMF_LOOP_START: u8 = 110;
pub(crate) const CC_SMF_LOOP_END: u8 = 111;
pub(crate) const CC_SMF_EMIDI_DISABLE_LOOP: u8 = 113;

/// XMI loop-stack and callback controllers.
pub(crate) const CC_XMI_LOOP_BEGIN: u8 = 116;
pub(crate) const CC_XMI_LOOP_END: u8 = 117;
pub(crate) const CC_XMI_CALLBACK_TRIGGER: u8 = 119;

/// CMF's extra controllers: callback trigger and two transpose controls.
pub(crate) const CC_CMF_CALLBACK_TRIGGER: u8 = 102;
pub(crate) const CC_CMF_TRANSPOSE_UP: u8 = 104;
pub(crate) const CC_CMF_TRANSPOSE_DOWN: u8 = 105;
