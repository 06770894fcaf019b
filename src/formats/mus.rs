//! DMX `MUS` format parser (id Software / Doom-era engines). Fixed header,
//! lazily-assigned MIDI channels, a 15-entry system-controller map, and a
//! fixed ~140 Hz tick rate in place of a real tempo track.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::error::{truncated, unsupported_format, LibResult};
use crate::formats::common::TrackBuilder;
use snafu::ResultExt;

/// DMX's fixed system-event-to-controller map, including the two unused
/// leading zero entries (system event IDs 0 and 1 are not dispatched here:
/// 0 is the note-off-all convention used internally, 1 is reserved).
const SYSTEM_CONTROLLER_MAP: [u8; 15] = [0, 0, 1, 7, 10, 11, 91, 93, 64, 67, 120, 123, 126, 127, 121];

/// Ticks per second this crate assigns to MUS's fixed clock, matching
/// DMX's ~140 BPM quarter-note rate; microseconds_per_quarter below is
/// chosen so one tick equals this many seconds.
const MUS_TICKS_PER_SECOND: u64 = 140;

pub(crate) struct ParsedMus {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

struct ChannelMap {
    map: [i8; 16],
    next: u8,
    seen_cc7: [bool; 16],
}

impl ChannelMap {
    fn new() -> Self {
        let mut map = [-1i8; 16];
        map[15] = 9;
        Self {
            map,
            next: 0,
            seen_cc7: [false; 16],
        }
    }

    fn resolve(&mut self, mus_channel: u8) -> MidiChannel {
        let idx = mus_channel as usize & 0x0f;
        if self.map[idx] < 0 {
            if self.next == 9 {
                self.next += 1;
            }
            self.map[idx] = self.next as i8;
            self.next += 1;
        }
        MidiChannel::new(self.map[idx] as u8)
    }

    fn note_cc7_needed(&mut self, channel: MidiChannel) -> bool {
        let idx = channel.get() as usize;
        if self.seen_cc7[idx] {
            false
        } else {
            self.seen_cc7[idx] = true;
            true
        }
    }
}

pub(crate) fn parse(cursor: &mut ByteCursor, _text_bank: &mut ByteBank) -> LibResult<ParsedMus> {
    let header = cursor.read_n(16).context(io!())?;
    if &header[0..4] != b"MUS\x1a" {
        unsupported_format!();
    }
    let song_len = u16::from_le_bytes([header[4], header[5]]) as usize;
    let song_offset = u16::from_le_bytes([header[6], header[7]]) as usize;
    let primary_channels = u16::from_le_bytes([header[8], header[9]]);
    if primary_channels > 15 {
        truncated!("MUS primary channel count {} exceeds 15", primary_channels);
    }
    let num_instruments = u16::from_le_bytes([header[14], header[15]]) as usize;

    // Instrument-number list: 2 bytes each, immediately after the header.
    let _instruments = cursor.read_n(num_instruments * 2).context(io!())?;

    cursor.seek_to(song_offset);

    let mut builder = TrackBuilder::new();
    let mut channels = ChannelMap::new();

    builder.push(Event::new(EventKind::Meta(MetaKind::SongBeginHook)));
    builder.push(Event::new(EventKind::Meta(MetaKind::SetTempo {
        microseconds_per_quarter: (1_000_000 / MUS_TICKS_PER_SECOND) as u32,
    })));
    let drum_channel = MidiChannel::new(9);
    builder.push(Event::new(EventKind::CtrlChange {
        channel: drum_channel,
        controller: 7,
        value: ControlValue::new(100),
    }));
    channels.seen_cc7[9] = true;

    let mut tempo_events = vec![TempoEvent {
        absolute_tick: 0,
        microseconds_per_quarter: (1_000_000 / MUS_TICKS_PER_SECOND) as u32,
    }];

    let mut reached_end = false;
    while !cursor.is_end() {
        let event_byte = cursor.read_or_die().context(io!())?;
        let has_delay = event_byte & 0x80 != 0;
        let event_type = (event_byte >> 4) & 0x07;
        let mus_channel = event_byte & 0x0f;
        let channel = channels.resolve(mus_channel);

        if channels.note_cc7_needed(channel) {
            builder.push(Event::new(EventKind::CtrlChange {
                channel,
                controller: 7,
                value: ControlValue::new(100),
            }));
        }

        match event_type {
            0 => {
                // Note off: single data byte, the note number.
                let note = cursor.read_or_die().context(io!())?;
                builder.push(Event::new(EventKind::NoteOff {
                    channel,
                    note: NoteNumber::new(note & 0x7f),
                    velocity: Velocity::new(0),
                }));
            }
            1 => {
                let note_byte = cursor.read_or_die().context(io!())?;
                let velocity = if note_byte & 0x80 != 0 {
                    cursor.read_or_die().context(io!())?
                } else {
                    100
                };
                builder.push(Event::new(EventKind::NoteOn {
                    channel,
                    note: NoteNumber::new(note_byte & 0x7f),
                    velocity: Velocity::new(velocity & 0x7f),
                }));
            }
            2 => {
                let value = cursor.read_or_die().context(io!())?;
                let bend = (value as u16).saturating_mul(64).min(16383);
                builder.push(Event::new(EventKind::PitchBend {
                    channel,
                    value: PitchBend14::new(bend),
                }));
            }
            3 => {
                let value = cursor.read_or_die().context(io!())?;
                let idx = value as usize & 0x7f;
                if idx < SYSTEM_CONTROLLER_MAP.len() && idx >= 2 {
                    builder.push(Event::new(EventKind::CtrlChange {
                        channel,
                        controller: SYSTEM_CONTROLLER_MAP[idx],
                        value: ControlValue::new(127),
                    }));
                }
            }
            4 => {
                let controller = cursor.read_or_die().context(io!())?;
                let value = cursor.read_or_die().context(io!())?;
                if controller == 0 {
                    builder.push(Event::new(EventKind::PatchChange {
                        channel,
                        program: Program::new(value & 0x7f),
                    }));
                } else {
                    let idx = controller as usize & 0x7f;
                    if idx < SYSTEM_CONTROLLER_MAP.len() {
                        builder.push(Event::new(EventKind::CtrlChange {
                            channel,
                            controller: SYSTEM_CONTROLLER_MAP[idx],
                            value: ControlValue::new(value & 0x7f),
                        }));
                    }
                }
            }
            5 => {
                // End of measure: no-op marker.
            }
            6 => {
                builder.push(Event::new(EventKind::Meta(MetaKind::EndOfTrack)));
                reached_end = true;
            }
            _ => {
                // Type 7 ("unused") carries no payload; skip silently.
            }
        }

        if reached_end {
            break;
        }

        if has_delay {
            let mut delay: u64 = 0;
            loop {
                let b = cursor.read_or_die().context(io!())?;
                delay = delay * 128 + (b & 0x7f) as u64;
                if b & 0x80 == 0 {
                    break;
                }
            }
            if delay > 0 {
                builder.advance_and_flush(delay);
            }
        }
    }

    if !reached_end {
        truncated!("MUS track {} bytes ended without an end-of-track event", song_len);
    }

    let (bank, rows) = builder.finish();
    if rows.is_empty() {
        truncated!("MUS track produced no rows");
    }

    let mut track = Track::new(true);
    track.rows = rows;

    Ok(ParsedMus {
        division: 1,
        tracks: vec![track],
        banks: vec![bank],
        tempo_events,
    })
}
