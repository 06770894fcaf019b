//! Extended MIDI (`XMI`) parser. Unwraps the IFF `FORM…XDIR`/`CAT …XMID`
//! container down to the `EVNT` chunk of one embedded song, then walks that
//! chunk with the same channel/meta dispatch [`crate::formats::common`]
//! gives SMF, using XMI's own delay encoding and its extra `NoteOnDurated`
//! event.
//!
//! Multiple songs can live in one file as sibling `FORM XMID` chunks
//! inside a `CAT ` catalog; this crate selects the first one and leaves
//! song selection beyond that to the host.

use crate::byte_iter::ByteCursor;
use crate::constants::*;
use crate::core::bank::ByteBank;
use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::error::{truncated, unsupported_format, LibResult};
use crate::formats::common::{control_change_event, LoopCcState, SourceFormat, TrackBuilder};
use snafu::{OptionExt, ResultExt};

/// XMI's fixed tick rate: 60 ticks per quarter note, the division every
/// XMI song is assumed to use regardless of its own tempo meta events.
const XMI_DIVISION: u16 = 60;

pub(crate) struct ParsedXmi {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

/// Finds the first top-level chunk tagged `tag` within `[start, end)`,
/// returning `(body_start, body_end)`. IFF chunks are word-aligned: a chunk
/// with an odd length is followed by one pad byte.
fn find_chunk(bytes: &[u8], start: usize, end: usize, tag: &[u8; 4]) -> Option<(usize, usize)> {
    let mut pos = start;
    while pos + 8 <= end {
        let chunk_tag = &bytes[pos..pos + 4];
        let len = u32::from_be_bytes(bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        let body_start = pos + 8;
        let body_end = (body_start + len).min(end);
        if chunk_tag == tag {
            return Some((body_start, body_end));
        }
        pos = body_start + len + (len & 1);
    }
    None
}

/// Locates the `EVNT` chunk of the first `FORM XMID` inside the file.
///
/// Top-level layout: `FORM <len> XDIR { INFO ... }` followed by a sibling
/// `CAT  <len> XMID { FORM <len> XMID { [TIMB ...] EVNT ... } ... }`.
fn locate_first_song_evnt(bytes: &[u8]) -> LibResult<(usize, usize)> {
    if bytes.len() < 12 || &bytes[0..4] != b"FORM" || &bytes[8..12] != b"XDIR" {
        unsupported_format!();
    }
    let xdir_len = u32::from_be_bytes(bytes[4..8].try_into().unwrap()) as usize;
    let after_xdir = 8 + xdir_len + (xdir_len & 1);
    let total_len = bytes.len();

    let (cat_body_start, cat_body_end) = find_chunk(bytes, after_xdir, total_len, b"CAT ")
        .context(truncated_s!("XMI file has no CAT XMID catalog"))?;
    // Skip the "XMID" form-type that opens the CAT chunk's own body.
    let cat_start = (cat_body_start + 4).min(cat_body_end);

    let (form_body_start, form_body_end) = find_chunk(bytes, cat_start, cat_body_end, b"FORM")
        .context(truncated_s!("XMI catalog has no FORM XMID song chunk"))?;
    // Skip the "XMID" form-type that opens this song FORM's own body.
    let song_start = (form_body_start + 4).min(form_body_end);

    find_chunk(bytes, song_start, form_body_end, b"EVNT")
        .context(truncated_s!("XMI song FORM has no EVNT chunk"))
}

pub(crate) fn parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<ParsedXmi> {
    let bytes = cursor.as_slice();
    let (evnt_start, evnt_end) = locate_first_song_evnt(bytes)?;

    let mut evnt_cursor = ByteCursor::new(bytes);
    evnt_cursor.seek_to(evnt_start);
    evnt_cursor.set_size_limit(evnt_end - evnt_start);

    let mut builder = TrackBuilder::new();
    let mut loop_cc_state = LoopCcState::default();
    let mut tempo_events = Vec::new();

    builder.push(Event::new(EventKind::Meta(MetaKind::SongBeginHook)));

    loop {
        let mut delay: u64 = 0;
        while !evnt_cursor.is_end() {
            match evnt_cursor.peek() {
                Some(b) if b < 0x80 => {
                    delay += b as u64;
                    evnt_cursor.read_or_die().context(io!())?;
                }
                _ => break,
            }
        }
        if delay > 0 {
            builder.advance_and_flush(delay);
        }

        if evnt_cursor.is_end() {
            truncated!("XMI EVNT chunk ended without an end-of-track meta");
        }

        let status = evnt_cursor.read_or_die().context(io!())?;
        let event = match status {
            META_EVENT => {
                let meta_type = evnt_cursor.read_or_die().context(io!())?;
                let length = evnt_cursor.read_vlq_u32().context(io!())? as usize;
                let payload = evnt_cursor.read_n(length).context(io!())?;
                if meta_type == META_END_OF_TRACK {
                    Event::new(EventKind::Meta(MetaKind::EndOfTrack))
                } else if meta_type == META_SET_TEMPO && payload.len() == 3 {
                    let mpq = ((payload[0] as u32) << 16) | ((payload[1] as u32) << 8) | payload[2] as u32;
                    Event::new(EventKind::Meta(MetaKind::SetTempo {
                        microseconds_per_quarter: mpq,
                    }))
                } else {
                    Event::new(EventKind::Meta(MetaKind::Marker(text_bank.push(&payload))))
                }
            }
            SYSEX_F0 | SYSEX_F7 => {
                let length = evnt_cursor.read_vlq_u32().context(io!())? as usize;
                let payload = evnt_cursor.read_n(length).context(io!())?;
                Event::new(EventKind::SysEx {
                    data: text_bank.push(&payload),
                })
            }
            _ if status & STATUS_TYPE_MASK == STATUS_NOTE_ON => {
                let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
                let note = evnt_cursor.read_or_die().context(io!())?;
                let velocity = evnt_cursor.read_or_die().context(io!())?;
                let duration_ticks = evnt_cursor.read_vlq_u32().context(io!())?;
                if velocity == 0 {
                    Event::new(EventKind::NoteOff {
                        channel,
                        note: NoteNumber::new(note),
                        velocity: Velocity::new(0),
                    })
                } else {
                    Event::new(EventKind::NoteOnDurated {
                        channel,
                        note: NoteNumber::new(note),
                        velocity: Velocity::new(velocity),
                        duration_ticks,
                    })
                }
            }
            _ if status & STATUS_TYPE_MASK == STATUS_CONTROL => {
                let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
                let controller = evnt_cursor.read_or_die().context(io!())?;
                let value = evnt_cursor.read_or_die().context(io!())?;
                control_change_event(channel, controller, value, SourceFormat::Xmi, &mut loop_cc_state)
            }
            _ if status & STATUS_TYPE_MASK == STATUS_NOTE_OFF => {
                let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
                let note = evnt_cursor.read_or_die().context(io!())?;
                let velocity = evnt_cursor.read_or_die().context(io!())?;
                Event::new(EventKind::NoteOff {
                    channel,
                    note: NoteNumber::new(note),
                    velocity: Velocity::new(velocity),
                })
            }
            _ if status & STATUS_TYPE_MASK == STATUS_POLY_PRESSURE => {
                let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
                let note = evnt_cursor.read_or_die().context(io!())?;
                let value = evnt_cursor.read_or_die().context(io!())?;
                Event::new(EventKind::Aftertouch {
                    channel,
                    note: NoteNumber::new(note),
                    value: ControlValue::new(value),
                })
            }
            _ if status & STATUS_TYPE_MASK == STATUS_PROGRAM => {
                let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
                let program = evnt_cursor.read_or_die().context(io!())?;
                Event::new(EventKind::PatchChange {
                    channel,
                    program: Program::new(program),
                })
            }
            _ if status & STATUS_TYPE_MASK == STATUS_CHANNEL_PRESSURE => {
                let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
                let value = evnt_cursor.read_or_die().context(io!())?;
                Event::new(EventKind::ChannelPressure {
                    channel,
                    value: ControlValue::new(value),
                })
            }
            _ if status & STATUS_TYPE_MASK == STATUS_PITCH_BEND => {
                let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
                let lsb = evnt_cursor.read_or_die().context(io!())?;
                let msb = evnt_cursor.read_or_die().context(io!())?;
                let value = ((msb as u16 & 0x7f) << 7) | (lsb as u16 & 0x7f);
                Event::new(EventKind::PitchBend {
                    channel,
                    value: PitchBend14::new(value),
                })
            }
            _ => unsupported_format!(),
        };

        if let EventKind::Meta(MetaKind::SetTempo {
            microseconds_per_quarter,
        }) = event.kind
        {
            tempo_events.push(TempoEvent {
                absolute_tick: builder.absolute_tick(),
                microseconds_per_quarter,
            });
        }

        let is_end = event.is_end_of_track();
        builder.push(event);
        if is_end {
            break;
        }
    }

    let (bank, rows) = builder.finish();
    if rows.is_empty() {
        truncated!("XMI song produced no rows");
    }

    let mut track = Track::new(true);
    track.rows = rows;

    Ok(ParsedXmi {
        division: XMI_DIVISION,
        tracks: vec![track],
        banks: vec![bank],
        tempo_events,
    })
}
