//! HMI/HMP (Human Machine Interfaces "Sound Operating System") parser.
//! Two on-disk variants share one event vocabulary: `HMI-MIDISONG061595`
//! carries a VLQ-delta, duration-tagged note stream; `HMIMIDIP` (HMP) drops
//! note durations and uses a slightly different header. Both place loop and
//! branch points either as ordinary controller numbers (103..119) or, in
//! the richer branch-capable songs, as a private `0xFE`-tagged special
//! event with its own sub-type byte.
//!
//! Branch graphs beyond a track's own loop-stack depth are recorded as
//! [`MetaKind::BranchLocation`] / [`MetaKind::BranchTo`] markers rather
//! than executed: the sequencer only runs the simple global loop and
//! per-track loop stacks.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::event::{ControllerClass, Event, EventKind, MetaKind};
use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::{DeviceMask, Track};
use crate::error::{truncated, unsupported_format, LibResult};
use crate::formats::common::TrackBuilder;
use snafu::ResultExt;

const HMI_OFFSET_DIVISION: usize = 0xD4;
const HMI_OFFSET_TRACKS_COUNT: usize = 0xE4;
const HMI_OFFSET_TRACK_DIR: usize = 0xE8;
const HMI_OFFSET_TRACK_DATA_OFFSET: usize = 0x57;
const HMI_OFFSET_TRACK_DEVICES: usize = 0x99;
const HMI_SIZE_TRACK_DIR_HEAD: usize = 4;

const HMP_OFFSET_TRACK_DATA: usize = 12;

/// `HMI_CC_*` controller numbers that carry loop/branch/restore meaning
/// instead of ordinary controller semantics.
const HMI_CC_RESTORE_ENABLE: u8 = 103;
const HMI_CC_RESTORE_DISABLE: u8 = 104;
const HMI_CC_SET_LOCAL_BRANCH: u8 = 108;
const HMI_CC_JUMP_TO_LOC_BRANCH: u8 = 109;
const HMI_CC_GLOB_LOOP_START: u8 = 110;
const HMI_CC_GLOB_LOOP_END: u8 = 111;
const HMI_CC_SET_GLOBAL_BRANCH: u8 = 113;
const HMI_CC_JUMP_TO_GLOB_BRANCH: u8 = 114;
const HMI_CC_LOCAL_LOOP_START: u8 = 116;
const HMI_CC_LOCAL_LOOP_END: u8 = 117;
const HMI_CC_CALLBACK_TRIGGER: u8 = 119;

const S_HMI_SPECIAL: u8 = 0xFE;
const ST_HMI_NEW_BRANCH: u8 = 0x10;
const ST_HMI_JUMP_TO_LOC_BRANCH: u8 = 0x11;
const ST_HMI_TRACK_LOOP_START: u8 = 0x12;
const ST_HMI_TRACK_LOOP_END: u8 = 0x13;
const ST_HMI_GLOB_LOOP_START: u8 = 0x14;
const ST_HMI_GLOB_LOOP_END: u8 = 0x15;
const ST_HMI_JUMP_TO_GLOB_BRANCH: u8 = 0x16;

pub(crate) struct ParsedHmi {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Variant {
    Hmi,
    Hmp,
}

struct TrackSpan {
    start: usize,
    len: usize,
    device_mask: u32,
}

fn header(bytes: &[u8]) -> Option<(Variant, u16, Vec<TrackSpan>)> {
    const HMI_TAG: &[u8] = b"HMI-MIDISONG061595";
    if bytes.len() >= HMI_TAG.len() && &bytes[0..HMI_TAG.len()] == HMI_TAG {
        let division_raw = u16::from_le_bytes([
            *bytes.get(HMI_OFFSET_DIVISION)?,
            *bytes.get(HMI_OFFSET_DIVISION + 1)?,
        ]);
        let division = division_raw << 2;
        let ntracks = u16::from_le_bytes([
            *bytes.get(HMI_OFFSET_TRACKS_COUNT)?,
            *bytes.get(HMI_OFFSET_TRACKS_COUNT + 1)?,
        ]) as usize;

        let mut spans = Vec::with_capacity(ntracks);
        for i in 0..ntracks {
            let dir_off = HMI_OFFSET_TRACK_DIR + i * HMI_SIZE_TRACK_DIR_HEAD;
            let track_off = u32::from_le_bytes([
                *bytes.get(dir_off)?,
                *bytes.get(dir_off + 1)?,
                *bytes.get(dir_off + 2)?,
                *bytes.get(dir_off + 3)?,
            ]) as usize;
            let data_start = track_off + HMI_OFFSET_TRACK_DATA_OFFSET;
            let device_mask = *bytes.get(track_off + HMI_OFFSET_TRACK_DEVICES)? as u32;
            let len = bytes.len().saturating_sub(data_start);
            spans.push(TrackSpan {
                start: data_start,
                len,
                device_mask,
            });
        }
        Some((Variant::Hmi, division, spans))
    } else if bytes.len() >= 8 && &bytes[0..8] == b"HMIMIDIP" {
        let mut pos = 8usize;
        pos += 4; // version tag, unchecked beyond presence.
        let ntracks = u32::from_le_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?) as usize;
        pos += 4;
        let _branch_offset = u32::from_le_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?);
        pos += 4;
        let division = u32::from_le_bytes(bytes.get(pos..pos + 4)?.try_into().ok()?).min(u16::MAX as u32) as u16;
        pos += 4;

        let mut spans = Vec::with_capacity(ntracks);
        let mut cursor = pos;
        for _ in 0..ntracks {
            let chunk_len = u32::from_le_bytes(bytes.get(cursor..cursor + 4)?.try_into().ok()?) as usize;
            let data_start = cursor + HMP_OFFSET_TRACK_DATA;
            let body_len = chunk_len.saturating_sub(HMP_OFFSET_TRACK_DATA);
            spans.push(TrackSpan {
                start: data_start,
                len: body_len,
                device_mask: 0,
            });
            cursor += chunk_len;
        }
        Some((Variant::Hmp, division, spans))
    } else {
        None
    }
}

fn parse_special(cursor: &mut ByteCursor) -> LibResult<Event> {
    let subtype = cursor.read_or_die().context(io!())?;
    let event = match subtype {
        ST_HMI_NEW_BRANCH => {
            let data = cursor.read_n(2).context(io!())?;
            let id = data[1];
            let extra_len = cursor.read_or_die().context(io!())? as usize;
            cursor.read_n(extra_len + 4).context(io!())?;
            Event::new(EventKind::Meta(MetaKind::BranchLocation { id }))
        }
        ST_HMI_JUMP_TO_LOC_BRANCH => {
            let data = cursor.read_n(2).context(io!())?;
            cursor.read_n(4).context(io!())?;
            Event::new(EventKind::Meta(MetaKind::BranchTo { id: data[1] }))
        }
        ST_HMI_TRACK_LOOP_START => {
            let data = cursor.read_n(2).context(io!())?;
            let count = if data[0] == 0xFF { 0 } else { data[0].saturating_add(1) };
            Event::new(EventKind::Meta(MetaKind::LoopStackBegin {
                id: None,
                count,
                track_local: true,
            }))
        }
        ST_HMI_TRACK_LOOP_END => {
            cursor.read_n(6).context(io!())?;
            Event::new(EventKind::Meta(MetaKind::LoopStackEnd {
                id: None,
                track_local: true,
            }))
        }
        ST_HMI_GLOB_LOOP_START => {
            let data = cursor.read_n(2).context(io!())?;
            let count = if data[0] == 0xFF { 0 } else { data[0].saturating_add(1) };
            Event::new(EventKind::Meta(MetaKind::LoopStackBegin {
                id: None,
                count,
                track_local: false,
            }))
        }
        ST_HMI_GLOB_LOOP_END => {
            cursor.read_n(6).context(io!())?;
            Event::new(EventKind::Meta(MetaKind::LoopStackEnd {
                id: None,
                track_local: false,
            }))
        }
        ST_HMI_JUMP_TO_GLOB_BRANCH => {
            let data = cursor.read_n(2).context(io!())?;
            Event::new(EventKind::Meta(MetaKind::BranchTo { id: data[1] }))
        }
        other => {
            truncated!("unsupported HMI special sub-event {:#x}", other);
        }
    };
    Ok(event)
}

fn hmi_control_change_event(channel: MidiChannel, controller: u8, value: u8) -> Event {
    match controller {
        HMI_CC_RESTORE_ENABLE => Event::new(EventKind::Meta(MetaKind::RestoreOnLoopEnable(ControllerClass(value)))),
        HMI_CC_RESTORE_DISABLE => Event::new(EventKind::Meta(MetaKind::RestoreOnLoopDisable(ControllerClass(value)))),
        HMI_CC_SET_LOCAL_BRANCH | HMI_CC_SET_GLOBAL_BRANCH => Event::new(EventKind::Meta(MetaKind::BranchLocation { id: value })),
        HMI_CC_JUMP_TO_LOC_BRANCH | HMI_CC_JUMP_TO_GLOB_BRANCH => Event::new(EventKind::Meta(MetaKind::BranchTo { id: value })),
        HMI_CC_GLOB_LOOP_START => Event::new(EventKind::Meta(MetaKind::LoopStackBegin {
            id: None,
            count: value,
            track_local: false,
        })),
        HMI_CC_GLOB_LOOP_END => Event::new(EventKind::Meta(MetaKind::LoopStackEnd {
            id: None,
            track_local: false,
        })),
        HMI_CC_LOCAL_LOOP_START => Event::new(EventKind::Meta(MetaKind::LoopStackBegin {
            id: None,
            count: value,
            track_local: true,
        })),
        HMI_CC_LOCAL_LOOP_END => Event::new(EventKind::Meta(MetaKind::LoopStackEnd {
            id: None,
            track_local: true,
        })),
        HMI_CC_CALLBACK_TRIGGER => Event::new(EventKind::Meta(MetaKind::CallbackTrigger { payload: value })),
        _ => Event::new(EventKind::CtrlChange {
            channel,
            controller,
            value: ControlValue::new(value),
        }),
    }
}

fn parse_one_track(
    bytes: &[u8],
    span: &TrackSpan,
    variant: Variant,
    text_bank: &mut ByteBank,
    track_index: usize,
    tempo_events: &mut Vec<TempoEvent>,
) -> LibResult<(EventBank, Vec<crate::core::row::Row>)> {
    let mut cursor = ByteCursor::new(bytes);
    cursor.seek_to(span.start);
    cursor.set_size_limit(span.len);

    let mut builder = TrackBuilder::new();
    let mut running_status: u8 = 0;

    if track_index == 0 {
        builder.push(Event::new(EventKind::Meta(MetaKind::SongBeginHook)));
    }

    loop {
        if cursor.is_end() {
            break;
        }
        let delta = cursor.read_vlq_u32().context(io!())? as u64;
        if delta > 0 {
            builder.advance_and_flush(delta);
        }
        if cursor.is_end() {
            break;
        }

        let first = cursor.peek_or_die().context(io!())?;
        let status = if first & 0x80 != 0 {
            cursor.read_or_die().context(io!())?
        } else {
            if running_status == 0 {
                truncated!("HMI running status used before any status byte was seen");
            }
            running_status
        };

        let event = if status == S_HMI_SPECIAL {
            running_status = 0;
            parse_special(&mut cursor)?
        } else if status == 0xFF {
            running_status = 0;
            let meta_type = cursor.read_or_die().context(io!())?;
            if meta_type == 0x2F {
                Event::new(EventKind::Meta(MetaKind::EndOfTrack))
            } else if meta_type == 0x51 {
                let payload = cursor.read_n(3).context(io!())?;
                let mpq = ((payload[0] as u32) << 16) | ((payload[1] as u32) << 8) | payload[2] as u32;
                tempo_events.push(TempoEvent {
                    absolute_tick: builder.absolute_tick(),
                    microseconds_per_quarter: mpq,
                });
                Event::new(EventKind::Meta(MetaKind::SetTempo {
                    microseconds_per_quarter: mpq,
                }))
            } else {
                let length = cursor.read_vlq_u32().context(io!())? as usize;
                let payload = cursor.read_n(length).context(io!())?;
                Event::new(EventKind::Meta(MetaKind::Marker(text_bank.push(&payload))))
            }
        } else if status == 0xF0 || status == 0xF7 {
            running_status = 0;
            let length = cursor.read_vlq_u32().context(io!())? as usize;
            let payload = cursor.read_n(length).context(io!())?;
            Event::new(EventKind::SysEx {
                data: text_bank.push(&payload),
            })
        } else {
            running_status = status;
            let channel = MidiChannel::new(status & 0x0f);
            match status & 0xf0 {
                0x80 => {
                    let note = cursor.read_or_die().context(io!())?;
                    let velocity = cursor.read_or_die().context(io!())?;
                    Event::new(EventKind::NoteOff {
                        channel,
                        note: NoteNumber::new(note),
                        velocity: Velocity::new(velocity),
                    })
                }
                0x90 => {
                    let note = cursor.read_or_die().context(io!())?;
                    let velocity = cursor.read_or_die().context(io!())?;
                    if velocity == 0 {
                        Event::new(EventKind::NoteOff {
                            channel,
                            note: NoteNumber::new(note),
                            velocity: Velocity::new(0),
                        })
                    } else if variant == Variant::Hmi {
                        let duration_ticks = cursor.read_vlq_u32().context(io!())?;
                        Event::new(EventKind::NoteOnDurated {
                            channel,
                            note: NoteNumber::new(note),
                            velocity: Velocity::new(velocity),
                            duration_ticks,
                        })
                    } else {
                        Event::new(EventKind::NoteOn {
                            channel,
                            note: NoteNumber::new(note),
                            velocity: Velocity::new(velocity),
                        })
                    }
                }
                0xA0 => {
                    let note = cursor.read_or_die().context(io!())?;
                    let value = cursor.read_or_die().context(io!())?;
                    Event::new(EventKind::Aftertouch {
                        channel,
                        note: NoteNumber::new(note),
                        value: ControlValue::new(value),
                    })
                }
                0xB0 => {
                    let controller = cursor.read_or_die().context(io!())?;
                    let value = cursor.read_or_die().context(io!())?;
                    hmi_control_change_event(channel, controller, value)
                }
                0xC0 => {
                    let program = cursor.read_or_die().context(io!())?;
                    Event::new(EventKind::PatchChange {
                        channel,
                        program: Program::new(program),
                    })
                }
                0xD0 => {
                    let value = cursor.read_or_die().context(io!())?;
                    Event::new(EventKind::ChannelPressure {
                        channel,
                        value: ControlValue::new(value),
                    })
                }
                0xE0 => {
                    let lsb = cursor.read_or_die().context(io!())?;
                    let msb = cursor.read_or_die().context(io!())?;
                    let value = ((msb as u16 & 0x7f) << 7) | (lsb as u16 & 0x7f);
                    Event::new(EventKind::PitchBend {
                        channel,
                        value: PitchBend14::new(value),
                    })
                }
                _ => unsupported_format!(),
            }
        };

        let is_end = event.is_end_of_track();
        builder.push(event);
        if is_end {
            break;
        }
    }

    cursor.clear_size_limit();
    builder.push(Event::new(EventKind::Meta(MetaKind::EndOfTrack)));
    Ok(builder.finish())
}

pub(crate) fn parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<ParsedHmi> {
    let bytes = cursor.as_slice();
    let (variant, division, spans) = match header(bytes) {
        Some(parsed) => parsed,
        None => unsupported_format!(),
    };

    if spans.is_empty() {
        truncated!("HMI/HMP file declares zero tracks");
    }

    let mut tracks = Vec::with_capacity(spans.len());
    let mut banks = Vec::with_capacity(spans.len());
    let mut tempo_events = Vec::new();

    for (track_index, span) in spans.iter().enumerate() {
        let (bank, rows) = parse_one_track(bytes, span, variant, text_bank, track_index, &mut tempo_events)?;
        if rows.is_empty() {
            truncated!("HMI/HMP track {} produced no rows", track_index);
        }
        let mut track = Track::new(false);
        track.rows = rows;
        track.device_mask = DeviceMask(span.device_mask);
        tracks.push(track);
        banks.push(bank);
    }

    Ok(ParsedHmi {
        division,
        tracks,
        banks,
        tempo_events,
    })
}
