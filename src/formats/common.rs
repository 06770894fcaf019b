//! Shared channel-message and meta-event parsing used by every container
//! format whose event body is "SMF-shaped": SMF itself, RMI (after its
//! RIFF header is stripped), GMF and RSXX (after their fixed preambles),
//! CMF's track body, and XMI's per-song blob after IFF unwrapping.

use crate::byte_iter::ByteCursor;
use crate::constants::*;
use crate::core::bank::ByteBank;
use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::numbers::{ControlValue, MidiChannel, NoteNumber, PitchBend14, Program, Velocity};
use crate::core::row::Row;
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::error::{truncated, truncated_s, unsupported_format, LibResult};
use log::{debug, trace, warn};
use snafu::ResultExt;

/// Which container this event body came from; changes a handful of
/// controller-number and note-on interpretations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SourceFormat {
    Smf,
    Xmi,
    Cmf,
    Gmf,
    Rsxx,
}

impl SourceFormat {
    fn handles_smf_loop_ccs(self) -> bool {
        matches!(self, SourceFormat::Smf | SourceFormat::Gmf | SourceFormat::Rsxx | SourceFormat::Cmf)
    }

    fn handles_xmi_loop_ccs(self) -> bool {
        matches!(self, SourceFormat::Xmi)
    }

    fn handles_cmf_extra_ccs(self) -> bool {
        matches!(self, SourceFormat::Cmf)
    }
}

/// Accumulates events into rows as a track body is walked: holds the event
/// bank, the finished rows, and the row currently being filled. Every
/// format parser appends to the current row, then flushes it into a new
/// row whenever the next event's delta time is greater than zero.
pub(crate) struct TrackBuilder {
    bank: EventBank,
    rows: Vec<Row>,
    current: Row,
    absolute_tick: u64,
    sounding: crate::core::row::NoteSoundingSet,
}

impl TrackBuilder {
    pub(crate) fn new() -> Self {
        Self {
            bank: EventBank::new(),
            rows: Vec::new(),
            current: Row::new(0, 0),
            absolute_tick: 0,
            sounding: crate::core::row::NoteSoundingSet::new(),
        }
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.bank.append_event(&mut self.current, event);
    }

    /// Advances the absolute tick and flushes the row that was accumulating
    /// at the old tick, opening a fresh row at the new tick. Only called
    /// when the delay preceding the next event is non-zero.
    pub(crate) fn advance_and_flush(&mut self, delta_ticks: u64) {
        self.bank.finish_row(&self.current, &mut self.sounding);
        self.rows.push(self.current);
        self.absolute_tick += delta_ticks;
        let begin = self.current.events_end;
        self.current = Row::new(self.absolute_tick, begin);
    }

    pub(crate) fn absolute_tick(&self) -> u64 {
        self.absolute_tick
    }

    /// Flushes whatever is left in the in-progress row (used once at end of
    /// track, after `end_of_track` has already been pushed into it).
    pub(crate) fn finish(mut self) -> (EventBank, Vec<Row>) {
        if self.current.len() > 0 || self.rows.is_empty() {
            self.bank.finish_row(&self.current, &mut self.sounding);
            self.rows.push(self.current);
        }
        (self.bank, self.rows)
    }
}

/// Parses one `0xFF <type> <vlq-length> <bytes>` meta event. `channel_hint`
/// is unused by meta events themselves but kept for symmetry with the
/// channel-event parser.
fn parse_meta(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<Event> {
    let meta_type = cursor.read_or_die().context(io!())?;
    let length = cursor.read_vlq_u32().context(io!())? as usize;
    let payload = cursor.read_n(length).context(io!())?;

    let kind = match meta_type {
        META_TEXT => MetaKind::Text(text_bank.push(&payload)),
        META_COPYRIGHT => MetaKind::Copyright(text_bank.push(&payload)),
        META_TRACK_NAME => MetaKind::TrackName(text_bank.push(&payload)),
        META_INSTRUMENT_NAME => MetaKind::InstrumentName(text_bank.push(&payload)),
        META_LYRIC => MetaKind::Lyric(text_bank.push(&payload)),
        META_MARKER => {
            if let Some(loop_meta) = loop_text_marker(&payload) {
                loop_meta
            } else {
                MetaKind::Marker(text_bank.push(&payload))
            }
        }
        META_CUE_POINT => MetaKind::CuePoint(text_bank.push(&payload)),
        META_SET_TEMPO => {
            if payload.len() != 3 {
                truncated!("set_tempo meta must carry exactly 3 bytes");
            }
            let microseconds_per_quarter =
                ((payload[0] as u32) << 16) | ((payload[1] as u32) << 8) | payload[2] as u32;
            MetaKind::SetTempo {
                microseconds_per_quarter,
            }
        }
        META_END_OF_TRACK => MetaKind::EndOfTrack,
        _ => {
            trace!("ignoring meta event type {:#x}", meta_type);
            return Ok(Event::new(EventKind::Meta(MetaKind::Marker(
                text_bank.push(&payload),
            ))));
        }
    };
    Ok(Event::new(EventKind::Meta(kind)))
}

/// Recognises `loopstart`, `loopend`, `loopstart=<n>`, `loopend=` marker
/// text and synthesises the matching loop event.
fn loop_text_marker(payload: &[u8]) -> Option<MetaKind> {
    let text = std::str::from_utf8(payload).ok()?.trim();
    if text.eq_ignore_ascii_case("loopstart") || text.to_ascii_lowercase().starts_with("loopstart=") {
        Some(MetaKind::LoopStart)
    } else if text.eq_ignore_ascii_case("loopend") || text.to_ascii_lowercase().starts_with("loopend=") {
        Some(MetaKind::LoopEnd)
    } else {
        None
    }
}

/// Parses one `F0`/`F7`-prefixed SysEx event. `first` is the byte already
/// consumed by the caller (`0xF0` or `0xF7`).
fn parse_sysex(cursor: &mut ByteCursor, text_bank: &mut ByteBank, _first: u8) -> LibResult<Event> {
    let length = cursor.read_vlq_u32().context(io!())? as usize;
    let payload = cursor.read_n(length).context(io!())?;
    let data = text_bank.push(&payload);
    Ok(Event::new(EventKind::SysEx { data }))
}

/// Loop-controller and transpose state carried across a single track's
/// events, since HMI-style SMF loop CCs and CMF's extra CCs depend on what
/// has already been observed ("unless the file has already shown a CC111
/// alone... or CC113").
#[derive(Default)]
pub(crate) struct LoopCcState {
    seen_cc111_alone: bool,
    seen_cc113: bool,
    seen_cc110: bool,
}

/// Parses one channel-voice event given its status byte (already resolved
/// through running status by the caller). Returns the normalised event and,
/// for loop/transpose controllers, may instead emit a synthetic meta event.
fn parse_channel_event(
    cursor: &mut ByteCursor,
    status: u8,
    source: SourceFormat,
    loop_state: &mut LoopCcState,
) -> LibResult<Event> {
    let channel = MidiChannel::new(status & STATUS_CHANNEL_MASK);
    let kind = match status & STATUS_TYPE_MASK {
        STATUS_NOTE_OFF => {
            let note = cursor.read_or_die().context(io!())?;
            let velocity = cursor.read_or_die().context(io!())?;
            EventKind::NoteOff {
                channel,
                note: NoteNumber::new(note),
                velocity: Velocity::new(velocity),
            }
        }
        STATUS_NOTE_ON => {
            let note = cursor.read_or_die().context(io!())?;
            let velocity = cursor.read_or_die().context(io!())?;
            if velocity == 0 {
                EventKind::NoteOff {
                    channel,
                    note: NoteNumber::new(note),
                    velocity: Velocity::new(0),
                }
            } else {
                EventKind::NoteOn {
                    channel,
                    note: NoteNumber::new(note),
                    velocity: Velocity::new(velocity),
                }
            }
        }
        STATUS_POLY_PRESSURE => {
            let note = cursor.read_or_die().context(io!())?;
            let value = cursor.read_or_die().context(io!())?;
            EventKind::Aftertouch {
                channel,
                note: NoteNumber::new(note),
                value: ControlValue::new(value),
            }
        }
        STATUS_CONTROL => {
            let controller = cursor.read_or_die().context(io!())?;
            let value = cursor.read_or_die().context(io!())?;
            return Ok(control_change_event(
                channel, controller, value, source, loop_state,
            ));
        }
        STATUS_PROGRAM => {
            let program = cursor.read_or_die().context(io!())?;
            EventKind::PatchChange {
                channel,
                program: Program::new(program),
            }
        }
        STATUS_CHANNEL_PRESSURE => {
            let value = cursor.read_or_die().context(io!())?;
            EventKind::ChannelPressure {
                channel,
                value: ControlValue::new(value),
            }
        }
        STATUS_PITCH_BEND => {
            let lsb = cursor.read_or_die().context(io!())?;
            let msb = cursor.read_or_die().context(io!())?;
            let value = ((msb as u16 & 0x7f) << 7) | (lsb as u16 & 0x7f);
            EventKind::PitchBend {
                channel,
                value: PitchBend14::new(value),
            }
        }
        _ => unsupported_format!(),
    };
    Ok(Event::new(kind))
}

/// Turns one control-change into either a plain `CtrlChange` event or a
/// synthesised loop/branch/transpose meta, per the source format's quirks.
pub(crate) fn control_change_event(
    channel: MidiChannel,
    controller: u8,
    value: u8,
    source: SourceFormat,
    loop_state: &mut LoopCcState,
) -> Event {
    if source.handles_smf_loop_ccs() {
        match controller {
            CC_SMF_EMIDI_DISABLE_LOOP => {
                loop_state.seen_cc113 = true;
            }
            CC_SMF_LOOP_START if !loop_state.seen_cc113 => {
                loop_state.seen_cc110 = true;
                return Event::new(EventKind::Meta(MetaKind::LoopStart));
            }
            CC_SMF_LOOP_END if !loop_state.seen_cc113 => {
                if !loop_state.seen_cc110 {
                    // RPG-Maker style: CC111 alone marks loop start the
                    // first time it is seen, loop end every time after.
                    if !loop_state.seen_cc111_alone {
                        loop_state.seen_cc111_alone = true;
                        return Event::new(EventKind::Meta(MetaKind::LoopStart));
                    }
                }
                return Event::new(EventKind::Meta(MetaKind::LoopEnd));
            }
            _ => {}
        }
    }
    if source.handles_xmi_loop_ccs() {
        match controller {
            CC_XMI_LOOP_BEGIN => {
                return Event::new(EventKind::Meta(MetaKind::LoopStackBegin {
                    id: None,
                    count: value,
                    track_local: false,
                }));
            }
            CC_XMI_LOOP_END => {
                return Event::new(EventKind::Meta(MetaKind::LoopStackEnd {
                    id: None,
                    track_local: false,
                }));
            }
            CC_XMI_CALLBACK_TRIGGER => {
                return Event::new(EventKind::Meta(MetaKind::CallbackTrigger { payload: value }));
            }
            _ => {}
        }
    }
    if source.handles_cmf_extra_ccs() {
        match controller {
            CC_CMF_CALLBACK_TRIGGER => {
                return Event::new(EventKind::Meta(MetaKind::CallbackTrigger { payload: value }));
            }
            CC_CMF_TRANSPOSE_UP => {
                return Event::new(EventKind::PitchBend {
                    channel,
                    value: PitchBend14::new(8192u16.saturating_add((value as u16) * 64)),
                });
            }
            CC_CMF_TRANSPOSE_DOWN => {
                return Event::new(EventKind::PitchBend {
                    channel,
                    value: PitchBend14::new(8192u16.saturating_sub((value as u16) * 64)),
                });
            }
            _ => {}
        }
    }
    Event::new(EventKind::CtrlChange {
        channel,
        controller,
        value: ControlValue::new(value),
    })
}

/// Walks one SMF-shaped track body from `cursor` (already positioned at the
/// first delta-time, bounded to `track_len` bytes by the caller) to
/// completion, returning its finished event bank and rows. Used directly by
/// SMF/RMI/GMF/RSXX/CMF, and indirectly by XMI after its IFF container is
/// flattened into an SMF blob.
pub(crate) fn build_one_track(
    cursor: &mut ByteCursor,
    text_bank: &mut ByteBank,
    tempo_events: &mut Vec<TempoEvent>,
    track_index: usize,
    source: SourceFormat,
) -> LibResult<(EventBank, Vec<Row>)> {
    let mut builder = TrackBuilder::new();
    let mut loop_cc_state = LoopCcState::default();
    let mut running_status: u8 = 0;

    if track_index == 0 {
        builder.push(Event::new(EventKind::Meta(MetaKind::SongBeginHook)));
    }

    loop {
        let delta = cursor.read_vlq_u32().context(io!())? as u64;
        if delta > 0 {
            builder.advance_and_flush(delta);
        }

        if cursor.is_end() {
            warn!(
                "track {} ran out of bytes without an end_of_track meta",
                track_index
            );
            break;
        }

        let first = cursor.peek_or_die().context(io!())?;
        let status = if first & 0x80 != 0 {
            cursor.read_or_die().context(io!())?
        } else {
            if running_status == 0 {
                truncated!("running status used before any status byte was seen");
            }
            running_status
        };

        let event = match status {
            META_EVENT => parse_meta(cursor, text_bank)?,
            SYSEX_F0 | SYSEX_F7 => {
                running_status = 0;
                parse_sysex(cursor, text_bank, status)?
            }
            _ => {
                running_status = status;
                parse_channel_event(cursor, status, source, &mut loop_cc_state)?
            }
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

    Ok(builder.finish())
}

/// Second pass over every track's finished rows: records the absolute tick
/// of the first `LoopStart`/`LoopEnd` marker seen and feeds them through
/// `SimpleLoop`'s duplicate/ordering validation. Runs after
/// `build_timeline` so callers can also capture the loop's absolute-second
/// positions.
pub(crate) fn scan_simple_loop(
    tracks: &[crate::core::track::Track],
    banks: &[EventBank],
) -> crate::sequencer::loop_state::SimpleLoop {
    let mut simple = crate::sequencer::loop_state::SimpleLoop::default();
    for (track_index, track) in tracks.iter().enumerate() {
        let bank = &banks[track_index];
        for row in track.rows.iter() {
            for event in bank.events_for(row) {
                match event.kind {
                    EventKind::Meta(MetaKind::LoopStart) => {
                        simple.observe_start(row.absolute_tick);
                        simple.start_seconds = row.time;
                    }
                    EventKind::Meta(MetaKind::LoopEnd) => {
                        simple.observe_end(row.absolute_tick);
                        simple.end_seconds = row.time;
                    }
                    _ => {}
                }
            }
        }
    }
    simple.finalize();
    if !simple.valid {
        debug!("no valid simple loop_start/loop_end pair found");
    }
    simple
}

/// Reads the fixed 14-byte SMF-style header (`MThd`, length=6, format,
/// ntracks, division) and returns `(format, ntracks, division)`.
pub(crate) fn read_smf_header(cursor: &mut ByteCursor) -> LibResult<(u16, u16, u16)> {
    cursor.expect_tag("MThd").context(io!())?;
    let header_len = cursor.read_u32().context(io!())?;
    if header_len != 6 {
        truncated!("SMF header length must be 6, found {}", header_len);
    }
    let format = cursor.read_u16().context(io!())?;
    let ntracks = cursor.read_u16().context(io!())?;
    let division = cursor.read_u16().context(io!())?;
    debug!(
        "SMF header: format={} ntracks={} division={:#x}",
        format, ntracks, division
    );
    Ok((format, ntracks, division))
}
