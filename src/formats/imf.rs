//! IMF (id Software raw-OPL-poke format) parser. A 2-byte length-prefixed
//! header, then a flat stream of 4-byte `(register, value, delay_lo,
//! delay_hi)` records, each becoming a [`MetaKind::RawOplPoke`].

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::error::{truncated, LibResult};
use crate::formats::common::TrackBuilder;
use snafu::ResultExt;

/// The literal 3-byte tempo constant every IMF file uses, read big-endian
/// the same way a `set_tempo` meta event's payload would be.
const IMF_FIXED_TEMPO_BYTES: [u8; 3] = [0x00, 0x05, 0x94];

pub(crate) struct ParsedImf {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

pub(crate) fn parse(cursor: &mut ByteCursor, _text_bank: &mut ByteBank) -> LibResult<ParsedImf> {
    let length_prefix = cursor.read_u16_le().context(io!())?;
    let body_end = if length_prefix == 0 {
        // "Type 0": no length prefix is meaningful; there's no file handle
        // to ask for a size, so "until EOF" means "until the in-memory
        // slice ends".
        cursor.as_slice().len()
    } else {
        cursor.position() + length_prefix as usize
    };

    let mut builder = TrackBuilder::new();
    builder.push(Event::new(EventKind::Meta(MetaKind::SongBeginHook)));

    let microseconds_per_quarter = ((IMF_FIXED_TEMPO_BYTES[0] as u32) << 16)
        | ((IMF_FIXED_TEMPO_BYTES[1] as u32) << 8)
        | IMF_FIXED_TEMPO_BYTES[2] as u32;
    builder.push(Event::new(EventKind::Meta(MetaKind::SetTempo {
        microseconds_per_quarter,
    })));
    let tempo_events = vec![TempoEvent {
        absolute_tick: 0,
        microseconds_per_quarter,
    }];

    while cursor.position() + 4 <= body_end {
        let register = cursor.read_or_die().context(io!())?;
        let value = cursor.read_or_die().context(io!())?;
        let delay = cursor.read_u16_le().context(io!())? as u64;

        builder.push(Event::new(EventKind::Meta(MetaKind::RawOplPoke { register, value })));
        if delay > 0 {
            builder.advance_and_flush(delay);
        }
    }

    builder.push(Event::new(EventKind::Meta(MetaKind::EndOfTrack)));
    let (bank, rows) = builder.finish();
    if rows.is_empty() {
        truncated!("IMF track produced no rows");
    }

    let mut track = Track::new(true);
    track.rows = rows;

    Ok(ParsedImf {
        division: 1,
        tracks: vec![track],
        banks: vec![bank],
        tempo_events,
    })
}
