//! RSXX format. Identified by a length-prefixed signature scan rather than a
//! fixed leading tag: a 14-byte header's first byte must be `>= 0x5D`, then
//! `start - 0x10` must hold the literal `"rsxx}u"`. Division is fixed at 60
//! ticks/quarter; the body is the same SMF-shaped event stream GMF uses.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::error::{truncated, unsupported_format, LibResult};
use crate::formats::common::{build_one_track, SourceFormat};
use snafu::ResultExt;

pub(crate) const RSXX_DIVISION: u16 = 60;

pub(crate) struct ParsedRsxx {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

/// Returns `true` if the byte slice looks like an RSXX file, without
/// consuming anything (used by the format sniffer).
pub(crate) fn looks_like_rsxx(bytes: &[u8]) -> bool {
    if bytes.len() < 14 {
        return false;
    }
    let start = bytes[0] as usize;
    if start < 0x5D || start < 0x10 {
        return false;
    }
    let tag_at = start - 0x10;
    bytes.get(tag_at..tag_at + 6) == Some(b"rsxx}u".as_ref())
}

pub(crate) fn parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<ParsedRsxx> {
    let header = cursor.read_n(14).context(io!())?;
    let start = header[0] as usize;
    if start < 0x5D || start < 0x10 {
        unsupported_format!();
    }
    cursor.seek_to(start - 0x10);
    let tag = cursor.read_n(6).context(io!())?;
    if tag != b"rsxx}u" {
        unsupported_format!();
    }
    cursor.seek_to(start);

    let mut tempo_events = Vec::new();
    let (bank, rows) = build_one_track(cursor, text_bank, &mut tempo_events, 0, SourceFormat::Rsxx)?;
    if rows.is_empty() {
        truncated!("RSXX track produced no rows");
    }

    let mut track = Track::new(true);
    track.rows = rows;

    Ok(ParsedRsxx {
        division: RSXX_DIVISION,
        tracks: vec![track],
        banks: vec![bank],
        tempo_events,
    })
}
