//! GMF (`"GMF\x01"`) single-track format. A 14-byte header followed by a
//! seek to absolute offset 7, a fixed division of 192 ticks/quarter, and a
//! single track body parsed by the shared SMF-shaped event walker that GMF
//! and RSXX both delegate to.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::error::{truncated, LibResult};
use crate::formats::common::{build_one_track, SourceFormat};
use snafu::ResultExt;

pub(crate) const GMF_DIVISION: u16 = 192;

pub(crate) struct ParsedGmf {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

pub(crate) fn parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<ParsedGmf> {
    cursor.expect_tag("GMF\x01").context(io!())?;
    cursor.seek_to(7);

    let mut tempo_events = Vec::new();
    let (bank, rows) = build_one_track(cursor, text_bank, &mut tempo_events, 0, SourceFormat::Gmf)?;
    if rows.is_empty() {
        truncated!("GMF track produced no rows");
    }

    let mut track = Track::new(true);
    track.rows = rows;

    Ok(ParsedGmf {
        division: GMF_DIVISION,
        tracks: vec![track],
        banks: vec![bank],
        tempo_events,
    })
}
