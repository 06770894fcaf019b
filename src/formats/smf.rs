//! Standard MIDI File parser. Reads the 14-byte header, then
//! each `MTrk` chunk through the shared [`crate::formats::common`] event
//! walker.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::tempo::TempoEvent;
use crate::core::track::Track;
use crate::core::timeline::EventBank;
use crate::error::{truncated, LibResult};
use crate::formats::common::{build_one_track, read_smf_header, SourceFormat};
use log::debug;
use snafu::ResultExt;

pub(crate) struct ParsedSmf {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

/// Parses a whole SMF byte stream, starting at the `MThd` tag. Used both for
/// plain `.mid` files and as the re-entry point for RMI and per-song XMI
/// blobs, which each hand this function an in-memory SMF buffer of their own.
pub(crate) fn parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank, source: SourceFormat) -> LibResult<ParsedSmf> {
    let (_format, ntracks, division) = read_smf_header(cursor)?;

    let mut tracks = Vec::with_capacity(ntracks as usize);
    let mut banks = Vec::with_capacity(ntracks as usize);
    let mut tempo_events = Vec::new();

    for track_index in 0..ntracks as usize {
        cursor.expect_tag("MTrk").context(io!())?;
        let length = cursor.read_u32().context(io!())? as usize;
        let track_start = cursor.position();
        cursor.set_size_limit(length);
        let (bank, rows) = build_one_track(cursor, text_bank, &mut tempo_events, track_index, source)?;
        cursor.clear_size_limit();
        cursor.seek_to(track_start + length);

        if rows.is_empty() {
            truncated!("track {} produced no rows", track_index);
        }

        let mut track = Track::new(true);
        track.rows = rows;
        tracks.push(track);
        banks.push(bank);
    }

    debug!("parsed SMF: {} tracks, division {:#x}", tracks.len(), division);

    Ok(ParsedSmf {
        division,
        tracks,
        banks,
        tempo_events,
    })
}
