//! Format sniffing and dispatch. Looks at the first bytes of
//! a score file to pick one of ten on-disk score formats, runs that
//! format's own parser, then folds the divergent per-format results into
//! one [`ParsedScore`] shape so the sequencer and voice allocator never need
//! to know which format a song actually came from.

pub(crate) mod cmf;
pub(crate) mod common;
pub(crate) mod gmf;
pub(crate) mod hmi;
pub(crate) mod imf;
pub(crate) mod klm;
pub(crate) mod mus;
pub(crate) mod rmi;
pub(crate) mod rsxx;
pub(crate) mod smf;
pub(crate) mod xmi;

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::event::MetaKind;
use crate::core::tempo::TempoEvent;
use crate::core::timeline::{build_timeline, EventBank, TimelineSummary};
use crate::core::track::Track;
use crate::error::{unsupported_format, LibResult};
use crate::formats::cmf::CmfInstrumentBank;
use crate::formats::common::{scan_simple_loop, SourceFormat};
use crate::sequencer::loop_state::SimpleLoop;
use crate::text::Text;
use log::debug;

/// The format-independent result of loading any score file. Every
/// format-specific parser above folds into this shape before the sequencer
/// or voice allocator ever sees it.
pub(crate) struct ParsedScore {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) text_bank: ByteBank,
    pub(crate) tempo_events: Vec<TempoEvent>,
    pub(crate) timeline: TimelineSummary,
    pub(crate) loop_points: SimpleLoop,
    pub(crate) metadata: SongMetadata,
    /// Raw OPL patches embedded directly in the file (CMF only); absent for
    /// every other format, which relies entirely on an external bank.
    pub(crate) embedded_instruments: Option<CmfInstrumentBank>,
}

/// Title/copyright/track-name/lyric/marker text harvested from `Text`-class
/// meta events while the timeline is built. Populated once at load time;
/// the sequencer never touches it again.
#[derive(Default)]
pub struct SongMetadata {
    pub title: Option<Text>,
    pub copyright: Option<Text>,
    pub track_names: Vec<Text>,
    pub lyrics: Vec<Text>,
    pub markers: Vec<Text>,
}

fn collect_metadata(tracks: &[Track], banks: &[EventBank], text_bank: &ByteBank) -> SongMetadata {
    let mut metadata = SongMetadata::default();
    for (track_index, track) in tracks.iter().enumerate() {
        let bank = &banks[track_index];
        for row in track.rows.iter() {
            for event in bank.events_for(row) {
                let text_of = |r| Text::from(text_bank.get(r).to_vec());
                match event.kind {
                    crate::core::event::EventKind::Meta(MetaKind::TrackName(r)) => {
                        if track_index == 0 && metadata.title.is_none() {
                            metadata.title = Some(text_of(r));
                        }
                        metadata.track_names.push(text_of(r));
                    }
                    crate::core::event::EventKind::Meta(MetaKind::Copyright(r)) => {
                        metadata.copyright.get_or_insert_with(|| text_of(r));
                    }
                    crate::core::event::EventKind::Meta(MetaKind::Lyric(r)) => {
                        metadata.lyrics.push(text_of(r));
                    }
                    crate::core::event::EventKind::Meta(MetaKind::Marker(r)) => {
                        metadata.markers.push(text_of(r));
                    }
                    _ => {}
                }
            }
        }
    }
    metadata
}

struct Dispatched {
    division: u16,
    tracks: Vec<Track>,
    banks: Vec<EventBank>,
    tempo_events: Vec<TempoEvent>,
    embedded_instruments: Option<CmfInstrumentBank>,
}

/// Sums the bytes at even and odd offsets of `slice`, used by the IMF
/// fallback heuristic below.
fn even_odd_sums(slice: &[u8]) -> (u64, u64) {
    let mut even = 0u64;
    let mut odd = 0u64;
    for (i, b) in slice.iter().enumerate() {
        if i % 2 == 0 {
            even += *b as u64;
        } else {
            odd += *b as u64;
        }
    }
    (even, odd)
}

/// KLM has no magic tag: its only structure is a 5-byte header whose
/// `mus_offset` field must land exactly on an 11-byte-patch boundary past
/// the header, and whose tempo field must be nonzero. Checked only after
/// every tagged format above has already failed to match.
fn looks_like_klm(bytes: &[u8]) -> bool {
    if bytes.len() < 5 {
        return false;
    }
    let tempo = u16::from_le_bytes([bytes[0], bytes[1]]);
    let mus_offset = u16::from_le_bytes([bytes[3], bytes[4]]) as usize;
    if tempo == 0 || mus_offset < 5 || mus_offset > bytes.len() {
        return false;
    }
    (mus_offset - 5) % 11 == 0
}

/// IMF has no magic tag either. Its body is a flat stream of
/// `(register, value, delay_lo, delay_hi)` 4-byte records; real OPL
/// register numbers cluster low (0x00..0xF6) while the interleaved value
/// and delay bytes range over the whole byte space, so the even-offset
/// half of the stream sums noticeably lower than the odd-offset half for a
/// genuine IMF file. This is a last-resort heuristic, not a proof; it runs
/// only once every tagged format has already failed.
fn looks_like_imf(bytes: &[u8]) -> bool {
    let body = if bytes.len() >= 2 {
        let length_prefix = u16::from_le_bytes([bytes[0], bytes[1]]) as usize;
        if length_prefix > 0 && length_prefix + 2 <= bytes.len() {
            &bytes[2..2 + length_prefix]
        } else {
            &bytes[2..]
        }
    } else {
        bytes
    };
    if body.len() < 16 || body.len() % 4 != 0 {
        return false;
    }
    let sample_len = body.len().min(16 * 1024);
    let (even_sum, odd_sum) = even_odd_sums(&body[..sample_len]);
    even_sum * 2 < odd_sum.max(1)
}

fn detect_and_parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<Dispatched> {
    let bytes = cursor.as_slice();

    if bytes.starts_with(b"MThd\0\0\0\x06") {
        let parsed = smf::parse(cursor, text_bank, SourceFormat::Smf)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if bytes.starts_with(b"RIFF") {
        let parsed = rmi::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if bytes.starts_with(b"GMF\x01") {
        let parsed = gmf::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if bytes.starts_with(b"MUS\x1a") {
        let parsed = mus::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if bytes.starts_with(b"HMI-MIDISONG06") || bytes.starts_with(b"HMIMIDIP") {
        let parsed = hmi::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if bytes.starts_with(b"FORM") && bytes.get(8..12) == Some(b"XDIR".as_ref()) {
        let parsed = xmi::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if bytes.starts_with(b"CTMF") {
        let parsed = cmf::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: Some(parsed.instruments),
        });
    }
    if rsxx::looks_like_rsxx(bytes) {
        let parsed = rsxx::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if looks_like_klm(bytes) {
        let parsed = klm::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }
    if looks_like_imf(bytes) {
        let parsed = imf::parse(cursor, text_bank)?;
        return Ok(Dispatched {
            division: parsed.division,
            tracks: parsed.tracks,
            banks: parsed.banks,
            tempo_events: parsed.tempo_events,
            embedded_instruments: None,
        });
    }

    unsupported_format!()
}

/// Loads a complete score from `bytes`: sniffs the format, parses it, builds
/// the unified tempo/row timeline, and scans for a global simple loop.
pub(crate) fn load(bytes: &[u8]) -> LibResult<ParsedScore> {
    let mut cursor = ByteCursor::new(bytes);
    let mut text_bank = ByteBank::new();

    let dispatched = detect_and_parse(&mut cursor, &mut text_bank)?;
    let mut tracks = dispatched.tracks;

    let timeline = build_timeline(&mut tracks, &dispatched.banks, dispatched.division, &dispatched.tempo_events);
    let loop_points = scan_simple_loop(&tracks, &dispatched.banks);
    let metadata = collect_metadata(&tracks, &dispatched.banks, &text_bank);

    debug!(
        "loaded score: {} tracks, division {:#x}, length {:.3}s, loop valid={}",
        tracks.len(),
        dispatched.division,
        timeline.song_length_seconds,
        loop_points.valid
    );

    Ok(ParsedScore {
        division: dispatched.division,
        tracks,
        banks: dispatched.banks,
        text_bank,
        tempo_events: dispatched.tempo_events,
        timeline,
        loop_points,
        metadata,
        embedded_instruments: dispatched.embedded_instruments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_smf() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd\x00\x00\x00\x06\x00\x00\x00\x01\x00\x60");
        let mut track = Vec::new();
        track.extend_from_slice(&[0x00, 0x90, 0x40, 0x40]); // note on
        track.extend_from_slice(&[0x60, 0x80, 0x40, 0x40]); // note off
        track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]); // end of track
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track);
        bytes
    }

    #[test]
    fn dispatches_smf_by_signature() {
        let score = load(&minimal_smf()).expect("minimal SMF should load");
        assert_eq!(score.division, 0x60);
        assert_eq!(score.tracks.len(), 1);
        assert!(score.embedded_instruments.is_none());
    }

    #[test]
    fn unknown_signature_is_an_error() {
        let bytes = vec![0u8; 8];
        assert!(load(&bytes).is_err());
    }

    #[test]
    fn klm_heuristic_rejects_smf_bytes() {
        assert!(!looks_like_klm(&minimal_smf()));
    }
}
