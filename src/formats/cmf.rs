//! Creative Music File (`CTMF`) parser. Reads a bank of raw 16-byte OPL
//! instrument patches plus title/author/remark offsets, then parses the
//! song body through the shared SMF-shaped event walker with CMF's extra
//! controllers enabled.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::error::{truncated, unsupported_format, LibResult};
use crate::formats::common::{build_one_track, SourceFormat};
use log::debug;
use snafu::ResultExt;

/// One raw 16-byte OPL instrument patch as embedded directly in a CMF file,
/// indexed by program number. A host-supplied instrument bank takes
/// precedence on lookup collision; this bank only fills gaps the host
/// didn't cover.
#[derive(Clone, Debug, Default)]
pub(crate) struct CmfInstrumentBank {
    patches: Vec<[u8; 16]>,
}

impl CmfInstrumentBank {
    pub(crate) fn get(&self, program: u8) -> Option<&[u8; 16]> {
        self.patches.get(program as usize)
    }

    pub(crate) fn len(&self) -> usize {
        self.patches.len()
    }
}

pub(crate) struct ParsedCmf {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
    pub(crate) instruments: CmfInstrumentBank,
}

pub(crate) fn parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<ParsedCmf> {
    let header = cursor.read_n(14).context(io!())?;
    if &header[0..4] != b"CTMF" {
        unsupported_format!();
    }

    let ver_major = header[4];
    let ver_minor = header[5];
    if ver_major != 0x01 || (ver_minor != 0x00 && ver_minor != 0x01) {
        truncated!("unsupported CMF version {}.{}", ver_major, ver_minor);
    }

    let ins_start = u16::from_le_bytes([header[6], header[7]]) as usize;
    let mus_start = u16::from_le_bytes([header[8], header[9]]) as usize;
    let ticks_per_quarter = u16::from_le_bytes([header[10], header[11]]).max(1) as u64;
    let ticks_per_second = u16::from_le_bytes([header[12], header[13]]).max(1) as u64;

    // Title/author/remark offsets, then the 16-byte channels-in-use table.
    let _ = cursor.read_n(6).context(io!())?;
    let _ = cursor.read_n(16).context(io!())?;

    let ins_count = if ver_minor == 0x00 {
        cursor.read_or_die().context(io!())? as usize
    } else {
        let count = cursor.read_u16_le().context(io!())? as usize;
        let _tempo_hint = cursor.read_u16_le().context(io!())?;
        count
    };

    cursor.seek_to(ins_start);
    let mut patches = Vec::with_capacity(ins_count);
    for _ in 0..ins_count {
        let raw = cursor.read_n(16).context(io!())?;
        let mut patch = [0u8; 16];
        patch.copy_from_slice(&raw);
        patches.push(patch);
    }
    let instruments = CmfInstrumentBank { patches };

    cursor.seek_to(mus_start);
    let division = ticks_per_quarter.clamp(1, u16::MAX as u64) as u16;
    let microseconds_per_quarter = (1_000_000 * ticks_per_quarter / ticks_per_second) as u32;

    let mut tempo_events = vec![TempoEvent {
        absolute_tick: 0,
        microseconds_per_quarter,
    }];
    let (bank, rows) = build_one_track(cursor, text_bank, &mut tempo_events, 0, SourceFormat::Cmf)?;
    if rows.is_empty() {
        truncated!("CMF track produced no rows");
    }

    let mut track = Track::new(true);
    track.rows = rows;

    debug!(
        "parsed CMF: {} instruments, division {} ticks/quarter, tempo {} us/quarter",
        instruments.len(),
        division,
        microseconds_per_quarter
    );

    Ok(ParsedCmf {
        division,
        tracks: vec![track],
        banks: vec![bank],
        tempo_events,
        instruments,
    })
}
