//! RIFF-wrapped MIDI (`.rmi`). Strips the 8-byte RIFF header plus a 6-byte
//! junk prefix (the `RMID` form type plus the nested `data` chunk's own
//! `MThd`-less preamble bytes) and re-enters the SMF parser.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::error::LibResult;
use crate::formats::common::SourceFormat;
use crate::formats::smf::{self, ParsedSmf};
use snafu::ResultExt;

pub(crate) fn parse(cursor: &mut ByteCursor, text_bank: &mut ByteBank) -> LibResult<ParsedSmf> {
    cursor.expect_tag("RIFF").context(io!())?;
    let _riff_len = cursor.read_u32_le().context(io!())?;
    // 6 bytes of junk precede the nested MThd: the `RMID` form type plus the
    // `data` chunk tag's own length field is skipped by position, not parsed.
    let _ = cursor.read_n(6).context(io!())?;
    smf::parse(cursor, text_bank, SourceFormat::Smf)
}
