//! KLM compact command-stream format. Expands a tiny command vocabulary
//! (note on/off, volume, instrument select, rhythm toggles, delays) directly
//! into the OPL3 register pokes they represent, including the rhythm-mode
//! register layout. Its instrument bank is 11 bytes per entry, a truncated
//! form of CMF's 16-byte patches; fixed operator-offset tables cover the
//! six melodic channels and five rhythm voices, with a handful of
//! `0xF_`-prefixed special commands for delays and end-of-song.

use crate::byte_iter::ByteCursor;
use crate::core::bank::ByteBank;
use crate::core::event::{Event, EventKind, MetaKind};
use crate::core::tempo::TempoEvent;
use crate::core::timeline::EventBank;
use crate::core::track::Track;
use crate::error::{truncated, truncated_s, LibResult};
use crate::formats::common::TrackBuilder;
use snafu::ResultExt;

/// `(modulator, carrier)` operator offsets for melodic channels 0..=5;
/// `0xFF` marks "no such operator" for the rhythm voices that only drive one.
const OP_MAP: [u8; 12] = [0x00, 0x03, 0x01, 0x04, 0x02, 0x05, 0x08, 0x0B, 0x09, 0x0C, 0x0A, 0x0D];
const RM_MAP: [u8; 10] = [0x10, 0x13, 0xFF, 0x14, 0x12, 0xFF, 0xFF, 0x15, 0x11, 0xFF];
const RM_VOL_MAP: [u8; 5] = [0x13, 0x14, 0x12, 0x15, 0x11];

pub(crate) struct ParsedKlm {
    pub(crate) division: u16,
    pub(crate) tracks: Vec<Track>,
    pub(crate) banks: Vec<EventBank>,
    pub(crate) tempo_events: Vec<TempoEvent>,
}

fn bd_bit(rhythm_channel: u8) -> u8 {
    match rhythm_channel {
        6 => 0x10,
        7 => 0x08,
        8 => 0x04,
        9 => 0x02,
        10 => 0x01,
        _ => 0,
    }
}

pub(crate) fn parse(cursor: &mut ByteCursor, _text_bank: &mut ByteBank) -> LibResult<ParsedKlm> {
    let header = cursor.read_n(5).context(io!())?;
    let tempo = u16::from_le_bytes([header[0], header[1]]).max(1) as u32;
    let mus_offset = u16::from_le_bytes([header[3], header[4]]) as usize;

    let mut instruments: Vec<[u8; 11]> = Vec::new();
    while cursor.position() < mus_offset {
        let raw = cursor.read_n(11).context(io!())?;
        let mut patch = [0u8; 11];
        patch.copy_from_slice(&raw);
        instruments.push(patch);
    }
    if cursor.position() != mus_offset {
        truncated!("KLM instrument table overruns the declared song offset");
    }

    let mut builder = TrackBuilder::new();
    builder.push(Event::new(EventKind::Meta(MetaKind::SongBeginHook)));

    let microseconds_per_quarter = 500_000 / tempo;
    builder.push(Event::new(EventKind::Meta(MetaKind::SetTempo {
        microseconds_per_quarter,
    })));
    let tempo_events = vec![TempoEvent {
        absolute_tick: 0,
        microseconds_per_quarter,
    }];

    let mut poke = |builder: &mut TrackBuilder, register: u8, value: u8| {
        builder.push(Event::new(EventKind::Meta(MetaKind::RawOplPoke { register, value })));
    };

    let mut reg_bd: u8 = 0x20;
    poke(&mut builder, 0xBD, reg_bd);
    let mut reg_b0 = [0u8; 11];
    let mut reg_43 = [0u8; 11];

    const RHYTHM_A0: [u8; 3] = [0x57, 0x03, 0x57];
    const RHYTHM_B0: [u8; 3] = [0x0A, 0x0A, 0x09];
    for c in 6..=8usize {
        poke(&mut builder, 0xA0 + c as u8, RHYTHM_A0[c - 6]);
        reg_b0[c] = RHYTHM_B0[c - 6] & 0xDF;
        poke(&mut builder, 0xB0 + c as u8, reg_b0[c]);
    }

    let mut reached_end = false;
    while !cursor.is_end() {
        let cmd = cursor.read_or_die().context(io!())?;
        let chan = cmd & 0x0f;
        if (cmd & 0xF0) != 0xF0 && chan >= 11 {
            truncated!("KLM channel {} out of range", chan);
        }

        match cmd & 0xF0 {
            0x00 => {
                // Note off.
                if chan <= 5 {
                    let c = chan as usize;
                    reg_b0[c] &= 0xDF;
                    poke(&mut builder, 0xB0 + chan, reg_b0[c]);
                } else {
                    reg_bd &= !bd_bit(chan);
                    poke(&mut builder, 0xBD, reg_bd);
                }
            }
            0x10 => {
                // Note on with explicit frequency (melodic channels only).
                if chan > 6 {
                    reg_bd |= bd_bit(chan);
                    poke(&mut builder, 0xBD, reg_bd);
                } else {
                    let data = cursor.read_n(2).context(io!())?;
                    let c = chan as usize;
                    poke(&mut builder, 0xA0 + chan, data[0]);
                    if chan < 6 {
                        reg_b0[c] = (data[1] & 0xDF) | 0x20;
                    } else {
                        reg_b0[c] = data[1] & 0xDF;
                    }
                    poke(&mut builder, 0xB0 + chan, reg_b0[c]);
                }
            }
            0x20 => {
                // Volume.
                let data = cursor.read_or_die().context(io!())?;
                let c = chan as usize;
                reg_43[c] = (reg_43[c] & 0xC0) | (((127u16 - data as u16) / 2) as u8 & 0x3F);
                let register = if chan < 6 {
                    0x40 + OP_MAP[c * 2 + 1]
                } else {
                    0x40 + RM_VOL_MAP[c - 6]
                };
                poke(&mut builder, register, reg_43[c]);
            }
            0x30 => {
                // Set instrument.
                let program = cursor.read_or_die().context(io!())?;
                let c = chan as usize;
                let patch = instruments
                    .get(program as usize)
                    .ok_or_else(|| truncated_s!("KLM instrument index {} out of range", program).build())?;

                let (off_mod, off_car) = if chan < 6 {
                    (OP_MAP[c * 2], OP_MAP[c * 2 + 1])
                } else {
                    (RM_MAP[(c - 6) * 2], RM_MAP[(c - 6) * 2 + 1])
                };

                if off_mod != 0xFF {
                    poke(&mut builder, 0x40 + off_mod, patch[0]);
                    poke(&mut builder, 0x60 + off_mod, patch[2]);
                    poke(&mut builder, 0x80 + off_mod, patch[4]);
                    poke(&mut builder, 0x20 + off_mod, patch[6]);
                    poke(&mut builder, 0xE0 + off_mod, patch[8]);
                }
                if off_car != 0xFF {
                    reg_43[c] = patch[1];
                    poke(&mut builder, 0x40 + off_car, reg_43[c]);
                    poke(&mut builder, 0x60 + off_car, patch[3]);
                    poke(&mut builder, 0x80 + off_car, patch[5]);
                    poke(&mut builder, 0x20 + off_car, patch[7]);
                    poke(&mut builder, 0xE0 + off_car, patch[9]);
                }
                if chan <= 6 {
                    poke(&mut builder, 0xC0 + chan, patch[10] | 0x30);
                }
            }
            0x40 => {
                // Note on without frequency (retrigger current pitch).
                if chan < 6 {
                    let c = chan as usize;
                    reg_b0[c] |= 0x20;
                    poke(&mut builder, 0xB0 + chan, reg_b0[c]);
                } else {
                    reg_bd |= bd_bit(chan);
                    poke(&mut builder, 0xBD, reg_bd);
                }
            }
            0xF0 => match cmd {
                0xFD => {
                    let data = cursor.read_or_die().context(io!())?;
                    let delay = data as u64 * 2;
                    if delay > 0 {
                        builder.advance_and_flush(delay);
                    }
                }
                0xFE => {
                    let data = cursor.read_n(2).context(io!())?;
                    let delay = (data[0] as u64 + ((data[1] as u64) << 8)) * 2;
                    if delay > 0 {
                        builder.advance_and_flush(delay);
                    }
                }
                0xFF => {
                    reached_end = true;
                }
                other => truncated!("unsupported KLM special command {:#x}", other),
            },
            other => truncated!("unsupported KLM command {:#x}", other),
        }

        if reached_end {
            break;
        }
    }

    builder.push(Event::new(EventKind::Meta(MetaKind::EndOfTrack)));
    let (bank, rows) = builder.finish();
    if rows.is_empty() {
        truncated!("KLM track produced no rows");
    }

    let mut track = Track::new(true);
    track.rows = rows;

    Ok(ParsedKlm {
        division: 1,
        tracks: vec![track],
        banks: vec![bank],
        tempo_events,
    })
}
