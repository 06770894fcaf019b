//! Pitch computation. Four tuning models convert a note number plus
//! fractional bend into Hz; which one applies is chosen once per song from
//! its detected volume model and never changes mid-song. OPL3 then needs
//! that Hz value split into its own block/fnum pair, which stays the host's
//! job behind [`crate::voice::synth_interface::Opl3Interface`].
//!
//! `Dmx`/`DmxFixed`, `Apogee` and `Win9x` each drive their own fixed-point
//! lookup table the way the driver they're named after actually does,
//! rather than a reshaped copy of the equal-tempered exponential `Generic`
//! and `Hmi` use. Every table entry is a block-0 OPL3 F-number, the same
//! quantity a real chip register holds, so every model's output is widened
//! back into Hz with the same F-number-to-Hz conversion at the end:
//! `hz = fnum * OPL_SAMPLE_RATE_HZ / 2^20`.

/// `172.00093 * exp(0.057762265 * (note + bend))`, the generic OPL3
/// MIDI-to-Hz reference curve `Generic` and `Hmi` tune by directly.
const GENERIC_BEND_BASE_HZ: f64 = 172.00093;
const SEMITONE_EXPONENT: f64 = 0.057762265;

/// OPL3's own internal sample clock. Every table below stores a block-0
/// F-number quantized against this rate, not a literal Hz value, so it has
/// to be un-quantized the same way regardless of whatever rate the host
/// mixes its own audio at.
const OPL_SAMPLE_RATE_HZ: f64 = 49_716.0;
const FNUM_SCALE: f64 = 1_048_576.0; // 2^20

const WIN9X_UP_FACTOR: i64 = 31;
const WIN9X_DOWN_FACTOR: i64 = 27;
const WIN9X_PITCH_SHIFT: u32 = 8;

/// Which emulated driver's pitch-bend arithmetic a score should use.
/// Auto-detected from the source format by [`crate::player::Player::load`]
/// but overridable through [`crate::config::PlayerConfig`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VolumeModel {
    Generic,
    Dmx,
    DmxFixed,
    Apogee,
    Win9x,
    Hmi,
}

fn fnum_to_hz(fnum: f64) -> f64 {
    fnum * OPL_SAMPLE_RATE_HZ / FNUM_SCALE
}

fn generic_hz(note: f64, bend: f64) -> f64 {
    GENERIC_BEND_BASE_HZ * (SEMITONE_EXPONENT * (note + bend)).exp()
}

/// DMX's 668-entry F-number table, indexed by `(note << 5) + bend_step`.
/// Past index 284 the table repeats every 384 entries, one entry per
/// 1/32nd semitone, and the caller doubles the looked-up value once per
/// octave the index had to be folded back by.
#[rustfmt::skip]
const DMX_FREQ_TABLE: [u16; 668] = [
    0x0133, 0x0133, 0x0134, 0x0134, 0x0135, 0x0136, 0x0136, 0x0137, 0x0137, 0x0138,
    0x0138, 0x0139, 0x0139, 0x013A, 0x013B, 0x013B, 0x013C, 0x013C, 0x013D, 0x013D,
    0x013E, 0x013F, 0x013F, 0x0140, 0x0140, 0x0141, 0x0142, 0x0142, 0x0143, 0x0143,
    0x0144, 0x0144, 0x0145, 0x0146, 0x0146, 0x0147, 0x0147, 0x0148, 0x0149, 0x0149,
    0x014A, 0x014A, 0x014B, 0x014C, 0x014C, 0x014D, 0x014D, 0x014E, 0x014F, 0x014F,
    0x0150, 0x0150, 0x0151, 0x0152, 0x0152, 0x0153, 0x0153, 0x0154, 0x0155, 0x0155,
    0x0156, 0x0157, 0x0157, 0x0158, 0x0158, 0x0159, 0x015A, 0x015A, 0x015B, 0x015B,
    0x015C, 0x015D, 0x015D, 0x015E, 0x015F, 0x015F, 0x0160, 0x0161, 0x0161, 0x0162,
    0x0162, 0x0163, 0x0164, 0x0164, 0x0165, 0x0166, 0x0166, 0x0167, 0x0168, 0x0168,
    0x0169, 0x016A, 0x016A, 0x016B, 0x016C, 0x016C, 0x016D, 0x016E, 0x016E, 0x016F,
    0x0170, 0x0170, 0x0171, 0x0172, 0x0172, 0x0173, 0x0174, 0x0174, 0x0175, 0x0176,
    0x0176, 0x0177, 0x0178, 0x0178, 0x0179, 0x017A, 0x017A, 0x017B, 0x017C, 0x017C,
    0x017D, 0x017E, 0x017E, 0x017F, 0x0180, 0x0181, 0x0181, 0x0182, 0x0183, 0x0183,
    0x0184, 0x0185, 0x0185, 0x0186, 0x0187, 0x0188, 0x0188, 0x0189, 0x018A, 0x018A,
    0x018B, 0x018C, 0x018D, 0x018D, 0x018E, 0x018F, 0x018F, 0x0190, 0x0191, 0x0192,
    0x0192, 0x0193, 0x0194, 0x0194, 0x0195, 0x0196, 0x0197, 0x0197, 0x0198, 0x0199,
    0x019A, 0x019A, 0x019B, 0x019C, 0x019D, 0x019D, 0x019E, 0x019F, 0x01A0, 0x01A0,
    0x01A1, 0x01A2, 0x01A3, 0x01A3, 0x01A4, 0x01A5, 0x01A6, 0x01A6, 0x01A7, 0x01A8,
    0x01A9, 0x01A9, 0x01AA, 0x01AB, 0x01AC, 0x01AD, 0x01AD, 0x01AE, 0x01AF, 0x01B0,
    0x01B0, 0x01B1, 0x01B2, 0x01B3, 0x01B4, 0x01B4, 0x01B5, 0x01B6, 0x01B7, 0x01B8,
    0x01B8, 0x01B9, 0x01BA, 0x01BB, 0x01BC, 0x01BC, 0x01BD, 0x01BE, 0x01BF, 0x01C0,
    0x01C0, 0x01C1, 0x01C2, 0x01C3, 0x01C4, 0x01C4, 0x01C5, 0x01C6, 0x01C7, 0x01C8,
    0x01C9, 0x01C9, 0x01CA, 0x01CB, 0x01CC, 0x01CD, 0x01CE, 0x01CE, 0x01CF, 0x01D0,
    0x01D1, 0x01D2, 0x01D3, 0x01D3, 0x01D4, 0x01D5, 0x01D6, 0x01D7, 0x01D8, 0x01D8,
    0x01D9, 0x01DA, 0x01DB, 0x01DC, 0x01DD, 0x01DE, 0x01DE, 0x01DF, 0x01E0, 0x01E1,
    0x01E2, 0x01E3, 0x01E4, 0x01E5, 0x01E5, 0x01E6, 0x01E7, 0x01E8, 0x01E9, 0x01EA,
    0x01EB, 0x01EC, 0x01ED, 0x01ED, 0x01EE, 0x01EF, 0x01F0, 0x01F1, 0x01F2, 0x01F3,
    0x01F4, 0x01F5, 0x01F6, 0x01F6, 0x01F7, 0x01F8, 0x01F9, 0x01FA, 0x01FB, 0x01FC,
    0x01FD, 0x01FE, 0x01FF, 0x0200, 0x0201, 0x0201, 0x0202, 0x0203, 0x0204, 0x0205,
    0x0206, 0x0207, 0x0208, 0x0209, 0x020A, 0x020B, 0x020C, 0x020D, 0x020E, 0x020F,
    0x0210, 0x0210, 0x0211, 0x0212, 0x0213, 0x0214, 0x0215, 0x0216, 0x0217, 0x0218,
    0x0219, 0x021A, 0x021B, 0x021C, 0x021D, 0x021E, 0x021F, 0x0220, 0x0221, 0x0222,
    0x0223, 0x0224, 0x0225, 0x0226, 0x0227, 0x0228, 0x0229, 0x022A, 0x022B, 0x022C,
    0x022D, 0x022E, 0x022F, 0x0230, 0x0231, 0x0232, 0x0233, 0x0234, 0x0235, 0x0236,
    0x0237, 0x0238, 0x0239, 0x023A, 0x023B, 0x023C, 0x023D, 0x023E, 0x023F, 0x0240,
    0x0241, 0x0242, 0x0244, 0x0245, 0x0246, 0x0247, 0x0248, 0x0249, 0x024A, 0x024B,
    0x024C, 0x024D, 0x024E, 0x024F, 0x0250, 0x0251, 0x0252, 0x0253, 0x0254, 0x0256,
    0x0257, 0x0258, 0x0259, 0x025A, 0x025B, 0x025C, 0x025D, 0x025E, 0x025F, 0x0260,
    0x0262, 0x0263, 0x0264, 0x0265, 0x0266, 0x0267, 0x0268, 0x0269, 0x026A, 0x026C,
    0x026D, 0x026E, 0x026F, 0x0270, 0x0271, 0x0272, 0x0273, 0x0275, 0x0276, 0x0277,
    0x0278, 0x0279, 0x027A, 0x027B, 0x027D, 0x027E, 0x027F, 0x0280, 0x0281, 0x0282,
    0x0284, 0x0285, 0x0286, 0x0287, 0x0288, 0x0289, 0x028B, 0x028C, 0x028D, 0x028E,
    0x028F, 0x0290, 0x0292, 0x0293, 0x0294, 0x0295, 0x0296, 0x0298, 0x0299, 0x029A,
    0x029B, 0x029C, 0x029E, 0x029F, 0x02A0, 0x02A1, 0x02A2, 0x02A4, 0x02A5, 0x02A6,
    0x02A7, 0x02A9, 0x02AA, 0x02AB, 0x02AC, 0x02AE, 0x02AF, 0x02B0, 0x02B1, 0x02B2,
    0x02B4, 0x02B5, 0x02B6, 0x02B7, 0x02B9, 0x02BA, 0x02BB, 0x02BD, 0x02BE, 0x02BF,
    0x02C0, 0x02C2, 0x02C3, 0x02C4, 0x02C5, 0x02C7, 0x02C8, 0x02C9, 0x02CB, 0x02CC,
    0x02CD, 0x02CE, 0x02D0, 0x02D1, 0x02D2, 0x02D4, 0x02D5, 0x02D6, 0x02D8, 0x02D9,
    0x02DA, 0x02DC, 0x02DD, 0x02DE, 0x02E0, 0x02E1, 0x02E2, 0x02E4, 0x02E5, 0x02E6,
    0x02E8, 0x02E9, 0x02EA, 0x02EC, 0x02ED, 0x02EE, 0x02F0, 0x02F1, 0x02F2, 0x02F4,
    0x02F5, 0x02F6, 0x02F8, 0x02F9, 0x02FB, 0x02FC, 0x02FD, 0x02FF, 0x0300, 0x0302,
    0x0303, 0x0304, 0x0306, 0x0307, 0x0309, 0x030A, 0x030B, 0x030D, 0x030E, 0x0310,
    0x0311, 0x0312, 0x0314, 0x0315, 0x0317, 0x0318, 0x031A, 0x031B, 0x031C, 0x031E,
    0x031F, 0x0321, 0x0322, 0x0324, 0x0325, 0x0327, 0x0328, 0x0329, 0x032B, 0x032C,
    0x032E, 0x032F, 0x0331, 0x0332, 0x0334, 0x0335, 0x0337, 0x0338, 0x033A, 0x033B,
    0x033D, 0x033E, 0x0340, 0x0341, 0x0343, 0x0344, 0x0346, 0x0347, 0x0349, 0x034A,
    0x034C, 0x034D, 0x034F, 0x0350, 0x0352, 0x0353, 0x0355, 0x0357, 0x0358, 0x035A,
    0x035B, 0x035D, 0x035E, 0x0360, 0x0361, 0x0363, 0x0365, 0x0366, 0x0368, 0x0369,
    0x036B, 0x036C, 0x036E, 0x0370, 0x0371, 0x0373, 0x0374, 0x0376, 0x0378, 0x0379,
    0x037B, 0x037C, 0x037E, 0x0380, 0x0381, 0x0383, 0x0384, 0x0386, 0x0388, 0x0389,
    0x038B, 0x038D, 0x038E, 0x0390, 0x0392, 0x0393, 0x0395, 0x0397, 0x0398, 0x039A,
    0x039C, 0x039D, 0x039F, 0x03A1, 0x03A2, 0x03A4, 0x03A6, 0x03A7, 0x03A9, 0x03AB,
    0x03AC, 0x03AE, 0x03B0, 0x03B1, 0x03B3, 0x03B5, 0x03B7, 0x03B8, 0x03BA, 0x03BC,
    0x03BD, 0x03BF, 0x03C1, 0x03C3, 0x03C4, 0x03C6, 0x03C8, 0x03CA, 0x03CB, 0x03CD,
    0x03CF, 0x03D1, 0x03D2, 0x03D4, 0x03D6, 0x03D8, 0x03DA, 0x03DB, 0x03DD, 0x03DF,
    0x03E1, 0x03E3, 0x03E4, 0x03E6, 0x03E8, 0x03EA, 0x03EC, 0x03ED, 0x03EF, 0x03F1,
    0x03F3, 0x03F5, 0x03F6, 0x03F8, 0x03FA, 0x03FC, 0x03FE, 0x036C,
];

/// DMX quantizes bend to 1/32nd-semitone steps and the note/bend pair is
/// folded through [`DMX_FREQ_TABLE`]'s 384-entry repeating region once the
/// combined index passes 284.
fn dmx_hz(note: f64, bend: f64) -> f64 {
    let mut note_i = (note + 0.5) as i64;
    let bend_int = bend as i64;
    let bend_dec = bend - bend_int as f64;
    note_i += bend_int;

    let mut bend_i = (bend_dec * 128.0 / 2.0) as i64 + 128;
    bend_i >>= 1;

    let mut freq_index = (note_i << 5) + bend_i;
    let mut octave = 0i64;
    if freq_index < 0 {
        freq_index = 0;
    } else if freq_index >= DMX_OCTAVE_REBASE_INDEX {
        freq_index -= DMX_OCTAVE_REBASE_INDEX;
        octave = freq_index / DMX_TABLE_REPEAT_LEN;
        freq_index = (freq_index % DMX_TABLE_REPEAT_LEN) + DMX_OCTAVE_REBASE_INDEX;
    }

    let mut fnum = DMX_FREQ_TABLE[freq_index as usize] as f64;
    let mut remaining = octave;
    while remaining > 1 {
        fnum *= 2.0;
        remaining -= 1;
    }
    fnum_to_hz(fnum)
}

const DMX_OCTAVE_REBASE_INDEX: i64 = 284;
const DMX_TABLE_REPEAT_LEN: i64 = 384;

/// Apogee's 32x12 F-number table: 32 sub-semitone bend steps, each holding
/// one octave's worth of entries indexed by scale degree.
#[rustfmt::skip]
const APOGEE_FREQ_TABLE: [[u16; 12]; 32] = [
    [0x157, 0x16B, 0x181, 0x198, 0x1B0, 0x1CA, 0x1E5, 0x202, 0x220, 0x241, 0x263, 0x287],
    [0x157, 0x16B, 0x181, 0x198, 0x1B0, 0x1CA, 0x1E5, 0x202, 0x220, 0x242, 0x264, 0x288],
    [0x158, 0x16C, 0x182, 0x199, 0x1B1, 0x1CB, 0x1E6, 0x203, 0x221, 0x243, 0x265, 0x289],
    [0x158, 0x16C, 0x183, 0x19A, 0x1B2, 0x1CC, 0x1E7, 0x204, 0x222, 0x244, 0x266, 0x28A],
    [0x159, 0x16D, 0x183, 0x19A, 0x1B3, 0x1CD, 0x1E8, 0x205, 0x223, 0x245, 0x267, 0x28B],
    [0x15A, 0x16E, 0x184, 0x19B, 0x1B3, 0x1CE, 0x1E9, 0x206, 0x224, 0x246, 0x268, 0x28C],
    [0x15A, 0x16E, 0x185, 0x19C, 0x1B4, 0x1CE, 0x1EA, 0x207, 0x225, 0x247, 0x269, 0x28E],
    [0x15B, 0x16F, 0x185, 0x19D, 0x1B5, 0x1CF, 0x1EB, 0x208, 0x226, 0x248, 0x26A, 0x28F],
    [0x15B, 0x170, 0x186, 0x19D, 0x1B6, 0x1D0, 0x1EC, 0x209, 0x227, 0x249, 0x26B, 0x290],
    [0x15C, 0x170, 0x187, 0x19E, 0x1B7, 0x1D1, 0x1EC, 0x20A, 0x228, 0x24A, 0x26D, 0x291],
    [0x15D, 0x171, 0x188, 0x19F, 0x1B7, 0x1D2, 0x1ED, 0x20B, 0x229, 0x24B, 0x26E, 0x292],
    [0x15D, 0x172, 0x188, 0x1A0, 0x1B8, 0x1D3, 0x1EE, 0x20C, 0x22A, 0x24C, 0x26F, 0x293],
    [0x15E, 0x172, 0x189, 0x1A0, 0x1B9, 0x1D4, 0x1EF, 0x20D, 0x22B, 0x24D, 0x270, 0x295],
    [0x15F, 0x173, 0x18A, 0x1A1, 0x1BA, 0x1D4, 0x1F0, 0x20E, 0x22C, 0x24E, 0x271, 0x296],
    [0x15F, 0x174, 0x18A, 0x1A2, 0x1BB, 0x1D5, 0x1F1, 0x20F, 0x22D, 0x24F, 0x272, 0x297],
    [0x160, 0x174, 0x18B, 0x1A3, 0x1BB, 0x1D6, 0x1F2, 0x210, 0x22E, 0x250, 0x273, 0x298],
    [0x161, 0x175, 0x18C, 0x1A3, 0x1BC, 0x1D7, 0x1F3, 0x211, 0x22F, 0x251, 0x274, 0x299],
    [0x161, 0x176, 0x18C, 0x1A4, 0x1BD, 0x1D8, 0x1F4, 0x212, 0x230, 0x252, 0x276, 0x29B],
    [0x162, 0x176, 0x18D, 0x1A5, 0x1BE, 0x1D9, 0x1F5, 0x212, 0x231, 0x254, 0x277, 0x29C],
    [0x162, 0x177, 0x18E, 0x1A6, 0x1BF, 0x1D9, 0x1F5, 0x213, 0x232, 0x255, 0x278, 0x29D],
    [0x163, 0x178, 0x18F, 0x1A6, 0x1BF, 0x1DA, 0x1F6, 0x214, 0x233, 0x256, 0x279, 0x29E],
    [0x164, 0x179, 0x18F, 0x1A7, 0x1C0, 0x1DB, 0x1F7, 0x215, 0x235, 0x257, 0x27A, 0x29F],
    [0x164, 0x179, 0x190, 0x1A8, 0x1C1, 0x1DC, 0x1F8, 0x216, 0x236, 0x258, 0x27B, 0x2A1],
    [0x165, 0x17A, 0x191, 0x1A9, 0x1C2, 0x1DD, 0x1F9, 0x217, 0x237, 0x259, 0x27C, 0x2A2],
    [0x166, 0x17B, 0x192, 0x1AA, 0x1C3, 0x1DE, 0x1FA, 0x218, 0x238, 0x25A, 0x27E, 0x2A3],
    [0x166, 0x17B, 0x192, 0x1AA, 0x1C3, 0x1DF, 0x1FB, 0x219, 0x239, 0x25B, 0x27F, 0x2A4],
    [0x167, 0x17C, 0x193, 0x1AB, 0x1C4, 0x1E0, 0x1FC, 0x21A, 0x23A, 0x25C, 0x280, 0x2A6],
    [0x168, 0x17D, 0x194, 0x1AC, 0x1C5, 0x1E0, 0x1FD, 0x21B, 0x23B, 0x25D, 0x281, 0x2A7],
    [0x168, 0x17D, 0x194, 0x1AD, 0x1C6, 0x1E1, 0x1FE, 0x21C, 0x23C, 0x25E, 0x282, 0x2A8],
    [0x169, 0x17E, 0x195, 0x1AD, 0x1C7, 0x1E2, 0x1FF, 0x21D, 0x23D, 0x260, 0x283, 0x2A9],
    [0x16A, 0x17F, 0x196, 0x1AE, 0x1C8, 0x1E3, 0x1FF, 0x21E, 0x23E, 0x261, 0x284, 0x2AB],
    [0x16A, 0x17F, 0x197, 0x1AF, 0x1C8, 0x1E4, 0x200, 0x21F, 0x23F, 0x262, 0x286, 0x2AC],
];

/// Apogee rolls the bend's 1/32nd-semitone fraction into the note index
/// itself (`noteI += bendI / 32`) before taking the octave/scale-degree
/// split, so only the remaining `bendI % 32` selects a table row.
fn apogee_hz(note: f64, bend: f64) -> f64 {
    let mut note_i = (note + 0.5) as i64;
    let bend_int = bend as i64;
    let bend_dec = bend - bend_int as f64;
    note_i += bend_int;

    let bend_i = (bend_dec * 32.0) as i64 + 32;
    note_i += bend_i / 32;
    note_i -= 1;

    let scale_note = (note_i % 12) as usize;
    let mut octave = note_i / 12;
    let mut fnum = APOGEE_FREQ_TABLE[(bend_i % 32) as usize][scale_note] as f64;
    while octave > 1 {
        fnum *= 2.0;
        octave -= 1;
    }
    fnum_to_hz(fnum)
}

/// The Win9x OPL driver's twelve base F-numbers, one per scale degree at
/// octave 5 (its baseline octave: below it the value is halved per octave,
/// above it doubled).
const WIN9X_FREQ_TABLE: [u16; 12] =
    [0x0AB7, 0x0B5A, 0x0C07, 0x0CBE, 0x0D80, 0x0E4D, 0x0F27, 0x100E, 0x1102, 0x1205, 0x1318, 0x143A];

fn win9x_apply_pitch(freq: i64, pitch: i16) -> i64 {
    let pitch = pitch as i64;
    if pitch > 0 {
        let diff = (pitch * WIN9X_UP_FACTOR) >> WIN9X_PITCH_SHIFT;
        freq + ((diff * freq) >> 15)
    } else if pitch < 0 {
        let diff = ((-pitch) * WIN9X_DOWN_FACTOR) >> WIN9X_PITCH_SHIFT;
        freq - ((diff * freq) >> 15)
    } else {
        freq
    }
}

/// Win9x's base table lookup, then a pitch-bend requantization that mimics
/// the driver's own MIDI 14-bit bend round trip (splitting the scaled
/// fraction into 7-bit MSB/LSB halves and recombining them) before applying
/// the resulting signed pitch through [`win9x_apply_pitch`].
fn win9x_hz(note: f64, bend: f64) -> f64 {
    let mut note_i = (note + 0.5) as i64;
    let bend_int = bend as i64;
    let bend_dec = bend - bend_int as f64;
    note_i += bend_int;

    let bend_fixed = (bend_dec * 4096.0) as i64 + 8192;
    let bend_msb = (bend_fixed >> 7) & 0x7F;
    let bend_lsb = bend_fixed & 0x7F;
    let recombined = (bend_msb << 9) | (bend_lsb << 2);
    let pitch = (recombined as u16).wrapping_add(0x8000) as i16;

    let octave = note_i.div_euclid(12);
    let note_class = note_i.rem_euclid(12) as usize;
    let mut freq = WIN9X_FREQ_TABLE[note_class] as i64;
    if octave < 5 {
        freq >>= (5 - octave) as u32;
    } else if octave > 5 {
        freq <<= (octave - 5) as u32;
    }

    let pitched = win9x_apply_pitch(freq, pitch) * 2;
    fnum_to_hz(pitched as f64)
}

pub(crate) fn note_to_hz(model: VolumeModel, note: f64, bend: f64) -> f64 {
    match model {
        VolumeModel::Generic | VolumeModel::Hmi => generic_hz(note, bend),
        VolumeModel::Dmx | VolumeModel::DmxFixed => dmx_hz(note, bend),
        VolumeModel::Apogee => apogee_hz(note, bend),
        VolumeModel::Win9x => win9x_hz(note, bend),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_increases_monotonically_with_note_under_every_model() {
        for model in [
            VolumeModel::Generic,
            VolumeModel::Dmx,
            VolumeModel::DmxFixed,
            VolumeModel::Apogee,
            VolumeModel::Win9x,
            VolumeModel::Hmi,
        ] {
            let low = note_to_hz(model, 48.0, 0.0);
            let high = note_to_hz(model, 60.0, 0.0);
            assert!(high > low, "{:?}: {} should exceed {}", model, high, low);
        }
    }

    #[test]
    fn octave_doubles_generic_frequency() {
        let a = generic_hz(60.0, 0.0);
        let b = generic_hz(72.0, 0.0);
        assert!((b / a - 2.0).abs() < 1e-6);
    }

    /// Middle C under every table-driven model should land within a few Hz
    /// of the same real-world middle C the generic curve targets exactly,
    /// not wherever a reshaped exponential happens to put it.
    #[test]
    fn table_driven_models_land_near_middle_c() {
        let middle_c = generic_hz(60.0, 0.0);
        for model in [VolumeModel::Dmx, VolumeModel::DmxFixed, VolumeModel::Apogee, VolumeModel::Win9x] {
            let hz = note_to_hz(model, 60.0, 0.0);
            assert!(
                (hz - middle_c).abs() < 3.0,
                "{:?}: {} too far from middle C ({})",
                model,
                hz,
                middle_c
            );
        }
    }

    #[test]
    fn dmx_middle_c_matches_known_fnum() {
        assert!((dmx_hz(60.0, 0.0) - 261.3397521972656).abs() < 1e-6);
    }

    #[test]
    fn positive_bend_raises_win9x_pitch() {
        let base = win9x_hz(60.0, 0.0);
        let bent = win9x_hz(60.0, 0.5);
        assert!(bent > base);
    }
}
