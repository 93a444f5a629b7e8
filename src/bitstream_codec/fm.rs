/*
    FluxRescue
    https://github.com/dbalsom/fluxrescue

    Copyright 2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/bitstream_codec/fm.rs

    FM encoding and marker definitions
*/

//! FM encoding and decoding of bytes and address markers.
//!
//! In FM every data bit is preceded by a clock bit, which is always 1 in normal data. Address
//! marks are written with a special clock pattern that has missing clock bits.

use bit_vec::BitVec;

pub const FM_BYTE_LEN: usize = 16;
pub const FM_MARKER_LEN: usize = 16;

/// Encoded 0x00 with a normal clock
pub const FM_SYNC_WORD: u16 = 0xAAAA;
/// Clock pattern for ID and data address marks
pub const FM_MARK_CLOCK: u8 = 0xC7;
/// Clock pattern for the index address mark
pub const FM_IAM_CLOCK: u8 = 0xD7;
pub const FM_GAP_BYTE: u8 = 0xFF;

/// Clocked marks that are recognized after a sync byte
pub const FM_MARKS: [(u16, u8); 6] = [
    (FmCodec::encode_with_clock(0xFC, FM_IAM_CLOCK), 0xFC),
    (FmCodec::encode_with_clock(0xFE, FM_MARK_CLOCK), 0xFE),
    (FmCodec::encode_with_clock(0xFB, FM_MARK_CLOCK), 0xFB),
    (FmCodec::encode_with_clock(0xFA, FM_MARK_CLOCK), 0xFA),
    (FmCodec::encode_with_clock(0xF8, FM_MARK_CLOCK), 0xF8),
    (FmCodec::encode_with_clock(0xF9, FM_MARK_CLOCK), 0xF9),
];

pub struct FmCodec;

impl FmCodec {
    /// Interleave the bits of `clock` and `data` into a 16-bit encoded word, clock bits first.
    pub const fn encode_with_clock(data: u8, clock: u8) -> u16 {
        let mut accum: u16 = 0;
        let mut i = 8;
        while i > 0 {
            i -= 1;
            accum = (accum << 2) | ((((clock >> i) & 1) as u16) << 1) | ((data >> i) & 1) as u16;
        }
        accum
    }

    /// Encode `data` onto the end of `bits` with a normal clock.
    pub fn encode_bytes(bits: &mut BitVec, data: &[u8]) {
        for &byte in data {
            Self::push_word(bits, Self::encode_with_clock(byte, 0xFF));
        }
    }

    /// Write an address mark with its special clock pattern.
    pub fn encode_marker(bits: &mut BitVec, mark: u8) {
        let clock = if mark == 0xFC { FM_IAM_CLOCK } else { FM_MARK_CLOCK };
        Self::push_word(bits, Self::encode_with_clock(mark, clock));
    }

    /// Look up a clocked mark word, returning the mark byte.
    pub fn match_mark(word: u16) -> Option<u8> {
        FM_MARKS.iter().find(|(pattern, _)| *pattern == word).map(|(_, mark)| *mark)
    }

    /// Return the bytes a CRC is calculated over ahead of a marker's payload.
    pub fn crc_prefix(mark: u8) -> [u8; 1] {
        [mark]
    }

    fn push_word(bits: &mut BitVec, word: u16) {
        for i in (0..16).rev() {
            bits.push(word & (1 << i) != 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream_codec::decode_byte;

    #[test]
    fn clocked_marks() {
        assert_eq!(FmCodec::encode_with_clock(0x00, 0xFF), FM_SYNC_WORD);
        assert_eq!(FmCodec::encode_with_clock(0xFE, FM_MARK_CLOCK), 0xF57E);
        assert_eq!(FmCodec::encode_with_clock(0xFC, FM_IAM_CLOCK), 0xF77A);
        assert_eq!(FmCodec::match_mark(0xF57E), Some(0xFE));
        // Normally clocked data never looks like a mark
        assert_eq!(FmCodec::match_mark(FmCodec::encode_with_clock(0xFE, 0xFF)), None);
    }

    #[test]
    fn encode_decode_bytes() {
        let mut bits = BitVec::new();
        let data = [0xFF, 0x00, 0x12, 0xE5];
        FmCodec::encode_bytes(&mut bits, &data);
        FmCodec::encode_marker(&mut bits, 0xFB);
        for (i, byte) in data.iter().enumerate() {
            assert_eq!(decode_byte(&bits, i * FM_BYTE_LEN), Some(*byte));
        }
        assert_eq!(decode_byte(&bits, data.len() * FM_BYTE_LEN), Some(0xFB));
    }
}
