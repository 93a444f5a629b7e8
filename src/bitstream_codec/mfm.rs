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

    src/bitstream_codec/mfm.rs

    MFM encoding and marker definitions
*/

//! MFM encoding and decoding of bytes and address markers.
//!
//! In MFM a data bit of 1 is written as `01`. A data bit of 0 is written as `10` if the previous
//! data bit was 0, and `00` otherwise. Address markers are written with one clock bit removed so
//! that they cannot occur in normally encoded data.

use bit_vec::BitVec;

pub const MFM_BYTE_LEN: usize = 16;
pub const MFM_MARKER_LEN: usize = 64;

/// Encoded 0xA1 with a missing clock bit
pub const MFM_SYNC_A1: u16 = 0x4489;
/// Encoded 0xC2 with a missing clock bit
pub const MFM_SYNC_C2: u16 = 0x5224;
/// Encoded 0x00 following a 0 bit
pub const MFM_SYNC_WORD: u16 = 0xAAAA;

pub const MFM_MARKER_MASK: u64 = 0xFFFF_FFFF_FFFF_0000;
pub const MFM_A1_SYNC: u64 = 0x4489_4489_4489_0000;
pub const MFM_C2_SYNC: u64 = 0x5224_5224_5224_0000;

// Pre-encoded markers for IAM, IDAM, DAM and DDAM.
pub const MFM_IAM_MARKER: u64 = 0x5224_5224_5224_5552;
pub const MFM_IDAM_MARKER: u64 = 0x4489_4489_4489_5554;
pub const MFM_DAM_MARKER: u64 = 0x4489_4489_4489_5545;
pub const MFM_DDAM_MARKER: u64 = 0x4489_4489_4489_554A;

pub const MFM_A1_PREFIX: [u8; 3] = [0xA1, 0xA1, 0xA1];

pub struct MfmCodec;

impl MfmCodec {
    /// Encode a single byte, given the value of the last data bit written.
    /// Returns the 16-bit encoded value.
    pub fn encode_byte(byte: u8, mut previous_bit: bool) -> u16 {
        let mut accum: u16 = 0;
        for i in (0..8).rev() {
            let bit = (byte & (1 << i)) != 0;
            if bit {
                // 1 is encoded as 01
                accum = (accum << 2) | 0b01;
            }
            else if !previous_bit {
                // 0 is encoded as 10 if previous bit was 0
                accum = (accum << 2) | 0b10;
            }
            else {
                // otherwise 00
                accum <<= 2;
            }
            previous_bit = bit;
        }
        accum
    }

    /// Encode `data` onto the end of `bits`. `previous_bit` is the last data bit already written.
    /// Returns the last data bit written.
    pub fn encode_bytes(bits: &mut BitVec, data: &[u8], mut previous_bit: bool) -> bool {
        for &byte in data {
            Self::push_word(bits, Self::encode_byte(byte, previous_bit));
            previous_bit = byte & 0x01 != 0;
        }
        previous_bit
    }

    /// Write a pre-encoded sync word `count` times. Returns the last data bit written.
    pub fn encode_sync(bits: &mut BitVec, word: u16, count: usize) -> bool {
        for _ in 0..count {
            Self::push_word(bits, word);
        }
        word & 0x0001 != 0
    }

    /// Write an address marker: three sync words (0xA1 or 0xC2 family depending on the mark)
    /// followed by the mark byte. Returns the last data bit written.
    pub fn encode_marker(bits: &mut BitVec, mark: u8) -> bool {
        let sync = if mark == 0xFC { MFM_SYNC_C2 } else { MFM_SYNC_A1 };
        let previous_bit = Self::encode_sync(bits, sync, 3);
        Self::encode_bytes(bits, &[mark], previous_bit)
    }

    /// Return the marker pattern as it would appear in a 64-bit shift register.
    pub fn marker_pattern(mark: u8) -> u64 {
        let (sync, previous_bit) = if mark == 0xFC {
            (MFM_C2_SYNC, false)
        }
        else {
            (MFM_A1_SYNC, true)
        };
        sync | Self::encode_byte(mark, previous_bit) as u64
    }

    /// Return the bytes a CRC is calculated over ahead of a marker's payload.
    pub fn crc_prefix(mark: u8) -> [u8; 4] {
        [0xA1, 0xA1, 0xA1, mark]
    }

    fn push_word(bits: &mut BitVec, word: u16) {
        for i in (0..16).rev() {
            bits.push(word & (1 << i) != 0);
        }
    }
}
