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
*/

//! Encoding and decoding of MFM and FM bitstreams.
//!
//! Both encodings store each data bit as a (clock, data) pair of bits, so the data bit of a pair
//! is always the second bit. Decoding a byte therefore only needs the offset of its first clock
//! bit, regardless of encoding.

pub mod crc;
pub mod fm;
pub mod mfm;

use bit_vec::BitVec;

use crate::types::TrackDataEncoding;

pub use crc::crc_ibm_3740;

/// Extract the data bits of a 16-bit encoded word.
pub fn decode_word(word: u16) -> u8 {
    let mut byte = 0;
    for i in 0..8 {
        byte |= (((word >> (i * 2)) & 1) as u8) << i;
    }
    byte
}

/// Decode the byte whose first clock bit is at `offset`.
/// Returns `None` if the byte extends past the end of the bitstream.
pub fn decode_byte(bits: &BitVec, offset: usize) -> Option<u8> {
    if offset + 16 > bits.len() {
        return None;
    }
    let mut byte = 0;
    for i in 0..8 {
        byte = (byte << 1) | bits[offset + (i * 2) + 1] as u8;
    }
    Some(byte)
}

/// Decode `len` consecutive bytes starting at `offset`.
/// Returns `None` if any of them extends past the end of the bitstream.
pub fn decode_bytes(bits: &BitVec, offset: usize, len: usize) -> Option<Vec<u8>> {
    if offset + len * 16 > bits.len() {
        return None;
    }
    (0..len).map(|i| decode_byte(bits, offset + i * 16)).collect()
}

/// Read 16 raw (undecoded) bits starting at `offset`.
pub fn read_raw_word(bits: &BitVec, offset: usize) -> Option<u16> {
    if offset + 16 > bits.len() {
        return None;
    }
    let mut word = 0;
    for i in 0..16 {
        word = (word << 1) | bits[offset + i] as u16;
    }
    Some(word)
}

/// Count the encoded sync bytes (0x00) immediately preceding the bit at `offset`, up to `max`.
pub fn count_sync_words(bits: &BitVec, offset: usize, max: usize) -> usize {
    let mut count = 0;
    let mut cursor = offset;
    while count < max && cursor >= 16 {
        cursor -= 16;
        // The first clock bit of a sync byte is 0 in MFM if the preceding data bit was 1.
        match read_raw_word(bits, cursor) {
            Some(word) if word | 0x8000 == 0xAAAA => count += 1,
            _ => break,
        }
    }
    count
}

/// Return the bytes a CRC is calculated over ahead of the payload of the marker `mark`.
pub fn crc_prefix(encoding: TrackDataEncoding, mark: u8) -> Vec<u8> {
    match encoding {
        TrackDataEncoding::Mfm => mfm::MfmCodec::crc_prefix(mark).to_vec(),
        TrackDataEncoding::Fm => fm::FmCodec::crc_prefix(mark).to_vec(),
    }
}
