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

    src/bitstream_codec/crc.rs

    CRC-16 (IBM 3740) calculation
*/

//! CRC-16/IBM-3740 as used by System 34 sector headers and data fields.

pub const CRC_IBM_3740_POLY: u16 = 0x1021;
pub const CRC_IBM_3740_INIT: u16 = 0xFFFF;

/// Calculate a CRC-16/IBM-3740 over `data`, optionally continuing from a previous CRC value.
pub fn crc_ibm_3740(data: &[u8], start: Option<u16>) -> u16 {
    let mut crc = start.unwrap_or(CRC_IBM_3740_INIT);

    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = crc_shift(crc);
        }
    }
    crc
}

/// Advance the CRC register by a single zero bit.
#[inline]
pub(crate) fn crc_shift(crc: u16) -> u16 {
    if crc & 0x8000 != 0 {
        (crc << 1) ^ CRC_IBM_3740_POLY
    }
    else {
        crc << 1
    }
}
