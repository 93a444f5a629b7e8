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

//! Repair of small bit errors in CRC protected fields.
//!
//! CRC-16 is linear: flipping a bit of the protected data changes the CRC by an amount that
//! depends only on the position of the bit. The xor of the recorded and calculated CRC (the
//! syndrome) therefore identifies which bit, or pair of nearby bits, was flipped.

use crate::bitstream_codec::crc::{crc_ibm_3740, crc_shift, CRC_IBM_3740_POLY};

/// Two-bit repairs are only attempted for bits within this distance of each other.
const MAX_BURST_BITS: usize = 16;
/// Repairs are not attempted on longer fields. Bit contributions repeat every 32767
/// bits, and past a few thousand bits an unrelated error is likely to match some single bit.
pub const MAX_REPAIR_BYTES: usize = 1024;

/// The outcome of a successful repair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrcRepair {
    /// The listed data bits were flipped. Bit 0 is the most significant bit of the first byte.
    DataBits(Vec<usize>),
    /// The data is intact; a single bit of the recorded CRC was damaged.
    CheckField,
}

impl CrcRepair {
    /// The number of bits that were corrected.
    pub fn bit_ct(&self) -> u32 {
        match self {
            CrcRepair::DataBits(bits) => bits.len() as u32,
            CrcRepair::CheckField => 1,
        }
    }
}

/// The CRC change caused by flipping each bit of a `bit_len` bit field.
fn bit_contributions(bit_len: usize) -> Vec<u16> {
    let mut contributions = vec![0u16; bit_len];
    let mut c = CRC_IBM_3740_POLY;
    for i in (0..bit_len).rev() {
        contributions[i] = c;
        c = crc_shift(c);
    }
    contributions
}

fn flip(data: &mut [u8], bit: usize) {
    data[bit / 8] ^= 0x80 >> (bit % 8);
}

/// Attempt to correct up to `max_bits` bit errors in `data` so that the CRC over `prefix` and
/// `data` equals `recorded`. `data` is modified only on success.
pub fn repair(prefix: &[u8], data: &mut [u8], recorded: u16, max_bits: u8) -> Option<CrcRepair> {
    if max_bits == 0 || data.is_empty() {
        return None;
    }
    let calculated = crc_ibm_3740(data, Some(crc_ibm_3740(prefix, None)));
    let syndrome = calculated ^ recorded;
    if syndrome == 0 {
        return None;
    }
    if data.len() > MAX_REPAIR_BYTES {
        log::debug!(
            "repair(): {} byte field is too long to repair syndrome {:04X}",
            data.len(),
            syndrome
        );
        return None;
    }

    if syndrome.count_ones() == 1 {
        log::debug!("repair(): Recorded CRC {:04X} has a single damaged bit", recorded);
        return Some(CrcRepair::CheckField);
    }

    let contributions = bit_contributions(data.len() * 8);
    if let Some(bit) = contributions.iter().position(|c| *c == syndrome) {
        flip(data, bit);
        log::debug!("repair(): Corrected bit {} (syndrome {:04X})", bit, syndrome);
        return Some(CrcRepair::DataBits(vec![bit]));
    }

    if max_bits >= 2 {
        let mut pairs = Vec::new();
        for i in 0..contributions.len() {
            let end = (i + MAX_BURST_BITS + 1).min(contributions.len());
            for j in (i + 1)..end {
                if contributions[i] ^ contributions[j] == syndrome {
                    pairs.push((i, j));
                }
            }
        }
        match pairs[..] {
            [(i, j)] => {
                flip(data, i);
                flip(data, j);
                log::debug!("repair(): Corrected bits {} and {} (syndrome {:04X})", i, j, syndrome);
                return Some(CrcRepair::DataBits(vec![i, j]));
            }
            [] => {}
            _ => {
                log::debug!(
                    "repair(): Syndrome {:04X} matches {} bit pairs, not repairing",
                    syndrome,
                    pairs.len()
                );
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: [u8; 4] = [0xA1, 0xA1, 0xA1, 0xFB];

    fn field() -> (Vec<u8>, u16) {
        let data: Vec<u8> = (0..128u32).map(|i| (i * 31 + 5) as u8).collect();
        let crc = crc_ibm_3740(&data, Some(crc_ibm_3740(&PREFIX, None)));
        (data, crc)
    }

    #[test]
    fn contributions_match_crc() {
        let (mut data, crc) = field();
        let contributions = bit_contributions(data.len() * 8);
        flip(&mut data, 300);
        let damaged = crc_ibm_3740(&data, Some(crc_ibm_3740(&PREFIX, None)));
        assert_eq!(damaged ^ crc, contributions[300]);
    }

    #[test]
    fn single_bit() {
        let (original, crc) = field();
        let mut data = original.clone();
        flip(&mut data, 517);
        assert_eq!(repair(&PREFIX, &mut data, crc, 1), Some(CrcRepair::DataBits(vec![517])));
        assert_eq!(data, original);
    }

    #[test]
    fn burst() {
        let (original, crc) = field();
        let mut data = original.clone();
        flip(&mut data, 100);
        flip(&mut data, 101);
        assert_eq!(repair(&PREFIX, &mut data, crc, 2), Some(CrcRepair::DataBits(vec![100, 101])));
        assert_eq!(data, original);
    }

    #[test]
    fn ambiguous_burst() {
        let (original, crc) = field();
        let mut data = original.clone();
        flip(&mut data, 40);
        flip(&mut data, 45);
        let damaged = data.clone();
        assert_eq!(repair(&PREFIX, &mut data, crc, 2), None);
        assert_eq!(data, damaged);
    }

    #[test]
    fn long_fields_are_not_repaired() {
        let original: Vec<u8> = (0..8192u32).map(|i| (i * 7 + 3) as u8).collect();
        let crc = crc_ibm_3740(&original, Some(crc_ibm_3740(&PREFIX, None)));
        let mut data = original.clone();
        flip(&mut data, 20_000);
        flip(&mut data, 50_001);
        let damaged = data.clone();
        assert_eq!(repair(&PREFIX, &mut data, crc, 2), None);
        assert_eq!(data, damaged);

        // The limit is inclusive
        let mut data = original[..MAX_REPAIR_BYTES].to_vec();
        let crc = crc_ibm_3740(&data, Some(crc_ibm_3740(&PREFIX, None)));
        flip(&mut data, 8000);
        assert_eq!(repair(&PREFIX, &mut data, crc, 1), Some(CrcRepair::DataBits(vec![8000])));
    }

    #[test]
    fn damaged_check_field() {
        let (mut data, crc) = field();
        assert_eq!(repair(&PREFIX, &mut data, crc ^ 0x0400, 1), Some(CrcRepair::CheckField));
        assert_eq!(repair(&PREFIX, &mut data, crc, 1), None);
    }
}
