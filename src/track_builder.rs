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

//! The `track_builder` module lays out System 34 format tracks as MFM or FM bitstreams and
//! converts bitstreams into flux transition delta times. Tracks built this way act as reference
//! captures with known contents.

use bit_vec::BitVec;

use crate::{
    bitstream_codec::{
        crc_ibm_3740,
        crc_prefix,
        fm::{FmCodec, FM_GAP_BYTE},
        mfm::MfmCodec,
    },
    flux::flux_revolution::FluxRevolution,
    types::{DiskCh, DiskChsn, TrackDataEncoding},
};

pub const MFM_GAP_BYTE: u8 = 0x4E;
pub const SYNC_BYTE: u8 = 0x00;

pub const IBM_GAP4A: usize = 80;
pub const IBM_GAP1: usize = 50;
pub const IBM_GAP2: usize = 22;
pub const IBM_GAP3_DEFAULT: usize = 22;

pub const FM_GAP4A: usize = 40;
pub const FM_GAP1: usize = 26;
pub const FM_GAP2: usize = 11;
pub const FM_GAP3_DEFAULT: usize = 27;

const TRAILING_GAP: usize = 32;

/// The contents of one sector to be written by a [TrackBuilder].
#[derive(Clone, Debug, PartialEq)]
pub struct SectorSpec {
    pub id: DiskChsn,
    pub data: Vec<u8>,
    /// Write a Deleted Data Address Mark instead of a Data Address Mark.
    pub deleted: bool,
    /// Write an incorrect CRC for the sector header.
    pub bad_header_crc: bool,
    /// Write an incorrect CRC for the sector data.
    pub bad_data_crc: bool,
    /// Write the header but no data field.
    pub omit_data: bool,
    /// Flip the given bit of the data after its CRC has been calculated.
    pub flip_data_bit: Option<usize>,
}

impl SectorSpec {
    pub fn new(id: DiskChsn, data: Vec<u8>) -> Self {
        SectorSpec {
            id,
            data,
            deleted: false,
            bad_header_crc: false,
            bad_data_crc: false,
            omit_data: false,
            flip_data_bit: None,
        }
    }

    /// Create a sector filled with a pattern derived from its ID.
    pub fn with_pattern(id: DiskChsn) -> Self {
        let data = (0..id.n_size())
            .map(|i| (i as u8).wrapping_mul(7).wrapping_add(id.s()))
            .collect();
        Self::new(id, data)
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn bad_header_crc(mut self) -> Self {
        self.bad_header_crc = true;
        self
    }

    pub fn bad_data_crc(mut self) -> Self {
        self.bad_data_crc = true;
        self
    }

    pub fn omit_data(mut self) -> Self {
        self.omit_data = true;
        self
    }

    pub fn flip_data_bit(mut self, bit: usize) -> Self {
        self.flip_data_bit = Some(bit);
        self
    }
}

/// Builds System 34 tracks.
#[derive(Clone, Debug)]
pub struct TrackBuilder {
    encoding: TrackDataEncoding,
    gap3: usize,
    write_iam: bool,
    sectors: Vec<SectorSpec>,
}

impl TrackBuilder {
    pub fn new(encoding: TrackDataEncoding) -> Self {
        TrackBuilder {
            encoding,
            gap3: match encoding {
                TrackDataEncoding::Mfm => IBM_GAP3_DEFAULT,
                TrackDataEncoding::Fm => FM_GAP3_DEFAULT,
            },
            write_iam: true,
            sectors: Vec::new(),
        }
    }

    /// Create a builder for a standard track of `count` sectors numbered from 1, each of size
    /// code `n`, filled with a pattern.
    pub fn standard(ch: DiskCh, count: u8, n: u8, encoding: TrackDataEncoding) -> Self {
        let mut builder = Self::new(encoding);
        for s in 1..=count {
            builder = builder.sector(SectorSpec::with_pattern(DiskChsn::new(ch.c(), ch.h(), s, n)));
        }
        builder
    }

    pub fn gap3(mut self, gap3: usize) -> Self {
        self.gap3 = gap3;
        self
    }

    pub fn iam(mut self, write_iam: bool) -> Self {
        self.write_iam = write_iam;
        self
    }

    pub fn sector(mut self, spec: SectorSpec) -> Self {
        self.sectors.push(spec);
        self
    }

    pub fn sectors(&self) -> &[SectorSpec] {
        &self.sectors
    }

    /// Modify the sector at `index`.
    pub fn modify_sector(mut self, index: usize, f: impl FnOnce(SectorSpec) -> SectorSpec) -> Self {
        if index < self.sectors.len() {
            let spec = self.sectors.remove(index);
            self.sectors.insert(index, f(spec));
        }
        self
    }

    pub fn encoding(&self) -> TrackDataEncoding {
        self.encoding
    }

    /// Lay out the track as a bitstream.
    pub fn build_bits(&self) -> BitVec {
        let mut writer = TrackWriter::new(self.encoding);
        let (gap_byte, gap4a, gap1, gap2) = match self.encoding {
            TrackDataEncoding::Mfm => (MFM_GAP_BYTE, IBM_GAP4A, IBM_GAP1, IBM_GAP2),
            TrackDataEncoding::Fm => (FM_GAP_BYTE, FM_GAP4A, FM_GAP1, FM_GAP2),
        };
        let sync_len = self.encoding.sync_len();

        writer.fill(gap_byte, gap4a);
        if self.write_iam {
            writer.fill(SYNC_BYTE, sync_len);
            writer.marker(0xFC);
        }
        writer.fill(gap_byte, gap1);

        for spec in &self.sectors {
            // Sector header
            writer.fill(SYNC_BYTE, sync_len);
            writer.marker(0xFE);
            let (c, h, s, n) = spec.id.get();
            let header = [c as u8, h, s, n];
            let mut crc = crc_ibm_3740(&header, Some(crc_ibm_3740(&crc_prefix(self.encoding, 0xFE), None)));
            if spec.bad_header_crc {
                crc ^= 0xFFFF;
            }
            writer.bytes(&header);
            writer.bytes(&crc.to_be_bytes());
            writer.fill(gap_byte, gap2);

            if !spec.omit_data {
                // Sector data
                let mark = if spec.deleted { 0xF8 } else { 0xFB };
                writer.fill(SYNC_BYTE, sync_len);
                writer.marker(mark);
                let mut crc = crc_ibm_3740(&spec.data, Some(crc_ibm_3740(&crc_prefix(self.encoding, mark), None)));
                if spec.bad_data_crc {
                    crc ^= 0xFFFF;
                }
                let mut data = spec.data.clone();
                if let Some(bit) = spec.flip_data_bit {
                    if bit / 8 < data.len() {
                        data[bit / 8] ^= 0x80 >> (bit % 8);
                    }
                }
                writer.bytes(&data);
                writer.bytes(&crc.to_be_bytes());
            }
            writer.fill(gap_byte, self.gap3);
        }
        writer.fill(gap_byte, TRAILING_GAP);
        writer.bits
    }

    /// Lay out the track and convert it to flux deltas at the given base (MFM) bit cell period.
    pub fn build_flux(&self, base_period: f64) -> Vec<f64> {
        bits_to_flux(&self.build_bits(), base_period * self.encoding.cell_multiplier())
    }

    /// Lay out the track and produce a synthetic revolution.
    pub fn build_revolution(&self, ch: DiskCh, base_period: f64) -> FluxRevolution {
        let deltas = self.build_flux(base_period);
        let index_time = deltas.iter().sum();
        FluxRevolution::from_f64(ch, &deltas, index_time).synthetic()
    }
}

struct TrackWriter {
    encoding: TrackDataEncoding,
    bits: BitVec,
    previous_bit: bool,
}

impl TrackWriter {
    fn new(encoding: TrackDataEncoding) -> Self {
        TrackWriter {
            encoding,
            bits: BitVec::new(),
            previous_bit: false,
        }
    }

    fn bytes(&mut self, data: &[u8]) {
        match self.encoding {
            TrackDataEncoding::Mfm => {
                self.previous_bit = MfmCodec::encode_bytes(&mut self.bits, data, self.previous_bit);
            }
            TrackDataEncoding::Fm => FmCodec::encode_bytes(&mut self.bits, data),
        }
    }

    fn fill(&mut self, byte: u8, count: usize) {
        self.bytes(&vec![byte; count]);
    }

    fn marker(&mut self, mark: u8) {
        match self.encoding {
            TrackDataEncoding::Mfm => {
                self.previous_bit = MfmCodec::encode_marker(&mut self.bits, mark);
            }
            TrackDataEncoding::Fm => FmCodec::encode_marker(&mut self.bits, mark),
        }
    }
}

/// Convert a bitstream into flux deltas, placing a transition at every 1 bit. Each delta spans
/// the bit cells since the previous transition, the first counted from just before the start of
/// the bitstream. Zeros after the final 1 produce no transition.
pub fn bits_to_flux(bits: &BitVec, cell_period: f64) -> Vec<f64> {
    let mut deltas = Vec::new();
    let mut cells = 0u64;
    for bit in bits.iter() {
        cells += 1;
        if bit {
            deltas.push(cells as f64 * cell_period);
            cells = 0;
        }
    }
    deltas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream_codec::decode_bytes;

    #[test]
    fn flux_spans_cells() {
        let bits = BitVec::from_iter([true, false, true, false, false, true, false]);
        let deltas = bits_to_flux(&bits, 2e-6);
        assert_eq!(deltas, vec![2e-6, 4e-6, 6e-6]);
    }

    #[test]
    fn mfm_header_layout() {
        let ch = DiskCh::new(3, 1);
        let builder = TrackBuilder::standard(ch, 2, 2, TrackDataEncoding::Mfm);
        let bits = builder.build_bits();
        // gap4a + sync + IAM + gap1 + sync, then the IDAM
        let idam = (IBM_GAP4A + 12 + 4 + IBM_GAP1 + 12) * 16;
        let header = decode_bytes(&bits, idam, 4 + 6).unwrap();
        assert_eq!(&header[0..8], &[0xA1, 0xA1, 0xA1, 0xFE, 3, 1, 1, 2]);
        let crc = crc_ibm_3740(&header[0..8], None);
        assert_eq!(crc.to_be_bytes(), [header[8], header[9]]);
    }

    #[test]
    fn fm_flux_is_legal() {
        let builder = TrackBuilder::standard(DiskCh::new(0, 0), 1, 0, TrackDataEncoding::Fm);
        let deltas = builder.build_flux(2e-6);
        assert!(deltas.iter().all(|d| (*d - 4e-6).abs() < 1e-12 || (*d - 8e-6).abs() < 1e-12));
    }

    #[test]
    fn mfm_flux_is_legal() {
        let builder = TrackBuilder::standard(DiskCh::new(0, 0), 3, 1, TrackDataEncoding::Mfm);
        let deltas = builder.build_flux(2e-6);
        // The first transition is measured from the start of the bitstream
        assert!(deltas[1..].iter().all(|d| *d > 3.9e-6 && *d < 8.1e-6));
    }
}
