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

//! The `sector` module extracts System 34 sectors from decoded bitstreams, scores them, and
//! chooses between the copies of a sector read on different revolutions.

pub mod confidence;
pub mod crc_repair;
pub mod extract;

use std::fmt::{Display, Formatter};

use crate::types::{DiskChsn, IntegrityField, MergeStrategy};

pub use confidence::{QualityLevel, ScoreComponents, ScoreWeights, TrackSummary};
pub use extract::{extract_sectors, ExtractOptions, ExtractResult};

/// The data field of a sector.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SectorData {
    /// The data field was read and passed its CRC check.
    Valid(Vec<u8>),
    /// The data field was read but failed its CRC check.
    CrcFailed { data: Vec<u8>, check: IntegrityField },
    /// No data field was found for the sector header.
    Missing,
}

impl Display for SectorData {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SectorData::Valid(data) => write!(f, "Valid ({} bytes)", data.len()),
            SectorData::CrcFailed { data, check } => write!(f, "CRC failed ({} bytes, {})", data.len(), check),
            SectorData::Missing => write!(f, "Missing"),
        }
    }
}

impl SectorData {
    pub fn is_valid(&self) -> bool {
        matches!(self, SectorData::Valid(_))
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, SectorData::Missing)
    }

    /// Return the data bytes, valid or not.
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            SectorData::Valid(data) | SectorData::CrcFailed { data, .. } => Some(data),
            SectorData::Missing => None,
        }
    }

    /// Return the data bytes only if they passed their CRC check.
    pub fn valid_data(&self) -> Option<&[u8]> {
        match self {
            SectorData::Valid(data) => Some(data),
            _ => None,
        }
    }

    /// Rank used when choosing between copies: valid beats failed beats missing.
    fn rank(&self) -> u8 {
        match self {
            SectorData::Valid(_) => 2,
            SectorData::CrcFailed { .. } => 1,
            SectorData::Missing => 0,
        }
    }
}

/// A sector as read on a single revolution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectorCopy {
    pub revolution: usize,
    pub bit_offset: usize,
    pub header: IntegrityField,
    pub data: SectorData,
    pub confidence: f64,
}

/// A sector recovered from a track.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SectorRecord {
    pub id: DiskChsn,
    /// Offset of the IDAM in the bitstream the sector was extracted from.
    pub bit_offset: usize,
    /// Offset of the data mark, if one was found.
    pub data_offset: Option<usize>,
    pub header: IntegrityField,
    pub data: SectorData,
    /// The data field was written with a Deleted Data Address Mark.
    pub deleted: bool,
    pub confidence: f64,
    pub components: ScoreComponents,
    /// The sector overlaps a weak bit region.
    pub weak: bool,
    /// The sector overlaps a region of anomalous timing.
    pub timing_anomaly: bool,
    /// The number of bits changed by CRC repair.
    pub corrected_bits: u32,
    /// The copies of this sector read on each revolution, if kept.
    pub copies: Vec<SectorCopy>,
    /// The revolution with the best copy of this sector.
    pub best_revolution: Option<usize>,
}

impl Display for SectorRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} header: {} data: {} confidence: {:.2}",
            self.id, self.header, self.data, self.confidence
        )
    }
}

impl SectorRecord {
    #[inline]
    pub fn id_crc_valid(&self) -> bool {
        self.header.is_valid()
    }

    #[inline]
    pub fn data_crc_valid(&self) -> bool {
        self.data.is_valid()
    }

    /// Return true if both the header and the data passed their CRC checks.
    pub fn is_valid(&self) -> bool {
        self.id_crc_valid() && self.data_crc_valid()
    }

    pub fn quality(&self) -> QualityLevel {
        QualityLevel::from_score(self.confidence)
    }

    pub fn copy(&self, revolution: usize) -> SectorCopy {
        SectorCopy {
            revolution,
            bit_offset: self.bit_offset,
            header: self.header,
            data: self.data.clone(),
            confidence: self.confidence,
        }
    }

    /// Return true if `other` should replace this sector: it has better data, or equally good
    /// data with a higher confidence.
    pub fn is_superseded_by(&self, other: &SectorRecord) -> bool {
        let mine = (self.data.rank(), self.id_crc_valid());
        let theirs = (other.data.rank(), other.id_crc_valid());
        theirs > mine || (theirs == mine && other.confidence > self.confidence)
    }

    /// Replace the contents of this sector with those of `other`, keeping its copies.
    pub(crate) fn take_contents(&mut self, other: &SectorRecord) {
        self.header = other.header;
        self.data = other.data.clone();
        self.deleted = other.deleted;
        self.confidence = other.confidence;
        self.components = other.components.clone();
        self.weak = other.weak;
        self.timing_anomaly = other.timing_anomaly;
        self.corrected_bits = other.corrected_bits;
    }
}

/// Return the index of the `nth` sector in `sectors` with the ID `id`.
fn find_nth(sectors: &[SectorRecord], id: DiskChsn, nth: usize) -> Option<usize> {
    sectors
        .iter()
        .enumerate()
        .filter(|(_, s)| s.id == id)
        .nth(nth)
        .map(|(i, _)| i)
}

/// Attach the per-revolution copies of each sector to the sectors extracted from the consensus
/// bitstream, and record the revolution with the best copy.
///
/// Sectors are matched by ID; the n-th sector with a given ID matches the n-th sector with that
/// ID on each revolution. With [MergeStrategy::BestSector], each sector is replaced by its best
/// copy if that copy is better. Sectors that were not found in the consensus bitstream but were
/// found on some revolution are added from their best copy.
pub fn select_best_sectors(
    primary: Vec<SectorRecord>,
    per_revolution: &[Vec<SectorRecord>],
    strategy: MergeStrategy,
    keep_copies: bool,
) -> Vec<SectorRecord> {
    let mut sectors = primary;
    let primary_ct = sectors.len();

    // Add sectors that only appear on some revolutions.
    for rev_sectors in per_revolution {
        for (i, sector) in rev_sectors.iter().enumerate() {
            let nth = rev_sectors[..i].iter().filter(|s| s.id == sector.id).count();
            if find_nth(&sectors, sector.id, nth).is_none() {
                log::debug!(
                    "select_best_sectors(): Sector {} missing from consensus, adding from revolution copy",
                    sector.id
                );
                let mut added = sector.clone();
                added.copies.clear();
                added.best_revolution = None;
                sectors.push(added);
            }
        }
    }

    for i in 0..sectors.len() {
        let id = sectors[i].id;
        let nth = sectors[..i].iter().filter(|s| s.id == id).count();

        let mut best: Option<(usize, &SectorRecord)> = None;
        let mut copies = Vec::new();
        for (revolution, rev_sectors) in per_revolution.iter().enumerate() {
            if let Some(idx) = find_nth(rev_sectors, id, nth) {
                let candidate = &rev_sectors[idx];
                copies.push(candidate.copy(revolution));
                match best {
                    Some((_, b)) if !b.is_superseded_by(candidate) => {}
                    _ => best = Some((revolution, candidate)),
                }
            }
        }

        let sector = &mut sectors[i];
        if let Some((revolution, best_copy)) = best {
            sector.best_revolution = Some(revolution);
            let added = i >= primary_ct;
            if (added || strategy == MergeStrategy::BestSector) && sector.is_superseded_by(best_copy) {
                log::debug!(
                    "select_best_sectors(): Using revolution {} copy of sector {}",
                    revolution,
                    sector.id
                );
                sector.take_contents(best_copy);
            }
        }
        if keep_copies {
            sector.copies = copies;
        }
    }
    sectors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(s: u8, data: SectorData, confidence: f64) -> SectorRecord {
        SectorRecord {
            id: DiskChsn::new(0, 0, s, 0),
            bit_offset: s as usize * 1000,
            data_offset: None,
            header: IntegrityField::new(0x1234, 0x1234),
            data,
            deleted: false,
            confidence,
            components: ScoreComponents::default(),
            weak: false,
            timing_anomaly: false,
            corrected_bits: 0,
            copies: Vec::new(),
            best_revolution: None,
        }
    }

    fn failed() -> SectorData {
        SectorData::CrcFailed {
            data: vec![0; 128],
            check: IntegrityField::new(1, 2),
        }
    }

    #[test]
    fn supersede_order() {
        let bad = record(1, failed(), 0.5);
        let good = record(1, SectorData::Valid(vec![0; 128]), 0.4);
        assert!(bad.is_superseded_by(&good));
        assert!(!good.is_superseded_by(&bad));
        let better = record(1, SectorData::Valid(vec![0; 128]), 0.9);
        assert!(good.is_superseded_by(&better));
        assert!(!better.is_superseded_by(&good));
    }

    #[test]
    fn best_sector_replaces_data() {
        let primary = vec![record(1, failed(), 0.5)];
        let revs = vec![
            vec![record(1, failed(), 0.5)],
            vec![record(1, SectorData::Valid(vec![0; 128]), 0.95), record(2, SectorData::Missing, 0.2)],
        ];
        let merged = select_best_sectors(primary.clone(), &revs, MergeStrategy::BestSector, true);
        assert_eq!(merged.len(), 2);
        assert!(merged[0].data.is_valid());
        assert_eq!(merged[0].best_revolution, Some(1));
        assert_eq!(merged[0].copies.len(), 2);
        assert!(!merged[0].copies[0].data.is_valid());
        assert_eq!(merged[1].id.s(), 2);

        // Other strategies only record the best revolution
        let merged = select_best_sectors(primary, &revs, MergeStrategy::First, false);
        assert!(!merged[0].data.is_valid());
        assert_eq!(merged[0].best_revolution, Some(1));
        assert!(merged[0].copies.is_empty());
    }
}
