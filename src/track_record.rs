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

//! A [TrackRecord] is the final result of decoding a track: the sectors recovered, the weak
//! and timing regions found, and the diagnoses made along the way.

use crate::{
    aggregate::WeakBitRegion,
    diagnosis::{Diagnosis, DiagnosisCode},
    flux::{
        flux_revolution::FluxRevolution,
        pll::{BitstreamResult, PllPreset},
    },
    policy::TrackState,
    sector::{SectorRecord, TrackSummary},
    timing::{ProtectionFinding, TimingRegion},
    types::{DiskCh, DiskChsn, TrackDataEncoding, TrackFlags},
    FluxRescueError,
};

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackRecord {
    pub ch: DiskCh,
    pub encoding: TrackDataEncoding,
    /// The nominal bit cell period of the decoded bitstream, in seconds.
    pub cell_period: f64,
    pub expected_sectors: Option<u8>,
    pub sectors: Vec<SectorRecord>,
    pub weak_regions: Vec<WeakBitRegion>,
    pub timing_regions: Vec<TimingRegion>,
    pub protection: Vec<ProtectionFinding>,
    pub diagnoses: Vec<Diagnosis>,
    pub state: TrackState,
    pub flags: TrackFlags,
    /// The number of revolutions the result was built from.
    pub revolutions_used: usize,
    /// Retries made because sectors were missing or the sector count was wrong.
    pub track_retries: u32,
    /// Retries made because sectors had errors or weak bits.
    pub sector_retries: u32,
    /// The PLL preset of the final decode pass.
    pub pll_preset: PllPreset,
    /// The consensus bitstream, if preserved.
    pub consensus: Option<BitstreamResult>,
    /// The raw revolutions, if preserved.
    pub raw_revolutions: Vec<FluxRevolution>,
}

impl TrackRecord {
    pub fn new(ch: DiskCh, encoding: TrackDataEncoding, cell_period: f64) -> Self {
        TrackRecord {
            ch,
            encoding,
            cell_period,
            expected_sectors: None,
            sectors: Vec::new(),
            weak_regions: Vec::new(),
            timing_regions: Vec::new(),
            protection: Vec::new(),
            diagnoses: Vec::new(),
            state: TrackState::Idle,
            flags: TrackFlags::empty(),
            revolutions_used: 0,
            track_retries: 0,
            sector_retries: 0,
            pll_preset: PllPreset::Default,
            consensus: None,
            raw_revolutions: Vec::new(),
        }
    }

    /// The number of sectors found, valid or not.
    pub fn found_ct(&self) -> usize {
        self.sectors.len()
    }

    /// The number of sectors with a valid header and valid data.
    pub fn valid_ct(&self) -> usize {
        self.sectors.iter().filter(|s| s.is_valid()).count()
    }

    /// The number of sectors with an error, plus any expected sectors that were not found.
    pub fn bad_ct(&self) -> usize {
        let missing = self
            .expected_sectors
            .map_or(0, |e| (e as usize).saturating_sub(self.found_ct()));
        self.found_ct() - self.valid_ct() + missing
    }

    /// Return true if every expected sector was found and is valid. If the expected sector count
    /// is unknown, at least one sector must have been found.
    pub fn is_complete(&self) -> bool {
        let valid = self.valid_ct();
        match self.expected_sectors {
            Some(expected) => valid >= expected as usize && valid == self.found_ct(),
            None => valid > 0 && valid == self.found_ct(),
        }
    }

    pub fn summary(&self) -> TrackSummary {
        TrackSummary::from_sectors(self.ch, &self.sectors)
    }

    /// Return the first sector with the given ID.
    pub fn sector(&self, id: DiskChsn) -> Option<&SectorRecord> {
        self.sectors.iter().find(|s| s.id == id)
    }

    /// Return the first sector with the given sector number.
    pub fn sector_by_s(&self, s: u8) -> Option<&SectorRecord> {
        self.sectors.iter().find(|r| r.id.s() == s)
    }

    pub fn diagnoses_of(&self, code: DiagnosisCode) -> impl Iterator<Item = &Diagnosis> {
        self.diagnoses.iter().filter(move |d| d.code == code)
    }

    pub fn has_diagnosis(&self, code: DiagnosisCode) -> bool {
        self.diagnoses_of(code).next().is_some()
    }

    /// Return the record, or an error if decoding of the track was abandoned.
    pub fn require_done(self) -> Result<TrackRecord, FluxRescueError> {
        match self.state {
            TrackState::Abandoned => Err(FluxRescueError::Abandoned(self.ch)),
            _ => Ok(self),
        }
    }

    pub(crate) fn diagnose(&mut self, diagnosis: Diagnosis) {
        log::debug!("TrackRecord::diagnose(): {}", diagnosis);
        self.diagnoses.push(diagnosis);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        sector::{ScoreComponents, SectorData},
        types::IntegrityField,
    };

    fn sector(s: u8, valid: bool) -> SectorRecord {
        SectorRecord {
            id: DiskChsn::new(0, 0, s, 2),
            bit_offset: 0,
            data_offset: None,
            header: IntegrityField::new(1, 1),
            data: if valid {
                SectorData::Valid(vec![0; 512])
            }
            else {
                SectorData::Missing
            },
            deleted: false,
            confidence: if valid { 1.0 } else { 0.2 },
            components: ScoreComponents::default(),
            weak: false,
            timing_anomaly: false,
            corrected_bits: 0,
            copies: Vec::new(),
            best_revolution: None,
        }
    }

    #[test]
    fn counts() {
        let mut record = TrackRecord::new(DiskCh::new(0, 0), TrackDataEncoding::Mfm, 2e-6);
        assert!(!record.is_complete());
        record.expected_sectors = Some(3);
        record.sectors = vec![sector(1, true), sector(2, false)];
        assert_eq!(record.found_ct(), 2);
        assert_eq!(record.valid_ct(), 1);
        assert_eq!(record.bad_ct(), 2);
        assert!(!record.is_complete());
        assert_eq!(record.summary().missing_data_ct, 1);
        assert!(record.sector_by_s(2).is_some());

        record.sectors = vec![sector(1, true), sector(2, true), sector(3, true)];
        assert!(record.is_complete());
        assert!(record.summary().fully_readable);
    }

    #[test]
    fn abandoned_is_an_error() {
        let mut record = TrackRecord::new(DiskCh::new(3, 0), TrackDataEncoding::Mfm, 2e-6);
        record.state = TrackState::Abandoned;
        assert_eq!(
            record.require_done().unwrap_err(),
            FluxRescueError::Abandoned(DiskCh::new(3, 0))
        );
    }
}
