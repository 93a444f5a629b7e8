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

    src/sector/confidence.rs

    Sector confidence scoring
*/

//! Sector confidence scoring.
//!
//! A sector's confidence is a weighted average of five component scores, each in `[0, 1]`,
//! followed by modifiers that cap or scale the result for data errors, weak bits, timing
//! anomalies and CRC repairs.

use std::fmt::{Display, Formatter};

use crate::{
    flux::pll::PllDecodeStatEntry,
    sector::{SectorData, SectorRecord},
    types::DiskCh,
};

/// Deviation of the density ratio from 1.0 at which the timing score reaches 0.
const TIMING_RATIO_SPAN: f64 = 0.5;
/// Score given to jitter when no PLL statistics are available.
const UNKNOWN_JITTER_SCORE: f64 = 0.5;

const DATA_CRC_CAP: f64 = 0.5;
const MISSING_DATA_CAP: f64 = 0.25;
const WEAK_BITS_FACTOR: f64 = 0.9;
const TIMING_ANOMALY_FACTOR: f64 = 0.95;
const CORRECTION_PENALTY: f64 = 0.1;
const CORRECTION_FLOOR: f64 = 0.5;

/// Relative weights of the score components.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreWeights {
    pub crc: f64,
    pub plausibility: f64,
    pub timing: f64,
    pub sync: f64,
    pub jitter: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            crc: 0.30,
            plausibility: 0.20,
            timing: 0.20,
            sync: 0.15,
            jitter: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.crc + self.plausibility + self.timing + self.sync + self.jitter
    }
}

/// The individual scores a sector's confidence is built from.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreComponents {
    /// 1.0 if the header CRC is valid.
    pub crc: f64,
    /// Fraction of identifier plausibility checks passed.
    pub plausibility: f64,
    /// Closeness of the bit density at the sector to nominal.
    pub timing: f64,
    /// Completeness of the sync run before the header, and presence of a data mark.
    pub sync: f64,
    /// Inverse of the mean PLL phase error over the sector.
    pub jitter: f64,
}

impl ScoreComponents {
    /// Combine the components with `weights`. Returns 0 if the weights sum to 0.
    pub fn weighted(&self, weights: &ScoreWeights) -> f64 {
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        let sum = self.crc * weights.crc
            + self.plausibility * weights.plausibility
            + self.timing * weights.timing
            + self.sync * weights.sync
            + self.jitter * weights.jitter;
        (sum / total).clamp(0.0, 1.0)
    }
}

/// Conditions that limit a sector's confidence after weighting.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScoreModifiers {
    pub data_crc_failed: bool,
    pub data_missing: bool,
    pub weak_bits: bool,
    pub timing_anomaly: bool,
    pub corrected_bits: u32,
}

impl ScoreModifiers {
    pub fn apply(&self, score: f64) -> f64 {
        let mut score = score;
        if self.data_crc_failed {
            score = score.min(DATA_CRC_CAP);
        }
        if self.data_missing {
            score = score.min(MISSING_DATA_CAP);
        }
        if self.weak_bits {
            score *= WEAK_BITS_FACTOR;
        }
        if self.timing_anomaly {
            score *= TIMING_ANOMALY_FACTOR;
        }
        if self.corrected_bits > 0 {
            score *= (1.0 - CORRECTION_PENALTY * self.corrected_bits as f64).max(CORRECTION_FLOOR);
        }
        score.clamp(0.0, 1.0)
    }
}

/// Timing score for the density ratio at a sector: 1.0 at nominal density, falling linearly
/// to 0 at a deviation of 50%.
pub fn timing_score(density_ratio: f64) -> f64 {
    1.0 - ((density_ratio - 1.0).abs() / TIMING_RATIO_SPAN).min(1.0)
}

/// Sync score from the number of sync bytes found before a header, out of `sync_len` expected,
/// and whether a data mark followed the header.
pub fn sync_score(sync_ct: usize, sync_len: usize, data_mark: bool) -> f64 {
    let sync = if sync_len == 0 {
        1.0
    }
    else {
        (sync_ct.min(sync_len) as f64) / sync_len as f64
    };
    0.5 * sync + if data_mark { 0.5 } else { 0.0 }
}

/// Jitter score from the PLL statistics of the fluxes within a sector. A mean phase error of
/// half a bit cell or more scores 0.
pub fn jitter_score(stats: &[PllDecodeStatEntry], cell_period: f64) -> f64 {
    if stats.is_empty() || cell_period <= 0.0 {
        return UNKNOWN_JITTER_SCORE;
    }
    let mean = stats.iter().map(|e| e.phase_err.abs()).sum::<f64>() / stats.len() as f64;
    1.0 - (mean / (cell_period / 2.0)).min(1.0)
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum QualityLevel {
    #[default]
    Unknown,
    Bad,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl Display for QualityLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            QualityLevel::Unknown => write!(f, "Unknown"),
            QualityLevel::Bad => write!(f, "Bad"),
            QualityLevel::Poor => write!(f, "Poor"),
            QualityLevel::Fair => write!(f, "Fair"),
            QualityLevel::Good => write!(f, "Good"),
            QualityLevel::Excellent => write!(f, "Excellent"),
        }
    }
}

impl QualityLevel {
    pub fn from_score(score: f64) -> QualityLevel {
        match score {
            s if s >= 0.9 => QualityLevel::Excellent,
            s if s >= 0.75 => QualityLevel::Good,
            s if s >= 0.5 => QualityLevel::Fair,
            s if s >= 0.25 => QualityLevel::Poor,
            s if s > 0.0 => QualityLevel::Bad,
            _ => QualityLevel::Unknown,
        }
    }
}

/// Summary statistics over the sectors of a track.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackSummary {
    pub ch: DiskCh,
    pub sector_ct: usize,
    pub valid_ct: usize,
    pub id_crc_error_ct: usize,
    pub data_crc_error_ct: usize,
    pub missing_data_ct: usize,
    pub min_confidence: f64,
    pub max_confidence: f64,
    pub avg_confidence: f64,
    pub std_dev: f64,
    /// Number of sectors at each [QualityLevel], indexed by level.
    pub levels: [usize; 6],
    /// Every sector found has a valid header and valid data.
    pub fully_readable: bool,
}

impl TrackSummary {
    pub fn from_sectors(ch: DiskCh, sectors: &[SectorRecord]) -> TrackSummary {
        let mut summary = TrackSummary {
            ch,
            sector_ct: sectors.len(),
            ..TrackSummary::default()
        };
        if sectors.is_empty() {
            return summary;
        }

        summary.min_confidence = f64::MAX;
        let mut sum = 0.0;
        for sector in sectors {
            let c = sector.confidence;
            sum += c;
            summary.min_confidence = summary.min_confidence.min(c);
            summary.max_confidence = summary.max_confidence.max(c);
            summary.levels[sector.quality() as usize] += 1;
            if sector.is_valid() {
                summary.valid_ct += 1;
            }
            if sector.header.is_error() {
                summary.id_crc_error_ct += 1;
            }
            match sector.data {
                SectorData::CrcFailed { .. } => summary.data_crc_error_ct += 1,
                SectorData::Missing => summary.missing_data_ct += 1,
                SectorData::Valid(_) => {}
            }
        }
        let n = sectors.len() as f64;
        summary.avg_confidence = sum / n;
        let variance = sectors
            .iter()
            .map(|s| (s.confidence - summary.avg_confidence).powi(2))
            .sum::<f64>()
            / n;
        summary.std_dev = variance.sqrt();
        summary.fully_readable = summary.valid_ct == summary.sector_ct;
        summary
    }

    pub fn count(&self, level: QualityLevel) -> usize {
        self.levels[level as usize]
    }
}

impl Display for TrackSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}/{} valid, confidence min {:.2} avg {:.2} max {:.2}",
            self.ch, self.valid_ct, self.sector_ct, self.min_confidence, self.avg_confidence, self.max_confidence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_components() {
        let components = ScoreComponents {
            crc: 1.0,
            plausibility: 1.0,
            timing: 1.0,
            sync: 1.0,
            jitter: 1.0,
        };
        assert!((components.weighted(&ScoreWeights::default()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weights_are_normalized() {
        let components = ScoreComponents {
            crc: 1.0,
            ..ScoreComponents::default()
        };
        let weights = ScoreWeights {
            crc: 2.0,
            plausibility: 2.0,
            timing: 0.0,
            sync: 0.0,
            jitter: 0.0,
        };
        assert!((components.weighted(&weights) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn modifiers() {
        let m = ScoreModifiers {
            data_crc_failed: true,
            ..ScoreModifiers::default()
        };
        assert_eq!(m.apply(0.95), 0.5);
        let m = ScoreModifiers {
            data_missing: true,
            ..ScoreModifiers::default()
        };
        assert_eq!(m.apply(0.95), 0.25);
        let m = ScoreModifiers {
            corrected_bits: 7,
            ..ScoreModifiers::default()
        };
        assert!((m.apply(1.0) - 0.5).abs() < 1e-12);
        let m = ScoreModifiers {
            weak_bits: true,
            timing_anomaly: true,
            ..ScoreModifiers::default()
        };
        assert!((m.apply(1.0) - 0.855).abs() < 1e-12);
    }

    #[test]
    fn component_scores() {
        assert_eq!(timing_score(1.0), 1.0);
        assert!((timing_score(1.25) - 0.5).abs() < 1e-12);
        assert_eq!(timing_score(0.4), 0.0);
        assert_eq!(sync_score(12, 12, true), 1.0);
        assert_eq!(sync_score(6, 12, false), 0.25);
        assert_eq!(jitter_score(&[], 2e-6), UNKNOWN_JITTER_SCORE);
    }

    #[test]
    fn levels() {
        assert_eq!(QualityLevel::from_score(0.95), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.8), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.5), QualityLevel::Fair);
        assert_eq!(QualityLevel::from_score(0.3), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.1), QualityLevel::Bad);
        assert_eq!(QualityLevel::from_score(0.0), QualityLevel::Unknown);
    }
}
