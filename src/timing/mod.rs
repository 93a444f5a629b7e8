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

//! The `timing` module analyzes the time attributed to each bit of a decoded track to find
//! regions written at a non-standard bit rate, and matches them against known copy protection
//! signatures.
//!
//! Analysis is read-only with respect to the bitstream.

pub mod latency;
pub mod signatures;

use crate::{flux::histogram::FluxHistogram, timing::latency::LatencyWindow};

pub use signatures::{ProtectionScheme, ProtectionSignature, SIGNATURES};

// Latency histogram values up to 2^16ns
const LATENCY_HISTOGRAM_POWER: u8 = 16;
const GENERIC_FINDING_PCT: f64 = 1.0;

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingConfig {
    /// Deviation of the rolling average from nominal, in percent, above which a bit is anomalous.
    pub anomaly_threshold_pct: f64,
    /// Width of the centered rolling window, in bits.
    pub window_bits: usize,
    /// Regions shorter than this are dropped.
    pub min_region_bits: usize,
    /// Anomalous runs separated by at most this many bits are merged.
    pub merge_gap_bits: usize,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            anomaly_threshold_pct: 10.0,
            window_bits: 16,
            min_region_bits: 32,
            merge_gap_bits: 8,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LatencyKind {
    /// Bits take longer than nominal
    Long,
    /// Bits take less time than nominal
    Short,
    /// Bit timing varies around nominal
    Variable,
}

/// A contiguous range of bits with anomalous timing.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingRegion {
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
    pub avg_latency: f64,
    pub deviation_pct: f64,
    /// Observed / expected duration.
    pub density_ratio: f64,
    pub std_dev: f64,
    pub kind: LatencyKind,
}

impl TimingRegion {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, bit: usize) -> bool {
        bit >= self.start && bit < self.end
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && end > self.start
    }
}

/// A protection scheme (or generic non-standard timing) inferred from timing regions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtectionFinding {
    pub scheme: ProtectionScheme,
    pub confidence: f64,
    /// Number of regions that matched.
    pub regions: usize,
    /// Number of bits covered by matching regions.
    pub bits: usize,
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingAnalysis {
    pub nominal: f64,
    pub total_bits: usize,
    pub anomalous_bits: usize,
    pub mean_latency: f64,
    pub std_deviation: f64,
    /// The most common latency.
    pub peak_latency: Option<f64>,
    pub regions: Vec<TimingRegion>,
    pub findings: Vec<ProtectionFinding>,
}

impl TimingAnalysis {
    /// Return the density ratio at a bit offset: that of the region containing it, or 1.0.
    pub fn density_ratio_at(&self, bit: usize) -> f64 {
        self.regions
            .iter()
            .find(|r| r.contains(bit))
            .map_or(1.0, |r| r.density_ratio)
    }

    /// Return the percentage of bits that are anomalous.
    pub fn anomaly_pct(&self) -> f64 {
        if self.total_bits == 0 {
            0.0
        }
        else {
            self.anomalous_bits as f64 / self.total_bits as f64 * 100.0
        }
    }

    /// Return true if any region overlaps the bit range `start..end`.
    pub fn is_anomalous_range(&self, start: usize, end: usize) -> bool {
        self.regions.iter().any(|r| r.overlaps(start, end))
    }

    /// Return the best named protection finding, if any.
    pub fn protection(&self) -> Option<&ProtectionFinding> {
        self.findings
            .iter()
            .find(|f| f.scheme != ProtectionScheme::NonStandardTiming)
    }
}

/// Classifies per-bit timing.
#[derive(Clone, Debug)]
pub struct TimingClassifier {
    config: TimingConfig,
    signatures: Vec<ProtectionSignature>,
}

impl Default for TimingClassifier {
    fn default() -> Self {
        Self::new(TimingConfig::default())
    }
}

impl TimingClassifier {
    pub fn new(config: TimingConfig) -> Self {
        TimingClassifier {
            config,
            signatures: SIGNATURES.to_vec(),
        }
    }

    /// Add signatures to those that are matched.
    pub fn with_signatures(mut self, signatures: impl IntoIterator<Item = ProtectionSignature>) -> Self {
        self.signatures.extend(signatures);
        self
    }

    pub fn signatures(&self) -> &[ProtectionSignature] {
        &self.signatures
    }

    /// Analyze the per-bit `latency` of a track against the `nominal` bit cell period.
    pub fn analyze(&self, latency: &[f64], nominal: f64) -> TimingAnalysis {
        if latency.is_empty() || !(nominal.is_finite() && nominal > 0.0) {
            return TimingAnalysis {
                nominal,
                ..TimingAnalysis::default()
            };
        }

        let peak_latency = FluxHistogram::with_max_power(latency, 1.0, LATENCY_HISTOGRAM_POWER)
            .ok()
            .and_then(|h| h.mode());

        let window = LatencyWindow::new(latency);
        let (mean_latency, std_deviation) = window.stats(0, latency.len());
        let anomalous = latency::anomalous_bits(&window, latency.len(), nominal, &self.config);
        let anomalous_bits = anomalous.iter().filter(|a| **a).count();
        let regions = latency::find_regions(latency, &window, &anomalous, nominal, &self.config);

        let mut analysis = TimingAnalysis {
            nominal,
            total_bits: latency.len(),
            anomalous_bits,
            mean_latency,
            std_deviation,
            peak_latency,
            regions,
            findings: Vec::new(),
        };
        analysis.findings = self.classify(&analysis);

        log::debug!(
            "TimingClassifier::analyze(): {} bits, mean {} sd {}, {} anomalous ({:.2}%), {} regions, {} findings",
            analysis.total_bits,
            format_us!(mean_latency),
            format_us!(std_deviation),
            anomalous_bits,
            analysis.anomaly_pct(),
            analysis.regions.len(),
            analysis.findings.len()
        );
        analysis
    }

    fn classify(&self, analysis: &TimingAnalysis) -> Vec<ProtectionFinding> {
        let mut best: Option<ProtectionFinding> = None;
        for signature in &self.signatures {
            let (score, regions, bits) = signature.score(&analysis.regions);
            if regions == 0 || score < signature.min_confidence {
                continue;
            }
            if best.as_ref().map_or(true, |b| score > b.confidence) {
                best = Some(ProtectionFinding {
                    scheme: signature.scheme.clone(),
                    confidence: score,
                    regions,
                    bits,
                });
            }
        }

        if let Some(finding) = best {
            log::debug!(
                "TimingClassifier::classify(): Matched {} with confidence {:.2}",
                finding.scheme,
                finding.confidence
            );
            return vec![finding];
        }

        let anomaly_pct = analysis.anomaly_pct();
        if anomaly_pct > GENERIC_FINDING_PCT {
            return vec![ProtectionFinding {
                scheme: ProtectionScheme::NonStandardTiming,
                confidence: (anomaly_pct * 10.0).min(80.0) / 100.0,
                regions: analysis.regions.len(),
                bits: analysis.anomalous_bits,
            }];
        }
        Vec::new()
    }
}
