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

//! Known copy protection timing signatures.
//!
//! Several protection schemes write regions of a track at a bit rate that differs from the rest
//! of the track. A signature describes the expected density ratio and size of such regions.

use std::{
    borrow::Cow,
    fmt::{Display, Formatter, Result},
};

use crate::timing::TimingRegion;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ProtectionScheme {
    Speedlock,
    Copylock,
    VMax,
    RapidLok,
    Spiral,
    Macrodos,
    Flaschel,
    /// A caller supplied signature.
    Custom(Cow<'static, str>),
    /// Non-standard timing that matched no signature.
    NonStandardTiming,
}

impl ProtectionScheme {
    /// A caller supplied scheme name.
    pub const fn custom(name: &'static str) -> Self {
        ProtectionScheme::Custom(Cow::Borrowed(name))
    }
}

impl Display for ProtectionScheme {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            ProtectionScheme::Speedlock => write!(f, "Speedlock"),
            ProtectionScheme::Copylock => write!(f, "Copylock"),
            ProtectionScheme::VMax => write!(f, "V-MAX!"),
            ProtectionScheme::RapidLok => write!(f, "RapidLok"),
            ProtectionScheme::Spiral => write!(f, "Spiral"),
            ProtectionScheme::Macrodos => write!(f, "Macrodos"),
            ProtectionScheme::Flaschel => write!(f, "Flaschel"),
            ProtectionScheme::Custom(name) => write!(f, "{}", name),
            ProtectionScheme::NonStandardTiming => write!(f, "Non-standard timing"),
        }
    }
}

/// The timing profile of a protection scheme.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtectionSignature {
    pub scheme: ProtectionScheme,
    /// Inclusive range of the region density ratio (observed / expected duration).
    pub min_ratio: f64,
    pub max_ratio: f64,
    /// Inclusive range of the region size in bits.
    pub min_bits: usize,
    pub max_bits: usize,
    /// Minimum score for the signature to be reported.
    pub min_confidence: f64,
}

pub static SIGNATURES: [ProtectionSignature; 7] = [
    ProtectionSignature {
        scheme: ProtectionScheme::Speedlock,
        min_ratio: 0.85,
        max_ratio: 1.25,
        min_bits: 500,
        max_bits: 5000,
        min_confidence: 0.70,
    },
    ProtectionSignature {
        scheme: ProtectionScheme::Copylock,
        min_ratio: 1.02,
        max_ratio: 1.15,
        min_bits: 1000,
        max_bits: 50000,
        min_confidence: 0.60,
    },
    ProtectionSignature {
        scheme: ProtectionScheme::VMax,
        min_ratio: 0.90,
        max_ratio: 1.10,
        min_bits: 100,
        max_bits: 2000,
        min_confidence: 0.65,
    },
    ProtectionSignature {
        scheme: ProtectionScheme::RapidLok,
        min_ratio: 0.80,
        max_ratio: 1.20,
        min_bits: 50,
        max_bits: 500,
        min_confidence: 0.60,
    },
    ProtectionSignature {
        scheme: ProtectionScheme::Spiral,
        min_ratio: 0.95,
        max_ratio: 1.05,
        min_bits: 5000,
        max_bits: 50000,
        min_confidence: 0.55,
    },
    ProtectionSignature {
        scheme: ProtectionScheme::Macrodos,
        min_ratio: 1.00,
        max_ratio: 1.10,
        min_bits: 2000,
        max_bits: 10000,
        min_confidence: 0.50,
    },
    ProtectionSignature {
        scheme: ProtectionScheme::Flaschel,
        min_ratio: 0.70,
        max_ratio: 0.95,
        min_bits: 100,
        max_bits: 1000,
        min_confidence: 0.60,
    },
];

const SCORE_PER_MATCH: f64 = 0.2;
const COVERAGE_BOOST_BITS: usize = 1000;
const COVERAGE_BOOST: f64 = 1.2;

impl ProtectionSignature {
    /// Return true if a single region fits the signature.
    pub fn matches(&self, region: &TimingRegion) -> bool {
        let size = region.len();
        region.density_ratio >= self.min_ratio
            && region.density_ratio <= self.max_ratio
            && size >= self.min_bits
            && size <= self.max_bits
    }

    /// Score a set of regions against the signature.
    /// Returns the score, the number of matching regions and the number of bits they cover.
    pub fn score(&self, regions: &[TimingRegion]) -> (f64, usize, usize) {
        let (matches, bits) = regions
            .iter()
            .filter(|r| self.matches(r))
            .fold((0usize, 0usize), |(m, b), r| (m + 1, b + r.len()));

        let mut score = (SCORE_PER_MATCH * matches as f64).min(1.0);
        if bits > COVERAGE_BOOST_BITS {
            score *= COVERAGE_BOOST;
        }
        (score.min(1.0), matches, bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timing::LatencyKind;

    fn region(start: usize, end: usize, ratio: f64) -> TimingRegion {
        TimingRegion {
            start,
            end,
            avg_latency: 2e-6 * ratio,
            deviation_pct: (ratio - 1.0) * 100.0,
            density_ratio: ratio,
            std_dev: 0.0,
            kind: LatencyKind::Long,
        }
    }

    #[test]
    fn score_scales_with_matches() {
        let sig = &SIGNATURES[3];
        assert_eq!(sig.scheme, ProtectionScheme::RapidLok);
        let regions = vec![region(0, 100, 1.15), region(500, 600, 1.18), region(900, 1000, 1.5)];
        let (score, matches, bits) = sig.score(&regions);
        assert_eq!(matches, 2);
        assert_eq!(bits, 200);
        assert!((score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn coverage_boost() {
        let sig = &SIGNATURES[1];
        let regions = vec![region(0, 1500, 1.08)];
        let (score, _, _) = sig.score(&regions);
        assert!((score - 0.24).abs() < 1e-9);
    }

    #[test]
    fn names() {
        assert_eq!(ProtectionScheme::VMax.to_string(), "V-MAX!");
        assert_eq!(ProtectionScheme::custom("HalfRate").to_string(), "HalfRate");
        assert_eq!(
            ProtectionScheme::custom("HalfRate"),
            ProtectionScheme::Custom(Cow::Owned("HalfRate".to_string()))
        );
    }
}
