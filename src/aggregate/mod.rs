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

    src/aggregate/mod.rs

    Multi-revolution aggregation and weak bit detection
*/

//! The `aggregate` module combines several decoded revolutions of the same track into a single
//! consensus bitstream, and finds the bits that do not read the same way every time.
//!
//! Revolutions are aligned to a reference revolution by the positions of their address markers
//! (see [align::marker_alignment]). The inputs are never modified.

pub mod align;
pub(crate) mod consensus;

use bit_vec::BitVec;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    aggregate::{align::Alignment, consensus::BitTally},
    flux::pll::{scan_markers, BitstreamResult},
    types::MergeStrategy,
    FluxRescueError,
};

/// A contiguous range of bits that read inconsistently across revolutions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WeakBitRegion {
    /// Offset of the first weak bit in the consensus bitstream.
    pub start: usize,
    /// Exclusive end offset.
    pub end: usize,
    /// The highest bit variance within the region, up to 0.25.
    pub variance: f64,
    /// Seed for reproducible emulation of the region.
    pub seed: Option<u64>,
}

impl WeakBitRegion {
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

    /// Produce pseudo-random bits to fill the region. The same region always produces the same
    /// bits.
    pub fn emulate(&self) -> BitVec {
        let mut rng = StdRng::seed_from_u64(self.seed.unwrap_or(self.start as u64));
        (0..self.len()).map(|_| rng.gen::<bool>()).collect()
    }
}

/// The output of [Aggregator::aggregate].
#[derive(Clone, Debug)]
pub struct AggregateResult {
    pub consensus: BitstreamResult,
    pub weak_regions: Vec<WeakBitRegion>,
    /// The index of the revolution the others were aligned to.
    pub reference: usize,
    /// The shift of the first alignment segment of each input revolution.
    pub shifts: Vec<isize>,
    /// The piecewise alignment of each input revolution to the reference.
    pub alignments: Vec<Alignment>,
    /// The total number of bits in weak regions.
    pub weak_bit_ct: usize,
    /// The number of offsets at which the revolutions did not all agree.
    pub disagreements: usize,
    /// All revolutions were bit for bit identical.
    pub identical: bool,
}

/// Combines revolutions according to a [MergeStrategy].
#[derive(Clone, Debug)]
pub struct Aggregator {
    strategy: MergeStrategy,
    weak_threshold: f64,
}

impl Aggregator {
    /// Create an aggregator. Bits with a variance at or above `weak_threshold` are weak.
    pub fn new(strategy: MergeStrategy, weak_threshold: f64) -> Self {
        Aggregator {
            strategy,
            weak_threshold,
        }
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    /// Choose the revolution the others are aligned to.
    fn reference(&self, revs: &[&BitstreamResult], scores: &[f64]) -> usize {
        match self.strategy {
            MergeStrategy::BestRevolution if scores.len() == revs.len() => {
                let mut best = 0;
                for (i, score) in scores.iter().enumerate() {
                    if *score > scores[best] {
                        best = i;
                    }
                }
                best
            }
            _ => 0,
        }
    }

    /// Combine revolutions of a track. `scores` holds a quality score per revolution and is
    /// only used by [MergeStrategy::BestRevolution]; it may be empty otherwise.
    pub fn aggregate(&self, revs: &[&BitstreamResult], scores: &[f64]) -> Result<AggregateResult, FluxRescueError> {
        if revs.is_empty() {
            log::error!("Aggregator::aggregate(): No revolutions to aggregate");
            return Err(FluxRescueError::ParameterError);
        }

        let reference = self.reference(revs, scores);
        let ref_rev = revs[reference];

        let first_digest = ref_rev.digest();
        if revs.iter().all(|r| r.digest() == first_digest) {
            log::debug!(
                "Aggregator::aggregate(): {} identical revolutions, skipping vote",
                revs.len()
            );
            return Ok(AggregateResult {
                consensus: ref_rev.clone(),
                weak_regions: Vec::new(),
                reference,
                shifts: vec![0; revs.len()],
                alignments: vec![Alignment::default(); revs.len()],
                weak_bit_ct: 0,
                disagreements: 0,
                identical: true,
            });
        }

        let alignments: Vec<Alignment> = revs
            .iter()
            .enumerate()
            .map(|(i, r)| {
                if i == reference {
                    Alignment::default()
                }
                else {
                    align::marker_alignment(&ref_rev.markers, &ref_rev.bits, &r.markers, &r.bits)
                }
            })
            .collect();
        let shifts: Vec<isize> = alignments.iter().map(Alignment::base_shift).collect();

        let bitvecs: Vec<&BitVec> = revs.iter().map(|r| &r.bits).collect();
        let majority = self.strategy == MergeStrategy::MajorityVote;
        let tally = BitTally::new(&bitvecs, &alignments, ref_rev.len(), majority);
        let disagreements = (0..tally.len()).filter(|i| !tally.is_unanimous(*i)).count();
        let weak_regions = tally.weak_regions(self.weak_threshold, revs.len());
        let weak_bit_ct = weak_regions.iter().map(|r| r.len()).sum();

        let consensus = match self.strategy {
            MergeStrategy::MajorityVote => {
                let bits: BitVec = (0..tally.len())
                    .map(|i| tally.majority(i, ref_rev.bits.get(tally.origin(i)).unwrap_or(false)))
                    .collect();
                let latency: Vec<f64> = (0..tally.len())
                    .map(|i| ref_rev.latency.get(tally.origin(i)).copied().unwrap_or(ref_rev.cell_period))
                    .collect();
                let markers = scan_markers(&bits, ref_rev.encoding, &latency);
                BitstreamResult {
                    bits,
                    markers,
                    latency,
                    ..ref_rev.clone()
                }
            }
            // Per-sector selection for BestSector happens after extraction.
            MergeStrategy::First | MergeStrategy::BestRevolution | MergeStrategy::BestSector => ref_rev.clone(),
        };

        log::debug!(
            "Aggregator::aggregate(): {} revolutions, strategy {}, reference {}, shifts {:?}, {} disagreements, {} weak regions ({} bits)",
            revs.len(),
            self.strategy,
            reference,
            shifts,
            disagreements,
            weak_regions.len(),
            weak_bit_ct
        );

        Ok(AggregateResult {
            consensus,
            weak_regions,
            reference,
            shifts,
            alignments,
            weak_bit_ct,
            disagreements,
            identical: false,
        })
    }
}
