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

    src/aggregate/consensus.rs

    Per-bit voting across aligned revolutions
*/

//! Per-offset vote counting across aligned revolutions.

use bit_vec::BitVec;

use crate::aggregate::{align::Alignment, WeakBitRegion};

/// Counts of observed and set bits at each offset of the consensus frame.
pub(crate) struct BitTally {
    ones: Vec<u16>,
    observed: Vec<u16>,
    /// The reference offset each consensus offset was taken from.
    origin: Vec<usize>,
}

impl BitTally {
    /// Count the bits of every revolution over the `len` offsets of the reference. Bit `i` of the
    /// reference corresponds to bit `i + alignments[r].shift_at(i)` of revolution `r`; offsets
    /// that fall outside a revolution are not observed by it.
    ///
    /// With `follow_majority`, a shift change shared by most revolutions is taken as a slip of
    /// the reference and the tally moves to their frame from that point. A bit the reference
    /// gained is then skipped and a bit it lost is filled from the others, so the tally can be
    /// longer or shorter than `len`. Otherwise offsets are those of the reference.
    pub(crate) fn new(revs: &[&BitVec], alignments: &[Alignment], len: usize, follow_majority: bool) -> Self {
        let mut tally = BitTally {
            ones: Vec::with_capacity(len),
            observed: Vec::with_capacity(len),
            origin: Vec::with_capacity(len),
        };

        let slips = if follow_majority {
            reference_slips(alignments, len)
        }
        else {
            Vec::new()
        };
        let mut breaks: Vec<usize> = alignments
            .iter()
            .flat_map(|a| a.segments().iter().map(|(start, _)| *start))
            .chain(slips.iter().map(|(start, _)| *start))
            .filter(|start| *start < len)
            .chain(std::iter::once(0))
            .collect();
        breaks.sort_unstable();
        breaks.dedup();

        let mut next_v: Option<isize> = None;
        let mut last_offsets: Vec<isize> = Vec::new();
        let mut last_frame = 0;
        for (i, &start) in breaks.iter().enumerate() {
            let end = breaks.get(i + 1).copied().unwrap_or(len);
            let shifts: Vec<isize> = alignments.iter().map(|a| a.shift_at(start)).collect();
            let frame: isize = slips.iter().take_while(|(at, _)| *at <= start).map(|(_, d)| d).sum();
            let offsets: Vec<isize> = shifts.iter().map(|s| s - frame).collect();

            let first_v = start as isize + frame;
            let mut v = next_v.unwrap_or(first_v);
            // Fill bits the reference lost from the frame of the previous stretch.
            while v < first_v {
                let origin = (v - last_frame).clamp(0, len.saturating_sub(1) as isize) as usize;
                tally.push(revs, &last_offsets, v, origin);
                v += 1;
            }
            while v < end as isize + frame {
                tally.push(revs, &offsets, v, (v - frame) as usize);
                v += 1;
            }
            next_v = Some(v);
            last_offsets = offsets;
            last_frame = frame;
        }
        tally
    }

    fn push(&mut self, revs: &[&BitVec], offsets: &[isize], v: isize, origin: usize) {
        let mut ones = 0u16;
        let mut observed = 0u16;
        for (bits, offset) in revs.iter().zip(offsets.iter()) {
            let j = v + offset;
            if j < 0 {
                continue;
            }
            if let Some(bit) = bits.get(j as usize) {
                observed = observed.saturating_add(1);
                if bit {
                    ones = ones.saturating_add(1);
                }
            }
        }
        self.ones.push(ones);
        self.observed.push(observed);
        self.origin.push(origin);
    }

    /// The reference offset consensus offset `i` was taken from.
    pub(crate) fn origin(&self, i: usize) -> usize {
        self.origin[i]
    }

    pub(crate) fn len(&self) -> usize {
        self.ones.len()
    }

    pub(crate) fn observed(&self, i: usize) -> u16 {
        self.observed[i]
    }

    /// Bernoulli variance `p(1-p)` of the bit at offset `i`.
    pub(crate) fn variance(&self, i: usize) -> f64 {
        let n = self.observed[i];
        if n == 0 {
            return 0.0;
        }
        let p = self.ones[i] as f64 / n as f64;
        p * (1.0 - p)
    }

    /// Return true if every revolution that observed offset `i` agrees.
    pub(crate) fn is_unanimous(&self, i: usize) -> bool {
        self.ones[i] == 0 || self.ones[i] == self.observed[i]
    }

    /// Return the majority bit at offset `i`. Ties resolve to `reference_bit`.
    pub(crate) fn majority(&self, i: usize, reference_bit: bool) -> bool {
        let ones = self.ones[i] as u32 * 2;
        let n = self.observed[i] as u32;
        match ones.cmp(&n) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => reference_bit,
        }
    }

    /// Collapse contiguous weak offsets into regions. An offset is weak if it was observed by
    /// at least two revolutions and its variance is at or above `threshold`.
    pub(crate) fn weak_regions(&self, threshold: f64, rev_ct: usize) -> Vec<WeakBitRegion> {
        let mut regions = Vec::new();
        let mut run: Option<(usize, f64)> = None;

        for i in 0..=self.len() {
            let weak = i < self.len() && self.observed(i) >= 2 && self.variance(i) >= threshold;
            match (weak, run) {
                (true, None) => run = Some((i, self.variance(i))),
                (true, Some((start, peak))) => run = Some((start, peak.max(self.variance(i)))),
                (false, Some((start, peak))) => {
                    regions.push(WeakBitRegion {
                        start,
                        end: i,
                        variance: peak,
                        seed: Some(seed_hint(start, i, rev_ct)),
                    });
                    run = None;
                }
                (false, None) => {}
            }
        }
        regions
    }
}

/// Shift changes of different revolutions at most this many bits apart are the same slip.
const SLIP_WINDOW: usize = 128;

/// Find where the reference gained or lost bits. Each revolution reports a change of shift where
/// one of its segments starts; the reference slipped wherever more than half of all revolutions
/// report the same change within [SLIP_WINDOW] bits of each other. Returns the offset the last
/// of them starts at and the change, in offset order.
fn reference_slips(alignments: &[Alignment], len: usize) -> Vec<(usize, isize)> {
    let mut events: Vec<(usize, usize, isize)> = Vec::new();
    for (r, alignment) in alignments.iter().enumerate() {
        for pair in alignment.segments().windows(2) {
            let (start, shift) = pair[1];
            if start < len && shift != pair[0].1 {
                events.push((start, r, shift - pair[0].1));
            }
        }
    }
    events.sort_unstable();

    let mut used = vec![false; events.len()];
    let mut slips = Vec::new();
    for i in 0..events.len() {
        if used[i] {
            continue;
        }
        let (start, rev, change) = events[i];
        let mut members = vec![i];
        let mut revs = vec![rev];
        for (j, &(other_start, other_rev, other_change)) in events.iter().enumerate().skip(i + 1) {
            if other_start - start > SLIP_WINDOW {
                break;
            }
            if !used[j] && other_change == change && !revs.contains(&other_rev) {
                members.push(j);
                revs.push(other_rev);
            }
        }
        if members.len() * 2 > alignments.len() {
            let at = members.iter().map(|&m| events[m].0).max().unwrap_or(start);
            members.iter().for_each(|&m| used[m] = true);
            slips.push((at, change));
        }
    }
    slips.sort_unstable();
    slips
}

/// Derive a reproducible emulation seed from a region's position and the number of revolutions
/// it was observed in.
pub(crate) fn seed_hint(start: usize, end: usize, rev_ct: usize) -> u64 {
    // splitmix64 finalizer
    let mut z = (start as u64) ^ ((end as u64) << 24) ^ ((rev_ct as u64) << 56);
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> BitVec {
        s.chars().map(|c| c == '1').collect()
    }

    #[test]
    fn split_offsets_are_weak() {
        let a = bits("10110");
        let b = bits("10011");
        let tally = BitTally::new(&[&a, &b], &[Alignment::fixed(0), Alignment::fixed(0)], 5, false);
        assert!(tally.is_unanimous(0));
        assert_eq!(tally.variance(0), 0.0);
        assert_eq!(tally.variance(2), 0.25);
        // Ties go to the reference bit
        assert!(tally.majority(2, true));
        assert!(!tally.majority(2, false));

        let regions = tally.weak_regions(0.25, 2);
        assert_eq!(regions.len(), 2);
        assert_eq!((regions[0].start, regions[0].end), (2, 3));
        assert_eq!((regions[1].start, regions[1].end), (4, 5));
    }

    #[test]
    fn shifted_revolution() {
        let a = bits("0110");
        let b = bits("10110");
        let tally = BitTally::new(&[&a, &b], &[Alignment::fixed(0), Alignment::fixed(1)], 4, false);
        assert!((0..4).all(|i| tally.is_unanimous(i) && tally.observed(i) == 2));
    }

    #[test]
    fn reference_gained_bit_is_skipped() {
        let truth = bits("0100100010010001001");
        // The reference reads an extra 1 after bit 7
        let reference = bits("01001000110010001001");
        let alignments = [
            Alignment::fixed(0),
            Alignment::from_segments(vec![(0, 0), (9, -1)]),
            Alignment::from_segments(vec![(0, 0), (9, -1)]),
        ];
        let revs = [&reference, &truth, &truth];

        let tally = BitTally::new(&revs, &alignments, reference.len(), true);
        assert_eq!(tally.len(), truth.len());
        let consensus: BitVec = (0..tally.len())
            .map(|i| tally.majority(i, reference.get(tally.origin(i)).unwrap_or(false)))
            .collect();
        assert_eq!(consensus, truth);

        // In the reference frame the gained bit is kept
        let tally = BitTally::new(&revs, &alignments, reference.len(), false);
        assert_eq!(tally.len(), reference.len());
    }

    #[test]
    fn reference_lost_bit_is_filled() {
        let truth = bits("0100100010010001001");
        // The reference misses the 1 at bit 8
        let reference = bits("010010000010001001");
        let alignments = [
            Alignment::fixed(0),
            Alignment::from_segments(vec![(0, 0), (8, 1)]),
            Alignment::from_segments(vec![(0, 0), (8, 1)]),
        ];
        let tally = BitTally::new(&[&reference, &truth, &truth], &alignments, reference.len(), true);
        assert_eq!(tally.len(), truth.len());
        let consensus: BitVec = (0..tally.len()).map(|i| tally.majority(i, false)).collect();
        assert_eq!(consensus, truth);
        assert_eq!(tally.origin(8), 8);
    }

    #[test]
    fn lone_slip_keeps_reference_frame() {
        let truth = bits("0100100010010001001");
        let gained = bits("01001000110010001001");
        let alignments = [
            Alignment::fixed(0),
            Alignment::from_segments(vec![(0, 0), (9, 1)]),
            Alignment::fixed(0),
        ];
        let revs = [&truth, &gained, &truth];
        let tally = BitTally::new(&revs, &alignments, truth.len(), true);
        assert_eq!(tally.len(), truth.len());
        assert!((0..tally.len()).all(|i| tally.is_unanimous(i)));
    }

    #[test]
    fn slip_after_earlier_slips_is_followed() {
        // Both others slipped on their own before the reference lost a bit, so their shifts
        // differ from each other but change together.
        let alignments = [
            Alignment::fixed(0),
            Alignment::from_segments(vec![(0, 0), (100, 1), (400, 0)]),
            Alignment::from_segments(vec![(0, 0), (200, 2), (390, 1)]),
        ];
        assert_eq!(reference_slips(&alignments, 1000), vec![(400, -1)]);
        assert!(reference_slips(&alignments[..2], 1000).is_empty());
    }

    #[test]
    fn single_observation_is_never_weak() {
        let a = bits("1111");
        let b = bits("00");
        let tally = BitTally::new(&[&a, &b], &[Alignment::fixed(0), Alignment::fixed(0)], 4, false);
        let regions = tally.weak_regions(0.1, 2);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start, regions[0].end), (0, 2));
    }

    #[test]
    fn seeds_are_stable() {
        assert_eq!(seed_hint(10, 20, 3), seed_hint(10, 20, 3));
        assert_ne!(seed_hint(10, 20, 3), seed_hint(10, 20, 4));
    }
}
