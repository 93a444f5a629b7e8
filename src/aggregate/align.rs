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

    src/aggregate/align.rs

    Alignment of revolution bitstreams by marker position
*/

//! Alignment of revolutions by the positions of their address markers.
//!
//! A single shift per revolution is found first. The PLL can gain or lose a bit anywhere in a
//! revolution, so the alignment is then re-anchored at every marker, giving each stretch between
//! markers its own shift.

use std::ops::Range;

use bit_vec::BitVec;

use crate::{flux::pll::MarkerEvent, RescueHashSet};

/// Markers within this many bits of their expected position still count as aligned.
const MARKER_SLOP: usize = 2;
/// The largest change of shift accepted between consecutive markers.
const MAX_SLIP: usize = 16;
/// Bits compared at a time when following slips between markers.
const RESYNC_BLOCK: usize = 64;

/// A piecewise alignment of one revolution to the reference. Each segment starts at a reference
/// bit offset and holds until the next segment begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Alignment {
    segments: Vec<(usize, isize)>,
}

impl Default for Alignment {
    fn default() -> Self {
        Alignment::fixed(0)
    }
}

impl Alignment {
    /// An alignment with one shift for the whole revolution.
    pub fn fixed(shift: isize) -> Self {
        Alignment {
            segments: vec![(0, shift)],
        }
    }

    #[cfg(test)]
    pub(crate) fn from_segments(segments: Vec<(usize, isize)>) -> Self {
        Alignment { segments }
    }

    /// The shift applied to reference bit `bit`.
    pub fn shift_at(&self, bit: usize) -> isize {
        let idx = self.segments.partition_point(|(start, _)| *start <= bit);
        self.segments[idx.saturating_sub(1)].1
    }

    /// The shift of the first segment.
    pub fn base_shift(&self) -> isize {
        self.segments[0].1
    }

    /// `(start, shift)` pairs in reference bit order.
    pub fn segments(&self) -> &[(usize, isize)] {
        &self.segments
    }

    /// The reference offset ranges of each segment, with their shifts, over `len` bits.
    pub(crate) fn ranges(&self, len: usize) -> impl Iterator<Item = (Range<usize>, isize)> + '_ {
        self.segments.iter().enumerate().map(move |(i, &(start, shift))| {
            let end = self.segments.get(i + 1).map_or(len, |next| next.0).min(len);
            (start.min(end)..end, shift)
        })
    }

    fn push(&mut self, start: usize, shift: isize) {
        match self.segments.last_mut() {
            Some(last) if last.0 >= start => {
                last.1 = shift;
            }
            _ => self.segments.push((start, shift)),
        }
    }
}

/// Align `other` to `reference`, re-anchoring at every reference marker that has a counterpart
/// within [MAX_SLIP] bits of the current shift. A new segment begins where the bits before the
/// marker stop agreeing under the new shift.
pub fn marker_alignment(
    reference: &[MarkerEvent],
    reference_bits: &BitVec,
    other: &[MarkerEvent],
    other_bits: &BitVec,
) -> Alignment {
    let mut alignment = Alignment::fixed(marker_shift(reference, other));
    let mut shift = alignment.base_shift();
    let mut floor = 0;

    for r in reference {
        let nearest = other
            .iter()
            .filter(|o| o.marker == r.marker)
            .map(|o| o.bit_offset as isize - r.bit_offset as isize)
            .min_by_key(|s| (s - shift).unsigned_abs());
        let Some(new_shift) = nearest.filter(|s| (s - shift).unsigned_abs() <= MAX_SLIP)
        else {
            continue;
        };

        if new_shift != shift {
            let mut start = r.bit_offset;
            while start > floor {
                let j = start as isize - 1 + new_shift;
                let agree = j >= 0 && reference_bits.get(start - 1).is_some_and(|a| other_bits.get(j as usize) == Some(a));
                if !agree {
                    break;
                }
                start -= 1;
            }
            log::trace!(
                "marker_alignment(): shift {} -> {} from bit {} ({} marker at {})",
                shift,
                new_shift,
                start,
                r.marker,
                r.bit_offset
            );
            alignment.push(start, new_shift);
            shift = new_shift;
        }
        floor = r.bit_offset;
    }
    resync(&alignment, reference_bits, other_bits)
}

/// Count the bits of `range` that differ between the reference and `other` under `shift`.
fn mismatches(reference: &BitVec, other: &BitVec, range: Range<usize>, shift: isize) -> usize {
    range
        .filter(|&i| {
            let j = i as isize + shift;
            j < 0 || reference.get(i) != other.get(j as usize)
        })
        .count()
}

/// Follow slips between markers. Each block of [RESYNC_BLOCK] bits that mostly disagrees under
/// the current shift is retried at nearby shifts, and a shift that makes it agree starts a new
/// segment. Weak bits disagree under every shift and are left alone.
fn resync(anchored: &Alignment, reference: &BitVec, other: &BitVec) -> Alignment {
    let mut out = Alignment::fixed(anchored.base_shift());
    for (range, anchored_shift) in anchored.ranges(reference.len()) {
        out.push(range.start, anchored_shift);
        let mut shift = anchored_shift;
        let mut block = range.start;
        while block < range.end {
            let end = (block + RESYNC_BLOCK).min(range.end);
            let n = end - block;
            if mismatches(reference, other, block..end, shift) * 4 > n {
                let best = [-1isize, 1, -2, 2]
                    .iter()
                    .map(|d| (mismatches(reference, other, block..end, shift + d), shift + d))
                    .min_by_key(|(m, _)| *m);
                if let Some((_, resynced)) = best.filter(|(m, _)| m * 16 <= n) {
                    log::trace!("resync(): shift {} -> {} at bit {}", shift, resynced, block);
                    out.push(block, resynced);
                    shift = resynced;
                }
            }
            block = end;
        }
    }
    out
}

/// Find the shift that best aligns `other` to `reference`: bit `i` of the reference corresponds
/// to bit `i + shift` of `other`. Each candidate shift is the distance between a pair of markers
/// of the same kind, and is scored by the number of reference markers it lines up. Ties go to
/// the closest fit, then to the smallest shift. Returns 0 if no markers can be matched.
pub fn marker_shift(reference: &[MarkerEvent], other: &[MarkerEvent]) -> isize {
    if reference.is_empty() || other.is_empty() {
        return 0;
    }

    let mut candidates: RescueHashSet<isize> = RescueHashSet::new();
    for r in reference {
        for o in other.iter().filter(|o| o.marker == r.marker) {
            candidates.insert(o.bit_offset as isize - r.bit_offset as isize);
        }
    }

    // Rank by aligned marker count, then by total residual distance, then by shift magnitude.
    let mut best: Option<(usize, usize, isize)> = None;
    for shift in candidates {
        let mut score = 0;
        let mut residual = 0;
        for r in reference {
            let expected = r.bit_offset as isize + shift;
            let nearest = other
                .iter()
                .filter(|o| o.marker == r.marker)
                .map(|o| (o.bit_offset as isize - expected).unsigned_abs())
                .min();
            if let Some(distance) = nearest.filter(|d| *d <= MARKER_SLOP) {
                score += 1;
                residual += distance;
            }
        }

        let better = match best {
            None => true,
            Some((best_score, best_residual, best_shift)) => {
                (score, std::cmp::Reverse(residual), std::cmp::Reverse(shift.unsigned_abs()), std::cmp::Reverse(shift))
                    > (
                        best_score,
                        std::cmp::Reverse(best_residual),
                        std::cmp::Reverse(best_shift.unsigned_abs()),
                        std::cmp::Reverse(best_shift),
                    )
            }
        };
        if better {
            best = Some((score, residual, shift));
        }
    }

    let (best_score, _, best_shift) = match best {
        Some(best) if best.0 > 0 => best,
        _ => return 0,
    };

    log::trace!(
        "marker_shift(): best shift {} aligns {}/{} markers",
        best_shift,
        best_score,
        reference.len()
    );
    best_shift
}
