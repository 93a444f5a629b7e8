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

mod common;

use crate::common::*;
use fluxrescue::prelude::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn decode(revolution: &FluxRevolution) -> BitstreamResult {
    let params = DecodeParams {
        cell_period: Some(BASE_PERIOD),
        encoding: Some(TrackDataEncoding::Mfm),
        ..DecodeParams::default()
    };
    revolution.decode(&params).unwrap()
}

/// Decode a clean revolution and one with a data bit flipped in the third sector.
fn clean_and_damaged(ch: DiskCh) -> (BitstreamResult, BitstreamResult) {
    let clean = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let damaged = clean.clone().modify_sector(2, |s| s.flip_data_bit(300));
    (
        decode(&clean.build_revolution(ch, BASE_PERIOD)),
        decode(&damaged.build_revolution(ch, BASE_PERIOD)),
    )
}

#[test]
fn test_unanimous_revolutions() {
    init();
    let ch = DiskCh::new(0, 0);
    let (clean, _) = clean_and_damaged(ch);
    let result = Aggregator::new(MergeStrategy::MajorityVote, 0.2)
        .aggregate(&[&clean, &clean, &clean], &[])
        .unwrap();
    assert!(result.identical);
    assert!(result.weak_regions.is_empty());
    assert_eq!(result.disagreements, 0);
    assert_eq!(result.consensus.digest(), clean.digest());
}

#[test]
fn test_even_split_is_weak() {
    init();
    let ch = DiskCh::new(1, 0);
    let (clean, damaged) = clean_and_damaged(ch);
    let result = Aggregator::new(MergeStrategy::MajorityVote, 0.2)
        .aggregate(&[&clean, &damaged], &[])
        .unwrap();

    assert!(!result.identical);
    assert_eq!(result.shifts, vec![0, 0]);
    assert!(!result.weak_regions.is_empty());
    for region in &result.weak_regions {
        assert_eq!(region.variance, 0.25);
    }
    assert_eq!(result.weak_bit_ct, result.disagreements);
    // Ties go to the reference revolution
    assert_eq!(result.consensus.digest(), clean.digest());
}

#[test]
fn test_majority_outvotes_damage() {
    init();
    let ch = DiskCh::new(2, 0);
    let (clean, damaged) = clean_and_damaged(ch);
    let result = Aggregator::new(MergeStrategy::MajorityVote, 0.2)
        .aggregate(&[&damaged, &clean, &clean], &[])
        .unwrap();

    assert_eq!(result.reference, 0);
    assert_eq!(
        compute_bits_hash(&result.consensus.bits),
        compute_bits_hash(&clean.bits)
    );
    let offsets = |b: &BitstreamResult| b.markers.iter().map(|m| (m.bit_offset, m.marker)).collect::<Vec<_>>();
    assert_eq!(offsets(&result.consensus), offsets(&clean));
    for region in &result.weak_regions {
        assert!((region.variance - 2.0 / 9.0).abs() < 1e-12);
    }

    // Raising the threshold above 2/9 hides the minority
    let result = Aggregator::new(MergeStrategy::MajorityVote, 0.25)
        .aggregate(&[&damaged, &clean, &clean], &[])
        .unwrap();
    assert!(result.weak_regions.is_empty());
}

#[test]
fn test_best_revolution_reference() {
    init();
    let ch = DiskCh::new(3, 0);
    let (clean, damaged) = clean_and_damaged(ch);
    let result = Aggregator::new(MergeStrategy::BestRevolution, 0.2)
        .aggregate(&[&damaged, &clean, &damaged], &[0.4, 0.9, 0.4])
        .unwrap();
    assert_eq!(result.reference, 1);
    assert_eq!(result.consensus.digest(), clean.digest());

    let result = Aggregator::new(MergeStrategy::First, 0.2)
        .aggregate(&[&damaged, &clean], &[0.4, 0.9])
        .unwrap();
    assert_eq!(result.reference, 0);
    assert_eq!(result.consensus.digest(), damaged.digest());
}

#[test]
fn test_weak_fill_is_reproducible() {
    init();
    let ch = DiskCh::new(4, 0);
    let (clean, damaged) = clean_and_damaged(ch);
    let result = Aggregator::new(MergeStrategy::MajorityVote, 0.2)
        .aggregate(&[&clean, &damaged, &damaged, &clean], &[])
        .unwrap();
    let region = result.weak_regions.first().unwrap();
    let fill = region.emulate();
    assert_eq!(fill.len(), region.len());
    assert_eq!(fill, region.emulate());
}

/// Rebuild a clean revolution with one flux transition moved by a whole cell in the gap before
/// the header of sector `before_sector`. The PLL reads an extra bit when `gain` is set and loses
/// one otherwise.
fn slipped(builder: &TrackBuilder, ch: DiskCh, before_sector: usize, gain: bool) -> FluxRevolution {
    let clean = decode(&builder.build_revolution(ch, BASE_PERIOD));
    let header = clean.markers_of(Marker::Idam).nth(before_sector).unwrap();
    // Inside gap 3 of the previous sector, ahead of the sync run
    let target = header.bit_offset - 400;

    let mut deltas = builder.build_flux(BASE_PERIOD);
    let (from, to) = if gain { (2.0, 3.0) } else { (3.0, 2.0) };
    let mut bit = 0;
    for delta in deltas.iter_mut() {
        let cells = (*delta / BASE_PERIOD).round();
        if bit >= target && cells == from {
            *delta = to * BASE_PERIOD;
            break;
        }
        bit += cells as usize;
    }
    let index_time = deltas.iter().sum();
    FluxRevolution::from_f64(ch, &deltas, index_time)
}

#[test]
fn test_bit_slips_stay_local() {
    init();
    let ch = DiskCh::new(12, 0);
    let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    // The reference gains a bit ahead of the fourth sector, the last revolution loses one ahead
    // of the seventh.
    let revs = vec![
        slipped(&builder, ch, 3, true),
        builder.build_revolution(ch, BASE_PERIOD),
        slipped(&builder, ch, 6, false),
    ];
    let decoded: Vec<BitstreamResult> = revs.iter().map(decode).collect();
    assert_eq!(decoded[0].len(), decoded[1].len() + 1);
    assert_eq!(decoded[2].len() + 1, decoded[1].len());

    let refs: Vec<&BitstreamResult> = decoded.iter().collect();
    let result = Aggregator::new(MergeStrategy::MajorityVote, 0.2)
        .aggregate(&refs, &[])
        .unwrap();
    assert_eq!(result.reference, 0);
    assert_eq!(result.alignments.len(), 3);
    assert!(result.alignments[1].segments().len() >= 2);
    assert!(result.alignments[2].segments().len() >= 3);
    assert!(result.weak_bit_ct < 64, "{} weak bits", result.weak_bit_ct);
    // The bit the reference gained is dropped from the consensus
    assert_eq!(result.consensus.digest(), decoded[1].digest());
    assert_eq!(result.consensus.markers_of(Marker::Dam).count(), 9);

    // A frame held to the reference keeps its extra bit
    let result = Aggregator::new(MergeStrategy::BestSector, 0.2)
        .aggregate(&refs, &[])
        .unwrap();
    assert_eq!(result.consensus.len(), decoded[0].len());
    assert!(result.weak_bit_ct < 64, "{} weak bits", result.weak_bit_ct);

    let config = QualityConfig::builder()
        .with_cell_period(Some(BASE_PERIOD))
        .with_merge_strategy(MergeStrategy::MajorityVote)
        .with_max_track_retries(0)
        .with_max_sector_retries(0)
        .build()
        .unwrap();
    let record = TrackController::new(&config)
        .run(ch, &mut CapturedTrack::new(revs))
        .unwrap();
    assert_eq!(record.found_ct(), 9);
    assert_eq!(record.valid_ct(), 9);
    assert!(!record.has_diagnosis(DiagnosisCode::DuplicateSector));
    assert_eq!(recovered_data_hash(&record), expected_data_hash(&builder));
}

#[test]
fn test_no_revolutions() {
    init();
    assert_eq!(
        Aggregator::new(MergeStrategy::MajorityVote, 0.2)
            .aggregate(&[], &[])
            .unwrap_err(),
        FluxRescueError::ParameterError
    );
}
