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

/// Reads three revolutions with a damaged sector, then clean revolutions, and records the
/// size of each request.
struct FlakyDrive {
    damaged: FluxRevolution,
    clean: FluxRevolution,
    served: usize,
    requests: Vec<usize>,
}

impl RevolutionSource for FlakyDrive {
    fn next_revolutions(&mut self, _ch: DiskCh, count: usize) -> Result<Vec<FluxRevolution>, FluxRescueError> {
        self.requests.push(count);
        let mut revs = Vec::with_capacity(count);
        for _ in 0..count {
            let rev = if self.served < 3 { &self.damaged } else { &self.clean };
            revs.push(rev.clone());
            self.served += 1;
        }
        Ok(revs)
    }
}

struct DeadDrive;

impl RevolutionSource for DeadDrive {
    fn next_revolutions(&mut self, ch: DiskCh, _count: usize) -> Result<Vec<FluxRevolution>, FluxRescueError> {
        Err(FluxRescueError::CaptureError(format!("drive not ready at {}", ch)))
    }
}

#[test]
fn test_session_jittered_tracks() {
    init();
    let config = QualityConfig::builder()
        .with_cell_period(Some(BASE_PERIOD))
        .with_expected_sectors(Some(9))
        .with_worker_count(4)
        .build()
        .unwrap();
    let session = DecodeSession::new(config);

    let mut builders = Vec::new();
    let mut jobs = Vec::new();
    for c in 0..4u16 {
        for h in 0..2u8 {
            let ch = DiskCh::new(c, h);
            let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
            let revs: Vec<FluxRevolution> = (0..3)
                .map(|r| {
                    let seed = (c as u64) << 16 | (h as u64) << 8 | r;
                    jittered(&builder.build_revolution(ch, BASE_PERIOD), 0.03, seed)
                })
                .collect();
            builders.push(builder);
            jobs.push((ch, CapturedTrack::new(revs)));
        }
    }

    let results = session.decode_tracks(jobs);
    assert_eq!(results.len(), 8);
    for (result, builder) in results.iter().zip(builders.iter()) {
        let record = result.as_ref().unwrap();
        assert_eq!(record.state, TrackState::Done);
        assert!(record.is_complete(), "track {} incomplete", record.ch);
        assert_eq!(recovered_data_hash(record), expected_data_hash(builder));
    }

    let stats = session.stats();
    assert_eq!(stats.tracks, 8);
    assert_eq!(stats.valid_sectors, 72);
    assert_eq!(stats.abandoned, 0);
}

#[test]
fn test_session_empty_revolution() {
    init();
    let session = DecodeSession::new(QualityConfig::default());
    let ch = DiskCh::new(79, 1);
    let mut source = CapturedTrack::new(vec![FluxRevolution::from_f64(ch, &[], 0.2)]);

    let record = session.decode_track(ch, &mut source).unwrap();
    assert_eq!(record.found_ct(), 0);
    assert_eq!(record.state, TrackState::Done);
    assert!(record.has_diagnosis(DiagnosisCode::InvalidFlux));
    assert_eq!(session.last_summary().unwrap().sector_ct, 0);
}

#[test]
fn test_forensic_preserves_capture() {
    init();
    let ch = DiskCh::new(5, 0);
    let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let config = QualityConfig::from_preset(QualityPreset::Forensic);
    let session = DecodeSession::new(config);

    let mut source = CapturedTrack::new(revolutions(&builder, ch, 4));
    let record = session.decode_track(ch, &mut source).unwrap();
    assert!(record.is_complete());
    assert_eq!(record.raw_revolutions.len(), record.revolutions_used);
    let consensus = record.consensus.as_ref().unwrap();
    assert_eq!(consensus.markers_of(Marker::Idam).count(), 9);
    assert!(record.sectors.iter().all(|s| s.copies.len() == record.revolutions_used));
}

#[test]
fn test_adaptive_capture() {
    init();
    let ch = DiskCh::new(17, 0);
    let clean = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let damaged = clean.clone().modify_sector(5, |s| s.flip_data_bit(777));
    let mut drive = FlakyDrive {
        damaged: damaged.build_revolution(ch, BASE_PERIOD),
        clean: clean.build_revolution(ch, BASE_PERIOD),
        served: 0,
        requests: Vec::new(),
    };

    let config = QualityConfig::builder()
        .with_merge_strategy(MergeStrategy::BestSector)
        .with_expected_sectors(Some(9))
        .build()
        .unwrap();
    let record = TrackController::new(&config).run(ch, &mut drive).unwrap();

    assert_eq!(drive.requests, vec![3, 1]);
    assert_eq!(record.revolutions_used, 4);
    assert_eq!(record.sector_retries, 1);
    assert_eq!(record.track_retries, 0);
    assert!(record.is_complete());
    assert_eq!(record.sector_by_s(6).unwrap().best_revolution, Some(3));
    assert_eq!(recovered_data_hash(&record), expected_data_hash(&clean));
}

#[test]
fn test_capture_error() {
    init();
    let ch = DiskCh::new(2, 0);
    let session = DecodeSession::new(QualityConfig::default());
    let err = session.decode_track(ch, &mut DeadDrive).unwrap_err();
    assert!(matches!(err, FluxRescueError::CaptureError(_)));
    assert_eq!(session.stats().tracks, 0);
}

#[test]
fn test_cancel_stops_queued_tracks() {
    init();
    let session = DecodeSession::new(QualityConfig::builder().with_worker_count(2).build().unwrap());
    session.cancel();
    let jobs: Vec<_> = (0..3)
        .map(|c| {
            let ch = DiskCh::new(c, 0);
            let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
            (ch, CapturedTrack::new(revolutions(&builder, ch, 3)))
        })
        .collect();

    for result in session.decode_tracks(jobs) {
        let record = result.unwrap();
        assert!(record.flags.contains(TrackFlags::CANCELLED));
        assert_eq!(record.found_ct(), 0);
    }
}
