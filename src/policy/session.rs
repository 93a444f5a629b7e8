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

    src/policy/session.rs

    Multi-track decode sessions
*/

//! A [DecodeSession] decodes many tracks with a shared configuration, on a pool of worker
//! threads, and keeps running statistics for status display.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Mutex,
};

use crossbeam_channel::{Receiver, Sender};

use crate::{
    config::QualityConfig,
    policy::{controller::TrackController, source::RevolutionSource, TrackState},
    sector::{SectorData, TrackSummary},
    timing::TimingClassifier,
    track_record::TrackRecord,
    types::DiskCh,
    FluxRescueError,
};

/// Counters updated as tracks complete.
#[derive(Debug, Default)]
pub struct SessionStats {
    tracks: AtomicU64,
    abandoned: AtomicU64,
    sectors: AtomicU64,
    valid_sectors: AtomicU64,
    crc_errors: AtomicU64,
    weak_bits: AtomicU64,
}

/// A copy of [SessionStats] at a point in time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionStatsSnapshot {
    pub tracks: u64,
    pub abandoned: u64,
    pub sectors: u64,
    pub valid_sectors: u64,
    /// Sectors with a header or data CRC error.
    pub crc_errors: u64,
    pub weak_bits: u64,
}

impl SessionStats {
    fn record(&self, record: &TrackRecord) {
        let crc_errors = record
            .sectors
            .iter()
            .filter(|s| !s.id_crc_valid() || matches!(s.data, SectorData::CrcFailed { .. }))
            .count();
        let weak_bits: usize = record.weak_regions.iter().map(|r| r.len()).sum();

        self.tracks.fetch_add(1, Ordering::Relaxed);
        if record.state == TrackState::Abandoned {
            self.abandoned.fetch_add(1, Ordering::Relaxed);
        }
        self.sectors.fetch_add(record.found_ct() as u64, Ordering::Relaxed);
        self.valid_sectors.fetch_add(record.valid_ct() as u64, Ordering::Relaxed);
        self.crc_errors.fetch_add(crc_errors as u64, Ordering::Relaxed);
        self.weak_bits.fetch_add(weak_bits as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStatsSnapshot {
        SessionStatsSnapshot {
            tracks: self.tracks.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            sectors: self.sectors.load(Ordering::Relaxed),
            valid_sectors: self.valid_sectors.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            weak_bits: self.weak_bits.load(Ordering::Relaxed),
        }
    }
}

type Job<S> = (usize, DiskCh, S);
type JobResult = (usize, Result<TrackRecord, FluxRescueError>);

pub struct DecodeSession {
    config: QualityConfig,
    classifier: TimingClassifier,
    cancel: AtomicBool,
    stats: SessionStats,
    last_summary: Mutex<Option<TrackSummary>>,
}

impl DecodeSession {
    pub fn new(config: QualityConfig) -> Self {
        let classifier = TimingClassifier::new(config.timing().clone());
        DecodeSession {
            config,
            classifier,
            cancel: AtomicBool::new(false),
            stats: SessionStats::default(),
            last_summary: Mutex::new(None),
        }
    }

    /// Use a timing classifier with additional protection signatures.
    pub fn with_classifier(mut self, classifier: TimingClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Request that all running and queued track decodes stop. Tracks in progress finish with
    /// what they have; queued tracks return immediately.
    pub fn cancel(&self) {
        log::debug!("DecodeSession::cancel(): Cancel requested");
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Clear a previous cancellation request.
    pub fn reset_cancel(&self) {
        self.cancel.store(false, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SessionStatsSnapshot {
        self.stats.snapshot()
    }

    /// The summary of the most recently completed track.
    pub fn last_summary(&self) -> Option<TrackSummary> {
        match self.last_summary.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Decode a single track. Revolutions may be decoded on up to `worker_count` threads.
    pub fn decode_track<S: RevolutionSource + ?Sized>(
        &self,
        ch: DiskCh,
        source: &mut S,
    ) -> Result<TrackRecord, FluxRescueError> {
        self.decode_track_with(ch, source, self.config.worker_count())
    }

    /// The number of revolution decode threads each of `track_workers` track workers may use,
    /// so that all of them together stay within `worker_count`.
    pub(crate) fn revolution_budget(&self, track_workers: usize) -> usize {
        (self.config.worker_count() / track_workers.max(1)).max(1)
    }

    fn decode_track_with<S: RevolutionSource + ?Sized>(
        &self,
        ch: DiskCh,
        source: &mut S,
        revolution_workers: usize,
    ) -> Result<TrackRecord, FluxRescueError> {
        let controller = TrackController::new(&self.config)
            .with_classifier(self.classifier.clone())
            .with_cancel(&self.cancel)
            .with_revolution_workers(revolution_workers);

        match controller.run(ch, source) {
            Ok(record) => {
                self.stats.record(&record);
                let summary = record.summary();
                log::debug!("DecodeSession::decode_track(): {}", summary);
                match self.last_summary.lock() {
                    Ok(mut guard) => *guard = Some(summary),
                    Err(poisoned) => *poisoned.into_inner() = Some(summary),
                }
                Ok(record)
            }
            Err(e) => {
                log::warn!("DecodeSession::decode_track(): Track {} failed: {}", ch, e);
                Err(e)
            }
        }
    }

    /// Decode many tracks on up to `worker_count` threads. Results are returned in the order of
    /// `tracks`. A track whose worker panicked returns [FluxRescueError::WorkerPanic].
    pub fn decode_tracks<S: RevolutionSource + Send>(
        &self,
        tracks: Vec<(DiskCh, S)>,
    ) -> Vec<Result<TrackRecord, FluxRescueError>> {
        let job_ct = tracks.len();
        let workers = self.config.worker_count().min(job_ct).max(1);
        let revolution_workers = self.revolution_budget(workers);
        log::debug!(
            "DecodeSession::decode_tracks(): Decoding {} tracks on {} workers, {} revolution threads each",
            job_ct,
            workers,
            revolution_workers
        );

        let (job_tx, job_rx): (Sender<Job<S>>, Receiver<Job<S>>) = crossbeam_channel::unbounded();
        let (result_tx, result_rx): (Sender<JobResult>, Receiver<JobResult>) = crossbeam_channel::unbounded();

        for (i, (ch, source)) in tracks.into_iter().enumerate() {
            if job_tx.send((i, ch, source)).is_err() {
                break;
            }
        }
        drop(job_tx);

        let mut results: Vec<Option<Result<TrackRecord, FluxRescueError>>> = (0..job_ct).map(|_| None).collect();

        std::thread::scope(|s| {
            let mut joins = Vec::with_capacity(workers);
            for worker in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                joins.push(s.spawn(move || {
                    for (i, ch, mut source) in job_rx.iter() {
                        let result = self.decode_track_with(ch, &mut source, revolution_workers);
                        if result_tx.send((i, result)).is_err() {
                            break;
                        }
                    }
                    log::trace!("DecodeSession::decode_tracks(): Worker {} finished", worker);
                }));
            }
            drop(result_tx);

            for (i, result) in result_rx.iter() {
                results[i] = Some(result);
            }
            for join in joins {
                if join.join().is_err() {
                    log::error!("DecodeSession::decode_tracks(): A worker thread panicked");
                }
            }
        });

        results
            .into_iter()
            .map(|result| result.unwrap_or(Err(FluxRescueError::WorkerPanic)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        policy::CapturedTrack,
        track_builder::TrackBuilder,
        types::{TrackDataEncoding, TrackFlags},
    };

    fn track(ch: DiskCh, sectors: u8) -> (DiskCh, CapturedTrack) {
        let builder = TrackBuilder::standard(ch, sectors, 2, TrackDataEncoding::Mfm);
        let revs = (0..3).map(|_| builder.build_revolution(ch, 2e-6)).collect();
        (ch, CapturedTrack::new(revs))
    }

    #[test]
    fn tracks_come_back_in_order() {
        let config = QualityConfig::builder().with_worker_count(3).build().unwrap();
        let session = DecodeSession::new(config);
        let tracks: Vec<_> = (0..6).map(|c| track(DiskCh::new(c, 0), 4 + c as u8)).collect();

        let results = session.decode_tracks(tracks);
        assert_eq!(results.len(), 6);
        for (c, result) in results.iter().enumerate() {
            let record = result.as_ref().unwrap();
            assert_eq!(record.ch, DiskCh::new(c as u16, 0));
            assert_eq!(record.valid_ct(), 4 + c);
        }

        let stats = session.stats();
        assert_eq!(stats.tracks, 6);
        assert_eq!(stats.sectors, (4..10).sum::<u64>());
        assert_eq!(stats.valid_sectors, stats.sectors);
        assert_eq!(stats.crc_errors, 0);
        assert!(session.last_summary().is_some());
    }

    #[test]
    fn failed_track_does_not_stop_others() {
        let config = QualityConfig::builder().with_worker_count(2).build().unwrap();
        let session = DecodeSession::new(config);
        let tracks = vec![
            track(DiskCh::new(0, 0), 9),
            (DiskCh::new(1, 0), CapturedTrack::default()),
            track(DiskCh::new(2, 0), 9),
        ];
        let results = session.decode_tracks(tracks);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(FluxRescueError::NoRevolutions(DiskCh::new(1, 0))));
        assert!(results[2].is_ok());
        assert_eq!(session.stats().tracks, 2);
    }

    #[test]
    fn cancelled_session() {
        let session = DecodeSession::new(QualityConfig::default());
        session.cancel();
        let (ch, mut source) = track(DiskCh::new(0, 0), 9);
        let record = session.decode_track(ch, &mut source).unwrap();
        assert!(record.flags.contains(TrackFlags::CANCELLED));
        assert_eq!(record.found_ct(), 0);

        session.reset_cancel();
        let record = session.decode_track(ch, &mut source).unwrap();
        assert_eq!(record.valid_ct(), 9);
    }

    #[test]
    fn thread_budget_is_shared() {
        let config = QualityConfig::builder().with_worker_count(8).build().unwrap();
        let session = DecodeSession::new(config);
        assert_eq!(session.revolution_budget(1), 8);
        assert_eq!(session.revolution_budget(3), 2);
        assert_eq!(session.revolution_budget(8), 1);
        for track_workers in 1..=8 {
            assert!(track_workers * session.revolution_budget(track_workers) <= 8);
        }

        let config = QualityConfig::builder().with_worker_count(4).build().unwrap();
        let controller = TrackController::new(&config);
        assert_eq!(controller.revolution_workers(), 4);
        assert_eq!(controller.with_revolution_workers(0).revolution_workers(), 1);
    }

    #[test]
    fn empty_job_list() {
        let session = DecodeSession::new(QualityConfig::default());
        assert!(session.decode_tracks(Vec::<(DiskCh, CapturedTrack)>::new()).is_empty());
    }
}
