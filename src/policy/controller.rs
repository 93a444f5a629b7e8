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

    src/policy/controller.rs

    Per-track decode state machine and retry policy
*/

//! The [TrackController] runs the decode state machine for a single track.

use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use crate::{
    aggregate::{AggregateResult, Aggregator},
    config::QualityConfig,
    diagnosis::{Diagnosis, DiagnosisCode},
    flux::{
        flux_revolution::{DecodeParams, FluxRevolution, DEFAULT_BASE_PERIOD},
        pll::{BitstreamResult, PllPreset},
    },
    policy::{source::RevolutionSource, TrackState},
    sector::{extract_sectors, select_best_sectors, ExtractOptions, SectorData, SectorRecord},
    timing::{TimingAnalysis, TimingClassifier},
    track_record::TrackRecord,
    types::{DiskCh, DiskChsn, ErrorMode, RetryTriggers, TrackFlags},
    FluxRescueError,
    RescueHashMap,
};

/// Deviation of the PLL's final clock from nominal, as a fraction, above which drift is diagnosed.
const DRIFT_THRESHOLD: f64 = 0.05;

/// Working state of a single track decode.
struct TrackRun {
    ch: DiskCh,
    state: TrackState,
    /// The number of revolutions the next capture should bring the total to.
    wanted: usize,
    revolutions: Vec<FluxRevolution>,
    /// Revolutions decoded with the current PLL preset, in capture order.
    decoded: Vec<BitstreamResult>,
    params: DecodeParams,
    preset_attempt: usize,
    track_retries: u32,
    sector_retries: u32,
    source_exhausted: bool,
    capture_diagnoses: Vec<Diagnosis>,
    no_index: bool,
    cancelled: bool,
    best: Option<TrackRecord>,
}

impl TrackRun {
    fn new(ch: DiskCh, config: &QualityConfig) -> Self {
        TrackRun {
            ch,
            state: TrackState::Idle,
            wanted: config.min_revolutions(),
            revolutions: Vec::new(),
            decoded: Vec::new(),
            params: DecodeParams {
                cell_period: config.cell_period(),
                encoding: config.encoding(),
                pll: config.pll().clone(),
            },
            preset_attempt: 0,
            track_retries: 0,
            sector_retries: 0,
            source_exhausted: false,
            capture_diagnoses: Vec::new(),
            no_index: false,
            cancelled: false,
            best: None,
        }
    }

    fn preset(&self) -> PllPreset {
        PllPreset::for_attempt(self.preset_attempt)
    }

    /// Discard the decoded revolutions so they are decoded again with the next PLL preset.
    fn next_preset(&mut self) {
        self.preset_attempt += 1;
        self.decoded.clear();
        log::debug!(
            "TrackRun::next_preset(): Re-decoding {} revolutions of track {} with PLL preset {}",
            self.revolutions.len(),
            self.ch,
            self.preset()
        );
    }
}

/// Runs the decode pipeline for one track at a time.
///
/// A controller borrows its configuration and, optionally, a cancellation flag shared with
/// other controllers. It holds no per-track state between calls to [TrackController::run].
pub struct TrackController<'a> {
    config: &'a QualityConfig,
    classifier: TimingClassifier,
    cancel: Option<&'a AtomicBool>,
    revolution_workers: usize,
}

impl<'a> TrackController<'a> {
    pub fn new(config: &'a QualityConfig) -> Self {
        TrackController {
            config,
            classifier: TimingClassifier::new(config.timing().clone()),
            cancel: None,
            revolution_workers: config.worker_count().max(1),
        }
    }

    /// Limit the number of threads used to decode revolutions. Defaults to the configured
    /// worker count; 1 decodes on the calling thread.
    pub fn with_revolution_workers(mut self, workers: usize) -> Self {
        self.revolution_workers = workers.max(1);
        self
    }

    pub fn revolution_workers(&self) -> usize {
        self.revolution_workers
    }

    /// Stop decoding when `cancel` is set. The flag is checked between revolutions and before
    /// each evaluation.
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Use a timing classifier with additional protection signatures.
    pub fn with_classifier(mut self, classifier: TimingClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn config(&self) -> &QualityConfig {
        self.config
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Decode track `ch` from the revolutions supplied by `source`.
    ///
    /// Quality problems are reported as diagnoses in the returned [TrackRecord], which is in
    /// the `Done` or `Abandoned` state. An error is returned only if the source fails, supplies
    /// no revolutions at all, or a decode buffer can't be allocated.
    pub fn run<S: RevolutionSource + ?Sized>(&self, ch: DiskCh, source: &mut S) -> Result<TrackRecord, FluxRescueError> {
        let start = Instant::now();
        let mut run = TrackRun::new(ch, self.config);

        while !run.state.is_final() {
            let next = match run.state {
                TrackState::Idle => TrackState::Capturing,
                TrackState::Capturing => self.capture(&mut run, source)?,
                TrackState::Decoding => self.decode(&mut run)?,
                TrackState::Evaluating => self.evaluate(&mut run)?,
                TrackState::Retrying => self.retry(&mut run),
                TrackState::Done | TrackState::Abandoned => run.state,
            };
            log::trace!("TrackController::run(): {} {} -> {}", ch, run.state, next);
            run.state = next;
        }

        let record = self.finish(run);
        log::debug!(
            "TrackController::run(): Track {} {} in {}: {} sectors, {} valid, {} revolutions, {}+{} retries",
            ch,
            record.state,
            format_ms!(start.elapsed().as_secs_f64()),
            record.found_ct(),
            record.valid_ct(),
            record.revolutions_used,
            record.track_retries,
            record.sector_retries
        );
        Ok(record)
    }

    fn capture<S: RevolutionSource + ?Sized>(
        &self,
        run: &mut TrackRun,
        source: &mut S,
    ) -> Result<TrackState, FluxRescueError> {
        if self.is_cancelled() {
            run.cancelled = true;
            return Ok(TrackState::Done);
        }

        let count = run.wanted.saturating_sub(run.revolutions.len());
        let revolutions = source.next_revolutions(run.ch, count)?;
        if revolutions.len() < count {
            log::debug!(
                "TrackController::capture(): Source exhausted for track {} ({} of {} revolutions)",
                run.ch,
                revolutions.len(),
                count
            );
            run.source_exhausted = true;
        }

        if revolutions.is_empty() {
            if run.revolutions.is_empty() {
                log::error!("TrackController::capture(): No revolutions for track {}", run.ch);
                return Err(FluxRescueError::NoRevolutions(run.ch));
            }
            // Nothing new to look at; try the revolutions we have with other PLL parameters.
            run.next_preset();
            return Ok(TrackState::Decoding);
        }

        for revolution in revolutions {
            let idx = run.revolutions.len();
            let check = revolution.validate();
            if check.empty {
                run.capture_diagnoses.push(Diagnosis::new(
                    DiagnosisCode::InvalidFlux,
                    run.ch,
                    format!("revolution {} is empty", idx),
                ));
            }
            if check.rejected > 0 {
                run.capture_diagnoses.push(Diagnosis::new(
                    DiagnosisCode::InvalidFlux,
                    run.ch,
                    format!("revolution {} has {} invalid flux deltas", idx, check.rejected),
                ));
            }
            if check.dropped_ticks > 0 {
                run.capture_diagnoses.push(Diagnosis::new(
                    DiagnosisCode::InvalidFlux,
                    run.ch,
                    format!("revolution {} had {} zero-length ticks", idx, check.dropped_ticks),
                ));
            }
            if check.index_missing {
                run.no_index = true;
                run.capture_diagnoses.push(Diagnosis::new(
                    DiagnosisCode::IndexMissing,
                    run.ch,
                    format!("revolution {} has no index time", idx),
                ));
            }
            run.revolutions.push(revolution);
        }
        Ok(TrackState::Decoding)
    }

    fn decode(&self, run: &mut TrackRun) -> Result<TrackState, FluxRescueError> {
        let mut params = DecodeParams {
            pll: run.preset().apply(self.config.pll()),
            ..run.params.clone()
        };

        // Decode one revolution at a time until the encoding and bit cell period are known, so
        // that every revolution of the track is decoded the same way.
        while run.decoded.len() < run.revolutions.len() && (params.encoding.is_none() || params.cell_period.is_none()) {
            if self.is_cancelled() {
                run.cancelled = true;
                return Ok(TrackState::Done);
            }
            let bitstream = run.revolutions[run.decoded.len()].decode(&params)?;
            if !bitstream.markers.is_empty() {
                let base_period = bitstream.cell_period / bitstream.encoding.cell_multiplier();
                log::debug!(
                    "TrackController::decode(): Track {} is {} with bit cell {}",
                    run.ch,
                    bitstream.encoding,
                    format_us!(base_period)
                );
                params.encoding = Some(bitstream.encoding);
                params.cell_period = Some(base_period);
                run.params.encoding = params.encoding;
                run.params.cell_period = params.cell_period;
            }
            run.decoded.push(bitstream);
        }

        let pending = &run.revolutions[run.decoded.len()..];
        match self.decode_revolutions(pending, &params)? {
            Some(bitstreams) => {
                run.decoded.extend(bitstreams);
                Ok(TrackState::Evaluating)
            }
            None => {
                run.cancelled = true;
                Ok(TrackState::Done)
            }
        }
    }

    /// Decode `revolutions`, up to `revolution_workers` at a time. Returns `None` if cancelled.
    fn decode_revolutions(
        &self,
        revolutions: &[FluxRevolution],
        params: &DecodeParams,
    ) -> Result<Option<Vec<BitstreamResult>>, FluxRescueError> {
        let workers = self.revolution_workers;
        let mut bitstreams = Vec::with_capacity(revolutions.len());

        if revolutions.len() < 2 || workers == 1 {
            for revolution in revolutions {
                if self.is_cancelled() {
                    return Ok(None);
                }
                bitstreams.push(revolution.decode(params)?);
            }
            return Ok(Some(bitstreams));
        }

        for chunk in revolutions.chunks(workers) {
            if self.is_cancelled() {
                return Ok(None);
            }
            let results: Vec<Result<BitstreamResult, FluxRescueError>> = std::thread::scope(|s| {
                let joins: Vec<_> = chunk
                    .iter()
                    .map(|revolution| s.spawn(move || revolution.decode(params)))
                    .collect();
                joins
                    .into_iter()
                    .map(|join| join.join().unwrap_or(Err(FluxRescueError::WorkerPanic)))
                    .collect()
            });
            for result in results {
                bitstreams.push(result?);
            }
        }
        Ok(Some(bitstreams))
    }

    fn evaluate(&self, run: &mut TrackRun) -> Result<TrackState, FluxRescueError> {
        if self.is_cancelled() {
            run.cancelled = true;
            return Ok(TrackState::Done);
        }

        let config = self.config;
        let options = ExtractOptions {
            ch: run.ch,
            weights: config.score_weights().clone(),
            crc_correction_bits: config.effective_crc_correction(),
            expected_sectors: config.expected_sectors(),
        };

        let per_revolution: Vec<Vec<SectorRecord>> = run
            .decoded
            .iter()
            .map(|bitstream| extract_sectors(bitstream, None, &[], &options).sectors)
            .collect();
        let scores: Vec<f64> = per_revolution.iter().map(|sectors| mean_confidence(sectors)).collect();
        log::debug!("TrackController::evaluate(): Revolution scores: {:.3?}", scores);

        let bitstreams: Vec<&BitstreamResult> = run.decoded.iter().collect();
        let aggregate = Aggregator::new(config.merge_strategy(), config.weak_bit_threshold()).aggregate(&bitstreams, &scores)?;
        let consensus = &aggregate.consensus;
        let timing = self.classifier.analyze(&consensus.latency, consensus.cell_period);
        let extracted = extract_sectors(consensus, Some(&timing), &aggregate.weak_regions, &options);

        let mut record = TrackRecord::new(run.ch, consensus.encoding, consensus.cell_period);
        record.expected_sectors = config.expected_sectors();
        record.sectors = select_best_sectors(
            extracted.sectors,
            &per_revolution,
            config.merge_strategy(),
            config.keeps_copies(),
        );
        if let Some(previous) = run.best.take() {
            record.sectors = merge_sectors(previous.sectors, record.sectors);
        }

        self.diagnose(&mut record, run, &aggregate, &timing);

        if !aggregate.weak_regions.is_empty() {
            record.flags |= TrackFlags::WEAK_BITS;
        }
        if timing.protection().is_some() {
            record.flags |= TrackFlags::PROTECTED;
        }
        if !timing.regions.is_empty() {
            record.flags |= TrackFlags::NONSTANDARD_TIMING;
        }
        if !record.is_complete() {
            record.flags |= TrackFlags::INCOMPLETE;
        }
        if record.sectors.iter().any(|s| s.corrected_bits > 0) {
            record.flags |= TrackFlags::CRC_CORRECTED;
        }
        if run.no_index {
            record.flags |= TrackFlags::NO_INDEX;
        }

        record.weak_regions = aggregate.weak_regions.clone();
        record.timing_regions = timing.regions.clone();
        record.protection = timing.findings.clone();
        record.revolutions_used = run.decoded.len();
        record.pll_preset = run.preset();
        if config.preserves_bitstream() {
            record.raw_revolutions = run.revolutions.clone();
            record.consensus = Some(aggregate.consensus);
        }

        let next = self.decide(run, &record);
        record.track_retries = run.track_retries;
        record.sector_retries = run.sector_retries;
        run.best = Some(record);
        Ok(next)
    }

    fn diagnose(&self, record: &mut TrackRecord, run: &TrackRun, aggregate: &AggregateResult, timing: &TimingAnalysis) {
        let ch = record.ch;
        let mut diagnoses = run.capture_diagnoses.clone();
        let mut id_counts: RescueHashMap<DiskChsn, usize> = RescueHashMap::new();

        for sector in &record.sectors {
            let s = sector.id.s();
            *id_counts.entry(sector.id).or_default() += 1;

            if !sector.id_crc_valid() {
                diagnoses.push(
                    Diagnosis::new(
                        DiagnosisCode::IdCrcError,
                        ch,
                        format!("{} header CRC {}", sector.id, sector.header),
                    )
                    .with_sector(s)
                    .with_score(sector.confidence),
                );
            }
            match &sector.data {
                SectorData::CrcFailed { check, .. } => diagnoses.push(
                    Diagnosis::new(DiagnosisCode::DataCrcError, ch, format!("{} data CRC {}", sector.id, check))
                        .with_sector(s)
                        .with_score(sector.confidence),
                ),
                SectorData::Missing => diagnoses.push(
                    Diagnosis::new(DiagnosisCode::MissingData, ch, format!("{} has no data field", sector.id))
                        .with_sector(s)
                        .with_score(sector.confidence),
                ),
                SectorData::Valid(_) => {}
            }
            if sector.corrected_bits > 0 {
                diagnoses.push(
                    Diagnosis::new(
                        DiagnosisCode::CrcCorrected,
                        ch,
                        format!("{} data repaired ({} bits)", sector.id, sector.corrected_bits),
                    )
                    .with_sector(s)
                    .with_score(sector.confidence),
                );
            }
            // The sync component is half sync run, half data mark.
            let data_mark = if sector.data_offset.is_some() { 0.5 } else { 0.0 };
            if sector.components.sync - data_mark < 0.5 - f64::EPSILON {
                diagnoses.push(
                    Diagnosis::new(DiagnosisCode::MissingSync, ch, format!("{} has a short sync run", sector.id))
                        .with_sector(s)
                        .with_score(sector.confidence),
                );
            }
        }

        let mut duplicates: Vec<(DiskChsn, usize)> = id_counts.into_iter().filter(|(_, ct)| *ct > 1).collect();
        duplicates.sort();
        for (id, ct) in duplicates {
            diagnoses.push(
                Diagnosis::new(DiagnosisCode::DuplicateSector, ch, format!("{} appears {} times", id, ct)).with_sector(id.s()),
            );
        }

        let mut numbers: Vec<u8> = record.sectors.iter().map(|s| s.id.s()).collect();
        numbers.sort_unstable();
        numbers.dedup();
        if let Some(gap) = numbers.windows(2).find(|w| w[1] != w[0] + 1) {
            diagnoses.push(Diagnosis::new(
                DiagnosisCode::BadSectorChain,
                ch,
                format!("sector {} is followed by sector {}", gap[0], gap[1]),
            ));
        }

        if let Some(expected) = record.expected_sectors {
            if record.found_ct() != expected as usize {
                diagnoses.push(Diagnosis::new(
                    DiagnosisCode::WrongSectorCount,
                    ch,
                    format!("found {} sectors, expected {}", record.found_ct(), expected),
                ));
            }
        }

        if !aggregate.weak_regions.is_empty() {
            let peak = aggregate.weak_regions.iter().map(|r| r.variance).fold(0.0, f64::max);
            diagnoses.push(
                Diagnosis::new(
                    DiagnosisCode::WeakBits,
                    ch,
                    format!(
                        "{} weak regions ({} bits)",
                        aggregate.weak_regions.len(),
                        aggregate.weak_bit_ct
                    ),
                )
                .with_score(peak),
            );
        }

        if !timing.regions.is_empty() {
            diagnoses.push(Diagnosis::new(
                DiagnosisCode::NonStandardTiming,
                ch,
                format!(
                    "{} timing regions ({:.1}% of bits anomalous)",
                    timing.regions.len(),
                    timing.anomaly_pct()
                ),
            ));
        }
        if let Some(finding) = timing.protection() {
            diagnoses.push(
                Diagnosis::new(
                    DiagnosisCode::ProtectionDetected,
                    ch,
                    format!("{} ({} regions, {} bits)", finding.scheme, finding.regions, finding.bits),
                )
                .with_score(finding.confidence),
            );
        }

        if let Some(reference) = run.decoded.get(aggregate.reference) {
            if reference.cell_period > 0.0 {
                let drift = (reference.final_period - reference.cell_period) / reference.cell_period;
                if drift.abs() > DRIFT_THRESHOLD {
                    diagnoses.push(
                        Diagnosis::new(
                            DiagnosisCode::TimingDrift,
                            ch,
                            format!(
                                "PLL clock ended at {} ({:+.1}% of nominal)",
                                format_us!(reference.final_period),
                                drift * 100.0
                            ),
                        )
                        .with_score(drift.abs()),
                    );
                }
            }
        }

        for diagnosis in diagnoses {
            record.diagnose(diagnosis);
        }
    }

    /// Decide what follows an evaluation. Updates the retry counters when retrying.
    fn decide(&self, run: &mut TrackRun, record: &TrackRecord) -> TrackState {
        let config = self.config;

        if config.error_mode() == ErrorMode::Strict && record.diagnoses.iter().any(|d| d.code.is_error()) {
            log::warn!("TrackController::decide(): Abandoning track {} on error in strict mode", run.ch);
            return TrackState::Abandoned;
        }
        let bad = record.bad_ct();
        if config.abort_on_limit() && bad > config.max_bad_sectors() {
            log::warn!(
                "TrackController::decide(): Abandoning track {}: {} bad sectors exceeds limit of {}",
                run.ch,
                bad,
                config.max_bad_sectors()
            );
            return TrackState::Abandoned;
        }
        if record.is_complete() {
            return TrackState::Done;
        }

        let fired = retry_conditions(record) & config.retry_triggers();
        if fired.is_empty() {
            return TrackState::Done;
        }

        let track_level = fired.intersects(RetryTriggers::MISSING_SECTOR | RetryTriggers::WRONG_COUNT);
        let sector_level = fired.intersects(RetryTriggers::ID_CRC | RetryTriggers::DATA_CRC | RetryTriggers::WEAK_BITS);
        if track_level && run.track_retries < config.max_track_retries() {
            run.track_retries += 1;
        }
        else if sector_level && run.sector_retries < config.max_sector_retries() {
            run.sector_retries += 1;
        }
        else {
            log::debug!(
                "TrackController::decide(): Retries exhausted for track {} ({:?})",
                run.ch,
                fired
            );
            return TrackState::Done;
        }
        log::debug!(
            "TrackController::decide(): Retrying track {} ({:?}), {} bad sectors",
            run.ch,
            fired,
            bad
        );
        TrackState::Retrying
    }

    fn retry(&self, run: &mut TrackRun) -> TrackState {
        let config = self.config;
        if config.adaptive() && !run.source_exhausted && run.revolutions.len() < config.max_revolutions() {
            run.wanted = (run.revolutions.len() + config.revolution_step()).min(config.max_revolutions());
            log::debug!(
                "TrackController::retry(): Reading track {} up to {} revolutions",
                run.ch,
                run.wanted
            );
            TrackState::Capturing
        }
        else {
            run.next_preset();
            TrackState::Decoding
        }
    }

    fn finish(&self, mut run: TrackRun) -> TrackRecord {
        let mut record = match run.best.take() {
            Some(record) => record,
            None => {
                let mut record = TrackRecord::new(
                    run.ch,
                    run.params.encoding.unwrap_or_default(),
                    run.params.cell_period.unwrap_or(DEFAULT_BASE_PERIOD),
                );
                for diagnosis in run.capture_diagnoses.drain(..) {
                    record.diagnose(diagnosis);
                }
                record.revolutions_used = run.decoded.len();
                record
            }
        };

        record.state = run.state;
        if run.state == TrackState::Abandoned {
            record.flags |= TrackFlags::ABANDONED;
        }
        if run.cancelled {
            record.flags |= TrackFlags::CANCELLED;
            let message = format!("cancelled after {} revolutions", run.revolutions.len());
            record.diagnose(Diagnosis::new(DiagnosisCode::Cancelled, run.ch, message));
        }
        record
    }
}

fn mean_confidence(sectors: &[SectorRecord]) -> f64 {
    if sectors.is_empty() {
        0.0
    }
    else {
        sectors.iter().map(|s| s.confidence).sum::<f64>() / sectors.len() as f64
    }
}

/// The conditions present in `record` that may trigger a retry.
fn retry_conditions(record: &TrackRecord) -> RetryTriggers {
    let mut conditions = RetryTriggers::empty();
    let found = record.found_ct();
    match record.expected_sectors {
        Some(expected) => {
            if found < expected as usize {
                conditions |= RetryTriggers::MISSING_SECTOR;
            }
            if found != expected as usize {
                conditions |= RetryTriggers::WRONG_COUNT;
            }
        }
        None if found == 0 => conditions |= RetryTriggers::MISSING_SECTOR,
        None => {}
    }
    if record.sectors.iter().any(|s| !s.id_crc_valid()) {
        conditions |= RetryTriggers::ID_CRC;
    }
    if record.sectors.iter().any(|s| !s.data_crc_valid()) {
        conditions |= RetryTriggers::DATA_CRC;
    }
    if !record.weak_regions.is_empty() {
        conditions |= RetryTriggers::WEAK_BITS;
    }
    conditions
}

/// Merge the sectors of a new evaluation into those of the previous one. A previous sector is
/// replaced only by a better copy; sectors found only previously are kept.
fn merge_sectors(previous: Vec<SectorRecord>, current: Vec<SectorRecord>) -> Vec<SectorRecord> {
    let mut merged = previous;
    let mut seen: RescueHashMap<DiskChsn, usize> = RescueHashMap::new();
    for sector in current {
        let nth = seen.entry(sector.id).or_default();
        let idx = merged.iter().enumerate().filter(|(_, s)| s.id == sector.id).nth(*nth).map(|(i, _)| i);
        *nth += 1;
        match idx {
            Some(i) if merged[i].is_superseded_by(&sector) => merged[i] = sector,
            Some(_) => {}
            None => merged.push(sector),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::QualityConfigBuilder,
        policy::CapturedTrack,
        track_builder::{SectorSpec, TrackBuilder},
        types::{MergeStrategy, TrackDataEncoding},
    };

    const PERIOD: f64 = 2e-6;

    fn revolutions(builder: &TrackBuilder, ch: DiskCh, ct: usize) -> Vec<FluxRevolution> {
        (0..ct).map(|_| builder.build_revolution(ch, PERIOD)).collect()
    }

    fn config() -> QualityConfigBuilder {
        QualityConfig::builder().with_worker_count(2).with_expected_sectors(Some(9))
    }

    #[test]
    fn clean_track_is_done() {
        let ch = DiskCh::new(0, 0);
        let builder = TrackBuilder::standard(ch, 9, 2, TrackDataEncoding::Mfm);
        let config = config().build().unwrap();
        let mut source = CapturedTrack::new(revolutions(&builder, ch, 5));

        let record = TrackController::new(&config).run(ch, &mut source).unwrap();
        assert_eq!(record.state, TrackState::Done);
        assert_eq!(record.valid_ct(), 9);
        assert!(record.is_complete());
        assert_eq!(record.revolutions_used, 3);
        assert_eq!(record.track_retries + record.sector_retries, 0);
        assert!(!record.flags.contains(TrackFlags::INCOMPLETE));
        assert!(!record.diagnoses.iter().any(|d| d.code.is_error()));
        assert_eq!(source.remaining(), 2);
    }

    #[test]
    fn bad_sector_reads_more_revolutions() {
        let ch = DiskCh::new(1, 0);
        let builder = TrackBuilder::standard(ch, 9, 2, TrackDataEncoding::Mfm).modify_sector(4, |s| s.bad_data_crc());
        let config = config().with_max_revolutions(5).build().unwrap();
        let mut source = CapturedTrack::new(revolutions(&builder, ch, 8));

        let record = TrackController::new(&config).run(ch, &mut source).unwrap();
        assert_eq!(record.state, TrackState::Done);
        assert_eq!(record.valid_ct(), 8);
        assert!(record.has_diagnosis(DiagnosisCode::DataCrcError));
        assert!(record.flags.contains(TrackFlags::INCOMPLETE));
        // Two adaptive retries reach the revolution limit, the third re-decodes with a new preset.
        assert_eq!(record.sector_retries, 3);
        assert_eq!(record.revolutions_used, 5);
        assert_eq!(record.pll_preset, PllPreset::for_attempt(1));
    }

    #[test]
    fn strict_mode_abandons() {
        let ch = DiskCh::new(2, 1);
        let builder = TrackBuilder::standard(ch, 9, 2, TrackDataEncoding::Mfm).modify_sector(0, |s| s.bad_header_crc());
        let config = config().with_error_mode(ErrorMode::Strict).build().unwrap();
        let mut source = CapturedTrack::new(revolutions(&builder, ch, 3));

        let record = TrackController::new(&config).run(ch, &mut source).unwrap();
        assert_eq!(record.state, TrackState::Abandoned);
        assert!(record.flags.contains(TrackFlags::ABANDONED));
        assert!(record.has_diagnosis(DiagnosisCode::IdCrcError));
        assert!(record.require_done().is_err());
    }

    #[test]
    fn missing_sectors_abort_on_limit() {
        let ch = DiskCh::new(3, 0);
        let builder = TrackBuilder::standard(ch, 6, 2, TrackDataEncoding::Mfm);
        let config = config()
            .with_abort_on_limit(true)
            .with_max_bad_sectors(2)
            .build()
            .unwrap();
        let mut source = CapturedTrack::new(revolutions(&builder, ch, 3));

        let record = TrackController::new(&config).run(ch, &mut source).unwrap();
        assert_eq!(record.state, TrackState::Abandoned);
        assert_eq!(record.bad_ct(), 3);
        assert!(record.has_diagnosis(DiagnosisCode::WrongSectorCount));
    }

    #[test]
    fn empty_revolution() {
        let ch = DiskCh::new(0, 1);
        let config = QualityConfig::builder().build().unwrap();
        let mut source = CapturedTrack::new(vec![FluxRevolution::from_f64(ch, &[], 0.2)]);

        let record = TrackController::new(&config).run(ch, &mut source).unwrap();
        assert_eq!(record.state, TrackState::Done);
        assert_eq!(record.found_ct(), 0);
        assert!(record.has_diagnosis(DiagnosisCode::InvalidFlux));
    }

    #[test]
    fn no_revolutions_is_an_error() {
        let ch = DiskCh::new(0, 0);
        let config = QualityConfig::default();
        let mut source = CapturedTrack::default();
        assert_eq!(
            TrackController::new(&config).run(ch, &mut source).unwrap_err(),
            FluxRescueError::NoRevolutions(ch)
        );
    }

    #[test]
    fn cancelled_before_start() {
        let ch = DiskCh::new(5, 0);
        let builder = TrackBuilder::standard(ch, 9, 2, TrackDataEncoding::Mfm);
        let config = config().build().unwrap();
        let cancel = AtomicBool::new(true);
        let mut source = CapturedTrack::new(revolutions(&builder, ch, 3));

        let record = TrackController::new(&config)
            .with_cancel(&cancel)
            .run(ch, &mut source)
            .unwrap();
        assert_eq!(record.state, TrackState::Done);
        assert!(record.flags.contains(TrackFlags::CANCELLED));
        assert!(record.has_diagnosis(DiagnosisCode::Cancelled));
        assert_eq!(record.found_ct(), 0);
    }

    #[test]
    fn merge_keeps_better_copies() {
        let ch = DiskCh::new(0, 0);
        let builder = TrackBuilder::standard(ch, 3, 0, TrackDataEncoding::Mfm);
        let good = extract_sectors(
            &builder.build_revolution(ch, PERIOD).decode(&DecodeParams::default()).unwrap(),
            None,
            &[],
            &ExtractOptions::new(ch),
        )
        .sectors;
        let mut worse = good.clone();
        worse[1].data = SectorData::Missing;
        worse.truncate(2);

        let merged = merge_sectors(worse.clone(), good.clone());
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|s| s.is_valid()));

        let merged = merge_sectors(good, worse);
        assert!(merged[1].is_valid());
    }

    #[test]
    fn best_sector_strategy() {
        let ch = DiskCh::new(4, 0);
        let clean = TrackBuilder::standard(ch, 9, 2, TrackDataEncoding::Mfm);
        let damaged = clean.clone().modify_sector(2, |s| s.flip_data_bit(100));
        let mut revs = vec![damaged.build_revolution(ch, PERIOD)];
        revs.extend(revolutions(&clean, ch, 2));

        let config = config().with_merge_strategy(MergeStrategy::BestSector).build().unwrap();
        let record = TrackController::new(&config)
            .run(ch, &mut CapturedTrack::new(revs))
            .unwrap();
        assert!(record.is_complete());
        let sector = record.sector_by_s(3).unwrap();
        assert!(sector.is_valid());
        assert!(matches!(sector.best_revolution, Some(1) | Some(2)));
        assert_eq!(sector.copies.len(), 3);
    }
}
