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

//! Configuration of the track decode pipeline.
//!
//! A [QualityConfig] is immutable once built. It is created through a [QualityConfigBuilder],
//! which range checks every field, either with the `with_*` setters or by name with
//! [QualityConfigBuilder::set_param].

pub mod params;

use crate::{
    flux::pll::PllConfig,
    sector::ScoreWeights,
    timing::TimingConfig,
    types::{ErrorMode, MergeStrategy, RetryTriggers, TrackDataEncoding},
    FluxRescueError,
};

pub use params::{ConfigParam, ParamInfo, ParamRange};

pub const MAX_REVOLUTIONS: usize = 32;
pub const MAX_RETRIES: u32 = 32;
pub const MAX_WORKERS: usize = 256;
pub const MIN_CELL_PERIOD: f64 = 1e-7;
pub const MAX_CELL_PERIOD: f64 = 1e-5;

/// Starting points for a [QualityConfig].
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString, strum::IntoStaticStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QualityPreset {
    #[default]
    Default,
    /// Few revolutions and retries, no repair.
    Fast,
    /// Many revolutions and retries.
    Thorough,
    /// Fast clock tracking, per-sector selection, CRC repair and salvage of damaged sectors.
    Aggressive,
    /// Slow clock tracking for marginal but undamaged media.
    Gentle,
    /// Keep everything: sector copies, the consensus bitstream and the raw revolutions.
    Forensic,
}

/// Validated configuration for the policy controller and the stages it drives.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityConfig {
    pub(crate) min_revolutions: usize,
    pub(crate) max_revolutions: usize,
    pub(crate) adaptive: bool,
    pub(crate) revolution_step: usize,
    pub(crate) max_track_retries: u32,
    pub(crate) max_sector_retries: u32,
    pub(crate) retry_triggers: RetryTriggers,
    pub(crate) max_bad_sectors: usize,
    pub(crate) abort_on_limit: bool,
    pub(crate) merge_strategy: MergeStrategy,
    pub(crate) weak_bit_threshold: f64,
    pub(crate) crc_correction_bits: u8,
    pub(crate) error_mode: ErrorMode,
    pub(crate) pll: PllConfig,
    pub(crate) cell_period: Option<f64>,
    pub(crate) encoding: Option<TrackDataEncoding>,
    pub(crate) expected_sectors: Option<u8>,
    pub(crate) score_weights: ScoreWeights,
    pub(crate) timing: TimingConfig,
    pub(crate) worker_count: usize,
    pub(crate) keep_revolution_copies: bool,
    pub(crate) preserve_bitstream: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        QualityConfig {
            min_revolutions: 3,
            max_revolutions: 5,
            adaptive: true,
            revolution_step: 1,
            max_track_retries: 3,
            max_sector_retries: 3,
            retry_triggers: RetryTriggers::default(),
            max_bad_sectors: 255,
            abort_on_limit: false,
            merge_strategy: MergeStrategy::default(),
            weak_bit_threshold: 0.2,
            crc_correction_bits: 0,
            error_mode: ErrorMode::default(),
            pll: PllConfig::default(),
            cell_period: None,
            encoding: None,
            expected_sectors: None,
            score_weights: ScoreWeights::default(),
            timing: TimingConfig::default(),
            worker_count: std::thread::available_parallelism().map_or(1, |n| n.get()).min(MAX_WORKERS),
            keep_revolution_copies: true,
            preserve_bitstream: false,
        }
    }
}

impl QualityConfig {
    pub fn builder() -> QualityConfigBuilder {
        QualityConfigBuilder::new()
    }

    pub fn from_preset(preset: QualityPreset) -> Self {
        let mut config = QualityConfig::default();
        match preset {
            QualityPreset::Default => {}
            QualityPreset::Fast => {
                config.min_revolutions = 2;
                config.max_revolutions = 3;
                config.adaptive = false;
                config.max_track_retries = 2;
                config.max_sector_retries = 1;
            }
            QualityPreset::Thorough => {
                config.max_revolutions = 10;
                config.max_track_retries = 10;
                config.max_sector_retries = 10;
            }
            QualityPreset::Aggressive => {
                config.max_revolutions = 16;
                config.revolution_step = 2;
                config.max_track_retries = 20;
                config.max_sector_retries = 20;
                config.merge_strategy = MergeStrategy::BestSector;
                config.crc_correction_bits = 2;
                config.error_mode = ErrorMode::Salvage;
                config.pll.clock_gain = 0.1;
                config.pll.max_adjust = 0.2;
            }
            QualityPreset::Gentle => {
                config.pll.clock_gain = 0.02;
                config.revolution_step = 1;
                config.max_track_retries = 3;
            }
            QualityPreset::Forensic => {
                config.max_revolutions = 10;
                config.max_track_retries = 10;
                config.error_mode = ErrorMode::Forensic;
                config.crc_correction_bits = 1;
                config.keep_revolution_copies = true;
                config.preserve_bitstream = true;
            }
        }
        config
    }

    pub fn min_revolutions(&self) -> usize {
        self.min_revolutions
    }

    pub fn max_revolutions(&self) -> usize {
        self.max_revolutions
    }

    pub fn adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn revolution_step(&self) -> usize {
        self.revolution_step
    }

    pub fn max_track_retries(&self) -> u32 {
        self.max_track_retries
    }

    pub fn max_sector_retries(&self) -> u32 {
        self.max_sector_retries
    }

    pub fn retry_triggers(&self) -> RetryTriggers {
        self.retry_triggers
    }

    pub fn max_bad_sectors(&self) -> usize {
        self.max_bad_sectors
    }

    pub fn abort_on_limit(&self) -> bool {
        self.abort_on_limit
    }

    pub fn merge_strategy(&self) -> MergeStrategy {
        self.merge_strategy
    }

    pub fn weak_bit_threshold(&self) -> f64 {
        self.weak_bit_threshold
    }

    pub fn crc_correction_bits(&self) -> u8 {
        self.crc_correction_bits
    }

    /// The number of bits CRC repair may change, taking the error mode into account.
    pub fn effective_crc_correction(&self) -> u8 {
        if self.error_mode.allows_crc_repair() {
            self.crc_correction_bits
        }
        else {
            0
        }
    }

    pub fn error_mode(&self) -> ErrorMode {
        self.error_mode
    }

    pub fn pll(&self) -> &PllConfig {
        &self.pll
    }

    pub fn cell_period(&self) -> Option<f64> {
        self.cell_period
    }

    pub fn encoding(&self) -> Option<TrackDataEncoding> {
        self.encoding
    }

    pub fn expected_sectors(&self) -> Option<u8> {
        self.expected_sectors
    }

    pub fn score_weights(&self) -> &ScoreWeights {
        &self.score_weights
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Keep the per-revolution copies of each sector.
    pub fn keeps_copies(&self) -> bool {
        self.keep_revolution_copies || self.error_mode.keeps_copies()
    }

    /// Keep the consensus bitstream and raw revolutions in the track record.
    pub fn preserves_bitstream(&self) -> bool {
        self.preserve_bitstream || self.error_mode.preserves_bitstream()
    }

    /// Check every field. Configurations built by [QualityConfigBuilder] are always valid; this
    /// is useful for configurations obtained by other means, such as deserialization.
    pub fn validate(&self) -> Result<(), FluxRescueError> {
        check_int(ConfigParam::MinRevolutions, self.min_revolutions as i64)?;
        check_int(ConfigParam::MaxRevolutions, self.max_revolutions as i64)?;
        if self.min_revolutions > self.max_revolutions {
            return Err(invalid(
                ConfigParam::MinRevolutions,
                format!(
                    "{} is greater than max_revolutions ({})",
                    self.min_revolutions, self.max_revolutions
                ),
            ));
        }
        check_int(ConfigParam::RevolutionStep, self.revolution_step as i64)?;
        check_int(ConfigParam::MaxTrackRetries, self.max_track_retries as i64)?;
        check_int(ConfigParam::MaxSectorRetries, self.max_sector_retries as i64)?;
        check_int(ConfigParam::MaxBadSectors, self.max_bad_sectors as i64)?;
        check_float(ConfigParam::WeakBitThreshold, self.weak_bit_threshold)?;
        check_int(ConfigParam::CrcCorrectionBits, self.crc_correction_bits as i64)?;
        check_float(ConfigParam::ClockGain, self.pll.clock_gain)?;
        check_float(ConfigParam::PhaseGain, self.pll.phase_gain)?;
        check_float(ConfigParam::MaxAdjust, self.pll.max_adjust)?;
        check_int(ConfigParam::GateThreshold, self.pll.gate_threshold as i64)?;
        check_float(ConfigParam::ClassifyTolerance, self.pll.classify_tolerance)?;
        if let Some(resolution) = self.pll.capture_resolution {
            check_float(ConfigParam::CaptureResolution, resolution)?;
        }
        if let Some(period) = self.cell_period {
            check_float(ConfigParam::CellPeriod, period)?;
        }
        if let Some(expected) = self.expected_sectors {
            check_int(ConfigParam::ExpectedSectors, expected as i64)?;
        }
        for (param, weight) in [
            (ConfigParam::WeightCrc, self.score_weights.crc),
            (ConfigParam::WeightPlausibility, self.score_weights.plausibility),
            (ConfigParam::WeightTiming, self.score_weights.timing),
            (ConfigParam::WeightSync, self.score_weights.sync),
            (ConfigParam::WeightJitter, self.score_weights.jitter),
        ] {
            check_float(param, weight)?;
        }
        if self.score_weights.total() <= 0.0 {
            return Err(invalid(ConfigParam::WeightCrc, "score weights sum to 0".to_string()));
        }
        check_float(ConfigParam::AnomalyThresholdPct, self.timing.anomaly_threshold_pct)?;
        check_int(ConfigParam::WindowBits, self.timing.window_bits as i64)?;
        check_int(ConfigParam::MinRegionBits, self.timing.min_region_bits as i64)?;
        check_int(ConfigParam::MergeGapBits, self.timing.merge_gap_bits as i64)?;
        check_int(ConfigParam::WorkerCount, self.worker_count as i64)?;
        Ok(())
    }
}

pub(crate) fn invalid(param: ConfigParam, reason: String) -> FluxRescueError {
    FluxRescueError::InvalidConfig {
        param: param.into(),
        reason,
    }
}

pub(crate) fn check_int(param: ConfigParam, value: i64) -> Result<(), FluxRescueError> {
    match param.range() {
        ParamRange::Int { min, max } if value < min || value > max => Err(invalid(
            param,
            format!("{} is outside the range {}..={}", value, min, max),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn check_float(param: ConfigParam, value: f64) -> Result<(), FluxRescueError> {
    if param.requires_positive() && value <= 0.0 {
        return Err(invalid(param, format!("{} must be greater than 0", value)));
    }
    match param.range() {
        ParamRange::Float { min, max } if !(value.is_finite() && value >= min && value <= max) => Err(invalid(
            param,
            format!("{} is outside the range {}..={}", value, min, max),
        )),
        _ => Ok(()),
    }
}

/// Builds a validated [QualityConfig].
#[derive(Clone, Debug, Default)]
pub struct QualityConfigBuilder {
    config: QualityConfig,
}

impl QualityConfigBuilder {
    pub fn new() -> QualityConfigBuilder {
        Default::default()
    }

    /// Start from a preset.
    pub fn from_preset(preset: QualityPreset) -> QualityConfigBuilder {
        QualityConfigBuilder {
            config: QualityConfig::from_preset(preset),
        }
    }

    /// Set the number of revolutions read before the first evaluation.
    pub fn with_min_revolutions(mut self, revolutions: usize) -> QualityConfigBuilder {
        self.config.min_revolutions = revolutions;
        self
    }

    /// Set the maximum number of revolutions read for a track.
    pub fn with_max_revolutions(mut self, revolutions: usize) -> QualityConfigBuilder {
        self.config.max_revolutions = revolutions;
        self
    }

    /// Set whether retries read more revolutions before trying other PLL presets.
    pub fn with_adaptive(mut self, adaptive: bool) -> QualityConfigBuilder {
        self.config.adaptive = adaptive;
        self
    }

    pub fn with_revolution_step(mut self, step: usize) -> QualityConfigBuilder {
        self.config.revolution_step = step;
        self
    }

    pub fn with_max_track_retries(mut self, retries: u32) -> QualityConfigBuilder {
        self.config.max_track_retries = retries;
        self
    }

    pub fn with_max_sector_retries(mut self, retries: u32) -> QualityConfigBuilder {
        self.config.max_sector_retries = retries;
        self
    }

    pub fn with_retry_triggers(mut self, triggers: RetryTriggers) -> QualityConfigBuilder {
        self.config.retry_triggers = triggers;
        self
    }

    /// Set the number of bad sectors above which a track is abandoned, if `abort_on_limit` is set.
    pub fn with_max_bad_sectors(mut self, sectors: usize) -> QualityConfigBuilder {
        self.config.max_bad_sectors = sectors;
        self
    }

    pub fn with_abort_on_limit(mut self, abort: bool) -> QualityConfigBuilder {
        self.config.abort_on_limit = abort;
        self
    }

    pub fn with_merge_strategy(mut self, strategy: MergeStrategy) -> QualityConfigBuilder {
        self.config.merge_strategy = strategy;
        self
    }

    pub fn with_weak_bit_threshold(mut self, threshold: f64) -> QualityConfigBuilder {
        self.config.weak_bit_threshold = threshold;
        self
    }

    pub fn with_crc_correction_bits(mut self, bits: u8) -> QualityConfigBuilder {
        self.config.crc_correction_bits = bits;
        self
    }

    pub fn with_error_mode(mut self, mode: ErrorMode) -> QualityConfigBuilder {
        self.config.error_mode = mode;
        self
    }

    pub fn with_pll(mut self, pll: PllConfig) -> QualityConfigBuilder {
        self.config.pll = pll;
        self
    }

    /// Set the base (MFM) bit cell period, in seconds. If not set, it is detected per revolution.
    pub fn with_cell_period(mut self, period: Option<f64>) -> QualityConfigBuilder {
        self.config.cell_period = period;
        self
    }

    /// Set the track encoding. If not set, it is detected per revolution.
    pub fn with_encoding(mut self, encoding: Option<TrackDataEncoding>) -> QualityConfigBuilder {
        self.config.encoding = encoding;
        self
    }

    pub fn with_expected_sectors(mut self, sectors: Option<u8>) -> QualityConfigBuilder {
        self.config.expected_sectors = sectors;
        self
    }

    pub fn with_score_weights(mut self, weights: ScoreWeights) -> QualityConfigBuilder {
        self.config.score_weights = weights;
        self
    }

    pub fn with_timing(mut self, timing: TimingConfig) -> QualityConfigBuilder {
        self.config.timing = timing;
        self
    }

    pub fn with_worker_count(mut self, workers: usize) -> QualityConfigBuilder {
        self.config.worker_count = workers;
        self
    }

    pub fn with_keep_revolution_copies(mut self, keep: bool) -> QualityConfigBuilder {
        self.config.keep_revolution_copies = keep;
        self
    }

    pub fn with_preserve_bitstream(mut self, preserve: bool) -> QualityConfigBuilder {
        self.config.preserve_bitstream = preserve;
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<QualityConfig, FluxRescueError> {
        if let Err(e) = self.config.validate() {
            log::error!("QualityConfigBuilder::build(): {}", e);
            return Err(e);
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn presets_are_valid() {
        for preset in QualityPreset::iter() {
            let config = QualityConfigBuilder::from_preset(preset).build();
            assert!(config.is_ok(), "{}: {:?}", preset, config);
        }
    }

    #[test]
    fn range_checks() {
        let err = QualityConfig::builder().with_max_revolutions(64).build().unwrap_err();
        assert!(matches!(err, FluxRescueError::InvalidConfig { param: "max_revolutions", .. }));

        let err = QualityConfig::builder()
            .with_min_revolutions(6)
            .with_max_revolutions(5)
            .build()
            .unwrap_err();
        assert!(matches!(err, FluxRescueError::InvalidConfig { param: "min_revolutions", .. }));

        assert!(QualityConfig::builder().with_weak_bit_threshold(0.3).build().is_err());
        assert!(QualityConfig::builder().with_weak_bit_threshold(0.0).build().is_err());
        assert!(QualityConfig::builder().with_weak_bit_threshold(0.25).build().is_ok());
        assert!(QualityConfig::builder().with_crc_correction_bits(3).build().is_err());
        assert!(QualityConfig::builder().with_cell_period(Some(1e-3)).build().is_err());
        assert!(QualityConfig::builder().with_worker_count(0).build().is_err());
    }

    #[test]
    fn crc_repair_depends_on_mode() {
        let config = QualityConfig::builder()
            .with_crc_correction_bits(1)
            .with_error_mode(ErrorMode::Strict)
            .build()
            .unwrap();
        assert_eq!(config.effective_crc_correction(), 0);
        let config = QualityConfig::builder().with_crc_correction_bits(1).build().unwrap();
        assert_eq!(config.effective_crc_correction(), 0);
        let config = QualityConfig::builder()
            .with_crc_correction_bits(1)
            .with_error_mode(ErrorMode::Salvage)
            .build()
            .unwrap();
        assert_eq!(config.effective_crc_correction(), 1);
    }

    #[test]
    fn forensic_preserves() {
        let config = QualityConfig::from_preset(QualityPreset::Forensic);
        assert!(config.preserves_bitstream());
        assert!(config.keeps_copies());
        assert!(!QualityConfig::default().preserves_bitstream());
    }
}
