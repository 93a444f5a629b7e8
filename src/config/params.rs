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

    src/config/params.rs

    String access to configuration parameters
*/

//! Named access to [QualityConfig] parameters, for front ends that configure the decoder from
//! strings such as command line options or settings files.

use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use super::{check_float, check_int, invalid, QualityConfig, QualityConfigBuilder, MAX_RETRIES, MAX_REVOLUTIONS};
use crate::{
    config::{MAX_CELL_PERIOD, MAX_WORKERS, MIN_CELL_PERIOD},
    types::{ErrorMode, MergeStrategy, RetryTriggers, TrackDataEncoding},
    FluxRescueError,
};

/// Value used to clear an optional parameter.
pub const AUTO: &str = "auto";

/// A named configuration parameter.
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ConfigParam {
    MinRevolutions,
    MaxRevolutions,
    Adaptive,
    RevolutionStep,
    MaxTrackRetries,
    MaxSectorRetries,
    RetryTriggers,
    MaxBadSectors,
    AbortOnLimit,
    MergeStrategy,
    WeakBitThreshold,
    CrcCorrectionBits,
    ErrorMode,
    ClockGain,
    PhaseGain,
    MaxAdjust,
    GateThreshold,
    ClassifyTolerance,
    CaptureResolution,
    CellPeriod,
    Encoding,
    ExpectedSectors,
    WeightCrc,
    WeightPlausibility,
    WeightTiming,
    WeightSync,
    WeightJitter,
    AnomalyThresholdPct,
    WindowBits,
    MinRegionBits,
    MergeGapBits,
    WorkerCount,
    KeepRevolutionCopies,
    PreserveBitstream,
}

/// The values a parameter accepts.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ParamRange {
    Bool,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Choice(&'static [&'static str]),
    /// Flag names joined with `|`, or a hexadecimal value.
    Flags(&'static [&'static str]),
}

impl Display for ParamRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamRange::Bool => write!(f, "true|false"),
            ParamRange::Int { min, max } => write!(f, "{}..={}", min, max),
            ParamRange::Float { min, max } => write!(f, "{}..={}", min, max),
            ParamRange::Choice(choices) => write!(f, "{}", choices.join("|")),
            ParamRange::Flags(flags) => write!(f, "[{}]", flags.join(", ")),
        }
    }
}

/// A parameter with its current value, as returned by [QualityConfig::params].
#[derive(Clone, Debug, PartialEq)]
pub struct ParamInfo {
    pub param: ConfigParam,
    pub value: String,
    pub range: ParamRange,
}

impl Display for ParamInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {} ({})", self.param, self.value, self.range)
    }
}

impl ConfigParam {
    pub fn range(&self) -> ParamRange {
        use ConfigParam::*;
        match self {
            Adaptive | AbortOnLimit | KeepRevolutionCopies | PreserveBitstream => ParamRange::Bool,
            MinRevolutions | MaxRevolutions => ParamRange::Int {
                min: 1,
                max: MAX_REVOLUTIONS as i64,
            },
            RevolutionStep => ParamRange::Int { min: 1, max: 8 },
            MaxTrackRetries | MaxSectorRetries => ParamRange::Int {
                min: 0,
                max: MAX_RETRIES as i64,
            },
            RetryTriggers => ParamRange::Flags(&["MISSING_SECTOR", "ID_CRC", "DATA_CRC", "WEAK_BITS", "WRONG_COUNT"]),
            MaxBadSectors => ParamRange::Int { min: 0, max: 255 },
            MergeStrategy => ParamRange::Choice(&["first", "best_revolution", "majority_vote", "best_sector"]),
            WeakBitThreshold => ParamRange::Float { min: 0.0, max: 0.25 },
            CrcCorrectionBits => ParamRange::Int { min: 0, max: 2 },
            ErrorMode => ParamRange::Choice(&["strict", "normal", "salvage", "forensic"]),
            ClockGain | PhaseGain => ParamRange::Float { min: 0.0, max: 1.0 },
            MaxAdjust | ClassifyTolerance => ParamRange::Float { min: 0.0, max: 0.5 },
            GateThreshold => ParamRange::Int { min: 0, max: 16 },
            CaptureResolution => ParamRange::Float {
                min: 0.0,
                max: MAX_CELL_PERIOD,
            },
            CellPeriod => ParamRange::Float {
                min: MIN_CELL_PERIOD,
                max: MAX_CELL_PERIOD,
            },
            Encoding => ParamRange::Choice(&[AUTO, "fm", "mfm"]),
            ExpectedSectors => ParamRange::Int { min: 1, max: 255 },
            WeightCrc | WeightPlausibility | WeightTiming | WeightSync | WeightJitter => {
                ParamRange::Float { min: 0.0, max: 1.0 }
            }
            AnomalyThresholdPct => ParamRange::Float { min: 1.0, max: 100.0 },
            WindowBits => ParamRange::Int { min: 1, max: 4096 },
            MinRegionBits => ParamRange::Int { min: 1, max: 1 << 20 },
            MergeGapBits => ParamRange::Int { min: 0, max: 1 << 20 },
            WorkerCount => ParamRange::Int {
                min: 1,
                max: MAX_WORKERS as i64,
            },
        }
    }

    /// Parameters that must be strictly greater than the minimum of their range.
    pub(crate) fn requires_positive(&self) -> bool {
        matches!(
            self,
            ConfigParam::WeakBitThreshold | ConfigParam::ClassifyTolerance | ConfigParam::CaptureResolution
        )
    }

    /// Parameters that may be unset with [AUTO].
    pub fn is_optional(&self) -> bool {
        matches!(
            self,
            ConfigParam::CaptureResolution
                | ConfigParam::CellPeriod
                | ConfigParam::Encoding
                | ConfigParam::ExpectedSectors
        )
    }
}

fn parse_bool(param: ConfigParam, value: &str) -> Result<bool, FluxRescueError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(param, format!("'{}' is not a boolean", value))),
    }
}

fn parse_int(param: ConfigParam, value: &str) -> Result<i64, FluxRescueError> {
    let v = value
        .trim()
        .parse::<i64>()
        .map_err(|e| invalid(param, format!("'{}': {}", value, e)))?;
    check_int(param, v)?;
    Ok(v)
}

fn parse_float(param: ConfigParam, value: &str) -> Result<f64, FluxRescueError> {
    let v = value
        .trim()
        .parse::<f64>()
        .map_err(|e| invalid(param, format!("'{}': {}", value, e)))?;
    check_float(param, v)?;
    Ok(v)
}

fn parse_choice<T: FromStr>(param: ConfigParam, value: &str) -> Result<T, FluxRescueError> {
    T::from_str(value.trim()).map_err(|_| invalid(param, format!("'{}' is not one of {}", value, param.range())))
}

fn is_auto(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case(AUTO)
}

impl QualityConfigBuilder {
    /// Set a parameter by name. The value is parsed and range checked; cross-field checks are
    /// made by [QualityConfigBuilder::build].
    pub fn set_param(mut self, name: &str, value: &str) -> Result<QualityConfigBuilder, FluxRescueError> {
        let param = ConfigParam::from_str(name).map_err(|_| FluxRescueError::InvalidConfig {
            param: "name",
            reason: format!("unknown parameter '{}'", name),
        })?;
        log::trace!("QualityConfigBuilder::set_param(): {} = {}", param, value);

        let c = &mut self.config;
        match param {
            ConfigParam::MinRevolutions => c.min_revolutions = parse_int(param, value)? as usize,
            ConfigParam::MaxRevolutions => c.max_revolutions = parse_int(param, value)? as usize,
            ConfigParam::Adaptive => c.adaptive = parse_bool(param, value)?,
            ConfigParam::RevolutionStep => c.revolution_step = parse_int(param, value)? as usize,
            ConfigParam::MaxTrackRetries => c.max_track_retries = parse_int(param, value)? as u32,
            ConfigParam::MaxSectorRetries => c.max_sector_retries = parse_int(param, value)? as u32,
            ConfigParam::RetryTriggers => {
                c.retry_triggers = bitflags::parser::from_str::<RetryTriggers>(value.trim())
                    .map_err(|e| invalid(param, format!("'{}': {}", value, e)))?
            }
            ConfigParam::MaxBadSectors => c.max_bad_sectors = parse_int(param, value)? as usize,
            ConfigParam::AbortOnLimit => c.abort_on_limit = parse_bool(param, value)?,
            ConfigParam::MergeStrategy => c.merge_strategy = parse_choice::<MergeStrategy>(param, value)?,
            ConfigParam::WeakBitThreshold => c.weak_bit_threshold = parse_float(param, value)?,
            ConfigParam::CrcCorrectionBits => c.crc_correction_bits = parse_int(param, value)? as u8,
            ConfigParam::ErrorMode => c.error_mode = parse_choice::<ErrorMode>(param, value)?,
            ConfigParam::ClockGain => c.pll.clock_gain = parse_float(param, value)?,
            ConfigParam::PhaseGain => c.pll.phase_gain = parse_float(param, value)?,
            ConfigParam::MaxAdjust => c.pll.max_adjust = parse_float(param, value)?,
            ConfigParam::GateThreshold => c.pll.gate_threshold = parse_int(param, value)? as u32,
            ConfigParam::ClassifyTolerance => c.pll.classify_tolerance = parse_float(param, value)?,
            ConfigParam::CaptureResolution => {
                c.pll.capture_resolution = match is_auto(value) {
                    true => None,
                    false => Some(parse_float(param, value)?),
                }
            }
            ConfigParam::CellPeriod => {
                c.cell_period = match is_auto(value) {
                    true => None,
                    false => Some(parse_float(param, value)?),
                }
            }
            ConfigParam::Encoding => {
                c.encoding = match is_auto(value) {
                    true => None,
                    false => Some(parse_choice::<TrackDataEncoding>(param, value)?),
                }
            }
            ConfigParam::ExpectedSectors => {
                c.expected_sectors = match is_auto(value) {
                    true => None,
                    false => Some(parse_int(param, value)? as u8),
                }
            }
            ConfigParam::WeightCrc => c.score_weights.crc = parse_float(param, value)?,
            ConfigParam::WeightPlausibility => c.score_weights.plausibility = parse_float(param, value)?,
            ConfigParam::WeightTiming => c.score_weights.timing = parse_float(param, value)?,
            ConfigParam::WeightSync => c.score_weights.sync = parse_float(param, value)?,
            ConfigParam::WeightJitter => c.score_weights.jitter = parse_float(param, value)?,
            ConfigParam::AnomalyThresholdPct => c.timing.anomaly_threshold_pct = parse_float(param, value)?,
            ConfigParam::WindowBits => c.timing.window_bits = parse_int(param, value)? as usize,
            ConfigParam::MinRegionBits => c.timing.min_region_bits = parse_int(param, value)? as usize,
            ConfigParam::MergeGapBits => c.timing.merge_gap_bits = parse_int(param, value)? as usize,
            ConfigParam::WorkerCount => c.worker_count = parse_int(param, value)? as usize,
            ConfigParam::KeepRevolutionCopies => c.keep_revolution_copies = parse_bool(param, value)?,
            ConfigParam::PreserveBitstream => c.preserve_bitstream = parse_bool(param, value)?,
        }
        Ok(self)
    }
}

fn format_optional<T: Display>(value: Option<T>) -> String {
    value.map_or_else(|| AUTO.to_string(), |v| v.to_string())
}

impl QualityConfig {
    /// Return the current value of a parameter, formatted so that it may be passed back to
    /// [QualityConfigBuilder::set_param].
    pub fn param(&self, param: ConfigParam) -> String {
        match param {
            ConfigParam::MinRevolutions => self.min_revolutions.to_string(),
            ConfigParam::MaxRevolutions => self.max_revolutions.to_string(),
            ConfigParam::Adaptive => self.adaptive.to_string(),
            ConfigParam::RevolutionStep => self.revolution_step.to_string(),
            ConfigParam::MaxTrackRetries => self.max_track_retries.to_string(),
            ConfigParam::MaxSectorRetries => self.max_sector_retries.to_string(),
            ConfigParam::RetryTriggers => {
                let mut s = String::new();
                match bitflags::parser::to_writer(&self.retry_triggers, &mut s) {
                    Ok(_) => s,
                    Err(_) => format!("{:#x}", self.retry_triggers.bits()),
                }
            }
            ConfigParam::MaxBadSectors => self.max_bad_sectors.to_string(),
            ConfigParam::AbortOnLimit => self.abort_on_limit.to_string(),
            ConfigParam::MergeStrategy => self.merge_strategy.to_string(),
            ConfigParam::WeakBitThreshold => self.weak_bit_threshold.to_string(),
            ConfigParam::CrcCorrectionBits => self.crc_correction_bits.to_string(),
            ConfigParam::ErrorMode => self.error_mode.to_string(),
            ConfigParam::ClockGain => self.pll.clock_gain.to_string(),
            ConfigParam::PhaseGain => self.pll.phase_gain.to_string(),
            ConfigParam::MaxAdjust => self.pll.max_adjust.to_string(),
            ConfigParam::GateThreshold => self.pll.gate_threshold.to_string(),
            ConfigParam::ClassifyTolerance => self.pll.classify_tolerance.to_string(),
            ConfigParam::CaptureResolution => format_optional(self.pll.capture_resolution),
            ConfigParam::CellPeriod => format_optional(self.cell_period),
            ConfigParam::Encoding => format_optional(self.encoding.map(|e| e.to_string().to_ascii_lowercase())),
            ConfigParam::ExpectedSectors => format_optional(self.expected_sectors),
            ConfigParam::WeightCrc => self.score_weights.crc.to_string(),
            ConfigParam::WeightPlausibility => self.score_weights.plausibility.to_string(),
            ConfigParam::WeightTiming => self.score_weights.timing.to_string(),
            ConfigParam::WeightSync => self.score_weights.sync.to_string(),
            ConfigParam::WeightJitter => self.score_weights.jitter.to_string(),
            ConfigParam::AnomalyThresholdPct => self.timing.anomaly_threshold_pct.to_string(),
            ConfigParam::WindowBits => self.timing.window_bits.to_string(),
            ConfigParam::MinRegionBits => self.timing.min_region_bits.to_string(),
            ConfigParam::MergeGapBits => self.timing.merge_gap_bits.to_string(),
            ConfigParam::WorkerCount => self.worker_count.to_string(),
            ConfigParam::KeepRevolutionCopies => self.keep_revolution_copies.to_string(),
            ConfigParam::PreserveBitstream => self.preserve_bitstream.to_string(),
        }
    }

    /// List every parameter with its current value and accepted range.
    pub fn params(&self) -> Vec<ParamInfo> {
        use strum::IntoEnumIterator;
        ConfigParam::iter()
            .map(|param| ParamInfo {
                param,
                value: self.param(param),
                range: param.range(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn names() {
        assert_eq!(ConfigParam::from_str("max_revolutions"), Ok(ConfigParam::MaxRevolutions));
        assert_eq!(ConfigParam::from_str("Weak_Bit_Threshold"), Ok(ConfigParam::WeakBitThreshold));
        assert_eq!(ConfigParam::AnomalyThresholdPct.to_string(), "anomaly_threshold_pct");
        assert!(ConfigParam::from_str("speed").is_err());
    }

    #[test]
    fn set_by_name() {
        let config = QualityConfig::builder()
            .set_param("max_revolutions", "8")
            .and_then(|b| b.set_param("merge_strategy", "best_sector"))
            .and_then(|b| b.set_param("encoding", "FM"))
            .and_then(|b| b.set_param("retry_triggers", "ID_CRC | DATA_CRC"))
            .and_then(|b| b.set_param("adaptive", "off"))
            .and_then(|b| b.build())
            .unwrap();
        assert_eq!(config.max_revolutions(), 8);
        assert_eq!(config.merge_strategy(), MergeStrategy::BestSector);
        assert_eq!(config.encoding(), Some(TrackDataEncoding::Fm));
        assert_eq!(config.retry_triggers(), RetryTriggers::ID_CRC | RetryTriggers::DATA_CRC);
        assert!(!config.adaptive());

        let config = QualityConfigBuilder::from_preset(crate::config::QualityPreset::Fast)
            .set_param("encoding", "auto")
            .and_then(|b| b.build())
            .unwrap();
        assert_eq!(config.encoding(), None);
    }

    #[test]
    fn bad_values() {
        let b = QualityConfig::builder;
        assert!(matches!(
            b().set_param("max_revolutions", "33"),
            Err(FluxRescueError::InvalidConfig { param: "max_revolutions", .. })
        ));
        assert!(b().set_param("max_revolutions", "lots").is_err());
        assert!(b().set_param("adaptive", "maybe").is_err());
        assert!(b().set_param("error_mode", "lenient").is_err());
        assert!(b().set_param("classify_tolerance", "0").is_err());
        assert!(b().set_param("cell_period", "NaN").is_err());
        assert!(b().set_param("retry_triggers", "SOMETIMES").is_err());
        assert!(matches!(
            b().set_param("no_such_param", "1"),
            Err(FluxRescueError::InvalidConfig { param: "name", .. })
        ));
    }

    #[test]
    fn listed_values_round_trip() {
        let config = QualityConfig::from_preset(crate::config::QualityPreset::Aggressive);
        let params = config.params();
        assert_eq!(params.len(), ConfigParam::iter().count());

        let mut builder = QualityConfig::builder();
        for info in &params {
            builder = builder.set_param(info.param.into(), &info.value).unwrap();
        }
        assert_eq!(builder.build().unwrap(), config);
    }
}
