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

    src/flux/flux_revolution.rs

    A single revolution of flux transitions
*/

//! A [FluxRevolution] holds the flux transition delta times captured over a single revolution
//! of a track, and knows how to decode itself into a [BitstreamResult].

use crate::{
    flux::{
        histogram::FluxHistogram,
        pll::{BitstreamResult, Pll, PllConfig},
    },
    types::{DiskCh, TrackDataEncoding, TrackDensity},
    FluxRescueError,
};

/// The base bit cell period assumed when no hint is given and none can be detected.
pub const DEFAULT_BASE_PERIOD: f64 = 2e-6;
/// The fraction of a revolution used to refine the detected bit cell period.
const START_HISTOGRAM_FRACTION: f64 = 0.02;

/// Type of revolution.
/// `Source` is a direct read from a capture device or image.
/// `Synthetic` is a generated revolution, such as one produced by a [crate::track_builder::TrackBuilder].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FluxRevolutionType {
    #[default]
    Source,
    Synthetic,
}

/// A struct containing statistics about a flux revolution.
#[derive(Clone, Debug)]
pub struct FluxRevolutionStats {
    /// The type of revolution.
    pub rev_type: FluxRevolutionType,
    /// The time taken to read the revolution in seconds.
    pub index_time: f64,
    /// The number of flux transitions in the revolution.
    pub ft_ct: usize,
    /// The total of all flux deltas in the revolution.
    pub total_time: f64,
    /// The duration of the first flux transition in the revolution.
    pub first_ft: f64,
    /// The duration of the last flux transition in the revolution.
    pub last_ft: f64,
}

/// Problems found with the input data of a revolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RevolutionCheck {
    /// The revolution contains no flux transitions.
    pub empty: bool,
    /// The number of zero, negative or non-finite deltas.
    pub rejected: usize,
    /// The number of zero ticks dropped while converting from a sample clock.
    pub dropped_ticks: usize,
    /// The revolution has no index time.
    pub index_missing: bool,
}

impl RevolutionCheck {
    pub fn is_clean(&self) -> bool {
        !self.empty && self.rejected == 0 && self.dropped_ticks == 0 && !self.index_missing
    }
}

/// Parameters for decoding a revolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecodeParams {
    /// The base (MFM) bit cell period in seconds. Detected from the flux deltas if `None`.
    pub cell_period: Option<f64>,
    /// The track encoding. Detected from the decoded bitstream if `None`.
    pub encoding: Option<TrackDataEncoding>,
    pub pll: PllConfig,
}

/// A struct representing one revolution of a fluxstream track.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FluxRevolution {
    /// The type of revolution.
    pub rev_type: FluxRevolutionType,
    /// The physical cylinder and head of the revolution.
    pub ch: DiskCh,
    /// The time taken to read the revolution in seconds, or 0 if no index signal was present.
    pub index_time: f64,
    /// The list of times between flux transitions, in seconds.
    pub flux_deltas: Vec<f64>,
    dropped_ticks: usize,
}

impl FluxRevolution {
    /// Create a new `FluxRevolution` from a list of durations between flux transitions in seconds.
    pub fn from_f64(ch: DiskCh, deltas: &[f64], index_time: f64) -> Self {
        FluxRevolution {
            rev_type: FluxRevolutionType::Source,
            ch,
            index_time,
            flux_deltas: deltas.to_vec(),
            dropped_ticks: 0,
        }
    }

    /// Create a new `FluxRevolution` from a list of durations between flux transitions, given
    /// in integer ticks of the provided clock period `timebase`. Zero-length ticks are dropped.
    pub fn from_ticks(ch: DiskCh, ticks: &[u32], index_time: f64, timebase: f64) -> Self {
        log::debug!(
            "FluxRevolution::from_ticks(): Using timebase of {:.3}ns",
            timebase * 1e9
        );
        let mut flux_deltas = Vec::with_capacity(ticks.len());
        let mut dropped_ticks = 0;
        for tick in ticks {
            if *tick == 0 {
                dropped_ticks += 1;
                continue;
            }
            // Convert to float seconds
            flux_deltas.push(*tick as f64 * timebase);
        }

        if dropped_ticks > 0 {
            log::warn!("FluxRevolution::from_ticks(): {} zero-length ticks dropped", dropped_ticks);
        }
        FluxRevolution {
            rev_type: FluxRevolutionType::Source,
            ch,
            index_time,
            flux_deltas,
            dropped_ticks,
        }
    }

    /// Mark this revolution as synthetic.
    pub fn synthetic(mut self) -> Self {
        self.rev_type = FluxRevolutionType::Synthetic;
        self
    }

    /// Retrieve statistics about the revolution.
    pub fn stats(&self) -> FluxRevolutionStats {
        FluxRevolutionStats {
            rev_type: self.rev_type,
            index_time: self.index_time,
            ft_ct: self.flux_deltas.len(),
            total_time: self.flux_deltas.iter().sum(),
            first_ft: *self.flux_deltas.first().unwrap_or(&0.0),
            last_ft: *self.flux_deltas.last().unwrap_or(&0.0),
        }
    }

    /// Check the revolution for input errors.
    pub fn validate(&self) -> RevolutionCheck {
        RevolutionCheck {
            empty: self.flux_deltas.is_empty(),
            rejected: self
                .flux_deltas
                .iter()
                .filter(|d| !(d.is_finite() && **d > 0.0))
                .count(),
            dropped_ticks: self.dropped_ticks,
            index_missing: !(self.index_time.is_finite() && self.index_time > 0.0),
        }
    }

    /// Retrieve the number of flux transitions in this revolution.
    pub fn ft_ct(&self) -> usize {
        self.flux_deltas.len()
    }

    /// Retrieve the average time between flux transitions in seconds for the entire revolution.
    /// Note: this value is probably not reliable for determining any specific heuristics.
    pub fn transition_avg(&self) -> f64 {
        let mut t_sum = 0.0;
        let mut t_ct = 0;
        for t in self.flux_deltas.iter() {
            if *t > 0.0 {
                t_ct += 1;
                t_sum += *t;
            }
        }
        if t_ct == 0 {
            0.0
        }
        else {
            t_sum / t_ct as f64
        }
    }

    /// Produce a histogram over a fraction of the flux deltas in the revolution.
    pub fn histogram(&self, fraction: f64) -> Result<FluxHistogram, FluxRescueError> {
        FluxHistogram::new(&self.flux_deltas, fraction)
    }

    /// Attempt to detect the base (MFM) bit cell period of the revolution from its flux deltas.
    /// The shortest MFM transition is two bit cells long.
    pub fn detect_base_period(&self) -> Option<f64> {
        let mut full_hist = self.histogram(1.0).ok()?;
        let full_base = full_hist.base_transition_time()?;
        full_hist.log_peaks();

        // The start of the track is usually written in a single pass. Prefer its timing if it
        // roughly agrees with the whole revolution.
        let mut base = full_base;
        if let Some(start_base) = self
            .histogram(START_HISTOGRAM_FRACTION)
            .ok()
            .and_then(|mut h| h.base_transition_time())
        {
            if ((start_base - full_base) / full_base).abs() < 0.25 {
                base = start_base;
            }
        }

        let period = base / 2.0;
        log::debug!(
            "FluxRevolution::detect_base_period(): Base transition {} -> bit cell {} ({:?} density)",
            format_us!(base),
            format_us!(period),
            TrackDensity::from_base_clock(period)
        );
        Some(period)
    }

    /// Decode the revolution into a bitstream.
    ///
    /// If `params` does not specify an encoding, the revolution is decoded as MFM first. If that
    /// produces no address markers and the transition statistics look like FM, it is decoded
    /// again as FM, and the FM result is kept if it contains markers.
    pub fn decode(&self, params: &DecodeParams) -> Result<BitstreamResult, FluxRescueError> {
        let base_period = match params.cell_period {
            Some(period) => period,
            None => self.detect_base_period().unwrap_or_else(|| {
                log::warn!(
                    "FluxRevolution::decode(): Couldn't detect bit cell period, assuming {}",
                    format_us!(DEFAULT_BASE_PERIOD)
                );
                DEFAULT_BASE_PERIOD
            }),
        };

        if let Some(encoding) = params.encoding {
            return Pll::new(base_period, encoding, params.pll.clone())?.decode(self);
        }

        let mfm_result = Pll::new(base_period, TrackDataEncoding::Mfm, params.pll.clone())?.decode(self)?;
        let detected = mfm_result.flux_stats.detect_encoding();

        if mfm_result.markers.is_empty() && matches!(detected, Some(TrackDataEncoding::Fm)) {
            log::debug!("FluxRevolution::decode(): No markers found. Track might be FM encoded? Re-decoding...");
            let fm_result = Pll::new(base_period, TrackDataEncoding::Fm, params.pll.clone())?.decode(self)?;
            if fm_result.markers.is_empty() {
                log::debug!("FluxRevolution::decode(): No markers found in FM decode. Keeping MFM.");
            }
            else {
                log::debug!("FluxRevolution::decode(): Found FM marker! Setting track to FM encoding.");
                return Ok(fm_result);
            }
        }
        Ok(mfm_result)
    }

    /// Create an iterator over the flux delta times in a revolution.
    pub fn delta_iter(&self) -> std::slice::Iter<f64> {
        self.flux_deltas.iter()
    }
}
