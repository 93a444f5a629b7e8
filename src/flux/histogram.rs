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

    src/flux/histogram.rs

    Flux delta time histograms
*/

//! This module defines a [FluxHistogram] structure which is used to determine the data rate of
//! a flux track so that the PLL may be properly initialized for decoding, and to summarize
//! per-bit latencies for timing analysis.

use histogram::{Bucket, Histogram};

use crate::FluxRescueError;

// Grouping power of 3 produces sharp spikes without false maxima
const GROUPING_POWER: u8 = 3;
// Max value power of 2^14 = 16384 (16us)
const MAX_VALUE_POWER: u8 = 14;
const PEAK_THRESHOLD: f64 = 0.005;

pub struct FluxHistogram {
    histogram:  Histogram,
    maxima:     Vec<(u64, std::ops::RangeInclusive<u64>)>,
    total_time: f64,
    sample_ct:  usize,
}

impl FluxHistogram {
    /// Produce a [FluxHistogram] over a fraction of the flux deltas in the revolution.
    /// # Arguments
    /// * `deltas` - A slice of f64 values representing flux delta times in seconds
    /// * `fraction` - The fraction of the deltas to use in the histogram
    pub fn new(deltas: &[f64], fraction: f64) -> Result<Self, FluxRescueError> {
        Self::with_max_power(deltas, fraction, MAX_VALUE_POWER)
    }

    /// Produce a [FluxHistogram] able to hold values up to 2^`max_power` nanoseconds.
    pub fn with_max_power(deltas: &[f64], fraction: f64, max_power: u8) -> Result<Self, FluxRescueError> {
        let mut histogram =
            Histogram::new(GROUPING_POWER, max_power).map_err(|_| FluxRescueError::ParameterError)?;

        let take_count = (deltas.len() as f64 * fraction.clamp(0.0, 1.0)).round() as usize;
        log::trace!("FluxHistogram::new(): Taking {} flux deltas", take_count);
        let mut total_time = 0.0;
        for delta in deltas.iter().take(take_count) {
            total_time += delta;
            // Values outside the histogram range are ignored
            _ = histogram.increment(Self::delta_to_u64(*delta));
        }

        Ok(FluxHistogram {
            histogram,
            maxima: Vec::new(),
            total_time,
            sample_ct: take_count,
        })
    }

    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn sample_ct(&self) -> usize {
        self.sample_ct
    }

    fn delta_to_u64(value: f64) -> u64 {
        if value.is_finite() && value > 0.0 {
            (value * 1_000_000_000.0) as u64
        }
        else {
            0
        }
    }

    fn u64_to_delta(value: u64) -> f64 {
        value as f64 / 1_000_000_000.0
    }

    /// Locate local maxima in the histogram by bucket.
    pub fn find_local_maxima(&mut self, threshold: Option<f64>) -> &[(u64, std::ops::RangeInclusive<u64>)] {
        let mut peaks = vec![];
        let mut previous_bucket: Option<Bucket> = None;
        let mut current_bucket: Option<Bucket> = None;

        let total_count: u64 = self.histogram.into_iter().map(|bucket| bucket.count()).sum();
        let threshold = ((total_count as f64 * threshold.unwrap_or(PEAK_THRESHOLD)).round() as u64).max(1);

        for bucket in self.histogram.into_iter() {
            if let (Some(prev), Some(curr)) = (previous_bucket.as_ref(), current_bucket.as_ref()) {
                if curr.count() >= prev.count() && curr.count() > bucket.count() && curr.count() >= threshold {
                    peaks.push((curr.count(), curr.start()..=curr.end()));
                }
            }
            previous_bucket = current_bucket.take();
            current_bucket = Some(bucket.clone());
        }

        self.maxima = peaks;
        &self.maxima
    }

    /// Attempt to calculate the base (short) transition time, as the median of the first peak.
    pub fn base_transition_time(&mut self) -> Option<f64> {
        if self.maxima.is_empty() {
            self.find_local_maxima(None);
        }

        let Some((count, first_peak)) = self.maxima.first()
        else {
            log::warn!("FluxHistogram::base_transition_time(): No peaks found");
            return None;
        };

        if self.maxima.len() < 2 {
            log::debug!(
                "FluxHistogram::base_transition_time(): Only one peak found ({} samples)",
                count
            );
        }

        let range_median = (first_peak.start() + first_peak.end()) / 2;
        Some(Self::u64_to_delta(range_median))
    }

    /// Return the median value of the most populated bucket.
    pub fn mode(&self) -> Option<f64> {
        let mut best: Option<Bucket> = None;
        for bucket in self.histogram.into_iter() {
            if bucket.count() > 0 && best.as_ref().map_or(true, |b| bucket.count() > b.count()) {
                best = Some(bucket.clone());
            }
        }
        best.map(|b| Self::u64_to_delta((b.start() + b.end()) / 2))
    }

    pub(crate) fn log_peaks(&self) {
        for peak in self.maxima.iter() {
            log::trace!("FluxHistogram::log_peaks(): Peak at range: {:?} ct: {}", peak.1, peak.0);
        }
    }
}
