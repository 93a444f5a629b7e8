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

    src/timing/latency.rs

    Rolling window latency statistics
*/

//! Rolling statistics over per-bit latencies, and extraction of anomalous regions.

use crate::timing::{LatencyKind, TimingConfig, TimingRegion};

/// Running sums over a latency slice, for constant time window averages.
pub(crate) struct LatencyWindow {
    sums: Vec<f64>,
    squares: Vec<f64>,
}

impl LatencyWindow {
    pub(crate) fn new(latency: &[f64]) -> Self {
        let mut sums = Vec::with_capacity(latency.len() + 1);
        let mut squares = Vec::with_capacity(latency.len() + 1);
        let mut sum = 0.0;
        let mut square = 0.0;
        sums.push(sum);
        squares.push(square);
        for l in latency {
            sum += l;
            square += l * l;
            sums.push(sum);
            squares.push(square);
        }
        LatencyWindow { sums, squares }
    }

    /// Return the mean and standard deviation of the latencies in `start..end`.
    pub(crate) fn stats(&self, start: usize, end: usize) -> (f64, f64) {
        let n = end.saturating_sub(start);
        if n == 0 {
            return (0.0, 0.0);
        }
        let mean = (self.sums[end] - self.sums[start]) / n as f64;
        let variance = (self.squares[end] - self.squares[start]) / n as f64 - mean * mean;
        (mean, variance.max(0.0).sqrt())
    }

    /// Return the mean of the window of `window` bits centered on `bit`.
    pub(crate) fn centered_mean(&self, bit: usize, window: usize) -> f64 {
        let len = self.sums.len() - 1;
        let half = window / 2;
        let start = bit.saturating_sub(half);
        let end = (bit + half + 1).min(len);
        self.stats(start, end).0
    }
}

/// Mark each bit whose centered rolling average deviates from `nominal` by more than the
/// configured threshold.
pub(crate) fn anomalous_bits(window: &LatencyWindow, len: usize, nominal: f64, config: &TimingConfig) -> Vec<bool> {
    (0..len)
        .map(|bit| {
            let avg = window.centered_mean(bit, config.window_bits);
            ((avg - nominal) / nominal * 100.0).abs() > config.anomaly_threshold_pct
        })
        .collect()
}

/// Group anomalous bits into regions, merging runs separated by small gaps and dropping runs
/// that are too short.
pub(crate) fn find_regions(
    latency: &[f64],
    window: &LatencyWindow,
    anomalous: &[bool],
    nominal: f64,
    config: &TimingConfig,
) -> Vec<TimingRegion> {
    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut run_start = None;
    for (bit, &flag) in anomalous.iter().enumerate() {
        match (flag, run_start) {
            (true, None) => run_start = Some(bit),
            (false, Some(start)) => {
                runs.push((start, bit));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push((start, anomalous.len()));
    }

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(runs.len());
    for (start, end) in runs {
        match merged.last_mut() {
            Some(last) if start - last.1 <= config.merge_gap_bits => last.1 = end,
            _ => merged.push((start, end)),
        }
    }

    merged
        .into_iter()
        .filter(|(start, end)| end - start >= config.min_region_bits && *end <= latency.len())
        .map(|(start, end)| {
            let (avg_latency, std_dev) = window.stats(start, end);
            let deviation_pct = (avg_latency - nominal) / nominal * 100.0;
            let kind = if deviation_pct > config.anomaly_threshold_pct {
                LatencyKind::Long
            }
            else if deviation_pct < -config.anomaly_threshold_pct {
                LatencyKind::Short
            }
            else {
                LatencyKind::Variable
            };
            TimingRegion {
                start,
                end,
                avg_latency,
                deviation_pct,
                density_ratio: avg_latency / nominal,
                std_dev,
                kind,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_stats() {
        let window = LatencyWindow::new(&[1.0, 2.0, 3.0, 4.0]);
        let (mean, std) = window.stats(0, 4);
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((std - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(window.stats(2, 2), (0.0, 0.0));
        // Window is clipped at the ends
        assert!((window.centered_mean(0, 2) - 1.5).abs() < 1e-12);
    }

    #[test]
    fn regions_merge_and_filter() {
        let config = TimingConfig {
            min_region_bits: 4,
            merge_gap_bits: 2,
            ..TimingConfig::default()
        };
        let mut flags = vec![false; 40];
        for i in (5..8).chain(9..12).chain(30..32) {
            flags[i] = true;
        }
        let latency = vec![1.0; 40];
        let window = LatencyWindow::new(&latency);
        let regions = find_regions(&latency, &window, &flags, 1.0, &config);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].start, regions[0].end), (5, 12));
        assert_eq!(regions[0].kind, LatencyKind::Variable);
    }
}
