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

    src/flux/pll.rs

    Phase-locked loop for recovering bitstreams from flux transitions
*/

//! A software phase-locked loop that recovers the bit clock of a revolution of flux transitions
//! and produces a bitstream.
//!
//! The PLL keeps a virtual clock that ticks at the working bit cell period. For every flux
//! transition, the clock is ticked until it passes the arrival time of the transition, and one
//! bit is emitted per tick: zeros for every tick but the last, and a one for the tick in which
//! the transition arrived. The position of the transition within its window produces a phase
//! error, which is used to nudge the phase of the clock and, once it has kept the same sign for
//! a while, its frequency.

use bit_vec::BitVec;

use crate::{
    bitstream_codec::{
        decode_word,
        fm::{FmCodec, FM_MARKER_LEN, FM_SYNC_WORD},
        mfm::{MFM_A1_SYNC, MFM_C2_SYNC, MFM_MARKER_LEN, MFM_MARKER_MASK},
    },
    flux::{flux_revolution::FluxRevolution, FluxStats, FluxTransition},
    types::{Marker, TrackDataEncoding},
    FluxRescueError,
};

/// A record of the PLL state at the arrival of a single flux transition.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PllDecodeStatEntry {
    /// The arrival time of the transition since the start of the revolution.
    pub time: f64,
    /// The flux delta time.
    pub len: f64,
    /// The arrival time predicted by the clock.
    pub predicted: f64,
    /// The working clock period.
    pub clk: f64,
    pub window_min: f64,
    pub window_max: f64,
    pub phase_err: f64,
    /// The phase error used for the phase adjustment.
    pub phase_err_i: f64,
    /// The offset of the bit emitted for this transition, or of the last bit emitted before it.
    pub bit_offset: usize,
}

/// Tunable parameters for the PLL.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PllConfig {
    /// Fraction of the phase error applied to the clock period once the adjust gate is open.
    pub clock_gain: f64,
    /// Fraction of the phase error applied to the clock phase.
    pub phase_gain: f64,
    /// Maximum deviation of the working period from the nominal period, as a fraction.
    pub max_adjust: f64,
    /// Number of consecutive same-signed phase errors required before the clock period is adjusted.
    pub gate_threshold: u32,
    /// Half-width of a classification band, as a fraction of a bit cell.
    pub classify_tolerance: f64,
    /// Resolution of the capture device in seconds. Widens classification bands when coarser
    /// than the tolerance.
    pub capture_resolution: Option<f64>,
    /// Collect a [PllDecodeStatEntry] for every transition.
    pub collect_stats: bool,
}

impl Default for PllConfig {
    fn default() -> Self {
        PllConfig {
            clock_gain: 0.05,
            phase_gain: 0.65,
            max_adjust: 0.15,
            gate_threshold: 1,
            classify_tolerance: 0.25,
            capture_resolution: None,
            collect_stats: true,
        }
    }
}

/// Alternate PLL tunings used when a track is re-decoded.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, strum::Display, strum::EnumIter)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PllPreset {
    #[default]
    Default,
    /// Fast clock tracking for tracks with large speed variation.
    Aggressive,
    /// Slow clock tracking for tracks with noisy transitions.
    Conservative,
    /// Wider period range and classification bands.
    Wide,
}

impl PllPreset {
    const RETRY_SEQUENCE: [PllPreset; 4] = [
        PllPreset::Default,
        PllPreset::Aggressive,
        PllPreset::Conservative,
        PllPreset::Wide,
    ];

    /// Return the preset used for the given decode attempt.
    pub fn for_attempt(attempt: usize) -> PllPreset {
        Self::RETRY_SEQUENCE[attempt % Self::RETRY_SEQUENCE.len()]
    }

    /// Derive a configuration from `base` according to this preset.
    pub fn apply(&self, base: &PllConfig) -> PllConfig {
        match self {
            PllPreset::Default => base.clone(),
            PllPreset::Aggressive => PllConfig {
                clock_gain: (base.clock_gain * 2.0).min(1.0),
                phase_gain: (base.phase_gain * 1.3).min(1.0),
                gate_threshold: 0,
                ..base.clone()
            },
            PllPreset::Conservative => PllConfig {
                clock_gain: base.clock_gain * 0.5,
                phase_gain: base.phase_gain * 0.7,
                gate_threshold: base.gate_threshold + 2,
                ..base.clone()
            },
            PllPreset::Wide => PllConfig {
                max_adjust: (base.max_adjust * 2.0).min(0.5),
                classify_tolerance: (base.classify_tolerance * 1.4).min(0.5),
                ..base.clone()
            },
        }
    }
}

/// An address marker found while decoding.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MarkerEvent {
    /// Offset of the first bit of the marker. For MFM this is the first bit of the sync words,
    /// for FM the first bit of the clocked mark byte.
    pub bit_offset: usize,
    pub marker: Marker,
    /// The decoded mark byte.
    pub mark: u8,
    /// The contents of the shift register when the marker was matched.
    pub pattern: u64,
    /// The time at which the final bit of the marker was decoded.
    pub time: f64,
}

/// The output of decoding a single revolution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitstreamResult {
    pub encoding: TrackDataEncoding,
    /// The nominal bit cell period used to emit bits, in seconds.
    pub cell_period: f64,
    /// The working period of the PLL at the end of the revolution.
    pub final_period: f64,
    pub bits: BitVec,
    /// One classification per accepted flux transition.
    pub transitions: Vec<FluxTransition>,
    /// One entry per accepted flux transition, if collected.
    pub pll_stats: Option<Vec<PllDecodeStatEntry>>,
    pub markers: Vec<MarkerEvent>,
    /// The time attributed to each bit.
    pub latency: Vec<f64>,
    pub flux_stats: FluxStats,
}

impl BitstreamResult {
    /// Create an empty result.
    pub fn empty(encoding: TrackDataEncoding, cell_period: f64) -> Self {
        BitstreamResult {
            encoding,
            cell_period,
            final_period: cell_period,
            bits: BitVec::new(),
            transitions: Vec::new(),
            pll_stats: None,
            markers: Vec::new(),
            latency: Vec::new(),
            flux_stats: FluxStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Return the SHA1 digest of the bitstream.
    pub fn digest(&self) -> [u8; 20] {
        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(&(self.bits.len() as u64).to_le_bytes());
        hasher.update(&self.bits.to_bytes());
        hasher.digest().bytes()
    }

    /// Iterate over the markers of a specific kind.
    pub fn markers_of(&self, marker: Marker) -> impl Iterator<Item = &MarkerEvent> {
        self.markers.iter().filter(move |m| m.marker == marker)
    }

    /// Return the stat entries of the transitions that emitted bits in the range `start..end`.
    pub fn pll_stats_in(&self, start: usize, end: usize) -> &[PllDecodeStatEntry] {
        match &self.pll_stats {
            Some(stats) => {
                let lo = stats.partition_point(|e| e.bit_offset < start);
                let hi = stats.partition_point(|e| e.bit_offset < end);
                &stats[lo..hi.max(lo)]
            }
            None => &[],
        }
    }
}

/// Scans a stream of bits for address markers.
pub(crate) struct MarkerScanner {
    encoding:  TrackDataEncoding,
    shift_reg: u64,
}

impl MarkerScanner {
    pub(crate) fn new(encoding: TrackDataEncoding) -> Self {
        MarkerScanner { encoding, shift_reg: 0 }
    }

    /// Shift in a bit. `bit_ct` is the number of bits in the stream including this one.
    /// Returns the offset, kind, mark byte and pattern of a marker ending at this bit.
    pub(crate) fn push(&mut self, bit: bool, bit_ct: usize) -> Option<(usize, Marker, u8, u64)> {
        self.shift_reg = (self.shift_reg << 1) | bit as u64;
        match self.encoding {
            TrackDataEncoding::Mfm => {
                if bit_ct < MFM_MARKER_LEN {
                    return None;
                }
                let sync = self.shift_reg & MFM_MARKER_MASK;
                let mark = decode_word(self.shift_reg as u16);
                if sync == MFM_A1_SYNC {
                    Some((bit_ct - MFM_MARKER_LEN, Marker::from_mark(mark), mark, self.shift_reg))
                }
                else if sync == MFM_C2_SYNC && mark == 0xFC {
                    Some((bit_ct - MFM_MARKER_LEN, Marker::Iam, mark, self.shift_reg))
                }
                else {
                    None
                }
            }
            TrackDataEncoding::Fm => {
                if bit_ct < FM_MARKER_LEN * 2 || (self.shift_reg >> 16) as u16 != FM_SYNC_WORD {
                    return None;
                }
                FmCodec::match_mark(self.shift_reg as u16).map(|mark| {
                    (
                        bit_ct - FM_MARKER_LEN,
                        Marker::from_mark(mark),
                        mark,
                        self.shift_reg & 0xFFFF_FFFF,
                    )
                })
            }
        }
    }
}

/// Scan a complete bitstream for markers. Marker times are taken from the running sum of
/// `latency`, if it covers the bitstream.
pub fn scan_markers(bits: &BitVec, encoding: TrackDataEncoding, latency: &[f64]) -> Vec<MarkerEvent> {
    let mut scanner = MarkerScanner::new(encoding);
    let mut markers = Vec::new();
    let mut time = 0.0;
    for (i, bit) in bits.iter().enumerate() {
        time += latency.get(i).copied().unwrap_or(0.0);
        if let Some((bit_offset, marker, mark, pattern)) = scanner.push(bit, i + 1) {
            markers.push(MarkerEvent {
                bit_offset,
                marker,
                mark,
                pattern,
                time,
            });
        }
    }
    markers
}

pub struct Pll {
    config: PllConfig,
    encoding: TrackDataEncoding,
    /// The nominal bit cell period of the encoding in seconds.
    period: f64,
    working_period: f64,
}

impl Pll {
    /// Create a PLL for decoding a single revolution.
    /// `base_period` is the MFM bit cell period of the track, in seconds. FM tracks are decoded
    /// with twice this period.
    pub fn new(base_period: f64, encoding: TrackDataEncoding, config: PllConfig) -> Result<Self, FluxRescueError> {
        if !(base_period.is_finite() && base_period > 0.0) {
            log::error!("Pll::new(): Invalid bit cell period: {}", base_period);
            return Err(FluxRescueError::ParameterError);
        }
        let period = base_period * encoding.cell_multiplier();
        log::trace!(
            "Pll::new(): {} decoder with period {}, max adjust: {:.2}",
            encoding,
            format_us!(period),
            config.max_adjust
        );
        Ok(Pll {
            config,
            encoding,
            period,
            working_period: period,
        })
    }

    pub fn encoding(&self) -> TrackDataEncoding {
        self.encoding
    }

    /// The nominal bit cell period used to emit bits.
    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn working_period(&self) -> f64 {
        self.working_period
    }

    fn tolerance(&self) -> f64 {
        let tolerance = self.config.classify_tolerance * self.period;
        match self.config.capture_resolution {
            Some(resolution) => tolerance.max(resolution),
            None => tolerance,
        }
    }

    /// Classify a flux delta time against the nominal transition lengths of the encoding.
    pub fn classify_delta(&self, delta: f64) -> FluxTransition {
        let tolerance = self.tolerance();
        let (min_cells, max_cells) = self.encoding.legal_run();
        let short = self.period * min_cells as f64;
        let long = self.period * max_cells as f64;

        if delta < short - tolerance {
            return FluxTransition::TooShort;
        }
        if delta > long + tolerance {
            return FluxTransition::TooLong;
        }
        if (delta - short).abs() <= tolerance {
            return FluxTransition::Short;
        }
        if (delta - long).abs() <= tolerance {
            return FluxTransition::Long;
        }
        if matches!(self.encoding, TrackDataEncoding::Mfm) && (delta - (short + long) / 2.0).abs() <= tolerance {
            return FluxTransition::Medium;
        }
        FluxTransition::Other
    }

    /// Decode a revolution into a bitstream.
    pub fn decode(&mut self, revolution: &FluxRevolution) -> Result<BitstreamResult, FluxRescueError> {
        let ft_ct = revolution.ft_ct();
        let mut result = BitstreamResult::empty(self.encoding, self.period);
        if ft_ct == 0 {
            log::debug!("Pll::decode(): Empty revolution");
            return Ok(result);
        }

        // Allocation failures are reported as ResourceError.
        let mut transitions = Vec::new();
        transitions.try_reserve_exact(ft_ct)?;
        let mut latency = Vec::new();
        latency.try_reserve(ft_ct * 3)?;
        let mut pll_stats = Vec::new();
        if self.config.collect_stats {
            pll_stats.try_reserve_exact(ft_ct)?;
        }
        let mut output_bits = BitVec::with_capacity(ft_ct * 3);
        let mut markers = Vec::new();
        let mut scanner = MarkerScanner::new(self.encoding);
        let mut flux_stats = FluxStats::default();

        let (min_cells, max_cells) = self.encoding.legal_run();
        let min_clock = self.period - (self.period * self.config.max_adjust);
        let max_clock = self.period + (self.period * self.config.max_adjust);
        self.working_period = self.period;

        // The first entry of the flux stream represents a transition time, so we start off the
        // track at the first actual flux transition. We will assume that this transition is
        // perfectly aligned within the center of the clock period by adding half the period
        // from the start time.
        let valid_deltas: Vec<f64> = revolution
            .delta_iter()
            .copied()
            .filter(|d| d.is_finite() && *d > 0.0)
            .collect();
        let densities = local_densities(&valid_deltas, self.period, (min_cells, max_cells));
        let mut valid_ct = 0;

        let mut time = self.period / 2.0;
        let mut last_flux_time = 0.0;
        let mut phase_error: f64 = 0.0;
        let mut phase_adjust: f64 = 0.0;
        let mut adjust_gate: i32 = 0;

        // Each delta time represents the time in seconds between two flux transitions.
        for (flux_ct, &delta_time) in revolution.delta_iter().enumerate() {
            if !(delta_time.is_finite() && delta_time > 0.0) {
                log::trace!("Pll::decode(): Rejected flux #{}: {}", flux_ct, delta_time);
                flux_stats.rejected += 1;
                continue;
            }

            let density = densities.get(valid_ct).copied().flatten();
            valid_ct += 1;
            let this_flux_time = last_flux_time + delta_time;

            // Tick the clock until we *pass* the time of the next flux transition.
            time += phase_adjust;
            let tick_start = time;
            let mut clock_ticks: u64 = 0;
            match density.filter(|cell| (cell / self.working_period - 1.0).abs() > self.config.max_adjust) {
                Some(cell) => {
                    // The clock cannot follow this region. Count cells against the local density
                    // and re-center the clock on the transition.
                    clock_ticks = quantize(delta_time, cell, (min_cells, max_cells)).0;
                    time = this_flux_time + self.working_period / 2.0;
                }
                None => {
                    while time < this_flux_time {
                        time += self.working_period;
                        clock_ticks += 1;
                    }
                }
            }

            let transition = self.classify_delta(delta_time);
            if matches!(transition, FluxTransition::TooLong) {
                log::trace!(
                    "Pll::decode(): Too slow flux detected: #{} @({}), dt: {}, clocks: {}",
                    flux_ct,
                    format_ms!(time),
                    format_us!(delta_time),
                    clock_ticks,
                );
            }
            flux_stats.record(transition, delta_time, clock_ticks.saturating_sub(max_cells));
            transitions.push(transition);

            // Attribute the flux delta evenly over the bit cells it spans at the local density.
            let (cells, _) = quantize(delta_time, density.unwrap_or(self.working_period), (min_cells, max_cells));
            let bit_latency = delta_time / cells as f64;

            // Emit 0's and 1's based on the number of clock ticks since last flux transition.
            for tick in 0..clock_ticks {
                let bit = tick == clock_ticks - 1;
                output_bits.push(bit);
                latency.push(bit_latency);
                if let Some((bit_offset, marker, mark, pattern)) = scanner.push(bit, output_bits.len()) {
                    let marker_time = tick_start + (tick + 1) as f64 * self.working_period;
                    log::trace!(
                        "Pll::decode(): {} marker detected at {}, bitcell: {}",
                        marker,
                        format_ms!(marker_time),
                        bit_offset
                    );
                    markers.push(MarkerEvent {
                        bit_offset,
                        marker,
                        mark,
                        pattern,
                        time: marker_time,
                    });
                }
            }

            // Transition should be somewhere within our last clock period, ideally in the center
            // of it. The window is measured from the previous transition.
            let window_max = (time - this_flux_time) + delta_time;
            let window_min = window_max - self.working_period;
            let window_center = window_max - self.working_period / 2.0;

            let last_phase_error = phase_error;
            phase_error = delta_time - window_center;

            if phase_error < 0.0 {
                if adjust_gate < 0 {
                    adjust_gate -= 1;
                }
                else {
                    adjust_gate = -1;
                }
            }
            else if adjust_gate > 0 {
                adjust_gate += 1;
            }
            else {
                adjust_gate = 1;
            }

            // A single off-center flux says nothing about the clock rate, so phase is corrected
            // with the smaller of the last two errors.
            let min_phase_error = if phase_error.abs() < last_phase_error.abs() {
                phase_error
            }
            else {
                last_phase_error
            };

            if self.config.collect_stats {
                pll_stats.push(PllDecodeStatEntry {
                    time: this_flux_time,
                    len: delta_time,
                    predicted: last_flux_time + window_center,
                    clk: self.working_period,
                    window_min,
                    window_max,
                    phase_err: phase_error,
                    phase_err_i: min_phase_error,
                    bit_offset: output_bits.len().saturating_sub(1),
                });
            }

            phase_adjust = self.config.phase_gain * min_phase_error;

            // Only adjust the clock after several errors in the same direction.
            if adjust_gate.unsigned_abs() > self.config.gate_threshold {
                let clk_adjust = self.config.clock_gain * phase_error;
                self.working_period = (self.working_period + clk_adjust).clamp(min_clock, max_clock);
            }

            last_flux_time = this_flux_time;
        }

        log::debug!(
            "Pll::decode(): {} fluxes -> {} bits, {} markers, final period {} ({})",
            ft_ct,
            output_bits.len(),
            markers.len(),
            format_us!(self.working_period),
            flux_stats
        );

        result.final_period = self.working_period;
        result.bits = output_bits;
        result.transitions = transitions;
        result.pll_stats = self.config.collect_stats.then_some(pll_stats);
        result.markers = markers;
        result.latency = latency;
        result.flux_stats = flux_stats;
        Ok(result)
    }
}

/// Fluxes on each side of a transition considered when estimating the local density.
const DENSITY_WINDOW: usize = 8;

/// Quantize `delta` to a legal number of cells of length `cell`, returning the cell count and the
/// distance in cells from the unrounded ratio.
fn quantize(delta: f64, cell: f64, (min_cells, max_cells): (u64, u64)) -> (u64, f64) {
    let ratio = delta / cell;
    let cells = (ratio.round().max(0.0) as u64).clamp(min_cells, max_cells);
    (cells, (ratio - cells as f64).abs())
}

/// Estimate a local bit cell length for each flux delta from the shortest delta around it.
///
/// Regions written at another density quantize badly against the nominal period. The shortest
/// delta in the window is taken as a run of the minimum legal length, and the cell length it
/// implies is kept where it fits the window and the delta itself better than `period` does.
fn local_densities(deltas: &[f64], period: f64, run: (u64, u64)) -> Vec<Option<f64>> {
    let min_cells = run.0.max(1) as f64;
    (0..deltas.len())
        .map(|i| {
            let window = &deltas[i.saturating_sub(DENSITY_WINDOW)..(i + DENSITY_WINDOW + 1).min(deltas.len())];
            let local = window.iter().copied().fold(f64::INFINITY, f64::min) / min_cells;
            if !local.is_finite() || (local / period - 1.0).abs() < 0.02 {
                return None;
            }
            let score = |cell: f64| {
                let window_err: f64 = window.iter().map(|&d| quantize(d, cell, run).1).sum();
                window_err / window.len() as f64 + quantize(deltas[i], cell, run).1
            };
            (score(local) < score(period)).then_some(local)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiskCh;

    fn rev(deltas: &[f64]) -> FluxRevolution {
        FluxRevolution::from_f64(DiskCh::new(0, 0), deltas, 0.2)
    }

    #[test]
    fn classify_mfm() {
        let pll = Pll::new(2e-6, TrackDataEncoding::Mfm, PllConfig::default()).unwrap();
        assert_eq!(pll.classify_delta(4.1e-6), FluxTransition::Short);
        assert_eq!(pll.classify_delta(5.8e-6), FluxTransition::Medium);
        assert_eq!(pll.classify_delta(8.3e-6), FluxTransition::Long);
        assert_eq!(pll.classify_delta(2.0e-6), FluxTransition::TooShort);
        assert_eq!(pll.classify_delta(12.0e-6), FluxTransition::TooLong);
        assert_eq!(pll.classify_delta(5.0e-6), FluxTransition::Other);
    }

    #[test]
    fn classify_fm() {
        let pll = Pll::new(2e-6, TrackDataEncoding::Fm, PllConfig::default()).unwrap();
        assert_eq!(pll.period(), 4e-6);
        assert_eq!(pll.classify_delta(4e-6), FluxTransition::Short);
        assert_eq!(pll.classify_delta(8e-6), FluxTransition::Long);
        assert_eq!(pll.classify_delta(6e-6), FluxTransition::Other);
    }

    #[test]
    fn capture_resolution_widens_bands() {
        let config = PllConfig {
            capture_resolution: Some(1e-6),
            ..PllConfig::default()
        };
        let pll = Pll::new(2e-6, TrackDataEncoding::Mfm, config).unwrap();
        assert_eq!(pll.classify_delta(4.9e-6), FluxTransition::Short);
    }

    #[test]
    fn invalid_period() {
        assert!(Pll::new(0.0, TrackDataEncoding::Mfm, PllConfig::default()).is_err());
        assert!(Pll::new(f64::NAN, TrackDataEncoding::Mfm, PllConfig::default()).is_err());
    }

    #[test]
    fn rejected_deltas_emit_nothing() {
        let mut pll = Pll::new(2e-6, TrackDataEncoding::Mfm, PllConfig::default()).unwrap();
        let result = pll.decode(&rev(&[4e-6, 0.0, -3e-6, 4e-6])).unwrap();
        assert_eq!(result.flux_stats.rejected, 2);
        assert_eq!(result.transitions.len(), 2);
        assert_eq!(result.len(), 4);
        assert_eq!(result.latency.len(), result.len());
    }

    #[test]
    fn too_long_flux_emits_all_bits() {
        let mut pll = Pll::new(2e-6, TrackDataEncoding::Mfm, PllConfig::default()).unwrap();
        let result = pll.decode(&rev(&[4e-6, 20e-6, 4e-6])).unwrap();
        assert_eq!(result.transitions[1], FluxTransition::TooLong);
        assert_eq!(result.len(), 2 + 10 + 2);
        assert_eq!(result.flux_stats.too_long, 1);
        // The long flux is still attributed to at most four cells per bit
        assert!((result.latency[5] - 5e-6).abs() < 1e-12);
    }

    #[test]
    fn presets_differ() {
        let base = PllConfig::default();
        assert_eq!(PllPreset::Default.apply(&base), base);
        assert_eq!(PllPreset::Aggressive.apply(&base).gate_threshold, 0);
        assert!(PllPreset::Conservative.apply(&base).clock_gain < base.clock_gain);
        assert!(PllPreset::Wide.apply(&base).max_adjust > base.max_adjust);
        assert_eq!(PllPreset::for_attempt(5), PllPreset::Aggressive);
    }
}
