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

//! The `flux` module turns revolutions of flux transition delta times into bitstreams.

use crate::types::TrackDataEncoding;
use std::{
    fmt,
    fmt::{Display, Formatter},
};

#[doc(hidden)]
#[macro_export]
macro_rules! format_us {
    ($value:expr) => {
        format!("{:.4}μs", $value * 1_000_000.0)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! format_ms {
    ($value:expr) => {
        format!("{:.4}ms", $value * 1_000.0)
    };
}

pub mod flux_revolution;
pub mod histogram;
pub mod pll;

pub use flux_revolution::FluxRevolutionType;

/// The classification of a single flux transition by its delta time.
/// Short, Medium and Long correspond to 2, 3 and 4 MFM bit cells, or to 1 and 2 FM bit cells
/// (FM has no medium transition).
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FluxTransition {
    Short,
    Medium,
    Long,
    TooShort,
    TooLong,
    Other,
}

impl Display for FluxTransition {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            FluxTransition::Short => write!(f, "S"),
            FluxTransition::Medium => write!(f, "M"),
            FluxTransition::Long => write!(f, "L"),
            FluxTransition::TooShort => write!(f, "s"),
            FluxTransition::TooLong => write!(f, "l"),
            FluxTransition::Other => write!(f, "X"),
        }
    }
}

impl FluxTransition {
    /// Return true if the transition falls within one of the encoding's legal bands.
    pub fn is_valid(&self) -> bool {
        matches!(self, FluxTransition::Short | FluxTransition::Medium | FluxTransition::Long)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FluxStats {
    pub total: u32,
    pub short: u32,
    pub short_time: f64,
    pub medium: u32,
    pub long: u32,
    pub too_short: u32,
    pub too_long: u32,
    pub too_slow_bits: u32,
    pub other: u32,
    /// Deltas that were zero, negative or not finite and were not decoded
    pub rejected: u32,

    pub shortest_flux: f64,
    pub longest_flux:  f64,
}

impl Display for FluxStats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "Total: {} S: {} M: {} L: {} Shortest: {} Longest: {} Too Short: {} Too Long: {} Other: {} Rejected: {}",
            self.total,
            self.short,
            self.medium,
            self.long,
            format_us!(self.shortest_flux),
            format_us!(self.longest_flux),
            self.too_short,
            self.too_long,
            self.other,
            self.rejected
        )
    }
}

impl FluxStats {
    pub(crate) fn record(&mut self, transition: FluxTransition, delta: f64, bits: u64) {
        self.total += 1;
        if self.total == 1 || delta < self.shortest_flux {
            self.shortest_flux = delta;
        }
        if delta > self.longest_flux {
            self.longest_flux = delta;
        }
        match transition {
            FluxTransition::Short => {
                self.short += 1;
                self.short_time += delta;
            }
            FluxTransition::Medium => self.medium += 1,
            FluxTransition::Long => self.long += 1,
            FluxTransition::TooShort => self.too_short += 1,
            FluxTransition::TooLong => {
                self.too_long += 1;
                self.too_slow_bits += bits as u32;
            }
            FluxTransition::Other => self.other += 1,
        }
    }

    /// Return the average time of short transitions.
    pub fn short_avg(&self) -> f64 {
        if self.short == 0 {
            0.0
        }
        else {
            self.short_time / self.short as f64
        }
    }

    /// Return the fraction of transitions that fell outside every legal band.
    pub fn invalid_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        }
        else {
            (self.too_short + self.too_long + self.other) as f64 / self.total as f64
        }
    }

    /// Guess the encoding of a track from its transition statistics, as decoded with MFM bands.
    pub fn detect_encoding(&self) -> Option<TrackDataEncoding> {
        if self.total == 0 {
            return None;
        }
        let medium_freq = self.medium as f64 / self.total as f64;

        // If we have fewer than 5% medium transitions, it is likely an FM track
        if medium_freq > 0.05 {
            Some(TrackDataEncoding::Mfm)
        }
        else {
            Some(TrackDataEncoding::Fm)
        }
    }
}
