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

//! # fluxrescue
//!
//! fluxrescue recovers sector data from floppy disk flux captures. A capture is a set of
//! revolutions per physical track, each revolution a list of times between flux transitions.
//!
//! The decode pipeline for a track is:
//!
//! * [flux::pll::Pll] recovers the bit clock of each revolution and produces a
//!   [flux::pll::BitstreamResult] with per-flux classifications and marker events.
//! * [aggregate::Aggregator] combines several revolutions into a consensus bitstream and
//!   a list of [aggregate::WeakBitRegion]s.
//! * [timing::TimingClassifier] looks for regions of non-standard bit cell timing and matches
//!   them against known copy protection signatures.
//! * [sector::extract_sectors] decodes System 34 sector headers and data and scores them.
//! * [policy::TrackController] drives the above, deciding when to read more revolutions,
//!   when to retry with different PLL parameters and when to give up.
//!
//! A [policy::DecodeSession] runs the per-track pipeline for many tracks on a pool of worker
//! threads.

#[macro_use]
pub mod flux;
pub mod aggregate;
pub mod bitstream_codec;
pub mod config;
pub mod diagnosis;
pub mod policy;
pub mod sector;
pub mod timing;
pub mod track_builder;
pub mod track_record;
pub mod types;

use std::hash::RandomState;

use thiserror::Error;

pub const MAXIMUM_SECTOR_SIZE: usize = 8192;
pub const DEFAULT_SECTOR_SIZE: usize = 512;

#[allow(unused)]
type RescueHashMap<K, V, S = RandomState> = std::collections::HashMap<K, V, S>;
#[allow(unused)]
type RescueHashSet<T, S = RandomState> = std::collections::HashSet<T, S>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum FluxRescueError {
    #[error("Invalid value for configuration parameter '{param}': {reason}")]
    InvalidConfig { param: &'static str, reason: String },
    #[error("Invalid parameters were specified to a library function")]
    ParameterError,
    #[error("No revolutions were available to decode track {0}")]
    NoRevolutions(DiskCh),
    #[error("Decoding of track {0} was abandoned")]
    Abandoned(DiskCh),
    #[error("The capture source reported an error: {0}")]
    CaptureError(String),
    #[error("Failed to allocate a decode buffer: {0}")]
    ResourceError(String),
    #[error("The decode operation was cancelled")]
    Cancelled,
    #[error("A decode worker thread terminated unexpectedly")]
    WorkerPanic,
}

impl From<std::collections::TryReserveError> for FluxRescueError {
    fn from(err: std::collections::TryReserveError) -> Self {
        FluxRescueError::ResourceError(err.to_string())
    }
}

pub use crate::{
    config::{QualityConfig, QualityConfigBuilder, QualityPreset},
    diagnosis::{Diagnosis, DiagnosisCode},
    flux::{
        flux_revolution::FluxRevolution,
        pll::{BitstreamResult, Pll, PllConfig, PllPreset},
    },
    policy::{CapturedTrack, DecodeSession, RevolutionSource, TrackController, TrackState},
    sector::{SectorData, SectorRecord},
    track_record::TrackRecord,
    types::{DiskCh, DiskChsn, ErrorMode, MergeStrategy, TrackDataEncoding},
};

pub mod prelude {
    pub use crate::{
        aggregate::{Aggregator, WeakBitRegion},
        config::{ConfigParam, QualityConfig, QualityConfigBuilder, QualityPreset},
        diagnosis::{Diagnosis, DiagnosisCode},
        flux::{
            flux_revolution::{DecodeParams, FluxRevolution},
            pll::{BitstreamResult, MarkerEvent, Pll, PllConfig, PllPreset},
            FluxTransition,
        },
        policy::{CapturedTrack, DecodeSession, RevolutionSource, TrackController, TrackState},
        sector::{extract_sectors, SectorData, SectorRecord},
        timing::{TimingAnalysis, TimingClassifier},
        track_builder::{SectorSpec, TrackBuilder},
        track_record::TrackRecord,
        types::{DiskCh, DiskChsn, ErrorMode, Marker, MergeStrategy, RetryTriggers, TrackDataEncoding, TrackFlags},
        FluxRescueError,
    };
}
