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

//! The `policy` module drives the decode pipeline for a track: it pulls revolutions from a
//! [RevolutionSource], decodes, aggregates and extracts them, and decides whether to read more
//! revolutions, retry with other PLL parameters, or stop.

pub mod controller;
pub mod session;
pub mod source;

pub use controller::TrackController;
pub use session::{DecodeSession, SessionStats, SessionStatsSnapshot};
pub use source::{CapturedTrack, RevolutionSource};

/// The state of a [TrackController].
///
/// ```text
/// Idle -> Capturing -> Decoding -> Evaluating -> Done
///             ^            ^            |     -> Abandoned
///             |            |            v
///             +------------+------- Retrying
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackState {
    #[default]
    Idle,
    /// Reading revolutions from the source.
    Capturing,
    /// Decoding revolutions that have not been decoded with the current PLL preset.
    Decoding,
    /// Aggregating, extracting and scoring, then deciding what to do next.
    Evaluating,
    Retrying,
    Done,
    Abandoned,
}

impl TrackState {
    pub fn is_final(&self) -> bool {
        matches!(self, TrackState::Done | TrackState::Abandoned)
    }
}
