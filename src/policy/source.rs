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

//! Sources of flux revolutions.

use crate::{flux::flux_revolution::FluxRevolution, types::DiskCh, FluxRescueError};

/// Supplies revolutions of a track to a [super::TrackController].
///
/// A capture device implementation reads `count` more revolutions from the drive. An image
/// implementation returns revolutions it already holds. Returning fewer than `count` revolutions
/// tells the controller the source is exhausted; it will not ask for more.
pub trait RevolutionSource {
    fn next_revolutions(&mut self, ch: DiskCh, count: usize) -> Result<Vec<FluxRevolution>, FluxRescueError>;
}

/// A [RevolutionSource] serving revolutions that were captured in advance, such as those read
/// from a flux image.
#[derive(Clone, Debug, Default)]
pub struct CapturedTrack {
    revolutions: Vec<FluxRevolution>,
    cursor: usize,
}

impl CapturedTrack {
    pub fn new(revolutions: Vec<FluxRevolution>) -> Self {
        CapturedTrack { revolutions, cursor: 0 }
    }

    /// The number of revolutions not yet served.
    pub fn remaining(&self) -> usize {
        self.revolutions.len() - self.cursor
    }

    pub fn len(&self) -> usize {
        self.revolutions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revolutions.is_empty()
    }

    /// Serve the revolutions again from the first.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl From<Vec<FluxRevolution>> for CapturedTrack {
    fn from(revolutions: Vec<FluxRevolution>) -> Self {
        CapturedTrack::new(revolutions)
    }
}

impl RevolutionSource for CapturedTrack {
    fn next_revolutions(&mut self, ch: DiskCh, count: usize) -> Result<Vec<FluxRevolution>, FluxRescueError> {
        let end = (self.cursor + count).min(self.revolutions.len());
        let revs = self.revolutions[self.cursor..end].to_vec();
        for rev in &revs {
            if rev.ch != ch {
                log::warn!(
                    "CapturedTrack::next_revolutions(): Revolution of track {} served for track {}",
                    rev.ch,
                    ch
                );
            }
        }
        self.cursor = end;
        Ok(revs)
    }
}
