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

//! Diagnoses record problems found while decoding a track. They are informational: quality
//! problems never abort a decode on their own, but they drive the retry policy and are returned
//! with the final [crate::TrackRecord].

use std::fmt::{Display, Formatter};

use crate::types::DiskCh;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::IntoStaticStr)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiagnosisCode {
    /// A sector header was not preceded by a full run of sync bytes.
    MissingSync,
    IdCrcError,
    DataCrcError,
    /// A sector header had no data field.
    MissingData,
    /// The PLL clock drifted from the nominal bit cell period.
    TimingDrift,
    WrongSectorCount,
    WeakBits,
    NonStandardTiming,
    ProtectionDetected,
    IndexMissing,
    /// A revolution contained empty or invalid flux data.
    InvalidFlux,
    DuplicateSector,
    /// Sector numbers were not sequential.
    BadSectorChain,
    CrcCorrected,
    Cancelled,
}

impl DiagnosisCode {
    /// Return true if the code describes an error rather than an observation.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            DiagnosisCode::IdCrcError
                | DiagnosisCode::DataCrcError
                | DiagnosisCode::MissingData
                | DiagnosisCode::WrongSectorCount
                | DiagnosisCode::InvalidFlux
        )
    }
}

/// A problem found on a track.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnosis {
    pub code: DiagnosisCode,
    pub ch: DiskCh,
    /// The sector number the diagnosis applies to, if any.
    pub sector: Option<u8>,
    pub message: String,
    /// The score of the affected sector or track when the diagnosis was made.
    pub score: f64,
}

impl Diagnosis {
    pub fn new(code: DiagnosisCode, ch: DiskCh, message: impl Into<String>) -> Self {
        Diagnosis {
            code,
            ch,
            sector: None,
            message: message.into(),
            score: 0.0,
        }
    }

    pub fn with_sector(mut self, sector: u8) -> Self {
        self.sector = Some(sector);
        self
    }

    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }
}

impl Display for Diagnosis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.sector {
            Some(s) => write!(f, "{} {} sector {}: {}", self.code, self.ch, s, self.message),
            None => write!(f, "{} {}: {}", self.code, self.ch, self.message),
        }
    }
}
