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

    src/types/enums.rs

    Defines common enum types
*/

use std::{
    fmt,
    fmt::{Display, Formatter},
};

/// The type of data encoding used by a track.
/// fluxrescue supports two types of data encodings:
/// * Fm: Frequency Modulation encoding. Used by older 8" diskettes, and 'duplication mark' tracks
///   on some 3.5" and 5.25" diskettes.
/// * Mfm: Modified Frequency Modulation encoding. Used by almost all PC 5.25" and 3.5" diskettes.
///
/// For both encodings a data bit is stored as a clock bit followed by a data bit, so one decoded
/// byte occupies 16 bits of the bitstream.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq, Hash, strum::EnumIter, strum::EnumString)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(ascii_case_insensitive)]
pub enum TrackDataEncoding {
    #[doc = "Frequency Modulation encoding. Used by older 8&quot; diskettes, and duplication tracks on some 5.25&quot; diskettes."]
    Fm,
    #[default]
    #[doc = "Modified Frequency Modulation encoding. Used by almost all 5.25&quot; and 3.5&quot; diskettes."]
    Mfm,
}

impl TrackDataEncoding {
    /// The number of bitstream bits used to encode one byte.
    pub fn byte_size(&self) -> usize {
        16
    }

    /// The number of bits of an address marker, counted back from the final bit of the mark byte.
    /// For MFM this covers the three sync words and the mark. FM markers are a single clocked byte.
    pub fn marker_size(&self) -> usize {
        match self {
            TrackDataEncoding::Fm => 16,
            TrackDataEncoding::Mfm => 64,
        }
    }

    /// The number of encoded bit cells between two flux transitions that the encoding permits,
    /// as an inclusive (min, max) pair.
    pub fn legal_run(&self) -> (u64, u64) {
        match self {
            TrackDataEncoding::Fm => (1, 2),
            TrackDataEncoding::Mfm => (2, 4),
        }
    }

    /// The multiple of the base (MFM) bit cell period used by the PLL for this encoding.
    pub fn cell_multiplier(&self) -> f64 {
        match self {
            TrackDataEncoding::Fm => 2.0,
            TrackDataEncoding::Mfm => 1.0,
        }
    }

    /// The number of sync bytes written before an address marker in a standard layout.
    pub fn sync_len(&self) -> usize {
        match self {
            TrackDataEncoding::Fm => 6,
            TrackDataEncoding::Mfm => 12,
        }
    }
}

impl Display for TrackDataEncoding {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            TrackDataEncoding::Fm => write!(f, "FM"),
            TrackDataEncoding::Mfm => write!(f, "MFM"),
        }
    }
}

/// The density of data recording on a disk track.
///
/// * `Standard` density: typically referring to FM encoding, typically used by 8" diskettes.
/// * `Double` density: typically referring to MFM encoding at 250/300Kbps. Appeared on 5.25" and 3.5" diskettes.
/// * `High` density: typically referring to MFM encoding at 500Kbps. Appeared on 5.25" and 3.5" diskettes.
/// * `Extended` density: typically referring to MFM encoding at 1Mbps. Appeared on 3.5" diskettes.
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrackDensity {
    Standard,
    #[default]
    Double,
    High,
    Extended,
}

impl Display for TrackDensity {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        use TrackDensity::*;
        match self {
            Standard => write!(f, "Standard"),
            Double => write!(f, "Double"),
            High => write!(f, "High"),
            Extended => write!(f, "Extended"),
        }
    }
}

impl TrackDensity {
    /// Return a value in seconds representing the base clock of a PLL for a given disk density.
    pub fn base_clock(&self) -> f64 {
        match self {
            TrackDensity::Standard => 4e-6,
            TrackDensity::Double => 2e-6,
            TrackDensity::High => 1e-6,
            TrackDensity::Extended => 5e-7,
        }
    }

    /// Attempt to determine the disk density from the base clock of a PLL.
    pub fn from_base_clock(clock: f64) -> Option<TrackDensity> {
        match clock {
            0.375e-6..0.625e-6 => Some(TrackDensity::Extended),
            0.75e-6..1.25e-6 => Some(TrackDensity::High),
            1.5e-6..2.5e-6 => Some(TrackDensity::Double),
            3.0e-6..5.0e-6 => Some(TrackDensity::Standard),
            _ => None,
        }
    }
}

/// The strategy used to combine multiple revolutions of a track into a single bitstream.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString, strum::IntoStaticStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum MergeStrategy {
    /// Use the first revolution as-is.
    First,
    /// Use the revolution with the highest score.
    BestRevolution,
    /// Vote on every bit across all revolutions.
    #[default]
    MajorityVote,
    /// Use the first revolution's bitstream, but select each sector from the revolution that
    /// produced the best copy of it.
    BestSector,
}

/// How the policy controller reacts to errors.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumIter, strum::EnumString, strum::IntoStaticStr,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ErrorMode {
    /// Abandon a track on the first error.
    Strict,
    /// Retry within limits, then report what was recovered.
    #[default]
    Normal,
    /// Recover as much as possible. Keeps every sector copy and permits CRC repair.
    Salvage,
    /// As `Salvage`, and additionally preserve the consensus bitstream and raw revolutions.
    Forensic,
}

impl ErrorMode {
    pub fn keeps_copies(&self) -> bool {
        matches!(self, ErrorMode::Salvage | ErrorMode::Forensic)
    }

    pub fn allows_crc_repair(&self) -> bool {
        matches!(self, ErrorMode::Salvage | ErrorMode::Forensic)
    }

    pub fn preserves_bitstream(&self) -> bool {
        matches!(self, ErrorMode::Forensic)
    }
}

/// An address marker found in a track's bitstream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Marker {
    /// Index Address Marker
    Iam,
    /// ID Address Marker, introducing a sector header
    Idam,
    /// Data Address Marker
    Dam,
    /// Deleted Data Address Marker
    Ddam,
    /// A sync sequence followed by an unrecognized mark byte
    Unknown(u8),
}

impl Marker {
    /// Resolve the mark byte that follows a sync sequence.
    pub fn from_mark(mark: u8) -> Marker {
        match mark {
            0xFC => Marker::Iam,
            0xFE => Marker::Idam,
            0xFB | 0xFA => Marker::Dam,
            0xF8 | 0xF9 => Marker::Ddam,
            _ => Marker::Unknown(mark),
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Marker::Dam | Marker::Ddam)
    }
}

impl Display for Marker {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Marker::Iam => write!(f, "IAM"),
            Marker::Idam => write!(f, "IDAM"),
            Marker::Dam => write!(f, "DAM"),
            Marker::Ddam => write!(f, "DDAM"),
            Marker::Unknown(mark) => write!(f, "Unknown({:02X})", mark),
        }
    }
}
