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

    src/types/flags.rs

    Defines track and retry policy flags
*/

use bitflags::bitflags;

bitflags! {
    /// Bit flags summarizing the outcome of a track decode.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[rustfmt::skip]
    pub struct TrackFlags: u32 {
        #[doc = "Track contains regions of weak or unstable bits"]
        const WEAK_BITS             = 0b0000_0000_0000_0001;
        #[doc = "Track timing matches a known copy protection signature"]
        const PROTECTED             = 0b0000_0000_0000_0010;
        #[doc = "Track contains regions of non-standard bit cell timing"]
        const NONSTANDARD_TIMING    = 0b0000_0000_0000_0100;
        #[doc = "Track is missing sectors or contains sectors with errors"]
        const INCOMPLETE            = 0b0000_0000_0000_1000;
        #[doc = "One or more sectors were recovered by CRC repair"]
        const CRC_CORRECTED         = 0b0000_0000_0001_0000;
        #[doc = "Decoding was cancelled before the track was complete"]
        const CANCELLED             = 0b0000_0000_0010_0000;
        #[doc = "Decoding of the track was abandoned"]
        const ABANDONED             = 0b0000_0000_0100_0000;
        #[doc = "Track was read without an index signal"]
        const NO_INDEX              = 0b0000_0000_1000_0000;
    }
}

bitflags! {
    /// Conditions that cause the policy controller to retry a track.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    #[rustfmt::skip]
    pub struct RetryTriggers: u32 {
        #[doc = "Retry when fewer sectors than expected were found"]
        const MISSING_SECTOR    = 0b0000_0001;
        #[doc = "Retry when a sector header failed its CRC check"]
        const ID_CRC            = 0b0000_0010;
        #[doc = "Retry when a sector data field failed its CRC check"]
        const DATA_CRC          = 0b0000_0100;
        #[doc = "Retry when weak bits were detected"]
        const WEAK_BITS         = 0b0000_1000;
        #[doc = "Retry when the sector count did not match the expected count"]
        const WRONG_COUNT       = 0b0001_0000;
    }
}

impl Default for RetryTriggers {
    fn default() -> Self {
        RetryTriggers::MISSING_SECTOR | RetryTriggers::ID_CRC | RetryTriggers::DATA_CRC | RetryTriggers::WRONG_COUNT
    }
}
