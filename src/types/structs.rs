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

use std::fmt::{Display, Formatter};

/// An `IntegrityField` holds a checksum recorded on disk together with the checksum calculated
/// over the data it protects.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IntegrityField {
    pub recorded:   u16,
    pub calculated: u16,
}

impl Display for IntegrityField {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "Valid({:04X})", self.recorded)
        }
        else {
            write!(f, "Invalid({:04X} != {:04X})", self.recorded, self.calculated)
        }
    }
}

impl IntegrityField {
    pub fn new(recorded: u16, calculated: u16) -> Self {
        Self { recorded, calculated }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.recorded == self.calculated
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        !self.is_valid()
    }

    /// The xor of the recorded and calculated values.
    #[inline]
    pub fn syndrome(&self) -> u16 {
        self.recorded ^ self.calculated
    }
}
