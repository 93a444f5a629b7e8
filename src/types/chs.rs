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

    src/types/chs.rs

    Cylinder/head and cylinder/head/sector/size address types
*/

//! The `chs` module defines structures for physical track addressing and sector IDs.

use crate::MAXIMUM_SECTOR_SIZE;
use std::fmt::Display;

/// A structure representing a physical track location on a disk:
///  - Cylinder (c)
///  - Head (h)
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskCh {
    pub(crate) c: u16,
    pub(crate) h: u8,
}

impl From<(u16, u8)> for DiskCh {
    fn from((c, h): (u16, u8)) -> Self {
        Self { c, h }
    }
}

impl From<DiskChsn> for DiskCh {
    fn from(chsn: DiskChsn) -> Self {
        Self {
            c: chsn.c(),
            h: chsn.h(),
        }
    }
}

impl Display for DiskCh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{} h:{}]", self.c, self.h)
    }
}

impl DiskCh {
    /// Create a new DiskCh structure from a Cylinder (c) and Head (h) specifier.
    pub fn new(c: u16, h: u8) -> Self {
        Self { c, h }
    }
    /// Return the cylinder (c) field.
    pub fn c(&self) -> u16 {
        self.c
    }
    /// Return the head (h) field.
    pub fn h(&self) -> u8 {
        self.h
    }
}

/// A structure representing the four components of a Sector ID as read from a sector header:
///  - Cylinder (c)
///  - Head (h)
///  - Sector ID (s)
///  - Sector Size (n)
///
/// The ID fields of a sector header are not required to match the physical track the header
/// was read from. Copy protection schemes frequently exploit this.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiskChsn {
    c: u16,
    h: u8,
    s: u8,
    n: u8,
}

impl Default for DiskChsn {
    fn default() -> Self {
        Self { c: 0, h: 0, s: 1, n: 2 }
    }
}

impl From<(u16, u8, u8, u8)> for DiskChsn {
    fn from((c, h, s, n): (u16, u8, u8, u8)) -> Self {
        Self { c, h, s, n }
    }
}

impl Display for DiskChsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[c:{:2} h:{} s:{:3} n:{}]", self.c, self.h, self.s, self.n)
    }
}

impl DiskChsn {
    /// Create a new DiskChsn structure from the four sector ID components.
    pub fn new(c: u16, h: u8, s: u8, n: u8) -> Self {
        Self { c, h, s, n }
    }

    /// Return all four sector ID components.
    /// # Returns:
    /// A tuple containing the cylinder, head, sector ID, and sector size.
    #[inline]
    pub fn get(&self) -> (u16, u8, u8, u8) {
        (self.c, self.h, self.s, self.n)
    }
    /// Return the cylinder (c) field.
    #[inline]
    pub fn c(&self) -> u16 {
        self.c
    }
    /// Return the head (h) field.
    #[inline]
    pub fn h(&self) -> u8 {
        self.h
    }
    /// Return the sector id (s) field.
    #[inline]
    pub fn s(&self) -> u8 {
        self.s
    }
    /// Return the size (n) field.
    #[inline]
    pub fn n(&self) -> u8 {
        self.n
    }
    /// Return the size of the 'n' parameter in bytes.
    /// The formula for calculating size from n is (128 * 2^n)
    /// We enforce a maximum size of 8192 bytes for a single sector.
    #[inline]
    pub fn n_size(&self) -> usize {
        Self::n_to_bytes(self.n)
    }
    /// Convert the value of the sector size field (n) into bytes.
    #[inline]
    pub fn n_to_bytes(n: u8) -> usize {
        match n {
            0..=6 => 128usize << n,
            _ => MAXIMUM_SECTOR_SIZE,
        }
    }
    /// Convert a number of bytes into a sector size field (n), if the size is a power of two
    /// multiple of 128 bytes.
    pub fn bytes_to_n(size: usize) -> Option<u8> {
        if size < 128 || !size.is_power_of_two() || size > MAXIMUM_SECTOR_SIZE {
            return None;
        }
        Some((size / 128).trailing_zeros() as u8)
    }
    /// Return a boolean indicating whether the cylinder and head of this ID match the specified
    /// physical track.
    pub fn matches_ch(&self, ch: DiskCh) -> bool {
        self.c == ch.c && self.h == ch.h
    }
}
