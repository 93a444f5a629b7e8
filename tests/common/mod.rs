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

    tests/common/mod.rs

    Common support functions for tests
*/

#![allow(dead_code)]

use bit_vec::BitVec;
use fluxrescue::prelude::*;
use hex::encode;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha1::{Digest, Sha1};

/// Base (MFM) bit cell period of a double density track.
pub const BASE_PERIOD: f64 = 2e-6;

pub fn compute_slice_hash(slice: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(slice);
    let result = hasher.finalize();

    encode(result)
}

pub fn compute_bits_hash(bits: &BitVec) -> String {
    let mut hasher = Sha1::new();
    hasher.update((bits.len() as u64).to_le_bytes());
    hasher.update(bits.to_bytes());
    encode(hasher.finalize())
}

pub fn standard_track(ch: DiskCh, count: u8, n: u8, encoding: TrackDataEncoding) -> TrackBuilder {
    TrackBuilder::standard(ch, count, n, encoding)
}

/// Produce `ct` identical revolutions of a built track.
pub fn revolutions(builder: &TrackBuilder, ch: DiskCh, ct: usize) -> Vec<FluxRevolution> {
    (0..ct).map(|_| builder.build_revolution(ch, BASE_PERIOD)).collect()
}

/// Apply uniform random jitter of up to `fraction` of each delta.
pub fn jittered(revolution: &FluxRevolution, fraction: f64, seed: u64) -> FluxRevolution {
    let mut rng = StdRng::seed_from_u64(seed);
    let deltas: Vec<f64> = revolution
        .flux_deltas
        .iter()
        .map(|d| d * (1.0 + rng.gen_range(-fraction..=fraction)))
        .collect();
    FluxRevolution::from_f64(revolution.ch, &deltas, revolution.index_time)
}

/// Hash of the data of every sector a builder writes, in track order.
pub fn expected_data_hash(builder: &TrackBuilder) -> String {
    let data: Vec<u8> = builder.sectors().iter().flat_map(|s| s.data.iter().copied()).collect();
    compute_slice_hash(&data)
}

/// Hash of the valid data of every sector of a track record, in track order.
pub fn recovered_data_hash(record: &TrackRecord) -> String {
    let data: Vec<u8> = record
        .sectors
        .iter()
        .filter_map(|s| s.data.valid_data())
        .flat_map(|d| d.iter().copied())
        .collect();
    compute_slice_hash(&data)
}
