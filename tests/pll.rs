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

mod common;

use crate::common::*;
use fluxrescue::prelude::*;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn test_even_short_fluxes() {
    init();
    let ch = DiskCh::new(0, 0);
    let revolution = FluxRevolution::from_f64(ch, &vec![4e-6; 1000], 0.2);
    let mut pll = Pll::new(BASE_PERIOD, TrackDataEncoding::Mfm, PllConfig::default()).unwrap();
    let result = pll.decode(&revolution).unwrap();

    assert_eq!(result.transitions.len(), 1000);
    assert!(result.transitions.iter().all(|t| *t == FluxTransition::Short));
    assert_eq!(result.flux_stats.short, 1000);
    assert_eq!(result.flux_stats.invalid_ratio(), 0.0);
    assert_eq!(result.bits.iter().filter(|b| *b).count(), 1000);
    assert_eq!(result.latency.len(), result.len());
}

#[test]
fn test_decode_is_deterministic() {
    init();
    let ch = DiskCh::new(12, 1);
    let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let revolution = jittered(&builder.build_revolution(ch, BASE_PERIOD), 0.03, 1234);

    let first = revolution.decode(&DecodeParams::default()).unwrap();
    let second = revolution.decode(&DecodeParams::default()).unwrap();
    assert_eq!(compute_bits_hash(&first.bits), compute_bits_hash(&second.bits));
    assert_eq!(first.digest(), second.digest());
    assert_eq!(first, second);
}

#[test]
fn test_synthetic_mfm_track() {
    init();
    let ch = DiskCh::new(0, 0);
    let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let built = builder.build_bits();
    let params = DecodeParams {
        cell_period: Some(BASE_PERIOD),
        ..DecodeParams::default()
    };
    let result = builder.build_revolution(ch, BASE_PERIOD).decode(&params).unwrap();

    assert_eq!(result.encoding, TrackDataEncoding::Mfm);
    assert_eq!(result.cell_period, BASE_PERIOD);
    assert_eq!(result.markers_of(Marker::Iam).count(), 1);
    assert_eq!(result.markers_of(Marker::Idam).count(), 9);
    assert_eq!(result.markers_of(Marker::Dam).count(), 9);

    // Trailing zeros have no transition to mark them, so the decode is a prefix of the track.
    assert!(result.len() <= built.len());
    assert!(built.iter().take(result.len()).eq(result.bits.iter()));
}

#[test]
fn test_fm_track_is_detected() {
    init();
    let ch = DiskCh::new(0, 0);
    let builder = standard_track(ch, 8, 1, TrackDataEncoding::Fm);
    let result = builder
        .build_revolution(ch, BASE_PERIOD)
        .decode(&DecodeParams::default())
        .unwrap();

    assert_eq!(result.encoding, TrackDataEncoding::Fm);
    assert_eq!(result.markers_of(Marker::Idam).count(), 8);
    assert_eq!(result.flux_stats.medium, 0);
}

#[test]
fn test_ticks_revolution() {
    init();
    let ch = DiskCh::new(0, 0);
    let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let timebase = 1.0 / 24e6;
    let ticks: Vec<u32> = builder
        .build_flux(BASE_PERIOD)
        .iter()
        .map(|d| (d / timebase).round() as u32)
        .collect();
    let revolution = FluxRevolution::from_ticks(ch, &ticks, 0.2, timebase);
    assert!(revolution.validate().is_clean());

    let result = revolution.decode(&DecodeParams::default()).unwrap();
    assert_eq!(result.markers_of(Marker::Idam).count(), 9);
    assert_eq!(result.flux_stats.invalid_ratio(), 0.0);
}

#[test]
fn test_empty_revolution() {
    init();
    let revolution = FluxRevolution::from_f64(DiskCh::new(0, 0), &[], 0.2);
    let result = revolution
        .decode(&DecodeParams {
            cell_period: Some(BASE_PERIOD),
            ..DecodeParams::default()
        })
        .unwrap();
    assert!(result.is_empty());
    assert!(result.transitions.is_empty());
    assert!(result.markers.is_empty());
}
