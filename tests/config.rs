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

use std::str::FromStr;

use crate::common::*;
use fluxrescue::{config::ParamRange, prelude::*};
use strum::IntoEnumIterator;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Apply `key = value` lines, as a front end reading a settings file would.
fn apply_settings(builder: QualityConfigBuilder, settings: &str) -> Result<QualityConfigBuilder, FluxRescueError> {
    settings
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .try_fold(builder, |builder, line| {
            let (name, value) = line.split_once('=').ok_or(FluxRescueError::ParameterError)?;
            builder.set_param(name.trim(), value.trim())
        })
}

#[test]
fn test_presets_by_name() {
    init();
    for preset in QualityPreset::iter() {
        let name = preset.to_string();
        assert_eq!(QualityPreset::from_str(&name), Ok(preset));
        assert!(QualityConfigBuilder::from_preset(preset).build().is_ok());
    }
    assert_eq!(QualityPreset::from_str("THOROUGH"), Ok(QualityPreset::Thorough));
    assert_eq!(QualityConfig::default(), QualityConfig::from_preset(QualityPreset::Default));
}

#[test]
fn test_settings_drive_decode() {
    init();
    let settings = "
        # recovery settings
        error_mode = salvage
        crc_correction_bits = 1
        expected_sectors = 9
        merge_strategy = best_sector
        worker_count = 2
    ";
    let config = apply_settings(QualityConfig::builder(), settings)
        .and_then(|b| b.build())
        .unwrap();
    assert_eq!(config.error_mode(), ErrorMode::Salvage);
    assert_eq!(config.effective_crc_correction(), 1);
    assert_eq!(config.expected_sectors(), Some(9));

    let ch = DiskCh::new(7, 1);
    let clean = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let damaged = clean.clone().modify_sector(8, |s| s.flip_data_bit(42));
    let record = DecodeSession::new(config)
        .decode_track(ch, &mut CapturedTrack::new(revolutions(&damaged, ch, 3)))
        .unwrap();
    assert!(record.is_complete());
    assert_eq!(recovered_data_hash(&record), expected_data_hash(&clean));
}

#[test]
fn test_bad_settings() {
    init();
    assert_eq!(
        apply_settings(QualityConfig::builder(), "max_revolutions 4").unwrap_err(),
        FluxRescueError::ParameterError
    );
    assert!(apply_settings(QualityConfig::builder(), "weak_bit_threshold = 0.5").is_err());

    // Cross-field checks are made when building
    let builder = apply_settings(QualityConfig::builder(), "min_revolutions = 8\nmax_revolutions = 4").unwrap();
    assert!(matches!(
        builder.build(),
        Err(FluxRescueError::InvalidConfig { param: "min_revolutions", .. })
    ));
}

#[test]
fn test_param_listing() {
    init();
    let config = QualityConfig::from_preset(QualityPreset::Forensic);
    let params = config.params();

    let mode = params.iter().find(|p| p.param == ConfigParam::ErrorMode).unwrap();
    assert_eq!(mode.value, "forensic");
    assert!(matches!(mode.range, ParamRange::Choice(_)));

    let expected = params.iter().find(|p| p.param == ConfigParam::ExpectedSectors).unwrap();
    assert_eq!(expected.value, "auto");
    assert!(expected.to_string().starts_with("expected_sectors = auto"));

    // Every listed value is accepted back
    let settings: String = params.iter().map(|p| format!("{} = {}\n", p.param, p.value)).collect();
    let rebuilt = apply_settings(QualityConfig::builder(), &settings)
        .and_then(|b| b.build())
        .unwrap();
    assert_eq!(rebuilt, config);
}

#[cfg(feature = "serde")]
#[test]
fn test_serde_round_trip() {
    use fluxrescue::{
        sector::TrackSummary,
        timing::{ProtectionFinding, ProtectionScheme},
    };
    init();

    let config = QualityConfig::from_preset(QualityPreset::Forensic);
    let json = serde_json::to_string(&config).unwrap();
    let restored: QualityConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, config);

    let finding = ProtectionFinding {
        scheme: ProtectionScheme::custom("HalfRate"),
        confidence: 0.4,
        regions: 2,
        bits: 1800,
    };
    let restored: ProtectionFinding = serde_json::from_str(&serde_json::to_string(&finding).unwrap()).unwrap();
    assert_eq!(restored, finding);

    let ch = DiskCh::new(3, 0);
    let builder = standard_track(ch, 9, 2, TrackDataEncoding::Mfm);
    let record = DecodeSession::new(config)
        .decode_track(ch, &mut CapturedTrack::new(revolutions(&builder, ch, 3)))
        .unwrap();
    let summary = record.summary();
    let restored: TrackSummary = serde_json::from_str(&serde_json::to_string(&summary).unwrap()).unwrap();
    assert_eq!(restored, summary);
}
