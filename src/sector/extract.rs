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

    src/sector/extract.rs

    System 34 sector extraction
*/

//! Extraction of System 34 sectors from a decoded bitstream.
//!
//! Every IDAM marker starts a sector. The six bytes following the marker hold the cylinder,
//! head, sector and size code of the sector and a CRC over the sync bytes, the mark and the ID.
//! The data field is the first DAM or DDAM found after the header and before the next IDAM,
//! within a fixed window.

use crate::{
    aggregate::WeakBitRegion,
    bitstream_codec::{count_sync_words, crc_ibm_3740, crc_prefix, decode_bytes},
    flux::pll::{BitstreamResult, MarkerEvent},
    sector::{
        confidence::{jitter_score, sync_score, timing_score, ScoreComponents, ScoreModifiers, ScoreWeights},
        crc_repair,
        SectorData,
        SectorRecord,
    },
    timing::TimingAnalysis,
    types::{DiskCh, DiskChsn, IntegrityField, Marker},
};

/// The data mark must start within this many bits of the end of the sector header.
pub const DATA_MARK_WINDOW: usize = 1024;
/// Largest sector size code considered plausible.
const MAX_PLAUSIBLE_N: u8 = 6;
/// Largest sector number considered plausible when the expected sector count is unknown.
const MAX_PLAUSIBLE_SECTOR: u8 = 64;

/// Parameters for sector extraction.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractOptions {
    /// The physical track the bitstream was read from.
    pub ch: DiskCh,
    pub weights: ScoreWeights,
    /// The maximum number of bits CRC repair may change per data field. 0 disables repair.
    pub crc_correction_bits: u8,
    /// The number of sectors the track is expected to hold, if known.
    pub expected_sectors: Option<u8>,
}

impl ExtractOptions {
    pub fn new(ch: DiskCh) -> Self {
        ExtractOptions {
            ch,
            weights: ScoreWeights::default(),
            crc_correction_bits: 0,
            expected_sectors: None,
        }
    }
}

/// The sectors found in a bitstream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExtractResult {
    pub sectors: Vec<SectorRecord>,
    /// The number of IDAM markers found.
    pub idam_ct: usize,
    /// The number of headers or data fields cut short by the end of the bitstream.
    pub truncated: usize,
    /// The number of data marks that did not follow a sector header.
    pub orphan_data: usize,
}

/// A sector header and data field before scoring.
struct RawSector<'a> {
    idam: &'a MarkerEvent,
    id: DiskChsn,
    header: IntegrityField,
    dam: Option<&'a MarkerEvent>,
    data: SectorData,
    data_end: usize,
    corrected_bits: u32,
}

/// Extract and score all sectors in `bitstream`. `timing` and `weak_regions` are used only for
/// scoring and may be empty.
pub fn extract_sectors(
    bitstream: &BitstreamResult,
    timing: Option<&TimingAnalysis>,
    weak_regions: &[WeakBitRegion],
    options: &ExtractOptions,
) -> ExtractResult {
    let mut result = ExtractResult::default();
    let encoding = bitstream.encoding;
    let bits = &bitstream.bits;
    let marker_size = encoding.marker_size();
    let byte_size = encoding.byte_size();

    let mut raw_sectors: Vec<RawSector> = Vec::new();
    let mut claimed_dams = 0;

    for (mi, idam) in bitstream.markers.iter().enumerate() {
        if idam.marker != Marker::Idam {
            continue;
        }
        result.idam_ct += 1;

        let header_start = idam.bit_offset + marker_size;
        let header_bytes = match decode_bytes(bits, header_start, 6) {
            Some(bytes) => bytes,
            None => {
                log::debug!(
                    "extract_sectors(): Sector header at {} truncated by end of track",
                    idam.bit_offset
                );
                result.truncated += 1;
                continue;
            }
        };

        let id = DiskChsn::new(
            header_bytes[0] as u16,
            header_bytes[1],
            header_bytes[2],
            header_bytes[3],
        );
        let recorded = u16::from_be_bytes([header_bytes[4], header_bytes[5]]);
        let calculated = crc_ibm_3740(&header_bytes[0..4], Some(crc_ibm_3740(&crc_prefix(encoding, idam.mark), None)));
        let header = IntegrityField::new(recorded, calculated);
        let header_end = header_start + 6 * byte_size;

        log::trace!(
            "extract_sectors(): IDAM at {}: {} header CRC {}",
            idam.bit_offset,
            id,
            header
        );

        let next_idam = bitstream.markers[mi + 1..]
            .iter()
            .find(|m| m.marker == Marker::Idam)
            .map_or(usize::MAX, |m| m.bit_offset);
        let window_end = (header_end + DATA_MARK_WINDOW).min(next_idam);
        let dam = bitstream.markers[mi + 1..]
            .iter()
            .take_while(|m| m.bit_offset < window_end)
            .find(|m| m.marker.is_data() && m.bit_offset >= header_end);

        let mut raw = RawSector {
            idam,
            id,
            header,
            dam,
            data: SectorData::Missing,
            data_end: header_end,
            corrected_bits: 0,
        };

        if let Some(dam) = dam {
            claimed_dams += 1;
            let data_start = dam.bit_offset + marker_size;
            let size = id.n_size();
            match decode_bytes(bits, data_start, size + 2) {
                Some(mut bytes) => {
                    let recorded = u16::from_be_bytes([bytes[size], bytes[size + 1]]);
                    bytes.truncate(size);
                    let prefix = crc_prefix(encoding, dam.mark);
                    let calculated = crc_ibm_3740(&bytes, Some(crc_ibm_3740(&prefix, None)));
                    let check = IntegrityField::new(recorded, calculated);
                    raw.data_end = data_start + (size + 2) * byte_size;

                    raw.data = if check.is_valid() {
                        SectorData::Valid(bytes)
                    }
                    else {
                        match crc_repair::repair(&prefix, &mut bytes, recorded, options.crc_correction_bits) {
                            Some(repair) => {
                                log::debug!(
                                    "extract_sectors(): Repaired sector {} data ({} bits)",
                                    id,
                                    repair.bit_ct()
                                );
                                raw.corrected_bits = repair.bit_ct();
                                SectorData::Valid(bytes)
                            }
                            None => SectorData::CrcFailed { data: bytes, check },
                        }
                    };
                }
                None => {
                    log::debug!(
                        "extract_sectors(): Sector {} data at {} truncated by end of track",
                        id,
                        dam.bit_offset
                    );
                    result.truncated += 1;
                }
            }
        }
        raw_sectors.push(raw);
    }

    let total_dams = bitstream.markers.iter().filter(|m| m.marker.is_data()).count();
    result.orphan_data = total_dams.saturating_sub(claimed_dams);

    for (i, raw) in raw_sectors.iter().enumerate() {
        let prev = i.checked_sub(1).map(|p| raw_sectors[p].id);
        let next = raw_sectors.get(i + 1).map(|n| n.id);
        result.sectors.push(score_sector(raw, prev, next, bitstream, timing, weak_regions, options));
    }

    log::debug!(
        "extract_sectors(): {} IDAMs, {} sectors ({} valid), {} truncated, {} orphan data fields",
        result.idam_ct,
        result.sectors.len(),
        result.sectors.iter().filter(|s| s.is_valid()).count(),
        result.truncated,
        result.orphan_data
    );
    result
}

/// Return the fraction of identifier plausibility checks `id` passes.
pub fn id_plausibility(
    id: DiskChsn,
    ch: DiskCh,
    prev: Option<DiskChsn>,
    next: Option<DiskChsn>,
    expected_sectors: Option<u8>,
) -> f64 {
    let max_sector = expected_sectors.unwrap_or(MAX_PLAUSIBLE_SECTOR);
    let sequential = match (prev, next) {
        (None, None) => true,
        _ => {
            prev.is_some_and(|p| p.s().wrapping_add(1) == id.s()) || next.is_some_and(|n| id.s().wrapping_add(1) == n.s())
        }
    };
    let checks = [
        id.c() == ch.c(),
        id.h() == ch.h(),
        id.s() >= 1 && id.s() <= max_sector,
        id.n() <= MAX_PLAUSIBLE_N,
        sequential,
    ];
    checks.iter().filter(|c| **c).count() as f64 / checks.len() as f64
}

fn score_sector(
    raw: &RawSector,
    prev: Option<DiskChsn>,
    next: Option<DiskChsn>,
    bitstream: &BitstreamResult,
    timing: Option<&TimingAnalysis>,
    weak_regions: &[WeakBitRegion],
    options: &ExtractOptions,
) -> SectorRecord {
    let start = raw.idam.bit_offset;
    let end = raw.data_end;
    let sync_len = bitstream.encoding.sync_len();

    let components = ScoreComponents {
        crc: if raw.header.is_valid() { 1.0 } else { 0.0 },
        plausibility: id_plausibility(raw.id, options.ch, prev, next, options.expected_sectors),
        timing: timing.map_or(1.0, |t| timing_score(t.density_ratio_at(start))),
        sync: sync_score(
            count_sync_words(&bitstream.bits, start, sync_len),
            sync_len,
            raw.dam.is_some(),
        ),
        jitter: jitter_score(bitstream.pll_stats_in(start, end), bitstream.cell_period),
    };

    let weak = weak_regions.iter().any(|r| r.overlaps(start, end));
    let timing_anomaly = timing.is_some_and(|t| t.is_anomalous_range(start, end));
    let modifiers = ScoreModifiers {
        data_crc_failed: matches!(raw.data, SectorData::CrcFailed { .. }),
        data_missing: raw.data.is_missing(),
        weak_bits: weak,
        timing_anomaly,
        corrected_bits: raw.corrected_bits,
    };
    let confidence = modifiers.apply(components.weighted(&options.weights));

    SectorRecord {
        id: raw.id,
        bit_offset: start,
        data_offset: raw.dam.map(|d| d.bit_offset),
        header: raw.header,
        data: raw.data.clone(),
        deleted: raw.dam.is_some_and(|d| d.marker == Marker::Ddam),
        confidence,
        components,
        weak,
        timing_anomaly,
        corrected_bits: raw.corrected_bits,
        copies: Vec::new(),
        best_revolution: None,
    }
}
