// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Binary serialization format for quantiles-over-doubles sketches.
//!
//! Preamble (little-endian):
//! - byte 0: preamble longs (1 for an empty sketch, 4 otherwise)
//! - byte 1: serial version (3)
//! - byte 2: family id (8)
//! - byte 3: reserved, 0
//! - byte 4: flags
//! - bytes 5..7: k as u16, byte 7 reserved
//!
//! A populated image continues with `n` (long 1), `min_value` (long 2) and
//! `max_value` (long 3), then the item data. A compact image stores the
//! sorted base buffer followed by each populated level, no spare capacity.
//! An updatable image stores the full 2k base-buffer slots and 2k slots for
//! every level up to the highest populated one.

use byteorder::ByteOrder;
use byteorder::LE;

use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::family::Family;

/// Current serialization version.
pub const SERIAL_VERSION: u8 = 3;

/// Preamble size for an empty sketch (8 bytes).
pub const PREAMBLE_LONGS_EMPTY: u8 = 1;

/// Preamble size for a populated sketch (32 bytes, includes n and min/max).
pub const PREAMBLE_LONGS_FULL: u8 = 4;

// Flags (byte 4) - bit masks
/// Flag: data is in big-endian format (never set by this crate).
pub const FLAG_IS_BIG_ENDIAN: u8 = 1 << 0;
/// Flag: image is read-only (compact images are read-only).
pub const FLAG_IS_READ_ONLY: u8 = 1 << 1;
/// Flag: sketch is empty.
pub const FLAG_IS_EMPTY: u8 = 1 << 2;
/// Flag: image is in compact form.
pub const FLAG_IS_COMPACT: u8 = 1 << 3;
/// Flag: the serialized base buffer is sorted.
pub const FLAG_IS_ORDERED: u8 = 1 << 4;

// Byte offsets within an image.
pub const PRE_LONGS_BYTE: usize = 0;
pub const SER_VER_BYTE: usize = 1;
pub const FAMILY_BYTE: usize = 2;
pub const FLAGS_BYTE: usize = 4;
pub const K_SHORT: usize = 5;
pub const N_LONG: usize = 8;
pub const MIN_DOUBLE: usize = 16;
pub const MAX_DOUBLE: usize = 24;
pub const DATA_START: usize = 32;

/// Size in bytes of an empty image.
pub const EMPTY_SIZE_BYTES: usize = 8;

/// Minimum k (must be a power of two).
pub const MIN_K: u16 = 2;

/// Maximum k (must be a power of two).
pub const MAX_K: u16 = 32768;

/// Default k, giving a normalized rank error of about 1.4%.
pub const DEFAULT_K: u16 = 128;

/// Bit pattern of populated levels: bit i set iff level i holds a run.
pub(crate) fn compute_bit_pattern(k: u16, n: u64) -> u64 {
    n / (2 * k as u64)
}

/// Number of items currently in the base buffer.
pub(crate) fn compute_base_buffer_count(k: u16, n: u64) -> usize {
    (n % (2 * k as u64)) as usize
}

/// Number of allocated levels: one past the highest populated level.
pub(crate) fn compute_num_levels(bit_pattern: u64) -> u8 {
    (64 - bit_pattern.leading_zeros()) as u8
}

/// Total items retained by the sketch.
pub(crate) fn compute_retained_items(k: u16, n: u64) -> usize {
    let bit_pattern = compute_bit_pattern(k, n);
    compute_base_buffer_count(k, n) + 2 * k as usize * bit_pattern.count_ones() as usize
}

/// Item capacity of the updatable combined buffer for the given n.
pub(crate) fn compute_combined_capacity(k: u16, n: u64) -> usize {
    let num_levels = compute_num_levels(compute_bit_pattern(k, n));
    2 * k as usize * (1 + num_levels as usize)
}

/// Serialized size in bytes of the updatable form.
pub(crate) fn updatable_storage_bytes(k: u16, n: u64) -> usize {
    if n == 0 {
        return EMPTY_SIZE_BYTES;
    }
    DATA_START + 8 * compute_combined_capacity(k, n)
}

/// Serialized size in bytes of the compact form.
pub(crate) fn compact_storage_bytes(k: u16, n: u64) -> usize {
    if n == 0 {
        return EMPTY_SIZE_BYTES;
    }
    DATA_START + 8 * compute_retained_items(k, n)
}

/// Validate a k parameter: a power of two within [MIN_K, MAX_K].
pub(crate) fn check_k(k: u16) -> Result<(), Error> {
    if !(MIN_K..=MAX_K).contains(&k) || !k.is_power_of_two() {
        return Err(Error::invalid_argument(format!(
            "k must be a power of two in [{MIN_K}, {MAX_K}]"
        ))
        .with_context("k", k));
    }
    Ok(())
}

/// The decoded header of a quantiles image.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Preamble {
    pub pre_longs: u8,
    pub flags: u8,
    pub k: u16,
    pub n: u64,
    pub min_value: f64,
    pub max_value: f64,
}

impl Preamble {
    pub fn is_empty(&self) -> bool {
        self.flags & FLAG_IS_EMPTY != 0
    }

    pub fn is_compact(&self) -> bool {
        self.flags & FLAG_IS_COMPACT != 0
    }
}

/// Parse and validate the preamble of a serialized quantiles image.
pub(crate) fn parse_preamble(bytes: &[u8]) -> Result<Preamble, Error> {
    fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
        move |_| Error::insufficient_data(tag)
    }

    if bytes.len() < EMPTY_SIZE_BYTES {
        return Err(Error::insufficient_data("preamble"));
    }

    let mut cursor = SketchSlice::new(bytes);
    let pre_longs = cursor.read_u8().map_err(make_error("pre_longs"))?;
    let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
    let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
    let _reserved = cursor.read_u8().map_err(make_error("reserved"))?;
    let flags = cursor.read_u8().map_err(make_error("flags"))?;
    let k = cursor.read_u16_le().map_err(make_error("k"))?;
    let _pad = cursor.read_u8().map_err(make_error("pad"))?;

    Family::QUANTILES.validate_id(family_id)?;
    if serial_version != SERIAL_VERSION {
        return Err(Error::unsupported_serial_version(
            SERIAL_VERSION,
            serial_version,
        ));
    }
    if flags & FLAG_IS_BIG_ENDIAN != 0 {
        return Err(Error::deserial("big-endian images are not supported"));
    }
    check_k(k)?;

    let is_empty = flags & FLAG_IS_EMPTY != 0;
    if pre_longs == PREAMBLE_LONGS_EMPTY {
        if !is_empty {
            return Err(Error::deserial(
                "a single preamble long requires the empty flag",
            ));
        }
        return Ok(Preamble {
            pre_longs,
            flags,
            k,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
        });
    }

    if pre_longs != PREAMBLE_LONGS_FULL {
        return Err(Error::deserial(format!(
            "populated sketch requires {PREAMBLE_LONGS_FULL} preamble longs, got {pre_longs}"
        )));
    }
    if bytes.len() < DATA_START {
        return Err(Error::insufficient_data("min/max"));
    }

    let n = cursor.read_u64_le().map_err(make_error("n"))?;
    let min_value = cursor.read_f64_le().map_err(make_error("min_value"))?;
    let max_value = cursor.read_f64_le().map_err(make_error("max_value"))?;

    // A direct sketch keeps the full preamble even while empty.
    if is_empty != (n == 0) {
        return Err(Error::deserial(format!(
            "empty flag contradicts n = {n}"
        )));
    }
    if is_empty {
        return Ok(Preamble {
            pre_longs,
            flags,
            k,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
        });
    }

    Ok(Preamble {
        pre_longs,
        flags,
        k,
        n,
        min_value,
        max_value,
    })
}

/// Fully decoded item data of a quantiles image.
#[derive(Debug, Clone)]
pub(crate) struct ParsedImage {
    pub k: u16,
    pub n: u64,
    pub min_value: f64,
    pub max_value: f64,
    /// Base buffer items, in serialized order.
    pub base_buffer: Vec<f64>,
    /// One run of 2k items per populated level, low level first.
    pub levels: Vec<Vec<f64>>,
}

/// Decode a full image (compact or updatable) into normalized parts.
pub(crate) fn parse_image(bytes: &[u8]) -> Result<ParsedImage, Error> {
    let pre = parse_preamble(bytes)?;
    if pre.is_empty() {
        return Ok(ParsedImage {
            k: pre.k,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
            base_buffer: Vec::new(),
            levels: Vec::new(),
        });
    }

    let k = pre.k;
    let n = pre.n;
    let two_k = 2 * k as usize;
    let bit_pattern = compute_bit_pattern(k, n);
    let bb_count = compute_base_buffer_count(k, n);

    let expected = if pre.is_compact() {
        compact_storage_bytes(k, n)
    } else {
        updatable_storage_bytes(k, n)
    };
    if bytes.len() < expected {
        return Err(Error::deserial("image shorter than declared content")
            .with_context("expected_bytes", expected)
            .with_context("actual_bytes", bytes.len()));
    }

    let read_run = |start_item: usize, len: usize| -> Vec<f64> {
        let mut run = Vec::with_capacity(len);
        for i in 0..len {
            let offset = DATA_START + 8 * (start_item + i);
            run.push(LE::read_f64(&bytes[offset..offset + 8]));
        }
        run
    };

    let mut levels = Vec::new();
    let base_buffer;
    if pre.is_compact() {
        base_buffer = read_run(0, bb_count);
        let mut cursor = bb_count;
        for _ in 0..bit_pattern.count_ones() {
            levels.push(read_run(cursor, two_k));
            cursor += two_k;
        }
    } else {
        base_buffer = read_run(0, bb_count);
        let num_levels = compute_num_levels(bit_pattern);
        for level in 0..num_levels {
            if bit_pattern & (1u64 << level) != 0 {
                levels.push(read_run(two_k + level as usize * two_k, two_k));
            }
        }
    }

    Ok(ParsedImage {
        k,
        n,
        min_value: pre.min_value,
        max_value: pre.max_value,
        base_buffer,
        levels,
    })
}

pub(crate) struct ImageParts<'a> {
    pub k: u16,
    pub n: u64,
    pub min_value: f64,
    pub max_value: f64,
    pub base_buffer: &'a [f64],
    /// One populated run per set bit of the bit pattern, low level first.
    pub levels: &'a [Vec<f64>],
}

/// Serialize sketch state into an image.
///
/// The compact form sorts the base buffer and drops spare capacity; the
/// updatable form preserves the 2k-aligned slot structure so a wrapped
/// sketch can keep updating in place.
pub(crate) fn serialize_parts(parts: &ImageParts<'_>, compact: bool) -> Vec<u8> {
    let k = parts.k;
    let n = parts.n;
    let two_k = 2 * k as usize;

    if n == 0 {
        let mut bytes = SketchBytes::with_capacity(EMPTY_SIZE_BYTES);
        bytes.write_u8(PREAMBLE_LONGS_EMPTY);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::QUANTILES.id);
        bytes.write_u8(0);
        bytes.write_u8(FLAG_IS_EMPTY | if compact { FLAG_IS_COMPACT | FLAG_IS_READ_ONLY } else { 0 });
        bytes.write_u16_le(k);
        bytes.write_u8(0);
        return bytes.into_bytes();
    }

    let total = if compact {
        compact_storage_bytes(k, n)
    } else {
        updatable_storage_bytes(k, n)
    };
    let mut bytes = SketchBytes::with_capacity(total);

    let mut flags = 0u8;
    if compact {
        flags |= FLAG_IS_COMPACT | FLAG_IS_READ_ONLY | FLAG_IS_ORDERED;
    }
    bytes.write_u8(PREAMBLE_LONGS_FULL);
    bytes.write_u8(SERIAL_VERSION);
    bytes.write_u8(Family::QUANTILES.id);
    bytes.write_u8(0);
    bytes.write_u8(flags);
    bytes.write_u16_le(k);
    bytes.write_u8(0);
    bytes.write_u64_le(n);
    bytes.write_f64_le(parts.min_value);
    bytes.write_f64_le(parts.max_value);

    if compact {
        let mut sorted_bb = parts.base_buffer.to_vec();
        sorted_bb.sort_unstable_by(f64::total_cmp);
        for item in &sorted_bb {
            bytes.write_f64_le(*item);
        }
        for run in parts.levels {
            for item in run {
                bytes.write_f64_le(*item);
            }
        }
    } else {
        for item in parts.base_buffer {
            bytes.write_f64_le(*item);
        }
        // Pad the base buffer out to its full 2k slots.
        for _ in parts.base_buffer.len()..two_k {
            bytes.write_f64_le(0.0);
        }
        let bit_pattern = compute_bit_pattern(k, n);
        let num_levels = compute_num_levels(bit_pattern);
        let mut populated = parts.levels.iter();
        for level in 0..num_levels {
            if bit_pattern & (1u64 << level) != 0 {
                let run = populated.next().expect("run per populated level");
                for item in run {
                    bytes.write_f64_le(*item);
                }
            } else {
                for _ in 0..two_k {
                    bytes.write_f64_le(0.0);
                }
            }
        }
    }

    debug_assert_eq!(bytes.len(), total);
    bytes.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_pattern_tracks_n() {
        assert_eq!(compute_bit_pattern(128, 0), 0);
        assert_eq!(compute_bit_pattern(128, 255), 0);
        assert_eq!(compute_bit_pattern(128, 256), 1);
        assert_eq!(compute_bit_pattern(128, 1000), 3);
    }

    #[test]
    fn test_storage_bytes() {
        // k = 128, n = 2: base buffer only.
        assert_eq!(updatable_storage_bytes(128, 2), 32 + 8 * 256);
        assert_eq!(compact_storage_bytes(128, 2), 32 + 8 * 2);
        // Empty image is a bare preamble.
        assert_eq!(updatable_storage_bytes(128, 0), 8);
        assert_eq!(compact_storage_bytes(128, 0), 8);
    }

    #[test]
    fn test_check_k() {
        assert!(check_k(128).is_ok());
        assert!(check_k(2).is_ok());
        assert!(check_k(32768).is_ok());
        assert!(check_k(0).is_err());
        assert!(check_k(100).is_err());
        assert!(check_k(1).is_err());
    }

    #[test]
    fn test_empty_image_round_trip() {
        let parts = ImageParts {
            k: 64,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
            base_buffer: &[],
            levels: &[],
        };
        let image = serialize_parts(&parts, true);
        assert_eq!(image.len(), EMPTY_SIZE_BYTES);

        let parsed = parse_image(&image).unwrap();
        assert_eq!(parsed.k, 64);
        assert_eq!(parsed.n, 0);
        assert!(parsed.base_buffer.is_empty());
        assert!(parsed.levels.is_empty());
    }

    #[test]
    fn test_bad_family_rejected() {
        let parts = ImageParts {
            k: 64,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
            base_buffer: &[],
            levels: &[],
        };
        let mut image = serialize_parts(&parts, true);
        image[FAMILY_BYTE] = 3;
        assert!(parse_preamble(&image).is_err());
    }

    #[test]
    fn test_contradictory_flags_rejected() {
        let parts = ImageParts {
            k: 64,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
            base_buffer: &[],
            levels: &[],
        };
        let mut image = serialize_parts(&parts, true);
        // Clear the empty flag while pre_longs still says empty.
        image[FLAGS_BYTE] &= !FLAG_IS_EMPTY;
        assert!(parse_preamble(&image).is_err());
    }

    #[test]
    fn test_big_endian_flag_rejected() {
        let parts = ImageParts {
            k: 64,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
            base_buffer: &[],
            levels: &[],
        };
        let mut image = serialize_parts(&parts, true);
        image[FLAGS_BYTE] |= FLAG_IS_BIG_ENDIAN;
        assert!(parse_preamble(&image).is_err());
    }
}
