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

//! Compact Theta sketch implementation
//!
//! A CompactThetaSketch is an immutable form of a Theta sketch storing only
//! the essential data needed for estimation and set operations: the theta
//! threshold, the retained hash values (optionally sorted ascending), and
//! the seed hash for validation.

use super::ThetaSketchView;
use super::hash_table::MAX_THETA;
use super::serialization::*;
use crate::codec::SketchBytes;
use crate::codec::SketchSlice;
use crate::error::Error;
use crate::family::Family;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;

/// A compact, immutable Theta sketch.
///
/// Unlike [`ThetaSketch`](super::ThetaSketch), this sketch cannot be updated
/// with new values.
///
/// # Example
///
/// ```
/// use sketches_core::theta::CompactThetaSketch;
/// use sketches_core::theta::ThetaSketch;
/// use sketches_core::theta::ThetaSketchView;
///
/// let mut sketch = ThetaSketch::builder().build();
/// sketch.update_str("apple");
/// sketch.update_str("banana");
///
/// let compact = sketch.compact(true);
/// let bytes = compact.serialize();
/// let restored = CompactThetaSketch::deserialize(&bytes).unwrap();
/// assert_eq!(compact.estimate(), restored.estimate());
/// ```
#[derive(Debug, Clone)]
pub struct CompactThetaSketch {
    theta: u64,
    entries: Vec<u64>,
    seed_hash: u16,
    is_empty: bool,
    ordered: bool,
}

impl CompactThetaSketch {
    /// Create a new compact sketch from components
    pub(crate) fn new(
        theta: u64,
        entries: Vec<u64>,
        seed_hash: u16,
        is_empty: bool,
        ordered: bool,
    ) -> Self {
        Self {
            theta,
            entries,
            seed_hash,
            is_empty,
            ordered,
        }
    }

    /// Serialize the compact sketch to bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let is_estimation_mode = self.theta < MAX_THETA;
        let num_entries = self.entries.len();

        // Single-item exact sketches use the short form.
        let single_item = !self.is_empty && !is_estimation_mode && num_entries == 1;

        let preamble_longs = if self.is_empty || single_item {
            PREAMBLE_LONGS_EMPTY
        } else if is_estimation_mode {
            PREAMBLE_LONGS_ESTIMATION
        } else {
            PREAMBLE_LONGS_EXACT
        };

        let preamble_bytes = (preamble_longs as usize) * 8;
        let total_size = preamble_bytes + num_entries * HASH_SIZE_BYTES;
        let mut bytes = SketchBytes::with_capacity(total_size);

        let mut flags = FLAG_IS_READ_ONLY | FLAG_IS_COMPACT;
        if self.ordered {
            flags |= FLAG_IS_ORDERED;
        }
        if self.is_empty {
            flags |= FLAG_IS_EMPTY;
        }
        if single_item {
            flags |= FLAG_HAS_SINGLE_ITEM;
        }

        bytes.write_u8(preamble_longs);
        bytes.write_u8(SERIAL_VERSION);
        bytes.write_u8(Family::THETA.id);
        bytes.write_u8(0);
        bytes.write_u8(0);
        bytes.write_u8(flags);
        bytes.write_u16_le(self.seed_hash);

        if preamble_longs >= PREAMBLE_LONGS_EXACT {
            bytes.write_u32_le(num_entries as u32);
            bytes.write_u32_le(DEFAULT_P_FLOAT_BITS);
        }

        if preamble_longs >= PREAMBLE_LONGS_ESTIMATION {
            bytes.write_u64_le(self.theta);
        }

        for hash in &self.entries {
            bytes.write_u64_le(*hash);
        }

        bytes.into_bytes()
    }

    /// Deserialize a compact sketch from bytes with the default seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are invalid or corrupted.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserialize a compact sketch from bytes with a specific seed
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The data is too short
    /// - The family ID doesn't match or the serial version is unsupported
    /// - The endian flag is set or theta is out of range
    /// - The seed hash doesn't match
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        fn make_error(tag: &'static str) -> impl FnOnce(std::io::Error) -> Error {
            move |_| Error::insufficient_data(tag)
        }

        let mut cursor = SketchSlice::new(bytes);

        let preamble_longs = cursor.read_u8().map_err(make_error("preamble_longs"))?;
        let serial_version = cursor.read_u8().map_err(make_error("serial_version"))?;
        let family_id = cursor.read_u8().map_err(make_error("family_id"))?;
        let _lg_k = cursor.read_u8().map_err(make_error("lg_k"))?;
        let _lg_arr = cursor.read_u8().map_err(make_error("lg_arr"))?;
        let flags = cursor.read_u8().map_err(make_error("flags"))?;
        let seed_hash = cursor.read_u16_le().map_err(make_error("seed_hash"))?;

        Family::THETA.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        if flags & FLAG_IS_BIG_ENDIAN != 0 {
            return Err(Error::deserial("big-endian images are not supported"));
        }
        if flags & FLAG_IS_COMPACT == 0 {
            return Err(Error::deserial("only compact images are supported"));
        }

        let expected_seed_hash = compute_seed_hash(seed);
        if seed_hash != expected_seed_hash {
            return Err(Error::deserial(format!(
                "seed hash mismatch: expected {expected_seed_hash}, got {seed_hash}"
            )));
        }

        let is_empty = (flags & FLAG_IS_EMPTY) != 0;
        let is_single_item = (flags & FLAG_HAS_SINGLE_ITEM) != 0;
        let ordered = (flags & FLAG_IS_ORDERED) != 0;

        if is_empty {
            if preamble_longs != PREAMBLE_LONGS_EMPTY {
                return Err(Error::deserial(format!(
                    "empty sketch requires {PREAMBLE_LONGS_EMPTY} preamble long, got {preamble_longs}"
                )));
            }
            return Ok(Self {
                theta: MAX_THETA,
                entries: Vec::new(),
                seed_hash,
                is_empty: true,
                ordered,
            });
        }

        // Single-item form: one preamble long followed by one hash.
        if preamble_longs == PREAMBLE_LONGS_EMPTY && is_single_item {
            let hash = cursor
                .read_u64_le()
                .map_err(make_error("single_item_hash"))?;
            return Ok(Self {
                theta: MAX_THETA,
                entries: vec![hash],
                seed_hash,
                is_empty: false,
                ordered,
            });
        }

        if preamble_longs < PREAMBLE_LONGS_EXACT {
            return Err(Error::deserial(format!(
                "non-empty sketch requires at least {PREAMBLE_LONGS_EXACT} preamble longs, got {preamble_longs}"
            )));
        }

        let num_entries = cursor.read_u32_le().map_err(make_error("num_entries"))? as usize;
        let _p = cursor.read_u32_le().map_err(make_error("p"))?;

        let theta = if preamble_longs >= PREAMBLE_LONGS_ESTIMATION {
            cursor.read_u64_le().map_err(make_error("theta"))?
        } else {
            MAX_THETA
        };
        if theta == 0 || theta > MAX_THETA {
            return Err(Error::deserial("theta out of range (0, 1]")
                .with_context("theta", theta));
        }

        let mut entries = Vec::with_capacity(num_entries);
        for i in 0..num_entries {
            let hash = cursor.read_u64_le().map_err(|_| {
                Error::insufficient_data(format!(
                    "expected {num_entries} entries, failed at index {i}"
                ))
            })?;
            entries.push(hash);
        }

        Ok(Self {
            theta,
            entries,
            seed_hash,
            is_empty: false,
            ordered,
        })
    }
}

impl ThetaSketchView for CompactThetaSketch {
    fn theta64(&self) -> u64 {
        self.theta
    }

    fn is_empty(&self) -> bool {
        self.is_empty
    }

    fn num_retained(&self) -> usize {
        self.entries.len()
    }

    fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    fn hash_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.entries.iter().copied())
    }

    fn is_ordered(&self) -> bool {
        self.ordered
    }
}
