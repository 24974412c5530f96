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

//! Direct (region-backed) compact Theta sketch.
//!
//! Wraps a compact image held in a caller-owned byte region and answers
//! queries by decoding entries on demand, without copying them out.

use super::ThetaSketchView;
use super::hash_table::MAX_THETA;
use super::serialization::*;
use crate::error::Error;
use crate::family::Family;
use crate::hash::DEFAULT_UPDATE_SEED;
use crate::hash::compute_seed_hash;
use crate::memory::Region;
use crate::memory::RegionId;

/// An immutable compact Theta sketch reading a region in place.
#[derive(Debug)]
pub struct DirectCompactThetaSketch<R: Region> {
    region: R,
    theta: u64,
    num_entries: usize,
    entries_offset: usize,
    seed_hash: u16,
    is_empty: bool,
    ordered: bool,
}

impl<R: Region> DirectCompactThetaSketch<R> {
    /// Wrap a region holding a compact theta image, using the default seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed or the seed hash does not
    /// match.
    pub fn wrap(region: R) -> Result<Self, Error> {
        Self::wrap_with_seed(region, DEFAULT_UPDATE_SEED)
    }

    /// Wrap a region holding a compact theta image.
    pub fn wrap_with_seed(region: R, seed: u64) -> Result<Self, Error> {
        let bytes = region.bytes();
        if bytes.len() < 8 {
            return Err(Error::insufficient_data("preamble"));
        }

        let preamble_longs = bytes[0];
        let serial_version = bytes[1];
        let family_id = bytes[2];
        let flags = bytes[5];
        let seed_hash = u16::from_le_bytes([bytes[6], bytes[7]]);

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
            return Err(Error::deserial("only compact images can be wrapped"));
        }
        let expected_seed_hash = compute_seed_hash(seed);
        if seed_hash != expected_seed_hash {
            return Err(Error::deserial(format!(
                "seed hash mismatch: expected {expected_seed_hash}, got {seed_hash}"
            )));
        }

        let is_empty = flags & FLAG_IS_EMPTY != 0;
        let is_single_item = flags & FLAG_HAS_SINGLE_ITEM != 0;
        let ordered = flags & FLAG_IS_ORDERED != 0;

        let (theta, num_entries, entries_offset) = if is_empty {
            (MAX_THETA, 0, 8)
        } else if preamble_longs == PREAMBLE_LONGS_EMPTY && is_single_item {
            (MAX_THETA, 1, 8)
        } else {
            if preamble_longs < PREAMBLE_LONGS_EXACT {
                return Err(Error::deserial(format!(
                    "non-empty sketch requires at least {PREAMBLE_LONGS_EXACT} preamble longs, got {preamble_longs}"
                )));
            }
            if bytes.len() < preamble_longs as usize * 8 {
                return Err(Error::insufficient_data("preamble"));
            }
            let num_entries = region.get_u32(8) as usize;
            let theta = if preamble_longs >= PREAMBLE_LONGS_ESTIMATION {
                region.get_u64(16)
            } else {
                MAX_THETA
            };
            if theta == 0 || theta > MAX_THETA {
                return Err(Error::deserial("theta out of range (0, 1]")
                    .with_context("theta", theta));
            }
            (theta, num_entries, preamble_longs as usize * 8)
        };

        let required = entries_offset + num_entries * HASH_SIZE_BYTES;
        if region.capacity() < required {
            return Err(Error::capacity(required, region.capacity()));
        }

        Ok(Self {
            region,
            theta,
            num_entries,
            entries_offset,
            seed_hash,
            is_empty,
            ordered,
        })
    }

    /// Identity of the backing region.
    pub fn region_id(&self) -> RegionId {
        self.region.id()
    }

    /// True iff `id` names this sketch's backing region.
    pub fn is_same_resource(&self, id: RegionId) -> bool {
        self.region.is_same_resource(id)
    }
}

impl<R: Region> ThetaSketchView for DirectCompactThetaSketch<R> {
    fn theta64(&self) -> u64 {
        self.theta
    }

    fn is_empty(&self) -> bool {
        self.is_empty
    }

    fn num_retained(&self) -> usize {
        self.num_entries
    }

    fn seed_hash(&self) -> u16 {
        self.seed_hash
    }

    fn hash_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        let offset = self.entries_offset;
        Box::new(
            (0..self.num_entries).map(move |i| self.region.get_u64(offset + i * HASH_SIZE_BYTES)),
        )
    }

    fn is_ordered(&self) -> bool {
        self.ordered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapRegion;
    use crate::theta::ThetaSketch;

    fn populated_image(count: u64) -> Vec<u8> {
        let mut sketch = ThetaSketch::builder().lg_k(5).build();
        for i in 0..count {
            sketch.update_u64(i);
        }
        sketch.serialize()
    }

    #[test]
    fn test_wrap_matches_heap_deserialize() {
        let image = populated_image(1_000);
        let heap = ThetaSketch::deserialize(&image).unwrap();
        let direct = DirectCompactThetaSketch::wrap(HeapRegion::from_vec(image)).unwrap();
        assert_eq!(direct.theta64(), heap.theta64());
        assert_eq!(direct.num_retained(), heap.num_retained());
        assert_eq!(direct.estimate(), heap.estimate());
        assert!(direct.is_ordered());

        let mut heap_hashes: Vec<u64> = heap.hash_iter().collect();
        heap_hashes.sort_unstable();
        let direct_hashes: Vec<u64> = direct.hash_iter().collect();
        assert_eq!(heap_hashes, direct_hashes);
    }

    #[test]
    fn test_wrap_empty() {
        let image = ThetaSketch::builder().build().serialize();
        assert_eq!(image.len(), 8);
        let direct = DirectCompactThetaSketch::wrap(HeapRegion::from_vec(image)).unwrap();
        assert!(direct.is_empty());
        assert_eq!(direct.estimate(), 0.0);
    }

    #[test]
    fn test_wrap_single_item() {
        let mut sketch = ThetaSketch::builder().build();
        sketch.update_u64(11);
        let image = sketch.serialize();
        assert_eq!(image.len(), 16);
        let direct = DirectCompactThetaSketch::wrap(HeapRegion::from_vec(image)).unwrap();
        assert_eq!(direct.num_retained(), 1);
        assert_eq!(direct.estimate(), 1.0);
    }

    #[test]
    fn test_wrap_truncated_image() {
        let mut image = populated_image(1_000);
        image.truncate(image.len() - 8);
        assert!(DirectCompactThetaSketch::wrap(HeapRegion::from_vec(image)).is_err());
    }

    #[test]
    fn test_same_resource() {
        let region = HeapRegion::from_vec(populated_image(10));
        let id = region.id();
        let direct = DirectCompactThetaSketch::wrap(region).unwrap();
        assert!(direct.is_same_resource(id));

        let copy = HeapRegion::from_vec(populated_image(10));
        assert!(!direct.is_same_resource(copy.id()));
    }
}
