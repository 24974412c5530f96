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

//! Direct (region-backed) updatable quantiles sketch.
//!
//! All state lives in the backing region in the updatable layout: the full
//! preamble (kept even while empty), 2k base-buffer slots, then 2k slots per
//! level. The level bitmap is derived from `n`, so it is never stored.
//! Updates that would allocate a level beyond the region's capacity fail
//! with `CapacityExceeded` before any state is changed.

use super::CompactDoublesSketch;
use super::DirectCompactDoublesSketch;
use super::DoublesSketchView;
use super::serialization;
use super::serialization::DATA_START;
use super::serialization::FAMILY_BYTE;
use super::serialization::FLAGS_BYTE;
use super::serialization::FLAG_IS_COMPACT;
use super::serialization::FLAG_IS_EMPTY;
use super::serialization::FLAG_IS_READ_ONLY;
use super::serialization::K_SHORT;
use super::serialization::MAX_DOUBLE;
use super::serialization::MIN_DOUBLE;
use super::serialization::N_LONG;
use super::serialization::PREAMBLE_LONGS_FULL;
use super::serialization::PRE_LONGS_BYTE;
use super::serialization::SERIAL_VERSION;
use super::serialization::SER_VER_BYTE;
use super::sketch::merge_sorted;
use crate::common::RandomSource;
use crate::common::XorShift64;
use crate::error::Error;
use crate::family::Family;
use crate::memory::Region;
use crate::memory::RegionId;
use crate::memory::RegionMut;

/// Mutable quantiles sketch operating in place on a byte region.
///
/// Behaves exactly like [`DoublesSketch`](super::DoublesSketch); the two
/// produce byte-identical images given the same updates and random seed.
#[derive(Debug)]
pub struct DirectDoublesSketch<R: RegionMut> {
    k: u16,
    region: R,
    rng: XorShift64,
}

impl<R: RegionMut> DirectDoublesSketch<R> {
    pub(crate) fn new(k: u16, mut region: R, rng: XorShift64) -> Result<Self, Error> {
        serialization::check_k(k)?;
        let required = DATA_START + 8 * 2 * k as usize;
        if region.capacity() < required {
            return Err(Error::capacity(required, region.capacity()));
        }
        Self::write_empty_preamble(&mut region, k);
        Ok(Self { k, region, rng })
    }

    /// Wrap a region already holding an updatable image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed, is a compact/read-only
    /// image, or the region cannot hold the image's live state.
    pub fn wrap(mut region: R) -> Result<Self, Error> {
        let pre = serialization::parse_preamble(region.bytes())?;
        if pre.flags & (FLAG_IS_COMPACT | FLAG_IS_READ_ONLY) != 0 {
            return Err(Error::illegal_state(
                "cannot wrap a compact or read-only image for updates",
            ));
        }
        let required = serialization::updatable_storage_bytes(pre.k, pre.n)
            .max(DATA_START + 8 * 2 * pre.k as usize);
        if region.capacity() < required {
            return Err(Error::capacity(required, region.capacity()));
        }
        if pre.pre_longs != PREAMBLE_LONGS_FULL {
            // A bare empty image: expand to the live layout.
            Self::write_empty_preamble(&mut region, pre.k);
        }
        Ok(Self {
            k: pre.k,
            region,
            rng: XorShift64::default(),
        })
    }

    fn write_empty_preamble(region: &mut R, k: u16) {
        region.put_u8(PRE_LONGS_BYTE, PREAMBLE_LONGS_FULL);
        region.put_u8(SER_VER_BYTE, SERIAL_VERSION);
        region.put_u8(FAMILY_BYTE, Family::QUANTILES.id);
        region.put_u8(3, 0);
        region.put_u8(FLAGS_BYTE, FLAG_IS_EMPTY);
        region.put_u16(K_SHORT, k);
        region.put_u8(7, 0);
        region.put_u64(N_LONG, 0);
        region.put_f64(MIN_DOUBLE, f64::NAN);
        region.put_f64(MAX_DOUBLE, f64::NAN);
    }

    /// Seed the compactor's random stream (primarily for tests).
    pub fn set_random_seed(&mut self, seed: u64) {
        self.rng = XorShift64::seeded(seed);
    }

    /// Present an item to the sketch. NaN values are ignored.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the update would populate a level the
    /// region cannot hold; the sketch is unchanged in that case.
    pub fn update(&mut self, value: f64) -> Result<(), Error> {
        if value.is_nan() {
            return Ok(());
        }
        let two_k = 2 * self.k as usize;
        let n = self.region.get_u64(N_LONG);
        let bb_count = (n % two_k as u64) as usize;
        let compacting = bb_count + 1 == two_k;

        if compacting {
            // The carry settles at the lowest clear bit of the current
            // pattern; make sure that level fits before touching anything.
            let bit_pattern = n / two_k as u64;
            let final_level = bit_pattern.trailing_ones() as usize;
            let required = DATA_START + 8 * two_k * (2 + final_level);
            if self.region.capacity() < required {
                return Err(Error::capacity(required, self.region.capacity()));
            }
        }

        if n == 0 {
            self.region.put_f64(MIN_DOUBLE, value);
            self.region.put_f64(MAX_DOUBLE, value);
            let flags = self.region.get_u8(FLAGS_BYTE) & !FLAG_IS_EMPTY;
            self.region.put_u8(FLAGS_BYTE, flags);
        } else {
            if value < self.region.get_f64(MIN_DOUBLE) {
                self.region.put_f64(MIN_DOUBLE, value);
            }
            if value > self.region.get_f64(MAX_DOUBLE) {
                self.region.put_f64(MAX_DOUBLE, value);
            }
        }

        self.region.put_f64(DATA_START + 8 * bb_count, value);
        self.region.put_u64(N_LONG, n + 1);

        if compacting {
            let mut input: Vec<f64> = (0..two_k)
                .map(|i| self.region.get_f64(DATA_START + 8 * i))
                .collect();
            input.sort_unstable_by(f64::total_cmp);
            self.propagate_carry(n / two_k as u64, 0, input);
        }
        Ok(())
    }

    /// Carry a sorted 2k-item run through the in-region levels.
    ///
    /// `bit_pattern` is the pattern before this carry is added.
    fn propagate_carry(&mut self, bit_pattern: u64, start_level: u8, mut in_arr: Vec<f64>) {
        let two_k = 2 * self.k as usize;
        let mut level = start_level;
        while bit_pattern & (1u64 << level) != 0 {
            let existing = self.read_level(level);
            let merged = merge_sorted(&in_arr, &existing);
            let offset = usize::from(self.rng.next_bool());
            in_arr = merged.into_iter().skip(offset).step_by(2).collect();
            level += 1;
        }
        let start = DATA_START + 8 * (two_k + level as usize * two_k);
        for (i, item) in in_arr.iter().enumerate() {
            self.region.put_f64(start + 8 * i, *item);
        }
    }

    fn read_level(&self, level: u8) -> Vec<f64> {
        let two_k = 2 * self.k as usize;
        let start = DATA_START + 8 * (two_k + level as usize * two_k);
        (0..two_k)
            .map(|i| self.region.get_f64(start + 8 * i))
            .collect()
    }

    /// Convert to the immutable heap-backed compact form.
    pub fn compact(&self) -> CompactDoublesSketch {
        CompactDoublesSketch::from_view(self)
    }

    /// Write the compact form into a caller-provided region and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the destination region is too small.
    pub fn compact_into<R2: RegionMut>(
        &self,
        region: R2,
    ) -> Result<DirectCompactDoublesSketch<R2>, Error> {
        DirectCompactDoublesSketch::from_view(self, region)
    }

    /// Reset to the empty state, keeping k and the backing region.
    pub fn reset(&mut self) {
        let k = self.k;
        Self::write_empty_preamble(&mut self.region, k);
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

impl<R: RegionMut> DoublesSketchView for DirectDoublesSketch<R> {
    fn k(&self) -> u16 {
        self.k
    }

    fn n(&self) -> u64 {
        self.region.get_u64(N_LONG)
    }

    fn min_value(&self) -> Option<f64> {
        (self.n() > 0).then(|| self.region.get_f64(MIN_DOUBLE))
    }

    fn max_value(&self) -> Option<f64> {
        (self.n() > 0).then(|| self.region.get_f64(MAX_DOUBLE))
    }

    fn base_buffer_items(&self) -> Vec<f64> {
        let bb_count = serialization::compute_base_buffer_count(self.k, self.n());
        (0..bb_count)
            .map(|i| self.region.get_f64(DATA_START + 8 * i))
            .collect()
    }

    fn level_items(&self, level: u8) -> Vec<f64> {
        debug_assert!(self.bit_pattern() & (1u64 << level) != 0);
        self.read_level(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::HeapRegion;
    use crate::quantiles::DoublesSketch;

    #[test]
    fn test_build_requires_base_capacity() {
        // k = 16 needs 32 + 16*16 = 288 bytes minimum.
        let region = HeapRegion::new(100);
        assert!(
            DoublesSketch::builder()
                .k(16)
                .build_direct(region)
                .is_err()
        );
        let region = HeapRegion::new(288);
        assert!(
            DoublesSketch::builder()
                .k(16)
                .build_direct(region)
                .is_ok()
        );
    }

    #[test]
    fn test_direct_matches_heap_images() {
        let mut heap = DoublesSketch::builder().k(16).random_seed(5).build();
        let mut direct = DoublesSketch::builder()
            .k(16)
            .random_seed(5)
            .build_direct(HeapRegion::new(10_000))
            .unwrap();
        for i in 0..2_000 {
            heap.update(i as f64);
            direct.update(i as f64).unwrap();
        }
        assert_eq!(heap.to_byte_array(true), direct.to_byte_array(true));
        assert_eq!(heap.to_byte_array(false), direct.to_byte_array(false));
    }

    #[test]
    fn test_capacity_exceeded_is_transactional() {
        // Room for the base buffer and level 0 only.
        let k = 16usize;
        let capacity = 32 + 8 * 2 * k * 2;
        let mut direct = DoublesSketch::builder()
            .k(k as u16)
            .random_seed(1)
            .build_direct(HeapRegion::new(capacity))
            .unwrap();
        // 2k updates fill the base buffer and settle in level 0.
        for i in 0..(2 * k) {
            direct.update(i as f64).unwrap();
        }
        assert_eq!(direct.bit_pattern(), 1);
        // The next 2k - 1 fit in the base buffer; the final one needs level 1.
        for i in 0..(2 * k - 1) {
            direct.update(i as f64).unwrap();
        }
        let n_before = direct.n();
        let err = direct.update(0.0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CapacityExceeded);
        assert_eq!(direct.n(), n_before, "failed update must not commit");
    }

    #[test]
    fn test_wrap_continues_updating() {
        let mut direct = DoublesSketch::builder()
            .k(32)
            .random_seed(2)
            .build_direct(HeapRegion::new(20_000))
            .unwrap();
        for i in 0..1_000 {
            direct.update(i as f64).unwrap();
        }
        let image = direct.to_byte_array(false);
        let mut region = HeapRegion::new(20_000);
        region.bytes_mut()[..image.len()].copy_from_slice(&image);
        let mut wrapped = DirectDoublesSketch::wrap(region).unwrap();
        for i in 1_000..2_000 {
            wrapped.update(i as f64).unwrap();
        }
        assert_eq!(wrapped.n(), 2_000);
        assert_eq!(wrapped.min_value(), Some(0.0));
        assert_eq!(wrapped.max_value(), Some(1_999.0));
    }

    #[test]
    fn test_wrap_rejects_compact_image() {
        let mut heap = DoublesSketch::builder().k(16).build();
        heap.update(1.0);
        let region = HeapRegion::from_vec(heap.to_byte_array(true));
        let err = DirectDoublesSketch::wrap(region).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::IllegalState);
    }

    #[test]
    fn test_reset() {
        let mut direct = DoublesSketch::builder()
            .k(16)
            .build_direct(HeapRegion::new(10_000))
            .unwrap();
        for i in 0..100 {
            direct.update(i as f64).unwrap();
        }
        direct.reset();
        assert!(direct.is_empty());
        direct.update(3.0).unwrap();
        assert_eq!(direct.n(), 1);
        assert_eq!(direct.min_value(), Some(3.0));
    }
}
