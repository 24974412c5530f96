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

//! HLL mode: the packed K-bucket register array.
//!
//! Buckets hold the maximum leading-zero value seen for their slot, packed
//! at 4, 6, or 8 bits per bucket. The 4-bit packing stores 15 as an
//! exception marker and keeps the full value in the auxiliary map; 6-bit
//! packing never overflows because coupon values cap at 63.

use super::HllType;
use super::aux_map::AuxMap;
use super::estimator::HipEstimator;
use super::get_slot;
use super::get_value;

/// 4-bit value marking an auxiliary map exception.
const AUX_TOKEN: u8 = 15;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HllArray {
    lg_config_k: u8,
    tgt_type: HllType,
    packed: Vec<u8>,
    aux: Option<AuxMap>,
    /// Buckets still at zero, for the linear-counting correction.
    num_zero: u32,
    estimator: HipEstimator,
}

impl HllArray {
    pub fn new(lg_config_k: u8, tgt_type: HllType) -> Self {
        let k = 1usize << lg_config_k;
        let packed = vec![0u8; Self::packed_mem_bytes(lg_config_k, tgt_type)];
        Self {
            lg_config_k,
            tgt_type,
            packed,
            aux: None,
            num_zero: k as u32,
            estimator: HipEstimator::new(lg_config_k),
        }
    }

    /// In-memory packed length; Hll6 carries one pad byte for unaligned reads.
    fn packed_mem_bytes(lg_config_k: u8, tgt_type: HllType) -> usize {
        let k = 1usize << lg_config_k;
        match tgt_type {
            HllType::Hll4 => k / 2,
            HllType::Hll6 => 3 * k / 4 + 1,
            HllType::Hll8 => k,
        }
    }

    /// Serialized packed length (no padding).
    pub fn packed_image_bytes(lg_config_k: u8, tgt_type: HllType) -> usize {
        let k = 1usize << lg_config_k;
        match tgt_type {
            HllType::Hll4 => k / 2,
            HllType::Hll6 => 3 * k / 4,
            HllType::Hll8 => k,
        }
    }

    pub fn lg_config_k(&self) -> u8 {
        self.lg_config_k
    }

    pub fn tgt_type(&self) -> HllType {
        self.tgt_type
    }

    pub fn num_buckets(&self) -> usize {
        1 << self.lg_config_k
    }

    pub fn num_zero(&self) -> u32 {
        self.num_zero
    }

    pub fn estimator(&self) -> &HipEstimator {
        &self.estimator
    }

    pub fn estimator_mut(&mut self) -> &mut HipEstimator {
        &mut self.estimator
    }

    pub fn aux(&self) -> Option<&AuxMap> {
        self.aux.as_ref()
    }

    /// The packed array exactly as serialized.
    pub fn packed_image(&self) -> &[u8] {
        &self.packed[..Self::packed_image_bytes(self.lg_config_k, self.tgt_type)]
    }

    fn get_raw4(&self, slot: u32) -> u8 {
        let byte = self.packed[(slot >> 1) as usize];
        if slot & 1 == 0 { byte & 0x0F } else { byte >> 4 }
    }

    fn put_raw4(&mut self, slot: u32, value: u8) {
        debug_assert!(value <= AUX_TOKEN);
        let index = (slot >> 1) as usize;
        let old = self.packed[index];
        self.packed[index] = if slot & 1 == 0 {
            (old & 0xF0) | value
        } else {
            (old & 0x0F) | (value << 4)
        };
    }

    fn get6(&self, slot: u32) -> u8 {
        let bit = slot as usize * 6;
        let byte = bit >> 3;
        let shift = bit & 7;
        let window = self.packed[byte] as u16 | ((self.packed[byte + 1] as u16) << 8);
        ((window >> shift) & 0x3F) as u8
    }

    fn put6(&mut self, slot: u32, value: u8) {
        debug_assert!(value <= 63);
        let bit = slot as usize * 6;
        let byte = bit >> 3;
        let shift = bit & 7;
        let mut window = self.packed[byte] as u16 | ((self.packed[byte + 1] as u16) << 8);
        window &= !(0x3F << shift);
        window |= (value as u16) << shift;
        self.packed[byte] = window as u8;
        self.packed[byte + 1] = (window >> 8) as u8;
    }

    /// Current value of a bucket.
    pub fn get(&self, slot: u32) -> u8 {
        match self.tgt_type {
            HllType::Hll4 => {
                let raw = self.get_raw4(slot);
                if raw < AUX_TOKEN {
                    raw
                } else {
                    self.aux
                        .as_ref()
                        .and_then(|aux| aux.get(slot))
                        .expect("aux token present but slot not in aux map")
                }
            }
            HllType::Hll6 => self.get6(slot),
            HllType::Hll8 => self.packed[slot as usize],
        }
    }

    fn set(&mut self, slot: u32, value: u8) {
        match self.tgt_type {
            HllType::Hll4 => {
                if value < AUX_TOKEN {
                    self.put_raw4(slot, value);
                } else {
                    // Overflow: keep the marker packed and the value in aux.
                    let was_exception = self.get_raw4(slot) == AUX_TOKEN;
                    self.put_raw4(slot, AUX_TOKEN);
                    let aux = self.aux.get_or_insert_with(AuxMap::new);
                    if was_exception {
                        aux.replace(slot, value);
                    } else {
                        aux.insert(slot, value);
                    }
                }
            }
            HllType::Hll6 => self.put6(slot, value),
            HllType::Hll8 => self.packed[slot as usize] = value,
        }
    }

    /// Present a coupon: monotone max on the addressed bucket.
    pub fn update(&mut self, coupon: u32) {
        let mask = (1u32 << self.lg_config_k) - 1;
        let slot = get_slot(coupon) & mask;
        let new_value = get_value(coupon);
        let old_value = self.get(slot);
        if new_value <= old_value {
            return;
        }
        self.estimator.update(self.lg_config_k, old_value, new_value);
        if old_value == 0 {
            self.num_zero -= 1;
        }
        self.set(slot, new_value);
    }

    /// Current cardinality estimate.
    pub fn estimate(&self) -> f64 {
        self.estimator.estimate(self.lg_config_k, self.num_zero)
    }

    /// Rebuild an array from deserialized parts.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        lg_config_k: u8,
        tgt_type: HllType,
        packed_image: &[u8],
        aux: Option<AuxMap>,
        hip_accum: f64,
        kxq0: f64,
        kxq1: f64,
        out_of_order: bool,
    ) -> Self {
        let mut packed = vec![0u8; Self::packed_mem_bytes(lg_config_k, tgt_type)];
        packed[..packed_image.len()].copy_from_slice(packed_image);
        let mut array = Self {
            lg_config_k,
            tgt_type,
            packed,
            aux,
            num_zero: 0,
            estimator: HipEstimator::new(lg_config_k),
        };
        array.num_zero = (0..array.num_buckets() as u32)
            .filter(|&slot| array.get(slot) == 0)
            .count() as u32;
        array.estimator.set_hip_accum(hip_accum);
        array.estimator.set_kxq(kxq0, kxq1);
        // Clears the accumulator again when out of order.
        array.estimator.set_out_of_order(out_of_order);
        array
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hll::pack_coupon;

    #[test]
    fn test_monotone_update() {
        for tgt in [HllType::Hll4, HllType::Hll6, HllType::Hll8] {
            let mut array = HllArray::new(4, tgt);
            array.update(pack_coupon(3, 5));
            assert_eq!(array.get(3), 5);
            array.update(pack_coupon(3, 2));
            assert_eq!(array.get(3), 5, "{tgt:?} must not decrease");
            array.update(pack_coupon(3, 9));
            assert_eq!(array.get(3), 9);
        }
    }

    #[test]
    fn test_hll4_packing() {
        let mut array = HllArray::new(4, HllType::Hll4);
        array.update(pack_coupon(0, 5));
        array.update(pack_coupon(1, 7));
        // Both nibbles share byte 0.
        assert_eq!(array.packed_image()[0], 0x75);
    }

    #[test]
    fn test_hll4_aux_exception() {
        let mut array = HllArray::new(4, HllType::Hll4);
        array.update(pack_coupon(2, 20));
        assert_eq!(array.get(2), 20);
        let aux = array.aux().expect("exception should create the aux map");
        assert_eq!(aux.get(2), Some(20));
        // A larger exception replaces in place.
        array.update(pack_coupon(2, 33));
        assert_eq!(array.get(2), 33);
        assert_eq!(array.aux().unwrap().len(), 1);
    }

    #[test]
    fn test_hll6_bit_packing_round_trip() {
        let mut array = HllArray::new(6, HllType::Hll6);
        for slot in 0..64u32 {
            let value = (slot % 63 + 1) as u8;
            array.update(pack_coupon(slot, value));
        }
        for slot in 0..64u32 {
            assert_eq!(array.get(slot), (slot % 63 + 1) as u8, "slot {slot}");
        }
    }

    #[test]
    fn test_num_zero_tracks_first_hits() {
        let mut array = HllArray::new(5, HllType::Hll8);
        assert_eq!(array.num_zero(), 32);
        array.update(pack_coupon(0, 1));
        array.update(pack_coupon(1, 2));
        array.update(pack_coupon(0, 3));
        assert_eq!(array.num_zero(), 30);
    }

    #[test]
    fn test_estimate_reasonable() {
        let mut array = HllArray::new(10, HllType::Hll8);
        for i in 0..10_000u64 {
            let coupon = crate::hll::coupon(crate::hash::hash_u64(
                i,
                crate::hash::DEFAULT_UPDATE_SEED,
            ));
            array.update(coupon);
        }
        let estimate = array.estimate();
        assert!(
            estimate > 8_000.0 && estimate < 12_000.0,
            "estimate {estimate}"
        );
    }

    #[test]
    fn test_from_parts_round_trip() {
        let mut array = HllArray::new(8, HllType::Hll6);
        for slot in 0..100u32 {
            array.update(pack_coupon(slot, (slot % 40 + 1) as u8));
        }
        let rebuilt = HllArray::from_parts(
            8,
            HllType::Hll6,
            array.packed_image(),
            None,
            array.estimator().hip_accum(),
            array.estimator().kxq0(),
            array.estimator().kxq1(),
            false,
        );
        assert_eq!(rebuilt.num_zero(), array.num_zero());
        for slot in 0..256u32 {
            assert_eq!(rebuilt.get(slot), array.get(slot));
        }
        assert_eq!(rebuilt.estimate(), array.estimate());
    }
}
