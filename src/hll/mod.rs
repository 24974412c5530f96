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

//! HyperLogLog sketch for cardinality estimation.
//!
//! Storage adapts to the cardinality through three modes:
//!
//! - **LIST**: up to 8 unique coupons in a small array.
//! - **SET**: an open-addressed coupon hash set, up to K/8 coupons.
//! - **HLL**: the packed K-bucket register array with the HIP and composite
//!   estimators.
//!
//! A coupon packs a 26-bit slot address with a 6-bit leading-zero value:
//! `((min(clz(h1), 62) + 1) << 26) | (h0 & 0x03FF_FFFF)`.

mod array;
mod aux_map;
mod coupon_list;
mod coupon_set;
mod direct;
pub(crate) mod estimator;
pub(crate) mod serialization;
mod sketch;
mod union;

pub use direct::DirectHllSketch;
pub use serialization::MAX_LG_K;
pub use serialization::MIN_LG_K;
pub use sketch::HllSketch;
pub use union::HllUnion;

const KEY_BITS_26: u32 = 26;
const KEY_MASK_26: u32 = (1 << KEY_BITS_26) - 1;

/// Sentinel value indicating an empty coupon slot.
const COUPON_EMPTY: u32 = 0;

const COUPON_RSE_FACTOR: f64 = 0.409; // at transition point not the asymptote
pub(crate) const COUPON_RSE: f64 = COUPON_RSE_FACTOR / (1 << 13) as f64;

/// Target HLL register packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HllType {
    /// 4 bits per bucket, exceptions in the auxiliary map. Most compact.
    Hll4 = 0,
    /// 6 bits per bucket; never overflows.
    Hll6 = 1,
    /// 8 bits per bucket; fastest access.
    Hll8 = 2,
}

impl HllType {
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(HllType::Hll4),
            1 => Some(HllType::Hll6),
            2 => Some(HllType::Hll8),
            _ => None,
        }
    }
}

/// Current storage mode of an HLL sketch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurMode {
    List = 0,
    Set = 1,
    Hll = 2,
}

impl CurMode {
    pub(crate) fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(CurMode::List),
            1 => Some(CurMode::Set),
            2 => Some(CurMode::Hll),
            _ => None,
        }
    }
}

/// Extract slot number (low 26 bits) from coupon
#[inline]
pub(crate) fn get_slot(coupon: u32) -> u32 {
    coupon & KEY_MASK_26
}

/// Extract value (upper 6 bits) from coupon
#[inline]
pub(crate) fn get_value(coupon: u32) -> u8 {
    (coupon >> KEY_BITS_26) as u8
}

/// Pack slot number and value into a coupon
///
/// Format: [value (6 bits) << 26] | [slot (26 bits)]
#[inline]
pub(crate) fn pack_coupon(slot: u32, value: u8) -> u32 {
    ((value as u32) << KEY_BITS_26) | (slot & KEY_MASK_26)
}

/// Derive the coupon from a 128-bit hash.
#[inline]
pub(crate) fn coupon(hash: (u64, u64)) -> u32 {
    let (h0, h1) = hash;
    let addr26 = h0 as u32 & KEY_MASK_26;
    let lz = h1.leading_zeros();
    let value = lz.min(62) as u8 + 1;
    pack_coupon(addr26, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_coupon() {
        let slot = 12345u32;
        let value = 42u8;
        let coupon = pack_coupon(slot, value);
        assert_eq!(get_slot(coupon), slot);
        assert_eq!(get_value(coupon), value);
    }

    #[test]
    fn test_coupon_value_is_capped() {
        // h1 = 0 has 64 leading zeros; the value caps at 62 + 1.
        let c = coupon((7, 0));
        assert_eq!(get_value(c), 63);
        assert_eq!(get_slot(c), 7);
    }

    #[test]
    fn test_coupon_value_counts_leading_zeros() {
        // Top bit set: zero leading zeros, value 1.
        let c = coupon((0, u64::MAX));
        assert_eq!(get_value(c), 1);
        let c = coupon((0, 1u64 << 55));
        assert_eq!(get_value(c), 9);
    }
}
