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

//! HLL Union for combining multiple HLL sketches.
//!
//! The union maintains an internal 8-bit "gadget" sketch at the configured
//! maximum precision. Coupon-mode sources feed their coupons straight into
//! the gadget; HLL-mode sources merge register-wise, folding whichever side
//! has more buckets down by slot masking. Union results carry the
//! out-of-order flag, so they estimate with the composite estimator.

use super::HllSketch;
use super::HllType;
use super::array::HllArray;
use super::coupon;
use super::pack_coupon;
use super::sketch::Mode;
use super::sketch::check_lg_k;
use crate::error::Error;
use crate::hash;
use crate::hash::DEFAULT_UPDATE_SEED;

/// Union operator over HLL sketches of equal or compatible K.
///
/// # Examples
///
/// ```
/// use sketches_core::hll::HllSketch;
/// use sketches_core::hll::HllType;
/// use sketches_core::hll::HllUnion;
///
/// let mut a = HllSketch::new(12).unwrap();
/// let mut b = HllSketch::new(12).unwrap();
/// for i in 0..1000u64 {
///     a.update_u64(i);
///     b.update_u64(i + 500);
/// }
/// let mut union = HllUnion::new(12).unwrap();
/// union.update(&a);
/// union.update(&b);
/// let result = union.result(HllType::Hll4);
/// let estimate = result.estimate();
/// assert!(estimate > 1_350.0 && estimate < 1_650.0);
/// ```
#[derive(Debug, Clone)]
pub struct HllUnion {
    lg_max_k: u8,
    gadget: HllSketch,
}

impl HllUnion {
    /// Create a union able to absorb sketches up to `lg_max_k` precision.
    ///
    /// # Errors
    ///
    /// Returns an error if `lg_max_k` is outside [4, 21].
    pub fn new(lg_max_k: u8) -> Result<Self, Error> {
        check_lg_k(lg_max_k)?;
        Ok(Self {
            lg_max_k,
            gadget: HllSketch::with_type(lg_max_k, HllType::Hll8)
                .expect("lg_max_k already validated"),
        })
    }

    /// The maximum precision this union was configured with.
    pub fn lg_max_k(&self) -> u8 {
        self.lg_max_k
    }

    /// The precision of the accumulated state, which can only shrink.
    pub fn lg_config_k(&self) -> u8 {
        self.gadget.lg_config_k()
    }

    /// True if no data has been presented.
    pub fn is_empty(&self) -> bool {
        self.gadget.is_empty()
    }

    /// The current estimate of the accumulated union.
    pub fn estimate(&self) -> f64 {
        self.gadget.estimate()
    }

    /// Merge a sketch into the union.
    pub fn update(&mut self, sketch: &HllSketch) {
        if sketch.is_empty() {
            return;
        }
        match sketch.mode() {
            Mode::List(list) => {
                let coupons: Vec<u32> = list.iter().collect();
                for coupon in coupons {
                    self.gadget.coupon_update(coupon);
                }
            }
            Mode::Set(set) => {
                let coupons: Vec<u32> = set.iter().collect();
                for coupon in coupons {
                    self.gadget.coupon_update(coupon);
                }
            }
            Mode::Hll(src) => {
                let src_lg = sketch.lg_config_k();
                if src_lg < self.gadget.lg_config_k() {
                    self.fold_gadget(src_lg);
                }
                self.promote_gadget_to_hll();
                let Mode::Hll(dst) = self.gadget.mode() else {
                    unreachable!("gadget was just promoted to HLL mode");
                };
                // The destination mask folds wider sources automatically.
                let merged = merge_registers(dst.clone(), src);
                self.gadget = HllSketch::from_mode(
                    self.gadget.lg_config_k(),
                    HllType::Hll8,
                    Mode::Hll(merged),
                );
            }
        }
        // Register-wise reconstruction invalidates HIP.
        if let Mode::Hll(_) = self.gadget.mode() {
            self.set_gadget_out_of_order();
        }
    }

    fn set_gadget_out_of_order(&mut self) {
        let lg = self.gadget.lg_config_k();
        if let Mode::Hll(array) = self.gadget.mode() {
            if !array.estimator().is_out_of_order() {
                let mut array = array.clone();
                array.estimator_mut().set_out_of_order(true);
                self.gadget = HllSketch::from_mode(lg, HllType::Hll8, Mode::Hll(array));
            }
        }
    }

    /// Rebuild the gadget at a smaller precision by slot masking.
    fn fold_gadget(&mut self, new_lg: u8) {
        let mut folded = HllArray::new(new_lg, HllType::Hll8);
        match self.gadget.mode() {
            Mode::List(list) => {
                for coupon in list.iter() {
                    folded.update(coupon);
                }
            }
            Mode::Set(set) => {
                for coupon in set.iter() {
                    folded.update(coupon);
                }
            }
            Mode::Hll(array) => {
                for slot in 0..array.num_buckets() as u32 {
                    let value = array.get(slot);
                    if value > 0 {
                        folded.update(pack_coupon(slot, value));
                    }
                }
            }
        }
        folded.estimator_mut().set_out_of_order(true);
        self.gadget = HllSketch::from_mode(new_lg, HllType::Hll8, Mode::Hll(folded));
    }

    /// Ensure the gadget is in HLL mode before a register-wise merge.
    fn promote_gadget_to_hll(&mut self) {
        if matches!(self.gadget.mode(), Mode::Hll(_)) {
            return;
        }
        let lg = self.gadget.lg_config_k();
        let mut array = HllArray::new(lg, HllType::Hll8);
        match self.gadget.mode() {
            Mode::List(list) => {
                for coupon in list.iter() {
                    array.update(coupon);
                }
            }
            Mode::Set(set) => {
                for coupon in set.iter() {
                    array.update(coupon);
                }
            }
            Mode::Hll(_) => unreachable!(),
        }
        self.gadget = HllSketch::from_mode(lg, HllType::Hll8, Mode::Hll(array));
    }

    /// Present an unsigned 64-bit datum directly to the union.
    pub fn update_u64(&mut self, datum: u64) {
        self.gadget
            .coupon_update(coupon(hash::hash_u64(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a signed 64-bit datum directly to the union.
    pub fn update_i64(&mut self, datum: i64) {
        self.gadget
            .coupon_update(coupon(hash::hash_i64(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a double datum directly to the union.
    pub fn update_f64(&mut self, datum: f64) {
        self.gadget
            .coupon_update(coupon(hash::hash_f64(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a string directly to the union. Empty strings are a no-op.
    pub fn update_str(&mut self, datum: &str) {
        if datum.is_empty() {
            return;
        }
        self.gadget
            .coupon_update(coupon(hash::hash_str(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a byte array directly to the union. Empty arrays are a no-op.
    pub fn update_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.gadget
            .coupon_update(coupon(hash::hash_bytes(data, DEFAULT_UPDATE_SEED)));
    }

    /// The union result converted to the requested target packing.
    ///
    /// The result's HIP estimator is marked out of order; further updates to
    /// the union are allowed.
    pub fn result(&self, tgt_type: HllType) -> HllSketch {
        let lg = self.gadget.lg_config_k();
        match self.gadget.mode() {
            Mode::List(list) => HllSketch::from_mode(lg, tgt_type, Mode::List(list.clone())),
            Mode::Set(set) => HllSketch::from_mode(lg, tgt_type, Mode::Set(set.clone())),
            Mode::Hll(array) => {
                let mut converted = HllArray::new(lg, tgt_type);
                for slot in 0..array.num_buckets() as u32 {
                    let value = array.get(slot);
                    if value > 0 {
                        converted.update(pack_coupon(slot, value));
                    }
                }
                converted.estimator_mut().set_out_of_order(true);
                HllSketch::from_mode(lg, tgt_type, Mode::Hll(converted))
            }
        }
    }

    /// Reset the union to its initial empty state.
    pub fn reset(&mut self) {
        self.gadget = HllSketch::with_type(self.lg_max_k, HllType::Hll8)
            .expect("lg_max_k already validated");
    }
}

/// Merge source registers into the destination, masking wider sources down.
fn merge_registers(mut dst: HllArray, src: &HllArray) -> HllArray {
    debug_assert!(src.lg_config_k() >= dst.lg_config_k());
    for slot in 0..src.num_buckets() as u32 {
        let value = src.get(slot);
        if value > 0 {
            dst.update(pack_coupon(slot, value));
        }
    }
    dst
}
