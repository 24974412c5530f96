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

//! SET mode: an open-addressed hash set of coupons.
//!
//! Power-of-two capacity, probe address from the low 26 bits of the coupon,
//! odd stride so every slot is visited. Grows at 3/4 load.

use super::COUPON_EMPTY;
use super::KEY_MASK_26;

const LG_INIT_SET_SIZE: usize = 5;

/// Grow at 3/4 = 75% load factor.
const RESIZE_NUMER: usize = 3;
const RESIZE_DENOM: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CouponSet {
    lg_size: usize,
    coupons: Box<[u32]>,
    len: usize,
}

impl Default for CouponSet {
    fn default() -> Self {
        Self::with_lg_size(LG_INIT_SET_SIZE)
    }
}

impl CouponSet {
    fn with_lg_size(lg_size: usize) -> Self {
        Self {
            lg_size,
            coupons: vec![COUPON_EMPTY; 1 << lg_size].into_boxed_slice(),
            len: 0,
        }
    }

    /// Insert a coupon, ignoring duplicates.
    pub fn update(&mut self, coupon: u32) {
        debug_assert_ne!(coupon, COUPON_EMPTY);
        let mask = (1u32 << self.lg_size) - 1;
        let mut probe = coupon & mask;
        let start = probe;
        loop {
            let value = &mut self.coupons[probe as usize];
            if *value == COUPON_EMPTY {
                *value = coupon;
                self.len += 1;
                break;
            }
            if *value == coupon {
                return;
            }
            // Stride is always odd to ensure all slots are visited.
            let stride = ((coupon & KEY_MASK_26) >> self.lg_size) | 1;
            probe = (probe + stride) & mask;
            debug_assert_ne!(probe, start, "coupon set full; no empty slots");
        }
        if self.len * RESIZE_DENOM > self.coupons.len() * RESIZE_NUMER {
            self.grow();
        }
    }

    fn grow(&mut self) {
        let mut bigger = Self::with_lg_size(self.lg_size + 1);
        for &coupon in self.coupons.iter() {
            if coupon != COUPON_EMPTY {
                bigger.update(coupon);
            }
        }
        *self = bigger;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.coupons
            .iter()
            .copied()
            .filter(|&c| c != COUPON_EMPTY)
    }
}
