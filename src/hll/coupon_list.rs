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

//! LIST mode: a small unsorted array of unique coupons.
//!
//! Sequential storage with linear search for duplicates. When the 9th
//! distinct coupon arrives the sketch promotes out of LIST mode.

use super::COUPON_EMPTY;

/// Fixed LIST capacity; the arrival of one more distinct coupon promotes.
pub(crate) const LIST_CAPACITY: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CouponList {
    coupons: [u32; LIST_CAPACITY],
    len: usize,
}

impl Default for CouponList {
    fn default() -> Self {
        Self {
            coupons: [COUPON_EMPTY; LIST_CAPACITY],
            len: 0,
        }
    }
}

impl CouponList {
    /// Insert a coupon, ignoring duplicates.
    ///
    /// Returns false when the list is full and the coupon is new; the caller
    /// must promote.
    pub fn update(&mut self, coupon: u32) -> bool {
        debug_assert_ne!(coupon, COUPON_EMPTY);
        for value in self.coupons.iter_mut() {
            if *value == COUPON_EMPTY {
                *value = coupon;
                self.len += 1;
                return true;
            }
            if *value == coupon {
                return true;
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.coupons
            .iter()
            .copied()
            .filter(|&c| c != COUPON_EMPTY)
    }
}
