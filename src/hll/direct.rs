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

//! Direct (region-backed) read-only HLL sketch.
//!
//! Wraps a serialized HLL image held in a caller-owned byte region and
//! answers queries straight from the image. Convert with
//! [`HllSketch::deserialize`](super::HllSketch::deserialize) to obtain an
//! updatable heap sketch.

use super::COUPON_RSE;
use super::CurMode;
use super::HllType;
use super::array::HllArray;
use super::estimator;
use super::serialization::*;
use super::sketch::check_lg_k;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::family::Family;
use crate::memory::Region;
use crate::memory::RegionId;

/// A read-only HLL sketch answering queries from a wrapped byte region.
#[derive(Debug)]
pub struct DirectHllSketch<R: Region> {
    region: R,
    lg_config_k: u8,
    tgt_type: HllType,
    cur_mode: CurMode,
    coupon_count: usize,
    out_of_order: bool,
    is_empty: bool,
}

impl<R: Region> DirectHllSketch<R> {
    /// Wrap a region holding a serialized HLL image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed.
    pub fn wrap(region: R) -> Result<Self, Error> {
        let bytes = region.bytes();
        if bytes.len() < 8 {
            return Err(Error::insufficient_data("preamble"));
        }

        let preamble_ints = bytes[PREAMBLE_INTS_BYTE];
        let serial_version = bytes[SER_VER_BYTE];
        let family_id = bytes[FAMILY_BYTE];
        let lg_config_k = bytes[LG_K_BYTE];
        let flags = bytes[FLAGS_BYTE];
        let mode_byte = bytes[MODE_BYTE];

        Family::HLL.validate_id(family_id)?;
        if serial_version != SERIAL_VERSION {
            return Err(Error::unsupported_serial_version(
                SERIAL_VERSION,
                serial_version,
            ));
        }
        check_lg_k(lg_config_k)?;
        let cur_mode = CurMode::from_code(extract_cur_mode(mode_byte))
            .ok_or_else(|| Error::deserial("invalid current mode code"))?;
        let tgt_type = HllType::from_code(extract_tgt_type(mode_byte))
            .ok_or_else(|| Error::deserial("invalid target type code"))?;

        let is_empty = flags & FLAG_IS_EMPTY != 0;
        let out_of_order = flags & FLAG_OUT_OF_ORDER != 0;

        let (expected_pre, coupon_count, data_needed) = match cur_mode {
            CurMode::List => {
                let count = bytes[LIST_COUNT_BYTE] as usize;
                (LIST_PREINTS, count, LIST_INT_ARR_START + count * 4)
            }
            CurMode::Set => {
                if bytes.len() < HASH_SET_INT_ARR_START {
                    return Err(Error::insufficient_data("coupon_count"));
                }
                let count = region.get_u32(HASH_SET_COUNT_INT) as usize;
                (HASH_SET_PREINTS, count, HASH_SET_INT_ARR_START + count * 4)
            }
            CurMode::Hll => {
                let packed = HllArray::packed_image_bytes(lg_config_k, tgt_type);
                if bytes.len() < HLL_BYTE_ARR_START {
                    return Err(Error::insufficient_data("hll_preamble"));
                }
                let aux_count = region.get_u32(AUX_COUNT_INT) as usize;
                (
                    HLL_PREINTS,
                    0,
                    HLL_BYTE_ARR_START + packed + aux_count * 4,
                )
            }
        };
        if preamble_ints != expected_pre {
            return Err(Error::deserial(format!(
                "mode {cur_mode:?} requires {expected_pre} preamble ints, got {preamble_ints}"
            )));
        }
        if region.capacity() < data_needed {
            return Err(Error::capacity(data_needed, region.capacity()));
        }

        Ok(Self {
            region,
            lg_config_k,
            tgt_type,
            cur_mode,
            coupon_count,
            out_of_order,
            is_empty,
        })
    }

    /// The configured log2 bucket count.
    pub fn lg_config_k(&self) -> u8 {
        self.lg_config_k
    }

    /// The target register packing of the image.
    pub fn tgt_type(&self) -> HllType {
        self.tgt_type
    }

    /// The storage mode of the image.
    pub fn cur_mode(&self) -> CurMode {
        self.cur_mode
    }

    /// True if the image holds no data.
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// True if the image was built from out-of-order reconstruction.
    pub fn is_out_of_order(&self) -> bool {
        self.out_of_order
    }

    /// The cardinality estimate, computed directly from the image.
    pub fn estimate(&self) -> f64 {
        match self.cur_mode {
            CurMode::List | CurMode::Set => estimator::coupon_estimate(self.coupon_count),
            CurMode::Hll => {
                if !self.out_of_order {
                    return self.region.get_f64(HIP_ACCUM_DOUBLE);
                }
                let kxq_sum =
                    self.region.get_f64(KXQ0_DOUBLE) + self.region.get_f64(KXQ1_DOUBLE);
                let num_zero = self.region.get_u32(NUM_ZERO_COUNT_INT);
                estimator::composite_estimate(self.lg_config_k, kxq_sum, num_zero)
            }
        }
    }

    /// Approximate lower error bound at the given confidence level.
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let nsd = num_std_dev.value();
        let estimate = self.estimate();
        match self.cur_mode {
            CurMode::List | CurMode::Set => {
                (estimate / (1.0 + nsd * COUPON_RSE)).max(self.coupon_count as f64)
            }
            CurMode::Hll => {
                let factor = if self.out_of_order { 1.04 } else { 0.8325 };
                estimate / (1.0 + estimator::relative_error(self.lg_config_k, factor, nsd))
            }
        }
    }

    /// Approximate upper error bound at the given confidence level.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let nsd = num_std_dev.value();
        let estimate = self.estimate();
        match self.cur_mode {
            CurMode::List | CurMode::Set => estimate / (1.0 - nsd * COUPON_RSE),
            CurMode::Hll => {
                let factor = if self.out_of_order { 1.04 } else { 0.8325 };
                estimate / (1.0 - estimator::relative_error(self.lg_config_k, factor, nsd))
            }
        }
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
