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

use std::fmt;

use byteorder::ByteOrder;
use byteorder::LE;

use super::COUPON_RSE;
use super::CurMode;
use super::HllType;
use super::array::HllArray;
use super::aux_map::AuxMap;
use super::coupon;
use super::coupon_list::CouponList;
use super::coupon_list::LIST_CAPACITY;
use super::coupon_set::CouponSet;
use super::estimator;
use super::get_slot;
use super::get_value;
use super::pack_coupon;
use super::serialization::*;
use crate::common::NumStdDev;
use crate::error::Error;
use crate::family::Family;
use crate::hash;
use crate::hash::DEFAULT_UPDATE_SEED;

/// Storage of the current mode.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mode {
    List(CouponList),
    Set(CouponSet),
    Hll(HllArray),
}

/// HyperLogLog sketch for cardinality estimation.
///
/// Updates hash each datum with the shared default seed, derive a coupon and
/// route it to the current mode's container; the sketch promotes LIST → SET
/// → HLL as distinct coupons accumulate. Empty byte-like inputs are a
/// documented no-op; `u64`/`i64`/`f64` updates never are.
///
/// # Examples
///
/// ```
/// use sketches_core::hll::HllSketch;
///
/// let mut sketch = HllSketch::new(12).unwrap();
/// for i in 0..10_000u64 {
///     sketch.update_u64(i);
/// }
/// let estimate = sketch.estimate();
/// assert!(estimate > 9_000.0 && estimate < 11_000.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HllSketch {
    lg_config_k: u8,
    tgt_type: HllType,
    mode: Mode,
}

impl HllSketch {
    /// Create a sketch with the default 4-bit target packing.
    ///
    /// # Errors
    ///
    /// Returns an error if `lg_config_k` is outside [4, 21].
    pub fn new(lg_config_k: u8) -> Result<Self, Error> {
        Self::with_type(lg_config_k, HllType::Hll4)
    }

    /// Create a sketch with an explicit target packing.
    ///
    /// # Errors
    ///
    /// Returns an error if `lg_config_k` is outside [4, 21].
    pub fn with_type(lg_config_k: u8, tgt_type: HllType) -> Result<Self, Error> {
        check_lg_k(lg_config_k)?;
        Ok(Self {
            lg_config_k,
            tgt_type,
            mode: Mode::List(CouponList::default()),
        })
    }

    pub(crate) fn from_mode(lg_config_k: u8, tgt_type: HllType, mode: Mode) -> Self {
        Self {
            lg_config_k,
            tgt_type,
            mode,
        }
    }

    pub(crate) fn mode(&self) -> &Mode {
        &self.mode
    }

    /// The configured log2 bucket count.
    pub fn lg_config_k(&self) -> u8 {
        self.lg_config_k
    }

    /// The target register packing.
    pub fn tgt_type(&self) -> HllType {
        self.tgt_type
    }

    /// The current storage mode.
    pub fn cur_mode(&self) -> CurMode {
        match self.mode {
            Mode::List(_) => CurMode::List,
            Mode::Set(_) => CurMode::Set,
            Mode::Hll(_) => CurMode::Hll,
        }
    }

    /// True if no data has been presented.
    pub fn is_empty(&self) -> bool {
        match &self.mode {
            Mode::List(list) => list.is_empty(),
            _ => false,
        }
    }

    /// True if the HIP estimator has been invalidated by out-of-order
    /// reconstruction (unions, image loads).
    pub fn is_out_of_order(&self) -> bool {
        match &self.mode {
            Mode::Hll(array) => array.estimator().is_out_of_order(),
            _ => false,
        }
    }

    pub(crate) fn coupon_update(&mut self, coupon: u32) {
        let set_threshold = (1usize << self.lg_config_k) / 8;
        match &mut self.mode {
            Mode::List(list) => {
                if list.update(coupon) {
                    return;
                }
                // 9th distinct coupon arrived; fall through to promote.
            }
            Mode::Set(set) => {
                set.update(coupon);
                if set.len() < set_threshold {
                    return;
                }
            }
            Mode::Hll(array) => {
                array.update(coupon);
                return;
            }
        }
        self.promote(coupon);
    }

    fn promote(&mut self, pending: u32) {
        let lg = self.lg_config_k;
        let tgt = self.tgt_type;
        let set_threshold = (1usize << lg) / 8;
        match &self.mode {
            Mode::List(list) => {
                if set_threshold <= LIST_CAPACITY + 1 {
                    // Tiny K: the set would promote immediately anyway.
                    let mut array = HllArray::new(lg, tgt);
                    for coupon in list.iter() {
                        array.update(coupon);
                    }
                    array.update(pending);
                    self.mode = Mode::Hll(array);
                } else {
                    let mut set = CouponSet::default();
                    for coupon in list.iter() {
                        set.update(coupon);
                    }
                    set.update(pending);
                    self.mode = Mode::Set(set);
                }
            }
            Mode::Set(set) => {
                // The pending coupon is already in the set.
                let mut array = HllArray::new(lg, tgt);
                for coupon in set.iter() {
                    array.update(coupon);
                }
                self.mode = Mode::Hll(array);
            }
            Mode::Hll(_) => unreachable!("HLL mode never promotes"),
        }
    }

    /// Present an unsigned 64-bit datum.
    pub fn update_u64(&mut self, datum: u64) {
        self.coupon_update(coupon(hash::hash_u64(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a signed 64-bit datum.
    pub fn update_i64(&mut self, datum: i64) {
        self.coupon_update(coupon(hash::hash_i64(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a double datum.
    ///
    /// -0.0 and 0.0 are the same item, as are all NaN bit patterns.
    pub fn update_f64(&mut self, datum: f64) {
        self.coupon_update(coupon(hash::hash_f64(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a string as its UTF-8 bytes. Empty strings are a no-op.
    pub fn update_str(&mut self, datum: &str) {
        if datum.is_empty() {
            return;
        }
        self.coupon_update(coupon(hash::hash_str(datum, DEFAULT_UPDATE_SEED)));
    }

    /// Present a byte array. Empty arrays are a no-op.
    pub fn update_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.coupon_update(coupon(hash::hash_bytes(data, DEFAULT_UPDATE_SEED)));
    }

    /// Present a 16-bit char array. Empty arrays are a no-op.
    pub fn update_chars(&mut self, data: &[u16]) {
        if data.is_empty() {
            return;
        }
        self.coupon_update(coupon(hash::hash_chars(data, DEFAULT_UPDATE_SEED)));
    }

    /// Present a 32-bit int array. Empty arrays are a no-op.
    pub fn update_i32s(&mut self, data: &[i32]) {
        if data.is_empty() {
            return;
        }
        self.coupon_update(coupon(hash::hash_i32s(data, DEFAULT_UPDATE_SEED)));
    }

    /// Present a 64-bit long array. Empty arrays are a no-op.
    pub fn update_i64s(&mut self, data: &[i64]) {
        if data.is_empty() {
            return;
        }
        self.coupon_update(coupon(hash::hash_i64s(data, DEFAULT_UPDATE_SEED)));
    }

    /// The cardinality estimate.
    ///
    /// Uses the HIP estimator while updates arrived in order, otherwise the
    /// composite estimator.
    pub fn estimate(&self) -> f64 {
        match &self.mode {
            Mode::List(list) => estimator::coupon_estimate(list.len()),
            Mode::Set(set) => estimator::coupon_estimate(set.len()),
            Mode::Hll(array) => array.estimate(),
        }
    }

    /// Approximate lower error bound at the given confidence level.
    pub fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let nsd = num_std_dev.value();
        match &self.mode {
            Mode::List(list) => coupon_lower_bound(list.len(), nsd),
            Mode::Set(set) => coupon_lower_bound(set.len(), nsd),
            Mode::Hll(array) => {
                let estimate = array.estimate();
                let rel = estimator::relative_error(
                    self.lg_config_k,
                    array.estimator().rse_factor(),
                    nsd,
                );
                estimate / (1.0 + rel)
            }
        }
    }

    /// Approximate upper error bound at the given confidence level.
    pub fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        let nsd = num_std_dev.value();
        match &self.mode {
            Mode::List(list) => coupon_upper_bound(list.len(), nsd),
            Mode::Set(set) => coupon_upper_bound(set.len(), nsd),
            Mode::Hll(array) => {
                let estimate = array.estimate();
                let rel = estimator::relative_error(
                    self.lg_config_k,
                    array.estimator().rse_factor(),
                    nsd,
                );
                estimate / (1.0 - rel)
            }
        }
    }

    /// Reset to empty LIST mode, keeping lg_config_k and the target type.
    pub fn reset(&mut self) {
        self.mode = Mode::List(CouponList::default());
    }

    /// Serialize to the compact byte image.
    pub fn serialize(&self) -> Vec<u8> {
        let mode_byte = encode_mode_byte(self.cur_mode() as u8, self.tgt_type as u8);
        match &self.mode {
            Mode::List(list) => {
                let count = list.len();
                let mut bytes = vec![0u8; LIST_INT_ARR_START + count * 4];
                bytes[PREAMBLE_INTS_BYTE] = LIST_PREINTS;
                bytes[SER_VER_BYTE] = SERIAL_VERSION;
                bytes[FAMILY_BYTE] = Family::HLL.id;
                bytes[LG_K_BYTE] = self.lg_config_k;
                bytes[LG_ARR_BYTE] = 3;
                let mut flags = FLAG_IS_COMPACT;
                if count == 0 {
                    flags |= FLAG_IS_EMPTY;
                }
                bytes[FLAGS_BYTE] = flags;
                bytes[LIST_COUNT_BYTE] = count as u8;
                bytes[MODE_BYTE] = mode_byte;
                for (i, coupon) in list.iter().enumerate() {
                    let offset = LIST_INT_ARR_START + i * 4;
                    bytes[offset..offset + 4].copy_from_slice(&coupon.to_le_bytes());
                }
                bytes
            }
            Mode::Set(set) => {
                let count = set.len();
                let mut bytes = vec![0u8; HASH_SET_INT_ARR_START + count * 4];
                bytes[PREAMBLE_INTS_BYTE] = HASH_SET_PREINTS;
                bytes[SER_VER_BYTE] = SERIAL_VERSION;
                bytes[FAMILY_BYTE] = Family::HLL.id;
                bytes[LG_K_BYTE] = self.lg_config_k;
                bytes[FLAGS_BYTE] = FLAG_IS_COMPACT;
                bytes[MODE_BYTE] = mode_byte;
                bytes[HASH_SET_COUNT_INT..HASH_SET_COUNT_INT + 4]
                    .copy_from_slice(&(count as u32).to_le_bytes());
                for (i, coupon) in set.iter().enumerate() {
                    let offset = HASH_SET_INT_ARR_START + i * 4;
                    bytes[offset..offset + 4].copy_from_slice(&coupon.to_le_bytes());
                }
                bytes
            }
            Mode::Hll(array) => {
                let packed = array.packed_image();
                let mut aux_entries: Vec<(u32, u8)> = array
                    .aux()
                    .map(|aux| aux.iter().collect())
                    .unwrap_or_default();
                aux_entries.sort_unstable_by_key(|&(slot, _)| slot);

                let total = HLL_BYTE_ARR_START + packed.len() + aux_entries.len() * 4;
                let mut bytes = vec![0u8; total];
                bytes[PREAMBLE_INTS_BYTE] = HLL_PREINTS;
                bytes[SER_VER_BYTE] = SERIAL_VERSION;
                bytes[FAMILY_BYTE] = Family::HLL.id;
                bytes[LG_K_BYTE] = self.lg_config_k;
                let mut flags = FLAG_IS_COMPACT;
                if array.estimator().is_out_of_order() {
                    flags |= FLAG_OUT_OF_ORDER;
                }
                bytes[FLAGS_BYTE] = flags;
                bytes[MODE_BYTE] = mode_byte;
                bytes[HIP_ACCUM_DOUBLE..HIP_ACCUM_DOUBLE + 8]
                    .copy_from_slice(&array.estimator().hip_accum().to_le_bytes());
                bytes[KXQ0_DOUBLE..KXQ0_DOUBLE + 8]
                    .copy_from_slice(&array.estimator().kxq0().to_le_bytes());
                bytes[KXQ1_DOUBLE..KXQ1_DOUBLE + 8]
                    .copy_from_slice(&array.estimator().kxq1().to_le_bytes());
                bytes[NUM_ZERO_COUNT_INT..NUM_ZERO_COUNT_INT + 4]
                    .copy_from_slice(&array.num_zero().to_le_bytes());
                bytes[AUX_COUNT_INT..AUX_COUNT_INT + 4]
                    .copy_from_slice(&(aux_entries.len() as u32).to_le_bytes());
                bytes[HLL_BYTE_ARR_START..HLL_BYTE_ARR_START + packed.len()]
                    .copy_from_slice(packed);
                let aux_start = HLL_BYTE_ARR_START + packed.len();
                for (i, (slot, value)) in aux_entries.iter().enumerate() {
                    let offset = aux_start + i * 4;
                    bytes[offset..offset + 4]
                        .copy_from_slice(&pack_coupon(*slot, *value).to_le_bytes());
                }
                bytes
            }
        }
    }

    /// Deserialize a sketch from a byte image.
    ///
    /// The HIP state is restored from the image, so an in-order sketch stays
    /// in order across a round trip.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() < 8 {
            return Err(Error::insufficient_data("preamble"));
        }

        let preamble_ints = bytes[PREAMBLE_INTS_BYTE];
        let serial_version = bytes[SER_VER_BYTE];
        let family_id = bytes[FAMILY_BYTE];
        let lg_config_k = bytes[LG_K_BYTE];
        let lg_arr = bytes[LG_ARR_BYTE] as usize;
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

        let empty = flags & FLAG_IS_EMPTY != 0;
        let compact = flags & FLAG_IS_COMPACT != 0;
        let out_of_order = flags & FLAG_OUT_OF_ORDER != 0;

        let mode = match cur_mode {
            CurMode::List => {
                if preamble_ints != LIST_PREINTS {
                    return Err(Error::deserial(format!(
                        "LIST mode requires {LIST_PREINTS} preamble ints, got {preamble_ints}"
                    )));
                }
                let count = bytes[LIST_COUNT_BYTE] as usize;
                if empty && count != 0 {
                    return Err(Error::deserial("empty flag contradicts coupon count"));
                }
                let array_size = if compact { count } else { 1 << lg_arr };
                check_len(bytes, LIST_INT_ARR_START + array_size * 4)?;
                let mut list = CouponList::default();
                for i in 0..array_size {
                    let coupon = read_u32(bytes, LIST_INT_ARR_START + i * 4);
                    if coupon != 0 && !list.update(coupon) {
                        return Err(Error::deserial("LIST image holds too many coupons"));
                    }
                }
                Mode::List(list)
            }
            CurMode::Set => {
                if preamble_ints != HASH_SET_PREINTS {
                    return Err(Error::deserial(format!(
                        "SET mode requires {HASH_SET_PREINTS} preamble ints, got {preamble_ints}"
                    )));
                }
                check_len(bytes, HASH_SET_INT_ARR_START)?;
                let count = read_u32(bytes, HASH_SET_COUNT_INT) as usize;
                let array_size = if compact { count } else { 1 << lg_arr };
                check_len(bytes, HASH_SET_INT_ARR_START + array_size * 4)?;
                let mut set = CouponSet::default();
                for i in 0..array_size {
                    let coupon = read_u32(bytes, HASH_SET_INT_ARR_START + i * 4);
                    if coupon != 0 {
                        set.update(coupon);
                    }
                }
                Mode::Set(set)
            }
            CurMode::Hll => {
                if preamble_ints != HLL_PREINTS {
                    return Err(Error::deserial(format!(
                        "HLL mode requires {HLL_PREINTS} preamble ints, got {preamble_ints}"
                    )));
                }
                check_len(bytes, HLL_BYTE_ARR_START)?;
                let hip_accum = read_f64(bytes, HIP_ACCUM_DOUBLE);
                let kxq0 = read_f64(bytes, KXQ0_DOUBLE);
                let kxq1 = read_f64(bytes, KXQ1_DOUBLE);
                let aux_count = read_u32(bytes, AUX_COUNT_INT) as usize;
                let packed_len = HllArray::packed_image_bytes(lg_config_k, tgt_type);
                let aux_start = HLL_BYTE_ARR_START + packed_len;
                check_len(bytes, aux_start + aux_count * 4)?;

                let aux = if aux_count > 0 {
                    let mut aux = AuxMap::new();
                    for i in 0..aux_count {
                        let entry = read_u32(bytes, aux_start + i * 4);
                        let mask = (1u32 << lg_config_k) - 1;
                        aux.insert(get_slot(entry) & mask, get_value(entry));
                    }
                    Some(aux)
                } else {
                    None
                };

                Mode::Hll(HllArray::from_parts(
                    lg_config_k,
                    tgt_type,
                    &bytes[HLL_BYTE_ARR_START..aux_start],
                    aux,
                    hip_accum,
                    kxq0,
                    kxq1,
                    out_of_order,
                ))
            }
        };

        Ok(Self {
            lg_config_k,
            tgt_type,
            mode,
        })
    }

    /// Human-readable summary with optional register and aux detail.
    ///
    /// The format is diagnostic only and not stable.
    pub fn diagnostic_string(&self, summary: bool, hll_detail: bool, aux_detail: bool) -> String {
        use std::fmt::Write as _;

        let mut out = String::new();
        if summary {
            let _ = writeln!(out, "### HllSketch summary:");
            let _ = writeln!(out, "   lg_config_k : {}", self.lg_config_k);
            let _ = writeln!(out, "   tgt type    : {:?}", self.tgt_type);
            let _ = writeln!(out, "   mode        : {:?}", self.cur_mode());
            let _ = writeln!(out, "   empty       : {}", self.is_empty());
            let _ = writeln!(out, "   ooo flag    : {}", self.is_out_of_order());
            let _ = writeln!(out, "   estimate    : {}", self.estimate());
        }
        if hll_detail {
            if let Mode::Hll(array) = &self.mode {
                let _ = writeln!(out, "### HLL registers:");
                for slot in 0..array.num_buckets() as u32 {
                    let value = array.get(slot);
                    if value != 0 {
                        let _ = writeln!(out, "   {slot}: {value}");
                    }
                }
            }
        }
        if aux_detail {
            if let Mode::Hll(array) = &self.mode {
                if let Some(aux) = array.aux() {
                    let _ = writeln!(out, "### Aux exceptions:");
                    let mut entries: Vec<(u32, u8)> = aux.iter().collect();
                    entries.sort_unstable_by_key(|&(slot, _)| slot);
                    for (slot, value) in entries {
                        let _ = writeln!(out, "   {slot}: {value}");
                    }
                }
            }
        }
        out
    }
}

impl fmt::Display for HllSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diagnostic_string(true, false, false))
    }
}

fn coupon_lower_bound(count: usize, nsd: f64) -> f64 {
    let estimate = estimator::coupon_estimate(count);
    (estimate / (1.0 + nsd * COUPON_RSE)).max(count as f64)
}

fn coupon_upper_bound(count: usize, nsd: f64) -> f64 {
    let estimate = estimator::coupon_estimate(count);
    estimate / (1.0 - nsd * COUPON_RSE)
}

pub(crate) fn check_lg_k(lg_config_k: u8) -> Result<(), Error> {
    if !(MIN_LG_K..=MAX_LG_K).contains(&lg_config_k) {
        return Err(Error::invalid_argument(format!(
            "lg_config_k must be in [{MIN_LG_K}, {MAX_LG_K}]"
        ))
        .with_context("lg_config_k", lg_config_k));
    }
    Ok(())
}

fn check_len(bytes: &[u8], required: usize) -> Result<(), Error> {
    if bytes.len() < required {
        return Err(Error::deserial("image shorter than declared content")
            .with_context("expected_bytes", required)
            .with_context("actual_bytes", bytes.len()));
    }
    Ok(())
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    LE::read_u32(&bytes[offset..offset + 4])
}

fn read_f64(bytes: &[u8], offset: usize) -> f64 {
    LE::read_f64(&bytes[offset..offset + 8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_lg_k() {
        assert!(HllSketch::new(3).is_err());
        assert!(HllSketch::new(22).is_err());
        assert!(HllSketch::new(4).is_ok());
        assert!(HllSketch::new(21).is_ok());
    }

    #[test]
    fn test_mode_progression() {
        let mut sketch = HllSketch::new(12).unwrap();
        assert_eq!(sketch.cur_mode(), CurMode::List);
        assert!(sketch.is_empty());

        for i in 0..8u64 {
            sketch.update_u64(i);
        }
        assert_eq!(sketch.cur_mode(), CurMode::List);

        sketch.update_u64(8);
        assert_eq!(sketch.cur_mode(), CurMode::Set);

        for i in 9..600u64 {
            sketch.update_u64(i);
        }
        assert_eq!(sketch.cur_mode(), CurMode::Hll);
    }

    #[test]
    fn test_tiny_k_promotes_straight_to_hll() {
        let mut sketch = HllSketch::new(4).unwrap();
        for i in 0..9u64 {
            sketch.update_u64(i);
        }
        assert_eq!(sketch.cur_mode(), CurMode::Hll);
    }

    #[test]
    fn test_duplicates_do_not_promote() {
        let mut sketch = HllSketch::new(12).unwrap();
        for _ in 0..100 {
            sketch.update_str("same");
        }
        assert_eq!(sketch.cur_mode(), CurMode::List);
        assert_eq!(sketch.estimate().round() as u64, 1);
    }

    #[test]
    fn test_empty_inputs_are_noops() {
        let mut sketch = HllSketch::new(10).unwrap();
        sketch.update_str("");
        sketch.update_bytes(&[]);
        sketch.update_chars(&[]);
        sketch.update_i32s(&[]);
        sketch.update_i64s(&[]);
        assert!(sketch.is_empty());
    }

    #[test]
    fn test_double_canonicalization() {
        let mut a = HllSketch::new(10).unwrap();
        let mut b = HllSketch::new(10).unwrap();
        a.update_f64(0.0);
        b.update_f64(-0.0);
        assert_eq!(a, b);

        a.update_f64(f64::NAN);
        b.update_f64(f64::from_bits(0x7FF8_0000_0000_0001));
        assert_eq!(a, b);
        assert_eq!(a.estimate().round() as u64, 2);
    }

    #[test]
    fn test_bounds_bracket_estimate() {
        let mut sketch = HllSketch::new(11).unwrap();
        for i in 0..50_000u64 {
            sketch.update_u64(i);
        }
        let estimate = sketch.estimate();
        for nsd in [NumStdDev::One, NumStdDev::Two, NumStdDev::Three] {
            assert!(sketch.lower_bound(nsd) <= estimate);
            assert!(sketch.upper_bound(nsd) >= estimate);
        }
    }

    #[test]
    fn test_reset() {
        let mut sketch = HllSketch::with_type(10, HllType::Hll6).unwrap();
        for i in 0..10_000u64 {
            sketch.update_u64(i);
        }
        assert_eq!(sketch.cur_mode(), CurMode::Hll);
        sketch.reset();
        assert!(sketch.is_empty());
        assert_eq!(sketch.cur_mode(), CurMode::List);
        assert_eq!(sketch.lg_config_k(), 10);
        assert_eq!(sketch.tgt_type(), HllType::Hll6);
    }

    #[test]
    fn test_serialize_round_trip_all_modes() {
        for (tgt, n) in [
            (HllType::Hll4, 5u64),
            (HllType::Hll8, 100),
            (HllType::Hll4, 5_000),
            (HllType::Hll6, 5_000),
            (HllType::Hll8, 5_000),
        ] {
            let mut sketch = HllSketch::with_type(11, tgt).unwrap();
            for i in 0..n {
                sketch.update_u64(i);
            }
            let restored = HllSketch::deserialize(&sketch.serialize()).unwrap();
            assert_eq!(restored.lg_config_k(), sketch.lg_config_k());
            assert_eq!(restored.tgt_type(), sketch.tgt_type());
            assert_eq!(restored.cur_mode(), sketch.cur_mode());
            let ratio = restored.estimate() / sketch.estimate().max(1.0);
            assert!(
                (0.9..=1.1).contains(&ratio),
                "{tgt:?}/{n}: estimate drifted by {ratio}"
            );
        }
    }

    #[test]
    fn test_deserialize_rejects_bad_images() {
        let sketch = HllSketch::new(10).unwrap();
        let good = sketch.serialize();

        let mut bad = good.clone();
        bad[FAMILY_BYTE] = 3;
        assert!(HllSketch::deserialize(&bad).is_err());

        let mut bad = good.clone();
        bad[SER_VER_BYTE] = 9;
        assert!(HllSketch::deserialize(&bad).is_err());

        let mut bad = good.clone();
        bad[LG_K_BYTE] = 30;
        assert!(HllSketch::deserialize(&bad).is_err());

        let mut bad = good;
        bad[MODE_BYTE] = 3; // invalid mode code
        assert!(HllSketch::deserialize(&bad).is_err());
    }

    #[test]
    fn test_deserialize_preserves_hip_state() {
        let mut sketch = HllSketch::new(10).unwrap();
        for i in 0..5_000u64 {
            sketch.update_u64(i);
        }
        assert!(!sketch.is_out_of_order());
        let restored = HllSketch::deserialize(&sketch.serialize()).unwrap();
        assert!(!restored.is_out_of_order());
        assert_eq!(restored.estimate(), sketch.estimate());
    }
}
