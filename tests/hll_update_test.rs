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

use googletest::assert_that;
use googletest::prelude::ge;
use googletest::prelude::le;
use googletest::prelude::near;
use sketches_core::common::NumStdDev;
use sketches_core::hll::CurMode;
use sketches_core::hll::HllSketch;
use sketches_core::hll::HllType;
use sketches_core::hll::HllUnion;

#[test]
fn test_mode_progression_lg_k_12() {
    let k = 1u64 << 12;
    let mut sketch = HllSketch::new(12).unwrap();

    for i in 0..8u64 {
        sketch.update_u64(i);
    }
    assert_eq!(sketch.cur_mode(), CurMode::List);

    for i in 8..500u64 {
        sketch.update_u64(i);
    }
    assert_eq!(sketch.cur_mode(), CurMode::Set);

    for i in 500..(k / 8 + 100) {
        sketch.update_u64(i);
    }
    assert_eq!(sketch.cur_mode(), CurMode::Hll);
}

#[test]
fn test_estimate_within_three_sigma() {
    const TRUE_COUNT: u64 = 100_000;
    let lg_k = 12u8;
    let k = (1u64 << lg_k) as f64;
    let mut sketch = HllSketch::new(lg_k).unwrap();
    for i in 0..TRUE_COUNT {
        sketch.update_u64(i);
    }
    let sigma = 1.04 * TRUE_COUNT as f64 / k.sqrt();
    assert_that!(
        sketch.estimate(),
        near(TRUE_COUNT as f64, 3.0 * sigma)
    );
}

#[test]
fn test_small_counts_are_nearly_exact() {
    let mut sketch = HllSketch::new(14).unwrap();
    for i in 0..100u64 {
        sketch.update_u64(i);
    }
    assert_eq!(sketch.estimate().round() as u64, 100);
}

#[test]
fn test_duplicates_do_not_inflate() {
    let mut sketch = HllSketch::new(12).unwrap();
    for _ in 0..10 {
        for i in 0..100u64 {
            sketch.update_u64(i);
        }
    }
    assert_that!(sketch.estimate(), near(100.0, 20.0));
}

#[test]
fn test_zero_canonicalization() {
    let mut a = HllSketch::new(12).unwrap();
    let mut b = HllSketch::new(12).unwrap();
    a.update_f64(-0.0);
    b.update_f64(0.0);
    assert_eq!(a, b, "-0.0 and 0.0 must produce identical sketch state");
}

#[test]
fn test_nan_canonicalization() {
    let mut sketch = HllSketch::new(12).unwrap();
    sketch.update_f64(f64::NAN);
    sketch.update_f64(f64::from_bits(0x7FF8_0000_0000_0001));
    assert_eq!(sketch.estimate().round() as u64, 1);
}

#[test]
fn test_typed_updates() {
    let mut sketch = HllSketch::new(10).unwrap();
    sketch.update_str("hello");
    sketch.update_i64(-5);
    sketch.update_u64(77);
    sketch.update_bytes(&[9, 9, 9]);
    sketch.update_chars(&[104, 105]);
    sketch.update_i32s(&[1, 2]);
    sketch.update_i64s(&[1, 2]);
    assert_eq!(sketch.estimate().round() as u64, 7);
}

#[test]
fn test_all_target_types_estimate() {
    const N: u64 = 50_000;
    for tgt in [HllType::Hll4, HllType::Hll6, HllType::Hll8] {
        let mut sketch = HllSketch::with_type(12, tgt).unwrap();
        for i in 0..N {
            sketch.update_u64(i);
        }
        let sigma = 1.04 * N as f64 / ((1u64 << 12) as f64).sqrt();
        assert_that!(sketch.estimate(), near(N as f64, 3.0 * sigma));
    }
}

#[test]
fn test_bounds_bracket_estimate() {
    let mut sketch = HllSketch::new(11).unwrap();
    for i in 0..30_000u64 {
        sketch.update_u64(i);
    }
    let estimate = sketch.estimate();
    assert_that!(sketch.lower_bound(NumStdDev::One), le(estimate));
    assert_that!(sketch.upper_bound(NumStdDev::One), ge(estimate));
    assert!(sketch.lower_bound(NumStdDev::Three) <= sketch.lower_bound(NumStdDev::One));
    assert!(sketch.upper_bound(NumStdDev::Three) >= sketch.upper_bound(NumStdDev::One));
}

#[test]
fn test_hip_valid_until_union() {
    let mut a = HllSketch::new(12).unwrap();
    for i in 0..10_000u64 {
        a.update_u64(i);
    }
    assert!(!a.is_out_of_order());

    let mut union = HllUnion::new(12).unwrap();
    union.update(&a);
    let merged = union.result(HllType::Hll4);
    assert!(merged.is_out_of_order());
}

#[test]
fn test_union_estimate() {
    let mut a = HllSketch::new(12).unwrap();
    let mut b = HllSketch::new(12).unwrap();
    for i in 0..60_000u64 {
        a.update_u64(i);
        b.update_u64(i + 30_000);
    }
    let mut union = HllUnion::new(12).unwrap();
    union.update(&a);
    union.update(&b);
    let estimate = union.result(HllType::Hll8).estimate();
    assert_that!(estimate, near(90_000.0, 5_000.0));
}

#[test]
fn test_reset_collapses_to_list() {
    let mut sketch = HllSketch::new(12).unwrap();
    for i in 0..100_000u64 {
        sketch.update_u64(i);
    }
    assert_eq!(sketch.cur_mode(), CurMode::Hll);
    sketch.reset();
    assert_eq!(sketch.cur_mode(), CurMode::List);
    assert!(sketch.is_empty());
    assert_eq!(sketch.lg_config_k(), 12);
    assert_eq!(sketch.estimate(), 0.0);
}

#[test]
fn test_diagnostic_string_smoke() {
    let mut sketch = HllSketch::new(8).unwrap();
    for i in 0..1_000u64 {
        sketch.update_u64(i);
    }
    let text = sketch.diagnostic_string(true, true, true);
    assert!(text.contains("HllSketch summary"));
}
