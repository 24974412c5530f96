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
use googletest::prelude::near;
use sketches_core::hll::CurMode;
use sketches_core::hll::DirectHllSketch;
use sketches_core::hll::HllSketch;
use sketches_core::hll::HllType;
use sketches_core::memory::HeapRegion;
use sketches_core::memory::Region;

fn filled(lg_k: u8, tgt: HllType, count: u64) -> HllSketch {
    let mut sketch = HllSketch::with_type(lg_k, tgt).unwrap();
    for i in 0..count {
        sketch.update_u64(i);
    }
    sketch
}

#[test]
fn test_empty_round_trip() {
    let sketch = HllSketch::new(10).unwrap();
    let restored = HllSketch::deserialize(&sketch.serialize()).unwrap();
    assert!(restored.is_empty());
    assert_eq!(restored.cur_mode(), CurMode::List);
    assert_eq!(restored.lg_config_k(), 10);
    assert_eq!(restored.estimate(), 0.0);
}

#[test]
fn test_list_mode_round_trip_is_exact() {
    let sketch = filled(12, HllType::Hll4, 5);
    let restored = HllSketch::deserialize(&sketch.serialize()).unwrap();
    assert_eq!(restored.cur_mode(), CurMode::List);
    assert_eq!(restored, sketch);
}

#[test]
fn test_set_mode_round_trip() {
    let sketch = filled(12, HllType::Hll4, 300);
    assert_eq!(sketch.cur_mode(), CurMode::Set);
    let restored = HllSketch::deserialize(&sketch.serialize()).unwrap();
    assert_eq!(restored.cur_mode(), CurMode::Set);
    assert_eq!(restored.estimate(), sketch.estimate());
}

#[test]
fn test_hll_mode_round_trip_all_types() {
    for tgt in [HllType::Hll4, HllType::Hll6, HllType::Hll8] {
        let sketch = filled(11, tgt, 50_000);
        assert_eq!(sketch.cur_mode(), CurMode::Hll);
        let restored = HllSketch::deserialize(&sketch.serialize()).unwrap();
        assert_eq!(restored.cur_mode(), CurMode::Hll);
        assert_eq!(restored.tgt_type(), tgt);
        // The HIP state survives the round trip intact.
        assert!(!restored.is_out_of_order());
        assert_eq!(restored.estimate(), sketch.estimate());
    }
}

#[test]
fn test_hll4_aux_exceptions_survive_round_trip() {
    // Dense enough that buckets exceed the 4-bit packing.
    let sketch = filled(4, HllType::Hll4, 2_000_000);
    assert!(
        sketch.diagnostic_string(false, false, true).contains("Aux"),
        "expected aux exceptions at this density"
    );
    let restored = HllSketch::deserialize(&sketch.serialize()).unwrap();
    assert!(restored.diagnostic_string(false, false, true).contains("Aux"));
    // Register detail must match exactly, exceptions included.
    assert_eq!(
        restored.diagnostic_string(false, true, true),
        sketch.diagnostic_string(false, true, true)
    );
}

#[test]
fn test_round_trip_is_byte_identical() {
    let sketch = filled(10, HllType::Hll6, 20_000);
    let image = sketch.serialize();
    let restored = HllSketch::deserialize(&image).unwrap();
    assert_eq!(restored.serialize(), image);
    assert_eq!(restored.estimate(), sketch.estimate());

    // A union result carries the out-of-order flag through its image.
    let mut union = sketches_core::hll::HllUnion::new(10).unwrap();
    union.update(&sketch);
    let merged = union.result(HllType::Hll6);
    let merged_image = merged.serialize();
    let merged_restored = HllSketch::deserialize(&merged_image).unwrap();
    assert!(merged_restored.is_out_of_order());
    assert_eq!(merged_restored.serialize(), merged_image);
}

#[test]
fn test_direct_wrap_all_modes() {
    for count in [3u64, 300, 50_000] {
        let sketch = filled(12, HllType::Hll4, count);
        let image = sketch.serialize();
        let heap = HllSketch::deserialize(&image).unwrap();
        let direct = DirectHllSketch::wrap(HeapRegion::from_vec(image)).unwrap();
        assert_eq!(direct.cur_mode(), sketch.cur_mode());
        assert_eq!(direct.lg_config_k(), 12);
        assert_that!(direct.estimate(), near(heap.estimate(), 1e-6 * heap.estimate()));
    }
}

#[test]
fn test_direct_wrap_same_resource() {
    let region = HeapRegion::from_vec(filled(10, HllType::Hll8, 1_000).serialize());
    let id = region.id();
    let direct = DirectHllSketch::wrap(region).unwrap();
    assert!(direct.is_same_resource(id));
}

#[test]
fn test_malformed_images_rejected() {
    let good = filled(10, HllType::Hll8, 50_000).serialize();

    let mut bad = good.clone();
    bad[2] = 8; // quantiles family id
    assert!(HllSketch::deserialize(&bad).is_err());

    let mut bad = good.clone();
    bad[1] = 2; // unknown serial version
    assert!(HllSketch::deserialize(&bad).is_err());

    let mut bad = good.clone();
    bad[3] = 25; // lg_k out of range
    assert!(HllSketch::deserialize(&bad).is_err());

    let mut bad = good.clone();
    bad[0] = 2; // LIST preamble on an HLL image
    assert!(HllSketch::deserialize(&bad).is_err());

    // Truncated packed array.
    assert!(HllSketch::deserialize(&good[..200]).is_err());
}
