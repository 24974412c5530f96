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
use sketches_core::error::ErrorKind;
use sketches_core::memory::HeapRegion;
use sketches_core::memory::Region;
use sketches_core::memory::SliceRegion;
use sketches_core::quantiles::CompactDoublesSketch;
use sketches_core::quantiles::DirectDoublesSketch;
use sketches_core::quantiles::DoublesSketch;
use sketches_core::quantiles::DoublesSketchView;

/// Compare two sketches on the full observable state, per-level.
fn assert_sketch_equality<A: DoublesSketchView, B: DoublesSketchView>(a: &A, b: &B) {
    assert_eq!(a.k(), b.k());
    assert_eq!(a.n(), b.n());
    assert_eq!(a.bit_pattern(), b.bit_pattern());
    assert_eq!(a.min_value(), b.min_value());
    assert_eq!(a.max_value(), b.max_value());

    let mut a_bb = a.base_buffer_items();
    let mut b_bb = b.base_buffer_items();
    a_bb.sort_unstable_by(f64::total_cmp);
    b_bb.sort_unstable_by(f64::total_cmp);
    assert_eq!(a_bb, b_bb);

    let mut bits = a.bit_pattern();
    while bits != 0 {
        let level = bits.trailing_zeros() as u8;
        assert_eq!(a.level_items(level), b.level_items(level), "level {level}");
        bits &= bits - 1;
    }
}

#[test]
fn test_updatable_image_length() {
    let mut sketch = DoublesSketch::builder().build(); // k = 128
    sketch.update(1.0);
    sketch.update(2.0);
    let image = sketch.to_byte_array(false);
    assert_eq!(image.len(), sketch.updatable_storage_bytes());
}

#[test]
fn test_compact_image_length() {
    let mut sketch = DoublesSketch::builder().k(32).random_seed(4).build();
    for i in 0..5_000 {
        sketch.update(i as f64);
    }
    let image = sketch.to_byte_array(true);
    assert_eq!(image.len(), sketch.compact_storage_bytes());
    assert!(image.len() < sketch.updatable_storage_bytes());
}

#[test]
fn test_empty_image_is_preamble_only() {
    let sketch = DoublesSketch::builder().build();
    assert_eq!(sketch.to_byte_array(true).len(), 8);
    assert_eq!(sketch.to_byte_array(false).len(), 8);
}

#[test]
fn test_round_trip_both_forms() {
    let mut sketch = DoublesSketch::builder().k(16).random_seed(11).build();
    for i in 0..10_000 {
        sketch.update(i as f64);
    }

    let from_compact = DoublesSketch::heapify(&sketch.to_byte_array(true)).unwrap();
    assert_sketch_equality(&sketch, &from_compact);

    let from_updatable = DoublesSketch::heapify(&sketch.to_byte_array(false)).unwrap();
    assert_sketch_equality(&sketch, &from_updatable);

    let compact = CompactDoublesSketch::heapify(&sketch.to_byte_array(true)).unwrap();
    assert_sketch_equality(&sketch, &compact);
}

#[test]
fn test_heap_to_direct_wrap() {
    let mut heap = DoublesSketch::builder().build();
    for i in 0..1000 {
        heap.update(i as f64);
    }
    let image = heap.to_byte_array(false);
    let mut backing = vec![0u8; image.len()];
    backing.copy_from_slice(&image);
    let direct = DirectDoublesSketch::wrap(SliceRegion::new(&mut backing)).unwrap();

    assert_eq!(direct.min_value(), Some(0.0));
    assert_eq!(direct.max_value(), Some(999.0));
    assert_that!(direct.quantile(0.5).unwrap(), near(500.0, 4.0));
    assert_sketch_equality(&heap, &direct);
}

#[test]
fn test_direct_to_heap_continues() {
    let size_bytes = 10_000;
    let mut direct = DoublesSketch::builder()
        .build_direct(HeapRegion::new(size_bytes))
        .unwrap();
    for i in 0..1000 {
        direct.update(i as f64).unwrap();
    }
    let mut heap = DoublesSketch::heapify(&direct.to_byte_array(false)).unwrap();
    for i in 0..1000 {
        heap.update((i + 1000) as f64);
    }
    assert_eq!(heap.min_value(), Some(0.0));
    assert_eq!(heap.max_value(), Some(1999.0));
    assert_that!(heap.quantile(0.5).unwrap(), near(1000.0, 10.0));
}

#[test]
fn test_direct_heap_equivalence_under_shared_seed() {
    let k = 64u16;
    let mut heap = DoublesSketch::builder().k(k).random_seed(99).build();
    let mut direct = DoublesSketch::builder()
        .k(k)
        .random_seed(99)
        .build_direct(HeapRegion::new(100_000))
        .unwrap();
    for i in 0..30_000 {
        let value = (i * 7919 % 30_000) as f64;
        heap.update(value);
        direct.update(value).unwrap();
    }
    assert_eq!(heap.to_byte_array(true), direct.to_byte_array(true));
    assert_eq!(heap.to_byte_array(false), direct.to_byte_array(false));
}

#[test]
fn test_compact_into_region_and_same_resource() {
    let k = 16u16;
    let mut backing = vec![0u8; (k as usize * 16) + 24 + 10_000];
    let region = SliceRegion::new(&mut backing);
    let build_id = region.id();
    let mut direct = DoublesSketch::builder().k(k).build_direct(region).unwrap();
    assert!(direct.is_same_resource(build_id));

    for i in 0..100 {
        direct.update(i as f64).unwrap();
    }

    let compact_region = HeapRegion::new(direct.compact_storage_bytes());
    let compact_id = compact_region.id();
    let compact = direct.compact_into(compact_region).unwrap();
    assert!(compact.is_same_resource(compact_id));
    assert!(!compact.is_same_resource(build_id));
    assert_sketch_equality(&direct, &compact);
}

#[test]
fn test_wrapping_copy_is_not_same_resource() {
    let region = HeapRegion::new(10_000);
    let id = region.id();
    let direct = DoublesSketch::builder().k(16).build_direct(region).unwrap();
    let copied = HeapRegion::from_vec(direct.to_byte_array(false));
    assert!(direct.is_same_resource(id));
    assert!(!direct.is_same_resource(copied.id()));
}

#[test]
fn test_malformed_images_rejected() {
    let mut sketch = DoublesSketch::builder().build();
    sketch.update(1.0);
    let good = sketch.to_byte_array(true);

    // Truncated image.
    assert!(DoublesSketch::heapify(&good[..good.len() - 4]).is_err());

    // Wrong family.
    let mut bad = good.clone();
    bad[2] = 3;
    assert!(DoublesSketch::heapify(&bad).is_err());

    // Unsupported serial version.
    let mut bad = good.clone();
    bad[1] = 9;
    assert!(DoublesSketch::heapify(&bad).is_err());

    // Non power-of-two k.
    let mut bad = good.clone();
    bad[5..7].copy_from_slice(&100u16.to_le_bytes());
    assert!(DoublesSketch::heapify(&bad).is_err());

    // Big-endian flag.
    let mut bad = good;
    bad[4] |= 1;
    assert!(DoublesSketch::heapify(&bad).is_err());
}

#[test]
fn test_direct_build_capacity_error_kind() {
    let err = DoublesSketch::builder()
        .k(128)
        .build_direct(HeapRegion::new(64))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
}
