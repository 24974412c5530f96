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

//! Streaming quantile and cardinality sketches.
//!
//! Compact, mergeable probabilistic summaries of unbounded data streams:
//!
//! - [`quantiles`]: a bounded-error rank/quantile summary over doubles built
//!   on the buffer-compactor scheme.
//! - [`theta`]: a KMV-style cardinality sketch with union, intersection and
//!   set-difference under a shared sampling threshold.
//! - [`hll`]: a HyperLogLog sketch with LIST → SET → HLL mode progression
//!   and an auxiliary exceptions table.
//!
//! Every family supports streaming updates from typed inputs, a
//! little-endian byte image usable against either a heap buffer or a
//! caller-owned byte region (see [`memory`]), lossless round-trip
//! serialization, and merging under the family's algebra.
//!
//! # Example
//!
//! ```
//! use sketches_core::quantiles::DoublesSketch;
//! use sketches_core::quantiles::DoublesSketchView;
//! use sketches_core::theta::ThetaSketch;
//! use sketches_core::theta::ThetaSketchView;
//!
//! let mut quantiles = DoublesSketch::builder().build();
//! let mut distinct = ThetaSketch::builder().build();
//! for i in 0..1000 {
//!     quantiles.update(i as f64);
//!     distinct.update_u64(i % 100);
//! }
//! assert!((quantiles.quantile(0.5).unwrap() - 500.0).abs() <= 4.0);
//! assert_eq!(distinct.estimate(), 100.0);
//! ```

mod codec;

pub mod common;
pub mod error;
pub mod family;
pub mod hash;
pub mod hll;
pub mod memory;
pub mod quantiles;
pub mod theta;
