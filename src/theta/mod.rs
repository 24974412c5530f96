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

//! Theta sketch for cardinality estimation with set operations.
//!
//! A KMV-style sketch retaining the hashes below a sampling threshold theta.
//! [`ThetaSketch`] is the mutable form; [`CompactThetaSketch`] is the
//! immutable, serialization-optimized form; [`DirectCompactThetaSketch`]
//! reads a compact image in place from a byte region. [`ThetaUnion`],
//! [`ThetaIntersection`] and [`a_not_b`] implement the set algebra, all
//! producing compact sketches under the minimum theta of their inputs.

mod a_not_b;
mod compact;
mod direct;
pub(crate) mod hash_table;
mod intersection;
pub(crate) mod serialization;
mod sketch;
mod union;

pub use a_not_b::a_not_b;
pub use compact::CompactThetaSketch;
pub use direct::DirectCompactThetaSketch;
pub use hash_table::DEFAULT_LG_K;
pub use hash_table::MAX_LG_K;
pub use hash_table::MIN_LG_K;
pub use intersection::ThetaIntersection;
pub use sketch::ThetaSketch;
pub use sketch::ThetaSketchBuilder;
pub use union::ThetaUnion;

use crate::common::NumStdDev;
use crate::common::binomial_bounds;
use hash_table::MAX_THETA;

/// Read-side contract shared by every form of the theta sketch.
pub trait ThetaSketchView {
    /// Theta as a 63-bit threshold.
    fn theta64(&self) -> u64;

    /// True if the source set is empty.
    fn is_empty(&self) -> bool;

    /// Number of retained hashes.
    fn num_retained(&self) -> usize;

    /// Hash of the update seed, for compatibility checks.
    fn seed_hash(&self) -> u16;

    /// Iterator over the retained hashes.
    fn hash_iter(&self) -> Box<dyn Iterator<Item = u64> + '_>;

    /// True if [`hash_iter`](Self::hash_iter) yields hashes in ascending
    /// order. Mutable sketches iterate in table order.
    fn is_ordered(&self) -> bool {
        false
    }

    /// Theta as a fraction in (0, 1].
    fn theta(&self) -> f64 {
        self.theta64() as f64 / MAX_THETA as f64
    }

    /// True once theta has dropped below 1 and results are estimates.
    fn is_estimation_mode(&self) -> bool {
        self.theta64() < MAX_THETA
    }

    /// The cardinality estimate: retained count divided by theta.
    fn estimate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.num_retained() as f64 / self.theta()
    }

    /// Approximate lower error bound at the given confidence level.
    fn lower_bound(&self, num_std_dev: NumStdDev) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        if !self.is_estimation_mode() {
            return self.num_retained() as f64;
        }
        // Theta is always in (0, 1] here, so the bounds cannot fail.
        binomial_bounds::lower_bound(self.num_retained() as u64, self.theta(), num_std_dev)
            .expect("theta should always be valid")
    }

    /// Approximate upper error bound at the given confidence level.
    fn upper_bound(&self, num_std_dev: NumStdDev) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        if !self.is_estimation_mode() {
            return self.num_retained() as f64;
        }
        binomial_bounds::upper_bound(
            self.num_retained() as u64,
            self.theta(),
            num_std_dev,
            self.is_empty(),
        )
        .expect("theta should always be valid")
    }
}
