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

use super::CompactThetaSketch;
use super::ThetaSketchView;
use super::hash_table::MAX_THETA;
use super::hash_table::REBUILD_THRESHOLD;
use super::hash_table::ThetaHashTable;
use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash::DEFAULT_UPDATE_SEED;

/// Stateful intersection operator for Theta sketches.
///
/// Before the first [`update`](Self::update), the result is undefined; use
/// [`has_result`](Self::has_result) to check. The intersection starts from
/// the "universe" set, and every update reduces the current set to the
/// overlapping subset under the minimum theta.
#[derive(Debug)]
pub struct ThetaIntersection {
    is_valid: bool,
    table: ThetaHashTable,
}

impl ThetaIntersection {
    /// Creates a new intersection operator for the given `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            is_valid: false,
            table: ThetaHashTable::from_raw_parts(
                0,
                0,
                ResizeFactor::X1,
                1.0,
                MAX_THETA,
                seed,
                false,
            ),
        }
    }

    /// Creates a new intersection operator with the default seed.
    pub fn new_with_default_seed() -> Self {
        Self::new(DEFAULT_UPDATE_SEED)
    }

    /// True once at least one sketch has been intersected.
    pub fn has_result(&self) -> bool {
        self.is_valid
    }

    /// Updates the intersection with a given sketch.
    ///
    /// # Errors
    ///
    /// Returns an error if the sketch was built with an incompatible seed or
    /// its image is inconsistent.
    pub fn update<S: ThetaSketchView>(&mut self, sketch: &S) -> Result<(), Error> {
        let new_default_table = |table: &ThetaHashTable| {
            ThetaHashTable::from_raw_parts(
                0,
                0,
                ResizeFactor::X1,
                1.0,
                table.theta(),
                table.hash_seed(),
                table.is_empty(),
            )
        };

        // Once the result has degenerated to empty it absorbs everything,
        // even sketches that would otherwise fail validation.
        if self.table.is_empty() {
            return Ok(());
        }

        if !sketch.is_empty() && sketch.seed_hash() != self.table.seed_hash() {
            return Err(Error::invalid_argument(format!(
                "incompatible seed hash: expected {}, got {}",
                self.table.seed_hash(),
                sketch.seed_hash()
            )));
        }

        self.table
            .set_empty(self.table.is_empty() || sketch.is_empty());
        let theta = if self.table.is_empty() {
            MAX_THETA
        } else {
            self.table.theta().min(sketch.theta64())
        };
        self.table.set_theta(theta);

        if self.is_valid && self.table.num_retained() == 0 {
            // Already degenerate; nothing can come back.
            return Ok(());
        }

        if sketch.num_retained() == 0 {
            self.is_valid = true;
            self.table = new_default_table(&self.table);
            return Ok(());
        }

        if !self.is_valid {
            // First update: copy the incoming sketch under the current theta.
            self.is_valid = true;
            let lg_size = ThetaHashTable::lg_size_from_count_for_rebuild(
                sketch.num_retained(),
                REBUILD_THRESHOLD,
            );
            let mut table = ThetaHashTable::from_raw_parts(
                lg_size,
                lg_size - 1,
                ResizeFactor::X1,
                1.0,
                self.table.theta(),
                self.table.hash_seed(),
                self.table.is_empty(),
            );
            for hash in sketch.hash_iter() {
                // A zero, screened, or duplicate hash cannot come from a
                // well-formed sketch under this theta.
                if !table.try_insert_hash(hash) {
                    return Err(Error::invalid_argument(
                        "rejected hash entry, possibly corrupted input sketch",
                    ));
                }
            }
            if table.num_retained() != sketch.num_retained() {
                return Err(Error::invalid_argument(
                    "num entries mismatch, possibly corrupted input sketch",
                ));
            }
            self.table = table;
        } else {
            let max_matches = self.table.num_retained().min(sketch.num_retained());
            let mut matched_entries = Vec::with_capacity(max_matches);
            let mut seen = 0usize;
            for hash in sketch.hash_iter() {
                if hash >= self.table.theta() {
                    if sketch.is_ordered() {
                        // Everything after this hash is screened as well.
                        break;
                    }
                    seen += 1;
                    continue;
                }
                if hash != 0 && self.table.contains_hash(hash) {
                    if matched_entries.len() == max_matches {
                        return Err(Error::invalid_argument(
                            "max matches exceeded, possibly corrupted input sketch",
                        ));
                    }
                    matched_entries.push(hash);
                }
                seen += 1;
            }
            if seen > sketch.num_retained() {
                return Err(Error::invalid_argument(
                    "more entries than declared, possibly corrupted input sketch",
                ));
            }
            if !sketch.is_ordered() && seen < sketch.num_retained() {
                return Err(Error::invalid_argument(
                    "fewer entries than declared, possibly corrupted input sketch",
                ));
            }
            if matched_entries.is_empty() {
                self.table = new_default_table(&self.table);
                if self.table.theta() == MAX_THETA {
                    // No overlap in exact mode is provably the empty set.
                    self.table.set_empty(true);
                }
                return Ok(());
            }
            let lg_size = ThetaHashTable::lg_size_from_count_for_rebuild(
                matched_entries.len(),
                REBUILD_THRESHOLD,
            );
            let mut table = ThetaHashTable::from_raw_parts(
                lg_size,
                lg_size - 1,
                ResizeFactor::X1,
                1.0,
                self.table.theta(),
                self.table.hash_seed(),
                self.table.is_empty(),
            );
            for hash in matched_entries {
                table.try_insert_hash(hash);
            }
            self.table = table;
        }
        Ok(())
    }

    /// Gets the result of the intersection as a compact sketch.
    ///
    /// # Errors
    ///
    /// Returns an error if no sketch has been intersected yet.
    pub fn result(&self, ordered: bool) -> Result<CompactThetaSketch, Error> {
        if !self.is_valid {
            return Err(Error::illegal_state(
                "intersection result is undefined before the first update",
            ));
        }
        let mut entries: Vec<u64> = self.table.iter().collect();
        if ordered {
            entries.sort_unstable();
        }
        Ok(CompactThetaSketch::new(
            self.table.theta(),
            entries,
            self.table.seed_hash(),
            self.table.is_empty(),
            ordered,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theta::ThetaSketch;
    use crate::theta::ThetaSketchView;

    #[test]
    fn test_result_undefined_before_update() {
        let intersection = ThetaIntersection::new_with_default_seed();
        assert!(!intersection.has_result());
        assert!(intersection.result(true).is_err());
    }

    #[test]
    fn test_exact_overlap() {
        let mut a = ThetaSketch::builder().build();
        let mut b = ThetaSketch::builder().build();
        for i in 0..100u64 {
            a.update_u64(i);
        }
        for i in 50..150u64 {
            b.update_u64(i);
        }
        let mut intersection = ThetaIntersection::new_with_default_seed();
        intersection.update(&a).unwrap();
        intersection.update(&b).unwrap();
        let result = intersection.result(true).unwrap();
        assert_eq!(result.estimate(), 50.0);
    }

    #[test]
    fn test_intersection_with_empty_is_empty() {
        let mut a = ThetaSketch::builder().build();
        a.update_u64(1);
        let b = ThetaSketch::builder().build();
        let mut intersection = ThetaIntersection::new_with_default_seed();
        intersection.update(&a).unwrap();
        intersection.update(&b).unwrap();
        let result = intersection.result(true).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.estimate(), 0.0);
    }

    #[test]
    fn test_disjoint_sets_in_exact_mode_are_empty() {
        let mut a = ThetaSketch::builder().build();
        let mut b = ThetaSketch::builder().build();
        for i in 0..100u64 {
            a.update_u64(i);
            b.update_u64(i + 1000);
        }
        let mut intersection = ThetaIntersection::new_with_default_seed();
        intersection.update(&a).unwrap();
        intersection.update(&b).unwrap();
        let result = intersection.result(true).unwrap();
        assert_eq!(result.num_retained(), 0);
        // With theta still 1 the lack of overlap is exact, not an estimate.
        assert!(result.is_empty());
        assert_eq!(result.estimate(), 0.0);
    }

    #[test]
    fn test_empty_result_absorbs_further_updates() {
        let mut a = ThetaSketch::builder().build();
        a.update_u64(1);
        let empty = ThetaSketch::builder().build();
        let mut intersection = ThetaIntersection::new_with_default_seed();
        intersection.update(&a).unwrap();
        intersection.update(&empty).unwrap();
        assert!(intersection.result(true).unwrap().is_empty());

        // Once empty, even a seed-incompatible sketch is silently ignored.
        let mut other_seed = ThetaSketch::builder().seed(7).build();
        other_seed.update_u64(2);
        intersection.update(&other_seed).unwrap();
        let result = intersection.result(true).unwrap();
        assert!(result.is_empty());
        assert_eq!(result.num_retained(), 0);
    }

    /// A view whose declared count disagrees with its iterator, as a
    /// corrupted image would.
    struct MismatchedCountSketch {
        hashes: Vec<u64>,
    }

    impl ThetaSketchView for MismatchedCountSketch {
        fn theta64(&self) -> u64 {
            MAX_THETA
        }

        fn is_empty(&self) -> bool {
            false
        }

        fn num_retained(&self) -> usize {
            self.hashes.len() + 1
        }

        fn seed_hash(&self) -> u16 {
            crate::hash::compute_seed_hash(crate::hash::DEFAULT_UPDATE_SEED)
        }

        fn hash_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
            Box::new(self.hashes.iter().copied())
        }
    }

    #[test]
    fn test_corrupted_count_rejected() {
        let mut a = ThetaSketch::builder().build();
        for i in 0..100u64 {
            a.update_u64(i);
        }
        let mut intersection = ThetaIntersection::new_with_default_seed();
        intersection.update(&a).unwrap();

        // One hash yielded, two declared: an unordered sketch must account
        // for every declared entry.
        let hash = a.hash_iter().next().unwrap();
        let short = MismatchedCountSketch { hashes: vec![hash] };
        let err = intersection.update(&short).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_estimation_mode_overlap() {
        let mut a = ThetaSketch::builder().lg_k(5).build();
        let mut b = ThetaSketch::builder().lg_k(5).build();
        for i in 0..10_000u64 {
            a.update_u64(i);
            b.update_u64(i + 5_000);
        }
        let mut intersection = ThetaIntersection::new_with_default_seed();
        intersection.update(&a).unwrap();
        intersection.update(&b).unwrap();
        let result = intersection.result(true).unwrap();
        let estimate = result.estimate();
        // True overlap is 5000; lg_k = 5 is coarse, so allow a wide band.
        assert!(
            estimate > 1_000.0 && estimate < 12_000.0,
            "estimate {estimate}"
        );
        assert!(result.theta64() <= a.theta64().min(b.theta64()));
    }

    #[test]
    fn test_seed_mismatch() {
        let mut a = ThetaSketch::builder().seed(7).build();
        a.update_u64(1);
        let mut intersection = ThetaIntersection::new_with_default_seed();
        assert!(intersection.update(&a).is_err());
    }
}
