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
use super::hash_table::DEFAULT_LG_K;
use super::hash_table::MAX_LG_K;
use super::hash_table::MIN_LG_K;
use super::hash_table::ThetaHashTable;
use crate::common::ResizeFactor;
use crate::error::Error;
use crate::hash;
use crate::hash::DEFAULT_UPDATE_SEED;

/// Stateful union operator for Theta sketches.
///
/// Maintains an internal gadget table at the configured nominal size. Theta
/// is the minimum over all inputs (and drops further if the gadget rebuilds),
/// and only hashes below it are retained. The union may also be fed raw data
/// with the same typed update surface as [`ThetaSketch`](super::ThetaSketch).
#[derive(Debug)]
pub struct ThetaUnion {
    table: ThetaHashTable,
}

impl ThetaUnion {
    /// Creates a new union with the given nominal lg_k and seed.
    ///
    /// # Panics
    ///
    /// Panics if lg_k is not in range [5, 26].
    pub fn new(lg_k: u8, seed: u64) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k must be in [{MIN_LG_K}, {MAX_LG_K}], got {lg_k}"
        );
        Self {
            table: ThetaHashTable::new(lg_k, ResizeFactor::X8, 1.0, seed),
        }
    }

    /// Creates a new union with the default lg_k and seed.
    pub fn new_with_defaults() -> Self {
        Self::new(DEFAULT_LG_K, DEFAULT_UPDATE_SEED)
    }

    /// Merges a sketch into the union.
    ///
    /// Theta becomes the minimum of the current theta and the sketch's, and
    /// every retained hash below it is inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the sketch was built with an incompatible seed.
    pub fn update<S: ThetaSketchView>(&mut self, sketch: &S) -> Result<(), Error> {
        if sketch.is_empty() {
            return Ok(());
        }
        if sketch.seed_hash() != self.table.seed_hash() {
            return Err(Error::invalid_argument(format!(
                "incompatible seed hash: expected {}, got {}",
                self.table.seed_hash(),
                sketch.seed_hash()
            )));
        }

        self.table.set_empty(false);
        if sketch.theta64() < self.table.theta() {
            self.table.set_theta(sketch.theta64());
        }
        for hash in sketch.hash_iter() {
            // The table screens against the union theta.
            self.table.try_insert_hash(hash);
        }
        Ok(())
    }

    fn present(&mut self, h0: u64) {
        let hash = h0 >> 1;
        if hash != 0 {
            self.table.try_insert_hash(hash);
        }
    }

    /// Present an unsigned 64-bit datum.
    pub fn update_u64(&mut self, datum: u64) {
        let (h0, _) = hash::hash_u64(datum, self.table.hash_seed());
        self.present(h0);
    }

    /// Present a signed 64-bit datum.
    pub fn update_i64(&mut self, datum: i64) {
        let (h0, _) = hash::hash_i64(datum, self.table.hash_seed());
        self.present(h0);
    }

    /// Present a double datum, canonicalizing -0.0 and NaN.
    pub fn update_f64(&mut self, datum: f64) {
        let (h0, _) = hash::hash_f64(datum, self.table.hash_seed());
        self.present(h0);
    }

    /// Present a string as its UTF-8 bytes. Empty strings are a no-op.
    pub fn update_str(&mut self, datum: &str) {
        if datum.is_empty() {
            return;
        }
        let (h0, _) = hash::hash_str(datum, self.table.hash_seed());
        self.present(h0);
    }

    /// Present a byte array. Empty arrays are a no-op.
    pub fn update_bytes(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let (h0, _) = hash::hash_bytes(data, self.table.hash_seed());
        self.present(h0);
    }

    /// Gets the result of the union as a compact sketch.
    ///
    /// The union is not disturbed; it can keep accumulating afterwards.
    pub fn result(&self, ordered: bool) -> CompactThetaSketch {
        let mut entries: Vec<u64> = self.table.iter().collect();
        if ordered {
            entries.sort_unstable();
        }
        CompactThetaSketch::new(
            self.table.theta(),
            entries,
            self.table.seed_hash(),
            self.table.is_empty(),
            ordered,
        )
    }

    /// Resets the union to its virgin state. The seed remains intact.
    pub fn reset(&mut self) {
        self.table.reset();
    }
}

impl ThetaSketchView for ThetaUnion {
    fn theta64(&self) -> u64 {
        self.table.theta()
    }

    fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn num_retained(&self) -> usize {
        self.table.num_retained()
    }

    fn seed_hash(&self) -> u16 {
        self.table.seed_hash()
    }

    fn hash_iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.table.iter())
    }
}
