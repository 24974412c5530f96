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

/// Mutable theta sketch for building from input data.
///
/// Typed update methods reduce each datum to bytes, hash it, and retain the
/// upper 63 bits of the hash when below theta. Empty byte-like inputs are a
/// documented no-op; `u64`/`i64`/`f64` updates never are.
#[derive(Debug, Clone)]
pub struct ThetaSketch {
    table: ThetaHashTable,
}

impl ThetaSketch {
    /// Create a new builder for ThetaSketch
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketches_core::theta::ThetaSketch;
    /// let sketch = ThetaSketch::builder().lg_k(12).build();
    /// assert_eq!(sketch.lg_k(), 12);
    /// ```
    pub fn builder() -> ThetaSketchBuilder {
        ThetaSketchBuilder::default()
    }

    fn present(&mut self, h0: u64) {
        let hash = h0 >> 1;
        // Hash zero is the table's empty slot marker.
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

    /// Present a double datum.
    ///
    /// -0.0 and 0.0 are the same item, as are all NaN bit patterns.
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

    /// Present a 16-bit char array. Empty arrays are a no-op.
    pub fn update_chars(&mut self, data: &[u16]) {
        if data.is_empty() {
            return;
        }
        let (h0, _) = hash::hash_chars(data, self.table.hash_seed());
        self.present(h0);
    }

    /// Present a 32-bit int array. Empty arrays are a no-op.
    pub fn update_i32s(&mut self, data: &[i32]) {
        if data.is_empty() {
            return;
        }
        let (h0, _) = hash::hash_i32s(data, self.table.hash_seed());
        self.present(h0);
    }

    /// Present a 64-bit long array. Empty arrays are a no-op.
    pub fn update_i64s(&mut self, data: &[i64]) {
        if data.is_empty() {
            return;
        }
        let (h0, _) = hash::hash_i64s(data, self.table.hash_seed());
        self.present(h0);
    }

    /// Return lg_k
    pub fn lg_k(&self) -> u8 {
        self.table.lg_nom_size()
    }

    /// Return iterator over retained hash values
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.table.iter()
    }

    /// Trim the sketch to nominal size k
    pub fn trim(&mut self) {
        self.table.trim();
    }

    /// Reset the sketch to empty state, keeping lg_k and the seed.
    pub fn reset(&mut self) {
        self.table.reset();
    }

    /// Convert to the immutable compact form.
    ///
    /// An ordered compact sketch stores its hashes ascending, which enables
    /// linear-time unions downstream.
    pub fn compact(&self, ordered: bool) -> CompactThetaSketch {
        let mut entries: Vec<u64> = self.iter().collect();
        if ordered {
            entries.sort_unstable();
        }
        CompactThetaSketch::new(
            self.theta64(),
            entries,
            self.seed_hash(),
            self.is_empty(),
            ordered,
        )
    }

    /// Serialize the sketch to bytes in ordered compact format.
    pub fn serialize(&self) -> Vec<u8> {
        self.compact(true).serialize()
    }

    /// Deserialize a sketch from bytes with the default seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are invalid or corrupted.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketches_core::theta::ThetaSketch;
    /// # use sketches_core::theta::ThetaSketchView;
    /// let mut sketch = ThetaSketch::builder().build();
    /// sketch.update_str("apple");
    /// let restored = ThetaSketch::deserialize(&sketch.serialize()).unwrap();
    /// assert_eq!(sketch.estimate(), restored.estimate());
    /// ```
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        Self::deserialize_with_seed(bytes, DEFAULT_UPDATE_SEED)
    }

    /// Deserialize a sketch from bytes with a specific seed.
    ///
    /// The rebuilt sketch accepts further updates; its nominal size is the
    /// smallest k accommodating the retained entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed or the seed hash does not
    /// match.
    pub fn deserialize_with_seed(bytes: &[u8], seed: u64) -> Result<Self, Error> {
        let compact = CompactThetaSketch::deserialize_with_seed(bytes, seed)?;
        let entries: Vec<u64> = compact.hash_iter().collect();
        let lg_nom = ThetaHashTable::lg_size_from_count_for_rebuild(entries.len(), 0.5)
            .clamp(MIN_LG_K, MAX_LG_K);
        let table = ThetaHashTable::from_entries(
            lg_nom,
            seed,
            compact.theta64(),
            entries,
            compact.is_empty(),
        );
        Ok(Self { table })
    }
}

impl ThetaSketchView for ThetaSketch {
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

impl fmt::Display for ThetaSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### ThetaSketch summary:")?;
        writeln!(f, "   lg_k        : {}", self.lg_k())?;
        writeln!(f, "   empty       : {}", self.is_empty())?;
        writeln!(f, "   theta       : {}", self.theta())?;
        writeln!(f, "   retained    : {}", self.num_retained())?;
        writeln!(f, "   estimate    : {}", self.estimate())?;
        write!(f, "### end summary")
    }
}

/// Builder for ThetaSketch
#[derive(Debug)]
pub struct ThetaSketchBuilder {
    lg_k: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    seed: u64,
}

impl Default for ThetaSketchBuilder {
    fn default() -> Self {
        Self {
            lg_k: DEFAULT_LG_K,
            resize_factor: ResizeFactor::X8,
            sampling_probability: 1.0,
            seed: DEFAULT_UPDATE_SEED,
        }
    }
}

impl ThetaSketchBuilder {
    /// Set lg_k (log2 of nominal size k).
    ///
    /// # Panics
    ///
    /// If lg_k is not in range [5, 26]
    pub fn lg_k(mut self, lg_k: u8) -> Self {
        assert!(
            (MIN_LG_K..=MAX_LG_K).contains(&lg_k),
            "lg_k must be in [{}, {}], got {}",
            MIN_LG_K,
            MAX_LG_K,
            lg_k
        );
        self.lg_k = lg_k;
        self
    }

    /// Set resize factor.
    pub fn resize_factor(mut self, factor: ResizeFactor) -> Self {
        self.resize_factor = factor;
        self
    }

    /// Set sampling probability p.
    ///
    /// The sampling probability controls the fraction of hashed values that
    /// are retained, as an up-front theta.
    ///
    /// # Panics
    ///
    /// Panics if p is not in range (0.0, 1.0]
    pub fn sampling_probability(mut self, probability: f32) -> Self {
        assert!(
            probability > 0.0 && probability <= 1.0,
            "sampling_probability must be in (0.0, 1.0], got {probability}"
        );
        self.sampling_probability = probability;
        self
    }

    /// Set hash seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Build the ThetaSketch.
    pub fn build(self) -> ThetaSketch {
        let table = ThetaHashTable::new(
            self.lg_k,
            self.resize_factor,
            self.sampling_probability,
            self.seed,
        );
        ThetaSketch { table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_updates_are_distinct_inputs() {
        let mut sketch = ThetaSketch::builder().lg_k(12).build();
        sketch.update_str("string");
        sketch.update_i64(42);
        sketch.update_u64(42);
        sketch.update_f64(3.15);
        sketch.update_f64(3.15);
        sketch.update_bytes(&[1, 2, 3]);

        assert!(!sketch.is_empty());
        // i64 and u64 share the little-endian encoding of 42.
        assert_eq!(sketch.estimate(), 4.0);
    }

    #[test]
    fn test_empty_inputs_are_noops() {
        let mut sketch = ThetaSketch::builder().build();
        sketch.update_str("");
        sketch.update_bytes(&[]);
        sketch.update_chars(&[]);
        sketch.update_i32s(&[]);
        sketch.update_i64s(&[]);
        assert!(sketch.is_empty());
        assert_eq!(sketch.estimate(), 0.0);
    }

    #[test]
    fn test_double_canonicalization() {
        let mut sketch = ThetaSketch::builder().build();
        sketch.update_f64(0.0);
        sketch.update_f64(-0.0);
        assert_eq!(sketch.estimate(), 1.0);
        sketch.update_f64(f64::NAN);
        sketch.update_f64(f64::from_bits(0x7FF8_0000_0000_0001));
        assert_eq!(sketch.estimate(), 2.0);
    }

    #[test]
    fn test_compact_forms() {
        let mut sketch = ThetaSketch::builder().lg_k(5).build();
        for i in 0..1000u64 {
            sketch.update_u64(i);
        }
        let ordered = sketch.compact(true);
        let unordered = sketch.compact(false);
        assert_eq!(ordered.estimate(), unordered.estimate());
        let hashes: Vec<u64> = ordered.hash_iter().collect();
        assert!(hashes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_round_trip_preserves_estimate() {
        let mut sketch = ThetaSketch::builder().lg_k(5).build();
        for i in 0..1000u64 {
            sketch.update_u64(i);
        }
        let restored = ThetaSketch::deserialize(&sketch.serialize()).unwrap();
        assert_eq!(restored.theta64(), sketch.theta64());
        assert_eq!(restored.num_retained(), sketch.num_retained());
        assert_eq!(restored.estimate(), sketch.estimate());
    }
}
