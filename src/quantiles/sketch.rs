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

use super::CompactDoublesSketch;
use super::DirectCompactDoublesSketch;
use super::DirectDoublesSketch;
use super::DoublesSketchView;
use super::serialization;
use super::serialization::DEFAULT_K;
use super::serialization::check_k;
use crate::common::RandomSource;
use crate::common::XorShift64;
use crate::error::Error;
use crate::memory::RegionMut;

/// Mutable heap-backed quantile sketch over doubles.
///
/// Built through [`DoublesSketch::builder`]. See the
/// [module level documentation](crate::quantiles) for the algorithm.
#[derive(Debug, Clone)]
pub struct DoublesSketch {
    k: u16,
    n: u64,
    min_value: f64,
    max_value: f64,
    bit_pattern: u64,
    /// Base buffer in slots [0, 2k), level i in [2k + i*2k, 2k + (i+1)*2k).
    combined: Vec<f64>,
    rng: XorShift64,
}

impl DoublesSketch {
    /// Create a new builder for quantile sketches.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketches_core::quantiles::DoublesSketch;
    /// # use sketches_core::quantiles::DoublesSketchView;
    /// let sketch = DoublesSketch::builder().k(256).build();
    /// assert_eq!(sketch.k(), 256);
    /// ```
    pub fn builder() -> DoublesSketchBuilder {
        DoublesSketchBuilder::default()
    }

    pub(crate) fn make(k: u16, rng: XorShift64) -> Self {
        Self {
            k,
            n: 0,
            min_value: f64::NAN,
            max_value: f64::NAN,
            bit_pattern: 0,
            combined: vec![0.0; 2 * k as usize],
            rng,
        }
    }

    pub(crate) fn from_parts(
        k: u16,
        n: u64,
        min_value: f64,
        max_value: f64,
        base_buffer: &[f64],
        levels: &[Vec<f64>],
        rng: XorShift64,
    ) -> Self {
        let two_k = 2 * k as usize;
        let bit_pattern = serialization::compute_bit_pattern(k, n);
        let num_levels = serialization::compute_num_levels(bit_pattern);
        let mut combined = vec![0.0; two_k * (1 + num_levels as usize)];
        combined[..base_buffer.len()].copy_from_slice(base_buffer);
        let mut populated = levels.iter();
        for level in 0..num_levels {
            if bit_pattern & (1u64 << level) != 0 {
                let run = populated.next().expect("run per populated level");
                let start = two_k + level as usize * two_k;
                combined[start..start + two_k].copy_from_slice(run);
            }
        }
        Self {
            k,
            n,
            min_value,
            max_value,
            bit_pattern,
            combined,
            rng,
        }
    }

    /// Rebuild a heap sketch from a serialized image (compact or updatable).
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sketches_core::quantiles::DoublesSketch;
    /// # use sketches_core::quantiles::DoublesSketchView;
    /// let mut sketch = DoublesSketch::builder().build();
    /// sketch.update(1.0);
    /// let restored = DoublesSketch::heapify(&sketch.to_byte_array(true)).unwrap();
    /// assert_eq!(restored.n(), 1);
    /// ```
    pub fn heapify(bytes: &[u8]) -> Result<Self, Error> {
        let image = serialization::parse_image(bytes)?;
        Ok(Self::from_parts(
            image.k,
            image.n,
            image.min_value,
            image.max_value,
            &image.base_buffer,
            &image.levels,
            XorShift64::default(),
        ))
    }

    /// Present an item to the sketch. NaN values are ignored.
    pub fn update(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        if self.n == 0 {
            self.min_value = value;
            self.max_value = value;
        } else {
            if value < self.min_value {
                self.min_value = value;
            }
            if value > self.max_value {
                self.max_value = value;
            }
        }

        let two_k = 2 * self.k as usize;
        let bb_count = serialization::compute_base_buffer_count(self.k, self.n);
        self.combined[bb_count] = value;
        self.n += 1;

        if bb_count + 1 == two_k {
            let mut input = self.combined[..two_k].to_vec();
            input.sort_unstable_by(f64::total_cmp);
            self.propagate_carry(0, input);
        }
        debug_assert_eq!(self.bit_pattern, self.n / (2 * self.k as u64));
    }

    /// Merge another sketch into this one.
    ///
    /// The source's k must be greater than or equal to this sketch's k; a
    /// wider source is down-sampled into higher levels.
    ///
    /// # Errors
    ///
    /// Returns an error when the source k is smaller than this sketch's k.
    pub fn merge<S: DoublesSketchView>(&mut self, other: &S) -> Result<(), Error> {
        if other.is_empty() {
            return Ok(());
        }
        if other.k() < self.k {
            return Err(Error::invalid_argument(
                "source k must be >= destination k for a down-sampling merge",
            )
            .with_context("source_k", other.k())
            .with_context("destination_k", self.k));
        }

        for item in other.base_buffer_items() {
            self.update(item);
        }

        let ratio = (other.k() / self.k) as usize;
        let lg_ratio = ratio.trailing_zeros() as u8;
        let two_k = 2 * self.k as usize;
        for (level, run) in other.populated_level_runs() {
            let in_arr: Vec<f64> = if ratio == 1 {
                run
            } else {
                // Random-offset decimation keeps every surviving item an
                // unbiased sample of its 2k-wide neighborhood.
                let offset = (self.rng.next_u64() % ratio as u64) as usize;
                run.iter().skip(offset).step_by(ratio).copied().collect()
            };
            debug_assert_eq!(in_arr.len(), two_k);
            let target_level = level + lg_ratio;
            self.n += (two_k as u64) << target_level;
            self.propagate_carry(target_level, in_arr);
        }

        if let (Some(other_min), Some(other_max)) = (other.min_value(), other.max_value()) {
            // The destination may have been empty with a level-only source.
            if self.min_value.is_nan() || other_min < self.min_value {
                self.min_value = other_min;
            }
            if self.max_value.is_nan() || other_max > self.max_value {
                self.max_value = other_max;
            }
        }
        debug_assert_eq!(self.bit_pattern, self.n / (2 * self.k as u64));
        Ok(())
    }

    /// Convert to the immutable compact form.
    pub fn compact(&self) -> CompactDoublesSketch {
        CompactDoublesSketch::from_view(self)
    }

    /// Write the compact form into a caller-provided region and wrap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the region is smaller than the compact image.
    pub fn compact_into<R: RegionMut>(
        &self,
        region: R,
    ) -> Result<DirectCompactDoublesSketch<R>, Error> {
        DirectCompactDoublesSketch::from_view(self, region)
    }

    /// Reset to the empty state, keeping k and the random stream.
    pub fn reset(&mut self) {
        self.n = 0;
        self.min_value = f64::NAN;
        self.max_value = f64::NAN;
        self.bit_pattern = 0;
        self.combined.clear();
        self.combined.resize(2 * self.k as usize, 0.0);
    }

    /// Carry a sorted 2k-item run into the level stack starting at
    /// `start_level`.
    ///
    /// Mirrors binary addition of `1 << start_level` into the bit pattern:
    /// every occupied level on the way merges with the incoming run and the
    /// merged 4k items are halved by keeping one of the two alternating
    /// parities, chosen by an independent fair coin per compaction.
    fn propagate_carry(&mut self, start_level: u8, mut in_arr: Vec<f64>) {
        let two_k = 2 * self.k as usize;
        debug_assert_eq!(in_arr.len(), two_k);

        let mut level = start_level;
        while self.bit_pattern & (1u64 << level) != 0 {
            let start = two_k + level as usize * two_k;
            let existing = &self.combined[start..start + two_k];
            let merged = merge_sorted(&in_arr, existing);
            let offset = usize::from(self.rng.next_bool());
            in_arr = merged.into_iter().skip(offset).step_by(2).collect();
            debug_assert_eq!(in_arr.len(), two_k);
            self.bit_pattern &= !(1u64 << level);
            level += 1;
        }

        let start = two_k + level as usize * two_k;
        if self.combined.len() < start + two_k {
            self.combined.resize(start + two_k, 0.0);
        }
        self.combined[start..start + two_k].copy_from_slice(&in_arr);
        self.bit_pattern |= 1u64 << level;
    }
}

/// Merge two sorted runs into one sorted vector.
pub(crate) fn merge_sorted(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].total_cmp(&b[j]).is_le() {
            merged.push(a[i]);
            i += 1;
        } else {
            merged.push(b[j]);
            j += 1;
        }
    }
    merged.extend_from_slice(&a[i..]);
    merged.extend_from_slice(&b[j..]);
    merged
}

impl DoublesSketchView for DoublesSketch {
    fn k(&self) -> u16 {
        self.k
    }

    fn n(&self) -> u64 {
        self.n
    }

    fn min_value(&self) -> Option<f64> {
        (self.n > 0).then_some(self.min_value)
    }

    fn max_value(&self) -> Option<f64> {
        (self.n > 0).then_some(self.max_value)
    }

    fn bit_pattern(&self) -> u64 {
        self.bit_pattern
    }

    fn base_buffer_items(&self) -> Vec<f64> {
        let bb_count = serialization::compute_base_buffer_count(self.k, self.n);
        self.combined[..bb_count].to_vec()
    }

    fn level_items(&self, level: u8) -> Vec<f64> {
        debug_assert!(self.bit_pattern & (1u64 << level) != 0);
        let two_k = 2 * self.k as usize;
        let start = two_k + level as usize * two_k;
        self.combined[start..start + two_k].to_vec()
    }
}

impl fmt::Display for DoublesSketch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "### DoublesSketch summary:")?;
        writeln!(f, "   k            : {}", self.k)?;
        writeln!(f, "   n            : {}", self.n)?;
        writeln!(f, "   bit pattern  : {:b}", self.bit_pattern)?;
        writeln!(f, "   retained     : {}", self.num_retained())?;
        writeln!(f, "   min, max     : {}, {}", self.min_value, self.max_value)?;
        write!(f, "### end summary")
    }
}

/// Builder for quantile sketches.
#[derive(Debug)]
pub struct DoublesSketchBuilder {
    k: u16,
    random_seed: Option<u64>,
}

impl Default for DoublesSketchBuilder {
    fn default() -> Self {
        Self {
            k: DEFAULT_K,
            random_seed: None,
        }
    }
}

impl DoublesSketchBuilder {
    /// Set k: a power of two in [2, 32768]. Higher k tightens the rank
    /// error at the cost of space.
    ///
    /// # Panics
    ///
    /// Panics if k is not a power of two in range.
    pub fn k(mut self, k: u16) -> Self {
        check_k(k).unwrap_or_else(|e| panic!("{e}"));
        self.k = k;
        self
    }

    /// Seed the compactor's random stream for reproducible results.
    ///
    /// Without a seed the stream is seeded from the OS clock.
    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    fn rng(&self) -> XorShift64 {
        match self.random_seed {
            Some(seed) => XorShift64::seeded(seed),
            None => XorShift64::default(),
        }
    }

    /// Build a heap-backed sketch.
    pub fn build(self) -> DoublesSketch {
        let rng = self.rng();
        DoublesSketch::make(self.k, rng)
    }

    /// Build a direct sketch operating in place on the given region.
    ///
    /// # Errors
    ///
    /// Returns an error if the region cannot hold the preamble plus the 2k
    /// base-buffer slots.
    pub fn build_direct<R: RegionMut>(self, region: R) -> Result<DirectDoublesSketch<R>, Error> {
        let rng = self.rng();
        DirectDoublesSketch::new(self.k, region, rng)
    }
}
