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

//! Quantile sketch over doubles.
//!
//! A bounded-error rank/quantile summary of a stream of doubles, built on the
//! buffer-compactor scheme: an unsorted base buffer of up to 2k items plus a
//! bitmap-addressed stack of levels, each a sorted run of exactly 2k items
//! whose items carry weight 2^level. The 64-bit level bitmap always equals
//! `n / (2k)`.
//!
//! Three storage forms share one observable contract:
//! - [`DoublesSketch`]: mutable, heap-backed.
//! - [`DirectDoublesSketch`]: mutable, operating in place on a byte region.
//! - [`CompactDoublesSketch`] / [`DirectCompactDoublesSketch`]: immutable,
//!   serialization-optimized.
//!
//! # Examples
//!
//! ```
//! use sketches_core::quantiles::DoublesSketch;
//! use sketches_core::quantiles::DoublesSketchView;
//!
//! let mut sketch = DoublesSketch::builder().build();
//! for i in 0..1000 {
//!     sketch.update(i as f64);
//! }
//! let median = sketch.quantile(0.5).unwrap();
//! assert!((median - 500.0).abs() <= 4.0);
//! ```

mod compact;
mod direct;
pub(crate) mod serialization;
mod sketch;
mod sorted_view;

pub use compact::CompactDoublesSketch;
pub use compact::DirectCompactDoublesSketch;
pub use direct::DirectDoublesSketch;
pub use serialization::DEFAULT_K;
pub use serialization::MAX_K;
pub use serialization::MIN_K;
pub use sketch::DoublesSketch;
pub use sketch::DoublesSketchBuilder;

use crate::error::Error;
use serialization::ImageParts;
use sorted_view::SortedView;

/// Read-side contract shared by every storage form of the quantiles sketch.
///
/// Accessors return owned item runs so that region-backed forms can decode on
/// demand; queries and serialization are provided on top of them.
pub trait DoublesSketchView {
    /// The accuracy parameter this sketch was configured with.
    fn k(&self) -> u16;

    /// Total number of items presented to the sketch.
    fn n(&self) -> u64;

    /// Smallest item seen, or None when empty.
    fn min_value(&self) -> Option<f64>;

    /// Largest item seen, or None when empty.
    fn max_value(&self) -> Option<f64>;

    /// Current base buffer contents, in stored order.
    fn base_buffer_items(&self) -> Vec<f64>;

    /// The sorted 2k-item run at a populated level.
    fn level_items(&self, level: u8) -> Vec<f64>;

    /// Bitmap of populated levels; always equals `n / (2k)`.
    fn bit_pattern(&self) -> u64 {
        serialization::compute_bit_pattern(self.k(), self.n())
    }

    /// True if the sketch has seen no data.
    fn is_empty(&self) -> bool {
        self.n() == 0
    }

    /// True once any level is populated and results are estimates.
    fn is_estimation_mode(&self) -> bool {
        self.bit_pattern() != 0
    }

    /// Number of items retained across the base buffer and all levels.
    fn num_retained(&self) -> usize {
        serialization::compute_retained_items(self.k(), self.n())
    }

    /// The a-priori normalized rank error bound for this k.
    fn normalized_rank_error(&self) -> f64 {
        1.73 / self.k() as f64
    }

    /// Returns the approximate value at normalized rank `phi`.
    ///
    /// `phi` must lie in [0, 1]; 0 yields the minimum and 1 the maximum.
    ///
    /// # Errors
    ///
    /// Returns an error if `phi` is outside [0, 1] or the sketch is empty.
    fn quantile(&self, phi: f64) -> Result<f64, Error> {
        if !(0.0..=1.0).contains(&phi) {
            return Err(
                Error::invalid_argument("quantile fraction must be in [0, 1]")
                    .with_context("phi", phi),
            );
        }
        let (Some(min), Some(max)) = (self.min_value(), self.max_value()) else {
            return Err(Error::illegal_state("quantile query on an empty sketch"));
        };
        if phi == 0.0 {
            return Ok(min);
        }
        if phi == 1.0 {
            return Ok(max);
        }
        let n = self.n();
        let rank = ((phi * n as f64).floor() as u64).min(n - 1);
        Ok(build_sorted_view(self).item_at_rank(rank))
    }

    /// Returns the approximate values at each of the given normalized ranks.
    fn quantiles(&self, phis: &[f64]) -> Result<Vec<f64>, Error> {
        phis.iter().map(|&phi| self.quantile(phi)).collect()
    }

    /// Returns the normalized rank of `value`, or None when empty.
    ///
    /// The rank is the fraction of the stream strictly below `value`.
    fn rank(&self, value: f64) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        Some(build_sorted_view(self).weight_below(value) as f64 / self.n() as f64)
    }

    /// Returns the cumulative distribution at each split point.
    ///
    /// `splits` must be non-empty, finite and strictly increasing. The result
    /// has one more entry than `splits`; the last entry is always 1.
    fn cdf(&self, splits: &[f64]) -> Result<Vec<f64>, Error> {
        check_splits(splits)?;
        if self.is_empty() {
            return Err(Error::illegal_state("cdf query on an empty sketch"));
        }
        let view = build_sorted_view(self);
        let n = self.n() as f64;
        let mut result = Vec::with_capacity(splits.len() + 1);
        for &split in splits {
            result.push(view.weight_below(split) as f64 / n);
        }
        result.push(1.0);
        Ok(result)
    }

    /// Returns the probability mass between consecutive split points.
    ///
    /// Entry i is the fraction of the stream in `[splits[i-1], splits[i])`,
    /// with the first and last entries covering the open tails.
    fn pmf(&self, splits: &[f64]) -> Result<Vec<f64>, Error> {
        let cdf = self.cdf(splits)?;
        let mut result = Vec::with_capacity(cdf.len());
        let mut previous = 0.0;
        for value in cdf {
            result.push(value - previous);
            previous = value;
        }
        Ok(result)
    }

    /// Serialize this sketch to a byte image.
    ///
    /// The compact form sorts the base buffer and stores no spare capacity;
    /// the updatable form preserves the full slot structure.
    fn to_byte_array(&self, compact: bool) -> Vec<u8> {
        let base_buffer = self.base_buffer_items();
        let levels = self.populated_level_runs();
        let runs: Vec<Vec<f64>> = levels.into_iter().map(|(_, run)| run).collect();
        serialization::serialize_parts(
            &ImageParts {
                k: self.k(),
                n: self.n(),
                min_value: self.min_value().unwrap_or(f64::NAN),
                max_value: self.max_value().unwrap_or(f64::NAN),
                base_buffer: &base_buffer,
                levels: &runs,
            },
            compact,
        )
    }

    /// Size in bytes of the updatable serialized form.
    fn updatable_storage_bytes(&self) -> usize {
        serialization::updatable_storage_bytes(self.k(), self.n())
    }

    /// Size in bytes of the compact serialized form.
    fn compact_storage_bytes(&self) -> usize {
        serialization::compact_storage_bytes(self.k(), self.n())
    }

    /// Every populated level paired with its run, low level first.
    #[doc(hidden)]
    fn populated_level_runs(&self) -> Vec<(u8, Vec<f64>)> {
        let mut runs = Vec::new();
        let mut bits = self.bit_pattern();
        while bits != 0 {
            let level = bits.trailing_zeros() as u8;
            runs.push((level, self.level_items(level)));
            bits &= bits - 1;
        }
        runs
    }
}

/// Bytes an updatable image needs for a sketch of parameter `k` after `n`
/// updates. Useful for sizing a region before building a direct sketch.
///
/// # Errors
///
/// Returns an error if `k` is not a power of two in range.
pub fn required_updatable_bytes(k: u16, n: u64) -> Result<usize, Error> {
    serialization::check_k(k)?;
    // A direct sketch always keeps the full preamble and base buffer.
    Ok(serialization::updatable_storage_bytes(k, n.max(1)))
}

pub(crate) fn build_sorted_view<S: DoublesSketchView + ?Sized>(view: &S) -> SortedView {
    SortedView::new(&view.base_buffer_items(), &view.populated_level_runs())
}

fn check_splits(splits: &[f64]) -> Result<(), Error> {
    if splits.is_empty() {
        return Err(Error::invalid_argument("splits must not be empty"));
    }
    for window in splits.windows(2) {
        if !(window[0] < window[1]) {
            return Err(Error::invalid_argument(
                "splits must be strictly increasing",
            ));
        }
    }
    if splits.iter().any(|v| !v.is_finite()) {
        return Err(Error::invalid_argument("splits must be finite"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_updatable_bytes() {
        // Preamble plus the 2k base-buffer slots before any level exists.
        assert_eq!(required_updatable_bytes(128, 1).unwrap(), 32 + 8 * 256);
        assert_eq!(required_updatable_bytes(128, 0).unwrap(), 32 + 8 * 256);
        // One populated level adds 2k more slots.
        assert_eq!(required_updatable_bytes(128, 256).unwrap(), 32 + 8 * 512);
        assert!(required_updatable_bytes(100, 0).is_err());
    }

    #[test]
    fn test_check_splits() {
        assert!(check_splits(&[1.0, 2.0, 3.0]).is_ok());
        assert!(check_splits(&[1.0]).is_ok());
        assert!(check_splits(&[]).is_err());
        assert!(check_splits(&[1.0, 1.0]).is_err());
        assert!(check_splits(&[2.0, 1.0]).is_err());
        assert!(check_splits(&[1.0, f64::NAN]).is_err());
        assert!(check_splits(&[1.0, f64::INFINITY]).is_err());
    }
}
