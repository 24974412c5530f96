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

//! Immutable compact forms of the quantiles sketch.
//!
//! A compact sketch stores only the retained items with no spare capacity
//! and accepts no further updates. The heap form owns its arrays; the direct
//! form reads a compact image in place from a caller-provided region.

use super::DoublesSketchView;
use super::serialization;
use super::serialization::DATA_START;
use crate::error::Error;
use crate::memory::Region;
use crate::memory::RegionId;
use crate::memory::RegionMut;

/// Immutable, heap-backed compact quantiles sketch.
#[derive(Debug, Clone)]
pub struct CompactDoublesSketch {
    k: u16,
    n: u64,
    min_value: f64,
    max_value: f64,
    /// Sorted base buffer items.
    base_buffer: Vec<f64>,
    /// Populated level runs paired with their level index, low level first.
    levels: Vec<(u8, Vec<f64>)>,
}

impl CompactDoublesSketch {
    pub(crate) fn from_view<S: DoublesSketchView + ?Sized>(view: &S) -> Self {
        let mut base_buffer = view.base_buffer_items();
        base_buffer.sort_unstable_by(f64::total_cmp);
        Self {
            k: view.k(),
            n: view.n(),
            min_value: view.min_value().unwrap_or(f64::NAN),
            max_value: view.max_value().unwrap_or(f64::NAN),
            base_buffer,
            levels: view.populated_level_runs(),
        }
    }

    /// Rebuild a compact sketch from a serialized image.
    ///
    /// Accepts both compact and updatable images; the result is compact
    /// either way.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed.
    pub fn heapify(bytes: &[u8]) -> Result<Self, Error> {
        let image = serialization::parse_image(bytes)?;
        let bit_pattern = serialization::compute_bit_pattern(image.k, image.n);
        let mut levels = Vec::with_capacity(image.levels.len());
        let mut bits = bit_pattern;
        for run in image.levels {
            let level = bits.trailing_zeros() as u8;
            levels.push((level, run));
            bits &= bits - 1;
        }
        let mut base_buffer = image.base_buffer;
        base_buffer.sort_unstable_by(f64::total_cmp);
        Ok(Self {
            k: image.k,
            n: image.n,
            min_value: image.min_value,
            max_value: image.max_value,
            base_buffer,
            levels,
        })
    }

    /// Serialize to the compact image.
    pub fn serialize(&self) -> Vec<u8> {
        self.to_byte_array(true)
    }
}

impl DoublesSketchView for CompactDoublesSketch {
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

    fn base_buffer_items(&self) -> Vec<f64> {
        self.base_buffer.clone()
    }

    fn level_items(&self, level: u8) -> Vec<f64> {
        self.levels
            .iter()
            .find(|(lvl, _)| *lvl == level)
            .map(|(_, run)| run.clone())
            .unwrap_or_default()
    }

    fn populated_level_runs(&self) -> Vec<(u8, Vec<f64>)> {
        self.levels.clone()
    }
}

/// Immutable compact quantiles sketch reading a region in place.
#[derive(Debug)]
pub struct DirectCompactDoublesSketch<R: Region> {
    region: R,
    k: u16,
    n: u64,
    min_value: f64,
    max_value: f64,
}

impl<R: Region> DirectCompactDoublesSketch<R> {
    /// Wrap a region holding a compact image.
    ///
    /// # Errors
    ///
    /// Returns an error if the image is malformed or not in compact form.
    pub fn wrap(region: R) -> Result<Self, Error> {
        let pre = serialization::parse_preamble(region.bytes())?;
        if !pre.is_empty() && !pre.is_compact() {
            return Err(Error::deserial("image is not in compact form"));
        }
        let expected = serialization::compact_storage_bytes(pre.k, pre.n);
        if region.capacity() < expected {
            return Err(Error::capacity(expected, region.capacity()));
        }
        Ok(Self {
            region,
            k: pre.k,
            n: pre.n,
            min_value: pre.min_value,
            max_value: pre.max_value,
        })
    }

    pub(crate) fn from_view<S: DoublesSketchView + ?Sized>(
        view: &S,
        mut region: R,
    ) -> Result<Self, Error>
    where
        R: RegionMut,
    {
        let image = view.to_byte_array(true);
        if region.capacity() < image.len() {
            return Err(Error::capacity(image.len(), region.capacity()));
        }
        region.bytes_mut()[..image.len()].copy_from_slice(&image);
        Ok(Self {
            region,
            k: view.k(),
            n: view.n(),
            min_value: view.min_value().unwrap_or(f64::NAN),
            max_value: view.max_value().unwrap_or(f64::NAN),
        })
    }

    /// Identity of the backing region.
    pub fn region_id(&self) -> RegionId {
        self.region.id()
    }

    /// True iff `id` names this sketch's backing region.
    pub fn is_same_resource(&self, id: RegionId) -> bool {
        self.region.is_same_resource(id)
    }

    fn read_item(&self, index: usize) -> f64 {
        self.region.get_f64(DATA_START + 8 * index)
    }
}

impl<R: Region> DoublesSketchView for DirectCompactDoublesSketch<R> {
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

    fn base_buffer_items(&self) -> Vec<f64> {
        let bb_count = serialization::compute_base_buffer_count(self.k, self.n);
        (0..bb_count).map(|i| self.read_item(i)).collect()
    }

    fn level_items(&self, level: u8) -> Vec<f64> {
        let two_k = 2 * self.k as usize;
        let bb_count = serialization::compute_base_buffer_count(self.k, self.n);
        let bit_pattern = self.bit_pattern();
        debug_assert!(bit_pattern & (1u64 << level) != 0);
        // Runs are packed after the base buffer in level order.
        let below_mask = (1u64 << level) - 1;
        let runs_below = (bit_pattern & below_mask).count_ones() as usize;
        let start = bb_count + runs_below * two_k;
        (start..start + two_k).map(|i| self.read_item(i)).collect()
    }
}
