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

use crate::common::ResizeFactor;
use crate::hash::compute_seed_hash;

/// Maximum theta value (signed max, matching the reference layout).
pub const MAX_THETA: u64 = i64::MAX as u64;

/// Minimum log2 of K
pub const MIN_LG_K: u8 = 5;

/// Maximum log2 of K
pub const MAX_LG_K: u8 = 26;

/// Default log2 of K
pub const DEFAULT_LG_K: u8 = 12;

/// Resize threshold (0.5 = 50% load factor)
const RESIZE_THRESHOLD: f64 = 0.5;

/// Rebuild threshold (15/16 = 93.75% load factor)
pub(crate) const REBUILD_THRESHOLD: f64 = 15.0 / 16.0;

/// Stride hash bits (7 bits for stride calculation)
const STRIDE_HASH_BITS: u8 = 7;

/// Stride mask
const STRIDE_MASK: u64 = (1 << STRIDE_HASH_BITS) - 1;

/// Open-addressed hash table of 63-bit sketch hashes under a theta screen.
///
/// While the table is still below its nominal size it grows by the resize
/// factor; once past it, filling up triggers a rebuild that keeps the
/// 2^lg_nom_size smallest hashes and adopts the next one as the new theta.
#[derive(Debug, Clone)]
pub(crate) struct ThetaHashTable {
    lg_cur_size: u8,
    lg_nom_size: u8,
    lg_max_size: u8,
    resize_factor: ResizeFactor,
    sampling_probability: f32,
    hash_seed: u64,

    // Emptiness of the source set, not of the array: stays false when every
    // update was screened out by theta.
    is_empty: bool,

    theta: u64,

    entries: Vec<u64>,

    // Non-zero hashes currently stored in `entries`.
    num_retained: usize,
}

impl ThetaHashTable {
    /// Create a new hash table
    pub fn new(
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        hash_seed: u64,
    ) -> Self {
        let lg_max_size = lg_nom_size + 1;
        let lg_cur_size = starting_sub_multiple(lg_max_size, MIN_LG_K, resize_factor.lg_value());
        Self::from_raw_parts(
            lg_cur_size,
            lg_nom_size,
            resize_factor,
            sampling_probability,
            starting_theta_from_sampling_probability(sampling_probability),
            hash_seed,
            true,
        )
    }

    /// Create a table with explicit state.
    ///
    /// # Panics
    ///
    /// Panics if `lg_cur_size > lg_nom_size + 1`.
    pub fn from_raw_parts(
        lg_cur_size: u8,
        lg_nom_size: u8,
        resize_factor: ResizeFactor,
        sampling_probability: f32,
        theta: u64,
        hash_seed: u64,
        is_empty: bool,
    ) -> Self {
        let lg_max_size = lg_nom_size + 1;
        assert!(
            lg_cur_size <= lg_max_size,
            "lg_cur_size must be <= lg_nom_size + 1, got lg_cur_size={lg_cur_size}, lg_nom_size={lg_nom_size}"
        );
        let size = if lg_cur_size > 0 { 1 << lg_cur_size } else { 0 };
        let entries = vec![0u64; size];
        Self {
            lg_cur_size,
            lg_nom_size,
            lg_max_size,
            resize_factor,
            sampling_probability,
            hash_seed,
            is_empty,
            theta,
            entries,
            num_retained: 0,
        }
    }

    /// Rebuild a table from deserialized entries.
    ///
    /// The entries must already be valid sketch hashes under `theta`.
    pub fn from_entries(
        lg_nom_size: u8,
        hash_seed: u64,
        theta: u64,
        entries: Vec<u64>,
        is_empty: bool,
    ) -> Self {
        let lg_size = Self::lg_size_from_count_for_rebuild(entries.len(), REBUILD_THRESHOLD)
            .max(starting_sub_multiple(
                lg_nom_size + 1,
                MIN_LG_K,
                ResizeFactor::X8.lg_value(),
            ));
        let mut table = Self::from_raw_parts(
            lg_size,
            lg_nom_size,
            ResizeFactor::X8,
            1.0,
            theta,
            hash_seed,
            is_empty,
        );
        for hash in entries {
            table.try_insert_hash(hash);
        }
        table
    }

    /// Smallest lg table size whose threshold accommodates `count` entries.
    pub fn lg_size_from_count_for_rebuild(count: usize, threshold: f64) -> u8 {
        let mut lg_size = MIN_LG_K;
        while (threshold * (1u64 << lg_size) as f64) as usize <= count {
            lg_size += 1;
        }
        lg_size
    }

    /// Probe `entries` for `key`.
    ///
    /// Returns the slot holding the key, or the empty slot where it would be
    /// inserted; None only when the table is completely full.
    fn find_in_entries(entries: &[u64], key: u64, lg_size: u8) -> Option<usize> {
        if entries.is_empty() {
            return None;
        }

        let size = entries.len();
        let mask = size - 1;
        let stride = Self::get_stride(key, lg_size);
        let mut index = (key as usize) & mask;
        let loop_index = index;

        loop {
            let probe = entries[index];
            if probe == 0 || probe == key {
                return Some(index);
            }
            index = (index + stride) & mask;
            if index == loop_index {
                return None;
            }
        }
    }

    /// Inserts a pre-screened sketch hash into the table.
    ///
    /// Returns true if the hash was inserted (new), false otherwise.
    pub fn try_insert_hash(&mut self, hash: u64) -> bool {
        self.is_empty = false;

        if hash == 0 || hash >= self.theta {
            return false;
        }

        let index = Self::find_in_entries(&self.entries, hash, self.lg_cur_size)
            .expect("the growth policy keeps a free slot available");

        // Already exists
        if self.entries[index] == hash {
            return false;
        }

        debug_assert_eq!(self.entries[index], 0, "entry should be empty");
        self.entries[index] = hash;
        self.num_retained += 1;

        if self.num_retained > self.growth_threshold() {
            if self.lg_cur_size <= self.lg_nom_size {
                self.resize();
            } else {
                self.rebuild();
            }
        }
        true
    }

    /// True if the hash is currently retained.
    pub fn contains_hash(&self, hash: u64) -> bool {
        match Self::find_in_entries(&self.entries, hash, self.lg_cur_size) {
            Some(index) => self.entries[index] == hash,
            None => false,
        }
    }

    /// Number of retained entries that triggers the next resize or rebuild.
    ///
    /// Below the nominal size the table resizes at half full; past it, a
    /// rebuild fires near saturation instead.
    fn growth_threshold(&self) -> usize {
        let load = if self.lg_cur_size <= self.lg_nom_size {
            RESIZE_THRESHOLD
        } else {
            REBUILD_THRESHOLD
        };
        (load * self.entries.len() as f64) as usize
    }

    /// Grow the table by the resize factor, capped at the maximum size, and
    /// rehash every retained entry into the new array.
    fn resize(&mut self) {
        let target_lg = (self.lg_cur_size + self.resize_factor.lg_value()).min(self.lg_max_size);
        let old_entries = std::mem::replace(&mut self.entries, vec![0u64; 1 << target_lg]);
        self.lg_cur_size = target_lg;
        for hash in old_entries.into_iter().filter(|&h| h != 0) {
            let slot = Self::find_in_entries(&self.entries, hash, target_lg)
                .expect("a freshly grown table has a free slot for every entry");
            self.entries[slot] = hash;
        }
    }

    /// Cut the retained set back to the nominal size k.
    ///
    /// The (k+1)-th smallest hash becomes the new theta; everything below it
    /// is rehashed back into the cleared array.
    fn rebuild(&mut self) {
        let nominal = 1usize << self.lg_nom_size;
        let mut live: Vec<u64> = self.entries.iter().copied().filter(|&h| h != 0).collect();
        let (survivors, cut, _) = live.select_nth_unstable(nominal);
        self.theta = *cut;

        self.entries.fill(0);
        self.num_retained = survivors.len();
        for &hash in survivors.iter() {
            let slot = Self::find_in_entries(&self.entries, hash, self.lg_cur_size)
                .expect("the cleared table has room for the nominal entry count");
            self.entries[slot] = hash;
        }
        debug_assert_eq!(self.num_retained, nominal);
    }

    /// Trim the table to nominal size k
    pub fn trim(&mut self) {
        if self.num_retained > (1 << self.lg_nom_size) {
            self.rebuild();
        }
    }

    /// Reset the table to empty state
    pub fn reset(&mut self) {
        let init_theta = starting_theta_from_sampling_probability(self.sampling_probability);
        let init_lg_cur = starting_sub_multiple(
            self.lg_nom_size + 1,
            MIN_LG_K,
            self.resize_factor.lg_value(),
        );

        // clear entries
        if self.entries.len() != 1 << init_lg_cur {
            self.entries.resize(1 << init_lg_cur, 0);
        }
        self.entries.fill(0);
        self.num_retained = 0;
        self.theta = init_theta;
        self.is_empty = true;
        self.lg_cur_size = init_lg_cur;
    }

    /// Return number of retained entries
    pub fn num_retained(&self) -> usize {
        self.num_retained
    }

    /// Get theta
    pub fn theta(&self) -> u64 {
        self.theta
    }

    /// Set theta; retained entries at or above the new threshold are dropped.
    pub fn set_theta(&mut self, theta: u64) {
        if theta >= self.theta {
            self.theta = theta;
            return;
        }
        self.theta = theta;
        let mut removed = 0;
        for entry in self.entries.iter_mut() {
            if *entry != 0 && *entry >= theta {
                *entry = 0;
                removed += 1;
            }
        }
        if removed > 0 {
            // Zeroing breaks probe chains; reinsert the survivors.
            let survivors: Vec<u64> = self.entries.iter().copied().filter(|&e| e != 0).collect();
            self.entries.fill(0);
            self.num_retained = 0;
            for hash in survivors {
                let idx = Self::find_in_entries(&self.entries, hash, self.lg_cur_size)
                    .expect("survivors always fit the table they came from");
                self.entries[idx] = hash;
                self.num_retained += 1;
            }
        }
    }

    /// Check if emptiness of the source set
    pub fn is_empty(&self) -> bool {
        self.is_empty
    }

    /// Overwrite the logical emptiness flag.
    pub fn set_empty(&mut self, is_empty: bool) {
        self.is_empty = is_empty;
    }

    /// Get iterator over entries
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.entries.iter().copied().filter(|&e| e != 0)
    }

    /// Get log2 of nominal size
    pub fn lg_nom_size(&self) -> u8 {
        self.lg_nom_size
    }

    /// Get the seed used to hash the input.
    pub fn hash_seed(&self) -> u64 {
        self.hash_seed
    }

    /// Get the hash of the seed that was used to hash the input.
    pub fn seed_hash(&self) -> u16 {
        compute_seed_hash(self.hash_seed)
    }

    /// Probe stride for a key; always odd, so every slot gets visited.
    fn get_stride(key: u64, lg_size: u8) -> usize {
        (2 * ((key >> lg_size) & STRIDE_MASK) + 1) as usize
    }
}

/// Initial lg table size: the smallest value >= `lg_min` from which repeated
/// application of the resize factor lands exactly on `lg_target`.
fn starting_sub_multiple(lg_target: u8, lg_min: u8, lg_resize_factor: u8) -> u8 {
    if lg_target <= lg_min {
        lg_min
    } else if lg_resize_factor == 0 {
        lg_target
    } else {
        ((lg_target - lg_min) % lg_resize_factor) + lg_min
    }
}

/// Compute initial theta for hash table based on sampling probability.
fn starting_theta_from_sampling_probability(sampling_probability: f32) -> u64 {
    if sampling_probability < 1.0 {
        (MAX_THETA as f64 * sampling_probability as f64) as u64
    } else {
        MAX_THETA
    }
}
