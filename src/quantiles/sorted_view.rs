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

//! Sorted weighted view over a sketch's retained items.
//!
//! Base-buffer items carry weight 1 and level-i items carry weight 2^i, so
//! the cumulative weights total exactly n. All rank and quantile queries are
//! a single scan over this view.

/// Items in ascending order with cumulative weights.
pub(crate) struct SortedView {
    items: Vec<f64>,
    cum_weights: Vec<u64>,
    total_weight: u64,
}

impl SortedView {
    /// Build the view from the base buffer and the populated level runs.
    ///
    /// `levels` pairs each populated run with its level index.
    pub fn new(base_buffer: &[f64], levels: &[(u8, Vec<f64>)]) -> Self {
        let retained = base_buffer.len() + levels.iter().map(|(_, run)| run.len()).sum::<usize>();
        let mut weighted: Vec<(f64, u64)> = Vec::with_capacity(retained);
        for &item in base_buffer {
            weighted.push((item, 1));
        }
        for (level, run) in levels {
            let weight = 1u64 << level;
            for &item in run {
                weighted.push((item, weight));
            }
        }
        weighted.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

        let mut items = Vec::with_capacity(weighted.len());
        let mut cum_weights = Vec::with_capacity(weighted.len());
        let mut total = 0u64;
        for (item, weight) in weighted {
            total += weight;
            items.push(item);
            cum_weights.push(total);
        }
        Self {
            items,
            cum_weights,
            total_weight: total,
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// The item whose cumulative weight first exceeds `rank`.
    ///
    /// `rank` must be less than the total weight.
    pub fn item_at_rank(&self, rank: u64) -> f64 {
        debug_assert!(rank < self.total_weight);
        let index = self.cum_weights.partition_point(|&cw| cw <= rank);
        self.items[index]
    }

    /// Total weight of items strictly below `value`.
    pub fn weight_below(&self, value: f64) -> u64 {
        let index = self.items.partition_point(|item| *item < value);
        if index == 0 {
            0
        } else {
            self.cum_weights[index - 1]
        }
    }
}
