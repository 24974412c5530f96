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

//! Shared utilities for sketches.

pub mod binomial_bounds;
pub mod random;

pub use random::RandomSource;
pub use random::XorShift64;

/// Number of standard deviations for confidence bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumStdDev {
    One,
    Two,
    Three,
}

impl NumStdDev {
    /// The numeric multiplier for this confidence level.
    pub fn value(self) -> f64 {
        match self {
            NumStdDev::One => 1.0,
            NumStdDev::Two => 2.0,
            NumStdDev::Three => 3.0,
        }
    }
}

/// Hash table resize factor (multiplier per growth step).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeFactor {
    X1,
    X2,
    X4,
    X8,
}

impl ResizeFactor {
    /// log2 of the growth multiplier.
    pub fn lg_value(self) -> u8 {
        match self {
            ResizeFactor::X1 => 0,
            ResizeFactor::X2 => 1,
            ResizeFactor::X4 => 2,
            ResizeFactor::X8 => 3,
        }
    }
}

/// Canonicalize a double for hashing.
///
/// -0.0 collapses to 0.0 and every NaN bit pattern collapses to the canonical
/// NaN, so equal-by-value inputs always hash identically.
pub fn canonical_double(value: f64) -> f64 {
    if value == 0.0 {
        return 0.0;
    }
    if value.is_nan() {
        return f64::from_bits(f64::NAN.to_bits());
    }
    value
}
