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

//! Confidence bounds for sampling-based cardinality estimates.
//!
//! Given `n` retained hashes under a sampling fraction `theta`, the true
//! cardinality is a Binomial variable. The bounds below use the normal
//! approximation with relative error `sqrt(1 - theta) / sqrt(n)`, which
//! degenerates to the exact count when `theta == 1`.

use crate::common::NumStdDev;
use crate::error::Error;

fn check_theta(theta: f64) -> Result<(), Error> {
    if !(theta > 0.0 && theta <= 1.0) {
        return Err(
            Error::invalid_argument("theta must be in (0, 1]").with_context("theta", theta)
        );
    }
    Ok(())
}

fn relative_error(num_retained: u64, theta: f64, num_std_dev: NumStdDev) -> f64 {
    let n = num_retained.max(1) as f64;
    num_std_dev.value() * ((1.0 - theta) / n).sqrt()
}

/// Approximate lower bound on the true count.
///
/// Never below the retained count itself: every retained hash is a distinct
/// input the sketch has actually seen.
pub fn lower_bound(num_retained: u64, theta: f64, num_std_dev: NumStdDev) -> Result<f64, Error> {
    check_theta(theta)?;
    if theta == 1.0 || num_retained == 0 {
        return Ok(num_retained as f64);
    }
    let estimate = num_retained as f64 / theta;
    let rel = relative_error(num_retained, theta, num_std_dev);
    Ok((estimate / (1.0 + rel)).max(num_retained as f64))
}

/// Approximate upper bound on the true count.
pub fn upper_bound(
    num_retained: u64,
    theta: f64,
    num_std_dev: NumStdDev,
    is_empty: bool,
) -> Result<f64, Error> {
    check_theta(theta)?;
    if is_empty {
        return Ok(0.0);
    }
    if theta == 1.0 {
        return Ok(num_retained as f64);
    }
    if num_retained == 0 {
        // Nothing retained but updates were screened: the count is bounded by
        // how many sub-theta misses the confidence level tolerates.
        return Ok(num_std_dev.value() / theta);
    }
    let estimate = num_retained as f64 / theta;
    let rel = relative_error(num_retained, theta, num_std_dev);
    Ok(estimate * (1.0 + rel))
}
