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
use crate::error::Error;

/// Set difference of two theta sketches.
///
/// Retains the hashes of `a` that fall under the minimum theta of both
/// sketches and do not appear in `b`. The result is empty iff `a` is empty.
///
/// # Errors
///
/// Returns an error if the sketches were built with incompatible seeds.
///
/// # Examples
///
/// ```
/// use sketches_core::theta::ThetaSketch;
/// use sketches_core::theta::ThetaSketchView;
/// use sketches_core::theta::a_not_b;
///
/// let mut a = ThetaSketch::builder().build();
/// let mut b = ThetaSketch::builder().build();
/// for i in 0..10u64 {
///     a.update_u64(i);
/// }
/// for i in 5..10u64 {
///     b.update_u64(i);
/// }
/// let diff = a_not_b(&a, &b, true).unwrap();
/// assert_eq!(diff.estimate(), 5.0);
/// ```
pub fn a_not_b<A, B>(a: &A, b: &B, ordered: bool) -> Result<CompactThetaSketch, Error>
where
    A: ThetaSketchView,
    B: ThetaSketchView,
{
    if !a.is_empty() && !b.is_empty() && a.seed_hash() != b.seed_hash() {
        return Err(Error::invalid_argument(format!(
            "incompatible seed hash: expected {}, got {}",
            a.seed_hash(),
            b.seed_hash()
        )));
    }

    // The difference of an empty A is empty regardless of B.
    if a.is_empty() {
        return Ok(CompactThetaSketch::new(
            a.theta64(),
            Vec::new(),
            a.seed_hash(),
            true,
            ordered,
        ));
    }

    let theta = a.theta64().min(b.theta64());
    let mut b_hashes: Vec<u64> = b.hash_iter().filter(|&h| h < theta).collect();
    b_hashes.sort_unstable();

    let mut entries: Vec<u64> = a
        .hash_iter()
        .filter(|&h| h < theta && b_hashes.binary_search(&h).is_err())
        .collect();
    if ordered {
        entries.sort_unstable();
    }

    Ok(CompactThetaSketch::new(
        theta,
        entries,
        a.seed_hash(),
        false,
        ordered,
    ))
}
