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

//! The 128-bit hash primitive shared by all sketch families.
//!
//! Every typed update is reduced to a little-endian byte encoding and run
//! through MurmurHash3 x64 128. The encodings match the reference
//! implementations (a `long` is one 8-byte little-endian word, a `char` array
//! is a sequence of 16-bit little-endian words, and so on), so sketches fed
//! the same logical values produce the same hashes.

use crate::common::canonical_double;

/// Default hash seed shared by sketches that must be mergeable.
pub const DEFAULT_UPDATE_SEED: u64 = 9001;

/// MurmurHash3 x64 128 over raw bytes.
pub fn murmur3_x64_128(bytes: &[u8], seed: u64) -> (u64, u64) {
    mur3::murmurhash3_x64_128(bytes, seed as u32)
}

/// A 16-bit hash of the seed itself, stored in serialized images so that a
/// deserializer can reject sketches built with an incompatible seed.
pub fn compute_seed_hash(seed: u64) -> u16 {
    let (h0, _) = murmur3_x64_128(&seed.to_le_bytes(), 0);
    (h0 ^ (h0 >> 16) ^ (h0 >> 32) ^ (h0 >> 48)) as u16
}

/// Hash a single unsigned 64-bit datum.
pub fn hash_u64(datum: u64, seed: u64) -> (u64, u64) {
    murmur3_x64_128(&datum.to_le_bytes(), seed)
}

/// Hash a single signed 64-bit datum.
pub fn hash_i64(datum: i64, seed: u64) -> (u64, u64) {
    murmur3_x64_128(&datum.to_le_bytes(), seed)
}

/// Hash a double after canonicalization.
///
/// -0.0 hashes as 0.0 and every NaN bit pattern hashes as the canonical NaN.
pub fn hash_f64(datum: f64, seed: u64) -> (u64, u64) {
    let canonical = canonical_double(datum);
    murmur3_x64_128(&canonical.to_bits().to_le_bytes(), seed)
}

/// Hash a string as its raw UTF-8 bytes.
pub fn hash_str(datum: &str, seed: u64) -> (u64, u64) {
    murmur3_x64_128(datum.as_bytes(), seed)
}

/// Hash a byte slice as-is.
pub fn hash_bytes(data: &[u8], seed: u64) -> (u64, u64) {
    murmur3_x64_128(data, seed)
}

/// Hash a slice of 16-bit chars, each encoded little-endian.
pub fn hash_chars(data: &[u16], seed: u64) -> (u64, u64) {
    let mut bytes = Vec::with_capacity(data.len() * 2);
    for c in data {
        bytes.extend_from_slice(&c.to_le_bytes());
    }
    murmur3_x64_128(&bytes, seed)
}

/// Hash a slice of 32-bit ints, each encoded little-endian.
pub fn hash_i32s(data: &[i32], seed: u64) -> (u64, u64) {
    let mut bytes = Vec::with_capacity(data.len() * 4);
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    murmur3_x64_128(&bytes, seed)
}

/// Hash a slice of 64-bit longs, each encoded little-endian.
pub fn hash_i64s(data: &[i64], seed: u64) -> (u64, u64) {
    let mut bytes = Vec::with_capacity(data.len() * 8);
    for v in data {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    murmur3_x64_128(&bytes, seed)
}
