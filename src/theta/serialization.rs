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

//! Binary serialization format constants for Theta sketches.
//!
//! Preamble (little-endian): pre_longs, serial version, family id, lg_k,
//! lg_arr, flags, then the 16-bit seed hash. A non-empty image continues
//! with the retained count; an estimating image adds theta; the retained
//! 64-bit hashes follow.

/// Current serialization version.
pub const SERIAL_VERSION: u8 = 3;

/// Preamble size for empty or single-item sketch (8 bytes = 1 long).
pub const PREAMBLE_LONGS_EMPTY: u8 = 1;

/// Preamble size for exact-mode sketch (16 bytes = 2 longs).
pub const PREAMBLE_LONGS_EXACT: u8 = 2;

/// Preamble size for estimation-mode sketch (24 bytes = 3 longs).
pub const PREAMBLE_LONGS_ESTIMATION: u8 = 3;

// Flags (byte 5) - bit masks
/// Flag: data is in big-endian format (never set by this crate).
pub const FLAG_IS_BIG_ENDIAN: u8 = 1 << 0;
/// Flag: sketch is read-only (compact sketches are read-only).
pub const FLAG_IS_READ_ONLY: u8 = 1 << 1;
/// Flag: sketch is empty.
pub const FLAG_IS_EMPTY: u8 = 1 << 2;
/// Flag: sketch is in compact format.
pub const FLAG_IS_COMPACT: u8 = 1 << 3;
/// Flag: hash values are ordered (sorted ascending).
pub const FLAG_IS_ORDERED: u8 = 1 << 4;
/// Flag: sketch contains a single item (special short form).
pub const FLAG_HAS_SINGLE_ITEM: u8 = 1 << 5;

/// Size of a single hash entry in bytes (u64).
pub const HASH_SIZE_BYTES: usize = 8;

/// Bit pattern of the unused sampling probability field (1.0f).
pub const DEFAULT_P_FLOAT_BITS: u32 = 0x3F80_0000;
