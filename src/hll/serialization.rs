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

//! Binary serialization format constants for HLL sketches.
//!
//! The preamble is measured in 4-byte ints and depends on the mode: LIST
//! images carry 2 ints, SET images 3 ints, and HLL images 10 ints (the HIP
//! registers and counts). The mode byte packs the current mode in its low
//! two bits and the target type in the next two.

/// Current serialization version.
pub const SERIAL_VERSION: u8 = 1;

// Flag bit masks (byte 5)
/// Flag: sketch is empty.
pub const FLAG_IS_EMPTY: u8 = 1 << 2;
/// Flag: image is in compact form (only populated coupons stored).
pub const FLAG_IS_COMPACT: u8 = 1 << 3;
/// Flag: the HIP estimator is invalid (out-of-order updates).
pub const FLAG_OUT_OF_ORDER: u8 = 1 << 4;

// Preamble byte offsets
pub const PREAMBLE_INTS_BYTE: usize = 0;
pub const SER_VER_BYTE: usize = 1;
pub const FAMILY_BYTE: usize = 2;
pub const LG_K_BYTE: usize = 3;
pub const LG_ARR_BYTE: usize = 4;
pub const FLAGS_BYTE: usize = 5;
pub const LIST_COUNT_BYTE: usize = 6;
pub const MODE_BYTE: usize = 7;

// Data offsets
pub const LIST_INT_ARR_START: usize = 8;
pub const HASH_SET_COUNT_INT: usize = 8;
pub const HASH_SET_INT_ARR_START: usize = 12;
pub const HIP_ACCUM_DOUBLE: usize = 8;
pub const KXQ0_DOUBLE: usize = 16;
pub const KXQ1_DOUBLE: usize = 24;
pub const NUM_ZERO_COUNT_INT: usize = 32;
pub const AUX_COUNT_INT: usize = 36;
pub const HLL_BYTE_ARR_START: usize = 40;

// Preamble sizes in ints
pub const LIST_PREINTS: u8 = 2;
pub const HASH_SET_PREINTS: u8 = 3;
pub const HLL_PREINTS: u8 = 10;

/// Minimum lg_config_k.
pub const MIN_LG_K: u8 = 4;

/// Maximum lg_config_k.
pub const MAX_LG_K: u8 = 21;

/// Encode the mode byte from current mode and target type codes.
pub fn encode_mode_byte(cur_mode: u8, tgt_type: u8) -> u8 {
    (cur_mode & 0x3) | ((tgt_type & 0x3) << 2)
}

/// Current mode code stored in the low 2 bits.
pub fn extract_cur_mode(mode_byte: u8) -> u8 {
    mode_byte & 0x3
}

/// Target type code stored in bits 2-3.
pub fn extract_tgt_type(mode_byte: u8) -> u8 {
    (mode_byte >> 2) & 0x3
}
