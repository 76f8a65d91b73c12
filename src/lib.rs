// Copyright (c) 2026 Bloomlink
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Bloomlink - privacy-preserving record linkage between two peers.
//!
//! This repository provides:
//! - A deterministic tokenization pipeline (normalize, q-grams, Bloom filter,
//!   MinHash signature) turning identifying attributes into comparable tokens
//! - A symmetric two-party TCP protocol exchanging tokens and intersection
//!   results, with cross-verification and diff on disagreement
//! - A similarity engine (Bloom Hamming distance + MinHash Jaccard estimate)
//!   with dual thresholds and an optional 1:1 matching discipline
//! - At-rest authenticated encryption for tokenized artifacts

/// Core protocol primitives (types, tokenization, sketches, matching, storage).
pub mod core;
/// Two-party peer networking (role negotiation, framed exchange, diff).
pub mod networking;
