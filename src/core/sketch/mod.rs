#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Privacy-preserving sketches: Bloom filters and MinHash signatures.

pub mod bloom;
pub mod minhash;
