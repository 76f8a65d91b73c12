#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Matching: pairwise similarity scoring and assignment.

pub mod engine;
