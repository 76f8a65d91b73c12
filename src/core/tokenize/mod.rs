#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Tokenization pipeline: normalization, q-grams, record building, row input.

pub mod builder;
pub mod normalize;
pub mod qgram;
pub mod rows;
