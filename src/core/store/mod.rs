#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Storage: file-backed token stores.

pub mod token_store;
