#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Runtime: session orchestration.

pub mod session;
