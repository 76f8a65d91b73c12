#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Networking: the two-party linkage peer protocol.

pub mod peer;
