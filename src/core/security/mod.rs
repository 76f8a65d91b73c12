#![forbid(unsafe_code)]
#![allow(missing_docs)]

//! Security: at-rest authenticated encryption and key files.

pub mod envelope;
