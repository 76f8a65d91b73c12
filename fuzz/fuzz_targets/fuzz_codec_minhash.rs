// Copyright (c) 2026 Bloomlink
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Best-effort: the signature codec must reject garbage without panicking.
    let _ = bloomlink::core::sketch::minhash::Signature::from_bytes(data);
});
