// Copyright (c) 2026 Bloomlink
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Key-file parsing skips comments and hunts for a 64-hex line; no panics.
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = bloomlink::core::security::envelope::StoreKey::from_key_text(text);
    }
});
