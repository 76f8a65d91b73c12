// Copyright (c) 2026 Bloomlink
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

use bloomlink::core::types::{Record, StoredRecord};

fuzz_target!(|data: &[u8]| {
    // A token store line is JSON plus base64 sketch codecs; neither layer may panic.
    if let Ok(stored) = serde_json::from_slice::<StoredRecord>(data) {
        let _ = Record::from_stored(&stored);
    }
});
