// Copyright (c) 2026 Bloomlink
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]

//! Generate a 256-bit token store key file (hex with comment header, 0600).

use anyhow::Result;
use std::path::PathBuf;

use bloomlink::core::security::envelope::StoreKey;

fn main() -> Result<()> {
    let out = std::env::args().nth(1).unwrap_or_else(|| "tokens.key".to_string());
    let path = PathBuf::from(out);

    let key = StoreKey::generate()?;
    key.save(&path)?;

    println!("{}", path.display());
    Ok(())
}
