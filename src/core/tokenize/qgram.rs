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
#![warn(missing_docs)]

//! Q-grams of a padded canonical string.
//!
//! With padding `p`, grams are taken over `p^(q-1) || v || p^(q-1)`. The
//! deduplicated set feeds the Bloom filter; the full multiset is kept only
//! when a debugging pipeline asks for it.

use std::collections::HashSet;

/// All grams in order of occurrence (multiset).
pub fn multiset(value: &str, q: usize, padding: Option<char>) -> Vec<String> {
    if value.is_empty() || q == 0 {
        return Vec::new();
    }
    let chars: Vec<char> = match padding {
        Some(p) => {
            let pad = std::iter::repeat(p).take(q - 1);
            pad.clone().chain(value.chars()).chain(pad).collect()
        }
        None => value.chars().collect(),
    };
    if chars.len() < q {
        return vec![chars.into_iter().collect()];
    }
    chars.windows(q).map(|w| w.iter().collect()).collect()
}

/// Deduplicated grams, first occurrence first.
pub fn set(value: &str, q: usize, padding: Option<char>) -> Vec<String> {
    let mut seen = HashSet::new();
    multiset(value, q, padding)
        .into_iter()
        .filter(|g| seen.insert(g.clone()))
        .collect()
}
