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

//! Canonical forms for identifying attributes. Normalization is idempotent;
//! an attribute whose canonical form is empty contributes no q-grams.

use chrono::NaiveDate;

/// Semantic attribute kinds with dedicated normalization rules.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// Lowercase, drop spaces.
    None,
    /// Lowercase, keep `[a-z0-9]`, collapse whitespace.
    Name,
    /// Canonical `YYYY-MM-DD`.
    Date,
    /// Single-letter code (`m`, `f`, `nb`, `o`, `u`).
    Gender,
    /// First five decimal digits.
    Zip,
}

impl FieldKind {
    /// Recognize a field-spec tag (`name`, `date`, `gender`, `zip`).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "name" => Some(Self::Name),
            "date" => Some(Self::Date),
            "gender" => Some(Self::Gender),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

/// Split a config field spec like `date:birth_date` into `(kind, column)`.
/// Specs without a recognized tag are untyped columns.
pub fn split_field_spec(spec: &str) -> (FieldKind, &str) {
    if let Some((tag, column)) = spec.split_once(':') {
        if let Some(kind) = FieldKind::from_tag(tag) {
            return (kind, column);
        }
    }
    (FieldKind::None, spec)
}

/// Map a raw attribute value to its canonical form.
pub fn normalize(raw: &str, kind: FieldKind) -> String {
    match kind {
        FieldKind::None => raw.to_lowercase().split_whitespace().collect(),
        FieldKind::Name => normalize_name(raw),
        FieldKind::Date => normalize_date(raw),
        FieldKind::Gender => normalize_gender(raw),
        FieldKind::Zip => raw.chars().filter(char::is_ascii_digit).take(5).collect(),
    }
}

fn normalize_name(raw: &str) -> String {
    let mut kept = String::with_capacity(raw.len());
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            kept.push(c);
        } else if c.is_whitespace() {
            kept.push(' ');
        }
        // punctuation and non-ascii are stripped outright
    }
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];

fn normalize_date(raw: &str) -> String {
    let trimmed = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return date.format("%Y-%m-%d").to_string();
        }
    }
    raw.to_lowercase()
}

fn normalize_gender(raw: &str) -> String {
    match raw.trim().to_lowercase().chars().next() {
        None => String::new(),
        Some('m') => "m".to_string(),
        Some('f') => "f".to_string(),
        Some('n') => "nb".to_string(),
        Some('o') => "o".to_string(),
        Some(_) => "u".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_strips_and_collapses() {
        assert_eq!(normalize("  O'Brien,  Mary-Jane ", FieldKind::Name), "obrien maryjane");
        assert_eq!(normalize("ALICE", FieldKind::Name), "alice");
    }

    #[test]
    fn date_formats_canonicalize() {
        assert_eq!(normalize("1984-03-07", FieldKind::Date), "1984-03-07");
        assert_eq!(normalize("03/07/1984", FieldKind::Date), "1984-03-07");
        assert_eq!(normalize("07-03-1984", FieldKind::Date), "1984-03-07");
        assert_eq!(normalize("Unknown", FieldKind::Date), "unknown");
    }

    #[test]
    fn gender_maps_first_letter() {
        assert_eq!(normalize("Male", FieldKind::Gender), "m");
        assert_eq!(normalize("f", FieldKind::Gender), "f");
        assert_eq!(normalize("nonbinary", FieldKind::Gender), "nb");
        assert_eq!(normalize("other", FieldKind::Gender), "o");
        assert_eq!(normalize("x", FieldKind::Gender), "u");
        assert_eq!(normalize("", FieldKind::Gender), "");
    }

    #[test]
    fn zip_keeps_first_five_digits() {
        assert_eq!(normalize("94110-1234", FieldKind::Zip), "94110");
        assert_eq!(normalize("9411", FieldKind::Zip), "9411");
        assert_eq!(normalize("CA 94110", FieldKind::Zip), "94110");
    }

    #[test]
    fn untyped_lowercases_and_drops_spaces() {
        assert_eq!(normalize("Foo Bar", FieldKind::None), "foobar");
    }

    #[test]
    fn normalization_is_idempotent() {
        let kinds = [
            FieldKind::None,
            FieldKind::Name,
            FieldKind::Date,
            FieldKind::Gender,
            FieldKind::Zip,
        ];
        let inputs = ["O'Brien", "03/07/1984", "Male", "94110-1234", "Foo Bar", ""];
        for kind in kinds {
            for raw in inputs {
                let once = normalize(raw, kind);
                assert_eq!(normalize(&once, kind), once, "kind {kind:?} input {raw:?}");
            }
        }
    }

    #[test]
    fn field_specs_parse() {
        assert_eq!(split_field_spec("name:first"), (FieldKind::Name, "first"));
        assert_eq!(split_field_spec("zip:postal"), (FieldKind::Zip, "postal"));
        assert_eq!(split_field_spec("plain"), (FieldKind::None, "plain"));
        assert_eq!(split_field_spec("weird:col"), (FieldKind::None, "weird:col"));
    }
}
