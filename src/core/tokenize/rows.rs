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

//! Row-source boundary: the pipeline consumes `(id, typed attribute values)`
//! rows and does not care where they come from. The minimal header-based CSV
//! reader below backs the CLI; full CSV dialect handling is a collaborator's
//! concern.

use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::tokenize::normalize::{split_field_spec, FieldKind};

/// Row-source errors.
#[derive(Debug, Error)]
pub enum RowsError {
    /// File open/read failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// No header line.
    #[error("empty input")]
    Empty,
    /// A configured field column is absent from the header.
    #[error("missing column {0:?}")]
    MissingColumn(String),
    /// A data line has a different field count than the header.
    #[error("line {0}: field count differs from header")]
    Ragged(usize),
}

/// One input row: opaque id plus typed attribute values, in field order.
#[derive(Clone, Debug)]
pub struct RowInput {
    /// Record id (the `id` column, or the first column if none is named so).
    pub id: String,
    /// `(kind, raw value)` pairs for the configured fields.
    pub values: Vec<(FieldKind, String)>,
}

/// Split one CSV line, honoring double quotes and `""` escapes.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Read all rows from a headered CSV, projecting the configured field specs.
pub fn read_rows(path: &Path, field_specs: &[String]) -> Result<Vec<RowInput>, RowsError> {
    let text = fs::read_to_string(path)?;
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());

    let (_, header) = lines.next().ok_or(RowsError::Empty)?;
    let headers: Vec<String> = split_line(header)
        .into_iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let id_idx = headers.iter().position(|h| h == "id").unwrap_or(0);

    let mut projection = Vec::with_capacity(field_specs.len());
    for spec in field_specs {
        let (kind, column) = split_field_spec(spec);
        let idx = headers
            .iter()
            .position(|h| h == &column.to_lowercase())
            .ok_or_else(|| RowsError::MissingColumn(column.to_string()))?;
        projection.push((kind, idx));
    }

    let mut rows = Vec::new();
    for (lineno, line) in lines {
        let fields = split_line(line);
        if fields.len() != headers.len() {
            return Err(RowsError::Ragged(lineno + 1));
        }
        rows.push(RowInput {
            id: fields[id_idx].trim().to_string(),
            values: projection
                .iter()
                .map(|&(kind, idx)| (kind, fields[idx].clone()))
                .collect(),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn splits_quoted_fields() {
        assert_eq!(split_line(r#"a,"b,c",d"#), vec!["a", "b,c", "d"]);
        assert_eq!(split_line(r#""say ""hi""",x"#), vec![r#"say "hi""#, "x"]);
    }

    #[test]
    fn reads_projected_rows() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "id,first_name,birth_date,gender").unwrap();
        writeln!(f, "r1,Alice,1984-03-07,f").unwrap();
        writeln!(f, "r2,\"O'Brien, Mary\",03/07/1984,female").unwrap();
        let specs = vec!["name:first_name".to_string(), "date:birth_date".to_string()];
        let rows = read_rows(f.path(), &specs).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "r1");
        assert_eq!(rows[0].values[0], (FieldKind::Name, "Alice".to_string()));
        assert_eq!(rows[1].values[0].1, "O'Brien, Mary");
    }

    #[test]
    fn missing_column_is_an_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "id,first_name").unwrap();
        writeln!(f, "r1,Alice").unwrap();
        let specs = vec!["zip:postal".to_string()];
        assert!(matches!(
            read_rows(f.path(), &specs),
            Err(RowsError::MissingColumn(_))
        ));
    }
}
