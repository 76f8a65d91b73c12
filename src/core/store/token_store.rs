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

//! Token store: a file of [`Record`] entries, one JSON object per line,
//! order preserved. A `.enc` path wraps the whole file in the authenticated
//! envelope, with the key in a companion `.key` file. A `.csv` path reads
//! and writes the tokenized-CSV column layout
//! (`id,bloom_filter,minhash,timestamp`).

use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::security::envelope::{self, EnvelopeError, StoreKey};
use crate::core::types::{CodecError, Record, StoredRecord};

/// Token store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File open/read/write failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Envelope failure (authentication failures included).
    #[error(transparent)]
    Crypto(#[from] EnvelopeError),
    /// A store line is not valid JSON.
    #[error("line {line}: {source}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Parse failure.
        source: serde_json::Error,
    },
    /// A store line decoded but its sketches did not.
    #[error("line {line}: {source}")]
    Decode {
        /// 1-based line number.
        line: usize,
        /// Decode failure.
        source: CodecError,
    },
    /// Encrypted store without its companion key file.
    #[error("missing key file {0}")]
    MissingKey(PathBuf),
    /// Malformed tokenized-CSV row.
    #[error("line {0}: malformed tokenized csv row")]
    Csv(usize),
}

/// File-backed container of records.
pub struct TokenStore {
    path: PathBuf,
    key: Option<StoreKey>,
}

fn has_ext(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

impl TokenStore {
    /// Companion key file path for a store path (`tokens.enc` -> `tokens.key`).
    pub fn key_path(store_path: &Path) -> PathBuf {
        store_path.with_extension("key")
    }

    /// Open an existing store. An `.enc` path requires its companion key.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let key = if has_ext(&path, "enc") {
            let kp = Self::key_path(&path);
            if !kp.exists() {
                return Err(StoreError::MissingKey(kp));
            }
            Some(StoreKey::load(&kp)?)
        } else {
            None
        };
        Ok(Self { path, key })
    }

    /// Open a store for writing. For an `.enc` path a missing companion key
    /// is generated and saved first.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let key = if has_ext(&path, "enc") {
            let kp = Self::key_path(&path);
            if kp.exists() {
                Some(StoreKey::load(&kp)?)
            } else {
                let key = StoreKey::generate()?;
                key.save(&kp)?;
                Some(key)
            }
        } else {
            None
        };
        Ok(Self { path, key })
    }

    /// Open an `.enc` store with an explicit key (no companion lookup).
    pub fn open_with_key(path: impl Into<PathBuf>, key: StoreKey) -> Self {
        Self { path: path.into(), key: Some(key) }
    }

    /// Store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether entries are wrapped in the authenticated envelope.
    pub fn is_encrypted(&self) -> bool {
        self.key.is_some()
    }

    fn read_plaintext(&self) -> Result<Vec<u8>, StoreError> {
        match &self.key {
            Some(key) => Ok(envelope::read_sealed(&self.path, key)?),
            None => Ok(fs::read(&self.path)?),
        }
    }

    fn write_plaintext(&self, bytes: &[u8]) -> Result<(), StoreError> {
        match &self.key {
            Some(key) => envelope::write_sealed(&self.path, key, bytes)?,
            None => envelope::atomic_write(&self.path, bytes)?,
        }
        Ok(())
    }

    /// Load every record, preserving order.
    pub fn load_all(&self) -> Result<Vec<Record>, StoreError> {
        if has_ext(&self.path, "csv") {
            return self.load_csv();
        }
        let bytes = self.read_plaintext()?;
        let text = String::from_utf8_lossy(&bytes);
        let mut records = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredRecord = serde_json::from_str(line)
                .map_err(|source| StoreError::Parse { line: i + 1, source })?;
            let record = Record::from_stored(&stored)
                .map_err(|source| StoreError::Decode { line: i + 1, source })?;
            records.push(record);
        }
        Ok(records)
    }

    /// Replace the store contents with `records`.
    pub fn write_all(&self, records: &[Record]) -> Result<(), StoreError> {
        if has_ext(&self.path, "csv") {
            return self.write_csv(records);
        }
        let now = Utc::now().to_rfc3339();
        let mut out = String::new();
        for r in records {
            let stored = r.to_stored(now.clone());
            let line = serde_json::to_string(&stored)
                .map_err(|source| StoreError::Parse { line: 0, source })?;
            out.push_str(&line);
            out.push('\n');
        }
        self.write_plaintext(out.as_bytes())
    }

    /// Append one record.
    pub fn append(&self, record: &Record) -> Result<(), StoreError> {
        let stored = record.to_stored(Utc::now().to_rfc3339());
        let line = serde_json::to_string(&stored)
            .map_err(|source| StoreError::Parse { line: 0, source })?;

        if self.key.is_some() {
            // Whole-file envelope: decrypt, extend, re-seal under a fresh nonce.
            let mut bytes = if self.path.exists() {
                self.read_plaintext()?
            } else {
                Vec::new()
            };
            bytes.extend_from_slice(line.as_bytes());
            bytes.push(b'\n');
            return self.write_plaintext(&bytes);
        }

        let mut f = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        f.write_all(line.as_bytes())?;
        f.write_all(b"\n")?;
        Ok(())
    }

    /// Truncate to an empty store.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.write_plaintext(&[])
    }

    const CSV_HEADER: &'static str = "id,bloom_filter,minhash,timestamp";

    fn load_csv(&self) -> Result<Vec<Record>, StoreError> {
        let text = fs::read_to_string(&self.path)?;
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
        match lines.next() {
            Some((_, header)) if header.trim() == Self::CSV_HEADER => {}
            _ => return Err(StoreError::Csv(1)),
        }
        let mut records = Vec::new();
        for (i, line) in lines {
            let mut cols = line.split(',');
            let (id, bloom_filter, minhash, timestamp) = match (
                cols.next(),
                cols.next(),
                cols.next(),
                cols.next(),
                cols.next(),
            ) {
                (Some(a), Some(b), Some(c), Some(d), None) => (a, b, c, d),
                _ => return Err(StoreError::Csv(i + 1)),
            };
            let stored = StoredRecord {
                id: id.to_string(),
                bloom_filter: bloom_filter.to_string(),
                minhash: minhash.to_string(),
                qgrams: None,
                timestamp: timestamp.to_string(),
            };
            let record = Record::from_stored(&stored)
                .map_err(|source| StoreError::Decode { line: i + 1, source })?;
            records.push(record);
        }
        Ok(records)
    }

    fn write_csv(&self, records: &[Record]) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        let mut out = String::from(Self::CSV_HEADER);
        out.push('\n');
        for r in records {
            let stored = r.to_stored(now.clone());
            out.push_str(&format!(
                "{},{},{},{}\n",
                stored.id, stored.bloom_filter, stored.minhash, stored.timestamp
            ));
        }
        envelope::atomic_write(&self.path, out.as_bytes())?;
        Ok(())
    }
}
