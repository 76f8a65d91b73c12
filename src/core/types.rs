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

//! Linkage data model: records, wire payloads, match pairs, output shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::core::sketch::bloom::{BloomError, BloomFilter};
use crate::core::sketch::minhash::{MinHashError, Signature};

/// Canonical map type alias (deterministic ordering on the wire and on disk).
pub type CanonicalMap<K, V> = BTreeMap<K, V>;

/// Record/payload decode errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Bloom filter decode failure.
    #[error("bloom: {0}")]
    Bloom(#[from] BloomError),
    /// MinHash signature decode failure.
    #[error("minhash: {0}")]
    MinHash(#[from] MinHashError),
    /// Two records share an id; token payload keys must be unique.
    #[error("duplicate record id {0:?}")]
    DuplicateId(String),
}

/// The unit of linkage: an opaque id plus its privacy-preserving fingerprint.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    /// Opaque id, unique within its own party. Never derived from PHI.
    pub id: String,
    /// Bloom filter over the record's q-grams.
    pub bloom: BloomFilter,
    /// MinHash signature over the filter's set bits.
    pub minhash: Signature,
    /// Q-gram multiset, persisted only by debugging pipelines.
    pub qgrams: Option<Vec<String>>,
}

impl Record {
    /// Disk form with base64 sketches and an RFC 3339 timestamp.
    pub fn to_stored(&self, timestamp: String) -> StoredRecord {
        StoredRecord {
            id: self.id.clone(),
            bloom_filter: self.bloom.to_base64(),
            minhash: self.minhash.to_base64(),
            qgrams: self.qgrams.clone(),
            timestamp,
        }
    }

    /// Decode the disk form.
    pub fn from_stored(stored: &StoredRecord) -> Result<Self, CodecError> {
        Ok(Self {
            id: stored.id.clone(),
            bloom: BloomFilter::from_base64(&stored.bloom_filter)?,
            minhash: Signature::from_base64(&stored.minhash)?,
            qgrams: stored.qgrams.clone(),
        })
    }
}

/// One token-store line / tokenized-CSV row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record id.
    pub id: String,
    /// Base64 of the Bloom filter binary codec.
    pub bloom_filter: String,
    /// Base64 of the MinHash signature binary codec.
    pub minhash: String,
    /// Debug-only q-gram multiset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qgrams: Option<Vec<String>>,
    /// RFC 3339 UTC tokenization time.
    pub timestamp: String,
}

/// Tokenization parameters a peer must share for matching to be meaningful.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamsHeader {
    /// Bloom filter bits `m`.
    pub bloom_size: u32,
    /// Bloom hash count `k`.
    pub bloom_hashes: u32,
    /// MinHash signature length `s`.
    pub minhash_size: u32,
    /// Q-gram length `q`.
    pub qgram_length: u32,
    /// Q-gram padding symbol, if any.
    pub qgram_padding: Option<char>,
    /// Bit-flip noise rate.
    pub noise: f64,
}

impl ParamsHeader {
    /// Reject any disagreement; both peers must tokenize identically.
    pub fn ensure_matches(&self, peer: &ParamsHeader) -> Result<(), String> {
        let mut bad = Vec::new();
        if self.bloom_size != peer.bloom_size {
            bad.push(format!("bloom_size {} vs {}", self.bloom_size, peer.bloom_size));
        }
        if self.bloom_hashes != peer.bloom_hashes {
            bad.push(format!("bloom_hashes {} vs {}", self.bloom_hashes, peer.bloom_hashes));
        }
        if self.minhash_size != peer.minhash_size {
            bad.push(format!("minhash_size {} vs {}", self.minhash_size, peer.minhash_size));
        }
        if self.qgram_length != peer.qgram_length {
            bad.push(format!("qgram_length {} vs {}", self.qgram_length, peer.qgram_length));
        }
        if self.qgram_padding != peer.qgram_padding {
            bad.push(format!(
                "qgram_padding {:?} vs {:?}",
                self.qgram_padding, peer.qgram_padding
            ));
        }
        if (self.noise - peer.noise).abs() > f64::EPSILON {
            bad.push(format!("noise {} vs {}", self.noise, peer.noise));
        }
        if bad.is_empty() {
            Ok(())
        } else {
            Err(bad.join(", "))
        }
    }
}

/// Base64 sketches for one record on the wire.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Base64 Bloom filter.
    pub bloom: String,
    /// Base64 MinHash signature.
    pub minhash: String,
}

/// Phase 1 payload: tokenization parameters plus id-keyed token entries.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Shared tokenization parameters, checked on receipt.
    pub params: ParamsHeader,
    /// Token entries keyed by record id (unique, canonically ordered).
    pub records: CanonicalMap<String, TokenEntry>,
}

impl TokenPayload {
    /// Encode local records for the wire.
    pub fn from_records(records: &[Record], params: ParamsHeader) -> Result<Self, CodecError> {
        let mut map = CanonicalMap::new();
        for r in records {
            let entry = TokenEntry {
                bloom: r.bloom.to_base64(),
                minhash: r.minhash.to_base64(),
            };
            if map.insert(r.id.clone(), entry).is_some() {
                return Err(CodecError::DuplicateId(r.id.clone()));
            }
        }
        Ok(Self { params, records: map })
    }

    /// Decode a received payload into records. Q-grams never cross the wire.
    pub fn into_records(self) -> Result<Vec<Record>, CodecError> {
        let mut out = Vec::with_capacity(self.records.len());
        for (id, entry) in self.records {
            out.push(Record {
                id,
                bloom: BloomFilter::from_base64(&entry.bloom)?,
                minhash: Signature::from_base64(&entry.minhash)?,
                qgrams: None,
            });
        }
        Ok(out)
    }
}

/// A cross-party identifier pair; the only thing the final output carries.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MatchPair {
    /// Id on this side.
    pub local_id: String,
    /// Id on the peer side.
    pub peer_id: String,
}

impl MatchPair {
    /// Orientation-free key, identical on both peers for the same pair.
    pub fn canonical_key(&self) -> String {
        let (lo, hi) = if self.local_id <= self.peer_id {
            (&self.local_id, &self.peer_id)
        } else {
            (&self.peer_id, &self.local_id)
        };
        format!("{lo}<->{hi}")
    }
}

/// Phase 3 payload: each side's locally computed intersection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntersectionPayload {
    /// Match pairs as seen from the sender's side.
    pub pairs: Vec<MatchPair>,
}

/// Wire-level peer messages, length-framed JSON.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum PeerMessage {
    /// Phase 1 token exchange.
    Tokens(TokenPayload),
    /// Phase 3 intersection exchange.
    Intersection(IntersectionPayload),
}

impl PeerMessage {
    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        match self {
            PeerMessage::Tokens(_) => "tokens",
            PeerMessage::Intersection(_) => "intersection",
        }
    }
}

/// `intersection_results.json` shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IntersectionOutput {
    /// Confirmed match pairs.
    pub matches: Vec<MatchPair>,
}

/// Count summary inside `intersection_diff.json`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiffSummary {
    /// Pairs this side found.
    pub local_match_count: usize,
    /// Pairs the peer reported.
    pub peer_match_count: usize,
    /// Pairs only this side found.
    pub only_in_local_count: usize,
    /// Pairs only the peer reported.
    pub only_in_peer_count: usize,
}

/// `intersection_diff.json` shape: ids and counts only, never scores.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiffOutput {
    /// Count summary.
    pub summary: DiffSummary,
    /// Asymmetric pairs present only locally, keyed canonically.
    pub only_in_local: CanonicalMap<String, MatchPair>,
    /// Asymmetric pairs present only at the peer, keyed canonically.
    pub only_in_peer: CanonicalMap<String, MatchPair>,
    /// RFC 3339 UTC creation time.
    pub created_at: String,
}
