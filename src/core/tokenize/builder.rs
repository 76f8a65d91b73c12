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

//! Record builder: normalize -> q-grams -> Bloom -> MinHash -> [`Record`].
//! A failure on any sub-step is fatal and names the offending record id;
//! silently dropping records would bias the intersection.

use rand::Rng;
use thiserror::Error;

use crate::core::sketch::bloom::{BloomError, BloomFilter};
use crate::core::sketch::minhash::{MinHashError, MinHasher, PRIME};
use crate::core::tokenize::normalize::{normalize, FieldKind};
use crate::core::tokenize::qgram;
use crate::core::types::{ParamsHeader, Record};

/// Tokenization failure; always fatal for the run.
#[derive(Debug, Error)]
pub enum TokenizeError {
    /// Parameter set cannot produce comparable tokens.
    #[error("tokenizer parameters: {0}")]
    Params(String),
    /// Bloom construction failed for one record.
    #[error("record {id:?}: bloom: {source}")]
    Bloom {
        /// Offending record id.
        id: String,
        /// Underlying failure.
        source: BloomError,
    },
    /// Signature construction failed for one record.
    #[error("record {id:?}: minhash: {source}")]
    MinHash {
        /// Offending record id.
        id: String,
        /// Underlying failure.
        source: MinHashError,
    },
}

/// Everything the pipeline needs to fingerprint one record.
#[derive(Clone, Debug)]
pub struct TokenizerParams {
    /// Bloom bits `m`.
    pub bloom_size: u32,
    /// Bloom hashes `k`.
    pub bloom_hashes: u32,
    /// Signature length `s`.
    pub minhash_size: u32,
    /// Gram length `q`.
    pub qgram_length: u32,
    /// Gram padding symbol.
    pub qgram_padding: Option<char>,
    /// Bit-flip noise rate in [0, 1], applied once per record.
    pub noise: f64,
    /// Protocol-wide MinHash seed; must agree across peers.
    pub minhash_seed: u64,
    /// Persist the q-gram multiset on built records (debug pipelines).
    pub keep_qgrams: bool,
}

impl TokenizerParams {
    /// Header advertised to the peer during the token exchange.
    pub fn header(&self) -> ParamsHeader {
        ParamsHeader {
            bloom_size: self.bloom_size,
            bloom_hashes: self.bloom_hashes,
            minhash_size: self.minhash_size,
            qgram_length: self.qgram_length,
            qgram_padding: self.qgram_padding,
            noise: self.noise,
        }
    }
}

/// Reusable pipeline for one party's records.
pub struct RecordBuilder {
    params: TokenizerParams,
    hasher: MinHasher,
}

impl RecordBuilder {
    /// Validate parameters and derive the seeded MinHash family.
    pub fn new(params: TokenizerParams) -> Result<Self, TokenizeError> {
        if params.bloom_size == 0 || params.bloom_hashes == 0 {
            return Err(TokenizeError::Params("bloom_size and bloom_hashes must be non-zero".into()));
        }
        if params.bloom_size >= PRIME {
            return Err(TokenizeError::Params(format!(
                "bloom_size {} must be below the MinHash prime {PRIME}",
                params.bloom_size
            )));
        }
        if params.qgram_length == 0 {
            return Err(TokenizeError::Params("qgram_length must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&params.noise) {
            return Err(TokenizeError::Params(format!("noise {} outside [0, 1]", params.noise)));
        }
        let hasher = MinHasher::new(params.bloom_size, params.minhash_size, params.minhash_seed)
            .map_err(|e| TokenizeError::Params(e.to_string()))?;
        Ok(Self { params, hasher })
    }

    /// Parameter header for the peer exchange.
    pub fn header(&self) -> ParamsHeader {
        self.params.header()
    }

    /// Fingerprint one record from its typed attribute values.
    pub fn build<R: Rng + ?Sized>(
        &self,
        id: &str,
        values: &[(FieldKind, String)],
        rng: &mut R,
    ) -> Result<Record, TokenizeError> {
        let q = self.params.qgram_length as usize;
        let padding = self.params.qgram_padding;

        let mut bloom = BloomFilter::new(self.params.bloom_size, self.params.bloom_hashes)
            .map_err(|source| TokenizeError::Bloom { id: id.to_string(), source })?;
        let mut debug_grams = self.params.keep_qgrams.then(Vec::new);

        for (kind, raw) in values {
            let canonical = normalize(raw, *kind);
            if canonical.is_empty() {
                continue;
            }
            for gram in qgram::set(&canonical, q, padding) {
                bloom.add(gram.as_bytes());
            }
            if let Some(grams) = debug_grams.as_mut() {
                grams.extend(qgram::multiset(&canonical, q, padding));
            }
        }

        // Noise is one scatter per record, not per gram.
        if self.params.noise > 0.0 {
            bloom.scatter_noise(self.params.noise, rng);
        }

        let minhash = self
            .hasher
            .compute_signature(&bloom)
            .map_err(|source| TokenizeError::MinHash { id: id.to_string(), source })?;

        Ok(Record {
            id: id.to_string(),
            bloom,
            minhash,
            qgrams: debug_grams,
        })
    }
}
