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

//! Linkage configuration (TOML). Both peers must agree on every tokenization
//! parameter; the peer protocol re-checks this at the start of the exchange.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::core::matching::engine::MatchOptions;
use crate::core::sketch::minhash::PRIME;
use crate::core::tokenize::builder::TokenizerParams;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file open/read failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// TOML syntax or shape error.
    #[error("parse: {0}")]
    Parse(#[from] toml::de::Error),
    /// Missing or out-of-range parameter.
    #[error("{0}")]
    Invalid(String),
    /// Tokenization parameters disagree with the peer's.
    #[error("peer parameter mismatch: {0}")]
    PeerMismatch(String),
}

/// Seed both peers fall back to when the config does not pin one.
pub const DEFAULT_MINHASH_SEED: u64 = 0x626c_6f6f_6d6c_6e6b;

/// Root configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Local dataset.
    pub database: DatabaseConfig,
    /// Dial target; absent for offline (single-party) intersections.
    #[serde(default)]
    pub peer: Option<PeerConfig>,
    /// Bind port for the listen fallback.
    #[serde(default)]
    pub listen_port: Option<u16>,
    /// Matching and tokenization knobs.
    #[serde(default)]
    pub matching: MatchingConfig,
    /// Output locations.
    #[serde(default)]
    pub output: OutputConfig,
    /// `true` selects 1:many matching over the default 1:1 discipline.
    #[serde(default)]
    pub allow_duplicates: bool,
}

/// Local dataset settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Input rows (CSV) or a pre-tokenized store.
    pub filename: String,
    /// Skip tokenization and load the store directly.
    #[serde(default)]
    pub is_tokenized: bool,
    /// Attribute columns, each optionally tagged (`name:`, `date:`, `gender:`, `zip:`).
    #[serde(default)]
    pub fields: Vec<String>,
    /// Bit-flip noise rate in [0, 1]; `matching.noise_level` overrides.
    #[serde(default)]
    pub random_bits_percent: f64,
}

/// Peer dial target.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer host.
    pub host: String,
    /// Peer port.
    pub port: u16,
}

fn default_hamming() -> u32 {
    90
}
fn default_jaccard() -> f64 {
    0.5
}
fn default_bloom_size() -> u32 {
    1024
}
fn default_bloom_hashes() -> u32 {
    5
}
fn default_minhash_size() -> u32 {
    100
}
fn default_qgram_length() -> u32 {
    2
}
fn default_qgram_padding() -> Option<char> {
    Some('_')
}
fn default_minhash_seed() -> u64 {
    DEFAULT_MINHASH_SEED
}

/// Matching and tokenization knobs; defaults match a two-hospital deployment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Maximum Bloom Hamming distance.
    #[serde(default = "default_hamming")]
    pub hamming_threshold: u32,
    /// Minimum MinHash Jaccard estimate.
    #[serde(default = "default_jaccard")]
    pub jaccard_threshold: f64,
    /// Bloom bits `m`.
    #[serde(default = "default_bloom_size")]
    pub bloom_size: u32,
    /// Bloom hashes `k`.
    #[serde(default = "default_bloom_hashes")]
    pub bloom_hashes: u32,
    /// Signature length `s`.
    #[serde(default = "default_minhash_size")]
    pub minhash_size: u32,
    /// Gram length `q`.
    #[serde(default = "default_qgram_length")]
    pub qgram_length: u32,
    /// Gram padding symbol.
    #[serde(default = "default_qgram_padding")]
    pub qgram_padding: Option<char>,
    /// Noise rate override; falls back to `database.random_bits_percent`.
    #[serde(default)]
    pub noise_level: Option<f64>,
    /// Protocol-wide MinHash seed; must be identical on both peers.
    #[serde(default = "default_minhash_seed")]
    pub minhash_seed: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            hamming_threshold: default_hamming(),
            jaccard_threshold: default_jaccard(),
            bloom_size: default_bloom_size(),
            bloom_hashes: default_bloom_hashes(),
            minhash_size: default_minhash_size(),
            qgram_length: default_qgram_length(),
            qgram_padding: default_qgram_padding(),
            noise_level: None,
            minhash_seed: default_minhash_seed(),
        }
    }
}

fn default_output_dir() -> String {
    "out".to_string()
}

/// Output locations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for `intersection_results.json` / `intersection_diff.json`.
    #[serde(default = "default_output_dir")]
    pub directory: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { directory: default_output_dir() }
    }
}

impl LinkConfig {
    /// Load and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }

    /// Noise rate in effect.
    pub fn effective_noise(&self) -> f64 {
        self.matching
            .noise_level
            .unwrap_or(self.database.random_bits_percent)
    }

    /// Validate everything a local tokenize-and-match run needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let m = &self.matching;
        if self.database.filename.is_empty() {
            return Err(ConfigError::Invalid("database.filename is required".into()));
        }
        if !self.database.is_tokenized && self.database.fields.is_empty() {
            return Err(ConfigError::Invalid(
                "database.fields is required unless database.is_tokenized".into(),
            ));
        }
        if m.bloom_size == 0 || m.bloom_hashes == 0 {
            return Err(ConfigError::Invalid(
                "matching.bloom_size and matching.bloom_hashes must be non-zero".into(),
            ));
        }
        if m.bloom_size >= PRIME {
            return Err(ConfigError::Invalid(format!(
                "matching.bloom_size {} must be below {PRIME}",
                m.bloom_size
            )));
        }
        if m.minhash_size == 0 {
            return Err(ConfigError::Invalid("matching.minhash_size must be non-zero".into()));
        }
        if m.qgram_length == 0 {
            return Err(ConfigError::Invalid("matching.qgram_length must be at least 1".into()));
        }
        if m.hamming_threshold > m.bloom_size {
            return Err(ConfigError::Invalid(format!(
                "matching.hamming_threshold {} exceeds bloom_size {}",
                m.hamming_threshold, m.bloom_size
            )));
        }
        if !(0.0..=1.0).contains(&m.jaccard_threshold) {
            return Err(ConfigError::Invalid(format!(
                "matching.jaccard_threshold {} outside [0, 1]",
                m.jaccard_threshold
            )));
        }
        let noise = self.effective_noise();
        if !(0.0..=1.0).contains(&noise) {
            return Err(ConfigError::Invalid(format!("noise rate {noise} outside [0, 1]")));
        }
        Ok(())
    }

    /// Validate a full two-party linkage run and return the peer endpoint.
    pub fn validate_for_linkage(&self) -> Result<(&PeerConfig, u16), ConfigError> {
        self.validate()?;
        let peer = self
            .peer
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid("peer.host and peer.port are required".into()))?;
        if peer.host.is_empty() || peer.port == 0 {
            return Err(ConfigError::Invalid("peer.host and peer.port must be set".into()));
        }
        let listen = self
            .listen_port
            .ok_or_else(|| ConfigError::Invalid("listen_port is required".into()))?;
        if listen == 0 {
            return Err(ConfigError::Invalid("listen_port must be non-zero".into()));
        }
        Ok((peer, listen))
    }

    /// Tokenizer parameters for this config.
    pub fn tokenizer_params(&self, keep_qgrams: bool) -> TokenizerParams {
        TokenizerParams {
            bloom_size: self.matching.bloom_size,
            bloom_hashes: self.matching.bloom_hashes,
            minhash_size: self.matching.minhash_size,
            qgram_length: self.matching.qgram_length,
            qgram_padding: self.matching.qgram_padding,
            noise: self.effective_noise(),
            minhash_seed: self.matching.minhash_seed,
            keep_qgrams,
        }
    }

    /// Engine options for this config.
    pub fn match_options(&self) -> MatchOptions {
        MatchOptions {
            hamming_threshold: self.matching.hamming_threshold,
            jaccard_threshold: self.matching.jaccard_threshold,
            allow_duplicates: self.allow_duplicates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> LinkConfig {
        toml::from_str(
            r#"
            listen_port = 9876

            [database]
            filename = "patients.csv"
            fields = ["name:first_name", "name:last_name", "date:birth_date"]

            [peer]
            host = "127.0.0.1"
            port = 9875
            "#,
        )
        .unwrap()
    }

    #[test]
    fn defaults_apply() {
        let cfg = minimal();
        assert_eq!(cfg.matching.hamming_threshold, 90);
        assert_eq!(cfg.matching.jaccard_threshold, 0.5);
        assert_eq!(cfg.matching.bloom_size, 1024);
        assert_eq!(cfg.matching.qgram_padding, Some('_'));
        assert!(!cfg.allow_duplicates);
        assert_eq!(cfg.output.directory, "out");
        cfg.validate_for_linkage().unwrap();
    }

    #[test]
    fn noise_override_wins() {
        let mut cfg = minimal();
        cfg.database.random_bits_percent = 0.02;
        assert_eq!(cfg.effective_noise(), 0.02);
        cfg.matching.noise_level = Some(0.01);
        assert_eq!(cfg.effective_noise(), 0.01);
    }

    #[test]
    fn out_of_range_rejected() {
        let mut cfg = minimal();
        cfg.matching.jaccard_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = minimal();
        cfg.matching.hamming_threshold = 5000;
        assert!(cfg.validate().is_err());

        let mut cfg = minimal();
        cfg.matching.noise_level = Some(-0.1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn linkage_needs_peer_and_listen_port() {
        let mut cfg = minimal();
        cfg.peer = None;
        assert!(cfg.validate().is_ok());
        assert!(cfg.validate_for_linkage().is_err());

        let mut cfg = minimal();
        cfg.listen_port = None;
        assert!(cfg.validate_for_linkage().is_err());
    }
}
