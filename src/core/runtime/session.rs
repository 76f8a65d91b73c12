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

//! Session orchestration: tokenize -> connect -> exchange -> match ->
//! cross-verify -> emit outputs. Any fatal error aborts the session without
//! partial outputs; cancellation is distinguished from faults. This is the
//! only layer that writes output files.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::core::config::{ConfigError, LinkConfig};
use crate::core::matching::engine::{find_matches, MatchOptions};
use crate::core::security::envelope::{self, EnvelopeError, StoreKey};
use crate::core::store::token_store::{StoreError, TokenStore};
use crate::core::tokenize::builder::{RecordBuilder, TokenizeError};
use crate::core::tokenize::rows::{self, RowsError};
use crate::core::types::{
    CodecError, DiffOutput, DiffSummary, IntersectionOutput, IntersectionPayload, MatchPair,
    Record, TokenPayload,
};
use crate::networking::peer::{compare_intersections, PeerChannel, PeerError, Role};

/// Name of the agreement output file.
pub const RESULTS_FILE: &str = "intersection_results.json";
/// Name of the disagreement output file.
pub const DIFF_FILE: &str = "intersection_diff.json";

/// Session-level failure taxonomy. Components return typed errors; this is
/// the shape the binaries report from.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Missing/out-of-range parameter, or peer parameter disagreement.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// File I/O failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// Input row failure.
    #[error("input: {0}")]
    Rows(#[from] RowsError),
    /// Record-level tokenization failure; always fatal.
    #[error("tokenize: {0}")]
    Tokenize(#[from] TokenizeError),
    /// Token store failure.
    #[error("store: {0}")]
    Store(#[from] StoreError),
    /// Envelope/key failure.
    #[error("crypto: {0}")]
    Crypto(#[from] EnvelopeError),
    /// Payload decode failure.
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    /// Output serialization failure.
    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
    /// Peer protocol or network failure.
    #[error("peer: {0}")]
    Peer(PeerError),
    /// Both peers completed but their intersections disagree; the diff file
    /// has been written.
    #[error("intersection mismatch ({only_local} only local, {only_peer} only peer)")]
    Mismatch {
        /// Pairs only this side found.
        only_local: usize,
        /// Pairs only the peer reported.
        only_peer: usize,
    },
    /// Caller-initiated shutdown.
    #[error("canceled")]
    Canceled,
    /// The scoring task died.
    #[error("scoring worker failed")]
    Worker,
}

impl From<PeerError> for SessionError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::Canceled => SessionError::Canceled,
            other => SessionError::Peer(other),
        }
    }
}

/// What a confirmed linkage produced.
#[derive(Debug)]
pub struct SessionOutcome {
    /// Negotiated role (ordering label only).
    pub role: Role,
    /// Confirmed match pairs.
    pub matches: Vec<MatchPair>,
    /// Where the results file was written.
    pub results_path: PathBuf,
}

/// Session-scoped working directory holding the plaintext intermediate store.
/// Dropped on teardown: the store is overwritten and unlinked first, unless
/// debug retention was requested.
struct SessionDir {
    inner: Option<TempDir>,
    store_path: PathBuf,
    keep: bool,
}

impl SessionDir {
    fn new(keep: bool) -> std::io::Result<Self> {
        let inner = tempfile::tempdir()?;
        let store_path = inner.path().join("tokens.jsonl");
        Ok(Self { inner: Some(inner), store_path, keep })
    }
}

impl Drop for SessionDir {
    fn drop(&mut self) {
        let Some(dir) = self.inner.take() else { return };
        if self.keep {
            let kept = dir.into_path();
            info!(path = %kept.display(), "debug: keeping session directory");
            return;
        }
        if self.store_path.exists() {
            if let Err(e) = envelope::secure_delete(&self.store_path) {
                warn!(err = %e, "failed to securely delete intermediate store");
            }
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), SessionError> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    envelope::atomic_write(path, &bytes)?;
    Ok(())
}

/// Tokenize the configured dataset into `out` (a `.enc` path encrypts and
/// writes the companion key). Returns the record count.
pub fn tokenize_file(cfg: &LinkConfig, out: &Path, keep_qgrams: bool) -> Result<usize, SessionError> {
    cfg.validate()?;
    let input = Path::new(&cfg.database.filename);
    let rows = rows::read_rows(input, &cfg.database.fields)?;
    let builder = RecordBuilder::new(cfg.tokenizer_params(keep_qgrams))?;
    let mut rng = StdRng::from_entropy();

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(builder.build(&row.id, &row.values, &mut rng)?);
    }

    let store = TokenStore::create(out)?;
    store.write_all(&records)?;
    info!(records = records.len(), path = %out.display(), "tokenized dataset written");
    Ok(records.len())
}

/// Decrypt an `.enc` store to a plaintext store. The key comes from the
/// companion file unless one is passed explicitly.
pub fn decrypt_store(input: &Path, key: Option<&Path>, out: &Path) -> Result<usize, SessionError> {
    let store = match key {
        Some(kp) => TokenStore::open_with_key(input, StoreKey::load(kp)?),
        None => TokenStore::open(input)?,
    };
    let records = store.load_all()?;
    TokenStore::create(out)?.write_all(&records)?;
    Ok(records.len())
}

/// Offline mode: intersect two local token stores, no peer involved.
pub fn run_local_intersect(
    local: &Path,
    peer: &Path,
    opts: &MatchOptions,
    out_dir: &Path,
) -> Result<(PathBuf, Vec<MatchPair>), SessionError> {
    let a = TokenStore::open(local)?.load_all()?;
    let b = TokenStore::open(peer)?.load_all()?;
    info!(local = a.len(), peer = b.len(), "stores loaded");

    let matches = find_matches(&a, &b, opts);
    let path = out_dir.join(RESULTS_FILE);
    write_json(&path, &IntersectionOutput { matches: matches.clone() })?;
    Ok((path, matches))
}

fn prepare_records(
    cfg: &LinkConfig,
    debug: bool,
) -> Result<(Vec<Record>, Option<SessionDir>), SessionError> {
    if cfg.database.is_tokenized {
        let records = TokenStore::open(&cfg.database.filename)?.load_all()?;
        info!(records = records.len(), "pre-tokenized store loaded");
        return Ok((records, None));
    }

    let workdir = SessionDir::new(debug)?;
    let input = Path::new(&cfg.database.filename);
    let rows = rows::read_rows(input, &cfg.database.fields)?;
    let builder = RecordBuilder::new(cfg.tokenizer_params(debug))?;
    let mut rng = StdRng::from_entropy();

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        records.push(builder.build(&row.id, &row.values, &mut rng)?);
    }

    let store = TokenStore::create(&workdir.store_path)?;
    store.write_all(&records)?;
    info!(records = records.len(), "dataset tokenized for this session");
    Ok((records, Some(workdir)))
}

/// Run one full two-party linkage session.
pub async fn run_linkage(
    cfg: &LinkConfig,
    shutdown: watch::Receiver<bool>,
    debug: bool,
) -> Result<SessionOutcome, SessionError> {
    let (peer_cfg, listen_port) = cfg.validate_for_linkage()?;

    let (records, _workdir) = prepare_records(cfg, debug)?;
    let header = cfg.tokenizer_params(false).header();

    let mut channel =
        PeerChannel::establish(&peer_cfg.host, peer_cfg.port, listen_port, shutdown).await?;
    let role = channel.role();
    info!(?role, "peer connection established");

    // Phase 1: token exchange, then enforce parameter agreement before
    // anything is compared.
    let local_tokens = TokenPayload::from_records(&records, header.clone())?;
    let peer_tokens = channel.exchange_tokens(local_tokens).await?;
    header
        .ensure_matches(&peer_tokens.params)
        .map_err(|msg| SessionError::Config(ConfigError::PeerMismatch(msg)))?;
    let peer_records = peer_tokens.into_records()?;
    info!(records = peer_records.len(), "peer tokens received");

    // Phase 2: local intersection, off the async runtime.
    let opts = cfg.match_options();
    let matches = tokio::task::spawn_blocking(move || {
        find_matches(&records, &peer_records, &opts)
    })
    .await
    .map_err(|_| SessionError::Worker)?;
    info!(matches = matches.len(), "local intersection computed");

    // Phase 3: intersection exchange.
    let peer_pairs = channel
        .exchange_intersection(IntersectionPayload { pairs: matches.clone() })
        .await?
        .pairs;

    // Phase 4: cross-verification. The diff carries ids and counts only.
    let diff = compare_intersections(&matches, &peer_pairs);
    let out_dir = Path::new(&cfg.output.directory);

    if diff.is_confirmed() {
        let path = out_dir.join(RESULTS_FILE);
        write_json(&path, &IntersectionOutput { matches: matches.clone() })?;
        info!(matches = matches.len(), path = %path.display(), "linkage confirmed");
        return Ok(SessionOutcome { role, matches, results_path: path });
    }

    let only_local = diff.only_in_local.len();
    let only_peer = diff.only_in_peer.len();
    let output = DiffOutput {
        summary: DiffSummary {
            local_match_count: diff.local_count,
            peer_match_count: diff.peer_count,
            only_in_local_count: only_local,
            only_in_peer_count: only_peer,
        },
        only_in_local: diff.only_in_local,
        only_in_peer: diff.only_in_peer,
        created_at: Utc::now().to_rfc3339(),
    };
    let path = out_dir.join(DIFF_FILE);
    write_json(&path, &output)?;
    warn!(only_local, only_peer, path = %path.display(), "intersections disagree");
    Err(SessionError::Mismatch { only_local, only_peer })
}
