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

//! Similarity engine: Hamming + Jaccard scoring over all cross pairs with a
//! dual-threshold decision, then either 1:many emission or greedy 1:1
//! assignment. Pure; per-pair failures skip the pair, never the run.
//! CPU-bound scoring fans local records out over scoped worker threads.

use std::collections::HashSet;
use std::thread;
use tracing::warn;

use crate::core::types::{MatchPair, Record};

/// Thresholds and discipline for one matching run.
#[derive(Clone, Copy, Debug)]
pub struct MatchOptions {
    /// Maximum Bloom Hamming distance for a candidate.
    pub hamming_threshold: u32,
    /// Minimum MinHash Jaccard estimate for a candidate.
    pub jaccard_threshold: f64,
    /// `true` emits every candidate (1:many); `false` assigns greedily 1:1.
    pub allow_duplicates: bool,
}

/// A scored candidate pair; scores never leave this module's caller.
#[derive(Clone, Debug)]
struct Candidate {
    local: String,
    peer: String,
    hamming: u32,
    score: f64,
}

fn scan_chunk(chunk: &[Record], peer: &[Record], opts: &MatchOptions) -> Vec<Candidate> {
    let mut out = Vec::new();
    for a in chunk {
        for b in peer {
            let hamming = match a.bloom.hamming_distance(&b.bloom) {
                Ok(h) => h,
                Err(e) => {
                    warn!(local = %a.id, peer = %b.id, err = %e, "skipping pair: bloom mismatch");
                    continue;
                }
            };
            let jaccard = match a.minhash.jaccard(&b.minhash) {
                Ok(j) => j,
                Err(e) => {
                    warn!(local = %a.id, peer = %b.id, err = %e, "skipping pair: signature mismatch");
                    continue;
                }
            };
            if hamming > opts.hamming_threshold || jaccard < opts.jaccard_threshold {
                continue;
            }
            let m = a.bloom.size();
            let score = if m > 0 { 1.0 - f64::from(hamming) / f64::from(m) } else { 0.0 };
            out.push(Candidate {
                local: a.id.clone(),
                peer: b.id.clone(),
                hamming,
                score,
            });
        }
    }
    out
}

/// Score all `|local| * |peer|` pairs and emit match pairs per the discipline.
/// Output is sorted by `(local_id, peer_id)` so both peers serialize the same
/// set identically.
pub fn find_matches(local: &[Record], peer: &[Record], opts: &MatchOptions) -> Vec<MatchPair> {
    let mut candidates = collect_candidates(local, peer, opts);

    let mut pairs = if opts.allow_duplicates {
        candidates
            .into_iter()
            .map(|c| MatchPair { local_id: c.local, peer_id: c.peer })
            .collect::<Vec<_>>()
    } else {
        // Greedy by score, tie-break on lower hamming then lexicographic ids;
        // each id on each side is assigned at most once.
        candidates.sort_by(|x, y| {
            y.score
                .total_cmp(&x.score)
                .then_with(|| x.hamming.cmp(&y.hamming))
                .then_with(|| (&x.local, &x.peer).cmp(&(&y.local, &y.peer)))
        });
        let mut used_local = HashSet::new();
        let mut used_peer = HashSet::new();
        let mut assigned = Vec::new();
        for c in candidates {
            if used_local.contains(&c.local) || used_peer.contains(&c.peer) {
                continue;
            }
            used_local.insert(c.local.clone());
            used_peer.insert(c.peer.clone());
            assigned.push(MatchPair { local_id: c.local, peer_id: c.peer });
        }
        assigned
    };

    pairs.sort();
    pairs.dedup();
    pairs
}

fn collect_candidates(local: &[Record], peer: &[Record], opts: &MatchOptions) -> Vec<Candidate> {
    if local.is_empty() || peer.is_empty() {
        return Vec::new();
    }

    let workers = thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
        .min(local.len());
    if workers <= 1 {
        return scan_chunk(local, peer, opts);
    }

    let chunk_size = local.len().div_ceil(workers);
    let mut candidates = Vec::new();
    thread::scope(|s| {
        let handles: Vec<_> = local
            .chunks(chunk_size)
            .map(|chunk| s.spawn(move || scan_chunk(chunk, peer, opts)))
            .collect();
        for h in handles {
            candidates.extend(h.join().expect("scoring worker panicked"));
        }
    });
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sketch::bloom::BloomFilter;
    use crate::core::sketch::minhash::MinHasher;

    fn record(id: &str, items: &[&str]) -> Record {
        let hasher = MinHasher::new(512, 64, 11).unwrap();
        let mut bloom = BloomFilter::new(512, 4).unwrap();
        for item in items {
            bloom.add(item.as_bytes());
        }
        let minhash = hasher.compute_signature(&bloom).unwrap();
        Record { id: id.to_string(), bloom, minhash, qgrams: None }
    }

    fn opts(h: u32, j: f64, dup: bool) -> MatchOptions {
        MatchOptions { hamming_threshold: h, jaccard_threshold: j, allow_duplicates: dup }
    }

    #[test]
    fn identical_records_match_at_strict_thresholds() {
        let a = vec![record("1", &["al", "li", "ic", "ce"])];
        let b = vec![record("1", &["al", "li", "ic", "ce"])];
        let pairs = find_matches(&a, &b, &opts(0, 1.0, false));
        assert_eq!(pairs, vec![MatchPair { local_id: "1".into(), peer_id: "1".into() }]);
    }

    #[test]
    fn disjoint_records_do_not_match() {
        let a = vec![record("1", &["al", "ic"])];
        let b = vec![record("2", &["bo", "ob"])];
        assert!(find_matches(&a, &b, &opts(90, 0.5, false)).is_empty());
    }

    #[test]
    fn one_to_many_emits_all_candidates() {
        let a = vec![record("a", &["jo", "on"])];
        let b = vec![
            record("b1", &["jo", "on"]),
            record("b2", &["jo", "on", "nn"]),
        ];
        let many = find_matches(&a, &b, &opts(512, 0.0, true));
        assert_eq!(many.len(), 2);
    }

    #[test]
    fn one_to_one_keeps_only_best() {
        let a = vec![record("a", &["jo", "on"])];
        let b = vec![
            record("b1", &["jo", "on"]),
            record("b2", &["jo", "on", "nn"]),
        ];
        let single = find_matches(&a, &b, &opts(512, 0.0, false));
        assert_eq!(single, vec![MatchPair { local_id: "a".into(), peer_id: "b1".into() }]);
    }

    #[test]
    fn one_to_one_ids_are_unique_per_side() {
        let a = vec![
            record("a1", &["jo", "on"]),
            record("a2", &["jo", "on"]),
            record("a3", &["jo", "on"]),
        ];
        let b = vec![record("b1", &["jo", "on"]), record("b2", &["jo", "on"])];
        let pairs = find_matches(&a, &b, &opts(512, 0.0, false));
        let locals: HashSet<_> = pairs.iter().map(|p| &p.local_id).collect();
        let peers: HashSet<_> = pairs.iter().map(|p| &p.peer_id).collect();
        assert_eq!(locals.len(), pairs.len());
        assert_eq!(peers.len(), pairs.len());
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn mismatched_parameters_skip_pair_without_aborting() {
        let hasher = MinHasher::new(256, 64, 11).unwrap();
        let mut small = BloomFilter::new(256, 4).unwrap();
        small.add(b"jo");
        let odd = Record {
            id: "odd".into(),
            minhash: hasher.compute_signature(&small).unwrap(),
            bloom: small,
            qgrams: None,
        };
        let a = vec![record("a", &["jo", "on"]), ];
        let b = vec![odd, record("b", &["jo", "on"])];
        let pairs = find_matches(&a, &b, &opts(512, 0.0, false));
        assert_eq!(pairs, vec![MatchPair { local_id: "a".into(), peer_id: "b".into() }]);
    }
}
