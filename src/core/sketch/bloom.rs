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

//! Fixed-size Bloom filter with double hashing and a little-endian codec.
//!
//! bit_i(x) = H( i(u32 LE) || H(x)(u64 LE) || x ) mod m, i in [0, k)
//! H = first 8 LE bytes of SHA-256("bloomlink-bloom-v1" || data)

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::seq::index::sample;
use rand::Rng;
use ring::digest;
use thiserror::Error;

const HASH_DOMAIN: &[u8] = b"bloomlink-bloom-v1";

/// Bloom filter errors.
#[derive(Debug, Error)]
pub enum BloomError {
    /// `m` or `k` is zero.
    #[error("invalid parameters (m and k must be non-zero)")]
    InvalidParams,
    /// Distance requested between filters with different `m` or `k`.
    #[error("parameter mismatch")]
    ParamMismatch,
    /// Encoded form has the wrong length or stray bits past `m`.
    #[error("malformed encoding")]
    Codec,
}

/// 64-bit digest-derived hash, deterministic and endianness-fixed.
fn h64(parts: &[&[u8]]) -> u64 {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(HASH_DOMAIN);
    for p in parts {
        ctx.update(p);
    }
    let d = ctx.finish();
    let mut out = [0u8; 8];
    out.copy_from_slice(&d.as_ref()[..8]);
    u64::from_le_bytes(out)
}

/// Fixed-size bitset with `k` derived bit positions per item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BloomFilter {
    m: u32,
    k: u32,
    bits: Vec<u64>,
}

impl BloomFilter {
    /// All-zero filter of `m` bits and `k` hash functions.
    pub fn new(m: u32, k: u32) -> Result<Self, BloomError> {
        if m == 0 || k == 0 {
            return Err(BloomError::InvalidParams);
        }
        let words = (m as usize).div_ceil(64);
        Ok(Self { m, k, bits: vec![0u64; words] })
    }

    /// Number of bits `m`.
    pub fn size(&self) -> u32 {
        self.m
    }

    /// Number of hash functions `k`.
    pub fn hashes(&self) -> u32 {
        self.k
    }

    fn position(&self, i: u32, seed: u64, item: &[u8]) -> usize {
        (h64(&[&i.to_le_bytes(), &seed.to_le_bytes(), item]) % u64::from(self.m)) as usize
    }

    /// Set the `k` positions derived from `item`.
    pub fn add(&mut self, item: &[u8]) {
        let seed = h64(&[item]);
        for i in 0..self.k {
            let pos = self.position(i, seed, item);
            self.bits[pos / 64] |= 1u64 << (pos % 64);
        }
    }

    /// Membership test; false positives possible, false negatives not.
    pub fn contains(&self, item: &[u8]) -> bool {
        let seed = h64(&[item]);
        (0..self.k).all(|i| {
            let pos = self.position(i, seed, item);
            self.bits[pos / 64] & (1u64 << (pos % 64)) != 0
        })
    }

    /// `add(item)` followed by `scatter_noise(rate, rng)`.
    pub fn add_with_noise<R: Rng + ?Sized>(&mut self, item: &[u8], rate: f64, rng: &mut R) {
        self.add(item);
        self.scatter_noise(rate, rng);
    }

    /// Toggle `floor(m * rate)` distinct uniformly drawn positions.
    pub fn scatter_noise<R: Rng + ?Sized>(&mut self, rate: f64, rng: &mut R) {
        let rate = rate.clamp(0.0, 1.0);
        let flips = (f64::from(self.m) * rate).floor() as usize;
        if flips == 0 {
            return;
        }
        for pos in sample(rng, self.m as usize, flips) {
            self.bits[pos / 64] ^= 1u64 << (pos % 64);
        }
    }

    /// Indices of set bits, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = u32> + '_ {
        let m = u64::from(self.m);
        self.bits.iter().enumerate().flat_map(move |(w, &word)| {
            (0..64u64).filter_map(move |b| {
                let idx = (w as u64) * 64 + b;
                if idx < m && word & (1u64 << b) != 0 {
                    Some(idx as u32)
                } else {
                    None
                }
            })
        })
    }

    /// Popcount of the whole filter.
    pub fn count_ones(&self) -> u32 {
        self.bits.iter().map(|w| w.count_ones()).sum()
    }

    /// Popcount of the xor; requires equal `m` and `k`.
    pub fn hamming_distance(&self, other: &Self) -> Result<u32, BloomError> {
        if self.m != other.m || self.k != other.k {
            return Err(BloomError::ParamMismatch);
        }
        Ok(self
            .bits
            .iter()
            .zip(other.bits.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum())
    }

    /// `m(u32 LE) || k(u32 LE) || words(u64 LE each)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.bits.len() * 8);
        out.extend_from_slice(&self.m.to_le_bytes());
        out.extend_from_slice(&self.k.to_le_bytes());
        for w in &self.bits {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out
    }

    /// Strict inverse of [`BloomFilter::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BloomError> {
        if bytes.len() < 8 {
            return Err(BloomError::Codec);
        }
        let m = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let k = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if m == 0 || k == 0 {
            return Err(BloomError::InvalidParams);
        }
        let words = (m as usize).div_ceil(64);
        if bytes.len() != 8 + words * 8 {
            return Err(BloomError::Codec);
        }
        let mut bits = Vec::with_capacity(words);
        for chunk in bytes[8..].chunks_exact(8) {
            let mut w = [0u8; 8];
            w.copy_from_slice(chunk);
            bits.push(u64::from_le_bytes(w));
        }
        // Stray bits past m would break the popcount <= m invariant.
        let used = m as usize % 64;
        if used != 0 && bits[words - 1] >> used != 0 {
            return Err(BloomError::Codec);
        }
        Ok(Self { m, k, bits })
    }

    /// Base64 of the binary codec.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Inverse of [`BloomFilter::to_base64`].
    pub fn from_base64(s: &str) -> Result<Self, BloomError> {
        let bytes = BASE64.decode(s).map_err(|_| BloomError::Codec)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn rejects_zero_params() {
        assert!(BloomFilter::new(0, 5).is_err());
        assert!(BloomFilter::new(64, 0).is_err());
    }

    #[test]
    fn membership_has_no_false_negatives() {
        let mut bf = BloomFilter::new(1024, 5).unwrap();
        for item in [b"alice".as_ref(), b"bob", b"carol"] {
            bf.add(item);
            assert!(bf.contains(item));
        }
    }

    #[test]
    fn hamming_zero_on_self_and_symmetric() {
        let mut a = BloomFilter::new(256, 3).unwrap();
        let mut b = BloomFilter::new(256, 3).unwrap();
        a.add(b"x");
        b.add(b"y");
        assert_eq!(a.hamming_distance(&a).unwrap(), 0);
        assert_eq!(
            a.hamming_distance(&b).unwrap(),
            b.hamming_distance(&a).unwrap()
        );
    }

    #[test]
    fn hamming_rejects_mismatched_params() {
        let a = BloomFilter::new(256, 3).unwrap();
        let b = BloomFilter::new(512, 3).unwrap();
        assert!(matches!(
            a.hamming_distance(&b),
            Err(BloomError::ParamMismatch)
        ));
    }

    #[test]
    fn codec_round_trip_bit_for_bit() {
        let mut bf = BloomFilter::new(100, 4).unwrap();
        bf.add(b"round");
        bf.add(b"trip");
        let back = BloomFilter::from_bytes(&bf.to_bytes()).unwrap();
        assert_eq!(bf, back);
        assert_eq!(bf, BloomFilter::from_base64(&bf.to_base64()).unwrap());
    }

    #[test]
    fn codec_rejects_truncation_and_stray_bits() {
        let bf = BloomFilter::new(100, 4).unwrap();
        let mut bytes = bf.to_bytes();
        bytes.pop();
        assert!(BloomFilter::from_bytes(&bytes).is_err());

        let mut bytes = bf.to_bytes();
        let last = bytes.len() - 1;
        bytes[last] = 0xFF; // bits 96..127 of the last word are past m=100
        assert!(BloomFilter::from_bytes(&bytes).is_err());
    }

    #[test]
    fn noise_flips_exact_count() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut bf = BloomFilter::new(1000, 5).unwrap();
        bf.scatter_noise(0.05, &mut rng);
        assert_eq!(bf.count_ones(), 50);
    }
}
