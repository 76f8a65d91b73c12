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

//! MinHash signatures over Bloom filter set bits.
//!
//! Both peers must derive the hash family from the same seed, otherwise their
//! signatures are not comparable. The family is
//! `h_i(idx) = (a[i]*idx + b[i]) mod PRIME` with `(a, b)` drawn by
//! domain-separated hashing of `(seed, i)`, never from process randomness.
//!
//! Wire form: `m || s || prime || a[s] || b[s] || sig[s]`, all u32 LE.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ring::digest;
use thiserror::Error;

use crate::core::sketch::bloom::BloomFilter;

/// Modulus of the hash family, 2^31 - 1 (Mersenne prime).
pub const PRIME: u32 = 0x7FFF_FFFF;

const A_DOMAIN: &[u8] = b"bloomlink-minhash-a-v1";
const B_DOMAIN: &[u8] = b"bloomlink-minhash-b-v1";

/// MinHash errors.
#[derive(Debug, Error)]
pub enum MinHashError {
    /// `m` or `s` is zero, or `m >= PRIME`.
    #[error("invalid parameters (need m in [1, prime) and s > 0)")]
    InvalidParams,
    /// Signature built against a filter of a different size.
    #[error("parameter mismatch")]
    ParamMismatch,
    /// Jaccard requested between signatures of different lengths.
    #[error("signature length mismatch")]
    LengthMismatch,
    /// Encoded form is truncated, oversized, or carries a foreign prime.
    #[error("malformed encoding")]
    Codec,
}

fn draw(domain: &[u8], seed: u64, i: u32) -> u64 {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(domain);
    ctx.update(&seed.to_le_bytes());
    ctx.update(&i.to_le_bytes());
    let d = ctx.finish();
    let mut out = [0u8; 8];
    out.copy_from_slice(&d.as_ref()[..8]);
    u64::from_le_bytes(out)
}

/// Seeded hash family producing signatures for `m`-bit filters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MinHasher {
    m: u32,
    a: Vec<u32>,
    b: Vec<u32>,
}

impl MinHasher {
    /// Derive an `s`-function family for `m`-bit filters from `seed`.
    pub fn new(m: u32, s: u32, seed: u64) -> Result<Self, MinHashError> {
        if m == 0 || s == 0 || m >= PRIME {
            return Err(MinHashError::InvalidParams);
        }
        let mut a = Vec::with_capacity(s as usize);
        let mut b = Vec::with_capacity(s as usize);
        for i in 0..s {
            a.push((draw(A_DOMAIN, seed, i) % u64::from(PRIME - 1)) as u32 + 1);
            b.push((draw(B_DOMAIN, seed, i) % u64::from(PRIME)) as u32);
        }
        Ok(Self { m, a, b })
    }

    /// Signature length `s`.
    pub fn signature_size(&self) -> u32 {
        self.a.len() as u32
    }

    /// Position-wise minimum of the family over the filter's set bits.
    /// Idempotent for a fixed filter; an empty filter keeps the sentinel
    /// `PRIME` in every slot.
    pub fn compute_signature(&self, bloom: &BloomFilter) -> Result<Signature, MinHashError> {
        if bloom.size() != self.m {
            return Err(MinHashError::ParamMismatch);
        }
        let mut values = vec![PRIME; self.a.len()];
        for idx in bloom.iter_set() {
            let idx = u64::from(idx);
            for (slot, (&a, &b)) in values.iter_mut().zip(self.a.iter().zip(self.b.iter())) {
                let h = ((u64::from(a) * idx + u64::from(b)) % u64::from(PRIME)) as u32;
                if h < *slot {
                    *slot = h;
                }
            }
        }
        Ok(Signature {
            m: self.m,
            a: self.a.clone(),
            b: self.b.clone(),
            values,
        })
    }
}

/// A computed signature together with the family that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    m: u32,
    a: Vec<u32>,
    b: Vec<u32>,
    values: Vec<u32>,
}

impl Signature {
    /// Filter size the signature was computed for.
    pub fn filter_size(&self) -> u32 {
        self.m
    }

    /// Signature positions.
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Fraction of agreeing positions; estimates Jaccard similarity of the
    /// underlying bit sets.
    pub fn jaccard(&self, other: &Self) -> Result<f64, MinHashError> {
        if self.values.len() != other.values.len() {
            return Err(MinHashError::LengthMismatch);
        }
        let agree = self
            .values
            .iter()
            .zip(other.values.iter())
            .filter(|(x, y)| x == y)
            .count();
        Ok(agree as f64 / self.values.len() as f64)
    }

    /// `m || s || prime || a[s] || b[s] || sig[s]`, all u32 LE.
    pub fn to_bytes(&self) -> Vec<u8> {
        let s = self.values.len();
        let mut out = Vec::with_capacity(12 + 12 * s);
        out.extend_from_slice(&self.m.to_le_bytes());
        out.extend_from_slice(&(s as u32).to_le_bytes());
        out.extend_from_slice(&PRIME.to_le_bytes());
        for v in self.a.iter().chain(self.b.iter()).chain(self.values.iter()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Strict inverse of [`Signature::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MinHashError> {
        fn word(bytes: &[u8], i: usize) -> u32 {
            u32::from_le_bytes([bytes[4 * i], bytes[4 * i + 1], bytes[4 * i + 2], bytes[4 * i + 3]])
        }
        if bytes.len() < 12 || bytes.len() % 4 != 0 {
            return Err(MinHashError::Codec);
        }
        let m = word(bytes, 0);
        let s = word(bytes, 1) as usize;
        let prime = word(bytes, 2);
        if prime != PRIME || s == 0 || m == 0 || m >= PRIME {
            return Err(MinHashError::Codec);
        }
        if bytes.len() != 12 + 12 * s {
            return Err(MinHashError::Codec);
        }
        let read = |from: usize| -> Vec<u32> { (from..from + s).map(|i| word(bytes, i)).collect() };
        let a = read(3);
        let b = read(3 + s);
        let values = read(3 + 2 * s);
        if a.iter().any(|&x| x == 0 || x >= PRIME) || b.iter().any(|&x| x >= PRIME) {
            return Err(MinHashError::Codec);
        }
        Ok(Self { m, a, b, values })
    }

    /// Base64 of the binary codec.
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.to_bytes())
    }

    /// Inverse of [`Signature::to_base64`].
    pub fn from_base64(s: &str) -> Result<Self, MinHashError> {
        let bytes = BASE64.decode(s).map_err(|_| MinHashError::Codec)?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_bloom() -> BloomFilter {
        let mut bf = BloomFilter::new(512, 4).unwrap();
        bf.add(b"alpha");
        bf.add(b"beta");
        bf
    }

    #[test]
    fn family_is_seed_deterministic() {
        let h1 = MinHasher::new(512, 64, 42).unwrap();
        let h2 = MinHasher::new(512, 64, 42).unwrap();
        assert_eq!(h1, h2);
        assert_ne!(h1, MinHasher::new(512, 64, 43).unwrap());
    }

    #[test]
    fn signature_idempotent_and_self_similar() {
        let hasher = MinHasher::new(512, 64, 7).unwrap();
        let bf = sample_bloom();
        let s1 = hasher.compute_signature(&bf).unwrap();
        let s2 = hasher.compute_signature(&bf).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.jaccard(&s2).unwrap(), 1.0);
    }

    #[test]
    fn empty_filter_keeps_sentinel() {
        let hasher = MinHasher::new(512, 16, 7).unwrap();
        let bf = BloomFilter::new(512, 4).unwrap();
        let sig = hasher.compute_signature(&bf).unwrap();
        assert!(sig.values().iter().all(|&v| v == PRIME));
    }

    #[test]
    fn jaccard_in_unit_interval() {
        let hasher = MinHasher::new(512, 64, 7).unwrap();
        let s1 = hasher.compute_signature(&sample_bloom()).unwrap();
        let mut other = BloomFilter::new(512, 4).unwrap();
        other.add(b"gamma");
        let s2 = hasher.compute_signature(&other).unwrap();
        let j = s1.jaccard(&s2).unwrap();
        assert!((0.0..=1.0).contains(&j));
    }

    #[test]
    fn codec_round_trip_and_rejects() {
        let hasher = MinHasher::new(512, 16, 7).unwrap();
        let sig = hasher.compute_signature(&sample_bloom()).unwrap();
        assert_eq!(sig, Signature::from_bytes(&sig.to_bytes()).unwrap());
        assert_eq!(sig, Signature::from_base64(&sig.to_base64()).unwrap());

        let mut bytes = sig.to_bytes();
        bytes.truncate(bytes.len() - 4);
        assert!(Signature::from_bytes(&bytes).is_err());

        let mut bytes = sig.to_bytes();
        bytes[8] = 0; // corrupt the prime
        assert!(Signature::from_bytes(&bytes).is_err());
    }

    #[test]
    fn mismatched_filter_size_rejected() {
        let hasher = MinHasher::new(512, 16, 7).unwrap();
        let bf = BloomFilter::new(256, 4).unwrap();
        assert!(matches!(
            hasher.compute_signature(&bf),
            Err(MinHashError::ParamMismatch)
        ));
    }
}
