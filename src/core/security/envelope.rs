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

//! At-rest encryption for tokenized artifacts.
//!
//! ### Blob format
//! `NONCE(12) || CIPHERTEXT+TAG(..)`, AES-256-GCM, empty associated data,
//! written at mode 0600.
//!
//! ### Key file format
//! Any number of `#`-prefixed comment lines, then one line of 64 hex
//! characters (a 256-bit key). Key files are written 0600 via the atomic
//! tmp-fsync-rename pattern.

use ring::aead;
use ring::rand::{SecureRandom, SystemRandom};
use std::fs;
use std::io::Write;
use std::path::Path;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// AEAD key length in bytes.
pub const KEY_LEN: usize = 32;
/// Nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// GCM tag length in bytes.
pub const TAG_LEN: usize = 16;

/// Envelope errors. Authentication failure is distinct from I/O.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// File open/read/write failure.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// AEAD tag verification failed (wrong key or corrupted blob).
    #[error("authentication failed")]
    Auth,
    /// Blob shorter than nonce + tag.
    #[error("ciphertext too short")]
    Truncated,
    /// No usable 64-hex key line, or the wrong key length.
    #[error("invalid key file")]
    InvalidKey,
    /// RNG or key setup failure.
    #[error("crypto")]
    Crypto,
}

/// 256-bit store key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StoreKey([u8; KEY_LEN]);

impl StoreKey {
    /// Draw a fresh key from the system CSPRNG.
    pub fn generate() -> Result<Self, EnvelopeError> {
        let rng = SystemRandom::new();
        let mut key = [0u8; KEY_LEN];
        rng.fill(&mut key).map_err(|_| EnvelopeError::Crypto)?;
        Ok(Self(key))
    }

    /// Parse a 64-hex-character key.
    pub fn from_hex(s: &str) -> Result<Self, EnvelopeError> {
        if s.len() != KEY_LEN * 2 {
            return Err(EnvelopeError::InvalidKey);
        }
        let bytes = hex::decode(s).map_err(|_| EnvelopeError::InvalidKey)?;
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes);
        Ok(Self(key))
    }

    /// Lowercase hex form (what key files carry).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse key-file text: skip `#` comments and blanks, accept the first
    /// valid 64-hex line.
    pub fn from_key_text(text: &str) -> Result<Self, EnvelopeError> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .find_map(|l| Self::from_hex(l).ok())
            .ok_or(EnvelopeError::InvalidKey)
    }

    /// Load a companion key file.
    pub fn load(path: &Path) -> Result<Self, EnvelopeError> {
        let text = fs::read_to_string(path)?;
        Self::from_key_text(&text)
    }

    /// Write a key file (comment header + hex line), 0600, atomically.
    pub fn save(&self, path: &Path) -> Result<(), EnvelopeError> {
        let body = format!(
            "# bloomlink token store key\n# 256-bit AES-GCM key in hex; keep this file private\n{}\n",
            self.to_hex()
        );
        atomic_write_private(path, body.as_bytes())?;
        Ok(())
    }

    fn aead_key(&self) -> Result<aead::LessSafeKey, EnvelopeError> {
        let unbound =
            aead::UnboundKey::new(&aead::AES_256_GCM, &self.0).map_err(|_| EnvelopeError::Crypto)?;
        Ok(aead::LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

/// Encrypt: fresh random nonce, output `nonce || ciphertext+tag`.
pub fn seal(key: &StoreKey, plaintext: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    let rng = SystemRandom::new();
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill(&mut nonce_bytes).map_err(|_| EnvelopeError::Crypto)?;
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    key.aead_key()?
        .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| EnvelopeError::Crypto)?;

    let mut out = Vec::with_capacity(NONCE_LEN + in_out.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&in_out);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext+tag` blob. Tag failure is [`EnvelopeError::Auth`].
pub fn open(key: &StoreKey, blob: &[u8]) -> Result<Vec<u8>, EnvelopeError> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(EnvelopeError::Truncated);
    }
    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&blob[..NONCE_LEN]);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = blob[NONCE_LEN..].to_vec();
    let plain = key
        .aead_key()?
        .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| EnvelopeError::Auth)?;
    Ok(plain.to_vec())
}

/// Encrypt and write a blob at mode 0600, atomically.
pub fn write_sealed(path: &Path, key: &StoreKey, plaintext: &[u8]) -> Result<(), EnvelopeError> {
    let blob = seal(key, plaintext)?;
    atomic_write_private(path, &blob)?;
    Ok(())
}

/// Read and decrypt a blob.
pub fn read_sealed(path: &Path, key: &StoreKey) -> Result<Vec<u8>, EnvelopeError> {
    let blob = fs::read(path)?;
    open(key, &blob)
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

fn atomic_write_impl(path: &Path, bytes: &[u8], private: bool) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");

    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)?;
        f.write_all(bytes)?;
        let _ = f.sync_all();
    }

    if private {
        set_private_perms_best_effort(&tmp);
    }
    fs::rename(&tmp, path)?;
    if private {
        set_private_perms_best_effort(path);
    }
    Ok(())
}

/// Atomic write (tmp, fsync, rename).
pub fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    atomic_write_impl(path, bytes, false)
}

/// Atomic write at mode 0600.
pub fn atomic_write_private(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    atomic_write_impl(path, bytes, true)
}

/// Overwrite a plaintext intermediate with random bytes, sync, then unlink.
pub fn secure_delete(path: &Path) -> Result<(), EnvelopeError> {
    let len = fs::metadata(path)?.len() as usize;
    if len > 0 {
        let rng = SystemRandom::new();
        let mut f = fs::OpenOptions::new().write(true).open(path)?;
        let mut remaining = len;
        let mut chunk = vec![0u8; remaining.min(64 * 1024)];
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            rng.fill(&mut chunk[..n]).map_err(|_| EnvelopeError::Crypto)?;
            f.write_all(&chunk[..n])?;
            remaining -= n;
        }
        f.sync_all()?;
    }
    fs::remove_file(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_round_trip() {
        let key = StoreKey::generate().unwrap();
        let blob = seal(&key, b"records").unwrap();
        assert_eq!(open(&key, &blob).unwrap(), b"records");
    }

    #[test]
    fn wrong_key_fails_auth() {
        let key = StoreKey::generate().unwrap();
        let other = StoreKey::generate().unwrap();
        let blob = seal(&key, b"records").unwrap();
        assert!(matches!(open(&other, &blob), Err(EnvelopeError::Auth)));
    }

    #[test]
    fn short_blob_is_truncated_not_auth() {
        let key = StoreKey::generate().unwrap();
        assert!(matches!(open(&key, &[0u8; 8]), Err(EnvelopeError::Truncated)));
    }

    #[test]
    fn key_text_skips_comments() {
        let key = StoreKey::generate().unwrap();
        let text = format!("# a comment\n\n# another\n{}\n", key.to_hex());
        let loaded = StoreKey::from_key_text(&text).unwrap();
        assert_eq!(loaded.to_hex(), key.to_hex());
    }

    #[test]
    fn key_text_without_key_rejected() {
        assert!(matches!(
            StoreKey::from_key_text("# only comments\n"),
            Err(EnvelopeError::InvalidKey)
        ));
        assert!(StoreKey::from_hex("zz").is_err());
    }

    #[test]
    fn key_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.key");
        let key = StoreKey::generate().unwrap();
        key.save(&path).unwrap();
        assert_eq!(StoreKey::load(&path).unwrap().to_hex(), key.to_hex());
    }

    #[test]
    fn secure_delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.jsonl");
        std::fs::write(&path, b"sensitive").unwrap();
        secure_delete(&path).unwrap();
        assert!(!path.exists());
    }
}
