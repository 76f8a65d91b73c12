// Copyright (c) 2026 Bloomlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::Path;

use bloomlink::core::config::{DatabaseConfig, LinkConfig, MatchingConfig, OutputConfig};
use bloomlink::core::runtime::session::{decrypt_store, tokenize_file};
use bloomlink::core::security::envelope::{EnvelopeError, StoreKey};
use bloomlink::core::store::token_store::{StoreError, TokenStore};
use bloomlink::core::tokenize::builder::RecordBuilder;
use bloomlink::core::tokenize::normalize::FieldKind;
use bloomlink::core::types::Record;

fn write_csv(dir: &Path) -> String {
    let path = dir.join("patients.csv");
    fs::write(
        &path,
        "id,first_name,birth_date\nr1,Alice,1984-03-07\nr2,Bob,02/11/1975\n",
    )
    .unwrap();
    path.to_string_lossy().into_owned()
}

fn config(filename: String) -> LinkConfig {
    LinkConfig {
        database: DatabaseConfig {
            filename,
            is_tokenized: false,
            fields: vec!["name:first_name".to_string(), "date:birth_date".to_string()],
            random_bits_percent: 0.0,
        },
        peer: None,
        listen_port: None,
        matching: MatchingConfig::default(),
        output: OutputConfig::default(),
        allow_duplicates: false,
    }
}

/// Records the pipeline should produce for the fixture CSV (noise is zero,
/// so tokenization is fully deterministic).
fn expected_records(cfg: &LinkConfig) -> Vec<Record> {
    let builder = RecordBuilder::new(cfg.tokenizer_params(false)).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    vec![
        builder
            .build(
                "r1",
                &[
                    (FieldKind::Name, "Alice".to_string()),
                    (FieldKind::Date, "1984-03-07".to_string()),
                ],
                &mut rng,
            )
            .unwrap(),
        builder
            .build(
                "r2",
                &[
                    (FieldKind::Name, "Bob".to_string()),
                    (FieldKind::Date, "02/11/1975".to_string()),
                ],
                &mut rng,
            )
            .unwrap(),
    ]
}

#[test]
fn encrypted_tokenize_then_reload_matches_in_memory() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(write_csv(dir.path()));
    let store_path = dir.path().join("tokens.enc");

    let n = tokenize_file(&cfg, &store_path, false).unwrap();
    assert_eq!(n, 2);
    assert!(TokenStore::key_path(&store_path).exists());

    // The blob on disk must not contain the plaintext markers.
    let blob = fs::read(&store_path).unwrap();
    assert!(!blob.windows(4).any(|w| w == b"\"id\"".as_slice()));

    let loaded = TokenStore::open(&store_path).unwrap().load_all().unwrap();
    assert_eq!(loaded, expected_records(&cfg));
}

#[test]
fn decrypt_writes_equal_plaintext_store() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(write_csv(dir.path()));
    let enc_path = dir.path().join("tokens.enc");
    tokenize_file(&cfg, &enc_path, false).unwrap();

    let plain_path = dir.path().join("tokens.jsonl");
    let n = decrypt_store(&enc_path, None, &plain_path).unwrap();
    assert_eq!(n, 2);

    let plain = TokenStore::open(&plain_path).unwrap().load_all().unwrap();
    let encrypted = TokenStore::open(&enc_path).unwrap().load_all().unwrap();
    assert_eq!(plain, encrypted);
}

#[test]
fn foreign_key_fails_with_crypto_error() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(write_csv(dir.path()));
    let enc_path = dir.path().join("tokens.enc");
    tokenize_file(&cfg, &enc_path, false).unwrap();

    let wrong = TokenStore::open_with_key(&enc_path, StoreKey::generate().unwrap());
    assert!(matches!(
        wrong.load_all(),
        Err(StoreError::Crypto(EnvelopeError::Auth))
    ));
}

#[test]
fn explicit_key_file_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(write_csv(dir.path()));
    let enc_path = dir.path().join("tokens.enc");
    tokenize_file(&cfg, &enc_path, false).unwrap();

    // Move the companion key elsewhere and pass it explicitly.
    let moved = dir.path().join("elsewhere.keyfile");
    fs::rename(TokenStore::key_path(&enc_path), &moved).unwrap();

    let out = dir.path().join("plain.jsonl");
    assert_eq!(decrypt_store(&enc_path, Some(&moved), &out).unwrap(), 2);
    assert!(matches!(
        decrypt_store(&enc_path, None, &out),
        Err(bloomlink::core::runtime::session::SessionError::Store(StoreError::MissingKey(_)))
    ));
}

#[test]
fn debug_tokenize_persists_qgrams() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(write_csv(dir.path()));
    let store_path = dir.path().join("tokens.jsonl");
    tokenize_file(&cfg, &store_path, true).unwrap();

    let records = TokenStore::open(&store_path).unwrap().load_all().unwrap();
    assert!(records.iter().all(|r| r.qgrams.is_some()));
    assert!(records[0]
        .qgrams
        .as_ref()
        .unwrap()
        .contains(&"al".to_string()));
}
