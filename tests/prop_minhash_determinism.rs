// Copyright (c) 2026 Bloomlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;

use bloomlink::core::sketch::bloom::BloomFilter;
use bloomlink::core::sketch::minhash::{MinHasher, Signature};

fn filter_from(items: &[Vec<u8>]) -> BloomFilter {
    let mut bf = BloomFilter::new(1024, 5).unwrap();
    for item in items {
        bf.add(item);
    }
    bf
}

proptest! {
    // Two independently constructed hashers with the same seed stand in for
    // the two peers: their signatures over the same filter must agree.
    #[test]
    fn same_seed_same_signature_across_instances(
        items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..24),
        seed in any::<u64>(),
    ) {
        let bf = filter_from(&items);
        let ours = MinHasher::new(1024, 64, seed).unwrap();
        let theirs = MinHasher::new(1024, 64, seed).unwrap();
        prop_assert_eq!(
            ours.compute_signature(&bf).unwrap(),
            theirs.compute_signature(&bf).unwrap()
        );
    }

    #[test]
    fn jaccard_bounds_and_self_unity(
        a_items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 1..24),
        b_items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 1..24),
        seed in any::<u64>(),
    ) {
        let hasher = MinHasher::new(1024, 64, seed).unwrap();
        let sa = hasher.compute_signature(&filter_from(&a_items)).unwrap();
        let sb = hasher.compute_signature(&filter_from(&b_items)).unwrap();

        prop_assert_eq!(sa.jaccard(&sa).unwrap(), 1.0);
        let j = sa.jaccard(&sb).unwrap();
        prop_assert!((0.0..=1.0).contains(&j));
    }

    #[test]
    fn wire_codec_round_trips(
        items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..24),
        seed in any::<u64>(),
    ) {
        let hasher = MinHasher::new(1024, 32, seed).unwrap();
        let sig = hasher.compute_signature(&filter_from(&items)).unwrap();
        prop_assert_eq!(&sig, &Signature::from_bytes(&sig.to_bytes()).unwrap());
        prop_assert_eq!(&sig, &Signature::from_base64(&sig.to_base64()).unwrap());
    }
}
