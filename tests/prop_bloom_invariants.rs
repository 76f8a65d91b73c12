// Copyright (c) 2026 Bloomlink
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use proptest::prelude::*;

use bloomlink::core::sketch::bloom::BloomFilter;

proptest! {
    #[test]
    fn codec_round_trip_bit_for_bit(
        items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..32),
        m in 1u32..4096,
        k in 1u32..10,
    ) {
        let mut bf = BloomFilter::new(m, k).unwrap();
        for item in &items {
            bf.add(item);
        }
        let back = BloomFilter::from_bytes(&bf.to_bytes()).unwrap();
        prop_assert_eq!(&bf, &back);
        let back = BloomFilter::from_base64(&bf.to_base64()).unwrap();
        prop_assert_eq!(&bf, &back);
    }

    #[test]
    fn membership_has_no_false_negatives(
        items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 1..32),
        m in 1u32..4096,
        k in 1u32..10,
    ) {
        let mut bf = BloomFilter::new(m, k).unwrap();
        for item in &items {
            bf.add(item);
        }
        for item in &items {
            prop_assert!(bf.contains(item));
        }
    }

    #[test]
    fn hamming_laws(
        a_items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..16),
        b_items in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..16),
        m in 1u32..2048,
        k in 1u32..8,
    ) {
        let mut a = BloomFilter::new(m, k).unwrap();
        let mut b = BloomFilter::new(m, k).unwrap();
        for item in &a_items {
            a.add(item);
        }
        for item in &b_items {
            b.add(item);
        }

        prop_assert_eq!(a.hamming_distance(&a).unwrap(), 0);
        prop_assert_eq!(a.hamming_distance(&b).unwrap(), b.hamming_distance(&a).unwrap());
        prop_assert!(a.hamming_distance(&b).unwrap() <= m);
        prop_assert!(a.count_ones() <= m);
    }
}
