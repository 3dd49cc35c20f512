use proptest::prelude::*;

use vela_types::{Address, BlockHash, Timestamp, TxHash};

/// The fork tie-break rule: the lexicographically smaller hash wins.
fn tie_break(a: BlockHash, b: BlockHash) -> BlockHash {
    if a <= b {
        a
    } else {
        b
    }
}

proptest! {
    /// BlockHash roundtrip: new -> as_bytes -> new produces identical hash.
    #[test]
    fn block_hash_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.as_bytes(), &bytes);
    }

    /// BlockHash::is_zero is true only for all-zero bytes.
    #[test]
    fn block_hash_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let hash = BlockHash::new(bytes);
        prop_assert_eq!(hash.is_zero(), bytes == [0u8; 32]);
    }

    /// The tie-break picks the same winner regardless of argument order —
    /// two nodes comparing the same pair of tips never disagree.
    #[test]
    fn tie_break_is_symmetric(
        a in prop::array::uniform32(0u8..),
        b in prop::array::uniform32(0u8..),
    ) {
        let (ha, hb) = (BlockHash::new(a), BlockHash::new(b));
        prop_assert_eq!(tie_break(ha, hb), tie_break(hb, ha));
    }

    /// The tie-break winner compares <= both inputs (it is the minimum).
    #[test]
    fn tie_break_picks_minimum(
        a in prop::array::uniform32(0u8..),
        b in prop::array::uniform32(0u8..),
    ) {
        let (ha, hb) = (BlockHash::new(a), BlockHash::new(b));
        let w = tie_break(ha, hb);
        prop_assert!(w <= ha && w <= hb);
    }

    /// TxHash serde roundtrip through JSON.
    #[test]
    fn tx_hash_serde_roundtrip(bytes in prop::array::uniform32(0u8..)) {
        let hash = TxHash::new(bytes);
        let encoded = serde_json::to_string(&hash).unwrap();
        let decoded: TxHash = serde_json::from_str(&encoded).unwrap();
        prop_assert_eq!(decoded, hash);
    }

    /// Address ordering agrees with byte-slice ordering.
    #[test]
    fn address_order_matches_bytes(
        a in prop::array::uniform20(0u8..),
        b in prop::array::uniform20(0u8..),
    ) {
        let (aa, ab) = (Address::new(a), Address::new(b));
        prop_assert_eq!(aa.cmp(&ab), a.as_slice().cmp(b.as_slice()));
    }

    /// Timestamp ordering: new(a) <= new(b) iff a <= b.
    #[test]
    fn timestamp_ordering(a in 0u64..u64::MAX, b in 0u64..u64::MAX) {
        let ta = Timestamp::new(a);
        let tb = Timestamp::new(b);
        prop_assert_eq!(ta <= tb, a <= b);
        prop_assert_eq!(ta == tb, a == b);
    }

    /// Timestamp::until measures forward distance and saturates backward.
    #[test]
    fn timestamp_until(base in 0u64..1_000_000, offset in 0u64..1_000_000) {
        let t = Timestamp::new(base);
        prop_assert_eq!(t.until(t.plus(offset)), offset);
        prop_assert_eq!(t.plus(offset).until(t), 0);
    }
}
