use proptest::prelude::*;

use graupel_types::amount::{COIN, MAX_MONEY};
use graupel_types::{Amount, ItemId};

proptest! {
    /// The stake-to-score conversion is monotone: more stake never means
    /// less score.
    #[test]
    fn score_is_monotone(a in 0u64..=MAX_MONEY, b in 0u64..=MAX_MONEY) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Amount::new(lo).to_score() <= Amount::new(hi).to_score());
    }

    /// Sub-score dust never rounds up.
    #[test]
    fn dust_rounds_down(raw in 0u64..COIN) {
        prop_assert!(Amount::new(raw).to_score() <= 100);
        prop_assert_eq!(Amount::new(raw).to_score(), (raw * 100 / COIN) as u32);
    }

    /// ItemId::is_zero holds exactly for the all-zero id.
    #[test]
    fn item_id_is_zero_correct(bytes in prop::array::uniform32(0u8..)) {
        let id = ItemId::new(bytes);
        prop_assert_eq!(id.is_zero(), bytes == [0u8; 32]);
        prop_assert_eq!(id.as_bytes(), &bytes);
    }

    /// ItemId ordering matches bytewise ordering, so poll-order tie-breaks
    /// are total.
    #[test]
    fn item_id_ordering_is_total(a in prop::array::uniform32(0u8..), b in prop::array::uniform32(0u8..)) {
        let ia = ItemId::new(a);
        let ib = ItemId::new(b);
        prop_assert_eq!(ia.cmp(&ib), a.cmp(&b));
    }
}
