// 9.0: deterministic intake queue. on-chain order intents arriving within one
// block are buffered per market, then sorted into one canonical total order
// before they reach the book. relay order differs across nodes; this sort is
// what makes every node produce the identical match sequence.
//
// canonical order: effective block height, then sender addresses compared
// character-by-character from the END of the string (letters rank before
// digits, missing characters last), then literal txid.

use crate::order::{MarketKey, Order};
use crate::types::BlockHeight;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct QueuedOrder {
    pub order: Order,
    /// Height at which the intent becomes processable. Future heights are
    /// carried forward unprocessed.
    pub effective_height: BlockHeight,
}

// letters (and anything non-digit) rank before digits
fn char_class(c: u8) -> u8 {
    if c.is_ascii_digit() {
        1
    } else {
        0
    }
}

/// Compares sender addresses from the last character backwards.
pub fn canonical_sender_cmp(a: &str, b: &str) -> Ordering {
    let ab = a.as_bytes();
    let bb = b.as_bytes();
    let n = ab.len().max(bb.len());
    for i in 0..n {
        let ca = if i < ab.len() { Some(ab[ab.len() - 1 - i]) } else { None };
        let cb = if i < bb.len() { Some(bb[bb.len() - 1 - i]) } else { None };
        let ord = match (ca, cb) {
            (Some(x), Some(y)) => char_class(x).cmp(&char_class(y)).then(x.cmp(&y)),
            (Some(_), None) => Ordering::Less, // missing characters rank last
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

pub fn canonical_cmp(a: &QueuedOrder, b: &QueuedOrder) -> Ordering {
    a.effective_height
        .cmp(&b.effective_height)
        .then_with(|| canonical_sender_cmp(a.order.sender.as_str(), b.order.sender.as_str()))
        .then_with(|| a.order.txid.cmp(&b.order.txid))
}

#[derive(Debug, Clone, Default)]
pub struct IntakeQueue {
    pending: BTreeMap<MarketKey, Vec<QueuedOrder>>,
}

impl IntakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submit(&mut self, order: Order, effective_height: BlockHeight) {
        self.pending.entry(order.market).or_default().push(QueuedOrder {
            order,
            effective_height,
        });
    }

    pub fn pending_count(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Takes every entry effective at `block`, canonically sorted, grouped by
    /// market in market-key order. Future entries stay queued.
    pub fn drain_for_block(&mut self, block: BlockHeight) -> Vec<(MarketKey, Vec<Order>)> {
        let mut drained = Vec::new();
        for (market, entries) in self.pending.iter_mut() {
            let mut due: Vec<QueuedOrder> = Vec::new();
            entries.retain_mut(|e| {
                if e.effective_height <= block {
                    due.push(e.clone());
                    false
                } else {
                    true
                }
            });
            if !due.is_empty() {
                due.sort_by(canonical_cmp);
                drained.push((*market, due.into_iter().map(|e| e.order).collect()));
            }
        }
        self.pending.retain(|_, v| !v.is_empty());
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, AssetId, Price, Side, TxId};
    use rust_decimal_macros::dec;

    fn order(sender: &str, tx: &str, block: u64) -> Order {
        Order::new_limit(
            MarketKey::Spot(AssetId(1), AssetId(2)),
            Address::new(sender),
            Side::Buy,
            dec!(1),
            Price::new_unchecked(dec!(0.1)),
            BlockHeight(block),
            TxId::new(tx),
        )
    }

    #[test]
    fn letters_rank_before_digits_from_the_end() {
        // last characters: 'z' (letter) vs '9' (digit) -> letter first
        assert_eq!(canonical_sender_cmp("addrz", "addr9"), Ordering::Less);
        // equal tails, compare further back
        assert_eq!(canonical_sender_cmp("aXbc", "aYbc"), Ordering::Less);
    }

    #[test]
    fn missing_characters_rank_last() {
        // "bc" vs "abc": tails equal, then 'b' vs 'a' ... walk it: c==c, b==b,
        // then "bc" is exhausted while "abc" still has 'a' -> shorter ranks last
        assert_eq!(canonical_sender_cmp("bc", "abc"), Ordering::Greater);
        assert_eq!(canonical_sender_cmp("abc", "bc"), Ordering::Less);
        assert_eq!(canonical_sender_cmp("abc", "abc"), Ordering::Equal);
    }

    #[test]
    fn canonical_order_is_input_order_independent() {
        let mut q1 = IntakeQueue::new();
        let mut q2 = IntakeQueue::new();

        let orders = vec![
            order("mAlice7", "tx-c", 10),
            order("mBob3", "tx-a", 10),
            order("mAlice7", "tx-b", 10),
            order("zCarolQ", "tx-d", 10),
        ];

        for o in &orders {
            q1.submit(o.clone(), BlockHeight(10));
        }
        for o in orders.iter().rev() {
            q2.submit(o.clone(), BlockHeight(10));
        }

        let d1 = q1.drain_for_block(BlockHeight(10));
        let d2 = q2.drain_for_block(BlockHeight(10));
        let txids1: Vec<_> = d1[0].1.iter().map(|o| o.txid.clone()).collect();
        let txids2: Vec<_> = d2[0].1.iter().map(|o| o.txid.clone()).collect();
        assert_eq!(txids1, txids2);

        // zCarolQ ends in a letter, the others in digits -> it sorts first;
        // mAlice7 vs mBob3: '7' vs '3' are both digits, 3 < 7
        assert_eq!(txids2[0], TxId::new("tx-d"));
        assert_eq!(txids2[1], TxId::new("tx-a"));
        // same sender twice: txid breaks the tie
        assert_eq!(txids2[2], TxId::new("tx-b"));
        assert_eq!(txids2[3], TxId::new("tx-c"));
    }

    #[test]
    fn future_entries_carry_forward() {
        let mut q = IntakeQueue::new();
        q.submit(order("a", "t1", 10), BlockHeight(10));
        q.submit(order("b", "t2", 10), BlockHeight(12));

        let drained = q.drain_for_block(BlockHeight(10));
        assert_eq!(drained[0].1.len(), 1);
        assert_eq!(q.pending_count(), 1);

        let drained = q.drain_for_block(BlockHeight(12));
        assert_eq!(drained[0].1.len(), 1);
        assert_eq!(q.pending_count(), 0);
    }

    #[test]
    fn earlier_height_precedes_regardless_of_sender() {
        let mut q = IntakeQueue::new();
        q.submit(order("zzz", "t1", 9), BlockHeight(9));
        q.submit(order("aaa", "t2", 10), BlockHeight(10));

        let drained = q.drain_for_block(BlockHeight(10));
        let txids: Vec<_> = drained[0].1.iter().map(|o| o.txid.clone()).collect();
        assert_eq!(txids, vec![TxId::new("t1"), TxId::new("t2")]);
    }
}
