// 4.0: per-market order book and the two uncrossing algorithms (spot, contract).
// 4.1 has the maker/taker policy, 4.2 the uncross loop. price/time priority is
// price, then block ascending, then insertion seq ascending. insertion order is
// the canonical queue order, so seq is identical on every node.

use crate::order::{MarketKey, Order, OrderKind};
use crate::types::{Address, Amount, BlockHeight, Price, Side, TxId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Who sets the trade price and earns the rebate. `Neither` happens when two
/// on-chain orders land in the same block with no post-only flag: both sides
/// pay half the taker fee and nobody is rebated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MakerRole {
    Buyer,
    Seller,
    Neither,
}

/// One pairing of a buy and a sell. Ephemeral: produced and consumed within a
/// single block's processing; only the resulting Trade is persisted.
#[derive(Debug, Clone)]
pub struct Match {
    pub market: MarketKey,
    pub buyer: Address,
    pub seller: Address,
    pub buyer_txid: TxId,
    pub seller_txid: TxId,
    pub trade_price: Price,
    /// Token A units (spot) or contract count.
    pub amount: Decimal,
    /// Spot only: token B units at the trade price.
    pub amount_b: Amount,
    pub maker: MakerRole,
    /// Contracts: initial margin per contract at the trade price, fetched once
    /// here so downstream margin movement never re-derives it.
    pub im_per_contract: Amount,
    /// Reserved collateral each side's resting order frees for this fill.
    pub buyer_reserve_release: Amount,
    pub seller_reserve_release: Amount,
    pub buyer_is_liq: bool,
    pub seller_is_liq: bool,
    pub block: BlockHeight,
}

/// Output of one uncross pass.
#[derive(Debug, Clone, Default)]
pub struct UncrossResult {
    pub matches: Vec<Match>,
    /// Orders dropped by self-trade resolution. Their reserves go back to the
    /// sender; dropping the maker is the resolution, not an error.
    pub canceled: Vec<Order>,
    /// The hard iteration ceiling tripped. Matching stops for the block.
    pub iteration_capped: bool,
}

#[derive(Debug, Clone)]
pub struct OrderBook {
    pub market: MarketKey,
    buys: Vec<Order>,
    sells: Vec<Order>,
    next_seq: u64,
}

impl OrderBook {
    pub fn new(market: MarketKey) -> Self {
        Self {
            market,
            buys: Vec::new(),
            sells: Vec::new(),
            next_seq: 1,
        }
    }

    /// Inserts a resting order, assigning its deterministic sequence number.
    pub fn insert(&mut self, mut order: Order) -> u64 {
        debug_assert_eq!(order.market, self.market);
        let seq = self.next_seq;
        self.next_seq += 1;
        order.seq = seq;
        match order.side {
            Side::Buy => self.buys.push(order),
            Side::Sell => self.sells.push(order),
        }
        seq
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.buys.iter().filter_map(|o| o.price).max()
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.sells.iter().filter_map(|o| o.price).min()
    }

    pub fn order_count(&self) -> usize {
        self.buys.len() + self.sells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.buys.iter().chain(self.sells.iter())
    }

    /// Removes one resting order by txid.
    pub fn cancel(&mut self, txid: &TxId) -> Option<Order> {
        if let Some(i) = self.buys.iter().position(|o| &o.txid == txid) {
            return Some(self.buys.remove(i));
        }
        if let Some(i) = self.sells.iter().position(|o| &o.txid == txid) {
            return Some(self.sells.remove(i));
        }
        None
    }

    /// Removes the sender's highest-priority resting order, bids before asks.
    /// The waterfall cancels one order at a time so it frees no more reserve
    /// than the remainder demands.
    pub fn cancel_next_for(&mut self, sender: &Address) -> Option<Order> {
        self.sort_sides();
        if let Some(i) = self.buys.iter().position(|o| &o.sender == sender) {
            return Some(self.buys.remove(i));
        }
        if let Some(i) = self.sells.iter().position(|o| &o.sender == sender) {
            return Some(self.sells.remove(i));
        }
        None
    }

    /// Removes every resting order of one sender. The loss waterfall uses this
    /// to free reserve; removal order follows book priority so the freed
    /// amounts are identical on every node.
    pub fn cancel_all_for(&mut self, sender: &Address) -> Vec<Order> {
        self.sort_sides();
        let mut removed = Vec::new();
        let keep = |orders: &mut Vec<Order>, removed: &mut Vec<Order>| {
            let mut i = 0;
            while i < orders.len() {
                if &orders[i].sender == sender {
                    removed.push(orders.remove(i));
                } else {
                    i += 1;
                }
            }
        };
        keep(&mut self.buys, &mut removed);
        keep(&mut self.sells, &mut removed);
        removed
    }

    // 4.1: maker policy. earlier block wins; same-block ties go to the
    // post-only side; market orders are never maker. with no signal left,
    // contracts get Neither (both pay half taker) and spot falls back to the
    // earlier canonical seq.
    fn maker_role(buy: &Order, sell: &Order, is_contract: bool) -> MakerRole {
        if buy.kind == OrderKind::Market {
            return MakerRole::Seller;
        }
        if sell.kind == OrderKind::Market {
            return MakerRole::Buyer;
        }
        if buy.block < sell.block {
            return MakerRole::Buyer;
        }
        if sell.block < buy.block {
            return MakerRole::Seller;
        }
        match (buy.post, sell.post) {
            (true, false) => MakerRole::Buyer,
            (false, true) => MakerRole::Seller,
            _ if is_contract => MakerRole::Neither,
            _ => {
                if buy.seq < sell.seq {
                    MakerRole::Buyer
                } else {
                    MakerRole::Seller
                }
            }
        }
    }

    fn trade_price(buy: &Order, sell: &Order, maker: MakerRole) -> Option<Price> {
        match maker {
            MakerRole::Buyer => buy.price,
            MakerRole::Seller => sell.price,
            // neither side is maker: the earlier-seq side's limit stands in
            MakerRole::Neither => {
                if buy.seq < sell.seq {
                    buy.price
                } else {
                    sell.price
                }
            }
        }
    }

    fn sort_sides(&mut self) {
        // market orders (no price) sort to the front of their side
        self.buys.sort_by(|a, b| {
            match (a.price, b.price) {
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(pa), Some(pb)) => pb.cmp(&pa), // highest bid first
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then(a.block.cmp(&b.block))
            .then(a.seq.cmp(&b.seq))
        });
        self.sells.sort_by(|a, b| {
            match (a.price, b.price) {
                (None, Some(_)) => std::cmp::Ordering::Less,
                (Some(_), None) => std::cmp::Ordering::Greater,
                (Some(pa), Some(pb)) => pa.cmp(&pb), // lowest ask first
                (None, None) => std::cmp::Ordering::Equal,
            }
            .then(a.block.cmp(&b.block))
            .then(a.seq.cmp(&b.seq))
        });
    }

    // 4.2: the uncross loop. while the best bid crosses the best ask, pair them
    // off at the maker's price for min(remaining) and keep partially filled
    // orders at the front of their side. `im_at` supplies the per-contract
    // initial margin at a trade price; spot books pass a zero closure.
    pub fn uncross<F>(&mut self, im_at: F, max_iterations: usize) -> UncrossResult
    where
        F: Fn(Price) -> Amount,
    {
        let mut result = UncrossResult::default();
        self.sort_sides();

        let is_contract = self.market.is_contract();
        let mut iterations = 0usize;

        loop {
            if self.buys.is_empty() || self.sells.is_empty() {
                break;
            }
            if iterations >= max_iterations {
                result.iteration_capped = true;
                break;
            }
            iterations += 1;

            let maker = Self::maker_role(&self.buys[0], &self.sells[0], is_contract);
            let Some(price) = Self::trade_price(&self.buys[0], &self.sells[0], maker) else {
                // two priceless orders cannot discover a price
                break;
            };

            // crossing check: a market side adopts the other side's price
            let bid = self.buys[0].price.unwrap_or(price);
            let ask = self.sells[0].price.unwrap_or(price);
            if bid < ask {
                break;
            }

            // self-trade: drop the maker side instead of executing
            if self.buys[0].sender == self.sells[0].sender {
                let dropped = match maker {
                    MakerRole::Buyer => self.buys.remove(0),
                    MakerRole::Seller => self.sells.remove(0),
                    MakerRole::Neither => {
                        // no maker to drop: the earlier-seq order goes
                        if self.buys[0].seq < self.sells[0].seq {
                            self.buys.remove(0)
                        } else {
                            self.sells.remove(0)
                        }
                    }
                };
                result.canceled.push(dropped);
                continue;
            }

            let qty = self.buys[0].remaining.min(self.sells[0].remaining);
            debug_assert!(qty > Decimal::ZERO);

            let buyer_release;
            let seller_release;
            let amount_b;
            let im_per_contract;
            if is_contract {
                // pro-rata share of each resting order's reserved collateral
                buyer_release = self.buys[0].init_margin.mul(qty / self.buys[0].amount);
                seller_release = self.sells[0].init_margin.mul(qty / self.sells[0].amount);
                amount_b = Amount::zero();
                im_per_contract = im_at(price);
            } else {
                // seller frees token A, buyer frees token B at their own limit
                seller_release = Amount::new(qty);
                let buyer_limit = self.buys[0].price.unwrap_or(price);
                buyer_release = Amount::new(qty * buyer_limit.value());
                amount_b = Amount::new(qty * price.value());
                im_per_contract = Amount::zero();
            }

            result.matches.push(Match {
                market: self.market,
                buyer: self.buys[0].sender.clone(),
                seller: self.sells[0].sender.clone(),
                buyer_txid: self.buys[0].txid.clone(),
                seller_txid: self.sells[0].txid.clone(),
                trade_price: price,
                amount: qty,
                amount_b,
                maker,
                im_per_contract,
                buyer_reserve_release: buyer_release,
                seller_reserve_release: seller_release,
                buyer_is_liq: self.buys[0].is_liq,
                seller_is_liq: self.sells[0].is_liq,
                block: self.buys[0].block.max(self.sells[0].block),
            });

            self.buys[0].fill(qty);
            self.sells[0].fill(qty);
            if self.buys[0].is_filled() {
                self.buys.remove(0);
            }
            if self.sells[0].is_filled() {
                self.sells.remove(0);
            }
        }

        result
    }
}
