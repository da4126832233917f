//! Order types shared by the intake queue and the order books.
//!
//! An order is a decoded on-chain intent: spot orders trade token A against
//! token B at a limit price (B per A); contract orders trade a signed contract
//! count against the contract's collateral asset. Orders are owned by exactly
//! one book for their lifetime and removed on full fill or cancellation.

use crate::types::{Address, Amount, AssetId, BlockHeight, ContractId, Price, Side, TxId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which book an order belongs to: a token pair or a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MarketKey {
    /// Token pair. Buy = acquire token A paying token B at price (B per A).
    Spot(AssetId, AssetId),
    Contract(ContractId),
}

impl MarketKey {
    pub fn is_contract(&self) -> bool {
        matches!(self, MarketKey::Contract(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Limit order with a price. Rests if it does not cross.
    Limit,
    /// Contract-only. Takes the resting price, never maker, never rests.
    Market,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub market: MarketKey,
    pub sender: Address,
    pub side: Side,
    pub kind: OrderKind,
    /// Original quantity: token A units (spot) or contract count.
    pub amount: Decimal,
    /// Quantity still unfilled. Partially filled orders keep book priority.
    pub remaining: Decimal,
    pub price: Option<Price>,
    /// Collateral reserved for this order while it rests (contracts).
    pub init_margin: Amount,
    /// Post-only: forces own price and maker status on same-block ties.
    pub post: bool,
    /// Reduce-only: clamped to the sender's open position at insertion.
    pub reduce: bool,
    /// Stop orders are held by an external trigger layer, never matched here.
    pub stop: bool,
    /// Liquidation order: fee-exempt, treated as reduce-only.
    pub is_liq: bool,
    pub block: BlockHeight,
    pub txid: TxId,
    /// Insertion sequence, assigned by the book. Deterministic because
    /// insertion order is the canonical queue order.
    pub seq: u64,
}

impl Order {
    pub fn new_limit(
        market: MarketKey,
        sender: Address,
        side: Side,
        amount: Decimal,
        price: Price,
        block: BlockHeight,
        txid: TxId,
    ) -> Self {
        Self {
            market,
            sender,
            side,
            kind: OrderKind::Limit,
            amount,
            remaining: amount,
            price: Some(price),
            init_margin: Amount::zero(),
            post: false,
            reduce: false,
            stop: false,
            is_liq: false,
            block,
            txid,
            seq: 0,
        }
    }

    pub fn new_market(
        contract: ContractId,
        sender: Address,
        side: Side,
        amount: Decimal,
        block: BlockHeight,
        txid: TxId,
    ) -> Self {
        Self {
            market: MarketKey::Contract(contract),
            sender,
            side,
            kind: OrderKind::Market,
            amount,
            remaining: amount,
            price: None,
            init_margin: Amount::zero(),
            post: false,
            reduce: false,
            stop: false,
            is_liq: false,
            block,
            txid,
            seq: 0,
        }
    }

    pub fn post_only(mut self) -> Self {
        self.post = true;
        self
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce = true;
        self
    }

    pub fn stop_order(mut self) -> Self {
        self.stop = true;
        self
    }

    pub fn liquidation(mut self) -> Self {
        self.is_liq = true;
        self.reduce = true;
        self
    }

    pub fn with_init_margin(mut self, margin: Amount) -> Self {
        self.init_margin = margin;
        self
    }

    pub fn is_filled(&self) -> bool {
        self.remaining.is_zero()
    }

    pub fn fill(&mut self, qty: Decimal) {
        debug_assert!(qty <= self.remaining, "cannot fill more than remaining");
        self.remaining -= qty;
    }

    /// Reserved collateral attributable to the unfilled remainder.
    pub fn remaining_reserve(&self) -> Amount {
        if self.amount.is_zero() {
            return Amount::zero();
        }
        self.init_margin.mul(self.remaining / self.amount)
    }
}
