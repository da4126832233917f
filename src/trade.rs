//! Settlement records and the append-only analytics sinks.
//!
//! A Trade is the persisted copy of a Match after settlement: immutable,
//! created once, never mutated. The history and volume sinks are best-effort
//! analytics surfaces; a failure there must never roll back settlement, so
//! their APIs cannot fail.

use crate::book::MakerRole;
use crate::order::MarketKey;
use crate::types::{Address, Amount, BlockHeight, Price, TxId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub market: MarketKey,
    pub buyer: Address,
    pub seller: Address,
    pub buyer_txid: TxId,
    pub seller_txid: TxId,
    pub price: Price,
    /// Token A units (spot) or contracts.
    pub amount: Decimal,
    /// Spot only: token B units moved.
    pub amount_b: Amount,
    pub maker: MakerRole,
    pub buyer_fee: Amount,
    pub seller_fee: Amount,
    /// Contracts the buyer's fill closed / flipped.
    pub buyer_closed: Decimal,
    pub buyer_flipped: Decimal,
    pub seller_closed: Decimal,
    pub seller_flipped: Decimal,
    /// Loss the waterfall could not recover, per side. Zero when settled
    /// cleanly; positive means the insurance/liquidation layer must act.
    pub buyer_shortfall: Amount,
    pub seller_shortfall: Amount,
    pub block: BlockHeight,
    /// Nominal settlement time, a pure function of the block height so
    /// every node stamps the same value.
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Target block spacing of the host chain, seconds.
const BLOCK_SPACING_SECS: i64 = 150;

/// Nominal wall time for a block, derived from the height alone.
pub fn block_timestamp(block: BlockHeight) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(block.0 as i64 * BLOCK_SPACING_SECS, 0)
        .unwrap_or(chrono::DateTime::UNIX_EPOCH)
}

/// Append-only trade history.
#[derive(Debug, Clone, Default)]
pub struct TradeHistory {
    trades: Vec<Trade>,
}

impl TradeHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn all(&self) -> &[Trade] {
        &self.trades
    }

    pub fn for_market(&self, market: MarketKey) -> impl Iterator<Item = &Trade> {
        self.trades.iter().filter(move |t| t.market == market)
    }
}

/// Per-market, per-block traded volume.
#[derive(Debug, Clone, Default)]
pub struct VolumeIndex {
    volumes: BTreeMap<(MarketKey, BlockHeight), Decimal>,
}

impl VolumeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, market: MarketKey, block: BlockHeight, amount: Decimal) {
        *self.volumes.entry((market, block)).or_default() += amount;
    }

    pub fn volume_at(&self, market: MarketKey, block: BlockHeight) -> Decimal {
        self.volumes.get(&(market, block)).copied().unwrap_or_default()
    }

    pub fn total_for(&self, market: MarketKey) -> Decimal {
        self.volumes
            .iter()
            .filter(|((m, _), _)| *m == market)
            .map(|(_, v)| *v)
            .sum()
    }
}
