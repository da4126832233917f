// 10.0: every settlement state change produces an event. used for audit trails
// and replay diagnostics; consensus state never depends on this log. the
// EventPayload enum lists all event types.

use crate::book::MakerRole;
use crate::fees::FeeBucket;
use crate::order::MarketKey;
use crate::types::{Address, Amount, BlockHeight, Price, TxId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub block: BlockHeight,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, block: BlockHeight, payload: EventPayload) -> Self {
        Self { id, block, payload }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // intake
    OrderQueued(OrderQueuedEvent),
    OrderInserted(OrderInsertedEvent),
    OrderSkipped(OrderSkippedEvent),
    OrderCanceled(OrderCanceledEvent),

    // matching
    MatchProduced(MatchProducedEvent),
    SelfTradeDropped(OrderCanceledEvent),
    UncrossCapped(UncrossCappedEvent),

    // settlement
    TradeSettled(TradeSettledEvent),
    FeeCharged(FeeChargedEvent),
    QuantityShrunk(QuantityShrunkEvent),
    ShortfallUnrecovered(ShortfallEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderQueuedEvent {
    pub market: MarketKey,
    pub sender: Address,
    pub txid: TxId,
    pub effective_height: BlockHeight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInsertedEvent {
    pub market: MarketKey,
    pub sender: Address,
    pub txid: TxId,
    pub seq: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderSkippedEvent {
    pub market: MarketKey,
    pub txid: TxId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Stop orders wait on the external trigger layer.
    StopHeld,
    /// Reduce-only order clamped to a flat position.
    ReduceOnlyFlat,
    /// Market order with nothing to cross.
    MarketUnfilled,
    /// Reservation exceeds the sender's available balance.
    Unfunded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCanceledEvent {
    pub market: MarketKey,
    pub sender: Address,
    pub txid: TxId,
    pub reserve_returned: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProducedEvent {
    pub market: MarketKey,
    pub buyer: Address,
    pub seller: Address,
    pub price: Price,
    pub amount: Decimal,
    pub maker: MakerRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UncrossCappedEvent {
    pub market: MarketKey,
    pub matches_produced: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSettledEvent {
    pub market: MarketKey,
    pub buyer: Address,
    pub seller: Address,
    pub price: Price,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeChargedEvent {
    pub market: MarketKey,
    pub payer: Address,
    pub fee: Amount,
    pub bucket: FeeBucket,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantityShrunkEvent {
    pub market: MarketKey,
    pub address: Address,
    pub requested: Decimal,
    pub kept: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortfallEvent {
    pub market: MarketKey,
    pub address: Address,
    pub remaining: Amount,
}
