// 12.0.2: result types and errors for engine operations.

use crate::book::Match;
use crate::order::MarketKey;
use crate::tally::LedgerError;
use crate::trade::Trade;
use crate::types::{ContractId, TxId};

/// Outcome of inserting one order and uncrossing its book. The matches are
/// unsettled; `process_matches` turns them into trades.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matches: Vec<Match>,
    /// Txids of orders dropped along the way (self-trade, unfilled market
    /// order remainder, unfunded reservation).
    pub canceled: Vec<TxId>,
    /// True when the order never reached the book (stop, flat reduce-only,
    /// unfunded). No matches are possible then.
    pub skipped: bool,
    pub iteration_capped: bool,
}

/// One block's worth of settled activity.
#[derive(Debug, Clone, Default)]
pub struct BlockResult {
    pub trades: Vec<Trade>,
    pub orders_processed: usize,
    pub orders_skipped: usize,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("no order book for market {0:?}")]
    MarketNotFound(MarketKey),

    #[error("contract {0:?} is not registered")]
    ContractNotRegistered(ContractId),

    #[error("order {0:?} not found")]
    OrderNotFound(TxId),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
