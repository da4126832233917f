// settlement-core: deterministic matching and settlement engine for a
// UTXO meta-protocol. ledger-first architecture: balance invariants and
// loss sourcing take priority. all computation is deterministic with no
// external I/O; every node replaying the same blocks reaches the same state.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: primitives: AssetId, Amount, Price, SignedQty, Ppm
//   2.x  tally.rs: five-bucket balances, atomic updates, the journal
//   3.x  registry.rs: contract specs, notional and margin derivation
//   4.x  book.rs: per-market book, maker policy, the uncross loop
//   5.x  position.rs: fill decomposition, PnL, the position store
//   6.x  fee_cache.rs: recognized value and buyback stash per market
//   7.x  fees.rs: taker fee math, bucket location, revenue accrual
//   8.x  waterfall.rs: four-step loss sourcing
//   9.x  queue.rs: canonical intake ordering
//   10.x events.rs: state transition events for audit
//   11.x config.rs: consensus knobs
//   12.x engine/: intake drain, matching, the settlement pipeline
//        order.rs, margin.rs, insurance.rs, trade.rs: see module docs


// core settlement modules
pub mod book;
pub mod engine;
pub mod events;
pub mod fees;
pub mod margin;
pub mod order;
pub mod position;
pub mod registry;
pub mod tally;
pub mod types;
pub mod waterfall;

// accrual and audit modules
pub mod config;
pub mod fee_cache;
pub mod insurance;
pub mod queue;
pub mod trade;

// re exports for convenience
pub use book::*;
pub use config::EngineConfig;
pub use engine::*;
pub use events::*;
pub use fee_cache::*;
pub use fees::*;
pub use insurance::*;
pub use margin::*;
pub use order::*;
pub use position::*;
pub use queue::*;
pub use registry::*;
pub use tally::*;
pub use trade::*;
pub use types::*;
pub use waterfall::*;
