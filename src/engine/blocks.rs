// 12.4 engine/blocks.rs: block processing. drains the intake queue in
// canonical order and runs each order through insertion, matching, and
// settlement. every node processing the same block reaches the same state.

use super::core::Engine;
use super::results::{BlockResult, EngineError};
use crate::types::BlockHeight;

impl Engine {
    /// Processes every queued order whose effective height is `block`.
    pub fn process_block(&mut self, block: BlockHeight) -> Result<BlockResult, EngineError> {
        self.set_block(block);
        let mut result = BlockResult::default();

        for (_market, orders) in self.queue.drain_for_block(block) {
            for order in orders {
                result.orders_processed += 1;
                let outcome = self.insert_and_match(order)?;
                if outcome.skipped {
                    result.orders_skipped += 1;
                    continue;
                }
                let trades = self.process_matches(outcome.matches, false)?;
                result.trades.extend(trades);
            }
        }

        Ok(result)
    }
}
