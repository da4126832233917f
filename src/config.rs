// 11.0 config.rs: all settlement knobs in one place. fee rates, the margin
// loss cap, the uncross ceiling. defaults are the consensus values; changing
// any of these on a live network is a hard fork.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fraction of held margin the loss waterfall may drain (step 2).
    pub margin_loss_cap: Decimal,
    /// Hard ceiling on uncross iterations per market per block. A pathological
    /// book stops matching for the block instead of spinning.
    pub max_uncross_iterations: usize,
    /// Audit event ring size.
    pub max_events: usize,
    /// Print events as they are emitted (sim only).
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            margin_loss_cap: dec!(0.49),
            max_uncross_iterations: 10_000,
            max_events: 100_000,
            verbose: false,
        }
    }
}
