// 12.0: settlement engine. coordinates order intake, matching, fee routing,
// margin movement, and loss sourcing. deterministic and event-driven with no
// external I/O.

mod blocks;
mod core;
mod matches;
mod orders;
mod results;

pub use core::Engine;
pub use results::{BlockResult, EngineError, MatchOutcome};
