//! Settlement Module
//!
//! - SettlementEngine: runs one round (select validator, drain pool, apply transfers,
//!   seal block, mint reward)
//! - SettlementOrchestrator: periodic background rounds

mod engine;
pub mod orchestrator;

#[cfg(test)]
mod tests;

pub use engine::SettlementEngine;
pub use orchestrator::SettlementOrchestrator;
