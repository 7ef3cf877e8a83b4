//! Settlement Orchestrator Module
//!
//! Background loop that periodically settles the pool.
//!
//! # Loop
//! 1. Wait for the configured interval
//! 2. Skip the tick if nothing is pending
//! 3. Run a settlement round
//! 4. Log the outcome; a missing validator or a store failure is retried next tick, a
//!    halted chain stops the loop

use crate::{
    LedgerError, SettlementReport, pool::TransactionPool, settlement::SettlementEngine,
    state::AccountStore,
};
use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Settlement orchestrator
///
/// Drives `SettlementEngine::settle_round` on a timer.
pub struct SettlementOrchestrator<S> {
    engine: Arc<SettlementEngine<S>>,
    pool: Arc<TransactionPool>,
    interval: Duration,
}

impl<S: AccountStore> SettlementOrchestrator<S> {
    /// Creates a new orchestrator
    ///
    /// # Arguments
    /// * `engine` - Shared settlement engine
    /// * `pool` - The pool the engine drains, polled to skip idle ticks
    /// * `interval_ms` - Tick period in milliseconds
    pub fn new(engine: Arc<SettlementEngine<S>>, pool: Arc<TransactionPool>, interval_ms: u64) -> Self {
        Self {
            engine,
            pool,
            interval: Duration::from_millis(interval_ms.max(1)),
        }
    }

    /// Run one tick: settle if anything is pending
    ///
    /// # Returns
    /// * `None` if the pool was empty and no applied transfer awaits a block
    /// * `Some(result)` of the settlement round otherwise
    pub async fn tick(&self) -> Option<Result<SettlementReport, LedgerError>> {
        if self.pool.is_empty().await && self.engine.unsealed().is_empty() {
            debug!("No pending transfers to settle");
            return None;
        }
        Some(self.engine.settle_round().await)
    }

    /// Start the settlement loop
    ///
    /// Returns only when the chain halts on an integrity violation.
    pub async fn start(self) -> anyhow::Result<()> {
        info!("Settlement orchestrator starting, interval {:?}", self.interval);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.tick().await {
                None => {}
                Some(Ok(report)) => match &report.block {
                    Some(block) => info!(
                        "Settled block #{} ({} transfers, {} failed)",
                        block.index,
                        report.validated_count(),
                        report.failed_count()
                    ),
                    None => debug!("Round settled nothing ({} failed)", report.failed_count()),
                },
                Some(Err(LedgerError::NoValidatorAvailable)) => {
                    warn!("No validator available, retrying next tick");
                }
                Some(Err(err)) if err.is_chain_halt() => {
                    error!("Settlement loop stopped: {}", err);
                    return Err(err.into());
                }
                Some(Err(err)) => {
                    warn!("Settlement round failed: {}", err);
                }
            }
        }
    }
}
