//! Ledger Service Module
//!
//! Single entry point the API layer talks to. Wires the account store, transaction pool,
//! settlement engine and chain together, and performs the request-shape checks that
//! happen before a transfer may enter the pool. The caller identity passed in is trusted:
//! authentication happens upstream.

use crate::{
    Account, Block, Config, HistoryEntry, HistoryStatus, LedgerError, Page, RequestStatus,
    SettlementReport, TransferSubmission,
    chain::ChainLedger,
    pool::TransactionPool,
    selection::ValidatorSelector,
    settlement::SettlementEngine,
    state::{self, AccountStore},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Acknowledgement of an accepted transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub request_id: u64,
    #[serde(flatten)]
    pub status: RequestStatus,
    /// Block that settled the transfer, if it settled during this call
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_index: Option<u64>,
}

/// Ledger facade shared by all request handlers
pub struct LedgerService<S> {
    store: Arc<S>,
    pool: Arc<TransactionPool>,
    chain: Arc<ChainLedger>,
    engine: Arc<SettlementEngine<S>>,
    initial_balance: u64,
}

impl<S: AccountStore> LedgerService<S> {
    /// Build the service over `store` with a fresh pool and chain
    pub fn new(store: Arc<S>, config: &Config, selector: ValidatorSelector) -> Self {
        let pool = Arc::new(TransactionPool::new());
        let chain = Arc::new(ChainLedger::new());
        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            pool.clone(),
            chain.clone(),
            selector,
            config.settlement.clone(),
        ));
        Self {
            store,
            pool,
            chain,
            engine,
            initial_balance: config.accounts.initial_balance,
        }
    }

    pub fn engine(&self) -> Arc<SettlementEngine<S>> {
        self.engine.clone()
    }

    pub fn pool(&self) -> Arc<TransactionPool> {
        self.pool.clone()
    }

    pub fn chain(&self) -> Arc<ChainLedger> {
        self.chain.clone()
    }

    pub fn store(&self) -> Arc<S> {
        self.store.clone()
    }

    /// Submit a signed transfer on behalf of the authenticated `caller`
    ///
    /// Rejected submissions change nothing. An accepted one is in the pool when this
    /// returns; with `settle_on_submit` a round runs immediately and the receipt reports
    /// how the request fared in it.
    pub async fn submit_transfer(
        &self,
        caller: &str,
        submission: TransferSubmission,
    ) -> Result<SubmissionReceipt, LedgerError> {
        let sender = self.store.get(caller)?;
        let message = &submission.message;

        if message.amount == 0 {
            return Err(LedgerError::InvalidRequest("amount must be positive".into()));
        }
        if message.recipient_id == sender.id {
            return Err(LedgerError::InvalidRequest("cannot send credits to yourself".into()));
        }
        if let Err(err) = self.store.get(&message.recipient_id) {
            warn!("Rejected transfer from {}: {}", caller, err);
            return Err(err.into());
        }

        let request = self.pool.submit(&sender, submission).await?;
        info!(
            "Transfer #{} accepted: {} -> {} ({} credits, nonce {})",
            request.id, request.sender_id, request.recipient_id, request.amount, request.nonce
        );

        let pending = SubmissionReceipt {
            request_id: request.id,
            status: RequestStatus::Pending,
            block_index: None,
        };
        if !self.engine.config().settle_on_submit {
            return Ok(pending);
        }

        match self.engine.settle_round().await {
            Ok(report) => Ok(Self::receipt_from(&report, request.id).unwrap_or(pending)),
            Err(LedgerError::RoundIncomplete { report, source }) => {
                warn!("Round after transfer #{} did not complete: {}", request.id, source);
                Ok(Self::receipt_from(&report, request.id).unwrap_or(pending))
            }
            Err(err) => {
                warn!("Transfer #{} stays pending: {}", request.id, err);
                Ok(pending)
            }
        }
    }

    fn receipt_from(report: &SettlementReport, request_id: u64) -> Option<SubmissionReceipt> {
        let outcome = report.outcomes.iter().find(|o| o.request_id == request_id)?;
        let block_index = match outcome.status {
            RequestStatus::Validated => report.block.as_ref().map(|b| b.index),
            _ => None,
        };
        Some(SubmissionReceipt {
            request_id,
            status: outcome.status.clone(),
            block_index,
        })
    }

    /// Run a settlement round now
    pub async fn settle(&self) -> Result<SettlementReport, LedgerError> {
        self.engine.settle_round().await
    }

    pub fn register(&self, id: &str, public_key: &str) -> Result<Account, LedgerError> {
        state::register(self.store.as_ref(), id, public_key, self.initial_balance)
    }

    /// Seed an account with explicit balances (startup only)
    pub fn seed(&self, account: Account) -> Result<(), LedgerError> {
        self.store.insert(account)?;
        Ok(())
    }

    pub fn stake(&self, caller: &str, amount: u64) -> Result<Account, LedgerError> {
        state::stake(self.store.as_ref(), caller, amount)
    }

    pub fn unstake(&self, caller: &str, amount: u64) -> Result<Account, LedgerError> {
        state::unstake(self.store.as_ref(), caller, amount)
    }

    pub fn account(&self, id: &str) -> Result<Account, LedgerError> {
        Ok(self.store.get(id)?)
    }

    /// Chain in order, 1-based pages
    pub fn blocks(&self, page: usize, limit: usize) -> Page<Block> {
        self.chain.blocks(page, limit)
    }

    /// Settled and pending transfers involving `account`, newest first
    ///
    /// Settled transfers still waiting for their block have no `block_index`.
    pub async fn history(&self, account: &str, page: usize, limit: usize) -> Page<HistoryEntry> {
        let involves = |sender: &str, recipient: &str| sender == account || recipient == account;

        let mut entries: Vec<HistoryEntry> = self
            .pool
            .pending_for(account)
            .await
            .into_iter()
            .map(|request| HistoryEntry {
                request,
                status: HistoryStatus::Pending,
                block_index: None,
            })
            .collect();

        entries.extend(
            self.engine
                .unsealed()
                .into_iter()
                .filter(|t| involves(&t.sender_id, &t.recipient_id))
                .map(|request| HistoryEntry {
                    request,
                    status: HistoryStatus::Validated,
                    block_index: None,
                }),
        );

        for block in self.chain.snapshot() {
            entries.extend(
                block
                    .transactions
                    .into_iter()
                    .filter(|t| involves(&t.sender_id, &t.recipient_id))
                    .map(|request| HistoryEntry {
                        request,
                        status: HistoryStatus::Validated,
                        block_index: Some(block.index),
                    }),
            );
        }

        entries.sort_by(|a, b| {
            b.request
                .submitted_at
                .cmp(&a.request.submitted_at)
                .then(b.request.id.cmp(&a.request.id))
        });

        let total = entries.len();
        let start = page.saturating_sub(1).saturating_mul(limit);
        Page {
            items: entries.into_iter().skip(start).take(limit).collect(),
            total,
        }
    }

    pub fn verify_chain(&self) -> bool {
        self.chain.verify_chain()
    }

    /// Clear a chain halt after manual investigation
    pub fn resume_chain(&self) {
        self.chain.resume();
    }
}
