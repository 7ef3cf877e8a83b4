//! Settlement Engine Module
//!
//! One settlement round:
//! 1. Select a validator (none: the round fails, the pool is untouched)
//! 2. Drain the pool
//! 3. Validate and apply each request in its own store transaction
//! 4. Seal the validated requests into a block extending the chain tip
//! 5. Mint the block reward to the validator if anything settled
//!
//! Per-request failures are recorded in the outcome list and do not stop the round.
//! Once a transfer is applied it is recorded in exactly one block: if the append fails,
//! it is held back and leads the next block.

use crate::{
    Block, EmptyBlockPolicy, LedgerError, RequestStatus, SettlementConfig, SettlementOutcome,
    SettlementReport, StoreError, TransferRequest, ValidationError,
    chain::ChainLedger,
    now_millis,
    pool::TransactionPool,
    selection::ValidatorSelector,
    state::{AccountStore, AccountTxn},
    validation::Validator,
};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// Settlement engine
///
/// Shares the store, pool and chain with the submission path; holds its own selector so
/// each round takes a fresh validator draw.
pub struct SettlementEngine<S> {
    store: Arc<S>,
    pool: Arc<TransactionPool>,
    chain: Arc<ChainLedger>,
    selector: ValidatorSelector,
    validator: Validator,
    config: SettlementConfig,
    /// Applied transfers whose block was never appended
    unsealed: Mutex<Vec<TransferRequest>>,
}

impl<S: AccountStore> SettlementEngine<S> {
    pub fn new(
        store: Arc<S>,
        pool: Arc<TransactionPool>,
        chain: Arc<ChainLedger>,
        selector: ValidatorSelector,
        config: SettlementConfig,
    ) -> Self {
        Self {
            store,
            pool,
            chain,
            selector,
            validator: Validator::new(),
            config,
            unsealed: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Run one settlement round over everything currently pooled
    ///
    /// # Returns
    /// * `Ok(SettlementReport)` with one outcome per drained request and the new block,
    ///   if one was appended
    /// * `Err(NoValidatorAvailable)` if nobody has stake; nothing changed, retry later
    /// * `Err(ChainIntegrityViolation)` if the chain is halted; nothing changed
    /// * `Err(RoundIncomplete)` if transfers were applied but the block could not be
    ///   appended or the reward not minted. The report carries every outcome. Applied
    ///   transfers that missed their block lead the next block sealed after the chain
    ///   resumes.
    pub async fn settle_round(&self) -> Result<SettlementReport, LedgerError> {
        self.chain.ensure_writable()?;

        // Step 1: Resolve the validator before touching the pool
        let candidates = self.store.validators()?;
        let Some(validator) = self.selector.select(&candidates) else {
            warn!(
                "Settlement round aborted: no validator available, {} requests stay pooled",
                self.pool.len().await
            );
            return Err(LedgerError::NoValidatorAvailable);
        };

        // Step 2: Drain and apply in arrival order
        let drained = self.pool.drain_all().await;
        debug!("Settling {} requests, validator {}", drained.len(), validator.id);

        let mut outcomes = Vec::with_capacity(drained.len());
        let mut settled = self.take_unsealed();
        if !settled.is_empty() {
            info!("Carrying {} applied transfers from an interrupted round", settled.len());
        }
        let mut remaining = drained.into_iter();
        while let Some(request) = remaining.next() {
            match self.apply_request(&request) {
                Ok(outcome) => {
                    if outcome.is_validated() {
                        settled.push(request);
                    }
                    outcomes.push(outcome);
                }
                Err(err) => {
                    error!(
                        "Store failure settling request #{}: {}; returning unprocessed requests to the pool",
                        request.id, err
                    );
                    let mut unprocessed = vec![request];
                    unprocessed.extend(remaining.by_ref());
                    self.pool.requeue(unprocessed).await;
                    break;
                }
            }
        }

        let mut report = SettlementReport {
            validator_id: validator.id.clone(),
            block: None,
            outcomes,
            reward_minted: 0,
        };
        let failed = report.failed_count();
        if settled.is_empty() && self.config.empty_blocks == EmptyBlockPolicy::Skip {
            info!("Round sealed no block: nothing validated ({} failed)", failed);
            return Ok(report);
        }

        // Step 3: Seal against whatever tip is current
        let rewarded = !settled.is_empty();
        let validator_id = validator.id.clone();
        let transactions = settled.clone();
        let block = match self
            .chain
            .extend(|tip| Block::next(tip, now_millis(), transactions, validator_id))
        {
            Ok(block) => block,
            Err(err) => {
                error!(
                    "Failed to append settled block, {} applied transfers wait for the next block: {}",
                    settled.len(),
                    err
                );
                self.stash_unsealed(settled);
                return Err(LedgerError::RoundIncomplete {
                    report: Box::new(report),
                    source: Box::new(err),
                });
            }
        };
        report.block = Some(block.clone());

        // Step 4: Reward only blocks that carry transfers
        if rewarded {
            match self.mint_reward(&validator.id, self.config.block_reward) {
                Ok(minted) => report.reward_minted = minted,
                Err(err) => {
                    error!("Block #{} recorded but reward to {} failed: {}", block.index, validator.id, err);
                    return Err(LedgerError::RoundIncomplete {
                        report: Box::new(report),
                        source: Box::new(err),
                    });
                }
            }
        }

        info!(
            "Block #{} sealed by {}: {} settled, {} failed, reward {}",
            block.index,
            validator.id,
            block.transactions.len(),
            failed,
            report.reward_minted
        );

        Ok(report)
    }

    /// Applied transfers waiting for a block after an interrupted round
    pub fn unsealed(&self) -> Vec<TransferRequest> {
        self.unsealed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn take_unsealed(&self) -> Vec<TransferRequest> {
        std::mem::take(&mut *self.unsealed.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Put applied transfers back at the front, ahead of anything stashed meanwhile
    fn stash_unsealed(&self, mut requests: Vec<TransferRequest>) {
        let mut unsealed = self.unsealed.lock().unwrap_or_else(PoisonError::into_inner);
        requests.append(&mut unsealed);
        *unsealed = requests;
    }

    /// Validate and apply one request atomically across sender and recipient
    ///
    /// A missing sender or recipient is a per-request failure. Any other store failure is
    /// returned, with nothing applied.
    pub fn apply_request(&self, request: &TransferRequest) -> Result<SettlementOutcome, StoreError> {
        let ids = [request.sender_id.as_str(), request.recipient_id.as_str()];
        let result = self.store.transact(&ids, |txn| {
            let sender = txn
                .get(&request.sender_id)
                .ok_or_else(|| ValidationError::UnknownAccount {
                    account: request.sender_id.clone(),
                })?;
            self.validator.validate(request, sender)?;
            transfer(txn, request)
        });

        let status = match result {
            Ok(Ok(())) => RequestStatus::Validated,
            Ok(Err(reason)) => RequestStatus::Failed { reason },
            Err(StoreError::UnknownAccount(account)) => RequestStatus::Failed {
                reason: ValidationError::UnknownAccount { account },
            },
            Err(err) => return Err(err),
        };

        if let RequestStatus::Failed { reason } = &status {
            warn!("Request #{} from {} failed: {}", request.id, request.sender_id, reason);
        }

        Ok(SettlementOutcome {
            request_id: request.id,
            sender_id: request.sender_id.clone(),
            nonce: request.nonce,
            status,
        })
    }

    /// Credit newly minted `amount` to the validator
    fn mint_reward(&self, validator_id: &str, amount: u64) -> Result<u64, LedgerError> {
        let minted = self.store.transact(&[validator_id], |txn| {
            let account = txn.get_mut(validator_id)?;
            let balance = account.balance.checked_add(amount)?;
            account.balance = balance;
            Some(amount)
        })?;

        Ok(minted.unwrap_or_else(|| {
            error!("Reward for {} skipped: balance would overflow", validator_id);
            0
        }))
    }
}

/// Move `amount` from sender to recipient and advance the sender nonce
fn transfer(txn: &mut AccountTxn, request: &TransferRequest) -> Result<(), ValidationError> {
    let unknown = |id: &str| ValidationError::UnknownAccount { account: id.to_string() };

    let recipient = txn
        .get(&request.recipient_id)
        .ok_or_else(|| unknown(&request.recipient_id))?;
    let credited = recipient
        .balance
        .checked_add(request.amount)
        .ok_or_else(|| ValidationError::BalanceOverflow {
            account: request.recipient_id.clone(),
        })?;

    let sender = txn
        .get_mut(&request.sender_id)
        .ok_or_else(|| unknown(&request.sender_id))?;
    sender.balance -= request.amount;
    sender.nonce += 1;

    let recipient = txn
        .get_mut(&request.recipient_id)
        .ok_or_else(|| unknown(&request.recipient_id))?;
    recipient.balance = credited;
    Ok(())
}
