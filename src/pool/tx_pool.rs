//! Transaction Pool Module
//!
//! This module implements a pool for pending signed transfers.
//! Requests are stored in a FIFO queue keyed by arrival order and drained whole by the
//! settlement engine.

use crate::{
    Account, LedgerError, TransferRequest, TransferSubmission, now_millis,
    validation::verify_hex,
};
use std::collections::VecDeque;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Pool for pending transfer requests
///
/// Only requests whose signature verifies against the sender's key are admitted. Uses
/// VecDeque for efficient insertion at the back and removal from the front.
/// Protected by RwLock for concurrent access.
#[derive(Default)]
pub struct TransactionPool {
    inner: RwLock<PoolInner>,
}

#[derive(Default)]
struct PoolInner {
    /// Arrival sequence number of the next admitted request
    next_id: u64,
    /// Queue of pending requests
    requests: VecDeque<TransferRequest>,
}

impl TransactionPool {
    /// Creates a new empty transaction pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a signed transfer from `sender`
    ///
    /// The signature is checked before the lock is taken and the request is pushed in the
    /// same critical section that assigns its id, so a caller that abandons this future
    /// either never enqueued anything or got the request back.
    ///
    /// # Returns
    /// * `Ok(TransferRequest)` the pooled request, carrying its arrival id
    /// * `Err(LedgerError::InvalidSignature)` if the signature does not verify
    pub async fn submit(
        &self,
        sender: &Account,
        submission: TransferSubmission,
    ) -> Result<TransferRequest, LedgerError> {
        if !verify_hex(&sender.public_key, &submission.signature, &submission.message) {
            warn!("Rejected transfer from {}: invalid signature", sender.id);
            return Err(LedgerError::InvalidSignature);
        }

        let TransferSubmission { message, signature } = submission;
        let mut inner = self.inner.write().await;
        let request = TransferRequest {
            id: inner.next_id,
            sender_id: sender.id.clone(),
            recipient_id: message.recipient_id.clone(),
            amount: message.amount,
            nonce: message.nonce,
            message,
            signature,
            submitted_at: now_millis(),
        };
        inner.next_id += 1;
        inner.requests.push_back(request.clone());
        debug!("Request #{} from {} pooled", request.id, request.sender_id);
        Ok(request)
    }

    /// Remove and return every pending request, oldest first
    ///
    /// A submission racing with the drain lands either in this batch or in the pool for
    /// the next one; the write lock makes the two orderings the only possibilities.
    pub async fn drain_all(&self) -> Vec<TransferRequest> {
        let mut inner = self.inner.write().await;
        inner.requests.drain(..).collect()
    }

    /// Put requests back at the front of the queue, keeping their relative order
    ///
    /// Used when a round is interrupted after draining.
    pub async fn requeue(&self, requests: Vec<TransferRequest>) {
        if requests.is_empty() {
            return;
        }
        let mut inner = self.inner.write().await;
        for request in requests.into_iter().rev() {
            inner.requests.push_front(request);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.requests.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.requests.is_empty()
    }

    /// Copy of the pending queue
    pub async fn snapshot(&self) -> Vec<TransferRequest> {
        self.inner.read().await.requests.iter().cloned().collect()
    }

    /// Pending requests sent or received by `account`
    pub async fn pending_for(&self, account: &str) -> Vec<TransferRequest> {
        self.inner
            .read()
            .await
            .requests
            .iter()
            .filter(|r| r.sender_id == account || r.recipient_id == account)
            .cloned()
            .collect()
    }
}
