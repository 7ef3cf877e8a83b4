//! Chain Ledger
//!
//! Holds the block sequence in memory. Appends are checked against the tip under the
//! write lock; a block that does not extend the tip is an invariant violation, not a user
//! error, and halts the ledger until an operator resumes it.

use crate::{Block, LedgerError, Page, now_millis};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use tracing::{error, info, warn};

#[derive(Default)]
struct ChainState {
    blocks: Vec<Block>,
    /// Reason the ledger stopped accepting appends
    halted: Option<String>,
}

/// Append-only, hash-linked block sequence
#[derive(Default)]
pub struct ChainLedger {
    state: RwLock<ChainState>,
}

impl ChainLedger {
    /// Empty ledger; genesis is created on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger over existing blocks, taken as-is (for audits and restores)
    pub fn from_blocks(blocks: Vec<Block>) -> Self {
        Self {
            state: RwLock::new(ChainState { blocks, halted: None }),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, ChainState> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.blocks.is_empty() {
            let genesis = Block::genesis(now_millis());
            info!("Created genesis block {}", genesis.hash);
            state.blocks.push(genesis);
        }
        state
    }

    /// Run `f` over the blocks under the read lock, creating genesis first if needed
    fn with_blocks<R>(&self, f: impl FnOnce(&[Block]) -> R) -> R {
        {
            let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
            if !state.blocks.is_empty() {
                return f(&state.blocks);
            }
        }
        let state = self.write();
        f(&state.blocks)
    }

    /// Current tip, creating genesis if the ledger is empty
    pub fn last(&self) -> Block {
        self.with_blocks(|blocks| blocks[blocks.len() - 1].clone())
    }

    /// Append a sealed block that extends the tip
    ///
    /// Wrong index, wrong `previous_hash` or a hash that does not match the contents
    /// halts the ledger and returns `ChainIntegrityViolation`.
    pub fn append(&self, block: Block) -> Result<(), LedgerError> {
        let mut state = self.write();
        Self::append_locked(&mut state, block)
    }

    /// Build the next block from the tip and append it, atomically
    ///
    /// Concurrent settlement rounds serialize here, so each one extends whatever tip is
    /// current when its block is sealed.
    pub fn extend<F>(&self, build: F) -> Result<Block, LedgerError>
    where
        F: FnOnce(&Block) -> Block,
    {
        let mut state = self.write();
        if let Some(reason) = &state.halted {
            return Err(LedgerError::ChainIntegrityViolation(reason.clone()));
        }
        let tip = &state.blocks[state.blocks.len() - 1];
        let block = build(tip);
        Self::append_locked(&mut state, block.clone())?;
        Ok(block)
    }

    fn append_locked(state: &mut ChainState, block: Block) -> Result<(), LedgerError> {
        if let Some(reason) = &state.halted {
            return Err(LedgerError::ChainIntegrityViolation(reason.clone()));
        }

        let tip = &state.blocks[state.blocks.len() - 1];
        let violation = if block.index != tip.index + 1 {
            Some(format!(
                "block index {} does not follow tip index {}",
                block.index, tip.index
            ))
        } else if block.previous_hash != tip.hash {
            Some(format!(
                "block {} links to {} but tip hash is {}",
                block.index, block.previous_hash, tip.hash
            ))
        } else if !block.is_sealed() {
            Some(format!("block {} hash does not match its contents", block.index))
        } else {
            None
        };

        if let Some(reason) = violation {
            error!("Chain integrity violation, halting appends: {}", reason);
            state.halted = Some(reason.clone());
            return Err(LedgerError::ChainIntegrityViolation(reason));
        }

        state.blocks.push(block);
        Ok(())
    }

    /// Recompute every hash and check linkage from genesis
    pub fn verify_chain(&self) -> bool {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let Some(genesis) = state.blocks.first() else {
            return true;
        };
        if !genesis.is_genesis() || !genesis.is_sealed() {
            warn!("Chain audit: genesis block is invalid");
            return false;
        }

        for pair in state.blocks.windows(2) {
            let (previous, block) = (&pair[0], &pair[1]);
            if block.index != previous.index + 1
                || block.previous_hash != previous.hash
                || !block.is_sealed()
            {
                warn!("Chain audit: block {} failed verification", block.index);
                return false;
            }
        }
        true
    }

    /// Error if the ledger is halted
    pub fn ensure_writable(&self) -> Result<(), LedgerError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        match &state.halted {
            Some(reason) => Err(LedgerError::ChainIntegrityViolation(reason.clone())),
            None => Ok(()),
        }
    }

    pub fn halt_reason(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .halted
            .clone()
    }

    /// Operator override after an integrity violation has been investigated
    pub fn resume(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(reason) = state.halted.take() {
            warn!("Chain appends resumed by operator (was halted: {})", reason);
        }
    }

    /// Number of blocks including genesis
    pub fn len(&self) -> usize {
        self.with_blocks(<[Block]>::len)
    }

    pub fn get(&self, index: u64) -> Option<Block> {
        let index = usize::try_from(index).ok()?;
        self.with_blocks(|blocks| blocks.get(index).cloned())
    }

    /// Blocks in chain order, 1-based `page` of `limit` entries
    pub fn blocks(&self, page: usize, limit: usize) -> Page<Block> {
        let start = page.saturating_sub(1).saturating_mul(limit);
        self.with_blocks(|blocks| Page {
            items: blocks.iter().skip(start).take(limit).cloned().collect(),
            total: blocks.len(),
        })
    }

    /// Copy of the whole chain
    pub fn snapshot(&self) -> Vec<Block> {
        self.with_blocks(<[Block]>::to_vec)
    }

    #[cfg(test)]
    pub(crate) fn tamper(&self, index: usize, f: impl FnOnce(&mut Block)) {
        let mut state = self.write();
        f(&mut state.blocks[index]);
    }
}
