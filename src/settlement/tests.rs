//! Tests for settlement rounds
//!
//! Balance movement, replay protection, per-request failure isolation, the empty block
//! policy, missing validators, halted chains (including mid-round) and concurrent
//! settlement.

#[cfg(test)]
mod tests {
    use crate::{
        Account, EmptyBlockPolicy, LedgerError, SettlementConfig, StoreError, ValidationError,
        chain::ChainLedger,
        pool::TransactionPool,
        selection::ValidatorSelector,
        settlement::{SettlementEngine, SettlementOrchestrator},
        state::{AccountStore, AccountTxn, MemoryStore, stake},
        test_support::{TestKey, signed_request},
    };
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Fixture {
        alice: TestKey,
        store: Arc<MemoryStore>,
        pool: Arc<TransactionPool>,
        chain: Arc<ChainLedger>,
        engine: Arc<SettlementEngine<MemoryStore>>,
    }

    /// alice: 100 spendable, bob: 0, val: 100 staked
    fn fixture(policy: EmptyBlockPolicy) -> Fixture {
        let alice = TestKey::new(61);
        let bob = TestKey::new(62);
        let mut validator = TestKey::new(63).account("val", 0);
        validator.staked_balance = 100;

        let store = Arc::new(MemoryStore::with_accounts([
            alice.account("alice", 100),
            bob.account("bob", 0),
            validator,
        ]));
        let pool = Arc::new(TransactionPool::new());
        let chain = Arc::new(ChainLedger::new());
        let config = SettlementConfig {
            block_reward: 50,
            empty_blocks: policy,
            interval_ms: 0,
            settle_on_submit: false,
        };
        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            pool.clone(),
            chain.clone(),
            ValidatorSelector::seeded(1),
            config,
        ));
        Fixture { alice, store, pool, chain, engine }
    }

    fn total_credit(store: &MemoryStore) -> u128 {
        store.accounts().unwrap().iter().map(Account::total_credit).sum()
    }

    impl Fixture {
        async fn submit(&self, recipient: &str, amount: u64, nonce: u64) {
            let sender = self.store.get("alice").unwrap();
            self.pool
                .submit(&sender, self.alice.submission(recipient, amount, nonce))
                .await
                .unwrap();
        }

        fn balance(&self, id: &str) -> u64 {
            self.store.get(id).unwrap().balance
        }
    }

    #[tokio::test]
    async fn test_valid_transfer_moves_credit_and_advances_nonce() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        let before = total_credit(&fx.store);
        fx.submit("bob", 30, 0).await;

        let report = fx.engine.settle_round().await.unwrap();

        assert_eq!(report.validator_id, "val");
        assert_eq!(report.validated_count(), 1);
        assert_eq!(fx.balance("alice"), 70);
        assert_eq!(fx.balance("bob"), 30);
        assert_eq!(fx.store.get("alice").unwrap().nonce, 1);
        assert_eq!(fx.balance("val"), 50);
        assert_eq!(report.reward_minted, 50);
        assert_eq!(total_credit(&fx.store), before + 50);

        let block = report.block.unwrap();
        assert_eq!(block.index, 1);
        assert_eq!(block.validator_id, "val");
        assert_eq!(block.previous_hash, fx.chain.get(0).unwrap().hash);
        assert_eq!(fx.chain.last(), block);
        assert!(fx.pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_replayed_request_fails_with_invalid_nonce() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        let sender = fx.store.get("alice").unwrap();
        let submission = fx.alice.submission("bob", 10, 0);

        fx.pool.submit(&sender, submission.clone()).await.unwrap();
        fx.engine.settle_round().await.unwrap();

        fx.pool.submit(&sender, submission).await.unwrap();
        let report = fx.engine.settle_round().await.unwrap();

        assert_eq!(
            report.outcomes[0].failure(),
            Some(&ValidationError::InvalidNonce { expected: 1, got: 0 })
        );
        assert_eq!(fx.balance("alice"), 90);
        assert_eq!(fx.balance("bob"), 10);
        assert!(report.block.is_none());
        assert_eq!(report.reward_minted, 0);
    }

    #[tokio::test]
    async fn test_failed_request_does_not_block_others() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        fx.submit("bob", 500, 0).await;
        fx.submit("bob", 40, 0).await;
        fx.submit("bob", 40, 1).await;

        let report = fx.engine.settle_round().await.unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(
            report.outcomes[0].failure(),
            Some(&ValidationError::InsufficientFunds { required: 500, available: 100 })
        );
        assert!(report.outcomes[1].is_validated());
        assert!(report.outcomes[2].is_validated());

        let block = report.block.unwrap();
        let nonces: Vec<u64> = block.transactions.iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![0, 1]);
        assert_eq!(fx.balance("alice"), 20);
        assert_eq!(fx.balance("bob"), 80);
        assert!(fx.pool.is_empty().await, "failed requests are discarded");
    }

    #[tokio::test]
    async fn test_empty_pool_skip_policy_produces_nothing() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        let before = total_credit(&fx.store);

        let report = fx.engine.settle_round().await.unwrap();

        assert!(report.block.is_none());
        assert!(report.outcomes.is_empty());
        assert_eq!(report.reward_minted, 0);
        assert_eq!(fx.chain.len(), 1);
        assert_eq!(total_credit(&fx.store), before);
    }

    #[tokio::test]
    async fn test_empty_pool_append_policy_seals_unrewarded_block() {
        let fx = fixture(EmptyBlockPolicy::Append);
        let before = total_credit(&fx.store);

        let report = fx.engine.settle_round().await.unwrap();

        let block = report.block.unwrap();
        assert!(block.transactions.is_empty());
        assert_eq!(block.index, 1);
        assert_eq!(report.reward_minted, 0);
        assert_eq!(fx.balance("val"), 0);
        assert_eq!(total_credit(&fx.store), before);
        assert!(fx.chain.verify_chain());
    }

    #[tokio::test]
    async fn test_all_failed_append_policy_seals_unrewarded_block() {
        let fx = fixture(EmptyBlockPolicy::Append);
        fx.submit("bob", 1_000, 0).await;

        let report = fx.engine.settle_round().await.unwrap();

        assert_eq!(report.failed_count(), 1);
        assert!(report.block.unwrap().transactions.is_empty());
        assert_eq!(report.reward_minted, 0);
    }

    #[tokio::test]
    async fn test_no_validator_leaves_pool_untouched_until_stake_arrives() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        fx.store
            .transact(&["val"], |txn| txn.get_mut("val").unwrap().staked_balance = 0)
            .unwrap();
        fx.submit("bob", 10, 0).await;
        fx.submit("bob", 10, 1).await;
        let pooled = fx.pool.snapshot().await;

        let err = fx.engine.settle_round().await.unwrap_err();
        assert!(matches!(err, LedgerError::NoValidatorAvailable));
        assert!(err.is_retryable());
        assert_eq!(fx.pool.snapshot().await, pooled);
        assert_eq!(fx.balance("alice"), 100);
        assert_eq!(fx.chain.len(), 1);

        fx.store
            .transact(&["val"], |txn| txn.get_mut("val").unwrap().staked_balance = 10)
            .unwrap();
        let report = fx.engine.settle_round().await.unwrap();
        assert_eq!(report.validated_count(), 2);
        assert_eq!(fx.balance("bob"), 20);
    }

    #[tokio::test]
    async fn test_halted_chain_refuses_round_before_draining() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        fx.submit("bob", 10, 0).await;
        let stale = crate::Block::genesis(0);
        assert!(fx.chain.append(stale).is_err());

        let err = fx.engine.settle_round().await.unwrap_err();
        assert!(matches!(err, LedgerError::ChainIntegrityViolation(_)));
        assert_eq!(fx.pool.len().await, 1);
        assert_eq!(fx.balance("alice"), 100);
    }

    #[tokio::test]
    async fn test_unknown_recipient_is_a_request_failure() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        fx.submit("ghost", 10, 0).await;

        let report = fx.engine.settle_round().await.unwrap();
        assert_eq!(
            report.outcomes[0].failure(),
            Some(&ValidationError::UnknownAccount { account: "ghost".into() })
        );
        assert_eq!(fx.balance("alice"), 100);
    }

    #[tokio::test]
    async fn test_validator_spending_and_reward_in_same_round() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        stake(fx.store.as_ref(), "alice", 50).unwrap();
        fx.store
            .transact(&["val"], |txn| txn.get_mut("val").unwrap().staked_balance = 0)
            .unwrap();
        fx.submit("bob", 50, 0).await;

        let report = fx.engine.settle_round().await.unwrap();
        assert_eq!(report.validator_id, "alice");
        assert_eq!(fx.balance("alice"), 50);
        assert_eq!(fx.store.get("alice").unwrap().staked_balance, 50);
    }

    #[test]
    fn test_concurrent_applies_of_overdrawing_pair_settle_once() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        let requests = [
            signed_request(&fx.alice, "alice", "bob", 60, 0),
            signed_request(&fx.alice, "alice", "bob", 60, 0),
        ];

        let outcomes: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|request| {
                    let engine = fx.engine.clone();
                    scope.spawn(move || engine.apply_request(request).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(outcomes.iter().filter(|o| o.is_validated()).count(), 1);
        let failure = outcomes.iter().find_map(|o| o.failure()).unwrap();
        assert_eq!(failure, &ValidationError::InvalidNonce { expected: 1, got: 0 });
        assert_eq!(fx.balance("alice"), 40);
        assert_eq!(fx.balance("bob"), 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rounds_never_double_spend() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        fx.submit("bob", 60, 0).await;
        fx.submit("bob", 60, 1).await;

        let (a, b) = tokio::join!(
            {
                let engine = fx.engine.clone();
                tokio::spawn(async move { engine.settle_round().await })
            },
            {
                let engine = fx.engine.clone();
                tokio::spawn(async move { engine.settle_round().await })
            }
        );
        let reports = [a.unwrap().unwrap(), b.unwrap().unwrap()];

        let validated: usize = reports.iter().map(|r| r.validated_count()).sum();
        let failed: Vec<_> = reports
            .iter()
            .flat_map(|r| r.outcomes.iter().filter_map(|o| o.failure()))
            .collect();
        assert_eq!(validated, 1);
        assert_eq!(
            failed,
            vec![&ValidationError::InsufficientFunds { required: 60, available: 40 }]
        );
        assert_eq!(fx.balance("alice"), 40);
        assert!(fx.chain.verify_chain());
    }

    #[tokio::test]
    async fn test_orchestrator_tick_skips_empty_pool() {
        let fx = fixture(EmptyBlockPolicy::Append);
        let orchestrator = SettlementOrchestrator::new(fx.engine.clone(), fx.pool.clone(), 10);
        assert!(orchestrator.tick().await.is_none());
        assert_eq!(fx.chain.len(), 1);

        fx.submit("bob", 5, 0).await;
        let report = orchestrator.tick().await.unwrap().unwrap();
        assert_eq!(report.validated_count(), 1);
        assert_eq!(fx.chain.len(), 2);
    }

    /// Store whose transfers touching `broken` fail as if the backend went away
    struct FlakyStore {
        inner: MemoryStore,
        broken: &'static str,
    }

    impl AccountStore for FlakyStore {
        fn get(&self, id: &str) -> Result<Account, StoreError> {
            self.inner.get(id)
        }

        fn accounts(&self) -> Result<Vec<Account>, StoreError> {
            self.inner.accounts()
        }

        fn insert(&self, account: Account) -> Result<(), StoreError> {
            self.inner.insert(account)
        }

        fn transact<R, F>(&self, ids: &[&str], f: F) -> Result<R, StoreError>
        where
            F: FnOnce(&mut AccountTxn) -> R,
        {
            if ids.len() > 1 && ids.contains(&self.broken) {
                return Err(StoreError::Poisoned);
            }
            self.inner.transact(ids, f)
        }
    }

    #[tokio::test]
    async fn test_store_failure_requeues_unapplied_requests_in_order() {
        let alice = TestKey::new(64);
        let mut validator = TestKey::new(65).account("val", 0);
        validator.staked_balance = 10;
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::with_accounts([
                alice.account("alice", 100),
                TestKey::new(66).account("bob", 0),
                validator,
            ]),
            broken: "val",
        });
        let pool = Arc::new(TransactionPool::new());
        let chain = Arc::new(ChainLedger::new());
        let engine = SettlementEngine::new(
            store.clone(),
            pool.clone(),
            chain.clone(),
            ValidatorSelector::seeded(2),
            SettlementConfig { settle_on_submit: false, ..SettlementConfig::default() },
        );

        let sender = store.get("alice").unwrap();
        for (recipient, nonce) in [("bob", 0), ("val", 1), ("bob", 2)] {
            pool.submit(&sender, alice.submission(recipient, 10, nonce)).await.unwrap();
        }

        let report = engine.settle_round().await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].is_validated());
        assert_eq!(report.block.unwrap().transactions.len(), 1);
        assert_eq!(report.reward_minted, 50);

        let pooled: Vec<u64> = pool.snapshot().await.iter().map(|r| r.nonce).collect();
        assert_eq!(pooled, vec![1, 2]);
        assert_eq!(store.get("alice").unwrap().balance, 90);
        assert_eq!(store.get("alice").unwrap().nonce, 1);
    }

    #[tokio::test]
    async fn test_zero_amount_and_self_transfers_never_settle_or_mint() {
        let fx = fixture(EmptyBlockPolicy::Skip);
        let sender = fx.store.get("alice").unwrap();

        fx.pool.submit(&sender, fx.alice.submission("bob", 0, 0)).await.unwrap();
        let zero = fx.engine.settle_round().await.unwrap();
        assert_eq!(zero.outcomes[0].failure(), Some(&ValidationError::ZeroAmount));
        assert!(zero.block.is_none());
        assert_eq!(zero.reward_minted, 0);

        fx.pool.submit(&sender, fx.alice.submission("alice", 5, 0)).await.unwrap();
        let to_self = fx.engine.settle_round().await.unwrap();
        assert_eq!(
            to_self.outcomes[0].failure(),
            Some(&ValidationError::SelfTransfer { account: "alice".into() })
        );
        assert!(to_self.block.is_none());
        assert_eq!(to_self.reward_minted, 0);

        assert_eq!(fx.balance("val"), 0);
        assert_eq!(fx.balance("alice"), 100);
        assert_eq!(fx.store.get("alice").unwrap().nonce, 0);
        assert_eq!(fx.chain.len(), 1);
    }

    /// Store that halts the chain from inside the first transfer it applies
    struct HaltingStore {
        inner: MemoryStore,
        chain: Arc<ChainLedger>,
        armed: AtomicBool,
    }

    impl AccountStore for HaltingStore {
        fn get(&self, id: &str) -> Result<Account, StoreError> {
            self.inner.get(id)
        }

        fn accounts(&self) -> Result<Vec<Account>, StoreError> {
            self.inner.accounts()
        }

        fn insert(&self, account: Account) -> Result<(), StoreError> {
            self.inner.insert(account)
        }

        fn transact<R, F>(&self, ids: &[&str], f: F) -> Result<R, StoreError>
        where
            F: FnOnce(&mut AccountTxn) -> R,
        {
            if ids.len() > 1 && self.armed.swap(false, Ordering::SeqCst) {
                let _ = self.chain.append(crate::Block::genesis(0));
            }
            self.inner.transact(ids, f)
        }
    }

    #[tokio::test]
    async fn test_transfers_applied_before_a_halt_are_recorded_once_after_resume() {
        let alice = TestKey::new(67);
        let mut validator = TestKey::new(68).account("val", 0);
        validator.staked_balance = 10;
        let chain = Arc::new(ChainLedger::new());
        let store = Arc::new(HaltingStore {
            inner: MemoryStore::with_accounts([
                alice.account("alice", 100),
                TestKey::new(69).account("bob", 0),
                validator,
            ]),
            chain: chain.clone(),
            armed: AtomicBool::new(true),
        });
        let pool = Arc::new(TransactionPool::new());
        let engine = SettlementEngine::new(
            store.clone(),
            pool.clone(),
            chain.clone(),
            ValidatorSelector::seeded(4),
            SettlementConfig { settle_on_submit: false, ..SettlementConfig::default() },
        );
        let sender = store.get("alice").unwrap();
        let request = pool.submit(&sender, alice.submission("bob", 30, 0)).await.unwrap();

        let err = engine.settle_round().await.unwrap_err();
        assert!(err.is_chain_halt());
        let LedgerError::RoundIncomplete { report, .. } = err else {
            panic!("expected an incomplete round");
        };
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].is_validated());
        assert!(report.block.is_none());
        assert_eq!(report.reward_minted, 0);

        // Applied and held for the next block, not lost
        assert_eq!(store.get("alice").unwrap().balance, 70);
        assert_eq!(store.get("bob").unwrap().balance, 30);
        assert_eq!(engine.unsealed(), vec![request.clone()]);
        assert!(pool.is_empty().await);

        // Still halted: nothing moves
        assert!(engine.settle_round().await.unwrap_err().is_chain_halt());
        assert_eq!(engine.unsealed().len(), 1);

        chain.resume();
        let orchestrator = SettlementOrchestrator::new(Arc::new(engine), pool.clone(), 10);
        let report = orchestrator.tick().await.unwrap().unwrap();
        let block = report.block.unwrap();
        assert_eq!(block.transactions, vec![request]);
        assert_eq!(report.reward_minted, 50);

        assert!(orchestrator.tick().await.is_none());
        let recorded = chain
            .snapshot()
            .iter()
            .flat_map(|b| b.transactions.iter())
            .filter(|t| t.sender_id == "alice")
            .count();
        assert_eq!(recorded, 1);
        assert_eq!(store.get("alice").unwrap().balance, 70);
    }
}
