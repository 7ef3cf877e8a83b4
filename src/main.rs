use credit_ledger::{
    Account, LedgerService,
    api::Server,
    config::Config,
    selection::ValidatorSelector,
    settlement::SettlementOrchestrator,
    state::MemoryStore,
};
use std::sync::Arc;
use tracing::info;

/// The main entry point for the ledger node.
///
/// Initializes logging, loads the configuration, seeds the genesis accounts,
/// starts the periodic settlement loop in the background and serves the API.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load("config/default.toml")?;
    info!("Ledger starting with config: {:?}", config);

    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(LedgerService::new(store, &config, ValidatorSelector::new()));

    for genesis in &config.genesis_accounts {
        let mut account = Account::new(&genesis.id, &genesis.public_key, genesis.balance);
        account.staked_balance = genesis.staked_balance;
        service.seed(account)?;
        info!("Seeded account {} ({} staked)", genesis.id, genesis.staked_balance);
    }

    // A zero interval leaves settlement to submissions and explicit `settle` calls
    if config.settlement.interval_ms > 0 {
        let orchestrator = SettlementOrchestrator::new(
            service.engine(),
            service.pool(),
            config.settlement.interval_ms,
        );
        tokio::spawn(async move {
            if let Err(e) = orchestrator.start().await {
                tracing::error!("Settlement loop error: {:?}", e);
            }
        });
        info!("Settlement loop started");
    }

    let server = Server::new(config, service);
    server.start().await?;

    Ok(())
}
