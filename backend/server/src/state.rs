use std::sync::Arc;

use tracing::info;

use super::{
    config::Config,
    error::StoreError,
    ledger::{Ledger, LedgerOptions},
    optimistic::Shadow,
    session::SessionRegistry,
    store::{self, CounterStore},
};

pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
    pub shadow: Shadow,
    pub sessions: Arc<SessionRegistry>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Arc<Self>, StoreError> {
        let store = store::open(&config).await?;

        Self::with_store(config, store).await
    }

    pub async fn with_store(
        config: Config,
        store: Arc<dyn CounterStore>,
    ) -> Result<Arc<Self>, StoreError> {
        let ledger = Ledger::new(store, LedgerOptions::from(&config));
        ledger.init().await?;

        let tally = ledger.get_counts().await?;
        info!(
            "Loaded counts: yes={} no={} epoch={}",
            tally.yes, tally.no, tally.epoch
        );

        Ok(Arc::new(Self {
            config,
            ledger,
            shadow: Shadow::new(tally),
            sessions: Arc::new(SessionRegistry::new()),
        }))
    }
}
