pub mod block;
pub mod check;
pub mod release;
pub mod run;

use anyhow::Context as _;
use rollgate_core::RollgateConfig;
use rollgate_state::StateStore;

/// Shared state for command handlers.
pub struct Context {
    pub config: RollgateConfig,
}

impl Context {
    pub fn new(config: RollgateConfig) -> Self {
        Self { config }
    }

    /// Open the store under the configured data directory, creating it if needed.
    pub fn store(&self) -> anyhow::Result<StateStore> {
        let data_dir = &self.config.store.data_dir;
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;
        let store = StateStore::open(&self.config.store.db_path())?
            .with_event_retention(self.config.store.event_retention);
        Ok(store)
    }
}
