use std::sync::Arc;

use crate::api::ApiClient;
use crate::config::{self, AppConfig};
use crate::session::{RecordingNavigator, SessionManager};
use crate::store::FileStore;
use crate::sync::DashboardSync;

/// Everything a command needs, wired over the on-disk session store.
pub struct CliContext {
    pub config: AppConfig,
    pub navigator: RecordingNavigator,
    pub session: SessionManager,
    pub api: ApiClient,
}

impl CliContext {
    pub fn from_env() -> anyhow::Result<Self> {
        let store = FileStore::in_state_dir()?;
        tracing::debug!("Using session store at {}", store.path().display());
        Self::new(config::config().clone(), store)
    }

    pub fn new(config: AppConfig, store: FileStore) -> anyhow::Result<Self> {
        let navigator = RecordingNavigator::new();
        let session = SessionManager::new(Arc::new(store), Arc::new(navigator.clone()));
        let api = ApiClient::new(&config.api, session.clone())?;

        Ok(Self {
            config,
            navigator,
            session,
            api,
        })
    }

    /// A sync engine over this context's client. Auto-refresh follows the
    /// `auto_refresh` argument rather than the configured default.
    pub fn dashboard(&self, auto_refresh: bool) -> DashboardSync {
        let mut sync_config = self.config.sync.clone();
        sync_config.auto_refresh = auto_refresh;
        DashboardSync::new(Arc::new(self.api.clone()), &sync_config)
    }
}
