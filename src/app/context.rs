use std::sync::Arc;

use crate::app::error::Result;
use crate::backend::auth::SupabaseAuth;
use crate::backend::realtime::RealtimeFeed;
use crate::backend::rest::RestTable;
use crate::backend::session_store::SessionStore;
use crate::backend::Backend;
use crate::config::BackendConfig;

pub struct AppContext {
    pub config: BackendConfig,
    pub auth: Arc<SupabaseAuth>,
    pub backend: Backend,
}

impl AppContext {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let store = SessionStore::new(SessionStore::default_path()?);
        Self::with_session_store(config, store)
    }

    pub fn with_session_store(config: &BackendConfig, store: SessionStore) -> Result<Self> {
        config.validate()?;

        let auth = Arc::new(SupabaseAuth::new(config.clone(), store)?);
        let backend = Backend {
            auth: auth.clone(),
            table: Arc::new(RestTable::new(config.clone())?),
            feed: Arc::new(RealtimeFeed::new(config.clone())),
        };

        Ok(Self {
            config: config.clone(),
            auth,
            backend,
        })
    }
}
