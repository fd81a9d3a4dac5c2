//! Application state for connection service.

use std::sync::Arc;

use common::config::{AppConfig, CONNECTION_ENV_PREFIX};
use common::metadata_store::MetadataStore;

use crate::config_store::EnvConfigStore;
use crate::harvester::Harvester;
use crate::introspect::LiveIntrospectorFactory;
use crate::registry::ConnectionRegistry;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<ConnectionRegistry>,
    pub harvester: Arc<Harvester>,
    pub metadata: Arc<MetadataStore>,
}

impl AppState {
    /// Creates a new application state backed by the environment and real drivers.
    pub fn new(config: AppConfig) -> Self {
        let factory = Arc::new(LiveIntrospectorFactory::new(config.connect_timeout()));
        let store = Arc::new(EnvConfigStore::new(CONNECTION_ENV_PREFIX, config.env_file.clone()));
        Self {
            registry: Arc::new(ConnectionRegistry::new(
                store,
                factory.clone(),
                config.connect_timeout(),
            )),
            harvester: Arc::new(Harvester::new(factory, config.harvest_timeout())),
            metadata: Arc::new(MetadataStore::new(config.metadata_dir.clone())),
            config,
        }
    }
}
