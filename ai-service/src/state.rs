//! Application state for ai service.

use std::sync::Arc;

use common::config::AppConfig;
use common::errors::AppResult;
use common::metadata_store::MetadataStore;

use crate::llm::{HttpLlmClient, LlmClient, LlmConfig};
use crate::service::{GenerationService, SqlGenerator};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_config: LlmConfig,
    pub metadata: Arc<MetadataStore>,
    pub generator: Arc<SqlGenerator>,
}

impl AppState {
    /// Creates a new application state backed by the provider HTTP APIs.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let llm_config = LlmConfig::from_env();
        let client = HttpLlmClient::new(llm_config.clone(), config.llm_timeout())?;
        Ok(Self::with_llm(config, llm_config, Arc::new(client)))
    }

    pub fn with_llm(config: AppConfig, llm_config: LlmConfig, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            metadata: Arc::new(MetadataStore::new(config.metadata_dir.clone())),
            generator: Arc::new(SqlGenerator::new(llm, config.llm_timeout())),
            llm_config,
            config,
        }
    }

    pub fn generation_service(&self) -> GenerationService {
        GenerationService::new(
            self.metadata.clone(),
            self.generator.clone(),
            self.config.context_budget_chars,
        )
    }
}
