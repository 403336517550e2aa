use std::sync::Arc;

use crate::agent::{self, FibAgent};
use crate::config::SyncConfig;
use crate::error::ConfigError;

/// Everything a Fib instance needs, assembled once at startup and handed to
/// the constructor.
#[derive(Debug, Clone)]
pub struct FibContext {
    pub config: SyncConfig,
    pub agent: Arc<dyn FibAgent>,
}

impl FibContext {
    pub fn new(config: SyncConfig, agent: Arc<dyn FibAgent>) -> Self {
        FibContext { config, agent }
    }

    /// Connects the agent named by the configured endpoint.
    pub async fn from_config(config: SyncConfig) -> Result<Self, ConfigError> {
        let agent = agent::connect(&config).await?;
        Ok(FibContext::new(config, agent))
    }
}
