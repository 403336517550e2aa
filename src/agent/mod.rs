// File: src/agent/mod.rs
//
// Forwarding agent interface and the client the Fib pipeline drives it
// through.

mod client;
mod mock;
#[cfg(feature = "netlink")]
mod netlink;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::config::{AgentEndpoint, SyncConfig};
use crate::error::{AgentError, ConfigError};
use crate::route::{Prefix, UnicastRoute};

pub use client::{AgentClient, AgentHealth, AgentStats};
pub use mock::{AgentCall, MockAgent};
#[cfg(feature = "netlink")]
pub use netlink::NetlinkAgent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentOp {
    AddRoutes,
    DeleteRoutes,
    SyncRoutes,
}

impl fmt::Display for AgentOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AgentOp::AddRoutes => write!(f, "addRoutes"),
            AgentOp::DeleteRoutes => write!(f, "deleteRoutes"),
            AgentOp::SyncRoutes => write!(f, "syncRoutes"),
        }
    }
}

/// The forwarding plane as seen by the Fib. Each call either succeeds as a
/// whole or fails, in which case the resulting plane state is unknown.
///
/// `add_routes` replaces any existing entry for the same prefix.
#[async_trait]
pub trait FibAgent: Send + Sync + fmt::Debug {
    async fn add_routes(&self, routes: Vec<UnicastRoute>) -> Result<(), AgentError>;

    async fn delete_routes(&self, prefixes: Vec<Prefix>) -> Result<(), AgentError>;

    /// Replaces the whole table with `routes`.
    async fn sync_routes(&self, routes: Vec<UnicastRoute>) -> Result<(), AgentError>;
}

/// Creates the agent named by the configured endpoint.
pub async fn connect(config: &SyncConfig) -> Result<Arc<dyn FibAgent>, ConfigError> {
    match &config.agent {
        AgentEndpoint::Mock => {
            log::info!("using in-memory forwarding agent");
            Ok(Arc::new(MockAgent::new()))
        }
        #[cfg(feature = "netlink")]
        AgentEndpoint::Netlink { table } => {
            log::info!("using netlink forwarding agent on table {}", table);
            let agent = NetlinkAgent::connect(*table)
                .map_err(|e| ConfigError::Invalid(format!("netlink agent: {}", e)))?;
            Ok(Arc::new(agent))
        }
        #[cfg(not(feature = "netlink"))]
        AgentEndpoint::Netlink { .. } => Err(ConfigError::Invalid(
            "netlink agent requested but ufibd was built without the netlink feature".to_string(),
        )),
    }
}
