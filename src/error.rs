use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field: {0}")]
    Missing(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Failures reported by the forwarding agent. All of them are recoverable:
/// the next debounced snapshot or periodic sync re-attempts the difference.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("{0} timed out")]
    Timeout(String),

    #[error("Agent transport error: {0}")]
    Transport(String),

    #[error("Agent rejected request: {0}")]
    Rejected(String),

    #[error("Unsupported route: {0}")]
    Unsupported(String),
}

#[derive(Error, Debug)]
pub enum FibError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Fib event loop is no longer running")]
    ChannelClosed,

    #[error("Fib event loop terminated abnormally: {0}")]
    Stopped(String),
}
