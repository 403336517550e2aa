use derive_builder::Builder;
use serde_derive::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Kernel main routing table.
pub const DEFAULT_NETLINK_TABLE: u32 = 254;

/// On-disk daemon configuration. Every field is optional here, defaults are
/// resolved by [`Config::sync_config`].
#[derive(Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub node_name: Option<String>,
    pub agent: Option<String>,
    pub dry_run: Option<bool>,
    pub periodic_sync: Option<bool>,
    pub sync_interval_secs: Option<u64>,
    pub ordered_install: Option<bool>,
    pub wait_for_first_snapshot: Option<bool>,
    pub segment_routing: Option<bool>,
    pub debounce_min_ms: Option<u64>,
    pub debounce_max_ms: Option<u64>,
    pub agent_timeout_ms: Option<u64>,
    pub perf_history_size: Option<usize>,
    pub routes_file: Option<PathBuf>,
}

pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let c = std::fs::read_to_string(path)?;
    parse_config(&c)
}

pub fn parse_config(c: &str) -> Result<Config, ConfigError> {
    toml::from_str(c).map_err(|e| ConfigError::Parse(e.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEndpoint {
    /// In-memory forwarding plane.
    Mock,
    /// Kernel FIB, programmed into the given routing table.
    Netlink { table: u32 },
}

impl FromStr for AgentEndpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "mock" => Ok(AgentEndpoint::Mock),
            "netlink" => Ok(AgentEndpoint::Netlink {
                table: DEFAULT_NETLINK_TABLE,
            }),
            other => match other.strip_prefix("netlink:") {
                Some(table) => {
                    let table = table.parse::<u32>().map_err(|_| {
                        ConfigError::Invalid(format!("bad netlink table in agent endpoint {}", s))
                    })?;
                    Ok(AgentEndpoint::Netlink { table })
                }
                None => Err(ConfigError::Invalid(format!(
                    "unknown agent endpoint {:?}",
                    s
                ))),
            },
        }
    }
}

/// Immutable pipeline settings, fixed at startup.
#[derive(Builder, Debug, Clone, PartialEq)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SyncConfig {
    pub node_name: String,
    #[builder(default = "AgentEndpoint::Mock")]
    pub agent: AgentEndpoint,
    #[builder(default = "false")]
    pub dry_run: bool,
    #[builder(default = "true")]
    pub periodic_sync: bool,
    #[builder(default = "Duration::from_secs(60)")]
    pub sync_interval: Duration,
    #[builder(default = "false")]
    pub ordered_install: bool,
    #[builder(default = "true")]
    pub wait_for_first_snapshot: bool,
    #[builder(default = "false")]
    pub segment_routing: bool,
    #[builder(default = "Duration::from_millis(10)")]
    pub debounce_min: Duration,
    #[builder(default = "Duration::from_millis(250)")]
    pub debounce_max: Duration,
    #[builder(default = "Duration::from_secs(10)")]
    pub agent_timeout: Duration,
    #[builder(default = "10")]
    pub perf_history_size: usize,
}

impl SyncConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.node_name {
            if name.is_empty() || name.chars().any(char::is_whitespace) {
                return Err(format!("invalid node name {:?}", name));
            }
        }
        for (field, value) in [
            ("sync_interval", self.sync_interval),
            ("debounce_min", self.debounce_min),
            ("debounce_max", self.debounce_max),
            ("agent_timeout", self.agent_timeout),
        ] {
            if value == Some(Duration::ZERO) {
                return Err(format!("{} must be greater than zero", field));
            }
        }
        let min = self.debounce_min.unwrap_or(Duration::from_millis(10));
        let max = self.debounce_max.unwrap_or(Duration::from_millis(250));
        if max < min {
            return Err(format!(
                "debounce_max ({:?}) is shorter than debounce_min ({:?})",
                max, min
            ));
        }
        if self.perf_history_size == Some(0) {
            return Err("perf_history_size must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Config {
    pub fn sync_config(&self) -> Result<SyncConfig, ConfigError> {
        let node_name = self
            .node_name
            .clone()
            .ok_or_else(|| ConfigError::Missing("node_name".to_string()))?;
        let agent: AgentEndpoint = match &self.agent {
            Some(a) => a.parse()?,
            None => AgentEndpoint::Mock,
        };

        let mut builder = SyncConfigBuilder::default();
        builder.node_name(node_name).agent(agent);
        if let Some(v) = self.dry_run {
            builder.dry_run(v);
        }
        if let Some(v) = self.periodic_sync {
            builder.periodic_sync(v);
        }
        if let Some(v) = self.sync_interval_secs {
            builder.sync_interval(Duration::from_secs(v));
        }
        if let Some(v) = self.ordered_install {
            builder.ordered_install(v);
        }
        if let Some(v) = self.wait_for_first_snapshot {
            builder.wait_for_first_snapshot(v);
        }
        if let Some(v) = self.segment_routing {
            builder.segment_routing(v);
        }
        if let Some(v) = self.debounce_min_ms {
            builder.debounce_min(Duration::from_millis(v));
        }
        if let Some(v) = self.debounce_max_ms {
            builder.debounce_max(Duration::from_millis(v));
        }
        if let Some(v) = self.agent_timeout_ms {
            builder.agent_timeout(Duration::from_millis(v));
        }
        if let Some(v) = self.perf_history_size {
            builder.perf_history_size(v);
        }
        builder.build().map_err(ConfigError::Invalid)
    }
}
