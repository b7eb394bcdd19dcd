use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};
use shared::protocol::{META_HANDLE, WILDCARD};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Name of this watchdog instance on the bus
    pub name: String,
    pub broker: BrokerConfig,
    pub meta: MetaConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetaConfig {
    pub topic: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_probe_interval")]
    pub identity_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub handle: String,
    pub topic: String,
    #[serde(default, rename = "watch")]
    pub watches: Vec<WatchConfig>,
}

/// Signal suffixes one watch group listens for
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    pub group: String,
    pub request: String,
    pub success: String,
    pub error: String,
}

fn default_listen() -> String {
    "[::]:9090".to_string()
}

fn default_probe_interval() -> u64 {
    60
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_probe_interval(),
            identity_interval_secs: default_probe_interval(),
        }
    }
}

impl ProbeConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn identity_interval(&self) -> Duration {
        Duration::from_secs(self.identity_interval_secs)
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.probe.heartbeat_interval_secs == 0 || self.probe.identity_interval_secs == 0 {
            bail!("probe intervals must be at least one second");
        }

        let mut handles = HashSet::new();
        for service in &self.services {
            let handle = service.handle.as_str();
            if handle.is_empty() {
                bail!("service handle must not be empty");
            }
            if handle == META_HANDLE || handle == WILDCARD {
                bail!("service handle {:?} is reserved", handle);
            }
            if !handles.insert(handle) {
                bail!("duplicate service handle {:?}", handle);
            }

            let mut groups = HashSet::new();
            for watch in &service.watches {
                if !groups.insert(watch.group.as_str()) {
                    bail!("duplicate watch group {:?} in service {:?}", watch.group, handle);
                }
                if watch.request.is_empty() || watch.success.is_empty() || watch.error.is_empty() {
                    bail!("watch group {:?} in service {:?} has an empty pattern", watch.group, handle);
                }
                // A shared suffix would always match the earlier pattern
                if watch.request == watch.success
                    || watch.request == watch.error
                    || watch.success == watch.error
                {
                    bail!("watch group {:?} in service {:?} reuses a pattern", watch.group, handle);
                }
            }
        }

        Ok(())
    }

    /// Route table mapping handle to topic, used by the bus transport
    pub fn routes(&self) -> BTreeMap<String, String> {
        let mut routes = BTreeMap::from([(META_HANDLE.to_string(), self.meta.topic.clone())]);
        for service in &self.services {
            routes.insert(service.handle.clone(), service.topic.clone());
        }
        routes
    }
}
