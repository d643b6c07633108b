//! Daemon configuration with builder pattern

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::network::{MAX_LINK_NAME, NAME_SUFFIX_RESERVED};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Idle interfaces the reconciler keeps warm
    pub min_idle: usize,
    /// Idle interfaces beyond this are deleted
    pub max_idle: usize,
    /// Hard cap on interfaces the daemon will own at once
    pub capacity: usize,
    /// Name prefix for pool-owned host interfaces
    pub veth_prefix: String,
    /// Directory holding resource-to-sandbox binding records
    pub state_dir: PathBuf,
    /// Default wait before an acquire gives up
    pub acquire_timeout_secs: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            min_idle: 2,
            max_idle: 5,
            capacity: 10,
            veth_prefix: "veth".to_string(),
            state_dir: PathBuf::from("/var/lib/veth-kube"),
            acquire_timeout_secs: 30,
        }
    }
}

impl DaemonConfig {
    pub fn builder() -> DaemonConfigBuilder {
        DaemonConfigBuilder::default()
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.min_idle > self.max_idle || self.max_idle > self.capacity {
            return Err(crate::Error::Config(format!(
                "pool bounds must satisfy min_idle <= max_idle <= capacity, got {}/{}/{}",
                self.min_idle, self.max_idle, self.capacity
            )));
        }
        if self.veth_prefix.is_empty()
            || self.veth_prefix.len() + NAME_SUFFIX_RESERVED > MAX_LINK_NAME
        {
            return Err(crate::Error::Config(format!(
                "veth_prefix must be 1..={} chars",
                MAX_LINK_NAME - NAME_SUFFIX_RESERVED
            )));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(crate::Error::Config("state_dir cannot be empty".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct DaemonConfigBuilder {
    config: DaemonConfig,
}

impl DaemonConfigBuilder {
    pub fn min_idle(mut self, n: usize) -> Self {
        self.config.min_idle = n;
        self
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.config.max_idle = n;
        self
    }

    pub fn capacity(mut self, n: usize) -> Self {
        self.config.capacity = n;
        self
    }

    pub fn veth_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.veth_prefix = prefix.into();
        self
    }

    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.state_dir = dir.into();
        self
    }

    pub fn acquire_timeout_secs(mut self, secs: u64) -> Self {
        self.config.acquire_timeout_secs = secs;
        self
    }

    pub fn build(self) -> DaemonConfig {
        self.config
    }

    pub fn build_validated(self) -> crate::Result<DaemonConfig> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}
