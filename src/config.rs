use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:30000";
pub const DEFAULT_SNAPSHOT_PATH: &str = "db.json";

pub const BIND_ADDR_ENV: &str = "MEDREG_BIND_ADDR";
pub const SNAPSHOT_PATH_ENV: &str = "MEDREG_SNAPSHOT_PATH";

/// Registry service configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Address the HTTP interface listens on
    pub bind_addr: SocketAddr,

    /// File the registry snapshot is loaded from and saved to
    pub snapshot_path: PathBuf,
}

impl RegistryConfig {
    /// Read `MEDREG_BIND_ADDR` and `MEDREG_SNAPSHOT_PATH`, falling back to
    /// the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(BIND_ADDR_ENV) {
            config.bind_addr = raw
                .parse::<SocketAddr>()
                .with_context(|| format!("{BIND_ADDR_ENV} must be a valid host:port, got {raw:?}"))?;
        }
        if let Some(raw) = lookup(SNAPSHOT_PATH_ENV) {
            config.snapshot_path = PathBuf::from(raw);
        }

        Ok(config)
    }

    /// Set the listen address
    pub fn bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }

    /// Set the snapshot file
    pub fn snapshot_path(mut self, snapshot_path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = snapshot_path.into();
        self
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 30000)),
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
        }
    }
}
