//! Engine configuration
//!
//! Values come from the process environment (optionally seeded from a `.env` file)
//! and can be overridden with the `with_*` builders.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ChainError, Result};
use crate::network::ports::DEFAULT_BASE_PORT;

pub const PRODUCT_NAME: &str = "devnet-express";

const DATA_ROOT_VAR: &str = "DEVNET_DATA_ROOT";
const LOCK_DIR_VAR: &str = "DEVNET_LOCK_DIR";
const RPC_TIMEOUT_VAR: &str = "DEVNET_RPC_TIMEOUT_SECS";
const BASE_PORT_VAR: &str = "DEVNET_BASE_PORT";

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root under which every network keeps its node data directories
    pub data_root: PathBuf,
    /// Directory holding the per-node runtime guard lock files
    pub lock_dir: PathBuf,
    pub rpc_timeout: Duration,
    pub base_port: u16,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            data_root: default_data_root(),
            lock_dir: env::temp_dir().join(format!("{}-locks", PRODUCT_NAME)),
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            base_port: DEFAULT_BASE_PORT,
        }
    }
}

impl EngineConfig {
    /// Build the configuration from environment variables, loading `.env` first.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = EngineConfig::default();
        if let Ok(root) = env::var(DATA_ROOT_VAR) {
            config.data_root = PathBuf::from(root);
        }
        if let Ok(dir) = env::var(LOCK_DIR_VAR) {
            config.lock_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = env::var(RPC_TIMEOUT_VAR) {
            let secs = secs.trim().parse::<u64>().map_err(|e| ChainError::InvalidSetting {
                name: RPC_TIMEOUT_VAR,
                reason: e.to_string(),
            })?;
            config.rpc_timeout = Duration::from_secs(secs);
        }
        if let Ok(port) = env::var(BASE_PORT_VAR) {
            config.base_port = parse_base_port(&port)?;
        }

        tracing::debug!(
            data_root = %config.data_root.display(),
            lock_dir = %config.lock_dir.display(),
            rpc_timeout_secs = config.rpc_timeout.as_secs(),
            base_port = config.base_port,
            "Engine configuration loaded"
        );
        Ok(config)
    }

    pub fn with_data_root(mut self, root: impl AsRef<Path>) -> Self {
        self.data_root = root.as_ref().to_path_buf();
        self
    }

    pub fn with_lock_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.lock_dir = dir.as_ref().to_path_buf();
        self
    }

    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_base_port(mut self, port: u16) -> Self {
        self.base_port = port;
        self
    }

    /// Directory holding all node data of the network identified by `magic`.
    pub fn network_root(&self, magic: u32) -> PathBuf {
        self.data_root.join(magic.to_string())
    }
}

fn default_data_root() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(format!(".{}", PRODUCT_NAME))
        .join("blockchain-nodes")
}

fn parse_base_port(value: &str) -> Result<u16> {
    let port = value.trim().parse::<u16>().map_err(|e| ChainError::InvalidSetting {
        name: BASE_PORT_VAR,
        reason: e.to_string(),
    })?;
    // every index block must fit below 65535
    if port < 1024 || port > u16::MAX - 7_000 {
        return Err(ChainError::InvalidSetting {
            name: BASE_PORT_VAR,
            reason: format!("{} leaves no room for seven port blocks", port),
        });
    }
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.base_port, 49152);
        assert_eq!(config.rpc_timeout, Duration::from_secs(10));
        assert!(config.data_root.ends_with("blockchain-nodes"));
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::default()
            .with_data_root("/tmp/data")
            .with_lock_dir("/tmp/locks")
            .with_rpc_timeout(Duration::from_secs(2))
            .with_base_port(40000);
        assert_eq!(config.data_root, PathBuf::from("/tmp/data"));
        assert_eq!(config.lock_dir, PathBuf::from("/tmp/locks"));
        assert_eq!(config.rpc_timeout, Duration::from_secs(2));
        assert_eq!(config.base_port, 40000);
        assert_eq!(config.network_root(42), PathBuf::from("/tmp/data/42"));
    }

    #[test]
    fn test_parse_base_port() {
        assert_eq!(parse_base_port("49152").unwrap(), 49152);
        assert!(parse_base_port("not-a-port").is_err());
        assert!(parse_base_port("80").is_err());
        assert!(parse_base_port("65000").is_err());
    }
}
