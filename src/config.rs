use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::storage::StorageBackend;
use crate::blockchain::{Address, FeeSchedule, LedgerParams, Treasury};

pub const CONFIG_ENV: &str = "OPENNET_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "opennet.toml";

/// Errors that can occur while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub id: String,
    /// Free-form label reported next to the pending view
    pub role: String,
    pub validators: Vec<String>,
    pub host: String,
    pub port: u16,
}

impl Default for NodeSection {
    fn default() -> Self {
        NodeSection {
            id: "node1".to_string(),
            role: "account".to_string(),
            validators: vec!["node1".to_string(), "node2".to_string(), "node3".to_string()],
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerSection {
    pub fee_rate: f64,
    pub genesis_supply: f64,
    pub treasury_address: String,
    /// Hex Ed25519 key allowed to sign faucet requests
    pub treasury_public_key: Option<String>,
}

impl Default for LedgerSection {
    fn default() -> Self {
        LedgerSection {
            fee_rate: 0.002,
            genesis_supply: 500_000_000.0,
            treasury_address: "open_treasury_001".to_string(),
            treasury_public_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Peer base URLs, e.g. `http://10.0.0.2:8000`
    pub peers: Vec<String>,
    pub peer_timeout_secs: u64,
    /// Check every block of a longer peer chain before adopting it
    pub verify_adopted_chains: bool,
    pub sync_interval_secs: Option<u64>,
}

impl Default for NetworkSection {
    fn default() -> Self {
        NetworkSection {
            peers: Vec::new(),
            peer_timeout_secs: 3,
            verify_adopted_chains: false,
            sync_interval_secs: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningSection {
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub backend: StorageBackend,
    pub path: Option<PathBuf>,
}

/// Process configuration, fixed at start
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub ledger: LedgerSection,
    pub network: NetworkSection,
    pub mining: MiningSection,
    pub storage: StorageSection,
}

impl NodeConfig {
    /// Loads the TOML file named by `OPENNET_CONFIG` (default `opennet.toml`),
    /// then applies environment overrides and validates the result.
    pub fn load() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let mut config = Self::from_file(Path::new(&path))?;
        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Applies the environment variables the node has always honoured
    ///
    /// # Arguments
    ///
    /// * `lookup` - Returns the value of a variable, if set
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("NODE_ID") {
            self.node.id = id.trim().to_string();
        }
        if let Some(validators) = lookup("VALIDATORS") {
            self.node.validators = split_list(&validators);
        }
        if let Some(role) = lookup("NODE_ROLE") {
            self.node.role = role.trim().to_string();
        }
        if let Some(peers) = lookup("PEERS") {
            self.network.peers = split_list(&peers);
        }
        if let Some(port) = lookup("PORT") {
            self.node.port = parse_value("PORT", &port)?;
        }
        if let Some(key) = lookup("TREASURY_PUBKEY") {
            self.ledger.treasury_public_key = Some(key);
        }
        if let Some(rate) = lookup("FEE_RATE") {
            self.ledger.fee_rate = parse_value("FEE_RATE", &rate)?;
        }
        if let Some(path) = lookup("LEDGER_FILE") {
            self.storage.path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id.trim().is_empty() {
            return Err(ConfigError::Invalid("node id must not be empty".to_string()));
        }
        if !(0.0..1.0).contains(&self.ledger.fee_rate) {
            return Err(ConfigError::Invalid(format!(
                "fee rate must be in [0, 1), got {}",
                self.ledger.fee_rate
            )));
        }
        if !self.ledger.genesis_supply.is_finite() || self.ledger.genesis_supply < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "genesis supply must be a non-negative number, got {}",
                self.ledger.genesis_supply
            )));
        }
        if self.ledger.treasury_address.trim().is_empty() {
            return Err(ConfigError::Invalid("treasury address must not be empty".to_string()));
        }
        if self.network.peer_timeout_secs == 0 {
            return Err(ConfigError::Invalid("peer timeout must be at least one second".to_string()));
        }
        Ok(())
    }

    /// Where the ledger snapshot lives for the configured backend
    pub fn storage_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.path {
            return path.clone();
        }

        match self.storage.backend {
            StorageBackend::Sled => PathBuf::from(format!("ledger_{}.db", self.node.id)),
            _ => PathBuf::from(format!("ledger_{}.json", self.node.id)),
        }
    }

    pub fn ledger_params(&self) -> LedgerParams {
        LedgerParams {
            node_id: self.node.id.clone(),
            fees: FeeSchedule::new(self.ledger.fee_rate, &self.node.id, &self.node.validators),
            treasury: Treasury::new(
                Address(self.ledger.treasury_address.clone()),
                self.ledger.treasury_public_key.clone(),
            ),
            genesis_supply: self.ledger.genesis_supply,
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
