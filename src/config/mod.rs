use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::amount::{AmountCodec, ETHER_DECIMALS, MAX_DECIMALS};

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const DEFAULT_CONTRACT: &str = "0xD6A2727a050f7764a528a0841fe8E6c631c93a7C";

pub const ENV_CHAIN_ID: &str = "CAMPAIGN_LEDGER_CHAIN_ID";
pub const ENV_CONTRACT: &str = "CAMPAIGN_LEDGER_CONTRACT";
pub const ENV_DECIMALS: &str = "CAMPAIGN_LEDGER_DECIMALS";
pub const ENV_SUBMIT_TIMEOUT: &str = "CAMPAIGN_LEDGER_SUBMIT_TIMEOUT_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid contract address {0:?}")]
    InvalidContractAddress(String),
    #[error("unsupported decimal exponent {0} (max {max})", max = MAX_DECIMALS)]
    UnsupportedDecimals(u32),
    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Where the ledger lives and how amounts on it are scaled.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    pub chain_id: u64,
    pub contract_address: String,
    pub decimals: u32,
    /// Caller-side bound on awaiting a submission; unset waits indefinitely.
    pub submit_timeout_secs: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            contract_address: DEFAULT_CONTRACT.to_string(),
            decimals: ETHER_DECIMALS,
            submit_timeout_secs: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|var| std::env::var(var).ok())
    }

    /// Applies overrides from any variable source, then re-validates.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_CHAIN_ID) {
            self.chain_id = parse_env(ENV_CHAIN_ID, value)?;
        }
        if let Some(value) = lookup(ENV_CONTRACT) {
            self.contract_address = value;
        }
        if let Some(value) = lookup(ENV_DECIMALS) {
            self.decimals = parse_env(ENV_DECIMALS, value)?;
        }
        if let Some(value) = lookup(ENV_SUBMIT_TIMEOUT) {
            self.submit_timeout_secs = Some(parse_env(ENV_SUBMIT_TIMEOUT, value)?);
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let hex_part = self
            .contract_address
            .strip_prefix("0x")
            .filter(|hex| hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit()));
        if hex_part.is_none() {
            return Err(ConfigError::InvalidContractAddress(
                self.contract_address.clone(),
            ));
        }
        if self.decimals > MAX_DECIMALS {
            return Err(ConfigError::UnsupportedDecimals(self.decimals));
        }
        Ok(())
    }

    pub fn codec(&self) -> Option<AmountCodec> {
        AmountCodec::new(self.decimals)
    }

    pub fn submit_timeout(&self) -> Option<Duration> {
        self.submit_timeout_secs.map(Duration::from_secs)
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
