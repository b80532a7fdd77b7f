use crate::network::SyncConfig;
use anyhow::Context;
use crate::serde_helpers::address;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub ws_url: String,
    pub operator_url: String,
    #[serde(with = "address")]
    pub contract_address: Address,
    /// Seconds without a message before pinging
    pub message_timeout: u64,
    pub ping_timeout: u64,
    pub reconnect_delay: u64,
    pub message_error_delay: u64,
    pub wallets: Vec<WalletConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WalletConfig {
    #[serde(with = "address")]
    pub wallet: Address,
    #[serde(with = "address")]
    pub token: Address,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_url: "wss://rinkeby.liquidity.network/ws/".to_string(),
            operator_url: "https://rinkeby.liquidity.network".to_string(),
            contract_address: Address::zero(),
            message_timeout: 30,
            ping_timeout: 10,
            reconnect_delay: 20,
            message_error_delay: 5,
            wallets: vec![],
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            ws_url: self.ws_url.clone(),
            message_timeout: Duration::from_secs(self.message_timeout),
            ping_timeout: Duration::from_secs(self.ping_timeout),
            reconnect_delay: Duration::from_secs(self.reconnect_delay),
            message_error_delay: Duration::from_secs(self.message_error_delay),
        }
    }
}
