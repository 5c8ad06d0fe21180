use crate::{
    campaign::{Chain, ChainFamily},
    error::{Error, Result},
};
use serde::{Deserialize, Serialize};
use serde_json::from_str;
use std::path::Path;

pub const DEFAULT_CONFIRMATION_TIMEOUT: u64 = 600;
pub const EVM_DEFAULT_DECIMALS: u32 = 6;
pub const SOLANA_DEFAULT_DECIMALS: u32 = 9;

#[derive(clap::Parser, Debug)]
pub struct Opts {
    /// Config file
    #[clap(short = 'c', long = "config", default_value = "config.json")]
    pub config: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    #[serde(rename = "httpListen")]
    pub http_listen: String,
    /// redis url holding launch states
    pub redis: String,
    pub store: StoreConfig,
    /// upper bound for a single wallet confirmation, seconds
    #[serde(rename = "confirmationTimeoutSecs", default = "default_confirmation_timeout")]
    pub confirmation_timeout_secs: u64,
    pub chains: Vec<ChainConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StoreConfig {
    pub endpoint: String,
    #[serde(rename = "apiKey", default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(rename = "timeoutSecs", default = "default_store_timeout")]
    pub timeout_secs: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ChainConfig {
    pub chain: Chain,
    pub endpoint: String,
    /// quest factory address on EVM chains, program id on Solana
    pub contract: String,
    #[serde(rename = "chainId", default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(rename = "tokenDecimals", default, skip_serializing_if = "Option::is_none")]
    pub token_decimals: Option<u32>,
    /// hex signer key for EVM chains
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(rename = "walletBridge", default, skip_serializing_if = "Option::is_none")]
    pub wallet_bridge: Option<String>,
    #[serde(rename = "gasLimit", default, skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

fn default_confirmation_timeout() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT
}

fn default_store_timeout() -> u64 {
    10
}

impl ChainConfig {
    pub fn decimals(&self) -> u32 {
        self.token_decimals.unwrap_or(match self.chain.family() {
            ChainFamily::Evm => EVM_DEFAULT_DECIMALS,
            ChainFamily::Solana => SOLANA_DEFAULT_DECIMALS,
        })
    }
}

impl Config {
    pub fn parse_from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let confstr = std::fs::read_to_string(file)?;
        let config: Self = from_str(&confstr)?;
        config.check()?;
        Ok(config)
    }

    pub fn chain(&self, chain: Chain) -> Option<&ChainConfig> {
        self.chains.iter().find(|c| c.chain == chain)
    }

    fn check(&self) -> Result<()> {
        for (i, c) in self.chains.iter().enumerate() {
            if self.chains[..i].iter().any(|o| o.chain == c.chain) {
                return Err(Error::Config(format!("chain {} configured twice", c.chain)));
            }
            match c.chain.family() {
                ChainFamily::Evm if c.chain_id.is_none() => {
                    return Err(Error::Config(format!("chain {} needs a chainId", c.chain)));
                }
                ChainFamily::Solana if c.wallet_bridge.is_none() => {
                    return Err(Error::Config(format!("chain {} needs a walletBridge", c.chain)));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn show() {
        let de = Self {
            http_listen: "127.0.0.1:8080".to_string(),
            redis: "redis://127.0.0.1:6379/0".to_string(),
            store: StoreConfig {
                endpoint: "http://127.0.0.1:3000/api".to_string(),
                api_key: None,
                timeout_secs: default_store_timeout(),
            },
            confirmation_timeout_secs: DEFAULT_CONFIRMATION_TIMEOUT,
            chains: vec![ChainConfig {
                chain: Chain::Base,
                endpoint: "https://mainnet.base.org".to_string(),
                contract: String::new(),
                chain_id: Some(8453),
                token_decimals: Some(EVM_DEFAULT_DECIMALS),
                secret: Some(String::new()),
                wallet_bridge: None,
                gas_limit: None,
            }],
        };
        // serializing plain data cannot fail
        println!("{}", serde_json::to_string_pretty(&de).unwrap_or_default())
    }
}
