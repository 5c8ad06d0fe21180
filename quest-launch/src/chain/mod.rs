//! Chain adapters.
//!
//! Every supported network family is driven through [`ChainAdapter`]. The
//! launch saga only ever picks an adapter and calls its operations; unit
//! conversion, contract encoding and wallet plumbing stay in here.
//!
//! Funding is split in phases so the caller can persist the transaction id
//! between signing and broadcasting. Whatever happens after
//! [`ChainAdapter::sign_create`] returns, a later run can ask the chain about
//! that exact transaction through [`ChainAdapter::find_create`] instead of
//! funding a second time.

pub mod evm;
pub mod solana;

use crate::{
    amount::TokenAmount,
    campaign::{Chain, ChainFamily},
    config::Config,
    contract::Web3Rpc,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};

pub use evm::{EvmAdapter, EvmRpc, TxReceipt};
pub use solana::{HttpWalletBridge, SignatureStatus, SolanaAdapter, SolanaWallet};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdapterError {
    #[error("WalletNotConnected: {0}")]
    WalletNotConnected(String),
    #[error("ApprovalRejected: {0}")]
    ApprovalRejected(String),
    #[error("ApprovalFailed: {0}")]
    ApprovalFailed(String),
    #[error("SubmissionRejected: {0}")]
    SubmissionRejected(String),
    #[error("SubmissionFailed: {0}")]
    SubmissionFailed(String),
}

/// Failure reported by a node or wallet backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// the wallet holder declined to sign
    #[error("rejected by wallet: {0}")]
    Rejected(String),
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateParams {
    pub campaign_id: String,
    pub token: String,
    pub amount: TokenAmount,
    pub deadline: DateTime<Utc>,
    pub max_winners: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateReceipt {
    pub tx_hash: String,
    /// account created by the campaign, for chains where it differs from the tx
    pub on_chain_address: Option<String>,
}

/// A funding transaction that is signed but possibly not yet broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedCreate {
    /// tx hash on EVM, first signature on Solana
    pub tx_hash: String,
    /// hex encoded wire transaction
    pub raw: String,
    /// account nonce the transaction consumes, on chains that have one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

/// What the chain knows about an earlier funding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// confirmed, the campaign is funded
    Landed(CreateReceipt),
    /// known to the network but not confirmed yet
    Pending,
    /// never reached the network; the same signed transaction can be sent as is
    Unsent,
    /// nothing that can still fund the campaign, a fresh transaction is safe
    Absent,
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Fails with `WalletNotConnected` unless a wallet of this chain family
    /// is attached and pointed at the right network.
    async fn ensure_wallet_ready(&self) -> Result<(), AdapterError>;

    /// Read-only. Any RPC failure reads as "not enough allowance".
    async fn check_allowance(&self, token: &str, amount: TokenAmount) -> bool;

    /// Returns once the approval is confirmed on-chain.
    async fn approve(&self, token: &str, amount: TokenAmount) -> Result<(), AdapterError>;

    /// Builds and signs the funding transaction without sending it.
    async fn sign_create(&self, params: &CreateParams) -> Result<SignedCreate, AdapterError>;

    /// Broadcasts `signed`. Sending a transaction the network already has is
    /// not an error.
    async fn broadcast_create(&self, signed: &SignedCreate) -> Result<(), AdapterError>;

    /// Waits until `tx_hash` is confirmed, bounded by the confirmation timeout.
    async fn confirm_create(
        &self,
        params: &CreateParams,
        tx_hash: &str,
    ) -> Result<CreateReceipt, AdapterError>;

    /// Read-only lookup of an earlier submission for `params`. `earlier` is
    /// the last transaction signed for it, if any.
    async fn find_create(
        &self,
        params: &CreateParams,
        earlier: Option<&SignedCreate>,
    ) -> Result<Submission, AdapterError>;
}

pub trait AdapterFactory: Send + Sync {
    fn adapter_for(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>, String>;
}

/// Builds adapters from the `chains` section of the config file.
#[derive(Debug, Clone)]
pub struct ConfiguredAdapters {
    config: Config,
    request_timeout: Duration,
}

impl ConfiguredAdapters {
    pub fn new(config: &Config, request_timeout: Duration) -> Self {
        Self {
            config: config.clone(),
            request_timeout,
        }
    }
}

impl AdapterFactory for ConfiguredAdapters {
    fn adapter_for(&self, chain: Chain) -> Result<Arc<dyn ChainAdapter>, String> {
        let chain_config = self
            .config
            .chain(chain)
            .ok_or_else(|| format!("no configuration for chain {}", chain))?;
        let confirmation = Duration::from_secs(self.config.confirmation_timeout_secs);

        match chain.family() {
            ChainFamily::Evm => {
                let rpc = Web3Rpc::connect(chain_config, self.request_timeout, confirmation)
                    .map_err(|e| e.to_string())?;
                let adapter = EvmAdapter::new(rpc, chain_config).map_err(|e| e.to_string())?;
                Ok(Arc::new(adapter))
            }
            ChainFamily::Solana => {
                let bridge = chain_config
                    .wallet_bridge
                    .as_deref()
                    .ok_or_else(|| format!("no wallet bridge for chain {}", chain))?;
                let endpoint = &chain_config.endpoint;
                let wallet = HttpWalletBridge::new(bridge, endpoint, self.request_timeout)
                    .map_err(|e| e.to_string())?;
                let adapter = SolanaAdapter::new(wallet, chain_config)
                    .map_err(|e| e.to_string())?
                    .with_confirmation(confirmation);
                Ok(Arc::new(adapter))
            }
        }
    }
}
