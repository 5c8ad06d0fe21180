use crate::amount::TokenAmount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;

/// Networks a quest can be funded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Chain {
    Ethereum,
    Base,
    BaseSepolia,
    Solana,
    SolanaDevnet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Evm,
    Solana,
}

impl Chain {
    pub const ALL: [Chain; 5] = [
        Chain::Ethereum,
        Chain::Base,
        Chain::BaseSepolia,
        Chain::Solana,
        Chain::SolanaDevnet,
    ];

    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Ethereum | Chain::Base | Chain::BaseSepolia => ChainFamily::Evm,
            Chain::Solana | Chain::SolanaDevnet => ChainFamily::Solana,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Base => "base",
            Chain::BaseSepolia => "base-sepolia",
            Chain::Solana => "solana",
            Chain::SolanaDevnet => "solana-devnet",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Chain {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.to_lowercase();
        Chain::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| {
                format!(
                    "Invalid chain {}: ethereum, base, base-sepolia, solana and solana-devnet \
                     are supported",
                    s
                )
            })
    }
}

/// Validated input to a launch. Immutable once a launch has started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignSpec {
    pub chain: Chain,
    /// ERC-20 contract address or SPL mint
    pub token: String,
    /// Total reward pool in human units
    pub amount: TokenAmount,
    pub deadline: DateTime<Utc>,
    pub max_winners: u32,
    pub creator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("reward amount must be greater than zero")]
    ZeroAmount,
    #[error("max winners must be at least 1")]
    NoWinners,
    #[error("deadline {0} is not in the future")]
    DeadlinePassed(DateTime<Utc>),
    #[error("missing {0}")]
    Missing(&'static str),
}

impl CampaignSpec {
    pub fn validate(&self, now: DateTime<Utc>) -> std::result::Result<(), SpecError> {
        if self.token.trim().is_empty() {
            return Err(SpecError::Missing("token"));
        }
        if self.creator.trim().is_empty() {
            return Err(SpecError::Missing("creator"));
        }
        if self.amount.is_zero() {
            return Err(SpecError::ZeroAmount);
        }
        if self.max_winners == 0 {
            return Err(SpecError::NoWinners);
        }
        if self.deadline <= now {
            return Err(SpecError::DeadlinePassed(self.deadline));
        }
        Ok(())
    }

    /// Key under which the launch state of this spec is persisted. A
    /// caller-supplied idempotency key wins; otherwise it is derived from the
    /// immutable fields so an identical resubmission resumes the same launch.
    pub fn launch_key(&self) -> String {
        if let Some(key) = self.idempotency_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return key.trim().to_string();
        }
        let mut hasher = Keccak256::new();
        let parts = [
            self.creator.clone(),
            self.chain.to_string(),
            self.token.clone(),
            self.amount.to_string(),
            self.deadline.timestamp().to_string(),
            self.max_winners.to_string(),
            self.title.clone().unwrap_or_default(),
        ];
        for part in parts.iter() {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }
}
