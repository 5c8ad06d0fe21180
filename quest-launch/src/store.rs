//! Client for the off-chain campaign record, the system of record shared
//! with the rest of the marketplace.

use crate::{
    campaign::{CampaignSpec, Chain},
    config::StoreConfig,
    error::{Error, Result},
};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Draft,
    Active,
}

/// Partial update; `None` fields are left untouched by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPatch {
    pub status: CampaignStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_chain_address: Option<String>,
    pub chain: Chain,
}

#[async_trait]
pub trait CampaignStore: Send + Sync {
    /// Persists `spec` as a draft and returns the canonical campaign id.
    async fn create(&self, spec: &CampaignSpec, launch_key: &str) -> Result<String>;

    /// Must be idempotent: the same patch applied twice yields the same record.
    async fn patch(&self, campaign_id: &str, patch: &CampaignPatch) -> Result<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DraftRecord<'a> {
    #[serde(flatten)]
    spec: &'a CampaignSpec,
    status: CampaignStatus,
    launch_key: &'a str,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Clone)]
pub struct HttpCampaignStore {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCampaignStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Status {
            code: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CampaignStore for HttpCampaignStore {
    async fn create(&self, spec: &CampaignSpec, launch_key: &str) -> Result<String> {
        let record = DraftRecord {
            spec,
            status: CampaignStatus::Draft,
            launch_key,
        };
        let req = self.client.post(format!("{}/campaigns", self.endpoint)).json(&record);
        let resp = Self::check(self.authorized(req).send().await?).await?;
        let created: Created = resp.json().await?;
        debug!("draft {} stored for launch {}", created.id, launch_key);
        Ok(created.id)
    }

    async fn patch(&self, campaign_id: &str, patch: &CampaignPatch) -> Result<()> {
        let req = self
            .client
            .patch(format!("{}/campaigns/{}", self.endpoint, campaign_id))
            .json(patch);
        Self::check(self.authorized(req).send().await?).await?;
        Ok(())
    }
}
