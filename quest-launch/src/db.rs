use crate::{error::Result, saga::LaunchState};
use async_trait::async_trait;
use derive_more::Display;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use tokio::sync::Mutex;

const STATE_PREFIX: &str = "quest:launch:";
const CAMPAIGN_PREFIX: &str = "quest:campaign:";

/// Durable home of [`LaunchState`], so a retry survives a restart.
#[async_trait]
pub trait LaunchStateRepo: Send + Sync {
    async fn load(&self, launch_key: &str) -> Result<Option<LaunchState>>;

    async fn find_by_campaign(&self, campaign_id: &str) -> Result<Option<LaunchState>>;

    async fn save(&self, state: &LaunchState) -> Result<()>;
}

#[derive(Debug, Display)]
#[display(fmt = "redis state repo at {}", endpoint)]
pub struct RedisStateRepo {
    endpoint: String,
    client: Client,
}

impl RedisStateRepo {
    /// connect to a redis server, e.g. `redis://127.0.0.1:6379/0`
    pub fn new(endpoint: &str) -> Result<Self> {
        Ok(Self {
            client: Client::open(endpoint)?,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl LaunchStateRepo for RedisStateRepo {
    async fn load(&self, launch_key: &str) -> Result<Option<LaunchState>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let raw: Option<String> = conn.get(format!("{}{}", STATE_PREFIX, launch_key)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn find_by_campaign(&self, campaign_id: &str) -> Result<Option<LaunchState>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key: Option<String> = conn.get(format!("{}{}", CAMPAIGN_PREFIX, campaign_id)).await?;
        match key {
            Some(key) => self.load(&key).await,
            None => Ok(None),
        }
    }

    async fn save(&self, state: &LaunchState) -> Result<()> {
        let raw = serde_json::to_string(state)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(format!("{}{}", STATE_PREFIX, state.launch_key), raw)
            .ignore();
        if let Some(campaign_id) = &state.campaign_id {
            pipe.set(format!("{}{}", CAMPAIGN_PREFIX, campaign_id), &state.launch_key)
                .ignore();
        }
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }
}

/// Process-local repo, for tests and single-shot CLI launches.
#[derive(Debug, Default)]
pub struct MemoryStateRepo {
    states: Mutex<HashMap<String, LaunchState>>,
}

impl MemoryStateRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LaunchStateRepo for MemoryStateRepo {
    async fn load(&self, launch_key: &str) -> Result<Option<LaunchState>> {
        Ok(self.states.lock().await.get(launch_key).cloned())
    }

    async fn find_by_campaign(&self, campaign_id: &str) -> Result<Option<LaunchState>> {
        Ok(self
            .states
            .lock()
            .await
            .values()
            .find(|s| s.campaign_id.as_deref() == Some(campaign_id))
            .cloned())
    }

    async fn save(&self, state: &LaunchState) -> Result<()> {
        self.states
            .lock()
            .await
            .insert(state.launch_key.clone(), state.clone());
        Ok(())
    }
}
