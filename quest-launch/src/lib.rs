pub mod amount;
pub mod api;
pub mod campaign;
pub mod chain;
pub mod config;
pub mod contract;
pub mod db;
pub mod error;
pub mod progress;
pub mod saga;
pub mod store;
pub mod utils;

use crate::{
    chain::ConfiguredAdapters,
    config::Config,
    db::RedisStateRepo,
    error::Result,
    progress::ProgressReporter,
    store::HttpCampaignStore,
};
use std::{sync::Arc, time::Duration};

pub use amount::TokenAmount;
pub use campaign::{CampaignSpec, Chain, ChainFamily};
pub use saga::{
    LaunchError, LaunchFailure, LaunchOutcome, LaunchSaga, LaunchState, StepName, StepState,
    StepStatus,
};

/// seconds allowed for a single JSON-RPC round trip
pub const RPC_TIMEOUT: u64 = 30;

/// Wires the saga to the configured store, redis and chains.
pub fn setup(config: &Config) -> Result<LaunchSaga> {
    let store = Arc::new(HttpCampaignStore::new(&config.store)?);
    let repo = Arc::new(RedisStateRepo::new(&config.redis)?);
    let adapters = Arc::new(ConfiguredAdapters::new(config, Duration::from_secs(RPC_TIMEOUT)));
    log::info!("{} store at {}, {} chains", repo, config.store.endpoint, config.chains.len());

    Ok(LaunchSaga::new(store, adapters, repo, Arc::new(ProgressReporter::new())))
}
