//! Campaign launch saga.
//!
//! Turns a validated [`CampaignSpec`] into a funded on-chain campaign and an
//! active off-chain record. The two systems cannot commit atomically, so the
//! saga only moves forward: every captured value (`campaign_id`,
//! `chain_tx_hash`) is persisted in [`LaunchState`] as soon as it exists and a
//! later run resumes from it instead of repeating the side effect.
//!
//! The funding transaction is signed first and recorded as `pending_tx`
//! before it is broadcast. A run that finds a pending transaction asks the
//! chain about it and only signs again once nothing can land anymore.

use crate::{
    campaign::{CampaignSpec, Chain, ChainFamily, SpecError},
    chain::{
        AdapterError, AdapterFactory, ChainAdapter, CreateParams, CreateReceipt, SignedCreate,
        Submission,
    },
    db::LaunchStateRepo,
    progress::ProgressReporter,
    store::{CampaignPatch, CampaignStatus, CampaignStore},
};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

const SAVE_ATTEMPTS: u32 = 3;
const SAVE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepName {
    Persist,
    Approve,
    Submit,
    Finalize,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepName::Persist => "persist",
            StepName::Approve => "approve",
            StepName::Submit => "submit",
            StepName::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Pending,
    Processing,
    Success,
    Error,
}

impl StepState {
    /// pending -> processing -> {success | error}; a skipped step may go
    /// straight from pending to a terminal state.
    fn can_become(self, next: StepState) -> bool {
        use StepState::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Success)
                | (Pending, Error)
                | (Processing, Success)
                | (Processing, Error)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepStatus {
    pub name: StepName,
    pub state: StepState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepStatus {
    fn pending(name: StepName) -> Self {
        Self {
            name,
            state: StepState::Pending,
            message: None,
        }
    }
}

/// Ordered steps of a launch on `family`, fixed when the launch starts.
pub fn step_plan(family: ChainFamily) -> Vec<StepName> {
    match family {
        ChainFamily::Evm => vec![
            StepName::Persist,
            StepName::Approve,
            StepName::Submit,
            StepName::Finalize,
        ],
        ChainFamily::Solana => vec![StepName::Persist, StepName::Submit, StepName::Finalize],
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOutcome {
    pub campaign_id: String,
    pub chain_tx_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_chain_address: Option<String>,
}

/// Progress of one launch lineage. Persisted after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchState {
    pub launch_key: String,
    pub spec: CampaignSpec,
    pub campaign_id: Option<String>,
    pub chain_tx_hash: Option<String>,
    pub on_chain_address: Option<String>,
    /// funding transaction signed but not yet known to have landed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tx: Option<SignedCreate>,
    pub steps: Vec<StepStatus>,
    pub attempts: u32,
    pub updated_at: DateTime<Utc>,
}

impl LaunchState {
    pub fn new(spec: CampaignSpec) -> Self {
        Self {
            launch_key: spec.launch_key(),
            steps: step_plan(spec.chain.family()).into_iter().map(StepStatus::pending).collect(),
            spec,
            campaign_id: None,
            chain_tx_hash: None,
            on_chain_address: None,
            pending_tx: None,
            attempts: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn chain(&self) -> Chain {
        self.spec.chain
    }

    pub fn step(&self, name: StepName) -> Option<&StepStatus> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn has_step(&self, name: StepName) -> bool {
        self.step(name).is_some()
    }

    fn step_state(&self, name: StepName) -> Option<StepState> {
        self.step(name).map(|s| s.state)
    }

    /// Records the draft id. The first id sticks for the lifetime of the
    /// lineage; returns false if one was already set.
    pub fn anchor_campaign(&mut self, campaign_id: String) -> bool {
        if self.campaign_id.is_some() {
            return false;
        }
        self.campaign_id = Some(campaign_id);
        true
    }

    fn transition(&mut self, name: StepName, next: StepState, message: Option<String>) -> bool {
        let Some(step) = self.steps.iter_mut().find(|s| s.name == name) else {
            return false;
        };
        if !step.state.can_become(next) {
            return false;
        }
        step.state = next;
        step.message = message;
        self.updated_at = Utc::now();
        true
    }

    /// Starts a new attempt: every step that did not capture a durable value
    /// goes back to pending. `approve` is re-verified until the campaign is
    /// funded since an allowance can be spent between attempts.
    pub fn begin_attempt(&mut self) -> Vec<StepName> {
        self.attempts += 1;
        let funded = self.chain_tx_hash.is_some();
        let mut reset = Vec::new();
        for step in self.steps.iter_mut() {
            let keep = match step.name {
                StepName::Persist => self.campaign_id.is_some() && step.state == StepState::Success,
                StepName::Approve => funded && step.state == StepState::Success,
                StepName::Submit => funded && step.state == StepState::Success,
                StepName::Finalize => step.state == StepState::Success,
            };
            if !keep && step.state != StepState::Pending {
                step.state = StepState::Pending;
                step.message = None;
                reset.push(step.name);
            }
        }
        self.updated_at = Utc::now();
        reset
    }

    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state == StepState::Success)
    }

    pub fn outcome(&self) -> Option<LaunchOutcome> {
        Some(LaunchOutcome {
            campaign_id: self.campaign_id.clone()?,
            chain_tx_hash: self.chain_tx_hash.clone()?,
            on_chain_address: self.on_chain_address.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// retrying the same input cannot succeed
    Fatal,
    Recoverable,
    /// funds moved on-chain but the record does not show it yet
    Inconsistent,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("invalid campaign spec: {0}")]
    InvalidSpec(#[from] SpecError),
    #[error("launch key {0} already belongs to a different campaign spec")]
    KeyConflict(String),
    #[error("unsupported chain {chain}: {reason}")]
    UnsupportedChain { chain: Chain, reason: String },
    #[error("draft persistence failed: {0}")]
    DraftPersistence(String),
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error("campaign funded in {chain_tx_hash} but the record could not be finalized: {message}")]
    Finalization { chain_tx_hash: String, message: String },
    #[error("launch {0} is already in flight")]
    AlreadyInFlight(String),
    #[error("no launch found for campaign {0}")]
    UnknownCampaign(String),
    #[error("launch state unavailable: {0}")]
    State(String),
}

impl LaunchError {
    pub fn severity(&self) -> Severity {
        match self {
            LaunchError::InvalidSpec(_)
            | LaunchError::KeyConflict(_)
            | LaunchError::UnsupportedChain { .. }
            | LaunchError::AlreadyInFlight(_)
            | LaunchError::UnknownCampaign(_) => Severity::Fatal,
            LaunchError::Finalization { .. } => Severity::Inconsistent,
            LaunchError::DraftPersistence(_) | LaunchError::Adapter(_) | LaunchError::State(_) => {
                Severity::Recoverable
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.severity() != Severity::Fatal
    }
}

/// A failed launch together with everything it captured so far.
#[derive(Debug, Clone)]
pub struct LaunchFailure {
    pub error: LaunchError,
    pub state: Option<LaunchState>,
}

impl LaunchFailure {
    fn bare(error: LaunchError) -> Self {
        Self { error, state: None }
    }

    fn with_state(error: LaunchError, state: LaunchState) -> Self {
        Self {
            error,
            state: Some(state),
        }
    }

    pub fn campaign_id(&self) -> Option<&str> {
        self.state.as_ref()?.campaign_id.as_deref()
    }

    pub fn chain_tx_hash(&self) -> Option<&str> {
        self.state.as_ref()?.chain_tx_hash.as_deref()
    }
}

impl fmt::Display for LaunchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for LaunchFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub type LaunchResult = std::result::Result<LaunchOutcome, LaunchFailure>;

struct Inner {
    store: Arc<dyn CampaignStore>,
    adapters: Arc<dyn AdapterFactory>,
    repo: Arc<dyn LaunchStateRepo>,
    progress: Arc<ProgressReporter>,
    in_flight: Mutex<HashSet<String>>,
}

/// Marks a launch key busy until dropped.
struct InFlight {
    inner: Arc<Inner>,
    key: String,
}

impl InFlight {
    fn acquire(inner: &Arc<Inner>, key: &str) -> Option<Self> {
        let mut busy = inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        if !busy.insert(key.to_string()) {
            return None;
        }
        Some(Self {
            inner: inner.clone(),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut busy = self.inner.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        busy.remove(&self.key);
    }
}

#[derive(Clone)]
pub struct LaunchSaga {
    inner: Arc<Inner>,
}

impl LaunchSaga {
    pub fn new(
        store: Arc<dyn CampaignStore>,
        adapters: Arc<dyn AdapterFactory>,
        repo: Arc<dyn LaunchStateRepo>,
        progress: Arc<ProgressReporter>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                adapters,
                repo,
                progress,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.inner.progress
    }

    pub async fn state(
        &self,
        launch_key: &str,
    ) -> std::result::Result<Option<LaunchState>, LaunchError> {
        self.inner
            .repo
            .load(launch_key)
            .await
            .map_err(|e| LaunchError::State(e.to_string()))
    }

    /// Launches `spec`, resuming the persisted state of the same launch key
    /// when there is one.
    pub async fn run(&self, spec: &CampaignSpec) -> LaunchResult {
        let key = spec.launch_key();
        let guard = InFlight::acquire(&self.inner, &key)
            .ok_or_else(|| LaunchFailure::bare(LaunchError::AlreadyInFlight(key.clone())))?;

        let state = match self.state(&key).await {
            Ok(Some(state)) if state.spec != *spec => {
                return Err(LaunchFailure {
                    error: LaunchError::KeyConflict(key),
                    state: Some(state),
                })
            }
            Ok(Some(state)) => state,
            Ok(None) => LaunchState::new(spec.clone()),
            Err(e) => {
                return Err(LaunchFailure {
                    error: e,
                    state: Some(LaunchState::new(spec.clone())),
                })
            }
        };
        self.spawn(state, guard).await
    }

    /// Retry entry point: continues the launch that owns `campaign_id`.
    pub async fn resume(&self, campaign_id: &str) -> LaunchResult {
        let found = self
            .inner
            .repo
            .find_by_campaign(campaign_id)
            .await
            .map_err(|e| LaunchFailure::bare(LaunchError::State(e.to_string())))?
            .ok_or_else(|| {
                LaunchFailure::bare(LaunchError::UnknownCampaign(campaign_id.to_string()))
            })?;
        self.run_with_state(found).await
    }

    /// Continues from a state snapshot held by the caller. A newer persisted
    /// snapshot of the same launch takes precedence.
    pub async fn run_with_state(&self, state: LaunchState) -> LaunchResult {
        let key = state.launch_key.clone();
        let guard = InFlight::acquire(&self.inner, &key)
            .ok_or_else(|| LaunchFailure::bare(LaunchError::AlreadyInFlight(key.clone())))?;
        let state = match self.state(&key).await {
            Ok(Some(persisted)) => persisted,
            Ok(None) => state,
            Err(e) => {
                return Err(LaunchFailure {
                    error: e,
                    state: Some(state),
                })
            }
        };
        self.spawn(state, guard).await
    }

    // The attempt runs on its own task: a caller that goes away mid-launch
    // must not abort a wallet submission that is already on its way.
    async fn spawn(&self, state: LaunchState, guard: InFlight) -> LaunchResult {
        if state.is_complete() {
            if let Some(outcome) = state.outcome() {
                info!("launch {} already complete", state.launch_key);
                return Ok(outcome);
            }
        }
        let inner = self.inner.clone();
        let key = state.launch_key.clone();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            inner.drive(state).await
        });
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(LaunchFailure::bare(LaunchError::State(format!(
                "launch {} task cancelled: {}",
                key, e
            )))),
        }
    }
}

impl Inner {
    async fn save(&self, state: &LaunchState) -> crate::error::Result<()> {
        self.repo.save(state).await
    }

    /// Saves a state that must not be lost, retrying a few times.
    async fn save_durable(&self, state: &LaunchState) -> std::result::Result<(), LaunchError> {
        let mut attempt = 1;
        loop {
            match self.save(state).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SAVE_ATTEMPTS => {
                    warn!(
                        "launch {}: save attempt {} failed: {}",
                        state.launch_key, attempt, e
                    );
                    tokio::time::sleep(SAVE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(LaunchError::State(e.to_string())),
            }
        }
    }

    fn apply(&self, state: &mut LaunchState, step: StepName, next: StepState, message: String) {
        if !state.transition(step, next, Some(message.clone())) {
            error!(
                "launch {}: illegal transition of {} to {:?}",
                state.launch_key, step, next
            );
            return;
        }
        info!("launch {}: {} {:?} ({})", state.launch_key, step, next, message);
        self.progress.publish(&state.launch_key, step, next, Some(message));
    }

    /// Transition plus a best-effort save. Use [`Inner::mark_durable`] when
    /// the state carries a newly captured value.
    async fn mark(
        &self,
        state: &mut LaunchState,
        step: StepName,
        next: StepState,
        message: impl Into<String>,
    ) {
        self.apply(state, step, next, message.into());
        if let Err(e) = self.save(state).await {
            error!(
                "launch {}: failed to persist state after {}: {}",
                state.launch_key, step, e
            );
        }
    }

    async fn mark_durable(
        &self,
        state: &mut LaunchState,
        step: StepName,
        next: StepState,
        message: impl Into<String>,
    ) -> std::result::Result<(), LaunchError> {
        self.apply(state, step, next, message.into());
        self.save_durable(state).await
    }

    async fn fail(
        &self,
        mut state: LaunchState,
        step: StepName,
        error: LaunchError,
    ) -> LaunchResult {
        warn!("launch {} failed at {}: {}", state.launch_key, step, error);
        self.mark(&mut state, step, StepState::Error, error.to_string()).await;
        Err(LaunchFailure {
            error,
            state: Some(state),
        })
    }

    async fn drive(&self, mut state: LaunchState) -> LaunchResult {
        let now = Utc::now();
        if state.chain_tx_hash.is_none() {
            if let Err(e) = state.spec.validate(now) {
                return Err(LaunchFailure {
                    error: e.into(),
                    state: Some(state),
                });
            }
        }

        for step in state.begin_attempt() {
            self.progress.publish(&state.launch_key, step, StepState::Pending, None);
        }
        if let Err(e) = self.save(&state).await {
            return Err(LaunchFailure {
                error: LaunchError::State(e.to_string()),
                state: Some(state),
            });
        }
        info!(
            "launch {} attempt {} on {}",
            state.launch_key,
            state.attempts,
            state.chain()
        );

        // 1. draft
        let campaign_id = match state.campaign_id.clone() {
            Some(id) => {
                if state.step_state(StepName::Persist) != Some(StepState::Success) {
                    let message = format!("reusing draft {}", id);
                    self.mark(&mut state, StepName::Persist, StepState::Success, message)
                        .await;
                }
                id
            }
            None => {
                let message = "saving campaign draft";
                self.mark(&mut state, StepName::Persist, StepState::Processing, message)
                    .await;
                match self.store.create(&state.spec, &state.launch_key).await {
                    Ok(id) => {
                        state.anchor_campaign(id.clone());
                        let message = format!("draft {} saved", id);
                        let step = StepName::Persist;
                        let saved = self
                            .mark_durable(&mut state, step, StepState::Success, message)
                            .await;
                        if let Err(e) = saved {
                            return Err(LaunchFailure::with_state(e, state));
                        }
                        id
                    }
                    Err(e) => {
                        return self
                            .fail(
                                state,
                                StepName::Persist,
                                LaunchError::DraftPersistence(e.to_string()),
                            )
                            .await
                    }
                }
            }
        };

        // 2.-4. on-chain funding
        if state.chain_tx_hash.is_none() {
            let chain = state.chain();
            let first_chain_step = if state.has_step(StepName::Approve) {
                StepName::Approve
            } else {
                StepName::Submit
            };

            let adapter = match self.adapters.adapter_for(chain) {
                Ok(adapter) => adapter,
                Err(reason) => {
                    let error = LaunchError::UnsupportedChain { chain, reason };
                    return self.fail(state, first_chain_step, error).await;
                }
            };
            if let Err(e) = adapter.ensure_wallet_ready().await {
                return self.fail(state, first_chain_step, e.into()).await;
            }

            if state.step_state(StepName::Approve) == Some(StepState::Pending) {
                if let Err(e) = self.approve(&mut state, adapter.as_ref()).await {
                    return self.fail(state, StepName::Approve, e.into()).await;
                }
            }

            let params = CreateParams {
                campaign_id: campaign_id.clone(),
                token: state.spec.token.clone(),
                amount: state.spec.amount,
                deadline: state.spec.deadline,
                max_winners: state.spec.max_winners,
            };
            let receipt = match self.submit(&mut state, adapter.as_ref(), &params).await {
                Ok(receipt) => receipt,
                Err(e) => return self.fail(state, StepName::Submit, e).await,
            };
            state.chain_tx_hash = Some(receipt.tx_hash.clone());
            state.on_chain_address = receipt.on_chain_address;
            state.pending_tx = None;
            let message = format!("funded in {}", receipt.tx_hash);
            let saved = self
                .mark_durable(&mut state, StepName::Submit, StepState::Success, message)
                .await;
            if let Err(e) = saved {
                error!(
                    "launch {}: funded in {} but state not persisted: {}",
                    state.launch_key, receipt.tx_hash, e
                );
                let error = LaunchError::Finalization {
                    chain_tx_hash: receipt.tx_hash,
                    message: format!("launch state not persisted: {}", e),
                };
                return Err(LaunchFailure::with_state(error, state));
            }
        }

        // 5. reconcile the record
        let chain_tx_hash = state.chain_tx_hash.clone().unwrap_or_default();
        self.mark(
            &mut state,
            StepName::Finalize,
            StepState::Processing,
            "activating campaign record",
        )
        .await;
        let patch = CampaignPatch {
            status: CampaignStatus::Active,
            chain_tx_hash: Some(chain_tx_hash.clone()),
            on_chain_address: state.on_chain_address.clone(),
            chain: state.chain(),
        };
        if let Err(e) = self.store.patch(&campaign_id, &patch).await {
            let error = LaunchError::Finalization {
                chain_tx_hash,
                message: e.to_string(),
            };
            return self.fail(state, StepName::Finalize, error).await;
        }
        self.mark(&mut state, StepName::Finalize, StepState::Success, "campaign is live")
            .await;

        match state.outcome() {
            Some(outcome) => Ok(outcome),
            None => Err(LaunchFailure {
                error: LaunchError::State("launch finished without a transaction hash".to_string()),
                state: Some(state),
            }),
        }
    }

    /// Gets the funding transaction onto the chain exactly once. An earlier
    /// signed transaction is looked up before anything new is signed, and a
    /// new one is persisted before it is broadcast.
    async fn submit(
        &self,
        state: &mut LaunchState,
        adapter: &dyn ChainAdapter,
        params: &CreateParams,
    ) -> std::result::Result<CreateReceipt, LaunchError> {
        let message = match &state.pending_tx {
            Some(pending) => format!("checking earlier funding transaction {}", pending.tx_hash),
            None => "waiting for wallet confirmation of the funding transaction".to_string(),
        };
        self.mark(state, StepName::Submit, StepState::Processing, message)
            .await;

        let pending = state.pending_tx.clone();
        match (adapter.find_create(params, pending.as_ref()).await?, pending) {
            (Submission::Landed(receipt), _) => {
                info!(
                    "launch {}: earlier transaction {} landed",
                    state.launch_key, receipt.tx_hash
                );
                return Ok(receipt);
            }
            (Submission::Pending, Some(pending)) => {
                info!(
                    "launch {}: waiting on earlier transaction {}",
                    state.launch_key, pending.tx_hash
                );
                return Ok(adapter.confirm_create(params, &pending.tx_hash).await?);
            }
            (Submission::Unsent, Some(pending)) => {
                info!("launch {}: rebroadcasting {}", state.launch_key, pending.tx_hash);
                adapter.broadcast_create(&pending).await?;
                return Ok(adapter.confirm_create(params, &pending.tx_hash).await?);
            }
            (_, Some(pending)) => {
                warn!(
                    "launch {}: earlier transaction {} can no longer land, signing a new one",
                    state.launch_key, pending.tx_hash
                );
            }
            (_, None) => {}
        }

        let signed = adapter.sign_create(params).await?;
        let earlier = state.pending_tx.replace(signed.clone());
        if let Err(e) = self.save_durable(state).await {
            state.pending_tx = earlier;
            return Err(LaunchError::State(format!(
                "transaction {} not broadcast, launch state not persisted: {}",
                signed.tx_hash, e
            )));
        }
        adapter.broadcast_create(&signed).await?;
        Ok(adapter.confirm_create(params, &signed.tx_hash).await?)
    }

    async fn approve(
        &self,
        state: &mut LaunchState,
        adapter: &dyn ChainAdapter,
    ) -> std::result::Result<(), AdapterError> {
        let token = state.spec.token.clone();
        let amount = state.spec.amount;
        if adapter.check_allowance(&token, amount).await {
            self.mark(
                state,
                StepName::Approve,
                StepState::Success,
                "allowance already sufficient, no approval transaction sent",
            )
            .await;
            return Ok(());
        }
        self.mark(
            state,
            StepName::Approve,
            StepState::Processing,
            format!("waiting for approval of {} in wallet", amount),
        )
        .await;
        adapter.approve(&token, amount).await?;
        self.mark(state, StepName::Approve, StepState::Success, "token approval confirmed")
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::campaign::tests::base_spec;

    #[test]
    fn step_plan_per_family() {
        assert_eq!(
            step_plan(ChainFamily::Evm),
            vec![StepName::Persist, StepName::Approve, StepName::Submit, StepName::Finalize]
        );
        assert!(!step_plan(ChainFamily::Solana).contains(&StepName::Approve));
    }

    #[test]
    fn transitions_are_monotonic() {
        let mut state = LaunchState::new(base_spec());
        assert!(state.transition(StepName::Persist, StepState::Processing, None));
        assert!(!state.transition(StepName::Persist, StepState::Pending, None));
        assert!(state.transition(StepName::Persist, StepState::Success, None));
        assert!(!state.transition(StepName::Persist, StepState::Error, None));
        assert!(state.transition(StepName::Approve, StepState::Success, None));
    }

    #[test]
    fn campaign_id_is_anchored_once() {
        let mut state = LaunchState::new(base_spec());
        assert!(state.anchor_campaign("c-1".into()));
        assert!(!state.anchor_campaign("c-2".into()));
        assert_eq!(state.campaign_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn begin_attempt_keeps_durable_steps() {
        let mut state = LaunchState::new(base_spec());
        state.anchor_campaign("c-1".into());
        state.transition(StepName::Persist, StepState::Success, None);
        state.transition(StepName::Approve, StepState::Success, None);
        state.transition(StepName::Submit, StepState::Processing, None);
        state.transition(StepName::Submit, StepState::Error, Some("SubmissionRejected".into()));

        let reset = state.begin_attempt();
        assert_eq!(reset, vec![StepName::Approve, StepName::Submit]);
        assert_eq!(state.step_state(StepName::Persist), Some(StepState::Success));
        assert_eq!(state.attempts, 1);

        state.chain_tx_hash = Some("0xfeed".into());
        state.transition(StepName::Approve, StepState::Success, None);
        state.transition(StepName::Submit, StepState::Success, None);
        state.transition(StepName::Finalize, StepState::Processing, None);
        state.transition(StepName::Finalize, StepState::Error, None);
        assert_eq!(state.begin_attempt(), vec![StepName::Finalize]);
    }

    #[test]
    fn severity_classes() {
        assert_eq!(
            LaunchError::Finalization {
                chain_tx_hash: "0x1".into(),
                message: "503".into()
            }
            .severity(),
            Severity::Inconsistent
        );
        assert!(LaunchError::Adapter(AdapterError::SubmissionRejected("no".into())).is_retryable());
        assert!(!LaunchError::UnsupportedChain {
            chain: Chain::Ethereum,
            reason: "x".into()
        }
        .is_retryable());
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = LaunchState::new(base_spec());
        state.anchor_campaign("c-1".into());
        let json = serde_json::to_string(&state).unwrap();
        assert!(!json.contains("pendingTx"));
        let back: LaunchState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);

        state.pending_tx = Some(SignedCreate {
            tx_hash: "0xabc".into(),
            raw: "f86b".into(),
            nonce: Some(7),
        });
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"pendingTx\":{\"txHash\":\"0xabc\""));
        let back: LaunchState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pending_tx, state.pending_tx);
    }
}
