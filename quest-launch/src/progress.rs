//! Live step progress of running launches.
//!
//! Not a durable log: subscribers that attach late can read the bounded
//! in-memory history, anything older lives only in the persisted
//! [`crate::saga::LaunchState`].

use crate::saga::{StepName, StepState};
use serde::Serialize;
use std::{collections::VecDeque, sync::Mutex};
use tokio::sync::broadcast;

pub const CHANNEL_CAPACITY: usize = 256;
pub const HISTORY_LIMIT: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepUpdate {
    pub seq: u64,
    pub launch_key: String,
    pub step: StepName,
    pub state: StepState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

struct Log {
    next_seq: u64,
    entries: VecDeque<StepUpdate>,
}

pub struct ProgressReporter {
    tx: broadcast::Sender<StepUpdate>,
    log: Mutex<Log>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            log: Mutex::new(Log {
                next_seq: 0,
                entries: VecDeque::new(),
            }),
        }
    }

    /// Appends a transition and fans it out. Sequence numbers follow
    /// emission order across all launches.
    pub fn publish(
        &self,
        launch_key: &str,
        step: StepName,
        state: StepState,
        message: Option<String>,
    ) {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        let update = StepUpdate {
            seq: log.next_seq,
            launch_key: launch_key.to_string(),
            step,
            state,
            message,
        };
        log.next_seq += 1;
        if log.entries.len() == HISTORY_LIMIT {
            log.entries.pop_front();
        }
        log.entries.push_back(update.clone());
        // sending under the lock keeps channel order equal to seq order;
        // no receivers is fine
        let _ = self.tx.send(update);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StepUpdate> {
        self.tx.subscribe()
    }

    /// Retained transitions of one launch, oldest first.
    pub fn history(&self, launch_key: &str) -> Vec<StepUpdate> {
        let log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.entries
            .iter()
            .filter(|u| u.launch_key == launch_key)
            .cloned()
            .collect()
    }
}
