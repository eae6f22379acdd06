//! Reconciler state machine.
//!
//! ```text
//! Queued ──Claim──▶ Processing ──Succeed──▶ Completed
//!   │  ▲                │
//!   │  └──Retry── Errored ◀─Fail
//!   │               │
//!   └──Cancel──▶ Failed ◀──Cancel (or retry limit)
//! ```
//!
//! `Enqueue` re-arms any state except `Processing`; a changeset being worked
//! on must be left alone until the worker releases it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Failed attempts after which an errored changeset is no longer retried.
pub const MAX_NUM_RETRIES: u32 = 60;

/// Where a changeset sits in the reconciler queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerState {
    #[default]
    Queued,
    Processing,
    Completed,
    Errored,
    Failed,
}

/// Inputs to [`ReconcilerState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcilerEvent {
    /// Worker picks the row up.
    Claim,
    Succeed,
    Fail,
    /// Worker retries an errored row.
    Retry,
    /// Apply pulls queued work before rewiring.
    Cancel,
    /// Apply (or close) re-arms the row.
    Enqueue,
}

impl ReconcilerState {
    pub fn transition(self, event: ReconcilerEvent) -> Result<ReconcilerState, TransitionError> {
        use ReconcilerEvent as E;
        use ReconcilerState as S;

        let next = match (self, event) {
            (S::Queued, E::Claim) => S::Processing,
            (S::Processing, E::Succeed) => S::Completed,
            (S::Processing, E::Fail) => S::Errored,
            (S::Errored, E::Retry) => S::Queued,
            (S::Queued | S::Errored, E::Cancel) => S::Failed,
            (S::Queued | S::Completed | S::Errored | S::Failed, E::Enqueue) => S::Queued,
            (from, event) => return Err(TransitionError { from, event }),
        };
        Ok(next)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcilerState::Queued => "queued",
            ReconcilerState::Processing => "processing",
            ReconcilerState::Completed => "completed",
            ReconcilerState::Errored => "errored",
            ReconcilerState::Failed => "failed",
        }
    }
}

impl fmt::Display for ReconcilerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReconcilerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(ReconcilerState::Queued),
            "processing" => Ok(ReconcilerState::Processing),
            "completed" => Ok(ReconcilerState::Completed),
            "errored" => Ok(ReconcilerState::Errored),
            "failed" => Ok(ReconcilerState::Failed),
            other => Err(format!("unknown reconciler state '{other}'")),
        }
    }
}
