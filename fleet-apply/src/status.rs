//! Convergence of a campaign's changesets.
//!
//! Per-changeset precedence:
//! 1. `Failed` (retries exhausted or canceled)
//! 2. `Retrying` (errored, waiting for the worker to try again)
//! 3. `Processing` (claimed by a worker)
//! 4. `Closing` (queued with `closing` set)
//! 5. `Pending` (queued)
//! 6. `Converged`

use serde::Serialize;

use fleet_core::{Campaign, Changeset, ReconcilerState};
use fleet_store::StoreTx;

use crate::ApplyError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangesetStatus {
    Pending,
    Processing,
    Converged,
    Closing,
    Retrying,
    Failed,
}

impl ChangesetStatus {
    pub fn of(cs: &Changeset) -> Self {
        match cs.reconciler_state {
            ReconcilerState::Failed => ChangesetStatus::Failed,
            ReconcilerState::Errored => ChangesetStatus::Retrying,
            ReconcilerState::Processing => ChangesetStatus::Processing,
            ReconcilerState::Queued if cs.closing => ChangesetStatus::Closing,
            ReconcilerState::Queued => ChangesetStatus::Pending,
            ReconcilerState::Completed => ChangesetStatus::Converged,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangesetStatus::Pending => "pending",
            ChangesetStatus::Processing => "processing",
            ChangesetStatus::Converged => "converged",
            ChangesetStatus::Closing => "closing",
            ChangesetStatus::Retrying => "retrying",
            ChangesetStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignConvergence {
    /// Every member changeset is converged (or there are none).
    Converged,
    /// At least one member changeset failed for good.
    Failing,
    Pending,
}

impl CampaignConvergence {
    pub fn from_statuses<I: IntoIterator<Item = ChangesetStatus>>(statuses: I) -> Self {
        let mut all_converged = true;
        for status in statuses {
            if status == ChangesetStatus::Failed {
                return CampaignConvergence::Failing;
            }
            all_converged &= status == ChangesetStatus::Converged;
        }
        if all_converged {
            CampaignConvergence::Converged
        } else {
            CampaignConvergence::Pending
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChangesetReport {
    #[serde(flatten)]
    pub changeset: Changeset,
    pub status: ChangesetStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignStatus {
    pub campaign: Campaign,
    pub changesets: Vec<ChangesetReport>,
    pub convergence: CampaignConvergence,
}

/// Classify every member changeset of `campaign`.
pub fn campaign_status(
    tx: &StoreTx<'_>,
    campaign: &Campaign,
) -> Result<CampaignStatus, ApplyError> {
    let changesets: Vec<ChangesetReport> = tx
        .list_changesets_attached(campaign.id)?
        .into_iter()
        .map(|changeset| ChangesetReport {
            status: ChangesetStatus::of(&changeset),
            changeset,
        })
        .collect();
    let convergence = CampaignConvergence::from_statuses(changesets.iter().map(|r| r.status));
    Ok(CampaignStatus {
        campaign: campaign.clone(),
        changesets,
        convergence,
    })
}
