//! Error types for fleet-apply.

use thiserror::Error;

use fleet_core::{CampaignId, ChangesetId, CodeHost, RepoId, TransitionError, UserId};
use fleet_store::StoreError;

/// All errors that can arise from applying or closing a campaign.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("campaign {0} is closed; specs can no longer be applied to it")]
    ApplyClosedCampaign(CampaignId),

    #[error("a campaign matching this spec already exists: {0}")]
    MatchingCampaignExists(CampaignId),

    /// The spec resolved to a different campaign than the caller asserted.
    /// `actual` is zero when the spec would create a new campaign.
    #[error("campaign spec applies to campaign {actual}, expected {expected}")]
    EnsureCampaignFailed {
        expected: CampaignId,
        actual: CampaignId,
    },

    #[error("forbidden: user {0} may not perform this operation")]
    Forbidden(UserId),

    #[error("repository {0} not found")]
    RepoNotFound(RepoId),

    #[error("repository {repo} is hosted on {host}, which does not support changesets")]
    UnsupportedRepo { repo: String, host: CodeHost },

    /// A campaign spec (by rand id) or one of its changeset specs is missing.
    #[error("spec not found: {0}")]
    SpecNotFound(String),

    #[error("changeset {0} not found")]
    ChangesetNotFound(ChangesetId),

    /// The worker claimed the changeset and never reported back.
    #[error("changeset {0} is still being processed by the worker")]
    ChangesetProcessing(ChangesetId),

    #[error("campaign {0} not found")]
    CampaignNotFound(CampaignId),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl ApplyError {
    /// Whether retrying later may succeed: the database lock was not free in
    /// time, or a worker still holds one of the changesets.
    pub fn is_busy(&self) -> bool {
        match self {
            ApplyError::Store(err) => err.is_busy(),
            ApplyError::ChangesetProcessing(_) => true,
            _ => false,
        }
    }
}
