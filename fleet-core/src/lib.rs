//! Fleet core library: domain types, reconciler state machine, config, errors.
//!
//! - [`types`]: newtypes and domain structs (campaigns, specs, changesets)
//! - [`state`]: the reconciler state machine
//! - [`config`]: load / save / init of `~/.fleet/config.yaml`
//! - [`error`]: [`ConfigError`], [`TransitionError`]

pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, TransitionError};
pub use state::{ReconcilerEvent, ReconcilerState, MAX_NUM_RETRIES};
pub use types::{
    Actor, BranchChangeset, Campaign, CampaignId, CampaignSpec, CampaignSpecId, Changeset,
    ChangesetId, ChangesetSpec, ChangesetSpecDescription, ChangesetSpecId, CodeHost, DiffStat,
    ExternalState, GitCommit, Namespace, OrgId, PublicationState, Repo, RepoId, UserId,
};
