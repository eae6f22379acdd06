//! # fleet-apply
//!
//! Applies campaign specs to campaigns.
//!
//! Use [`ApplyService::apply`] to create or update the campaign a spec names
//! and rewire its changesets, [`ApplyService::close_campaign`] to close one,
//! and [`status::campaign_status`] to see how far its changesets converged.

pub mod associations;
pub mod error;
pub mod rewirer;
pub mod service;
pub mod status;

pub use associations::Associations;
pub use error::ApplyError;
pub use rewirer::{rewire, ChangesetMutation};
pub use service::{ApplyOptions, ApplyOutcome, ApplyService};
pub use status::{campaign_status, CampaignConvergence, CampaignStatus, ChangesetStatus};
