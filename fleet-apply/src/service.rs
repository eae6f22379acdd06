//! Applying campaign specs and closing campaigns.
//!
//! [`ApplyService::apply`] is the single entry point for both the CLI and
//! tests. It runs in two phases:
//!
//! 1. Cancel pending reconciler work for the campaign's owned changesets in
//!    repositories the actor can see, in a transaction of its own. This
//!    waits for any worker holding a claim, and so for the changeset it is
//!    processing to be completed or failed.
//! 2. In one write transaction: update the campaign row, load the
//!    associations, rewire, and commit. Any error drops the transaction and
//!    nothing of phase 2 is visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_core::{Actor, Campaign, CampaignId};
use fleet_store::Store;

use crate::associations::Associations;
use crate::rewirer::{ensure_idle, rewire, ChangesetMutation};
use crate::ApplyError;

/// Parameters of one apply call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyOptions {
    pub campaign_spec_rand_id: String,
    /// Fail unless the spec resolves to this campaign. Zero asserts that a
    /// new campaign will be created.
    pub ensure_campaign_id: Option<CampaignId>,
    /// Fail if a campaign with the spec's namespace and name already exists.
    pub fail_if_campaign_exists: bool,
    /// Run every check and rewire, then roll back.
    pub dry_run: bool,
}

impl ApplyOptions {
    pub fn new(campaign_spec_rand_id: impl Into<String>) -> Self {
        Self {
            campaign_spec_rand_id: campaign_spec_rand_id.into(),
            ..Self::default()
        }
    }
}

/// Result of [`ApplyService::apply`] or [`ApplyService::close_campaign`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub campaign: Campaign,
    pub mutations: Vec<ChangesetMutation>,
    /// `true` when nothing was written because the campaign was already in
    /// the requested state.
    pub unchanged: bool,
    pub dry_run: bool,
}

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub struct ApplyService<'s> {
    store: &'s mut Store,
    clock: Clock,
}

impl<'s> ApplyService<'s> {
    pub fn new(store: &'s mut Store) -> Self {
        Self {
            store,
            clock: Box::new(Utc::now),
        }
    }

    /// Replace the wall clock used for `last_applied_at`, `closed_at` and new
    /// rows.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    // -----------------------------------------------------------------------
    // apply
    // -----------------------------------------------------------------------

    /// Apply the campaign spec `opts.campaign_spec_rand_id` on behalf of
    /// `actor`, creating or updating the campaign it names.
    pub fn apply(
        &mut self,
        actor: &Actor,
        opts: &ApplyOptions,
    ) -> Result<ApplyOutcome, ApplyError> {
        let (spec, existing) = {
            let tx = self.store.read()?;
            let spec = tx
                .campaign_spec_by_rand_id(&opts.campaign_spec_rand_id)?
                .ok_or_else(|| ApplyError::SpecNotFound(opts.campaign_spec_rand_id.clone()))?;
            if !actor.is_admin_or(spec.user_id) {
                return Err(ApplyError::Forbidden(actor.user_id));
            }
            let existing = tx.campaign_matching_spec(&spec)?;
            (spec, existing)
        };

        let resolved = existing.as_ref().map(|c| c.id).unwrap_or_default();
        if opts.fail_if_campaign_exists && existing.is_some() {
            return Err(ApplyError::MatchingCampaignExists(resolved));
        }
        if let Some(expected) = opts.ensure_campaign_id {
            if expected != resolved {
                return Err(ApplyError::EnsureCampaignFailed {
                    expected,
                    actual: resolved,
                });
            }
        }
        if let Some(campaign) = &existing {
            if campaign.closed() {
                return Err(ApplyError::ApplyClosedCampaign(campaign.id));
            }
            if campaign.campaign_spec_id == spec.id {
                tracing::info!(campaign = %campaign.id, "campaign spec already applied");
                return Ok(ApplyOutcome {
                    campaign: campaign.clone(),
                    mutations: vec![],
                    unchanged: true,
                    dry_run: opts.dry_run,
                });
            }
            if !opts.dry_run {
                self.store
                    .cancel_queued_campaign_changesets(campaign.id, actor)?;
            }
        }

        let now = (self.clock)();
        let tx = self.store.transact()?;

        let mut campaign = match &existing {
            Some(found) => {
                let current = tx
                    .campaign(found.id)?
                    .ok_or(ApplyError::CampaignNotFound(found.id))?;
                if current.closed() {
                    return Err(ApplyError::ApplyClosedCampaign(current.id));
                }
                current
            }
            None => Campaign::from_spec(&spec, now),
        };
        campaign.campaign_spec_id = spec.id;
        campaign.namespace = spec.namespace;
        campaign.name = spec.name.clone();
        campaign.description = spec.description.clone();
        if campaign.initial_applier_id.is_none() {
            campaign.initial_applier_id = Some(actor.user_id);
        }
        campaign.last_applier_id = Some(actor.user_id);
        campaign.last_applied_at = Some(now);
        if existing.is_none() {
            campaign.id = tx.create_campaign(&campaign)?;
        }

        let assoc = Associations::load(&tx, actor, spec.id, campaign.id)?;
        let mutations = rewire(&tx, &mut campaign, &assoc, now)?;

        if opts.dry_run {
            tx.rollback()?;
            tracing::info!(
                campaign = %campaign.name,
                mutations = mutations.len(),
                "[dry-run] would apply campaign spec"
            );
        } else {
            tx.commit()?;
            tracing::info!(
                campaign = %campaign.id,
                name = %campaign.name,
                mutations = mutations.len(),
                "applied campaign spec"
            );
        }

        Ok(ApplyOutcome {
            campaign,
            mutations,
            unchanged: false,
            dry_run: opts.dry_run,
        })
    }

    // -----------------------------------------------------------------------
    // close
    // -----------------------------------------------------------------------

    /// Close a campaign. With `close_changesets`, every attached changeset it
    /// owns that is still open on the code host is queued for closing.
    pub fn close_campaign(
        &mut self,
        actor: &Actor,
        id: CampaignId,
        close_changesets: bool,
    ) -> Result<ApplyOutcome, ApplyError> {
        let now = (self.clock)();
        let tx = self.store.transact()?;
        let mut campaign = tx.campaign(id)?.ok_or(ApplyError::CampaignNotFound(id))?;

        let allowed = actor.site_admin
            || campaign.initial_applier_id == Some(actor.user_id)
            || campaign.namespace.user_id() == Some(actor.user_id);
        if !allowed {
            return Err(ApplyError::Forbidden(actor.user_id));
        }
        if campaign.closed() {
            return Ok(ApplyOutcome {
                campaign,
                mutations: vec![],
                unchanged: true,
                dry_run: false,
            });
        }

        campaign.closed_at = Some(now);
        let mut mutations = Vec::new();
        if close_changesets {
            for mut cs in tx.list_changesets_attached(id)? {
                if !cs.owned_by(id) || !cs.published() || cs.externally_final() {
                    continue;
                }
                ensure_idle(&cs)?;
                cs.closing = true;
                cs.reset_queued()?;
                tx.update_changeset(&mut cs)?;
                mutations.push(ChangesetMutation::Closing { changeset: cs.id });
            }
        }
        tx.update_campaign(&mut campaign)?;
        tx.commit()?;

        tracing::info!(campaign = %id, closing = mutations.len(), "closed campaign");
        Ok(ApplyOutcome {
            campaign,
            mutations,
            unchanged: false,
            dry_run: false,
        })
    }
}
