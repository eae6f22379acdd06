//! Rewiring a campaign's changesets to a new campaign spec.
//!
//! ## Protocol
//!
//! 1. Walk the correspondence table. Each changeset spec either updates the
//!    changeset it matched, attaches to a changeset already tracking the same
//!    external id, or creates a new changeset.
//! 2. Walk the loaded changesets that were not attached in step 1 and detach
//!    them: owned unpublished ones are deleted, owned published ones are
//!    queued for closing, everything else just loses its membership.
//!
//! A changeset the worker is still processing is never rewritten or
//! deleted; rewiring fails with [`ApplyError::ChangesetProcessing`] instead.
//! 3. Persist the campaign with the sorted membership list. Changesets in
//!    repositories the acting user cannot see are never written and keep
//!    their place in that list.
//!
//! Every write is reported as a [`ChangesetMutation`]. A changeset that is
//! already in the desired state is not written at all.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use fleet_core::{
    Campaign, CampaignId, Changeset, ChangesetId, ChangesetSpec, ChangesetSpecId, ReconcilerState,
    Repo, RepoId,
};
use fleet_store::{RewireMapping, StoreTx};

use crate::associations::Associations;
use crate::ApplyError;

// ---------------------------------------------------------------------------
// Mutations
// ---------------------------------------------------------------------------

/// One changeset write performed by the rewirer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangesetMutation {
    /// A new changeset row: unpublished branch or published tracking.
    Created { changeset: ChangesetId, repo: RepoId },
    /// A branch changeset moved to a new spec and re-queued.
    Updated {
        changeset: ChangesetId,
        previous_spec: Option<ChangesetSpecId>,
        current_spec: ChangesetSpecId,
    },
    /// An errored tracking changeset re-queued without a membership change.
    Reenqueued { changeset: ChangesetId },
    /// An existing changeset joined the campaign, or was marked as added.
    Attached { changeset: ChangesetId },
    /// A changeset lost its membership and nothing else.
    Detached { changeset: ChangesetId },
    /// An owned, published changeset detached and queued for closing.
    Closing { changeset: ChangesetId },
    /// An owned changeset that never reached the code host, removed.
    Deleted { changeset: ChangesetId },
}

impl ChangesetMutation {
    pub fn changeset(&self) -> ChangesetId {
        match self {
            ChangesetMutation::Created { changeset, .. }
            | ChangesetMutation::Updated { changeset, .. }
            | ChangesetMutation::Reenqueued { changeset }
            | ChangesetMutation::Attached { changeset }
            | ChangesetMutation::Detached { changeset }
            | ChangesetMutation::Closing { changeset }
            | ChangesetMutation::Deleted { changeset } => *changeset,
        }
    }
}

// ---------------------------------------------------------------------------
// rewire
// ---------------------------------------------------------------------------

/// Bring the changesets of `campaign` in line with the associations loaded
/// for its new spec, then persist the campaign.
///
/// `campaign.id` must already exist in the store. On error the caller must
/// drop the transaction: earlier writes of this call are not undone here.
pub fn rewire(
    tx: &StoreTx<'_>,
    campaign: &mut Campaign,
    assoc: &Associations,
    now: DateTime<Utc>,
) -> Result<Vec<ChangesetMutation>, ApplyError> {
    let mut rewirer = Rewirer {
        tx,
        campaign: campaign.id,
        assoc,
        now,
        working: assoc.changesets.clone(),
        attached: BTreeSet::new(),
        mutations: Vec::new(),
    };

    for mapping in &assoc.mappings {
        rewirer.apply_mapping(mapping)?;
    }
    rewirer.detach_unmatched()?;

    campaign.changeset_ids = rewirer.attached.iter().copied().collect();
    tx.update_campaign(campaign)?;

    Ok(rewirer.mutations)
}

struct Rewirer<'a, 'conn> {
    tx: &'a StoreTx<'conn>,
    campaign: CampaignId,
    assoc: &'a Associations,
    now: DateTime<Utc>,
    /// Copies of `assoc.changesets`, same positions, updated as they are
    /// written so a changeset matched twice is seen in its latest state.
    working: Vec<Changeset>,
    attached: BTreeSet<ChangesetId>,
    mutations: Vec<ChangesetMutation>,
}

impl Rewirer<'_, '_> {
    fn apply_mapping(&mut self, mapping: &RewireMapping) -> Result<(), ApplyError> {
        let assoc = self.assoc;
        let repo = assoc
            .repo(mapping.repo_id)
            .ok_or(ApplyError::RepoNotFound(mapping.repo_id))?;
        if !repo.external_service_type.supports_changesets() {
            return Err(ApplyError::UnsupportedRepo {
                repo: repo.name.clone(),
                host: repo.external_service_type.clone(),
            });
        }
        let spec = assoc.spec(mapping.changeset_spec_id).ok_or_else(|| {
            ApplyError::SpecNotFound(format!("changeset spec {}", mapping.changeset_spec_id))
        })?;

        let id = match spec.description.external_id() {
            Some(external_id) => self.attach_tracking(repo, external_id, mapping.changeset_id)?,
            None => self.rewire_branch(repo, spec, mapping.changeset_id)?,
        };
        self.attached.insert(id);
        Ok(())
    }

    /// A tracking spec: attach the changeset that already tracks the external
    /// id, or start tracking it.
    fn attach_tracking(
        &mut self,
        repo: &Repo,
        external_id: &str,
        matched: Option<ChangesetId>,
    ) -> Result<ChangesetId, ApplyError> {
        let existing = match matched {
            Some(id) => Some(self.load(id)?),
            None => self
                .tx
                .changeset_by_external(repo.id, external_id, &repo.external_service_type)?,
        };

        let Some(mut cs) = existing else {
            let mut cs = Changeset::new_tracking(self.campaign, repo, external_id, self.now);
            cs.id = self.tx.create_changeset(&cs)?;
            tracing::info!(
                changeset = %cs.id,
                repo = %repo.name,
                external_id,
                "tracking changeset"
            );
            self.record(
                &cs,
                ChangesetMutation::Created {
                    changeset: cs.id,
                    repo: repo.id,
                },
            );
            return Ok(cs.id);
        };

        let errored = cs.reconciler_state == ReconcilerState::Errored;
        if !errored && cs.added_to_campaign && cs.is_attached_to(self.campaign) {
            tracing::debug!(changeset = %cs.id, "tracking changeset already attached");
            return Ok(cs.id);
        }

        ensure_idle(&cs)?;
        if errored {
            cs.reset_queued()?;
        }
        cs.added_to_campaign = true;
        let joined = cs.attach(self.campaign);
        self.tx.update_changeset(&mut cs)?;

        let mutation = if errored && !joined {
            ChangesetMutation::Reenqueued { changeset: cs.id }
        } else {
            ChangesetMutation::Attached { changeset: cs.id }
        };
        self.record(&cs, mutation);
        Ok(cs.id)
    }

    /// A branch spec: create the changeset, or move the matched one to the
    /// new spec.
    fn rewire_branch(
        &mut self,
        repo: &Repo,
        spec: &ChangesetSpec,
        matched: Option<ChangesetId>,
    ) -> Result<ChangesetId, ApplyError> {
        let Some(id) = matched else {
            let mut cs = Changeset::new_branch(
                self.campaign,
                spec,
                repo.external_service_type.clone(),
                self.now,
            );
            cs.id = self.tx.create_changeset(&cs)?;
            tracing::info!(
                changeset = %cs.id,
                repo = %repo.name,
                spec = %spec.id,
                "created changeset"
            );
            self.record(
                &cs,
                ChangesetMutation::Created {
                    changeset: cs.id,
                    repo: repo.id,
                },
            );
            return Ok(cs.id);
        };

        let mut cs = self
            .working_copy(id)
            .cloned()
            .ok_or(ApplyError::ChangesetNotFound(id))?;
        if cs.is_attached_to(self.campaign) && cs.current_spec_id == Some(spec.id) {
            tracing::debug!(changeset = %cs.id, "changeset already on spec");
            return Ok(cs.id);
        }

        ensure_idle(&cs)?;
        let previous_spec = cs.current_spec_id;
        cs.previous_spec_id = previous_spec;
        cs.current_spec_id = Some(spec.id);
        cs.diff_stat = Some(spec.diff_stat);
        cs.closing = false;
        cs.attach(self.campaign);
        cs.reset_queued()?;
        self.tx.update_changeset(&mut cs)?;

        tracing::info!(changeset = %cs.id, spec = %spec.id, "updated changeset to new spec");
        self.record(
            &cs,
            ChangesetMutation::Updated {
                changeset: cs.id,
                previous_spec,
                current_spec: spec.id,
            },
        );
        Ok(cs.id)
    }

    fn detach_unmatched(&mut self) -> Result<(), ApplyError> {
        for pos in 0..self.working.len() {
            let mut cs = self.working[pos].clone();
            if self.attached.contains(&cs.id) {
                continue;
            }
            if !self.assoc.is_accessible(cs.repo_id) {
                tracing::warn!(
                    changeset = %cs.id,
                    repo = %cs.repo_id,
                    "repository not accessible, leaving changeset untouched"
                );
                if cs.is_attached_to(self.campaign) {
                    self.attached.insert(cs.id);
                }
                continue;
            }

            let owned_branch = cs.owned_by(self.campaign) && cs.current_spec_id.is_some();
            let mutation = if owned_branch && !cs.published() {
                ensure_idle(&cs)?;
                self.tx.delete_changeset(cs.id)?;
                tracing::info!(changeset = %cs.id, "deleted unpublished changeset");
                ChangesetMutation::Deleted { changeset: cs.id }
            } else if owned_branch {
                let settled = cs.closing
                    && cs.reconciler_state == ReconcilerState::Queued
                    && !cs.is_attached_to(self.campaign);
                if settled {
                    continue;
                }
                ensure_idle(&cs)?;
                cs.closing = true;
                cs.reset_queued()?;
                cs.detach(self.campaign);
                self.tx.update_changeset(&mut cs)?;
                tracing::info!(changeset = %cs.id, "detached changeset, closing it");
                ChangesetMutation::Closing { changeset: cs.id }
            } else {
                if !cs.is_attached_to(self.campaign) {
                    continue;
                }
                ensure_idle(&cs)?;
                cs.detach(self.campaign);
                self.tx.update_changeset(&mut cs)?;
                tracing::info!(changeset = %cs.id, "detached changeset");
                ChangesetMutation::Detached { changeset: cs.id }
            };
            self.working[pos] = cs;
            self.mutations.push(mutation);
        }
        Ok(())
    }

    /// The changeset from the loaded set, else straight from the store.
    fn load(&self, id: ChangesetId) -> Result<Changeset, ApplyError> {
        if let Some(cs) = self.working_copy(id) {
            return Ok(cs.clone());
        }
        self.tx
            .changeset(id)?
            .ok_or(ApplyError::ChangesetNotFound(id))
    }

    fn working_copy(&self, id: ChangesetId) -> Option<&Changeset> {
        self.assoc.position(id).map(|pos| &self.working[pos])
    }

    fn record(&mut self, cs: &Changeset, mutation: ChangesetMutation) {
        if let Some(pos) = self.assoc.position(cs.id) {
            self.working[pos] = cs.clone();
        }
        self.mutations.push(mutation);
    }
}

/// A `processing` row belongs to a worker that has not reported back.
pub(crate) fn ensure_idle(cs: &Changeset) -> Result<(), ApplyError> {
    if cs.reconciler_state == ReconcilerState::Processing {
        return Err(ApplyError::ChangesetProcessing(cs.id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_serialize_with_a_kind_tag() {
        let m = ChangesetMutation::Updated {
            changeset: ChangesetId(5),
            previous_spec: None,
            current_spec: ChangesetSpecId(9),
        };
        assert_eq!(
            serde_json::to_value(&m).unwrap(),
            serde_json::json!({
                "kind": "updated",
                "changeset": 5,
                "previous_spec": null,
                "current_spec": 9,
            })
        );
        assert_eq!(m.changeset(), ChangesetId(5));
    }
}
