//! Everything the rewirer needs to know about one campaign, loaded up front.
//!
//! The indices are plain `id → position` maps over the loaded vectors. They
//! are rebuilt on every [`Associations::load`] and never outlive the
//! transaction they were read in.

use std::collections::{BTreeSet, HashMap};

use fleet_core::{
    Actor, CampaignId, CampaignSpecId, Changeset, ChangesetId, ChangesetSpec, ChangesetSpecId,
    Repo, RepoId,
};
use fleet_store::{RewireMapping, StoreTx};

use crate::ApplyError;

#[derive(Debug, Clone)]
pub struct Associations {
    /// Repositories the acting user may see, out of every repository
    /// referenced by the new specs or the existing changesets.
    pub accessible_repos: HashMap<RepoId, Repo>,
    /// Changesets attached to the campaign, or owned by it but detached.
    pub changesets: Vec<Changeset>,
    /// Changeset specs of the campaign spec being applied.
    pub changeset_specs: Vec<ChangesetSpec>,
    /// Spec → existing changeset correspondence, in spec order.
    pub mappings: Vec<RewireMapping>,

    changeset_index: HashMap<ChangesetId, usize>,
    spec_index: HashMap<ChangesetSpecId, usize>,
}

impl Associations {
    /// Read the associations of `campaign` for applying `campaign_spec`.
    ///
    /// `campaign` is zero for a campaign that does not exist yet.
    pub fn load(
        tx: &StoreTx<'_>,
        actor: &Actor,
        campaign_spec: CampaignSpecId,
        campaign: CampaignId,
    ) -> Result<Self, ApplyError> {
        let changeset_specs = tx.list_changeset_specs(campaign_spec)?;
        let changesets = tx.list_changesets_attached_or_owned(campaign)?;

        let repo_ids: Vec<RepoId> = changeset_specs
            .iter()
            .map(|s| s.repo_id)
            .chain(changesets.iter().map(|c| c.repo_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let known = tx.repos_by_ids(&repo_ids)?;
        if let Some(missing) = repo_ids.iter().find(|id| !known.contains_key(id)) {
            return Err(ApplyError::RepoNotFound(*missing));
        }
        let accessible_repos = tx.resolve_accessible(actor, &repo_ids)?;

        let mappings = tx.changeset_spec_rewire_data(campaign_spec, campaign)?;

        let changeset_index = changesets
            .iter()
            .enumerate()
            .map(|(pos, c)| (c.id, pos))
            .collect();
        let spec_index = changeset_specs
            .iter()
            .enumerate()
            .map(|(pos, s)| (s.id, pos))
            .collect();

        tracing::debug!(
            campaign = %campaign,
            changesets = changesets.len(),
            specs = changeset_specs.len(),
            accessible = accessible_repos.len(),
            "loaded associations"
        );

        Ok(Self {
            accessible_repos,
            changesets,
            changeset_specs,
            mappings,
            changeset_index,
            spec_index,
        })
    }

    pub fn changeset(&self, id: ChangesetId) -> Option<&Changeset> {
        self.position(id).map(|pos| &self.changesets[pos])
    }

    /// Position of `id` in [`Associations::changesets`].
    pub(crate) fn position(&self, id: ChangesetId) -> Option<usize> {
        self.changeset_index.get(&id).copied()
    }

    pub fn spec(&self, id: ChangesetSpecId) -> Option<&ChangesetSpec> {
        self.spec_index.get(&id).map(|&pos| &self.changeset_specs[pos])
    }

    pub fn repo(&self, id: RepoId) -> Option<&Repo> {
        self.accessible_repos.get(&id)
    }

    pub fn is_accessible(&self, id: RepoId) -> bool {
        self.accessible_repos.contains_key(&id)
    }
}
