use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use fleet_core::{CampaignId, Changeset, ChangesetId, CodeHost, RepoId};

use crate::rows::{changeset_from_row, id_list, CHANGESET_COLUMNS};
use crate::{StoreError, StoreTx};

impl StoreTx<'_> {
    /// Insert `changeset` and return its new id. The `id` field is ignored.
    pub fn create_changeset(&self, cs: &Changeset) -> Result<ChangesetId, StoreError> {
        let diff = cs.diff_stat;
        self.execute(
            "INSERT INTO changesets(repo_id, external_service_type, external_id, external_state, \
             current_spec_id, previous_spec_id, owned_by_campaign_id, campaign_ids, \
             publication_state, reconciler_state, closing, unsynced, added_to_campaign, \
             diff_stat_added, diff_stat_changed, diff_stat_deleted, failure_message, \
             num_failures, num_resets, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
             ?17, ?18, ?19, ?20, ?21)",
            params![
                cs.repo_id.0,
                cs.external_service_type.as_str(),
                cs.external_id,
                cs.external_state.map(|s| s.as_str()),
                cs.current_spec_id.map(|id| id.0),
                cs.previous_spec_id.map(|id| id.0),
                cs.owned_by_campaign_id.map(|id| id.0),
                id_list(cs.campaign_ids.iter().map(|id| id.0)),
                cs.publication_state.as_str(),
                cs.reconciler_state.as_str(),
                cs.closing,
                cs.unsynced,
                cs.added_to_campaign,
                diff.map(|d| d.added),
                diff.map(|d| d.changed),
                diff.map(|d| d.deleted),
                cs.failure_message,
                cs.num_failures,
                cs.num_resets,
                cs.created_at,
                cs.updated_at,
            ],
        )?;
        Ok(ChangesetId(self.last_insert_rowid()))
    }

    /// Write every mutable column of `changeset`. Bumps `updated_at`.
    pub fn update_changeset(&self, cs: &mut Changeset) -> Result<(), StoreError> {
        cs.updated_at = Utc::now().max(cs.updated_at);
        let diff = cs.diff_stat;
        let n = self.execute(
            "UPDATE changesets SET external_id = ?2, external_state = ?3, current_spec_id = ?4, \
             previous_spec_id = ?5, owned_by_campaign_id = ?6, campaign_ids = ?7, \
             publication_state = ?8, reconciler_state = ?9, closing = ?10, unsynced = ?11, \
             added_to_campaign = ?12, diff_stat_added = ?13, diff_stat_changed = ?14, \
             diff_stat_deleted = ?15, failure_message = ?16, num_failures = ?17, \
             num_resets = ?18, updated_at = ?19 WHERE id = ?1",
            params![
                cs.id.0,
                cs.external_id,
                cs.external_state.map(|s| s.as_str()),
                cs.current_spec_id.map(|id| id.0),
                cs.previous_spec_id.map(|id| id.0),
                cs.owned_by_campaign_id.map(|id| id.0),
                id_list(cs.campaign_ids.iter().map(|id| id.0)),
                cs.publication_state.as_str(),
                cs.reconciler_state.as_str(),
                cs.closing,
                cs.unsynced,
                cs.added_to_campaign,
                diff.map(|d| d.added),
                diff.map(|d| d.changed),
                diff.map(|d| d.deleted),
                cs.failure_message,
                cs.num_failures,
                cs.num_resets,
                cs.updated_at,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::not_found("changeset", cs.id));
        }
        Ok(())
    }

    pub fn delete_changeset(&self, id: ChangesetId) -> Result<(), StoreError> {
        let n = self.execute("DELETE FROM changesets WHERE id = ?1", params![id.0])?;
        if n == 0 {
            return Err(StoreError::not_found("changeset", id));
        }
        Ok(())
    }

    pub fn changeset(&self, id: ChangesetId) -> Result<Option<Changeset>, StoreError> {
        Ok(self
            .query_row(
                &format!("SELECT {CHANGESET_COLUMNS} FROM changesets WHERE id = ?1"),
                params![id.0],
                changeset_from_row,
            )
            .optional()?)
    }

    /// A changeset already tracking `external_id` in `repo`, whichever
    /// campaign it belongs to.
    pub fn changeset_by_external(
        &self,
        repo: RepoId,
        external_id: &str,
        host: &CodeHost,
    ) -> Result<Option<Changeset>, StoreError> {
        Ok(self
            .query_row(
                &format!(
                    "SELECT {CHANGESET_COLUMNS} FROM changesets \
                     WHERE repo_id = ?1 AND external_id = ?2 AND external_service_type = ?3"
                ),
                params![repo.0, external_id, host.as_str()],
                changeset_from_row,
            )
            .optional()?)
    }

    /// Changesets that are members of `campaign` or owned by it (owned but
    /// detached ones included), ordered by id.
    pub fn list_changesets_attached_or_owned(
        &self,
        campaign: CampaignId,
    ) -> Result<Vec<Changeset>, StoreError> {
        self.list_changesets_where(
            "owned_by_campaign_id = ?1 \
             OR EXISTS (SELECT 1 FROM json_each(changesets.campaign_ids) m WHERE m.value = ?1)",
            campaign,
        )
    }

    pub fn list_changesets_attached(
        &self,
        campaign: CampaignId,
    ) -> Result<Vec<Changeset>, StoreError> {
        self.list_changesets_where(
            "EXISTS (SELECT 1 FROM json_each(changesets.campaign_ids) m WHERE m.value = ?1)",
            campaign,
        )
    }

    fn list_changesets_where(
        &self,
        filter: &str,
        campaign: CampaignId,
    ) -> Result<Vec<Changeset>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {CHANGESET_COLUMNS} FROM changesets WHERE {filter} ORDER BY id"
        ))?;
        let changesets = stmt
            .query_map(params![campaign.0], changeset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(changesets)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use fleet_core::{ExternalState, Repo};

    use crate::Store;

    use super::*;

    fn repo(tx: &StoreTx<'_>) -> Repo {
        tx.create_repo("github.com/acme/b", CodeHost::GitHub, false)
            .unwrap()
    }

    #[test]
    fn tracking_changeset_roundtrips() {
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.transact().unwrap();
        let repo = repo(&tx);

        let mut cs = Changeset::new_tracking(CampaignId(1), &repo, "42", Utc::now());
        cs.id = tx.create_changeset(&cs).unwrap();
        let loaded = tx.changeset(cs.id).unwrap().expect("changeset");
        assert_eq!(loaded.external_id.as_deref(), Some("42"));
        assert_eq!(loaded.campaign_ids, BTreeSet::from([CampaignId(1)]));
        assert!(loaded.unsynced);
        assert_eq!(loaded.diff_stat, None);

        cs.external_state = Some(ExternalState::Merged);
        cs.attach(CampaignId(7));
        tx.update_changeset(&mut cs).unwrap();
        let loaded = tx
            .changeset_by_external(repo.id, "42", &CodeHost::GitHub)
            .unwrap()
            .expect("by external id");
        assert_eq!(loaded.external_state, Some(ExternalState::Merged));
        assert!(loaded.is_attached_to(CampaignId(7)));
        assert!(tx
            .changeset_by_external(repo.id, "42", &CodeHost::GitLab)
            .unwrap()
            .is_none());
    }

    #[test]
    fn membership_queries_use_the_json_column() {
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.transact().unwrap();
        let repo = repo(&tx);

        let mut a = Changeset::new_tracking(CampaignId(1), &repo, "1", Utc::now());
        a.attach(CampaignId(2));
        a.id = tx.create_changeset(&a).unwrap();
        let mut b = Changeset::new_tracking(CampaignId(3), &repo, "2", Utc::now());
        b.id = tx.create_changeset(&b).unwrap();

        let ids = |v: Vec<Changeset>| v.into_iter().map(|c| c.id).collect::<Vec<_>>();
        assert_eq!(ids(tx.list_changesets_attached(CampaignId(2)).unwrap()), vec![a.id]);
        assert_eq!(ids(tx.list_changesets_attached(CampaignId(3)).unwrap()), vec![b.id]);
        assert!(tx.list_changesets_attached(CampaignId(9)).unwrap().is_empty());

        tx.delete_changeset(a.id).unwrap();
        assert!(tx.changeset(a.id).unwrap().is_none());
        assert!(matches!(
            tx.delete_changeset(a.id),
            Err(StoreError::NotFound { .. })
        ));
    }
}
