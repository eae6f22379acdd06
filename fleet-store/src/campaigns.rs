use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use fleet_core::{Campaign, CampaignId, CampaignSpec, Namespace};

use crate::rows::{campaign_from_row, id_list, CAMPAIGN_COLUMNS};
use crate::{StoreError, StoreTx};

impl StoreTx<'_> {
    /// Insert `campaign` and return its new id. The `id` field is ignored.
    pub fn create_campaign(&self, campaign: &Campaign) -> Result<CampaignId, StoreError> {
        self.execute(
            "INSERT INTO campaigns(name, description, namespace_user_id, namespace_org_id, \
             campaign_spec_id, initial_applier_id, last_applier_id, last_applied_at, closed_at, \
             changeset_ids, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                campaign.name,
                campaign.description,
                campaign.namespace.user_id().map(|u| u.0),
                campaign.namespace.org_id().map(|o| o.0),
                campaign.campaign_spec_id.0,
                campaign.initial_applier_id.map(|u| u.0),
                campaign.last_applier_id.map(|u| u.0),
                campaign.last_applied_at,
                campaign.closed_at,
                id_list(campaign.changeset_ids.iter().map(|id| id.0)),
                campaign.created_at,
                campaign.updated_at,
            ],
        )?;
        Ok(CampaignId(self.last_insert_rowid()))
    }

    /// Write every column of `campaign`. Bumps `updated_at`.
    pub fn update_campaign(&self, campaign: &mut Campaign) -> Result<(), StoreError> {
        campaign.updated_at = Utc::now().max(campaign.updated_at);
        let n = self.execute(
            "UPDATE campaigns SET name = ?2, description = ?3, namespace_user_id = ?4, \
             namespace_org_id = ?5, campaign_spec_id = ?6, initial_applier_id = ?7, \
             last_applier_id = ?8, last_applied_at = ?9, closed_at = ?10, changeset_ids = ?11, \
             updated_at = ?12 WHERE id = ?1",
            params![
                campaign.id.0,
                campaign.name,
                campaign.description,
                campaign.namespace.user_id().map(|u| u.0),
                campaign.namespace.org_id().map(|o| o.0),
                campaign.campaign_spec_id.0,
                campaign.initial_applier_id.map(|u| u.0),
                campaign.last_applier_id.map(|u| u.0),
                campaign.last_applied_at,
                campaign.closed_at,
                id_list(campaign.changeset_ids.iter().map(|id| id.0)),
                campaign.updated_at,
            ],
        )?;
        if n == 0 {
            return Err(StoreError::not_found("campaign", campaign.id));
        }
        Ok(())
    }

    pub fn campaign(&self, id: CampaignId) -> Result<Option<Campaign>, StoreError> {
        Ok(self
            .query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id.0],
                campaign_from_row,
            )
            .optional()?)
    }

    /// The campaign a spec applies to: same namespace, same name.
    pub fn campaign_matching_spec(
        &self,
        spec: &CampaignSpec,
    ) -> Result<Option<Campaign>, StoreError> {
        self.campaign_by_name(spec.namespace, &spec.name)
    }

    pub fn campaign_by_name(
        &self,
        namespace: Namespace,
        name: &str,
    ) -> Result<Option<Campaign>, StoreError> {
        Ok(self
            .query_row(
                &format!(
                    "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
                     WHERE namespace_user_id IS ?1 AND namespace_org_id IS ?2 AND name = ?3"
                ),
                params![
                    namespace.user_id().map(|u| u.0),
                    namespace.org_id().map(|o| o.0),
                    name
                ],
                campaign_from_row,
            )
            .optional()?)
    }

    pub fn list_campaigns(&self) -> Result<Vec<Campaign>, StoreError> {
        let mut stmt =
            self.prepare(&format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns ORDER BY id"))?;
        let campaigns = stmt
            .query_map([], campaign_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(campaigns)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use fleet_core::{ChangesetId, OrgId, UserId};

    use crate::requests::CampaignSpecInput;
    use crate::Store;

    use super::*;

    #[test]
    fn campaigns_match_by_namespace_and_name() {
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.transact().unwrap();
        let spec = tx
            .create_campaign_spec(
                UserId(1),
                &CampaignSpecInput {
                    namespace: Namespace::Org(OrgId(3)),
                    name: "bump-deps".into(),
                    description: String::new(),
                    changesets: vec![],
                },
            )
            .unwrap();
        assert!(tx.campaign_matching_spec(&spec).unwrap().is_none());

        let mut campaign = Campaign::from_spec(&spec, Utc::now());
        campaign.id = tx.create_campaign(&campaign).unwrap();
        let found = tx.campaign_matching_spec(&spec).unwrap().expect("campaign");
        assert_eq!(found.id, campaign.id);
        assert!(tx
            .campaign_by_name(Namespace::User(UserId(3)), "bump-deps")
            .unwrap()
            .is_none());

        campaign.changeset_ids = vec![ChangesetId(2), ChangesetId(5)];
        tx.update_campaign(&mut campaign).unwrap();
        let reloaded = tx.campaign(campaign.id).unwrap().expect("campaign");
        assert_eq!(reloaded.changeset_ids, campaign.changeset_ids);
        assert_eq!(tx.list_campaigns().unwrap().len(), 1);
    }

    #[test]
    fn updating_a_missing_campaign_fails() {
        let mut store = Store::open_in_memory().unwrap();
        let tx = store.transact().unwrap();
        assert!(tx.campaign(CampaignId(99)).unwrap().is_none());

        let spec = tx
            .create_campaign_spec(
                UserId(1),
                &CampaignSpecInput {
                    namespace: Namespace::User(UserId(1)),
                    name: "ghost".into(),
                    description: String::new(),
                    changesets: vec![],
                },
            )
            .unwrap();
        let mut ghost = Campaign::from_spec(&spec, Utc::now());
        ghost.id = CampaignId(99);
        assert!(matches!(
            tx.update_campaign(&mut ghost),
            Err(StoreError::NotFound { entity: "campaign", .. })
        ));
    }
}
