use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use fleet_core::{
    CampaignId, CampaignSpec, CampaignSpecId, ChangesetId, ChangesetSpec,
    ChangesetSpecDescription, ChangesetSpecId, RepoId, UserId,
};

use crate::requests::CampaignSpecInput;
use crate::rows::{
    campaign_spec_from_row, changeset_spec_from_row, sha256_hex, CAMPAIGN_SPEC_COLUMNS,
    CHANGESET_SPEC_COLUMNS,
};
use crate::{StoreError, StoreTx};

/// One row of the correspondence table: a changeset spec of the new campaign
/// spec and the existing changeset it should drive, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewireMapping {
    pub changeset_spec_id: ChangesetSpecId,
    pub changeset_id: Option<ChangesetId>,
    pub repo_id: RepoId,
}

impl StoreTx<'_> {
    /// Store a campaign spec and its changeset specs.
    ///
    /// Specs are content-addressed: submitting the same document as the same
    /// user returns the row created the first time.
    pub fn create_campaign_spec(
        &self,
        user: UserId,
        input: &CampaignSpecInput,
    ) -> Result<CampaignSpec, StoreError> {
        validate(input)?;

        let mut resolved = Vec::with_capacity(input.changesets.len());
        for cs in &input.changesets {
            let repo = self.repo_by_name(&cs.repository)?;
            resolved.push((repo.id, &cs.spec));
        }

        let canonical = serde_json::json!({
            "user_id": user,
            "namespace": input.namespace,
            "name": input.name,
            "description": input.description,
            "changesets": resolved
                .iter()
                .map(|(repo, spec)| serde_json::json!({ "repo_id": repo, "spec": spec }))
                .collect::<Vec<_>>(),
        });
        let rand_id = sha256_hex(&serde_json::to_vec(&canonical)?);

        if let Some(existing) = self.campaign_spec_by_rand_id(&rand_id)? {
            tracing::debug!(rand_id = %rand_id, "campaign spec already exists");
            return Ok(existing);
        }

        let now = Utc::now();
        self.execute(
            "INSERT INTO campaign_specs(rand_id, namespace_user_id, namespace_org_id, user_id, \
             name, description, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                rand_id,
                input.namespace.user_id().map(|u| u.0),
                input.namespace.org_id().map(|o| o.0),
                user.0,
                input.name,
                input.description,
                now,
            ],
        )?;
        let spec_id = CampaignSpecId(self.last_insert_rowid());

        for (idx, (repo, description)) in resolved.iter().enumerate() {
            let diff_stat = description.diff_stat();
            self.execute(
                "INSERT INTO changeset_specs(rand_id, campaign_spec_id, repo_id, user_id, \
                 external_id, head_ref, spec, diff_stat_added, diff_stat_changed, \
                 diff_stat_deleted, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    sha256_hex(format!("{rand_id}:{idx}").as_bytes()),
                    spec_id.0,
                    repo.0,
                    user.0,
                    description.external_id(),
                    description.head_ref(),
                    serde_json::to_string(description)?,
                    diff_stat.added,
                    diff_stat.changed,
                    diff_stat.deleted,
                    now,
                ],
            )?;
        }

        tracing::info!(
            rand_id = %rand_id,
            name = %input.name,
            changeset_specs = resolved.len(),
            "created campaign spec"
        );
        Ok(CampaignSpec {
            id: spec_id,
            rand_id,
            namespace: input.namespace,
            user_id: user,
            name: input.name.clone(),
            description: input.description.clone(),
            created_at: now,
        })
    }

    pub fn campaign_spec_by_rand_id(
        &self,
        rand_id: &str,
    ) -> Result<Option<CampaignSpec>, StoreError> {
        Ok(self
            .query_row(
                &format!("SELECT {CAMPAIGN_SPEC_COLUMNS} FROM campaign_specs WHERE rand_id = ?1"),
                params![rand_id],
                campaign_spec_from_row,
            )
            .optional()?)
    }

    /// Changeset specs of a campaign spec, in submission order.
    pub fn list_changeset_specs(
        &self,
        campaign_spec: CampaignSpecId,
    ) -> Result<Vec<ChangesetSpec>, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {CHANGESET_SPEC_COLUMNS} FROM changeset_specs \
             WHERE campaign_spec_id = ?1 ORDER BY id"
        ))?;
        let specs = stmt
            .query_map(params![campaign_spec.0], changeset_spec_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(specs)
    }

    pub fn changeset_spec(&self, id: ChangesetSpecId) -> Result<ChangesetSpec, StoreError> {
        self.query_row(
            &format!("SELECT {CHANGESET_SPEC_COLUMNS} FROM changeset_specs WHERE id = ?1"),
            params![id.0],
            changeset_spec_from_row,
        )
        .optional()?
        .ok_or_else(|| StoreError::not_found("changeset spec", id))
    }

    /// Pair every changeset spec of `campaign_spec` with the changeset of
    /// `campaign` it corresponds to.
    ///
    /// Tracking specs match on repository and external id among changesets
    /// attached to or owned by the campaign. Branch specs match on repository
    /// and the head ref of the changeset's current spec, among changesets
    /// owned by the campaign. The lowest changeset id wins a tie.
    pub fn changeset_spec_rewire_data(
        &self,
        campaign_spec: CampaignSpecId,
        campaign: CampaignId,
    ) -> Result<Vec<RewireMapping>, StoreError> {
        let mut stmt = self.prepare(
            "SELECT cs.id, cs.repo_id,
               CASE WHEN cs.external_id IS NOT NULL THEN (
                 SELECT c.id FROM changesets c
                 WHERE c.repo_id = cs.repo_id
                   AND c.external_id = cs.external_id
                   AND (c.owned_by_campaign_id = ?2
                        OR EXISTS (SELECT 1 FROM json_each(c.campaign_ids) m WHERE m.value = ?2))
                 ORDER BY c.id LIMIT 1)
               ELSE (
                 SELECT c.id FROM changesets c
                 JOIN changeset_specs cur ON cur.id = c.current_spec_id
                 WHERE c.repo_id = cs.repo_id
                   AND c.owned_by_campaign_id = ?2
                   AND cur.head_ref = cs.head_ref
                 ORDER BY c.id LIMIT 1)
               END
             FROM changeset_specs cs
             WHERE cs.campaign_spec_id = ?1
             ORDER BY cs.id",
        )?;
        let rows = stmt.query_map(params![campaign_spec.0, campaign.0], |row| {
            Ok(RewireMapping {
                changeset_spec_id: ChangesetSpecId(row.get(0)?),
                repo_id: RepoId(row.get(1)?),
                changeset_id: row.get::<_, Option<i64>>(2)?.map(ChangesetId),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn validate(input: &CampaignSpecInput) -> Result<(), StoreError> {
    if input.name.trim().is_empty() {
        return Err(StoreError::InvalidInput("campaign name is empty".into()));
    }
    for cs in &input.changesets {
        let ok = match &cs.spec {
            ChangesetSpecDescription::Branch(b) => {
                !b.head_ref.trim().is_empty() && !b.base_ref.trim().is_empty()
            }
            ChangesetSpecDescription::Tracking { external_id } => !external_id.trim().is_empty(),
        };
        if !ok {
            return Err(StoreError::InvalidInput(format!(
                "changeset spec for {} is missing its ref or external id",
                cs.repository
            )));
        }
    }
    Ok(())
}
