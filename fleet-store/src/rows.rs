//! Row ↔ domain conversions shared by the table modules.

use std::collections::BTreeSet;
use std::str::FromStr;

use rusqlite::types::Type;
use rusqlite::Row;
use sha2::{Digest, Sha256};

use fleet_core::{
    Campaign, CampaignId, CampaignSpec, CampaignSpecId, Changeset, ChangesetId, ChangesetSpec,
    ChangesetSpecDescription, ChangesetSpecId, DiffStat, Namespace, OrgId, Repo, RepoId, UserId,
};

pub(crate) const REPO_COLUMNS: &str = "id, name, external_service_type, private";

pub(crate) const CAMPAIGN_SPEC_COLUMNS: &str =
    "id, rand_id, namespace_user_id, namespace_org_id, user_id, name, description, created_at";

pub(crate) const CHANGESET_SPEC_COLUMNS: &str = "id, rand_id, campaign_spec_id, repo_id, user_id, spec, \
     diff_stat_added, diff_stat_changed, diff_stat_deleted, created_at";

pub(crate) const CAMPAIGN_COLUMNS: &str = "id, name, description, namespace_user_id, namespace_org_id, \
     campaign_spec_id, initial_applier_id, last_applier_id, last_applied_at, closed_at, \
     changeset_ids, created_at, updated_at";

pub(crate) const CHANGESET_COLUMNS: &str = "id, repo_id, external_service_type, external_id, \
     external_state, current_spec_id, previous_spec_id, owned_by_campaign_id, campaign_ids, \
     publication_state, reconciler_state, closing, unsynced, added_to_campaign, \
     diff_stat_added, diff_stat_changed, diff_stat_deleted, failure_message, num_failures, \
     num_resets, created_at, updated_at";

/// Parse a TEXT column through the type's `FromStr`.
fn parse_col<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse::<T>()
        .map_err(|msg| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into()))
}

fn parse_opt_col<T: FromStr<Err = String>>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        s.parse::<T>()
            .map_err(|msg| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into()))
    })
    .transpose()
}

fn json_col<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn namespace_col(row: &Row<'_>, user_idx: usize, org_idx: usize) -> rusqlite::Result<Namespace> {
    let user: Option<i64> = row.get(user_idx)?;
    let org: Option<i64> = row.get(org_idx)?;
    match (user, org) {
        (Some(user), None) => Ok(Namespace::User(UserId(user))),
        (None, Some(org)) => Ok(Namespace::Org(OrgId(org))),
        _ => Err(rusqlite::Error::FromSqlConversionFailure(
            user_idx,
            Type::Integer,
            "namespace must have exactly one of user or org".into(),
        )),
    }
}

pub(crate) fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repo> {
    Ok(Repo {
        id: RepoId(row.get(0)?),
        name: row.get(1)?,
        external_service_type: parse_col(row, 2)?,
        private: row.get(3)?,
    })
}

pub(crate) fn campaign_spec_from_row(row: &Row<'_>) -> rusqlite::Result<CampaignSpec> {
    Ok(CampaignSpec {
        id: CampaignSpecId(row.get(0)?),
        rand_id: row.get(1)?,
        namespace: namespace_col(row, 2, 3)?,
        user_id: UserId(row.get(4)?),
        name: row.get(5)?,
        description: row.get(6)?,
        created_at: row.get(7)?,
    })
}

pub(crate) fn changeset_spec_from_row(row: &Row<'_>) -> rusqlite::Result<ChangesetSpec> {
    let description: ChangesetSpecDescription = json_col(row, 5)?;
    Ok(ChangesetSpec {
        id: ChangesetSpecId(row.get(0)?),
        rand_id: row.get(1)?,
        campaign_spec_id: CampaignSpecId(row.get(2)?),
        repo_id: RepoId(row.get(3)?),
        user_id: UserId(row.get(4)?),
        description,
        diff_stat: DiffStat {
            added: row.get(6)?,
            changed: row.get(7)?,
            deleted: row.get(8)?,
        },
        created_at: row.get(9)?,
    })
}

pub(crate) fn campaign_from_row(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    Ok(Campaign {
        id: CampaignId(row.get(0)?),
        name: row.get(1)?,
        description: row.get(2)?,
        namespace: namespace_col(row, 3, 4)?,
        campaign_spec_id: CampaignSpecId(row.get(5)?),
        initial_applier_id: row.get::<_, Option<i64>>(6)?.map(UserId),
        last_applier_id: row.get::<_, Option<i64>>(7)?.map(UserId),
        last_applied_at: row.get(8)?,
        closed_at: row.get(9)?,
        changeset_ids: json_col(row, 10)?,
        created_at: row.get(11)?,
        updated_at: row.get(12)?,
    })
}

pub(crate) fn changeset_from_row(row: &Row<'_>) -> rusqlite::Result<Changeset> {
    let diff_stat = match (
        row.get::<_, Option<i32>>(14)?,
        row.get::<_, Option<i32>>(15)?,
        row.get::<_, Option<i32>>(16)?,
    ) {
        (Some(added), Some(changed), Some(deleted)) => Some(DiffStat {
            added,
            changed,
            deleted,
        }),
        _ => None,
    };
    let campaign_ids: BTreeSet<CampaignId> = json_col(row, 8)?;

    Ok(Changeset {
        id: ChangesetId(row.get(0)?),
        repo_id: RepoId(row.get(1)?),
        external_service_type: parse_col(row, 2)?,
        external_id: row.get(3)?,
        external_state: parse_opt_col(row, 4)?,
        current_spec_id: row.get::<_, Option<i64>>(5)?.map(ChangesetSpecId),
        previous_spec_id: row.get::<_, Option<i64>>(6)?.map(ChangesetSpecId),
        owned_by_campaign_id: row.get::<_, Option<i64>>(7)?.map(CampaignId),
        campaign_ids,
        publication_state: parse_col(row, 9)?,
        reconciler_state: parse_col(row, 10)?,
        closing: row.get(11)?,
        unsynced: row.get(12)?,
        added_to_campaign: row.get(13)?,
        diff_stat,
        failure_message: row.get(17)?,
        num_failures: row.get(18)?,
        num_resets: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

/// SHA-256 hex digest of `bytes`.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(bytes);
    hex::encode(h.finalize())
}

/// JSON array of raw ids, for `IN (SELECT value FROM json_each(?))`.
pub(crate) fn id_list<I: IntoIterator<Item = i64>>(ids: I) -> String {
    let ids: Vec<i64> = ids.into_iter().collect();
    serde_json::Value::from(ids).to_string()
}
