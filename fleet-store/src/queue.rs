//! The reconciler queue.
//!
//! The queue is the set of changesets whose `reconciler_state` is `queued`,
//! oldest `updated_at` first. The engine only enqueues and cancels; the
//! external worker takes rows with [`Store::claim_next`] or [`Store::claim`]
//! and reports the outcome through the returned [`Claim`].
//!
//! A claim is an open write transaction. The row is `processing` only inside
//! it, so other connections never observe a claimed row: they wait on the
//! database lock until the worker completes, fails or releases it. A worker
//! that dies mid-run leaves the row `queued`.

use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use fleet_core::{
    Actor, CampaignId, Changeset, ChangesetId, ExternalState, PublicationState, ReconcilerEvent,
};

use crate::rows::{changeset_from_row, CHANGESET_COLUMNS};
use crate::{Store, StoreError, StoreTx};

pub const CANCELED_MESSAGE: &str = "Canceled";

/// What the worker learned from the code host after processing a changeset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedState {
    /// Set when the change request was opened by this run.
    pub external_id: Option<String>,
    pub external_state: ExternalState,
}

impl Store {
    /// Cancel pending reconciler work for changesets owned by `campaign` in
    /// repositories `actor` can see.
    ///
    /// Runs in its own write transaction, so it waits for any worker that
    /// currently holds a [`Claim`] and then commits before the caller starts
    /// its main transaction. Returns the number of canceled rows.
    pub fn cancel_queued_campaign_changesets(
        &mut self,
        campaign: CampaignId,
        actor: &Actor,
    ) -> Result<usize, StoreError> {
        let tx = self.transact()?;
        let mut stmt = tx.prepare(&format!(
            "SELECT {CHANGESET_COLUMNS} FROM changesets c
             WHERE c.owned_by_campaign_id = ?1 AND c.reconciler_state IN ('queued', 'errored')
               AND EXISTS (
                 SELECT 1 FROM repos r WHERE r.id = c.repo_id
                   AND (?2 OR r.private = 0 OR EXISTS (
                         SELECT 1 FROM repo_permissions p
                         WHERE p.repo_id = r.id AND p.user_id = ?3)))
             ORDER BY c.id"
        ))?;
        let candidates = stmt
            .query_map(
                params![campaign.0, actor.site_admin, actor.user_id.0],
                changeset_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let mut canceled = 0;
        for mut cs in candidates.into_iter().filter(Changeset::is_cancelable) {
            cs.apply_event(ReconcilerEvent::Cancel)?;
            cs.failure_message = Some(CANCELED_MESSAGE.to_owned());
            tx.update_changeset(&mut cs)?;
            canceled += 1;
        }
        tx.commit()?;

        if canceled > 0 {
            tracing::info!(campaign = %campaign, canceled, "canceled queued changesets");
        }
        Ok(canceled)
    }

    /// Claim the oldest queued changeset, if any.
    pub fn claim_next(&mut self) -> Result<Option<Claim<'_>>, StoreError> {
        let tx = self.transact()?;
        let next = tx
            .query_row(
                &format!(
                    "SELECT {CHANGESET_COLUMNS} FROM changesets WHERE reconciler_state = 'queued' \
                     ORDER BY updated_at, id LIMIT 1"
                ),
                [],
                changeset_from_row,
            )
            .optional()?;
        match next {
            Some(cs) => Ok(Some(Claim::take(tx, cs)?)),
            None => Ok(None),
        }
    }

    /// Claim a specific changeset. Fails unless it is queued.
    pub fn claim(&mut self, id: ChangesetId) -> Result<Claim<'_>, StoreError> {
        let tx = self.transact()?;
        let cs = tx.load_changeset(id)?;
        Claim::take(tx, cs)
    }
}

/// A changeset a worker is processing.
///
/// Holds the database write lock until [`Claim::complete`], [`Claim::fail`]
/// or [`Claim::release`]. Dropping it is the same as releasing it.
pub struct Claim<'conn> {
    tx: StoreTx<'conn>,
    changeset: Changeset,
}

impl<'conn> Claim<'conn> {
    fn take(tx: StoreTx<'conn>, mut changeset: Changeset) -> Result<Self, StoreError> {
        changeset.apply_event(ReconcilerEvent::Claim)?;
        tx.update_changeset(&mut changeset)?;
        tracing::debug!(changeset = %changeset.id, "claimed changeset");
        Ok(Self { tx, changeset })
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    /// Record a successful run and commit.
    pub fn complete(self, synced: SyncedState) -> Result<Changeset, StoreError> {
        let Claim { tx, mut changeset } = self;
        changeset.apply_event(ReconcilerEvent::Succeed)?;
        if let Some(external_id) = synced.external_id {
            changeset.external_id = Some(external_id);
            changeset.publication_state = PublicationState::Published;
        }
        changeset.external_state = Some(synced.external_state);
        changeset.closing = false;
        changeset.unsynced = false;
        changeset.failure_message = None;
        tx.update_changeset(&mut changeset)?;
        tx.commit()?;
        Ok(changeset)
    }

    /// Record a failed run and commit. The changeset becomes `errored`, or
    /// `failed` once the retry budget is spent.
    pub fn fail(self, message: &str) -> Result<Changeset, StoreError> {
        let Claim { tx, mut changeset } = self;
        changeset.record_failure(message)?;
        tx.update_changeset(&mut changeset)?;
        tx.commit()?;
        tracing::debug!(
            changeset = %changeset.id,
            state = %changeset.reconciler_state,
            failures = changeset.num_failures,
            "changeset errored"
        );
        Ok(changeset)
    }

    /// Give the changeset back to the queue untouched.
    pub fn release(self) -> Result<(), StoreError> {
        self.tx.rollback()
    }
}

impl StoreTx<'_> {
    /// Put every errored changeset back in the queue. Returns how many.
    pub fn retry_errored(&self) -> Result<usize, StoreError> {
        let mut stmt = self.prepare(&format!(
            "SELECT {CHANGESET_COLUMNS} FROM changesets WHERE reconciler_state = 'errored' \
             ORDER BY id"
        ))?;
        let errored = stmt
            .query_map([], changeset_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);

        let n = errored.len();
        for mut cs in errored {
            cs.apply_event(ReconcilerEvent::Retry)?;
            self.update_changeset(&mut cs)?;
        }
        Ok(n)
    }

    fn load_changeset(&self, id: ChangesetId) -> Result<Changeset, StoreError> {
        self.changeset(id)?
            .ok_or_else(|| StoreError::not_found("changeset", id))
    }
}
