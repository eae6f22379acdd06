//! End-to-end campaign lifecycles: apply, re-apply, detach, close.

mod common;

use common::*;
use fleet_apply::{
    campaign_status, ApplyService, CampaignConvergence, ChangesetMutation, ChangesetStatus,
};
use std::time::Duration;

use fleet_core::{Actor, CodeHost, DiffStat, ExternalState, PublicationState, ReconcilerState};
use fleet_store::{Store, SyncedState};
use tempfile::TempDir;

#[test]
fn branch_spec_v1_v1_v2() {
    let mut store = seeded_store();
    let v1 = create_spec(&mut store, 1, "bump", vec![(REPO_A, bump("v = 2"))]);

    let first = apply(&mut store, Actor::user(1), &v1);
    let c1 = first.campaign.changeset_ids[0];
    let created = changeset(&mut store, c1).unwrap();
    assert_eq!(created.publication_state, PublicationState::Unpublished);
    assert_eq!(created.reconciler_state, ReconcilerState::Queued);
    assert!(created.owned_by(first.campaign.id));
    assert_eq!(
        created.diff_stat,
        Some(DiffStat { added: 0, changed: 1, deleted: 0 })
    );

    // Identical content resolves to the same spec, so nothing moves.
    let again = create_spec(&mut store, 1, "bump", vec![(REPO_A, bump("v = 2"))]);
    assert_eq!(again.id, v1.id);
    let second = apply(&mut store, Actor::user(1), &again);
    assert!(second.mutations.is_empty());
    let unchanged = changeset(&mut store, c1).unwrap();
    assert_eq!(unchanged.reconciler_state, ReconcilerState::Queued);
    assert_eq!(unchanged.previous_spec_id, None);
    assert_eq!(unchanged.current_spec_id, created.current_spec_id);

    let v2 = create_spec(&mut store, 1, "bump", vec![(REPO_A, bump("v = 3\n+extra = true"))]);
    let third = apply(&mut store, Actor::user(1), &v2);
    assert_eq!(third.campaign.changeset_ids, vec![c1]);

    let updated = changeset(&mut store, c1).unwrap();
    assert_eq!(updated.previous_spec_id, created.current_spec_id);
    assert_ne!(updated.current_spec_id, created.current_spec_id);
    assert_eq!(updated.reconciler_state, ReconcilerState::Queued);
    assert_eq!(
        updated.diff_stat,
        Some(DiffStat { added: 1, changed: 1, deleted: 0 })
    );
    assert!(updated.failure_message.is_none());
}

#[test]
fn tracking_spec_creates_unowned_published_changeset() {
    let mut store = seeded_store();
    let v1 = create_spec(&mut store, 1, "track", vec![(REPO_B, tracking("42"))]);
    let outcome = apply(&mut store, Actor::user(1), &v1);

    let id = outcome.campaign.changeset_ids[0];
    let cs = changeset(&mut store, id).unwrap();
    assert_eq!(cs.external_id.as_deref(), Some("42"));
    assert_eq!(cs.publication_state, PublicationState::Published);
    assert!(cs.unsynced);
    assert!(cs.added_to_campaign);
    assert_eq!(cs.reconciler_state, ReconcilerState::Queued);
    assert_eq!(cs.owned_by_campaign_id, None);
    assert_eq!(cs.current_spec_id, None);
}

#[test]
fn errored_tracking_changeset_is_requeued() {
    let mut store = seeded_store();
    let v1 = create_spec(&mut store, 1, "track", vec![(REPO_B, tracking("42"))]);
    let id = apply(&mut store, Actor::user(1), &v1).campaign.changeset_ids[0];

    store
        .claim(id)
        .unwrap()
        .fail("code host unavailable")
        .unwrap();

    let v2 = create_spec(
        &mut store,
        1,
        "track",
        vec![(REPO_B, tracking("42")), (REPO_C, tracking("5"))],
    );
    let outcome = apply(&mut store, Actor::user(1), &v2);
    assert!(outcome
        .mutations
        .contains(&ChangesetMutation::Reenqueued { changeset: id }));

    let cs = changeset(&mut store, id).unwrap();
    assert_eq!(cs.reconciler_state, ReconcilerState::Queued);
    assert_eq!(cs.num_failures, 0);
    assert_eq!(cs.num_resets, 1);
}

#[test]
fn dropping_a_published_changeset_queues_it_for_closing() {
    let mut store = seeded_store();
    let v1 = create_spec(
        &mut store,
        1,
        "bump",
        vec![(REPO_A, bump("v = 2")), (REPO_B, bump("v = 2"))],
    );
    let first = apply(&mut store, Actor::user(1), &v1);
    let campaign = first.campaign.id;
    let (c1, other) = (first.campaign.changeset_ids[0], first.campaign.changeset_ids[1]);
    publish(&mut store, c1, "101");

    let v2 = create_spec(&mut store, 1, "bump", vec![(REPO_B, bump("v = 3"))]);
    let second = apply(&mut store, Actor::user(1), &v2);
    assert_eq!(second.campaign.changeset_ids, vec![other]);
    assert!(second
        .mutations
        .contains(&ChangesetMutation::Closing { changeset: c1 }));

    let closing = changeset(&mut store, c1).unwrap();
    assert!(closing.closing);
    assert_eq!(closing.reconciler_state, ReconcilerState::Queued);
    assert!(!closing.is_attached_to(campaign));
    assert!(closing.owned_by(campaign));
}

#[test]
fn dropping_an_unpublished_changeset_deletes_it() {
    let mut store = seeded_store();
    let v1 = create_spec(
        &mut store,
        1,
        "bump",
        vec![(REPO_A, bump("v = 2")), (REPO_B, bump("v = 2"))],
    );
    let first = apply(&mut store, Actor::user(1), &v1);
    let c1 = first.campaign.changeset_ids[0];

    let v2 = create_spec(&mut store, 1, "bump", vec![(REPO_B, bump("v = 3"))]);
    let second = apply(&mut store, Actor::user(1), &v2);

    assert!(changeset(&mut store, c1).is_none());
    assert!(second
        .mutations
        .contains(&ChangesetMutation::Deleted { changeset: c1 }));
    assert!(!second
        .mutations
        .iter()
        .any(|m| matches!(m, ChangesetMutation::Closing { .. })));
}

#[test]
fn merged_changesets_are_still_queued_for_closing() {
    let mut store = seeded_store();
    let v1 = create_spec(
        &mut store,
        1,
        "bump",
        vec![(REPO_A, bump("v = 2")), (REPO_B, bump("v = 2"))],
    );
    let first = apply(&mut store, Actor::user(1), &v1);
    let c1 = first.campaign.changeset_ids[0];
    publish(&mut store, c1, "55");
    {
        let tx = store.transact().unwrap();
        let mut cs = tx.changeset(c1).unwrap().unwrap();
        cs.external_state = Some(ExternalState::Merged);
        tx.update_changeset(&mut cs).unwrap();
        tx.commit().unwrap();
    }

    let v2 = create_spec(&mut store, 1, "bump", vec![(REPO_B, bump("v = 3"))]);
    let second = apply(&mut store, Actor::user(1), &v2);
    assert!(second
        .mutations
        .contains(&ChangesetMutation::Closing { changeset: c1 }));

    let merged = changeset(&mut store, c1).unwrap();
    assert!(merged.closing);
    assert_eq!(merged.reconciler_state, ReconcilerState::Queued);
    assert_eq!(merged.external_state, Some(ExternalState::Merged));
    assert!(!merged.is_attached_to(second.campaign.id));

    // The next apply cancels the pending close, then queues it again.
    let v3 = create_spec(&mut store, 1, "bump", vec![(REPO_B, bump("v = 4"))]);
    apply(&mut store, Actor::user(1), &v3);
    let still = changeset(&mut store, c1).unwrap();
    assert!(still.closing);
    assert_eq!(still.reconciler_state, ReconcilerState::Queued);
    assert!(still.failure_message.is_none());
}

#[test]
fn closing_a_campaign_closes_its_open_changesets() {
    let mut store = seeded_store();
    let v1 = create_spec(
        &mut store,
        1,
        "bump",
        vec![(REPO_A, bump("v = 2")), (REPO_B, bump("v = 2"))],
    );
    let first = apply(&mut store, Actor::user(1), &v1);
    let (published, unpublished) = (
        first.campaign.changeset_ids[0],
        first.campaign.changeset_ids[1],
    );
    publish(&mut store, published, "77");

    let err = ApplyService::new(&mut store)
        .close_campaign(&Actor::user(2), first.campaign.id, true)
        .unwrap_err();
    assert!(matches!(err, fleet_apply::ApplyError::Forbidden(_)));

    let closed = ApplyService::new(&mut store)
        .with_clock(fixed_now)
        .close_campaign(&Actor::user(1), first.campaign.id, true)
        .expect("close");
    assert_eq!(closed.campaign.closed_at, Some(fixed_now()));
    assert_eq!(
        closed.mutations,
        vec![ChangesetMutation::Closing { changeset: published }]
    );
    assert!(changeset(&mut store, published).unwrap().closing);
    assert!(!changeset(&mut store, unpublished).unwrap().closing);

    let again = ApplyService::new(&mut store)
        .close_campaign(&Actor::user(1), first.campaign.id, true)
        .expect("close again");
    assert!(again.unchanged);
    assert!(again.mutations.is_empty());
}

#[test]
fn status_follows_the_worker() {
    let mut store = seeded_store();
    let v1 = create_spec(
        &mut store,
        1,
        "bump",
        vec![(REPO_A, bump("v = 2")), (REPO_B, tracking("42"))],
    );
    let campaign = apply(&mut store, Actor::user(1), &v1).campaign;

    let status = campaign_status(&store.read().unwrap(), &campaign).unwrap();
    assert_eq!(status.convergence, CampaignConvergence::Pending);
    assert!(status
        .changesets
        .iter()
        .all(|r| r.status == ChangesetStatus::Pending));

    while let Some(claim) = store.claim_next().unwrap() {
        let cs = claim.changeset().clone();
        claim
            .complete(SyncedState {
                external_id: cs.external_id.or(Some(format!("pr-{}", cs.id))),
                external_state: ExternalState::Open,
            })
            .unwrap();
    }

    let status = campaign_status(&store.read().unwrap(), &campaign).unwrap();
    assert_eq!(status.convergence, CampaignConvergence::Converged);
    assert_eq!(status.changesets.len(), 2);
}

#[test]
fn applied_campaign_survives_reopening_the_database() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fleet.db");
    let campaign = {
        let mut store = Store::open(&path, Duration::from_millis(500)).unwrap();
        {
            let tx = store.transact().unwrap();
            tx.create_repo(REPO_A, CodeHost::GitHub, false).unwrap();
            tx.commit().unwrap();
        }
        let v1 = create_spec(&mut store, 1, "bump", vec![(REPO_A, bump("v = 2"))]);
        apply(&mut store, Actor::user(1), &v1).campaign
    };

    let mut store = Store::open(&path, Duration::from_millis(500)).unwrap();
    let tx = store.read().unwrap();
    let reloaded = tx.campaign(campaign.id).unwrap().expect("campaign");
    assert_eq!(reloaded.changeset_ids, campaign.changeset_ids);
    assert_eq!(reloaded.last_applied_at, Some(fixed_now()));
    assert_eq!(tx.list_changesets_attached(campaign.id).unwrap().len(), 1);
}
