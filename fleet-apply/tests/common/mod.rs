#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use fleet_apply::{ApplyOptions, ApplyOutcome, ApplyService};
use fleet_core::{
    Actor, BranchChangeset, CampaignSpec, Changeset, ChangesetId, ChangesetSpecDescription,
    CodeHost, ExternalState, GitCommit, Namespace, UserId,
};
use fleet_store::{CampaignSpecInput, ChangesetSpecInput, Store, SyncedState};

pub const REPO_A: &str = "github.com/acme/a";
pub const REPO_B: &str = "github.com/acme/b";
pub const REPO_C: &str = "gitlab.com/acme/c";
pub const REPO_PRIVATE: &str = "github.com/acme/private";
pub const REPO_PHAB: &str = "phabricator.acme.dev/d";

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// An in-memory store with the standard set of repositories.
pub fn seeded_store() -> Store {
    seed(Store::open_in_memory().expect("store"))
}

/// A file-backed store at `path` with the standard set of repositories.
pub fn seeded_store_at(path: &Path) -> Store {
    seed(Store::open(path, Duration::from_secs(5)).expect("store"))
}

fn seed(mut store: Store) -> Store {
    let tx = store.transact().expect("tx");
    tx.create_repo(REPO_A, CodeHost::GitHub, false).unwrap();
    tx.create_repo(REPO_B, CodeHost::GitHub, false).unwrap();
    tx.create_repo(REPO_C, CodeHost::GitLab, false).unwrap();
    tx.create_repo(REPO_PRIVATE, CodeHost::GitHub, true).unwrap();
    tx.create_repo(REPO_PHAB, CodeHost::Phabricator, false).unwrap();
    for n in 1..=5 {
        tx.create_repo(&format!("github.com/acme/r{n}"), CodeHost::GitHub, false)
            .unwrap();
    }
    tx.commit().unwrap();
    store
}

pub fn branch(head_ref: &str, line: &str) -> ChangesetSpecDescription {
    ChangesetSpecDescription::Branch(BranchChangeset {
        base_ref: "refs/heads/main".into(),
        base_rev: "d34db33f".into(),
        head_ref: head_ref.into(),
        title: "Bump deps".into(),
        body: String::new(),
        commits: vec![GitCommit {
            message: "bump".into(),
            diff: format!("@@ -1 +1 @@\n-version = 1\n+{line}\n"),
            author_name: None,
            author_email: None,
        }],
        published: false,
    })
}

/// A branch spec on `refs/heads/bump` whose diff adds `line`.
pub fn bump(line: &str) -> ChangesetSpecDescription {
    branch("refs/heads/bump", line)
}

pub fn tracking(external_id: &str) -> ChangesetSpecDescription {
    ChangesetSpecDescription::Tracking {
        external_id: external_id.into(),
    }
}

pub fn create_spec(
    store: &mut Store,
    user: i64,
    name: &str,
    changesets: Vec<(&str, ChangesetSpecDescription)>,
) -> CampaignSpec {
    let tx = store.transact().expect("tx");
    let spec = tx
        .create_campaign_spec(
            UserId(user),
            &CampaignSpecInput {
                namespace: Namespace::User(UserId(user)),
                name: name.into(),
                description: format!("{name} campaign"),
                changesets: changesets
                    .into_iter()
                    .map(|(repository, spec)| ChangesetSpecInput {
                        repository: repository.into(),
                        spec,
                    })
                    .collect(),
            },
        )
        .expect("create spec");
    tx.commit().expect("commit");
    spec
}

pub fn apply(store: &mut Store, actor: Actor, spec: &CampaignSpec) -> ApplyOutcome {
    ApplyService::new(store)
        .with_clock(fixed_now)
        .apply(&actor, &ApplyOptions::new(spec.rand_id.clone()))
        .expect("apply")
}

pub fn changeset(store: &mut Store, id: ChangesetId) -> Option<Changeset> {
    store.read().expect("read").changeset(id).expect("query")
}

pub fn changeset_count(store: &mut Store) -> i64 {
    store
        .read()
        .expect("read")
        .query_row("SELECT COUNT(1) FROM changesets", [], |row| row.get(0))
        .expect("count")
}

/// Pretend the worker processed `id` and opened it on the code host.
pub fn publish(store: &mut Store, id: ChangesetId, external_id: &str) {
    store
        .claim(id)
        .expect("claim")
        .complete(opened(external_id))
        .expect("complete");
}

pub fn opened(external_id: &str) -> SyncedState {
    SyncedState {
        external_id: Some(external_id.into()),
        external_state: ExternalState::Open,
    }
}
