//! Domain types for campaigns, campaign specs, and changesets.
//!
//! Identifiers are strongly-typed `i64` newtypes mirroring the database
//! primary keys. All types are serializable via serde so they can cross the
//! store's JSON columns and the CLI's YAML/JSON output unchanged.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::state::{ReconcilerEvent, ReconcilerState, MAX_NUM_RETRIES};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

macro_rules! id_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(
    /// Primary key of a [`Campaign`].
    CampaignId
);
id_newtype!(
    /// Primary key of a [`CampaignSpec`].
    CampaignSpecId
);
id_newtype!(
    /// Primary key of a [`ChangesetSpec`].
    ChangesetSpecId
);
id_newtype!(
    /// Primary key of a [`Changeset`].
    ChangesetId
);
id_newtype!(
    /// Primary key of a [`Repo`].
    RepoId
);
id_newtype!(UserId);
id_newtype!(OrgId);

// ---------------------------------------------------------------------------
// Actor & namespace
// ---------------------------------------------------------------------------

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    #[serde(default)]
    pub site_admin: bool,
}

impl Actor {
    pub fn user(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            site_admin: false,
        }
    }

    pub fn site_admin(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            site_admin: true,
        }
    }

    /// Site admins may act on anything; everyone else only on their own.
    pub fn is_admin_or(&self, owner: UserId) -> bool {
        self.site_admin || self.user_id == owner
    }
}

/// Owner of a campaign: exactly one user or one organization.
///
/// Serialized as `{ kind: user, id: 1 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Namespace {
    User(UserId),
    Org(OrgId),
}

impl Namespace {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Namespace::User(id) => Some(*id),
            Namespace::Org(_) => None,
        }
    }

    pub fn org_id(&self) -> Option<OrgId> {
        match self {
            Namespace::User(_) => None,
            Namespace::Org(id) => Some(*id),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::User(id) => write!(f, "user:{id}"),
            Namespace::Org(id) => write!(f, "org:{id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// Code host kind a repository is mirrored from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CodeHost {
    #[serde(rename = "github")]
    GitHub,
    #[serde(rename = "gitlab")]
    GitLab,
    BitbucketServer,
    Phabricator,
    #[serde(rename = "awscodecommit")]
    AwsCodeCommit,
    Gitolite,
}

impl CodeHost {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeHost::GitHub => "github",
            CodeHost::GitLab => "gitlab",
            CodeHost::BitbucketServer => "bitbucketServer",
            CodeHost::Phabricator => "phabricator",
            CodeHost::AwsCodeCommit => "awscodecommit",
            CodeHost::Gitolite => "gitolite",
        }
    }

    /// Whether the reconciler has a code-host adapter for this kind.
    pub fn supports_changesets(&self) -> bool {
        matches!(
            self,
            CodeHost::GitHub | CodeHost::GitLab | CodeHost::BitbucketServer
        )
    }
}

impl fmt::Display for CodeHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeHost {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(CodeHost::GitHub),
            "gitlab" => Ok(CodeHost::GitLab),
            "bitbucketServer" => Ok(CodeHost::BitbucketServer),
            "phabricator" => Ok(CodeHost::Phabricator),
            "awscodecommit" => Ok(CodeHost::AwsCodeCommit),
            "gitolite" => Ok(CodeHost::Gitolite),
            other => Err(format!(
                "unknown code host '{other}'; expected: github, gitlab, bitbucketServer, \
                 phabricator, awscodecommit, gitolite"
            )),
        }
    }
}

/// A repository known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub id: RepoId,
    pub name: String,
    pub external_service_type: CodeHost,
    /// Private repositories are only visible to users granted access.
    pub private: bool,
}

// ---------------------------------------------------------------------------
// Diff statistics
// ---------------------------------------------------------------------------

/// Line counts of a diff. A removed line directly replaced by an added line
/// within the same hunk counts as one `changed` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffStat {
    pub added: i32,
    pub changed: i32,
    pub deleted: i32,
}

impl DiffStat {
    /// Count the lines of a unified diff.
    pub fn from_unified_diff(diff: &str) -> Self {
        let mut stat = DiffStat::default();
        let (mut hunk_added, mut hunk_deleted) = (0, 0);

        let flush = |stat: &mut DiffStat, added: &mut i32, deleted: &mut i32| {
            let changed = (*added).min(*deleted);
            stat.changed += changed;
            stat.added += *added - changed;
            stat.deleted += *deleted - changed;
            *added = 0;
            *deleted = 0;
        };

        for line in diff.lines() {
            if line.starts_with("@@") || line.starts_with("diff ") {
                flush(&mut stat, &mut hunk_added, &mut hunk_deleted);
            } else if line.starts_with("+++") || line.starts_with("---") {
                continue;
            } else if line.starts_with('+') {
                hunk_added += 1;
            } else if line.starts_with('-') {
                hunk_deleted += 1;
            }
        }
        flush(&mut stat, &mut hunk_added, &mut hunk_deleted);
        stat
    }
}

impl std::ops::Add for DiffStat {
    type Output = DiffStat;

    fn add(self, rhs: DiffStat) -> DiffStat {
        DiffStat {
            added: self.added + rhs.added,
            changed: self.changed + rhs.changed,
            deleted: self.deleted + rhs.deleted,
        }
    }
}

impl fmt::Display for DiffStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{} ~{} -{}", self.added, self.changed, self.deleted)
    }
}

// ---------------------------------------------------------------------------
// Campaign specs
// ---------------------------------------------------------------------------

/// Immutable declaration of the desired state of one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSpec {
    pub id: CampaignSpecId,
    /// Content address (SHA-256 hex) used as the public identifier.
    pub rand_id: String,
    pub namespace: Namespace,
    /// Creator of the spec.
    pub user_id: UserId,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A single commit a branch changeset spec wants pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitCommit {
    pub message: String,
    pub diff: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
}

/// Branch variant: push commits to `head_ref` and optionally open a change
/// request against `base_ref`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchChangeset {
    pub base_ref: String,
    #[serde(default)]
    pub base_rev: String,
    pub head_ref: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub commits: Vec<GitCommit>,
    #[serde(default)]
    pub published: bool,
}

/// What a changeset spec asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ChangesetSpecDescription {
    Branch(BranchChangeset),
    /// Attach to an existing change request without creating content.
    Tracking { external_id: String },
}

impl ChangesetSpecDescription {
    pub fn is_branch(&self) -> bool {
        matches!(self, ChangesetSpecDescription::Branch(_))
    }

    pub fn external_id(&self) -> Option<&str> {
        match self {
            ChangesetSpecDescription::Tracking { external_id } => Some(external_id),
            ChangesetSpecDescription::Branch(_) => None,
        }
    }

    pub fn head_ref(&self) -> Option<&str> {
        match self {
            ChangesetSpecDescription::Branch(branch) => Some(&branch.head_ref),
            ChangesetSpecDescription::Tracking { .. } => None,
        }
    }

    /// Sum of the diff stats of every commit; zero for tracking specs.
    pub fn diff_stat(&self) -> DiffStat {
        match self {
            ChangesetSpecDescription::Branch(branch) => branch
                .commits
                .iter()
                .map(|c| DiffStat::from_unified_diff(&c.diff))
                .fold(DiffStat::default(), |acc, s| acc + s),
            ChangesetSpecDescription::Tracking { .. } => DiffStat::default(),
        }
    }
}

/// One repository-intent within a [`CampaignSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetSpec {
    pub id: ChangesetSpecId,
    pub rand_id: String,
    pub campaign_spec_id: CampaignSpecId,
    pub repo_id: RepoId,
    pub user_id: UserId,
    pub description: ChangesetSpecDescription,
    pub diff_stat: DiffStat,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Campaigns
// ---------------------------------------------------------------------------

/// A named, versioned grouping of changesets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub description: String,
    pub namespace: Namespace,
    pub campaign_spec_id: CampaignSpecId,
    pub initial_applier_id: Option<UserId>,
    pub last_applier_id: Option<UserId>,
    pub last_applied_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Changesets currently attached, sorted ascending.
    #[serde(default)]
    pub changeset_ids: Vec<ChangesetId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// An unsaved campaign shaped after `spec`. `id` stays zero until the
    /// store assigns one.
    pub fn from_spec(spec: &CampaignSpec, now: DateTime<Utc>) -> Self {
        Self {
            id: CampaignId::default(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            namespace: spec.namespace,
            campaign_spec_id: spec.id,
            initial_applier_id: None,
            last_applier_id: None,
            last_applied_at: None,
            closed_at: None,
            changeset_ids: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn closed(&self) -> bool {
        self.closed_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Changesets
// ---------------------------------------------------------------------------

/// Whether the change request exists on the code host yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationState {
    #[default]
    Unpublished,
    Published,
}

impl PublicationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublicationState::Unpublished => "unpublished",
            PublicationState::Published => "published",
        }
    }
}

impl fmt::Display for PublicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PublicationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unpublished" => Ok(PublicationState::Unpublished),
            "published" => Ok(PublicationState::Published),
            other => Err(format!("unknown publication state '{other}'")),
        }
    }
}

/// State of the change request on the code host, as last synced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalState {
    Draft,
    Open,
    Closed,
    Merged,
    Deleted,
}

impl ExternalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalState::Draft => "draft",
            ExternalState::Open => "open",
            ExternalState::Closed => "closed",
            ExternalState::Merged => "merged",
            ExternalState::Deleted => "deleted",
        }
    }

    /// No further close is needed on the code host.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            ExternalState::Closed | ExternalState::Merged | ExternalState::Deleted
        )
    }
}

impl fmt::Display for ExternalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExternalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ExternalState::Draft),
            "open" => Ok(ExternalState::Open),
            "closed" => Ok(ExternalState::Closed),
            "merged" => Ok(ExternalState::Merged),
            "deleted" => Ok(ExternalState::Deleted),
            other => Err(format!("unknown external state '{other}'")),
        }
    }
}

/// Durable record of one external change request, or the intent to open one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Changeset {
    pub id: ChangesetId,
    pub repo_id: RepoId,
    pub external_service_type: CodeHost,
    pub external_id: Option<String>,
    pub external_state: Option<ExternalState>,

    pub current_spec_id: Option<ChangesetSpecId>,
    pub previous_spec_id: Option<ChangesetSpecId>,
    /// Campaign whose spec created this changeset's content. `None` for
    /// tracked changesets.
    pub owned_by_campaign_id: Option<CampaignId>,
    /// Campaigns this changeset is a member of.
    pub campaign_ids: BTreeSet<CampaignId>,

    pub publication_state: PublicationState,
    pub reconciler_state: ReconcilerState,
    pub closing: bool,
    pub unsynced: bool,
    pub added_to_campaign: bool,

    pub diff_stat: Option<DiffStat>,
    pub failure_message: Option<String>,
    pub num_failures: u32,
    /// How many times an apply or close put this changeset back in the queue.
    pub num_resets: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Changeset {
    /// A new unpublished changeset owned by `campaign`, driven by `spec`.
    pub fn new_branch(
        campaign: CampaignId,
        spec: &ChangesetSpec,
        host: CodeHost,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChangesetId::default(),
            repo_id: spec.repo_id,
            external_service_type: host,
            external_id: None,
            external_state: None,
            current_spec_id: Some(spec.id),
            previous_spec_id: None,
            owned_by_campaign_id: Some(campaign),
            campaign_ids: BTreeSet::from([campaign]),
            publication_state: PublicationState::Unpublished,
            reconciler_state: ReconcilerState::Queued,
            closing: false,
            unsynced: false,
            added_to_campaign: false,
            diff_stat: Some(spec.diff_stat),
            failure_message: None,
            num_failures: 0,
            num_resets: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new published changeset that only tracks `external_id`. It is
    /// queued and unsynced so the worker fetches its real state.
    pub fn new_tracking(
        campaign: CampaignId,
        repo: &Repo,
        external_id: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ChangesetId::default(),
            repo_id: repo.id,
            external_service_type: repo.external_service_type.clone(),
            external_id: Some(external_id.to_owned()),
            external_state: None,
            current_spec_id: None,
            previous_spec_id: None,
            owned_by_campaign_id: None,
            campaign_ids: BTreeSet::from([campaign]),
            publication_state: PublicationState::Published,
            reconciler_state: ReconcilerState::Queued,
            closing: false,
            unsynced: true,
            added_to_campaign: true,
            diff_stat: None,
            failure_message: None,
            num_failures: 0,
            num_resets: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn published(&self) -> bool {
        self.publication_state == PublicationState::Published
    }

    pub fn owned_by(&self, campaign: CampaignId) -> bool {
        self.owned_by_campaign_id == Some(campaign)
    }

    pub fn is_attached_to(&self, campaign: CampaignId) -> bool {
        self.campaign_ids.contains(&campaign)
    }

    /// Adds membership. Returns `false` if already a member.
    pub fn attach(&mut self, campaign: CampaignId) -> bool {
        self.campaign_ids.insert(campaign)
    }

    /// Removes membership. Returns `false` if it was not a member.
    pub fn detach(&mut self, campaign: CampaignId) -> bool {
        self.campaign_ids.remove(&campaign)
    }

    pub fn externally_final(&self) -> bool {
        self.external_state.is_some_and(|s| s.is_final())
    }

    /// Drive the reconciler state machine.
    pub fn apply_event(&mut self, event: ReconcilerEvent) -> Result<(), TransitionError> {
        self.reconciler_state = self.reconciler_state.transition(event)?;
        Ok(())
    }

    /// Re-arm the reconciler: back to `Queued` with failure bookkeeping
    /// cleared. Counts toward `num_resets`.
    pub fn reset_queued(&mut self) -> Result<(), TransitionError> {
        self.apply_event(ReconcilerEvent::Enqueue)?;
        self.num_resets += 1;
        self.num_failures = 0;
        self.failure_message = None;
        Ok(())
    }

    /// Record a failed reconciler attempt. Moves to `Errored`, or to the
    /// terminal `Failed` once the retry budget is spent.
    pub fn record_failure(&mut self, message: impl Into<String>) -> Result<(), TransitionError> {
        self.apply_event(ReconcilerEvent::Fail)?;
        self.num_failures += 1;
        self.failure_message = Some(message.into());
        if self.num_failures >= MAX_NUM_RETRIES {
            self.apply_event(ReconcilerEvent::Cancel)?;
        }
        Ok(())
    }

    /// Queued, or errored with retries left.
    pub fn is_cancelable(&self) -> bool {
        match self.reconciler_state {
            ReconcilerState::Queued => true,
            ReconcilerState::Errored => self.num_failures < MAX_NUM_RETRIES,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: i64) -> ChangesetSpec {
        ChangesetSpec {
            id: ChangesetSpecId(id),
            rand_id: format!("spec-{id}"),
            campaign_spec_id: CampaignSpecId(1),
            repo_id: RepoId(7),
            user_id: UserId(1),
            description: ChangesetSpecDescription::Tracking {
                external_id: "42".into(),
            },
            diff_stat: DiffStat {
                added: 1,
                changed: 2,
                deleted: 3,
            },
            created_at: Utc::now(),
        }
    }

    #[test]
    fn newtype_display() {
        assert_eq!(CampaignId(3).to_string(), "3");
        assert_eq!(Namespace::User(UserId(1)).to_string(), "user:1");
        assert_eq!(Namespace::Org(OrgId(9)).to_string(), "org:9");
    }

    #[test]
    fn code_host_roundtrips_through_str() {
        for host in [
            CodeHost::GitHub,
            CodeHost::GitLab,
            CodeHost::BitbucketServer,
            CodeHost::Phabricator,
            CodeHost::AwsCodeCommit,
            CodeHost::Gitolite,
        ] {
            assert_eq!(host.as_str().parse::<CodeHost>().unwrap(), host);
        }
        assert!("svn".parse::<CodeHost>().is_err());
    }

    #[test]
    fn only_three_hosts_support_changesets() {
        assert!(CodeHost::GitHub.supports_changesets());
        assert!(CodeHost::BitbucketServer.supports_changesets());
        assert!(!CodeHost::Phabricator.supports_changesets());
        assert!(!CodeHost::Gitolite.supports_changesets());
    }

    #[test]
    fn diff_stat_pairs_replacements_as_changed() {
        let diff = "diff --git a/README.md b/README.md\n\
                    --- a/README.md\n\
                    +++ b/README.md\n\
                    @@ -1,3 +1,4 @@\n\
                    -old line\n\
                    +new line\n\
                    +extra line\n\
                     context\n\
                    @@ -10,2 +11,1 @@\n\
                    -gone\n";
        let stat = DiffStat::from_unified_diff(diff);
        assert_eq!(
            stat,
            DiffStat {
                added: 1,
                changed: 1,
                deleted: 1
            }
        );
    }

    #[test]
    fn branch_changeset_starts_unpublished_and_queued() {
        let now = Utc::now();
        let cs = Changeset::new_branch(CampaignId(5), &spec(11), CodeHost::GitHub, now);
        assert_eq!(cs.publication_state, PublicationState::Unpublished);
        assert_eq!(cs.reconciler_state, ReconcilerState::Queued);
        assert_eq!(cs.current_spec_id, Some(ChangesetSpecId(11)));
        assert!(cs.owned_by(CampaignId(5)));
        assert!(cs.is_attached_to(CampaignId(5)));
        assert_eq!(cs.diff_stat.map(|d| d.deleted), Some(3));
    }

    #[test]
    fn tracking_changeset_is_unowned_and_unsynced() {
        let repo = Repo {
            id: RepoId(2),
            name: "github.com/acme/b".into(),
            external_service_type: CodeHost::GitHub,
            private: false,
        };
        let cs = Changeset::new_tracking(CampaignId(5), &repo, "42", Utc::now());
        assert!(cs.published());
        assert!(cs.unsynced);
        assert!(cs.added_to_campaign);
        assert_eq!(cs.owned_by_campaign_id, None);
        assert_eq!(cs.current_spec_id, None);
    }

    #[test]
    fn membership_is_a_set() {
        let mut cs = Changeset::new_branch(CampaignId(1), &spec(1), CodeHost::GitLab, Utc::now());
        assert!(!cs.attach(CampaignId(1)));
        assert!(cs.attach(CampaignId(2)));
        assert!(cs.detach(CampaignId(1)));
        assert!(!cs.detach(CampaignId(1)));
        assert_eq!(cs.campaign_ids, BTreeSet::from([CampaignId(2)]));
    }

    #[test]
    fn repeated_failures_exhaust_retries() {
        let mut cs = Changeset::new_branch(CampaignId(1), &spec(1), CodeHost::GitHub, Utc::now());
        for _ in 0..MAX_NUM_RETRIES {
            cs.apply_event(ReconcilerEvent::Claim).unwrap();
            cs.record_failure("push rejected").unwrap();
            if cs.reconciler_state == ReconcilerState::Errored {
                cs.apply_event(ReconcilerEvent::Retry).unwrap();
            }
        }
        assert_eq!(cs.reconciler_state, ReconcilerState::Failed);
        assert!(!cs.is_cancelable());

        cs.reset_queued().unwrap();
        assert_eq!(cs.reconciler_state, ReconcilerState::Queued);
        assert_eq!(cs.num_failures, 0);
        assert_eq!(cs.num_resets, 1);
        assert!(cs.failure_message.is_none());
    }

    #[test]
    fn campaign_serde_roundtrip() {
        let now = Utc::now();
        let spec = CampaignSpec {
            id: CampaignSpecId(4),
            rand_id: "abc".into(),
            namespace: Namespace::Org(OrgId(3)),
            user_id: UserId(1),
            name: "bump-deps".into(),
            description: "Bump dependencies".into(),
            created_at: now,
        };
        let campaign = Campaign::from_spec(&spec, now);
        let yaml = serde_yaml::to_string(&campaign).expect("serialize");
        let back: Campaign = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(back, campaign);
        assert!(!back.closed());
    }
}
