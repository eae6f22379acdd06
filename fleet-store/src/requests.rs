//! Input documents for creating campaign specs, as read from YAML or JSON.

use serde::{Deserialize, Serialize};

use fleet_core::{ChangesetSpecDescription, Namespace};

/// A campaign spec as submitted, before repositories are resolved.
///
/// ```yaml
/// namespace: { kind: user, id: 1 }
/// name: bump-deps
/// description: Bump all the things
/// changesets:
///   - repository: github.com/acme/a
///     spec:
///       kind: branch
///       base_ref: refs/heads/main
///       head_ref: refs/heads/bump-deps
///       title: Bump deps
///   - repository: github.com/acme/b
///     spec: { kind: tracking, external_id: "42" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignSpecInput {
    pub namespace: Namespace,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub changesets: Vec<ChangesetSpecInput>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetSpecInput {
    /// Repository name, resolved against the `repos` table.
    pub repository: String,
    pub spec: ChangesetSpecDescription,
}
