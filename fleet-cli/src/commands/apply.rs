//! `fleet apply <rand-id> [--ensure-campaign <id>] [--fail-if-exists] [--dry-run]`

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use fleet_apply::{ApplyOptions, ApplyOutcome, ApplyService, ChangesetMutation};
use fleet_core::CampaignId;

use super::{engine_error, print_json, Session};
use crate::GlobalArgs;

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Content address printed by `fleet spec create`.
    pub rand_id: String,

    /// Fail unless the spec resolves to this campaign; 0 requires a new one.
    #[arg(long = "ensure-campaign", value_name = "ID")]
    pub ensure_campaign: Option<i64>,

    /// Fail if a campaign with this namespace and name already exists.
    #[arg(long)]
    pub fail_if_exists: bool,

    /// Show what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    #[arg(long)]
    pub json: bool,
}

impl ApplyArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut session = Session::open(global)?;
        let opts = ApplyOptions {
            campaign_spec_rand_id: self.rand_id.clone(),
            ensure_campaign_id: self.ensure_campaign.map(CampaignId),
            fail_if_campaign_exists: self.fail_if_exists,
            dry_run: self.dry_run,
        };
        let outcome = ApplyService::new(&mut session.store)
            .apply(&session.actor, &opts)
            .map_err(|e| {
                engine_error(e, format!("failed to apply campaign spec '{}'", self.rand_id))
            })?;

        if self.json {
            return print_json(&outcome);
        }
        print_outcome(&outcome);
        Ok(())
    }
}

#[derive(Tabled)]
pub(crate) struct MutationRow {
    changeset: i64,
    change: String,
    detail: String,
}

pub(crate) fn mutation_rows(mutations: &[ChangesetMutation]) -> Vec<MutationRow> {
    mutations
        .iter()
        .map(|m| MutationRow {
            changeset: m.changeset().0,
            change: mutation_label(m),
            detail: mutation_detail(m),
        })
        .collect()
}

pub(crate) fn print_outcome(outcome: &ApplyOutcome) {
    let campaign = &outcome.campaign;
    let prefix = if outcome.dry_run { "[dry-run] " } else { "" };

    if outcome.unchanged {
        println!(
            "{prefix}Campaign '{}' (id {}) is already up to date.",
            campaign.name, campaign.id
        );
        return;
    }
    if outcome.dry_run {
        println!(
            "{prefix}Would apply campaign '{}' with {} changeset change(s):",
            campaign.name,
            outcome.mutations.len()
        );
    } else {
        println!(
            "✓ Applied campaign '{}' (id {}) with {} changeset change(s)",
            campaign.name,
            campaign.id,
            outcome.mutations.len()
        );
    }
    if outcome.mutations.is_empty() {
        return;
    }
    let mut table = Table::new(mutation_rows(&outcome.mutations));
    table.with(Style::rounded());
    println!("{table}");
    if outcome.dry_run {
        println!("{prefix}No changes written.");
    }
}

fn mutation_label(m: &ChangesetMutation) -> String {
    match m {
        ChangesetMutation::Created { .. } => "CREATED".green().to_string(),
        ChangesetMutation::Updated { .. } => "UPDATED".yellow().to_string(),
        ChangesetMutation::Reenqueued { .. } => "REQUEUED".yellow().to_string(),
        ChangesetMutation::Attached { .. } => "ATTACHED".cyan().to_string(),
        ChangesetMutation::Detached { .. } => "DETACHED".bright_black().to_string(),
        ChangesetMutation::Closing { .. } => "CLOSING".magenta().to_string(),
        ChangesetMutation::Deleted { .. } => "DELETED".red().to_string(),
    }
}

fn mutation_detail(m: &ChangesetMutation) -> String {
    match m {
        ChangesetMutation::Created { repo, .. } => format!("repo {repo}"),
        ChangesetMutation::Updated {
            previous_spec,
            current_spec,
            ..
        } => match previous_spec {
            Some(prev) => format!("spec {prev} → {current_spec}"),
            None => format!("spec {current_spec}"),
        },
        ChangesetMutation::Reenqueued { .. } => "retrying after error".to_string(),
        ChangesetMutation::Attached { .. } => "joined campaign".to_string(),
        ChangesetMutation::Detached { .. } => "left campaign".to_string(),
        ChangesetMutation::Closing { .. } => "will be closed on the code host".to_string(),
        ChangesetMutation::Deleted { .. } => "never published".to_string(),
    }
}
