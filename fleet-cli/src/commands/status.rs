//! `fleet status`: convergence of every campaign's changesets.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use fleet_apply::{campaign_status, CampaignConvergence, CampaignStatus, ChangesetStatus};
use fleet_core::{Changeset, PublicationState};

use super::{print_json, Session};
use crate::GlobalArgs;

/// Arguments for `fleet status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only campaigns with this name.
    #[arg(long)]
    pub campaign: Option<String>,

    /// Closed campaigns are hidden unless this is set.
    #[arg(long)]
    pub all: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut session = Session::open(global)?;
        let tx = session.store.read()?;

        let mut campaigns = tx.list_campaigns().context("failed to list campaigns")?;
        if let Some(name) = self.campaign.as_ref() {
            campaigns.retain(|c| c.name == *name);
        }
        if !self.all {
            campaigns.retain(|c| !c.closed());
        }

        let report = campaigns
            .iter()
            .map(|c| campaign_status(&tx, c))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to load changesets")?;

        if self.json {
            return print_json(&report);
        }
        print_report(&report);
        Ok(())
    }
}

#[derive(Tabled)]
struct ChangesetRow {
    #[tabled(rename = "changeset")]
    id: i64,
    #[tabled(rename = "repo")]
    repo: i64,
    #[tabled(rename = "external id")]
    external_id: String,
    #[tabled(rename = "published")]
    published: &'static str,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "diff")]
    diff: String,
    #[tabled(rename = "failure")]
    failure: String,
}

fn print_report(report: &[CampaignStatus]) {
    let failing = report
        .iter()
        .filter(|s| s.convergence == CampaignConvergence::Failing)
        .count();
    println!(
        "Fleet v{} | {} campaigns | {} failing",
        env!("CARGO_PKG_VERSION"),
        report.len(),
        failing,
    );
    if report.is_empty() {
        println!("No campaigns.");
        return;
    }

    let separator = "■".repeat(67).bright_black().to_string();
    println!("{separator}");
    for status in report {
        let campaign = &status.campaign;
        let applied = campaign
            .last_applied_at
            .map(|at| format!("applied {} ago", format_age(Utc::now(), at)))
            .unwrap_or_else(|| "never applied".to_string());
        println!(
            "{} (id {}, {}, {}) {}",
            campaign.name.to_uppercase().bold(),
            campaign.id,
            campaign.namespace,
            applied,
            convergence_label(status.convergence),
        );
        if status.changesets.is_empty() {
            println!("No changesets attached.");
        } else {
            let rows: Vec<ChangesetRow> = status
                .changesets
                .iter()
                .map(|r| changeset_row(&r.changeset, r.status))
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        println!("{separator}");
    }
}

fn changeset_row(cs: &Changeset, status: ChangesetStatus) -> ChangesetRow {
    ChangesetRow {
        id: cs.id.0,
        repo: cs.repo_id.0,
        external_id: cs.external_id.clone().unwrap_or_else(|| "-".to_string()),
        published: match cs.publication_state {
            PublicationState::Published => "yes",
            PublicationState::Unpublished => "no",
        },
        status: status_label(status),
        diff: cs.diff_stat.map(|d| d.to_string()).unwrap_or_default(),
        failure: cs.failure_message.clone().unwrap_or_default(),
    }
}

fn status_label(status: ChangesetStatus) -> String {
    let label = status.as_str().to_uppercase();
    match status {
        ChangesetStatus::Converged => label.green().to_string(),
        ChangesetStatus::Pending | ChangesetStatus::Processing => label.yellow().to_string(),
        ChangesetStatus::Closing => label.magenta().to_string(),
        ChangesetStatus::Retrying => label.red().to_string(),
        ChangesetStatus::Failed => label.red().bold().to_string(),
    }
}

fn convergence_label(convergence: CampaignConvergence) -> String {
    match convergence {
        CampaignConvergence::Converged => "■ CONVERGED".green().bold().to_string(),
        CampaignConvergence::Pending => "■ PENDING".yellow().bold().to_string(),
        CampaignConvergence::Failing => "■ FAILING".red().bold().to_string(),
    }
}

fn format_age(now: DateTime<Utc>, at: DateTime<Utc>) -> String {
    let seconds = now.signed_duration_since(at).num_seconds().max(0);
    match seconds {
        s if s < 60 => format!("{s}s"),
        s if s < 60 * 60 => format!("{}m", s / 60),
        s if s < 60 * 60 * 24 => format!("{}h", s / (60 * 60)),
        s => format!("{}d", s / (60 * 60 * 24)),
    }
}
