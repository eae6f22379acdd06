//! `fleet close <campaign-id> [--close-changesets]`

use anyhow::Result;
use clap::Args;
use tabled::{settings::Style, Table};

use fleet_apply::ApplyService;
use fleet_core::CampaignId;

use super::apply::mutation_rows;
use super::{engine_error, print_json, Session};
use crate::GlobalArgs;

#[derive(Args, Debug)]
pub struct CloseArgs {
    pub campaign_id: i64,

    /// Also close every open changeset the campaign created.
    #[arg(long)]
    pub close_changesets: bool,

    #[arg(long)]
    pub json: bool,
}

impl CloseArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let mut session = Session::open(global)?;
        let outcome = ApplyService::new(&mut session.store)
            .close_campaign(
                &session.actor,
                CampaignId(self.campaign_id),
                self.close_changesets,
            )
            .map_err(|e| {
                engine_error(e, format!("failed to close campaign {}", self.campaign_id))
            })?;

        if self.json {
            return print_json(&outcome);
        }
        let campaign = &outcome.campaign;
        if outcome.unchanged {
            println!("Campaign '{}' (id {}) is already closed.", campaign.name, campaign.id);
            return Ok(());
        }
        println!("✓ Closed campaign '{}' (id {})", campaign.name, campaign.id);
        if !outcome.mutations.is_empty() {
            let mut table = Table::new(mutation_rows(&outcome.mutations));
            table.with(Style::rounded());
            println!("{table}");
        }
        Ok(())
    }
}
