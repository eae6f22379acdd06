//! `fleet spec create <file>`

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use fleet_store::CampaignSpecInput;

use super::{print_json, Session};
use crate::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum SpecCommand {
    /// Upload a campaign spec from a YAML or JSON file.
    Create(CreateArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    pub file: PathBuf,

    /// Emit the stored campaign spec as JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(global: &GlobalArgs, cmd: SpecCommand) -> Result<()> {
    match cmd {
        SpecCommand::Create(args) => create(global, args),
    }
}

fn create(global: &GlobalArgs, args: CreateArgs) -> Result<()> {
    let contents = std::fs::read_to_string(&args.file)
        .with_context(|| format!("cannot read '{}'", args.file.display()))?;
    // JSON is valid YAML, so one parser covers both.
    let input: CampaignSpecInput = serde_yaml::from_str(&contents)
        .with_context(|| format!("invalid campaign spec '{}'", args.file.display()))?;

    let mut session = Session::open(global)?;
    let user = session.actor.user_id;
    let tx = session.store.transact()?;
    let spec = tx
        .create_campaign_spec(user, &input)
        .with_context(|| format!("failed to create campaign spec '{}'", input.name))?;
    tx.commit()?;

    if args.json {
        return print_json(&spec);
    }
    println!(
        "✓ Created campaign spec '{}' with {} changeset spec(s)",
        spec.name,
        input.changesets.len()
    );
    println!("  rand id: {}", spec.rand_id);
    println!("  Apply with: fleet apply {}", spec.rand_id);
    Ok(())
}
