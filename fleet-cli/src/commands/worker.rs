//! `fleet worker`: stand in for the code-host worker that drains the
//! reconciler queue.
//!
//! Every subcommand claims and resolves its changeset inside one write
//! transaction, so an apply running at the same time waits for it.

use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use fleet_core::{ChangesetId, ExternalState};
use fleet_store::{Claim, Store, SyncedState};

use super::Session;
use crate::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum WorkerCommand {
    /// Claim the oldest queued changeset, hold it, then put it back.
    Claim(ClaimArgs),

    /// Claim a changeset and record a successful run.
    Complete(CompleteArgs),

    /// Claim a changeset and record a failed run.
    Error(ErrorArgs),

    /// Re-queue every errored changeset that has retries left.
    Retry,
}

#[derive(Args, Debug)]
pub struct ClaimArgs {
    /// How long to hold the claim, blocking other writers.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    pub hold_ms: u64,
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    /// Defaults to the oldest queued changeset.
    pub changeset_id: Option<i64>,

    /// Id of the change request on the code host, once it exists.
    #[arg(long)]
    pub external_id: Option<String>,

    /// draft | open | closed | merged | deleted
    #[arg(long, default_value = "open")]
    pub state: ExternalState,
}

#[derive(Args, Debug)]
pub struct ErrorArgs {
    /// Defaults to the oldest queued changeset.
    pub changeset_id: Option<i64>,

    #[arg(long, short = 'm')]
    pub message: String,
}

pub fn run(global: &GlobalArgs, cmd: WorkerCommand) -> Result<()> {
    let mut session = Session::open(global)?;
    match cmd {
        WorkerCommand::Claim(args) => {
            let Some(claim) = session.store.claim_next()? else {
                println!("Queue is empty.");
                return Ok(());
            };
            let cs = claim.changeset();
            println!("Claimed changeset {} (repo {})", cs.id, cs.repo_id);
            thread::sleep(Duration::from_millis(args.hold_ms));
            claim.release()?;
            println!("Released it back to the queue.");
        }
        WorkerCommand::Complete(args) => {
            let Some(claim) = claim_changeset(&mut session.store, args.changeset_id)? else {
                println!("Queue is empty.");
                return Ok(());
            };
            let id = claim.changeset().id;
            let cs = claim
                .complete(SyncedState {
                    external_id: args.external_id,
                    external_state: args.state,
                })
                .with_context(|| format!("failed to complete changeset {id}"))?;
            println!(
                "✓ Changeset {} completed ({})",
                cs.id,
                cs.external_id.as_deref().unwrap_or("unpublished")
            );
        }
        WorkerCommand::Error(args) => {
            let Some(claim) = claim_changeset(&mut session.store, args.changeset_id)? else {
                println!("Queue is empty.");
                return Ok(());
            };
            let id = claim.changeset().id;
            let cs = claim
                .fail(&args.message)
                .with_context(|| format!("failed to record error for {id}"))?;
            println!(
                "Changeset {} is {} after {} failure(s)",
                cs.id,
                cs.reconciler_state.as_str(),
                cs.num_failures
            );
        }
        WorkerCommand::Retry => {
            let tx = session.store.transact()?;
            let n = tx.retry_errored()?;
            tx.commit()?;
            println!("Re-queued {n} changeset(s).");
        }
    }
    Ok(())
}

/// The named changeset, or the oldest queued one.
fn claim_changeset(store: &mut Store, id: Option<i64>) -> Result<Option<Claim<'_>>> {
    match id {
        Some(id) => store
            .claim(ChangesetId(id))
            .map(Some)
            .with_context(|| format!("failed to claim changeset {id}")),
        None => store.claim_next().context("failed to claim a changeset"),
    }
}
