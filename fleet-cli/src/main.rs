//! Fleet: declarative campaigns of changesets across many repositories.
//!
//! # Usage
//!
//! ```text
//! fleet init
//! fleet repo add <name> [--host github|gitlab|...] [--private]
//! fleet repo grant <name> --to <user-id>
//! fleet repo list
//! fleet spec create <file>
//! fleet apply <rand-id> [--ensure-campaign <id>] [--fail-if-exists] [--dry-run] [--json]
//! fleet close <campaign-id> [--close-changesets]
//! fleet status [--campaign <name>] [--json]
//! fleet worker claim [--hold-ms <ms>] | complete [<id>] | error [<id>] -m <msg> | retry
//! ```
//!
//! `--user <id>` and `--site-admin` override the identity from
//! `~/.fleet/config.yaml` for a single invocation.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use commands::{
    apply::ApplyArgs, close::CloseArgs, init::InitArgs, repo::RepoCommand, spec::SpecCommand,
    status::StatusArgs, worker::WorkerCommand,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "fleet",
    version,
    about = "Apply campaign specs and reconcile their changesets",
    long_about = None,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Identity overrides accepted by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Act as this user instead of the configured one.
    #[arg(long, global = true, value_name = "ID")]
    pub user: Option<i64>,

    /// Act as a site admin.
    #[arg(long, global = true)]
    pub site_admin: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write ~/.fleet/config.yaml and create the database.
    Init(InitArgs),

    /// Manage the repositories campaigns can target.
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Upload campaign specs.
    Spec {
        #[command(subcommand)]
        command: SpecCommand,
    },

    /// Apply a campaign spec, creating or updating its campaign.
    Apply(ApplyArgs),

    /// Close a campaign.
    Close(CloseArgs),

    /// Show how far each campaign's changesets have converged.
    Status(StatusArgs),

    /// Drive the reconciler queue by hand.
    Worker {
        #[command(subcommand)]
        command: WorkerCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let global = cli.global;
    match cli.command {
        Commands::Init(args) => args.run(&global),
        Commands::Repo { command } => commands::repo::run(&global, command),
        Commands::Spec { command } => commands::spec::run(&global, command),
        Commands::Apply(args) => args.run(&global),
        Commands::Close(args) => args.run(&global),
        Commands::Status(args) => args.run(&global),
        Commands::Worker { command } => commands::worker::run(&global, command),
    }
}

/// Logs go to stderr so `--json` output stays machine-readable.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
