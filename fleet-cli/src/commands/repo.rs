//! `fleet repo add|grant|list`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use fleet_core::{CodeHost, UserId};

use super::Session;
use crate::GlobalArgs;

#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Register a repository.
    Add(AddArgs),

    /// Give a user access to a private repository.
    Grant(GrantArgs),

    /// List registered repositories.
    List,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Repository name (e.g. "github.com/acme/api").
    pub name: String,

    /// Code host kind: github | gitlab | bitbucketServer | phabricator |
    /// awscodecommit | gitolite.
    #[arg(long, default_value = "github")]
    pub host: CodeHost,

    /// Only visible to users with an explicit grant.
    #[arg(long)]
    pub private: bool,
}

#[derive(Args, Debug)]
pub struct GrantArgs {
    pub name: String,

    #[arg(long = "to", value_name = "USER_ID")]
    pub user_id: i64,
}

#[derive(Tabled)]
struct RepoRow {
    id: i64,
    name: String,
    host: String,
    visibility: &'static str,
}

pub fn run(global: &GlobalArgs, cmd: RepoCommand) -> Result<()> {
    let mut session = Session::open(global)?;
    let tx = session.store.transact()?;
    match cmd {
        RepoCommand::Add(args) => {
            let repo = tx
                .create_repo(&args.name, args.host, args.private)
                .with_context(|| format!("failed to add repository '{}'", args.name))?;
            tx.commit()?;
            println!("✓ Added repository '{}' (id {})", repo.name, repo.id);
        }
        RepoCommand::Grant(args) => {
            let repo = tx.repo_by_name(&args.name)?;
            tx.grant_repo_access(repo.id, UserId(args.user_id))?;
            tx.commit()?;
            println!("✓ Granted user {} access to '{}'", args.user_id, repo.name);
        }
        RepoCommand::List => {
            let repos = tx.list_repos()?;
            if repos.is_empty() {
                println!("No repositories registered.");
                println!("Run: fleet repo add <name>");
                return Ok(());
            }
            let rows: Vec<RepoRow> = repos
                .into_iter()
                .map(|r| RepoRow {
                    id: r.id.0,
                    name: r.name,
                    host: r.external_service_type.to_string(),
                    visibility: if r.private { "private" } else { "public" },
                })
                .collect();
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }
    Ok(())
}
