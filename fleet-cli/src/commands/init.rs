//! `fleet init`

use anyhow::{Context, Result};
use clap::Args;

use fleet_core::{config, Actor, UserId};

use super::Session;
use crate::GlobalArgs;

/// Write ~/.fleet/config.yaml and create the database.
#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<()> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        let actor = Actor {
            user_id: UserId(global.user.unwrap_or(1)),
            site_admin: global.site_admin,
        };
        let existed = config::config_path_at(&home).exists();
        let config = config::init_at(&home, actor).context("failed to write ~/.fleet/config.yaml")?;
        let session = Session::open_at(&home, global)?;

        if existed {
            println!("✓ Already initialized (user {})", config.user_id);
        } else {
            println!("✓ Initialized fleet for user {}", config.user_id);
        }
        if let Some(path) = session.store.path() {
            println!("  Database: {}", path.display());
        }
        Ok(())
    }
}
