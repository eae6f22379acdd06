pub mod apply;
pub mod close;
pub mod init;
pub mod repo;
pub mod spec;
pub mod status;
pub mod worker;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};

use fleet_apply::ApplyError;
use fleet_core::{config, Actor, Config, UserId};
use fleet_store::Store;

use crate::GlobalArgs;

/// Everything a command needs: who is acting and an open store.
pub struct Session {
    pub actor: Actor,
    pub store: Store,
}

impl Session {
    pub fn open(global: &GlobalArgs) -> Result<Self> {
        let home = dirs::home_dir().context("could not determine home directory")?;
        Self::open_at(&home, global)
    }

    pub fn open_at(home: &Path, global: &GlobalArgs) -> Result<Self> {
        let config = config::load_at(home).context("failed to load ~/.fleet/config.yaml")?;
        let actor = resolve_actor(&config, global);
        let path = config::database_path_at(home, &config);
        let store = Store::open(&path, Duration::from_millis(config.busy_timeout_ms))
            .with_context(|| format!("failed to open database '{}'", path.display()))?;
        Ok(Self { actor, store })
    }
}

fn resolve_actor(config: &Config, global: &GlobalArgs) -> Actor {
    let mut actor = config.actor();
    if let Some(user) = global.user {
        actor.user_id = UserId(user);
    }
    actor.site_admin |= global.site_admin;
    actor
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to serialize JSON output")?
    );
    Ok(())
}

/// Wrap an engine error in `what`, telling the user when a retry can help.
pub fn engine_error(err: ApplyError, what: String) -> anyhow::Error {
    if err.is_busy() {
        anyhow::Error::new(err).context(format!(
            "{what}: busy, retry once the worker has finished"
        ))
    } else {
        anyhow::Error::new(err).context(what)
    }
}
