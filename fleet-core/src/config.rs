//! Per-user fleet configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.fleet/
//!   config.yaml   (mode 0600, created by `fleet init`)
//!   fleet.db      (SQLite store, unless `database` overrides it)
//! ```
//!
//! # API pattern
//!
//! Every function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Actor, UserId};

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const DATABASE_FILE: &str = "fleet.db";

/// Contents of `~/.fleet/config.yaml`. Every field has a default, so a
/// missing file behaves like an empty one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Identity used for applies when `--user` is not given.
    #[serde(default = "default_user_id")]
    pub user_id: UserId,
    #[serde(default)]
    pub site_admin: bool,
    /// Overrides `~/.fleet/fleet.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    /// How long a write transaction waits for the database lock.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            site_admin: false,
            database: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Config {
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            site_admin: self.site_admin,
        }
    }
}

fn default_user_id() -> UserId {
    UserId(1)
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.fleet/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn fleet_dir_at(home: &Path) -> Result<PathBuf, ConfigError> {
    let dir = home.join(".fleet");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.fleet/config.yaml` (pure, no I/O).
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".fleet").join("config.yaml")
}

/// The database file: `config.database` if set, else `<home>/.fleet/fleet.db`.
pub fn database_path_at(home: &Path, config: &Config) -> PathBuf {
    match &config.database {
        Some(path) if path.is_absolute() => path.clone(),
        Some(path) => home.join(".fleet").join(path),
        None => home.join(".fleet").join(DATABASE_FILE),
    }
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.fleet/config.yaml`.
///
/// Returns [`Config::default`] if the file is absent and
/// `ConfigError::Parse` (with path + line context) if it is malformed.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    if contents.trim().is_empty() {
        return Ok(Config::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the config.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    fleet_dir_at(home)?;
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// 4. Init
// ---------------------------------------------------------------------------

/// Write a config for `actor` unless one already exists.
///
/// Idempotent: an existing config is loaded and returned unchanged.
pub fn init_at(home: &Path, actor: Actor) -> Result<Config, ConfigError> {
    if config_path_at(home).exists() {
        return load_at(home);
    }
    let config = Config {
        user_id: actor.user_id,
        site_admin: actor.site_admin,
        ..Config::default()
    };
    save_at(home, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(actor: Actor) -> Result<Config, ConfigError> {
    init_at(&home()?, actor)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
