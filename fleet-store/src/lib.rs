//! # fleet-store
//!
//! SQLite persistence for repositories, campaign specs, campaigns and
//! changesets.
//!
//! All reads and writes go through a [`StoreTx`]. Write transactions are
//! opened with `BEGIN IMMEDIATE`, so two writers serialize on the database
//! lock and the loser waits up to the configured busy timeout. Dropping a
//! `StoreTx` without calling [`StoreTx::commit`] rolls it back.

#![forbid(unsafe_code)]

mod campaigns;
mod changesets;
pub mod error;
pub mod queue;
mod repos;
pub mod requests;
mod rows;
mod schema;
mod specs;

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

pub use error::StoreError;
pub use queue::{Claim, SyncedState};
pub use requests::{CampaignSpecInput, ChangesetSpecInput};
pub use specs::RewireMapping;

/// Handle on the fleet database.
#[derive(Debug)]
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (creating if needed) the database at `path` and install the schema.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| error::io_err(dir, e))?;
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(busy_timeout)?;
        let journal_mode: String =
            conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        tracing::debug!(path = %path.display(), journal_mode = %journal_mode, "opened store");

        Self::init(conn, Some(path))
    }

    /// A private, throwaway database. Used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        schema::install_schema(&conn)?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Begin a write transaction, blocking on the database lock.
    pub fn transact(&mut self) -> Result<StoreTx<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(StoreTx { tx })
    }

    /// Begin a read transaction; takes no lock until the first read.
    pub fn read(&mut self) -> Result<StoreTx<'_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        Ok(StoreTx { tx })
    }
}

/// An open transaction. Every row operation lives on this type.
pub struct StoreTx<'conn> {
    tx: Transaction<'conn>,
}

impl StoreTx<'_> {
    pub fn commit(self) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback()?;
        Ok(())
    }
}

impl Deref for StoreTx<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}
