//! Embedded SQLite store: event log, materialized tables, change feed.
//!
//! Runtime defaults:
//! - `journal_mode = WAL` so readers proceed while a writer appends
//! - `busy_timeout` (default 5s) so a writer waits for the write lock instead of failing fast
//! - `foreign_keys = ON`; the materialized tables declare no foreign keys
//!   because deletes do not cascade (orphans are retained)
//!
//! Every mutation runs inside one `BEGIN IMMEDIATE` transaction taken by
//! [`Store::transact`], which makes the per-aggregate `max(version) + 1`
//! computation race-free across connections and processes.

pub mod change_feed;
pub mod event_store;
pub mod project;
pub mod query;
pub mod rebuild;
pub mod schema;

use rusqlite::{Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::{Error, Result};

/// Busy timeout used when none is configured.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the single storage file.
///
/// The connection sits behind a mutex so the store can be shared between
/// request threads; write isolation itself comes from the immediate-mode
/// transaction, not from the mutex.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at `path`, apply pragmas, and create any
    /// missing schema objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or opening,
    /// configuring, or bootstrapping the database fails.
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        use anyhow::Context as _;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create store directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("open store database {}", path.display()))?;
        configure_connection(&conn, busy_timeout).context("configure sqlite pragmas")?;
        schema::bootstrap(&conn).context("create store schema")?;

        tracing::debug!(path = %path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open a private in-memory store (tests, ephemeral tools).
    ///
    /// # Errors
    ///
    /// Returns an error if configuring or bootstrapping the database fails.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::bootstrap(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run read-only work against the store.
    ///
    /// # Errors
    ///
    /// Propagates errors from `f`, or [`Error::LockPoisoned`].
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside an immediate-mode transaction.
    ///
    /// Commits when `f` succeeds. When `f` fails the transaction is rolled
    /// back and `f`'s error is returned; a failing rollback is logged and
    /// does not replace the original error.
    ///
    /// # Errors
    ///
    /// Returns the error from `f`, from `BEGIN IMMEDIATE`, or from `COMMIT`.
    pub fn transact<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::error!(
                        error = %rollback_err,
                        original = %err,
                        "rollback failed after aborted transaction"
                    );
                }
                Err(err)
            }
        }
    }

    /// Close the underlying connection.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite refuses to close (e.g. unfinalized
    /// statements) or the lock was poisoned.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner().map_err(|_| Error::LockPoisoned)?;
        conn.close().map_err(|(_, err)| Error::Storage(err))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }
}

fn configure_connection(conn: &Connection, busy_timeout: Duration) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(busy_timeout)?;
    Ok(())
}
