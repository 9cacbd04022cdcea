//! SQLite storage backend.
//!
//! Staging maps directly onto a SQLite transaction: the first staged batch
//! opens `BEGIN IMMEDIATE`, later batches join it, and commit/rollback close
//! it. WAL journaling keeps `load` on a freshly opened handle cheap while a
//! writer is active elsewhere.

use std::path::Path;

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::store::backend::{EntryOp, RawEntry, StorageBackend};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entries (
    skey      TEXT PRIMARY KEY,
    statement TEXT NOT NULL,
    native    TEXT NOT NULL
)";

/// Backend persisting entries in an embedded SQLite database.
pub struct SqliteBackend {
    conn: Connection,
    in_tx: bool,
}

impl SqliteBackend {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens a private in-memory database, mainly for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, in_tx: false })
    }

    fn begin(&mut self) -> Result<()> {
        if !self.in_tx {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_tx = true;
        }
        Ok(())
    }
}

impl StorageBackend for SqliteBackend {
    fn load(&mut self) -> Result<Vec<RawEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT skey, statement, native FROM entries ORDER BY skey")?;
        let rows = stmt.query_map([], |row| {
            Ok(RawEntry {
                key: row.get(0)?,
                statement: row.get(1)?,
                native: row.get(2)?,
            })
        })?;
        let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }

    fn stage(&mut self, ops: &[EntryOp]) -> Result<()> {
        self.begin()?;
        for op in ops {
            match op {
                EntryOp::Put(entry) => {
                    self.conn.execute(
                        "INSERT OR REPLACE INTO entries (skey, statement, native) \
                         VALUES (?1, ?2, ?3)",
                        params![entry.key, entry.statement, entry.native],
                    )?;
                }
                EntryOp::Delete { key } => {
                    self.conn
                        .execute("DELETE FROM entries WHERE skey = ?1", params![key])?;
                }
            }
        }
        Ok(())
    }

    fn commit_staged(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn.execute_batch("COMMIT")?;
            self.in_tx = false;
        }
        Ok(())
    }

    fn rollback_staged(&mut self) -> Result<()> {
        if self.in_tx {
            self.conn.execute_batch("ROLLBACK")?;
            self.in_tx = false;
        }
        Ok(())
    }

    fn replace_all(&mut self, entries: &[RawEntry]) -> Result<()> {
        self.rollback_staged()?;
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        let result = (|| -> Result<()> {
            self.conn.execute("DELETE FROM entries", [])?;
            let mut stmt = self
                .conn
                .prepare("INSERT INTO entries (skey, statement, native) VALUES (?1, ?2, ?3)")?;
            for entry in entries {
                stmt.execute(params![entry.key, entry.statement, entry.native])?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(err) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(err)
            }
        }
    }

    fn clear(&mut self) -> Result<()> {
        self.rollback_staged()?;
        self.conn.execute("DELETE FROM entries", [])?;
        Ok(())
    }
}
