// Part of camwatchd. SPDX-License-Identifier: Apache-2.0

//! The metadata store (§4.A): cameras, recordings, and schedules persisted
//! in a single embedded SQLite database, with all writes serialized through
//! a dedicated writer thread.

pub mod camera;
pub mod check;
pub mod recording;
mod schema;
pub mod schedule;
pub mod testutil;
mod writer;

pub use crate::schema::{get_schema_version, init};
pub use crate::writer::Writer;

use base::{Error, ErrorKind};
use std::path::Path;
use std::sync::Arc;

/// Handle to the metadata store: owns the single writer thread and knows
/// where the database file lives so read methods can open short-lived
/// read-only connections.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    db_path: std::path::PathBuf,
    writer: Writer,
}

impl Store {
    /// Opens (creating and migrating if necessary) the database at
    /// `db_path`.
    pub fn open(db_path: &Path) -> Result<Store, Error> {
        let mut conn = rusqlite::Connection::open(db_path)
            .map_err(|e| Error::wrap(ErrorKind::Internal, "opening database", e))?;
        conn.pragma_update(None, "journal_mode", "wal")
            .map_err(|e| Error::wrap(ErrorKind::Internal, "setting journal_mode", e))?;
        schema::init(&mut conn)?;
        let writer = Writer::spawn(conn);
        Ok(Store {
            inner: Arc::new(StoreInner {
                db_path: db_path.to_owned(),
                writer,
            }),
        })
    }

    pub(crate) async fn write<T, F>(&self, f: F) -> T
    where
        T: Send + 'static,
        F: FnOnce(&mut rusqlite::Connection) -> T + Send + 'static,
    {
        self.inner.writer.call(f).await
    }

    /// Runs a read-only query on a fresh short-lived connection, off the
    /// async runtime's worker threads.
    pub(crate) async fn read<T, F>(&self, f: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, Error> + Send + 'static,
    {
        let path = self.inner.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open_with_flags(
                &path,
                rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
            )
            .map_err(|e| Error::wrap(ErrorKind::Internal, "opening read connection", e))?;
            f(&conn)
        })
        .await
        .map_err(|e| Error::wrap(ErrorKind::Internal, "read task panicked", e))?
    }

    pub fn db_path(&self) -> &Path {
        &self.inner.db_path
    }
}
