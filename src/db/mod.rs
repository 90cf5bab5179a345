pub mod aggregate;
pub mod models;
pub mod search;
pub mod sort;
pub mod store;

use crate::live::{Live, Registry, Table};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Square edge, in pixels, that remote artist thumbnails are resized to.
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 544;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Unknown sort key: {0}")]
    InvalidSortKey(String),
    #[error("Snapshot parse error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// The library store. Shareable across threads; every statement runs under
/// one connection lock, so readers never see half of a transaction.
pub struct Database {
    conn: Mutex<Connection>,
    observers: Arc<Registry>,
    thumbnail_size: u32,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(path)?;
        let db = Self::with_connection(conn);
        db.init(true)?;
        log::info!("Opened library at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self::with_connection(conn);
        db.init(false)?;
        Ok(db)
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            observers: Arc::new(Registry::default()),
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
        }
    }

    /// Override the square thumbnail size used by [`Database::update_artist_from_page`].
    pub fn with_thumbnail_size(mut self, size: u32) -> Self {
        self.thumbnail_size = size;
        self
    }

    pub fn thumbnail_size(&self) -> u32 {
        self.thumbnail_size
    }

    fn init(&self, on_disk: bool) -> Result<()> {
        let conn = self.conn.lock();
        if on_disk {
            // WAL mode for better concurrent read performance
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrate(&conn)
    }

    /// Run a read against the connection.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run a write and, once the lock is released, notify observers of
    /// `tables` if any rows changed. `f` returns the number of rows changed.
    pub(crate) fn write(
        &self,
        tables: &[Table],
        f: impl FnOnce(&mut Connection) -> Result<usize>,
    ) -> Result<usize> {
        let changed = {
            let mut conn = self.conn.lock();
            f(&mut conn)?
        };
        if changed > 0 {
            self.observers.invalidate(self, tables);
        }
        Ok(changed)
    }

    /// Subscribe to a query. The current result is delivered first, then a
    /// fresh result after every write that touches one of `tables`.
    ///
    /// Results queue until received, so a handle that is never drained keeps
    /// growing; use [`Live::latest`] to skip to the newest. `query` runs on
    /// the writing thread and must only read: a write from inside it
    /// deadlocks on the subscriber's own lock.
    pub fn observe<T, F>(&self, tables: &[Table], query: F) -> Live<T>
    where
        T: Send + 'static,
        F: Fn(&Database) -> Result<T> + Send + Sync + 'static,
    {
        self.observers.subscribe(self, tables, query)
    }

    /// Number of live subscriptions currently registered.
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    conn.pragma_update(None, "user_version", 2)?;
    Ok(())
}

/// V1: artists, songs, credits, play history
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::debug!("Applying schema v1");
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS artist (
            id                TEXT NOT NULL PRIMARY KEY,
            name              TEXT NOT NULL,
            thumbnail_url     TEXT,
            bookmarked_at     INTEGER,
            is_local          INTEGER NOT NULL DEFAULT 0,
            last_update_time  INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS song (
            id                TEXT NOT NULL PRIMARY KEY,
            title             TEXT NOT NULL,
            album_id          TEXT,
            in_library        INTEGER,
            date_download     INTEGER,
            total_play_time   INTEGER NOT NULL DEFAULT 0,
            is_local          INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS song_artist_map (
            song_id     TEXT NOT NULL REFERENCES song(id) ON DELETE CASCADE,
            artist_id   TEXT NOT NULL REFERENCES artist(id) ON DELETE CASCADE,
            position    INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (song_id, artist_id)
        );
        CREATE INDEX IF NOT EXISTS idx_sam_artist ON song_artist_map(artist_id);

        CREATE TABLE IF NOT EXISTS event (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            song_id     TEXT NOT NULL REFERENCES song(id) ON DELETE CASCADE,
            timestamp   INTEGER NOT NULL,
            play_time   INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_event_song ON event(song_id);
        ",
    )?;
    Ok(())
}

/// V2: indexes for the library-gated joins and time-windowed history scans
fn migrate_v2(conn: &Connection) -> Result<()> {
    log::debug!("Applying schema v2");
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_song_in_library ON song(in_library);
        CREATE INDEX IF NOT EXISTS idx_event_timestamp ON event(timestamp);
        CREATE INDEX IF NOT EXISTS idx_artist_local ON artist(is_local);
        ",
    )
    .map_err(|e| DbError::Migration(format!("v2 indexes: {e}")))?;
    Ok(())
}

/// SQLite treats a negative LIMIT as unbounded.
pub(crate) fn sql_limit(limit: Option<usize>) -> i64 {
    match limit {
        Some(n) => i64::try_from(n).unwrap_or(i64::MAX),
        None => -1,
    }
}
