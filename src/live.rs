//! Push-based query subscriptions.
//!
//! A subscription names the tables its query reads. Every committed write
//! that changes rows in one of those tables re-runs the query and delivers the
//! new result on the subscriber's own channel. Dropping the [`Live`] handle
//! deregisters it.

use crate::db::{Database, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Tables a query can depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Artist,
    Song,
    SongArtistMap,
    Event,
}

/// Re-runs the query and delivers it. Returns false once the receiver is gone.
type Refresh = dyn Fn(&Database) -> bool + Send + Sync;

struct Subscriber {
    tables: Vec<Table>,
    // Held while evaluating so concurrent writers deliver results in commit order.
    refresh: Arc<Mutex<Box<Refresh>>>,
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<u64, Subscriber>>,
}

impl Registry {
    pub(crate) fn subscribe<T, F>(self: &Arc<Self>, db: &Database, tables: &[Table], query: F) -> Live<T>
    where
        T: Send + 'static,
        F: Fn(&Database) -> Result<T> + Send + Sync + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let refresh: Box<Refresh> = Box::new(move |db: &Database| tx.send(query(db)).is_ok());
        let refresh = Arc::new(Mutex::new(refresh));

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(
            id,
            Subscriber {
                tables: tables.to_vec(),
                refresh: Arc::clone(&refresh),
            },
        );
        log::debug!("Live query {id} registered on {tables:?}");

        // Registered before the first evaluation so no write can slip between them.
        {
            let initial = refresh.lock();
            (*initial)(db);
        }

        Live {
            id,
            rx,
            registry: Arc::downgrade(self),
        }
    }

    pub(crate) fn unsubscribe(&self, id: u64) {
        if self.subscribers.lock().remove(&id).is_some() {
            log::debug!("Live query {id} released");
        }
    }

    pub(crate) fn invalidate(&self, db: &Database, tables: &[Table]) {
        let targets: Vec<(u64, Arc<Mutex<Box<Refresh>>>)> = self
            .subscribers
            .lock()
            .iter()
            .filter(|(_, sub)| sub.tables.iter().any(|t| tables.contains(t)))
            .map(|(id, sub)| (*id, Arc::clone(&sub.refresh)))
            .collect();

        for (id, refresh) in targets {
            let delivered = {
                let refresh = refresh.lock();
                (*refresh)(db)
            };
            if !delivered {
                self.unsubscribe(id);
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.subscribers.lock().len()
    }
}

/// Handle to a live query. Yields the initial result, then one result per
/// relevant change, until dropped.
pub struct Live<T> {
    id: u64,
    rx: Receiver<Result<T>>,
    registry: Weak<Registry>,
}

impl<T> Live<T> {
    /// Block until the next result. `None` once the database is gone.
    pub fn recv(&self) -> Option<Result<T>> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_recv(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Drain pending results and return only the most recent one.
    pub fn latest(&self) -> Option<Result<T>> {
        self.rx.try_iter().last()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl<T> Drop for Live<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::ArtistEntity;

    fn count_artists(db: &Database) -> Result<i64> {
        db.read(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM artist", [], |r| r.get(0))?))
    }

    #[test]
    fn test_initial_snapshot_then_updates() {
        let db = Database::open_in_memory().unwrap();
        let live = db.observe(&[Table::Artist], count_artists);
        assert_eq!(live.try_recv().unwrap().unwrap(), 0);

        db.insert_artist(&ArtistEntity::new("a1", "Muse")).unwrap();
        assert_eq!(live.try_recv().unwrap().unwrap(), 1);
        assert!(live.try_recv().is_none());
    }

    #[test]
    fn test_unrelated_table_does_not_notify() {
        let db = Database::open_in_memory().unwrap();
        let live = db.observe(&[Table::Event], count_artists);
        live.try_recv().unwrap().unwrap();

        db.insert_artist(&ArtistEntity::new("a1", "Muse")).unwrap();
        assert!(live.try_recv().is_none());
    }

    #[test]
    fn test_ignored_write_does_not_notify() {
        let db = Database::open_in_memory().unwrap();
        db.insert_artist(&ArtistEntity::new("a1", "Muse")).unwrap();
        let live = db.observe(&[Table::Artist], count_artists);
        live.try_recv().unwrap().unwrap();

        // Duplicate id: nothing written.
        db.insert_artist(&ArtistEntity::new("a1", "Other")).unwrap();
        assert_eq!(live.pending(), 0);
    }

    #[test]
    fn test_subscribers_are_independent() {
        let db = Database::open_in_memory().unwrap();
        let first = db.observe(&[Table::Artist], count_artists);
        let second = db.observe(&[Table::Artist], count_artists);
        db.insert_artist(&ArtistEntity::new("a1", "Muse")).unwrap();

        assert_eq!(first.latest().unwrap().unwrap(), 1);
        // The second subscriber still has both of its results queued.
        assert_eq!(second.pending(), 2);
    }

    #[test]
    fn test_drop_deregisters() {
        let db = Database::open_in_memory().unwrap();
        let live = db.observe(&[Table::Artist], count_artists);
        assert_eq!(db.observer_count(), 1);
        drop(live);
        assert_eq!(db.observer_count(), 0);

        db.insert_artist(&ArtistEntity::new("a1", "Muse")).unwrap();
        assert_eq!(db.observer_count(), 0);
    }

    #[test]
    fn test_recv_returns_none_after_database_dropped() {
        let db = Database::open_in_memory().unwrap();
        let live = db.observe(&[Table::Artist], count_artists);
        live.recv().unwrap().unwrap();
        drop(db);
        assert!(live.recv().is_none());
    }

    #[test]
    fn test_updates_from_another_thread() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let live = db.observe(&[Table::Artist], count_artists);
        live.recv().unwrap().unwrap();

        let writer = Arc::clone(&db);
        std::thread::spawn(move || {
            for i in 0..3 {
                writer
                    .insert_artist(&ArtistEntity::new(format!("a{i}"), "Band"))
                    .unwrap();
            }
        })
        .join()
        .unwrap();

        let mut seen = Vec::new();
        while let Some(result) = live.recv_timeout(Duration::from_millis(100)) {
            seen.push(result.unwrap());
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
