use super::models::{
    opt_millis, to_millis, ArtistEntity, ArtistPage, Event, LibraryStats, Snapshot, Song,
    SongArtistMap, ARTIST_COLUMNS, SONG_COLUMNS,
};
use super::{Database, Result};
use crate::live::Table;
use crate::thumbnail;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

const INSERT_ARTIST: &str = "INSERT OR IGNORE INTO artist (
        id, name, thumbnail_url, bookmarked_at, is_local, last_update_time
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

const UPDATE_ARTIST: &str = "UPDATE artist SET
        name = ?2, thumbnail_url = ?3, bookmarked_at = ?4, is_local = ?5, last_update_time = ?6
    WHERE id = ?1";

impl Database {
    /// Register an artist. An id that already exists is left untouched.
    /// Returns whether a row was written.
    pub fn insert_artist(&self, a: &ArtistEntity) -> Result<bool> {
        let changed = self.write(&[Table::Artist], |conn| insert_artist_row(conn, a))?;
        Ok(changed > 0)
    }

    /// Overwrite every column of an existing artist. Missing ids are a no-op.
    pub fn update_artist(&self, a: &ArtistEntity) -> Result<bool> {
        let changed = self.write(&[Table::Artist], |conn| update_artist_row(conn, a))?;
        Ok(changed > 0)
    }

    /// Apply freshly fetched remote page data: name, resized thumbnail and a
    /// new update time, all in one transaction.
    pub fn update_artist_from_page(&self, a: &ArtistEntity, page: &ArtistPage) -> Result<bool> {
        let size = self.thumbnail_size();
        let updated = ArtistEntity {
            name: page.title.clone(),
            thumbnail_url: page
                .thumbnail
                .as_deref()
                .map(|url| thumbnail::resize(url, size, size)),
            last_update_time: Utc::now(),
            ..a.clone()
        };

        let changed = self.write(&[Table::Artist], |conn| {
            let tx = conn.transaction()?;
            let n = update_artist_row(&tx, &updated)?;
            tx.commit()?;
            Ok(n)
        })?;
        Ok(changed > 0)
    }

    /// Set or clear an artist's bookmark.
    pub fn set_bookmarked(&self, artist_id: &str, at: Option<DateTime<Utc>>) -> Result<bool> {
        let changed = self.write(&[Table::Artist], |conn| {
            Ok(conn.execute(
                "UPDATE artist SET bookmarked_at = ?2 WHERE id = ?1",
                params![artist_id, opt_millis(&at)],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Delete an artist. Its song credits go with it.
    pub fn delete_artist(&self, a: &ArtistEntity) -> Result<bool> {
        let changed = self.write(&[Table::Artist, Table::SongArtistMap], |conn| {
            Ok(conn.execute("DELETE FROM artist WHERE id = ?1", params![a.id])?)
        })?;
        Ok(changed > 0)
    }

    /// Delete every device-local artist and their song credits atomically.
    /// Returns the number of artists removed.
    pub fn purge_local_artists(&self) -> Result<usize> {
        let removed = self.write(&[Table::Artist, Table::SongArtistMap], |conn| {
            let tx = conn.transaction()?;
            let n = tx.execute("DELETE FROM artist WHERE is_local = 1", [])?;
            tx.commit()?;
            Ok(n)
        })?;
        log::debug!("Purged {removed} local artists");
        Ok(removed)
    }

    /// Insert a song or refresh its metadata. An existing song keeps the
    /// play time accumulated from its events.
    pub fn upsert_song(&self, s: &Song) -> Result<()> {
        self.write(&[Table::Song], |conn| upsert_song_row(conn, s))?;
        Ok(())
    }

    /// Add a song to (or, with `None`, remove it from) the library.
    pub fn set_in_library(&self, song_id: &str, at: Option<DateTime<Utc>>) -> Result<bool> {
        let changed = self.write(&[Table::Song], |conn| {
            Ok(conn.execute(
                "UPDATE song SET in_library = ?2 WHERE id = ?1",
                params![song_id, opt_millis(&at)],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Mark a song as cached offline, or clear the mark with `None`.
    pub fn set_downloaded(&self, song_id: &str, at: Option<DateTime<Utc>>) -> Result<bool> {
        let changed = self.write(&[Table::Song], |conn| {
            Ok(conn.execute(
                "UPDATE song SET date_download = ?2 WHERE id = ?1",
                params![song_id, opt_millis(&at)],
            )?)
        })?;
        Ok(changed > 0)
    }

    /// Hard-delete a song along with its credits and play history.
    pub fn delete_song(&self, song_id: &str) -> Result<bool> {
        let tables = [Table::Song, Table::SongArtistMap, Table::Event];
        let changed = self.write(&tables, |conn| {
            Ok(conn.execute("DELETE FROM song WHERE id = ?1", params![song_id])?)
        })?;
        Ok(changed > 0)
    }

    /// Credit a song to an artist. Both rows must already exist.
    pub fn map_song_artist(&self, m: &SongArtistMap) -> Result<()> {
        self.write(&[Table::SongArtistMap], |conn| map_row(conn, m))?;
        Ok(())
    }

    /// Append a play event and credit its play time to the song.
    pub fn record_event(&self, e: &Event) -> Result<()> {
        self.write(&[Table::Event, Table::Song], |conn| {
            let tx = conn.transaction()?;
            let n = event_row(&tx, e)? + credit_play_time(&tx, e)?;
            tx.commit()?;
            Ok(n)
        })?;
        Ok(())
    }

    /// Load a batch of rows from a sync or scan job in one transaction.
    /// Each event's play time is credited to its song, as with [`Database::record_event`].
    pub fn import_snapshot(&self, snap: &Snapshot) -> Result<usize> {
        let tables = [Table::Artist, Table::Song, Table::SongArtistMap, Table::Event];
        let written = self.write(&tables, |conn| {
            let tx = conn.transaction()?;
            let mut n = 0;
            for a in &snap.artists {
                n += insert_artist_row(&tx, a)?;
            }
            for s in &snap.songs {
                n += upsert_song_row(&tx, s)?;
            }
            for m in &snap.song_artist_map {
                n += map_row(&tx, m)?;
            }
            for e in &snap.events {
                n += event_row(&tx, e)?;
                credit_play_time(&tx, e)?;
            }
            tx.commit()?;
            Ok(n)
        })?;
        log::info!(
            "Imported snapshot: {} artists, {} songs, {} credits, {} events ({written} rows written)",
            snap.artists.len(),
            snap.songs.len(),
            snap.song_artist_map.len(),
            snap.events.len(),
        );
        Ok(written)
    }

    /// Parse a JSON snapshot document and import it.
    pub fn import_snapshot_json(&self, json: &str) -> Result<usize> {
        let snap: Snapshot = serde_json::from_str(json)?;
        self.import_snapshot(&snap)
    }

    /// Raw artist row by id, without aggregates.
    pub fn artist_entity(&self, id: &str) -> Result<Option<ArtistEntity>> {
        self.read(|conn| {
            let sql = format!("SELECT {ARTIST_COLUMNS} FROM artist WHERE id = ?1");
            let mut stmt = conn.prepare_cached(&sql)?;
            Ok(stmt.query_row(params![id], ArtistEntity::from_row).optional()?)
        })
    }

    pub fn song(&self, id: &str) -> Result<Option<Song>> {
        self.read(|conn| {
            let sql = format!("SELECT {SONG_COLUMNS} FROM song WHERE id = ?1");
            let mut stmt = conn.prepare_cached(&sql)?;
            Ok(stmt.query_row(params![id], Song::from_row).optional()?)
        })
    }

    /// Get library statistics.
    pub fn stats(&self) -> Result<LibraryStats> {
        self.read(|conn| {
            let (total_artists, local_artists, bookmarked_artists): (i64, i64, i64) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(is_local), 0),
                        COUNT(bookmarked_at)
                 FROM artist",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

            let (total_songs, library_songs, downloaded_songs, total_play_time): (i64, i64, i64, i64) =
                conn.query_row(
                "SELECT COUNT(*),
                        COUNT(in_library),
                        COUNT(date_download),
                        COALESCE(SUM(total_play_time), 0)
                 FROM song",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )?;

            let events: i64 = conn.query_row("SELECT COUNT(*) FROM event", [], |row| row.get(0))?;

            Ok(LibraryStats {
                total_artists,
                local_artists,
                bookmarked_artists,
                total_songs,
                library_songs,
                downloaded_songs,
                events,
                total_play_time,
            })
        })
    }
}

fn insert_artist_row(conn: &Connection, a: &ArtistEntity) -> Result<usize> {
    Ok(conn.prepare_cached(INSERT_ARTIST)?.execute(params![
        a.id,
        a.name,
        a.thumbnail_url,
        opt_millis(&a.bookmarked_at),
        a.is_local,
        to_millis(&a.last_update_time),
    ])?)
}

fn update_artist_row(conn: &Connection, a: &ArtistEntity) -> Result<usize> {
    Ok(conn.prepare_cached(UPDATE_ARTIST)?.execute(params![
        a.id,
        a.name,
        a.thumbnail_url,
        opt_millis(&a.bookmarked_at),
        a.is_local,
        to_millis(&a.last_update_time),
    ])?)
}

fn upsert_song_row(conn: &Connection, s: &Song) -> Result<usize> {
    Ok(conn
        .prepare_cached(
            "INSERT INTO song (
                id, title, album_id, in_library, date_download, total_play_time, is_local
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                album_id = excluded.album_id,
                in_library = excluded.in_library,
                date_download = excluded.date_download,
                is_local = excluded.is_local",
        )?
        .execute(params![
            s.id,
            s.title,
            s.album_id,
            opt_millis(&s.in_library),
            opt_millis(&s.date_download),
            s.total_play_time,
            s.is_local,
        ])?)
}

fn map_row(conn: &Connection, m: &SongArtistMap) -> Result<usize> {
    Ok(conn
        .prepare_cached(
            "INSERT INTO song_artist_map (song_id, artist_id, position) VALUES (?1, ?2, ?3)
             ON CONFLICT(song_id, artist_id) DO UPDATE SET position = excluded.position",
        )?
        .execute(params![m.song_id, m.artist_id, m.position])?)
}

fn event_row(conn: &Connection, e: &Event) -> Result<usize> {
    Ok(conn
        .prepare_cached("INSERT INTO event (song_id, timestamp, play_time) VALUES (?1, ?2, ?3)")?
        .execute(params![e.song_id, to_millis(&e.timestamp), e.play_time])?)
}

fn credit_play_time(conn: &Connection, e: &Event) -> Result<usize> {
    Ok(conn
        .prepare_cached("UPDATE song SET total_play_time = total_play_time + ?2 WHERE id = ?1")?
        .execute(params![e.song_id, e.play_time])?)
}
