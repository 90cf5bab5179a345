use super::aggregate::{self, AggregateQuery};
use super::models::{Artist, ArtistEntity, Song, ARTIST_COLUMNS, SONG_COLUMNS};
use super::{sql_limit, Database, Result};
use crate::live::{Live, Table};
use rusqlite::{named_params, Connection, OptionalExtension, ToSql};

/// Songs shown in an artist's compact preview.
pub const ARTIST_PREVIEW_SIZE: usize = 3;

// Name matching uses instr(), which is case-sensitive and has no wildcards.

fn artist_by_id_query() -> AggregateQuery {
    AggregateQuery::new().filter("artist.id = :id")
}

fn search_query() -> AggregateQuery {
    AggregateQuery::new()
        .filter("instr(artist.name, :query) > 0")
        .having("song_count > 0")
        .limited()
}

fn entities(conn: &Connection, sql: &str, params: &[(&str, &dyn ToSql)]) -> Result<Vec<ArtistEntity>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let artists = stmt
        .query_map(params, ArtistEntity::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(artists)
}

fn songs(conn: &Connection, sql: &str, params: &[(&str, &dyn ToSql)]) -> Result<Vec<Song>> {
    let mut stmt = conn.prepare_cached(sql)?;
    let songs = stmt
        .query_map(params, Song::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(songs)
}

impl Database {
    /// One artist with its library aggregates. Artists without library songs
    /// are returned with zero counts.
    pub fn artist(&self, id: &str) -> Result<Option<Artist>> {
        let query = artist_by_id_query();
        let mut rows = self.read(|conn| aggregate::fetch(conn, &query, named_params! { ":id": id }))?;
        Ok(rows.pop())
    }

    pub fn observe_artist(&self, id: &str) -> Live<Option<Artist>> {
        let id = id.to_string();
        self.observe(artist_by_id_query().tables(), move |db| db.artist(&id))
    }

    /// Exact, case-sensitive name lookup.
    pub fn artist_by_name(&self, name: &str) -> Result<Option<ArtistEntity>> {
        self.read(|conn| {
            let sql = format!("SELECT {ARTIST_COLUMNS} FROM artist WHERE name = ?1 ORDER BY rowid LIMIT 1");
            let mut stmt = conn.prepare_cached(&sql)?;
            Ok(stmt.query_row([name], ArtistEntity::from_row).optional()?)
        })
    }

    /// Artists whose name contains `query`, with at least one library song.
    pub fn search_artists(&self, query: &str, limit: Option<usize>) -> Result<Vec<Artist>> {
        let shape = search_query();
        let limit = sql_limit(limit);
        self.read(|conn| {
            aggregate::fetch(conn, &shape, named_params! { ":query": query, ":limit": limit })
        })
    }

    pub fn observe_search_artists(&self, query: &str, limit: Option<usize>) -> Live<Vec<Artist>> {
        let query = query.to_string();
        self.observe(search_query().tables(), move |db| db.search_artists(&query, limit))
    }

    /// Songs credited to any artist whose name contains `query`.
    pub fn search_artist_songs(&self, query: &str, limit: Option<usize>) -> Result<Vec<Song>> {
        let sql = format!(
            "SELECT {SONG_COLUMNS}
             FROM song_artist_map
                JOIN song ON song_artist_map.song_id = song.id
             WHERE song_artist_map.artist_id IN (
                SELECT id FROM artist WHERE instr(name, :query) > 0
             )
             ORDER BY song_artist_map.rowid
             LIMIT :limit"
        );
        let limit = sql_limit(limit);
        self.read(|conn| songs(conn, &sql, named_params! { ":query": query, ":limit": limit }))
    }

    pub fn observe_search_artist_songs(&self, query: &str, limit: Option<usize>) -> Live<Vec<Song>> {
        let query = query.to_string();
        let tables = [Table::Artist, Table::SongArtistMap, Table::Song];
        self.observe(&tables, move |db| db.search_artist_songs(&query, limit))
    }

    /// Raw artist rows whose name contains `query`. Skips the aggregate join.
    pub fn fuzzy_search_artists(&self, query: &str, limit: Option<usize>) -> Result<Vec<ArtistEntity>> {
        let sql = format!(
            "SELECT {ARTIST_COLUMNS} FROM artist
             WHERE instr(artist.name, :query) > 0
             ORDER BY artist.rowid
             LIMIT :limit"
        );
        let limit = sql_limit(limit);
        self.read(|conn| entities(conn, &sql, named_params! { ":query": query, ":limit": limit }))
    }

    pub fn observe_fuzzy_search_artists(&self, query: &str, limit: Option<usize>) -> Live<Vec<ArtistEntity>> {
        let query = query.to_string();
        self.observe(&[Table::Artist], move |db| db.fuzzy_search_artists(&query, limit))
    }

    /// Artists from the remote catalog, in row order.
    pub fn remote_artists(&self) -> Result<Vec<ArtistEntity>> {
        let sql = format!("SELECT {ARTIST_COLUMNS} FROM artist WHERE is_local != 1 ORDER BY rowid");
        self.read(|conn| entities(conn, &sql, &[]))
    }

    pub fn observe_remote_artists(&self) -> Live<Vec<ArtistEntity>> {
        self.observe(&[Table::Artist], |db| db.remote_artists())
    }

    /// Artists found on the device, in row order.
    pub fn local_artists(&self) -> Result<Vec<ArtistEntity>> {
        let sql = format!("SELECT {ARTIST_COLUMNS} FROM artist WHERE is_local = 1 ORDER BY rowid");
        self.read(|conn| entities(conn, &sql, &[]))
    }

    pub fn observe_local_artists(&self) -> Live<Vec<ArtistEntity>> {
        self.observe(&[Table::Artist], |db| db.local_artists())
    }

    /// First `limit` library songs of an artist.
    pub fn artist_songs_preview(&self, artist_id: &str, limit: usize) -> Result<Vec<Song>> {
        let sql = format!(
            "SELECT {SONG_COLUMNS}
             FROM song_artist_map
                JOIN song ON song_artist_map.song_id = song.id
             WHERE song_artist_map.artist_id = :artist_id AND song.in_library IS NOT NULL
             ORDER BY song_artist_map.rowid
             LIMIT :limit"
        );
        let limit = sql_limit(Some(limit));
        self.read(|conn| {
            songs(conn, &sql, named_params! { ":artist_id": artist_id, ":limit": limit })
        })
    }

    pub fn observe_artist_songs_preview(&self, artist_id: &str, limit: usize) -> Live<Vec<Song>> {
        let artist_id = artist_id.to_string();
        self.observe(&[Table::SongArtistMap, Table::Song], move |db| {
            db.artist_songs_preview(&artist_id, limit)
        })
    }
}
