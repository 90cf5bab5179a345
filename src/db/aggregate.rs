//! Per-artist aggregates over the artist ⟕ credit ⟕ library-song join.
//!
//! The library gate sits on the song join, not in `WHERE`, so an artist with
//! no library songs still yields a row with `song_count = 0`. Views that want
//! only populated artists say so with `HAVING`.

use super::models::{Artist, ARTIST_COLUMNS};
use super::Result;
use crate::live::Table;
use rusqlite::{Connection, ToSql};

/// Tables read by every aggregate query.
pub(crate) const ARTIST_TABLES: &[Table] = &[Table::Artist, Table::SongArtistMap, Table::Song];

/// Tables read by the windowed (play history) variant.
pub(crate) const WINDOWED_TABLES: &[Table] =
    &[Table::Artist, Table::SongArtistMap, Table::Song, Table::Event];

/// Shape of one aggregate query. Bound parameters use fixed names:
/// `:cutoff` for the window, `:limit` when limited, plus whatever the
/// filter conditions reference.
#[derive(Debug, Default, Clone)]
pub(crate) struct AggregateQuery {
    windowed: bool,
    conditions: Vec<&'static str>,
    having: Option<&'static str>,
    order_by: Option<&'static str>,
    limited: bool,
}

impl AggregateQuery {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sum play time from events after `:cutoff` instead of the songs' totals.
    pub(crate) fn windowed(mut self) -> Self {
        self.windowed = true;
        self
    }

    pub(crate) fn filter(mut self, condition: &'static str) -> Self {
        self.conditions.push(condition);
        self
    }

    pub(crate) fn having(mut self, having: &'static str) -> Self {
        self.having = Some(having);
        self
    }

    /// Primary ordering. `artist.rowid` is always appended as the final tie-break.
    pub(crate) fn order_by(mut self, order_by: &'static str) -> Self {
        self.order_by = Some(order_by);
        self
    }

    pub(crate) fn limited(mut self) -> Self {
        self.limited = true;
        self
    }

    pub(crate) fn tables(&self) -> &'static [Table] {
        if self.windowed { WINDOWED_TABLES } else { ARTIST_TABLES }
    }

    pub(crate) fn sql(&self) -> String {
        let play_time = if self.windowed { "e.song_play_time" } else { "song.total_play_time" };

        let mut sql = format!(
            "SELECT {ARTIST_COLUMNS},
                COUNT(song.id) AS song_count,
                COALESCE(SUM(CASE WHEN song.date_download IS NOT NULL THEN 1 ELSE 0 END), 0) AS download_count,
                COALESCE(SUM({play_time}), 0) AS artist_play_time
            FROM artist
                LEFT JOIN song_artist_map sam ON sam.artist_id = artist.id
                LEFT JOIN song ON song.id = sam.song_id AND song.in_library IS NOT NULL"
        );

        if self.windowed {
            sql.push_str(
                "
                LEFT JOIN (
                    SELECT song_id, SUM(play_time) AS song_play_time
                    FROM event
                    WHERE timestamp > :cutoff
                    GROUP BY song_id
                ) AS e ON e.song_id = song.id",
            );
        }

        if !self.conditions.is_empty() {
            sql.push_str("\n            WHERE ");
            sql.push_str(&self.conditions.join(" AND "));
        }

        sql.push_str("\n            GROUP BY artist.id");

        if let Some(having) = self.having {
            sql.push_str("\n            HAVING ");
            sql.push_str(having);
        }

        sql.push_str("\n            ORDER BY ");
        if let Some(order_by) = self.order_by {
            sql.push_str(order_by);
            sql.push_str(", ");
        }
        sql.push_str("artist.rowid ASC");

        if self.limited {
            sql.push_str("\n            LIMIT :limit");
        }

        sql
    }
}

/// Run an aggregate query with its named parameters.
pub(crate) fn fetch(
    conn: &Connection,
    query: &AggregateQuery,
    params: &[(&str, &dyn ToSql)],
) -> Result<Vec<Artist>> {
    let mut stmt = conn.prepare_cached(&query.sql())?;
    let artists = stmt
        .query_map(params, Artist::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(artists)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ArtistEntity, Event, Song, SongArtistMap};
    use crate::db::Database;
    use chrono::DateTime;
    use rusqlite::named_params;

    fn ts(ms: i64) -> DateTime<chrono::Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn run(db: &Database, q: &AggregateQuery, cutoff: Option<i64>) -> Vec<Artist> {
        db.read(|conn| match cutoff {
            Some(c) => fetch(conn, q, named_params! { ":cutoff": c }),
            None => fetch(conn, q, &[]),
        })
        .unwrap()
    }

    fn seed(db: &Database) {
        db.insert_artist(&ArtistEntity::new("UC1", "Muse")).unwrap();
        db.insert_artist(&ArtistEntity::new("UC2", "Empty")).unwrap();

        let in_lib = Song {
            in_library: Some(ts(1)),
            date_download: Some(ts(2)),
            total_play_time: 500,
            ..Song::new("s1", "Uprising")
        };
        let not_in_lib = Song { total_play_time: 900, ..Song::new("s2", "Madness") };
        db.upsert_song(&in_lib).unwrap();
        db.upsert_song(&not_in_lib).unwrap();
        for (song, artist) in [("s1", "UC1"), ("s2", "UC1"), ("s2", "UC2")] {
            db.map_song_artist(&SongArtistMap {
                song_id: song.into(),
                artist_id: artist.into(),
                position: 0,
            })
            .unwrap();
        }
    }

    #[test]
    fn test_counts_only_library_songs() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let rows = run(&db, &AggregateQuery::new(), None);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].artist.id, "UC1");
        assert_eq!(rows[0].song_count, 1);
        assert_eq!(rows[0].download_count, 1);
        assert_eq!(rows[0].total_play_time, 500);

        // Only a non-library song: still present, but with zeroed aggregates.
        assert_eq!(rows[1].artist.id, "UC2");
        assert_eq!(rows[1].song_count, 0);
        assert_eq!(rows[1].download_count, 0);
        assert_eq!(rows[1].total_play_time, 0);
    }

    #[test]
    fn test_having_excludes_empty_artists() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        let rows = run(&db, &AggregateQuery::new().having("song_count > 0"), None);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].artist.id, "UC1");
    }

    #[test]
    fn test_window_excludes_events_at_or_before_cutoff() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        for (at, play_time) in [(100, 40), (200, 60), (300, 7)] {
            db.record_event(&Event { song_id: "s1".into(), timestamp: ts(at), play_time })
                .unwrap();
        }

        let q = AggregateQuery::new().windowed();
        let rows = run(&db, &q, Some(200));
        assert_eq!(rows[0].total_play_time, 7);

        let rows = run(&db, &q, Some(0));
        assert_eq!(rows[0].total_play_time, 107);
    }

    #[test]
    fn test_window_ignores_non_library_song_events() {
        let db = Database::open_in_memory().unwrap();
        seed(&db);
        db.record_event(&Event { song_id: "s2".into(), timestamp: ts(500), play_time: 99 })
            .unwrap();
        let rows = run(&db, &AggregateQuery::new().windowed(), Some(0));
        assert!(rows.iter().all(|a| a.total_play_time == 0));
    }

    #[test]
    fn test_empty_store_yields_nothing() {
        let db = Database::open_in_memory().unwrap();
        assert!(run(&db, &AggregateQuery::new(), None).is_empty());
    }

    #[test]
    fn test_sql_shape() {
        let sql = AggregateQuery::new()
            .filter("artist.bookmarked_at IS NOT NULL")
            .having("song_count > 0")
            .order_by("artist.name COLLATE NOCASE ASC")
            .limited()
            .sql();
        assert!(sql.contains("WHERE artist.bookmarked_at IS NOT NULL"));
        assert!(sql.contains("HAVING song_count > 0"));
        assert!(sql.contains("ORDER BY artist.name COLLATE NOCASE ASC, artist.rowid ASC"));
        assert!(sql.trim_end().ends_with("LIMIT :limit"));
        assert!(!sql.contains(":cutoff"));
    }
}
