use super::aggregate::{self, AggregateQuery};
use super::models::{to_millis, Artist, Provenance, Song, SONG_COLUMNS};
use super::{sql_limit, Database, DbError, Result};
use crate::live::{Live, Table};
use chrono::{DateTime, Utc};
use rusqlite::named_params;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How many artists the "most played" shelf shows by default.
pub const MOST_PLAYED_LIMIT: usize = 6;

/// Ordering for artist views. Always evaluated ascending; see [`Database::artist_view`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtistSortType {
    CreateDate,
    Name,
    SongCount,
    PlayTime,
}

impl ArtistSortType {
    pub const ALL: [ArtistSortType; 4] = [
        ArtistSortType::CreateDate,
        ArtistSortType::Name,
        ArtistSortType::SongCount,
        ArtistSortType::PlayTime,
    ];
}

impl FromStr for ArtistSortType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "create_date" => Ok(Self::CreateDate),
            "name" => Ok(Self::Name),
            "song_count" => Ok(Self::SongCount),
            "play_time" => Ok(Self::PlayTime),
            _ => Err(DbError::InvalidSortKey(s.to_string())),
        }
    }
}

/// Ordering for an artist's songs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtistSongSortType {
    CreateDate,
    Name,
    PlayTime,
}

impl ArtistSongSortType {
    pub const ALL: [ArtistSongSortType; 3] = [
        ArtistSongSortType::CreateDate,
        ArtistSongSortType::Name,
        ArtistSongSortType::PlayTime,
    ];

    fn order_by(self) -> &'static str {
        match self {
            Self::CreateDate => "song.in_library ASC",
            Self::Name => "song.title COLLATE NOCASE ASC",
            Self::PlayTime => "song.total_play_time ASC",
        }
    }
}

impl FromStr for ArtistSongSortType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "create_date" => Ok(Self::CreateDate),
            "name" => Ok(Self::Name),
            "play_time" => Ok(Self::PlayTime),
            _ => Err(DbError::InvalidSortKey(s.to_string())),
        }
    }
}

/// The artist list families a caller can sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistView {
    /// Every artist with at least one library song.
    All,
    /// Followed artists with at least one library song.
    Bookmarked,
    /// Artists with at least one downloaded library song.
    Downloaded,
}

impl ArtistView {
    fn query(self, sort: ArtistSortType) -> AggregateQuery {
        let base = match self {
            Self::All => AggregateQuery::new().having("song_count > 0"),
            Self::Bookmarked => AggregateQuery::new()
                .filter("artist.bookmarked_at IS NOT NULL")
                .having("song_count > 0"),
            Self::Downloaded => AggregateQuery::new().having("download_count > 0"),
        };
        match (self, sort) {
            // Creation order is plain row order; the tie-break covers it.
            (Self::All, ArtistSortType::CreateDate) => base,
            (_, ArtistSortType::CreateDate) => base.order_by("artist.bookmarked_at ASC"),
            (_, ArtistSortType::Name) => base.order_by("artist.name COLLATE NOCASE ASC"),
            (_, ArtistSortType::SongCount) => base.order_by("song_count ASC"),
            (_, ArtistSortType::PlayTime) => base.order_by("artist_play_time ASC"),
        }
    }

    /// Provenance allow-list applied after the query.
    pub fn admits(self, provenance: Provenance) -> bool {
        match self {
            Self::All => matches!(provenance, Provenance::Remote | Provenance::Local),
            Self::Bookmarked | Self::Downloaded => matches!(provenance, Provenance::Remote),
        }
    }
}

fn reversed<T>(mut items: Vec<T>, descending: bool) -> Vec<T> {
    if descending {
        items.reverse();
    }
    items
}

impl Database {
    /// Sorted artist list for one view family. The query always runs
    /// ascending; `descending` reverses the filtered result.
    pub fn artist_view(
        &self,
        view: ArtistView,
        sort: ArtistSortType,
        descending: bool,
    ) -> Result<Vec<Artist>> {
        let query = view.query(sort);
        let artists = self.read(|conn| aggregate::fetch(conn, &query, &[]))?;
        let artists = artists
            .into_iter()
            .filter(|a| view.admits(a.artist.provenance()))
            .collect();
        Ok(reversed(artists, descending))
    }

    pub fn observe_artist_view(
        &self,
        view: ArtistView,
        sort: ArtistSortType,
        descending: bool,
    ) -> Live<Vec<Artist>> {
        let tables = view.query(sort).tables();
        self.observe(tables, move |db| db.artist_view(view, sort, descending))
    }

    pub fn artists(&self, sort: ArtistSortType, descending: bool) -> Result<Vec<Artist>> {
        self.artist_view(ArtistView::All, sort, descending)
    }

    pub fn bookmarked_artists(&self, sort: ArtistSortType, descending: bool) -> Result<Vec<Artist>> {
        self.artist_view(ArtistView::Bookmarked, sort, descending)
    }

    pub fn downloaded_artists(&self, sort: ArtistSortType, descending: bool) -> Result<Vec<Artist>> {
        self.artist_view(ArtistView::Downloaded, sort, descending)
    }

    /// Library songs credited to `artist_id`.
    pub fn artist_songs(
        &self,
        artist_id: &str,
        sort: ArtistSongSortType,
        descending: bool,
    ) -> Result<Vec<Song>> {
        let sql = format!(
            "SELECT {SONG_COLUMNS}
             FROM song_artist_map
                JOIN song ON song_artist_map.song_id = song.id
             WHERE song_artist_map.artist_id = :artist_id AND song.in_library IS NOT NULL
             ORDER BY {}, song.rowid ASC",
            sort.order_by()
        );
        let songs = self.read(|conn| {
            let mut stmt = conn.prepare_cached(&sql)?;
            let songs = stmt
                .query_map(named_params! { ":artist_id": artist_id }, Song::from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(songs)
        })?;
        Ok(reversed(songs, descending))
    }

    pub fn observe_artist_songs(
        &self,
        artist_id: &str,
        sort: ArtistSongSortType,
        descending: bool,
    ) -> Live<Vec<Song>> {
        let artist_id = artist_id.to_string();
        self.observe(&[Table::SongArtistMap, Table::Song], move |db| {
            db.artist_songs(&artist_id, sort, descending)
        })
    }

    /// Artists ranked by play time from events after `since`, most played first.
    pub fn most_played_artists(&self, since: DateTime<Utc>, limit: usize) -> Result<Vec<Artist>> {
        let query = most_played_query();
        let cutoff = to_millis(&since);
        let limit = sql_limit(Some(limit));
        self.read(|conn| {
            aggregate::fetch(conn, &query, named_params! { ":cutoff": cutoff, ":limit": limit })
        })
    }

    pub fn observe_most_played_artists(&self, since: DateTime<Utc>, limit: usize) -> Live<Vec<Artist>> {
        self.observe(most_played_query().tables(), move |db| {
            db.most_played_artists(since, limit)
        })
    }
}

fn most_played_query() -> AggregateQuery {
    AggregateQuery::new()
        .windowed()
        .having("song_count > 0")
        .order_by("artist_play_time DESC")
        .limited()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ArtistEntity, Event, SongArtistMap};

    fn ts(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    struct Fixture {
        db: Database,
        next_song: usize,
    }

    impl Fixture {
        fn new() -> Self {
            Self { db: Database::open_in_memory().unwrap(), next_song: 0 }
        }

        fn artist(&mut self, id: &str, name: &str, is_local: bool, bookmarked: Option<i64>) {
            self.db
                .insert_artist(&ArtistEntity {
                    is_local,
                    bookmarked_at: bookmarked.map(ts),
                    ..ArtistEntity::new(id, name)
                })
                .unwrap();
        }

        /// Add a song credited to `artist_id`. Returns the song id.
        fn song(&mut self, artist_id: &str, title: &str, in_library: bool, downloaded: bool, play: i64) -> String {
            self.next_song += 1;
            let id = format!("s{}", self.next_song);
            self.db
                .upsert_song(&Song {
                    in_library: in_library.then(|| ts(self.next_song as i64 * 10)),
                    date_download: downloaded.then(|| ts(1)),
                    total_play_time: play,
                    ..Song::new(id.clone(), title)
                })
                .unwrap();
            self.db
                .map_song_artist(&SongArtistMap {
                    song_id: id.clone(),
                    artist_id: artist_id.into(),
                    position: 0,
                })
                .unwrap();
            id
        }

        fn ids(artists: &[Artist]) -> Vec<&str> {
            artists.iter().map(|a| a.artist.id.as_str()).collect()
        }
    }

    /// Three remote artists, one local, one empty, one bookmarked-with-downloads.
    fn populated() -> Fixture {
        let mut f = Fixture::new();
        f.artist("UC_b", "beta", false, Some(300));
        f.artist("UC_a", "Alpha", false, Some(100));
        f.artist("LA_c", "charlie", true, Some(200));
        f.artist("UC_e", "Empty", false, Some(50));
        f.artist("UC_d", "Delta", false, None);

        f.song("UC_b", "b1", true, false, 50);
        f.song("UC_b", "b2", true, true, 10);
        f.song("UC_a", "a1", true, false, 500);
        f.song("LA_c", "c1", true, true, 5);
        f.song("LA_c", "c2", true, false, 5);
        f.song("LA_c", "c3", true, false, 5);
        f.song("UC_e", "e1", false, true, 1000);
        f.song("UC_d", "d1", true, true, 70);
        f
    }

    #[test]
    fn test_general_view_orders() {
        let f = populated();
        let by = |sort| f.db.artists(sort, false).unwrap();

        assert_eq!(Fixture::ids(&by(ArtistSortType::CreateDate)), ["UC_b", "UC_a", "LA_c", "UC_d"]);
        assert_eq!(Fixture::ids(&by(ArtistSortType::Name)), ["UC_a", "UC_b", "LA_c", "UC_d"]);
        // song counts: b=2 a=1 c=3 d=1, ties by row order
        assert_eq!(Fixture::ids(&by(ArtistSortType::SongCount)), ["UC_a", "UC_d", "UC_b", "LA_c"]);
        // play time: b=60 a=500 c=15 d=70
        assert_eq!(Fixture::ids(&by(ArtistSortType::PlayTime)), ["LA_c", "UC_b", "UC_d", "UC_a"]);
    }

    #[test]
    fn test_empty_artist_excluded_from_views_but_found_by_id() {
        let f = populated();
        for sort in ArtistSortType::ALL {
            for view in [ArtistView::All, ArtistView::Bookmarked, ArtistView::Downloaded] {
                let artists = f.db.artist_view(view, sort, false).unwrap();
                assert!(!Fixture::ids(&artists).contains(&"UC_e"), "{view:?} {sort:?}");
            }
        }
        let empty = f.db.artist("UC_e").unwrap().unwrap();
        assert_eq!(empty.song_count, 0);
    }

    #[test]
    fn test_descending_is_exact_reverse() {
        let f = populated();
        for view in [ArtistView::All, ArtistView::Bookmarked, ArtistView::Downloaded] {
            for sort in ArtistSortType::ALL {
                let mut asc = f.db.artist_view(view, sort, false).unwrap();
                let desc = f.db.artist_view(view, sort, true).unwrap();
                asc.reverse();
                assert_eq!(asc, desc, "{view:?} {sort:?}");
            }
        }
        for sort in ArtistSongSortType::ALL {
            let mut asc = f.db.artist_songs("LA_c", sort, false).unwrap();
            let desc = f.db.artist_songs("LA_c", sort, true).unwrap();
            asc.reverse();
            assert_eq!(asc, desc, "{sort:?}");
        }
    }

    #[test]
    fn test_bookmarked_view_is_remote_only() {
        let f = populated();
        let artists = f.db.bookmarked_artists(ArtistSortType::CreateDate, false).unwrap();
        // Ordered by bookmark time; local LA_c and empty UC_e are dropped.
        assert_eq!(Fixture::ids(&artists), ["UC_a", "UC_b"]);
    }

    #[test]
    fn test_downloaded_view() {
        let f = populated();
        let artists = f.db.downloaded_artists(ArtistSortType::Name, false).unwrap();
        // UC_e's only download is not in the library; LA_c is local.
        assert_eq!(Fixture::ids(&artists), ["UC_b", "UC_d"]);
        assert!(artists.iter().all(|a| a.download_count > 0));
    }

    #[test]
    fn test_name_order_ignores_case() {
        let mut f = Fixture::new();
        f.artist("UC1", "abba", false, None);
        f.artist("UC2", "Beatles", false, None);
        f.artist("UC3", "ABBA", false, None);
        for id in ["UC1", "UC2", "UC3"] {
            f.song(id, "x", true, false, 0);
        }
        let artists = f.db.artists(ArtistSortType::Name, false).unwrap();
        assert_eq!(Fixture::ids(&artists), ["UC1", "UC3", "UC2"]);
    }

    #[test]
    fn test_artist_song_orders() {
        let mut f = Fixture::new();
        f.artist("UC1", "Muse", false, None);
        f.song("UC1", "uprising", true, false, 30);
        f.song("UC1", "Madness", true, false, 10);
        f.song("UC1", "hidden", false, false, 99);
        f.song("UC1", "Apocalypse", true, false, 20);

        let titles = |sort| -> Vec<String> {
            f.db.artist_songs("UC1", sort, false)
                .unwrap()
                .into_iter()
                .map(|s| s.title)
                .collect()
        };
        assert_eq!(titles(ArtistSongSortType::CreateDate), ["uprising", "Madness", "Apocalypse"]);
        assert_eq!(titles(ArtistSongSortType::Name), ["Apocalypse", "Madness", "uprising"]);
        assert_eq!(titles(ArtistSongSortType::PlayTime), ["Madness", "Apocalypse", "uprising"]);
    }

    #[test]
    fn test_most_played_window_and_limit() {
        let mut f = Fixture::new();
        for i in 0..8 {
            let id = format!("UC{i}");
            f.artist(&id, "Band", false, None);
            let song = f.song(&id, "t", true, false, 0);
            f.db.record_event(&Event { song_id: song.clone(), timestamp: ts(1_000), play_time: 100 * i })
                .unwrap();
            // Old plays that would reverse the ranking if counted.
            f.db.record_event(&Event { song_id: song, timestamp: ts(10), play_time: 10_000 - 100 * i })
                .unwrap();
        }

        let top = f.db.most_played_artists(ts(10), MOST_PLAYED_LIMIT).unwrap();
        assert_eq!(Fixture::ids(&top), ["UC7", "UC6", "UC5", "UC4", "UC3", "UC2"]);
        assert_eq!(top[0].total_play_time, 700);
    }

    #[test]
    fn test_sort_key_parsing() {
        assert_eq!("play-time".parse::<ArtistSortType>().unwrap(), ArtistSortType::PlayTime);
        assert_eq!("NAME".parse::<ArtistSongSortType>().unwrap(), ArtistSongSortType::Name);
        assert!(matches!("song_count".parse::<ArtistSongSortType>(), Err(DbError::InvalidSortKey(_))));
        assert!(matches!("loudness".parse::<ArtistSortType>(), Err(DbError::InvalidSortKey(_))));
    }

    #[test]
    fn test_observed_view_refreshes_on_library_change() {
        let mut f = Fixture::new();
        f.artist("UC1", "Muse", false, None);
        let song = f.song("UC1", "Uprising", false, false, 0);

        let live = f.db.observe_artist_view(ArtistView::All, ArtistSortType::Name, false);
        assert!(live.recv().unwrap().unwrap().is_empty());

        f.db.set_in_library(&song, Some(ts(5))).unwrap();
        let artists = live.recv().unwrap().unwrap();
        assert_eq!(Fixture::ids(&artists), ["UC1"]);

        f.db.set_in_library(&song, None).unwrap();
        assert!(live.recv().unwrap().unwrap().is_empty());
    }

    #[test]
    fn test_observed_most_played_tracks_events() {
        let mut f = Fixture::new();
        f.artist("UC1", "Muse", false, None);
        let song = f.song("UC1", "Uprising", true, false, 0);

        let live = f.db.observe_most_played_artists(ts(0), 6);
        assert_eq!(live.recv().unwrap().unwrap()[0].total_play_time, 0);

        f.db.record_event(&Event { song_id: song, timestamp: ts(50), play_time: 120 }).unwrap();
        assert_eq!(live.recv().unwrap().unwrap()[0].total_play_time, 120);
    }
}
