use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// Column list matching [`ArtistEntity::from_row`], qualified for joins.
pub(crate) const ARTIST_COLUMNS: &str = "artist.id, artist.name, artist.thumbnail_url, \
     artist.bookmarked_at, artist.is_local, artist.last_update_time";

/// Column list matching [`Song::from_row`], qualified for joins.
pub(crate) const SONG_COLUMNS: &str = "song.id, song.title, song.album_id, song.in_library, \
     song.date_download, song.total_play_time, song.is_local";

/// Where an artist record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Fetched from the remote catalog.
    Remote,
    /// Discovered by scanning files on the device.
    Local,
}

/// An artist row as persisted, without derived counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistEntity {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    /// Set when the user follows the artist.
    #[serde(default)]
    pub bookmarked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default = "Utc::now")]
    pub last_update_time: DateTime<Utc>,
}

impl ArtistEntity {
    /// A remote-catalog artist with no thumbnail and no bookmark.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            thumbnail_url: None,
            bookmarked_at: None,
            is_local: false,
            last_update_time: Utc::now(),
        }
    }

    pub fn provenance(&self) -> Provenance {
        if self.is_local {
            Provenance::Local
        } else {
            Provenance::Remote
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            thumbnail_url: row.get(2)?,
            bookmarked_at: opt_timestamp(row, 3)?,
            is_local: row.get(4)?,
            last_update_time: timestamp(row, 5)?,
        })
    }
}

/// An artist joined with the aggregates computed over its library songs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Artist {
    #[serde(flatten)]
    pub artist: ArtistEntity,
    /// Mapped songs with library membership.
    pub song_count: i64,
    /// Library songs that are also cached offline.
    pub download_count: i64,
    /// Summed play time in milliseconds. Windowed queries only count recent events.
    pub total_play_time: i64,
}

impl Artist {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            artist: ArtistEntity::from_row(row)?,
            song_count: row.get(6)?,
            download_count: row.get(7)?,
            total_play_time: row.get(8)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub album_id: Option<String>,
    /// Set when the song was added to the user's library.
    #[serde(default)]
    pub in_library: Option<DateTime<Utc>>,
    /// Set when the song is cached for offline playback.
    #[serde(default)]
    pub date_download: Option<DateTime<Utc>>,
    /// Accumulated play time in milliseconds.
    #[serde(default)]
    pub total_play_time: i64,
    #[serde(default)]
    pub is_local: bool,
}

impl Song {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            album_id: None,
            in_library: None,
            date_download: None,
            total_play_time: 0,
            is_local: false,
        }
    }

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            album_id: row.get(2)?,
            in_library: opt_timestamp(row, 3)?,
            date_download: opt_timestamp(row, 4)?,
            total_play_time: row.get(5)?,
            is_local: row.get(6)?,
        })
    }
}

/// Credit linking a song to one of its artists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongArtistMap {
    pub song_id: String,
    pub artist_id: String,
    /// Credit order on the song, 0 for the primary artist.
    #[serde(default)]
    pub position: i32,
}

/// One listening session credited to a song. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub song_id: String,
    pub timestamp: DateTime<Utc>,
    /// Milliseconds listened.
    pub play_time: i64,
}

/// Artist header data from a freshly fetched remote catalog page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtistPage {
    pub title: String,
    pub thumbnail: Option<String>,
}

/// Bulk rows produced by a sync or scan job, loaded in one transaction.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub artists: Vec<ArtistEntity>,
    pub songs: Vec<Song>,
    pub song_artist_map: Vec<SongArtistMap>,
    pub events: Vec<Event>,
}

/// Library summary numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub total_artists: i64,
    pub local_artists: i64,
    pub bookmarked_artists: i64,
    pub total_songs: i64,
    pub library_songs: i64,
    pub downloaded_songs: i64,
    pub events: i64,
    /// Milliseconds.
    pub total_play_time: i64,
}

// Timestamps are stored as INTEGER epoch milliseconds.

pub(crate) fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

pub(crate) fn opt_millis(ts: &Option<DateTime<Utc>>) -> Option<i64> {
    ts.as_ref().map(to_millis)
}

fn from_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, ms))
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    from_millis(idx, row.get(idx)?)
}

fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|ms| from_millis(idx, ms))
        .transpose()
}
