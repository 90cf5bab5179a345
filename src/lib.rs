pub mod config;
pub mod db;
pub mod live;
pub mod matching;
pub mod thumbnail;

pub use db::models::{Artist, ArtistEntity, ArtistPage, Event, Provenance, Song, SongArtistMap};
pub use db::sort::{ArtistSongSortType, ArtistSortType, ArtistView};
pub use db::{Database, DbError};
pub use live::{Live, Table};
pub use matching::closest_match;

/// Application name for XDG paths
pub const APP_NAME: &str = "tunedb";
