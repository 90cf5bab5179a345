use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tunedb::{Artist, ArtistEntity, ArtistPage, ArtistSongSortType, ArtistSortType, ArtistView, Song};

#[derive(Parser)]
#[command(name = "tunedb", version, about = "Music library store with sorted, searchable artist views")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ViewName {
    All,
    Bookmarked,
    Downloaded,
}

impl ViewName {
    fn view(self) -> ArtistView {
        match self {
            Self::All => ArtistView::All,
            Self::Bookmarked => ArtistView::Bookmarked,
            Self::Downloaded => ArtistView::Downloaded,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SortName {
    CreateDate,
    Name,
    SongCount,
    PlayTime,
}

impl SortName {
    fn sort(self) -> ArtistSortType {
        match self {
            Self::CreateDate => ArtistSortType::CreateDate,
            Self::Name => ArtistSortType::Name,
            Self::SongCount => ArtistSortType::SongCount,
            Self::PlayTime => ArtistSortType::PlayTime,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum SongSortName {
    CreateDate,
    Name,
    PlayTime,
}

impl SongSortName {
    fn sort(self) -> ArtistSongSortType {
        match self {
            Self::CreateDate => ArtistSongSortType::CreateDate,
            Self::Name => ArtistSongSortType::Name,
            Self::PlayTime => ArtistSongSortType::PlayTime,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List artists in one of the sortable views
    Artists {
        #[arg(long, value_enum, default_value = "all")]
        view: ViewName,

        /// Sort key (defaults to config default_sort)
        #[arg(short, long, value_enum)]
        sort: Option<SortName>,

        /// Reverse the order
        #[arg(short, long)]
        desc: bool,
    },

    /// List an artist's library songs
    Songs {
        artist_id: String,

        #[arg(short, long, value_enum, default_value = "create-date")]
        sort: SongSortName,

        #[arg(short, long)]
        desc: bool,
    },

    /// Find artists whose name contains the query (case-sensitive)
    Search {
        query: String,

        /// Return songs by matching artists instead
        #[arg(long)]
        songs: bool,

        /// Skip the library gate and return raw artist rows
        #[arg(long, conflicts_with = "songs")]
        fuzzy: bool,

        /// Maximum number of results
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Resolve a free-text name to the single closest artist
    Match { query: String },

    /// Rank artists by recent play time
    MostPlayed {
        /// Look-back window in days (defaults to config most_played_days)
        #[arg(long)]
        days: Option<i64>,

        /// Number of results (defaults to config most_played_limit)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Show one artist with a preview of their songs
    Show { artist_id: String },

    /// List remote catalog artists
    Remote,

    /// List device-local artists
    Local,

    /// Load artists, songs, credits and play events from a JSON snapshot
    Import { file: PathBuf },

    /// Apply fresh remote page data to an artist
    Refresh {
        artist_id: String,

        /// New display name
        #[arg(long)]
        title: String,

        /// New thumbnail URL (resized to the configured square)
        #[arg(long)]
        thumbnail: Option<String>,
    },

    /// Bookmark an artist, or clear the bookmark
    Bookmark {
        artist_id: String,

        #[arg(long)]
        clear: bool,
    },

    /// Delete every device-local artist
    PurgeLocal,

    /// Show library statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = tunedb::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(tunedb::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = tunedb::Database::open(&db_path)
        .context("Failed to open database")?
        .with_thumbnail_size(config.thumbnail_size);

    match cli.command {
        Commands::Artists { view, sort, desc } => {
            let sort = match sort {
                Some(s) => s.sort(),
                None => config
                    .default_sort
                    .parse::<ArtistSortType>()
                    .context("Invalid default_sort in config")?,
            };
            let artists = db
                .artist_view(view.view(), sort, desc)
                .context("Failed to list artists")?;
            emit(cli.json, &artists, print_artist_table)?;
        }

        Commands::Songs { artist_id, sort, desc } => {
            let songs = db
                .artist_songs(&artist_id, sort.sort(), desc)
                .context("Failed to list songs")?;
            emit(cli.json, &songs, print_song_table)?;
        }

        Commands::Search { query, songs, fuzzy, limit } => {
            if songs {
                let found = db.search_artist_songs(&query, limit)?;
                emit(cli.json, &found, print_song_table)?;
            } else if fuzzy {
                let found = db.fuzzy_search_artists(&query, limit)?;
                emit(cli.json, &found, print_entity_table)?;
            } else {
                let found = db.search_artists(&query, limit)?;
                emit(cli.json, &found, print_artist_table)?;
            }
        }

        Commands::Match { query } => {
            let candidates = db.artists(ArtistSortType::CreateDate, false)?;
            match tunedb::closest_match(&query, &candidates) {
                Some(artist) => emit(cli.json, std::slice::from_ref(artist), print_artist_table)?,
                None => println!("No artist matches \"{query}\""),
            }
        }

        Commands::MostPlayed { days, limit } => {
            let since = window_start(Utc::now(), days.unwrap_or(config.most_played_days))?;
            let artists = db
                .most_played_artists(since, limit.unwrap_or(config.most_played_limit))
                .context("Failed to rank artists")?;
            emit(cli.json, &artists, print_artist_table)?;
        }

        Commands::Show { artist_id } => {
            let Some(artist) = db.artist(&artist_id)? else {
                bail!("No artist with id {artist_id}");
            };
            let preview = db.artist_songs_preview(&artist_id, config.preview_size)?;
            if cli.json {
                let doc = serde_json::json!({ "artist": artist, "preview": preview });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_artist_table(std::slice::from_ref(&artist));
                println!();
                print_song_table(&preview);
            }
        }

        Commands::Remote => {
            let artists = db.remote_artists()?;
            emit(cli.json, &artists, print_entity_table)?;
        }

        Commands::Local => {
            let artists = db.local_artists()?;
            emit(cli.json, &artists, print_entity_table)?;
        }

        Commands::Import { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let written = db
                .import_snapshot_json(&contents)
                .context("Failed to import snapshot")?;
            println!("Imported {written} rows from {}", file.display());
        }

        Commands::Refresh { artist_id, title, thumbnail } => {
            let Some(artist) = db.artist_entity(&artist_id)? else {
                bail!("No artist with id {artist_id}");
            };
            let page = ArtistPage { title, thumbnail };
            db.update_artist_from_page(&artist, &page)
                .context("Failed to update artist")?;
            println!("Updated {artist_id}");
        }

        Commands::Bookmark { artist_id, clear } => {
            let at = if clear { None } else { Some(Utc::now()) };
            if !db.set_bookmarked(&artist_id, at)? {
                bail!("No artist with id {artist_id}");
            }
        }

        Commands::PurgeLocal => {
            let removed = db.purge_local_artists().context("Failed to purge local artists")?;
            println!("Removed {removed} local artists");
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Library Statistics");
                println!("==================");
                println!("Artists:          {}", stats.total_artists);
                println!("  local:          {}", stats.local_artists);
                println!("  bookmarked:     {}", stats.bookmarked_artists);
                println!("Songs:            {}", stats.total_songs);
                println!("  in library:     {}", stats.library_songs);
                println!("  downloaded:     {}", stats.downloaded_songs);
                println!("Play events:      {}", stats.events);
                println!("Total play time:  {:.1} hours", stats.total_play_time as f64 / 3_600_000.0);
            }
        }
    }

    Ok(())
}

/// Start of a look-back window of `days` ending at `now`.
fn window_start(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    Duration::try_days(days)
        .and_then(|window| now.checked_sub_signed(window))
        .with_context(|| format!("Look-back window of {days} days is out of range"))
}

/// Print rows as JSON or with the given table printer.
fn emit<T: Serialize>(json: bool, rows: &[T], table: fn(&[T])) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else {
        table(rows);
    }
    Ok(())
}

/// Truncate long names to fit a column.
fn fit(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn print_artist_table(artists: &[Artist]) {
    println!(
        "{:<26} {:<30} {:>6} {:>5} {:>8}  {}",
        "Id", "Name", "Songs", "Dl", "Min", "Src"
    );
    println!("{}", "-".repeat(86));

    for a in artists {
        println!(
            "{:<26} {:<30} {:>6} {:>5} {:>8.1}  {}",
            fit(&a.artist.id, 26),
            fit(&a.artist.name, 30),
            a.song_count,
            a.download_count,
            a.total_play_time as f64 / 60_000.0,
            if a.artist.is_local { "local" } else { "remote" },
        );
    }
}

fn print_entity_table(artists: &[ArtistEntity]) {
    println!("{:<26} {:<30} {:<10}  {}", "Id", "Name", "Bookmark", "Src");
    println!("{}", "-".repeat(76));

    for a in artists {
        let bookmark = a
            .bookmarked_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        println!(
            "{:<26} {:<30} {:<10}  {}",
            fit(&a.id, 26),
            fit(&a.name, 30),
            bookmark,
            if a.is_local { "local" } else { "remote" },
        );
    }
}

fn print_song_table(songs: &[Song]) {
    println!("{:<14} {:<36} {:>8}  {}", "Id", "Title", "Min", "Offline");
    println!("{}", "-".repeat(70));

    for s in songs {
        println!(
            "{:<14} {:<36} {:>8.1}  {}",
            fit(&s.id, 14),
            fit(&s.title, 36),
            s.total_play_time as f64 / 60_000.0,
            if s.date_download.is_some() { "yes" } else { "" },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_start() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let since = window_start(now, 30).unwrap();
        assert_eq!(now - since, Duration::days(30));
    }

    #[test]
    fn test_window_start_out_of_range() {
        let now = Utc::now();
        assert!(window_start(now, 999_999_999_999).is_err());
        assert!(window_start(now, i64::MIN).is_err());
        // Representable as a duration, but not as a date.
        assert!(window_start(now, 100_000_000).is_err());
    }
}
