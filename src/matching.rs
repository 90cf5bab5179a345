use crate::db::models::Artist;

/// Pick the artist a free-text query most likely refers to.
///
/// A case-insensitive exact name match wins (the first one, if several).
/// Otherwise the shortest name containing `query` case-sensitively is chosen,
/// the earliest one on equal length. `None` if nothing contains the query.
pub fn closest_match<'a>(query: &str, artists: &'a [Artist]) -> Option<&'a Artist> {
    let lowered = query.to_lowercase();
    if let Some(exact) = artists
        .iter()
        .find(|a| a.artist.name.to_lowercase() == lowered)
    {
        return Some(exact);
    }

    artists
        .iter()
        .filter(|a| a.artist.name.contains(query))
        .min_by_key(|a| a.artist.name.chars().count())
}
