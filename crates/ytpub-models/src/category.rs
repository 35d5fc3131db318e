//! YouTube video categories.

/// "People & Blogs".
pub const DEFAULT_CATEGORY_ID: u32 = 22;

/// Category ids accepted by the YouTube Data API.
pub const YOUTUBE_CATEGORIES: &[(u32, &str)] = &[
    (1, "Film & Animation"),
    (2, "Autos & Vehicles"),
    (10, "Music"),
    (15, "Pets & Animals"),
    (17, "Sports"),
    (18, "Short Movies"),
    (19, "Travel & Events"),
    (20, "Gaming"),
    (21, "Videoblogging"),
    (22, "People & Blogs"),
    (23, "Comedy"),
    (24, "Entertainment"),
    (25, "News & Politics"),
    (26, "Howto & Style"),
    (27, "Education"),
    (28, "Science & Technology"),
    (29, "Nonprofits & Activism"),
    (30, "Movies"),
    (31, "Anime/Animation"),
    (32, "Action/Adventure"),
    (33, "Classics"),
    (34, "Comedy"),
    (35, "Documentary"),
    (36, "Drama"),
    (37, "Family"),
    (38, "Foreign"),
    (39, "Horror"),
    (40, "Sci-Fi/Fantasy"),
    (41, "Thriller"),
    (42, "Shorts"),
    (43, "Shows"),
    (44, "Trailers"),
];

pub fn is_valid_category(id: u32) -> bool {
    YOUTUBE_CATEGORIES.iter().any(|(c, _)| *c == id)
}

pub fn category_name(id: u32) -> Option<&'static str> {
    YOUTUBE_CATEGORIES.iter().find(|(c, _)| *c == id).map(|(_, n)| *n)
}

/// First candidate that is set, reset to the default when not a known id.
pub fn resolve_category(candidates: impl IntoIterator<Item = Option<u32>>) -> u32 {
    let picked = candidates.into_iter().flatten().next();
    match picked {
        Some(id) if is_valid_category(id) => id,
        _ => DEFAULT_CATEGORY_ID,
    }
}
