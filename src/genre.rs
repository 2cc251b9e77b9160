//! Genre bucketing.
//!
//! Catalogue genre labels are fine-grained (`deep-house`, `j-idol`, ...).
//! Each label keeps its original value as the sub-genre and is folded into one
//! of a small set of macro-genres for display and reporting.

use std::collections::HashMap;

/// Macro-genre for labels missing from the table.
pub const OTHER: &str = "other";

/// Display placeholder when a catalogue has no genre column at all.
pub const NOT_AVAILABLE: &str = "N/A";

const MACRO_GENRES: &[(&str, &[&str])] = &[
    ("folk", &["acoustic", "folk", "bluegrass", "singer-songwriter", "honky-tonk"]),
    (
        "rock",
        &[
            "rock", "alt-rock", "alternative", "indie", "indie-pop", "hard-rock", "punk",
            "punk-rock", "rock-n-roll", "rockabilly", "psych-rock", "grunge", "emo", "goth",
        ],
    ),
    (
        "metal",
        &["metal", "heavy-metal", "black-metal", "death-metal", "metalcore", "grindcore", "hardcore"],
    ),
    (
        "electronic",
        &[
            "electronic", "edm", "house", "deep-house", "progressive-house", "chicago-house",
            "techno", "detroit-techno", "minimal-techno", "trance", "club", "breakbeat",
            "drum-and-bass", "dubstep", "electro", "idm", "hardstyle", "garage",
        ],
    ),
    (
        "pop",
        &[
            "pop", "dance-pop", "power-pop", "synth-pop", "pop-film", "cantopop", "mandopop",
            "k-pop", "j-pop", "j-idol",
        ],
    ),
    ("hip-hop", &["hip-hop", "r-n-b", "groove"]),
    ("jazz", &["jazz", "blues"]),
    (
        "latin",
        &[
            "latin", "latino", "salsa", "samba", "pagode", "forro", "sertanejo", "mpb", "brazil",
            "tango", "reggae", "reggaeton", "ska",
        ],
    ),
    (
        "world",
        &[
            "french", "german", "spanish", "swedish", "turkish", "iranian", "indian", "malay",
            "british", "world-music",
        ],
    ),
    ("classical", &["classical", "opera", "piano"]),
    ("soul", &["soul", "funk", "gospel"]),
    ("children", &["children", "kids", "disney", "show-tunes", "anime"]),
    ("comedy", &["comedy"]),
    ("ambient", &["ambient", "new-age", "chill", "sleep", "study"]),
    ("dance", &["dance", "party", "disco"]),
    ("mood", &["happy", "sad", "romance"]),
];

lazy_static::lazy_static! {
    static ref GENRE_TABLE: HashMap<&'static str, &'static str> = MACRO_GENRES
        .iter()
        .flat_map(|(macro_genre, labels)| labels.iter().map(move |label| (*label, *macro_genre)))
        .collect();
}

/// Macro-genre for a catalogue genre label, `"other"` when unmapped.
///
/// Lookup is exact: labels in the catalogue are already lower-case slugs.
#[must_use]
pub fn main_genre(track_genre: &str) -> &'static str {
    GENRE_TABLE.get(track_genre).copied().unwrap_or(OTHER)
}
