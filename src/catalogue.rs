//! # Catalogue Preprocessing
//!
//! Turns raw catalogue rows into the immutable candidate pool used for the
//! whole session. The pipeline runs once at startup:
//!
//! 1. **Drop incomplete rows**: any missing value in a present column
//! 2. **Deduplicate** by `(track_name, artists)`: numeric columns are averaged,
//!    categorical columns take their mode, `track_id` keeps the first seen
//! 3. **Genre columns**: `sub_genre` keeps the catalogue label, `main_genre`
//!    comes from [`crate::genre::main_genre`]
//! 4. **Engineered features**: `mood_score`, `dance_mood`, `electronic_index`
//!    and `is_instrumental`
//!
//! Columns absent from the input never abort preprocessing. A missing audio
//! column drops that feature, and every engineered feature built from it, out
//! of the feature list. A missing genre column leaves both genre fields unset.

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::Path;

use crate::genre;
use crate::state::SeenSet;

/// Numeric columns a classifier is trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Danceability,
    Energy,
    Speechiness,
    Acousticness,
    Instrumentalness,
    Liveness,
    Valence,
    Tempo,
    Loudness,
    MoodScore,
    ElectronicIndex,
    IsInstrumental,
    DanceMood,
}

impl Feature {
    /// Audio descriptors read straight from the catalogue.
    pub const BASE: [Feature; 9] = [
        Feature::Danceability,
        Feature::Energy,
        Feature::Speechiness,
        Feature::Acousticness,
        Feature::Instrumentalness,
        Feature::Liveness,
        Feature::Valence,
        Feature::Tempo,
        Feature::Loudness,
    ];

    /// Features derived from the base ones.
    pub const ENGINEERED: [Feature; 4] = [
        Feature::MoodScore,
        Feature::ElectronicIndex,
        Feature::IsInstrumental,
        Feature::DanceMood,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Feature::Danceability => "danceability",
            Feature::Energy => "energy",
            Feature::Speechiness => "speechiness",
            Feature::Acousticness => "acousticness",
            Feature::Instrumentalness => "instrumentalness",
            Feature::Liveness => "liveness",
            Feature::Valence => "valence",
            Feature::Tempo => "tempo",
            Feature::Loudness => "loudness",
            Feature::MoodScore => "mood_score",
            Feature::ElectronicIndex => "electronic_index",
            Feature::IsInstrumental => "is_instrumental",
            Feature::DanceMood => "dance_mood",
        }
    }

    /// Base columns an engineered feature is computed from.
    #[must_use]
    pub const fn inputs(self) -> &'static [Feature] {
        match self {
            Feature::MoodScore => &[Feature::Energy, Feature::Valence],
            Feature::DanceMood => &[Feature::Danceability, Feature::Valence],
            Feature::ElectronicIndex => &[Feature::Energy, Feature::Acousticness],
            Feature::IsInstrumental => &[Feature::Instrumentalness],
            _ => &[],
        }
    }

    fn derive(self, base: &BTreeMap<Feature, f64>) -> Option<f64> {
        let get = |f: Feature| base.get(&f).copied();
        match self {
            Feature::MoodScore => Some((get(Feature::Energy)? + get(Feature::Valence)?) / 2.0),
            Feature::DanceMood => Some((get(Feature::Danceability)? + get(Feature::Valence)?) / 2.0),
            Feature::ElectronicIndex => Some(get(Feature::Energy)? - get(Feature::Acousticness)?),
            Feature::IsInstrumental => {
                Some(if get(Feature::Instrumentalness)? > 0.5 { 1.0 } else { 0.0 })
            }
            _ => None,
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

const IDENTITY_COLUMNS: [&str; 3] = ["track_id", "track_name", "artists"];
const METADATA_COLUMNS: [&str; 8] = [
    "album_name",
    "track_genre",
    "popularity",
    "duration_ms",
    "explicit",
    "key",
    "mode",
    "time_signature",
];

/// A catalogue row as read, before cleaning. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTrack {
    pub track_id: Option<String>,
    pub track_name: Option<String>,
    pub artists: Option<String>,
    pub album_name: Option<String>,
    pub track_genre: Option<String>,
    pub popularity: Option<f64>,
    pub duration_ms: Option<f64>,
    pub explicit: Option<bool>,
    pub key: Option<i64>,
    pub mode: Option<i64>,
    pub time_signature: Option<i64>,
    pub audio: BTreeMap<Feature, f64>,
}

impl RawTrack {
    /// Row with identity fields set and everything else missing.
    #[must_use]
    pub fn new(track_id: &str, track_name: &str, artists: &str) -> Self {
        Self {
            track_id: Some(track_id.to_string()),
            track_name: Some(track_name.to_string()),
            artists: Some(artists.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn genre(mut self, genre: &str) -> Self {
        self.track_genre = Some(genre.to_string());
        self
    }

    #[must_use]
    pub fn audio(mut self, feature: Feature, value: f64) -> Self {
        self.audio.insert(feature, value);
        self
    }

    /// Fill every metadata field with a plausible value.
    #[must_use]
    pub fn with_default_metadata(mut self) -> Self {
        self.album_name.get_or_insert_with(|| "Unknown Album".to_string());
        self.popularity.get_or_insert(50.0);
        self.duration_ms.get_or_insert(200_000.0);
        self.explicit.get_or_insert(false);
        self.key.get_or_insert(0);
        self.mode.get_or_insert(1);
        self.time_signature.get_or_insert(4);
        self
    }

    fn is_complete(&self, schema: &Schema) -> bool {
        let present = |column: &str, value: bool| !schema.has(column) || value;

        self.track_id.is_some()
            && self.track_name.is_some()
            && self.artists.is_some()
            && present("album_name", self.album_name.is_some())
            && present("track_genre", self.track_genre.is_some())
            && present("popularity", self.popularity.is_some())
            && present("duration_ms", self.duration_ms.is_some())
            && present("explicit", self.explicit.is_some())
            && present("key", self.key.is_some())
            && present("mode", self.mode.is_some())
            && present("time_signature", self.time_signature.is_some())
            && Feature::BASE
                .iter()
                .all(|f| present(f.name(), self.audio.contains_key(f)))
    }
}

/// Names of the columns a catalogue actually carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: HashSet<String>,
}

impl Schema {
    #[must_use]
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }

    /// Every column the preprocessor knows about.
    #[must_use]
    pub fn full() -> Self {
        Self::new(
            IDENTITY_COLUMNS
                .iter()
                .chain(METADATA_COLUMNS.iter())
                .copied()
                .chain(Feature::BASE.iter().map(|f| f.name())),
        )
    }

    #[must_use]
    pub fn without(mut self, column: &str) -> Self {
        self.columns.remove(column);
        self
    }

    #[must_use]
    pub fn has(&self, column: &str) -> bool {
        self.columns.contains(column)
    }
}

/// Raw rows plus the schema they were read with.
#[derive(Debug, Clone)]
pub struct RawCatalogue {
    pub schema: Schema,
    pub rows: Vec<RawTrack>,
}

impl RawCatalogue {
    #[must_use]
    pub fn new(schema: Schema, rows: Vec<RawTrack>) -> Self {
        Self { schema, rows }
    }

    /// Rows assumed to come from a catalogue carrying every known column.
    #[must_use]
    pub fn with_full_schema(rows: Vec<RawTrack>) -> Self {
        Self::new(Schema::full(), rows)
    }
}

/// Load a catalogue CSV file with a header row.
///
/// # Errors
///
/// Fails when the file cannot be read, is not valid CSV, or lacks one of the
/// identity columns (`track_id`, `track_name`, `artists`).
pub fn load_csv(path: &Path) -> Result<RawCatalogue> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open catalogue at {}", path.display()))?;
    read_csv(file).with_context(|| format!("Failed to read catalogue {}", path.display()))
}

/// Cell values read as missing, the same set pandas treats as NA by default.
const NA_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN", "<NA>",
    "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Read catalogue CSV from any reader. See [`load_csv`].
///
/// NA tokens and non-finite numbers count as missing values.
pub fn read_csv<R: Read>(reader: R) -> Result<RawCatalogue> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = reader.headers().context("Catalogue has no header row")?.clone();
    let index: HashMap<&str, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();

    for column in IDENTITY_COLUMNS {
        if !index.contains_key(column) {
            bail!("Catalogue is missing required column `{column}`");
        }
    }

    let schema = Schema::new(
        IDENTITY_COLUMNS
            .iter()
            .chain(METADATA_COLUMNS.iter())
            .copied()
            .chain(Feature::BASE.iter().map(|f| f.name()))
            .filter(|column| index.contains_key(column)),
    );
    for column in METADATA_COLUMNS {
        if !schema.has(column) {
            warn!("Catalogue has no `{column}` column");
        }
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed catalogue record {}", line + 1))?;
        let cell = |column: &str| {
            index
                .get(column)
                .and_then(|&i| record.get(i))
                .map(str::trim)
                .filter(|value| !NA_TOKENS.contains(value))
        };
        let text = |column: &str| cell(column).map(str::to_string);
        let number = |column: &str| {
            cell(column)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|v| v.is_finite())
        };
        let integer = |column: &str| {
            cell(column).and_then(|v| v.parse::<i64>().ok().or_else(|| v.parse::<f64>().ok().map(|f| f as i64)))
        };

        let mut audio = BTreeMap::new();
        for feature in Feature::BASE {
            if let Some(value) = number(feature.name()) {
                audio.insert(feature, value);
            }
        }

        rows.push(RawTrack {
            track_id: text("track_id"),
            track_name: text("track_name"),
            artists: text("artists"),
            album_name: text("album_name"),
            track_genre: text("track_genre"),
            popularity: number("popularity"),
            duration_ms: number("duration_ms"),
            explicit: cell("explicit").and_then(parse_bool),
            key: integer("key"),
            mode: integer("mode"),
            time_signature: integer("time_signature"),
            audio,
        });
    }

    debug!("Read {} catalogue rows", rows.len());
    Ok(RawCatalogue::new(schema, rows))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

/// A cleaned catalogue row. Never mutated after preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub track_id: String,
    pub track_name: String,
    pub artists: String,
    pub album_name: Option<String>,
    pub main_genre: Option<String>,
    pub sub_genre: Option<String>,
    pub popularity: Option<f64>,
    pub duration_ms: Option<f64>,
    pub explicit: Option<bool>,
    pub key: Option<i64>,
    pub mode: Option<i64>,
    pub time_signature: Option<i64>,
    features: BTreeMap<Feature, f64>,
}

impl Track {
    #[must_use]
    pub fn feature(&self, feature: Feature) -> Option<f64> {
        self.features.get(&feature).copied()
    }

    /// Feature values in column order.
    ///
    /// Columns come from the track's own catalogue, so every value is present;
    /// a foreign column reads as `0.0`.
    #[must_use]
    pub fn feature_row(&self, columns: &[Feature]) -> Vec<f64> {
        columns
            .iter()
            .map(|f| self.features.get(f).copied().unwrap_or_default())
            .collect()
    }

    #[must_use]
    pub fn main_genre_display(&self) -> &str {
        self.main_genre.as_deref().unwrap_or(genre::NOT_AVAILABLE)
    }

    #[must_use]
    pub fn sub_genre_display(&self) -> &str {
        self.sub_genre.as_deref().unwrap_or(genre::NOT_AVAILABLE)
    }
}

impl From<&Track> for RawTrack {
    fn from(track: &Track) -> Self {
        Self {
            track_id: Some(track.track_id.clone()),
            track_name: Some(track.track_name.clone()),
            artists: Some(track.artists.clone()),
            album_name: track.album_name.clone(),
            track_genre: track.sub_genre.clone(),
            popularity: track.popularity,
            duration_ms: track.duration_ms,
            explicit: track.explicit,
            key: track.key,
            mode: track.mode,
            time_signature: track.time_signature,
            audio: track
                .features
                .iter()
                .filter(|(f, _)| Feature::BASE.contains(f))
                .map(|(f, v)| (*f, *v))
                .collect(),
        }
    }
}

/// Counters describing one preprocessing run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PreprocessReport {
    pub rows_read: usize,
    pub incomplete_dropped: usize,
    pub duplicates_merged: usize,
    pub tracks: usize,
    pub feature_columns: Vec<Feature>,
    pub main_genres: BTreeMap<String, usize>,
}

/// The immutable candidate pool.
#[derive(Debug, Clone)]
pub struct Catalogue {
    tracks: Vec<Track>,
    feature_columns: Vec<Feature>,
    schema: Schema,
    report: PreprocessReport,
}

impl Catalogue {
    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn feature_columns(&self) -> &[Feature] {
        &self.feature_columns
    }

    #[must_use]
    pub fn report(&self) -> &PreprocessReport {
        &self.report
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    #[must_use]
    pub fn get(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Tracks not yet shown, in catalogue order.
    #[must_use]
    pub fn candidates(&self, seen: &SeenSet) -> Vec<&Track> {
        self.tracks
            .iter()
            .filter(|t| !seen.contains(&t.track_id))
            .collect()
    }

    /// The cleaned rows in raw form, with the schema they were loaded with.
    #[must_use]
    pub fn to_raw(&self) -> RawCatalogue {
        RawCatalogue::new(self.schema.clone(), self.tracks.iter().map(RawTrack::from).collect())
    }
}

#[derive(Default)]
struct Group {
    track_id: String,
    rows: usize,
    popularity: f64,
    duration_ms: f64,
    audio: BTreeMap<Feature, f64>,
    album_name: Vec<String>,
    track_genre: Vec<String>,
    explicit: Vec<bool>,
    key: Vec<i64>,
    mode: Vec<i64>,
    time_signature: Vec<i64>,
}

impl Group {
    fn absorb(&mut self, row: RawTrack) {
        if self.rows == 0 {
            self.track_id = row.track_id.unwrap_or_default();
        }
        self.rows += 1;
        self.popularity += row.popularity.unwrap_or_default();
        self.duration_ms += row.duration_ms.unwrap_or_default();
        for (feature, value) in row.audio {
            *self.audio.entry(feature).or_default() += value;
        }
        self.album_name.extend(row.album_name);
        self.track_genre.extend(row.track_genre);
        self.explicit.extend(row.explicit);
        self.key.extend(row.key);
        self.mode.extend(row.mode);
        self.time_signature.extend(row.time_signature);
    }
}

/// Most frequent value; the smallest one wins a tie.
fn mode_of<T: Ord + Clone>(values: &[T]) -> Option<T> {
    let mut counts: BTreeMap<&T, usize> = BTreeMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut best: Option<(&T, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value.clone())
}

/// Run the full cleaning pipeline.
#[must_use]
pub fn preprocess(raw: RawCatalogue) -> Catalogue {
    let RawCatalogue { schema, rows } = raw;
    let rows_read = rows.len();

    let complete: Vec<RawTrack> = rows.into_iter().filter(|row| row.is_complete(&schema)).collect();
    let incomplete_dropped = rows_read - complete.len();
    let complete_count = complete.len();

    let mut groups: BTreeMap<(String, String), Group> = BTreeMap::new();
    for row in complete {
        let key = (
            row.track_name.clone().unwrap_or_default(),
            row.artists.clone().unwrap_or_default(),
        );
        groups.entry(key).or_default().absorb(row);
    }
    let duplicates_merged = complete_count - groups.len();

    let base_columns: Vec<Feature> = Feature::BASE
        .iter()
        .copied()
        .filter(|f| schema.has(f.name()))
        .collect();
    let engineered_columns: Vec<Feature> = Feature::ENGINEERED
        .iter()
        .copied()
        .filter(|f| f.inputs().iter().all(|input| base_columns.contains(input)))
        .collect();
    for feature in Feature::ENGINEERED {
        if !engineered_columns.contains(&feature) {
            warn!("Skipping engineered feature `{feature}`: an input column is missing");
        }
    }
    let feature_columns: Vec<Feature> = base_columns.into_iter().chain(engineered_columns.iter().copied()).collect();

    let tracks: Vec<Track> = groups
        .into_iter()
        .map(|((track_name, artists), group)| {
            #[allow(clippy::cast_precision_loss)]
            let n = group.rows as f64;
            let mut features: BTreeMap<Feature, f64> =
                group.audio.iter().map(|(f, sum)| (*f, sum / n)).collect();
            for feature in &engineered_columns {
                if let Some(value) = feature.derive(&features) {
                    features.insert(*feature, value);
                }
            }
            let track_genre = mode_of(&group.track_genre);

            Track {
                track_id: group.track_id,
                track_name,
                artists,
                album_name: mode_of(&group.album_name),
                main_genre: track_genre.as_deref().map(|g| genre::main_genre(g).to_string()),
                sub_genre: track_genre,
                popularity: schema.has("popularity").then(|| group.popularity / n),
                duration_ms: schema.has("duration_ms").then(|| group.duration_ms / n),
                explicit: mode_of(&group.explicit),
                key: mode_of(&group.key),
                mode: mode_of(&group.mode),
                time_signature: mode_of(&group.time_signature),
                features,
            }
        })
        .collect();

    let mut main_genres = BTreeMap::new();
    for track in &tracks {
        *main_genres.entry(track.main_genre_display().to_string()).or_default() += 1;
    }

    info!(
        "Preprocessed catalogue: {} rows read, {} incomplete dropped, {} duplicates merged, {} tracks",
        rows_read,
        incomplete_dropped,
        duplicates_merged,
        tracks.len()
    );

    let report = PreprocessReport {
        rows_read,
        incomplete_dropped,
        duplicates_merged,
        tracks: tracks.len(),
        feature_columns: feature_columns.clone(),
        main_genres,
    };

    Catalogue {
        tracks,
        feature_columns,
        schema,
        report,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Complete row with every audio feature set to `level`.
    pub(crate) fn raw_track(id: &str, name: &str, artist: &str, genre: &str, level: f64) -> RawTrack {
        let mut row = RawTrack::new(id, name, artist).genre(genre).with_default_metadata();
        for feature in Feature::BASE {
            row = row.audio(feature, level);
        }
        row
    }

    #[test]
    fn test_incomplete_rows_dropped() {
        let mut missing_energy = raw_track("t2", "Two", "B", "rock", 0.2);
        missing_energy.audio.remove(&Feature::Energy);
        let mut missing_album = raw_track("t3", "Three", "C", "rock", 0.3);
        missing_album.album_name = None;

        let catalogue = preprocess(RawCatalogue::with_full_schema(vec![
            raw_track("t1", "One", "A", "rock", 0.1),
            missing_energy,
            missing_album,
        ]));

        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.tracks()[0].track_id, "t1");
        assert_eq!(catalogue.report().incomplete_dropped, 2);
    }

    #[test]
    fn test_duplicates_merged_by_name_and_artist() {
        let catalogue = preprocess(RawCatalogue::with_full_schema(vec![
            raw_track("first", "Song", "Artist", "house", 0.2),
            raw_track("second", "Song", "Artist", "pop", 0.4),
            raw_track("third", "Song", "Artist", "pop", 0.6),
            raw_track("other", "Song", "Someone Else", "rock", 0.9),
        ]));

        assert_eq!(catalogue.len(), 2);
        assert_eq!(catalogue.report().duplicates_merged, 2);

        let merged = catalogue.tracks().iter().find(|t| t.artists == "Artist").unwrap();
        assert_eq!(merged.track_id, "first");
        assert!((merged.feature(Feature::Energy).unwrap() - 0.4).abs() < 1e-12);
        assert_eq!(merged.sub_genre.as_deref(), Some("pop"));
        assert_eq!(merged.main_genre.as_deref(), Some("pop"));
    }

    #[test]
    fn test_mode_ties_take_smallest_value() {
        assert_eq!(mode_of(&["b", "a", "b", "a"]), Some("a"));
        assert_eq!(mode_of(&[4, 3, 3]), Some(3));
        assert_eq!(mode_of::<i64>(&[]), None);
    }

    #[test]
    fn test_engineered_features() {
        let row = RawTrack::new("t", "Song", "A")
            .genre("techno")
            .with_default_metadata()
            .audio(Feature::Danceability, 0.6)
            .audio(Feature::Energy, 0.8)
            .audio(Feature::Speechiness, 0.1)
            .audio(Feature::Acousticness, 0.3)
            .audio(Feature::Instrumentalness, 0.7)
            .audio(Feature::Liveness, 0.2)
            .audio(Feature::Valence, 0.4)
            .audio(Feature::Tempo, 120.0)
            .audio(Feature::Loudness, -6.0);

        let catalogue = preprocess(RawCatalogue::with_full_schema(vec![row]));
        let track = &catalogue.tracks()[0];

        assert_eq!(catalogue.feature_columns().len(), 13);
        assert!((track.feature(Feature::MoodScore).unwrap() - 0.6).abs() < 1e-12);
        assert!((track.feature(Feature::DanceMood).unwrap() - 0.5).abs() < 1e-12);
        assert!((track.feature(Feature::ElectronicIndex).unwrap() - 0.5).abs() < 1e-12);
        assert_eq!(track.feature(Feature::IsInstrumental), Some(1.0));
        assert_eq!(track.main_genre.as_deref(), Some("electronic"));
        assert_eq!(track.sub_genre.as_deref(), Some("techno"));
    }

    #[test]
    fn test_instrumental_threshold_is_strict() {
        let row = raw_track("t", "Song", "A", "piano", 0.5);
        let catalogue = preprocess(RawCatalogue::with_full_schema(vec![row]));
        assert_eq!(catalogue.tracks()[0].feature(Feature::IsInstrumental), Some(0.0));
    }

    #[test]
    fn test_unmapped_genre_is_other() {
        let catalogue = preprocess(RawCatalogue::with_full_schema(vec![raw_track(
            "t", "Song", "A", "polka", 0.5,
        )]));
        assert_eq!(catalogue.tracks()[0].main_genre.as_deref(), Some("other"));
    }

    #[test]
    fn test_missing_columns_degrade_gracefully() {
        let schema = Schema::full().without("acousticness").without("track_genre");
        let rows = vec![raw_track("t1", "One", "A", "rock", 0.3), raw_track("t2", "Two", "B", "rock", 0.7)]
            .into_iter()
            .map(|mut row| {
                row.audio.remove(&Feature::Acousticness);
                row.track_genre = None;
                row
            })
            .collect();

        let catalogue = preprocess(RawCatalogue::new(schema, rows));

        assert_eq!(catalogue.len(), 2);
        let columns = catalogue.feature_columns();
        assert_eq!(columns.len(), 11);
        assert!(!columns.contains(&Feature::Acousticness));
        assert!(!columns.contains(&Feature::ElectronicIndex));
        assert!(columns.contains(&Feature::MoodScore));
        let track = &catalogue.tracks()[0];
        assert_eq!(track.main_genre_display(), "N/A");
        assert_eq!(track.sub_genre_display(), "N/A");
        assert_eq!(track.feature(Feature::ElectronicIndex), None);
    }

    #[test]
    fn test_preprocessing_is_idempotent() {
        let first = preprocess(RawCatalogue::with_full_schema(vec![
            raw_track("a1", "Alpha", "A", "rock", 0.1),
            raw_track("a2", "Alpha", "A", "rock", 0.3),
            raw_track("b1", "Beta", "B", "salsa", 0.5),
            raw_track("c1", "Gamma", "C", "ambient", 0.9),
        ]));
        let second = preprocess(first.to_raw());

        assert_eq!(first.len(), 3);
        assert_eq!(second.len(), first.len());
        assert_eq!(second.report().duplicates_merged, 0);
        assert_eq!(second.tracks(), first.tracks());
    }

    #[test]
    fn test_read_csv_parses_cells() {
        let csv = "\
,track_id,artists,album_name,track_name,popularity,duration_ms,explicit,danceability,energy,key,loudness,mode,speechiness,acousticness,instrumentalness,liveness,valence,tempo,time_signature,track_genre
0,id1,Artist One,Album,Song One,73,230666,False,0.676,0.461,1,-6.746,0,0.143,0.0322,1.01e-06,0.358,0.715,87.917,4,acoustic
1,id2,Artist Two,Album,Song Two,55,149610,True,0.42,0.166,1,-17.235,1,0.0763,0.924,5.56e-06,0.101,0.267,77.489,4,
";
        let raw = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(raw.rows.len(), 2);
        assert_eq!(raw.rows[0].explicit, Some(false));
        assert_eq!(raw.rows[1].explicit, Some(true));
        assert_eq!(raw.rows[0].audio.len(), 9);
        assert_eq!(raw.rows[1].track_genre, None);

        let catalogue = preprocess(raw);
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.tracks()[0].main_genre.as_deref(), Some("folk"));
    }

    #[test]
    fn test_na_and_non_finite_cells_are_missing() {
        let csv = "\
track_id,artists,track_name,energy,valence,track_genre
t1,A,One,0.5,0.4,rock
t2,B,Two,NaN,0.4,rock
t3,C,Three,0.5,inf,rock
t4,D,Four,0.5,NA,rock
t5,E,Five,0.5,0.4,null
";
        let raw = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(raw.rows[1].audio.get(&Feature::Energy), None);
        assert_eq!(raw.rows[2].audio.get(&Feature::Valence), None);
        assert_eq!(raw.rows[3].audio.get(&Feature::Valence), None);
        assert_eq!(raw.rows[4].track_genre, None);

        let catalogue = preprocess(raw);
        assert_eq!(catalogue.len(), 1);
        assert_eq!(catalogue.report().incomplete_dropped, 4);
        assert_eq!(catalogue.tracks()[0].track_id, "t1");
        assert!(catalogue
            .tracks()
            .iter()
            .flat_map(|t| t.feature_row(catalogue.feature_columns()))
            .all(f64::is_finite));
    }

    #[test]
    fn test_read_csv_requires_identity_columns() {
        let csv = "track_id,artists,energy\nid1,A,0.5\n";
        let err = read_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("track_name"));
    }
}
