//! # Cold-Start Seeder
//!
//! Collects the first votes before any model exists.
//!
//! A favorite-artist query is matched case-insensitively against the
//! `artists` field of every track. One matching artist is taken as is;
//! several are put to the listener, who picks one, takes them all, or
//! cancels. Every track by the resolved artists counts as a strong like
//! without asking.
//!
//! The listener then rates a random sample of unseen tracks. The sample size
//! depends on how the query went:
//!
//! | query                      | tracks to rate            |
//! |----------------------------|---------------------------|
//! | none                       | requested number          |
//! | resolved                   | `favorite_artist_quota`   |
//! | no match, or cancelled     | `fallback_quota`          |

use anyhow::Result;
use log::{debug, info};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::BTreeSet;

use crate::catalogue::{Catalogue, Track};
use crate::config::ColdStartConfig;
use crate::session::Listener;
use crate::state::{EntryOrigin, SessionState};
use crate::vote::Vote;

/// Outcome of matching a favorite-artist query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtistMatch {
    None,
    Single(String),
    /// Distinct artist names, sorted.
    Multiple(Vec<String>),
}

/// Listener answer when a query matched several artists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistChoice {
    /// Index into the offered list.
    One(usize),
    All,
    Cancel,
}

/// What a cold start did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    /// Artists whose tracks were seeded as strong likes.
    pub favorite_artists: Vec<String>,
    pub favorite_tracks: usize,
    /// Random tracks the listener was asked to rate.
    pub quota: usize,
    pub rated: usize,
}

/// Distinct `artists` values containing `query`, ignoring case.
#[must_use]
pub fn match_artists(catalogue: &Catalogue, query: &str) -> ArtistMatch {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return ArtistMatch::None;
    }

    let names: BTreeSet<&str> = catalogue
        .tracks()
        .iter()
        .filter(|t| t.artists.to_lowercase().contains(&needle))
        .map(|t| t.artists.as_str())
        .collect();

    let mut names: Vec<String> = names.into_iter().map(str::to_owned).collect();
    match names.len() {
        0 => ArtistMatch::None,
        1 => ArtistMatch::Single(names.remove(0)),
        _ => ArtistMatch::Multiple(names),
    }
}

/// Turn a query into the artists to seed, asking the listener when needed.
///
/// # Errors
///
/// Propagates listener I/O failures.
pub fn resolve_favorite_artist<L: Listener + ?Sized>(
    catalogue: &Catalogue,
    query: &str,
    listener: &mut L,
) -> Result<Vec<String>> {
    let resolved = match match_artists(catalogue, query) {
        ArtistMatch::None => {
            info!("No artist matches `{}'", query.trim());
            Vec::new()
        }
        ArtistMatch::Single(name) => vec![name],
        ArtistMatch::Multiple(names) => match listener.choose_artist(query, &names)? {
            ArtistChoice::One(i) => names.get(i).cloned().into_iter().collect(),
            ArtistChoice::All => names,
            ArtistChoice::Cancel => Vec::new(),
        },
    };
    debug!("Favorite artist query `{}' resolved to {:?}", query.trim(), resolved);
    Ok(resolved)
}

/// Random tracks to rate for a given query outcome.
#[must_use]
pub fn quota(config: &ColdStartConfig, requested: usize, query_given: bool, resolved: bool) -> usize {
    match (query_given, resolved) {
        (false, _) => requested,
        (true, true) => config.favorite_artist_quota,
        (true, false) => config.fallback_quota,
    }
}

/// Seed `state` with favorite-artist likes and rated random tracks.
///
/// Already seen tracks are never seeded or sampled again, so running a cold
/// start twice extends the history instead of repeating it.
///
/// # Errors
///
/// Propagates listener I/O failures.
pub fn cold_start<L, R>(
    state: &mut SessionState,
    catalogue: &Catalogue,
    config: &ColdStartConfig,
    requested: usize,
    favorite_artist: Option<&str>,
    listener: &mut L,
    rng: &mut R,
) -> Result<SeedSummary>
where
    L: Listener + ?Sized,
    R: Rng + ?Sized,
{
    let query = favorite_artist.map(str::trim).filter(|q| !q.is_empty());
    let mut summary = SeedSummary::default();

    if let Some(query) = query {
        summary.favorite_artists = resolve_favorite_artist(catalogue, query, listener)?;
        let favorites: Vec<&Track> = catalogue
            .candidates(state.seen())
            .into_iter()
            .filter(|t| summary.favorite_artists.contains(&t.artists))
            .collect();
        for track in &favorites {
            state.record(track, Vote::StrongLike, EntryOrigin::FavoriteArtist);
        }
        summary.favorite_tracks = favorites.len();
        listener.seeded_favorites(&summary.favorite_artists, summary.favorite_tracks)?;
    }

    summary.quota = quota(
        config,
        requested,
        query.is_some(),
        !summary.favorite_artists.is_empty(),
    );

    let pool = catalogue.candidates(state.seen());
    let sample: Vec<&Track> = pool.choose_multiple(rng, summary.quota).copied().collect();
    for (i, track) in sample.iter().enumerate() {
        let vote = listener.rate_seed(track, i + 1, sample.len())?;
        state.record(track, vote, EntryOrigin::ColdStart);
    }
    summary.rated = sample.len();

    info!(
        "Cold start: {} favorite tracks from {:?}, {} of {} random tracks rated",
        summary.favorite_tracks, summary.favorite_artists, summary.rated, summary.quota
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::tests::raw_track;
    use crate::catalogue::{preprocess, RawCatalogue};
    use crate::session::tests::ScriptedListener;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[allow(clippy::cast_precision_loss)]
    fn catalogue() -> Catalogue {
        let mut rows = vec![
            raw_track("a1", "Alpha One", "The Beatles", "rock", 0.1),
            raw_track("a2", "Alpha Two", "The Beatles", "rock", 0.2),
            raw_track("b1", "Beta", "Beatles Tribute Band", "rock", 0.3),
            raw_track("c1", "Gamma", "The Beatless", "pop", 0.4),
            raw_track("d1", "Delta", "Queen", "rock", 0.5),
        ];
        rows.extend((0..20).map(|i| {
            raw_track(&format!("x{i}"), &format!("Filler {i:02}"), "Various", "jazz", i as f64 / 20.0)
        }));
        preprocess(RawCatalogue::with_full_schema(rows))
    }

    fn state(catalogue: &Catalogue) -> SessionState {
        SessionState::new(catalogue.feature_columns().to_vec()).unwrap()
    }

    #[test]
    fn test_artist_matching_is_case_insensitive_and_distinct() {
        let catalogue = catalogue();
        assert_eq!(match_artists(&catalogue, "queen"), ArtistMatch::Single("Queen".into()));
        assert_eq!(match_artists(&catalogue, "nobody"), ArtistMatch::None);
        assert_eq!(match_artists(&catalogue, "   "), ArtistMatch::None);
        assert_eq!(
            match_artists(&catalogue, "BEATLES"),
            ArtistMatch::Multiple(vec![
                "Beatles Tribute Band".into(),
                "The Beatles".into(),
                "The Beatless".into()
            ])
        );
    }

    #[test]
    fn test_random_cold_start_rates_requested_tracks() {
        let catalogue = catalogue();
        let mut state = state(&catalogue);
        let mut listener = ScriptedListener::new(&[Vote::StrongLike, Vote::StrongDislike]);
        let mut rng = StdRng::seed_from_u64(5);
        let config = ColdStartConfig::default();

        let summary =
            cold_start(&mut state, &catalogue, &config, 5, None, &mut listener, &mut rng).unwrap();

        assert_eq!(summary.quota, 5);
        assert_eq!(summary.rated, 5);
        assert_eq!(state.history().len(), 5);
        let ids: HashSet<&str> = state.history().iter().map(|e| e.track_id.as_str()).collect();
        assert_eq!(ids.len(), 5);
        assert!(ids.iter().all(|id| state.seen().contains(id)));
        assert!(state.history().iter().all(|e| e.origin == EntryOrigin::ColdStart));
    }

    #[test]
    fn test_several_artists_all_seeds_every_match() {
        let catalogue = catalogue();
        let mut state = state(&catalogue);
        let mut listener = ScriptedListener::new(&[Vote::Indifferent]).choosing(ArtistChoice::All);
        let mut rng = StdRng::seed_from_u64(9);
        let config = ColdStartConfig::default();

        let summary = cold_start(
            &mut state,
            &catalogue,
            &config,
            3,
            Some("beatles"),
            &mut listener,
            &mut rng,
        )
        .unwrap();

        assert_eq!(listener.artist_prompts, 1);
        assert_eq!(summary.favorite_artists.len(), 3);
        assert_eq!(summary.favorite_tracks, 4);
        assert_eq!(summary.quota, 5);
        assert_eq!(state.history().len(), 9);

        let favorites: Vec<_> = state
            .history()
            .iter()
            .filter(|e| e.origin == EntryOrigin::FavoriteArtist)
            .collect();
        assert_eq!(favorites.len(), 4);
        assert!(favorites.iter().all(|e| e.vote == Vote::StrongLike));
    }

    #[test]
    fn test_single_choice_and_cancel() {
        let catalogue = catalogue();
        let config = ColdStartConfig::default();
        let mut rng = StdRng::seed_from_u64(11);

        let mut state_one = state(&catalogue);
        let mut pick_second = ScriptedListener::new(&[Vote::WeakLike]).choosing(ArtistChoice::One(1));
        let summary = cold_start(
            &mut state_one,
            &catalogue,
            &config,
            3,
            Some("beatles"),
            &mut pick_second,
            &mut rng,
        )
        .unwrap();
        assert_eq!(summary.favorite_artists, vec!["The Beatles".to_string()]);
        assert_eq!(summary.favorite_tracks, 2);
        assert_eq!(summary.quota, config.favorite_artist_quota);

        let mut state_cancel = state(&catalogue);
        let mut cancel = ScriptedListener::new(&[Vote::WeakLike]).choosing(ArtistChoice::Cancel);
        let summary = cold_start(
            &mut state_cancel,
            &catalogue,
            &config,
            3,
            Some("beatles"),
            &mut cancel,
            &mut rng,
        )
        .unwrap();
        assert!(summary.favorite_artists.is_empty());
        assert_eq!(summary.quota, config.fallback_quota);
        assert_eq!(state_cancel.history().len(), 10);
    }

    #[test]
    fn test_unmatched_query_raises_quota() {
        let catalogue = catalogue();
        let mut state = state(&catalogue);
        let mut listener = ScriptedListener::new(&[Vote::StrongDislike]);
        let mut rng = StdRng::seed_from_u64(13);
        let config = ColdStartConfig::default();

        let summary = cold_start(
            &mut state,
            &catalogue,
            &config,
            5,
            Some("Nobody Famous"),
            &mut listener,
            &mut rng,
        )
        .unwrap();
        assert_eq!(summary.quota, 10);
        assert_eq!(summary.rated, 10);
        assert_eq!(listener.artist_prompts, 0);
    }

    #[test]
    fn test_small_pool_samples_everything_left() {
        let catalogue = preprocess(RawCatalogue::with_full_schema(vec![
            raw_track("t1", "One", "A", "rock", 0.1),
            raw_track("t2", "Two", "B", "rock", 0.9),
        ]));
        let mut state = state(&catalogue);
        state.mark_seen("t1");
        let mut listener = ScriptedListener::new(&[Vote::StrongLike]);
        let mut rng = StdRng::seed_from_u64(1);

        let summary = cold_start(
            &mut state,
            &catalogue,
            &ColdStartConfig::default(),
            5,
            None,
            &mut listener,
            &mut rng,
        )
        .unwrap();
        assert_eq!(summary.rated, 1);
        assert_eq!(state.history().entries()[0].track_id, "t2");
    }

    #[test]
    fn test_quota_table() {
        let config = ColdStartConfig::default();
        assert_eq!(quota(&config, 7, false, false), 7);
        assert_eq!(quota(&config, 7, true, true), 5);
        assert_eq!(quota(&config, 7, true, false), 10);
    }
}
