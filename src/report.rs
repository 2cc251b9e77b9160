//! # Listening Reports
//!
//! Read-only summaries built from a session: a "wrapped" recap of what the
//! listener loved, and artist/genre suggestions scored by the current model.
//! Nothing here feeds back into training or selection.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::catalogue::{Catalogue, Feature, Track};
use crate::genre;
use crate::model::PreferenceModel;
use crate::state::SessionState;
use crate::vote::Vote;

const WRAPPED_TOP: usize = 3;
const WRAPPED_MEANS: [Feature; 3] = [Feature::Valence, Feature::Energy, Feature::MoodScore];

/// Recap of the strong likes in a history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wrapped {
    pub liked: usize,
    pub top_sub_genres: Vec<(String, usize)>,
    pub top_artists: Vec<(String, usize)>,
    /// Mean of valence, energy and mood score, for those the catalogue has.
    pub feature_means: Vec<(Feature, f64)>,
}

/// `None` when nothing was voted a strong like.
#[must_use]
pub fn wrapped(state: &SessionState) -> Option<Wrapped> {
    let liked: Vec<_> = state
        .history()
        .iter()
        .filter(|e| e.vote == Vote::StrongLike)
        .collect();
    if liked.is_empty() {
        return None;
    }

    let top_sub_genres = top_counts(liked.iter().filter_map(|e| e.sub_genre.as_deref()), WRAPPED_TOP);
    let top_artists = top_counts(liked.iter().map(|e| e.artists.trim()), WRAPPED_TOP);

    let columns = state.feature_columns();
    #[allow(clippy::cast_precision_loss)]
    let n = liked.len() as f64;
    let feature_means = WRAPPED_MEANS
        .iter()
        .filter_map(|f| columns.iter().position(|c| c == f).map(|i| (*f, i)))
        .map(|(f, i)| (f, liked.iter().map(|e| e.features[i]).sum::<f64>() / n))
        .collect();

    Some(Wrapped {
        liked: liked.len(),
        top_sub_genres,
        top_artists,
        feature_means,
    })
}

/// Most frequent values, count descending then name ascending.
fn top_counts<'a>(values: impl Iterator<Item = &'a str>, k: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_owned(), count))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(k);
    ranked
}

/// Artists and genres the listener has not heard yet, ranked by the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestions {
    /// Best like-probability of any unseen track by the artist.
    pub artists: Vec<(String, f64)>,
    /// Mean like-probability over unseen tracks of the genre.
    pub main_genres: Vec<(String, f64)>,
    pub sub_genres: Vec<(String, f64)>,
}

#[derive(Clone, Copy)]
enum Aggregate {
    Max,
    Mean,
}

/// Rank unheard artists and genres, `top_n` of each.
///
/// `None` when every track has been shown. Within a category where nothing is
/// unheard anymore, every unseen track counts.
#[must_use]
pub fn suggestions(
    model: &PreferenceModel,
    catalogue: &Catalogue,
    state: &SessionState,
    top_n: usize,
) -> Option<Suggestions> {
    let candidates = catalogue.candidates(state.seen());
    if candidates.is_empty() {
        return None;
    }
    let scored: Vec<(&Track, f64)> = candidates
        .into_iter()
        .map(|t| (t, model.score_track(t)))
        .collect();

    let history = state.history();
    let heard_artists: HashSet<&str> = history.iter().map(|e| e.artists.trim()).collect();
    let heard_main: HashSet<&str> = history.iter().filter_map(|e| e.main_genre.as_deref()).collect();
    let heard_sub: HashSet<&str> = history.iter().filter_map(|e| e.sub_genre.as_deref()).collect();

    Some(Suggestions {
        artists: rank_unheard(&scored, |t| t.artists.trim(), &heard_artists, Aggregate::Max, top_n),
        main_genres: rank_unheard(
            &scored,
            |t| t.main_genre.as_deref().unwrap_or(genre::NOT_AVAILABLE),
            &heard_main,
            Aggregate::Mean,
            top_n,
        ),
        sub_genres: rank_unheard(
            &scored,
            |t| t.sub_genre.as_deref().unwrap_or(genre::NOT_AVAILABLE),
            &heard_sub,
            Aggregate::Mean,
            top_n,
        ),
    })
}

fn rank_unheard<'t>(
    scored: &[(&'t Track, f64)],
    key: impl Fn(&'t Track) -> &'t str,
    heard: &HashSet<&str>,
    aggregate: Aggregate,
    top_n: usize,
) -> Vec<(String, f64)> {
    let unheard: Vec<(&str, f64)> = scored
        .iter()
        .map(|&(t, p)| (key(t), p))
        .filter(|(k, _)| !heard.contains(k))
        .collect();
    let pool: Vec<(&str, f64)> = if unheard.is_empty() {
        scored.iter().map(|&(t, p)| (key(t), p)).collect()
    } else {
        unheard
    };

    // (max, sum, count) per key
    let mut groups: HashMap<&str, (f64, f64, usize)> = HashMap::new();
    for (k, p) in pool {
        let entry = groups.entry(k).or_insert((f64::NEG_INFINITY, 0.0, 0));
        entry.0 = entry.0.max(p);
        entry.1 += p;
        entry.2 += 1;
    }

    let mut ranked: Vec<(String, f64)> = groups
        .into_iter()
        .map(|(k, (max, sum, count))| {
            #[allow(clippy::cast_precision_loss)]
            let value = match aggregate {
                Aggregate::Max => max,
                Aggregate::Mean => sum / count as f64,
            };
            (k.to_owned(), value)
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked.truncate(top_n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::tests::raw_track;
    use crate::catalogue::{preprocess, RawCatalogue};
    use crate::model::tests::MeanClassifier;
    use crate::state::{EntryOrigin, ModelFamily};

    fn catalogue() -> Catalogue {
        preprocess(RawCatalogue::with_full_schema(vec![
            raw_track("r1", "Rock 1", "Stones", "rock", 0.2),
            raw_track("r2", "Rock 2", "Stones", "hard-rock", 0.4),
            raw_track("r3", "Rock 3", "Who", "rock", 0.3),
            raw_track("p1", "Pop 1", "Madonna", "pop", 0.9),
            raw_track("p2", "Pop 2", "Abba", "pop", 0.7),
            raw_track("j1", "Jazz 1", "Davis", "jazz", 0.5),
            raw_track("j2", "Jazz 2", "Coltrane", "jazz", 0.1),
        ]))
    }

    fn record(state: &mut SessionState, catalogue: &Catalogue, id: &str, vote: Vote) {
        let track = catalogue.get(id).unwrap();
        state.record(track, vote, EntryOrigin::Recommendation);
    }

    fn identity_model(catalogue: &Catalogue) -> PreferenceModel {
        let columns = catalogue.feature_columns();
        let low = catalogue.get("j2").unwrap().feature_row(columns);
        let high = catalogue.get("p1").unwrap().feature_row(columns);
        PreferenceModel::fit(
            ModelFamily::Simple,
            columns,
            Box::new(MeanClassifier),
            &[low, high],
            &[0, 1],
            &[1.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_wrapped_counts_strong_likes_only() {
        let catalogue = catalogue();
        let mut state = SessionState::new(catalogue.feature_columns().to_vec()).unwrap();
        assert!(wrapped(&state).is_none());

        record(&mut state, &catalogue, "r1", Vote::StrongLike);
        record(&mut state, &catalogue, "r2", Vote::StrongLike);
        record(&mut state, &catalogue, "r3", Vote::StrongLike);
        record(&mut state, &catalogue, "p1", Vote::WeakLike);
        record(&mut state, &catalogue, "j1", Vote::StrongDislike);

        let summary = wrapped(&state).unwrap();
        assert_eq!(summary.liked, 3);
        assert_eq!(
            summary.top_sub_genres,
            vec![("rock".to_string(), 2), ("hard-rock".to_string(), 1)]
        );
        assert_eq!(summary.top_artists[0], ("Stones".to_string(), 2));
        assert_eq!(summary.feature_means.len(), 3);
        let (feature, valence) = summary.feature_means[0];
        assert_eq!(feature, Feature::Valence);
        assert!((valence - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_wrapped_without_strong_likes() {
        let catalogue = catalogue();
        let mut state = SessionState::new(catalogue.feature_columns().to_vec()).unwrap();
        record(&mut state, &catalogue, "p1", Vote::WeakLike);
        assert!(wrapped(&state).is_none());
    }

    #[test]
    fn test_suggestions_rank_unheard_names() {
        let catalogue = catalogue();
        let model = identity_model(&catalogue);
        let mut state = SessionState::new(catalogue.feature_columns().to_vec()).unwrap();
        record(&mut state, &catalogue, "r1", Vote::StrongLike);
        record(&mut state, &catalogue, "j2", Vote::StrongDislike);

        let suggestions = suggestions(&model, &catalogue, &state, 5).unwrap();

        let artists: Vec<&str> = suggestions.artists.iter().map(|(a, _)| a.as_str()).collect();
        assert_eq!(artists, vec!["Madonna", "Abba", "Davis", "Who"]);
        // Rock and jazz were heard; only pop is new.
        let main: Vec<&str> = suggestions.main_genres.iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(main, vec!["pop"]);
        let sub: Vec<&str> = suggestions.sub_genres.iter().map(|(g, _)| g.as_str()).collect();
        assert_eq!(sub, vec!["pop", "hard-rock"]);
    }

    #[test]
    fn test_suggestions_fall_back_when_everything_is_heard() {
        let catalogue = catalogue();
        let model = identity_model(&catalogue);
        let mut state = SessionState::new(catalogue.feature_columns().to_vec()).unwrap();
        for id in ["r1", "r2", "r3", "p1", "j1", "j2"] {
            record(&mut state, &catalogue, id, Vote::StrongLike);
        }

        let suggestions = suggestions(&model, &catalogue, &state, 5).unwrap();
        assert_eq!(suggestions.artists, vec![("Abba".to_string(), suggestions.artists[0].1)]);
        // Pop was heard, so the only remaining track counts anyway.
        assert_eq!(suggestions.main_genres.len(), 1);
        assert_eq!(suggestions.main_genres[0].0, "pop");

        record(&mut state, &catalogue, "p2", Vote::WeakLike);
        assert!(super::suggestions(&model, &catalogue, &state, 5).is_none());
    }
}
