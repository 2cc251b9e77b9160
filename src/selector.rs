//! # Candidate Selector
//!
//! Picks exactly one next track from the unseen pool.
//!
//! Without a model the pick is uniform. With a model every candidate is
//! scored; a coin weighted by the exploration rate then decides between
//! **exploring** (the track the model is least sure about, probability
//! closest to 0.5) and **exploiting** (the track it expects to be liked
//! most). Ties go to the candidate that comes first in the pool.

use log::{debug, trace};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::catalogue::Track;
use crate::model::PreferenceModel;

/// Which branch produced a selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    /// No model yet: uniform choice.
    Random,
    /// Most uncertain candidate.
    Explore,
    /// Most likely liked candidate.
    Exploit,
}

impl std::fmt::Display for SelectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectionMode::Random => f.write_str("random"),
            SelectionMode::Explore => f.write_str("exploring"),
            SelectionMode::Exploit => f.write_str("best match"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub track: &'a Track,
    /// `None` when no model was available.
    pub like_probability: Option<f64>,
    pub mode: SelectionMode,
}

/// Choose the next track from `candidates`, or `None` when the pool is empty.
pub fn select<'a, R: Rng + ?Sized>(
    model: Option<&PreferenceModel>,
    candidates: &[&'a Track],
    exploration_rate: f64,
    rng: &mut R,
) -> Option<Selection<'a>> {
    let Some(model) = model else {
        let track = *candidates.choose(rng)?;
        trace!("No model, picked `{}' at random", track.track_name);
        return Some(Selection {
            track,
            like_probability: None,
            mode: SelectionMode::Random,
        });
    };

    if candidates.is_empty() {
        return None;
    }

    let mode = if rng.gen::<f64>() < exploration_rate {
        SelectionMode::Explore
    } else {
        SelectionMode::Exploit
    };
    select_with_mode(model, candidates, mode)
}

/// Deterministic part of [`select`]: score and pick by `mode`.
///
/// [`SelectionMode::Random`] has no deterministic pick and falls back to the
/// first candidate.
#[must_use]
pub fn select_with_mode<'a>(
    model: &PreferenceModel,
    candidates: &[&'a Track],
    mode: SelectionMode,
) -> Option<Selection<'a>> {
    let scores: Vec<f64> = candidates.iter().map(|t| model.score_track(t)).collect();
    let index = match mode {
        SelectionMode::Explore => first_min_by_key(&scores, |p| (p - 0.5).abs()),
        SelectionMode::Exploit => first_min_by_key(&scores, |p| -p),
        SelectionMode::Random => (!scores.is_empty()).then_some(0),
    }?;

    let selection = Selection {
        track: candidates[index],
        like_probability: Some(scores[index]),
        mode,
    };
    debug!(
        "Selected `{}' ({}, p={:.3}) out of {} candidates",
        selection.track.track_name,
        mode,
        scores[index],
        candidates.len()
    );
    Some(selection)
}

/// Index of the smallest key; the earliest index wins ties.
fn first_min_by_key(values: &[f64], key: impl Fn(f64) -> f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &value) in values.iter().enumerate() {
        let k = key(value);
        match best {
            Some((_, current)) if k >= current => {}
            _ => best = Some((i, k)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::{preprocess, Catalogue, Feature, RawCatalogue, RawTrack, Schema};
    use crate::model::tests::MeanClassifier;
    use crate::config::RecommenderConfig;
    use crate::state::{EntryOrigin, ModelFamily, SeenSet, SessionState};
    use crate::trainer::train;
    use crate::vote::Vote;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn valence_energy_catalogue(points: &[(f64, f64)]) -> Catalogue {
        let schema = Schema::full()
            .without("danceability")
            .without("speechiness")
            .without("acousticness")
            .without("instrumentalness")
            .without("liveness")
            .without("tempo")
            .without("loudness");
        let rows = points
            .iter()
            .enumerate()
            .map(|(i, &(valence, energy))| {
                RawTrack::new(&format!("t{i}"), &format!("Song {i}"), "Artist")
                    .genre("pop")
                    .with_default_metadata()
                    .audio(Feature::Valence, valence)
                    .audio(Feature::Energy, energy)
            })
            .collect();
        preprocess(RawCatalogue::new(schema, rows))
    }

    fn mean_model(rows: &[Vec<f64>]) -> PreferenceModel {
        PreferenceModel::fit(
            ModelFamily::Simple,
            &[Feature::Valence, Feature::Energy],
            Box::new(MeanClassifier),
            rows,
            &[1, 0],
            &[1.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_pool_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(select(None, &[], 0.3, &mut rng).is_none());

        let model = mean_model(&[vec![0.8, 0.7], vec![0.2, 0.3]]);
        assert!(select(Some(&model), &[], 0.3, &mut rng).is_none());
    }

    #[test]
    fn test_without_model_picks_uniformly() {
        let catalogue = valence_energy_catalogue(&[(0.1, 0.1), (0.5, 0.5), (0.9, 0.9)]);
        let pool: Vec<&Track> = catalogue.tracks().iter().collect();
        let mut rng = StdRng::seed_from_u64(7);

        let mut hits = [0usize; 3];
        for _ in 0..3000 {
            let selection = select(None, &pool, 0.3, &mut rng).unwrap();
            assert_eq!(selection.mode, SelectionMode::Random);
            assert!(selection.like_probability.is_none());
            let i = pool.iter().position(|t| t.track_id == selection.track.track_id).unwrap();
            hits[i] += 1;
        }
        assert!(hits.iter().all(|&h| h > 800), "{hits:?}");
    }

    #[test]
    fn test_explore_and_exploit_picks() {
        // Trained on (0.8, 0.7) liked and (0.2, 0.3) disliked.
        let model = mean_model(&[vec![0.8, 0.7], vec![0.2, 0.3]]);
        let catalogue = valence_energy_catalogue(&[(0.5, 0.5), (0.9, 0.9)]);
        let pool: Vec<&Track> = catalogue.tracks().iter().collect();

        let explore = select_with_mode(&model, &pool, SelectionMode::Explore).unwrap();
        assert_eq!(explore.track.track_name, "Song 0");
        assert!((explore.like_probability.unwrap() - 0.5).abs() < 1e-9);

        let exploit = select_with_mode(&model, &pool, SelectionMode::Exploit).unwrap();
        assert_eq!(exploit.track.track_name, "Song 1");
        assert_eq!(exploit.like_probability, Some(1.0));
    }

    #[test]
    fn test_two_votes_train_a_model_that_explores_and_exploits() {
        let catalogue = valence_energy_catalogue(&[(0.8, 0.7), (0.2, 0.3), (0.5, 0.5), (0.9, 0.9)]);
        let tracks = catalogue.tracks();
        let mut state = SessionState::new(catalogue.feature_columns().to_vec()).unwrap();
        state.record(&tracks[0], Vote::StrongLike, EntryOrigin::ColdStart);
        state.record(&tracks[1], Vote::StrongDislike, EntryOrigin::ColdStart);

        let model = train(state.history(), state.feature_columns(), &RecommenderConfig::default())
            .unwrap()
            .into_model()
            .expect("one like and one dislike should train");
        let pool = catalogue.candidates(state.seen());
        assert_eq!(pool.len(), 2);

        let middle = model.score_track(pool[0]);
        let high = model.score_track(pool[1]);
        assert!(high > middle, "middle = {middle}, high = {high}");
        assert!((middle - 0.5).abs() < (high - 0.5).abs(), "middle = {middle}, high = {high}");

        let explore = select_with_mode(&model, &pool, SelectionMode::Explore).unwrap();
        assert_eq!(explore.track.track_id, "t2");
        let exploit = select_with_mode(&model, &pool, SelectionMode::Exploit).unwrap();
        assert_eq!(exploit.track.track_id, "t3");
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let model = mean_model(&[vec![0.0, 0.0], vec![1.0, 1.0]]);
        let catalogue =
            valence_energy_catalogue(&[(0.6, 0.6), (0.9, 0.9), (0.9, 0.9), (0.6, 0.6)]);
        let pool: Vec<&Track> = catalogue.tracks().iter().collect();

        let exploit = select_with_mode(&model, &pool, SelectionMode::Exploit).unwrap();
        assert_eq!(exploit.track.track_id, "t1");
        let explore = select_with_mode(&model, &pool, SelectionMode::Explore).unwrap();
        assert_eq!(explore.track.track_id, "t0");
    }

    #[test]
    fn test_never_returns_a_seen_track() {
        let catalogue = valence_energy_catalogue(&[(0.1, 0.2), (0.3, 0.4), (0.5, 0.6), (0.7, 0.8)]);
        let model = mean_model(&[vec![0.8, 0.7], vec![0.2, 0.3]]);
        let mut seen = SeenSet::default();
        seen.insert("t1");
        seen.insert("t3");
        let pool = catalogue.candidates(&seen);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..200 {
            let pick = select(Some(&model), &pool, 0.3, &mut rng).unwrap();
            assert!(!seen.contains(&pick.track.track_id));
            let pick = select(None, &pool, 0.3, &mut rng).unwrap();
            assert!(!seen.contains(&pick.track.track_id));
        }
    }

    #[test]
    fn test_exploration_fraction_matches_rate() {
        let model = mean_model(&[vec![0.8, 0.7], vec![0.2, 0.3]]);
        let catalogue = valence_energy_catalogue(&[(0.5, 0.5), (0.9, 0.9)]);
        let pool: Vec<&Track> = catalogue.tracks().iter().collect();
        let mut rng = StdRng::seed_from_u64(42);

        let draws: u32 = 10_000;
        let explored = (0..draws)
            .filter(|_| select(Some(&model), &pool, 0.3, &mut rng).unwrap().mode == SelectionMode::Explore)
            .count();
        let fraction = f64::from(u32::try_from(explored).unwrap()) / f64::from(draws);
        assert!((fraction - 0.3).abs() < 0.03, "explored {fraction}");
    }
}
