//! Session state: what the listener has heard, how they voted, and the
//! current model.
//!
//! [`SessionState`] is the one mutable object of a session. It is owned by
//! [`crate::session::Session`]; the trainer and selector only ever borrow it.

use serde::Serialize;
use std::collections::HashSet;

use crate::catalogue::{Feature, Track};
use crate::model::PreferenceModel;
use crate::vote::Vote;

/// How a track ended up in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    /// Random cold-start sample the listener voted on.
    ColdStart,
    /// Track by the favorite artist, liked without asking.
    FavoriteArtist,
    /// Track proposed by the selector.
    Recommendation,
}

/// One vote on one track.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub track_id: String,
    pub track_name: String,
    pub artists: String,
    pub main_genre: Option<String>,
    pub sub_genre: Option<String>,
    /// Feature values in the session's column order.
    pub features: Vec<f64>,
    pub vote: Vote,
    pub origin: EntryOrigin,
}

impl HistoryEntry {
    #[must_use]
    pub fn new(track: &Track, columns: &[Feature], vote: Vote, origin: EntryOrigin) -> Self {
        Self {
            track_id: track.track_id.clone(),
            track_name: track.track_name.clone(),
            artists: track.artists.clone(),
            main_genre: track.main_genre.clone(),
            sub_genre: track.sub_genre.clone(),
            features: track.feature_row(columns),
            vote,
            origin,
        }
    }
}

/// Append-only vote log in interaction order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct UserHistory {
    entries: Vec<HistoryEntry>,
}

impl UserHistory {
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, HistoryEntry> {
        self.entries.iter()
    }

    fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }
}

impl<'a> IntoIterator for &'a UserHistory {
    type Item = &'a HistoryEntry;
    type IntoIter = std::slice::Iter<'a, HistoryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Track ids already shown. Only grows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SeenSet {
    ids: HashSet<String>,
}

impl SeenSet {
    #[must_use]
    pub fn contains(&self, track_id: &str) -> bool {
        self.ids.contains(track_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns `true` when the id was not seen before.
    pub fn insert(&mut self, track_id: &str) -> bool {
        self.ids.insert(track_id.to_string())
    }
}

/// Classifier family in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Random forest, used while data is scarce or unbalanced.
    Simple,
    /// Feed-forward network, once enough balanced votes exist.
    Rich,
}

impl std::fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelFamily::Simple => f.write_str("Random Forest"),
            ModelFamily::Rich => f.write_str("MLP"),
        }
    }
}

/// Everything a session knows about the listener.
#[derive(Debug)]
pub struct SessionState {
    history: UserHistory,
    seen: SeenSet,
    model: Option<PreferenceModel>,
    model_family: ModelFamily,
    feature_columns: Vec<Feature>,
    last_loss: Option<f64>,
    loss_history: Vec<f64>,
}

impl SessionState {
    /// Empty state over a fixed feature list.
    ///
    /// # Errors
    ///
    /// Fails when `feature_columns` is empty: nothing could ever be trained.
    pub fn new(feature_columns: Vec<Feature>) -> anyhow::Result<Self> {
        if feature_columns.is_empty() {
            anyhow::bail!("Session needs at least one feature column");
        }
        Ok(Self {
            history: UserHistory::default(),
            seen: SeenSet::default(),
            model: None,
            model_family: ModelFamily::Simple,
            feature_columns,
            last_loss: None,
            loss_history: Vec::new(),
        })
    }

    #[must_use]
    pub fn history(&self) -> &UserHistory {
        &self.history
    }

    #[must_use]
    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    #[must_use]
    pub fn model(&self) -> Option<&PreferenceModel> {
        self.model.as_ref()
    }

    #[must_use]
    pub fn model_family(&self) -> ModelFamily {
        self.model_family
    }

    #[must_use]
    pub fn feature_columns(&self) -> &[Feature] {
        &self.feature_columns
    }

    #[must_use]
    pub fn last_loss(&self) -> Option<f64> {
        self.last_loss
    }

    #[must_use]
    pub fn loss_history(&self) -> &[f64] {
        &self.loss_history
    }

    /// Mark a track as shown without recording a vote.
    pub fn mark_seen(&mut self, track_id: &str) {
        self.seen.insert(track_id);
    }

    /// Append a vote and mark its track as seen.
    pub fn record(&mut self, track: &Track, vote: Vote, origin: EntryOrigin) {
        let entry = HistoryEntry::new(track, &self.feature_columns, vote, origin);
        log::debug!(
            "Recorded vote {} for `{}' by {} ({:?})",
            vote,
            track.track_name,
            track.artists,
            origin
        );
        self.seen.insert(&track.track_id);
        self.history.push(entry);
    }

    /// Swap in a freshly fitted model, dropping the previous one.
    pub(crate) fn install_model(&mut self, model: PreferenceModel) {
        self.model_family = model.family();
        // Forests report no loss, which clears any stale value.
        self.last_loss = model.final_loss();
        if let Some(loss) = self.last_loss {
            self.loss_history.push(loss);
        }
        self.model = Some(model);
    }

    /// Serialisable view of the state, without the model itself.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot<'_> {
        StateSnapshot {
            history: &self.history,
            seen: &self.seen,
            has_model: self.model.is_some(),
            model_family: self.model_family,
            feature_columns: &self.feature_columns,
            last_loss: self.last_loss,
            loss_history: &self.loss_history,
        }
    }
}

/// What other layers read from a session.
#[derive(Debug, Serialize)]
pub struct StateSnapshot<'a> {
    pub history: &'a UserHistory,
    pub seen: &'a SeenSet,
    pub has_model: bool,
    pub model_family: ModelFamily,
    pub feature_columns: &'a [Feature],
    pub last_loss: Option<f64>,
    pub loss_history: &'a [f64],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalogue::tests::raw_track;
    use crate::catalogue::{preprocess, RawCatalogue};

    #[test]
    fn test_empty_feature_list_rejected() {
        assert!(SessionState::new(Vec::new()).is_err());
    }

    #[test]
    fn test_record_keeps_seen_superset_of_history() {
        let catalogue = preprocess(RawCatalogue::with_full_schema(vec![
            raw_track("t1", "One", "A", "rock", 0.2),
            raw_track("t2", "Two", "B", "pop", 0.8),
        ]));
        let mut state = SessionState::new(catalogue.feature_columns().to_vec()).unwrap();

        state.mark_seen("t2");
        state.record(&catalogue.tracks()[0], Vote::Indifferent, EntryOrigin::ColdStart);

        assert_eq!(state.history().len(), 1);
        assert_eq!(state.seen().len(), 2);
        assert!(state.history().iter().all(|e| state.seen().contains(&e.track_id)));
        assert_eq!(state.history().entries()[0].features.len(), 13);
    }

    #[test]
    fn test_snapshot_serialises() {
        let state = SessionState::new(vec![Feature::Energy, Feature::Valence]).unwrap();
        let json = serde_json::to_value(state.snapshot()).unwrap();
        assert_eq!(json["feature_columns"][0], "energy");
        assert_eq!(json["model_family"], "simple");
        assert_eq!(json["has_model"], false);
        assert!(json["last_loss"].is_null());
    }
}
