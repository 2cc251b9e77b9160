//! # Preference Trainer
//!
//! Refits the like/dislike classifier from the whole history after every
//! vote. The trainer only reads the history; installing the result is up to
//! the caller.
//!
//! ## Policy
//!
//! 1. Keep informative votes only (everything but "indifferent")
//! 2. Label strong and weak likes `1`, strong and weak dislikes `0`
//! 3. Weight strong votes `1.0` and weak votes `0.5`
//! 4. Without both labels present, defer: no model is produced
//! 5. Pick the family: the forest while the history is short (fewer than
//!    300 entries) or either class has fewer than 60 examples, the network
//!    once there is enough balanced data
//! 6. Fit scaler + classifier from scratch

use anyhow::Result;
use log::{debug, info};

use crate::catalogue::Feature;
use crate::config::{FamilyThresholds, RecommenderConfig};
use crate::model::forest::RandomForest;
use crate::model::mlp::Mlp;
use crate::model::{Classifier, PreferenceModel};
use crate::state::{ModelFamily, UserHistory};

/// Why no model could be trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// Every vote so far was "indifferent", or there are none.
    NoInformativeVotes,
    /// Only likes or only dislikes so far.
    SingleClass,
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeferReason::NoInformativeVotes => f.write_str("no informative votes yet"),
            DeferReason::SingleClass => {
                f.write_str("need at least one song you like and one you don't")
            }
        }
    }
}

/// Result of a training attempt.
#[derive(Debug)]
pub enum Training {
    Fitted(PreferenceModel),
    Deferred(DeferReason),
}

impl Training {
    #[must_use]
    pub fn into_model(self) -> Option<PreferenceModel> {
        match self {
            Training::Fitted(model) => Some(model),
            Training::Deferred(_) => None,
        }
    }
}

/// Informative history rows in training form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
    pub weights: Vec<f64>,
}

impl TrainingSet {
    #[must_use]
    pub fn from_history(history: &UserHistory) -> Self {
        let mut set = Self::default();
        for entry in history {
            if let Some(signal) = entry.vote.signal() {
                set.features.push(entry.features.clone());
                set.labels.push(signal.label);
                set.weights.push(signal.weight);
            }
        }
        set
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    #[must_use]
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    #[must_use]
    pub fn negatives(&self) -> usize {
        self.len() - self.positives()
    }
}

/// Forest while data is scarce or unbalanced, network afterwards.
#[must_use]
pub fn choose_family(
    total_votes: usize,
    positives: usize,
    negatives: usize,
    thresholds: &FamilyThresholds,
) -> ModelFamily {
    if total_votes < thresholds.min_total_votes
        || positives < thresholds.min_per_class
        || negatives < thresholds.min_per_class
    {
        ModelFamily::Simple
    } else {
        ModelFamily::Rich
    }
}

/// Unfitted classifier for a family, sized for `total_votes`.
#[must_use]
pub fn build_classifier(
    family: ModelFamily,
    total_votes: usize,
    config: &RecommenderConfig,
) -> Box<dyn Classifier> {
    match family {
        ModelFamily::Simple => Box::new(RandomForest::new(
            config.forest.clone(),
            config.forest.depth_for(total_votes),
        )),
        ModelFamily::Rich => Box::new(Mlp::new(
            config.mlp.clone(),
            config.mlp.layers_for(total_votes),
        )),
    }
}

/// Fit a fresh model on the whole history.
///
/// # Errors
///
/// Only internal fitting failures surface as errors. Too little signal is a
/// [`Training::Deferred`], not an error.
pub fn train(
    history: &UserHistory,
    feature_columns: &[Feature],
    config: &RecommenderConfig,
) -> Result<Training> {
    let set = TrainingSet::from_history(history);
    if set.is_empty() {
        debug!("Training deferred: {} entries, none informative", history.len());
        return Ok(Training::Deferred(DeferReason::NoInformativeVotes));
    }

    let (positives, negatives) = (set.positives(), set.negatives());
    if positives == 0 || negatives == 0 {
        debug!("Training deferred: {positives} likes, {negatives} dislikes");
        return Ok(Training::Deferred(DeferReason::SingleClass));
    }

    let total_votes = history.len();
    let family = choose_family(total_votes, positives, negatives, &config.thresholds);
    let classifier = build_classifier(family, total_votes, config);

    let model = PreferenceModel::fit(
        family,
        feature_columns,
        classifier,
        &set.features,
        &set.labels,
        &set.weights,
    )?;

    info!(
        "Trained {} on {} examples ({} likes, {} dislikes, {} total votes)",
        family,
        set.len(),
        positives,
        negatives,
        total_votes
    );
    Ok(Training::Fitted(model))
}
