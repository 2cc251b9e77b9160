//! # Preference Models
//!
//! A [`PreferenceModel`] is a two-stage pipeline: min-max normalisation
//! fitted on the training rows, followed by a [`Classifier`]. Two classifier
//! families exist:
//!
//! - [`forest::RandomForest`] - robust with few, unbalanced votes, and able to
//!   say which features it leans on
//! - [`mlp::Mlp`] - a small feed-forward network for larger, balanced histories,
//!   which reports its training loss
//!
//! Both are fitted from scratch on every retrain. Nothing is updated
//! incrementally.

pub mod forest;
pub mod mlp;

use anyhow::{bail, Result};

use crate::catalogue::{Feature, Track};
use crate::state::ModelFamily;

/// Binary "like" classifier over normalised feature rows.
pub trait Classifier: std::fmt::Debug {
    /// Fit on `features` (one row per example), `labels` in `{0, 1}` and
    /// per-example `weights`. All three slices have the same length.
    ///
    /// # Errors
    ///
    /// Returns an error when the inputs are inconsistent or empty.
    fn fit(&mut self, features: &[Vec<f64>], labels: &[u8], weights: &[f64]) -> Result<()>;

    /// Probability of label 1 for one normalised row.
    fn predict_probability(&self, features: &[f64]) -> f64;

    /// Relative weight of each input column, summing to 1.
    fn feature_importances(&self) -> Option<&[f64]> {
        None
    }

    /// Training loss after the last epoch.
    fn final_loss(&self) -> Option<f64> {
        None
    }
}

/// Per-column affine map onto `[0, 1]` fitted on training rows.
///
/// Constant columns map to `0`. Values outside the fitted range extrapolate
/// beyond `[0, 1]`, they are not clipped.
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    range: Vec<f64>,
}

impl MinMaxScaler {
    /// # Errors
    ///
    /// Fails on an empty or ragged matrix.
    pub fn fit(rows: &[Vec<f64>]) -> Result<Self> {
        let Some(first) = rows.first() else {
            bail!("Cannot fit a scaler on zero rows");
        };
        let width = first.len();
        let mut min = vec![f64::INFINITY; width];
        let mut max = vec![f64::NEG_INFINITY; width];

        for row in rows {
            if row.len() != width {
                bail!("Row has {} columns, expected {width}", row.len());
            }
            for (j, &value) in row.iter().enumerate() {
                min[j] = min[j].min(value);
                max[j] = max[j].max(value);
            }
        }

        let range = min
            .iter()
            .zip(&max)
            .map(|(lo, hi)| if hi > lo { hi - lo } else { 1.0 })
            .collect();

        Ok(Self { min, range })
    }

    #[must_use]
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.min.iter().zip(&self.range))
            .map(|(value, (lo, range))| (value - lo) / range)
            .collect()
    }
}

/// A fitted scaler plus classifier, ready to score tracks.
#[derive(Debug)]
pub struct PreferenceModel {
    family: ModelFamily,
    feature_columns: Vec<Feature>,
    scaler: MinMaxScaler,
    classifier: Box<dyn Classifier>,
}

impl PreferenceModel {
    /// Fit the scaler, then `classifier` on the scaled rows.
    ///
    /// # Errors
    ///
    /// Propagates scaler and classifier fitting errors.
    pub fn fit(
        family: ModelFamily,
        feature_columns: &[Feature],
        mut classifier: Box<dyn Classifier>,
        features: &[Vec<f64>],
        labels: &[u8],
        weights: &[f64],
    ) -> Result<Self> {
        if features.len() != labels.len() || labels.len() != weights.len() {
            bail!(
                "Mismatched training data: {} rows, {} labels, {} weights",
                features.len(),
                labels.len(),
                weights.len()
            );
        }
        let scaler = MinMaxScaler::fit(features)?;
        let scaled: Vec<Vec<f64>> = features.iter().map(|row| scaler.transform(row)).collect();
        classifier.fit(&scaled, labels, weights)?;

        Ok(Self {
            family,
            feature_columns: feature_columns.to_vec(),
            scaler,
            classifier,
        })
    }

    #[must_use]
    pub fn family(&self) -> ModelFamily {
        self.family
    }

    #[must_use]
    pub fn feature_columns(&self) -> &[Feature] {
        &self.feature_columns
    }

    /// Like-probability for a raw (unscaled) feature row, within `[0, 1]`.
    #[must_use]
    pub fn like_probability(&self, row: &[f64]) -> f64 {
        let scaled = self.scaler.transform(row);
        self.classifier.predict_probability(&scaled).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn score_track(&self, track: &Track) -> f64 {
        self.like_probability(&track.feature_row(&self.feature_columns))
    }

    /// Columns ranked by importance, highest first, at most `top_k`.
    /// `None` for classifiers that do not expose importances.
    #[must_use]
    pub fn top_features(&self, top_k: usize) -> Option<Vec<(Feature, f64)>> {
        let importances = self.classifier.feature_importances()?;
        let mut ranked: Vec<(Feature, f64)> = self
            .feature_columns
            .iter()
            .copied()
            .zip(importances.iter().copied())
            .collect();
        ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(top_k);
        Some(ranked)
    }

    #[must_use]
    pub fn final_loss(&self) -> Option<f64> {
        self.classifier.final_loss()
    }
}
