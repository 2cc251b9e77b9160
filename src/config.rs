//! # Configuration Module
//!
//! Every policy constant of the recommender lives in [`RecommenderConfig`]:
//! exploration rate, cold-start quotas, the thresholds that switch between
//! model families, and the hyperparameters of each family.
//!
//! ## Config File
//!
//! Settings are read from a JSON file, the first that applies:
//! 1. the path given with `--config`
//! 2. `config.json` in the platform config directory, when it exists:
//!    - Linux: `~/.config/aidj/config.json`
//!    - macOS: `~/Library/Application Support/aidj/config.json`
//!    - Windows: `%APPDATA%\aidj\config.json`
//! 3. built-in defaults
//!
//! Keys missing from the file keep their default value, so a file containing
//! only `{"exploration_rate": 0.5}` is valid.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::forest::ForestParams;
use crate::model::mlp::MlpParams;

/// Returns the path of the default config file, whether or not it exists.
///
/// # Errors
///
/// Fails when the platform has no config directory.
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system config directory. Pass --config to point at a config file."
        )
    })?;
    Ok(config_dir.join("aidj").join("config.json"))
}

/// When the trainer moves from the forest to the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FamilyThresholds {
    /// Minimum total history length, indifferent votes included.
    pub min_total_votes: usize,
    /// Minimum examples of each informative class.
    pub min_per_class: usize,
}

impl Default for FamilyThresholds {
    fn default() -> Self {
        Self {
            min_total_votes: 300,
            min_per_class: 60,
        }
    }
}

/// Cold-start quotas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdStartConfig {
    /// Random tracks to rate when no favorite artist was asked for.
    pub songs: usize,
    /// Random tracks to rate after favorite-artist seeding succeeded.
    pub favorite_artist_quota: usize,
    /// Random tracks to rate when a favorite artist was asked for but not found.
    pub fallback_quota: usize,
}

impl Default for ColdStartConfig {
    fn default() -> Self {
        Self {
            songs: 5,
            favorite_artist_quota: 5,
            fallback_quota: 10,
        }
    }
}

/// What the console shows after a retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    /// Features listed in the importance ranking.
    pub importance_top_k: usize,
    /// Show the ranking when the history length is a multiple of this.
    pub importance_every: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            importance_top_k: 5,
            importance_every: 10,
        }
    }
}

/// Runtime configuration for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Probability of proposing the most uncertain track instead of the best.
    pub exploration_rate: f64,
    pub cold_start: ColdStartConfig,
    pub thresholds: FamilyThresholds,
    pub forest: ForestParams,
    pub mlp: MlpParams,
    pub insights: InsightConfig,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.3,
            cold_start: ColdStartConfig::default(),
            thresholds: FamilyThresholds::default(),
            forest: ForestParams::default(),
            mlp: MlpParams::default(),
            insights: InsightConfig::default(),
        }
    }
}

impl RecommenderConfig {
    /// Load from `path`, or from the default location, or fall back to defaults.
    ///
    /// # Errors
    ///
    /// Fails when an explicitly given file is missing, or any file is not
    /// valid JSON or holds out-of-range values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match get_config_path() {
                Ok(default_path) if default_path.exists() => Self::from_file(&default_path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file.
    ///
    /// # Errors
    ///
    /// Fails on unreadable files or malformed JSON.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values the recommender cannot work with.
    ///
    /// # Errors
    ///
    /// Describes the first offending value.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            bail!("exploration_rate must be within [0, 1], got {}", self.exploration_rate);
        }
        if self.cold_start.songs == 0 || self.cold_start.fallback_quota == 0 {
            bail!("Cold-start quotas must be positive");
        }
        if self.forest.n_estimators == 0 {
            bail!("forest.n_estimators must be positive");
        }
        if self.forest.min_depth > self.forest.max_depth {
            bail!(
                "forest.min_depth ({}) exceeds forest.max_depth ({})",
                self.forest.min_depth,
                self.forest.max_depth
            );
        }
        if !(0.0..1.0).contains(&self.mlp.validation_fraction) {
            bail!("mlp.validation_fraction must be within [0, 1)");
        }
        if self.mlp.max_epochs == 0 || self.mlp.batch_size == 0 {
            bail!("mlp.max_epochs and mlp.batch_size must be positive");
        }
        if self.mlp.learning_rate <= 0.0 || self.mlp.alpha < 0.0 {
            bail!("mlp.learning_rate must be positive and mlp.alpha non-negative");
        }
        Ok(())
    }
}
