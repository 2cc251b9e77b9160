//! # Interaction Loop
//!
//! A [`Session`] owns the listener's [`SessionState`] and drives every other
//! component. The recommendation loop walks these phases:
//!
//! ```text
//! ColdStart ──seed──▶ Ready ──▶ Training ──deferred──▶ Ready (insufficient data)
//!                       ▲          │
//!                       │          ▼
//!                       │      Selecting ──no candidates──▶ Exhausted
//!                       │          │
//!                       │          ▼
//!                       └─vote─ AwaitingVote ──stop──▶ Stopped
//! ```
//!
//! Every vote triggers a full retrain before the next pick. Stopping ends the
//! loop only; the history survives and a later call picks up where it left.
//!
//! Input and output go through the [`Listener`] trait, so the loop runs the
//! same against the console or a script.

use anyhow::Result;
use log::debug;
use rand::rngs::StdRng;
use rand::Rng;

use crate::catalogue::{Catalogue, Feature, Track};
use crate::config::RecommenderConfig;
use crate::model::PreferenceModel;
use crate::seeder::{self, ArtistChoice, SeedSummary};
use crate::selector::{self, Selection};
use crate::state::{EntryOrigin, ModelFamily, SessionState};
use crate::trainer::{self, DeferReason, Training};
use crate::vote::Vote;

/// The person rating tracks.
pub trait Listener {
    /// Vote on a cold-start track. Invalid answers are the listener's to
    /// re-ask; only I/O failures are errors.
    ///
    /// # Errors
    ///
    /// Input could not be read.
    fn rate_seed(&mut self, track: &Track, position: usize, total: usize) -> Result<Vote>;

    /// Vote on a recommendation, or `None` to stop recommending.
    ///
    /// # Errors
    ///
    /// Input could not be read.
    fn rate_recommendation(&mut self, selection: &Selection<'_>) -> Result<Option<Vote>>;

    /// Pick among several artists matching a favorite-artist query.
    ///
    /// # Errors
    ///
    /// Input could not be read.
    fn choose_artist(&mut self, query: &str, artists: &[String]) -> Result<ArtistChoice>;

    /// Favorite-artist tracks were seeded as likes.
    ///
    /// # Errors
    ///
    /// Output could not be written.
    fn seeded_favorites(&mut self, _artists: &[String], _tracks: usize) -> Result<()> {
        Ok(())
    }

    /// A model was (re)trained.
    ///
    /// # Errors
    ///
    /// Output could not be written.
    fn trained(&mut self, _report: &TrainingReport) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ColdStart,
    Ready,
    Training,
    Selecting,
    AwaitingVote,
    Exhausted,
    Stopped,
}

/// Last two training losses of the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossTrend {
    pub current: f64,
    pub previous: Option<f64>,
}

impl LossTrend {
    /// `Some(true)` when the loss went down since the previous retrain.
    #[must_use]
    pub fn improved(&self) -> Option<bool> {
        self.previous.map(|previous| self.current < previous)
    }
}

/// What a retrain produced, for display.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    pub family: ModelFamily,
    pub history_len: usize,
    /// Ranked importances, only on the cadence set in the insight config.
    pub top_features: Option<Vec<(Feature, f64)>>,
    pub loss: Option<LossTrend>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    Trained(TrainingReport),
    Deferred(DeferReason),
}

/// Why a recommendation loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEnd {
    /// Every track has been shown.
    Exhausted,
    /// The listener asked to stop.
    Stopped,
    /// Not enough votes to train on.
    InsufficientData(DeferReason),
}

pub struct Session<'c, R = StdRng> {
    catalogue: &'c Catalogue,
    config: RecommenderConfig,
    state: SessionState,
    phase: Phase,
    rng: R,
}

impl<'c, R: Rng> Session<'c, R> {
    /// Fresh session over a preprocessed catalogue.
    ///
    /// # Errors
    ///
    /// Fails when the catalogue has no usable feature column.
    pub fn new(catalogue: &'c Catalogue, config: RecommenderConfig, rng: R) -> Result<Self> {
        let state = SessionState::new(catalogue.feature_columns().to_vec())?;
        Ok(Self {
            catalogue,
            config,
            state,
            phase: Phase::ColdStart,
            rng,
        })
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn catalogue(&self) -> &'c Catalogue {
        self.catalogue
    }

    #[must_use]
    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// True once a cold start has run.
    #[must_use]
    pub fn is_seeded(&self) -> bool {
        self.phase != Phase::ColdStart
    }

    fn enter(&mut self, next: Phase) {
        debug!("Session phase {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// Seed the history, see [`seeder::cold_start`].
    ///
    /// # Errors
    ///
    /// Propagates listener I/O failures.
    pub fn cold_start<L: Listener + ?Sized>(
        &mut self,
        listener: &mut L,
        requested: usize,
        favorite_artist: Option<&str>,
    ) -> Result<SeedSummary> {
        let summary = seeder::cold_start(
            &mut self.state,
            self.catalogue,
            &self.config.cold_start,
            requested,
            favorite_artist,
            listener,
            &mut self.rng,
        )?;
        self.enter(Phase::Ready);
        Ok(summary)
    }

    /// Refit the model on the whole history.
    ///
    /// A deferred retrain keeps whatever model was installed before.
    ///
    /// # Errors
    ///
    /// Only internal fitting failures.
    pub fn train(&mut self) -> Result<TrainOutcome> {
        self.enter(Phase::Training);
        let training = trainer::train(
            self.state.history(),
            self.state.feature_columns(),
            &self.config,
        );
        let outcome = match training {
            Ok(Training::Fitted(model)) => {
                self.state.install_model(model);
                TrainOutcome::Trained(self.training_report())
            }
            Ok(Training::Deferred(reason)) => TrainOutcome::Deferred(reason),
            Err(e) => {
                self.enter(Phase::Ready);
                return Err(e);
            }
        };
        self.enter(Phase::Ready);
        Ok(outcome)
    }

    fn training_report(&self) -> TrainingReport {
        let history_len = self.state.history().len();
        let insights = &self.config.insights;
        let top_features = match self.state.model() {
            Some(model)
                if insights.importance_every > 0
                    && history_len % insights.importance_every == 0 =>
            {
                model.top_features(insights.importance_top_k)
            }
            _ => None,
        };
        let loss = match self.state.loss_history() {
            [.., previous, current] if self.state.last_loss().is_some() => Some(LossTrend {
                current: *current,
                previous: Some(*previous),
            }),
            [current] if self.state.last_loss().is_some() => Some(LossTrend {
                current: *current,
                previous: None,
            }),
            _ => None,
        };

        TrainingReport {
            family: self.state.model_family(),
            history_len,
            top_features,
            loss,
        }
    }

    /// The current model, training one first when there is none.
    ///
    /// # Errors
    ///
    /// Only internal fitting failures.
    pub fn ensure_model(&mut self) -> Result<Option<&PreferenceModel>> {
        if self.state.model().is_none() {
            self.train()?;
        }
        Ok(self.state.model())
    }

    /// Recommend, collect a vote, retrain, until stopped or out of tracks.
    ///
    /// # Errors
    ///
    /// Propagates listener I/O failures and fitting failures.
    pub fn recommend<L: Listener + ?Sized>(&mut self, listener: &mut L) -> Result<LoopEnd> {
        let catalogue = self.catalogue;
        loop {
            match self.train()? {
                TrainOutcome::Deferred(reason) => {
                    debug!("Recommendation loop ends: {reason}");
                    return Ok(LoopEnd::InsufficientData(reason));
                }
                TrainOutcome::Trained(report) => listener.trained(&report)?,
            }

            self.enter(Phase::Selecting);
            let pool = catalogue.candidates(self.state.seen());
            let selection = selector::select(
                self.state.model(),
                &pool,
                self.config.exploration_rate,
                &mut self.rng,
            );
            let Some(selection) = selection else {
                self.enter(Phase::Exhausted);
                return Ok(LoopEnd::Exhausted);
            };

            self.enter(Phase::AwaitingVote);
            match listener.rate_recommendation(&selection)? {
                Some(vote) => {
                    self.state
                        .record(selection.track, vote, EntryOrigin::Recommendation);
                    self.enter(Phase::Ready);
                }
                None => {
                    self.enter(Phase::Stopped);
                    return Ok(LoopEnd::Stopped);
                }
            }
        }
    }
}
