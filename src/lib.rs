//! Adaptive music recommender that learns a listener's taste from votes.
//!
//! Core modules:
//! - [`catalogue`] - CSV loading, cleaning, deduplication and feature engineering
//! - [`seeder`] - Cold start: favorite-artist seeding and random samples
//! - [`trainer`] - Refits the like/dislike model after every vote
//! - [`model`] - Min-max scaling plus a random forest or a small neural network
//! - [`selector`] - Explore/exploit choice of the next track
//! - [`session`] - The interaction loop tying it all together
//!
//! ### Supporting Modules
//!
//! - [`vote`] - The five vote codes and what they mean for training
//! - [`genre`] - Sub-genre to macro-genre table
//! - [`state`] - History, seen set and current model of a session
//! - [`report`] - Wrapped summary and artist/genre suggestions
//! - [`console`] - Terminal front-end
//! - [`config`] - Policy constants and hyperparameters
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use aidj::catalogue::{load_csv, preprocess};
//! use aidj::config::RecommenderConfig;
//! use aidj::console::{run_menu, Console, MenuOptions};
//! use aidj::session::Session;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use std::io;
//!
//! let catalogue = preprocess(load_csv("dataset.csv".as_ref())?);
//! let config = RecommenderConfig::load(None)?;
//! let mut session = Session::new(&catalogue, config, StdRng::seed_from_u64(42))?;
//!
//! let mut console = Console::new(io::stdin().lock(), io::stdout());
//! let options = MenuOptions { songs: 5, favorite_artist: None };
//! run_menu(&mut session, &mut console, &options)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## How Recommendations Adapt
//!
//! ### Votes
//! Strong likes and dislikes weigh `1.0`, "maybe" answers `0.5`, and
//! "indifferent" is kept in the history but never trained on.
//!
//! ### Model Family
//! - Random forest while the history is short (under 300 votes) or either
//!   class has fewer than 60 examples; it reports which features matter
//! - Feed-forward network once there is enough balanced data; it reports
//!   its training loss
//!
//! ### Selection
//! With probability 0.3 the next track is the one the model is least sure
//! about (closest to 50%), otherwise the one it rates highest.
//!
//! ## Error Handling
//!
//! Fallible functions return `anyhow::Result`. Too little data, an exhausted
//! catalogue and missing optional columns are ordinary outcomes, not errors;
//! errors are reserved for unreadable files, malformed config and closed
//! input.
//!
//! ## Testing
//!
//! ```bash
//! cargo test
//! cargo bench
//! ```

pub mod catalogue;
pub mod cli;
pub mod completion;
pub mod config;
pub mod console;
pub mod genre;
pub mod model;
pub mod report;
pub mod seeder;
pub mod selector;
pub mod session;
pub mod state;
pub mod trainer;
pub mod vote;
