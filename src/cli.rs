//! # Command-Line Interface Module
//!
//! Clap derive definitions for the `aidj` binary.
//!
//! ## Commands
//!
//! - `session`: Interactive recommender over a CSV catalogue
//! - `inspect`: Load and clean a catalogue, then print what preprocessing did
//! - `completion`: Print a shell completion script
//!
//! ## Examples
//!
//! ```bash
//! aidj session dataset.csv
//! aidj --seed 7 session dataset.csv --songs 8 --favorite-artist "daft punk"
//! aidj inspect dataset.csv --json
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
#[derive(Parser, Debug)]
#[command(name = "aidj")]
#[command(about = "AI DJ: learns what you like one vote at a time")]
#[command(version)]
pub struct Args {
    /// JSON config file
    ///
    /// Defaults to `aidj/config.json` in the platform config directory when
    /// that file exists, built-in defaults otherwise.
    #[arg(long, global = true, env = "AIDJ_CONFIG")]
    pub config: Option<PathBuf>,

    /// Seed for every random choice (sampling and exploration)
    ///
    /// Two sessions with the same seed, catalogue and votes propose the same
    /// tracks. Without it the seed comes from the OS.
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive session
    ///
    /// Opens the menu: cold start, recommendations, wrapped summary and
    /// suggestions. Votes are typed as 0 (no), 1 (yes), 2 (indifferent),
    /// 3 (maybe yes) or 4 (maybe no); an empty answer leaves the
    /// recommendation loop.
    Session {
        /// Path to the catalogue CSV
        catalogue: PathBuf,

        /// Random songs to rate during the cold start
        ///
        /// Ignored when a favorite artist is given: then 5 songs are rated
        /// when the artist is found and 10 when not.
        #[arg(long)]
        songs: Option<usize>,

        /// Favorite artist, matched case-insensitively
        ///
        /// Every track by the matching artist counts as liked. Without this
        /// option the cold start asks for it.
        #[arg(long)]
        favorite_artist: Option<String>,
    },

    /// Show what preprocessing makes of a catalogue
    ///
    /// Prints row counts, dropped and merged rows, the feature columns that
    /// will be trained on, and tracks per main genre.
    Inspect {
        /// Path to the catalogue CSV
        catalogue: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts
    ///
    /// ```bash
    /// aidj completion bash > ~/.local/share/bash-completion/completions/aidj
    /// aidj completion zsh > ~/.config/zsh/completions/_aidj
    /// aidj completion fish > ~/.config/fish/completions/aidj.fish
    /// ```
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
