//! # AI DJ
//!
//! Entry point of the `aidj` binary: parses arguments, loads the config and
//! catalogue, and hands over to the console menu.
//!
//! ## Usage
//!
//! ```bash
//! # Interactive session
//! aidj session dataset.csv
//!
//! # Reproducible session with a favorite artist
//! aidj --seed 42 session dataset.csv --favorite-artist "radiohead"
//!
//! # What preprocessing keeps
//! aidj inspect dataset.csv
//! ```

use aidj::catalogue::{self, Catalogue};
use aidj::cli::{self, Command};
use aidj::completion;
use aidj::config::RecommenderConfig;
use aidj::console::{self, Console, MenuOptions};
use aidj::session::Session;
use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::path::Path;

fn load_catalogue(path: &Path) -> Result<Catalogue> {
    info!("Loading catalogue from: {}", path.display());
    let raw = catalogue::load_csv(path)?;
    Ok(catalogue::preprocess(raw))
}

fn print_report(catalogue: &Catalogue, json: bool) -> Result<()> {
    let report = catalogue.report();
    if json {
        let text = serde_json::to_string_pretty(report).context("Failed to encode report")?;
        println!("{text}");
        return Ok(());
    }

    println!("Rows read          : {}", report.rows_read);
    println!("Incomplete dropped : {}", report.incomplete_dropped);
    println!("Duplicates merged  : {}", report.duplicates_merged);
    println!("Tracks             : {}", report.tracks);
    let columns: Vec<String> = report.feature_columns.iter().map(ToString::to_string).collect();
    println!("Features ({:>2})      : {}", columns.len(), columns.join(", "));
    println!("\nTracks per genre:");
    for (genre, count) in &report.main_genres {
        println!("  {genre:<12} {count}");
    }
    Ok(())
}

/// Main entry point.
///
/// Logging is controlled via `RUST_LOG`:
/// - `RUST_LOG=debug aidj session dataset.csv` - Enable debug logging
/// - `RUST_LOG=aidj::trainer=debug aidj session dataset.csv` - Module-specific logging
fn main() -> Result<()> {
    env_logger::init();

    let args = cli::Args::parse();
    debug!("Arguments: {args:?}");

    match args.command {
        Command::Session {
            catalogue,
            songs,
            favorite_artist,
        } => {
            let config = RecommenderConfig::load(args.config.as_deref())?;
            let path = catalogue;
            let catalogue = load_catalogue(&path)?;
            if catalogue.is_empty() {
                anyhow::bail!("No complete tracks in {}", path.display());
            }
            println!("Catalogue loaded ({} songs)", catalogue.len());

            let rng = match args.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let options = MenuOptions {
                songs: songs.unwrap_or(config.cold_start.songs),
                favorite_artist,
            };
            let mut session = Session::new(&catalogue, config, rng)?;
            let mut console = Console::new(io::stdin().lock(), io::stdout());
            console::run_menu(&mut session, &mut console, &options)?;
            info!(
                "Session ended after {} votes",
                session.state().history().len()
            );
        }
        Command::Inspect { catalogue, json } => {
            let catalogue = load_catalogue(&catalogue)?;
            print_report(&catalogue, json)?;
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(
                completion::shell_to_completion_shell(shell),
                &mut cmd,
                &mut io::stdout(),
            );
        }
    }

    Ok(())
}
