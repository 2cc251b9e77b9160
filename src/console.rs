//! # Console Front-End
//!
//! Line-oriented terminal interface: the [`Console`] answers the session's
//! questions from any `BufRead` and writes to any `Write`, so the whole menu
//! can be driven from a script in tests.
//!
//! Invalid tokens are re-asked here and never reach the session. End of input
//! at the menu exits; end of input while a vote is pending is an error.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use rand::Rng;
use std::io::{BufRead, Write};

use crate::catalogue::Track;
use crate::report;
use crate::seeder::ArtistChoice;
use crate::selector::Selection;
use crate::session::{Listener, LoopEnd, Session, TrainingReport};
use crate::state::ModelFamily;
use crate::vote::Vote;

const SUGGESTIONS_TOP: usize = 5;

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    /// One trimmed line, or `None` at end of input.
    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        write!(self.output, "{prompt}")?;
        self.output.flush().context("Failed to flush console output")?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .context("Failed to read console input")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn ask_required(&mut self, prompt: &str) -> Result<String> {
        match self.ask(prompt)? {
            Some(line) => Ok(line),
            None => bail!("Input closed while waiting for an answer"),
        }
    }

    fn show_track(&mut self, track: &Track) -> Result<()> {
        writeln!(self.output, "Title : {}", track.track_name)?;
        writeln!(self.output, "Artist: {}", track.artists)?;
        writeln!(
            self.output,
            "Genre : {} ({})",
            track.main_genre_display(),
            track.sub_genre_display()
        )?;
        Ok(())
    }
}

const VOTE_HELP: &str = "0 = no, 1 = yes, 2 = indifferent, 3 = maybe yes, 4 = maybe no";

impl<R: BufRead, W: Write> Listener for Console<R, W> {
    fn rate_seed(&mut self, track: &Track, position: usize, total: usize) -> Result<Vote> {
        writeln!(self.output, "\n[Vote {position}/{total}]")?;
        self.show_track(track)?;
        loop {
            let answer = self.ask_required(&format!("Do you like it? ({VOTE_HELP}): "))?;
            if let Some(vote) = Vote::from_token(&answer) {
                return Ok(vote);
            }
            writeln!(self.output, "Please answer 0, 1, 2, 3 or 4.")?;
        }
    }

    fn rate_recommendation(&mut self, selection: &Selection<'_>) -> Result<Option<Vote>> {
        writeln!(self.output, "\nAI DJ")?;
        if let Some(p) = selection.like_probability {
            writeln!(
                self.output,
                "By my reckoning you'll like this one {:.0}% ({}):",
                p * 100.0,
                selection.mode
            )?;
        }
        self.show_track(selection.track)?;
        loop {
            let answer =
                self.ask_required(&format!("Did you like it? ({VOTE_HELP}, Enter = stop): "))?;
            if answer.is_empty() {
                writeln!(self.output, "Leaving recommendations.")?;
                return Ok(None);
            }
            if let Some(vote) = Vote::from_token(&answer) {
                writeln!(self.output, "Got it, picking the next track...")?;
                return Ok(Some(vote));
            }
            writeln!(self.output, "Please answer 0, 1, 2, 3, 4 or press Enter to stop.")?;
        }
    }

    fn choose_artist(&mut self, query: &str, artists: &[String]) -> Result<ArtistChoice> {
        writeln!(self.output, "\nSeveral artists match `{}':", query.trim())?;
        for (i, name) in artists.iter().enumerate() {
            writeln!(self.output, "  {}. {name}", i + 1)?;
        }
        loop {
            let answer =
                self.ask_required(&format!("Pick 1-{}, a = all, Enter = none: ", artists.len()))?;
            if answer.is_empty() {
                return Ok(ArtistChoice::Cancel);
            }
            if answer.eq_ignore_ascii_case("a") {
                return Ok(ArtistChoice::All);
            }
            match answer.parse::<usize>() {
                Ok(n) if (1..=artists.len()).contains(&n) => return Ok(ArtistChoice::One(n - 1)),
                _ => writeln!(self.output, "Not a valid choice.")?,
            }
        }
    }

    fn seeded_favorites(&mut self, artists: &[String], tracks: usize) -> Result<()> {
        if artists.is_empty() {
            writeln!(self.output, "No favorite artist found, let's rate a few more songs.")?;
        } else {
            writeln!(
                self.output,
                "Added {tracks} songs by {} as liked.",
                artists.join(", ")
            )?;
        }
        Ok(())
    }

    fn trained(&mut self, report: &TrainingReport) -> Result<()> {
        match report.family {
            ModelFamily::Simple => writeln!(self.output, "\n[info] Random Forest trained.")?,
            ModelFamily::Rich => writeln!(self.output, "\n[info] MLP trained.")?,
        }
        if let Some(top) = &report.top_features {
            writeln!(self.output, "What I pay most attention to:")?;
            for (feature, weight) in top {
                writeln!(self.output, "  {feature:<18} {weight:.3}")?;
            }
        }
        if let Some(loss) = report.loss {
            match (loss.previous, loss.improved()) {
                (Some(previous), Some(improved)) => writeln!(
                    self.output,
                    "Training loss {:.4} (was {:.4}, {}).",
                    loss.current,
                    previous,
                    if improved { "down" } else { "up" }
                )?,
                _ => writeln!(self.output, "First training loss: {:.4}.", loss.current)?,
            }
        }
        Ok(())
    }
}

/// Menu-level settings taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct MenuOptions {
    pub songs: usize,
    /// Skip the interactive favorite-artist question when set.
    pub favorite_artist: Option<String>,
}

const MENU: &str = "\n--- MENU ---
1. Cold start
2. Recommendations
3. Wrapped
4. Suggestions
0. Exit";

/// Run the main menu until the listener exits or input ends.
///
/// # Errors
///
/// Console I/O failures and fitting failures.
pub fn run_menu<R, W, G>(
    session: &mut Session<'_, G>,
    console: &mut Console<R, W>,
    options: &MenuOptions,
) -> Result<()>
where
    R: BufRead,
    W: Write,
    G: Rng,
{
    loop {
        writeln!(console.output, "{MENU}")?;
        let Some(choice) = console.ask("Choice (0-4): ")? else {
            info!("Input closed, leaving");
            return Ok(());
        };
        debug!("Menu choice `{choice}'");

        match choice.as_str() {
            "1" => cold_start(session, console, options)?,
            "2" => recommend(session, console)?,
            "3" => wrapped(session, console)?,
            "4" => suggestions(session, console)?,
            "0" => {
                writeln!(console.output, "Bye!")?;
                return Ok(());
            }
            _ => writeln!(console.output, "Invalid choice, try again.")?,
        }
    }
}

fn cold_start<R: BufRead, W: Write, G: Rng>(
    session: &mut Session<'_, G>,
    console: &mut Console<R, W>,
    options: &MenuOptions,
) -> Result<()> {
    let favorite = match &options.favorite_artist {
        Some(artist) => Some(artist.clone()),
        None => console
            .ask("Favorite artist (Enter to skip): ")?
            .filter(|answer| !answer.is_empty()),
    };
    writeln!(console.output, "\n--- Welcome to your AI DJ ---")?;
    let summary = session.cold_start(console, options.songs, favorite.as_deref())?;
    writeln!(
        console.output,
        "\nCold start done: {} songs rated, {} seeded from favorites.",
        summary.rated, summary.favorite_tracks
    )?;
    Ok(())
}

fn recommend<R: BufRead, W: Write, G: Rng>(
    session: &mut Session<'_, G>,
    console: &mut Console<R, W>,
) -> Result<()> {
    if !session.is_seeded() {
        writeln!(console.output, "Run the cold start first!")?;
        return Ok(());
    }
    match session.recommend(console)? {
        LoopEnd::Exhausted => writeln!(console.output, "No songs left to suggest!")?,
        LoopEnd::Stopped => {}
        LoopEnd::InsufficientData(reason) => {
            writeln!(console.output, "[warning] Not enough data to train: {reason}.")?;
        }
    }
    writeln!(
        console.output,
        "Songs rated so far: {}",
        session.state().history().len()
    )?;
    Ok(())
}

fn wrapped<R: BufRead, W: Write, G: Rng>(
    session: &Session<'_, G>,
    console: &mut Console<R, W>,
) -> Result<()> {
    if session.state().history().is_empty() {
        writeln!(console.output, "Rate a few songs first!")?;
        return Ok(());
    }
    let Some(summary) = report::wrapped(session.state()) else {
        writeln!(console.output, "No song voted as a strong like yet.")?;
        return Ok(());
    };

    let out = &mut console.output;
    writeln!(out, "\n=== YOUR WRAPPED ===")?;
    writeln!(out, "Favorite songs: {}", summary.liked)?;
    if !summary.top_sub_genres.is_empty() {
        writeln!(out, "\nTop genres:")?;
        for (i, (genre, count)) in summary.top_sub_genres.iter().enumerate() {
            writeln!(out, "({}) {genre} ({count} songs)", i + 1)?;
        }
    }
    writeln!(out, "\nTop artists:")?;
    for (i, (artist, count)) in summary.top_artists.iter().enumerate() {
        writeln!(out, "({}) {artist} ({count} songs)", i + 1)?;
    }
    for (feature, mean) in &summary.feature_means {
        writeln!(out, "- average {feature}: {mean:.2}")?;
    }
    Ok(())
}

fn suggestions<R: BufRead, W: Write, G: Rng>(
    session: &mut Session<'_, G>,
    console: &mut Console<R, W>,
) -> Result<()> {
    if session.state().history().is_empty() {
        writeln!(console.output, "Rate a few songs first!")?;
        return Ok(());
    }
    if session.state().model().is_none() {
        writeln!(console.output, "Training on your votes...")?;
    }
    if session.ensure_model()?.is_none() {
        writeln!(
            console.output,
            "Not enough data yet: vote at least one song you like and one you don't."
        )?;
        return Ok(());
    }

    let (catalogue, state) = (session.catalogue(), session.state());
    let Some(model) = state.model() else {
        return Ok(());
    };
    let Some(found) = report::suggestions(model, catalogue, state, SUGGESTIONS_TOP) else {
        writeln!(console.output, "No new songs left to suggest.")?;
        return Ok(());
    };

    let out = &mut console.output;
    writeln!(out, "\n=== SUGGESTIONS ===")?;
    for (title, ranked) in [
        ("Artists to try", &found.artists),
        ("Genres to explore", &found.main_genres),
        ("Sub-genres to explore", &found.sub_genres),
    ] {
        writeln!(out, "\n{title}:")?;
        for (i, (name, p)) in ranked.iter().enumerate() {
            writeln!(out, "({}) {name} ({:.0}%)", i + 1, p * 100.0)?;
        }
    }
    Ok(())
}
