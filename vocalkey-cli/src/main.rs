//! # Vocal Key Finder - Command Line
//!
//! Listens to the default microphone, locks the notes a singer holds and
//! reports the major key they fit. Also offers a single-note tuning mode and
//! offline helpers for quantizing frequencies and scoring note sets.

mod report;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vocalkey_core::config::{self, SessionConfig};
use vocalkey_core::tuning::{self, PitchClass};
use vocalkey_core::{LiveSession, LockedNoteSet, TargetTracker, best_key, rank_keys};

use report::ConsoleObserver;

/// How long one wait for a frame may block before checking the deadline.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen {
            seconds,
            config,
            verbose,
            json,
        } => run_listen(seconds, config, verbose, json),
        Commands::Tune {
            target,
            tolerance,
            seconds,
            config,
        } => run_tune(&target, tolerance, seconds, config),
        Commands::Quantize { frequencies } => run_quantize(&frequencies),
        Commands::Key { notes, rank } => run_key(&notes, rank),
        Commands::Config { write } => run_config(write),
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_session_config(path: Option<PathBuf>) -> anyhow::Result<SessionConfig> {
    match path {
        Some(path) => config::load_config(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(SessionConfig::default()),
    }
}

fn run_listen(seconds: u64, config: Option<PathBuf>, verbose: bool, json: bool) -> anyhow::Result<()> {
    let config = load_session_config(config)?;
    tracing::info!(seconds, "listening; sing a few notes and hold each one");

    let mut live = LiveSession::start(config).context("could not start listening")?;
    let mut observer = ConsoleObserver::new(std::io::stdout(), verbose);
    let deadline = Instant::now() + Duration::from_secs(seconds);

    while live.is_active() && Instant::now() < deadline {
        if let Some(frame_report) = live.next_report(POLL_INTERVAL) {
            frame_report.notify(&mut observer);
        }
    }
    live.stop();
    tracing::info!(locks = observer.locked().len(), "finished listening");

    let summary = live.summary();
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        let notes: Vec<_> = summary.locked_notes.iter().map(|pc| pc.name()).collect();
        println!("notes: {}", notes.join(" "));
        println!("key:   {}", report::format_key(&summary.key, summary.locked_notes.len()));
    }
    Ok(())
}

fn run_tune(target: &str, tolerance: Option<f32>, seconds: u64, config: Option<PathBuf>) -> anyhow::Result<()> {
    let mut config = load_session_config(config)?;
    if let Some(tolerance) = tolerance {
        config.matching.tolerance_cents = tolerance;
    }
    let target = tuning::parse_note_name(target)?;
    let target_name = format!("{}{}", target.pitch_class, target.octave);
    let mut tracker = TargetTracker::new(target.frequency, config.matching.clone());

    tracing::info!(target = %target_name, frequency = target.frequency, "tuning");
    let mut live = LiveSession::start(config).context("could not start listening")?;
    let deadline = Instant::now() + Duration::from_secs(seconds);

    while live.is_active() && Instant::now() < deadline {
        let Some(frame_report) = live.next_report(POLL_INTERVAL) else {
            continue;
        };
        let Some(update) = tracker.update(frame_report.frequency_hz(), Instant::now()) else {
            continue;
        };
        println!("{}", report::format_match(&update, &target_name));
        if update.confirmed {
            println!("matched {target_name}");
            return Ok(());
        }
    }

    bail!("did not hold {target_name} within {seconds} s")
}

fn run_quantize(frequencies: &[f32]) -> anyhow::Result<()> {
    for &frequency in frequencies {
        if !(frequency.is_finite() && frequency > 0.0) {
            bail!("frequency must be positive, got {frequency}");
        }
        println!("{}", report::format_note(&tuning::quantize(frequency)));
    }
    Ok(())
}

fn run_key(notes: &[String], rank: bool) -> anyhow::Result<()> {
    let set = notes
        .iter()
        .map(|name| name.parse::<PitchClass>())
        .collect::<Result<LockedNoteSet, _>>()?;

    println!("{}", report::format_key(&best_key(&set), set.len()));
    if rank {
        println!("{}", report::format_ranking(&rank_keys(&set), 12));
    }
    Ok(())
}

fn run_config(write: Option<PathBuf>) -> anyhow::Result<()> {
    let config = SessionConfig::default();
    match write {
        Some(path) => {
            config::save_config(&config, &path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "wrote default configuration");
        }
        None => println!("{}", serde_json::to_string_pretty(&config)?),
    }
    Ok(())
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Find the key of what you sing", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Listen to the microphone, lock held notes and report the key.
    Listen {
        /// Stop listening after this many seconds.
        #[arg(short, long, default_value_t = 20)]
        seconds: u64,
        /// JSON configuration file; defaults are used for missing values.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Print every detected note and pending candidate.
        #[arg(short, long)]
        verbose: bool,
        /// Print the session summary as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Sing toward one target note until it is held in tune.
    Tune {
        /// Target note, e.g. "A4", "C#3" or "Bb" (octave 4 when omitted).
        #[arg(short, long, default_value = "A4")]
        target: String,
        /// Match window in cents on either side of the target.
        #[arg(long)]
        tolerance: Option<f32>,
        /// Give up after this many seconds.
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Print the nearest note for each frequency.
    Quantize {
        #[arg(required = true)]
        frequencies: Vec<f32>,
    },
    /// Score a set of note names against the twelve major keys.
    Key {
        #[arg(required = true)]
        notes: Vec<String>,
        /// Also list every key with its score.
        #[arg(short, long)]
        rank: bool,
    },
    /// Print the default configuration or write it to a file.
    Config {
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
}
