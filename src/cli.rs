use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use lichess_elite::extractor::{ScanObserver, ScanStats};
use lichess_elite::filter::{DEFAULT_ELITE_ELO, DEFAULT_FLOOR_ELO, FilterConfig, TIME_FORFEIT};
use lichess_elite::links::{DEFAULT_INDEX_URL, DEFAULT_YEARS};
use lichess_elite::pipeline::{ArchiveOutcome, IngestObserver};
use lichess_elite::reader::{Compression, HttpConfig};
use lichess_elite::store::DEFAULT_TABLE;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Collect high-rated games from the Lichess database into DuckDB"
)]
pub struct Cli {
    /// Log at debug level unless LICHESS_ELITE_LOG says otherwise
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the archive links found on the index page
    Links(IndexArgs),

    /// Stream archives, keep elite games, write them to the games table
    Ingest(IngestArgs),

    /// Read the games table back and print a summary
    Summary(SummaryArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Index page listing the monthly archives
    #[arg(long, default_value = DEFAULT_INDEX_URL)]
    pub base_url: String,

    /// Year tokens an archive link must contain (repeatable)
    #[arg(long = "year", default_values_t = DEFAULT_YEARS.map(String::from))]
    pub years: Vec<String>,

    /// Seconds to wait for a connection
    #[arg(long, default_value_t = 15)]
    pub connect_timeout_secs: u64,

    /// Seconds to wait for any single read before giving up on an archive
    #[arg(long = "timeout-secs", default_value_t = 60)]
    pub read_timeout_secs: u64,
}

impl IndexArgs {
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            ..HttpConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DbArgs {
    /// DuckDB database file
    #[arg(long, default_value = "data/lichess.duckdb")]
    pub db: PathBuf,

    /// Destination table
    #[arg(long, default_value = DEFAULT_TABLE)]
    pub table: String,
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[command(flatten)]
    pub index: IndexArgs,

    #[command(flatten)]
    pub db: DbArgs,

    /// Local paths, globs or URLs to ingest instead of discovering links (repeatable)
    #[arg(long = "input")]
    pub inputs: Vec<String>,

    /// Rating the stronger player must reach
    #[arg(long, default_value_t = DEFAULT_ELITE_ELO)]
    pub elite: u32,

    /// Rating the weaker player must reach
    #[arg(long, default_value_t = DEFAULT_FLOOR_ELO)]
    pub floor: u32,

    /// Termination reasons to drop (repeatable)
    #[arg(long = "exclude-termination", default_values_t = [TIME_FORFEIT.to_string()])]
    pub excluded_terminations: Vec<String>,

    /// Compression of every input ('zstd' or 'plain'); detected from the name when omitted
    #[arg(long, value_parser = Compression::parse)]
    pub compression: Option<Compression>,

    /// Stop after this many archives
    #[arg(long)]
    pub max_archives: Option<usize>,

    /// Report progress every N lines
    #[arg(long, default_value_t = 1_000_000)]
    pub progress_every: u64,
}

impl IngestArgs {
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig::new(self.elite, self.floor)
            .with_excluded_terminations(self.excluded_terminations.iter().cloned())
    }
}

#[derive(Args, Debug, Clone)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub db: DbArgs,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

/// Spinner per archive, driven by scan progress.
pub struct SpinnerObserver {
    style: ProgressStyle,
    bar: Option<ProgressBar>,
}

impl SpinnerObserver {
    pub fn new() -> Self {
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        Self { style, bar: None }
    }
}

impl Default for SpinnerObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanObserver for SpinnerObserver {
    fn progress(&mut self, stats: &ScanStats) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!(
                "{} lines, {} games, {} kept",
                stats.lines, stats.blocks, stats.emitted
            ));
            bar.tick();
        }
    }
}

impl IngestObserver for SpinnerObserver {
    fn archive_started(&mut self, index: usize, total: usize, location: &str) {
        let name = location.rsplit('/').next().unwrap_or(location);
        let bar = ProgressBar::new_spinner()
            .with_style(self.style.clone())
            .with_prefix(format!("[{}/{}] {}", index + 1, total, name));
        bar.enable_steady_tick(Duration::from_millis(200));
        self.bar = Some(bar);
    }

    fn archive_finished(&mut self, outcome: &ArchiveOutcome) {
        if let Some(bar) = self.bar.take() {
            match &outcome.error {
                Some(err) => bar.abandon_with_message(format!("failed: {}", err)),
                None => bar.finish_with_message(format!(
                    "{} lines, {} games, {} kept",
                    outcome.lines, outcome.blocks, outcome.records
                )),
            }
        }
    }
}
