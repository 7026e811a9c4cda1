//! Multi-archive ingest: open, scan, append, one location after another.

use crate::error::{ArchiveError, StoreError};
use crate::extractor::{
    CancellationToken, DEFAULT_PROGRESS_INTERVAL, ExtractError, GameExtractor, ScanObserver,
    ScanStats,
};
use crate::filter::FilterConfig;
use crate::reader::{ArchiveSource, Compression, classify_read_error, open_archive};
use crate::store::GameSink;
use log::{error, info};
use serde::Serialize;
use thiserror::Error;

/// Errors that end the whole run. Per-archive failures are recorded in the report instead.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),

    #[error("ingest cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveOutcome {
    pub location: String,
    pub records: u64,
    pub lines: u64,
    pub blocks: u64,
    pub error: Option<String>,
}

impl ArchiveOutcome {
    fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            ..Self::default()
        }
    }

    fn record_stats(&mut self, stats: &ScanStats) {
        self.lines = stats.lines;
        self.blocks = stats.blocks;
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub archives: Vec<ArchiveOutcome>,
}

impl IngestReport {
    pub fn records(&self) -> u64 {
        self.archives.iter().map(|a| a.records).sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ArchiveOutcome> {
        self.archives.iter().filter(|a| !a.is_ok())
    }
}

/// Scan observer that also hears about archive boundaries.
pub trait IngestObserver: ScanObserver {
    fn archive_started(&mut self, _index: usize, _total: usize, _location: &str) {}

    fn archive_finished(&mut self, _outcome: &ArchiveOutcome) {}
}

impl IngestObserver for () {}

pub struct Ingest<'a, S> {
    source: &'a dyn ArchiveSource,
    sink: S,
    filter: FilterConfig,
    compression: Option<Compression>,
    cancellation: Option<CancellationToken>,
    progress_interval: u64,
}

impl<'a, S: GameSink> Ingest<'a, S> {
    pub fn new(source: &'a dyn ArchiveSource, sink: S, filter: FilterConfig) -> Self {
        Self {
            source,
            sink,
            filter,
            compression: None,
            cancellation: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Forces one compression mode instead of detecting it per location.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn with_progress_interval(mut self, lines: u64) -> Self {
        self.progress_interval = lines;
        self
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Initializes the sink once, then ingests every location in order.
    pub fn run<O: IngestObserver>(
        &mut self,
        locations: &[String],
        observer: &mut O,
    ) -> Result<IngestReport, IngestError> {
        self.sink.initialize()?;

        let mut report = IngestReport::default();
        for (idx, location) in locations.iter().enumerate() {
            if self.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            observer.archive_started(idx, locations.len(), location);
            let outcome = self.ingest_archive(location, observer)?;
            observer.archive_finished(&outcome);
            report.archives.push(outcome);
        }

        info!(
            "ingest finished: {} record(s) from {} archive(s), {} failed",
            report.records(),
            report.archives.len(),
            report.failures().count()
        );
        Ok(report)
    }

    fn ingest_archive<O: ScanObserver>(
        &mut self,
        location: &str,
        observer: &mut O,
    ) -> Result<ArchiveOutcome, IngestError> {
        let mut outcome = ArchiveOutcome::new(location);
        let compression = self
            .compression
            .unwrap_or_else(|| Compression::detect(location));

        info!("ingesting {} ({:?})", location, compression);
        let lines = match open_archive(self.source, location, compression) {
            Ok(lines) => lines,
            Err(err) => return Self::link_failure(outcome, err),
        };

        let mut extractor = GameExtractor::new(lines, self.filter.clone())
            .with_progress_interval(self.progress_interval)
            .with_observer(&mut *observer);
        if let Some(token) = &self.cancellation {
            extractor = extractor.with_cancellation(token.clone());
        }

        let mut failure = None;
        for item in extractor.by_ref() {
            match item {
                Ok(record) => {
                    self.sink.append(&record)?;
                    outcome.records += 1;
                }
                Err(ExtractError::Cancelled) => return Err(IngestError::Cancelled),
                Err(ExtractError::Read(e)) => {
                    failure = Some(classify_read_error(location, e));
                    break;
                }
            }
        }
        outcome.record_stats(&extractor.stats());

        match failure {
            Some(err) => Self::link_failure(outcome, err),
            None => {
                info!(
                    "{}: {} line(s), {} game(s) scanned, {} kept",
                    location, outcome.lines, outcome.blocks, outcome.records
                );
                Ok(outcome)
            }
        }
    }

    fn link_failure(
        mut outcome: ArchiveOutcome,
        err: ArchiveError,
    ) -> Result<ArchiveOutcome, IngestError> {
        if !err.is_link_scoped() {
            return Err(IngestError::Cancelled);
        }
        error!(
            "skipping {} after {} record(s): {}",
            outcome.location, outcome.records, err
        );
        outcome.error = Some(err.to_string());
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ArchiveInput;
    use crate::types::GameRecord;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io::Cursor;

    fn game(white: u32, black: u32, termination: &str) -> String {
        format!(
            "[Event \"Rated Blitz game\"]\n[WhiteElo \"{white}\"]\n[BlackElo \"{black}\"]\n\
             [Termination \"{termination}\"]\n\n1. e4 e5 2. Nf3 1-0\n\n"
        )
    }

    /// Serves canned archives by location; unknown locations fail like a 404.
    struct CannedSource(HashMap<String, Vec<u8>>);

    impl ArchiveSource for CannedSource {
        fn open(&self, location: &str) -> Result<ArchiveInput, ArchiveError> {
            match self.0.get(location) {
                Some(bytes) => Ok(Box::new(Cursor::new(bytes.clone()))),
                None => Err(ArchiveError::Io {
                    location: location.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such archive"),
                }),
            }
        }
    }

    #[derive(Default)]
    struct Events(Vec<String>);

    impl ScanObserver for Events {}

    impl IngestObserver for Events {
        fn archive_started(&mut self, index: usize, total: usize, location: &str) {
            self.0.push(format!("start {}/{} {}", index + 1, total, location));
        }

        fn archive_finished(&mut self, outcome: &ArchiveOutcome) {
            self.0.push(format!("done {} {}", outcome.location, outcome.records));
        }
    }

    fn source() -> CannedSource {
        let month_a = game(2600, 2300, "Normal") + &game(1500, 1500, "Normal");
        let month_b = game(2300, 2700, "Normal") + &game(2700, 2600, "Time forfeit");
        let corrupt = vec![0x28, 0xb5, 0x2f, 0xfd, 0xff, 0xff, 0xff, 0xff];

        let mut archives = HashMap::new();
        archives.insert(
            "a.pgn.zst".to_string(),
            zstd::encode_all(month_a.as_bytes(), 3).unwrap(),
        );
        archives.insert("b.pgn".to_string(), month_b.into_bytes());
        archives.insert("corrupt.pgn.zst".to_string(), corrupt);
        CannedSource(archives)
    }

    #[test]
    fn test_run_collects_passing_games_in_order() {
        let source = source();
        let locations = vec!["a.pgn.zst".to_string(), "b.pgn".to_string()];
        let mut ingest = Ingest::new(&source, Vec::<GameRecord>::new(), FilterConfig::default());

        let report = ingest.run(&locations, &mut ()).unwrap();
        let sink = ingest.into_sink();

        assert_eq!(report.records(), 2);
        assert_eq!(report.failures().count(), 0);
        assert_eq!(report.archives[0].blocks, 2);
        assert_eq!(report.archives[1].lines, 14);
        assert_eq!(
            sink.iter().map(|g| (g.white_elo, g.black_elo)).collect::<Vec<_>>(),
            vec![(2600, 2300), (2300, 2700)]
        );
    }

    #[test]
    fn test_failed_archives_are_skipped() {
        let source = source();
        let locations = vec![
            "missing.pgn.zst".to_string(),
            "corrupt.pgn.zst".to_string(),
            "b.pgn".to_string(),
        ];
        let mut events = Events::default();
        let mut ingest = Ingest::new(&source, Vec::<GameRecord>::new(), FilterConfig::default());

        let report = ingest.run(&locations, &mut events).unwrap();

        assert_eq!(report.archives.len(), 3);
        assert_eq!(report.records(), 1);
        let failed: Vec<_> = report.failures().map(|a| a.location.as_str()).collect();
        assert_eq!(failed, vec!["missing.pgn.zst", "corrupt.pgn.zst"]);
        assert!(report.archives[1]
            .error
            .as_deref()
            .unwrap()
            .contains("failed to decompress"));
        assert_eq!(
            events.0,
            vec![
                "start 1/3 missing.pgn.zst",
                "done missing.pgn.zst 0",
                "start 2/3 corrupt.pgn.zst",
                "done corrupt.pgn.zst 0",
                "start 3/3 b.pgn",
                "done b.pgn 1",
            ]
        );
    }

    #[test]
    fn test_sink_is_initialized_once_per_run() {
        let source = source();
        let stale = GameRecord {
            time_control: None,
            event: None,
            white_elo: 1,
            black_elo: 1,
            opening: None,
            movetext: "stale".to_string(),
        };
        let mut ingest = Ingest::new(&source, vec![stale], FilterConfig::default());
        ingest
            .run(&["b.pgn".to_string(), "b.pgn".to_string()], &mut ())
            .unwrap();

        let sink = ingest.into_sink();
        assert_eq!(sink.len(), 2);
        assert!(sink.iter().all(|g| g.movetext != "stale"));
    }

    #[test]
    fn test_forced_compression_overrides_detection() {
        let source = source();
        let mut ingest = Ingest::new(&source, Vec::<GameRecord>::new(), FilterConfig::default())
            .with_compression(Compression::Zstd);
        let report = ingest.run(&["b.pgn".to_string()], &mut ()).unwrap();

        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.records(), 0);
    }

    #[test]
    fn test_cancelled_run_stops() {
        let source = source();
        let token = CancellationToken::new();
        token.cancel();
        let mut ingest = Ingest::new(&source, Vec::<GameRecord>::new(), FilterConfig::default())
            .with_cancellation(token);

        let err = ingest.run(&["b.pgn".to_string()], &mut ()).unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));
    }
}
