//! Single-pass scan of a PGN export, one game block at a time.
//!
//! Input is expected in the Lichess export layout: tag lines, one blank line,
//! a single move-text line, one blank line. Deviations are tolerated and
//! reported as diagnostics; they never abort the scan.

use crate::error::DiagnosticAccumulator;
use crate::filter::FilterConfig;
use crate::types::{GameRecord, PendingGame, RatingField, TagOutcome};
use log::{debug, warn};
use std::io::{self, BufRead};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1_000_000;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read next line: {0}")]
    Read(#[from] io::Error),

    #[error("extraction cancelled")]
    Cancelled,
}

/// Shared flag checked before every line read.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub lines: u64,
    /// Blocks that reached finalize, whether or not they were emitted.
    pub blocks: u64,
    pub emitted: u64,
    /// Blocks cut off by the end of input before their move-text.
    pub discarded: u64,
}

/// Side channel for progress and diagnostics. Both hooks default to no-ops.
pub trait ScanObserver {
    fn progress(&mut self, _stats: &ScanStats) {}

    fn diagnostic(&mut self, _line: u64, _message: &str) {}
}

impl ScanObserver for () {}

impl<T: ScanObserver + ?Sized> ScanObserver for &mut T {
    fn progress(&mut self, stats: &ScanStats) {
        (**self).progress(stats);
    }

    fn diagnostic(&mut self, line: u64, message: &str) {
        (**self).diagnostic(line, message);
    }
}

impl<T: ScanObserver + ?Sized> ScanObserver for Box<T> {
    fn progress(&mut self, stats: &ScanStats) {
        (**self).progress(stats);
    }

    fn diagnostic(&mut self, line: u64, message: &str) {
        (**self).diagnostic(line, message);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    AccumulatingMetadata,
    AwaitingMovetext,
    AwaitingSeparator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Blank,
    Tag(&'a str),
    Movetext(&'a str),
}

pub fn parse_line(raw: &str) -> Line<'_> {
    let s = raw.trim();
    if s.is_empty() {
        Line::Blank
    } else if s.starts_with('[') {
        Line::Tag(s)
    } else {
        Line::Movetext(s)
    }
}

/// Splits `[Name "value"]` into its name and unescaped value.
pub fn parse_tag(line: &str) -> Option<(&str, String)> {
    let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
    let (key, rest) = inner.split_once(char::is_whitespace)?;
    let quoted = rest.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some((key, unescape_tag_value(quoted)))
}

fn unescape_tag_value(raw: &str) -> String {
    if !raw.contains('\\') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(next) = chars.next()
        {
            out.push(next);
        } else {
            out.push(c);
        }
    }
    out
}

/// Lazy iterator over the games of one input stream that pass `filter`.
///
/// Not restartable: once the reader is exhausted, or after the first error,
/// the iterator only returns `None`.
pub struct GameExtractor<R, O = ()> {
    reader: R,
    filter: FilterConfig,
    observer: O,
    cancellation: Option<CancellationToken>,
    progress_interval: u64,
    state: ScanState,
    pending: PendingGame,
    diagnostics: DiagnosticAccumulator,
    line_buf: Vec<u8>,
    stats: ScanStats,
    finished: bool,
}

impl<R: BufRead> GameExtractor<R> {
    pub fn new(reader: R, filter: FilterConfig) -> Self {
        Self {
            reader,
            filter,
            observer: (),
            cancellation: None,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            state: ScanState::Idle,
            pending: PendingGame::default(),
            diagnostics: DiagnosticAccumulator::default(),
            line_buf: Vec::with_capacity(4096),
            stats: ScanStats::default(),
            finished: false,
        }
    }
}

impl<R: BufRead, O: ScanObserver> GameExtractor<R, O> {
    pub fn with_observer<P: ScanObserver>(self, observer: P) -> GameExtractor<R, P> {
        GameExtractor {
            reader: self.reader,
            filter: self.filter,
            observer,
            cancellation: self.cancellation,
            progress_interval: self.progress_interval,
            state: self.state,
            pending: self.pending,
            diagnostics: self.diagnostics,
            line_buf: self.line_buf,
            stats: self.stats,
            finished: self.finished,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Report progress every `lines` lines; 0 leaves only the final report.
    pub fn with_progress_interval(mut self, lines: u64) -> Self {
        self.progress_interval = lines;
        self
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    fn feed(&mut self, raw: &str) -> Option<GameRecord> {
        match (self.state, parse_line(raw)) {
            (ScanState::Idle, Line::Blank) => {
                let line = self.stats.lines;
                debug!("line {}: blank line outside a game block skipped", line);
                self.observer
                    .diagnostic(line, "blank line outside a game block skipped");
                None
            }
            (ScanState::Idle, Line::Tag(tag)) => {
                self.apply_tag(tag);
                self.state = ScanState::AccumulatingMetadata;
                None
            }
            (ScanState::Idle, Line::Movetext(text)) => {
                self.note("move-text without preceding tags");
                self.store_movetext(text);
                None
            }

            (ScanState::AccumulatingMetadata, Line::Tag(tag)) => {
                self.apply_tag(tag);
                None
            }
            (ScanState::AccumulatingMetadata, Line::Blank) => {
                self.state = ScanState::AwaitingMovetext;
                None
            }
            (ScanState::AccumulatingMetadata, Line::Movetext(text)) => {
                self.note("missing blank line before move-text");
                self.store_movetext(text);
                None
            }

            (ScanState::AwaitingMovetext, Line::Movetext(text)) => {
                self.store_movetext(text);
                None
            }
            (ScanState::AwaitingMovetext, Line::Blank) => {
                self.note("extra blank line before move-text");
                None
            }
            (ScanState::AwaitingMovetext, Line::Tag(tag)) => {
                self.note("tag line after the tag separator");
                self.apply_tag(tag);
                self.state = ScanState::AccumulatingMetadata;
                None
            }

            (ScanState::AwaitingSeparator, Line::Blank) => self.finalize(),
            (ScanState::AwaitingSeparator, Line::Movetext(text)) => {
                warn!(
                    "line {}: second move-text line in one block replaces the first",
                    self.stats.lines
                );
                self.note("second move-text line replaced the first");
                self.store_movetext(text);
                None
            }
            (ScanState::AwaitingSeparator, Line::Tag(tag)) => {
                self.note("missing blank line after move-text");
                let record = self.finalize();
                self.apply_tag(tag);
                self.state = ScanState::AccumulatingMetadata;
                record
            }
        }
    }

    fn note(&mut self, message: &str) {
        let line = self.stats.lines;
        self.diagnostics.push(line, message);
    }

    fn store_movetext(&mut self, text: &str) {
        self.pending.movetext = Some(text.to_string());
        self.state = ScanState::AwaitingSeparator;
    }

    fn apply_tag(&mut self, line: &str) {
        let Some((key, value)) = parse_tag(line) else {
            self.note(&format!("malformed tag line ignored: {}", line));
            return;
        };

        match self.pending.set_known_tag(key, value) {
            TagOutcome::Applied => {
                let rating = match key {
                    "WhiteElo" => &self.pending.white_elo,
                    "BlackElo" => &self.pending.black_elo,
                    _ => return,
                };
                if let RatingField::Invalid(raw) = rating {
                    let message = format!("Conversion error: {}='{}'", key, raw);
                    self.note(&message);
                }
            }
            TagOutcome::Duplicate => {
                self.note(&format!("duplicate {} tag ignored", key));
            }
            TagOutcome::Unknown => {}
        }
    }

    fn flush_diagnostics(&mut self) {
        if let Some(diagnostic) = self.diagnostics.take() {
            debug!(
                "block ending at line {}: line {}: {}",
                self.stats.lines, diagnostic.line, diagnostic.message
            );
            self.observer.diagnostic(diagnostic.line, &diagnostic.message);
        }
    }

    fn finalize(&mut self) -> Option<GameRecord> {
        let game = mem::take(&mut self.pending);
        self.state = ScanState::Idle;
        self.stats.blocks += 1;
        self.flush_diagnostics();

        let record = self.filter.admit(game);
        if record.is_some() {
            self.stats.emitted += 1;
        }
        record
    }

    fn finish(&mut self) -> Option<GameRecord> {
        self.finished = true;
        let record = match self.state {
            ScanState::AwaitingSeparator => self.finalize(),
            ScanState::AccumulatingMetadata | ScanState::AwaitingMovetext => {
                self.note("input ended inside a game block; block discarded");
                self.pending = PendingGame::default();
                self.state = ScanState::Idle;
                self.stats.discarded += 1;
                self.flush_diagnostics();
                None
            }
            ScanState::Idle => None,
        };
        self.observer.progress(&self.stats);
        record
    }
}

impl<R: BufRead, O: ScanObserver> Iterator for GameExtractor<R, O> {
    type Item = Result<GameRecord, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(token) = &self.cancellation
                && token.is_cancelled()
            {
                self.finished = true;
                return Some(Err(ExtractError::Cancelled));
            }

            self.line_buf.clear();
            match self.reader.read_until(b'\n', &mut self.line_buf) {
                Ok(0) => return self.finish().map(Ok),
                Ok(_) => {
                    self.stats.lines += 1;
                    if self.progress_interval > 0
                        && self.stats.lines.is_multiple_of(self.progress_interval)
                    {
                        self.observer.progress(&self.stats);
                    }

                    let buf = mem::take(&mut self.line_buf);
                    let record = self.feed(&String::from_utf8_lossy(&buf));
                    self.line_buf = buf;

                    if let Some(record) = record {
                        return Some(Ok(record));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(ExtractError::Read(e)));
                }
            }
        }
    }
}
