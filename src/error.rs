use std::io;
use thiserror::Error;

/// Failures while acquiring or reading one archive.
///
/// Everything except `Cancelled` is scoped to a single archive: a batch run
/// logs it and moves on to the next location.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("request to '{location}' failed: {source}")]
    Transport {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("'{location}' answered with HTTP status {status}")]
    Status {
        location: String,
        status: reqwest::StatusCode,
    },

    #[error("stream from '{location}' was interrupted: {source}")]
    TransportStream {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to decompress '{location}': {source}")]
    Decompression {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to read '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("extraction cancelled")]
    Cancelled,
}

impl ArchiveError {
    pub fn is_link_scoped(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid table name '{0}': expected [A-Za-z_][A-Za-z0-9_]*")]
    InvalidTable(String),

    #[error("database file '{0}' does not exist")]
    MissingDatabase(String),

    #[error("failed to create database directory '{path}': {source}")]
    Directory {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Database(#[from] duckdb::Error),
}

/// Non-fatal messages collected while one game block is scanned.
///
/// Anchored to the line of the first message. A message repeated back to back
/// is folded into one entry with a count.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticAccumulator {
    first_line: Option<u64>,
    entries: Vec<(String, u32)>,
}

/// Everything one block had to say, reported once at its end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDiagnostic {
    pub line: u64,
    pub message: String,
}

impl DiagnosticAccumulator {
    pub fn push(&mut self, line: u64, msg: &str) {
        self.first_line.get_or_insert(line);
        match self.entries.last_mut() {
            Some((last, count)) if last == msg => *count += 1,
            _ => self.entries.push((msg.to_string(), 1)),
        }
    }

    pub fn take(&mut self) -> Option<BlockDiagnostic> {
        let line = self.first_line.take()?;
        let message = self
            .entries
            .drain(..)
            .map(|(msg, count)| match count {
                1 => msg,
                n => format!("{} (x{})", msg, n),
            })
            .collect::<Vec<_>>()
            .join("; ");
        Some(BlockDiagnostic { line, message })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
