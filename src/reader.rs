use crate::error::ArchiveError;
use log::debug;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::time::Duration;
use thiserror::Error;
use zstd::stream::read::Decoder as ZstdDecoder;

const STREAM_BUFFER_BYTES: usize = 256 * 1024;

pub type ArchiveInput = Box<dyn Read + Send>;
pub type ArchiveLines = Box<dyn BufRead + Send>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Compression {
    Plain,
    Zstd,
}

impl Compression {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let normalized = raw.trim();
        if normalized.is_empty() {
            return Err(
                "Invalid compression value ''. Supported values: 'zstd' or 'plain'.".to_string(),
            );
        }

        if normalized.eq_ignore_ascii_case("zstd") {
            Ok(Self::Zstd)
        } else if normalized.eq_ignore_ascii_case("plain") || normalized.eq_ignore_ascii_case("none")
        {
            Ok(Self::Plain)
        } else {
            Err(format!(
                "Invalid compression value '{}'. Supported values: 'zstd' or 'plain'.",
                normalized
            ))
        }
    }

    pub fn detect(location: &str) -> Self {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        if path.to_ascii_lowercase().ends_with(".zst") {
            Self::Zstd
        } else {
            Self::Plain
        }
    }
}

pub fn is_remote(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Something that can hand out the raw (still compressed) bytes of an archive.
pub trait ArchiveSource {
    fn open(&self, location: &str) -> Result<ArchiveInput, ArchiveError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    pub user_agent: String,
    pub connect_timeout: Duration,
    /// Upper bound for waiting on any single read from the connection.
    pub read_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("lichess-elite/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(15),
            read_timeout: Duration::from_secs(60),
        }
    }
}

pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()?;
        Ok(Self { client })
    }

    pub fn client(&self) -> &reqwest::blocking::Client {
        &self.client
    }
}

impl ArchiveSource for HttpSource {
    fn open(&self, location: &str) -> Result<ArchiveInput, ArchiveError> {
        debug!("GET {}", location);
        let response =
            self.client
                .get(location)
                .send()
                .map_err(|source| ArchiveError::Transport {
                    location: location.to_string(),
                    source,
                })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Status {
                location: location.to_string(),
                status,
            });
        }

        Ok(Box::new(response))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl ArchiveSource for FileSource {
    fn open(&self, location: &str) -> Result<ArchiveInput, ArchiveError> {
        let file = File::open(location).map_err(|source| ArchiveError::Io {
            location: location.to_string(),
            source,
        })?;
        Ok(Box::new(file))
    }
}

/// Routes URLs to HTTP and everything else to the local filesystem.
pub struct AnySource {
    http: HttpSource,
    file: FileSource,
}

impl AnySource {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpSource::new(config)?,
            file: FileSource,
        })
    }

    pub fn http(&self) -> &HttpSource {
        &self.http
    }
}

impl ArchiveSource for AnySource {
    fn open(&self, location: &str) -> Result<ArchiveInput, ArchiveError> {
        if is_remote(location) {
            self.http.open(location)
        } else {
            self.file.open(location)
        }
    }
}

/// Marks errors raised by the source itself, so they can be told apart from
/// errors raised by the decoder layered on top of it.
#[derive(Debug, Error)]
#[error(transparent)]
struct SourceFault(io::Error);

struct SourceRead<R>(R);

impl<R: Read> Read for SourceRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::Interrupted {
                e
            } else {
                io::Error::new(e.kind(), SourceFault(e))
            }
        })
    }
}

/// Opens `location` and returns a line reader over its decompressed text.
pub fn open_archive(
    source: &dyn ArchiveSource,
    location: &str,
    compression: Compression,
) -> Result<ArchiveLines, ArchiveError> {
    let raw = SourceRead(source.open(location)?);

    match compression {
        Compression::Plain => Ok(Box::new(BufReader::with_capacity(STREAM_BUFFER_BYTES, raw))),
        Compression::Zstd => {
            let decoder =
                ZstdDecoder::new(raw).map_err(|e| classify_read_error(location, e))?;
            Ok(Box::new(BufReader::with_capacity(
                STREAM_BUFFER_BYTES,
                decoder,
            )))
        }
    }
}

/// Maps a mid-stream read failure onto the archive error taxonomy.
pub fn classify_read_error(location: &str, err: io::Error) -> ArchiveError {
    let from_source = err
        .get_ref()
        .is_some_and(|inner| inner.is::<SourceFault>());
    let location = location.to_string();

    match (from_source, is_remote(&location)) {
        (true, true) => ArchiveError::TransportStream {
            location,
            source: err,
        },
        (true, false) => ArchiveError::Io {
            location,
            source: err,
        },
        (false, _) => ArchiveError::Decompression {
            location,
            source: err,
        },
    }
}

/// Expands glob patterns among local inputs; URLs and plain paths pass through.
pub fn expand_inputs(patterns: &[String]) -> Result<Vec<String>, glob::PatternError> {
    let mut locations = Vec::new();
    for pattern in patterns {
        if !is_remote(pattern) && (pattern.contains('*') || pattern.contains('?')) {
            let matches = glob::glob(pattern)?
                .filter_map(|entry| entry.ok())
                .map(|path| path.to_string_lossy().into_owned());
            locations.extend(matches);
        } else {
            locations.push(pattern.clone());
        }
    }
    Ok(locations)
}
