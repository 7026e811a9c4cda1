pub mod error;
pub mod extractor;
pub mod filter;
pub mod links;
pub mod logging;
pub mod moves;
pub mod pipeline;
pub mod reader;
pub mod store;
pub mod types;

pub use error::{ArchiveError, StoreError};
pub use extractor::{CancellationToken, ExtractError, GameExtractor, ScanObserver, ScanStats};
pub use filter::{FilterConfig, RatingThresholds};
pub use pipeline::{Ingest, IngestError, IngestObserver, IngestReport};
pub use store::{DuckDbStore, GameSink};
pub use types::{GameRecord, PendingGame, RatingField};
