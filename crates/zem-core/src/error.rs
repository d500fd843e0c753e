use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Thread panicked")]
    ThreadPanic,
    #[error("Invalid path {0}")]
    InvalidPath(PathBuf),
    #[error("No index is open for {0}")]
    IndexNotOpen(PathBuf),
    #[error("Invalid clause: {0}")]
    InvalidClause(String),
    #[error("Malformed entry #{index} in batch {batch}: {reason}")]
    MalformedEntry {
        batch: usize,
        index: usize,
        reason: String,
    },
    #[error("Invalid location '{0}': expected a line number or a delimited line anchor")]
    InvalidLocation(String),

    #[error("Execution serializer is not running")]
    NotStarted,
    #[error("Timed out waiting for the execution serializer")]
    Timeout,
    #[error("Job was dropped before it ran")]
    Dropped,
    #[error("Query was interrupted")]
    Interrupted,
    #[error("Failed to spawn execution serializer thread: {0}")]
    SpawnThread(#[source] std::io::Error),

    #[error("Source '{source_name}' failed: {message}")]
    Scanner {
        source_name: String,
        message: String,
    },
    #[error("Failed to create directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to initialize tracing: {0}")]
    TracingInit(String),
    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
    #[error("Failed to build ignore rules: {0}")]
    Ignore(#[from] ignore::Error),

    #[error("Failed to open index database env: {0}")]
    EnvOpen(#[source] heed::Error),
    #[error("Failed to create index database: {0}")]
    DbCreate(#[source] heed::Error),
    #[error("Failed to clear stale readers for index database: {0}")]
    DbClearStaleReaders(#[source] heed::Error),
    #[error("Failed to start read transaction for index database: {0}")]
    DbStartReadTxn(#[source] heed::Error),
    #[error("Failed to start write transaction for index database: {0}")]
    DbStartWriteTxn(#[source] heed::Error),
    #[error("Failed to read from index database: {0}")]
    DbRead(#[source] heed::Error),
    #[error("Failed to write to index database: {0}")]
    DbWrite(#[source] heed::Error),
    #[error("Failed to commit write transaction to index database: {0}")]
    DbCommit(#[source] heed::Error),
}

impl Error {
    /// Conditions a shell can simply retry (or ignore) rather than report
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Timeout | Error::Dropped | Error::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
