//! Custom error types for safegate

use thiserror::Error;

/// Main error type for safegate operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Loader state error: {0}")]
    State(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Sort order violated: {0}")]
    OrderViolation(String),

    #[error("Sink write failed: {0}")]
    Sink(String),

    #[error("Similarity matcher error: {0}")]
    Matcher(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Scheduler error: {0}")]
    Scheduler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'safegate init' first")]
    NotInitialized,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for safegate
pub type Result<T> = std::result::Result<T, Error>;

impl From<tokio_cron_scheduler::JobSchedulerError> for Error {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        Error::Scheduler(format!("{:?}", err))
    }
}
