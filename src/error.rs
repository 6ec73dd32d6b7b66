use thiserror::Error;

/// Run-fatal failures. Row-level problems never surface here: bad numbers
/// degrade to 0 and bad dates drop the row.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("required column `{0}` is missing from the input schema")]
    MissingColumn(String),

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("fetching {url} returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("config file is not valid JSON: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
