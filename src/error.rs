use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with the offending key, when known
    #[error("configuration error: {message}")]
    Config {
        message: String,
        key: Option<String>,
    },

    /// Transport-level failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// 2xx response with nothing in it
    #[error("empty response body from {url}")]
    EmptyBody { url: String },

    /// Body that is not the JSON shape we expect
    #[error("malformed response from {url}: {message}")]
    MalformedBody { url: String, message: String },

    /// Well-formed JSON that fails a contract (empty catalog, non-object info)
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl Error {
    pub fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
