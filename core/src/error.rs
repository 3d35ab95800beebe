use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("fetch from {endpoint} failed: {details}")]
    Fetch { endpoint: String, details: String },

    #[error("endpoint selection failed: {0}")]
    Selection(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors a later cycle can reasonably recover from.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::Http(_)
                | Error::Fetch { .. }
                | Error::Selection(_)
                | Error::Io(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}
