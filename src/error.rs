use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, ThisError)]
pub enum Error {
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("timeout")]
    Elapsed,
    #[error("unexpected error, {0}")]
    Other(#[source] Box<dyn std::error::Error + Sync + Send + 'static>),
}

impl Error {
    /// The store could not serve the request, either because it failed or it did not answer in time.
    #[inline]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Error::StoreUnavailable(_) | Error::Elapsed)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Self::Other(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::StoreUnavailable(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    #[inline]
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Elapsed
    }
}
