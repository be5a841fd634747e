use thiserror::Error;

#[derive(Debug, Error)]
pub enum InflationError {
    #[error("io error reading/writing cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed cache file: {0}")]
    MalformedCache(String),

    #[error("fetch from reference source failed: {0}")]
    FetchFailed(String),

    #[error("reference source returned an unparseable table: {0}")]
    MalformedSource(String),
}

impl From<InflationError> for analyst_core::CoreError {
    fn from(err: InflationError) -> Self {
        analyst_core::CoreError::InflationRefreshFailed(err.to_string())
    }
}
