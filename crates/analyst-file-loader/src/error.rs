use thiserror::Error;

/// Loader-origin faults (spec §4.2). These convert into
/// `analyst_core::CoreError` at the Orchestrator boundary; when raised from
/// code a generated script runs, they become an observation instead (the
/// Orchestrator's concern, not this crate's).
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("unsupported format for {0}")]
    UnsupportedFormat(String),

    #[error("malformed csv: {0}")]
    MalformedCsv(String),

    #[error("malformed json: {0}")]
    MalformedJson(String),

    #[error("malformed excel: {0}")]
    MalformedExcel(String),

    #[error("file too large: {0} bytes (limit {1})")]
    FileTooLarge(u64, u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LoaderError> for analyst_core::CoreError {
    fn from(err: LoaderError) -> Self {
        match err {
            LoaderError::NotFound(f) => analyst_core::CoreError::NotFound(f),
            LoaderError::UnsupportedFormat(f) => analyst_core::CoreError::UnsupportedFormat(f),
            LoaderError::MalformedCsv(m) => analyst_core::CoreError::MalformedCsv(m),
            LoaderError::MalformedJson(m) => analyst_core::CoreError::MalformedJson(m),
            LoaderError::MalformedExcel(m) => analyst_core::CoreError::MalformedExcel(m),
            LoaderError::FileTooLarge(size, limit) => {
                analyst_core::CoreError::FileTooLarge(format!("{size} bytes exceeds limit of {limit}"))
            }
            LoaderError::Io(e) => analyst_core::CoreError::NotFound(e.to_string()),
        }
    }
}
