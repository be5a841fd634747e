use thiserror::Error;

/// The error taxonomy of the job-execution core (spec §7), collected into a
/// single type so it can cross crate boundaries without every caller having
/// to know about `analyst-file-loader::LoaderError` or
/// `analyst-orchestrator::ModelError` individually.
///
/// Propagation policy: faults inside generated code are never represented
/// here — they become observations fed back to the model. Only faults at a
/// component boundary (malformed input, bounded-resource breaches,
/// transport failures, cancellation) reach this type.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("input rejected: {0}")]
    InputRejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("malformed csv: {0}")]
    MalformedCsv(String),

    #[error("malformed json: {0}")]
    MalformedJson(String),

    #[error("malformed excel: {0}")]
    MalformedExcel(String),

    #[error("file too large: {0}")]
    FileTooLarge(String),

    #[error("model server unavailable: {0}")]
    ModelUnavailable(String),

    #[error("model protocol error: {0}")]
    ModelProtocolError(String),

    #[error("code execution tool unavailable: {0}")]
    ExecutorUnavailable(String),

    #[error("execution timed out")]
    ExecutionTimeout,

    #[error("cumulative execution budget exhausted")]
    ExecBudgetExhausted,

    #[error("wall-clock deadline exceeded")]
    WallTimeout,

    #[error("canceled")]
    Canceled,

    #[error("broker error: {0}")]
    BrokerError(String),

    #[error("inflation refresh failed: {0}")]
    InflationRefreshFailed(String),

    #[error("maximum rounds exceeded")]
    MaxRoundsExceeded,
}

impl CoreError {
    /// Short machine-readable kind, used as `JobError.kind` and as the
    /// `detail` prefix of a terminal `ProgressEvent`.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::InputRejected(_) => "InputRejected",
            CoreError::NotFound(_) => "NotFound",
            CoreError::UnsupportedFormat(_) => "UnsupportedFormat",
            CoreError::MalformedCsv(_) => "MalformedCsv",
            CoreError::MalformedJson(_) => "MalformedJson",
            CoreError::MalformedExcel(_) => "MalformedExcel",
            CoreError::FileTooLarge(_) => "FileTooLarge",
            CoreError::ModelUnavailable(_) => "ModelUnavailable",
            CoreError::ModelProtocolError(_) => "ModelProtocolError",
            CoreError::ExecutorUnavailable(_) => "ExecutorUnavailable",
            CoreError::ExecutionTimeout => "ExecutionTimeout",
            CoreError::ExecBudgetExhausted => "ExecBudgetExhausted",
            CoreError::WallTimeout => "WallTimeout",
            CoreError::Canceled => "Canceled",
            CoreError::BrokerError(_) => "BrokerError",
            CoreError::InflationRefreshFailed(_) => "InflationRefreshFailed",
            CoreError::MaxRoundsExceeded => "MaxRoundsExceeded",
        }
    }

    /// Transport-level faults are the only ones eligible for
    /// `fail_and_requeue`; everything else is either terminal or (for
    /// generated-code faults, which never construct a `CoreError`) an
    /// observation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ModelUnavailable(_) | CoreError::BrokerError(_))
    }
}
