use thiserror::Error;

/// Faults contacting the model server. Only [`ModelError::Unavailable`] is a
/// transport-level fault eligible for `fail_and_requeue`; a malformed reply
/// is terminal (spec §7).
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model server unavailable: {0}")]
    Unavailable(String),

    #[error("model returned an uninterpretable response: {0}")]
    ProtocolError(String),

    #[error("model request timed out")]
    Timeout,
}

impl From<ModelError> for analyst_core::CoreError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Unavailable(m) => analyst_core::CoreError::ModelUnavailable(m),
            ModelError::ProtocolError(m) => analyst_core::CoreError::ModelProtocolError(m),
            ModelError::Timeout => analyst_core::CoreError::ModelUnavailable("request timed out".to_string()),
        }
    }
}

/// Faults launching or communicating with the code-execution subprocess
/// itself (failing to spawn the interpreter, a broken pipe). A raised
/// exception *inside* generated code is never represented here — it becomes
/// an [`crate::executor::ExecutionOutcome`] observation instead.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to launch code executor: {0}")]
    SpawnFailed(String),

    #[error("code executor I/O error: {0}")]
    Io(String),

    #[error("code execution exceeded its per-execution timeout")]
    Timeout,
}
