/// Failures a caller is expected to tell apart from plumbing errors.
///
/// Travels inside `anyhow::Error`; use `downcast_ref::<PipelineError>()` to
/// recover it.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Unknown signature: {0}")]
    UnknownSignature(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl PipelineError {
    pub fn of(err: &anyhow::Error) -> Option<&PipelineError> {
        err.downcast_ref::<PipelineError>()
    }
}
