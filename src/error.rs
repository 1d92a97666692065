use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
/// Batch error
pub enum BatchError {
    /// The paging source could not deliver a page.
    #[error("Paging source unavailable: {0}")]
    SourceUnavailable(String),

    /// The write destination failed while committing a chunk.
    #[error("Item sink unavailable: {0}")]
    SinkUnavailable(String),

    /// A processor raised an unexpected failure.
    #[error("Transform error: {0}")]
    TransformError(String),

    /// A decider received malformed or missing parameters.
    #[error("Decision error: {0}")]
    DecisionError(String),

    /// Invalid chunk size, missing launch parameter, incomplete builder...
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Tasklet error: {0}")]
    Tasklet(String),

    /// The job repository could not allocate or record a run.
    #[error("Job repository error: {0}")]
    Repository(String),

    #[error("Step {0} failed")]
    Step(String),
}

/// Stable tag of a [`BatchError`], used in step diagnostics and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SourceUnavailable,
    SinkUnavailable,
    TransformError,
    DecisionError,
    Configuration,
    Tasklet,
    Repository,
    Step,
}

impl BatchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BatchError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            BatchError::SinkUnavailable(_) => ErrorKind::SinkUnavailable,
            BatchError::TransformError(_) => ErrorKind::TransformError,
            BatchError::DecisionError(_) => ErrorKind::DecisionError,
            BatchError::Configuration(_) => ErrorKind::Configuration,
            BatchError::Tasklet(_) => ErrorKind::Tasklet,
            BatchError::Repository(_) => ErrorKind::Repository,
            BatchError::Step(_) => ErrorKind::Step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchError, ErrorKind};

    #[test]
    fn kind_should_match_variant() {
        let error = BatchError::SinkUnavailable("disk full".to_string());
        assert_eq!(error.kind(), ErrorKind::SinkUnavailable);
        assert_eq!(error.to_string(), "Item sink unavailable: disk full");

        let error = BatchError::DecisionError("missing date".to_string());
        assert_eq!(error.kind(), ErrorKind::DecisionError);
    }
}
