//! Error types for the mesh combining engine

use mesh_combine_core::CoreError;
use thiserror::Error;

/// Result type for combine operations
pub type Result<T> = std::result::Result<T, CombineError>;

/// Errors that can occur while searching, merging or saving
#[derive(Error, Debug)]
pub enum CombineError {
    /// Scene or mesh model errors
    #[error("Scene error: {0}")]
    Core(#[from] CoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings that cannot be sanitized into something usable
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// A source mesh is missing or has no CPU side data
    #[error("Mesh '{name}' is unavailable: {reason}")]
    MeshUnavailable { name: String, reason: String },

    /// A merge pass produced inconsistent data
    #[error("Merge failed: {0}")]
    MergeFailed(String),

    /// A worker panicked while running a job
    #[error("Job {job} panicked: {message}")]
    JobPanicked { job: u64, message: String },

    /// The job was dropped by an abort
    #[error("Job {0} was aborted")]
    Aborted(u64),

    /// The job manager no longer accepts work
    #[error("Job manager is shut down")]
    Shutdown,

    /// Nothing to do for the requested action
    #[error("Nothing to combine: {0}")]
    NothingToCombine(String),
}

impl CombineError {
    /// Create a new invalid settings error
    pub fn invalid_settings<S: Into<String>>(msg: S) -> Self {
        Self::InvalidSettings(msg.into())
    }

    /// Create a new mesh unavailable error
    pub fn mesh_unavailable<N: Into<String>, R: Into<String>>(name: N, reason: R) -> Self {
        Self::MeshUnavailable {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a new merge failed error
    pub fn merge_failed<S: Into<String>>(msg: S) -> Self {
        Self::MergeFailed(msg.into())
    }

    /// Create a new job panicked error
    pub fn job_panicked<S: Into<String>>(job: u64, message: S) -> Self {
        Self::JobPanicked {
            job,
            message: message.into(),
        }
    }

    /// Create a new nothing to combine error
    pub fn nothing_to_combine<S: Into<String>>(msg: S) -> Self {
        Self::NothingToCombine(msg.into())
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors fail a single job or action; the manager and
    /// combiner stay usable afterwards.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CombineError::Io(_) => true,
            CombineError::InvalidSettings(_) => true,
            CombineError::MeshUnavailable { .. } => true,
            CombineError::MergeFailed(_) => true,
            CombineError::JobPanicked { .. } => true,
            CombineError::Aborted(_) => true,
            CombineError::NothingToCombine(_) => true,
            CombineError::Core(_) => false,
            CombineError::Shutdown => false,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            CombineError::Aborted(_) | CombineError::NothingToCombine(_) => ErrorSeverity::Low,
            CombineError::InvalidSettings(_) | CombineError::MeshUnavailable { .. } => {
                ErrorSeverity::Medium
            }
            CombineError::Io(_) | CombineError::MergeFailed(_) | CombineError::JobPanicked { .. } => {
                ErrorSeverity::High
            }
            CombineError::Core(_) | CombineError::Shutdown => ErrorSeverity::Critical,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Low severity - can be ignored
    Low,
    /// Medium severity - should be logged
    Medium,
    /// High severity - requires attention
    High,
    /// Critical severity - operation cannot continue
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CombineError::invalid_settings("cell size");
        assert!(matches!(err, CombineError::InvalidSettings(_)));
        assert_eq!(err.to_string(), "Invalid settings: cell size");

        let err = CombineError::job_panicked(3, "boom");
        assert_eq!(err.to_string(), "Job 3 panicked: boom");
    }

    #[test]
    fn test_error_recoverability() {
        assert!(CombineError::merge_failed("x").is_recoverable());
        assert!(CombineError::Aborted(1).is_recoverable());
        assert!(!CombineError::Shutdown.is_recoverable());
        assert!(!CombineError::from(CoreError::NodeNotFound(1)).is_recoverable());
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(CombineError::Aborted(1).severity(), ErrorSeverity::Low);
        assert_eq!(
            CombineError::job_panicked(1, "x").severity(),
            ErrorSeverity::High
        );
        assert!(CombineError::Shutdown.severity() > ErrorSeverity::High);
    }
}
