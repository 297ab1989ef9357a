//! Error types for quad_planner

use thiserror::Error;

/// Main error type for the planning stack
#[derive(Debug, Error)]
pub enum PlannerError {
    /// Path search could not connect start and goal
    #[error("No path found: {0}")]
    NoPathFound(String),
    /// Planning failed (refinement exhausted, unsafe trajectory, ...)
    #[error("Planning error: {0}")]
    PlanningError(String),
    /// Start and goal fall into the same voxel, nothing to fly
    #[error("Goal already reached")]
    AlreadyAtGoal,
    /// A caller broke an invariant (zero duration, empty waypoints, out-of-range query)
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Numerical computation failed (singular system, etc.)
    #[error("Numerical error: {0}")]
    NumericalError(String),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Parameter file could not be parsed
    #[error("Cannot read the parameter file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    /// Export serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Visualization error
    #[error("Visualization error: {0}")]
    VisualizationError(String),
}

impl PlannerError {
    /// Planning outcomes the controller retries from; everything else is a bug upstream.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlannerError::NoPathFound(_) | PlannerError::PlanningError(_) | PlannerError::AlreadyAtGoal
        )
    }
}

/// Result type alias for planner operations
pub type PlannerResult<T> = Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlannerError::NoPathFound("goal occupied".to_string());
        assert_eq!(format!("{}", err), "No path found: goal occupied");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: PlannerError = io_err.into();
        assert!(matches!(err, PlannerError::Io(_)));
    }

    #[test]
    fn test_recoverable_classes() {
        assert!(PlannerError::AlreadyAtGoal.is_recoverable());
        assert!(PlannerError::PlanningError("x".into()).is_recoverable());
        assert!(!PlannerError::PreconditionViolation("x".into()).is_recoverable());
        assert!(!PlannerError::NumericalError("x".into()).is_recoverable());
    }
}
