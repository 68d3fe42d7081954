use std::fmt;

/// Result type for training operations
pub type Result<T> = std::result::Result<T, OnPolicyError>;

/// Main error type for the on-policy training pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum OnPolicyError {
    /// Invalid dimensions for operations
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid configuration or parameter value
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Action outside of the environment's action space
    InvalidAction {
        action: usize,
        max_actions: usize,
    },

    /// Simulator failure during reset or step
    Environment(String),

    /// Non-finite loss or gradient
    NumericalError(String),

    /// Empty buffer or batch
    EmptyBuffer(String),

    /// IO errors (file operations)
    IoError(String),

    /// Serialization/deserialization errors
    SerializationError(String),

    /// Training loop error
    TrainingError(String),
}

impl fmt::Display for OnPolicyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnPolicyError::DimensionMismatch { expected, actual } => {
                write!(f, "Dimension mismatch: expected {}, got {}", expected, actual)
            }
            OnPolicyError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            OnPolicyError::InvalidAction { action, max_actions } => {
                write!(f, "Invalid action {}: must be less than {}", action, max_actions)
            }
            OnPolicyError::Environment(msg) => write!(f, "Environment error: {}", msg),
            OnPolicyError::NumericalError(msg) => write!(f, "Numerical error: {}", msg),
            OnPolicyError::EmptyBuffer(msg) => write!(f, "Empty buffer: {}", msg),
            OnPolicyError::IoError(msg) => write!(f, "IO error: {}", msg),
            OnPolicyError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            OnPolicyError::TrainingError(msg) => write!(f, "Training error: {}", msg),
        }
    }
}

impl std::error::Error for OnPolicyError {}

impl From<std::io::Error> for OnPolicyError {
    fn from(err: std::io::Error) -> Self {
        OnPolicyError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for OnPolicyError {
    fn from(err: bincode::Error) -> Self {
        OnPolicyError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for OnPolicyError {
    fn from(err: serde_json::Error) -> Self {
        OnPolicyError::SerializationError(err.to_string())
    }
}

// Helper functions for common error patterns
impl OnPolicyError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        OnPolicyError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        OnPolicyError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn environment<S: Into<String>>(msg: S) -> Self {
        OnPolicyError::Environment(msg.into())
    }

    /// Fail with a `NumericalError` unless `value` is finite.
    pub fn ensure_finite(what: &str, value: f32) -> Result<f32> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(OnPolicyError::NumericalError(format!("{} is not finite ({})", what, value)))
        }
    }
}
