//! # Error Types
//!
//! Errors shared across relay components.

use thiserror::Error;

/// A configuration value failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Field holds a value outside its allowed range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Two fields contradict each other.
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Reject a zero value for `field`.
    pub fn require_nonzero(field: &'static str, value: u64) -> Result<(), Self> {
        if value == 0 {
            Err(Self::invalid(field, "cannot be 0"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_nonzero() {
        assert!(ConfigError::require_nonzero("x", 1).is_ok());
        assert_eq!(
            ConfigError::require_nonzero("x", 0),
            Err(ConfigError::InvalidValue {
                field: "x",
                reason: "cannot be 0".into()
            })
        );
    }

    #[test]
    fn test_display() {
        let err = ConfigError::invalid("timeout_ms", "must be below 60000");
        assert_eq!(err.to_string(), "invalid value for timeout_ms: must be below 60000");
    }
}
