use std::fmt;

/// Raised when externally supplied configuration fails validation.
///
/// Validation is all-or-nothing: a configuration that produces this error is
/// never partially applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    Invalid(String),
}

impl ConfigurationError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        ConfigurationError::Invalid(reason.into())
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigurationError::Invalid(reason) => write!(f, "CONFIG_INVALID: {reason}"),
        }
    }
}

impl std::error::Error for ConfigurationError {}
