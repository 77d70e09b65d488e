//! Error types for Ratekeeper.

use thiserror::Error;

/// Main error type for Ratekeeper operations.
///
/// Admission decisions never produce an error; a rejection is an ordinary
/// `false`. Errors only arise while building limiters or wiring them up.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A limiter setting is out of range
    #[error("Invalid {setting} for {limiter}: {reason}")]
    InvalidSetting {
        /// Algorithm the setting belongs to
        limiter: &'static str,
        /// Name of the offending setting
        setting: &'static str,
        /// Why it was rejected
        reason: String,
    },

    /// A limiter with a background task was built outside a tokio runtime
    #[error("{0} must be constructed inside a tokio runtime")]
    NoRuntime(&'static str),

    /// Two limiters registered under one name
    #[error("Limiter already registered: {0}")]
    DuplicateLimiter(String),

    /// No limiter registered under the requested name
    #[error("Unknown limiter: {0}")]
    UnknownLimiter(String),

    /// Layered configuration loading errors
    #[error("Configuration source error: {0}")]
    ConfigSource(#[from] ::config::ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RatekeeperError {
    pub(crate) fn invalid(
        limiter: &'static str,
        setting: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            limiter,
            setting,
            reason: reason.into(),
        }
    }
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;
