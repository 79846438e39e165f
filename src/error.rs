//! Custom error types for the crate.
//!
//! `ScopeError` is the central error enum, built with `thiserror`. Adapter
//! and driver functions return `anyhow::Result` and construct `ScopeError`
//! variants where the failure is domain-meaningful, so callers (and tests)
//! can downcast to inspect the instrument error code or the offending
//! command.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, ScopeError>;

#[derive(Error, Debug)]
pub enum ScopeError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not connected to instrument")]
    NotConnected,

    /// The instrument error queue reported a non-zero code after a command.
    #[error("Instrument error {code} ({message}) after command '{command}'")]
    Instrument {
        code: i32,
        message: String,
        command: String,
    },

    /// `:SYSTem:ERRor?` must always return a string; an empty reply means
    /// the session itself is broken.
    #[error(":SYSTem:ERRor? returned nothing after command '{command}'")]
    EmptyErrorQueue { command: String },

    #[error("'{0}' is not a valid channel (channel1..channel4)")]
    InvalidChannel(String),

    #[error("Failed to parse {what} from '{raw}'")]
    Parse { what: &'static str, raw: String },

    #[error("Malformed waveform data block: {0}")]
    MalformedBlock(String),

    #[error("VISA support not enabled. Rebuild with --features instrument_visa")]
    VisaFeatureDisabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_error_display() {
        let err = ScopeError::Instrument {
            code: -113,
            message: "Undefined header".to_string(),
            command: ":BOGus".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Instrument error -113 (Undefined header) after command ':BOGus'"
        );
    }

    #[test]
    fn test_invalid_channel_display() {
        let err = ScopeError::InvalidChannel("channel9".to_string());
        assert!(err.to_string().contains("channel9"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = ScopeError::Parse {
            what: "voltage",
            raw: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to parse voltage from 'abc'");
    }
}
