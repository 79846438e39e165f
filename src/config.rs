//! Configuration management.
//!
//! Settings are loaded from `config/<profile>.toml` with the `config`
//! crate. Every field has a default, so an absent `config/default.toml`
//! falls back to the built-in profile; a profile named explicitly must
//! exist.

use crate::error::{AppResult, ScopeError};
use crate::instrument::settings::ChannelId;
use config::Config;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Default log level, overridable from the command line.
    pub log_level: String,
    pub scope: ScopeSettings,
    pub capture: CaptureDefaults,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            scope: ScopeSettings::default(),
            capture: CaptureDefaults::default(),
        }
    }
}

/// Connection settings for the instrument.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScopeSettings {
    /// VISA resource string. When absent the CLI runs resource discovery.
    pub resource: Option<String>,
    /// Session open/read timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ScopeSettings {
    fn default() -> Self {
        Self {
            resource: None,
            timeout_ms: 5000,
        }
    }
}

/// Defaults applied when arming a waveform capture.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureDefaults {
    /// Number of points requested from the waveform record.
    pub points: u32,
    /// Channel captured when no source is given.
    pub source: ChannelId,
}

impl Default for CaptureDefaults {
    fn default() -> Self {
        Self {
            points: 10240,
            source: ChannelId::Channel1,
        }
    }
}

impl Settings {
    /// Load `config/default.toml` or a named profile under `config/`.
    pub fn new(profile: Option<&str>) -> AppResult<Self> {
        let name = profile.unwrap_or("default");
        let path = format!("config/{name}");
        let s = Config::builder()
            .add_source(config::File::with_name(&path).required(profile.is_some()))
            .build()?;
        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from an explicit file path.
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let s = Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> AppResult<()> {
        if self.scope.timeout_ms == 0 {
            return Err(ScopeError::Configuration(
                "scope.timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.capture.points == 0 {
            return Err(ScopeError::Configuration(
                "capture.points must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.scope.timeout_ms, 5000);
        assert_eq!(settings.capture.points, 10240);
        assert_eq!(settings.capture.source, ChannelId::Channel1);
        assert!(settings.scope.resource.is_none());
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[scope]
resource = "TCPIP0::192.168.0.17::INSTR"
timeout_ms = 2000

[capture]
points = 4096
source = "channel3"
"#
        )
        .unwrap();

        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(
            settings.scope.resource.as_deref(),
            Some("TCPIP0::192.168.0.17::INSTR")
        );
        assert_eq!(settings.scope.timeout_ms, 2000);
        assert_eq!(settings.capture.points, 4096);
        assert_eq!(settings.capture.source, ChannelId::Channel3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[scope]\ntimeout_ms = 750").unwrap();

        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.scope.timeout_ms, 750);
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.capture.points, 10240);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[scope]\ntimeout_ms = 0").unwrap();

        let err = Settings::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ScopeError::Configuration(_)));
    }

    #[test]
    fn test_missing_named_profile_errors() {
        assert!(Settings::new(Some("does_not_exist")).is_err());
    }
}
