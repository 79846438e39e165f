//! VISA transport for GPIB/USB/Ethernet instruments.
//!
//! Wraps the `visa-rs` crate and provides async I/O by running the
//! synchronous VISA calls on Tokio's blocking task executor.
//!
//! Supports resource strings like:
//! - "GPIB0::1::INSTR" (GPIB interface)
//! - "USB0::0x1234::0x5678::SERIAL::INSTR" (USB)
//! - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use super::ScpiAdapter;
#[cfg(not(feature = "instrument_visa"))]
use crate::error::ScopeError;

#[cfg(feature = "instrument_visa")]
use super::AdapterError;
#[cfg(feature = "instrument_visa")]
use anyhow::Context;
#[cfg(feature = "instrument_visa")]
use log::debug;
#[cfg(feature = "instrument_visa")]
use std::ffi::CString;
#[cfg(feature = "instrument_visa")]
use std::io::{BufRead, BufReader, Read, Write};
#[cfg(feature = "instrument_visa")]
use std::sync::Arc;
#[cfg(feature = "instrument_visa")]
use tokio::sync::Mutex;
#[cfg(feature = "instrument_visa")]
use visa_rs::{flags::AccessMode, AsResourceManager, DefaultRM, VisaString};

/// Resource search pattern matching every instrument the VISA library sees.
pub const ALL_INSTRUMENTS: &str = "?*INSTR";

/// VISA transport adapter.
pub struct VisaAdapter {
    /// VISA resource string (e.g. "TCPIP0::192.168.0.17::INSTR").
    resource_string: String,

    /// Session open timeout.
    timeout: Duration,

    /// Line terminator appended to commands (typically "\n" for SCPI).
    line_terminator: String,

    /// The open session (behind Arc<Mutex> for async access).
    #[cfg(feature = "instrument_visa")]
    session: Option<Arc<Mutex<VisaHandle>>>,
}

/// The resource manager owns the session lifetime in VISA, so it is kept
/// alive alongside the instrument handle.
#[cfg(feature = "instrument_visa")]
struct VisaHandle {
    _rm: DefaultRM,
    instrument: visa_rs::Instrument,
}

impl VisaAdapter {
    /// Create a new VISA adapter for the given resource string.
    pub fn new(resource_string: impl Into<String>) -> Self {
        Self {
            resource_string: resource_string.into(),
            timeout: Duration::from_secs(5),
            line_terminator: "\n".to_string(),
            #[cfg(feature = "instrument_visa")]
            session: None,
        }
    }

    /// Set the session timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the line terminator appended to commands.
    pub fn with_line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Enumerate VISA resources matching `pattern` (see [`ALL_INSTRUMENTS`]).
    #[cfg(feature = "instrument_visa")]
    pub async fn list_resources(pattern: &str) -> Result<Vec<String>> {
        let pattern = pattern.to_string();
        tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let rm = DefaultRM::new().context("Failed to create VISA resource manager")?;
            let expr = VisaString::from(
                CString::new(pattern.clone()).context("Search pattern contains NUL")?,
            );
            let mut list = rm
                .find_res_list(&expr)
                .with_context(|| format!("VISA resource search failed for '{pattern}'"))?;
            let mut resources = Vec::new();
            while let Some(res) = list
                .find_next()
                .context("Failed to walk VISA resource list")?
            {
                resources.push(res.to_string());
            }
            Ok(resources)
        })
        .await
        .context("VISA discovery task panicked")?
    }

    /// Enumerate VISA resources matching `pattern` (see [`ALL_INSTRUMENTS`]).
    #[cfg(not(feature = "instrument_visa"))]
    pub async fn list_resources(_pattern: &str) -> Result<Vec<String>> {
        Err(ScopeError::VisaFeatureDisabled.into())
    }

    #[cfg(feature = "instrument_visa")]
    fn handle(&self) -> Result<Arc<Mutex<VisaHandle>>> {
        self.session
            .as_ref()
            .cloned()
            .ok_or_else(|| AdapterError::NotConnected.into())
    }
}

#[async_trait]
impl ScpiAdapter for VisaAdapter {
    fn adapter_type(&self) -> &str {
        "visa"
    }

    fn info(&self) -> String {
        format!(
            "VisaAdapter({} @ {}ms timeout)",
            self.resource_string,
            self.timeout.as_millis()
        )
    }

    fn is_connected(&self) -> bool {
        #[cfg(feature = "instrument_visa")]
        {
            self.session.is_some()
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            false
        }
    }

    async fn connect(&mut self) -> Result<()> {
        #[cfg(feature = "instrument_visa")]
        {
            let resource = self.resource_string.clone();
            let timeout = self.timeout;
            let handle = tokio::task::spawn_blocking(move || -> Result<VisaHandle> {
                let rm = DefaultRM::new().context("Failed to create VISA resource manager")?;
                let c_string =
                    CString::new(resource.clone()).context("Resource string contains NUL")?;
                let instrument = rm
                    .open(&VisaString::from(c_string), AccessMode::NO_LOCK, timeout)
                    .with_context(|| format!("Failed to open VISA resource: {resource}"))?;
                Ok(VisaHandle {
                    _rm: rm,
                    instrument,
                })
            })
            .await
            .context("VISA open task panicked")??;

            self.session = Some(Arc::new(Mutex::new(handle)));
            debug!(
                "VISA resource '{}' opened with {}ms timeout",
                self.resource_string,
                self.timeout.as_millis()
            );
            Ok(())
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            Err(ScopeError::VisaFeatureDisabled.into())
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        #[cfg(feature = "instrument_visa")]
        {
            if self.session.take().is_some() {
                debug!("VISA resource '{}' closed", self.resource_string);
            }
        }
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        #[cfg(feature = "instrument_visa")]
        {
            let session = self.handle()?;
            let payload = format!("{command}{}", self.line_terminator);
            let command_for_log = command.to_string();

            tokio::task::spawn_blocking(move || -> Result<()> {
                let guard = session.blocking_lock();
                let mut writer = &guard.instrument;
                writer
                    .write_all(payload.as_bytes())
                    .with_context(|| format!("VISA write failed for: {command_for_log}"))?;
                debug!("VISA command sent: {command_for_log}");
                Ok(())
            })
            .await
            .context("VISA I/O task panicked")?
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            let _ = command;
            Err(ScopeError::VisaFeatureDisabled.into())
        }
    }

    async fn query(&mut self, query: &str) -> Result<String> {
        #[cfg(feature = "instrument_visa")]
        {
            let session = self.handle()?;
            let payload = format!("{query}{}", self.line_terminator);
            let query_for_log = query.to_string();

            tokio::task::spawn_blocking(move || -> Result<String> {
                let guard = session.blocking_lock();
                let mut writer = &guard.instrument;
                writer
                    .write_all(payload.as_bytes())
                    .with_context(|| format!("VISA write failed for: {query_for_log}"))?;

                let mut reader = BufReader::new(&guard.instrument);
                let mut buf = Vec::new();
                reader
                    .read_until(b'\n', &mut buf)
                    .with_context(|| format!("VISA read failed for: {query_for_log}"))?;
                let response = String::from_utf8_lossy(&buf).trim().to_string();
                debug!("VISA query '{query_for_log}' -> '{response}'");
                Ok(response)
            })
            .await
            .context("VISA I/O task panicked")?
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            let _ = query;
            Err(ScopeError::VisaFeatureDisabled.into())
        }
    }

    async fn query_binary(&mut self, query: &str) -> Result<Vec<u8>> {
        #[cfg(feature = "instrument_visa")]
        {
            let session = self.handle()?;
            let payload = format!("{query}{}", self.line_terminator);
            let query_for_log = query.to_string();

            tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
                let guard = session.blocking_lock();
                let mut writer = &guard.instrument;
                writer
                    .write_all(payload.as_bytes())
                    .with_context(|| format!("VISA write failed for: {query_for_log}"))?;

                let mut reader = BufReader::new(&guard.instrument);
                let mut buf = Vec::new();
                if let Err(err) = reader.read_to_end(&mut buf) {
                    // The read ends with a timeout once the instrument has
                    // nothing more to send; only a completely empty reply is
                    // a failure.
                    if buf.is_empty() {
                        return Err(anyhow::Error::from(err)
                            .context(format!("VISA binary read failed for: {query_for_log}")));
                    }
                }
                debug!("VISA binary query '{query_for_log}' -> {} bytes", buf.len());
                Ok(buf)
            })
            .await
            .context("VISA I/O task panicked")?
        }

        #[cfg(not(feature = "instrument_visa"))]
        {
            let _ = query;
            Err(ScopeError::VisaFeatureDisabled.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visa_adapter_creation() {
        let adapter = VisaAdapter::new("GPIB0::1::INSTR");
        assert_eq!(adapter.adapter_type(), "visa");
        assert!(!adapter.is_connected());
        assert_eq!(adapter.resource_string, "GPIB0::1::INSTR");
        assert_eq!(adapter.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_visa_adapter_builder() {
        let adapter = VisaAdapter::new("USB0::0x1234::0x5678::SERIAL::INSTR")
            .with_timeout(Duration::from_millis(2000))
            .with_line_terminator("\r\n");

        assert_eq!(adapter.timeout, Duration::from_millis(2000));
        assert_eq!(adapter.line_terminator, "\r\n");
    }

    #[test]
    fn test_info_string() {
        let adapter =
            VisaAdapter::new("TCPIP0::192.168.0.17::INSTR").with_timeout(Duration::from_millis(3000));
        let info = adapter.info();
        assert!(info.contains("TCPIP0::192.168.0.17::INSTR"));
        assert!(info.contains("3000ms"));
    }

    #[tokio::test]
    #[cfg(not(feature = "instrument_visa"))]
    async fn test_disabled_feature_errors() {
        let mut adapter = VisaAdapter::new("GPIB0::5::INSTR");
        let err = adapter.connect().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScopeError>(),
            Some(ScopeError::VisaFeatureDisabled)
        ));
    }
}
