//! Transport adapters.
//!
//! This module contains implementations of the [`ScpiAdapter`] trait,
//! providing low-level I/O abstraction between the driver and the
//! instrument: a VISA transport for real hardware and a scripted mock for
//! tests.

pub mod mock_adapter;
pub mod visa_adapter;

pub use mock_adapter::MockAdapter;
pub use visa_adapter::VisaAdapter;

use anyhow::Result;
use async_trait::async_trait;

/// An error that can occur when interacting with a transport adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("Not connected")]
    NotConnected,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serial request/response channel to one SCPI instrument.
///
/// The driver owns exactly one adapter; implementations are free to do
/// blocking I/O as long as they keep it off the async runtime.
#[async_trait]
pub trait ScpiAdapter: Send + Sync {
    /// Short adapter type tag, e.g. "visa".
    fn adapter_type(&self) -> &str;

    /// Human-readable connection summary for log messages.
    fn info(&self) -> String;

    fn is_connected(&self) -> bool;

    /// Open the underlying session.
    async fn connect(&mut self) -> Result<()>;

    /// Close the underlying session.
    async fn disconnect(&mut self) -> Result<()>;

    /// Write a command; no response is read.
    async fn send(&mut self, command: &str) -> Result<()>;

    /// Write a query and read one line-terminated response.
    async fn query(&mut self, query: &str) -> Result<String>;

    /// Write a query and read a raw (binary block) response.
    async fn query_binary(&mut self, query: &str) -> Result<Vec<u8>>;
}
