//! Scripted transport for exercising the driver without hardware.
//!
//! Responses are keyed by the exact wire string. Every write is recorded
//! in a transcript so tests can assert on the command sequence. The error
//! queue query gets a canned "no error" reply unless a test pushes a
//! failure.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{AdapterError, ScpiAdapter};

const ERROR_QUERY: &str = ":SYSTem:ERRor?";
const NO_ERROR: &str = "+0,\"No error\"";

#[derive(Default)]
pub struct MockAdapter {
    connected: bool,
    responses: HashMap<String, String>,
    binary_responses: HashMap<String, Vec<u8>>,
    default_response: Option<String>,
    error_queue: Arc<Mutex<VecDeque<String>>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for an exact query string (including the `?`).
    pub fn with_response(mut self, query: impl Into<String>, response: impl Into<String>) -> Self {
        self.responses.insert(query.into(), response.into());
        self
    }

    /// Script a raw binary response for an exact query string.
    pub fn with_binary_response(
        mut self,
        query: impl Into<String>,
        response: Vec<u8>,
    ) -> Self {
        self.binary_responses.insert(query.into(), response);
        self
    }

    /// Reply used for queries with no scripted response.
    pub fn with_default_response(mut self, response: impl Into<String>) -> Self {
        self.default_response = Some(response.into());
        self
    }

    /// Shared handle to the transcript of everything written.
    pub fn transcript_handle(&self) -> TranscriptHandle {
        TranscriptHandle {
            sent: Arc::clone(&self.sent),
        }
    }

    /// Shared handle to the scripted error queue.
    pub fn error_queue_handle(&self) -> ErrorQueueHandle {
        ErrorQueueHandle {
            queue: Arc::clone(&self.error_queue),
        }
    }

    fn record(&self, line: &str) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(line.to_string());
        }
    }
}

/// Test-side view of the commands a [`MockAdapter`] has received.
#[derive(Clone)]
pub struct TranscriptHandle {
    sent: Arc<Mutex<Vec<String>>>,
}

impl TranscriptHandle {
    pub fn lines(&self) -> Vec<String> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }

    pub fn contains(&self, line: &str) -> bool {
        self.lines().iter().any(|l| l == line)
    }

    pub fn count_of(&self, line: &str) -> usize {
        self.lines().iter().filter(|l| *l == line).count()
    }
}

/// Test-side handle for scripting `:SYSTem:ERRor?` replies.
#[derive(Clone)]
pub struct ErrorQueueHandle {
    queue: Arc<Mutex<VecDeque<String>>>,
}

impl ErrorQueueHandle {
    /// Queue one reply for the next error query; subsequent queries fall
    /// back to "no error".
    pub fn push(&self, reply: impl Into<String>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_back(reply.into());
        }
    }
}

#[async_trait]
impl ScpiAdapter for MockAdapter {
    fn adapter_type(&self) -> &str {
        "mock"
    }

    fn info(&self) -> String {
        format!("MockAdapter({} scripted responses)", self.responses.len())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    async fn send(&mut self, command: &str) -> Result<()> {
        if !self.connected {
            return Err(AdapterError::NotConnected.into());
        }
        self.record(command);
        Ok(())
    }

    async fn query(&mut self, query: &str) -> Result<String> {
        if !self.connected {
            return Err(AdapterError::NotConnected.into());
        }
        self.record(query);

        if query == ERROR_QUERY {
            let scripted = self
                .error_queue
                .lock()
                .ok()
                .and_then(|mut q| q.pop_front());
            return Ok(scripted.unwrap_or_else(|| NO_ERROR.to_string()));
        }

        if let Some(response) = self.responses.get(query) {
            return Ok(response.clone());
        }
        if let Some(default) = &self.default_response {
            return Ok(default.clone());
        }
        Err(anyhow!(AdapterError::QueryFailed(format!(
            "no scripted response for '{query}'"
        ))))
    }

    async fn query_binary(&mut self, query: &str) -> Result<Vec<u8>> {
        if !self.connected {
            return Err(AdapterError::NotConnected.into());
        }
        self.record(query);
        self.binary_responses
            .get(query)
            .cloned()
            .ok_or_else(|| {
                anyhow!(AdapterError::QueryFailed(format!(
                    "no scripted binary response for '{query}'"
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_response() {
        let mut mock = MockAdapter::new().with_response("*IDN?", "A,B,C,D");
        mock.connect().await.unwrap();
        assert_eq!(mock.query("*IDN?").await.unwrap(), "A,B,C,D");
    }

    #[tokio::test]
    async fn test_unscripted_query_fails() {
        let mut mock = MockAdapter::new();
        mock.connect().await.unwrap();
        assert!(mock.query(":FOO?").await.is_err());
    }

    #[tokio::test]
    async fn test_default_response() {
        let mut mock = MockAdapter::new().with_default_response("0");
        mock.connect().await.unwrap();
        assert_eq!(mock.query(":ANY:THING?").await.unwrap(), "0");
    }

    #[tokio::test]
    async fn test_error_queue_replies_then_falls_back() {
        let mut mock = MockAdapter::new();
        let errors = mock.error_queue_handle();
        mock.connect().await.unwrap();

        errors.push("-222,\"Data out of range\"");
        assert_eq!(
            mock.query(ERROR_QUERY).await.unwrap(),
            "-222,\"Data out of range\""
        );
        assert_eq!(mock.query(ERROR_QUERY).await.unwrap(), NO_ERROR);
    }

    #[tokio::test]
    async fn test_transcript_records_writes() {
        let mut mock = MockAdapter::new();
        let transcript = mock.transcript_handle();
        mock.connect().await.unwrap();

        mock.send(":AUToscale").await.unwrap();
        let _ = mock.query(ERROR_QUERY).await;

        assert_eq!(transcript.lines(), vec![":AUToscale", ERROR_QUERY]);
        assert!(transcript.contains(":AUToscale"));
        transcript.clear();
        assert!(transcript.lines().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_adapter_refuses_io() {
        let mut mock = MockAdapter::new();
        assert!(mock.send(":AUToscale").await.is_err());
        assert!(mock.query("*IDN?").await.is_err());
    }
}
