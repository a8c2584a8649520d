//! In-memory transport for tests and offline development.
//!
//! Clones share state, so a test keeps one handle for inspection while the
//! device under test owns another.

use super::{parse_block, Transport};
use crate::error::{InstrumentError, InstrumentResult};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    written: Vec<String>,
    lines: VecDeque<String>,
    blocks: VecDeque<Vec<u8>>,
    replies: HashMap<String, String>,
    closed: bool,
}

/// Mock instrument connection recording every command.
///
/// ```
/// use instrument_control::device::{Device, DeviceConfig};
/// use instrument_control::transport::MockTransport;
///
/// # tokio_test::block_on(async {
/// let mock = MockTransport::new();
/// mock.reply_to("*IDN?", "ACME,Widget,1,0.1");
/// let mut device = Device::with_transport(DeviceConfig::new("10.0.0.1"), mock.clone());
/// assert_eq!(device.identify().await.unwrap(), "ACME,Widget,1,0.1");
/// assert_eq!(mock.written(), vec!["*IDN?"]);
/// # })
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Open mock with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a response line for the next read.
    pub fn push_response(&self, line: impl Into<String>) {
        self.state().lines.push_back(line.into());
    }

    /// Queue a complete raw block (`#<n><len><data>`) for the next block read.
    pub fn push_block(&self, raw: impl Into<Vec<u8>>) {
        self.state().blocks.push_back(raw.into());
    }

    /// Answer `command` with `response` every time it is written.
    pub fn reply_to(&self, command: impl Into<String>, response: impl Into<String>) {
        self.state().replies.insert(command.into(), response.into());
    }

    /// Everything written so far.
    pub fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    /// Drain and return everything written so far.
    pub fn take_written(&self) -> Vec<String> {
        std::mem::take(&mut self.state().written)
    }

    /// Most recent command.
    pub fn last_written(&self) -> Option<String> {
        self.state().written.last().cloned()
    }

    /// Responses not consumed yet.
    pub fn pending_responses(&self) -> usize {
        self.state().lines.len()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn write_line(&mut self, line: &str) -> InstrumentResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(InstrumentError::InterfaceClosed);
        }
        state.written.push(line.to_owned());
        if let Some(reply) = state.replies.get(line).cloned() {
            state.lines.push_back(reply);
        }
        Ok(())
    }

    async fn read_line(&mut self) -> InstrumentResult<String> {
        let mut state = self.state();
        if state.closed {
            return Err(InstrumentError::InterfaceClosed);
        }
        state
            .lines
            .pop_front()
            .ok_or_else(|| InstrumentError::timeout("waiting for response", Duration::ZERO))
    }

    async fn read_block(&mut self) -> InstrumentResult<Vec<u8>> {
        let raw = {
            let mut state = self.state();
            if state.closed {
                return Err(InstrumentError::InterfaceClosed);
            }
            state
                .blocks
                .pop_front()
                .ok_or_else(|| InstrumentError::timeout("reading binary block", Duration::ZERO))?
        };
        parse_block(&raw)
    }

    async fn close(&mut self) -> InstrumentResult<()> {
        let mut state = self.state();
        if state.closed {
            return Err(InstrumentError::InterfaceClosed);
        }
        state.closed = true;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state().closed
    }
}
