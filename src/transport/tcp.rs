//! Raw TCP socket transport.

use super::{parse_block_header, Transport};
use crate::error::{InstrumentError, InstrumentResult};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Longest wait for the newline that follows a binary block.
const BLOCK_TERMINATOR_WAIT: Duration = Duration::from_millis(100);

/// Async TCP connection to an instrument.
pub struct TcpTransport {
    stream: Option<BufReader<TcpStream>>,
    peer: String,
    timeout: Duration,
}

impl TcpTransport {
    /// Connect to `host:port`, giving up after `timeout`.
    ///
    /// The same timeout bounds every later read and write.
    pub async fn connect(host: &str, port: u16, timeout_after: Duration) -> InstrumentResult<Self> {
        let peer = format!("{host}:{port}");
        let stream = timeout(timeout_after, TcpStream::connect((host, port)))
            .await
            .map_err(|_| InstrumentError::timeout(format!("connecting to {peer}"), timeout_after))??;

        // Commands are short, do not wait for Nagle coalescing
        stream.set_nodelay(true)?;

        tracing::debug!(%peer, "TCP connection established");

        Ok(Self {
            stream: Some(BufReader::new(stream)),
            peer,
            timeout: timeout_after,
        })
    }

    /// Remote address as `host:port`.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Change the read/write timeout.
    pub fn set_timeout(&mut self, duration: Duration) {
        self.timeout = duration;
    }

    fn stream(&mut self) -> InstrumentResult<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or(InstrumentError::InterfaceClosed)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn write_line(&mut self, line: &str) -> InstrumentResult<()> {
        let limit = self.timeout;
        let message = format!("{line}\n");
        tracing::trace!(peer = %self.peer, command = %line, "write");

        let stream = self.stream()?.get_mut();
        timeout(limit, async {
            stream.write_all(message.as_bytes()).await?;
            stream.flush().await
        })
        .await
        .map_err(|_| InstrumentError::timeout(format!("sending '{line}'"), limit))??;
        Ok(())
    }

    async fn read_line(&mut self) -> InstrumentResult<String> {
        let limit = self.timeout;
        let stream = self.stream()?;

        let mut response = String::new();
        let read = timeout(limit, stream.read_line(&mut response))
            .await
            .map_err(|_| InstrumentError::timeout("waiting for response", limit))??;
        if read == 0 {
            self.stream = None;
            return Err(InstrumentError::InterfaceClosed);
        }

        let response = response.trim_end_matches(['\r', '\n']).to_string();
        tracing::trace!(peer = %self.peer, %response, "read");
        Ok(response)
    }

    async fn read_block(&mut self) -> InstrumentResult<Vec<u8>> {
        let limit = self.timeout;
        let stream = self.stream()?;

        let payload = timeout(limit, async {
            let mut header = vec![0u8; 2];
            stream.read_exact(&mut header).await?;
            let digits = (header[1] as char).to_digit(10).unwrap_or(0) as usize;
            header.resize(2 + digits, 0);
            stream.read_exact(&mut header[2..]).await?;
            let (_, length) = parse_block_header(&header)?;

            let mut payload = vec![0u8; length];
            stream.read_exact(&mut payload).await?;
            Ok::<_, InstrumentError>(payload)
        })
        .await
        .map_err(|_| InstrumentError::timeout("reading binary block", limit))??;

        let terminated = matches!(
            timeout(BLOCK_TERMINATOR_WAIT, stream.fill_buf()).await,
            Ok(Ok(buf)) if buf.first() == Some(&b'\n')
        );
        if terminated {
            stream.consume(1);
        }

        tracing::trace!(peer = %self.peer, bytes = payload.len(), "read block");
        Ok(payload)
    }

    async fn close(&mut self) -> InstrumentResult<()> {
        let mut stream = self.stream.take().ok_or(InstrumentError::InterfaceClosed)?;
        if let Err(err) = stream.get_mut().shutdown().await {
            tracing::debug!(peer = %self.peer, error = %err, "shutdown after close failed");
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}
