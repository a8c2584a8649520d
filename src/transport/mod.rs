//! Byte transports between a [`Device`](crate::device::Device) and an instrument.
//!
//! All supported instruments use a line oriented protocol over a stream socket:
//! one command per line, answers terminated by a newline, bulk data as an
//! IEEE 488.2 definite length block (`#<n><length><bytes>`).

use crate::error::{InstrumentError, InstrumentResult};
use async_trait::async_trait;

pub mod mock;
pub mod tcp;

pub use mock::MockTransport;
pub use tcp::TcpTransport;

/// Default raw socket port of SCPI and TSP instruments.
pub const DEFAULT_PORT: u16 = 5025;

/// Default timeout for connecting and reading, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// Largest binary block payload accepted, larger headers are rejected
/// before anything is allocated.
pub const MAX_BLOCK_BYTES: usize = 64 * 1024 * 1024;

/// Line oriented connection to an instrument.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one command, the terminator is appended by the transport.
    async fn write_line(&mut self, line: &str) -> InstrumentResult<()>;

    /// Read one response line without its terminator.
    async fn read_line(&mut self) -> InstrumentResult<String>;

    /// Read a definite length binary block and return its payload.
    async fn read_block(&mut self) -> InstrumentResult<Vec<u8>>;

    /// Close the connection. Closing twice is `InterfaceClosed`.
    async fn close(&mut self) -> InstrumentResult<()>;

    /// Whether the connection is usable.
    fn is_open(&self) -> bool;
}

/// Parse the `#<n><length>` header of a binary block.
///
/// Returns the header length in bytes and the payload length.
pub fn parse_block_header(header: &[u8]) -> InstrumentResult<(usize, usize)> {
    if header.first() != Some(&b'#') {
        return Err(InstrumentError::Block(
            "block does not start with '#'".to_string(),
        ));
    }
    let digits = header
        .get(1)
        .and_then(|d| (*d as char).to_digit(10))
        .ok_or_else(|| InstrumentError::Block("missing length digit count".to_string()))?
        as usize;
    if digits == 0 {
        return Err(InstrumentError::Block(
            "indefinite length blocks are not supported".to_string(),
        ));
    }
    let length_field = header
        .get(2..2 + digits)
        .ok_or_else(|| InstrumentError::Block("truncated length field".to_string()))?;
    let length = std::str::from_utf8(length_field)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            InstrumentError::Block(format!(
                "invalid length field '{}'",
                String::from_utf8_lossy(length_field)
            ))
        })?;
    if length > MAX_BLOCK_BYTES {
        return Err(InstrumentError::Block(format!(
            "block of {length} bytes exceeds the limit of {MAX_BLOCK_BYTES}"
        )));
    }
    Ok((2 + digits, length))
}

/// Extract the payload of a complete binary block, ignoring a trailing newline.
pub fn parse_block(raw: &[u8]) -> InstrumentResult<Vec<u8>> {
    let (header_len, length) = parse_block_header(raw)?;
    raw.get(header_len..header_len + length)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| {
            InstrumentError::Block(format!(
                "expected {length} data bytes, got {}",
                raw.len().saturating_sub(header_len)
            ))
        })
}

/// Encode a payload as a definite length block.
pub fn encode_block(payload: &[u8]) -> Vec<u8> {
    let length = payload.len().to_string();
    let mut raw = format!("#{}{}", length.len(), length).into_bytes();
    raw.extend_from_slice(payload);
    raw.push(b'\n');
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block() {
        let raw = b"#800000004\x01\x02\x03\x04\n";
        assert_eq!(parse_block(raw).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_parse_block_header() {
        assert_eq!(parse_block_header(b"#3100").unwrap(), (5, 100));
        assert!(parse_block_header(b"3100").is_err());
        assert!(parse_block_header(b"#0").is_err());
        assert!(parse_block_header(b"#41").is_err());
        assert!(parse_block_header(b"#2x1").is_err());
    }

    #[test]
    fn test_oversized_block_header() {
        let err = parse_block_header(b"#9999999999").unwrap_err();
        assert!(matches!(err, InstrumentError::Block(_)));
        assert!(err.to_string().contains("exceeds the limit"));
        assert_eq!(
            parse_block_header(format!("#8{MAX_BLOCK_BYTES:08}").as_bytes()).unwrap(),
            (10, MAX_BLOCK_BYTES)
        );
    }

    #[test]
    fn test_truncated_block() {
        let err = parse_block(b"#15ab").unwrap_err();
        assert!(err.to_string().contains("expected 5 data bytes, got 2"));
    }

    #[test]
    fn test_encode_block() {
        let raw = encode_block(&[9u8; 12]);
        assert!(raw.starts_with(b"#212"));
        assert_eq!(parse_block(&raw).unwrap(), vec![9u8; 12]);
    }
}
