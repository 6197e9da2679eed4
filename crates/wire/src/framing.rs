// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire format: 4-byte length prefix (big-endian) + JSON payload.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum single-message size accepted by `read_message`, guarding against a
/// peer sending a bogus length prefix and exhausting memory.
pub const MAX_MESSAGE_BYTES: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection closed")]
    ConnectionClosed,
    #[error("message exceeds maximum size ({0} bytes)")]
    MessageTooLarge(u32),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a value to JSON bytes (no length prefix).
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, WireError> {
    Ok(serde_json::to_vec(value)?)
}

/// Deserialize a value from JSON bytes.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Write a length-prefixed message: 4-byte big-endian length, then the raw bytes.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
) -> Result<(), WireError> {
    let len = u32::try_from(data.len()).map_err(|_| WireError::MessageTooLarge(u32::MAX))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed message, returning the raw payload bytes.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<u8>, WireError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_BYTES {
        return Err(WireError::MessageTooLarge(len));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Write a JSON-encodable value as a length-prefixed message.
pub async fn write_json<W: AsyncWrite + Unpin, T: Serialize>(
    writer: &mut W,
    value: &T,
) -> Result<(), WireError> {
    let bytes = encode(value)?;
    write_message(writer, &bytes).await
}

/// Read a length-prefixed message and decode it as JSON.
pub async fn read_json<R: AsyncRead + Unpin, T: DeserializeOwned>(
    reader: &mut R,
) -> Result<T, WireError> {
    let bytes = read_message(reader).await?;
    decode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_returns_json_without_length_prefix() {
        let value = serde_json::json!({"ok": true});
        let encoded = encode(&value).expect("encode failed");
        let json_str = std::str::from_utf8(&encoded).expect("should be valid UTF-8");
        assert!(json_str.starts_with('{'), "should be JSON object: {json_str}");
    }

    #[tokio::test]
    async fn read_write_message_roundtrip() {
        let original = b"hello world";

        let mut buffer = Vec::new();
        write_message(&mut buffer, original).await.expect("write failed");
        assert_eq!(buffer.len(), 4 + original.len());

        let mut cursor = std::io::Cursor::new(buffer);
        let read_back = read_message(&mut cursor).await.expect("read failed");
        assert_eq!(read_back, original);
    }

    #[tokio::test]
    async fn write_message_adds_length_prefix() {
        let data = b"test data";

        let mut buffer = Vec::new();
        write_message(&mut buffer, data).await.expect("write failed");

        let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
        assert_eq!(len, data.len());
        assert_eq!(&buffer[4..], data);
    }

    #[tokio::test]
    async fn read_message_on_empty_stream_is_connection_closed() {
        let mut cursor = std::io::Cursor::new(Vec::<u8>::new());
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::ConnectionClosed));
    }

    #[tokio::test]
    async fn read_message_rejects_oversized_length_prefix() {
        let mut buffer = Vec::new();
        buffer.extend_from_slice(&(MAX_MESSAGE_BYTES + 1).to_be_bytes());
        let mut cursor = std::io::Cursor::new(buffer);
        let err = read_message(&mut cursor).await.unwrap_err();
        assert!(matches!(err, WireError::MessageTooLarge(_)));
    }

    #[tokio::test]
    async fn read_json_write_json_roundtrip() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Sample {
            a: u32,
            b: String,
        }
        let original = Sample { a: 7, b: "hi".to_string() };
        let mut buffer = Vec::new();
        write_json(&mut buffer, &original).await.expect("write failed");
        let mut cursor = std::io::Cursor::new(buffer);
        let read_back: Sample = read_json(&mut cursor).await.expect("read failed");
        assert_eq!(read_back, original);
    }
}
