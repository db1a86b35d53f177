//! Frame Protocol
//!
//! Wire format for bridge frames using length-prefixed JSON with CRC32
//! checksum for integrity verification.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+----------------+------------------------------------------+
//! | Length (4)     | Checksum (4)   | JSON Payload (variable)                  |
//! | big-endian u32 | CRC32          | RequestFrame or ResponseFrame            |
//! +----------------+----------------+------------------------------------------+
//! ```
//!
//! The Length field contains the size of the JSON payload only.
//! The Checksum is the CRC32 hash of the JSON payload.
//!
//! A frame whose checksum verifies but whose JSON does not parse is skipped
//! and reported as [`TransportError::Serialization`]; the stream stays usable.
//! Checksum and size failures mean the stream is out of sync.

use serde::{de::DeserializeOwned, Serialize};

use super::TransportError;

/// Maximum frame size (10 MB)
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Frame header size: 4 bytes length + 4 bytes checksum
const HEADER_SIZE: usize = 8;

#[inline]
fn compute_checksum(payload: &[u8]) -> u32 {
    crc32fast::hash(payload)
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Encode a message to a length-prefixed frame with CRC32 checksum
///
/// # Errors
///
/// Returns `TransportError::Serialization` if JSON serialization fails and
/// `TransportError::FrameTooLarge` if the payload exceeds `MAX_FRAME_SIZE`.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    let json = serde_json::to_vec(msg).map_err(|e| TransportError::Serialization(e.to_string()))?;

    if json.len() > MAX_FRAME_SIZE {
        return Err(TransportError::FrameTooLarge {
            size: json.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    #[allow(clippy::cast_possible_truncation)]
    let len = json.len() as u32;
    let checksum = compute_checksum(&json);

    let mut buf = Vec::with_capacity(HEADER_SIZE + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&checksum.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Decoder state machine for streaming frame parsing
///
/// Buffers incoming bytes and yields complete messages.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with default buffer capacity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet decoded
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to decode the next frame
    ///
    /// Returns:
    /// - `Ok(Some(msg))` if a complete frame was decoded
    /// - `Ok(None)` if more data is needed
    /// - `Err(TransportError::Serialization)` if the frame held bad JSON (frame consumed)
    /// - `Err(TransportError::ChecksumMismatch)` if checksum verification fails
    /// - `Err(TransportError::FrameTooLarge)` if the announced length is too big
    pub fn decode<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let available = self.available();

        if available < HEADER_SIZE {
            return Ok(None);
        }

        let header = &self.buffer[self.read_pos..self.read_pos + HEADER_SIZE];
        let len = read_u32(&header[..4]) as usize;
        let expected_checksum = read_u32(&header[4..]);

        if len > MAX_FRAME_SIZE {
            return Err(TransportError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        if available < HEADER_SIZE + len {
            return Ok(None);
        }

        let payload_start = self.read_pos + HEADER_SIZE;
        let payload_end = payload_start + len;
        let payload = &self.buffer[payload_start..payload_end];

        let actual_checksum = compute_checksum(payload);
        if actual_checksum != expected_checksum {
            return Err(TransportError::ChecksumMismatch {
                expected: expected_checksum,
                actual: actual_checksum,
            });
        }

        let parsed = serde_json::from_slice(payload);
        self.read_pos = payload_end;

        parsed
            .map(Some)
            .map_err(|e| TransportError::Serialization(e.to_string()))
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{BridgeRequest, RequestFrame, RequestId};

    fn invoke_frame(id: u64, operation: &str) -> RequestFrame {
        RequestFrame {
            id: RequestId(id),
            request: BridgeRequest::Invoke {
                operation: operation.to_string(),
                args_json: "[1,2]".to_string(),
            },
        }
    }

    fn raw_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = (payload.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&compute_checksum(payload).to_be_bytes());
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn test_decode_partial_header() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&[0, 0, 0, 5]); // Only length, no checksum

        let result: Result<Option<RequestFrame>, _> = decoder.decode();
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn test_decode_partial_payload() {
        let frame = invoke_frame(1, "greet");
        let encoded = encode(&frame).unwrap();

        let mut decoder = FrameDecoder::new();
        decoder.push(&encoded[..encoded.len() / 2]);

        let result: Result<Option<RequestFrame>, _> = decoder.decode();
        assert!(matches!(result, Ok(None)));

        decoder.push(&encoded[encoded.len() / 2..]);

        let decoded: RequestFrame = decoder.decode().unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_decode_multiple_frames() {
        let first = invoke_frame(1, "first");
        let second = RequestFrame {
            id: RequestId(2),
            request: BridgeRequest::GetManifest,
        };

        let mut encoded = encode(&first).unwrap();
        encoded.extend(encode(&second).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&encoded);

        let decoded1: RequestFrame = decoder.decode().unwrap().unwrap();
        let decoded2: RequestFrame = decoder.decode().unwrap().unwrap();
        let no_more: Option<RequestFrame> = decoder.decode().unwrap();

        assert_eq!(decoded1, first);
        assert_eq!(decoded2, second);
        assert!(no_more.is_none());
    }

    #[test]
    fn test_encode_too_large() {
        let frame = RequestFrame {
            id: RequestId(1),
            request: BridgeRequest::Invoke {
                operation: "big".to_string(),
                args_json: "x".repeat(MAX_FRAME_SIZE + 1),
            },
        };

        let result = encode(&frame);
        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_invalid_json_is_skipped() {
        let mut decoder = FrameDecoder::new();
        decoder.push(&raw_frame(b"not valid json"));
        decoder.push(&encode(&invoke_frame(9, "after")).unwrap());

        let result: Result<Option<RequestFrame>, _> = decoder.decode();
        assert!(matches!(result, Err(TransportError::Serialization(_))));

        // The bad frame was consumed; the next one decodes normally
        let next: RequestFrame = decoder.decode().unwrap().unwrap();
        assert_eq!(next.id, RequestId(9));
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut decoder = FrameDecoder::new();

        let huge_len = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        decoder.push(&huge_len);
        decoder.push(&[0u8; 4]);

        let result: Result<Option<RequestFrame>, _> = decoder.decode();
        assert!(matches!(result, Err(TransportError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_checksum_mismatch() {
        let mut decoder = FrameDecoder::new();

        let valid_json = br#"{"id":1,"request":"GetManifest"}"#;
        decoder.push(&(valid_json.len() as u32).to_be_bytes());
        decoder.push(&0xDEAD_BEEF_u32.to_be_bytes());
        decoder.push(valid_json);

        let result: Result<Option<RequestFrame>, _> = decoder.decode();
        assert!(matches!(
            result,
            Err(TransportError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum_changes_with_payload() {
        let encoded1 = encode(&invoke_frame(1, "hello")).unwrap();
        let encoded2 = encode(&invoke_frame(1, "world")).unwrap();

        assert_ne!(&encoded1[4..8], &encoded2[4..8]);
    }
}
