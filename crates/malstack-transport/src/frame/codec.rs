use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Frame header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "MO" (0x4D 0x4F).
pub const MAGIC: [u8; 2] = [0x4D, 0x4F];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Append one framed payload to `dst`.
///
/// ```text
/// ┌──────────────┬───────────┬──────────────────┐
/// │ Magic (2B)   │ Length    │ Payload          │
/// │ 0x4D 0x4F    │ (4B LE)   │ (Length bytes)   │
/// └──────────────┴───────────┴──────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<(), FrameError> {
    if payload.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Take one complete frame off the front of `src`.
///
/// Returns `Ok(None)` while the buffer holds less than a whole frame.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Bytes>, FrameError> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let payload_len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    Ok(Some(src.split_to(payload_len).freeze()))
}

/// Limits for framed socket streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
    /// Read timeout in milliseconds for blocking reads.
    pub read_timeout_ms: Option<u64>,
    /// Write timeout in milliseconds for blocking writes.
    pub write_timeout_ms: Option<u64>,
}

impl FrameConfig {
    pub fn read_timeout(&self) -> Option<std::time::Duration> {
        self.read_timeout_ms.map(std::time::Duration::from_millis)
    }

    pub fn write_timeout(&self) -> Option<std::time::Duration> {
        self.write_timeout_ms.map(std::time::Duration::from_millis)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            read_timeout_ms: None,
            write_timeout_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_on_boundaries() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"", &mut buf).unwrap();
        encode_frame(b"third", &mut buf).unwrap();
        assert_eq!(buf.len(), 3 * HEADER_SIZE + 10);

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        let f3 = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().unwrap();
        assert_eq!(f1.as_ref(), b"first");
        assert!(f2.is_empty());
        assert_eq!(f3.as_ref(), b"third");
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), HEADER_SIZE + 2);

        let mut short = BytesMut::from(&MAGIC[..]);
        assert!(decode_frame(&mut short, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_magic_and_oversize() {
        let mut bad = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0][..]);
        assert!(matches!(
            decode_frame(&mut bad, DEFAULT_MAX_PAYLOAD),
            Err(FrameError::InvalidMagic)
        ));

        let mut big = BytesMut::new();
        big.put_slice(&MAGIC);
        big.put_u32_le(1024);
        assert!(matches!(
            decode_frame(&mut big, 16),
            Err(FrameError::PayloadTooLarge { size: 1024, max: 16 })
        ));
    }
}
