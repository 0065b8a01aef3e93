use std::fmt;
use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};

use crate::error::{DecodeError, DecodeResult};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Widest varint accepted for a 64-bit value.
const MAX_VARINT_LEN: usize = 10;

enum Storage<'a> {
    Borrowed(&'a [u8]),
    Shared(Bytes),
    Owned(BytesMut),
}

impl Storage<'_> {
    fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Borrowed(buf) => buf,
            Storage::Shared(buf) => buf.as_ref(),
            Storage::Owned(buf) => buf.as_ref(),
        }
    }
}

/// A read cursor over an owned or borrowed byte buffer.
///
/// The cursor can also be backed by a [`Read`] source, in which case the
/// buffer is refilled on demand. Every read is all-or-nothing: a request for
/// more bytes than can be supplied returns [`DecodeError::Truncated`] and
/// leaves the offset untouched.
pub struct BufferCursor<'a> {
    storage: Storage<'a>,
    offset: usize,
    source: Option<Box<dyn Read + 'a>>,
}

impl<'a> BufferCursor<'a> {
    /// Cursor over a borrowed slice, starting at its first byte.
    pub fn new(buf: &'a [u8]) -> Self {
        Self::with_offset(buf, 0)
    }

    /// Cursor over a borrowed slice, starting at `offset` (clamped to the slice length).
    pub fn with_offset(buf: &'a [u8], offset: usize) -> Self {
        Self {
            offset: offset.min(buf.len()),
            storage: Storage::Borrowed(buf),
            source: None,
        }
    }

    /// Cursor over a shared, reference-counted buffer.
    pub fn from_bytes(buf: Bytes) -> Self {
        Self {
            storage: Storage::Shared(buf),
            offset: 0,
            source: None,
        }
    }

    /// Cursor that pulls bytes from `reader` as they are needed.
    pub fn from_reader(reader: impl Read + 'a) -> Self {
        Self {
            storage: Storage::Owned(BytesMut::with_capacity(READ_CHUNK_SIZE)),
            offset: 0,
            source: Some(Box::new(reader)),
        }
    }

    /// Current read offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of bytes buffered so far (the logical length).
    pub fn len(&self) -> usize {
        self.storage.as_slice().len()
    }

    /// True when no bytes are buffered at all.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes buffered but not yet consumed.
    pub fn remaining(&self) -> usize {
        self.len() - self.offset
    }

    /// Make sure at least `needed` unread bytes are buffered.
    pub fn ensure(&mut self, needed: usize) -> DecodeResult<()> {
        while self.remaining() < needed {
            if !self.fill()? {
                return Err(DecodeError::Truncated {
                    needed,
                    remaining: self.remaining(),
                });
            }
        }
        Ok(())
    }

    /// Look at the next `n` bytes without consuming them.
    pub fn peek(&mut self, n: usize) -> DecodeResult<&[u8]> {
        self.ensure(n)?;
        let start = self.offset;
        Ok(&self.storage.as_slice()[start..start + n])
    }

    /// Consume and return the next `n` bytes.
    pub fn read_slice(&mut self, n: usize) -> DecodeResult<&[u8]> {
        self.ensure(n)?;
        let start = self.offset;
        self.offset += n;
        Ok(&self.storage.as_slice()[start..start + n])
    }

    /// Consume the next `N` bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> DecodeResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_slice(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> DecodeResult<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a boolean byte. Only 0 and 1 are accepted.
    pub fn read_bool(&mut self) -> DecodeResult<bool> {
        let flag = self.peek(1)?[0];
        let value = match flag {
            0 => false,
            1 => true,
            other => return Err(DecodeError::InvalidFlag(other)),
        };
        self.offset += 1;
        Ok(value)
    }

    /// Read an unsigned LEB128 varint no wider than `max_bits`.
    ///
    /// The offset only moves once the whole varint has been validated.
    pub fn read_uvarint(&mut self, max_bits: u32) -> DecodeResult<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        let mut len = 0usize;
        loop {
            self.ensure(len + 1)?;
            let byte = self.storage.as_slice()[self.offset + len];
            len += 1;

            let bits = u64::from(byte & 0x7f);
            if len > MAX_VARINT_LEN || (shift > 0 && bits >> (64 - shift) != 0) {
                return Err(DecodeError::VarintOverflow(max_bits));
            }
            value |= bits << shift;

            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }

        if max_bits < 64 && value >> max_bits != 0 {
            return Err(DecodeError::VarintOverflow(max_bits));
        }

        self.offset += len;
        Ok(value)
    }

    /// Consume everything left, draining the backing stream if there is one.
    pub fn read_to_end(&mut self) -> DecodeResult<Bytes> {
        while self.fill()? {}
        let start = self.offset;
        self.offset = self.len();
        Ok(Bytes::copy_from_slice(&self.storage.as_slice()[start..]))
    }

    /// Move the offset back to a previously observed position.
    pub(crate) fn rewind(&mut self, mark: usize) {
        debug_assert!(mark <= self.offset, "rewind past current offset");
        self.offset = mark;
    }

    /// Pull one chunk from the backing stream. Returns false at end of input.
    fn fill(&mut self) -> DecodeResult<bool> {
        let Some(source) = self.source.as_mut() else {
            return Ok(false);
        };

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let read = loop {
            match source.read(&mut chunk) {
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(DecodeError::Io(err)),
            }
        };

        if read == 0 {
            self.source = None;
            return Ok(false);
        }

        match &mut self.storage {
            Storage::Owned(buf) => buf.extend_from_slice(&chunk[..read]),
            other => {
                let mut owned = BytesMut::with_capacity(other.as_slice().len() + read);
                owned.extend_from_slice(other.as_slice());
                owned.extend_from_slice(&chunk[..read]);
                *other = Storage::Owned(owned);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for BufferCursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferCursor")
            .field("offset", &self.offset)
            .field("len", &self.len())
            .field("streaming", &self.source.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn truncated_read_keeps_offset() {
        let data = [1u8, 2, 3];
        let mut cursor = BufferCursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 1);

        let err = cursor.read_slice(5).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                needed: 5,
                remaining: 2
            }
        ));
        assert_eq!(cursor.offset(), 1);
        assert_eq!(cursor.read_slice(2).unwrap(), &[2, 3]);
    }

    #[test]
    fn with_offset_is_clamped() {
        let data = [9u8; 4];
        let cursor = BufferCursor::with_offset(&data, 10);
        assert_eq!(cursor.offset(), 4);
        assert_eq!(cursor.remaining(), 0);
    }

    #[test]
    fn read_bool_rejects_other_values() {
        let data = [1u8, 0, 7];
        let mut cursor = BufferCursor::new(&data);
        assert!(cursor.read_bool().unwrap());
        assert!(!cursor.read_bool().unwrap());
        assert!(matches!(
            cursor.read_bool(),
            Err(DecodeError::InvalidFlag(7))
        ));
        assert_eq!(cursor.offset(), 2);
    }

    #[test]
    fn uvarint_decodes_multi_byte_values() {
        let data = [0xAC, 0x02, 0x7F];
        let mut cursor = BufferCursor::new(&data);
        assert_eq!(cursor.read_uvarint(32).unwrap(), 300);
        assert_eq!(cursor.read_uvarint(32).unwrap(), 127);
    }

    #[test]
    fn uvarint_truncated_keeps_offset() {
        let data = [0x80, 0x80];
        let mut cursor = BufferCursor::new(&data);
        assert!(matches!(
            cursor.read_uvarint(64),
            Err(DecodeError::Truncated { .. })
        ));
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn uvarint_rejects_values_wider_than_target() {
        // 65536 does not fit in 16 bits.
        let data = [0x80, 0x80, 0x04];
        let mut cursor = BufferCursor::new(&data);
        assert!(matches!(
            cursor.read_uvarint(16),
            Err(DecodeError::VarintOverflow(16))
        ));
        assert_eq!(cursor.offset(), 0);
    }

    #[test]
    fn uvarint_accepts_u64_max_and_rejects_eleven_bytes() {
        let max = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01];
        let mut cursor = BufferCursor::new(&max);
        assert_eq!(cursor.read_uvarint(64).unwrap(), u64::MAX);

        let too_wide = [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x02];
        let mut cursor = BufferCursor::new(&too_wide);
        assert!(matches!(
            cursor.read_uvarint(64),
            Err(DecodeError::VarintOverflow(64))
        ));
    }

    #[test]
    fn reader_backed_cursor_refills_on_demand() {
        let payload: Vec<u8> = (0..=255u8).cycle().take(20_000).collect();
        let mut cursor = BufferCursor::from_reader(Cursor::new(payload.clone()));

        let head = cursor.read_slice(10_000).unwrap().to_vec();
        assert_eq!(head, payload[..10_000]);
        let rest = cursor.read_to_end().unwrap();
        assert_eq!(rest.as_ref(), &payload[10_000..]);
        assert!(matches!(
            cursor.read_u8(),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn shared_buffer_read_to_end() {
        let mut cursor = BufferCursor::from_bytes(Bytes::from_static(b"abcdef"));
        cursor.read_slice(2).unwrap();
        assert_eq!(cursor.read_to_end().unwrap().as_ref(), b"cdef");
        assert_eq!(cursor.remaining(), 0);
    }
}
