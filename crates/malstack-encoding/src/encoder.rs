use bytes::{BufMut, BytesMut};

use crate::element::Encodable;
use crate::error::EncodeResult;
use crate::format::WireFormat;
use crate::types::{Blob, Duration, FineTime, Identifier, Time, Uri};

/// Writes elements into a byte buffer using one [`WireFormat`].
///
/// Fallible writes are staged: if encoding a value fails, the buffer is
/// truncated back to where that value started.
pub struct Encoder<'a> {
    format: WireFormat,
    dst: &'a mut BytesMut,
}

impl<'a> Encoder<'a> {
    pub fn new(format: WireFormat, dst: &'a mut BytesMut) -> Self {
        Self { format, dst }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    /// Bytes written to the underlying buffer so far (including any written
    /// before this encoder was created).
    pub fn len(&self) -> usize {
        self.dst.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dst.is_empty()
    }

    pub fn encode_bool(&mut self, value: bool) {
        self.dst.put_u8(u8::from(value));
    }

    pub fn encode_octet(&mut self, value: i8) {
        self.dst.put_i8(value);
    }

    pub fn encode_uoctet(&mut self, value: u8) {
        self.dst.put_u8(value);
    }

    pub fn encode_short(&mut self, value: i16) {
        self.format.integers.put_i16(self.dst, value);
    }

    pub fn encode_ushort(&mut self, value: u16) {
        self.format.integers.put_u16(self.dst, value);
    }

    pub fn encode_integer(&mut self, value: i32) {
        self.format.integers.put_i32(self.dst, value);
    }

    pub fn encode_uinteger(&mut self, value: u32) {
        self.format.integers.put_u32(self.dst, value);
    }

    pub fn encode_long(&mut self, value: i64) {
        self.format.integers.put_i64(self.dst, value);
    }

    pub fn encode_ulong(&mut self, value: u64) {
        self.format.ulong.put(self.dst, value);
    }

    pub fn encode_float(&mut self, value: f32) {
        self.format.integers.put_f32(self.dst, value);
    }

    pub fn encode_double(&mut self, value: f64) {
        self.format.integers.put_f64(self.dst, value);
    }

    pub fn encode_string(&mut self, value: &str) -> EncodeResult<()> {
        self.put_length_prefixed("String", value.as_bytes())
    }

    pub fn encode_identifier(&mut self, value: &Identifier) -> EncodeResult<()> {
        self.put_length_prefixed("Identifier", value.as_str().as_bytes())
    }

    pub fn encode_uri(&mut self, value: &Uri) -> EncodeResult<()> {
        self.put_length_prefixed("URI", value.as_str().as_bytes())
    }

    pub fn encode_blob(&mut self, value: &Blob) -> EncodeResult<()> {
        self.put_length_prefixed("Blob", value.as_ref())
    }

    pub fn encode_time(&mut self, value: Time) -> EncodeResult<()> {
        self.format
            .time
            .put_millis(self.dst, "Time", value.as_millis())
    }

    pub fn encode_fine_time(&mut self, value: FineTime) -> EncodeResult<()> {
        self.format
            .time
            .put_millis(self.dst, "FineTime", value.as_millis())
    }

    pub fn encode_duration(&mut self, value: Duration) -> EncodeResult<()> {
        self.format.time.put_duration(self.dst, value.as_millis())
    }

    /// Write the one-byte presence flag used by every nullable field.
    pub fn encode_presence(&mut self, present: bool) {
        self.encode_bool(present);
    }

    /// Write an element directly, without a presence flag.
    pub fn encode_element<T: Encodable + ?Sized>(&mut self, value: &T) -> EncodeResult<()> {
        self.staged(|enc| value.encode(enc))
    }

    /// Write a presence flag followed by the element when it is present.
    pub fn encode_nullable<T: Encodable + ?Sized>(&mut self, value: Option<&T>) -> EncodeResult<()> {
        self.staged(|enc| match value {
            Some(value) => {
                enc.encode_presence(true);
                value.encode(enc)
            }
            None => {
                enc.encode_presence(false);
                Ok(())
            }
        })
    }

    /// Write a list: element count, then every element nullable-wrapped.
    pub fn encode_list<T: Encodable>(&mut self, items: &[T]) -> EncodeResult<()> {
        self.staged(|enc| {
            enc.encode_list_size(items.len())?;
            for item in items {
                enc.encode_nullable(Some(item))?;
            }
            Ok(())
        })
    }

    /// Write a list whose elements may be null.
    pub fn encode_nullable_list<T: Encodable>(&mut self, items: &[Option<T>]) -> EncodeResult<()> {
        self.staged(|enc| {
            enc.encode_list_size(items.len())?;
            for item in items {
                enc.encode_nullable(item.as_ref())?;
            }
            Ok(())
        })
    }

    /// Append bytes that are already encoded in this format.
    pub fn encode_raw(&mut self, bytes: &[u8]) {
        self.dst.put_slice(bytes);
    }

    fn encode_list_size(&mut self, len: usize) -> EncodeResult<()> {
        let size = u32::try_from(len).map_err(|_| crate::error::EncodeError::TooLong {
            kind: "List",
            len,
            max: u32::MAX as usize,
        })?;
        self.encode_uinteger(size);
        Ok(())
    }

    fn put_length_prefixed(&mut self, kind: &'static str, bytes: &[u8]) -> EncodeResult<()> {
        self.format.lengths.check(kind, bytes.len())?;
        self.format.lengths.put(self.dst, bytes.len());
        self.dst.put_slice(bytes);
        Ok(())
    }

    fn staged(&mut self, f: impl FnOnce(&mut Self) -> EncodeResult<()>) -> EncodeResult<()> {
        let mark = self.dst.len();
        let result = f(self);
        if result.is_err() {
            self.dst.truncate(mark);
        }
        result
    }
}
