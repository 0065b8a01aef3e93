use std::io::Read;
use std::marker::PhantomData;

use bytes::Bytes;

use crate::buffer::BufferCursor;
use crate::element::Decodable;
use crate::error::{DecodeError, DecodeResult};
use crate::format::WireFormat;
use crate::types::{Blob, Duration, FineTime, Identifier, Time, Uri};

/// Reads elements from a [`BufferCursor`] using one [`WireFormat`].
///
/// Every `decode_*` call either returns a complete value or fails with the
/// cursor where it was before the call.
pub struct Decoder<'a> {
    format: WireFormat,
    cursor: BufferCursor<'a>,
}

impl<'a> Decoder<'a> {
    pub fn new(format: WireFormat, src: &'a [u8]) -> Self {
        Self::with_cursor(format, BufferCursor::new(src))
    }

    /// Decoder starting `offset` bytes into `src`.
    pub fn with_offset(format: WireFormat, src: &'a [u8], offset: usize) -> Self {
        Self::with_cursor(format, BufferCursor::with_offset(src, offset))
    }

    pub fn from_bytes(format: WireFormat, src: Bytes) -> Self {
        Self::with_cursor(format, BufferCursor::from_bytes(src))
    }

    /// Decoder pulling from a byte stream.
    pub fn from_reader(format: WireFormat, reader: impl Read + 'a) -> Self {
        Self::with_cursor(format, BufferCursor::from_reader(reader))
    }

    pub fn with_cursor(format: WireFormat, cursor: BufferCursor<'a>) -> Self {
        Self { format, cursor }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn cursor(&self) -> &BufferCursor<'a> {
        &self.cursor
    }

    pub fn into_cursor(self) -> BufferCursor<'a> {
        self.cursor
    }

    /// Everything not yet decoded.
    pub fn read_remaining(&mut self) -> DecodeResult<Bytes> {
        self.cursor.read_to_end()
    }

    pub fn decode_bool(&mut self) -> DecodeResult<bool> {
        self.cursor.read_bool()
    }

    pub fn decode_octet(&mut self) -> DecodeResult<i8> {
        Ok(self.cursor.read_u8()? as i8)
    }

    pub fn decode_uoctet(&mut self) -> DecodeResult<u8> {
        self.cursor.read_u8()
    }

    pub fn decode_short(&mut self) -> DecodeResult<i16> {
        self.format.integers.get_i16(&mut self.cursor)
    }

    pub fn decode_ushort(&mut self) -> DecodeResult<u16> {
        self.format.integers.get_u16(&mut self.cursor)
    }

    pub fn decode_integer(&mut self) -> DecodeResult<i32> {
        self.format.integers.get_i32(&mut self.cursor)
    }

    pub fn decode_uinteger(&mut self) -> DecodeResult<u32> {
        self.format.integers.get_u32(&mut self.cursor)
    }

    pub fn decode_long(&mut self) -> DecodeResult<i64> {
        self.format.integers.get_i64(&mut self.cursor)
    }

    pub fn decode_ulong(&mut self) -> DecodeResult<u64> {
        self.format.ulong.get(&mut self.cursor)
    }

    pub fn decode_float(&mut self) -> DecodeResult<f32> {
        self.format.integers.get_f32(&mut self.cursor)
    }

    pub fn decode_double(&mut self) -> DecodeResult<f64> {
        self.format.integers.get_f64(&mut self.cursor)
    }

    pub fn decode_string(&mut self) -> DecodeResult<String> {
        self.atomically(|dec| {
            let len = dec.read_length()?;
            dec.read_utf8(len)
        })
    }

    pub fn decode_identifier(&mut self) -> DecodeResult<Identifier> {
        self.decode_string().map(Identifier::from)
    }

    pub fn decode_uri(&mut self) -> DecodeResult<Uri> {
        self.decode_string().map(Uri::from)
    }

    pub fn decode_blob(&mut self) -> DecodeResult<Blob> {
        self.atomically(|dec| {
            let len = dec.read_length()?;
            let bytes = dec.cursor.read_slice(len)?;
            Ok(Blob::new(Bytes::copy_from_slice(bytes)))
        })
    }

    pub fn decode_time(&mut self) -> DecodeResult<Time> {
        self.format
            .time
            .get_millis(&mut self.cursor)
            .map(Time::from_millis)
    }

    pub fn decode_fine_time(&mut self) -> DecodeResult<FineTime> {
        self.format
            .time
            .get_millis(&mut self.cursor)
            .map(FineTime::from_millis)
    }

    pub fn decode_duration(&mut self) -> DecodeResult<Duration> {
        self.format
            .time
            .get_duration(&mut self.cursor)
            .map(Duration::from_millis)
    }

    /// Read the presence flag in front of a nullable field.
    pub fn decode_presence(&mut self) -> DecodeResult<bool> {
        self.cursor.read_bool()
    }

    pub fn decode_element<T: Decodable>(&mut self) -> DecodeResult<T> {
        self.atomically(T::decode)
    }

    /// Read a presence flag and, if set, the element behind it.
    pub fn decode_nullable<T: Decodable>(&mut self) -> DecodeResult<Option<T>> {
        self.atomically(T::decode_nullable)
    }

    /// Start reading a list of `T` from the current position.
    pub fn list_decoder<T: Decodable>(&mut self) -> DecodeResult<ListDecoder<'_, 'a, T>> {
        let size = self.decode_uinteger()? as usize;
        Ok(ListDecoder {
            decoder: self,
            remaining: size,
            size,
            _element: PhantomData,
        })
    }

    /// Read a whole list whose elements must all be present.
    pub fn decode_list<T: Decodable>(&mut self) -> DecodeResult<Vec<T>> {
        self.atomically(|dec| {
            let mut list = dec.list_decoder::<T>()?;
            let mut items = Vec::with_capacity(list.size().min(1024));
            for item in &mut list {
                items.push(item?.ok_or(DecodeError::NullElement)?);
            }
            Ok(items)
        })
    }

    /// Read a whole list keeping null elements.
    pub fn decode_nullable_list<T: Decodable>(&mut self) -> DecodeResult<Vec<Option<T>>> {
        self.atomically(|dec| dec.list_decoder::<T>()?.collect())
    }

    /// String-like field that may carry a null length marker. Formats
    /// without such a marker always yield `Some`.
    pub(crate) fn decode_optional_string(&mut self) -> DecodeResult<Option<String>> {
        self.atomically(|dec| match dec.format.lengths.get(&mut dec.cursor)? {
            Some(len) => dec.read_utf8(len).map(Some),
            None => Ok(None),
        })
    }

    fn read_utf8(&mut self, len: usize) -> DecodeResult<String> {
        let bytes = self.cursor.read_slice(len)?;
        Ok(std::str::from_utf8(bytes)?.to_owned())
    }

    fn read_length(&mut self) -> DecodeResult<usize> {
        let mark = self.cursor.offset();
        match self.format.lengths.get(&mut self.cursor)? {
            Some(len) => Ok(len),
            None => {
                // Only signed prefixes can be negative; report the raw value.
                self.cursor.rewind(mark);
                let raw: [u8; 2] = self.cursor.peek(2)?.try_into().unwrap_or_default();
                Err(DecodeError::NegativeLength(i64::from(i16::from_be_bytes(raw))))
            }
        }
    }

    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> DecodeResult<T>,
    ) -> DecodeResult<T> {
        let mark = self.cursor.offset();
        let result = f(self);
        if result.is_err() {
            self.cursor.rewind(mark);
        }
        result
    }
}

/// Iterates over the elements of an encoded list, in encoded order.
///
/// Reads from the parent decoder's cursor, so after the last element the
/// parent continues right behind the list.
pub struct ListDecoder<'d, 'a, T> {
    decoder: &'d mut Decoder<'a>,
    remaining: usize,
    size: usize,
    _element: PhantomData<fn() -> T>,
}

impl<T: Decodable> ListDecoder<'_, '_, T> {
    /// Number of elements the list was encoded with.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn has_next_element(&self) -> bool {
        self.remaining > 0
    }
}

impl<T: Decodable> Iterator for ListDecoder<'_, '_, T> {
    type Item = DecodeResult<Option<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let item = self.decoder.decode_nullable::<T>();
        match item {
            Ok(_) => self.remaining -= 1,
            // Stop after a failure; the cursor sits at the bad element.
            Err(_) => self.remaining = 0,
        }
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{BINARY, FIXED, SPP};

    #[test]
    fn null_flag_consumes_one_byte_for_any_type() {
        let data = [0x00, 0xAA, 0xBB];
        for format in WireFormat::ALL {
            let mut dec = Decoder::new(format, &data);
            assert_eq!(dec.decode_nullable::<Time>().unwrap(), None);
            assert_eq!(dec.cursor().offset(), 1);

            let mut dec = Decoder::new(format, &data);
            assert_eq!(dec.decode_nullable::<String>().unwrap(), None);
            assert_eq!(dec.cursor().offset(), 1);

            let mut dec = Decoder::new(format, &data);
            assert_eq!(dec.decode_nullable::<Vec<u64>>().unwrap(), None);
            assert_eq!(dec.cursor().offset(), 1);
        }
    }

    #[test]
    fn spp_time_example() {
        let data = [0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let mut dec = Decoder::new(SPP, &data);
        assert_eq!(dec.decode_time().unwrap(), Time::from_millis(1000));
    }

    #[test]
    fn spp_string_length_prefix() {
        let data = [0x00, 0x05, b'h', b'e', b'l', b'l', b'o', 0x00, 0x00];
        let mut dec = Decoder::new(SPP, &data);
        assert_eq!(dec.decode_string().unwrap(), "hello");
        assert_eq!(dec.decode_string().unwrap(), "");
        assert_eq!(dec.cursor().remaining(), 0);
    }

    #[test]
    fn spp_negative_length_is_null_only_for_nullable_strings() {
        let data = [0x01, 0xFF, 0xFF];
        let mut dec = Decoder::new(SPP, &data);
        assert_eq!(dec.decode_nullable::<String>().unwrap(), None);
        assert_eq!(dec.cursor().offset(), 3);

        let mut dec = Decoder::new(SPP, &data[1..]);
        assert!(matches!(
            dec.decode_string(),
            Err(DecodeError::NegativeLength(-1))
        ));
        assert_eq!(dec.cursor().offset(), 0);

        let mut dec = Decoder::new(SPP, &data[1..]);
        assert!(matches!(
            dec.decode_blob(),
            Err(DecodeError::NegativeLength(-1))
        ));
        assert_eq!(dec.cursor().offset(), 0);
    }

    #[test]
    fn truncated_string_does_not_move_cursor() {
        let data = [0x00, 0x00, 0x00, 0x09, b'a', b'b'];
        let mut dec = Decoder::new(FIXED, &data);
        assert!(matches!(
            dec.decode_string(),
            Err(DecodeError::Truncated { .. })
        ));
        assert_eq!(dec.cursor().offset(), 0);
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let data = [0x02, 0xC3, 0x28];
        let mut dec = Decoder::new(BINARY, &data);
        assert!(matches!(
            dec.decode_string(),
            Err(DecodeError::InvalidUtf8(_))
        ));
        assert_eq!(dec.cursor().offset(), 0);
    }

    #[test]
    fn list_decoder_yields_in_order_and_leaves_cursor_after_list() {
        // [size=3][1,"a"][0][1,"c"] then a trailing UOctet.
        let data = [0x03, 0x01, 0x01, b'a', 0x00, 0x01, 0x01, b'c', 0x2A];
        let mut dec = Decoder::new(BINARY, &data);
        {
            let list = dec.list_decoder::<String>().unwrap();
            assert_eq!(list.size(), 3);
            let items: Vec<Option<String>> = list.map(|item| item.unwrap()).collect();
            assert_eq!(
                items,
                vec![Some("a".to_string()), None, Some("c".to_string())]
            );
        }
        assert_eq!(dec.decode_uoctet().unwrap(), 0x2A);
    }

    #[test]
    fn decode_list_rejects_null_elements() {
        let data = [0x02, 0x01, 0x05, 0x00];
        let mut dec = Decoder::new(BINARY, &data);
        assert!(matches!(
            dec.decode_list::<u32>(),
            Err(DecodeError::NullElement)
        ));
        assert_eq!(dec.cursor().offset(), 0);
    }

    #[test]
    fn decodes_from_offset() {
        let data = [0xEE, 0xEE, 0x00, 0x2A];
        let mut dec = Decoder::with_offset(FIXED, &data, 2);
        assert_eq!(dec.decode_ushort().unwrap(), 42);
    }

    #[test]
    fn decodes_from_reader() {
        let data = vec![0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07];
        let mut dec = Decoder::from_reader(FIXED, std::io::Cursor::new(data));
        assert_eq!(dec.decode_nullable::<u64>().unwrap(), Some(7));
    }
}
