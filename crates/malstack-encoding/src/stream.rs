//! Element streams and the encoding selector.

use std::io::{ErrorKind, Read, Write};

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::decoder::Decoder;
use crate::element::{Decodable, Encodable};
use crate::encoder::Encoder;
use crate::error::{DecodeResult, EncodeResult, UnknownEncoding};
use crate::format::WireFormat;

/// Writes a header followed by body elements to `W`.
///
/// The header is written as-is; every other element is nullable-wrapped.
/// Encoded bytes are buffered until [`ElementOutputStream::flush`].
pub struct ElementOutputStream<W: Write> {
    format: WireFormat,
    buf: BytesMut,
    inner: W,
}

impl<W: Write> ElementOutputStream<W> {
    pub fn new(format: WireFormat, inner: W) -> Self {
        Self {
            format,
            buf: BytesMut::new(),
            inner,
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn write_header<T: Encodable + ?Sized>(&mut self, header: &T) -> EncodeResult<()> {
        Encoder::new(self.format, &mut self.buf).encode_element(header)
    }

    pub fn write_element<T: Encodable + ?Sized>(&mut self, element: Option<&T>) -> EncodeResult<()> {
        Encoder::new(self.format, &mut self.buf).encode_nullable(element)
    }

    /// Append bytes already encoded in this stream's format.
    pub fn write_encoded(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered and not yet flushed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Push everything buffered to the inner writer.
    pub fn flush(&mut self) -> EncodeResult<()> {
        let mut written = 0usize;
        while written < self.buf.len() {
            match self.inner.write(&self.buf[written..]) {
                Ok(0) => {
                    let _ = self.buf.split_to(written);
                    return Err(std::io::Error::new(
                        ErrorKind::WriteZero,
                        "element stream writer accepted no bytes",
                    )
                    .into());
                }
                Ok(n) => written += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => {
                    let _ = self.buf.split_to(written);
                    return Err(err.into());
                }
            }
        }
        self.buf.clear();
        self.inner.flush()?;
        trace!(bytes = written, format = %self.format, "flushed element stream");
        Ok(())
    }

    /// Flush and hand back the inner writer.
    pub fn into_inner(mut self) -> EncodeResult<W> {
        self.flush()?;
        Ok(self.inner)
    }
}

/// Reads a header followed by nullable body elements.
pub struct ElementInputStream<'a> {
    decoder: Decoder<'a>,
}

impl<'a> ElementInputStream<'a> {
    pub fn new(decoder: Decoder<'a>) -> Self {
        Self { decoder }
    }

    pub fn read_header<T: Decodable>(&mut self) -> DecodeResult<T> {
        self.decoder.decode_element()
    }

    pub fn read_element<T: Decodable>(&mut self) -> DecodeResult<Option<T>> {
        self.decoder.decode_nullable()
    }

    /// Bytes buffered and not yet read.
    pub fn remaining(&self) -> usize {
        self.decoder.cursor().remaining()
    }

    /// Everything after the elements read so far.
    pub fn remaining_bytes(&mut self) -> DecodeResult<Bytes> {
        self.decoder.read_remaining()
    }

    pub fn decoder(&mut self) -> &mut Decoder<'a> {
        &mut self.decoder
    }

    pub fn into_decoder(self) -> Decoder<'a> {
        self.decoder
    }
}

/// Creates element streams for one wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFactory {
    format: WireFormat,
}

impl StreamFactory {
    pub fn new(format: WireFormat) -> Self {
        Self { format }
    }

    /// Select a built-in encoding by name: `binary`, `fixed` or `spp`.
    pub fn for_name(name: &str) -> Result<Self, UnknownEncoding> {
        WireFormat::by_name(name).map(Self::new)
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn output_stream<W: Write>(&self, inner: W) -> ElementOutputStream<W> {
        ElementOutputStream::new(self.format, inner)
    }

    /// Input stream over `src`, starting `offset` bytes in.
    pub fn input_stream<'a>(&self, src: &'a [u8], offset: usize) -> ElementInputStream<'a> {
        ElementInputStream::new(Decoder::with_offset(self.format, src, offset))
    }

    pub fn input_bytes(&self, src: Bytes) -> ElementInputStream<'static> {
        ElementInputStream::new(Decoder::from_bytes(self.format, src))
    }

    pub fn input_reader<'a>(&self, reader: impl Read + 'a) -> ElementInputStream<'a> {
        ElementInputStream::new(Decoder::from_reader(self.format, reader))
    }

    /// Encode one element on its own, without a presence flag.
    pub fn encode<T: Encodable + ?Sized>(&self, value: &T) -> EncodeResult<Bytes> {
        let mut buf = BytesMut::new();
        Encoder::new(self.format, &mut buf).encode_element(value)?;
        Ok(buf.freeze())
    }

    /// Decode one element written by [`StreamFactory::encode`].
    pub fn decode<T: Decodable>(&self, src: &[u8]) -> DecodeResult<T> {
        Decoder::new(self.format, src).decode_element()
    }
}
