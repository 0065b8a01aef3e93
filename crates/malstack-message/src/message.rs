use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use malstack_encoding::{Blob, Decodable, ElementInputStream, Encodable, StreamFactory};
use tracing::trace;

use crate::error::Result;
use crate::header::MessageHeader;

/// One body element; `None` is encoded as a null.
pub type BodyPart = Option<Arc<dyn Encodable>>;

/// Wrap an owned value as a present body part.
pub fn body_part<T: Encodable + 'static>(value: T) -> BodyPart {
    Some(Arc::new(value) as Arc<dyn Encodable>)
}

/// Transport-level properties attached to a message. Not written on the wire.
pub type QosProperties = BTreeMap<String, String>;

/// Message body: typed parts, or bytes already encoded by someone else.
#[derive(Clone)]
pub enum MessageBody {
    Parts(Vec<BodyPart>),
    Encoded(Bytes),
}

impl MessageBody {
    pub fn empty() -> Self {
        MessageBody::Parts(Vec::new())
    }

    /// Convenience for bodies built from owned values.
    pub fn from_parts<I, T>(parts: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Encodable + 'static,
    {
        MessageBody::Parts(parts.into_iter().map(body_part).collect())
    }
}

impl Default for MessageBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for MessageBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageBody::Parts(parts) => f.debug_tuple("Parts").field(parts).finish(),
            MessageBody::Encoded(bytes) => write!(f, "Encoded(<{} bytes>)", bytes.len()),
        }
    }
}

/// A header, a body and QoS properties.
///
/// Cloning shares the body parts.
#[derive(Debug, Clone)]
pub struct Message {
    header: MessageHeader,
    body: MessageBody,
    qos_properties: QosProperties,
    wrap_body_parts: bool,
}

impl Message {
    /// With `wrap_body_parts`, every body part is encoded on its own and
    /// written as a nullable Blob.
    pub fn new(
        header: MessageHeader,
        body: MessageBody,
        qos_properties: QosProperties,
        wrap_body_parts: bool,
    ) -> Self {
        Self {
            header,
            body,
            qos_properties,
            wrap_body_parts,
        }
    }

    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    pub fn body(&self) -> &MessageBody {
        &self.body
    }

    pub fn qos_properties(&self) -> &QosProperties {
        &self.qos_properties
    }

    pub fn wrap_body_parts(&self) -> bool {
        self.wrap_body_parts
    }

    /// Header followed by body.
    pub fn encode(&self, factory: &StreamFactory) -> Result<Bytes> {
        let mut out = factory.output_stream(Vec::new());
        out.write_header(&self.header)?;
        out.write_encoded(&self.encoded_body(factory)?);
        let bytes = Bytes::from(out.into_inner()?);
        trace!(
            bytes = bytes.len(),
            to = %self.header.uri_to(),
            format = %factory.format(),
            "encoded message"
        );
        Ok(bytes)
    }

    /// Read the header; the rest is kept as an encoded body.
    pub fn decode(factory: &StreamFactory, src: Bytes, wrap_body_parts: bool) -> Result<Self> {
        let mut input = factory.input_bytes(src);
        let header: MessageHeader = input.read_header()?;
        let body = input.remaining_bytes()?;
        Ok(Self {
            header,
            body: MessageBody::Encoded(body),
            qos_properties: QosProperties::new(),
            wrap_body_parts,
        })
    }

    /// Body bytes as they appear after the header.
    pub fn encoded_body(&self, factory: &StreamFactory) -> Result<Bytes> {
        let parts = match &self.body {
            MessageBody::Encoded(bytes) => return Ok(bytes.clone()),
            MessageBody::Parts(parts) => parts,
        };

        let mut out = factory.output_stream(Vec::new());
        for part in parts {
            if self.wrap_body_parts {
                let wrapped = part
                    .as_deref()
                    .map(|value| factory.encode(value).map(Blob::new))
                    .transpose()?;
                out.write_element(wrapped.as_ref())?;
            } else {
                out.write_element(part.as_deref())?;
            }
        }
        Ok(Bytes::from(out.into_inner()?))
    }

    /// Sequential reader over the body parts.
    pub fn body_reader(&self, factory: &StreamFactory) -> Result<BodyReader> {
        Ok(BodyReader {
            input: factory.input_bytes(self.encoded_body(factory)?),
            factory: *factory,
            wrapped: self.wrap_body_parts,
        })
    }
}

/// Reads body parts in order, unwrapping Blob-wrapped parts.
pub struct BodyReader {
    input: ElementInputStream<'static>,
    factory: StreamFactory,
    wrapped: bool,
}

impl BodyReader {
    pub fn read_part<T: Decodable>(&mut self) -> Result<Option<T>> {
        if !self.wrapped {
            return Ok(self.input.read_element()?);
        }
        match self.input.read_element::<Blob>()? {
            Some(blob) => Ok(Some(self.factory.decode(blob.as_ref())?)),
            None => Ok(None),
        }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.input.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderFields;
    use malstack_encoding::{Identifier, Time, Uri, BINARY, SPP};

    fn header() -> MessageHeader {
        MessageHeader::new(
            Uri::new("maluds:///tmp/a.sock/app"),
            HeaderFields {
                uri_to: Uri::new("maluds:///tmp/b.sock/app"),
                ..HeaderFields::default()
            },
        )
        .expect("header")
    }

    fn body() -> MessageBody {
        MessageBody::Parts(vec![
            body_part(String::from("status")),
            None,
            body_part(Time::from_millis(3_000)),
            body_part(vec![Identifier::new("x")]),
        ])
    }

    #[test]
    fn body_parts_roundtrip_plain_and_wrapped() {
        for wrap in [false, true] {
            for factory in [StreamFactory::new(BINARY), StreamFactory::new(SPP)] {
                let msg = Message::new(header(), body(), QosProperties::new(), wrap);
                let bytes = msg.encode(&factory).expect("encode");

                let decoded = Message::decode(&factory, bytes, wrap).expect("decode");
                assert_eq!(decoded.header(), msg.header());

                let mut reader = decoded.body_reader(&factory).expect("reader");
                assert_eq!(reader.read_part::<String>().unwrap().as_deref(), Some("status"));
                assert_eq!(reader.read_part::<u8>().unwrap(), None);
                assert_eq!(
                    reader.read_part::<Time>().unwrap(),
                    Some(Time::from_millis(3_000))
                );
                assert_eq!(
                    reader.read_part::<Vec<Identifier>>().unwrap(),
                    Some(vec![Identifier::new("x")])
                );
                assert_eq!(reader.remaining(), 0);
            }
        }
    }

    #[test]
    fn wrapped_parts_are_blobs_on_the_wire() {
        let factory = StreamFactory::new(BINARY);
        let msg = Message::new(
            header(),
            MessageBody::from_parts([7u32]),
            QosProperties::new(),
            true,
        );
        // present flag, blob length 1, uinteger 7
        assert_eq!(msg.encoded_body(&factory).unwrap().as_ref(), &[0x01, 0x01, 0x07]);
    }

    #[test]
    fn encoded_body_is_passed_through() {
        let factory = StreamFactory::new(SPP);
        let raw = Bytes::from_static(&[0x01, 0x2A]);
        let msg = Message::new(
            header(),
            MessageBody::Encoded(raw.clone()),
            QosProperties::new(),
            false,
        );
        let bytes = msg.encode(&factory).unwrap();
        assert!(bytes.ends_with(&raw));

        let decoded = Message::decode(&factory, bytes, false).unwrap();
        let mut reader = decoded.body_reader(&factory).unwrap();
        assert_eq!(reader.read_part::<u8>().unwrap(), Some(42));
    }

    #[test]
    fn encoded_body_debug_shows_size_only() {
        let body = MessageBody::Encoded(Bytes::from_static(b"secret"));
        assert_eq!(format!("{body:?}"), "Encoded(<6 bytes>)");
    }
}
