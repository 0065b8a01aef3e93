//! Element traits and their implementations for the MO attribute types.

use std::fmt;

use crate::decoder::Decoder;
use crate::encoder::Encoder;
use crate::error::{DecodeResult, EncodeResult};
use crate::types::{Blob, Duration, FineTime, Identifier, Time, Uri};

/// A value that can write itself through an [`Encoder`].
///
/// Bounded by `Send + Sync` so message bodies can be shared with sender
/// threads.
pub trait Encodable: fmt::Debug + Send + Sync {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()>;
}

/// A value that can be read back through a [`Decoder`].
pub trait Decodable: Sized {
    fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self>;

    /// Read a presence flag and, if set, the value.
    fn decode_nullable(decoder: &mut Decoder<'_>) -> DecodeResult<Option<Self>> {
        if decoder.decode_presence()? {
            Self::decode(decoder).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Types that travel both ways.
pub trait Element: Encodable + Decodable {}

impl<T: Encodable + Decodable> Element for T {}

macro_rules! attribute {
    ($ty:ty, $encode:ident, $decode:ident) => {
        impl Encodable for $ty {
            fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
                encoder.$encode(*self);
                Ok(())
            }
        }

        impl Decodable for $ty {
            fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
                decoder.$decode()
            }
        }
    };
}

attribute!(bool, encode_bool, decode_bool);
attribute!(i8, encode_octet, decode_octet);
attribute!(u8, encode_uoctet, decode_uoctet);
attribute!(i16, encode_short, decode_short);
attribute!(u16, encode_ushort, decode_ushort);
attribute!(i32, encode_integer, decode_integer);
attribute!(u32, encode_uinteger, decode_uinteger);
attribute!(i64, encode_long, decode_long);
attribute!(u64, encode_ulong, decode_ulong);
attribute!(f32, encode_float, decode_float);
attribute!(f64, encode_double, decode_double);

impl Encodable for Time {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        encoder.encode_time(*self)
    }
}

impl Decodable for Time {
    fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
        decoder.decode_time()
    }
}

impl Encodable for FineTime {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        encoder.encode_fine_time(*self)
    }
}

impl Decodable for FineTime {
    fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
        decoder.decode_fine_time()
    }
}

impl Encodable for Duration {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        encoder.encode_duration(*self)
    }
}

impl Decodable for Duration {
    fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
        decoder.decode_duration()
    }
}

impl Encodable for Blob {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        encoder.encode_blob(self)
    }
}

impl Decodable for Blob {
    fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
        decoder.decode_blob()
    }
}

impl Encodable for str {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        encoder.encode_string(self)
    }
}

// String-like types accept a negative length prefix as a null marker in
// addition to the presence flag.
macro_rules! string_element {
    ($ty:ty, $encode:ident, $from:expr) => {
        impl Encodable for $ty {
            fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
                encoder.$encode(self)
            }
        }

        impl Decodable for $ty {
            fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
                decoder.decode_string().map($from)
            }

            fn decode_nullable(decoder: &mut Decoder<'_>) -> DecodeResult<Option<Self>> {
                if !decoder.decode_presence()? {
                    return Ok(None);
                }
                Ok(decoder.decode_optional_string()?.map($from))
            }
        }
    };
}

string_element!(String, encode_string, String::from);
string_element!(Identifier, encode_identifier, Identifier::from);
string_element!(Uri, encode_uri, Uri::from);

impl<T: Encodable> Encodable for Vec<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        encoder.encode_list(self)
    }
}

impl<T: Decodable> Decodable for Vec<T> {
    fn decode(decoder: &mut Decoder<'_>) -> DecodeResult<Self> {
        decoder.decode_list()
    }
}

impl<T: Encodable + ?Sized> Encodable for Box<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        (**self).encode(encoder)
    }
}

impl<T: Encodable + ?Sized> Encodable for std::sync::Arc<T> {
    fn encode(&self, encoder: &mut Encoder<'_>) -> EncodeResult<()> {
        (**self).encode(encoder)
    }
}
