//! Element encodings for MO messages.
//!
//! Three wire formats share one type surface:
//! - `binary`: variable-length integers and length prefixes
//! - `fixed`: fixed-width big-endian fields
//! - `spp`: the fixed format with 2-byte signed lengths, a padded unsigned
//!   64-bit layout and CUC(4,3) time fields
//!
//! Reads and writes are all-or-nothing per value.

pub mod buffer;
pub mod decoder;
pub mod element;
pub mod encoder;
pub mod error;
pub mod format;
pub mod stream;
pub mod types;

pub use buffer::BufferCursor;
pub use decoder::{Decoder, ListDecoder};
pub use element::{Decodable, Element, Encodable};
pub use encoder::Encoder;
pub use error::{DecodeError, DecodeResult, EncodeError, EncodeResult, UnknownEncoding};
pub use format::{IntegerLayout, LengthPrefix, TimeLayout, ULongLayout, WireFormat, BINARY, FIXED, SPP};
pub use stream::{ElementInputStream, ElementOutputStream, StreamFactory};
pub use types::{Blob, Duration, FineTime, Identifier, Time, Uri};
