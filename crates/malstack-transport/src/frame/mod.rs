//! Length-prefixed framing for encoded messages on byte streams.
//!
//! Every encoded message travels as:
//! - A 2-byte magic number ("MO") for stream synchronization
//! - A 4-byte little-endian payload length
//! - The payload
//!
//! The payload is the message exactly as produced by the encoder.

pub mod codec;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC};
pub use reader::FrameReader;
pub use writer::FrameWriter;
