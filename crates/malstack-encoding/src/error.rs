/// Errors raised while decoding elements from a buffer.
///
/// A decode error never leaves the cursor part-way through a value: the
/// offset is where it was before the failed read.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before the value was complete.
    #[error("buffer truncated ({needed} bytes needed, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// A presence flag or boolean byte was neither 0 nor 1.
    #[error("invalid presence flag {0:#04x}")]
    InvalidFlag(u8),

    /// A string field did not contain valid UTF-8.
    #[error("invalid UTF-8 in string field: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A variable-length integer ran past the width of its target type.
    #[error("variable-length integer exceeds {0} bits")]
    VarintOverflow(u32),

    /// A negative length prefix was read for a field that cannot be null.
    #[error("negative length {0} for non-nullable field")]
    NegativeLength(i64),

    /// An enumeration ordinal had no matching variant.
    #[error("invalid {kind} ordinal {ordinal}")]
    InvalidEnum { kind: &'static str, ordinal: u8 },

    /// A decoded value does not fit the target type.
    #[error("{kind} value {value} out of range")]
    OutOfRange { kind: &'static str, value: i128 },

    /// A null was found where a value is required.
    #[error("null element in non-nullable position")]
    NullElement,

    /// The backing stream failed while refilling the buffer.
    #[error("decode I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while encoding elements.
///
/// When an encode error is returned no bytes of the offending value remain
/// in the output buffer.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// A length-prefixed field is longer than the format allows.
    #[error("{kind} too long for this encoding ({len} bytes, max {max})")]
    TooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    /// A value cannot be represented by the format's field layout.
    #[error("{kind} value {value} cannot be represented by this encoding")]
    OutOfRange { kind: &'static str, value: i128 },

    /// Writing the encoded bytes to the output stream failed.
    #[error("encode I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An encoding name that does not match any known wire format.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown encoding '{0}' (expected one of: binary, fixed, spp)")]
pub struct UnknownEncoding(pub String);

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;
