//! Wire formats as compositions of small field-layout strategies.
//!
//! The generic binary format uses variable-length integers everywhere. The
//! fixed format swaps every numeric field for a fixed-width big-endian one,
//! and the SPP format is the fixed format with three overrides: 2-byte
//! signed length prefixes, the zero-padded unsigned 64-bit layout, and
//! CUC(4,3) time fields.

use std::fmt;

use bytes::{BufMut, BytesMut};

use crate::buffer::BufferCursor;
use crate::error::{DecodeError, DecodeResult, EncodeError, EncodeResult, UnknownEncoding};

/// Layout of integer and floating point fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegerLayout {
    /// LEB128 for unsigned values, zig-zag LEB128 for signed ones, and the
    /// varint of the IEEE bit pattern for floats.
    Varint,
    /// Big-endian two's complement of the natural width.
    FixedBigEndian,
}

/// Layout of the length prefix in front of strings and blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    /// Unsigned LEB128.
    Varint,
    /// 4-byte big-endian unsigned.
    Fixed32,
    /// 2-byte big-endian signed; a negative value marks a null string.
    Signed16,
}

/// Layout of unsigned 64-bit integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ULongLayout {
    Varint,
    Fixed64,
    /// 8 raw bytes read through a 9-byte zero-padded big-endian buffer so the
    /// value is always interpreted as unsigned.
    PaddedUnsigned,
}

/// Layout of Time, FineTime and Duration fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeLayout {
    /// Varint milliseconds (zig-zag for durations).
    Varint,
    /// 8-byte milliseconds for times, 4-byte milliseconds for durations.
    Fixed64,
    /// CCSDS unsegmented code: 4-byte coarse seconds, 3-byte sub-second ticks.
    Cuc43,
}

/// A complete wire format: one strategy per overridable field group.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct WireFormat {
    pub name: &'static str,
    pub integers: IntegerLayout,
    pub lengths: LengthPrefix,
    pub ulong: ULongLayout,
    pub time: TimeLayout,
}

/// Generic variable-length binary encoding.
pub const BINARY: WireFormat = WireFormat {
    name: "binary",
    integers: IntegerLayout::Varint,
    lengths: LengthPrefix::Varint,
    ulong: ULongLayout::Varint,
    time: TimeLayout::Varint,
};

/// Fixed-width binary encoding.
pub const FIXED: WireFormat = WireFormat {
    name: "fixed",
    integers: IntegerLayout::FixedBigEndian,
    lengths: LengthPrefix::Fixed32,
    ulong: ULongLayout::Fixed64,
    time: TimeLayout::Fixed64,
};

/// Compact encoding for space packet links.
pub const SPP: WireFormat = WireFormat {
    name: "spp",
    lengths: LengthPrefix::Signed16,
    ulong: ULongLayout::PaddedUnsigned,
    time: TimeLayout::Cuc43,
    ..FIXED
};

impl WireFormat {
    /// Every built-in format.
    pub const ALL: [WireFormat; 3] = [BINARY, FIXED, SPP];

    /// Look up a built-in format by its configured name (case-insensitive).
    pub fn by_name(name: &str) -> Result<Self, UnknownEncoding> {
        Self::ALL
            .into_iter()
            .find(|format| format.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| UnknownEncoding(name.to_string()))
    }
}

impl fmt::Debug for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WireFormat")
            .field("name", &self.name)
            .field("integers", &self.integers)
            .field("lengths", &self.lengths)
            .field("ulong", &self.ulong)
            .field("time", &self.time)
            .finish()
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

pub(crate) fn put_uvarint(dst: &mut BytesMut, mut value: u64) {
    while value >= 0x80 {
        dst.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    dst.put_u8(value as u8);
}

fn zigzag(value: i64) -> u64 {
    ((value << 1) ^ (value >> 63)) as u64
}

fn unzigzag(value: u64) -> i64 {
    ((value >> 1) as i64) ^ -((value & 1) as i64)
}

impl IntegerLayout {
    pub(crate) fn put_u16(self, dst: &mut BytesMut, value: u16) {
        match self {
            IntegerLayout::Varint => put_uvarint(dst, u64::from(value)),
            IntegerLayout::FixedBigEndian => dst.put_u16(value),
        }
    }

    pub(crate) fn put_u32(self, dst: &mut BytesMut, value: u32) {
        match self {
            IntegerLayout::Varint => put_uvarint(dst, u64::from(value)),
            IntegerLayout::FixedBigEndian => dst.put_u32(value),
        }
    }

    pub(crate) fn put_u64(self, dst: &mut BytesMut, value: u64) {
        match self {
            IntegerLayout::Varint => put_uvarint(dst, value),
            IntegerLayout::FixedBigEndian => dst.put_u64(value),
        }
    }

    pub(crate) fn put_i16(self, dst: &mut BytesMut, value: i16) {
        match self {
            IntegerLayout::Varint => put_uvarint(dst, zigzag(i64::from(value))),
            IntegerLayout::FixedBigEndian => dst.put_i16(value),
        }
    }

    pub(crate) fn put_i32(self, dst: &mut BytesMut, value: i32) {
        match self {
            IntegerLayout::Varint => put_uvarint(dst, zigzag(i64::from(value))),
            IntegerLayout::FixedBigEndian => dst.put_i32(value),
        }
    }

    pub(crate) fn put_i64(self, dst: &mut BytesMut, value: i64) {
        match self {
            IntegerLayout::Varint => put_uvarint(dst, zigzag(value)),
            IntegerLayout::FixedBigEndian => dst.put_i64(value),
        }
    }

    pub(crate) fn put_f32(self, dst: &mut BytesMut, value: f32) {
        self.put_u32(dst, value.to_bits());
    }

    pub(crate) fn put_f64(self, dst: &mut BytesMut, value: f64) {
        self.put_u64(dst, value.to_bits());
    }

    pub(crate) fn get_u16(self, src: &mut BufferCursor<'_>) -> DecodeResult<u16> {
        match self {
            IntegerLayout::Varint => Ok(src.read_uvarint(16)? as u16),
            IntegerLayout::FixedBigEndian => Ok(u16::from_be_bytes(src.read_array()?)),
        }
    }

    pub(crate) fn get_u32(self, src: &mut BufferCursor<'_>) -> DecodeResult<u32> {
        match self {
            IntegerLayout::Varint => Ok(src.read_uvarint(32)? as u32),
            IntegerLayout::FixedBigEndian => Ok(u32::from_be_bytes(src.read_array()?)),
        }
    }

    pub(crate) fn get_u64(self, src: &mut BufferCursor<'_>) -> DecodeResult<u64> {
        match self {
            IntegerLayout::Varint => src.read_uvarint(64),
            IntegerLayout::FixedBigEndian => Ok(u64::from_be_bytes(src.read_array()?)),
        }
    }

    pub(crate) fn get_i16(self, src: &mut BufferCursor<'_>) -> DecodeResult<i16> {
        match self {
            IntegerLayout::Varint => Ok(unzigzag(src.read_uvarint(16)?) as i16),
            IntegerLayout::FixedBigEndian => Ok(i16::from_be_bytes(src.read_array()?)),
        }
    }

    pub(crate) fn get_i32(self, src: &mut BufferCursor<'_>) -> DecodeResult<i32> {
        match self {
            IntegerLayout::Varint => Ok(unzigzag(src.read_uvarint(32)?) as i32),
            IntegerLayout::FixedBigEndian => Ok(i32::from_be_bytes(src.read_array()?)),
        }
    }

    pub(crate) fn get_i64(self, src: &mut BufferCursor<'_>) -> DecodeResult<i64> {
        match self {
            IntegerLayout::Varint => Ok(unzigzag(src.read_uvarint(64)?)),
            IntegerLayout::FixedBigEndian => Ok(i64::from_be_bytes(src.read_array()?)),
        }
    }

    pub(crate) fn get_f32(self, src: &mut BufferCursor<'_>) -> DecodeResult<f32> {
        self.get_u32(src).map(f32::from_bits)
    }

    pub(crate) fn get_f64(self, src: &mut BufferCursor<'_>) -> DecodeResult<f64> {
        self.get_u64(src).map(f64::from_bits)
    }
}

impl LengthPrefix {
    /// Longest field this prefix can describe.
    pub fn max_len(self) -> usize {
        match self {
            LengthPrefix::Varint | LengthPrefix::Fixed32 => u32::MAX as usize,
            LengthPrefix::Signed16 => i16::MAX as usize,
        }
    }

    pub(crate) fn check(self, kind: &'static str, len: usize) -> EncodeResult<()> {
        let max = self.max_len();
        if len > max {
            return Err(EncodeError::TooLong { kind, len, max });
        }
        Ok(())
    }

    /// Write a prefix already validated with [`LengthPrefix::check`].
    pub(crate) fn put(self, dst: &mut BytesMut, len: usize) {
        match self {
            LengthPrefix::Varint => put_uvarint(dst, len as u64),
            LengthPrefix::Fixed32 => dst.put_u32(len as u32),
            LengthPrefix::Signed16 => dst.put_i16(len as i16),
        }
    }

    /// Read a prefix. `None` means the field was written as null.
    pub(crate) fn get(self, src: &mut BufferCursor<'_>) -> DecodeResult<Option<usize>> {
        match self {
            LengthPrefix::Varint => Ok(Some(src.read_uvarint(32)? as usize)),
            LengthPrefix::Fixed32 => Ok(Some(u32::from_be_bytes(src.read_array()?) as usize)),
            LengthPrefix::Signed16 => {
                let len = i16::from_be_bytes(src.read_array()?);
                Ok(usize::try_from(len).ok())
            }
        }
    }
}

impl ULongLayout {
    pub(crate) fn put(self, dst: &mut BytesMut, value: u64) {
        match self {
            ULongLayout::Varint => put_uvarint(dst, value),
            ULongLayout::Fixed64 | ULongLayout::PaddedUnsigned => dst.put_u64(value),
        }
    }

    pub(crate) fn get(self, src: &mut BufferCursor<'_>) -> DecodeResult<u64> {
        match self {
            ULongLayout::Varint => src.read_uvarint(64),
            ULongLayout::Fixed64 => Ok(u64::from_be_bytes(src.read_array()?)),
            ULongLayout::PaddedUnsigned => {
                let raw: [u8; 8] = src.read_array()?;
                let mut padded = [0u8; 9];
                padded[1..].copy_from_slice(&raw);
                let value = padded
                    .iter()
                    .fold(0u128, |acc, byte| (acc << 8) | u128::from(*byte));
                u64::try_from(value).map_err(|_| DecodeError::OutOfRange {
                    kind: "ULong",
                    value: value as i128,
                })
            }
        }
    }
}

const MILLIS_PER_SECOND: u64 = 1000;
const CUC_FIELD_LEN: usize = 7;

impl TimeLayout {
    /// Write an absolute millisecond count (Time, FineTime).
    pub(crate) fn put_millis(
        self,
        dst: &mut BytesMut,
        kind: &'static str,
        millis: u64,
    ) -> EncodeResult<()> {
        match self {
            TimeLayout::Varint => put_uvarint(dst, millis),
            TimeLayout::Fixed64 => dst.put_u64(millis),
            TimeLayout::Cuc43 => put_cuc(dst, kind, millis)?,
        }
        Ok(())
    }

    pub(crate) fn get_millis(self, src: &mut BufferCursor<'_>) -> DecodeResult<u64> {
        match self {
            TimeLayout::Varint => src.read_uvarint(64),
            TimeLayout::Fixed64 => Ok(u64::from_be_bytes(src.read_array()?)),
            TimeLayout::Cuc43 => {
                let millis = peek_cuc(src)?;
                src.read_slice(CUC_FIELD_LEN)?;
                Ok(millis)
            }
        }
    }

    /// Write a relative millisecond count.
    pub(crate) fn put_duration(self, dst: &mut BytesMut, millis: i32) -> EncodeResult<()> {
        match self {
            TimeLayout::Varint => put_uvarint(dst, zigzag(i64::from(millis))),
            TimeLayout::Fixed64 => dst.put_i32(millis),
            TimeLayout::Cuc43 => {
                let magnitude = u64::try_from(millis).map_err(|_| EncodeError::OutOfRange {
                    kind: "Duration",
                    value: i128::from(millis),
                })?;
                put_cuc(dst, "Duration", magnitude)?;
            }
        }
        Ok(())
    }

    pub(crate) fn get_duration(self, src: &mut BufferCursor<'_>) -> DecodeResult<i32> {
        match self {
            TimeLayout::Varint => Ok(unzigzag(src.read_uvarint(32)?) as i32),
            TimeLayout::Fixed64 => Ok(i32::from_be_bytes(src.read_array()?)),
            TimeLayout::Cuc43 => {
                let millis = peek_cuc(src)?;
                let value = i32::try_from(millis).map_err(|_| DecodeError::OutOfRange {
                    kind: "Duration",
                    value: i128::from(millis),
                })?;
                src.read_slice(CUC_FIELD_LEN)?;
                Ok(value)
            }
        }
    }
}

fn put_cuc(dst: &mut BytesMut, kind: &'static str, millis: u64) -> EncodeResult<()> {
    let seconds = u32::try_from(millis / MILLIS_PER_SECOND).map_err(|_| EncodeError::OutOfRange {
        kind,
        value: i128::from(millis),
    })?;
    let ticks = (millis % MILLIS_PER_SECOND) as u32;
    dst.put_u32(seconds);
    dst.put_slice(&ticks.to_be_bytes()[1..]);
    Ok(())
}

/// Millisecond value of the CUC(4,3) field at the cursor, without consuming it.
fn peek_cuc(src: &mut BufferCursor<'_>) -> DecodeResult<u64> {
    let raw = src.peek(CUC_FIELD_LEN)?;
    let seconds = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
    let ticks = u32::from_be_bytes([0, raw[4], raw[5], raw[6]]);
    Ok(u64::from(seconds) * MILLIS_PER_SECOND + u64::from(ticks))
}
