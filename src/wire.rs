//-
// Copyright 2017, Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Low-level definitions for working with the wire format.
//!
//! Every decoding function here operates on a window `buf[pos..end]` of an
//! in-memory buffer and returns the decoded value together with the position
//! immediately after it. Nothing ever reads at or past `end`; a value cut
//! short by the end of the window is reported as `Error::Truncated` rather
//! than being returned partially.
//!
//! External code generally should not need this module; `DynamicMessage`
//! drives it through the `codec` tables.

use std::str;

quick_error! {
    /// Errors produced when the input is not well-formed wire data.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        /// The window ended in the middle of a value.
        Truncated {
            description("truncated input")
            display("input ended in the middle of a value")
        }
        /// A varint had more than ten 7-bit groups.
        VarintTooLong {
            description("varint too long")
            display("varint has more than 10 bytes")
        }
        /// A ten-byte varint carried bits beyond the 64th.
        VarintOverflow {
            description("varint overflow")
            display("varint does not fit in 64 bits")
        }
        /// A tag carried wire type 6 or 7.
        InvalidWireType(wire_type: u8) {
            description("invalid wire type")
            display("invalid wire type {}", wire_type)
        }
        /// A tag carried field number 0, or a number beyond 2^29-1.
        InvalidFieldNumber(number: u64) {
            description("invalid field number")
            display("invalid field number {}", number)
        }
        /// A length prefix pointed past the end of the window.
        LengthOverrun(len: u64, remaining: usize) {
            description("length prefix exceeds input")
            display("length prefix {} exceeds the {} bytes remaining",
                    len, remaining)
        }
        /// An end-group tag appeared without a matching start-group tag.
        UnexpectedEndGroup(number: u32) {
            description("unexpected end-group tag")
            display("unexpected end-group tag for field {}", number)
        }
        /// A group was not terminated by its end-group tag.
        MissingEndGroup(number: u32) {
            description("missing end-group tag")
            display("group for field {} is missing its end-group tag",
                    number)
        }
        /// A string field did not contain valid UTF-8.
        InvalidUtf8 {
            description("invalid UTF-8")
            display("string field is not valid UTF-8")
        }
        /// Groups were nested beyond the remaining recursion budget while
        /// skipping an unknown value.
        NestingTooDeep {
            description("groups nested too deeply")
            display("groups nested too deeply")
        }
        /// A MessageSet item had no `type_id` field.
        MissingTypeId {
            description("MessageSet item missing type_id")
            display("MessageSet item missing type_id")
        }
        /// A MessageSet item had no `message` field.
        MissingMessage {
            description("MessageSet item missing message")
            display("MessageSet item missing message")
        }
    }
}

/// Result type for wire-level decoding.
pub type Result<T> = ::std::result::Result<T, Error>;

/// The maximum number of bytes occupied by a 64-bit varint.
pub const MAX_VARINT_LEN: usize = 10;
/// The smallest valid field number.
pub const MIN_FIELD_NUMBER: u32 = 1;
/// The largest valid field number.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;
/// The first field number of the range reserved for the implementation.
pub const FIRST_RESERVED_FIELD_NUMBER: u32 = 19000;
/// The last field number of the range reserved for the implementation.
pub const LAST_RESERVED_FIELD_NUMBER: u32 = 19999;

/// How the bytes following a tag are laid out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
#[repr(u8)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    /// Interpret the low three bits of a tag.
    pub fn from_u8(ty: u8) -> Result<Self> {
        use self::WireType::*;

        match ty {
            0 => Ok(Varint),
            1 => Ok(Fixed64),
            2 => Ok(LengthDelimited),
            3 => Ok(StartGroup),
            4 => Ok(EndGroup),
            5 => Ok(Fixed32),
            _ => Err(Error::InvalidWireType(ty)),
        }
    }
}

#[inline]
fn check_window(buf: &[u8], pos: usize, end: usize) {
    debug_assert!(end <= buf.len());
    debug_assert!(pos <= end);
}

/// Append `value` to `out` as a varint.
pub fn encode_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if 0 == value {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

/// Returns the number of bytes `encode_varint` writes for `value`.
pub fn varint_size(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    (bits + 6) / 7
}

/// Decode a varint from `buf[pos..end]`.
///
/// Fails with `Truncated` if the window ends before a byte without the
/// continuation bit, and with `VarintTooLong` if ten bytes pass without one.
pub fn decode_varint(buf: &[u8], pos: usize, end: usize)
                     -> Result<(u64, usize)> {
    check_window(buf, pos, end);

    let mut accum = 0u64;
    for i in 0..MAX_VARINT_LEN {
        if pos + i >= end {
            return Err(Error::Truncated);
        }
        let b = buf[pos + i];
        if MAX_VARINT_LEN - 1 == i && (b & 0x7F) > 1 {
            return Err(Error::VarintOverflow);
        }
        accum |= ((b & 0x7F) as u64) << (7 * i);
        if 0 == (b & 0x80) {
            return Ok((accum, pos + i + 1));
        }
    }

    Err(Error::VarintTooLong)
}

/// ZigZag the given signed 64-bit integer into the unsigned storage format.
pub fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Invert `zigzag_encode`.
pub fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// The 32-bit form of `zigzag_encode`.
pub fn zigzag_encode32(n: i32) -> u32 {
    ((n << 1) ^ (n >> 31)) as u32
}

/// Invert `zigzag_encode32`.
pub fn zigzag_decode32(n: u32) -> i32 {
    ((n >> 1) as i32) ^ -((n & 1) as i32)
}

/// Append a little-endian 32-bit value.
pub fn encode_fixed32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Append a little-endian 64-bit value.
pub fn encode_fixed64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Decode a little-endian 32-bit value from `buf[pos..end]`.
pub fn decode_fixed32(buf: &[u8], pos: usize, end: usize)
                      -> Result<(u32, usize)> {
    check_window(buf, pos, end);
    if end - pos < 4 {
        return Err(Error::Truncated);
    }
    let mut bytes = [0u8;4];
    bytes.copy_from_slice(&buf[pos..pos + 4]);
    Ok((u32::from_le_bytes(bytes), pos + 4))
}

/// Decode a little-endian 64-bit value from `buf[pos..end]`.
pub fn decode_fixed64(buf: &[u8], pos: usize, end: usize)
                      -> Result<(u64, usize)> {
    check_window(buf, pos, end);
    if end - pos < 8 {
        return Err(Error::Truncated);
    }
    let mut bytes = [0u8;8];
    bytes.copy_from_slice(&buf[pos..pos + 8]);
    Ok((u64::from_le_bytes(bytes), pos + 8))
}

/// Combine a field number and wire type into a tag.
#[inline]
pub fn pack_tag(number: u32, wire_type: WireType) -> u32 {
    (number << 3) | (wire_type as u32)
}

/// Split a tag into its field number and wire type.
///
/// Field number 0 and wire types 6 and 7 are rejected.
pub fn unpack_tag(tag: u32) -> Result<(u32, WireType)> {
    let number = tag >> 3;
    if number < MIN_FIELD_NUMBER {
        return Err(Error::InvalidFieldNumber(number as u64));
    }
    let wire_type = WireType::from_u8((tag & 7) as u8)?;
    Ok((number, wire_type))
}

/// Returns the encoded form of the tag for `number` and `wire_type`.
pub fn tag_bytes(number: u32, wire_type: WireType) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    encode_varint(&mut out, pack_tag(number, wire_type) as u64);
    out
}

/// Append the tag for `number` and `wire_type`.
#[inline]
pub fn encode_tag(out: &mut Vec<u8>, number: u32, wire_type: WireType) {
    encode_varint(out, pack_tag(number, wire_type) as u64);
}

/// Returns the number of bytes occupied by a tag for `number`.
#[inline]
pub fn tag_size(number: u32) -> usize {
    varint_size((number as u64) << 3)
}

/// Decode the raw tag at `buf[pos..end]` without interpreting it.
///
/// Values which cannot be a tag (wider than 32 bits) fail with
/// `InvalidFieldNumber`.
pub fn decode_tag(buf: &[u8], pos: usize, end: usize)
                  -> Result<(u32, usize)> {
    let (tag, pos) = decode_varint(buf, pos, end)?;
    if tag > (u32::MAX as u64) {
        return Err(Error::InvalidFieldNumber(tag >> 3));
    }
    Ok((tag as u32, pos))
}

/// Append `data` preceded by its varint length.
pub fn encode_length_delimited(out: &mut Vec<u8>, data: &[u8]) {
    encode_varint(out, data.len() as u64);
    out.extend_from_slice(data);
}

/// Returns the size of `len` payload bytes together with their length
/// prefix.
#[inline]
pub fn length_delimited_size(len: usize) -> usize {
    varint_size(len as u64) + len
}

/// Decode a length prefix from `buf[pos..end]`.
///
/// Returns the payload length and the position of the first payload byte.
/// Fails with `LengthOverrun` if the payload would extend past `end`.
pub fn decode_length_prefix(buf: &[u8], pos: usize, end: usize)
                            -> Result<(usize, usize)> {
    let (len, pos) = decode_varint(buf, pos, end)?;
    let remaining = end - pos;
    if len > remaining as u64 {
        return Err(Error::LengthOverrun(len, remaining));
    }
    Ok((len as usize, pos))
}

/// Decode a length-delimited payload from `buf[pos..end]`.
pub fn decode_length_delimited<'a>(buf: &'a [u8], pos: usize, end: usize)
                                   -> Result<(&'a [u8], usize)> {
    let (len, pos) = decode_length_prefix(buf, pos, end)?;
    Ok((&buf[pos..pos + len], pos + len))
}

/// Decode a length-delimited payload as a UTF-8 string.
pub fn decode_string<'a>(buf: &'a [u8], pos: usize, end: usize)
                         -> Result<(&'a str, usize)> {
    let (data, pos) = decode_length_delimited(buf, pos, end)?;
    match str::from_utf8(data) {
        Ok(s) => Ok((s, pos)),
        Err(_) => Err(Error::InvalidUtf8),
    }
}

/// Skip over the value of a field whose tag has already been consumed.
///
/// `pos` points immediately after the tag. For groups, everything up to and
/// including the matching end-group tag is skipped; `depth` is the number of
/// group levels that may still be entered, including this one.
///
/// End-group tags cannot be skipped and fail with `UnexpectedEndGroup`.
pub fn skip_value(buf: &[u8], pos: usize, end: usize,
                  number: u32, wire_type: WireType, depth: usize)
                  -> Result<usize> {
    match wire_type {
        WireType::Varint => decode_varint(buf, pos, end).map(|(_, p)| p),
        WireType::Fixed64 => decode_fixed64(buf, pos, end).map(|(_, p)| p),
        WireType::Fixed32 => decode_fixed32(buf, pos, end).map(|(_, p)| p),
        WireType::LengthDelimited =>
            decode_length_prefix(buf, pos, end).map(|(len, p)| p + len),
        WireType::EndGroup => Err(Error::UnexpectedEndGroup(number)),
        WireType::StartGroup => {
            if 0 == depth {
                return Err(Error::NestingTooDeep);
            }

            let mut pos = pos;
            while pos < end {
                let (tag, next) = decode_tag(buf, pos, end)?;
                let (inner, inner_type) = unpack_tag(tag)?;
                if WireType::EndGroup == inner_type {
                    if inner != number {
                        return Err(Error::UnexpectedEndGroup(inner));
                    }
                    return Ok(next);
                }
                pos = skip_value(buf, next, end, inner, inner_type,
                                 depth - 1)?;
            }
            Err(Error::MissingEndGroup(number))
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn varint_encoding_and_decoding() {
        macro_rules! test {
            ($v:expr, $vec:expr) => { {
                let mut output = Vec::new();
                encode_varint(&mut output, $v);
                assert_eq!(&$vec[..], &output[..]);
                assert_eq!(output.len(), varint_size($v));

                let (decoded, pos) =
                    decode_varint(&output, 0, output.len()).unwrap();
                assert_eq!(output.len(), pos);
                assert_eq!($v, decoded);
            } }
        }

        test!(0, [0]);
        test!(1, [1]);
        test!(127, [127]);
        test!(128, [128, 1]);
        test!(150, [0x96, 0x01]);
        test!(256, [128, 2]);
        test!(16384, [128, 128, 1]);
        test!(u64::MAX,
              [255, 255, 255, 255, 255, 255, 255, 255, 255, 1]);
    }

    #[test]
    fn varint_never_exceeds_ten_bytes() {
        let mut n = 1u64;
        while n != 0 {
            let mut output = Vec::new();
            encode_varint(&mut output, n);
            assert!(output.len() <= MAX_VARINT_LEN);
            assert_eq!(n, decode_varint(&output, 0, output.len())
                       .unwrap().0);
            n <<= 1;
        }
    }

    #[test]
    fn varint_decode_detects_truncation() {
        assert_eq!(Err(Error::Truncated), decode_varint(&[0x96], 0, 1));
        assert_eq!(Err(Error::Truncated), decode_varint(&[], 0, 0));
        // The window ends before the terminating byte even though the
        // buffer does not.
        assert_eq!(Err(Error::Truncated),
                   decode_varint(&[0x96, 0x01], 0, 1));
    }

    #[test]
    fn varint_decode_rejects_eleven_groups() {
        assert_eq!(Err(Error::VarintTooLong),
                   decode_varint(&[0x80;11], 0, 11));
    }

    #[test]
    fn varint_decode_detects_overflow() {
        let data = [255, 255, 255, 255, 255, 255, 255, 255, 255, 2];
        assert_eq!(Err(Error::VarintOverflow),
                   decode_varint(&data, 0, data.len()));
    }

    #[test]
    fn zigzag_values() {
        assert_eq!(0, zigzag_encode(0));
        assert_eq!(1, zigzag_encode(-1));
        assert_eq!(2, zigzag_encode(1));
        assert_eq!(3, zigzag_encode(-2));
        assert_eq!(4294967294, zigzag_encode(2147483647));
        assert_eq!(4294967294, zigzag_encode32(i32::MAX));
        assert_eq!(4294967295, zigzag_encode32(i32::MIN));
        assert_eq!(u64::MAX, zigzag_encode(i64::MIN));

        for &n in &[0i64, 1, -1, 2, -2, 63, -64, i64::MAX, i64::MIN] {
            assert_eq!(n, zigzag_decode(zigzag_encode(n)));
        }
        for &n in &[0i32, 1, -1, i32::MAX, i32::MIN] {
            assert_eq!(n, zigzag_decode32(zigzag_encode32(n)));
        }
    }

    #[test]
    fn tag_pack_and_unpack() {
        let types = [WireType::Varint, WireType::Fixed64,
                     WireType::LengthDelimited, WireType::StartGroup,
                     WireType::EndGroup, WireType::Fixed32];
        for &number in &[1, 2, 15, 16, 2047, 2048, 18999, 20000,
                         MAX_FIELD_NUMBER] {
            for &wt in &types {
                let tag = pack_tag(number, wt);
                assert_eq!((number, wt), unpack_tag(tag).unwrap());

                let bytes = tag_bytes(number, wt);
                assert_eq!(bytes.len(), tag_size(number));
                assert_eq!((tag, bytes.len()),
                           decode_tag(&bytes, 0, bytes.len()).unwrap());
            }
        }

        assert_eq!(vec![0x08], tag_bytes(1, WireType::Varint));
        assert_eq!(vec![0x0A], tag_bytes(1, WireType::LengthDelimited));
        assert_eq!(Err(Error::InvalidFieldNumber(0)), unpack_tag(0x02));
        assert_eq!(Err(Error::InvalidWireType(6)), unpack_tag(0x0E));
        assert_eq!(Err(Error::InvalidWireType(7)), unpack_tag(0x0F));
    }

    #[test]
    fn fixed_width_values() {
        let mut out = Vec::new();
        encode_fixed32(&mut out, 0x01020304);
        encode_fixed64(&mut out, 0x0102030405060708);
        assert_eq!(vec![4, 3, 2, 1, 8, 7, 6, 5, 4, 3, 2, 1], out);

        assert_eq!((0x01020304, 4), decode_fixed32(&out, 0, 12).unwrap());
        assert_eq!((0x0102030405060708, 12),
                   decode_fixed64(&out, 4, 12).unwrap());
        assert_eq!(Err(Error::Truncated), decode_fixed32(&out, 0, 3));
        assert_eq!(Err(Error::Truncated), decode_fixed64(&out, 4, 11));
    }

    #[test]
    fn length_prefix_must_fit_in_window() {
        let data = [3, b'a', b'b', b'c', b'd'];
        assert_eq!((&b"abc"[..], 4),
                   decode_length_delimited(&data, 0, 5).unwrap());
        assert_eq!(Err(Error::LengthOverrun(3, 2)),
                   decode_length_prefix(&data, 0, 3));
        assert_eq!(Err(Error::InvalidUtf8),
                   decode_string(&[2, 0xC3, 0x28], 0, 3));
    }

    #[test]
    fn skip_every_wire_type() {
        // varint, fixed64, length-delimited, fixed32
        assert_eq!(Ok(2), skip_value(&[0x96, 0x01], 0, 2, 1,
                                     WireType::Varint, 1));
        assert_eq!(Ok(8), skip_value(&[0;8], 0, 8, 1, WireType::Fixed64, 1));
        assert_eq!(Ok(3), skip_value(&[2, 9, 9], 0, 3, 1,
                                     WireType::LengthDelimited, 1));
        assert_eq!(Ok(4), skip_value(&[0;4], 0, 4, 1, WireType::Fixed32, 1));
        assert_eq!(Err(Error::UnexpectedEndGroup(1)),
                   skip_value(&[], 0, 0, 1, WireType::EndGroup, 1));
    }

    #[test]
    fn skip_nested_groups() {
        // group 1 { varint 2 = 5; group 3 { } }
        let data = [0x10, 0x05, 0x1B, 0x1C, 0x0C];
        assert_eq!(Ok(5), skip_value(&data, 0, 5, 1,
                                     WireType::StartGroup, 2));
        assert_eq!(Err(Error::NestingTooDeep),
                   skip_value(&data, 0, 5, 1, WireType::StartGroup, 1));
        assert_eq!(Err(Error::MissingEndGroup(1)),
                   skip_value(&data, 0, 4, 1, WireType::StartGroup, 2));
        assert_eq!(Err(Error::UnexpectedEndGroup(2)),
                   skip_value(&[0x14], 0, 1, 1, WireType::StartGroup, 2));
    }
}
