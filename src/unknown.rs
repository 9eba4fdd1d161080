//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Structures for working with fields a message's schema does not describe.
//!
//! Unknown fields are retained byte-for-byte, tag included, so that
//! re-serialising a message reproduces them exactly. `UnknownField::value()`
//! and `UnknownFieldSet` decode the retained bytes on demand for callers that
//! want to inspect them.

use std::fmt;

use de::DEFAULT_RECURSION_LIMIT;
use wire::{self, Error, Result, WireType};

/// A single field retained verbatim.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct UnknownField {
    number: u32,
    wire_type: WireType,
    raw: Vec<u8>,
    tag_len: usize,
}

impl fmt::Debug for UnknownField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("UnknownField")
            .field("number", &self.number)
            .field("wire_type", &self.wire_type)
            .field("payload", &self.payload())
            .finish()
    }
}

impl UnknownField {
    /// Wraps bytes already known to hold exactly one tag (of `tag_len` bytes)
    /// and its value.
    pub(crate) fn from_raw(number: u32, wire_type: WireType, raw: Vec<u8>,
                           tag_len: usize) -> Self {
        debug_assert!(tag_len <= raw.len());
        UnknownField {
            number: number,
            wire_type: wire_type,
            raw: raw,
            tag_len: tag_len,
        }
    }

    /// Encodes `value` as field `number`.
    pub fn new(number: u32, value: &UnknownValue) -> Self {
        let wire_type = value.wire_type();
        let mut raw = Vec::new();
        wire::encode_tag(&mut raw, number, wire_type);
        let tag_len = raw.len();
        value.encode_payload(&mut raw, number);
        Self::from_raw(number, wire_type, raw, tag_len)
    }

    /// Shorthand for a varint field.
    pub fn varint(number: u32, value: u64) -> Self {
        Self::new(number, &UnknownValue::Varint(value))
    }

    /// The field number.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The wire type from the tag.
    pub fn wire_type(&self) -> WireType {
        self.wire_type
    }

    /// The tag and payload, exactly as they appeared on the wire.
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The encoded tag.
    pub fn tag_bytes(&self) -> &[u8] {
        &self.raw[..self.tag_len]
    }

    /// The bytes following the tag. For length-delimited fields this
    /// includes the length prefix; for groups, the end-group tag.
    pub fn payload(&self) -> &[u8] {
        &self.raw[self.tag_len..]
    }

    /// Decodes the payload.
    pub fn value(&self) -> Result<UnknownValue> {
        let payload = self.payload();
        let end = payload.len();
        match self.wire_type {
            WireType::Varint => wire::decode_varint(payload, 0, end)
                .map(|(v, _)| UnknownValue::Varint(v)),
            WireType::Fixed64 => wire::decode_fixed64(payload, 0, end)
                .map(|(v, _)| UnknownValue::Fixed64(v)),
            WireType::Fixed32 => wire::decode_fixed32(payload, 0, end)
                .map(|(v, _)| UnknownValue::Fixed32(v)),
            WireType::LengthDelimited =>
                wire::decode_length_delimited(payload, 0, end)
                .map(|(v, _)| UnknownValue::LengthDelimited(v.to_vec())),
            WireType::StartGroup => parse_fields(
                payload, 0, end, Some(self.number), DEFAULT_RECURSION_LIMIT)
                .map(|(fields, _)| UnknownValue::Group(
                    UnknownFieldSet(fields))),
            WireType::EndGroup => Err(Error::UnexpectedEndGroup(self.number)),
        }
    }

    /// Ordering used when comparing unknown-field lists as multisets.
    pub(crate) fn sort_key(&self) -> (u32, WireType, &[u8]) {
        (self.number, self.wire_type, self.payload())
    }
}

/// The decoded payload of an unknown field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnknownValue {
    /// A varint. Whether it was signed, zig-zagged, or a boolean is not
    /// recorded on the wire.
    Varint(u64),
    /// A 64-bit fixed-width value.
    Fixed64(u64),
    /// A 32-bit fixed-width value.
    Fixed32(u32),
    /// A length-delimited payload, without its length prefix.
    LengthDelimited(Vec<u8>),
    /// The fields inside a group.
    Group(UnknownFieldSet),
}

impl UnknownValue {
    /// The wire type this value is written with.
    pub fn wire_type(&self) -> WireType {
        match *self {
            UnknownValue::Varint(_) => WireType::Varint,
            UnknownValue::Fixed64(_) => WireType::Fixed64,
            UnknownValue::Fixed32(_) => WireType::Fixed32,
            UnknownValue::LengthDelimited(_) => WireType::LengthDelimited,
            UnknownValue::Group(_) => WireType::StartGroup,
        }
    }

    fn encode_payload(&self, out: &mut Vec<u8>, number: u32) {
        match *self {
            UnknownValue::Varint(v) => wire::encode_varint(out, v),
            UnknownValue::Fixed64(v) => wire::encode_fixed64(out, v),
            UnknownValue::Fixed32(v) => wire::encode_fixed32(out, v),
            UnknownValue::LengthDelimited(ref data) =>
                wire::encode_length_delimited(out, data),
            UnknownValue::Group(ref set) => {
                set.encode(out);
                wire::encode_tag(out, number, WireType::EndGroup);
            },
        }
    }
}

/// A parsed sequence of unknown fields.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct UnknownFieldSet(
    /// The fields, in wire order.
    pub Vec<UnknownField>);

impl UnknownFieldSet {
    /// Splits `data` into fields without interpreting any of them.
    pub fn parse(data: &[u8]) -> Result<Self> {
        parse_fields(data, 0, data.len(), None, DEFAULT_RECURSION_LIMIT)
            .map(|(fields, _)| UnknownFieldSet(fields))
    }

    /// Appends every field's raw bytes to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        for field in &self.0 {
            out.extend_from_slice(field.raw());
        }
    }
}

fn parse_fields(buf: &[u8], mut pos: usize, end: usize,
                group: Option<u32>, depth: usize)
                -> Result<(Vec<UnknownField>, usize)> {
    let mut fields = Vec::new();
    while pos < end {
        let start = pos;
        let (tag, value_pos) = wire::decode_tag(buf, pos, end)?;
        let (number, wire_type) = wire::unpack_tag(tag)?;
        if WireType::EndGroup == wire_type {
            return if Some(number) == group {
                Ok((fields, value_pos))
            } else {
                Err(Error::UnexpectedEndGroup(number))
            };
        }

        pos = wire::skip_value(buf, value_pos, end, number, wire_type,
                               depth)?;
        fields.push(UnknownField::from_raw(
            number, wire_type, buf[start..pos].to_vec(), value_pos - start));
    }

    match group {
        Some(number) => Err(Error::MissingEndGroup(number)),
        None => Ok((fields, pos)),
    }
}
