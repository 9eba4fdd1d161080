//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The field codec table.
//!
//! Each message type gets one `MessageCodec`, built the first time an
//! instance of the type is sized, written or parsed, and shared by every
//! instance afterwards. It binds an encoder and sizer to each field (in
//! field-number order) and holds the tag dispatch table used by the parser.
//!
//! Repeated fields of packable types are registered under both their
//! element tag and their length-delimited tag, so that either encoding is
//! accepted regardless of how the field is declared.

use std::collections::HashMap;

use containers::{MessageMap, ScalarMap};
use message::{DynamicMessage, FieldValue};
use message_set;
use schema::{FieldDescriptor, FieldType, MessageDescriptor};
use value::{MapKey, Value};
use wire::{self, WireType};

/// Encodes the payload of a single value of type `ty`; that is, everything
/// after the tag.
///
/// Groups are written without their end tag.
pub(crate) fn encode_scalar(out: &mut Vec<u8>, ty: FieldType,
                            value: &Value) {
    match *value {
        Value::Bool(v) => wire::encode_varint(out, v as u64),
        Value::I32(v) => match ty {
            FieldType::SInt32 =>
                wire::encode_varint(out, wire::zigzag_encode32(v) as u64),
            FieldType::SFixed32 => wire::encode_fixed32(out, v as u32),
            // Negative values are sign-extended to ten bytes.
            _ => wire::encode_varint(out, v as i64 as u64),
        },
        Value::I64(v) => match ty {
            FieldType::SInt64 =>
                wire::encode_varint(out, wire::zigzag_encode(v)),
            FieldType::SFixed64 => wire::encode_fixed64(out, v as u64),
            _ => wire::encode_varint(out, v as u64),
        },
        Value::U32(v) => match ty {
            FieldType::Fixed32 => wire::encode_fixed32(out, v),
            _ => wire::encode_varint(out, v as u64),
        },
        Value::U64(v) => match ty {
            FieldType::Fixed64 => wire::encode_fixed64(out, v),
            _ => wire::encode_varint(out, v),
        },
        Value::F32(v) => wire::encode_fixed32(out, v.to_bits()),
        Value::F64(v) => wire::encode_fixed64(out, v.to_bits()),
        Value::EnumNumber(v) => wire::encode_varint(out, v as i64 as u64),
        Value::String(ref v) => wire::encode_length_delimited(out, v.as_bytes()),
        Value::Bytes(ref v) => wire::encode_length_delimited(out, v),
        Value::Message(ref v) => {
            if FieldType::Message == ty {
                wire::encode_varint(out, v.byte_size() as u64);
            }
            v.write_to(out);
        },
    }
}

/// Returns the number of bytes `encode_scalar()` would write.
pub(crate) fn scalar_size(ty: FieldType, value: &Value) -> usize {
    match *value {
        Value::Bool(_) => 1,
        Value::I32(v) => match ty {
            FieldType::SInt32 =>
                wire::varint_size(wire::zigzag_encode32(v) as u64),
            FieldType::SFixed32 => 4,
            _ => wire::varint_size(v as i64 as u64),
        },
        Value::I64(v) => match ty {
            FieldType::SInt64 => wire::varint_size(wire::zigzag_encode(v)),
            FieldType::SFixed64 => 8,
            _ => wire::varint_size(v as u64),
        },
        Value::U32(v) => match ty {
            FieldType::Fixed32 => 4,
            _ => wire::varint_size(v as u64),
        },
        Value::U64(v) => match ty {
            FieldType::Fixed64 => 8,
            _ => wire::varint_size(v),
        },
        Value::F32(_) => 4,
        Value::F64(_) => 8,
        Value::EnumNumber(v) => wire::varint_size(v as i64 as u64),
        Value::String(ref v) => wire::length_delimited_size(v.len()),
        Value::Bytes(ref v) => wire::length_delimited_size(v.len()),
        Value::Message(ref v) => if FieldType::Message == ty {
            wire::length_delimited_size(v.byte_size())
        } else {
            v.byte_size()
        },
    }
}

/// Decodes one value of the non-message type `ty` from `buf[pos..end]`.
///
/// Integers are truncated to the field's width, as other implementations
/// do, rather than rejected.
pub(crate) fn decode_scalar(buf: &[u8], pos: usize, end: usize,
                            ty: FieldType) -> wire::Result<(Value, usize)> {
    use schema::FieldType::*;

    Ok(match ty {
        Bool => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::Bool(0 != v), pos)
        },
        Int32 => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::I32(v as i32), pos)
        },
        Int64 => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::I64(v as i64), pos)
        },
        UInt32 => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::U32(v as u32), pos)
        },
        UInt64 => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::U64(v), pos)
        },
        SInt32 => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::I32(wire::zigzag_decode32(v as u32)), pos)
        },
        SInt64 => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::I64(wire::zigzag_decode(v)), pos)
        },
        Enum => {
            let (v, pos) = wire::decode_varint(buf, pos, end)?;
            (Value::EnumNumber(v as i32), pos)
        },
        Fixed32 => {
            let (v, pos) = wire::decode_fixed32(buf, pos, end)?;
            (Value::U32(v), pos)
        },
        SFixed32 => {
            let (v, pos) = wire::decode_fixed32(buf, pos, end)?;
            (Value::I32(v as i32), pos)
        },
        Float => {
            let (v, pos) = wire::decode_fixed32(buf, pos, end)?;
            (Value::F32(f32::from_bits(v)), pos)
        },
        Fixed64 => {
            let (v, pos) = wire::decode_fixed64(buf, pos, end)?;
            (Value::U64(v), pos)
        },
        SFixed64 => {
            let (v, pos) = wire::decode_fixed64(buf, pos, end)?;
            (Value::I64(v as i64), pos)
        },
        Double => {
            let (v, pos) = wire::decode_fixed64(buf, pos, end)?;
            (Value::F64(f64::from_bits(v)), pos)
        },
        String => {
            let (v, pos) = wire::decode_string(buf, pos, end)?;
            (Value::String(v.to_owned()), pos)
        },
        Bytes => {
            let (v, pos) = wire::decode_length_delimited(buf, pos, end)?;
            (Value::Bytes(v.to_vec()), pos)
        },
        Message | Group =>
            unreachable!("message values are decoded by the parser"),
    })
}

fn key_value(key: &MapKey) -> Option<Value> {
    match *key {
        MapKey::Bool(v) => Some(Value::Bool(v)),
        MapKey::I32(v) => Some(Value::I32(v)),
        MapKey::I64(v) => Some(Value::I64(v)),
        MapKey::U32(v) => Some(Value::U32(v)),
        MapKey::U64(v) => Some(Value::U64(v)),
        MapKey::String(_) => None,
    }
}

fn encode_key(out: &mut Vec<u8>, ty: FieldType, key: &MapKey) {
    match *key {
        MapKey::String(ref v) =>
            wire::encode_length_delimited(out, v.as_bytes()),
        _ => if let Some(value) = key_value(key) {
            encode_scalar(out, ty, &value)
        },
    }
}

fn key_size(ty: FieldType, key: &MapKey) -> usize {
    match *key {
        MapKey::String(ref v) => wire::length_delimited_size(v.len()),
        _ => key_value(key).map_or(0, |value| scalar_size(ty, &value)),
    }
}

/// How a field's stored value maps onto the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Kind {
    Singular,
    Repeated,
    Map { key: FieldType, value: FieldType },
    /// A singular message extension of a MessageSet.
    MessageSetItem,
}

/// Encoder and sizer bound to one field.
#[derive(Debug)]
pub(crate) struct FieldCodec {
    pub number: u32,
    /// Index of the field in its message's declaration order.
    pub index: usize,
    pub ty: FieldType,
    pub kind: Kind,
    pub packed: bool,
    tag: Vec<u8>,
    packed_tag: Option<Vec<u8>>,
    end_tag: Option<Vec<u8>>,
}

impl FieldCodec {
    fn new(field: &FieldDescriptor, message_set: bool) -> Self {
        let number = field.number();
        let ty = field.field_type();

        let kind = if field.is_map() {
            match (field.map_key(), field.map_value()) {
                (Some(key), Some(value)) => Kind::Map {
                    key: key.field_type(),
                    value: value.field_type(),
                },
                _ => unreachable!("map fields always have an entry type"),
            }
        } else if field.is_list() {
            Kind::Repeated
        } else if message_set && field.is_extension() &&
            FieldType::Message == ty
        {
            Kind::MessageSetItem
        } else {
            Kind::Singular
        };

        let packable = Kind::Repeated == kind && ty.is_packable();
        FieldCodec {
            number: number,
            index: field.index(),
            ty: ty,
            kind: kind,
            packed: field.is_packed(),
            tag: wire::tag_bytes(number, ty.wire_type()),
            packed_tag: if packable {
                Some(wire::tag_bytes(number, WireType::LengthDelimited))
            } else {
                None
            },
            end_tag: if FieldType::Group == ty {
                Some(wire::tag_bytes(number, WireType::EndGroup))
            } else {
                None
            },
        }
    }

    fn end_len(&self) -> usize {
        self.end_tag.as_ref().map_or(0, |t| t.len())
    }

    fn encode_element(&self, out: &mut Vec<u8>, value: &Value) {
        out.extend_from_slice(&self.tag);
        encode_scalar(out, self.ty, value);
        if let Some(ref end_tag) = self.end_tag {
            out.extend_from_slice(end_tag);
        }
    }

    fn element_size(&self, value: &Value) -> usize {
        self.tag.len() + scalar_size(self.ty, value) + self.end_len()
    }

    fn encode_message(&self, out: &mut Vec<u8>, message: &DynamicMessage) {
        out.extend_from_slice(&self.tag);
        if FieldType::Group == self.ty {
            message.write_to(out);
        } else {
            wire::encode_varint(out, message.byte_size() as u64);
            message.write_to(out);
        }
        if let Some(ref end_tag) = self.end_tag {
            out.extend_from_slice(end_tag);
        }
    }

    fn message_size(&self, message: &DynamicMessage) -> usize {
        let body = message.byte_size();
        self.tag.len() + self.end_len() + if FieldType::Group == self.ty {
            body
        } else {
            wire::length_delimited_size(body)
        }
    }

    fn packed_payload_size(&self, values: &[Value]) -> usize {
        values.iter().map(|v| scalar_size(self.ty, v)).sum()
    }

    fn entry_size(&self, key: &MapKey, value: &Value) -> usize {
        match self.kind {
            Kind::Map { key: key_ty, value: value_ty } =>
                2 + key_size(key_ty, key) + scalar_size(value_ty, value),
            _ => 0,
        }
    }

    fn message_entry_size(&self, key: &MapKey, value: &DynamicMessage)
                          -> usize {
        match self.kind {
            Kind::Map { key: key_ty, .. } =>
                2 + key_size(key_ty, key) +
                wire::length_delimited_size(value.byte_size()),
            _ => 0,
        }
    }

    fn encode_scalar_map(&self, out: &mut Vec<u8>, map: &ScalarMap) {
        if let Kind::Map { key: key_ty, value: value_ty } = self.kind {
            for (key, value) in map.iter() {
                out.extend_from_slice(&self.tag);
                wire::encode_varint(out, self.entry_size(key, value) as u64);
                wire::encode_tag(out, 1, key_ty.wire_type());
                encode_key(out, key_ty, key);
                wire::encode_tag(out, 2, value_ty.wire_type());
                encode_scalar(out, value_ty, value);
            }
        }
    }

    fn encode_message_map(&self, out: &mut Vec<u8>, map: &MessageMap) {
        if let Kind::Map { key: key_ty, .. } = self.kind {
            for (key, value) in map.iter() {
                out.extend_from_slice(&self.tag);
                wire::encode_varint(
                    out, self.message_entry_size(key, value) as u64);
                wire::encode_tag(out, 1, key_ty.wire_type());
                encode_key(out, key_ty, key);
                wire::encode_tag(out, 2, WireType::LengthDelimited);
                wire::encode_varint(out, value.byte_size() as u64);
                value.write_to(out);
            }
        }
    }

    /// Appends the encoding of `value`, tags included, to `out`.
    ///
    /// Empty repeated and map fields produce nothing.
    pub fn encode(&self, out: &mut Vec<u8>, value: &FieldValue) {
        match *value {
            FieldValue::Singular(Value::Message(ref message))
                if Kind::MessageSetItem == self.kind =>
                message_set::encode_item(out, self.number, message),
            FieldValue::Singular(ref value) =>
                self.encode_element(out, value),
            FieldValue::RepeatedScalar(ref list) => {
                let values = list.values();
                match self.packed_tag {
                    Some(ref packed_tag) if self.packed => {
                        if !values.is_empty() {
                            out.extend_from_slice(packed_tag);
                            wire::encode_varint(
                                out, self.packed_payload_size(values) as u64);
                            for value in values {
                                encode_scalar(out, self.ty, value);
                            }
                        }
                    },
                    _ => for value in values {
                        self.encode_element(out, value);
                    },
                }
            },
            FieldValue::RepeatedMessage(ref list) => for message in list.iter() {
                self.encode_message(out, message);
            },
            FieldValue::ScalarMap(ref map) => self.encode_scalar_map(out, map),
            FieldValue::MessageMap(ref map) =>
                self.encode_message_map(out, map),
        }
    }

    /// Returns the number of bytes `encode()` would write.
    pub fn size(&self, value: &FieldValue) -> usize {
        match *value {
            FieldValue::Singular(Value::Message(ref message))
                if Kind::MessageSetItem == self.kind =>
                message_set::item_size(self.number, message),
            FieldValue::Singular(ref value) => self.element_size(value),
            FieldValue::RepeatedScalar(ref list) => {
                let values = list.values();
                match self.packed_tag {
                    Some(ref packed_tag) if self.packed => if values.is_empty() {
                        0
                    } else {
                        packed_tag.len() + wire::length_delimited_size(
                            self.packed_payload_size(values))
                    },
                    _ => values.iter().map(|v| self.element_size(v)).sum(),
                }
            },
            FieldValue::RepeatedMessage(ref list) =>
                list.iter().map(|m| self.message_size(m)).sum(),
            FieldValue::ScalarMap(ref map) => map.iter()
                .map(|(k, v)| self.tag.len() + wire::length_delimited_size(
                    self.entry_size(k, v)))
                .sum(),
            FieldValue::MessageMap(ref map) => map.iter()
                .map(|(k, v)| self.tag.len() + wire::length_delimited_size(
                    self.message_entry_size(k, v)))
                .sum(),
        }
    }
}

/// What the parser does with a value carrying a given tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decoder {
    /// Decode into the field at `index`; `packed` when the tag is the
    /// length-delimited alternative of a packable repeated field.
    Field { index: usize, packed: bool },
    /// A MessageSet item group.
    MessageSetItem,
}

/// Codec and dispatch table for one message type.
#[derive(Debug)]
pub(crate) struct MessageCodec {
    fields: Vec<FieldCodec>,
    by_number: HashMap<u32, usize>,
    decoders: HashMap<u32, Decoder>,
    /// Indices of required fields.
    pub required: Vec<usize>,
}

impl MessageCodec {
    pub fn build(desc: &MessageDescriptor) -> Self {
        let message_set = desc.is_message_set_wire_format();
        let mut fields: Vec<FieldCodec> = desc.fields().iter()
            .map(|field| FieldCodec::new(field, message_set))
            .collect();
        fields.sort_by_key(|codec| codec.number);

        let mut by_number = HashMap::with_capacity(fields.len());
        let mut decoders = HashMap::with_capacity(fields.len());
        for (ix, codec) in fields.iter().enumerate() {
            by_number.insert(codec.number, ix);
            decoders.insert(
                wire::pack_tag(codec.number, codec.ty.wire_type()),
                Decoder::Field { index: codec.index, packed: false });
            if codec.packed_tag.is_some() {
                decoders.insert(
                    wire::pack_tag(codec.number, WireType::LengthDelimited),
                    Decoder::Field { index: codec.index, packed: true });
            }
        }
        if message_set {
            decoders.insert(
                wire::pack_tag(message_set::ITEM_NUMBER, WireType::StartGroup),
                Decoder::MessageSetItem);
        }

        let required = desc.fields().iter()
            .filter(|field| field.is_required())
            .map(|field| field.index())
            .collect();

        debug!(message_type = desc.full_name(), fields = fields.len(),
               tags = decoders.len(), "built message codec");

        MessageCodec {
            fields: fields,
            by_number: by_number,
            decoders: decoders,
            required: required,
        }
    }

    /// Returns the codec for field `number`.
    pub fn field(&self, number: u32) -> Option<&FieldCodec> {
        self.by_number.get(&number).map(|&ix| &self.fields[ix])
    }

    /// Looks up the decoder for a tag.
    pub fn decoder(&self, tag: u32) -> Option<Decoder> {
        self.decoders.get(&tag).cloned()
    }
}
