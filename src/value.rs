//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Field values and the assignment-time type checker.
//!
//! Every value stored in a `DynamicMessage` passes through `check()` first.
//! The checker converts between compatible representations (for example, an
//! `I64` assigned to an `int32` field becomes an `I32`) and rejects values
//! that do not fit the field's declared type or range. A rejected value never
//! reaches the message, so a failed assignment leaves it unchanged.

use std::fmt;

use message::DynamicMessage;
use schema::{FieldDescriptor, FieldType};

quick_error! {
    /// Errors raised when a value is assigned to a field.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Error {
        /// The value's kind cannot be stored in the field at all.
        TypeMismatch(field: String, expected: FieldType, found: &'static str) {
            description("value has the wrong type for field")
            display("field {} has type {}, but got {} value",
                    field, expected, found)
        }
        /// The value is of a compatible kind but does not fit the field's
        /// range.
        OutOfRange(field: String, expected: FieldType) {
            description("value out of range for field")
            display("value out of range for field {} of type {}",
                    field, expected)
        }
        /// The value is not declared by the field's closed enum.
        UnknownEnumValue(field: String, value: i32) {
            description("value not in closed enum")
            display("{} is not a valid value for field {}", value, field)
        }
        /// A message of the wrong type was assigned to a message field.
        MessageTypeMismatch(field: String, expected: String, found: String) {
            description("message has the wrong type for field")
            display("field {} holds {} messages, but got {}",
                    field, expected, found)
        }
        /// The message type has no field with the given name or number.
        NoSuchField(field: String) {
            description("no such field")
            display("no such field: {}", field)
        }
        /// The message type has no oneof with the given name.
        NoSuchOneof(oneof: String) {
            description("no such oneof")
            display("no such oneof: {}", oneof)
        }
        /// A singular accessor was used on a repeated or map field, or the
        /// reverse.
        WrongCardinality(field: String) {
            description("wrong accessor for field cardinality")
            display("field {} does not support this accessor", field)
        }
        /// A repeated field index was past the end.
        IndexOutOfBounds(field: String, index: usize, len: usize) {
            description("index out of bounds")
            display("index {} out of bounds for field {} of length {}",
                    index, field, len)
        }
        /// A whole value was assigned where only in-place mutation is
        /// allowed.
        CompositeAssignment(field: String) {
            description("cannot assign to composite field")
            display("values of field {} must be modified in place", field)
        }
    }
}

/// Result type for value assignment.
pub type Result<T> = ::std::result::Result<T, Error>;

/// A single field value (or element of a repeated or map field).
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// `bool`
    Bool(bool),
    /// `int32`, `sint32`, `sfixed32`
    I32(i32),
    /// `int64`, `sint64`, `sfixed64`
    I64(i64),
    /// `uint32`, `fixed32`
    U32(u32),
    /// `uint64`, `fixed64`
    U64(u64),
    /// `float`
    F32(f32),
    /// `double`
    F64(f64),
    /// `string`
    String(String),
    /// `bytes`
    Bytes(Vec<u8>),
    /// Enum fields, by number.
    EnumNumber(i32),
    /// Message and group fields.
    Message(DynamicMessage),
}

impl Value {
    /// The zero value of `ty`.
    ///
    /// Message and group types yield empty `Bytes`, the encoding of an empty
    /// message. Callers wanting an actual message go through
    /// `FieldDescriptor::default_value()`.
    pub(crate) fn zero(ty: FieldType) -> Value {
        use schema::FieldType::*;

        match ty {
            Bool => Value::Bool(false),
            Int32 | SInt32 | SFixed32 => Value::I32(0),
            Int64 | SInt64 | SFixed64 => Value::I64(0),
            UInt32 | Fixed32 => Value::U32(0),
            UInt64 | Fixed64 => Value::U64(0),
            Float => Value::F32(0.0),
            Double => Value::F64(0.0),
            String => Value::String(::std::string::String::new()),
            Bytes | Message | Group => Value::Bytes(Vec::new()),
            Enum => Value::EnumNumber(0),
        }
    }

    /// Whether this is the zero value of its kind.
    ///
    /// Negative zero is not zero, since it has a distinct encoding. Messages
    /// are never zero.
    pub fn is_zero(&self) -> bool {
        match *self {
            Value::Bool(v) => !v,
            Value::I32(v) => 0 == v,
            Value::I64(v) => 0 == v,
            Value::U32(v) => 0 == v,
            Value::U64(v) => 0 == v,
            Value::F32(v) => 0 == v.to_bits(),
            Value::F64(v) => 0 == v.to_bits(),
            Value::String(ref v) => v.is_empty(),
            Value::Bytes(ref v) => v.is_empty(),
            Value::EnumNumber(v) => 0 == v,
            Value::Message(_) => false,
        }
    }

    /// A short name for the kind of this value, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match *self {
            Value::Bool(_) => "bool",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::EnumNumber(_) => "enum",
            Value::Message(_) => "message",
        }
    }

    #[allow(missing_docs)]
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Value::I32(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I64(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            Value::U32(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U64(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Value::F32(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> Option<&str> {
        match *self {
            Value::String(ref v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match *self {
            Value::Bytes(ref v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_enum_number(&self) -> Option<i32> {
        match *self {
            Value::EnumNumber(v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match *self {
            Value::Message(ref v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_message_mut(&mut self) -> Option<&mut DynamicMessage> {
        match *self {
            Value::Message(ref mut v) => Some(v),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i128> {
        match *self {
            Value::I32(v) => Some(v as i128),
            Value::I64(v) => Some(v as i128),
            Value::U32(v) => Some(v as i128),
            Value::U64(v) => Some(v as i128),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)*) => { $(
        impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::$variant(v)
            }
        }
    )* }
}

value_from! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => String,
    Vec<u8> => Bytes,
    DynamicMessage => Message,
}

impl<'a> From<&'a str> for Value {
    fn from(v: &'a str) -> Self {
        Value::String(v.to_owned())
    }
}

impl<'a> From<&'a [u8]> for Value {
    fn from(v: &'a [u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

/// The key of a map field entry.
///
/// Keys order by variant and then by value; within one map every key has the
/// same variant, so iteration follows the natural order of the key type.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub enum MapKey {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    String(String),
}

impl MapKey {
    /// Converts a value of a valid key kind into a key.
    pub fn from_value(value: Value) -> Option<MapKey> {
        match value {
            Value::Bool(v) => Some(MapKey::Bool(v)),
            Value::I32(v) => Some(MapKey::I32(v)),
            Value::I64(v) => Some(MapKey::I64(v)),
            Value::U32(v) => Some(MapKey::U32(v)),
            Value::U64(v) => Some(MapKey::U64(v)),
            Value::String(v) => Some(MapKey::String(v)),
            _ => None,
        }
    }
}

impl From<MapKey> for Value {
    fn from(key: MapKey) -> Value {
        match key {
            MapKey::Bool(v) => Value::Bool(v),
            MapKey::I32(v) => Value::I32(v),
            MapKey::I64(v) => Value::I64(v),
            MapKey::U32(v) => Value::U32(v),
            MapKey::U64(v) => Value::U64(v),
            MapKey::String(v) => Value::String(v),
        }
    }
}

macro_rules! key_from {
    ($($ty:ty => $variant:ident),* $(,)*) => { $(
        impl From<$ty> for MapKey {
            fn from(v: $ty) -> Self {
                MapKey::$variant(v)
            }
        }
    )* }
}

key_from! {
    bool => Bool,
    i32 => I32,
    i64 => I64,
    u32 => U32,
    u64 => U64,
    String => String,
}

impl<'a> From<&'a str> for MapKey {
    fn from(v: &'a str) -> Self {
        MapKey::String(v.to_owned())
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            MapKey::Bool(v) => write!(f, "{}", v),
            MapKey::I32(v) => write!(f, "{}", v),
            MapKey::I64(v) => write!(f, "{}", v),
            MapKey::U32(v) => write!(f, "{}", v),
            MapKey::U64(v) => write!(f, "{}", v),
            MapKey::String(ref v) => write!(f, "{:?}", v),
        }
    }
}

macro_rules! integer {
    ($field:expr, $expected:expr, $value:expr, $target:ty, $variant:ident) => {{
        match $value.as_integer() {
            Some(n) if n >= <$target>::MIN as i128 &&
                n <= <$target>::MAX as i128 =>
                Ok(Value::$variant(n as $target)),
            Some(_) => Err(Error::OutOfRange($field.to_owned(), $expected)),
            None => Err(Error::TypeMismatch(
                $field.to_owned(), $expected, $value.kind_name())),
        }
    }}
}

/// Checks and converts `value` for storage in a field of type `ty`, without
/// reference to any schema.
///
/// Integers of any width convert to any integer type they fit in. Floating
/// point fields also accept integers. `float` fields accept `F64`, with
/// finite values too large for `f32` becoming infinite. `string` fields
/// accept `Bytes` holding valid UTF-8. Enum fields accept integers in the
/// `i32` range. Message values are not checked here.
pub fn check_scalar(field: &str, ty: FieldType, value: Value)
                    -> Result<Value> {
    use schema::FieldType::*;

    match ty {
        Bool => match value {
            Value::Bool(_) => Ok(value),
            _ => Err(Error::TypeMismatch(
                field.to_owned(), ty, value.kind_name())),
        },
        Int32 | SInt32 | SFixed32 => integer!(field, ty, value, i32, I32),
        Int64 | SInt64 | SFixed64 => integer!(field, ty, value, i64, I64),
        UInt32 | Fixed32 => integer!(field, ty, value, u32, U32),
        UInt64 | Fixed64 => integer!(field, ty, value, u64, U64),
        Enum => match value {
            Value::EnumNumber(_) => Ok(value),
            _ => integer!(field, ty, value, i32, EnumNumber),
        },
        Float => match value {
            Value::F32(_) => Ok(value),
            Value::F64(v) => Ok(Value::F32(v as f32)),
            _ => match value.as_integer() {
                Some(n) => Ok(Value::F32(n as f32)),
                None => Err(Error::TypeMismatch(
                    field.to_owned(), ty, value.kind_name())),
            },
        },
        Double => match value {
            Value::F64(_) => Ok(value),
            Value::F32(v) => Ok(Value::F64(v as f64)),
            _ => match value.as_integer() {
                Some(n) => Ok(Value::F64(n as f64)),
                None => Err(Error::TypeMismatch(
                    field.to_owned(), ty, value.kind_name())),
            },
        },
        String => match value {
            Value::String(_) => Ok(value),
            Value::Bytes(bytes) => ::std::string::String::from_utf8(bytes)
                .map(Value::String)
                .map_err(|_| Error::TypeMismatch(
                    field.to_owned(), ty, "non-UTF-8 bytes")),
            _ => Err(Error::TypeMismatch(
                field.to_owned(), ty, value.kind_name())),
        },
        Bytes => match value {
            Value::Bytes(_) => Ok(value),
            _ => Err(Error::TypeMismatch(
                field.to_owned(), ty, value.kind_name())),
        },
        Message | Group => match value {
            Value::Message(_) => Ok(value),
            _ => Err(Error::TypeMismatch(
                field.to_owned(), ty, value.kind_name())),
        },
    }
}

/// Checks and converts `value` for storage in `field` (as the field's single
/// value, or as one element of a repeated field).
///
/// In addition to `check_scalar()`, closed enums reject undeclared numbers,
/// and message fields require a message of exactly the declared type.
pub fn check(field: &FieldDescriptor, value: Value) -> Result<Value> {
    let value = check_scalar(field.full_name(), field.field_type(), value)?;

    match value {
        Value::EnumNumber(n) => {
            if let Some(en) = field.enum_type() {
                if en.is_closed() && en.get_value(n).is_none() {
                    return Err(Error::UnknownEnumValue(
                        field.full_name().to_owned(), n));
                }
            }
            Ok(value)
        },
        Value::Message(message) => {
            let expected = field.message_type();
            if expected.as_ref() == Some(message.descriptor()) {
                Ok(Value::Message(message))
            } else {
                Err(Error::MessageTypeMismatch(
                    field.full_name().to_owned(),
                    expected.map_or_else(String::new,
                                         |e| e.full_name().to_owned()),
                    message.descriptor().full_name().to_owned()))
            }
        },
        value => Ok(value),
    }
}

/// Checks and converts `key` for use as a key of the map field `field`.
pub fn check_key(field: &FieldDescriptor, key: MapKey) -> Result<MapKey> {
    let key_field = match field.map_key() {
        Some(key_field) => key_field,
        None => return Err(Error::WrongCardinality(
            field.full_name().to_owned())),
    };

    let value = check(&key_field, key.into())?;
    MapKey::from_value(value).ok_or_else(|| Error::TypeMismatch(
        field.full_name().to_owned(), key_field.field_type(), "non-key"))
}
