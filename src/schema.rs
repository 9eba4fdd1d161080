//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The schema model consumed by the dynamic message engine.
//!
//! Schemas are described with `MessageDef`, `FieldDef` and `EnumDef`, loaded
//! into an immutable `DescriptorPool` by `PoolBuilder::build()`, and from then
//! on referenced through cheap-to-clone handles (`MessageDescriptor`,
//! `FieldDescriptor`, ...). A handle is just the pool plus an index, so
//! messages may refer to each other (or themselves) freely.
//!
//! Per-message derived state, namely the codec and dispatch table, is computed
//! lazily the first time it is needed and shared by every instance of the
//! type.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use codec::MessageCodec;
use message::DynamicMessage;
use value::{self, Value};
use wire::{self, WireType};

quick_error! {
    /// Errors detected while loading a schema.
    #[derive(Debug)]
    pub enum Error {
        /// Two types share the same full name.
        DuplicateName(name: String) {
            description("duplicate type name")
            display("type {} is defined more than once", name)
        }
        /// Two fields of one message share a field number.
        DuplicateFieldNumber(message: String, number: u32) {
            description("duplicate field number")
            display("field number {} is used more than once in {}",
                    number, message)
        }
        /// Two fields of one message share a name.
        DuplicateFieldName(message: String, field: String) {
            description("duplicate field name")
            display("field {} is defined more than once in {}",
                    field, message)
        }
        /// A field number lies outside 1..2^29-1.
        InvalidFieldNumber(field: String, number: u32) {
            description("invalid field number")
            display("field {} has invalid number {}", field, number)
        }
        /// A field number lies in the reserved 19000..19999 range.
        ReservedFieldNumber(field: String, number: u32) {
            description("reserved field number")
            display("field {} uses reserved number {}", field, number)
        }
        /// A message or enum field does not name its type.
        MissingTypeName(field: String) {
            description("missing type name")
            display("field {} does not name its type", field)
        }
        /// A scalar field names a type.
        UnexpectedTypeName(field: String) {
            description("unexpected type name")
            display("scalar field {} may not name a type", field)
        }
        /// A type name could not be resolved.
        UnresolvedType(field: String, type_name: String) {
            description("unresolved type name")
            display("field {} refers to unknown type {}", field, type_name)
        }
        /// A type name resolved to an enum where a message was needed, or
        /// the reverse.
        WrongTypeKind(field: String, type_name: String) {
            description("type name refers to the wrong kind of type")
            display("field {} refers to {}, which is the wrong kind of type",
                    field, type_name)
        }
        /// A default value does not fit the field's type.
        InvalidDefault(field: String, err: value::Error) {
            description("invalid default value")
            display("invalid default for field {}: {}", field, err)
            cause(err)
        }
        /// A default value was given for a repeated or message field.
        UnexpectedDefault(field: String) {
            description("unexpected default value")
            display("field {} cannot have a default value", field)
        }
        /// `packed` was requested for a field which cannot be packed.
        InvalidPacked(field: String) {
            description("field cannot be packed")
            display("field {} cannot be packed", field)
        }
        /// A oneof member was repeated or required.
        InvalidOneofMember(field: String) {
            description("invalid oneof member")
            display("field {} cannot be a oneof member", field)
        }
        /// Implicit presence was requested for a field which always tracks
        /// presence explicitly.
        InvalidPresence(field: String) {
            description("invalid presence")
            display("field {} cannot use implicit presence", field)
        }
        /// A map field's key type cannot be a map key.
        InvalidMapKey(field: String, key: FieldType) {
            description("invalid map key type")
            display("field {} has invalid map key type {}", field, key)
        }
        /// An extension range is empty or outside the valid field numbers.
        InvalidExtensionRange(message: String, start: u32, end: u32) {
            description("invalid extension range")
            display("message {} has invalid extension range {}..{}",
                    message, start, end)
        }
        /// An extension does not name the message it extends.
        MissingExtendee(field: String) {
            description("missing extendee")
            display("extension {} does not name the message it extends",
                    field)
        }
        /// An extension's extendee could not be resolved to a message.
        UnresolvedExtendee(field: String, extendee: String) {
            description("unresolved extendee")
            display("extension {} extends unknown message {}",
                    field, extendee)
        }
        /// An extension's number is outside the extendee's extension ranges.
        ExtensionOutOfRange(field: String, number: u32) {
            description("extension number out of range")
            display("extension {} uses number {}, which is not in an \
                     extension range", field, number)
        }
        /// An extension was declared as a map field.
        MapExtension(field: String) {
            description("map extension")
            display("extension {} cannot be a map field", field)
        }
        /// An enum declared no values.
        EmptyEnum(name: String) {
            description("empty enum")
            display("enum {} declares no values", name)
        }
    }
}

/// Result type for schema loading.
pub type Result<T> = ::std::result::Result<T, Error>;

/// The declared type of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum FieldType {
    Double,
    Float,
    Int64,
    UInt64,
    Int32,
    Fixed64,
    Fixed32,
    Bool,
    String,
    Group,
    Message,
    Bytes,
    UInt32,
    Enum,
    SFixed32,
    SFixed64,
    SInt32,
    SInt64,
}

impl FieldType {
    /// The wire type used for a single, unpacked value of this type.
    pub fn wire_type(self) -> WireType {
        use self::FieldType::*;

        match self {
            Int32 | Int64 | UInt32 | UInt64 | SInt32 | SInt64 | Bool | Enum =>
                WireType::Varint,
            Fixed64 | SFixed64 | Double => WireType::Fixed64,
            Fixed32 | SFixed32 | Float => WireType::Fixed32,
            String | Bytes | Message => WireType::LengthDelimited,
            Group => WireType::StartGroup,
        }
    }

    /// Whether repeated fields of this type may use packed encoding.
    pub fn is_packable(self) -> bool {
        match self.wire_type() {
            WireType::Varint | WireType::Fixed32 | WireType::Fixed64 => true,
            _ => false,
        }
    }

    /// Whether values of this type are sub-messages.
    pub fn is_message(self) -> bool {
        FieldType::Message == self || FieldType::Group == self
    }

    /// Whether this type may be the key of a map field.
    pub fn is_valid_map_key(self) -> bool {
        use self::FieldType::*;

        match self {
            Int32 | Int64 | UInt32 | UInt64 | SInt32 | SInt64 |
            Fixed32 | Fixed64 | SFixed32 | SFixed64 | Bool | String => true,
            Double | Float | Bytes | Enum | Message | Group => false,
        }
    }

    /// The schema-language spelling of this type.
    pub fn name(self) -> &'static str {
        use self::FieldType::*;

        match self {
            Double => "double",
            Float => "float",
            Int64 => "int64",
            UInt64 => "uint64",
            Int32 => "int32",
            Fixed64 => "fixed64",
            Fixed32 => "fixed32",
            Bool => "bool",
            String => "string",
            Group => "group",
            Message => "message",
            Bytes => "bytes",
            UInt32 => "uint32",
            Enum => "enum",
            SFixed32 => "sfixed32",
            SFixed64 => "sfixed64",
            SInt32 => "sint32",
            SInt64 => "sint64",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The cardinality of a field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Label {
    Optional,
    Required,
    Repeated,
}

/// How presence of a singular field is tracked.
///
/// With `Explicit` presence, a field is present once assigned, even if it was
/// assigned its default value. With `Implicit` presence, assigning the type's
/// zero value clears the field, so "present" means "not zero".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Presence {
    Explicit,
    Implicit,
}

#[derive(Clone, Debug)]
struct MapDef {
    key: FieldType,
    value: FieldType,
}

/// Definition of one field, as input to `PoolBuilder`.
#[derive(Clone, Debug)]
pub struct FieldDef {
    name: String,
    number: u32,
    ty: FieldType,
    label: Label,
    type_name: Option<String>,
    default: Option<Value>,
    packed: Option<bool>,
    presence: Presence,
    oneof: Option<usize>,
    extendee: Option<String>,
    map: Option<MapDef>,
}

impl FieldDef {
    fn new(name: &str, number: u32, ty: FieldType, label: Label) -> Self {
        FieldDef {
            name: name.to_owned(),
            number: number,
            ty: ty,
            label: label,
            type_name: None,
            default: None,
            packed: None,
            presence: Presence::Explicit,
            oneof: None,
            extendee: None,
            map: None,
        }
    }

    /// An optional singular field.
    pub fn optional(name: &str, number: u32, ty: FieldType) -> Self {
        Self::new(name, number, ty, Label::Optional)
    }

    /// A required singular field.
    pub fn required(name: &str, number: u32, ty: FieldType) -> Self {
        Self::new(name, number, ty, Label::Required)
    }

    /// A repeated field.
    pub fn repeated(name: &str, number: u32, ty: FieldType) -> Self {
        Self::new(name, number, ty, Label::Repeated)
    }

    /// A map field from `key` to `value`.
    ///
    /// The entry message is synthesised at load time as a nested message
    /// named after the field (`foo_bar` becomes `FooBarEntry`). If `value` is
    /// a message or enum type, name it with `type_name()`.
    pub fn map(name: &str, number: u32, key: FieldType, value: FieldType)
               -> Self {
        let mut this = Self::new(name, number, FieldType::Message,
                                 Label::Repeated);
        this.map = Some(MapDef { key: key, value: value });
        this
    }

    /// Names the message or enum type of this field.
    ///
    /// Names are resolved relative to the declaring scope, searching
    /// outwards; a leading `.` makes the name fully qualified.
    pub fn type_name(mut self, name: &str) -> Self {
        self.type_name = Some(name.to_owned());
        self
    }

    /// Sets the value reported for this field while it is not present.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Explicitly enables or disables packed encoding.
    ///
    /// Repeated fields of packable types are packed unless this is set to
    /// false.
    pub fn packed(mut self, packed: bool) -> Self {
        self.packed = Some(packed);
        self
    }

    /// Switches this field to implicit presence.
    pub fn implicit_presence(mut self) -> Self {
        self.presence = Presence::Implicit;
        self
    }

    /// Marks this field as an extension of the named message.
    pub fn extendee(mut self, message: &str) -> Self {
        self.extendee = Some(message.to_owned());
        self
    }
}

/// Definition of one enum type, as input to `PoolBuilder`.
#[derive(Clone, Debug)]
pub struct EnumDef {
    name: String,
    values: Vec<(String, i32)>,
    closed: bool,
}

impl EnumDef {
    /// An open enum with no values yet.
    pub fn new(name: &str) -> Self {
        EnumDef {
            name: name.to_owned(),
            values: Vec::new(),
            closed: false,
        }
    }

    /// Adds a named value.
    pub fn value(mut self, name: &str, number: i32) -> Self {
        self.values.push((name.to_owned(), number));
        self
    }

    /// Makes this enum closed: only declared values may be stored, and
    /// undeclared values on the wire are kept as unknown fields.
    pub fn closed(mut self) -> Self {
        self.closed = true;
        self
    }
}

/// Definition of one message type, as input to `PoolBuilder`.
#[derive(Clone, Debug)]
pub struct MessageDef {
    name: String,
    fields: Vec<FieldDef>,
    oneofs: Vec<String>,
    messages: Vec<MessageDef>,
    enums: Vec<EnumDef>,
    extensions: Vec<FieldDef>,
    extension_ranges: Vec<(u32, u32)>,
    map_entry: bool,
    message_set_wire_format: bool,
    retain_unknown_fields: bool,
}

impl MessageDef {
    /// An empty message definition.
    pub fn new(name: &str) -> Self {
        MessageDef {
            name: name.to_owned(),
            fields: Vec::new(),
            oneofs: Vec::new(),
            messages: Vec::new(),
            enums: Vec::new(),
            extensions: Vec::new(),
            extension_ranges: Vec::new(),
            map_entry: false,
            message_set_wire_format: false,
            retain_unknown_fields: true,
        }
    }

    /// Adds a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    /// Adds a oneof with the given member fields.
    pub fn oneof(mut self, name: &str, fields: Vec<FieldDef>) -> Self {
        let index = self.oneofs.len();
        self.oneofs.push(name.to_owned());
        for mut field in fields {
            field.oneof = Some(index);
            self.fields.push(field);
        }
        self
    }

    /// Adds a nested message type.
    pub fn nested(mut self, message: MessageDef) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a nested enum type.
    pub fn nested_enum(mut self, en: EnumDef) -> Self {
        self.enums.push(en);
        self
    }

    /// Declares an extension within this message's scope.
    pub fn extension(mut self, field: FieldDef) -> Self {
        self.extensions.push(field);
        self
    }

    /// Reserves field numbers `start..end` for extensions.
    pub fn extension_range(mut self, start: u32, end: u32) -> Self {
        self.extension_ranges.push((start, end));
        self
    }

    /// Encodes this message's message-typed extensions in the legacy
    /// MessageSet format.
    pub fn message_set_wire_format(mut self) -> Self {
        self.message_set_wire_format = true;
        self
    }

    /// Drops unknown fields when parsing instead of retaining them.
    pub fn discard_unknown_fields(mut self) -> Self {
        self.retain_unknown_fields = false;
        self
    }
}

pub(crate) struct FieldSchema {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) number: u32,
    pub(crate) ty: FieldType,
    pub(crate) label: Label,
    pub(crate) presence: Presence,
    pub(crate) packed: Option<bool>,
    pub(crate) default: Option<Value>,
    pub(crate) oneof: Option<usize>,
    pub(crate) message_type: Option<usize>,
    pub(crate) enum_type: Option<usize>,
    pub(crate) is_extension: bool,
}

pub(crate) struct OneofSchema {
    pub(crate) name: String,
    pub(crate) fields: Vec<usize>,
}

pub(crate) struct MessageSchema {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) fields: Vec<FieldSchema>,
    pub(crate) oneofs: Vec<OneofSchema>,
    pub(crate) messages: Vec<usize>,
    pub(crate) enums: Vec<usize>,
    pub(crate) extension_ranges: Vec<(u32, u32)>,
    pub(crate) map_entry: bool,
    pub(crate) message_set_wire_format: bool,
    pub(crate) retain_unknown_fields: bool,
    pub(crate) by_name: HashMap<String, usize>,
    pub(crate) by_number: HashMap<u32, usize>,
    pub(crate) codec: OnceLock<MessageCodec>,
}

pub(crate) struct EnumSchema {
    pub(crate) name: String,
    pub(crate) full_name: String,
    pub(crate) values: Vec<(String, i32)>,
    pub(crate) closed: bool,
}

impl EnumSchema {
    pub(crate) fn contains(&self, number: i32) -> bool {
        self.values.iter().any(|&(_, n)| n == number)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TypeRef {
    Message(usize),
    Enum(usize),
}

struct PoolInner {
    messages: Vec<MessageSchema>,
    enums: Vec<EnumSchema>,
    types: HashMap<String, TypeRef>,
}

/// An immutable set of message and enum types.
///
/// Cloning a pool is cheap; clones share the same types.
#[derive(Clone)]
pub struct DescriptorPool {
    inner: Arc<PoolInner>,
}

impl PartialEq for DescriptorPool {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
impl Eq for DescriptorPool { }

impl fmt::Debug for DescriptorPool {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("DescriptorPool")
            .field("messages", &self.inner.messages.len())
            .field("enums", &self.inner.enums.len())
            .finish()
    }
}

impl DescriptorPool {
    /// Looks up a message type by its full name.
    pub fn get_message_by_name(&self, name: &str)
                               -> Option<MessageDescriptor> {
        match self.inner.types.get(name.trim_start_matches('.')) {
            Some(&TypeRef::Message(index)) => Some(MessageDescriptor {
                pool: self.clone(),
                index: index,
            }),
            _ => None,
        }
    }

    /// Looks up an enum type by its full name.
    pub fn get_enum_by_name(&self, name: &str) -> Option<EnumDescriptor> {
        match self.inner.types.get(name.trim_start_matches('.')) {
            Some(&TypeRef::Enum(index)) => Some(EnumDescriptor {
                pool: self.clone(),
                index: index,
            }),
            _ => None,
        }
    }

    /// Returns every message type in the pool, including nested and
    /// synthesised map entry types.
    pub fn messages(&self) -> Vec<MessageDescriptor> {
        (0..self.inner.messages.len()).map(|index| MessageDescriptor {
            pool: self.clone(),
            index: index,
        }).collect()
    }
}

/// Handle to a message type.
#[derive(Clone)]
pub struct MessageDescriptor {
    pool: DescriptorPool,
    index: usize,
}

impl PartialEq for MessageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.pool == other.pool
    }
}
impl Eq for MessageDescriptor { }

impl fmt::Debug for MessageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("MessageDescriptor")
            .field(&self.full_name())
            .finish()
    }
}

impl MessageDescriptor {
    pub(crate) fn schema(&self) -> &MessageSchema {
        &self.pool.inner.messages[self.index]
    }

    /// The pool this type belongs to.
    pub fn pool(&self) -> &DescriptorPool {
        &self.pool
    }

    /// The unqualified name of this type.
    pub fn name(&self) -> &str {
        &self.schema().name
    }

    /// The fully-qualified name of this type.
    pub fn full_name(&self) -> &str {
        &self.schema().full_name
    }

    /// The number of fields, extensions included.
    pub fn field_count(&self) -> usize {
        self.schema().fields.len()
    }

    /// Returns the field at `index` in declaration order.
    ///
    /// Declared fields come first, followed by extensions.
    ///
    /// ## Panics
    ///
    /// Panics if `index >= field_count()`.
    pub fn field(&self, index: usize) -> FieldDescriptor {
        assert!(index < self.field_count());
        FieldDescriptor {
            message: self.clone(),
            index: index,
        }
    }

    /// Returns all fields in declaration order.
    pub fn fields(&self) -> Vec<FieldDescriptor> {
        (0..self.field_count()).map(|index| self.field(index)).collect()
    }

    /// Looks up a field by name. Extensions are found by their full name.
    pub fn get_field_by_name(&self, name: &str) -> Option<FieldDescriptor> {
        self.schema().by_name.get(name).map(|&index| self.field(index))
    }

    /// Looks up a field by number.
    pub fn get_field(&self, number: u32) -> Option<FieldDescriptor> {
        self.schema().by_number.get(&number).map(|&index| self.field(index))
    }

    /// Returns the oneofs declared by this type.
    pub fn oneofs(&self) -> Vec<OneofDescriptor> {
        (0..self.schema().oneofs.len()).map(|index| OneofDescriptor {
            message: self.clone(),
            index: index,
        }).collect()
    }

    /// Looks up a oneof by name.
    pub fn get_oneof_by_name(&self, name: &str) -> Option<OneofDescriptor> {
        self.schema().oneofs.iter().position(|o| o.name == name)
            .map(|index| OneofDescriptor {
                message: self.clone(),
                index: index,
            })
    }

    /// The message types nested in this one.
    pub fn nested_messages(&self) -> Vec<MessageDescriptor> {
        self.schema().messages.iter().map(|&index| MessageDescriptor {
            pool: self.pool.clone(),
            index: index,
        }).collect()
    }

    /// The enum types nested in this one.
    pub fn nested_enums(&self) -> Vec<EnumDescriptor> {
        self.schema().enums.iter().map(|&index| EnumDescriptor {
            pool: self.pool.clone(),
            index: index,
        }).collect()
    }

    /// The half-open field number ranges reserved for extensions.
    pub fn extension_ranges(&self) -> &[(u32, u32)] {
        &self.schema().extension_ranges
    }

    /// Whether `number` falls in one of this type's extension ranges.
    pub fn is_extension_number(&self, number: u32) -> bool {
        self.extension_ranges().iter()
            .any(|&(start, end)| number >= start && number < end)
    }

    /// Whether this is a synthesised map entry type.
    pub fn is_map_entry(&self) -> bool {
        self.schema().map_entry
    }

    /// Whether extensions of this type use the MessageSet wire format.
    pub fn is_message_set_wire_format(&self) -> bool {
        self.schema().message_set_wire_format
    }

    /// Whether parsing retains fields unknown to this type.
    pub fn retains_unknown_fields(&self) -> bool {
        self.schema().retain_unknown_fields
    }

    /// The codec and dispatch table for this type, built on first use.
    pub(crate) fn codec(&self) -> &MessageCodec {
        self.schema().codec.get_or_init(|| MessageCodec::build(self))
    }
}

/// Handle to a field (or extension) of a message type.
#[derive(Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    message: MessageDescriptor,
    index: usize,
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("FieldDescriptor")
            .field(&self.full_name())
            .finish()
    }
}

impl FieldDescriptor {
    pub(crate) fn schema(&self) -> &FieldSchema {
        &self.message.schema().fields[self.index]
    }

    /// The message type declaring this field (the extendee, for
    /// extensions).
    pub fn containing_message(&self) -> &MessageDescriptor {
        &self.message
    }

    /// The position of this field in declaration order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The field's name. For extensions this is the unqualified name.
    pub fn name(&self) -> &str {
        &self.schema().name
    }

    /// The field's fully-qualified name.
    pub fn full_name(&self) -> &str {
        &self.schema().full_name
    }

    /// The field number.
    pub fn number(&self) -> u32 {
        self.schema().number
    }

    /// The declared type.
    pub fn field_type(&self) -> FieldType {
        self.schema().ty
    }

    /// The declared label.
    pub fn label(&self) -> Label {
        self.schema().label
    }

    /// How presence is tracked for this field.
    pub fn presence(&self) -> Presence {
        self.schema().presence
    }

    /// Whether this field is an extension.
    pub fn is_extension(&self) -> bool {
        self.schema().is_extension
    }

    /// Whether this field is required.
    pub fn is_required(&self) -> bool {
        Label::Required == self.label()
    }

    /// Whether this is a repeated field which is not a map.
    pub fn is_list(&self) -> bool {
        Label::Repeated == self.label() && !self.is_map()
    }

    /// Whether this is a map field.
    pub fn is_map(&self) -> bool {
        Label::Repeated == self.label() &&
            self.message_type().map_or(false, |m| m.is_map_entry())
    }

    /// Whether this repeated field is written in packed form.
    pub fn is_packed(&self) -> bool {
        Label::Repeated == self.label() &&
            self.field_type().is_packable() &&
            Some(false) != self.schema().packed
    }

    /// The message type of a message, group or map field.
    pub fn message_type(&self) -> Option<MessageDescriptor> {
        self.schema().message_type.map(|index| MessageDescriptor {
            pool: self.message.pool.clone(),
            index: index,
        })
    }

    /// The enum type of an enum field.
    pub fn enum_type(&self) -> Option<EnumDescriptor> {
        self.schema().enum_type.map(|index| EnumDescriptor {
            pool: self.message.pool.clone(),
            index: index,
        })
    }

    /// The oneof this field belongs to, if any.
    pub fn containing_oneof(&self) -> Option<OneofDescriptor> {
        self.schema().oneof.map(|index| OneofDescriptor {
            message: self.message.clone(),
            index: index,
        })
    }

    /// For map fields, the key field of the entry type.
    pub fn map_key(&self) -> Option<FieldDescriptor> {
        if self.is_map() {
            self.message_type().map(|entry| entry.field(0))
        } else {
            None
        }
    }

    /// For map fields, the value field of the entry type.
    pub fn map_value(&self) -> Option<FieldDescriptor> {
        if self.is_map() {
            self.message_type().map(|entry| entry.field(1))
        } else {
            None
        }
    }

    /// The value reported for this singular field while it is not present.
    ///
    /// This is the declared default if there is one, otherwise the zero value
    /// of the type (the first declared value, for enums; an empty message,
    /// for message fields).
    pub fn default_value(&self) -> Value {
        if let Some(ref value) = self.schema().default {
            return value.clone();
        }

        match self.message_type() {
            Some(ty) => Value::Message(DynamicMessage::new(ty)),
            None => match self.enum_type() {
                Some(en) => Value::EnumNumber(en.default_value()),
                None => Value::zero(self.field_type()),
            },
        }
    }
}

/// Handle to an enum type.
#[derive(Clone)]
pub struct EnumDescriptor {
    pool: DescriptorPool,
    index: usize,
}

impl PartialEq for EnumDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.pool == other.pool
    }
}
impl Eq for EnumDescriptor { }

impl fmt::Debug for EnumDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("EnumDescriptor")
            .field(&self.full_name())
            .finish()
    }
}

impl EnumDescriptor {
    pub(crate) fn schema(&self) -> &EnumSchema {
        &self.pool.inner.enums[self.index]
    }

    /// The unqualified name of this enum.
    pub fn name(&self) -> &str {
        &self.schema().name
    }

    /// The fully-qualified name of this enum.
    pub fn full_name(&self) -> &str {
        &self.schema().full_name
    }

    /// The declared values, in declaration order.
    pub fn values(&self) -> &[(String, i32)] {
        &self.schema().values
    }

    /// Returns the name of the first value declared with `number`.
    pub fn get_value(&self, number: i32) -> Option<&str> {
        self.schema().values.iter()
            .find(|&&(_, n)| n == number)
            .map(|&(ref name, _)| &name[..])
    }

    /// Returns the number of the value called `name`.
    pub fn get_value_by_name(&self, name: &str) -> Option<i32> {
        self.schema().values.iter()
            .find(|&&(ref n, _)| n == name)
            .map(|&(_, number)| number)
    }

    /// Whether this enum only admits its declared values.
    pub fn is_closed(&self) -> bool {
        self.schema().closed
    }

    /// The number of the first declared value.
    pub fn default_value(&self) -> i32 {
        self.schema().values.first().map_or(0, |&(_, n)| n)
    }
}

/// Handle to a oneof of a message type.
#[derive(Clone, PartialEq, Eq)]
pub struct OneofDescriptor {
    message: MessageDescriptor,
    index: usize,
}

impl fmt::Debug for OneofDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("OneofDescriptor")
            .field(&self.name())
            .finish()
    }
}

impl OneofDescriptor {
    fn schema(&self) -> &OneofSchema {
        &self.message.schema().oneofs[self.index]
    }

    /// The position of this oneof in its message.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The oneof's name.
    pub fn name(&self) -> &str {
        &self.schema().name
    }

    /// The member fields.
    pub fn fields(&self) -> Vec<FieldDescriptor> {
        self.schema().fields.iter()
            .map(|&index| self.message.field(index))
            .collect()
    }
}

/// Collects type definitions and loads them into a `DescriptorPool`.
#[derive(Clone, Debug, Default)]
pub struct PoolBuilder {
    package: String,
    messages: Vec<MessageDef>,
    enums: Vec<EnumDef>,
    extensions: Vec<FieldDef>,
}

struct PendingMessage {
    name: String,
    full_name: String,
    fields: Vec<FieldDef>,
    oneofs: Vec<String>,
    messages: Vec<usize>,
    enums: Vec<usize>,
    extension_ranges: Vec<(u32, u32)>,
    map_entry: bool,
    message_set_wire_format: bool,
    retain_unknown_fields: bool,
}

#[derive(Default)]
struct Loader {
    pending: Vec<PendingMessage>,
    enums: Vec<EnumSchema>,
    types: HashMap<String, TypeRef>,
    extensions: Vec<(String, FieldDef)>,
}

fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_owned()
    } else {
        format!("{}.{}", scope, name)
    }
}

fn map_entry_name(field: &str) -> String {
    let mut name = String::with_capacity(field.len() + 5);
    for part in field.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            name.extend(first.to_uppercase());
            name.push_str(chars.as_str());
        }
    }
    name.push_str("Entry");
    name
}

impl Loader {
    fn register(&mut self, full_name: &str, ty: TypeRef) -> Result<()> {
        if self.types.contains_key(full_name) {
            return Err(Error::DuplicateName(full_name.to_owned()));
        }
        self.types.insert(full_name.to_owned(), ty);
        Ok(())
    }

    fn collect_enum(&mut self, def: EnumDef, scope: &str) -> Result<usize> {
        let full_name = qualify(scope, &def.name);
        if def.values.is_empty() {
            return Err(Error::EmptyEnum(full_name));
        }
        let index = self.enums.len();
        self.register(&full_name, TypeRef::Enum(index))?;
        self.enums.push(EnumSchema {
            name: def.name,
            full_name: full_name,
            values: def.values,
            closed: def.closed,
        });
        Ok(index)
    }

    fn collect_message(&mut self, def: MessageDef, scope: &str)
                       -> Result<usize> {
        let full_name = qualify(scope, &def.name);
        let index = self.pending.len();
        self.register(&full_name, TypeRef::Message(index))?;
        self.pending.push(PendingMessage {
            name: def.name,
            full_name: full_name.clone(),
            fields: Vec::new(),
            oneofs: def.oneofs,
            messages: Vec::new(),
            enums: Vec::new(),
            extension_ranges: def.extension_ranges,
            map_entry: def.map_entry,
            message_set_wire_format: def.message_set_wire_format,
            retain_unknown_fields: def.retain_unknown_fields,
        });

        let mut nested = def.messages;
        let mut fields = Vec::with_capacity(def.fields.len());
        for mut field in def.fields {
            if let Some(map) = field.map.take() {
                let field_name = qualify(&full_name, &field.name);
                if !map.key.is_valid_map_key() {
                    return Err(Error::InvalidMapKey(field_name, map.key));
                }

                let entry_name = map_entry_name(&field.name);
                let mut value = FieldDef::optional("value", 2, map.value);
                value.type_name = field.type_name.take();
                let mut entry = MessageDef::new(&entry_name)
                    .field(FieldDef::optional("key", 1, map.key))
                    .field(value);
                entry.map_entry = true;
                nested.push(entry);
                field.type_name = Some(entry_name);
            }
            fields.push(field);
        }

        let mut messages = Vec::with_capacity(nested.len());
        for message in nested {
            messages.push(self.collect_message(message, &full_name)?);
        }
        let mut enums = Vec::with_capacity(def.enums.len());
        for en in def.enums {
            enums.push(self.collect_enum(en, &full_name)?);
        }
        for extension in def.extensions {
            self.extensions.push((full_name.clone(), extension));
        }

        let pending = &mut self.pending[index];
        pending.fields = fields;
        pending.messages = messages;
        pending.enums = enums;
        Ok(index)
    }

    fn lookup(&self, scope: &str, name: &str) -> Option<TypeRef> {
        if name.starts_with('.') {
            return self.types.get(&name[1..]).cloned();
        }

        let mut scope = scope;
        loop {
            if let Some(&ty) = self.types.get(&qualify(scope, name)) {
                return Some(ty);
            }
            if scope.is_empty() {
                return None;
            }
            scope = match scope.rfind('.') {
                Some(ix) => &scope[..ix],
                None => "",
            };
        }
    }

    fn resolve_field(&self, def: FieldDef, scope: &str, full_name: String,
                     is_extension: bool) -> Result<FieldSchema> {
        if def.number < wire::MIN_FIELD_NUMBER ||
            def.number > wire::MAX_FIELD_NUMBER
        {
            return Err(Error::InvalidFieldNumber(full_name, def.number));
        }
        if def.number >= wire::FIRST_RESERVED_FIELD_NUMBER &&
            def.number <= wire::LAST_RESERVED_FIELD_NUMBER
        {
            return Err(Error::ReservedFieldNumber(full_name, def.number));
        }

        let mut message_type = None;
        let mut enum_type = None;
        match (def.ty, def.type_name) {
            (FieldType::Message, Some(name)) |
            (FieldType::Group, Some(name)) => match self.lookup(scope, &name) {
                Some(TypeRef::Message(index)) => message_type = Some(index),
                Some(TypeRef::Enum(_)) =>
                    return Err(Error::WrongTypeKind(full_name, name)),
                None => return Err(Error::UnresolvedType(full_name, name)),
            },
            (FieldType::Enum, Some(name)) => match self.lookup(scope, &name) {
                Some(TypeRef::Enum(index)) => enum_type = Some(index),
                Some(TypeRef::Message(_)) =>
                    return Err(Error::WrongTypeKind(full_name, name)),
                None => return Err(Error::UnresolvedType(full_name, name)),
            },
            (FieldType::Message, None) | (FieldType::Group, None) |
            (FieldType::Enum, None) =>
                return Err(Error::MissingTypeName(full_name)),
            (_, Some(_)) => return Err(Error::UnexpectedTypeName(full_name)),
            (_, None) => (),
        }

        let repeated = Label::Repeated == def.label;
        if Some(true) == def.packed &&
            !(repeated && def.ty.is_packable())
        {
            return Err(Error::InvalidPacked(full_name));
        }
        if def.oneof.is_some() && Label::Optional != def.label {
            return Err(Error::InvalidOneofMember(full_name));
        }
        if Presence::Implicit == def.presence &&
            (Label::Optional != def.label || def.ty.is_message() ||
             def.oneof.is_some())
        {
            return Err(Error::InvalidPresence(full_name));
        }

        let default = match def.default {
            None => None,
            Some(_) if repeated || def.ty.is_message() =>
                return Err(Error::UnexpectedDefault(full_name)),
            Some(value) => {
                let value = match value::check_scalar(
                    &full_name, def.ty, value)
                {
                    Ok(value) => value,
                    Err(err) => return Err(Error::InvalidDefault(
                        full_name, err)),
                };
                if let (Some(index), &Value::EnumNumber(n)) =
                    (enum_type, &value)
                {
                    if !self.enums[index].contains(n) {
                        let err = value::Error::UnknownEnumValue(
                            full_name.clone(), n);
                        return Err(Error::InvalidDefault(full_name, err));
                    }
                }
                Some(value)
            },
        };

        Ok(FieldSchema {
            name: def.name,
            full_name: full_name,
            number: def.number,
            ty: def.ty,
            label: def.label,
            presence: def.presence,
            packed: def.packed,
            default: default,
            oneof: def.oneof,
            message_type: message_type,
            enum_type: enum_type,
            is_extension: is_extension,
        })
    }

    fn add_field(message: &mut MessageSchema, field: FieldSchema,
                 name: String) -> Result<()> {
        let index = message.fields.len();
        if message.by_name.contains_key(&name) {
            return Err(Error::DuplicateFieldName(
                message.full_name.clone(), name));
        }
        if message.by_number.contains_key(&field.number) {
            return Err(Error::DuplicateFieldNumber(
                message.full_name.clone(), field.number));
        }
        message.by_name.insert(name, index);
        message.by_number.insert(field.number, index);
        if let Some(oneof) = field.oneof {
            message.oneofs[oneof].fields.push(index);
        }
        message.fields.push(field);
        Ok(())
    }

    fn resolve_message(&self, pending: PendingMessage)
                       -> Result<MessageSchema> {
        for &(start, end) in &pending.extension_ranges {
            if start < wire::MIN_FIELD_NUMBER || end <= start ||
                end > wire::MAX_FIELD_NUMBER + 1
            {
                return Err(Error::InvalidExtensionRange(
                    pending.full_name, start, end));
            }
        }

        let mut message = MessageSchema {
            name: pending.name,
            full_name: pending.full_name,
            fields: Vec::with_capacity(pending.fields.len()),
            oneofs: pending.oneofs.into_iter().map(|name| OneofSchema {
                name: name,
                fields: Vec::new(),
            }).collect(),
            messages: pending.messages,
            enums: pending.enums,
            extension_ranges: pending.extension_ranges,
            map_entry: pending.map_entry,
            message_set_wire_format: pending.message_set_wire_format,
            retain_unknown_fields: pending.retain_unknown_fields,
            by_name: HashMap::new(),
            by_number: HashMap::new(),
            codec: OnceLock::new(),
        };

        for def in pending.fields {
            let name = def.name.clone();
            let full_name = qualify(&message.full_name, &def.name);
            let field = self.resolve_field(
                def, &message.full_name, full_name, false)?;
            Self::add_field(&mut message, field, name)?;
        }

        Ok(message)
    }

    fn resolve_extension(&self, messages: &mut Vec<MessageSchema>,
                         scope: &str, def: FieldDef) -> Result<()> {
        let full_name = qualify(scope, &def.name);
        if def.map.is_some() {
            return Err(Error::MapExtension(full_name));
        }
        let extendee = match def.extendee {
            Some(ref extendee) => match self.lookup(scope, extendee) {
                Some(TypeRef::Message(index)) => index,
                _ => return Err(Error::UnresolvedExtendee(
                    full_name, extendee.clone())),
            },
            None => return Err(Error::MissingExtendee(full_name)),
        };

        let in_range = messages[extendee].extension_ranges.iter()
            .any(|&(start, end)| def.number >= start && def.number < end);
        if !in_range {
            return Err(Error::ExtensionOutOfRange(full_name, def.number));
        }

        let field = self.resolve_field(def, scope, full_name.clone(), true)?;
        Self::add_field(&mut messages[extendee], field, full_name)
    }
}

impl PoolBuilder {
    /// An empty builder with no package.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the package prefixed to the names of top-level types.
    pub fn package(mut self, package: &str) -> Self {
        self.package = package.to_owned();
        self
    }

    /// Adds a top-level message type.
    pub fn message(mut self, message: MessageDef) -> Self {
        self.messages.push(message);
        self
    }

    /// Adds a top-level enum type.
    pub fn enumeration(mut self, en: EnumDef) -> Self {
        self.enums.push(en);
        self
    }

    /// Adds a top-level extension. It must name its extendee.
    pub fn extension(mut self, field: FieldDef) -> Self {
        self.extensions.push(field);
        self
    }

    /// Validates the definitions, resolves type names, and loads the result
    /// into a pool.
    pub fn build(self) -> Result<DescriptorPool> {
        let mut loader = Loader::default();
        for en in self.enums {
            loader.collect_enum(en, &self.package)?;
        }
        for message in self.messages {
            loader.collect_message(message, &self.package)?;
        }
        for extension in self.extensions {
            loader.extensions.push((self.package.clone(), extension));
        }

        let pending = ::std::mem::replace(&mut loader.pending, Vec::new());
        let mut messages = Vec::with_capacity(pending.len());
        for message in pending {
            messages.push(loader.resolve_message(message)?);
        }

        let extensions = ::std::mem::replace(
            &mut loader.extensions, Vec::new());
        for (scope, def) in extensions {
            loader.resolve_extension(&mut messages, &scope, def)?;
        }

        debug!(messages = messages.len(), enums = loader.enums.len(),
               "loaded descriptor pool");

        Ok(DescriptorPool {
            inner: Arc::new(PoolInner {
                messages: messages,
                enums: loader.enums,
                types: loader.types,
            }),
        })
    }
}

#[cfg(test)]
mod test {
    use test_helpers::sample_pool;
    use value::Value;
    use super::*;

    fn build_one(message: MessageDef) -> Result<DescriptorPool> {
        PoolBuilder::new().package("t").message(message).build()
    }

    #[test]
    fn resolves_nested_and_relative_names() {
        let pool = PoolBuilder::new()
            .package("pkg")
            .message(MessageDef::new("Outer")
                     .nested(MessageDef::new("Inner")
                             .field(FieldDef::optional(
                                 "x", 1, FieldType::Int32)))
                     .nested_enum(EnumDef::new("Colour")
                                  .value("RED", 0).value("BLUE", 1))
                     .field(FieldDef::optional("inner", 1, FieldType::Message)
                            .type_name("Inner"))
                     .field(FieldDef::optional("colour", 2, FieldType::Enum)
                            .type_name("Colour"))
                     .field(FieldDef::optional("outer", 3, FieldType::Message)
                            .type_name(".pkg.Outer")))
            .build().unwrap();

        let outer = pool.get_message_by_name("pkg.Outer").unwrap();
        assert_eq!("Outer", outer.name());
        assert_eq!(3, outer.field_count());

        let inner = outer.get_field_by_name("inner").unwrap();
        assert_eq!("pkg.Outer.inner", inner.full_name());
        assert_eq!("pkg.Outer.Inner",
                   inner.message_type().unwrap().full_name());
        assert_eq!(Some(outer.clone()),
                   outer.get_field(3).unwrap().message_type());
        assert_eq!("pkg.Outer.Colour",
                   outer.get_field(2).unwrap().enum_type().unwrap()
                   .full_name());
        assert_eq!(1, outer.nested_messages().len());
        assert_eq!(1, outer.nested_enums().len());
    }

    #[test]
    fn map_field_synthesises_entry_type() {
        let pool = sample_pool();
        let desc = pool.get_message_by_name("test.Everything").unwrap();
        let field = desc.get_field_by_name("string_to_int").unwrap();
        assert!(field.is_map());
        assert!(!field.is_list());
        assert!(!field.is_packed());

        let entry = field.message_type().unwrap();
        assert_eq!("test.Everything.StringToIntEntry", entry.full_name());
        assert!(entry.is_map_entry());
        assert_eq!(FieldType::String, field.map_key().unwrap().field_type());
        assert_eq!(FieldType::Int32, field.map_value().unwrap().field_type());
    }

    #[test]
    fn packed_defaults_follow_packability() {
        let pool = sample_pool();
        let desc = pool.get_message_by_name("test.Everything").unwrap();
        assert!(desc.get_field_by_name("packed_int32").unwrap().is_packed());
        assert!(!desc.get_field_by_name("unpacked_int32").unwrap()
                .is_packed());
        assert!(!desc.get_field_by_name("strings").unwrap().is_packed());
        assert!(!desc.get_field_by_name("opt_int32").unwrap().is_packed());
    }

    #[test]
    fn default_values() {
        let pool = sample_pool();
        let desc = pool.get_message_by_name("test.Everything").unwrap();
        assert_eq!(Value::I32(42),
                   desc.get_field_by_name("with_default").unwrap()
                   .default_value());
        assert_eq!(Value::I32(0),
                   desc.get_field_by_name("opt_int32").unwrap()
                   .default_value());
        assert_eq!(Value::EnumNumber(1),
                   desc.get_field_by_name("closed_enum").unwrap()
                   .default_value());
        assert_eq!(Value::String(String::new()),
                   desc.get_field_by_name("opt_string").unwrap()
                   .default_value());
    }

    #[test]
    fn oneofs_and_extensions_are_indexed() {
        let pool = sample_pool();
        let desc = pool.get_message_by_name("test.Everything").unwrap();
        let choice = desc.get_oneof_by_name("choice").unwrap();
        let names: Vec<String> = choice.fields().iter()
            .map(|f| f.name().to_owned()).collect();
        assert_eq!(vec!["choice_int".to_owned(), "choice_str".to_owned(),
                        "choice_msg".to_owned()], names);

        let ext = desc.get_field_by_name("test.ext_int").unwrap();
        assert!(ext.is_extension());
        assert_eq!(100, ext.number());
        assert_eq!(Some(ext), desc.get_field(100));
        assert!(desc.is_extension_number(150));
        assert!(!desc.is_extension_number(200));
    }

    #[test]
    fn rejects_bad_field_numbers() {
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 0, FieldType::Int32))) {
            Err(Error::InvalidFieldNumber(_, 0)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 1 << 29,
                                                  FieldType::Int32))) {
            Err(Error::InvalidFieldNumber(..)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 19500,
                                                  FieldType::Int32))) {
            Err(Error::ReservedFieldNumber(_, 19500)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 1, FieldType::Int32))
                        .field(FieldDef::optional("b", 1, FieldType::Int32))) {
            Err(Error::DuplicateFieldNumber(_, 1)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[test]
    fn rejects_unresolvable_and_mismatched_types() {
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 1, FieldType::Message)
                               .type_name("Nope"))) {
            Err(Error::UnresolvedType(_, ref name)) if name == "Nope" => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 1, FieldType::Enum)
                               .type_name("M"))) {
            Err(Error::WrongTypeKind(..)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 1,
                                                  FieldType::Message))) {
            Err(Error::MissingTypeName(_)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[test]
    fn rejects_misused_options() {
        match build_one(MessageDef::new("M")
                        .field(FieldDef::repeated("a", 1, FieldType::String)
                               .packed(true))) {
            Err(Error::InvalidPacked(_)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .oneof("o", vec![FieldDef::repeated(
                            "a", 1, FieldType::Int32)])) {
            Err(Error::InvalidOneofMember(_)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::optional("a", 1, FieldType::Int32)
                               .default_value(Value::String("x".to_owned())))) {
            Err(Error::InvalidDefault(..)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::map("m", 1, FieldType::Double,
                                             FieldType::Int32))) {
            Err(Error::InvalidMapKey(_, FieldType::Double)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
        match build_one(MessageDef::new("M")
                        .field(FieldDef::required("a", 1, FieldType::Int32)
                               .implicit_presence())) {
            Err(Error::InvalidPresence(_)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[test]
    fn rejects_extensions_outside_ranges() {
        let result = PoolBuilder::new()
            .message(MessageDef::new("M").extension_range(10, 20))
            .extension(FieldDef::optional("e", 20, FieldType::Int32)
                       .extendee("M"))
            .build();
        match result {
            Err(Error::ExtensionOutOfRange(_, 20)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }

        let result = PoolBuilder::new()
            .message(MessageDef::new("M").extension_range(10, 20))
            .extension(FieldDef::optional("e", 10, FieldType::Int32)
                       .extendee("Other"))
            .build();
        match result {
            Err(Error::UnresolvedExtendee(..)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[test]
    fn rejects_duplicate_types() {
        let result = PoolBuilder::new()
            .message(MessageDef::new("M"))
            .message(MessageDef::new("M"))
            .build();
        match result {
            Err(Error::DuplicateName(ref name)) if name == "M" => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[test]
    fn codec_is_built_once_under_contention() {
        use std::sync::Barrier;
        use std::thread;

        const THREADS: usize = 8;

        let desc = build_one(
            MessageDef::new("M")
                .field(FieldDef::optional("a", 1, FieldType::Int32))
                .field(FieldDef::repeated("b", 2, FieldType::String)))
            .unwrap().get_message_by_name("t.M").unwrap();
        let barrier = Arc::new(Barrier::new(THREADS));

        let threads: Vec<_> = (0..THREADS).map(|_| {
            let desc = desc.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut msg = DynamicMessage::new(desc.clone());
                msg.set("a", 150).unwrap();
                msg.list_mut("b").unwrap().push("x").unwrap();
                barrier.wait();
                let data = msg.serialize().unwrap();
                (data, desc.codec() as *const MessageCodec as usize)
            })
        }).collect();
        let results: Vec<(Vec<u8>, usize)> = threads.into_iter()
            .map(|t| t.join().unwrap()).collect();

        let codec = desc.codec() as *const MessageCodec as usize;
        for &(ref data, ptr) in &results {
            assert_eq!(&vec![0x08, 0x96, 0x01, 0x12, 0x01, b'x'], data);
            assert_eq!(codec, ptr);
        }
    }
}
