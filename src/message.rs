//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The dynamic message engine.
//!
//! A `DynamicMessage` is an instance of a message type known only at run
//! time. Fields are addressed by anything implementing `FieldKey`: a name
//! (or an extension's full name), a field number, or a `FieldDescriptor`.
//!
//! ## Presence
//!
//! A singular field is present if it has been assigned, merged or parsed,
//! and not cleared since. Fields with implicit presence are never stored
//! holding their zero value, so for them "present" means "non-zero".
//! Repeated and map fields are present when non-empty.
//!
//! ## Change propagation
//!
//! Every message memoises its serialised size. Mutation is only possible
//! through `&mut` methods, and every method that mutates a message or hands
//! out mutable access to something it owns invalidates the memoised size
//! first. Since the only route to a nested message is through each of its
//! ancestors in turn, a change anywhere below a message has always
//! invalidated that message by the time the borrow ends.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use containers::{MessageMap, RepeatedMessageField, RepeatedScalarField,
                 ScalarMap};
use dirty::SizeCache;
use schema::{FieldDescriptor, Label, MessageDescriptor, Presence};
use unknown::UnknownField;
use value::{self, Error, Result, Value};

/// The stored value of one field.
#[derive(Clone, PartialEq)]
pub enum FieldValue {
    /// The value of a singular field.
    Singular(Value),
    /// The elements of a repeated non-message field.
    RepeatedScalar(RepeatedScalarField),
    /// The elements of a repeated message or group field.
    RepeatedMessage(RepeatedMessageField),
    /// The entries of a map field with non-message values.
    ScalarMap(ScalarMap),
    /// The entries of a map field with message values.
    MessageMap(MessageMap),
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FieldValue::Singular(ref v) => v.fmt(f),
            FieldValue::RepeatedScalar(ref v) => v.fmt(f),
            FieldValue::RepeatedMessage(ref v) => v.fmt(f),
            FieldValue::ScalarMap(ref v) => v.fmt(f),
            FieldValue::MessageMap(ref v) => v.fmt(f),
        }
    }
}

impl FieldValue {
    /// The value a field has when it is not present: its default value for
    /// singular fields, or an empty container.
    pub fn empty(field: &FieldDescriptor) -> FieldValue {
        if let Some(value_field) = field.map_value() {
            match value_field.message_type() {
                Some(ty) => FieldValue::MessageMap(
                    MessageMap::new(field.clone(), ty)),
                None => FieldValue::ScalarMap(
                    ScalarMap::new(field.clone(), value_field)),
            }
        } else if Label::Repeated == field.label() {
            match field.message_type() {
                Some(ty) => FieldValue::RepeatedMessage(
                    RepeatedMessageField::new(field.clone(), ty)),
                None => FieldValue::RepeatedScalar(
                    RepeatedScalarField::new(field.clone())),
            }
        } else {
            FieldValue::Singular(field.default_value())
        }
    }

    /// Whether this is an empty container. Singular values are never empty.
    pub fn is_empty(&self) -> bool {
        match *self {
            FieldValue::Singular(_) => false,
            FieldValue::RepeatedScalar(ref v) => v.is_empty(),
            FieldValue::RepeatedMessage(ref v) => v.is_empty(),
            FieldValue::ScalarMap(ref v) => v.is_empty(),
            FieldValue::MessageMap(ref v) => v.is_empty(),
        }
    }

    /// Appends or overwrites from another container of the same field.
    fn extend_from(&mut self, other: &FieldValue) {
        match (self, other) {
            (&mut FieldValue::RepeatedScalar(ref mut a),
             &FieldValue::RepeatedScalar(ref b)) => a.extend_from(b),
            (&mut FieldValue::RepeatedMessage(ref mut a),
             &FieldValue::RepeatedMessage(ref b)) => a.extend_from(b),
            (&mut FieldValue::ScalarMap(ref mut a),
             &FieldValue::ScalarMap(ref b)) => a.extend_from(b),
            (&mut FieldValue::MessageMap(ref mut a),
             &FieldValue::MessageMap(ref b)) => a.extend_from(b),
            _ => (),
        }
    }

    #[allow(missing_docs)]
    pub fn as_value(&self) -> Option<&Value> {
        match *self {
            FieldValue::Singular(ref v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_repeated_scalar(&self) -> Option<&RepeatedScalarField> {
        match *self {
            FieldValue::RepeatedScalar(ref v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_repeated_message(&self) -> Option<&RepeatedMessageField> {
        match *self {
            FieldValue::RepeatedMessage(ref v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_scalar_map(&self) -> Option<&ScalarMap> {
        match *self {
            FieldValue::ScalarMap(ref v) => Some(v),
            _ => None,
        }
    }

    #[allow(missing_docs)]
    pub fn as_message_map(&self) -> Option<&MessageMap> {
        match *self {
            FieldValue::MessageMap(ref v) => Some(v),
            _ => None,
        }
    }
}

/// Anything which identifies a field of a message type.
pub trait FieldKey {
    /// Finds the field within `message`.
    fn resolve(&self, message: &MessageDescriptor) -> Result<FieldDescriptor>;
}

impl<'a> FieldKey for &'a str {
    fn resolve(&self, message: &MessageDescriptor)
               -> Result<FieldDescriptor> {
        message.get_field_by_name(self)
            .ok_or_else(|| Error::NoSuchField(format!(
                "{}.{}", message.full_name(), self)))
    }
}

impl FieldKey for u32 {
    fn resolve(&self, message: &MessageDescriptor)
               -> Result<FieldDescriptor> {
        message.get_field(*self)
            .ok_or_else(|| Error::NoSuchField(format!(
                "{}#{}", message.full_name(), self)))
    }
}

impl<'a> FieldKey for &'a FieldDescriptor {
    fn resolve(&self, message: &MessageDescriptor)
               -> Result<FieldDescriptor> {
        if self.containing_message() == message {
            Ok((*self).clone())
        } else {
            Err(Error::NoSuchField(format!(
                "{} in {}", self.full_name(), message.full_name())))
        }
    }
}

impl FieldKey for FieldDescriptor {
    fn resolve(&self, message: &MessageDescriptor)
               -> Result<FieldDescriptor> {
        <&FieldDescriptor as FieldKey>::resolve(&self, message)
    }
}

fn wrong_cardinality(field: &FieldDescriptor) -> Error {
    Error::WrongCardinality(field.full_name().to_owned())
}

/// An instance of a message type described by a `MessageDescriptor`.
#[derive(Clone)]
pub struct DynamicMessage {
    desc: MessageDescriptor,
    /// Present fields, by number.
    fields: BTreeMap<u32, FieldValue>,
    /// The active member of each oneof.
    oneofs: Vec<Option<u32>>,
    unknown: Vec<UnknownField>,
    size: SizeCache,
}

impl DynamicMessage {
    /// Creates an empty message of the given type.
    pub fn new(desc: MessageDescriptor) -> Self {
        let oneofs = vec![None; desc.schema().oneofs.len()];
        DynamicMessage {
            desc: desc,
            fields: BTreeMap::new(),
            oneofs: oneofs,
            unknown: Vec::new(),
            size: SizeCache::new(),
        }
    }

    /// The type of this message.
    pub fn descriptor(&self) -> &MessageDescriptor {
        &self.desc
    }

    /// Marks this message as changed.
    fn modified(&mut self) {
        self.size.invalidate();
    }

    pub(crate) fn size_cache(&self) -> &SizeCache {
        &self.size
    }

    pub(crate) fn field_values(&self) -> &BTreeMap<u32, FieldValue> {
        &self.fields
    }

    fn resolve<K : FieldKey>(&self, key: K) -> Result<FieldDescriptor> {
        key.resolve(&self.desc)
    }

    /// Whether the field is present.
    pub fn has<K : FieldKey>(&self, key: K) -> Result<bool> {
        let field = self.resolve(key)?;
        Ok(self.has_field(&field))
    }

    pub(crate) fn has_field(&self, field: &FieldDescriptor) -> bool {
        self.fields.get(&field.number()).map_or(false, |v| !v.is_empty())
    }

    /// Returns the field's value, or its default value or an empty
    /// container if it is not present. Reading never changes the message.
    pub fn get<K : FieldKey>(&self, key: K) -> Result<Cow<FieldValue>> {
        let field = self.resolve(key)?;
        Ok(match self.fields.get(&field.number()) {
            Some(value) => Cow::Borrowed(value),
            None => Cow::Owned(FieldValue::empty(&field)),
        })
    }

    /// Returns the value of a singular field, or its default value if it is
    /// not present.
    pub fn get_value<K : FieldKey>(&self, key: K) -> Result<Cow<Value>> {
        let field = self.resolve(key)?;
        if Label::Repeated == field.label() {
            return Err(wrong_cardinality(&field));
        }

        Ok(match self.fields.get(&field.number()) {
            Some(&FieldValue::Singular(ref value)) => Cow::Borrowed(value),
            _ => Cow::Owned(field.default_value()),
        })
    }

    /// Assigns a singular field.
    ///
    /// The value is type-checked and converted first; on failure the message
    /// is unchanged. Assigning a member of a oneof clears whichever other
    /// member was set. Assigning the zero value to a field with implicit
    /// presence clears it.
    ///
    /// Message values are copied in; later changes to the original do not
    /// affect this message.
    pub fn set<K, V>(&mut self, key: K, value: V) -> Result<()>
    where K : FieldKey, V : Into<Value> {
        let field = self.resolve(key)?;
        if Label::Repeated == field.label() {
            return Err(Error::CompositeAssignment(
                field.full_name().to_owned()));
        }

        let value = value::check(&field, value.into())?;
        self.set_checked(&field, value);
        Ok(())
    }

    pub(crate) fn set_checked(&mut self, field: &FieldDescriptor,
                              value: Value) {
        self.modified();
        if Presence::Implicit == field.presence() && value.is_zero() {
            self.fields.remove(&field.number());
            return;
        }

        self.activate_oneof(field);
        self.fields.insert(field.number(), FieldValue::Singular(value));
    }

    fn activate_oneof(&mut self, field: &FieldDescriptor) {
        let number = field.number();
        if let Some(oneof) = field.schema().oneof {
            if let Some(previous) = self.oneofs[oneof] {
                if previous != number {
                    self.fields.remove(&previous);
                }
            }
            self.oneofs[oneof] = Some(number);
        }
    }

    /// Mutable access to a singular message field, which becomes present
    /// (holding an empty message) if it was not already.
    pub fn message_mut<K : FieldKey>(&mut self, key: K)
                                     -> Result<&mut DynamicMessage> {
        let field = self.resolve(key)?;
        if Label::Repeated == field.label() ||
            !field.field_type().is_message()
        {
            return Err(wrong_cardinality(&field));
        }

        self.message_slot(&field)
            .ok_or_else(|| wrong_cardinality(&field))
    }

    /// Activates a singular message field and returns its message.
    pub(crate) fn message_slot(&mut self, field: &FieldDescriptor)
                               -> Option<&mut DynamicMessage> {
        self.modified();
        self.activate_oneof(field);
        match *self.fields.entry(field.number())
            .or_insert_with(|| FieldValue::empty(field))
        {
            FieldValue::Singular(Value::Message(ref mut message)) =>
                Some(message),
            _ => None,
        }
    }

    pub(crate) fn container_mut(&mut self, field: &FieldDescriptor)
                                -> &mut FieldValue {
        self.modified();
        self.fields.entry(field.number())
            .or_insert_with(|| FieldValue::empty(field))
    }

    /// Mutable access to a repeated non-message field.
    pub fn list_mut<K : FieldKey>(&mut self, key: K)
                                  -> Result<&mut RepeatedScalarField> {
        let field = self.resolve(key)?;
        if !field.is_list() || field.field_type().is_message() {
            return Err(wrong_cardinality(&field));
        }

        match *self.container_mut(&field) {
            FieldValue::RepeatedScalar(ref mut list) => Ok(list),
            _ => Err(wrong_cardinality(&field)),
        }
    }

    /// Mutable access to a repeated message or group field.
    pub fn messages_mut<K : FieldKey>(&mut self, key: K)
                                      -> Result<&mut RepeatedMessageField> {
        let field = self.resolve(key)?;
        if !field.is_list() || !field.field_type().is_message() {
            return Err(wrong_cardinality(&field));
        }

        match *self.container_mut(&field) {
            FieldValue::RepeatedMessage(ref mut list) => Ok(list),
            _ => Err(wrong_cardinality(&field)),
        }
    }

    /// Mutable access to a map field with non-message values.
    pub fn scalar_map_mut<K : FieldKey>(&mut self, key: K)
                                        -> Result<&mut ScalarMap> {
        let field = self.resolve(key)?;
        let is_scalar_map = field.map_value()
            .map_or(false, |v| !v.field_type().is_message());
        if !is_scalar_map {
            return Err(wrong_cardinality(&field));
        }

        match *self.container_mut(&field) {
            FieldValue::ScalarMap(ref mut map) => Ok(map),
            _ => Err(wrong_cardinality(&field)),
        }
    }

    /// Mutable access to a map field with message values.
    pub fn message_map_mut<K : FieldKey>(&mut self, key: K)
                                         -> Result<&mut MessageMap> {
        let field = self.resolve(key)?;
        let is_message_map = field.map_value()
            .map_or(false, |v| v.field_type().is_message());
        if !is_message_map {
            return Err(wrong_cardinality(&field));
        }

        match *self.container_mut(&field) {
            FieldValue::MessageMap(ref mut map) => Ok(map),
            _ => Err(wrong_cardinality(&field)),
        }
    }

    /// Clears the field.
    pub fn clear_field<K : FieldKey>(&mut self, key: K) -> Result<()> {
        let field = self.resolve(key)?;
        self.take_field(&field);
        Ok(())
    }

    /// Clears the field, returning its former value if it was present.
    ///
    /// The returned value is detached: changing it does not affect this
    /// message.
    pub fn take<K : FieldKey>(&mut self, key: K)
                              -> Result<Option<FieldValue>> {
        let field = self.resolve(key)?;
        Ok(self.take_field(&field).and_then(|v| if v.is_empty() {
            None
        } else {
            Some(v)
        }))
    }

    /// Removes a singular field, returning its value or its default.
    pub(crate) fn take_singular(&mut self, field: &FieldDescriptor) -> Value {
        match self.take_field(field) {
            Some(FieldValue::Singular(value)) => value,
            _ => field.default_value(),
        }
    }

    fn take_field(&mut self, field: &FieldDescriptor) -> Option<FieldValue> {
        let number = field.number();
        if let Some(oneof) = field.schema().oneof {
            if Some(number) == self.oneofs[oneof] {
                self.oneofs[oneof] = None;
            }
        }

        let removed = self.fields.remove(&number);
        if removed.is_some() {
            self.modified();
        }
        removed
    }

    /// Clears every field and discards all unknown fields.
    pub fn clear(&mut self) {
        self.modified();
        self.fields.clear();
        self.unknown.clear();
        for oneof in &mut self.oneofs {
            *oneof = None;
        }
    }

    /// Returns the member of the named oneof which is currently set.
    pub fn which_oneof(&self, name: &str) -> Result<Option<FieldDescriptor>> {
        let oneof = self.desc.get_oneof_by_name(name)
            .ok_or_else(|| Error::NoSuchOneof(name.to_owned()))?;
        Ok(self.oneofs[oneof.index()]
           .and_then(|number| self.desc.get_field(number)))
    }

    /// Clears whichever member of the named oneof is set.
    pub fn clear_oneof(&mut self, name: &str) -> Result<()> {
        let oneof = self.desc.get_oneof_by_name(name)
            .ok_or_else(|| Error::NoSuchOneof(name.to_owned()))?;
        if let Some(number) = self.oneofs[oneof.index()].take() {
            self.fields.remove(&number);
            self.modified();
        }
        Ok(())
    }

    /// Lists the present fields with their values, in field number order.
    pub fn list_fields(&self) -> Vec<(FieldDescriptor, &FieldValue)> {
        self.present()
            .filter_map(|(&number, value)| self.desc.get_field(number)
                        .map(|field| (field, value)))
            .collect()
    }

    fn present<'a>(&'a self)
                   -> impl Iterator<Item = (&'a u32, &'a FieldValue)> + 'a {
        self.fields.iter().filter(|&(_, value)| !value.is_empty())
    }

    /// Merges `other`, which must be of the same type, into this message.
    ///
    /// Singular values present in `other` overwrite this message's;
    /// singular messages merge recursively; repeated fields are appended;
    /// map entries from `other` replace those with the same key; unknown
    /// fields are appended.
    pub fn merge(&mut self, other: &DynamicMessage) -> Result<()> {
        if self.desc != other.desc {
            return Err(Error::MessageTypeMismatch(
                self.desc.full_name().to_owned(),
                self.desc.full_name().to_owned(),
                other.desc.full_name().to_owned()));
        }

        self.merge_unchecked(other);
        Ok(())
    }

    /// Merges `other`, which must be of the same type.
    pub(crate) fn merge_unchecked(&mut self, other: &DynamicMessage) {
        self.modified();
        for (&number, value) in &other.fields {
            let field = match self.desc.get_field(number) {
                Some(field) => field,
                None => continue,
            };

            match *value {
                FieldValue::Singular(Value::Message(ref message)) => {
                    if let Some(child) = self.message_slot(&field) {
                        child.merge_unchecked(message);
                    }
                },
                FieldValue::Singular(ref value) =>
                    self.set_checked(&field, value.clone()),
                ref container =>
                    self.container_mut(&field).extend_from(container),
            }
        }
        self.unknown.extend(other.unknown.iter().cloned());
    }

    /// Whether every required field is present, recursively.
    pub fn is_initialized(&self) -> bool {
        self.find_initialization_errors().is_empty()
    }

    /// Returns the path of every missing required field, recursively.
    ///
    /// Paths are dotted, with list indices and map keys in brackets; for
    /// example `child.x`, `items[2].y` or `map["key"].z`.
    pub fn find_initialization_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        self.collect_initialization_errors("", &mut errors);
        errors
    }

    fn collect_initialization_errors(&self, prefix: &str,
                                     errors: &mut Vec<String>) {
        for &index in &self.desc.codec().required {
            let field = self.desc.field(index);
            if !self.has_field(&field) {
                errors.push(format!("{}{}", prefix, field.name()));
            }
        }

        for (field, value) in self.list_fields() {
            let name = if field.is_extension() {
                format!("({})", field.full_name())
            } else {
                field.name().to_owned()
            };

            match *value {
                FieldValue::Singular(Value::Message(ref message)) =>
                    message.collect_initialization_errors(
                        &format!("{}{}.", prefix, name), errors),
                FieldValue::RepeatedMessage(ref list) =>
                    for (ix, message) in list.iter().enumerate() {
                        message.collect_initialization_errors(
                            &format!("{}{}[{}].", prefix, name, ix), errors);
                    },
                FieldValue::MessageMap(ref map) =>
                    for (key, message) in map.iter() {
                        message.collect_initialization_errors(
                            &format!("{}{}[{}].", prefix, name, key), errors);
                    },
                _ => (),
            }
        }
    }

    /// The retained unknown fields, in wire order.
    pub fn unknown_fields(&self) -> &[UnknownField] {
        &self.unknown
    }

    /// Appends an unknown field, to be written after all known fields.
    pub fn add_unknown_field(&mut self, field: UnknownField) {
        self.modified();
        self.unknown.push(field);
    }

    /// Discards this message's unknown fields.
    pub fn clear_unknown_fields(&mut self) {
        if !self.unknown.is_empty() {
            self.modified();
            self.unknown.clear();
        }
    }

    /// Discards the unknown fields of this message and of every message it
    /// contains.
    pub fn discard_unknown_fields(&mut self) {
        self.modified();
        self.unknown.clear();
        for value in self.fields.values_mut() {
            match *value {
                FieldValue::Singular(Value::Message(ref mut message)) =>
                    message.discard_unknown_fields(),
                FieldValue::RepeatedMessage(ref mut list) =>
                    for message in list.iter_mut() {
                        message.discard_unknown_fields();
                    },
                FieldValue::MessageMap(ref mut map) =>
                    for (_, message) in map.iter_mut() {
                        message.discard_unknown_fields();
                    },
                _ => (),
            }
        }
    }
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        if self.desc != other.desc || !self.present().eq(other.present()) {
            return false;
        }

        let mut a: Vec<_> = self.unknown.iter().map(|u| u.sort_key())
            .collect();
        let mut b: Vec<_> = other.unknown.iter().map(|u| u.sort_key())
            .collect();
        a.sort();
        b.sort();
        a == b
    }
}

impl fmt::Debug for DynamicMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut s = f.debug_struct(self.desc.full_name());
        for (field, value) in self.list_fields() {
            if field.is_extension() {
                s.field(field.full_name(), value);
            } else {
                s.field(field.name(), value);
            }
        }
        if !self.unknown.is_empty() {
            s.field("unknown_fields", &self.unknown);
        }
        s.finish()
    }
}
