//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Containers backing repeated and map fields.
//!
//! Containers are only reachable mutably through the `_mut` accessors of
//! `DynamicMessage`, which mark the owning message modified, so the
//! containers themselves need no link back to their owner.
//!
//! Every value entering a container is type-checked against the field's
//! declared type. Operations taking several values check all of them before
//! modifying anything.

use std::cmp::Ordering;
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use std::ops::{Index, Range};
use std::slice;

use message::DynamicMessage;
use schema::{FieldDescriptor, MessageDescriptor};
use value::{self, Error, MapKey, Result, Value};

fn check_message_type(field: &FieldDescriptor, ty: &MessageDescriptor,
                      message: &DynamicMessage) -> Result<()> {
    if ty == message.descriptor() {
        Ok(())
    } else {
        Err(Error::MessageTypeMismatch(
            field.full_name().to_owned(), ty.full_name().to_owned(),
            message.descriptor().full_name().to_owned()))
    }
}

fn out_of_bounds(field: &FieldDescriptor, index: usize, len: usize)
                 -> Error {
    Error::IndexOutOfBounds(field.full_name().to_owned(), index, len)
}

/// The elements of a repeated field of non-message type.
#[derive(Clone)]
pub struct RepeatedScalarField {
    field: FieldDescriptor,
    values: Vec<Value>,
}

impl RepeatedScalarField {
    pub(crate) fn new(field: FieldDescriptor) -> Self {
        RepeatedScalarField {
            field: field,
            values: Vec::new(),
        }
    }

    /// The field this list belongs to.
    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[allow(missing_docs)]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> slice::Iter<Value> {
        self.values.iter()
    }

    /// The elements as a slice.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    fn check(&self, value: Value) -> Result<Value> {
        value::check(&self.field, value)
    }

    fn check_all<I, V>(&self, values: I) -> Result<Vec<Value>>
    where I : IntoIterator<Item = V>, V : Into<Value> {
        values.into_iter().map(|v| self.check(v.into())).collect()
    }

    /// Appends one element.
    pub fn push<V : Into<Value>>(&mut self, value: V) -> Result<()> {
        let value = self.check(value.into())?;
        self.values.push(value);
        Ok(())
    }

    pub(crate) fn push_unchecked(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Inserts an element at `index`, shifting later elements back.
    pub fn insert<V : Into<Value>>(&mut self, index: usize, value: V)
                                   -> Result<()> {
        if index > self.values.len() {
            return Err(out_of_bounds(&self.field, index, self.values.len()));
        }
        let value = self.check(value.into())?;
        self.values.insert(index, value);
        Ok(())
    }

    /// Replaces the element at `index`, returning the old one.
    pub fn set<V : Into<Value>>(&mut self, index: usize, value: V)
                                -> Result<Value> {
        if index >= self.values.len() {
            return Err(out_of_bounds(&self.field, index, self.values.len()));
        }
        let value = self.check(value.into())?;
        Ok(::std::mem::replace(&mut self.values[index], value))
    }

    /// Removes and returns the element at `index`.
    pub fn remove(&mut self, index: usize) -> Result<Value> {
        if index >= self.values.len() {
            return Err(out_of_bounds(&self.field, index, self.values.len()));
        }
        Ok(self.values.remove(index))
    }

    #[allow(missing_docs)]
    pub fn pop(&mut self) -> Option<Value> {
        self.values.pop()
    }

    #[allow(missing_docs)]
    pub fn truncate(&mut self, len: usize) {
        self.values.truncate(len);
    }

    #[allow(missing_docs)]
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// Appends every element of `values`.
    ///
    /// If any element fails the type check, nothing is appended.
    pub fn extend<I, V>(&mut self, values: I) -> Result<()>
    where I : IntoIterator<Item = V>, V : Into<Value> {
        let values = self.check_all(values)?;
        self.values.extend(values);
        Ok(())
    }

    /// Replaces the elements in `range` with `values`, which need not be the
    /// same length.
    pub fn replace_range<I, V>(&mut self, range: Range<usize>, values: I)
                               -> Result<()>
    where I : IntoIterator<Item = V>, V : Into<Value> {
        if range.start > range.end || range.end > self.values.len() {
            return Err(out_of_bounds(&self.field, range.end,
                                     self.values.len()));
        }
        let values = self.check_all(values)?;
        self.values.splice(range, values);
        Ok(())
    }

    /// Sorts the elements with a comparator.
    pub fn sort_by<F>(&mut self, compare: F)
    where F : FnMut(&Value, &Value) -> Ordering {
        self.values.sort_by(compare);
    }

    /// Appends copies of every element of `other`.
    pub fn merge_from(&mut self, other: &RepeatedScalarField) -> Result<()> {
        if self.field == other.field {
            self.extend_from(other);
            Ok(())
        } else {
            self.extend(other.values.iter().cloned())
        }
    }

    pub(crate) fn extend_from(&mut self, other: &RepeatedScalarField) {
        self.values.extend_from_slice(&other.values);
    }
}

impl PartialEq for RepeatedScalarField {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

impl fmt::Debug for RepeatedScalarField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(&self.values).finish()
    }
}

impl Index<usize> for RepeatedScalarField {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl<'a> IntoIterator for &'a RepeatedScalarField {
    type Item = &'a Value;
    type IntoIter = slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// The elements of a repeated message or group field.
#[derive(Clone)]
pub struct RepeatedMessageField {
    field: FieldDescriptor,
    message_type: MessageDescriptor,
    messages: Vec<DynamicMessage>,
}

impl RepeatedMessageField {
    pub(crate) fn new(field: FieldDescriptor,
                      message_type: MessageDescriptor) -> Self {
        RepeatedMessageField {
            field: field,
            message_type: message_type,
            messages: Vec::new(),
        }
    }

    /// The field this list belongs to.
    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    /// The type of the elements.
    pub fn message_type(&self) -> &MessageDescriptor {
        &self.message_type
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[allow(missing_docs)]
    pub fn get(&self, index: usize) -> Option<&DynamicMessage> {
        self.messages.get(index)
    }

    /// Mutable access to one element. Element changes are visible in the
    /// owner's size, since this borrow came through the owner.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut DynamicMessage> {
        self.messages.get_mut(index)
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> slice::Iter<DynamicMessage> {
        self.messages.iter()
    }

    #[allow(missing_docs)]
    pub fn iter_mut(&mut self) -> slice::IterMut<DynamicMessage> {
        self.messages.iter_mut()
    }

    /// Appends a new, empty element and returns it.
    pub fn add(&mut self) -> &mut DynamicMessage {
        let index = self.messages.len();
        self.messages.push(DynamicMessage::new(self.message_type.clone()));
        &mut self.messages[index]
    }

    /// Appends `message`, which must be of the element type.
    pub fn push(&mut self, message: DynamicMessage) -> Result<()> {
        check_message_type(&self.field, &self.message_type, &message)?;
        self.messages.push(message);
        Ok(())
    }

    /// Inserts `message` at `index`.
    pub fn insert(&mut self, index: usize, message: DynamicMessage)
                  -> Result<()> {
        if index > self.messages.len() {
            return Err(out_of_bounds(&self.field, index,
                                     self.messages.len()));
        }
        check_message_type(&self.field, &self.message_type, &message)?;
        self.messages.insert(index, message);
        Ok(())
    }

    /// Removes and returns the element at `index`. The returned message is
    /// detached from this list.
    pub fn remove(&mut self, index: usize) -> Result<DynamicMessage> {
        if index >= self.messages.len() {
            return Err(out_of_bounds(&self.field, index,
                                     self.messages.len()));
        }
        Ok(self.messages.remove(index))
    }

    #[allow(missing_docs)]
    pub fn pop(&mut self) -> Option<DynamicMessage> {
        self.messages.pop()
    }

    #[allow(missing_docs)]
    pub fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }

    #[allow(missing_docs)]
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Appends a deep copy of each message in `messages`.
    ///
    /// If any message is of the wrong type, nothing is appended.
    pub fn extend<'a, I>(&mut self, messages: I) -> Result<()>
    where I : IntoIterator<Item = &'a DynamicMessage> {
        let messages: Vec<&DynamicMessage> = messages.into_iter().collect();
        for message in &messages {
            check_message_type(&self.field, &self.message_type, message)?;
        }
        self.messages.extend(messages.into_iter().cloned());
        Ok(())
    }

    /// Appends deep copies of every element of `other`.
    pub fn merge_from(&mut self, other: &RepeatedMessageField) -> Result<()> {
        self.extend(other.messages.iter())
    }

    pub(crate) fn extend_from(&mut self, other: &RepeatedMessageField) {
        self.messages.extend_from_slice(&other.messages);
    }

    /// Sorts the elements with a comparator.
    pub fn sort_by<F>(&mut self, compare: F)
    where F : FnMut(&DynamicMessage, &DynamicMessage) -> Ordering {
        self.messages.sort_by(compare);
    }
}

impl PartialEq for RepeatedMessageField {
    fn eq(&self, other: &Self) -> bool {
        self.messages == other.messages
    }
}

impl fmt::Debug for RepeatedMessageField {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(&self.messages).finish()
    }
}

impl Index<usize> for RepeatedMessageField {
    type Output = DynamicMessage;

    fn index(&self, index: usize) -> &DynamicMessage {
        &self.messages[index]
    }
}

impl<'a> IntoIterator for &'a RepeatedMessageField {
    type Item = &'a DynamicMessage;
    type IntoIter = slice::Iter<'a, DynamicMessage>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.iter()
    }
}

/// The entries of a map field whose values are not messages.
///
/// Entries iterate in key order.
#[derive(Clone)]
pub struct ScalarMap {
    field: FieldDescriptor,
    value_field: FieldDescriptor,
    entries: BTreeMap<MapKey, Value>,
}

impl ScalarMap {
    pub(crate) fn new(field: FieldDescriptor, value_field: FieldDescriptor)
                      -> Self {
        ScalarMap {
            field: field,
            value_field: value_field,
            entries: BTreeMap::new(),
        }
    }

    /// The map field.
    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    fn key<K : Into<MapKey>>(&self, key: K) -> Result<MapKey> {
        value::check_key(&self.field, key.into())
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `key` without inserting anything.
    pub fn get<K : Into<MapKey>>(&self, key: K) -> Result<Option<&Value>> {
        let key = self.key(key)?;
        Ok(self.entries.get(&key))
    }

    /// Looks up `key`, first inserting the zero value if it is missing.
    pub fn get_or_default<K : Into<MapKey>>(&mut self, key: K)
                                            -> Result<&Value> {
        let key = self.key(key)?;
        let value_field = &self.value_field;
        Ok(self.entries.entry(key)
           .or_insert_with(|| value_field.default_value()))
    }

    #[allow(missing_docs)]
    pub fn contains_key<K : Into<MapKey>>(&self, key: K) -> Result<bool> {
        let key = self.key(key)?;
        Ok(self.entries.contains_key(&key))
    }

    /// Sets the value for `key`, returning the old one.
    pub fn insert<K, V>(&mut self, key: K, value: V) -> Result<Option<Value>>
    where K : Into<MapKey>, V : Into<Value> {
        let key = self.key(key)?;
        let value = value::check(&self.value_field, value.into())?;
        Ok(self.entries.insert(key, value))
    }

    pub(crate) fn insert_unchecked(&mut self, key: MapKey, value: Value) {
        self.entries.insert(key, value);
    }

    #[allow(missing_docs)]
    pub fn remove<K : Into<MapKey>>(&mut self, key: K)
                                    -> Result<Option<Value>> {
        let key = self.key(key)?;
        Ok(self.entries.remove(&key))
    }

    #[allow(missing_docs)]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> btree_map::Iter<MapKey, Value> {
        self.entries.iter()
    }

    #[allow(missing_docs)]
    pub fn keys(&self) -> btree_map::Keys<MapKey, Value> {
        self.entries.keys()
    }

    /// Copies every entry of `other` into this map. Where both have a key,
    /// `other`'s value wins.
    pub fn merge_from(&mut self, other: &ScalarMap) -> Result<()> {
        if self.field == other.field {
            self.extend_from(other);
        } else {
            let mut checked = Vec::with_capacity(other.entries.len());
            for (key, value) in &other.entries {
                checked.push((self.key(key.clone())?,
                              value::check(&self.value_field,
                                           value.clone())?));
            }
            self.entries.extend(checked);
        }
        Ok(())
    }
}

impl ScalarMap {
    pub(crate) fn extend_from(&mut self, other: &ScalarMap) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }
}

impl PartialEq for ScalarMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for ScalarMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(&self.entries).finish()
    }
}

/// The entries of a map field whose values are messages.
///
/// Stored messages may be modified in place through `get_mut()`, but there
/// is no way to assign a whole message to a key.
#[derive(Clone)]
pub struct MessageMap {
    field: FieldDescriptor,
    value_type: MessageDescriptor,
    entries: BTreeMap<MapKey, DynamicMessage>,
}

impl MessageMap {
    pub(crate) fn new(field: FieldDescriptor, value_type: MessageDescriptor)
                      -> Self {
        MessageMap {
            field: field,
            value_type: value_type,
            entries: BTreeMap::new(),
        }
    }

    /// The map field.
    pub fn field(&self) -> &FieldDescriptor {
        &self.field
    }

    /// The type of the values.
    pub fn value_type(&self) -> &MessageDescriptor {
        &self.value_type
    }

    fn key<K : Into<MapKey>>(&self, key: K) -> Result<MapKey> {
        value::check_key(&self.field, key.into())
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up `key` without inserting anything.
    pub fn get<K : Into<MapKey>>(&self, key: K)
                                 -> Result<Option<&DynamicMessage>> {
        let key = self.key(key)?;
        Ok(self.entries.get(&key))
    }

    /// Returns the message for `key`, first inserting an empty one if it is
    /// missing.
    pub fn get_mut<K : Into<MapKey>>(&mut self, key: K)
                                     -> Result<&mut DynamicMessage> {
        let key = self.key(key)?;
        Ok(self.entry_unchecked(key))
    }

    pub(crate) fn entry_unchecked(&mut self, key: MapKey)
                                  -> &mut DynamicMessage {
        let value_type = &self.value_type;
        self.entries.entry(key)
            .or_insert_with(|| DynamicMessage::new(value_type.clone()))
    }

    #[allow(missing_docs)]
    pub fn contains_key<K : Into<MapKey>>(&self, key: K) -> Result<bool> {
        let key = self.key(key)?;
        Ok(self.entries.contains_key(&key))
    }

    /// Removes the entry for `key`, returning the detached message.
    pub fn remove<K : Into<MapKey>>(&mut self, key: K)
                                    -> Result<Option<DynamicMessage>> {
        let key = self.key(key)?;
        Ok(self.entries.remove(&key))
    }

    #[allow(missing_docs)]
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    #[allow(missing_docs)]
    pub fn iter(&self) -> btree_map::Iter<MapKey, DynamicMessage> {
        self.entries.iter()
    }

    #[allow(missing_docs)]
    pub fn iter_mut(&mut self) -> btree_map::IterMut<MapKey, DynamicMessage> {
        self.entries.iter_mut()
    }

    #[allow(missing_docs)]
    pub fn keys(&self) -> btree_map::Keys<MapKey, DynamicMessage> {
        self.entries.keys()
    }

    /// Copies every entry of `other` into this map. Where both have a key,
    /// the existing message is replaced by a copy of `other`'s.
    pub fn merge_from(&mut self, other: &MessageMap) -> Result<()> {
        let mut checked = Vec::with_capacity(other.entries.len());
        for (key, message) in &other.entries {
            check_message_type(&self.field, &self.value_type, message)?;
            checked.push((self.key(key.clone())?, message));
        }
        for (key, message) in checked {
            self.entries.insert(key, message.clone());
        }
        Ok(())
    }

    pub(crate) fn extend_from(&mut self, other: &MessageMap) {
        for (key, message) in &other.entries {
            self.entries.insert(key.clone(), message.clone());
        }
    }
}

impl PartialEq for MessageMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl fmt::Debug for MessageMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(&self.entries).finish()
    }
}
