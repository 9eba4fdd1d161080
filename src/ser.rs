//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Serialising `DynamicMessage`s to the wire format.
//!
//! Known fields are written in field-number order, extensions included,
//! followed by the retained unknown fields in the order they were received.
//! Sizes are memoised per message and reused until the message, or anything
//! it owns, is next modified.

use message::DynamicMessage;

quick_error! {
    /// Errors that can be produced during serialisation.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Error {
        /// A required field was absent somewhere in the message tree.
        ///
        /// `fields` holds the paths to every missing field.
        MissingRequiredFields(message: String, fields: Vec<String>) {
            description("required fields missing")
            display("message of type {} is missing required fields: {}",
                    message, fields.join(", "))
        }
    }
}

/// Result type for serialisation.
pub type Result<T> = ::std::result::Result<T, Error>;

impl DynamicMessage {
    /// The number of bytes `serialize_partial()` would produce.
    pub fn byte_size(&self) -> usize {
        if let Some(size) = self.size_cache().get() {
            return size;
        }

        let codec = self.descriptor().codec();
        let mut size = 0;
        for (&number, value) in self.field_values() {
            if let Some(field) = codec.field(number) {
                size += field.size(value);
            }
        }
        for unknown in self.unknown_fields() {
            size += unknown.raw().len();
        }

        self.size_cache().set(size);
        size
    }

    /// Appends the encoding of this message to `out` without checking
    /// required fields.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        let codec = self.descriptor().codec();
        for (&number, value) in self.field_values() {
            if let Some(field) = codec.field(number) {
                field.encode(out, value);
            }
        }
        for unknown in self.unknown_fields() {
            out.extend_from_slice(unknown.raw());
        }
    }

    /// Serialises this message, failing if any required field is missing
    /// anywhere in the tree.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if !self.is_initialized() {
            return Err(Error::MissingRequiredFields(
                self.descriptor().full_name().to_owned(),
                self.find_initialization_errors()));
        }

        Ok(self.serialize_partial())
    }

    /// Serialises this message without checking required fields.
    pub fn serialize_partial(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_size());
        self.write_to(&mut out);
        debug_assert_eq!(out.len(), self.byte_size());
        out
    }
}
