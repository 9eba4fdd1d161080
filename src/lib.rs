//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Schema-driven dynamic messages over the protobuf binary wire format.
//!
//! A `DescriptorPool` is built once from message, enum and extension
//! definitions. Any message type in it can then be instantiated as a
//! `DynamicMessage`, which supports reflective field access, merging,
//! equality, memoised sizing, and byte-exact serialisation and parsing,
//! without generating any code.
//!
//! ```
//! use dynwire::{DynamicMessage, FieldDef, FieldType, MessageDef,
//!               PoolBuilder};
//!
//! let pool = PoolBuilder::new()
//!     .package("demo")
//!     .message(MessageDef::new("Point")
//!              .field(FieldDef::optional("x", 1, FieldType::Int32))
//!              .field(FieldDef::repeated("tags", 2, FieldType::String)))
//!     .build().unwrap();
//! let point = pool.get_message_by_name("demo.Point").unwrap();
//!
//! let mut msg = DynamicMessage::new(point.clone());
//! msg.set("x", 150).unwrap();
//! msg.list_mut("tags").unwrap().push("a").unwrap();
//!
//! let data = msg.serialize().unwrap();
//! assert_eq!(&[0x08, 0x96, 0x01, 0x12, 0x01, b'a'][..], &data[..]);
//! assert_eq!(msg, DynamicMessage::parse(point, &data).unwrap());
//! ```
//!
//! Unknown fields are retained verbatim and written back after the known
//! fields, so data from newer schemas survives a round trip through older
//! ones.

#![warn(missing_docs)]
#![recursion_limit = "1024"]

#[macro_use] extern crate quick_error;
#[macro_use] extern crate tracing;

pub mod wire;
pub mod schema;
pub mod value;
mod dirty;
pub mod unknown;
mod codec;
pub mod containers;
pub mod message;
pub mod de;
pub mod ser;
mod message_set;

#[cfg(test)]
mod test_helpers;

pub use containers::{MessageMap, RepeatedMessageField, RepeatedScalarField,
                     ScalarMap};
pub use message::{DynamicMessage, FieldKey, FieldValue};
pub use schema::{DescriptorPool, EnumDef, EnumDescriptor, FieldDef,
                 FieldDescriptor, FieldType, Label, MessageDef,
                 MessageDescriptor, OneofDescriptor, PoolBuilder, Presence};
pub use unknown::{UnknownField, UnknownFieldSet, UnknownValue};
pub use value::{MapKey, Value};
