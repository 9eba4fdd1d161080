//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

/// Parse the given text into a binary value.
///
/// Spaces are ignored. Bytes may be specified in hexadecimal. A single-quote
/// causes all characters up through the single quote to be cast to bytes and
/// added verbatim.
pub fn parse(text: &str) -> Vec<u8> {
    let mut data = Vec::new();

    fn decode_hexit(c: char) -> u8 {
        let n = c as u8;

        if c >= '0' && c <= '9' {
            (n - b'0')
        } else if c >= 'a' && c <= 'f' {
            (n - b'a' + 10) as u8
        } else if c >= 'A' && c <= 'F' {
            (n - b'A' + 10) as u8
        } else {
            panic!("Invalid hexit {}", c)
        }
    }

    let mut chars = text.chars();
    while let Some(first) = chars.next() {
        if ' ' == first {
            // ignore
        } else if '\'' == first {
            loop {
                let c = chars.next().unwrap();
                if '\'' == c {
                    break;
                } else {
                    data.push(c as u8);
                }
            }
        } else {
            data.push((decode_hexit(first) << 4) |
                      decode_hexit(chars.next().unwrap()));
        }
    }

    data
}

use std::sync::OnceLock;

use schema::{DescriptorPool, EnumDef, FieldDef, FieldType, MessageDef,
             MessageDescriptor, PoolBuilder};
use value::Value;
use wire;

/// The pool shared by the unit tests, in package `test`.
///
/// Built once, so descriptors taken from separate calls compare equal.
pub fn sample_pool() -> DescriptorPool {
    static POOL: OnceLock<DescriptorPool> = OnceLock::new();
    POOL.get_or_init(build_sample_pool).clone()
}

fn build_sample_pool() -> DescriptorPool {
    use schema::FieldType::*;

    PoolBuilder::new()
        .package("test")
        .enumeration(EnumDef::new("Colour")
                     .value("RED", 0).value("GREEN", 1).value("BLUE", 2))
        .enumeration(EnumDef::new("Level")
                     .value("LOW", 1).value("HIGH", 2).closed())
        .message(MessageDef::new("Child")
                 .field(FieldDef::optional("x", 1, Int32))
                 .field(FieldDef::optional("name", 2, String))
                 .field(FieldDef::optional("child", 3, Message)
                        .type_name("Child"))
                 .field(FieldDef::optional("grp", 4, Group)
                        .type_name("Child"))
                 .field(FieldDef::repeated("kids", 5, Message)
                        .type_name("Child")))
        .message(MessageDef::new("Needy")
                 .field(FieldDef::required("a", 1, Int32))
                 .field(FieldDef::optional("child", 2, Message)
                        .type_name("Needy"))
                 .field(FieldDef::repeated("kids", 3, Message)
                        .type_name("Needy"))
                 .field(FieldDef::map("by_name", 4, String, Message)
                        .type_name("Needy")))
        .message(MessageDef::new("Everything")
                 .field(FieldDef::optional("opt_int32", 1, Int32))
                 .field(FieldDef::optional("opt_int64", 2, Int64))
                 .field(FieldDef::optional("opt_uint32", 3, UInt32))
                 .field(FieldDef::optional("opt_uint64", 4, UInt64))
                 .field(FieldDef::optional("opt_sint32", 5, SInt32))
                 .field(FieldDef::optional("opt_sint64", 6, SInt64))
                 .field(FieldDef::optional("opt_fixed32", 7, Fixed32))
                 .field(FieldDef::optional("opt_fixed64", 8, Fixed64))
                 .field(FieldDef::optional("opt_sfixed32", 9, SFixed32))
                 .field(FieldDef::optional("opt_sfixed64", 10, SFixed64))
                 .field(FieldDef::optional("opt_float", 11, Float))
                 .field(FieldDef::optional("opt_double", 12, Double))
                 .field(FieldDef::optional("opt_bool", 13, Bool))
                 .field(FieldDef::optional("opt_string", 14, String))
                 .field(FieldDef::optional("opt_bytes", 15, Bytes))
                 .field(FieldDef::optional("opt_enum", 16, Enum)
                        .type_name("Colour"))
                 .field(FieldDef::optional("closed_enum", 17, Enum)
                        .type_name("Level"))
                 .field(FieldDef::optional("child", 18, Message)
                        .type_name("Child"))
                 .field(FieldDef::optional("group_child", 19, Group)
                        .type_name("Child"))
                 .field(FieldDef::optional("with_default", 20, Int32)
                        .default_value(Value::I32(42)))
                 .field(FieldDef::optional("implicit_int32", 21, Int32)
                        .implicit_presence())
                 .field(FieldDef::optional("implicit_string", 22, String)
                        .implicit_presence())
                 .field(FieldDef::repeated("packed_int32", 30, Int32))
                 .field(FieldDef::repeated("unpacked_int32", 31, Int32)
                        .packed(false))
                 .field(FieldDef::repeated("strings", 32, String))
                 .field(FieldDef::repeated("children", 33, Message)
                        .type_name("Child"))
                 .field(FieldDef::repeated("levels", 34, Enum)
                        .type_name("Level"))
                 .field(FieldDef::repeated("packed_sint64", 35, SInt64))
                 .field(FieldDef::map("string_to_int", 40, String, Int32))
                 .field(FieldDef::map("int_to_child", 41, Int32, Message)
                        .type_name("Child"))
                 .oneof("choice", vec![
                     FieldDef::optional("choice_int", 50, Int32),
                     FieldDef::optional("choice_str", 51, String),
                     FieldDef::optional("choice_msg", 52, Message)
                         .type_name("Child"),
                 ])
                 .field(FieldDef::optional("needy", 60, Message)
                        .type_name("Needy"))
                 .extension_range(100, 200))
        .extension(FieldDef::optional("ext_int", 100, Int32)
                   .extendee("Everything"))
        .extension(FieldDef::optional("ext_child", 101, Message)
                   .type_name("Child")
                   .extendee("Everything"))
        .message(MessageDef::new("Container")
                 .message_set_wire_format()
                 .extension_range(4, wire::MAX_FIELD_NUMBER + 1))
        .message(MessageDef::new("SetItem")
                 .field(FieldDef::optional("value", 1, Int32))
                 .extension(FieldDef::optional("item", 1000, Message)
                            .type_name("SetItem")
                            .extendee("Container")))
        .message(MessageDef::new("Closed")
                 .discard_unknown_fields()
                 .field(FieldDef::optional("a", 1, FieldType::Int32)))
        .build()
        .unwrap()
}

/// `test.Everything` from `sample_pool()`.
pub fn everything() -> MessageDescriptor {
    sample_pool().get_message_by_name("test.Everything").unwrap()
}

/// `test.Child` from `sample_pool()`.
pub fn child() -> MessageDescriptor {
    sample_pool().get_message_by_name("test.Child").unwrap()
}
