//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Parsing wire data into `DynamicMessage`s.
//!
//! The parser walks a window of the input buffer, looking every tag up in
//! the message type's dispatch table. Known fields are decoded into their
//! containers; anything else is skipped and kept verbatim as an unknown
//! field, unless the configuration or the message type says to drop it.
//!
//! Parsing is all-or-nothing: on error the target message is left exactly
//! as it was before the call.

use std::fmt;

use quick_error::ResultExt;

use codec::{self, Decoder};
use message::{DynamicMessage, FieldValue};
use message_set;
use schema::{FieldDescriptor, FieldType, MessageDescriptor};
use unknown::UnknownField;
use value::{MapKey, Value};
use wire::{self, WireType};

/// Default for `Config::recursion_limit`.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

quick_error! {
    /// Errors that can be produced while parsing.
    ///
    /// Every variant begins with a string indicating the field names and
    /// positions that led to the error.
    #[derive(Debug)]
    pub enum Error {
        /// The input was not well-formed.
        Malformed(wo: String, err: wire::Error) {
            description("malformed input")
            display("{} at {}", err, wo)
            cause(err)
            context(wo: &'a Context<'a>, err: wire::Error) ->
                (wo.to_string(), err)
        }
        /// Sub-messages or groups were nested too deeply.
        ///
        /// See `Config::recursion_limit` to control the cut-off point.
        RecursionLimitExceeded(wo: String) {
            description("recursion limit exceeded")
            display("recursion limit exceeded at {}", wo)
        }
    }
}

/// Result type for parsing.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Configuration which controls parsing.
#[derive(Debug, Clone)]
pub struct Config {
    /// The maximum nesting depth of sub-messages and groups, counting the
    /// top-level message as depth 0.
    ///
    /// Unknown groups count against the same limit.
    pub recursion_limit: usize,
    /// If true, unknown fields are dropped instead of retained, regardless
    /// of what the message type asks for.
    pub discard_unknown_fields: bool,
    _non_public: (),
}

impl Default for Config {
    fn default() -> Self {
        Config {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            discard_unknown_fields: false,
            _non_public: (),
        }
    }
}

impl Config {
    /// Returns the default config with `recursion_limit` replaced.
    pub fn with_recursion_limit(recursion_limit: usize) -> Self {
        Config {
            recursion_limit: recursion_limit,
            .. Config::default()
        }
    }
}

/// Context information passed to nested levels of parsing.
///
/// A `Context` can be formatted with `Display` to show the path to the
/// current location, including both field names and offsets.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    /// The context of the enclosing message, if any.
    pub next: Option<&'a Context<'a>>,
    /// The name of the field being parsed at this level.
    pub field: &'a str,
    /// The offset of the field's value within the input.
    pub pos: u64,
    /// The nesting depth.
    pub depth: usize,
    /// The configuration in effect.
    pub config: &'a Config,
    _non_public: (),
}

impl<'a> Context<'a> {
    /// Returns a top-level context referencing the given config.
    pub fn top(config: &'a Config) -> Self {
        Context {
            next: None,
            field: "",
            pos: 0,
            depth: 0,
            config: config,
            _non_public: (),
        }
    }

    /// Creates a context subordinate to this one for the given field,
    /// provided it does not exceed the recursion limit.
    pub fn push(&'a self, field: &'a str, pos: u64) -> Result<Self> {
        if self.depth >= self.config.recursion_limit {
            Err(Error::RecursionLimitExceeded(self.to_string()))
        } else {
            Ok(Context {
                next: Some(self),
                field: field,
                pos: pos,
                depth: self.depth + 1,
                config: self.config,
                _non_public: (),
            })
        }
    }

    /// How many more group levels an unknown value may open.
    fn remaining_depth(&self) -> usize {
        self.config.recursion_limit.saturating_sub(self.depth)
    }

    fn malformed(&self, err: wire::Error) -> Error {
        match err {
            wire::Error::NestingTooDeep =>
                Error::RecursionLimitExceeded(self.to_string()),
            err => Error::Malformed(self.to_string(), err),
        }
    }
}

impl<'a> fmt::Display for Context<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(ref next) = self.next {
            write!(f, "{}.{}{{{}}}", next, self.field, self.pos)
        } else {
            write!(f, "{}{{{}}}", self.field, self.pos)
        }
    }
}

impl DynamicMessage {
    /// Parses `data` as a message of type `desc` using the default config.
    pub fn parse(desc: MessageDescriptor, data: &[u8]) -> Result<Self> {
        Self::parse_with_config(desc, data, &Config::default())
    }

    /// Parses `data` as a message of type `desc`.
    pub fn parse_with_config(desc: MessageDescriptor, data: &[u8],
                             config: &Config) -> Result<Self> {
        let mut message = DynamicMessage::new(desc);
        message.merge_from_bytes_with_config(data, config)?;
        Ok(message)
    }

    /// Parses `data` and merges it into this message using the default
    /// config.
    ///
    /// Singular scalars are overwritten, singular messages merged
    /// recursively, and repeated fields appended to. On error this message
    /// is unchanged.
    pub fn merge_from_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.merge_from_bytes_with_config(data, &Config::default())
    }

    /// Parses `data` and merges it into this message.
    pub fn merge_from_bytes_with_config(&mut self, data: &[u8],
                                        config: &Config) -> Result<()> {
        let mut scratch = self.clone();
        let context = Context::top(config);
        match merge_window(&mut scratch, data, 0, data.len(),
                           &context, None) {
            Ok(_) => {
                *self = scratch;
                Ok(())
            },
            Err(e) => {
                debug!(message_type = self.descriptor().full_name(),
                       error = %e, "parse failed");
                Err(e)
            },
        }
    }
}

/// Merges the fields in `buf[pos..end]` into `message`.
///
/// If `group` is set, stops after the end-group tag for that field number
/// and fails if the window ends first. Returns the position after the last
/// byte consumed.
fn merge_window(message: &mut DynamicMessage, buf: &[u8], mut pos: usize,
                end: usize, context: &Context, group: Option<u32>)
                -> Result<usize> {
    let desc = message.descriptor().clone();
    let codec = desc.codec();
    let retain = !context.config.discard_unknown_fields &&
        desc.retains_unknown_fields();

    while pos < end {
        let start = pos;
        let (tag, value_pos) = wire::decode_tag(buf, pos, end)
            .context(context)?;

        match codec.decoder(tag) {
            Some(Decoder::Field { index, packed }) => {
                let field = desc.field(index);
                pos = decode_field(message, &field, packed, buf, start,
                                   value_pos, end, context)?;

                // Repeated fields usually arrive as a run of identical
                // tags; skip the table lookup while the run lasts.
                if field.is_list() {
                    let tag_bytes = &buf[start..value_pos];
                    while buf[pos..end].starts_with(tag_bytes) {
                        let element = pos;
                        pos = decode_field(message, &field, packed, buf,
                                           element, element + tag_bytes.len(),
                                           end, context)?;
                    }
                }
            },

            Some(Decoder::MessageSetItem) => {
                pos = decode_message_set_item(
                    message, &desc, buf, start, value_pos, end, context,
                    retain)?;
            },

            None => {
                let (number, wire_type) = wire::unpack_tag(tag)
                    .context(context)?;
                if WireType::EndGroup == wire_type {
                    return if Some(number) == group {
                        Ok(value_pos)
                    } else {
                        Err(context.malformed(
                            wire::Error::UnexpectedEndGroup(number)))
                    };
                }

                pos = wire::skip_value(buf, value_pos, end, number,
                                       wire_type, context.remaining_depth())
                    .map_err(|e| context.malformed(e))?;
                if retain {
                    trace!(message_type = desc.full_name(), number,
                           "retaining unknown field");
                    message.add_unknown_field(UnknownField::from_raw(
                        number, wire_type, buf[start..pos].to_vec(),
                        value_pos - start));
                } else {
                    trace!(message_type = desc.full_name(), number,
                           "dropping unknown field");
                }
            },
        }
    }

    match group {
        Some(number) =>
            Err(context.malformed(wire::Error::MissingEndGroup(number))),
        None => Ok(pos),
    }
}

/// Decodes one occurrence of `field` whose tag spans `buf[start..pos]`.
fn decode_field(message: &mut DynamicMessage, field: &FieldDescriptor,
                packed: bool, buf: &[u8], start: usize, pos: usize,
                end: usize, context: &Context) -> Result<usize> {
    let ty = field.field_type();

    if field.is_map() {
        return decode_map_entry(message, field, buf, start, pos, end,
                                context);
    }

    if ty.is_message() {
        let sub = context.push(field.name(), pos as u64)?;
        let child = if field.is_list() {
            match *message.container_mut(field) {
                FieldValue::RepeatedMessage(ref mut list) => list.add(),
                _ => unreachable!("repeated message without a message list"),
            }
        } else {
            match message.message_slot(field) {
                Some(child) => child,
                None => unreachable!("message field without a message value"),
            }
        };
        return decode_message(child, ty, field.number(), buf, pos, end, &sub);
    }

    if packed {
        let (len, mut element) = wire::decode_length_prefix(buf, pos, end)
            .context(context)?;
        let stop = element + len;
        while element < stop {
            let (value, next) = codec::decode_scalar(buf, element, stop, ty)
                .context(context)?;
            store_scalar(message, field, value);
            element = next;
        }
        return Ok(stop);
    }

    let (value, next) = codec::decode_scalar(buf, pos, end, ty)
        .context(context)?;
    store_scalar(message, field, value);
    Ok(next)
}

/// Merges a sub-message or group body starting at `pos`.
fn decode_message(child: &mut DynamicMessage, ty: FieldType, number: u32,
                  buf: &[u8], pos: usize, end: usize, context: &Context)
                  -> Result<usize> {
    if FieldType::Group == ty {
        merge_window(child, buf, pos, end, context, Some(number))
    } else {
        let (len, payload) = wire::decode_length_prefix(buf, pos, end)
            .context(context)?;
        merge_window(child, buf, payload, payload + len, context, None)
    }
}

fn is_unknown_closed_enum(field: &FieldDescriptor, value: &Value) -> bool {
    match *value {
        Value::EnumNumber(n) => field.enum_type().map_or(false, |en| {
            en.is_closed() && en.get_value(n).is_none()
        }),
        _ => false,
    }
}

fn store_scalar(message: &mut DynamicMessage, field: &FieldDescriptor,
                value: Value) {
    if is_unknown_closed_enum(field, &value) {
        if let Value::EnumNumber(n) = value {
            trace!(field = field.full_name(), value = n,
                   "diverting undeclared closed enum value");
            message.add_unknown_field(
                UnknownField::varint(field.number(), n as i64 as u64));
        }
        return;
    }

    if field.is_list() {
        match *message.container_mut(field) {
            FieldValue::RepeatedScalar(ref mut list) =>
                list.push_unchecked(value),
            _ => unreachable!("repeated scalar without a scalar list"),
        }
    } else {
        message.set_checked(field, value);
    }
}

/// Decodes one map entry. The entry does not count as a nesting level;
/// a message value inside it does.
fn decode_map_entry(message: &mut DynamicMessage, field: &FieldDescriptor,
                    buf: &[u8], start: usize, pos: usize, end: usize,
                    context: &Context) -> Result<usize> {
    let (len, payload) = wire::decode_length_prefix(buf, pos, end)
        .context(context)?;
    let stop = payload + len;

    let (entry_type, key_field, value_field) =
        match (field.message_type(), field.map_key(), field.map_value()) {
            (Some(entry), Some(key), Some(value)) => (entry, key, value),
            _ => unreachable!("map field without an entry type"),
        };

    let mut entry = DynamicMessage::new(entry_type);
    merge_window(&mut entry, buf, payload, stop, context, None)?;

    let key = match MapKey::from_value(entry.take_singular(&key_field)) {
        Some(key) => key,
        None => unreachable!("map key of non-key type"),
    };
    let value = entry.take_singular(&value_field);

    if is_unknown_closed_enum(&value_field, &value) {
        trace!(field = field.full_name(),
               "diverting map entry with undeclared closed enum value");
        message.add_unknown_field(UnknownField::from_raw(
            field.number(), WireType::LengthDelimited,
            buf[start..stop].to_vec(), pos - start));
        return Ok(stop);
    }

    match (message.container_mut(field), value) {
        (&mut FieldValue::MessageMap(ref mut map), Value::Message(value)) =>
            map.entry_unchecked(key).merge_unchecked(&value),
        (&mut FieldValue::ScalarMap(ref mut map), value) => {
            map.insert_unchecked(key, value);
        },
        _ => unreachable!("map value does not match its container"),
    }
    Ok(stop)
}

/// Decodes a MessageSet item whose start-group tag spans
/// `buf[start..pos]`.
fn decode_message_set_item(message: &mut DynamicMessage,
                           desc: &MessageDescriptor, buf: &[u8],
                           start: usize, pos: usize, end: usize,
                           context: &Context, retain: bool)
                           -> Result<usize> {
    let item = message_set::decode_item(buf, pos, end,
                                        context.remaining_depth())
        .map_err(|e| context.malformed(e))?;

    let number = if item.type_id <= wire::MAX_FIELD_NUMBER as u64 {
        Some(item.type_id as u32)
    } else {
        None
    };
    let extension = number.and_then(|n| desc.get_field(n)).and_then(|field| {
        if field.is_extension() && FieldType::Message == field.field_type() {
            Some(field)
        } else {
            None
        }
    });

    match extension {
        Some(field) => {
            let sub = context.push(field.name(), item.message_start as u64)?;
            let child = match message.message_slot(&field) {
                Some(child) => child,
                None => unreachable!("message field without a message value"),
            };
            merge_window(child, buf, item.message_start, item.message_end,
                         &sub, None)?;
        },
        None => if retain {
            trace!(message_type = desc.full_name(), type_id = item.type_id,
                   "retaining unknown MessageSet item");
            message.add_unknown_field(UnknownField::from_raw(
                message_set::ITEM_NUMBER, WireType::StartGroup,
                buf[start..item.end].to_vec(), pos - start));
        },
    }

    Ok(item.end)
}

#[cfg(test)]
mod test {
    use message::DynamicMessage;
    use schema::{FieldDef, FieldType, MessageDef, PoolBuilder};
    use test_helpers::{child, everything, parse, sample_pool};
    use value::{MapKey, Value};
    use wire;
    use super::*;

    fn get(msg: &DynamicMessage, name: &str) -> Value {
        msg.get_value(name).unwrap().into_owned()
    }

    #[test]
    fn parses_scalars() {
        let msg = DynamicMessage::parse(everything(), &parse(
            "08 96 01  28 03  3D 01000000  68 01  72 02 'hi'")).unwrap();
        assert_eq!(Value::I32(150), get(&msg, "opt_int32"));
        assert_eq!(Value::I32(-2), get(&msg, "opt_sint32"));
        assert_eq!(Value::U32(1), get(&msg, "opt_fixed32"));
        assert_eq!(Value::Bool(true), get(&msg, "opt_bool"));
        assert_eq!(Value::String("hi".to_owned()), get(&msg, "opt_string"));
        assert!(!msg.has("opt_int64").unwrap());
    }

    #[test]
    fn last_singular_value_wins() {
        let msg = DynamicMessage::parse(everything(), &parse(
            "08 01  08 02")).unwrap();
        assert_eq!(Value::I32(2), get(&msg, "opt_int32"));
    }

    #[test]
    fn repeated_accepts_packed_and_unpacked() {
        // packed_int32 = 30, unpacked_int32 = 31
        let msg = DynamicMessage::parse(everything(), &parse(
            "F2 01 03 01 02 03  F0 01 04  F8 01 05  FA 01 02 06 07"))
            .unwrap();
        let packed = msg.get("packed_int32").unwrap();
        let values: Vec<Value> = packed.as_repeated_scalar().unwrap()
            .iter().cloned().collect();
        assert_eq!(vec![Value::I32(1), Value::I32(2), Value::I32(3),
                        Value::I32(4)], values);

        let unpacked = msg.get("unpacked_int32").unwrap();
        let values: Vec<Value> = unpacked.as_repeated_scalar().unwrap()
            .iter().cloned().collect();
        assert_eq!(vec![Value::I32(5), Value::I32(6), Value::I32(7)],
                   values);
    }

    #[test]
    fn runs_of_repeated_tags_are_all_kept() {
        // strings = 32
        let msg = DynamicMessage::parse(everything(), &parse(
            "82 02 01 'a'  82 02 01 'b'  08 01  82 02 01 'c'")).unwrap();
        let strings = msg.get("strings").unwrap();
        let values: Vec<Value> = strings.as_repeated_scalar().unwrap()
            .iter().cloned().collect();
        assert_eq!(vec![Value::from("a"), Value::from("b"),
                        Value::from("c")], values);
        assert_eq!(Value::I32(1), get(&msg, "opt_int32"));
    }

    #[test]
    fn sub_messages_merge() {
        // child = 18 { x = 1 } then child { name = "n" }
        let msg = DynamicMessage::parse(everything(), &parse(
            "92 01 02 08 01  92 01 03 12 01 'n'")).unwrap();
        let child = get(&msg, "child");
        let child = child.as_message().unwrap();
        assert_eq!(Value::I32(1), get(child, "x"));
        assert_eq!(Value::from("n"), get(child, "name"));
    }

    #[test]
    fn groups_parse_until_their_end_tag() {
        // group_child = 19 { x = 7 }
        let msg = DynamicMessage::parse(everything(), &parse(
            "9B 01 08 07 9C 01  08 01")).unwrap();
        let group = get(&msg, "group_child");
        assert_eq!(Value::I32(7), get(group.as_message().unwrap(), "x"));
        assert_eq!(Value::I32(1), get(&msg, "opt_int32"));
    }

    #[test]
    fn unterminated_group_is_an_error() {
        match DynamicMessage::parse(everything(), &parse("9B 01 08 07")) {
            Err(Error::Malformed(_, wire::Error::MissingEndGroup(19))) => (),
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn stray_end_group_is_an_error() {
        match DynamicMessage::parse(everything(), &parse("08 01 9C 01")) {
            Err(Error::Malformed(_, wire::Error::UnexpectedEndGroup(19))) =>
                (),
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn truncated_input_is_an_error() {
        for data in &["08", "08 96", "72 05 'hi'", "3D 0100", "92 01 05 08"] {
            match DynamicMessage::parse(everything(), &parse(data)) {
                Err(Error::Malformed(..)) => (),
                r => panic!("unexpected result for {}: {:?}", data, r),
            }
        }
    }

    #[test]
    fn invalid_utf8_is_an_error() {
        match DynamicMessage::parse(everything(), &parse("72 01 FF")) {
            Err(Error::Malformed(_, wire::Error::InvalidUtf8)) => (),
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn unknown_fields_are_retained_verbatim() {
        let data = parse("08 01  D0 0F 2A  D9 0F 0102030405060708  \
                          E3 0F 08 01 E4 0F");
        let msg = DynamicMessage::parse(everything(), &data).unwrap();
        assert_eq!(3, msg.unknown_fields().len());
        assert_eq!(250, msg.unknown_fields()[0].number());
        assert_eq!(&parse("D0 0F 2A")[..], msg.unknown_fields()[0].raw());
        assert_eq!(WireType::StartGroup, msg.unknown_fields()[2].wire_type());
        assert_eq!(data, msg.serialize().unwrap());
    }

    #[test]
    fn unknown_fields_can_be_discarded() {
        let data = parse("08 01  D0 0F 2A");
        let mut config = Config::default();
        config.discard_unknown_fields = true;
        let msg = DynamicMessage::parse_with_config(
            everything(), &data, &config).unwrap();
        assert!(msg.unknown_fields().is_empty());
        assert_eq!(Value::I32(1), get(&msg, "opt_int32"));

        let closed = sample_pool().get_message_by_name("test.Closed")
            .unwrap();
        let msg = DynamicMessage::parse(closed, &data).unwrap();
        assert!(msg.unknown_fields().is_empty());
    }

    #[test]
    fn wrong_wire_type_is_unknown() {
        // opt_int32 = 1 sent as fixed32
        let msg = DynamicMessage::parse(everything(), &parse("0D 01000000"))
            .unwrap();
        assert!(!msg.has("opt_int32").unwrap());
        assert_eq!(1, msg.unknown_fields().len());
    }

    #[test]
    fn undeclared_closed_enum_values_become_unknown() {
        // closed_enum = 17 (Level: 1, 2), levels = 34 packed
        let msg = DynamicMessage::parse(everything(), &parse(
            "88 01 05  92 02 03 01 07 02")).unwrap();
        assert!(!msg.has("closed_enum").unwrap());
        let levels = msg.get("levels").unwrap();
        let values: Vec<Value> = levels.as_repeated_scalar().unwrap()
            .iter().cloned().collect();
        assert_eq!(vec![Value::EnumNumber(1), Value::EnumNumber(2)], values);

        let unknown: Vec<&[u8]> = msg.unknown_fields().iter()
            .map(|f| f.raw()).collect();
        assert_eq!(vec![&parse("88 01 05")[..], &parse("90 02 07")[..]],
                   unknown);
    }

    #[test]
    fn open_enums_keep_undeclared_values() {
        let msg = DynamicMessage::parse(everything(), &parse("80 01 09"))
            .unwrap();
        assert_eq!(Value::EnumNumber(9), get(&msg, "opt_enum"));
    }

    #[test]
    fn implicit_presence_zero_is_not_present() {
        // implicit_int32 = 21
        let msg = DynamicMessage::parse(everything(), &parse("A8 01 00"))
            .unwrap();
        assert!(!msg.has("implicit_int32").unwrap());
        let msg = DynamicMessage::parse(everything(), &parse("A8 01 05"))
            .unwrap();
        assert_eq!(Value::I32(5), get(&msg, "implicit_int32"));
    }

    #[test]
    fn oneof_members_replace_each_other() {
        // choice_int = 50, choice_str = 51
        let msg = DynamicMessage::parse(everything(), &parse(
            "90 03 05  9A 03 01 'x'")).unwrap();
        assert_eq!("choice_str",
                   msg.which_oneof("choice").unwrap().unwrap().name());
        assert!(!msg.has("choice_int").unwrap());
    }

    #[test]
    fn map_entries() {
        // string_to_int = 40: {"a": 1}, {"b": 2}, {"a": 3}; key missing
        // in the last entry defaults to "".
        let msg = DynamicMessage::parse(everything(), &parse(
            "C2 02 05 0A 01 'a' 10 01  \
             C2 02 05 0A 01 'b' 10 02  \
             C2 02 05 0A 01 'a' 10 03  \
             C2 02 02 10 04")).unwrap();
        let map = msg.get("string_to_int").unwrap();
        let map = map.as_scalar_map().unwrap();
        assert_eq!(3, map.len());
        assert_eq!(Some(&Value::I32(3)),
                   map.get(MapKey::from("a")).unwrap());
        assert_eq!(Some(&Value::I32(2)),
                   map.get(MapKey::from("b")).unwrap());
        assert_eq!(Some(&Value::I32(4)),
                   map.get(MapKey::from("")).unwrap());
    }

    #[test]
    fn message_map_duplicates_merge() {
        // int_to_child = 41: {1: {x = 5}}, {1: {name = "n"}}
        let msg = DynamicMessage::parse(everything(), &parse(
            "CA 02 06 08 01 12 02 08 05  \
             CA 02 07 08 01 12 03 12 01 'n'")).unwrap();
        let map = msg.get("int_to_child").unwrap();
        let child = map.as_message_map().unwrap()
            .get(MapKey::from(1)).unwrap().unwrap();
        assert_eq!(Value::I32(5), get(child, "x"));
        assert_eq!(Value::from("n"), get(child, "name"));
    }

    #[test]
    fn extensions_parse_like_fields() {
        // ext_int = 100, ext_child = 101 { x = 2 }
        let msg = DynamicMessage::parse(everything(), &parse(
            "A0 06 07  AA 06 02 08 02")).unwrap();
        assert_eq!(Value::I32(7), get(&msg, "test.ext_int"));
        let ext = get(&msg, "test.ext_child");
        assert_eq!(Value::I32(2), get(ext.as_message().unwrap(), "x"));
        assert!(msg.unknown_fields().is_empty());
    }

    #[test]
    fn message_set_items() {
        let pool = sample_pool();
        let container = pool.get_message_by_name("test.Container").unwrap();
        // item 1000 { value = 5 }, then an item for an unknown type id.
        let data = parse("0B 10 E8 07 1A 02 08 05 0C  \
                          0B 1A 00 10 E9 07 0C");
        let msg = DynamicMessage::parse(container.clone(), &data).unwrap();
        let item = get(&msg, "test.SetItem.item");
        assert_eq!(Value::I32(5), get(item.as_message().unwrap(), "value"));

        assert_eq!(1, msg.unknown_fields().len());
        assert_eq!(&parse("0B 1A 00 10 E9 07 0C")[..],
                   msg.unknown_fields()[0].raw());

        match DynamicMessage::parse(container, &parse("0B 1A 00 0C")) {
            Err(Error::Malformed(_, wire::Error::MissingTypeId)) => (),
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn message_set_type_id_beyond_field_numbers_is_kept_raw() {
        let pool = sample_pool();
        let container = pool.get_message_by_name("test.Container").unwrap();
        // type_id = 2^32 + 1000, which must not be read as 1000.
        let data = parse("0B 10 E8 87 80 80 10 1A 02 08 05 0C");
        let msg = DynamicMessage::parse(container, &data).unwrap();
        assert!(!msg.has("test.SetItem.item").unwrap());
        assert_eq!(1, msg.unknown_fields().len());
        assert_eq!(&data[..], msg.unknown_fields()[0].raw());
        assert_eq!(data, msg.serialize().unwrap());
    }

    fn nested(depth: usize) -> Vec<u8> {
        // child = 3 nested `depth` times inside a Child.
        let mut data = parse("08 01");
        for _ in 0..depth {
            let mut outer = vec![0x1A];
            wire::encode_length_delimited(&mut outer, &data);
            data = outer;
        }
        data
    }

    #[test]
    fn nesting_at_the_limit_is_accepted() {
        let msg = DynamicMessage::parse(child(), &nested(100)).unwrap();
        let mut depth = 0;
        let mut current = msg;
        while current.has("child").unwrap() {
            let next = get(&current, "child");
            current = next.as_message().unwrap().clone();
            depth += 1;
        }
        assert_eq!(100, depth);
        assert_eq!(Value::I32(1), get(&current, "x"));
    }

    #[test]
    fn nesting_beyond_the_limit_is_rejected() {
        match DynamicMessage::parse(child(), &nested(101)) {
            Err(Error::RecursionLimitExceeded(_)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }

        // grp = 4, a group of Child, nested the same way.
        let groups = |depth: usize| {
            let mut data = vec![0x23; depth];
            data.extend_from_slice(&parse("08 01"));
            data.extend(vec![0x24; depth]);
            data
        };
        assert!(DynamicMessage::parse(child(), &groups(100)).is_ok());
        match DynamicMessage::parse(child(), &groups(101)) {
            Err(Error::RecursionLimitExceeded(_)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }

        let config = Config::with_recursion_limit(3);
        assert!(DynamicMessage::parse_with_config(
            child(), &nested(3), &config).is_ok());
        assert!(DynamicMessage::parse_with_config(
            child(), &nested(4), &config).is_err());
    }

    #[test]
    fn unknown_groups_count_against_the_limit() {
        // field 15 groups nested inside each other
        let mut data = Vec::new();
        for _ in 0..4 { data.push(0x7B); }
        for _ in 0..4 { data.push(0x7C); }

        let config = Config::with_recursion_limit(4);
        assert!(DynamicMessage::parse_with_config(
            child(), &data, &config).is_ok());
        let config = Config::with_recursion_limit(3);
        match DynamicMessage::parse_with_config(child(), &data, &config) {
            Err(Error::RecursionLimitExceeded(_)) => (),
            r => panic!("unexpected result: {:?}", r.map(|_| ())),
        }
    }

    #[test]
    fn failed_merge_leaves_message_unchanged() {
        let mut msg = DynamicMessage::new(everything());
        msg.set("opt_int32", 5).unwrap();
        let before = msg.clone();
        assert!(msg.merge_from_bytes(&parse("08 07  10 01  72 05 'x'"))
                .is_err());
        assert_eq!(before, msg);
    }

    #[test]
    fn merge_from_bytes_appends_repeated() {
        let mut msg = DynamicMessage::new(everything());
        msg.list_mut("unpacked_int32").unwrap().push(1).unwrap();
        msg.merge_from_bytes(&parse("F8 01 02")).unwrap();
        assert_eq!(2, msg.get("unpacked_int32").unwrap()
                   .as_repeated_scalar().unwrap().len());
    }

    #[test]
    fn error_path_names_fields() {
        let err = DynamicMessage::parse(everything(), &parse(
            "92 01 03 12 05 'x'")).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("child"), "{}", text);
    }

    #[test]
    fn invalid_tags_are_errors() {
        for data in &["00 01", "0F", "07 01"] {
            match DynamicMessage::parse(everything(), &parse(data)) {
                Err(Error::Malformed(..)) => (),
                r => panic!("unexpected result for {}: {:?}", data, r),
            }
        }
    }

    #[test]
    fn packed_sint64_decodes_zigzag() {
        // packed_sint64 = 35: [-1, 1, -2]
        let msg = DynamicMessage::parse(everything(), &parse(
            "9A 02 03 01 02 03")).unwrap();
        let list = msg.get("packed_sint64").unwrap();
        let values: Vec<Value> = list.as_repeated_scalar().unwrap()
            .iter().cloned().collect();
        assert_eq!(vec![Value::I64(-1), Value::I64(1), Value::I64(-2)],
                   values);
    }

    #[test]
    fn standalone_schema_round_trip() {
        let pool = PoolBuilder::new()
            .package("t")
            .message(MessageDef::new("M")
                     .field(FieldDef::optional("a", 1, FieldType::Int32)))
            .build().unwrap();
        let desc = pool.get_message_by_name("t.M").unwrap();
        let msg = DynamicMessage::parse(desc, &parse("08 96 01")).unwrap();
        assert_eq!(Value::I32(150), get(&msg, "a"));
    }
}
