//-
// Copyright 2017 Jason Lingle
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The legacy MessageSet item encoding.
//!
//! A message marked `message_set_wire_format` carries only extensions, each
//! of which must be a message. Instead of an ordinary length-delimited field,
//! every extension is written as a group numbered `ITEM_NUMBER`:
//!
//! ```text
//! 0B                      start group 1
//!   10 <type_id varint>   the extension's field number
//!   1A <len> <message>    the extension's value
//! 0C                      end group 1
//! ```

use message::DynamicMessage;
use wire::{self, Error, Result, WireType};

/// Field number of the item group.
pub const ITEM_NUMBER: u32 = 1;
/// Field number of `type_id` within an item.
pub const TYPE_ID_NUMBER: u32 = 2;
/// Field number of `message` within an item.
pub const MESSAGE_NUMBER: u32 = 3;

const START_TAG: u8 = 0x0B;
const END_TAG: u8 = 0x0C;
const TYPE_ID_TAG: u8 = 0x10;
const MESSAGE_TAG: u8 = 0x1A;

/// Appends the item for extension `number` holding `message`.
pub(crate) fn encode_item(out: &mut Vec<u8>, number: u32,
                          message: &DynamicMessage) {
    out.push(START_TAG);
    out.push(TYPE_ID_TAG);
    wire::encode_varint(out, number as u64);
    out.push(MESSAGE_TAG);
    wire::encode_varint(out, message.byte_size() as u64);
    message.write_to(out);
    out.push(END_TAG);
}

/// The encoded size of the item `encode_item` would produce.
pub(crate) fn item_size(number: u32, message: &DynamicMessage) -> usize {
    4 + wire::varint_size(number as u64) +
        wire::length_delimited_size(message.byte_size())
}

/// The parts of one decoded item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Item {
    /// The extension field number, as read. Values outside the field number
    /// range are kept so that the item can be retained unchanged.
    pub type_id: u64,
    /// Start of the message payload.
    pub message_start: usize,
    /// End of the message payload.
    pub message_end: usize,
    /// Position immediately after the end-group tag.
    pub end: usize,
}

/// Decodes an item whose start-group tag has already been consumed.
///
/// `type_id` and `message` may appear in either order; if either repeats,
/// the last occurrence wins. Any other field inside the item is skipped,
/// with groups entering at most `depth` levels.
pub(crate) fn decode_item(buf: &[u8], mut pos: usize, end: usize,
                          depth: usize) -> Result<Item> {
    let mut type_id = None;
    let mut message = None;

    while pos < end {
        let (tag, next) = wire::decode_tag(buf, pos, end)?;
        let (number, wire_type) = wire::unpack_tag(tag)?;
        pos = match (number, wire_type) {
            (TYPE_ID_NUMBER, WireType::Varint) => {
                let (id, next) = wire::decode_varint(buf, next, end)?;
                type_id = Some(id);
                next
            },
            (MESSAGE_NUMBER, WireType::LengthDelimited) => {
                let (len, start) = wire::decode_length_prefix(buf, next, end)?;
                message = Some((start, start + len));
                start + len
            },
            (ITEM_NUMBER, WireType::EndGroup) => {
                let type_id = type_id.ok_or(Error::MissingTypeId)?;
                let (message_start, message_end) =
                    message.ok_or(Error::MissingMessage)?;
                return Ok(Item {
                    type_id: type_id,
                    message_start: message_start,
                    message_end: message_end,
                    end: next,
                });
            },
            (_, WireType::EndGroup) =>
                return Err(Error::UnexpectedEndGroup(number)),
            _ => wire::skip_value(buf, next, end, number, wire_type, depth)?,
        };
    }

    Err(Error::MissingEndGroup(ITEM_NUMBER))
}
