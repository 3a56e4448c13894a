//! Homogeneous primitive arrays.
//!
//! An array payload is one item type, an optional fixed per-item width,
//! an item count, and the items back to back: raw fixed-width runs when a
//! width is declared, individually length-prefixed runs otherwise.

use crate::error::{CodecError, CodecResult};
use crate::iter::{DecodeIterator, EncodeIterator};
use crate::primitive::{decode_body, int_wire_len, uint_wire_len, write_int, write_uint, Primitive};
use crate::types::DataType;

/// Decoded array header over its undecoded items.
#[derive(Debug, Clone)]
pub struct Array<'a> {
    pub item_type: DataType,
    /// Fixed item width; 0 means items are individually length-prefixed.
    pub item_width: u16,
    pub count: u16,
    items: DecodeIterator<'a>,
}

impl<'a> Array<'a> {
    pub fn decode(iter: &mut DecodeIterator<'a>) -> CodecResult<Array<'a>> {
        let raw_type = iter.read_u8()?;
        let item_type = DataType::try_from(raw_type).map_err(|_| CodecError::UnknownType(raw_type))?;
        if !item_type.is_primitive() || item_type.is_set_variant() {
            return Err(CodecError::InvalidData {
                reason: "array item type must be a base primitive",
            });
        }
        let item_width = iter.read_u16ob()?;
        let count = iter.read_u16()?;
        let rest = iter.take_remaining();
        let items = iter.subslice(rest);
        Ok(Array {
            item_type,
            item_width,
            count,
            items,
        })
    }

    /// Fresh pass over the items; may be called any number of times.
    pub fn iter(&self) -> ArrayIter<'a> {
        ArrayIter {
            item_type: self.item_type,
            item_width: self.item_width,
            remaining: self.count,
            cursor: self.items.clone(),
            failed: false,
        }
    }

    /// One-shot encode of a whole array body.
    pub fn encode(
        iter: &mut EncodeIterator<'_>,
        item_type: DataType,
        item_width: u16,
        items: &[Primitive<'_>],
    ) -> CodecResult<()> {
        if !item_type.is_primitive() || item_type.is_set_variant() {
            return Err(CodecError::InvalidData {
                reason: "array item type must be a base primitive",
            });
        }
        if items.len() > u16::MAX as usize {
            return Err(CodecError::InvalidData {
                reason: "array exceeds u16 item count",
            });
        }
        iter.write_u8(item_type as u8)?;
        iter.write_u16ob(item_width)?;
        iter.write_u16(items.len() as u16)?;
        for item in items {
            if item.data_type() != item_type {
                return Err(crate::error::UsageError::PrimitiveTypeMismatch {
                    declared: item_type,
                    supplied: item.data_type(),
                }
                .into());
            }
            if item_width == 0 {
                iter.write_u16ob(item.wire_len() as u16)?;
                item.encode_body(iter)?;
            } else {
                encode_fixed_item(iter, item, item_width as usize)?;
            }
        }
        Ok(())
    }
}

fn encode_fixed_item(
    iter: &mut EncodeIterator<'_>,
    item: &Primitive<'_>,
    width: usize,
) -> CodecResult<()> {
    match item {
        Primitive::Int(v) => {
            if int_wire_len(*v) > width || width > 8 {
                return Err(CodecError::InvalidData {
                    reason: "integer does not fit the array item width",
                });
            }
            write_int(iter, *v, width)
        }
        Primitive::UInt(v) => {
            if uint_wire_len(*v) > width || width > 8 {
                return Err(CodecError::InvalidData {
                    reason: "integer does not fit the array item width",
                });
            }
            write_uint(iter, *v, width)
        }
        other => {
            if other.wire_len() != width {
                return Err(CodecError::InvalidData {
                    reason: "value does not match the array item width",
                });
            }
            other.encode_body(iter)
        }
    }
}

/// Forward pass over array items. A malformed item aborts the pass.
#[derive(Debug, Clone)]
pub struct ArrayIter<'a> {
    item_type: DataType,
    item_width: u16,
    remaining: u16,
    cursor: DecodeIterator<'a>,
    failed: bool,
}

impl<'a> Iterator for ArrayIter<'a> {
    /// `Ok(None)` is a blank item.
    type Item = CodecResult<Option<Primitive<'a>>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let run = if self.item_width == 0 {
            self.cursor.read_buffer16()
        } else {
            self.cursor.read_bytes(self.item_width as usize)
        };
        let run = match run {
            Ok(run) => run,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        match decode_body(run, self.item_type) {
            Ok(v) => Some(Ok(v)),
            Err(e) => {
                self.failed = true;
                Some(Err(e.into_codec_error()))
            }
        }
    }
}
