//! Element lists: name-keyed entries with self-described types.
//!
//! Unlike field lists, every standard element entry carries its own name
//! and wire type, so no dictionary is needed to decode one. Set-defined
//! slots take both from the referenced definition.

use crate::container::{
    check_nested, close_entry, container_complete, load_payload, open_entry, require_entries,
    Payload,
};
use crate::error::{CodecError, CodecResult, EntryError, UsageError};
use crate::iter::{
    DecodeContext, DecodeIterator, EncSetDef, EncodeIterator, EncodeLevel, EncodeState,
};
use crate::primitive::Primitive;
use crate::set_def::{
    decode_set_value, encode_set_blank, encode_set_value, ElementSetDef, LocalElementSetDb,
};
use crate::types::DataType;

use super::field_list::capture_set_run;

const HAS_INFO: u8 = 0x01;
const HAS_SET_DATA: u8 = 0x02;
const HAS_SET_ID: u8 = 0x04;
const HAS_STANDARD_DATA: u8 = 0x08;

/// Decoded element-list header over its undecoded entries.
#[derive(Debug, Clone)]
pub struct ElementList<'a> {
    /// Template number from the info block.
    pub element_list_num: Option<i16>,
    pub set_id: u16,
    set_def: Option<ElementSetDef>,
    set_data: &'a [u8],
    entries_data: &'a [u8],
    standard_count: u16,
    ctx: DecodeContext<'a>,
}

impl<'a> ElementList<'a> {
    pub fn decode(
        iter: &mut DecodeIterator<'a>,
        local_sets: Option<&LocalElementSetDb>,
    ) -> CodecResult<ElementList<'a>> {
        let ctx = iter.context();
        if iter.remaining() == 0 {
            return Ok(ElementList::empty(ctx));
        }
        let flags = iter.read_u8()?;
        let mut list = ElementList::empty(ctx);

        if flags & HAS_INFO != 0 {
            let len = iter.read_u8()? as usize;
            let block = iter.read_bytes(len)?;
            let mut info = iter.subslice(block);
            list.element_list_num = Some(info.read_i16()?);
        }

        if flags & HAS_SET_DATA != 0 {
            if flags & HAS_SET_ID != 0 {
                list.set_id = iter.read_u15rb()?;
            }
            let def = local_sets
                .and_then(|db| db.get(list.set_id))
                .or_else(|| ctx.element_sets.and_then(|db| db.get(list.set_id)))
                .cloned()
                .ok_or(CodecError::UnknownSetId(list.set_id))?;
            list.set_def = Some(def);
            if flags & HAS_STANDARD_DATA != 0 {
                list.set_data = iter.read_buffer15()?;
                list.standard_count = iter.read_u16()?;
                list.entries_data = iter.take_remaining();
            } else {
                list.set_data = iter.take_remaining();
            }
        } else if flags & HAS_STANDARD_DATA != 0 {
            list.standard_count = iter.read_u16()?;
            list.entries_data = iter.take_remaining();
        }
        Ok(list)
    }

    fn empty(ctx: DecodeContext<'a>) -> Self {
        ElementList {
            element_list_num: None,
            set_id: 0,
            set_def: None,
            set_data: b"",
            entries_data: b"",
            standard_count: 0,
            ctx,
        }
    }

    pub fn count(&self) -> usize {
        self.set_def.as_ref().map_or(0, |d| d.entries.len()) + self.standard_count as usize
    }

    pub fn iter(&self) -> ElementListIter<'_, 'a> {
        ElementListIter::new(self)
    }

    /// Keyed lookup by element name across a fresh pass.
    pub fn find(&self, name: &[u8]) -> Result<Payload<'a>, EntryError> {
        let mut nav = self.iter();
        while let Some(entry) = nav.next_entry() {
            match entry {
                Ok(e) if e.name == name => return Ok(e.load()),
                Ok(_) => continue,
                Err(_) => break,
            }
        }
        Err(EntryError::ElementNotFound(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }
}

/// Forward-only entry navigator over a decoded element list.
#[derive(Debug, Clone)]
pub struct ElementListIter<'m, 'a> {
    list: &'m ElementList<'a>,
    set_cursor: DecodeIterator<'a>,
    set_slot: usize,
    std_cursor: DecodeIterator<'a>,
    std_remaining: u16,
    failed: bool,
}

impl<'m, 'a> ElementListIter<'m, 'a> {
    fn new(list: &'m ElementList<'a>) -> Self {
        ElementListIter {
            list,
            set_cursor: DecodeIterator::with_context(list.set_data, list.ctx),
            set_slot: 0,
            std_cursor: DecodeIterator::with_context(list.entries_data, list.ctx),
            std_remaining: list.standard_count,
            failed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = ElementListIter::new(self.list);
    }

    pub fn next_entry(&mut self) -> Option<CodecResult<ElementEntryRef<'m, 'a>>> {
        if self.failed {
            return None;
        }
        let result = self.advance();
        if matches!(result, Some(Err(_))) {
            self.failed = true;
        }
        result
    }

    fn advance(&mut self) -> Option<CodecResult<ElementEntryRef<'m, 'a>>> {
        let list = self.list;
        if let Some(def) = &list.set_def {
            if self.set_slot < def.entries.len() {
                let slot = &def.entries[self.set_slot];
                self.set_slot += 1;
                let run = match capture_set_run(&mut self.set_cursor, slot.data_type) {
                    Ok(run) => run,
                    Err(e) => return Some(Err(e)),
                };
                return Some(Ok(ElementEntryRef {
                    name: &slot.name,
                    declared: slot.data_type.base_type(),
                    set_type: Some(slot.data_type),
                    raw: run,
                    ctx: self.list.ctx,
                }));
            }
        }
        if self.std_remaining == 0 {
            return None;
        }
        self.std_remaining -= 1;
        let mut step = || -> CodecResult<ElementEntryRef<'m, 'a>> {
            let name = self.std_cursor.read_buffer15()?;
            let raw_type = self.std_cursor.read_u8()?;
            let declared =
                DataType::try_from(raw_type).map_err(|_| CodecError::UnknownType(raw_type))?;
            if declared.is_set_variant() {
                return Err(CodecError::UnknownType(raw_type));
            }
            let raw = if declared == DataType::NoData {
                b"".as_slice()
            } else {
                self.std_cursor.read_buffer16()?
            };
            Ok(ElementEntryRef {
                name,
                declared,
                set_type: None,
                raw,
                ctx: self.list.ctx,
            })
        };
        Some(step())
    }
}

/// One element entry, payload undecoded until [`ElementEntryRef::load`].
/// The name borrows the list (set-slot names live in its definition),
/// the payload borrows the wire buffer.
#[derive(Debug, Clone, Copy)]
pub struct ElementEntryRef<'m, 'a> {
    pub name: &'m [u8],
    declared: DataType,
    set_type: Option<DataType>,
    raw: &'a [u8],
    ctx: DecodeContext<'a>,
}

impl<'m, 'a> ElementEntryRef<'m, 'a> {
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn data_type(&self) -> DataType {
        self.declared
    }

    pub fn load(&self) -> Payload<'a> {
        if let Some(ty) = self.set_type {
            let mut sub = DecodeIterator::with_context(self.raw, self.ctx);
            return match decode_set_value(&mut sub, ty) {
                Ok(Some(p)) => Payload::Primitive(p),
                Ok(None) => Payload::Blank,
                Err(_) => Payload::Error(EntryError::Malformed {
                    expected: ty.base_type(),
                    reason: "malformed set-lane value",
                }),
            };
        }
        load_payload(self.ctx, self.raw, self.declared, None, None)
    }
}

/// Element-list header for encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElementListInit {
    pub element_list_num: Option<i16>,
    pub set_id: Option<u16>,
    pub has_standard_data: bool,
}

impl ElementListInit {
    pub fn standard() -> Self {
        ElementListInit {
            has_standard_data: true,
            ..ElementListInit::default()
        }
    }

    pub fn encode_init(
        &self,
        iter: &mut EncodeIterator<'_>,
        set_db: Option<&LocalElementSetDb>,
    ) -> CodecResult<()> {
        check_nested(iter, DataType::ElementList)?;
        let start = iter.position();
        let mut level = EncodeLevel::new(DataType::ElementList, start);
        level.has_standard = self.has_standard_data;

        let set_def = match self.set_id {
            Some(id) => Some(
                set_db
                    .and_then(|db| db.get(id))
                    .ok_or(CodecError::UnknownSetId(id))?,
            ),
            None => None,
        };

        let mut flags = 0u8;
        if self.element_list_num.is_some() {
            flags |= HAS_INFO;
        }
        if set_def.is_some() {
            flags |= HAS_SET_DATA;
            if self.set_id != Some(0) {
                flags |= HAS_SET_ID;
            }
        }
        if self.has_standard_data {
            flags |= HAS_STANDARD_DATA;
        }
        iter.write_u8(flags)?;

        if let Some(num) = self.element_list_num {
            iter.write_u8(2)?;
            iter.write_i16(num)?;
        }

        if let Some(def) = set_def {
            if self.set_id != Some(0) {
                iter.write_u15rb(def.set_id)?;
            }
            if def.entries.is_empty() {
                if self.has_standard_data {
                    let mark = iter.reserve_u15()?;
                    iter.finish_u15(mark)?;
                    level.count_pos = Some(iter.reserve_u16_scalar()?);
                }
            } else {
                if self.has_standard_data {
                    level.set_mark = Some(iter.reserve_u15()?);
                }
                level.set_def = Some(EncSetDef::Element(
                    def.entries
                        .iter()
                        .map(|e| (e.name.clone(), e.data_type))
                        .collect(),
                ));
                level.state = EncodeState::SetData;
            }
        } else if self.has_standard_data {
            level.count_pos = Some(iter.reserve_u16_scalar()?);
        }
        iter.push_level(level)
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        container_complete(iter, DataType::ElementList, commit, false)
    }
}

/// One element entry for encoding.
#[derive(Debug, Clone, Copy)]
pub struct ElementEntry<'n> {
    pub name: &'n [u8],
}

impl<'n> ElementEntry<'n> {
    pub fn new(name: &'n [u8]) -> Self {
        ElementEntry { name }
    }

    /// Encodes a primitive payload in one call.
    pub fn encode(&self, iter: &mut EncodeIterator<'_>, value: &Primitive<'_>) -> CodecResult<()> {
        let checkpoint = iter.position();
        let result = self.encode_value(iter, value.data_type(), Some(value));
        if result.is_err() {
            iter.rollback_to(checkpoint);
        }
        result
    }

    /// Encodes the blank form under an explicit primitive type.
    pub fn encode_blank(&self, iter: &mut EncodeIterator<'_>, ty: DataType) -> CodecResult<()> {
        let checkpoint = iter.position();
        let result = self.encode_value(iter, ty, None);
        if result.is_err() {
            iter.rollback_to(checkpoint);
        }
        result
    }

    /// Encodes an entry that deliberately carries no payload.
    pub fn encode_no_data(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        require_entries(iter, DataType::ElementList)?;
        let checkpoint = iter.position();
        let result = (|| {
            iter.write_buffer15(self.name)?;
            iter.write_u8(DataType::NoData as u8)
        })();
        if result.is_err() {
            iter.rollback_to(checkpoint);
            return result;
        }
        iter.require_open(DataType::ElementList)?.count += 1;
        Ok(())
    }

    fn encode_value(
        &self,
        iter: &mut EncodeIterator<'_>,
        ty: DataType,
        value: Option<&Primitive<'_>>,
    ) -> CodecResult<()> {
        if ty.is_container() || ty.is_set_variant() {
            return Err(UsageError::InvalidContainerType(ty).into());
        }
        let state = iter.require_open(DataType::ElementList)?.state;
        if state == EncodeState::SetData {
            return self.encode_set_slot(iter, value);
        }
        require_entries(iter, DataType::ElementList)?;
        iter.write_buffer15(self.name)?;
        iter.write_u8(ty as u8)?;
        match value {
            Some(v) => {
                iter.write_u16ob(v.wire_len() as u16)?;
                v.encode_body(iter)?;
            }
            None => iter.write_u16ob(0)?,
        }
        iter.require_open(DataType::ElementList)?.count += 1;
        Ok(())
    }

    fn encode_set_slot(
        &self,
        iter: &mut EncodeIterator<'_>,
        value: Option<&Primitive<'_>>,
    ) -> CodecResult<()> {
        let (slot_ty, matches, slot, total) = {
            let level = iter.require_open(DataType::ElementList)?;
            let Some(EncSetDef::Element(slots)) = &level.set_def else {
                return Err(UsageError::NoOpenContainer.into());
            };
            let (name, ty) = &slots[level.set_slot];
            (*ty, name.as_slice() == self.name, level.set_slot, slots.len())
        };
        if !matches {
            return Err(UsageError::SetSlotNameMismatch { slot }.into());
        }
        match value {
            Some(v) => encode_set_value(iter, slot_ty, v)?,
            None => encode_set_blank(iter, slot_ty)?,
        }
        let set_mark = {
            let level = iter.require_open(DataType::ElementList)?;
            level.set_slot += 1;
            level.count += 1;
            if level.set_slot == total {
                level.state = EncodeState::Entries;
                level.set_mark.take()
            } else {
                None
            }
        };
        if let Some(mark) = set_mark {
            iter.finish_u15(mark)?;
            let pos = iter.reserve_u16_scalar()?;
            iter.require_open(DataType::ElementList)?.count_pos = Some(pos);
        }
        Ok(())
    }

    /// Opens this entry for a nested payload of declared type `ty`.
    pub fn encode_init(
        &self,
        iter: &mut EncodeIterator<'_>,
        ty: DataType,
        approx: usize,
    ) -> CodecResult<()> {
        if !ty.is_container() {
            return Err(UsageError::InvalidContainerType(ty).into());
        }
        require_entries(iter, DataType::ElementList)?;
        let checkpoint = iter.position();
        let result = (|| {
            iter.write_buffer15(self.name)?;
            iter.write_u8(ty as u8)
        })();
        if let Err(e) = result {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        open_entry(iter, DataType::ElementList, checkpoint, approx, Some(ty))
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        close_entry(iter, DataType::ElementList, commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::set_def::ElementSetEntry;
    use crate::types::WIRE_VERSION;

    #[test]
    fn named_entries_round_trip() {
        let mut buf = vec![0u8; 128];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        ElementListInit::standard().encode_init(&mut it, None).unwrap();
        ElementEntry::new(b"RATE")
            .encode(&mut it, &Primitive::UInt(42))
            .unwrap();
        ElementEntry::new(b"NAME")
            .encode(&mut it, &Primitive::Ascii(b"EUR="))
            .unwrap();
        ElementEntry::new(b"GAP").encode_no_data(&mut it).unwrap();
        ElementListInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();

        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let list = ElementList::decode(&mut rd, None).unwrap();
        assert_eq!(list.count(), 3);
        let mut nav = list.iter();
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!((e.name, e.data_type()), (b"RATE".as_slice(), DataType::UInt));
        assert!(matches!(e.load(), Payload::Primitive(Primitive::UInt(42))));
        let e = nav.next_entry().unwrap().unwrap();
        assert!(matches!(e.load(), Payload::Primitive(Primitive::Ascii(b"EUR="))));
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!(e.data_type(), DataType::NoData);
        assert!(matches!(e.load(), Payload::NoData));
        assert!(nav.next_entry().is_none());
    }

    #[test]
    fn blank_element_distinct_from_no_data() {
        let mut buf = vec![0u8; 64];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        ElementListInit::standard().encode_init(&mut it, None).unwrap();
        ElementEntry::new(b"BID")
            .encode_blank(&mut it, DataType::Real)
            .unwrap();
        ElementListInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();
        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let list = ElementList::decode(&mut rd, None).unwrap();
        let e = list.iter().next_entry().unwrap().unwrap();
        assert_eq!(e.data_type(), DataType::Real);
        assert!(e.load().is_blank());
    }

    #[test]
    fn find_reports_missing_elements() {
        let mut buf = vec![0u8; 64];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        ElementListInit::standard().encode_init(&mut it, None).unwrap();
        ElementEntry::new(b"A").encode(&mut it, &Primitive::Int(1)).unwrap();
        ElementListInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();
        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let list = ElementList::decode(&mut rd, None).unwrap();
        assert!(matches!(list.find(b"A"), Ok(Payload::Primitive(_))));
        assert!(matches!(
            list.find(b"MISSING"),
            Err(EntryError::ElementNotFound(_))
        ));
    }

    #[test]
    fn set_encoded_elements_round_trip() {
        let mut db = LocalElementSetDb::new();
        db.define(ElementSetDef::new(
            0,
            vec![
                ElementSetEntry {
                    name: b"BID".to_vec(),
                    data_type: DataType::Real8RB,
                },
                ElementSetEntry {
                    name: b"SIZE".to_vec(),
                    data_type: DataType::UInt4,
                },
            ],
        ))
        .unwrap();
        let mut buf = vec![0u8; 128];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        ElementListInit {
            element_list_num: None,
            set_id: Some(0),
            has_standard_data: false,
        }
        .encode_init(&mut it, Some(&db))
        .unwrap();
        ElementEntry::new(b"BID")
            .encode(&mut it, &Primitive::Real(crate::Real::new(995, crate::RealHint::ExponentNeg1)))
            .unwrap();
        ElementEntry::new(b"SIZE")
            .encode(&mut it, &Primitive::UInt(900))
            .unwrap();
        ElementListInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();

        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let list = ElementList::decode(&mut rd, Some(&db)).unwrap();
        assert_eq!(list.count(), 2);
        let mut nav = list.iter();
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!(e.name, b"BID");
        assert!(matches!(
            e.load(),
            Payload::Primitive(Primitive::Real(r)) if r.mantissa == 995
        ));
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!(e.name, b"SIZE");
        assert!(matches!(e.load(), Payload::Primitive(Primitive::UInt(900))));
    }
}
