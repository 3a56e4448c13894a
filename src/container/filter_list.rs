//! Filter lists: id-keyed entries that may each override the declared
//! container type.

use crate::container::{
    begin_entries, check_nested, close_entry, container_complete, load_payload, open_entry,
    read_entry_container_type, require_entries, Payload,
};
use crate::error::{CodecError, CodecResult, UsageError};
use crate::iter::{DecodeContext, DecodeIterator, EncodeIterator, EncodeLevel};
use crate::types::{DataType, FilterAction};

const HAS_PERM_ENTRIES: u8 = 0x01;
const HAS_TOTAL_COUNT_HINT: u8 = 0x02;

const ENTRY_HAS_PERM: u8 = 0x01;
const ENTRY_HAS_CONTAINER_TYPE: u8 = 0x02;

/// Decoded filter-list header over its undecoded entries.
#[derive(Debug, Clone)]
pub struct FilterList<'a> {
    pub container_type: DataType,
    pub total_count_hint: Option<u8>,
    pub has_perm_entries: bool,
    entries_data: &'a [u8],
    count: u8,
    ctx: DecodeContext<'a>,
}

impl<'a> FilterList<'a> {
    pub fn decode(iter: &mut DecodeIterator<'a>) -> CodecResult<FilterList<'a>> {
        let ctx = iter.context();
        if iter.remaining() == 0 {
            return Ok(FilterList::empty(ctx));
        }
        let flags = iter.read_u8()?;
        let container_type = read_entry_container_type(iter)?;
        let mut list = FilterList {
            container_type,
            has_perm_entries: flags & HAS_PERM_ENTRIES != 0,
            ..FilterList::empty(ctx)
        };
        if flags & HAS_TOTAL_COUNT_HINT != 0 {
            list.total_count_hint = Some(iter.read_u8()?);
        }
        list.count = iter.read_u8()?;
        list.entries_data = iter.take_remaining();
        Ok(list)
    }

    fn empty(ctx: DecodeContext<'a>) -> Self {
        FilterList {
            container_type: DataType::NoData,
            total_count_hint: None,
            has_perm_entries: false,
            entries_data: b"",
            count: 0,
            ctx,
        }
    }

    pub fn count(&self) -> u8 {
        self.count
    }

    pub fn iter(&self) -> FilterListIter<'_, 'a> {
        FilterListIter::new(self)
    }
}

/// Forward-only entry navigator over a decoded filter list.
#[derive(Debug, Clone)]
pub struct FilterListIter<'m, 'a> {
    list: &'m FilterList<'a>,
    cursor: DecodeIterator<'a>,
    remaining: u8,
    failed: bool,
}

impl<'m, 'a> FilterListIter<'m, 'a> {
    fn new(list: &'m FilterList<'a>) -> Self {
        FilterListIter {
            list,
            cursor: DecodeIterator::with_context(list.entries_data, list.ctx),
            remaining: list.count,
            failed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = FilterListIter::new(self.list);
    }

    pub fn next_entry(&mut self) -> Option<CodecResult<FilterEntryRef<'a>>> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let list = self.list;
        let cursor = &mut self.cursor;
        let mut step = || -> CodecResult<FilterEntryRef<'a>> {
            let lead = cursor.read_u8()?;
            let action = FilterAction::try_from(lead & 0x0F).map_err(|_| {
                CodecError::InvalidData {
                    reason: "invalid filter entry action",
                }
            })?;
            let entry_flags = lead >> 4;
            let id = cursor.read_u8()?;
            let container_type = if entry_flags & ENTRY_HAS_CONTAINER_TYPE != 0 {
                read_entry_container_type(cursor)?
            } else {
                list.container_type
            };
            let perm_data = if list.has_perm_entries && entry_flags & ENTRY_HAS_PERM != 0 {
                Some(cursor.read_buffer15()?)
            } else {
                None
            };
            let raw = if action.has_payload() && container_type != DataType::NoData {
                cursor.read_buffer16()?
            } else {
                b"".as_slice()
            };
            Ok(FilterEntryRef {
                action,
                id,
                container_type,
                perm_data,
                raw,
                ctx: list.ctx,
            })
        };
        let result = step();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// One filter entry; its container type may differ from the list's.
#[derive(Debug, Clone, Copy)]
pub struct FilterEntryRef<'a> {
    pub action: FilterAction,
    pub id: u8,
    pub container_type: DataType,
    perm_data: Option<&'a [u8]>,
    raw: &'a [u8],
    ctx: DecodeContext<'a>,
}

impl<'a> FilterEntryRef<'a> {
    pub fn perm_data(&self) -> Option<&'a [u8]> {
        self.perm_data
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn load(&self) -> Payload<'a> {
        if !self.action.has_payload() || self.container_type == DataType::NoData {
            return Payload::NoData;
        }
        load_payload(self.ctx, self.raw, self.container_type, None, None)
    }
}

/// Filter-list header for encoding.
#[derive(Debug, Clone, Copy)]
pub struct FilterListInit {
    pub container_type: DataType,
    pub total_count_hint: Option<u8>,
    pub has_perm_entries: bool,
}

impl FilterListInit {
    pub fn new(container_type: DataType) -> Self {
        FilterListInit {
            container_type,
            total_count_hint: None,
            has_perm_entries: false,
        }
    }

    pub fn encode_init(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        if !self.container_type.is_container() {
            return Err(UsageError::InvalidContainerType(self.container_type).into());
        }
        check_nested(iter, DataType::FilterList)?;
        let start = iter.position();
        let mut level = EncodeLevel::new(DataType::FilterList, start);
        level.entry_container = self.container_type;
        level.perm_entries = self.has_perm_entries;

        let mut flags = 0u8;
        if self.has_perm_entries {
            flags |= HAS_PERM_ENTRIES;
        }
        if self.total_count_hint.is_some() {
            flags |= HAS_TOTAL_COUNT_HINT;
        }
        iter.write_u8(flags)?;
        iter.write_u8(self.container_type.to_wire_container())?;
        iter.push_level(level)?;
        begin_entries(
            iter,
            DataType::FilterList,
            self.total_count_hint.map(u32::from),
            true,
        )
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        container_complete(iter, DataType::FilterList, commit, true)
    }
}

/// One filter entry for encoding.
#[derive(Debug, Clone, Copy)]
pub struct FilterEntry<'k> {
    pub action: FilterAction,
    pub id: u8,
    /// Per-entry container type override.
    pub container_type: Option<DataType>,
    pub perm_data: Option<&'k [u8]>,
}

impl<'k> FilterEntry<'k> {
    pub fn new(action: FilterAction, id: u8) -> Self {
        FilterEntry {
            action,
            id,
            container_type: None,
            perm_data: None,
        }
    }

    fn effective_type(&self, declared: DataType) -> DataType {
        self.container_type.unwrap_or(declared)
    }

    fn write_prefix(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        let perm_declared = iter.require_open(DataType::FilterList)?.perm_entries;
        if self.perm_data.is_some() && !perm_declared {
            return Err(UsageError::PermDataNotDeclared.into());
        }
        if let Some(ty) = self.container_type {
            if !ty.is_container() {
                return Err(UsageError::InvalidContainerType(ty).into());
            }
        }
        let mut lead = self.action as u8;
        if self.perm_data.is_some() {
            lead |= ENTRY_HAS_PERM << 4;
        }
        if self.container_type.is_some() {
            lead |= ENTRY_HAS_CONTAINER_TYPE << 4;
        }
        iter.write_u8(lead)?;
        iter.write_u8(self.id)?;
        if let Some(ty) = self.container_type {
            iter.write_u8(ty.to_wire_container())?;
        }
        if let Some(perm) = self.perm_data {
            iter.write_buffer15(perm)?;
        }
        Ok(())
    }

    fn bump_count(iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        let level = iter.require_open(DataType::FilterList)?;
        if level.count == u8::MAX as u16 {
            return Err(UsageError::TooManyFilterEntries.into());
        }
        level.count += 1;
        Ok(())
    }

    /// Encodes a payload-less entry (clear action or `NoData` type).
    pub fn encode(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        require_entries(iter, DataType::FilterList)?;
        let declared = iter.require_open(DataType::FilterList)?.entry_container;
        if self.action.has_payload() && self.effective_type(declared) != DataType::NoData {
            return Err(UsageError::PayloadRequired.into());
        }
        let checkpoint = iter.position();
        if let Err(e) = self.write_prefix(iter) {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        Self::bump_count(iter)
    }

    pub fn encode_init(&self, iter: &mut EncodeIterator<'_>, approx: usize) -> CodecResult<()> {
        require_entries(iter, DataType::FilterList)?;
        {
            let level = iter.require_open(DataType::FilterList)?;
            if level.count == u8::MAX as u16 {
                return Err(UsageError::TooManyFilterEntries.into());
            }
        }
        let declared = iter.require_open(DataType::FilterList)?.entry_container;
        let effective = self.effective_type(declared);
        if !self.action.has_payload() || effective == DataType::NoData {
            return Err(UsageError::PayloadNotAllowed.into());
        }
        let checkpoint = iter.position();
        if let Err(e) = self.write_prefix(iter) {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        open_entry(iter, DataType::FilterList, checkpoint, approx, Some(effective))
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        close_entry(iter, DataType::FilterList, commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{ElementEntry, ElementListInit, FieldEntry, FieldListInit};
    use crate::primitive::Primitive;
    use crate::types::WIRE_VERSION;

    #[test]
    fn per_entry_container_type_override() {
        let mut buf = vec![0u8; 512];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        let init = FilterListInit {
            container_type: DataType::FieldList,
            total_count_hint: Some(2),
            has_perm_entries: false,
        };
        init.encode_init(&mut it).unwrap();

        FilterEntry::new(FilterAction::Set, 1).encode_init(&mut it, 32).unwrap();
        FieldListInit::standard().encode_init(&mut it, None).unwrap();
        FieldEntry::new(4).encode(&mut it, &Primitive::UInt(4)).unwrap();
        FieldListInit::encode_complete(&mut it, true).unwrap();
        FilterEntry::encode_complete(&mut it, true).unwrap();

        let mut override_entry = FilterEntry::new(FilterAction::Update, 2);
        override_entry.container_type = Some(DataType::ElementList);
        override_entry.encode_init(&mut it, 32).unwrap();
        ElementListInit::standard().encode_init(&mut it, None).unwrap();
        ElementEntry::new(b"X").encode(&mut it, &Primitive::Int(1)).unwrap();
        ElementListInit::encode_complete(&mut it, true).unwrap();
        FilterEntry::encode_complete(&mut it, true).unwrap();

        FilterListInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();

        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let list = FilterList::decode(&mut rd).unwrap();
        assert_eq!(list.container_type, DataType::FieldList);
        assert_eq!(list.count(), 2);
        let mut nav = list.iter();
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!((e.id, e.container_type), (1, DataType::FieldList));
        assert!(matches!(e.load(), Payload::FieldList(_)));
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!((e.id, e.container_type), (2, DataType::ElementList));
        assert!(matches!(e.load(), Payload::ElementList(_)));
    }

    #[test]
    fn clear_entry_has_no_payload() {
        let mut buf = vec![0u8; 64];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        FilterListInit::new(DataType::FieldList).encode_init(&mut it).unwrap();
        FilterEntry::new(FilterAction::Clear, 7).encode(&mut it).unwrap();
        FilterListInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();
        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let list = FilterList::decode(&mut rd).unwrap();
        let e = list.iter().next_entry().unwrap().unwrap();
        assert_eq!(e.action, FilterAction::Clear);
        assert!(matches!(e.load(), Payload::NoData));
    }
}
