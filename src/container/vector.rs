//! Vectors: index-keyed entries with actions and optional sorting
//! support.

use crate::container::map::decode_local_sets;
use crate::container::{
    begin_entries, check_nested, close_entry, container_complete, load_payload, open_entry,
    read_entry_container_type, require_entries, summary_complete, summary_init, Payload,
};
use crate::error::{CodecError, CodecResult, UsageError};
use crate::iter::{DecodeContext, DecodeIterator, EncodeIterator, EncodeLevel, EncodeState};
use crate::set_def::{LocalElementSetDb, LocalFieldSetDb};
use crate::types::{DataType, VectorAction};

const HAS_SET_DEFS: u8 = 0x01;
const HAS_SUMMARY: u8 = 0x02;
const HAS_PERM_ENTRIES: u8 = 0x04;
const HAS_TOTAL_COUNT_HINT: u8 = 0x08;
const SUPPORTS_SORTING: u8 = 0x10;

const ENTRY_HAS_PERM: u8 = 0x01;

/// Largest encodable vector index (u30 range).
pub const MAX_VECTOR_INDEX: u32 = 0x3FFF_FFFF;

/// Decoded vector header over its undecoded entries.
#[derive(Debug, Clone)]
pub struct Vector<'a> {
    pub container_type: DataType,
    pub total_count_hint: Option<u32>,
    pub supports_sorting: bool,
    pub has_perm_entries: bool,
    summary_data: Option<&'a [u8]>,
    local_field_sets: Option<LocalFieldSetDb>,
    local_element_sets: Option<LocalElementSetDb>,
    entries_data: &'a [u8],
    count: u16,
    ctx: DecodeContext<'a>,
}

impl<'a> Vector<'a> {
    pub fn decode(iter: &mut DecodeIterator<'a>) -> CodecResult<Vector<'a>> {
        let ctx = iter.context();
        if iter.remaining() == 0 {
            return Ok(Vector::empty(ctx));
        }
        let flags = iter.read_u8()?;
        let container_type = read_entry_container_type(iter)?;
        let mut vector = Vector {
            container_type,
            supports_sorting: flags & SUPPORTS_SORTING != 0,
            has_perm_entries: flags & HAS_PERM_ENTRIES != 0,
            ..Vector::empty(ctx)
        };
        if flags & HAS_SET_DEFS != 0 {
            let raw = iter.read_buffer15()?;
            decode_local_sets(
                iter,
                raw,
                container_type,
                &mut vector.local_field_sets,
                &mut vector.local_element_sets,
            )?;
        }
        if flags & HAS_SUMMARY != 0 {
            vector.summary_data = Some(iter.read_buffer15()?);
        }
        if flags & HAS_TOTAL_COUNT_HINT != 0 {
            vector.total_count_hint = Some(iter.read_u30rb()?);
        }
        vector.count = iter.read_u16()?;
        vector.entries_data = iter.take_remaining();
        Ok(vector)
    }

    fn empty(ctx: DecodeContext<'a>) -> Self {
        Vector {
            container_type: DataType::NoData,
            total_count_hint: None,
            supports_sorting: false,
            has_perm_entries: false,
            summary_data: None,
            local_field_sets: None,
            local_element_sets: None,
            entries_data: b"",
            count: 0,
            ctx,
        }
    }

    pub fn count(&self) -> u16 {
        self.count
    }

    pub fn summary(&self) -> Option<Payload<'a>> {
        self.summary_data.map(|data| {
            load_payload(
                self.ctx,
                data,
                self.container_type,
                self.local_field_sets.as_ref(),
                self.local_element_sets.as_ref(),
            )
        })
    }

    pub fn iter(&self) -> VectorIter<'_, 'a> {
        VectorIter::new(self)
    }
}

/// Forward-only entry navigator over a decoded vector.
#[derive(Debug, Clone)]
pub struct VectorIter<'m, 'a> {
    vector: &'m Vector<'a>,
    cursor: DecodeIterator<'a>,
    remaining: u16,
    failed: bool,
}

impl<'m, 'a> VectorIter<'m, 'a> {
    fn new(vector: &'m Vector<'a>) -> Self {
        VectorIter {
            vector,
            cursor: DecodeIterator::with_context(vector.entries_data, vector.ctx),
            remaining: vector.count,
            failed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = VectorIter::new(self.vector);
    }

    pub fn next_entry(&mut self) -> Option<CodecResult<VectorEntryRef<'m, 'a>>> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let vector = self.vector;
        let cursor = &mut self.cursor;
        let mut step = || -> CodecResult<VectorEntryRef<'m, 'a>> {
            let lead = cursor.read_u8()?;
            let action = VectorAction::try_from(lead & 0x0F).map_err(|_| {
                CodecError::InvalidData {
                    reason: "invalid vector entry action",
                }
            })?;
            let entry_flags = lead >> 4;
            let index = cursor.read_u30rb()?;
            let perm_data = if vector.has_perm_entries && entry_flags & ENTRY_HAS_PERM != 0 {
                Some(cursor.read_buffer15()?)
            } else {
                None
            };
            let raw = if action.has_payload() && vector.container_type != DataType::NoData {
                cursor.read_buffer16()?
            } else {
                b"".as_slice()
            };
            Ok(VectorEntryRef {
                action,
                index,
                perm_data,
                raw,
                vector,
            })
        };
        let result = step();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// One vector entry.
#[derive(Debug, Clone, Copy)]
pub struct VectorEntryRef<'m, 'a> {
    pub action: VectorAction,
    pub index: u32,
    perm_data: Option<&'a [u8]>,
    raw: &'a [u8],
    vector: &'m Vector<'a>,
}

impl<'m, 'a> VectorEntryRef<'m, 'a> {
    pub fn perm_data(&self) -> Option<&'a [u8]> {
        self.perm_data
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn load(&self) -> Payload<'a> {
        if !self.action.has_payload() || self.vector.container_type == DataType::NoData {
            return Payload::NoData;
        }
        load_payload(
            self.vector.ctx,
            self.raw,
            self.vector.container_type,
            self.vector.local_field_sets.as_ref(),
            self.vector.local_element_sets.as_ref(),
        )
    }
}

/// Vector header for encoding.
#[derive(Debug, Clone, Copy)]
pub struct VectorInit {
    pub container_type: DataType,
    pub has_summary: bool,
    pub total_count_hint: Option<u32>,
    pub has_perm_entries: bool,
    pub supports_sorting: bool,
}

impl VectorInit {
    pub fn new(container_type: DataType) -> Self {
        VectorInit {
            container_type,
            has_summary: false,
            total_count_hint: None,
            has_perm_entries: false,
            supports_sorting: false,
        }
    }

    pub fn encode_init(
        &self,
        iter: &mut EncodeIterator<'_>,
        field_sets: Option<&LocalFieldSetDb>,
        element_sets: Option<&LocalElementSetDb>,
    ) -> CodecResult<()> {
        if !self.container_type.is_container() {
            return Err(UsageError::InvalidContainerType(self.container_type).into());
        }
        check_nested(iter, DataType::Vector)?;
        let start = iter.position();
        let mut level = EncodeLevel::new(DataType::Vector, start);
        level.entry_container = self.container_type;
        level.perm_entries = self.has_perm_entries;

        let has_set_defs = match self.container_type {
            DataType::FieldList => field_sets.is_some_and(|db| !db.is_empty()),
            DataType::ElementList => element_sets.is_some_and(|db| !db.is_empty()),
            _ => false,
        };

        let mut flags = 0u8;
        if has_set_defs {
            flags |= HAS_SET_DEFS;
        }
        if self.has_summary {
            flags |= HAS_SUMMARY;
        }
        if self.has_perm_entries {
            flags |= HAS_PERM_ENTRIES;
        }
        if self.total_count_hint.is_some() {
            flags |= HAS_TOTAL_COUNT_HINT;
        }
        if self.supports_sorting {
            flags |= SUPPORTS_SORTING;
        }
        iter.write_u8(flags)?;
        iter.write_u8(self.container_type.to_wire_container())?;
        if has_set_defs {
            let mark = iter.reserve_u15()?;
            match self.container_type {
                DataType::FieldList => field_sets.expect("checked").encode(iter)?,
                DataType::ElementList => element_sets.expect("checked").encode(iter)?,
                _ => unreachable!(),
            }
            iter.finish_u15(mark)?;
        }

        if self.has_summary {
            level.state = EncodeState::SummaryPending;
            level.pending_hint = self.total_count_hint;
            iter.push_level(level)
        } else {
            iter.push_level(level)?;
            begin_entries(iter, DataType::Vector, self.total_count_hint, false)
        }
    }

    pub fn encode_summary_init(iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        summary_init(iter, DataType::Vector)
    }

    pub fn encode_summary_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        summary_complete(iter, DataType::Vector, commit, false)
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        container_complete(iter, DataType::Vector, commit, false)
    }
}

/// One vector entry for encoding.
#[derive(Debug, Clone, Copy)]
pub struct VectorEntry<'k> {
    pub action: VectorAction,
    pub index: u32,
    pub perm_data: Option<&'k [u8]>,
}

impl<'k> VectorEntry<'k> {
    pub fn new(action: VectorAction, index: u32) -> Self {
        VectorEntry {
            action,
            index,
            perm_data: None,
        }
    }

    fn write_prefix(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        if self.index > MAX_VECTOR_INDEX {
            return Err(CodecError::InvalidData {
                reason: "vector index exceeds the 30-bit range",
            });
        }
        let perm_declared = iter.require_open(DataType::Vector)?.perm_entries;
        if self.perm_data.is_some() && !perm_declared {
            return Err(UsageError::PermDataNotDeclared.into());
        }
        let mut lead = self.action as u8;
        if self.perm_data.is_some() {
            lead |= ENTRY_HAS_PERM << 4;
        }
        iter.write_u8(lead)?;
        iter.write_u30rb(self.index)?;
        if let Some(perm) = self.perm_data {
            iter.write_buffer15(perm)?;
        }
        Ok(())
    }

    /// Encodes a payload-less entry (clear/delete, or `NoData` payloads).
    pub fn encode(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        require_entries(iter, DataType::Vector)?;
        let payload_less = !self.action.has_payload()
            || iter.require_open(DataType::Vector)?.entry_container == DataType::NoData;
        if !payload_less {
            return Err(UsageError::PayloadRequired.into());
        }
        let checkpoint = iter.position();
        if let Err(e) = self.write_prefix(iter) {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        iter.require_open(DataType::Vector)?.count += 1;
        Ok(())
    }

    pub fn encode_init(&self, iter: &mut EncodeIterator<'_>, approx: usize) -> CodecResult<()> {
        require_entries(iter, DataType::Vector)?;
        let container = iter.require_open(DataType::Vector)?.entry_container;
        if !self.action.has_payload() || container == DataType::NoData {
            return Err(UsageError::PayloadNotAllowed.into());
        }
        let checkpoint = iter.position();
        if let Err(e) = self.write_prefix(iter) {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        open_entry(iter, DataType::Vector, checkpoint, approx, Some(container))
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        close_entry(iter, DataType::Vector, commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{FieldEntry, FieldListInit};
    use crate::primitive::Primitive;
    use crate::types::WIRE_VERSION;

    #[test]
    fn indexed_entries_round_trip() {
        let mut buf = vec![0u8; 512];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        let init = VectorInit {
            container_type: DataType::FieldList,
            has_summary: false,
            total_count_hint: Some(3),
            has_perm_entries: true,
            supports_sorting: true,
        };
        init.encode_init(&mut it, None, None).unwrap();

        let mut entry = VectorEntry::new(VectorAction::Set, 70_000);
        entry.perm_data = Some(&[0xAA]);
        entry.encode_init(&mut it, 32).unwrap();
        FieldListInit::standard().encode_init(&mut it, None).unwrap();
        FieldEntry::new(2).encode(&mut it, &Primitive::UInt(5)).unwrap();
        FieldListInit::encode_complete(&mut it, true).unwrap();
        VectorEntry::encode_complete(&mut it, true).unwrap();

        VectorEntry::new(VectorAction::Delete, 3).encode(&mut it).unwrap();
        VectorInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();

        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let vector = Vector::decode(&mut rd).unwrap();
        assert!(vector.supports_sorting);
        assert_eq!(vector.count(), 2);
        let mut nav = vector.iter();
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!((e.action, e.index), (VectorAction::Set, 70_000));
        assert_eq!(e.perm_data(), Some([0xAA].as_slice()));
        assert!(matches!(e.load(), Payload::FieldList(_)));
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!((e.action, e.index), (VectorAction::Delete, 3));
        assert!(matches!(e.load(), Payload::NoData));
    }

    #[test]
    fn clear_entries_carry_no_payload() {
        let mut buf = vec![0u8; 128];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        VectorInit::new(DataType::FieldList)
            .encode_init(&mut it, None, None)
            .unwrap();
        VectorEntry::new(VectorAction::Clear, 9).encode(&mut it).unwrap();
        let err = VectorEntry::new(VectorAction::Clear, 9)
            .encode_init(&mut it, 8)
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::Usage(UsageError::PayloadNotAllowed)
        ));
        VectorInit::encode_complete(&mut it, true).unwrap();
    }
}
