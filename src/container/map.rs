//! Maps: entries keyed by an arbitrary primitive, with actions and
//! optional per-entry permission data.

use crate::container::{
    begin_entries, check_nested, close_entry, container_complete, fmt_perm, load_payload,
    open_entry, primitive_entry_error, read_entry_container_type, require_entries, summary_complete,
    summary_init, Payload,
};
use crate::error::{CodecResult, EntryError, UsageError};
use crate::iter::{DecodeContext, DecodeIterator, EncodeIterator, EncodeLevel, EncodeState};
use crate::primitive::{decode_body, Primitive};
use crate::set_def::{LocalElementSetDb, LocalFieldSetDb};
use crate::types::{DataType, MapAction};

const HAS_SET_DEFS: u8 = 0x01;
const HAS_SUMMARY: u8 = 0x02;
const HAS_PERM_ENTRIES: u8 = 0x04;
const HAS_TOTAL_COUNT_HINT: u8 = 0x08;
const HAS_KEY_FIELD_ID: u8 = 0x10;

const ENTRY_HAS_PERM: u8 = 0x01;

/// Decoded map header over its undecoded entries.
#[derive(Debug, Clone)]
pub struct Map<'a> {
    pub key_type: DataType,
    pub container_type: DataType,
    /// Field id the keys correspond to, for dictionary cross-reference.
    pub key_field_id: Option<i16>,
    pub total_count_hint: Option<u32>,
    pub has_perm_entries: bool,
    summary_data: Option<&'a [u8]>,
    pub(crate) local_field_sets: Option<LocalFieldSetDb>,
    pub(crate) local_element_sets: Option<LocalElementSetDb>,
    entries_data: &'a [u8],
    count: u16,
    ctx: DecodeContext<'a>,
}

impl<'a> Map<'a> {
    pub fn decode(iter: &mut DecodeIterator<'a>) -> CodecResult<Map<'a>> {
        let ctx = iter.context();
        if iter.remaining() == 0 {
            return Ok(Map::empty(ctx));
        }
        let flags = iter.read_u8()?;
        let raw_key = iter.read_u8()?;
        let key_type = DataType::try_from(raw_key)
            .ok()
            .filter(|t| t.is_primitive() && !t.is_set_variant())
            .ok_or(crate::error::CodecError::UnknownType(raw_key))?;
        let container_type = read_entry_container_type(iter)?;

        let mut map = Map {
            key_type,
            container_type,
            ..Map::empty(ctx)
        };
        if flags & HAS_KEY_FIELD_ID != 0 {
            map.key_field_id = Some(iter.read_i16()?);
        }
        if flags & HAS_SET_DEFS != 0 {
            let raw = iter.read_buffer15()?;
            decode_local_sets(
                iter,
                raw,
                container_type,
                &mut map.local_field_sets,
                &mut map.local_element_sets,
            )?;
        }
        if flags & HAS_SUMMARY != 0 {
            map.summary_data = Some(iter.read_buffer15()?);
        }
        if flags & HAS_TOTAL_COUNT_HINT != 0 {
            map.total_count_hint = Some(iter.read_u30rb()?);
        }
        map.has_perm_entries = flags & HAS_PERM_ENTRIES != 0;
        map.count = iter.read_u16()?;
        map.entries_data = iter.take_remaining();
        Ok(map)
    }

    fn empty(ctx: DecodeContext<'a>) -> Self {
        Map {
            key_type: DataType::Unknown,
            container_type: DataType::NoData,
            key_field_id: None,
            total_count_hint: None,
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

    /// Decodes the summary payload, when the header carries one.
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

    pub fn iter(&self) -> MapIter<'_, 'a> {
        MapIter::new(self)
    }
}

/// Decodes a header's set-defs blob under the entry container type that
/// will consume it.
pub(crate) fn decode_local_sets<'a>(
    iter: &DecodeIterator<'a>,
    raw: &'a [u8],
    container_type: DataType,
    field_out: &mut Option<LocalFieldSetDb>,
    element_out: &mut Option<LocalElementSetDb>,
) -> CodecResult<()> {
    match container_type {
        DataType::FieldList => {
            let mut sub = iter.subslice(raw);
            *field_out = Some(LocalFieldSetDb::decode(&mut sub)?);
        }
        DataType::ElementList => {
            let mut sub = iter.subslice(raw);
            *element_out = Some(LocalElementSetDb::decode(&mut sub)?);
        }
        // Set definitions only drive field/element payloads; anything else
        // keeps the blob unused.
        _ => {}
    }
    Ok(())
}

/// Forward-only entry navigator over a decoded map.
#[derive(Debug, Clone)]
pub struct MapIter<'m, 'a> {
    map: &'m Map<'a>,
    cursor: DecodeIterator<'a>,
    remaining: u16,
    failed: bool,
}

impl<'m, 'a> MapIter<'m, 'a> {
    fn new(map: &'m Map<'a>) -> Self {
        MapIter {
            map,
            cursor: DecodeIterator::with_context(map.entries_data, map.ctx),
            remaining: map.count,
            failed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = MapIter::new(self.map);
    }

    pub fn next_entry(&mut self) -> Option<CodecResult<MapEntryRef<'m, 'a>>> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let map = self.map;
        let cursor = &mut self.cursor;
        let mut step = || -> CodecResult<MapEntryRef<'m, 'a>> {
            let lead = cursor.read_u8()?;
            let action = MapAction::try_from(lead & 0x0F)
                .map_err(|_| crate::error::CodecError::InvalidData {
                    reason: "invalid map entry action",
                })?;
            let entry_flags = lead >> 4;
            let perm_data = if map.has_perm_entries && entry_flags & ENTRY_HAS_PERM != 0 {
                Some(cursor.read_buffer15()?)
            } else {
                None
            };
            let key_raw = cursor.read_buffer15()?;
            let raw = if action.has_payload() && map.container_type != DataType::NoData {
                cursor.read_buffer16()?
            } else {
                b"".as_slice()
            };
            Ok(MapEntryRef {
                action,
                perm_data,
                key_raw,
                raw,
                map,
            })
        };
        let result = step();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

/// One map entry, key and payload undecoded until asked for.
#[derive(Debug, Clone, Copy)]
pub struct MapEntryRef<'m, 'a> {
    pub action: MapAction,
    perm_data: Option<&'a [u8]>,
    key_raw: &'a [u8],
    raw: &'a [u8],
    map: &'m Map<'a>,
}

impl<'m, 'a> MapEntryRef<'m, 'a> {
    /// Decodes the entry key as the map's declared key type.
    pub fn key(&self) -> Result<Option<Primitive<'a>>, EntryError> {
        decode_body(self.key_raw, self.map.key_type)
            .map_err(|e| primitive_entry_error(self.map.key_type, self.key_raw.len(), e))
    }

    pub fn perm_data(&self) -> Option<&'a [u8]> {
        self.perm_data
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Decodes the payload; delete entries and `NoData` payload types
    /// yield [`Payload::NoData`].
    pub fn load(&self) -> Payload<'a> {
        if !self.action.has_payload() || self.map.container_type == DataType::NoData {
            return Payload::NoData;
        }
        if let Some(perm) = self.perm_data {
            tracing::trace!(perm = %fmt_perm(perm), "loading permissioned map entry");
        }
        load_payload(
            self.map.ctx,
            self.raw,
            self.map.container_type,
            self.map.local_field_sets.as_ref(),
            self.map.local_element_sets.as_ref(),
        )
    }
}

/// Map header for encoding.
#[derive(Debug, Clone, Copy)]
pub struct MapInit {
    pub key_type: DataType,
    pub container_type: DataType,
    pub key_field_id: Option<i16>,
    /// Summary data must then be encoded via
    /// [`MapInit::encode_summary_init`] before any entry.
    pub has_summary: bool,
    pub total_count_hint: Option<u32>,
    pub has_perm_entries: bool,
}

impl MapInit {
    pub fn new(key_type: DataType, container_type: DataType) -> Self {
        MapInit {
            key_type,
            container_type,
            key_field_id: None,
            has_summary: false,
            total_count_hint: None,
            has_perm_entries: false,
        }
    }

    pub fn encode_init(
        &self,
        iter: &mut EncodeIterator<'_>,
        field_sets: Option<&LocalFieldSetDb>,
        element_sets: Option<&LocalElementSetDb>,
    ) -> CodecResult<()> {
        if !self.key_type.is_primitive() || self.key_type.is_set_variant() {
            return Err(UsageError::InvalidContainerType(self.key_type).into());
        }
        if !self.container_type.is_container() {
            return Err(UsageError::InvalidContainerType(self.container_type).into());
        }
        check_nested(iter, DataType::Map)?;
        let start = iter.position();
        let mut level = EncodeLevel::new(DataType::Map, start);
        level.entry_container = self.container_type;
        level.key_type = Some(self.key_type);
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
        if self.key_field_id.is_some() {
            flags |= HAS_KEY_FIELD_ID;
        }
        iter.write_u8(flags)?;
        iter.write_u8(self.key_type as u8)?;
        iter.write_u8(self.container_type.to_wire_container())?;
        if let Some(fid) = self.key_field_id {
            iter.write_i16(fid)?;
        }
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
            begin_entries(iter, DataType::Map, self.total_count_hint, false)
        }
    }

    pub fn encode_summary_init(iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        summary_init(iter, DataType::Map)
    }

    pub fn encode_summary_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        summary_complete(iter, DataType::Map, commit, false)
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        container_complete(iter, DataType::Map, commit, false)
    }
}

/// One map entry for encoding.
#[derive(Debug, Clone, Copy)]
pub struct MapEntry<'k> {
    pub action: MapAction,
    pub key: Primitive<'k>,
    pub perm_data: Option<&'k [u8]>,
}

impl<'k> MapEntry<'k> {
    pub fn new(action: MapAction, key: Primitive<'k>) -> Self {
        MapEntry {
            action,
            key,
            perm_data: None,
        }
    }

    fn write_prefix(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        let (key_type, perm_declared) = {
            let level = iter.require_open(DataType::Map)?;
            (level.key_type.expect("map level has key type"), level.perm_entries)
        };
        if self.key.data_type() != key_type {
            return Err(UsageError::PrimitiveTypeMismatch {
                declared: key_type,
                supplied: self.key.data_type(),
            }
            .into());
        }
        if self.perm_data.is_some() && !perm_declared {
            return Err(UsageError::PermDataNotDeclared.into());
        }
        let mut lead = self.action as u8;
        if self.perm_data.is_some() {
            lead |= ENTRY_HAS_PERM << 4;
        }
        iter.write_u8(lead)?;
        if let Some(perm) = self.perm_data {
            iter.write_buffer15(perm)?;
        }
        iter.write_u15rb(self.key.wire_len() as u16)?;
        self.key.encode_body(iter)
    }

    /// Encodes a payload-less entry (delete action, or a `NoData`
    /// container type).
    pub fn encode(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        require_entries(iter, DataType::Map)?;
        let payload_less = !self.action.has_payload()
            || iter.require_open(DataType::Map)?.entry_container == DataType::NoData;
        if !payload_less {
            return Err(UsageError::PayloadRequired.into());
        }
        let checkpoint = iter.position();
        if let Err(e) = self.write_prefix(iter) {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        iter.require_open(DataType::Map)?.count += 1;
        Ok(())
    }

    /// Opens this entry for its nested payload.
    pub fn encode_init(&self, iter: &mut EncodeIterator<'_>, approx: usize) -> CodecResult<()> {
        require_entries(iter, DataType::Map)?;
        let container = iter.require_open(DataType::Map)?.entry_container;
        if !self.action.has_payload() || container == DataType::NoData {
            return Err(UsageError::PayloadNotAllowed.into());
        }
        let checkpoint = iter.position();
        if let Err(e) = self.write_prefix(iter) {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        open_entry(iter, DataType::Map, checkpoint, approx, Some(container))
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        close_entry(iter, DataType::Map, commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{FieldEntry, FieldListInit};
    use crate::types::WIRE_VERSION;

    fn nested_map_bytes() -> Vec<u8> {
        let mut buf = vec![0u8; 512];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        let init = MapInit {
            key_type: DataType::AsciiString,
            container_type: DataType::FieldList,
            key_field_id: Some(1),
            has_summary: false,
            total_count_hint: Some(2),
            has_perm_entries: true,
        };
        init.encode_init(&mut it, None, None).unwrap();

        let mut entry = MapEntry::new(MapAction::Add, Primitive::Ascii(b"EUR="));
        entry.perm_data = Some(&[0x03, 0x01]);
        entry.encode_init(&mut it, 64).unwrap();
        FieldListInit::standard().encode_init(&mut it, None).unwrap();
        FieldEntry::new(22).encode(&mut it, &Primitive::Int(995)).unwrap();
        FieldListInit::encode_complete(&mut it, true).unwrap();
        MapEntry::encode_complete(&mut it, true).unwrap();

        let delete = MapEntry::new(MapAction::Delete, Primitive::Ascii(b"GBP="));
        delete.encode(&mut it).unwrap();

        MapInit::encode_complete(&mut it, true).unwrap();
        it.encoded().to_vec()
    }

    #[test]
    fn nested_map_round_trips() {
        let bytes = nested_map_bytes();
        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let map = Map::decode(&mut rd).unwrap();
        assert_eq!(map.key_type, DataType::AsciiString);
        assert_eq!(map.container_type, DataType::FieldList);
        assert_eq!(map.key_field_id, Some(1));
        assert_eq!(map.total_count_hint, Some(2));
        assert_eq!(map.count(), 2);

        let mut nav = map.iter();
        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!(e.action, MapAction::Add);
        assert_eq!(e.perm_data(), Some([0x03, 0x01].as_slice()));
        assert!(matches!(e.key(), Ok(Some(Primitive::Ascii(b"EUR=")))));
        let Payload::FieldList(inner) = e.load() else {
            panic!("expected a field list payload");
        };
        let first = inner.iter().next_entry().unwrap().unwrap();
        assert_eq!(first.field_id, 22);

        let e = nav.next_entry().unwrap().unwrap();
        assert_eq!(e.action, MapAction::Delete);
        assert!(matches!(e.load(), Payload::NoData));
        assert!(nav.next_entry().is_none());
    }

    #[test]
    fn summary_data_round_trips() {
        let mut buf = vec![0u8; 256];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        let init = MapInit {
            key_type: DataType::UInt,
            container_type: DataType::FieldList,
            key_field_id: None,
            has_summary: true,
            total_count_hint: None,
            has_perm_entries: false,
        };
        init.encode_init(&mut it, None, None).unwrap();
        MapInit::encode_summary_init(&mut it).unwrap();
        FieldListInit::standard().encode_init(&mut it, None).unwrap();
        FieldEntry::new(3).encode(&mut it, &Primitive::UInt(7)).unwrap();
        FieldListInit::encode_complete(&mut it, true).unwrap();
        MapInit::encode_summary_complete(&mut it, true).unwrap();
        MapEntry::new(MapAction::Add, Primitive::UInt(1))
            .encode_init(&mut it, 16)
            .unwrap();
        FieldListInit::standard().encode_init(&mut it, None).unwrap();
        FieldListInit::encode_complete(&mut it, true).unwrap();
        MapEntry::encode_complete(&mut it, true).unwrap();
        MapInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();

        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let map = Map::decode(&mut rd).unwrap();
        let Some(Payload::FieldList(summary)) = map.summary() else {
            panic!("expected field-list summary");
        };
        assert_eq!(summary.iter().next_entry().unwrap().unwrap().field_id, 3);
        assert_eq!(map.count(), 1);
    }

    #[test]
    fn entry_before_summary_is_a_usage_error() {
        let mut buf = vec![0u8; 128];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        MapInit {
            key_type: DataType::UInt,
            container_type: DataType::FieldList,
            key_field_id: None,
            has_summary: true,
            total_count_hint: None,
            has_perm_entries: false,
        }
        .encode_init(&mut it, None, None)
        .unwrap();
        let err = MapEntry::new(MapAction::Add, Primitive::UInt(1))
            .encode_init(&mut it, 8)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::CodecError::Usage(UsageError::SummaryPending)
        ));
    }

    #[test]
    fn rollback_discards_nested_bytes_exactly() {
        let mut buf = vec![0u8; 256];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        MapInit::new(DataType::UInt, DataType::FieldList)
            .encode_init(&mut it, None, None)
            .unwrap();
        MapEntry::new(MapAction::Add, Primitive::UInt(1))
            .encode_init(&mut it, 32)
            .unwrap();
        FieldListInit::standard().encode_init(&mut it, None).unwrap();
        FieldEntry::new(9).encode(&mut it, &Primitive::UInt(9)).unwrap();
        FieldListInit::encode_complete(&mut it, false).unwrap();
        MapEntry::encode_complete(&mut it, false).unwrap();
        MapEntry::new(MapAction::Add, Primitive::UInt(2))
            .encode_init(&mut it, 32)
            .unwrap();
        FieldListInit::standard().encode_init(&mut it, None).unwrap();
        FieldEntry::new(10).encode(&mut it, &Primitive::UInt(10)).unwrap();
        FieldListInit::encode_complete(&mut it, true).unwrap();
        MapEntry::encode_complete(&mut it, true).unwrap();
        MapInit::encode_complete(&mut it, true).unwrap();
        let bytes = it.encoded().to_vec();

        let mut rd = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let map = Map::decode(&mut rd).unwrap();
        assert_eq!(map.count(), 1);
        let mut nav = map.iter();
        let e = nav.next_entry().unwrap().unwrap();
        assert!(matches!(e.key(), Ok(Some(Primitive::UInt(2)))));
        let Payload::FieldList(inner) = e.load() else {
            panic!("expected field list");
        };
        assert_eq!(inner.iter().next_entry().unwrap().unwrap().field_id, 10);
    }

    #[test]
    fn undeclared_perm_data_rejected() {
        let mut buf = vec![0u8; 128];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        MapInit::new(DataType::UInt, DataType::NoData)
            .encode_init(&mut it, None, None)
            .unwrap();
        let mut entry = MapEntry::new(MapAction::Add, Primitive::UInt(1));
        entry.perm_data = Some(&[1]);
        let err = entry.encode(&mut it).unwrap_err();
        assert!(matches!(
            err,
            crate::CodecError::Usage(UsageError::PermDataNotDeclared)
        ));
    }
}
