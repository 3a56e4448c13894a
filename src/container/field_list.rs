//! Field lists: dictionary-keyed entries.
//!
//! A field entry carries only its field id on the wire; name, type and
//! enum displays come from the dictionary attached to the decode pass.
//! Set-defined slots drop even the id, taking key and type from the
//! referenced set definition in slot order.

use crate::container::{
    check_nested, close_entry, container_complete, load_payload, open_entry, require_entries,
    Payload,
};
use crate::dictionary::{EnumDisplay, FieldDef};
use crate::error::{CodecError, CodecResult, EntryError, UsageError};
use crate::iter::{
    DecodeContext, DecodeIterator, EncSetDef, EncodeIterator, EncodeLevel, EncodeState,
};
use crate::primitive::{Primitive, REAL_BLANK_MARKER};
use crate::set_def::{
    decode_set_value, encode_set_blank, encode_set_value, FieldSetDef, LocalFieldSetDb,
};
use crate::types::DataType;

const HAS_INFO: u8 = 0x01;
const HAS_SET_DATA: u8 = 0x02;
const HAS_SET_ID: u8 = 0x04;
const HAS_STANDARD_DATA: u8 = 0x08;

/// Cross-validation info: which dictionary and which field-list template
/// this list was built against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldListInfo {
    pub dictionary_id: u16,
    pub field_list_num: i16,
}

/// Decoded field-list header over its undecoded entries.
#[derive(Debug, Clone)]
pub struct FieldList<'a> {
    pub info: Option<FieldListInfo>,
    pub set_id: u16,
    set_def: Option<FieldSetDef>,
    set_data: &'a [u8],
    entries_data: &'a [u8],
    standard_count: u16,
    ctx: DecodeContext<'a>,
}

impl<'a> FieldList<'a> {
    /// Decodes the header; the cursor's whole extent is this container.
    /// `local_sets` is the set database decoded from the enclosing
    /// container, if any.
    pub fn decode(
        iter: &mut DecodeIterator<'a>,
        local_sets: Option<&LocalFieldSetDb>,
    ) -> CodecResult<FieldList<'a>> {
        let ctx = iter.context();
        if iter.remaining() == 0 {
            return Ok(FieldList::empty(ctx));
        }
        let flags = iter.read_u8()?;
        let mut list = FieldList::empty(ctx);

        if flags & HAS_INFO != 0 {
            let len = iter.read_u8()? as usize;
            let block = iter.read_bytes(len)?;
            let mut info = iter.subslice(block);
            list.info = Some(FieldListInfo {
                dictionary_id: info.read_u15rb()?,
                field_list_num: info.read_i16()?,
            });
        }

        if flags & HAS_SET_DATA != 0 {
            if flags & HAS_SET_ID != 0 {
                list.set_id = iter.read_u15rb()?;
            }
            let def = local_sets
                .and_then(|db| db.get(list.set_id))
                .or_else(|| ctx.field_sets.and_then(|db| db.get(list.set_id)))
                .cloned()
                .ok_or(CodecError::UnknownSetId(list.set_id))?;
            tracing::trace!(set_id = list.set_id, slots = def.entries.len(), "field list uses set definition");
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
        FieldList {
            info: None,
            set_id: 0,
            set_def: None,
            set_data: b"",
            entries_data: b"",
            standard_count: 0,
            ctx,
        }
    }

    /// Total declared entries, set slots included.
    pub fn count(&self) -> usize {
        self.set_def.as_ref().map_or(0, |d| d.entries.len()) + self.standard_count as usize
    }

    /// Fresh forward-only navigator; a later [`FieldListIter::reset`] or a
    /// second `iter()` reproduces the identical entry sequence.
    pub fn iter(&self) -> FieldListIter<'_, 'a> {
        FieldListIter::new(self)
    }
}

/// Forward-only entry navigator over a decoded field list.
#[derive(Debug, Clone)]
pub struct FieldListIter<'m, 'a> {
    list: &'m FieldList<'a>,
    set_cursor: DecodeIterator<'a>,
    set_slot: usize,
    std_cursor: DecodeIterator<'a>,
    std_remaining: u16,
    failed: bool,
}

impl<'m, 'a> FieldListIter<'m, 'a> {
    fn new(list: &'m FieldList<'a>) -> Self {
        FieldListIter {
            list,
            set_cursor: DecodeIterator::with_context(list.set_data, list.ctx),
            set_slot: 0,
            std_cursor: DecodeIterator::with_context(list.entries_data, list.ctx),
            std_remaining: list.standard_count,
            failed: false,
        }
    }

    /// Rewinds to the first entry.
    pub fn reset(&mut self) {
        *self = FieldListIter::new(self.list);
    }

    /// Advances to the next entry. Structural damage to entry framing
    /// fails once and fuses the navigator.
    pub fn next_entry(&mut self) -> Option<CodecResult<FieldEntryRef<'a>>> {
        if self.failed {
            return None;
        }
        let result = self.advance();
        if matches!(result, Some(Err(_))) {
            self.failed = true;
        }
        result
    }

    fn advance(&mut self) -> Option<CodecResult<FieldEntryRef<'a>>> {
        if let Some(def) = &self.list.set_def {
            if self.set_slot < def.entries.len() {
                let slot = def.entries[self.set_slot];
                self.set_slot += 1;
                let run = match capture_set_run(&mut self.set_cursor, slot.data_type) {
                    Ok(run) => run,
                    Err(e) => return Some(Err(e)),
                };
                return Some(Ok(FieldEntryRef {
                    field_id: slot.field_id,
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
        let field_id = match self.std_cursor.read_i16() {
            Ok(v) => v,
            Err(e) => return Some(Err(e)),
        };
        let raw = match self.std_cursor.read_buffer16() {
            Ok(run) => run,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(FieldEntryRef {
            field_id,
            set_type: None,
            raw,
            ctx: self.list.ctx,
        }))
    }
}

/// Sizes one set-lane value and returns its raw extent, payload decode
/// deferred.
pub(crate) fn capture_set_run<'a>(
    cursor: &mut DecodeIterator<'a>,
    ty: DataType,
) -> CodecResult<&'a [u8]> {
    let mark = cursor.position();
    match ty {
        DataType::Real4RB | DataType::Real8RB => {
            let scale = if ty == DataType::Real4RB { 1 } else { 2 };
            let lead = cursor.read_u8()?;
            let hint = lead & 0x3F;
            if lead != REAL_BLANK_MARKER && !(33..=35).contains(&hint) {
                let width = ((lead >> 6) as usize + 1) * scale;
                cursor.read_bytes(width)?;
            }
        }
        t => {
            if let Some(width) = t.fixed_width() {
                cursor.read_bytes(width)?;
            } else {
                let len = cursor.read_u16ob()? as usize;
                cursor.read_bytes(len)?;
            }
        }
    }
    Ok(cursor.span_since(mark))
}

/// One field entry, payload undecoded until [`FieldEntryRef::load`].
#[derive(Debug, Clone, Copy)]
pub struct FieldEntryRef<'a> {
    pub field_id: i16,
    /// Set-definition slot type when this entry came from the set lane.
    set_type: Option<DataType>,
    raw: &'a [u8],
    ctx: DecodeContext<'a>,
}

impl<'a> FieldEntryRef<'a> {
    /// Raw payload bytes.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// Dictionary record for this field, if resolvable.
    pub fn definition(&self) -> Option<&'a FieldDef> {
        self.ctx.dictionary.and_then(|d| d.entry(self.field_id))
    }

    /// Resolved field name.
    pub fn name(&self) -> Option<&'a str> {
        self.definition().map(|d| d.name.as_str())
    }

    /// The type this entry decodes through: the set slot's base type, or
    /// the dictionary's declared type.
    pub fn data_type(&self) -> DataType {
        match self.set_type {
            Some(ty) => ty.base_type(),
            None => self
                .definition()
                .map_or(DataType::Unknown, |d| d.wire_type),
        }
    }

    /// Decodes the payload. Unknown ids, dictionary/wire disagreements and
    /// corrupt nested payloads come back as [`Payload::Error`].
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
        let Some(dict) = self.ctx.dictionary else {
            return Payload::Error(EntryError::NoDictionary);
        };
        let Some(def) = dict.entry(self.field_id) else {
            return Payload::Error(EntryError::FieldIdNotFound(self.field_id));
        };
        load_payload(self.ctx, self.raw, def.wire_type, None, None)
    }

    /// Walks the ripple chain `hops` links from this field.
    pub fn ripple(&self, hops: usize) -> Option<&'a FieldDef> {
        self.ctx.dictionary.and_then(|d| d.ripple(self.field_id, hops))
    }

    /// Display string for an enumerated payload. Blank payloads yield
    /// `Blank`, unmapped codes `NotFound`; the two never alias.
    pub fn enum_display(&self) -> EnumDisplay<'a> {
        let Some(dict) = self.ctx.dictionary else {
            return EnumDisplay::NotFound;
        };
        match self.load() {
            Payload::Blank => EnumDisplay::Blank,
            Payload::Primitive(Primitive::Enum(code)) => dict.enum_display(self.field_id, code),
            _ => EnumDisplay::NotFound,
        }
    }
}

/// Field-list header for encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldListInit {
    pub info: Option<FieldListInfo>,
    /// Present when entries lead with set-defined slots.
    pub set_id: Option<u16>,
    pub has_standard_data: bool,
}

impl FieldListInit {
    pub fn standard() -> Self {
        FieldListInit {
            has_standard_data: true,
            ..FieldListInit::default()
        }
    }

    /// Opens a field list on the iterator. With `set_id`, the definition
    /// must resolve in `set_db` and the first entries must fill its slots
    /// in order.
    pub fn encode_init(
        &self,
        iter: &mut EncodeIterator<'_>,
        set_db: Option<&LocalFieldSetDb>,
    ) -> CodecResult<()> {
        check_nested(iter, DataType::FieldList)?;
        let start = iter.position();
        let mut level = EncodeLevel::new(DataType::FieldList, start);
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
        if self.info.is_some() {
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

        if let Some(info) = &self.info {
            let id_len: u8 = if info.dictionary_id < 0x80 { 1 } else { 2 };
            iter.write_u8(id_len + 2)?;
            iter.write_u15rb(info.dictionary_id)?;
            iter.write_i16(info.field_list_num)?;
        }

        if let Some(def) = set_def {
            if self.set_id != Some(0) {
                iter.write_u15rb(def.set_id)?;
            }
            if def.entries.is_empty() {
                // Degenerate definition: the set portion is empty.
                if self.has_standard_data {
                    let mark = iter.reserve_u15()?;
                    iter.finish_u15(mark)?;
                    level.count_pos = Some(iter.reserve_u16_scalar()?);
                }
            } else {
                if self.has_standard_data {
                    level.set_mark = Some(iter.reserve_u15()?);
                }
                level.set_def = Some(EncSetDef::Field(
                    def.entries
                        .iter()
                        .map(|e| (e.field_id, e.data_type))
                        .collect(),
                ));
                level.state = EncodeState::SetData;
            }
        } else if self.has_standard_data {
            level.count_pos = Some(iter.reserve_u16_scalar()?);
        }
        iter.push_level(level)
    }

    /// Completes the field list; `commit: false` rewinds to its start.
    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        container_complete(iter, DataType::FieldList, commit, false)
    }
}

/// One field entry for encoding.
#[derive(Debug, Clone, Copy)]
pub struct FieldEntry {
    pub field_id: i16,
}

impl FieldEntry {
    pub fn new(field_id: i16) -> Self {
        FieldEntry { field_id }
    }

    /// Encodes a primitive payload in one call, in whichever lane the
    /// container is currently filling.
    pub fn encode(&self, iter: &mut EncodeIterator<'_>, value: &Primitive<'_>) -> CodecResult<()> {
        let checkpoint = iter.position();
        let result = self.encode_value(iter, Some(value));
        if result.is_err() {
            iter.rollback_to(checkpoint);
        }
        result
    }

    /// Encodes the blank form for this field.
    pub fn encode_blank(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        let checkpoint = iter.position();
        let result = self.encode_value(iter, None);
        if result.is_err() {
            iter.rollback_to(checkpoint);
        }
        result
    }

    fn encode_value(
        &self,
        iter: &mut EncodeIterator<'_>,
        value: Option<&Primitive<'_>>,
    ) -> CodecResult<()> {
        let state = iter.require_open(DataType::FieldList)?.state;
        if state == EncodeState::SetData {
            return self.encode_set_slot(iter, value);
        }
        require_entries(iter, DataType::FieldList)?;
        iter.write_i16(self.field_id)?;
        match value {
            Some(v) => {
                iter.write_u16ob(v.wire_len() as u16)?;
                v.encode_body(iter)?;
            }
            None => iter.write_u16ob(0)?,
        }
        iter.require_open(DataType::FieldList)?.count += 1;
        Ok(())
    }

    fn encode_set_slot(
        &self,
        iter: &mut EncodeIterator<'_>,
        value: Option<&Primitive<'_>>,
    ) -> CodecResult<()> {
        let (slot_id, slot_ty, slot, total) = {
            let level = iter.require_open(DataType::FieldList)?;
            let Some(EncSetDef::Field(slots)) = &level.set_def else {
                return Err(UsageError::NoOpenContainer.into());
            };
            let (id, ty) = slots[level.set_slot];
            (id, ty, level.set_slot, slots.len())
        };
        if slot_id != self.field_id {
            return Err(UsageError::SetSlotMismatch {
                slot,
                expected: slot_id,
                got: self.field_id,
            }
            .into());
        }
        match value {
            Some(v) => encode_set_value(iter, slot_ty, v)?,
            None => encode_set_blank(iter, slot_ty)?,
        }
        let set_mark = {
            let level = iter.require_open(DataType::FieldList)?;
            level.set_slot += 1;
            level.count += 1;
            if level.set_slot == total {
                level.state = EncodeState::Entries;
                level.set_mark.take()
            } else {
                None
            }
        };
        // Last slot filled: close the set-data portion and open the
        // standard section when one was declared.
        if let Some(mark) = set_mark {
            iter.finish_u15(mark)?;
            let pos = iter.reserve_u16_scalar()?;
            iter.require_open(DataType::FieldList)?.count_pos = Some(pos);
        }
        Ok(())
    }

    /// Opens this entry for a nested payload; pair with
    /// [`FieldEntry::encode_complete`].
    pub fn encode_init(&self, iter: &mut EncodeIterator<'_>, approx: usize) -> CodecResult<()> {
        require_entries(iter, DataType::FieldList)?;
        let checkpoint = iter.position();
        if let Err(e) = iter.write_i16(self.field_id) {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
        open_entry(iter, DataType::FieldList, checkpoint, approx, None)
    }

    /// Completes the open entry; `commit: false` discards every byte the
    /// entry wrote, nested containers included.
    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        close_entry(iter, DataType::FieldList, commit)
    }
}
