//! # Container codec - recursive entry engine
//!
//! ## Purpose
//!
//! One generic engine behind the six container kinds: every container is a
//! header plus a run of entries, every entry payload is either a primitive
//! body, a nested container, or nothing. The kinds differ only in what a
//! key is (field id, name, typed key, position, filter id), which header
//! portions are legal, and which per-entry extras (actions, permission
//! data, container-type overrides) exist.
//!
//! ## Integration points
//!
//! - **Input**: a [`DecodeIterator`](crate::DecodeIterator) bounded to one
//!   container's bytes, or an [`EncodeIterator`](crate::EncodeIterator)
//!   with an open level per container being built.
//! - **Output**: decoded header structs over borrowed entry bytes, walked
//!   by forward-only navigators; every entry resolves lazily to a
//!   [`Payload`].
//! - **Dictionary**: field-keyed entries resolve names, types and enum
//!   displays through the pass's attached dictionary.
//! - **Containment**: nested payloads decode through byte-bounded
//!   sub-cursors, so corruption inside one entry stays inside it.
//!
//! ## Error posture
//!
//! Per-entry conditions (unknown field id, type/length disagreement,
//! corrupt nested payload) surface as [`Payload::Error`] and iteration
//! continues; structural damage to the container itself (truncated entry
//! framing, bad type tags) aborts that container's navigator only.

mod element_list;
mod field_list;
mod filter_list;
mod map;
mod series;
mod vector;

pub use element_list::{ElementEntry, ElementEntryRef, ElementList, ElementListInit, ElementListIter};
pub use field_list::{
    FieldEntry, FieldEntryRef, FieldList, FieldListInfo, FieldListInit, FieldListIter,
};
pub use filter_list::{FilterEntry, FilterEntryRef, FilterList, FilterListInit, FilterListIter};
pub use map::{Map, MapEntry, MapEntryRef, MapInit, MapIter};
pub use series::{Series, SeriesEntry, SeriesEntryRef, SeriesInit, SeriesIter};
pub use vector::{Vector, VectorEntry, VectorEntryRef, VectorInit, VectorIter};

use crate::error::{CodecResult, EntryError};
use crate::iter::{DecodeContext, DecodeIterator, EncodeIterator};
use crate::primitive::{decode_body, Array, Primitive, PrimitiveError};
use crate::set_def::{LocalElementSetDb, LocalFieldSetDb};
use crate::types::DataType;

/// What one entry carries once resolved.
///
/// Exhaustive matching replaces the "get the load as X" accessor pattern:
/// asking for the wrong kind is a `match` arm, not a runtime surprise.
#[derive(Debug, Clone)]
pub enum Payload<'a> {
    Primitive(Primitive<'a>),
    Array(Array<'a>),
    FieldList(FieldList<'a>),
    ElementList(ElementList<'a>),
    Map(Map<'a>),
    Series(Series<'a>),
    Vector(Vector<'a>),
    FilterList(FilterList<'a>),
    /// Message envelope carried opaquely; message-class semantics live
    /// above the codec.
    Msg(&'a [u8]),
    NoData,
    /// The type's designated no-value encoding. Not an error.
    Blank,
    /// Per-entry recoverable condition; the rest of the container stays
    /// iterable.
    Error(EntryError),
}

impl Payload<'_> {
    pub fn is_blank(&self) -> bool {
        matches!(self, Payload::Blank)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Payload::Error(_))
    }
}

/// Checks an entry-payload container type declared in a header.
pub(crate) fn read_entry_container_type(iter: &mut DecodeIterator<'_>) -> CodecResult<DataType> {
    let raw = iter.read_u8()?;
    DataType::from_wire_container(raw)
}

/// Resolves one entry's payload bytes against a declared type.
///
/// Primitive decode problems and nested-container failures are per-entry:
/// they come back as [`Payload::Error`], never as a hard failure.
pub(crate) fn load_payload<'a>(
    ctx: DecodeContext<'a>,
    data: &'a [u8],
    ty: DataType,
    field_sets: Option<&LocalFieldSetDb>,
    element_sets: Option<&LocalElementSetDb>,
) -> Payload<'a> {
    match ty {
        DataType::NoData => Payload::NoData,
        DataType::Msg => Payload::Msg(data),
        DataType::FieldList => {
            let mut sub = DecodeIterator::with_context(data, ctx);
            nest(FieldList::decode(&mut sub, field_sets), Payload::FieldList)
        }
        DataType::ElementList => {
            let mut sub = DecodeIterator::with_context(data, ctx);
            nest(
                ElementList::decode(&mut sub, element_sets),
                Payload::ElementList,
            )
        }
        DataType::Map => {
            let mut sub = DecodeIterator::with_context(data, ctx);
            nest(Map::decode(&mut sub), Payload::Map)
        }
        DataType::Series => {
            let mut sub = DecodeIterator::with_context(data, ctx);
            nest(Series::decode(&mut sub), Payload::Series)
        }
        DataType::Vector => {
            let mut sub = DecodeIterator::with_context(data, ctx);
            nest(Vector::decode(&mut sub), Payload::Vector)
        }
        DataType::FilterList => {
            let mut sub = DecodeIterator::with_context(data, ctx);
            nest(FilterList::decode(&mut sub), Payload::FilterList)
        }
        DataType::Array => {
            if data.is_empty() {
                return Payload::Blank;
            }
            let mut sub = DecodeIterator::with_context(data, ctx);
            nest(Array::decode(&mut sub), Payload::Array)
        }
        primitive => match decode_body(data, primitive) {
            Ok(Some(p)) => Payload::Primitive(p),
            Ok(None) => Payload::Blank,
            Err(e) => Payload::Error(primitive_entry_error(primitive, data.len(), e)),
        },
    }
}

fn nest<'a, T>(result: CodecResult<T>, wrap: impl FnOnce(T) -> Payload<'a>) -> Payload<'a> {
    match result {
        Ok(v) => wrap(v),
        Err(e) => {
            tracing::warn!(error = %e, "nested payload failed to decode");
            Payload::Error(EntryError::NestedDecode(e))
        }
    }
}

pub(crate) fn primitive_entry_error(
    expected: DataType,
    actual: usize,
    e: PrimitiveError,
) -> EntryError {
    match e {
        PrimitiveError::TooLong => EntryError::ValueTooLong { expected, actual },
        PrimitiveError::TooShort => EntryError::ValueTooShort { expected, actual },
        PrimitiveError::Malformed(reason) => EntryError::Malformed { expected, reason },
    }
}

/// Hex-formatted permission blob for diagnostics.
pub(crate) fn fmt_perm(perm: &[u8]) -> String {
    hex::encode(perm)
}

// ---- shared encode-side machinery ----------------------------------------

use crate::error::UsageError;
use crate::iter::EncodeState;

/// Validates that a container being initialized matches what the parent's
/// open entry (or summary) declared.
pub(crate) fn check_nested(iter: &mut EncodeIterator<'_>, ty: DataType) -> CodecResult<()> {
    if let Some(parent) = iter.parent_level() {
        if parent.state != EncodeState::EntryOpen && parent.state != EncodeState::SummaryOpen {
            return Err(UsageError::NoOpenEntry.into());
        }
        if let Some(expected) = parent.expected_child {
            if expected != ty {
                return Err(UsageError::EntryTypeMismatch {
                    declared: expected,
                    found: ty,
                }
                .into());
            }
        }
    }
    Ok(())
}

/// The open level must accept a standard entry right now.
pub(crate) fn require_entries(iter: &mut EncodeIterator<'_>, container: DataType) -> CodecResult<()> {
    let level = iter.require_open(container)?;
    match level.state {
        EncodeState::Entries => {
            if level.has_standard {
                Ok(())
            } else {
                Err(UsageError::StandardDataNotDeclared.into())
            }
        }
        EncodeState::SummaryPending => Err(UsageError::SummaryPending.into()),
        EncodeState::EntryOpen | EncodeState::SummaryOpen => {
            Err(UsageError::EntryAlreadyOpen.into())
        }
        EncodeState::SetData => {
            let remaining = level.set_def.as_ref().map_or(0, |d| d.len()) - level.set_slot;
            Err(UsageError::SetSlotsIncomplete { remaining }.into())
        }
    }
}

/// Opens an entry payload: the prefix (key/action/perm bytes) is already
/// written, `checkpoint` is the position before it.
pub(crate) fn open_entry(
    iter: &mut EncodeIterator<'_>,
    container: DataType,
    checkpoint: usize,
    approx: usize,
    expected: Option<DataType>,
) -> CodecResult<()> {
    let mark = match iter.reserve_u16ob(approx) {
        Ok(mark) => mark,
        Err(e) => {
            iter.rollback_to(checkpoint);
            return Err(e);
        }
    };
    let level = iter.require_open(container)?;
    level.entry_start = checkpoint;
    level.entry_mark = Some(mark);
    level.expected_child = expected;
    level.state = EncodeState::EntryOpen;
    Ok(())
}

/// Completes (or rolls back) the entry opened by [`open_entry`].
pub(crate) fn close_entry(
    iter: &mut EncodeIterator<'_>,
    container: DataType,
    commit: bool,
) -> CodecResult<()> {
    let (state, mark, start) = {
        let level = iter.require_open(container)?;
        (level.state, level.entry_mark, level.entry_start)
    };
    if state != EncodeState::EntryOpen {
        return Err(UsageError::NoOpenEntry.into());
    }
    if commit {
        iter.finish_u16ob(mark.expect("entry mark present while open"))?;
    } else {
        iter.rollback_to(start);
    }
    let level = iter.require_open(container)?;
    level.entry_mark = None;
    level.expected_child = None;
    level.state = EncodeState::Entries;
    if commit {
        level.count += 1;
    }
    Ok(())
}

/// Writes the total-count hint (when declared) and reserves the entry
/// count, moving the level into entry encoding.
pub(crate) fn begin_entries(
    iter: &mut EncodeIterator<'_>,
    container: DataType,
    hint: Option<u32>,
    count_u8: bool,
) -> CodecResult<()> {
    if let Some(h) = hint {
        if count_u8 {
            iter.write_u8(h.min(255) as u8)?;
        } else {
            if h > 0x3FFF_FFFF {
                return Err(UsageError::CountHintTooLarge(h).into());
            }
            iter.write_u30rb(h)?;
        }
    }
    let pos = if count_u8 {
        iter.reserve_u8_scalar()?
    } else {
        iter.reserve_u16_scalar()?
    };
    let level = iter.require_open(container)?;
    level.count_pos = Some(pos);
    level.state = EncodeState::Entries;
    Ok(())
}

/// Opens summary data; legal only before any entry.
pub(crate) fn summary_init(iter: &mut EncodeIterator<'_>, container: DataType) -> CodecResult<()> {
    {
        let level = iter.require_open(container)?;
        match level.state {
            EncodeState::SummaryPending => {}
            EncodeState::SummaryOpen | EncodeState::EntryOpen => {
                return Err(UsageError::EntryAlreadyOpen.into())
            }
            _ => return Err(UsageError::SummaryAfterEntries.into()),
        }
    }
    let mark = iter.reserve_u15()?;
    let level = iter.require_open(container)?;
    level.summary_mark = Some(mark);
    level.expected_child = Some(level.entry_container);
    level.state = EncodeState::SummaryOpen;
    Ok(())
}

/// Completes (or rolls back) summary data. On commit the deferred hint and
/// entry count follow, opening the entry section.
pub(crate) fn summary_complete(
    iter: &mut EncodeIterator<'_>,
    container: DataType,
    commit: bool,
    count_u8: bool,
) -> CodecResult<()> {
    let (state, mark, hint) = {
        let level = iter.require_open(container)?;
        (level.state, level.summary_mark, level.pending_hint)
    };
    if state != EncodeState::SummaryOpen {
        return Err(UsageError::NoOpenEntry.into());
    }
    let mark = mark.expect("summary mark present while open");
    if commit {
        iter.finish_u15(mark)?;
        {
            let level = iter.require_open(container)?;
            level.summary_mark = None;
            level.expected_child = None;
            level.pending_hint = None;
        }
        begin_entries(iter, container, hint, count_u8)
    } else {
        iter.rollback_to(mark.pos());
        let level = iter.require_open(container)?;
        level.summary_mark = None;
        level.expected_child = None;
        level.state = EncodeState::SummaryPending;
        Ok(())
    }
}

/// Shared container completion: rollback restores the container's start;
/// commit patches the entry count.
pub(crate) fn container_complete(
    iter: &mut EncodeIterator<'_>,
    container: DataType,
    commit: bool,
    count_u8: bool,
) -> CodecResult<()> {
    let (state, start) = {
        let level = iter.require_open(container)?;
        (level.state, level.container_start)
    };
    if !commit {
        iter.pop_level()?;
        iter.rollback_to(start);
        return Ok(());
    }
    match state {
        EncodeState::EntryOpen | EncodeState::SummaryOpen => {
            return Err(UsageError::EntryAlreadyOpen.into())
        }
        EncodeState::SummaryPending => return Err(UsageError::SummaryPending.into()),
        EncodeState::SetData => {
            let level = iter.require_open(container)?;
            let remaining = level.set_def.as_ref().map_or(0, |d| d.len()) - level.set_slot;
            return Err(UsageError::SetSlotsIncomplete { remaining }.into());
        }
        EncodeState::Entries => {}
    }
    let level = iter.pop_level()?;
    if let Some(pos) = level.count_pos {
        if count_u8 {
            iter.patch_u8(pos, level.count as u8);
        } else {
            iter.patch_u16(pos, level.count);
        }
    }
    Ok(())
}
