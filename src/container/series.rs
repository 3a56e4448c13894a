//! Series: uniform positional entries, typically table rows sharing the
//! summary's structure.

use crate::container::{
    begin_entries, check_nested, close_entry, container_complete, load_payload, open_entry,
    read_entry_container_type, require_entries, summary_complete, summary_init, Payload,
};
use crate::container::map::decode_local_sets;
use crate::error::{CodecResult, UsageError};
use crate::iter::{DecodeContext, DecodeIterator, EncodeIterator, EncodeLevel, EncodeState};
use crate::set_def::{LocalElementSetDb, LocalFieldSetDb};
use crate::types::DataType;

const HAS_SET_DEFS: u8 = 0x01;
const HAS_SUMMARY: u8 = 0x02;
const HAS_TOTAL_COUNT_HINT: u8 = 0x04;

/// Decoded series header over its undecoded entries.
#[derive(Debug, Clone)]
pub struct Series<'a> {
    pub container_type: DataType,
    pub total_count_hint: Option<u32>,
    summary_data: Option<&'a [u8]>,
    pub(crate) local_field_sets: Option<LocalFieldSetDb>,
    pub(crate) local_element_sets: Option<LocalElementSetDb>,
    entries_data: &'a [u8],
    count: u16,
    ctx: DecodeContext<'a>,
}

impl<'a> Series<'a> {
    pub fn decode(iter: &mut DecodeIterator<'a>) -> CodecResult<Series<'a>> {
        let ctx = iter.context();
        if iter.remaining() == 0 {
            return Ok(Series::empty(ctx));
        }
        let flags = iter.read_u8()?;
        let container_type = read_entry_container_type(iter)?;
        let mut series = Series {
            container_type,
            ..Series::empty(ctx)
        };
        if flags & HAS_SET_DEFS != 0 {
            let raw = iter.read_buffer15()?;
            decode_local_sets(
                iter,
                raw,
                container_type,
                &mut series.local_field_sets,
                &mut series.local_element_sets,
            )?;
        }
        if flags & HAS_SUMMARY != 0 {
            series.summary_data = Some(iter.read_buffer15()?);
        }
        if flags & HAS_TOTAL_COUNT_HINT != 0 {
            series.total_count_hint = Some(iter.read_u30rb()?);
        }
        series.count = iter.read_u16()?;
        series.entries_data = iter.take_remaining();
        Ok(series)
    }

    fn empty(ctx: DecodeContext<'a>) -> Self {
        Series {
            container_type: DataType::NoData,
            total_count_hint: None,
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

    pub fn iter(&self) -> SeriesIter<'_, 'a> {
        SeriesIter::new(self)
    }
}

/// Forward-only entry navigator over a decoded series.
#[derive(Debug, Clone)]
pub struct SeriesIter<'m, 'a> {
    series: &'m Series<'a>,
    cursor: DecodeIterator<'a>,
    remaining: u16,
    failed: bool,
}

impl<'m, 'a> SeriesIter<'m, 'a> {
    fn new(series: &'m Series<'a>) -> Self {
        SeriesIter {
            series,
            cursor: DecodeIterator::with_context(series.entries_data, series.ctx),
            remaining: series.count,
            failed: false,
        }
    }

    pub fn reset(&mut self) {
        *self = SeriesIter::new(self.series);
    }

    pub fn next_entry(&mut self) -> Option<CodecResult<SeriesEntryRef<'m, 'a>>> {
        if self.failed || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let raw = if self.series.container_type == DataType::NoData {
            b"".as_slice()
        } else {
            match self.cursor.read_buffer16() {
                Ok(run) => run,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        };
        Some(Ok(SeriesEntryRef {
            raw,
            series: self.series,
        }))
    }
}

/// One series entry.
#[derive(Debug, Clone, Copy)]
pub struct SeriesEntryRef<'m, 'a> {
    raw: &'a [u8],
    series: &'m Series<'a>,
}

impl<'m, 'a> SeriesEntryRef<'m, 'a> {
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn load(&self) -> Payload<'a> {
        load_payload(
            self.series.ctx,
            self.raw,
            self.series.container_type,
            self.series.local_field_sets.as_ref(),
            self.series.local_element_sets.as_ref(),
        )
    }
}

/// Series header for encoding.
#[derive(Debug, Clone, Copy)]
pub struct SeriesInit {
    pub container_type: DataType,
    pub has_summary: bool,
    pub total_count_hint: Option<u32>,
}

impl SeriesInit {
    pub fn new(container_type: DataType) -> Self {
        SeriesInit {
            container_type,
            has_summary: false,
            total_count_hint: None,
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
        check_nested(iter, DataType::Series)?;
        let start = iter.position();
        let mut level = EncodeLevel::new(DataType::Series, start);
        level.entry_container = self.container_type;

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
        if self.total_count_hint.is_some() {
            flags |= HAS_TOTAL_COUNT_HINT;
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
            begin_entries(iter, DataType::Series, self.total_count_hint, false)
        }
    }

    pub fn encode_summary_init(iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        summary_init(iter, DataType::Series)
    }

    pub fn encode_summary_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        summary_complete(iter, DataType::Series, commit, false)
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        container_complete(iter, DataType::Series, commit, false)
    }
}

/// One series entry for encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeriesEntry;

impl SeriesEntry {
    /// Encodes a payload-less entry (`NoData` container type only).
    pub fn encode(iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        require_entries(iter, DataType::Series)?;
        if iter.require_open(DataType::Series)?.entry_container != DataType::NoData {
            return Err(UsageError::PayloadRequired.into());
        }
        iter.require_open(DataType::Series)?.count += 1;
        Ok(())
    }

    pub fn encode_init(iter: &mut EncodeIterator<'_>, approx: usize) -> CodecResult<()> {
        require_entries(iter, DataType::Series)?;
        let container = iter.require_open(DataType::Series)?.entry_container;
        if container == DataType::NoData {
            return Err(UsageError::PayloadNotAllowed.into());
        }
        let checkpoint = iter.position();
        open_entry(iter, DataType::Series, checkpoint, approx, Some(container))
    }

    pub fn encode_complete(iter: &mut EncodeIterator<'_>, commit: bool) -> CodecResult<()> {
        close_entry(iter, DataType::Series, commit)
    }
}
