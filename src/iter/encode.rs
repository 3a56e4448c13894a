//! Encode cursor with level-stack discipline and checkpoint rollback.
//!
//! Writes go straight into the caller's buffer. Variable-length portions
//! reserve a size mark up front (one byte for small reservations, the
//! three-byte escape form otherwise) and patch it when the portion
//! completes; a one-byte reservation that overflows is healed by shifting
//! the portion right two bytes. Rolling back an entry restores the write
//! position recorded when the entry opened, which discards every nested
//! byte written since while leaving committed siblings untouched.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CodecError, CodecResult, UsageError};
use crate::types::{DataType, WireVersion, MAX_NESTING_DEPTH};

/// Size mark for a u16ob-prefixed portion.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mark16 {
    pos: usize,
    width: usize,
}

/// Size mark for a u15rb-prefixed portion (always the two-byte form).
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mark15 {
    pos: usize,
}

impl Mark15 {
    /// Position of the reserved length itself; rolling back to it drops
    /// the portion and its reservation.
    pub(crate) fn pos(self) -> usize {
        self.pos
    }
}

/// Per-level encode state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EncodeState {
    /// Summary data was declared and must be encoded before entries.
    SummaryPending,
    /// A summary payload is currently open.
    SummaryOpen,
    /// Set-defined slots are being filled.
    SetData,
    /// Standard entries may be encoded.
    Entries,
    /// An entry payload is currently open.
    EntryOpen,
}

/// Set definition resolved for encoding, cloned into the level so slot
/// order can be enforced as entries arrive.
#[derive(Debug, Clone)]
pub(crate) enum EncSetDef {
    Field(Vec<(i16, DataType)>),
    Element(Vec<(Vec<u8>, DataType)>),
}

impl EncSetDef {
    pub(crate) fn len(&self) -> usize {
        match self {
            EncSetDef::Field(v) => v.len(),
            EncSetDef::Element(v) => v.len(),
        }
    }
}

/// One open container on the encode stack.
#[derive(Debug)]
pub(crate) struct EncodeLevel {
    pub container: DataType,
    pub state: EncodeState,
    pub container_start: usize,
    /// Position of the entry-count scalar to patch at completion
    /// (u16 everywhere except the filter list's u8).
    pub count_pos: Option<usize>,
    pub count: u16,
    /// Checkpoint for the entry currently open, if any.
    pub entry_start: usize,
    pub entry_mark: Option<Mark16>,
    /// Declared type the open entry's nested payload must match.
    pub expected_child: Option<DataType>,
    /// Declared per-container entry payload type (NoData when entries are
    /// keyed primitives as in field/element lists).
    pub entry_container: DataType,
    pub key_type: Option<DataType>,
    pub perm_entries: bool,
    pub has_standard: bool,
    pub set_def: Option<EncSetDef>,
    pub set_slot: usize,
    pub set_mark: Option<Mark15>,
    pub summary_mark: Option<Mark15>,
    /// Total-count hint deferred until after summary data completes.
    pub pending_hint: Option<u32>,
}

impl EncodeLevel {
    pub(crate) fn new(container: DataType, container_start: usize) -> Self {
        EncodeLevel {
            container,
            state: EncodeState::Entries,
            container_start,
            count_pos: None,
            count: 0,
            entry_start: 0,
            entry_mark: None,
            expected_child: None,
            entry_container: DataType::NoData,
            key_type: None,
            perm_entries: false,
            has_standard: true,
            set_def: None,
            set_slot: 0,
            set_mark: None,
            summary_mark: None,
            pending_hint: None,
        }
    }
}

/// Write cursor bound to one caller buffer and one wire version.
#[derive(Debug)]
pub struct EncodeIterator<'a> {
    buf: &'a mut [u8],
    pos: usize,
    version: WireVersion,
    levels: Vec<EncodeLevel>,
    done: bool,
}

impl<'a> EncodeIterator<'a> {
    /// Binds `buf` for one encode pass. An empty buffer or an unsupported
    /// major version fails with `IteratorSetFailure`.
    pub fn new(buf: &'a mut [u8], version: WireVersion) -> CodecResult<Self> {
        if !version.compatible() {
            return Err(CodecError::IteratorSetFailure {
                reason: "unsupported wire major version",
            });
        }
        if buf.is_empty() {
            return Err(CodecError::IteratorSetFailure {
                reason: "zero-length encode buffer",
            });
        }
        Ok(EncodeIterator {
            buf,
            pos: 0,
            version,
            levels: Vec::with_capacity(4),
            done: false,
        })
    }

    pub fn version(&self) -> WireVersion {
        self.version
    }

    /// Bytes committed so far.
    pub fn encoded(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn need(&self, n: usize) -> CodecResult<()> {
        if self.buf.len() - self.pos < n {
            return Err(CodecError::BufferTooSmall {
                need: n,
                have: self.buf.len() - self.pos,
            });
        }
        Ok(())
    }

    pub fn write_u8(&mut self, v: u8) -> CodecResult<()> {
        self.need(1)?;
        self.buf[self.pos] = v;
        self.pos += 1;
        Ok(())
    }

    pub fn write_u16(&mut self, v: u16) -> CodecResult<()> {
        self.need(2)?;
        BigEndian::write_u16(&mut self.buf[self.pos..], v);
        self.pos += 2;
        Ok(())
    }

    pub fn write_i16(&mut self, v: i16) -> CodecResult<()> {
        self.write_u16(v as u16)
    }

    pub fn write_u32(&mut self, v: u32) -> CodecResult<()> {
        self.need(4)?;
        BigEndian::write_u32(&mut self.buf[self.pos..], v);
        self.pos += 4;
        Ok(())
    }

    pub fn write_u64(&mut self, v: u64) -> CodecResult<()> {
        self.need(8)?;
        BigEndian::write_u64(&mut self.buf[self.pos..], v);
        self.pos += 8;
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> CodecResult<()> {
        self.need(data.len())?;
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
        Ok(())
    }

    /// Minimal u15rb form.
    pub fn write_u15rb(&mut self, v: u16) -> CodecResult<()> {
        debug_assert!(v <= 0x7FFF);
        if v < 0x80 {
            self.write_u8(v as u8)
        } else {
            self.write_u16(0x8000 | v)
        }
    }

    /// Minimal u30rb form.
    pub fn write_u30rb(&mut self, v: u32) -> CodecResult<()> {
        debug_assert!(v <= 0x3FFF_FFFF);
        if v < 1 << 6 {
            self.write_u8(v as u8)
        } else if v < 1 << 14 {
            self.write_u16(0x4000 | v as u16)
        } else if v < 1 << 22 {
            self.write_u8(0x80 | (v >> 16) as u8)?;
            self.write_u16(v as u16)
        } else {
            self.write_u32(0xC000_0000 | v)
        }
    }

    /// Minimal u16ob form.
    pub fn write_u16ob(&mut self, v: u16) -> CodecResult<()> {
        if v < 0xFE {
            self.write_u8(v as u8)
        } else {
            self.write_u8(0xFE)?;
            self.write_u16(v)
        }
    }

    /// u15rb-prefixed byte run.
    pub fn write_buffer15(&mut self, data: &[u8]) -> CodecResult<()> {
        if data.len() > 0x7FFF {
            return Err(CodecError::InvalidData {
                reason: "buffer exceeds u15 length range",
            });
        }
        self.write_u15rb(data.len() as u16)?;
        self.write_bytes(data)
    }

    /// u16ob-prefixed byte run.
    pub fn write_buffer16(&mut self, data: &[u8]) -> CodecResult<()> {
        if data.len() > u16::MAX as usize {
            return Err(CodecError::InvalidData {
                reason: "buffer exceeds u16 length range",
            });
        }
        self.write_u16ob(data.len() as u16)?;
        self.write_bytes(data)
    }

    /// Reserves a u16ob length for a portion whose size is not yet known.
    /// `approx` picks the reservation width; a low guess is healed at
    /// finish time by shifting the portion.
    pub(crate) fn reserve_u16ob(&mut self, approx: usize) -> CodecResult<Mark16> {
        let width = if approx < 0xFE { 1 } else { 3 };
        self.need(width)?;
        let mark = Mark16 {
            pos: self.pos,
            width,
        };
        self.pos += width;
        Ok(mark)
    }

    /// Patches a reserved u16ob length to cover everything written since.
    pub(crate) fn finish_u16ob(&mut self, mark: Mark16) -> CodecResult<()> {
        let len = self.pos - (mark.pos + mark.width);
        if len > u16::MAX as usize {
            return Err(CodecError::InvalidData {
                reason: "portion exceeds u16 length range",
            });
        }
        if mark.width == 3 {
            self.buf[mark.pos] = 0xFE;
            BigEndian::write_u16(&mut self.buf[mark.pos + 1..], len as u16);
        } else if len < 0xFE {
            self.buf[mark.pos] = len as u8;
        } else {
            // Reservation was one byte short of the escape form: shift the
            // portion right and widen the mark.
            self.need(2)?;
            self.buf
                .copy_within(mark.pos + 1..self.pos, mark.pos + 3);
            self.pos += 2;
            self.buf[mark.pos] = 0xFE;
            BigEndian::write_u16(&mut self.buf[mark.pos + 1..], len as u16);
        }
        Ok(())
    }

    /// Reserves a two-byte u15rb length.
    pub(crate) fn reserve_u15(&mut self) -> CodecResult<Mark15> {
        self.need(2)?;
        let mark = Mark15 { pos: self.pos };
        self.pos += 2;
        Ok(mark)
    }

    /// Patches a reserved u15rb length to cover everything written since.
    pub(crate) fn finish_u15(&mut self, mark: Mark15) -> CodecResult<()> {
        let len = self.pos - (mark.pos + 2);
        if len > 0x7FFF {
            return Err(CodecError::InvalidData {
                reason: "portion exceeds u15 length range",
            });
        }
        BigEndian::write_u16(&mut self.buf[mark.pos..], 0x8000 | len as u16);
        Ok(())
    }

    /// Reserves the u16 entry count patched at container completion.
    pub(crate) fn reserve_u16_scalar(&mut self) -> CodecResult<usize> {
        self.need(2)?;
        let pos = self.pos;
        self.pos += 2;
        Ok(pos)
    }

    pub(crate) fn reserve_u8_scalar(&mut self) -> CodecResult<usize> {
        self.need(1)?;
        let pos = self.pos;
        self.pos += 1;
        Ok(pos)
    }

    pub(crate) fn patch_u16(&mut self, pos: usize, v: u16) {
        BigEndian::write_u16(&mut self.buf[pos..], v);
    }

    pub(crate) fn patch_u8(&mut self, pos: usize, v: u8) {
        self.buf[pos] = v;
    }

    /// Restores the write position to a checkpoint, discarding everything
    /// written since.
    pub(crate) fn rollback_to(&mut self, checkpoint: usize) {
        debug_assert!(checkpoint <= self.pos);
        tracing::trace!(discarded = self.pos - checkpoint, "encode rollback");
        self.pos = checkpoint;
    }

    pub(crate) fn push_level(&mut self, level: EncodeLevel) -> CodecResult<()> {
        if self.done {
            return Err(UsageError::CompletedContainer.into());
        }
        if self.levels.len() >= MAX_NESTING_DEPTH {
            return Err(CodecError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        self.levels.push(level);
        Ok(())
    }

    pub(crate) fn pop_level(&mut self) -> CodecResult<EncodeLevel> {
        let level = self
            .levels
            .pop()
            .ok_or(UsageError::NoOpenContainer)?;
        if self.levels.is_empty() {
            self.done = true;
        }
        Ok(level)
    }

    /// The open level, which must be a `container`. Misuse (nothing open,
    /// wrong container kind, or encoding after the pass completed) is
    /// reported as a usage error.
    pub(crate) fn require_open(&mut self, container: DataType) -> CodecResult<&mut EncodeLevel> {
        if self.levels.is_empty() {
            if self.done {
                return Err(UsageError::CompletedContainer.into());
            }
            return Err(UsageError::NoOpenContainer.into());
        }
        let level = self.levels.last_mut().expect("checked non-empty");
        if level.container != container {
            return Err(UsageError::NoOpenContainer.into());
        }
        Ok(level)
    }

    /// Parent level of a nested container being initialized, if any.
    pub(crate) fn parent_level(&mut self) -> Option<&mut EncodeLevel> {
        self.levels.last_mut()
    }
}
