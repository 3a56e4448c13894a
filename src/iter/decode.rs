//! Bounds-checked decode cursor.
//!
//! Every read validates against the remaining extent and fails with a
//! typed [`CodecError::Truncated`] carrying the shortfall; no read ever
//! panics on wire data. Nested payloads are handed out as sub-slices and
//! decoded through a fresh cursor over that slice, so a dishonest nested
//! length can never escape its entry.

use byteorder::{BigEndian, ByteOrder};

use crate::dictionary::Dictionary;
use crate::error::{CodecError, CodecResult};
use crate::set_def::{LocalElementSetDb, LocalFieldSetDb};
use crate::types::{WireVersion, WIRE_VERSION};

/// Shared, copyable decode-pass context: the bound version plus the
/// read-only lookups a pass may consult. Carried into every decoded
/// container so lazy payload decode can recurse without the originating
/// iterator.
#[derive(Debug, Clone, Copy)]
pub struct DecodeContext<'a> {
    pub version: WireVersion,
    pub dictionary: Option<&'a Dictionary>,
    pub field_sets: Option<&'a LocalFieldSetDb>,
    pub element_sets: Option<&'a LocalElementSetDb>,
}

impl Default for DecodeContext<'_> {
    fn default() -> Self {
        DecodeContext {
            version: WIRE_VERSION,
            dictionary: None,
            field_sets: None,
            element_sets: None,
        }
    }
}

/// Forward-only cursor over received bytes.
#[derive(Debug, Clone)]
pub struct DecodeIterator<'a> {
    buf: &'a [u8],
    pos: usize,
    ctx: DecodeContext<'a>,
}

impl<'a> DecodeIterator<'a> {
    /// Binds `buf` for one decode pass. Fails with `IteratorSetFailure`
    /// when the version's major is not supported; the iterator is then
    /// unusable.
    pub fn new(buf: &'a [u8], version: WireVersion) -> CodecResult<Self> {
        if !version.compatible() {
            return Err(CodecError::IteratorSetFailure {
                reason: "unsupported wire major version",
            });
        }
        Ok(DecodeIterator {
            buf,
            pos: 0,
            ctx: DecodeContext {
                version,
                ..DecodeContext::default()
            },
        })
    }

    /// Attaches the read-only dictionary used for field resolution.
    pub fn set_dictionary(&mut self, dictionary: &'a Dictionary) {
        tracing::debug!(fields = dictionary.len(), "dictionary attached to decode pass");
        self.ctx.dictionary = Some(dictionary);
    }

    /// Attaches a wider-scope field set-definition database.
    pub fn set_field_set_db(&mut self, db: &'a LocalFieldSetDb) {
        self.ctx.field_sets = Some(db);
    }

    /// Attaches a wider-scope element set-definition database.
    pub fn set_element_set_db(&mut self, db: &'a LocalElementSetDb) {
        self.ctx.element_sets = Some(db);
    }

    pub fn context(&self) -> DecodeContext<'a> {
        self.ctx
    }

    /// Fresh cursor over `data` inheriting this pass's context. The basis
    /// of recursive descent: the child cannot read past `data`.
    pub fn subslice(&self, data: &'a [u8]) -> DecodeIterator<'a> {
        DecodeIterator {
            buf: data,
            pos: 0,
            ctx: self.ctx,
        }
    }

    /// Cursor over `data` under an existing pass context.
    pub(crate) fn with_context(data: &'a [u8], ctx: DecodeContext<'a>) -> DecodeIterator<'a> {
        DecodeIterator { buf: data, pos: 0, ctx }
    }

    /// Bytes between a previously taken [`Self::position`] and the current
    /// one; used to capture an entry's raw extent after sizing it.
    pub(crate) fn span_since(&self, mark: usize) -> &'a [u8] {
        debug_assert!(mark <= self.pos);
        &self.buf[mark..self.pos]
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn need(&self, n: usize) -> CodecResult<()> {
        if self.remaining() < n {
            return Err(CodecError::Truncated {
                need: n,
                have: self.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        self.need(2)?;
        let v = BigEndian::read_u16(&self.buf[self.pos..]);
        self.pos += 2;
        Ok(v)
    }

    pub fn read_i16(&mut self) -> CodecResult<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        self.need(4)?;
        let v = BigEndian::read_u32(&self.buf[self.pos..]);
        self.pos += 4;
        Ok(v)
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        self.need(8)?;
        let v = BigEndian::read_u64(&self.buf[self.pos..]);
        self.pos += 8;
        Ok(v)
    }

    pub fn read_bytes(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        self.need(n)?;
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    /// Consumes the remainder of the cursor's extent.
    pub fn take_remaining(&mut self) -> &'a [u8] {
        let s = &self.buf[self.pos..];
        self.pos = self.buf.len();
        s
    }

    /// Reserved-bit u15: one byte below 0x80, otherwise two with the top
    /// bit set.
    pub fn read_u15rb(&mut self) -> CodecResult<u16> {
        let first = self.read_u8()?;
        if first & 0x80 == 0 {
            Ok(first as u16)
        } else {
            let second = self.read_u8()?;
            Ok((((first & 0x7F) as u16) << 8) | second as u16)
        }
    }

    /// u30rb: the first byte's top two bits select a 1/2/3/4-byte width.
    pub fn read_u30rb(&mut self) -> CodecResult<u32> {
        let first = self.read_u8()?;
        let width = first >> 6;
        let mut value = (first & 0x3F) as u32;
        for _ in 0..width {
            value = (value << 8) | self.read_u8()? as u32;
        }
        Ok(value)
    }

    /// Optional-byte u16: 0x00-0xFD literal, 0xFE + u16, 0xFF reserved.
    pub fn read_u16ob(&mut self) -> CodecResult<u16> {
        let first = self.read_u8()?;
        match first {
            0xFF => Err(CodecError::ReservedLength),
            0xFE => self.read_u16(),
            v => Ok(v as u16),
        }
    }

    /// u15rb length followed by that many bytes.
    pub fn read_buffer15(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_u15rb()? as usize;
        self.read_bytes(len)
    }

    /// u16ob length followed by that many bytes.
    pub fn read_buffer16(&mut self) -> CodecResult<&'a [u8]> {
        let len = self.read_u16ob()? as usize;
        self.read_bytes(len)
    }
}
