//! RMTES string accumulation.
//!
//! RMTES payloads are either full replacements or partial updates that
//! patch a previously decoded value in place. Partial updates use the
//! legacy escape grammar: `ESC [ <n> 0x60` repositions the write cursor
//! to column `n`, `ESC [ <n> 0x62` repeats the preceding character `n`
//! more times. Applying a partial update with no prior full value is a
//! decode failure, never silently ignored.

use crate::error::{CodecError, CodecResult};

const ESC: u8 = 0x1B;
const LBRKT: u8 = 0x5B;
/// Horizontal position adjust (partial update).
const RHPA: u8 = 0x60;
/// Repeat command.
const RREP: u8 = 0x62;

/// True when `data` contains a partial-update escape sequence.
pub fn has_partial_updates(data: &[u8]) -> bool {
    let mut i = 0;
    while i + 1 < data.len() {
        if data[i] == ESC && data[i + 1] == LBRKT {
            let mut j = i + 2;
            while j < data.len() && data[j].is_ascii_digit() {
                j += 1;
            }
            if j < data.len() && (data[j] == RHPA || data[j] == RREP) {
                return true;
            }
        }
        i += 1;
    }
    false
}

/// Accumulation buffer holding the current full value of an RMTES field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RmtesBuffer {
    content: Vec<u8>,
}

impl RmtesBuffer {
    pub fn new() -> Self {
        RmtesBuffer::default()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Applies one decoded RMTES payload: full replacement when it carries
    /// no partial-update sequences, in-place patching otherwise.
    pub fn apply(&mut self, update: &[u8]) -> CodecResult<()> {
        if !has_partial_updates(update) {
            self.content.clear();
            self.content.extend_from_slice(update);
            return Ok(());
        }
        if self.content.is_empty() {
            return Err(CodecError::PartialUpdateWithoutBase);
        }
        tracing::trace!(len = update.len(), "applying rmtes partial update");
        let mut cursor = 0usize;
        let mut i = 0usize;
        while i < update.len() {
            if update[i] == ESC {
                let (advance, command, operand) = parse_escape(&update[i..])?;
                match command {
                    RHPA => cursor = operand,
                    RREP => {
                        if cursor == 0 {
                            return Err(CodecError::InvalidData {
                                reason: "rmtes repeat with no preceding character",
                            });
                        }
                        let ch = self.content[cursor - 1];
                        for _ in 0..operand {
                            self.put(cursor, ch);
                            cursor += 1;
                        }
                    }
                    _ => unreachable!("parse_escape only yields update commands"),
                }
                i += advance;
            } else {
                self.put(cursor, update[i]);
                cursor += 1;
                i += 1;
            }
        }
        Ok(())
    }

    fn put(&mut self, at: usize, byte: u8) {
        if at < self.content.len() {
            self.content[at] = byte;
        } else {
            // Gap positions beyond the current value read as spaces.
            while self.content.len() < at {
                self.content.push(b' ');
            }
            self.content.push(byte);
        }
    }
}

/// Parses `ESC [ <digits> cmd`, returning (consumed, command, operand).
fn parse_escape(data: &[u8]) -> CodecResult<(usize, u8, usize)> {
    if data.len() < 3 || data[1] != LBRKT {
        return Err(CodecError::InvalidData {
            reason: "unsupported rmtes escape sequence",
        });
    }
    let mut idx = 2;
    let mut operand = 0usize;
    while idx < data.len() && data[idx].is_ascii_digit() {
        operand = operand * 10 + (data[idx] - b'0') as usize;
        if operand > u16::MAX as usize {
            return Err(CodecError::InvalidData {
                reason: "rmtes escape operand out of range",
            });
        }
        idx += 1;
    }
    if idx == 2 || idx >= data.len() {
        return Err(CodecError::InvalidData {
            reason: "truncated rmtes escape sequence",
        });
    }
    let command = data[idx];
    if command != RHPA && command != RREP {
        return Err(CodecError::InvalidData {
            reason: "unsupported rmtes escape sequence",
        });
    }
    Ok((idx + 1, command, operand))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_replacement() {
        let mut buf = RmtesBuffer::new();
        buf.apply(b"MARKET OPEN").unwrap();
        assert_eq!(buf.bytes(), b"MARKET OPEN");
        buf.apply(b"MARKET CLOSE").unwrap();
        assert_eq!(buf.bytes(), b"MARKET CLOSE");
    }

    #[test]
    fn cursor_partial_update_patches_in_place() {
        let mut buf = RmtesBuffer::new();
        buf.apply(b"PRICE 100.25").unwrap();
        // Move to column 6, overwrite the number.
        buf.apply(b"\x1b[6`101.50").unwrap();
        assert_eq!(buf.bytes(), b"PRICE 101.50");
    }

    #[test]
    fn repeat_command_extends() {
        let mut buf = RmtesBuffer::new();
        buf.apply(b"AB").unwrap();
        buf.apply(b"\x1b[2`X\x1b[3b").unwrap();
        assert_eq!(buf.bytes(), b"ABXXXX");
    }

    #[test]
    fn partial_without_base_is_an_error() {
        let mut buf = RmtesBuffer::new();
        let err = buf.apply(b"\x1b[6`101.50").unwrap_err();
        assert_eq!(err, CodecError::PartialUpdateWithoutBase);
    }

    #[test]
    fn detection_ignores_plain_escapes() {
        assert!(has_partial_updates(b"\x1b[12`X"));
        assert!(has_partial_updates(b"abc\x1b[3b"));
        assert!(!has_partial_updates(b"no escapes here"));
        // Charset-selection escapes are not partial updates.
        assert!(!has_partial_updates(b"\x1b\x25\x30text"));
    }

    #[test]
    fn malformed_escape_is_a_decode_failure() {
        let mut buf = RmtesBuffer::new();
        buf.apply(b"BASE").unwrap();
        // The leading sequence marks this as partial; the trailing escape
        // is truncated mid-operand.
        assert!(buf.apply(b"\x1b[2`X\x1b[9").is_err());
    }
}
