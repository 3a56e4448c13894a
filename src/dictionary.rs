//! Field dictionary and enumeration resolver.
//!
//! A [`Dictionary`] is built once (by an external loader or
//! programmatically), then frozen; decode passes share it read-only, so
//! any number of concurrent passes may resolve against one snapshot.
//! Wrap it in an `Arc` to share across threads.

use std::collections::HashMap;

use crate::error::{CodecError, CodecResult};
use crate::types::DataType;

/// One field record: wire identity, declared type, ripple link, and the
/// enumerated-display table it references.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldDef {
    pub fid: i16,
    pub name: String,
    pub wire_type: DataType,
    /// Field that mirrors updates to this one; 0 ends the chain.
    pub ripples_to: i16,
    /// Display-width hint from the definition source.
    pub length: u16,
    /// Index into the dictionary's enum tables.
    pub(crate) enum_table: Option<usize>,
}

impl FieldDef {
    pub fn new(fid: i16, name: &str, wire_type: DataType) -> Self {
        FieldDef {
            fid,
            name: name.to_owned(),
            wire_type,
            ripples_to: 0,
            length: 0,
            enum_table: None,
        }
    }

    pub fn rippling_to(mut self, fid: i16) -> Self {
        self.ripples_to = fid;
        self
    }
}

/// Display strings for one enumerated type.
#[derive(Debug, Clone, Default)]
pub struct EnumTable {
    displays: HashMap<u16, String>,
    pub max_value: u16,
}

impl EnumTable {
    pub fn display(&self, value: u16) -> Option<&str> {
        self.displays.get(&value).map(String::as_str)
    }
}

/// Three-way outcome of an enumerated display lookup. `Blank` (the
/// field's value is blank) is never conflated with `NotFound` (the value
/// has no mapping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumDisplay<'a> {
    Display(&'a str),
    NotFound,
    Blank,
}

/// Immutable field-id table plus enumerated-type tables.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    pub dictionary_id: u16,
    entries: HashMap<i16, FieldDef>,
    enum_tables: Vec<EnumTable>,
}

impl Dictionary {
    pub fn builder() -> DictionaryBuilder {
        DictionaryBuilder::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record for a field id.
    pub fn entry(&self, fid: i16) -> Option<&FieldDef> {
        self.entries.get(&fid)
    }

    /// Walks the ripple chain `hops` links forward from `fid`; `hops` of
    /// zero is the field itself. Returns `None` when the chain ends
    /// before `hops` links (an exhausted chain looks exactly like an
    /// absent field; probe shorter hop counts to measure chain length).
    pub fn ripple(&self, fid: i16, hops: usize) -> Option<&FieldDef> {
        let mut current = self.entry(fid)?;
        for _ in 0..hops {
            if current.ripples_to == 0 {
                return None;
            }
            current = self.entry(current.ripples_to)?;
        }
        Some(current)
    }

    /// Display string for `value` of enumerated field `fid`.
    pub fn enum_display(&self, fid: i16, value: u16) -> EnumDisplay<'_> {
        let Some(table) = self
            .entry(fid)
            .and_then(|def| def.enum_table)
            .and_then(|idx| self.enum_tables.get(idx))
        else {
            return EnumDisplay::NotFound;
        };
        match table.display(value) {
            Some(s) => EnumDisplay::Display(s),
            None => EnumDisplay::NotFound,
        }
    }
}

/// Accumulates fields and enum tables, validates, then freezes.
#[derive(Debug, Default)]
pub struct DictionaryBuilder {
    dictionary_id: u16,
    fields: Vec<FieldDef>,
    enum_tables: Vec<(Vec<i16>, EnumTable)>,
}

impl DictionaryBuilder {
    pub fn dictionary_id(mut self, id: u16) -> Self {
        self.dictionary_id = id;
        self
    }

    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    /// Adds an enumerated-type table shared by `fids`.
    pub fn enum_table<S: Into<String>>(
        mut self,
        fids: &[i16],
        displays: impl IntoIterator<Item = (u16, S)>,
    ) -> Self {
        let mut table = EnumTable::default();
        for (value, display) in displays {
            table.max_value = table.max_value.max(value);
            table.displays.insert(value, display.into());
        }
        self.enum_tables.push((fids.to_vec(), table));
        self
    }

    pub fn build(self) -> CodecResult<Dictionary> {
        let mut dict = Dictionary {
            dictionary_id: self.dictionary_id,
            entries: HashMap::with_capacity(self.fields.len()),
            enum_tables: Vec::with_capacity(self.enum_tables.len()),
        };
        for def in self.fields {
            if dict.entries.insert(def.fid, def).is_some() {
                return Err(CodecError::InvalidData {
                    reason: "duplicate field id in dictionary",
                });
            }
        }
        for (fids, table) in self.enum_tables {
            let idx = dict.enum_tables.len();
            dict.enum_tables.push(table);
            for fid in fids {
                let def = dict.entries.get_mut(&fid).ok_or(CodecError::InvalidData {
                    reason: "enum table references an undefined field id",
                })?;
                def.enum_table = Some(idx);
            }
        }
        tracing::debug!(
            fields = dict.entries.len(),
            enum_tables = dict.enum_tables.len(),
            "dictionary built"
        );
        Ok(dict)
    }
}
