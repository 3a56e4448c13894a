//! Wire type registry and entry actions.
//!
//! `DataType` is the single numbering shared by container headers, entry
//! payloads, set definitions and the dictionary. Primitives occupy 0-63,
//! fixed-width set-lane variants 64-127, containers 128 and up. Container
//! types travel on the wire biased down by [`CONTAINER_TYPE_BASE`] so they
//! fit a byte alongside the primitive range.

use num_enum::TryFromPrimitive;

use crate::error::{CodecError, CodecResult};

/// Bias applied to container types on the wire.
pub const CONTAINER_TYPE_BASE: u8 = 128;

/// Deepest legal container nesting for one encode or decode pass.
pub const MAX_NESTING_DEPTH: usize = 16;

/// Wire-format version pair carried by every iterator binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct WireVersion {
    pub major: u8,
    pub minor: u8,
}

/// Version this crate encodes and accepts.
pub const WIRE_VERSION: WireVersion = WireVersion { major: 14, minor: 1 };

impl WireVersion {
    /// Major versions are frozen; minor revisions stay decodable.
    pub fn compatible(self) -> bool {
        self.major == WIRE_VERSION.major
    }
}

/// Every type a payload, key, or set slot can declare.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum DataType {
    Unknown = 0,
    Int = 3,
    UInt = 4,
    Float = 5,
    Double = 6,
    Real = 8,
    Date = 9,
    Time = 10,
    DateTime = 11,
    Qos = 12,
    State = 13,
    Enum = 14,
    Array = 15,
    Buffer = 16,
    AsciiString = 17,
    Utf8String = 18,
    RmtesString = 19,

    // Fixed-width variants, legal only inside set definitions. They decode
    // back to their base types.
    Int1 = 64,
    UInt1 = 65,
    Int2 = 66,
    UInt2 = 67,
    Int4 = 68,
    UInt4 = 69,
    Int8 = 70,
    UInt8 = 71,
    Float4 = 72,
    Double8 = 73,
    Real4RB = 74,
    Real8RB = 75,
    Date4 = 76,
    Time3 = 77,
    Time5 = 78,
    DateTime7 = 79,
    DateTime9 = 80,

    NoData = 128,
    Msg = 129,
    FieldList = 130,
    ElementList = 131,
    FilterList = 132,
    Vector = 133,
    Map = 134,
    Series = 135,
}

impl DataType {
    pub fn is_primitive(self) -> bool {
        (self as u8) < CONTAINER_TYPE_BASE && self != DataType::Unknown
    }

    pub fn is_container(self) -> bool {
        (self as u8) >= CONTAINER_TYPE_BASE
    }

    /// True for the fixed-width variants only meaningful in set lanes.
    pub fn is_set_variant(self) -> bool {
        let v = self as u8;
        (64..CONTAINER_TYPE_BASE).contains(&v)
    }

    /// Normalizes set-lane variants to the base type reported to callers.
    pub fn base_type(self) -> DataType {
        match self {
            DataType::Int1 | DataType::Int2 | DataType::Int4 | DataType::Int8 => DataType::Int,
            DataType::UInt1 | DataType::UInt2 | DataType::UInt4 | DataType::UInt8 => DataType::UInt,
            DataType::Float4 => DataType::Float,
            DataType::Double8 => DataType::Double,
            DataType::Real4RB | DataType::Real8RB => DataType::Real,
            DataType::Date4 => DataType::Date,
            DataType::Time3 | DataType::Time5 => DataType::Time,
            DataType::DateTime7 | DataType::DateTime9 => DataType::DateTime,
            other => other,
        }
    }

    /// Fixed set-lane width, when the variant has one.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::Int1 | DataType::UInt1 => Some(1),
            DataType::Int2 | DataType::UInt2 => Some(2),
            DataType::Int4 | DataType::UInt4 | DataType::Float4 | DataType::Date4 => Some(4),
            DataType::Int8 | DataType::UInt8 | DataType::Double8 => Some(8),
            DataType::Time3 => Some(3),
            DataType::Time5 => Some(5),
            DataType::DateTime7 => Some(7),
            DataType::DateTime9 => Some(9),
            _ => None,
        }
    }

    /// Decodes a biased container-type byte from the wire.
    pub fn from_wire_container(byte: u8) -> CodecResult<DataType> {
        let raw = byte
            .checked_add(CONTAINER_TYPE_BASE)
            .ok_or(CodecError::UnknownType(byte))?;
        let ty = DataType::try_from(raw).map_err(|_| CodecError::UnknownType(byte))?;
        debug_assert!(ty.is_container());
        Ok(ty)
    }

    /// Biases a container type for the wire.
    pub fn to_wire_container(self) -> u8 {
        debug_assert!(self.is_container());
        self as u8 - CONTAINER_TYPE_BASE
    }
}

/// Map entry actions (low nibble of the entry lead byte).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum MapAction {
    Update = 1,
    Add = 2,
    Delete = 3,
}

impl MapAction {
    /// Delete entries never carry a payload.
    pub fn has_payload(self) -> bool {
        self != MapAction::Delete
    }
}

/// Vector entry actions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum VectorAction {
    Update = 1,
    Set = 2,
    Clear = 3,
    Insert = 4,
    Delete = 5,
}

impl VectorAction {
    pub fn has_payload(self) -> bool {
        !matches!(self, VectorAction::Clear | VectorAction::Delete)
    }
}

/// Filter entry actions.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub enum FilterAction {
    Update = 1,
    Set = 2,
    Clear = 3,
}

impl FilterAction {
    pub fn has_payload(self) -> bool {
        self != FilterAction::Clear
    }
}
