//! Error taxonomy for the TickWire codec.
//!
//! Three tiers, kept as separate types so callers can always tell them
//! apart:
//!
//! - [`CodecError`]: wire conditions fatal to the current container scope
//!   (malformed lengths, exhausted buffers, unresolvable set definitions)
//!   plus iterator binding failures. Decoding of sibling or ancestor
//!   containers is unaffected.
//! - [`EntryError`]: per-entry recoverable conditions. These surface as an
//!   `Error`-kind payload on the affected entry; iteration continues.
//! - [`UsageError`]: caller contract violations (entries after commit,
//!   mismatched payload types). These indicate an API bug, not bad data,
//!   and are reported at the violating call via the `Usage` variant.

use thiserror::Error;

use crate::types::DataType;

/// Codec errors fatal to the current container scope
///
/// Each variant carries enough context to locate the failure without
/// re-parsing the buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer exhausted: need {need} bytes, {have} remaining")]
    Truncated { need: usize, have: usize },

    #[error("encode buffer too small: need {need} bytes, {have} remaining")]
    BufferTooSmall { need: usize, have: usize },

    #[error("iterator binding failed: {reason}")]
    IteratorSetFailure { reason: &'static str },

    #[error("nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("invalid type tag {0}")]
    UnknownType(u8),

    #[error("invalid data: {reason}")]
    InvalidData { reason: &'static str },

    #[error("reserved length marker 0xFF")]
    ReservedLength,

    #[error("set id {0} has no visible definition")]
    UnknownSetId(u16),

    #[error("set id {0} defined twice in one scope")]
    DuplicateSetId(u16),

    #[error("set id {0} exceeds the local-scope maximum")]
    IllegalSetId(u16),

    #[error("set definition database declares {0} sets (max 15)")]
    TooManySets(u8),

    #[error("partial update applied without a prior full value")]
    PartialUpdateWithoutBase,

    #[error(transparent)]
    Usage(#[from] UsageError),
}

/// Result alias for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Per-entry recoverable conditions
///
/// Decoding an entry that hits one of these yields an `Error`-kind payload
/// carrying the condition; the container's remaining entries stay
/// decodable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EntryError {
    #[error("field id {0} not found in dictionary")]
    FieldIdNotFound(i16),

    #[error("element \"{0}\" not found")]
    ElementNotFound(String),

    #[error("no dictionary bound to this decode pass")]
    NoDictionary,

    #[error("wire value of {actual} bytes is longer than {expected:?} allows")]
    ValueTooLong { expected: DataType, actual: usize },

    #[error("wire value of {actual} bytes is shorter than {expected:?} requires")]
    ValueTooShort { expected: DataType, actual: usize },

    #[error("malformed {expected:?} payload: {reason}")]
    Malformed {
        expected: DataType,
        reason: &'static str,
    },

    #[error("nested container failed to decode: {0}")]
    NestedDecode(CodecError),
}

/// Caller contract violations
///
/// Reported eagerly at the violating call. Never produced by wire data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("entry encoded after the container completed")]
    CompletedContainer,

    #[error("no container is open on the encode iterator")]
    NoOpenContainer,

    #[error("no entry is open at this level")]
    NoOpenEntry,

    #[error("an entry is already open at this level")]
    EntryAlreadyOpen,

    #[error("summary data must be encoded before any entry")]
    SummaryAfterEntries,

    #[error("declared summary data has not been encoded yet")]
    SummaryPending,

    #[error("container did not declare standard entries")]
    StandardDataNotDeclared,

    #[error("a {found:?} was initialized where the container declares {declared:?} entries")]
    EntryTypeMismatch { declared: DataType, found: DataType },

    #[error("primitive {supplied:?} supplied for a {declared:?} slot")]
    PrimitiveTypeMismatch {
        declared: DataType,
        supplied: DataType,
    },

    #[error("set slot {slot} expects field id {expected}, got {got}")]
    SetSlotMismatch { slot: usize, expected: i16, got: i16 },

    #[error("set slot {slot} expects a different element name")]
    SetSlotNameMismatch { slot: usize },

    #[error("standard entries must follow the {remaining} remaining set slots")]
    SetSlotsIncomplete { remaining: usize },

    #[error("unspecified QoS timeliness/rate cannot be encoded")]
    UnspecifiedQos,

    #[error("unspecified stream state cannot be encoded")]
    UnspecifiedState,

    #[error("total count hint {0} exceeds the 30-bit range")]
    CountHintTooLarge(u32),

    #[error("filter list holds more than 255 entries")]
    TooManyFilterEntries,

    #[error("{0:?} is not legal as an entry container type")]
    InvalidContainerType(DataType),

    #[error("entry action requires a payload")]
    PayloadRequired,

    #[error("entry action or container type carries no payload")]
    PayloadNotAllowed,

    #[error("permission data was not declared for this container")]
    PermDataNotDeclared,
}
