//! # TickWire - Binary Container Codec
//!
//! Wire-format codec and data model for a market-data messaging protocol
//! built from six composable container kinds (field lists, element lists,
//! maps, series, vectors, filter lists) over a fixed primitive palette
//! (variable-width integers, exact scaled decimals, date/time, QoS,
//! stream state, enumerations, and several string encodings). Containers
//! nest arbitrarily; every entry can resolve against an external
//! dictionary for names, types and enumerated displays.
//!
//! ## API Surface
//!
//! - **Iterators**: [`EncodeIterator`] / [`DecodeIterator`] bind one
//!   caller buffer and one [`WireVersion`] per pass
//! - **Primitives**: [`Primitive`], [`Real`], [`Date`], [`Time`],
//!   [`DateTime`], [`Qos`], [`State`], [`Array`]
//! - **Containers**: `*Init` builders for encoding, decoded headers with
//!   `iter()` navigators, and the [`Payload`] sum type per entry
//! - **Set definitions**: [`LocalFieldSetDb`] / [`LocalElementSetDb`]
//!   for compact keyless entry lanes
//! - **Dictionary**: [`Dictionary`] with field, ripple and enum-display
//!   resolution
//!
//! ## Quick Start
//!
//! ```rust
//! use tickwire::{
//!     DecodeIterator, EncodeIterator, FieldEntry, FieldList, FieldListInit, Payload,
//!     Primitive, Real, RealHint, WIRE_VERSION,
//! };
//!
//! // Encode a field list: one uint, one priced real, one blank real.
//! let mut buf = [0u8; 128];
//! let mut enc = EncodeIterator::new(&mut buf, WIRE_VERSION)?;
//! FieldListInit::standard().encode_init(&mut enc, None)?;
//! FieldEntry::new(1).encode(&mut enc, &Primitive::UInt(64))?;
//! FieldEntry::new(6).encode(&mut enc, &Primitive::Real(Real::new(11, RealHint::ExponentNeg2)))?;
//! FieldEntry::new(7).encode_blank(&mut enc)?;
//! FieldListInit::encode_complete(&mut enc, true)?;
//! let bytes = enc.encoded().to_vec();
//!
//! // Decode it back; entries resolve lazily.
//! let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION)?;
//! let list = FieldList::decode(&mut dec, None)?;
//! let mut entries = list.iter();
//! while let Some(entry) = entries.next_entry() {
//!     let entry = entry?;
//!     println!("field {} -> {:?}", entry.field_id, entry.raw());
//! }
//! # Ok::<(), tickwire::CodecError>(())
//! ```
//!
//! ## Error posture
//!
//! Wire problems never panic. Structural damage fails the affected
//! container scope only ([`CodecError`]); per-entry conditions (unknown
//! field id, dictionary/wire type disagreement, corrupt nested payload)
//! surface as [`Payload::Error`] and iteration continues; API misuse is
//! a distinct [`UsageError`], reported at the violating call.
//!
//! ## Threading
//!
//! Iterators are single-threaded by design (one private cursor per
//! pass); the [`Dictionary`] and any process-global set databases are
//! immutable after build and safely shared across passes.

pub mod container;
pub mod dictionary;
pub mod error;
pub mod iter;
pub mod primitive;
pub mod rmtes;
pub mod set_def;
pub mod types;

pub use container::{
    ElementEntry, ElementEntryRef, ElementList, ElementListInit, ElementListIter, FieldEntry,
    FieldEntryRef, FieldList, FieldListInfo, FieldListInit, FieldListIter, FilterEntry,
    FilterEntryRef, FilterList, FilterListInit, FilterListIter, Map, MapEntry, MapEntryRef,
    MapInit, MapIter, Payload, Series, SeriesEntry, SeriesEntryRef, SeriesInit, SeriesIter,
    Vector, VectorEntry, VectorEntryRef, VectorInit, VectorIter,
};
pub use dictionary::{Dictionary, DictionaryBuilder, EnumDisplay, EnumTable, FieldDef};
pub use error::{CodecError, CodecResult, EntryError, UsageError};
pub use iter::{DecodeIterator, EncodeIterator};
pub use primitive::{
    status_code, Array, DataState, Date, DateTime, Primitive, Qos, QosRate, QosTimeliness, Real,
    RealHint, State, StreamState, Time,
};
pub use rmtes::{has_partial_updates, RmtesBuffer};
pub use set_def::{
    ElementSetDef, ElementSetEntry, FieldSetDef, FieldSetEntry, LocalElementSetDb,
    LocalFieldSetDb, MAX_LOCAL_SET_ID,
};
pub use types::{
    DataType, FilterAction, MapAction, VectorAction, WireVersion, MAX_NESTING_DEPTH, WIRE_VERSION,
};
