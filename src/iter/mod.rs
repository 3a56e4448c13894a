//! Buffer/iterator resources.
//!
//! An iterator binds exactly one caller-supplied buffer and one wire
//! version for its lifetime. The encode side owns a level stack enforcing
//! init/complete nesting with checkpoint rollback; the decode side is a
//! bounds-checked cursor that derives byte-bounded sub-cursors for
//! recursive descent into nested payloads.

mod decode;
mod encode;

pub use decode::{DecodeContext, DecodeIterator};
pub use encode::EncodeIterator;
pub(crate) use encode::{EncSetDef, EncodeLevel, EncodeState, Mark15, Mark16};
