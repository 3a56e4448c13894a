//! Set definitions: pre-declared (key, type) schemas enabling keyless
//! entry encoding.
//!
//! A definition lives in a database scoped either to one message (decoded
//! out of a container header's set-defs buffer) or to the whole session
//! (attached to the iterator by the caller). Local set ids run 0-15;
//! redefining an id within one scope is rejected.

use crate::error::{CodecError, CodecResult, UsageError};
use crate::iter::{DecodeIterator, EncodeIterator};
use crate::primitive::{
    decode_body, decode_time_body, encode_time_body, int_wire_len, read_int, read_uint,
    uint_wire_len, write_int, write_uint, Date, DateTime, Primitive, Real, RealHint, Time,
    REAL_BLANK_MARKER,
};
use crate::types::DataType;

/// Largest set id a local database may hold.
pub const MAX_LOCAL_SET_ID: u16 = 15;

/// One slot of a field set definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldSetEntry {
    pub field_id: i16,
    pub data_type: DataType,
}

/// Ordered field slots referenced by a set id.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct FieldSetDef {
    pub set_id: u16,
    pub entries: Vec<FieldSetEntry>,
}

/// One slot of an element set definition.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementSetEntry {
    pub name: Vec<u8>,
    pub data_type: DataType,
}

/// Ordered element slots referenced by a set id.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ElementSetDef {
    pub set_id: u16,
    pub entries: Vec<ElementSetEntry>,
}

fn check_slot_type(ty: DataType) -> CodecResult<()> {
    if ty.is_container() || ty == DataType::Unknown {
        return Err(CodecError::InvalidData {
            reason: "set definition slots must be primitive-typed",
        });
    }
    Ok(())
}

macro_rules! set_db {
    ($db:ident, $def:ty, $decode_entry:expr, $encode_entry:expr) => {
        #[derive(Debug, Clone, Default)]
        pub struct $db {
            defs: Vec<$def>,
        }

        impl $db {
            pub fn new() -> Self {
                Self::default()
            }

            /// Registers a definition. Fails if the id is out of local
            /// range or already defined in this scope.
            pub fn define(&mut self, def: $def) -> CodecResult<()> {
                if def.set_id > MAX_LOCAL_SET_ID {
                    return Err(CodecError::IllegalSetId(def.set_id));
                }
                if self.get(def.set_id).is_some() {
                    return Err(CodecError::DuplicateSetId(def.set_id));
                }
                for entry in &def.entries {
                    check_slot_type(entry.data_type)?;
                }
                self.defs.push(def);
                Ok(())
            }

            pub fn get(&self, set_id: u16) -> Option<&$def> {
                self.defs.iter().find(|d| d.set_id == set_id)
            }

            pub fn is_empty(&self) -> bool {
                self.defs.is_empty()
            }

            /// Decodes a database from a container header's set-defs
            /// buffer.
            pub fn decode(iter: &mut DecodeIterator<'_>) -> CodecResult<Self> {
                let _flags = iter.read_u8()?;
                let count = iter.read_u8()?;
                if count as u16 > MAX_LOCAL_SET_ID {
                    return Err(CodecError::TooManySets(count));
                }
                let mut db = Self::new();
                for _ in 0..count {
                    let set_id = iter.read_u15rb()?;
                    if set_id > MAX_LOCAL_SET_ID {
                        return Err(CodecError::IllegalSetId(set_id));
                    }
                    if db.get(set_id).is_some() {
                        return Err(CodecError::DuplicateSetId(set_id));
                    }
                    let entry_count = iter.read_u8()?;
                    let mut entries = Vec::with_capacity(entry_count as usize);
                    for _ in 0..entry_count {
                        entries.push($decode_entry(iter)?);
                    }
                    db.defs.push(<$def>::new_raw(set_id, entries));
                }
                tracing::debug!(sets = db.defs.len(), "decoded local set-definition database");
                Ok(db)
            }

            /// Encodes the database into a container header's set-defs
            /// buffer.
            pub fn encode(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
                iter.write_u8(0)?; // flags, reserved
                iter.write_u8(self.defs.len() as u8)?;
                for def in &self.defs {
                    iter.write_u15rb(def.set_id)?;
                    iter.write_u8(def.entries.len() as u8)?;
                    for entry in &def.entries {
                        $encode_entry(iter, entry)?;
                    }
                }
                Ok(())
            }
        }
    };
}

impl FieldSetDef {
    pub fn new(set_id: u16, entries: Vec<FieldSetEntry>) -> Self {
        FieldSetDef { set_id, entries }
    }

    fn new_raw(set_id: u16, entries: Vec<FieldSetEntry>) -> Self {
        FieldSetDef { set_id, entries }
    }
}

impl ElementSetDef {
    pub fn new(set_id: u16, entries: Vec<ElementSetEntry>) -> Self {
        ElementSetDef { set_id, entries }
    }

    fn new_raw(set_id: u16, entries: Vec<ElementSetEntry>) -> Self {
        ElementSetDef { set_id, entries }
    }
}

fn decode_field_slot(iter: &mut DecodeIterator<'_>) -> CodecResult<FieldSetEntry> {
    let field_id = iter.read_i16()?;
    let raw = iter.read_u8()?;
    let data_type = DataType::try_from(raw).map_err(|_| CodecError::UnknownType(raw))?;
    check_slot_type(data_type)?;
    Ok(FieldSetEntry {
        field_id,
        data_type,
    })
}

fn encode_field_slot(iter: &mut EncodeIterator<'_>, entry: &FieldSetEntry) -> CodecResult<()> {
    iter.write_i16(entry.field_id)?;
    iter.write_u8(entry.data_type as u8)
}

fn decode_element_slot(iter: &mut DecodeIterator<'_>) -> CodecResult<ElementSetEntry> {
    let name = iter.read_buffer15()?.to_vec();
    let raw = iter.read_u8()?;
    let data_type = DataType::try_from(raw).map_err(|_| CodecError::UnknownType(raw))?;
    check_slot_type(data_type)?;
    Ok(ElementSetEntry { name, data_type })
}

fn encode_element_slot(iter: &mut EncodeIterator<'_>, entry: &ElementSetEntry) -> CodecResult<()> {
    iter.write_buffer15(&entry.name)?;
    iter.write_u8(entry.data_type as u8)
}

set_db!(LocalFieldSetDb, FieldSetDef, decode_field_slot, encode_field_slot);
set_db!(
    LocalElementSetDb,
    ElementSetDef,
    decode_element_slot,
    encode_element_slot
);

/// Encodes one set-lane value for slot type `ty`.
pub(crate) fn encode_set_value(
    iter: &mut EncodeIterator<'_>,
    ty: DataType,
    value: &Primitive<'_>,
) -> CodecResult<()> {
    if value.data_type() != ty.base_type() {
        return Err(UsageError::PrimitiveTypeMismatch {
            declared: ty,
            supplied: value.data_type(),
        }
        .into());
    }
    match (ty, value) {
        (DataType::Int1, Primitive::Int(v))
        | (DataType::Int2, Primitive::Int(v))
        | (DataType::Int4, Primitive::Int(v))
        | (DataType::Int8, Primitive::Int(v)) => {
            let width = ty.fixed_width().expect("int variant has a width");
            if int_wire_len(*v) > width {
                return Err(CodecError::InvalidData {
                    reason: "integer does not fit the set-lane width",
                });
            }
            write_int(iter, *v, width)
        }
        (DataType::UInt1, Primitive::UInt(v))
        | (DataType::UInt2, Primitive::UInt(v))
        | (DataType::UInt4, Primitive::UInt(v))
        | (DataType::UInt8, Primitive::UInt(v)) => {
            let width = ty.fixed_width().expect("uint variant has a width");
            if uint_wire_len(*v) > width {
                return Err(CodecError::InvalidData {
                    reason: "integer does not fit the set-lane width",
                });
            }
            write_uint(iter, *v, width)
        }
        (DataType::Float4, Primitive::Float(v)) => iter.write_u32(v.to_bits()),
        (DataType::Double8, Primitive::Double(v)) => iter.write_u64(v.to_bits()),
        (DataType::Date4, Primitive::Date(d)) => {
            iter.write_u8(d.day)?;
            iter.write_u8(d.month)?;
            iter.write_u16(d.year)
        }
        (DataType::Time3, Primitive::Time(t)) | (DataType::Time5, Primitive::Time(t)) => {
            let width = ty.fixed_width().expect("time variant has a width");
            if !t.is_blank() && t.wire_len() > width {
                return Err(CodecError::InvalidData {
                    reason: "time precision does not fit the set-lane width",
                });
            }
            encode_time_body(iter, *t, width)
        }
        (DataType::DateTime7, Primitive::DateTime(dt))
        | (DataType::DateTime9, Primitive::DateTime(dt)) => {
            let width = ty.fixed_width().expect("datetime variant has a width") - 4;
            if !dt.time.is_blank() && dt.time.wire_len() > width {
                return Err(CodecError::InvalidData {
                    reason: "time precision does not fit the set-lane width",
                });
            }
            iter.write_u8(dt.date.day)?;
            iter.write_u8(dt.date.month)?;
            iter.write_u16(dt.date.year)?;
            encode_time_body(iter, dt.time, width)
        }
        (DataType::Real4RB, Primitive::Real(r)) => encode_real_rb(iter, *r, 1),
        (DataType::Real8RB, Primitive::Real(r)) => encode_real_rb(iter, *r, 2),
        // Base-typed slots stay length-prefixed, just keyless.
        _ => {
            iter.write_u16ob(value.wire_len() as u16)?;
            value.encode_body(iter)
        }
    }
}

/// Encodes a blank set-lane value where the slot type has a blank form.
pub(crate) fn encode_set_blank(iter: &mut EncodeIterator<'_>, ty: DataType) -> CodecResult<()> {
    match ty {
        DataType::Real4RB | DataType::Real8RB => iter.write_u8(REAL_BLANK_MARKER),
        DataType::Date4 => iter.write_bytes(&[0, 0, 0, 0]),
        DataType::Time3 => encode_time_body(iter, Time::blank(), 3),
        DataType::Time5 => encode_time_body(iter, Time::blank(), 5),
        DataType::DateTime7 | DataType::DateTime9 => encode_set_value(
            iter,
            ty,
            &Primitive::DateTime(DateTime::blank()),
        ),
        ty if ty.fixed_width().is_some() => Err(CodecError::InvalidData {
            reason: "slot type has no blank set-lane form",
        }),
        _ => iter.write_u16ob(0),
    }
}

/// Decodes one set-lane value; `Ok(None)` is Blank.
pub(crate) fn decode_set_value<'a>(
    cursor: &mut DecodeIterator<'a>,
    ty: DataType,
) -> CodecResult<Option<Primitive<'a>>> {
    match ty {
        DataType::Int1 | DataType::Int2 | DataType::Int4 | DataType::Int8 => {
            let data = cursor.read_bytes(ty.fixed_width().expect("fixed"))?;
            Ok(Some(Primitive::Int(read_int(data))))
        }
        DataType::UInt1 | DataType::UInt2 | DataType::UInt4 | DataType::UInt8 => {
            let data = cursor.read_bytes(ty.fixed_width().expect("fixed"))?;
            Ok(Some(Primitive::UInt(read_uint(data))))
        }
        DataType::Float4 => Ok(Some(Primitive::Float(f32::from_bits(cursor.read_u32()?)))),
        DataType::Double8 => Ok(Some(Primitive::Double(f64::from_bits(cursor.read_u64()?)))),
        DataType::Date4 => {
            let data = cursor.read_bytes(4)?;
            let date = Date {
                day: data[0],
                month: data[1],
                year: u16::from_be_bytes([data[2], data[3]]),
            };
            Ok(if date.is_blank() {
                None
            } else {
                Some(Primitive::Date(date))
            })
        }
        DataType::Time3 | DataType::Time5 => {
            let data = cursor.read_bytes(ty.fixed_width().expect("fixed"))?;
            Ok(decode_time_body(data)
                .map_err(|e| e.into_codec_error())?
                .map(Primitive::Time))
        }
        DataType::DateTime7 | DataType::DateTime9 => {
            let data = cursor.read_bytes(ty.fixed_width().expect("fixed"))?;
            let date = Date {
                day: data[0],
                month: data[1],
                year: u16::from_be_bytes([data[2], data[3]]),
            };
            let time = decode_time_body(&data[4..]).map_err(|e| e.into_codec_error())?;
            match (date.is_blank(), time) {
                (true, None) => Ok(None),
                (_, time) => Ok(Some(Primitive::DateTime(DateTime {
                    date,
                    time: time.unwrap_or_else(Time::blank),
                }))),
            }
        }
        DataType::Real4RB => decode_real_rb(cursor, 1),
        DataType::Real8RB => decode_real_rb(cursor, 2),
        _ => {
            let run = cursor.read_buffer16()?;
            decode_body(run, ty).map_err(|e| e.into_codec_error())
        }
    }
}

/// Real reserved-bit form: lead byte is `(length class << 6) | hint`, the
/// mantissa follows in `(class + 1) * scale` bytes. Blank is the bare
/// 0x20 marker.
fn encode_real_rb(iter: &mut EncodeIterator<'_>, r: Real, scale: usize) -> CodecResult<()> {
    if r.hint.is_special() {
        return iter.write_u8(r.hint as u8);
    }
    let need = int_wire_len(r.mantissa);
    let mut class = 0usize;
    while (class + 1) * scale < need {
        class += 1;
    }
    if class > 3 {
        return Err(CodecError::InvalidData {
            reason: "mantissa does not fit the set-lane width",
        });
    }
    iter.write_u8(((class as u8) << 6) | r.hint as u8)?;
    write_int(iter, r.mantissa, (class + 1) * scale)
}

fn decode_real_rb<'a>(
    cursor: &mut DecodeIterator<'a>,
    scale: usize,
) -> CodecResult<Option<Primitive<'a>>> {
    let lead = cursor.read_u8()?;
    if lead == REAL_BLANK_MARKER {
        return Ok(None);
    }
    let hint = RealHint::try_from(lead & 0x3F).map_err(|_| CodecError::InvalidData {
        reason: "reserved real hint",
    })?;
    if hint.is_special() {
        return Ok(Some(Primitive::Real(Real { mantissa: 0, hint })));
    }
    let width = ((lead >> 6) as usize + 1) * scale;
    let mantissa = read_int(cursor.read_bytes(width)?);
    Ok(Some(Primitive::Real(Real { mantissa, hint })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WIRE_VERSION;

    fn field_def() -> FieldSetDef {
        FieldSetDef::new(
            3,
            vec![
                FieldSetEntry {
                    field_id: 22,
                    data_type: DataType::Real8RB,
                },
                FieldSetEntry {
                    field_id: 25,
                    data_type: DataType::UInt4,
                },
            ],
        )
    }

    #[test]
    fn define_rejects_duplicates_and_large_ids() {
        let mut db = LocalFieldSetDb::new();
        db.define(field_def()).unwrap();
        assert_eq!(db.define(field_def()), Err(CodecError::DuplicateSetId(3)));
        let mut big = field_def();
        big.set_id = 16;
        assert_eq!(db.define(big), Err(CodecError::IllegalSetId(16)));
    }

    #[test]
    fn db_round_trips_on_the_wire() {
        let mut db = LocalFieldSetDb::new();
        db.define(field_def()).unwrap();
        let mut buf = [0u8; 64];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        db.encode(&mut it).unwrap();
        let encoded = it.encoded().to_vec();
        let mut rd = DecodeIterator::new(&encoded, WIRE_VERSION).unwrap();
        let decoded = LocalFieldSetDb::decode(&mut rd).unwrap();
        assert_eq!(decoded.get(3), Some(&field_def()));
        assert!(decoded.get(4).is_none());
    }

    #[test]
    fn element_db_round_trips() {
        let mut db = LocalElementSetDb::new();
        db.define(ElementSetDef::new(
            0,
            vec![ElementSetEntry {
                name: b"BID".to_vec(),
                data_type: DataType::Real,
            }],
        ))
        .unwrap();
        let mut buf = [0u8; 64];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        db.encode(&mut it).unwrap();
        let encoded = it.encoded().to_vec();
        let mut rd = DecodeIterator::new(&encoded, WIRE_VERSION).unwrap();
        let decoded = LocalElementSetDb::decode(&mut rd).unwrap();
        assert_eq!(decoded.get(0).unwrap().entries[0].name, b"BID");
    }

    #[test]
    fn container_typed_slots_rejected() {
        let mut db = LocalFieldSetDb::new();
        let err = db
            .define(FieldSetDef::new(
                1,
                vec![FieldSetEntry {
                    field_id: 1,
                    data_type: DataType::Map,
                }],
            ))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidData { .. }));
    }

    fn lane_round_trip(ty: DataType, value: Primitive<'static>) {
        let mut buf = [0u8; 32];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        encode_set_value(&mut it, ty, &value).unwrap();
        let encoded = it.encoded().to_vec();
        let mut rd = DecodeIterator::new(&encoded, WIRE_VERSION).unwrap();
        assert_eq!(decode_set_value(&mut rd, ty).unwrap(), Some(value));
        assert_eq!(rd.remaining(), 0, "lane for {ty:?} left bytes behind");
    }

    #[test]
    fn fixed_lanes_round_trip() {
        lane_round_trip(DataType::Int1, Primitive::Int(-5));
        lane_round_trip(DataType::Int4, Primitive::Int(-70_000));
        lane_round_trip(DataType::UInt8, Primitive::UInt(u64::MAX));
        lane_round_trip(DataType::Float4, Primitive::Float(1.5));
        lane_round_trip(DataType::Double8, Primitive::Double(-0.25));
        lane_round_trip(DataType::Date4, Primitive::Date(Date::new(2026, 8, 7)));
        lane_round_trip(DataType::Time5, Primitive::Time(Time::new(23, 59, 59, 999)));
        lane_round_trip(
            DataType::Real8RB,
            Primitive::Real(Real::new(i64::MAX / 2, RealHint::ExponentNeg2)),
        );
        lane_round_trip(
            DataType::Real4RB,
            Primitive::Real(Real::new(11, RealHint::ExponentNeg2)),
        );
        // Base-typed slot falls back to the keyless standard form.
        lane_round_trip(DataType::Int, Primitive::Int(i64::MIN));
        lane_round_trip(DataType::AsciiString, Primitive::Ascii(b"IBM.N"));
    }

    #[test]
    fn real_rb_blank_round_trips_in_both_widths() {
        for ty in [DataType::Real4RB, DataType::Real8RB] {
            let mut buf = [0u8; 8];
            let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
            encode_set_blank(&mut it, ty).unwrap();
            let encoded = it.encoded().to_vec();
            assert_eq!(encoded, [REAL_BLANK_MARKER]);
            let mut rd = DecodeIterator::new(&encoded, WIRE_VERSION).unwrap();
            assert_eq!(decode_set_value(&mut rd, ty).unwrap(), None);
        }
    }

    #[test]
    fn int_lane_without_blank_form_rejects_blank() {
        let mut buf = [0u8; 8];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        assert!(encode_set_blank(&mut it, DataType::Int4).is_err());
        // The variable lane keeps the universal zero-length blank.
        encode_set_blank(&mut it, DataType::Int).unwrap();
    }

    #[test]
    fn oversize_value_rejected_for_narrow_lane() {
        let mut buf = [0u8; 8];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        let err = encode_set_value(&mut it, DataType::Int1, &Primitive::Int(300)).unwrap_err();
        assert!(matches!(err, CodecError::InvalidData { .. }));
        let err =
            encode_set_value(&mut it, DataType::UInt2, &Primitive::Int(1)).unwrap_err();
        assert!(matches!(err, CodecError::Usage(_)));
    }
}
