//! Primitive value model and codec.
//!
//! Standard-lane payloads are length-delimited byte runs: the run's extent
//! is known before the body is read, a zero-length run is the universal
//! Blank encoding, and every body decoder is total over its run (no body
//! read can escape it). Set-definition lanes trade the length away for
//! fixed widths; both lanes decode to the same [`Primitive`] values.

mod datetime;
mod qos;
mod real;
mod state;

pub use datetime::{
    Date, DateTime, Time, BLANK_HOUR, BLANK_MICRO_NANO, BLANK_MILLI, BLANK_MINUTE, BLANK_SECOND,
};
pub use qos::{Qos, QosRate, QosTimeliness};
pub use real::{Real, RealHint, REAL_BLANK_MARKER};
pub use state::{status_code, DataState, State, StreamState};

pub mod array;
pub use array::Array;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{CodecError, CodecResult, UsageError};
use crate::iter::EncodeIterator;
use crate::types::DataType;

/// Internal decode outcome for a malformed primitive body, refined by the
/// caller into a per-entry or fatal error depending on where it surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PrimitiveError {
    TooLong,
    TooShort,
    Malformed(&'static str),
}

impl PrimitiveError {
    pub(crate) fn into_codec_error(self) -> CodecError {
        match self {
            PrimitiveError::TooLong => CodecError::InvalidData {
                reason: "primitive body longer than its type allows",
            },
            PrimitiveError::TooShort => CodecError::InvalidData {
                reason: "primitive body shorter than its type requires",
            },
            PrimitiveError::Malformed(reason) => CodecError::InvalidData { reason },
        }
    }
}

/// A decoded or to-be-encoded primitive value. Byte-run variants borrow
/// from the wire buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Primitive<'a> {
    Int(i64),
    UInt(u64),
    Float(f32),
    Double(f64),
    Real(Real),
    Date(Date),
    Time(Time),
    DateTime(DateTime),
    Qos(Qos),
    State(State<'a>),
    Enum(u16),
    Buffer(&'a [u8]),
    Ascii(&'a [u8]),
    Utf8(&'a [u8]),
    Rmtes(&'a [u8]),
}

impl<'a> Primitive<'a> {
    pub fn data_type(&self) -> DataType {
        match self {
            Primitive::Int(_) => DataType::Int,
            Primitive::UInt(_) => DataType::UInt,
            Primitive::Float(_) => DataType::Float,
            Primitive::Double(_) => DataType::Double,
            Primitive::Real(_) => DataType::Real,
            Primitive::Date(_) => DataType::Date,
            Primitive::Time(_) => DataType::Time,
            Primitive::DateTime(_) => DataType::DateTime,
            Primitive::Qos(_) => DataType::Qos,
            Primitive::State(_) => DataType::State,
            Primitive::Enum(_) => DataType::Enum,
            Primitive::Buffer(_) => DataType::Buffer,
            Primitive::Ascii(_) => DataType::AsciiString,
            Primitive::Utf8(_) => DataType::Utf8String,
            Primitive::Rmtes(_) => DataType::RmtesString,
        }
    }

    /// Standard-lane body length.
    pub(crate) fn wire_len(&self) -> usize {
        match self {
            Primitive::Int(v) => int_wire_len(*v),
            Primitive::UInt(v) => uint_wire_len(*v),
            Primitive::Float(_) => 4,
            Primitive::Double(_) => 8,
            Primitive::Real(r) => {
                if r.hint.is_special() {
                    1
                } else {
                    1 + int_wire_len(r.mantissa)
                }
            }
            Primitive::Date(_) => 4,
            Primitive::Time(t) => t.wire_len(),
            Primitive::DateTime(dt) => 4 + dt.time.wire_len(),
            Primitive::Qos(q) => q.wire_len(),
            Primitive::State(s) => s.wire_len(),
            Primitive::Enum(v) => if *v < 0x100 { 1 } else { 2 },
            Primitive::Buffer(b)
            | Primitive::Ascii(b)
            | Primitive::Utf8(b)
            | Primitive::Rmtes(b) => b.len(),
        }
    }

    /// Writes the standard-lane body (no length prefix).
    pub(crate) fn encode_body(&self, iter: &mut EncodeIterator<'_>) -> CodecResult<()> {
        match self {
            Primitive::Int(v) => write_int(iter, *v, int_wire_len(*v)),
            Primitive::UInt(v) => write_uint(iter, *v, uint_wire_len(*v)),
            Primitive::Float(v) => iter.write_u32(v.to_bits()),
            Primitive::Double(v) => iter.write_u64(v.to_bits()),
            Primitive::Real(r) => {
                iter.write_u8(r.hint as u8)?;
                if !r.hint.is_special() {
                    write_int(iter, r.mantissa, int_wire_len(r.mantissa))?;
                }
                Ok(())
            }
            Primitive::Date(d) => {
                iter.write_u8(d.day)?;
                iter.write_u8(d.month)?;
                iter.write_u16(d.year)
            }
            Primitive::Time(t) => encode_time_body(iter, *t, t.wire_len()),
            Primitive::DateTime(dt) => {
                iter.write_u8(dt.date.day)?;
                iter.write_u8(dt.date.month)?;
                iter.write_u16(dt.date.year)?;
                encode_time_body(iter, dt.time, dt.time.wire_len())
            }
            Primitive::Qos(q) => {
                if q.timeliness == QosTimeliness::Unspecified || q.rate == QosRate::Unspecified {
                    return Err(UsageError::UnspecifiedQos.into());
                }
                let lead =
                    ((q.timeliness as u8) << 5) | ((q.rate as u8) << 1) | u8::from(q.dynamic);
                iter.write_u8(lead)?;
                if q.timeliness == QosTimeliness::Delayed {
                    iter.write_u16(q.time_info)?;
                }
                if q.rate == QosRate::TimeConflated {
                    iter.write_u16(q.rate_info)?;
                }
                Ok(())
            }
            Primitive::State(s) => {
                if s.stream_state == StreamState::Unspecified {
                    return Err(UsageError::UnspecifiedState.into());
                }
                iter.write_u8(((s.stream_state as u8) << 3) | s.data_state as u8)?;
                iter.write_u8(s.code)?;
                iter.write_buffer15(s.text)
            }
            Primitive::Enum(v) => write_uint(iter, *v as u64, if *v < 0x100 { 1 } else { 2 }),
            Primitive::Buffer(b)
            | Primitive::Ascii(b)
            | Primitive::Utf8(b)
            | Primitive::Rmtes(b) => iter.write_bytes(b),
        }
    }
}

/// Decodes a standard-lane body. `Ok(None)` is Blank: a zero-length run
/// for any type, or Real's dedicated blank pattern.
pub(crate) fn decode_body<'a>(
    data: &'a [u8],
    ty: DataType,
) -> Result<Option<Primitive<'a>>, PrimitiveError> {
    if data.is_empty() {
        return Ok(None);
    }
    match ty.base_type() {
        DataType::Int => {
            if data.len() > 8 {
                return Err(PrimitiveError::TooLong);
            }
            Ok(Some(Primitive::Int(read_int(data))))
        }
        DataType::UInt => {
            if data.len() > 8 {
                return Err(PrimitiveError::TooLong);
            }
            Ok(Some(Primitive::UInt(read_uint(data))))
        }
        DataType::Float => {
            if data.len() != 4 {
                return Err(length_error(data.len(), 4));
            }
            Ok(Some(Primitive::Float(f32::from_bits(BigEndian::read_u32(
                data,
            )))))
        }
        DataType::Double => {
            if data.len() != 8 {
                return Err(length_error(data.len(), 8));
            }
            Ok(Some(Primitive::Double(f64::from_bits(BigEndian::read_u64(
                data,
            )))))
        }
        DataType::Real => decode_real_body(data),
        DataType::Date => {
            if data.len() != 4 {
                return Err(length_error(data.len(), 4));
            }
            let date = Date {
                day: data[0],
                month: data[1],
                year: BigEndian::read_u16(&data[2..]),
            };
            Ok(if date.is_blank() {
                None
            } else {
                Some(Primitive::Date(date))
            })
        }
        DataType::Time => Ok(decode_time_body(data)?.map(Primitive::Time)),
        DataType::DateTime => {
            if !matches!(data.len(), 6 | 7 | 9 | 11 | 12) {
                return Err(PrimitiveError::Malformed("invalid datetime length"));
            }
            let date = Date {
                day: data[0],
                month: data[1],
                year: BigEndian::read_u16(&data[2..]),
            };
            let time = decode_time_body(&data[4..])?;
            match (date.is_blank(), time) {
                (true, None) => Ok(None),
                (_, time) => Ok(Some(Primitive::DateTime(DateTime {
                    date,
                    time: time.unwrap_or_else(Time::blank),
                }))),
            }
        }
        DataType::Qos => decode_qos_body(data),
        DataType::State => decode_state_body(data),
        DataType::Enum => {
            if data.len() > 2 {
                return Err(PrimitiveError::TooLong);
            }
            Ok(Some(Primitive::Enum(read_uint(data) as u16)))
        }
        DataType::Buffer => Ok(Some(Primitive::Buffer(data))),
        DataType::AsciiString => Ok(Some(Primitive::Ascii(data))),
        DataType::Utf8String => Ok(Some(Primitive::Utf8(data))),
        DataType::RmtesString => Ok(Some(Primitive::Rmtes(data))),
        _ => Err(PrimitiveError::Malformed("not a primitive type")),
    }
}

fn length_error(actual: usize, expected: usize) -> PrimitiveError {
    if actual > expected {
        PrimitiveError::TooLong
    } else {
        PrimitiveError::TooShort
    }
}

fn decode_real_body(data: &[u8]) -> Result<Option<Primitive<'static>>, PrimitiveError> {
    let lead = data[0];
    if lead == REAL_BLANK_MARKER {
        return Ok(None);
    }
    let hint = RealHint::try_from(lead & 0x3F)
        .map_err(|_| PrimitiveError::Malformed("reserved real hint"))?;
    if hint.is_special() {
        if data.len() != 1 {
            return Err(PrimitiveError::TooLong);
        }
        return Ok(Some(Primitive::Real(Real { mantissa: 0, hint })));
    }
    let mantissa = &data[1..];
    if mantissa.len() > 8 {
        return Err(PrimitiveError::TooLong);
    }
    Ok(Some(Primitive::Real(Real {
        mantissa: read_int(mantissa),
        hint,
    })))
}

fn decode_qos_body(data: &[u8]) -> Result<Option<Primitive<'static>>, PrimitiveError> {
    let lead = data[0];
    let timeliness = QosTimeliness::try_from(lead >> 5)
        .map_err(|_| PrimitiveError::Malformed("invalid qos timeliness"))?;
    let rate = QosRate::try_from((lead >> 1) & 0x0F)
        .map_err(|_| PrimitiveError::Malformed("invalid qos rate"))?;
    let mut qos = Qos {
        timeliness,
        rate,
        dynamic: lead & 0x01 != 0,
        time_info: 0,
        rate_info: 0,
    };
    let mut idx = 1;
    if timeliness == QosTimeliness::Delayed {
        qos.time_info = read_u16_at(data, &mut idx)?;
    }
    if rate == QosRate::TimeConflated {
        qos.rate_info = read_u16_at(data, &mut idx)?;
    }
    if idx != data.len() {
        return Err(PrimitiveError::TooLong);
    }
    Ok(Some(Primitive::Qos(qos)))
}

fn decode_state_body(data: &[u8]) -> Result<Option<Primitive<'_>>, PrimitiveError> {
    if data.len() < 3 {
        return Err(PrimitiveError::TooShort);
    }
    let lead = data[0];
    let stream_state = StreamState::try_from(lead >> 3)
        .map_err(|_| PrimitiveError::Malformed("invalid stream state"))?;
    let data_state = DataState::try_from(lead & 0x07)
        .map_err(|_| PrimitiveError::Malformed("invalid data state"))?;
    let code = data[1];
    let mut idx = 2;
    let text_len = read_u15rb_at(data, &mut idx)? as usize;
    if data.len() - idx < text_len {
        return Err(PrimitiveError::TooShort);
    }
    let text = &data[idx..idx + text_len];
    if idx + text_len != data.len() {
        return Err(PrimitiveError::TooLong);
    }
    Ok(Some(Primitive::State(State {
        stream_state,
        data_state,
        code,
        text,
    })))
}

/// Decodes a trailing-truncated time body; `None` is Blank. Present
/// leading sentinels make the omitted trailing components blank too.
pub(crate) fn decode_time_body(data: &[u8]) -> Result<Option<Time>, PrimitiveError> {
    if !matches!(data.len(), 2 | 3 | 5 | 7 | 8) {
        return Err(PrimitiveError::Malformed("invalid time length"));
    }
    let mut t = Time {
        hour: data[0],
        minute: data[1],
        ..Time::default()
    };
    let mut present_blank = t.hour == BLANK_HOUR && t.minute == BLANK_MINUTE;
    if data.len() >= 3 {
        t.second = data[2];
        present_blank &= t.second == BLANK_SECOND;
    }
    if data.len() >= 5 {
        t.millisecond = BigEndian::read_u16(&data[3..]);
        present_blank &= t.millisecond == BLANK_MILLI;
    }
    if data.len() == 7 {
        t.microsecond = BigEndian::read_u16(&data[5..]);
        present_blank &= t.microsecond == BLANK_MICRO_NANO;
    }
    if data.len() == 8 {
        let packed = BigEndian::read_u16(&data[5..]);
        t.microsecond = packed & 0x07FF;
        t.nanosecond = ((packed & 0x3800) >> 3) | data[7] as u16;
        present_blank &=
            t.microsecond == BLANK_MICRO_NANO && t.nanosecond == BLANK_MICRO_NANO;
    }
    if present_blank {
        return Ok(None);
    }
    Ok(Some(t))
}

pub(crate) fn encode_time_body(
    iter: &mut EncodeIterator<'_>,
    t: Time,
    len: usize,
) -> CodecResult<()> {
    iter.write_u8(t.hour)?;
    iter.write_u8(t.minute)?;
    if len >= 3 {
        iter.write_u8(t.second)?;
    }
    if len >= 5 {
        iter.write_u16(t.millisecond)?;
    }
    if len == 7 {
        iter.write_u16(t.microsecond)?;
    }
    if len == 8 {
        iter.write_u16(((t.nanosecond & 0xFF00) << 3) | t.microsecond)?;
        iter.write_u8(t.nanosecond as u8)?;
    }
    Ok(())
}

/// Smallest two's-complement width for `v`.
pub(crate) fn int_wire_len(v: i64) -> usize {
    let significant = if v < 0 { !v } else { v };
    let bits = 64 - significant.leading_zeros() as usize + 1;
    bits.div_ceil(8)
}

/// Smallest unsigned width for `v`, at least one byte.
pub(crate) fn uint_wire_len(v: u64) -> usize {
    let bits = 64 - v.leading_zeros() as usize;
    bits.div_ceil(8).max(1)
}

pub(crate) fn write_int(iter: &mut EncodeIterator<'_>, v: i64, len: usize) -> CodecResult<()> {
    let bytes = v.to_be_bytes();
    iter.write_bytes(&bytes[8 - len..])
}

pub(crate) fn write_uint(iter: &mut EncodeIterator<'_>, v: u64, len: usize) -> CodecResult<()> {
    let bytes = v.to_be_bytes();
    iter.write_bytes(&bytes[8 - len..])
}

/// Sign-extending read of a 1-8 byte two's-complement run.
pub(crate) fn read_int(data: &[u8]) -> i64 {
    debug_assert!(!data.is_empty() && data.len() <= 8);
    let mut v: i64 = if data[0] & 0x80 != 0 { -1 } else { 0 };
    for &b in data {
        v = (v << 8) | b as i64;
    }
    v
}

/// Zero-extending read of a 0-8 byte unsigned run.
pub(crate) fn read_uint(data: &[u8]) -> u64 {
    debug_assert!(data.len() <= 8);
    let mut v: u64 = 0;
    for &b in data {
        v = (v << 8) | b as u64;
    }
    v
}

fn read_u16_at(data: &[u8], idx: &mut usize) -> Result<u16, PrimitiveError> {
    if data.len() < *idx + 2 {
        return Err(PrimitiveError::TooShort);
    }
    let v = BigEndian::read_u16(&data[*idx..]);
    *idx += 2;
    Ok(v)
}

fn read_u15rb_at(data: &[u8], idx: &mut usize) -> Result<u16, PrimitiveError> {
    if data.len() <= *idx {
        return Err(PrimitiveError::TooShort);
    }
    let first = data[*idx];
    *idx += 1;
    if first & 0x80 == 0 {
        return Ok(first as u16);
    }
    if data.len() <= *idx {
        return Err(PrimitiveError::TooShort);
    }
    let second = data[*idx];
    *idx += 1;
    Ok((((first & 0x7F) as u16) << 8) | second as u16)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WIRE_VERSION;

    fn body_round_trip(p: Primitive<'_>) {
        let mut buf = [0u8; 64];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        p.encode_body(&mut it).unwrap();
        assert_eq!(it.encoded().len(), p.wire_len(), "wire_len mismatch for {p:?}");
        let encoded = it.encoded().to_vec();
        let decoded = decode_body(&encoded, p.data_type()).unwrap();
        assert_eq!(decoded, Some(p));
    }

    #[test]
    fn int_round_trips_extremes() {
        for v in [0i64, 1, -1, 127, 128, -128, -129, i64::MAX, i64::MIN, 0x1234_5678] {
            body_round_trip(Primitive::Int(v));
        }
        for v in [0u64, 255, 256, u64::MAX] {
            body_round_trip(Primitive::UInt(v));
        }
    }

    #[test]
    fn int_widths_are_minimal() {
        assert_eq!(int_wire_len(0), 1);
        assert_eq!(int_wire_len(127), 1);
        assert_eq!(int_wire_len(128), 2);
        assert_eq!(int_wire_len(-128), 1);
        assert_eq!(int_wire_len(-129), 2);
        assert_eq!(int_wire_len(i64::MIN), 8);
        assert_eq!(uint_wire_len(0), 1);
        assert_eq!(uint_wire_len(255), 1);
        assert_eq!(uint_wire_len(256), 2);
    }

    #[test]
    fn real_round_trips_every_hint() {
        for raw in (0u8..=30).chain(33..=35) {
            let hint = RealHint::try_from(raw).unwrap();
            let mantissa = if hint.is_special() { 0 } else { -123_456 };
            body_round_trip(Primitive::Real(Real { mantissa, hint }));
        }
    }

    #[test]
    fn real_blank_decodes_blank_not_zero() {
        assert_eq!(decode_body(&[REAL_BLANK_MARKER], DataType::Real).unwrap(), None);
        assert_eq!(decode_body(&[], DataType::Real).unwrap(), None);
        // Reserved hint 31 is a malformed body, not blank.
        assert!(decode_body(&[31], DataType::Real).is_err());
    }

    #[test]
    fn date_time_round_trip_and_blanks() {
        body_round_trip(Primitive::Date(Date::new(2026, 8, 7)));
        body_round_trip(Primitive::Time(Time::new(14, 30, 59, 999)));
        body_round_trip(Primitive::DateTime(DateTime::new(
            Date::new(2026, 8, 7),
            Time::new(14, 30, 59, 999),
        )));
        assert_eq!(decode_body(&[0, 0, 0, 0], DataType::Date).unwrap(), None);
        // Partially blank date survives as a value.
        let partial = decode_body(&[0, 3, 0x07, 0xEA], DataType::Date).unwrap();
        assert_eq!(partial, Some(Primitive::Date(Date { day: 0, month: 3, year: 2026 })));
    }

    #[test]
    fn blank_time_round_trips_through_full_form() {
        let mut buf = [0u8; 16];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        Primitive::Time(Time::blank()).encode_body(&mut it).unwrap();
        let encoded = it.encoded().to_vec();
        assert_eq!(decode_body(&encoded, DataType::Time).unwrap(), None);
    }

    #[test]
    fn truncated_time_forms_fill_zeros() {
        let t = decode_body(&[9, 30], DataType::Time).unwrap();
        assert_eq!(t, Some(Primitive::Time(Time::new(9, 30, 0, 0))));
        // Sentinel prefix with omitted tail decodes blank.
        assert_eq!(decode_body(&[255, 255], DataType::Time).unwrap(), None);
    }

    #[test]
    fn nano_packing_round_trips() {
        let mut t = Time::new(1, 2, 3, 4);
        t.microsecond = 2000;
        t.nanosecond = 1999;
        body_round_trip(Primitive::Time(t));
    }

    #[test]
    fn qos_and_state_round_trip() {
        body_round_trip(Primitive::Qos(Qos::realtime_tick_by_tick()));
        body_round_trip(Primitive::Qos(Qos {
            timeliness: QosTimeliness::Delayed,
            rate: QosRate::TimeConflated,
            dynamic: true,
            time_info: 5000,
            rate_info: 250,
        }));
        body_round_trip(Primitive::State(State {
            stream_state: StreamState::ClosedRecover,
            data_state: DataState::Suspect,
            code: status_code::TIMEOUT,
            text: b"source temporarily down",
        }));
    }

    #[test]
    fn unspecified_qos_rejected_on_encode() {
        let mut buf = [0u8; 16];
        let mut it = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
        let err = Primitive::Qos(Qos::default()).encode_body(&mut it).unwrap_err();
        assert!(matches!(err, CodecError::Usage(UsageError::UnspecifiedQos)));
    }

    #[test]
    fn enum_and_strings_round_trip() {
        body_round_trip(Primitive::Enum(0));
        body_round_trip(Primitive::Enum(2));
        body_round_trip(Primitive::Enum(65535));
        body_round_trip(Primitive::Ascii(b"TRDPRC_1"));
        body_round_trip(Primitive::Utf8("héllo".as_bytes()));
        body_round_trip(Primitive::Buffer(&[0x00, 0xFF, 0x7E]));
    }

    #[test]
    fn zero_length_run_is_blank_for_every_type() {
        for ty in [
            DataType::Int,
            DataType::AsciiString,
            DataType::Buffer,
            DataType::Qos,
            DataType::State,
        ] {
            assert_eq!(decode_body(b"", ty).unwrap(), None);
        }
    }

    #[test]
    fn oversize_int_reports_too_long() {
        let nine = [0u8; 9];
        assert_eq!(decode_body(&nine, DataType::Int).unwrap_err(), PrimitiveError::TooLong);
        assert_eq!(decode_body(&nine[..3], DataType::Enum).unwrap_err(), PrimitiveError::TooLong);
    }
}
