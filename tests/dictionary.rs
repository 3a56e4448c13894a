//! Dictionary-driven resolution through decode passes: unknown-key
//! tolerance, enum displays, ripple navigation.

use tickwire::{
    DataType, DecodeIterator, Dictionary, EncodeIterator, EntryError, EnumDisplay, FieldDef,
    FieldEntry, FieldList, FieldListInit, Payload, Primitive, WIRE_VERSION,
};

fn dictionary() -> Dictionary {
    Dictionary::builder()
        .dictionary_id(1)
        .field(FieldDef::new(1, "PROD_PERM", DataType::UInt))
        .field(FieldDef::new(4, "PRCTCK_1", DataType::Enum))
        .field(FieldDef::new(6, "TRDPRC_1", DataType::Real).rippling_to(7))
        .field(FieldDef::new(7, "TRDPRC_2", DataType::Real).rippling_to(8))
        .field(FieldDef::new(8, "TRDPRC_3", DataType::Real))
        .enum_table(&[4], [(0u16, " "), (1, "+"), (2, "-")])
        .build()
        .unwrap()
}

fn encode_list(entries: &[(i16, Option<Primitive<'_>>)]) -> Vec<u8> {
    let mut buf = vec![0u8; 256];
    let mut enc = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
    FieldListInit::standard().encode_init(&mut enc, None).unwrap();
    for (fid, value) in entries {
        match value {
            Some(v) => FieldEntry::new(*fid).encode(&mut enc, v).unwrap(),
            None => FieldEntry::new(*fid).encode_blank(&mut enc).unwrap(),
        }
    }
    FieldListInit::encode_complete(&mut enc, true).unwrap();
    enc.encoded().to_vec()
}

/// Unknown ids yield an Error entry and do not stop iteration.
#[test]
fn unknown_field_id_is_tolerated() {
    let dict = dictionary();
    let bytes = encode_list(&[
        (1, Some(Primitive::UInt(9))),
        (-32_000, Some(Primitive::UInt(1))),
        (4, Some(Primitive::Enum(1))),
    ]);
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();
    let mut nav = list.iter();

    assert!(!nav.next_entry().unwrap().unwrap().load().is_error());
    let unknown = nav.next_entry().unwrap().unwrap();
    assert!(matches!(
        unknown.load(),
        Payload::Error(EntryError::FieldIdNotFound(-32_000))
    ));
    assert!(unknown.name().is_none());
    // Iteration continues past the error entry.
    let tick = nav.next_entry().unwrap().unwrap();
    assert!(matches!(tick.load(), Payload::Primitive(Primitive::Enum(1))));
    assert!(nav.next_entry().is_none());
}

/// Blank enum: Blank display, never NotFound; unmapped enum: NotFound,
/// never Blank.
#[test]
fn enum_display_blank_vs_not_found() {
    let dict = dictionary();
    let bytes = encode_list(&[
        (4, Some(Primitive::Enum(2))),
        (4, Some(Primitive::Enum(999))),
        (4, None),
    ]);
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();
    let mut nav = list.iter();

    let mapped = nav.next_entry().unwrap().unwrap();
    assert_eq!(mapped.enum_display(), EnumDisplay::Display("-"));

    let unmapped = nav.next_entry().unwrap().unwrap();
    assert_eq!(unmapped.enum_display(), EnumDisplay::NotFound);
    assert!(!unmapped.load().is_blank());

    let blank = nav.next_entry().unwrap().unwrap();
    assert_eq!(blank.enum_display(), EnumDisplay::Blank);
    assert!(blank.load().is_blank());
}

/// Ripple links walk from an entry to its linked fields, ending silently.
#[test]
fn ripple_navigation_from_entries() {
    let dict = dictionary();
    let bytes = encode_list(&[(6, Some(Primitive::Real(tickwire::Real::new(1, tickwire::RealHint::Exponent0))))]);
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();
    let entry = list.iter().next_entry().unwrap().unwrap();

    assert_eq!(entry.name(), Some("TRDPRC_1"));
    assert_eq!(entry.ripple(1).unwrap().name, "TRDPRC_2");
    assert_eq!(entry.ripple(2).unwrap().name, "TRDPRC_3");
    assert!(entry.ripple(3).is_none());
}

/// Dictionary/wire type disagreement is a distinct per-entry error with a
/// long/short direction.
#[test]
fn wire_length_disagreement_reported_per_entry() {
    let dict = Dictionary::builder()
        .field(FieldDef::new(16, "TRADE_DATE", DataType::Date))
        .build()
        .unwrap();
    // Encoded as a 6-byte buffer, but the dictionary says Date (4 bytes).
    let bytes = encode_list(&[(16, Some(Primitive::Buffer(&[1, 2, 3, 4, 5, 6])))]);
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();
    let entry = list.iter().next_entry().unwrap().unwrap();
    assert!(matches!(
        entry.load(),
        Payload::Error(EntryError::ValueTooLong {
            expected: DataType::Date,
            actual: 6
        })
    ));

    // Short direction, distinctly.
    let bytes = encode_list(&[(16, Some(Primitive::Buffer(&[1, 2])))]);
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();
    let entry = list.iter().next_entry().unwrap().unwrap();
    assert!(matches!(
        entry.load(),
        Payload::Error(EntryError::ValueTooShort {
            expected: DataType::Date,
            actual: 2
        })
    ));
}

/// Decoding fields without any dictionary is a per-entry condition.
#[test]
fn missing_dictionary_is_per_entry() {
    let bytes = encode_list(&[(1, Some(Primitive::UInt(1)))]);
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    let list = FieldList::decode(&mut dec, None).unwrap();
    let entry = list.iter().next_entry().unwrap().unwrap();
    assert!(matches!(entry.load(), Payload::Error(EntryError::NoDictionary)));
}
