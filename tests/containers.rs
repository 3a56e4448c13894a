//! Cross-container integration: nesting, re-navigation, corruption
//! containment, rollback.

use tickwire::{
    DataType, DecodeIterator, Dictionary, EncodeIterator, FieldDef, FieldEntry, FieldList,
    FieldListInit, Map, MapAction, MapEntry, MapInit, Payload, Primitive, WIRE_VERSION,
};

fn dictionary() -> Dictionary {
    Dictionary::builder()
        .field(FieldDef::new(1, "PROD_PERM", DataType::UInt))
        .field(FieldDef::new(22, "BID", DataType::Real))
        .field(FieldDef::new(1021, "SEQNUM", DataType::UInt))
        .build()
        .unwrap()
}

/// Field list -> map entry -> field list, two levels deep.
fn nested_bytes() -> Vec<u8> {
    let mut buf = vec![0u8; 1024];
    let mut enc = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
    FieldListInit::standard().encode_init(&mut enc, None).unwrap();
    FieldEntry::new(1).encode(&mut enc, &Primitive::UInt(7)).unwrap();

    // Field 1021 carries a map of field lists. The dictionary is only
    // consulted on decode; the encoder trusts the caller's structure.
    FieldEntry::new(1021).encode_init(&mut enc, 128).unwrap();
    MapInit::new(DataType::AsciiString, DataType::FieldList)
        .encode_init(&mut enc, None, None)
        .unwrap();
    MapEntry::new(MapAction::Add, Primitive::Ascii(b"EUR="))
        .encode_init(&mut enc, 64)
        .unwrap();
    FieldListInit::standard().encode_init(&mut enc, None).unwrap();
    FieldEntry::new(22)
        .encode(&mut enc, &Primitive::Real(tickwire::Real::new(10825, tickwire::RealHint::ExponentNeg4)))
        .unwrap();
    FieldListInit::encode_complete(&mut enc, true).unwrap();
    MapEntry::encode_complete(&mut enc, true).unwrap();
    MapInit::encode_complete(&mut enc, true).unwrap();
    FieldEntry::encode_complete(&mut enc, true).unwrap();

    FieldListInit::encode_complete(&mut enc, true).unwrap();
    enc.encoded().to_vec()
}

#[test]
fn two_level_nesting_preserves_everything() {
    // The nested map travels under a field whose dictionary type must say
    // Map for the navigator to expose it as one.
    let dict = Dictionary::builder()
        .field(FieldDef::new(1, "PROD_PERM", DataType::UInt))
        .field(FieldDef::new(22, "BID", DataType::Real))
        .field(FieldDef::new(1021, "BOOK", DataType::Map))
        .build()
        .unwrap();
    let bytes = nested_bytes();
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();
    let mut nav = list.iter();

    let plain = nav.next_entry().unwrap().unwrap();
    assert!(matches!(plain.load(), Payload::Primitive(Primitive::UInt(7))));

    let nested = nav.next_entry().unwrap().unwrap();
    assert_eq!(nested.data_type(), DataType::Map);
    let Payload::Map(map) = nested.load() else {
        panic!("outer entry must expose a Map load");
    };
    assert_eq!(map.container_type, DataType::FieldList);
    let mut map_nav = map.iter();
    let map_entry = map_nav.next_entry().unwrap().unwrap();
    assert!(matches!(map_entry.key(), Ok(Some(Primitive::Ascii(b"EUR=")))));
    let Payload::FieldList(inner) = map_entry.load() else {
        panic!("map entry must expose a FieldList load");
    };
    let mut inner_nav = inner.iter();
    let price = inner_nav.next_entry().unwrap().unwrap();
    assert_eq!(price.field_id, 22);
    match price.load() {
        Payload::Primitive(Primitive::Real(r)) => assert_eq!(r.mantissa, 10825),
        other => panic!("expected real, got {other:?}"),
    }
    assert!(inner_nav.next_entry().is_none());
}

#[test]
fn renavigation_is_idempotent() {
    let bytes = nested_bytes();
    let dict = dictionary();
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();

    let collect = |nav: &mut tickwire::FieldListIter<'_, '_>| {
        let mut seen = Vec::new();
        while let Some(e) = nav.next_entry() {
            let e = e.unwrap();
            seen.push((e.field_id, e.raw().to_vec()));
        }
        seen
    };

    let mut nav = list.iter();
    let first = collect(&mut nav);
    nav.reset();
    let second = collect(&mut nav);
    let third = collect(&mut list.iter());
    assert_eq!(first, second);
    assert_eq!(first, third);
    assert_eq!(first.len(), 2);
}

#[test]
fn corruption_inside_nested_entry_is_contained() {
    let dict = Dictionary::builder()
        .field(FieldDef::new(1, "PROD_PERM", DataType::UInt))
        .field(FieldDef::new(1021, "BOOK", DataType::Map))
        .build()
        .unwrap();
    let mut bytes = nested_bytes();

    // Locate the nested map payload by decoding once, then smash its
    // container-type byte (offset 2 inside the payload: flags, key type,
    // container type). Entry framing stays intact.
    let map_payload_offset = {
        let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
        let list = FieldList::decode(&mut dec, None).unwrap();
        let mut nav = list.iter();
        nav.next_entry().unwrap().unwrap();
        let nested = nav.next_entry().unwrap().unwrap();
        nested.raw().as_ptr() as usize - bytes.as_ptr() as usize
    };
    bytes[map_payload_offset + 2] ^= 0xA5;

    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    dec.set_dictionary(&dict);
    let list = FieldList::decode(&mut dec, None).unwrap();
    let mut nav = list.iter();

    // First sibling is untouched.
    let plain = nav.next_entry().unwrap().unwrap();
    assert!(matches!(plain.load(), Payload::Primitive(Primitive::UInt(7))));

    // Second entry still frames; its load is a per-entry error of some
    // kind (which byte the corruption lands on decides the kind), never a
    // panic, and never a hard failure of the outer list.
    let nested = nav.next_entry().unwrap().unwrap();
    match nested.load() {
        Payload::Error(_) => {}
        Payload::Map(map) => {
            // Corruption may land past the header; the map must then fail
            // at entry level instead.
            let mut map_nav = map.iter();
            let mut saw_failure = false;
            while let Some(e) = map_nav.next_entry() {
                match e {
                    Ok(entry) => {
                        if entry.load().is_error() {
                            saw_failure = true;
                        }
                    }
                    Err(_) => saw_failure = true,
                }
            }
            assert!(saw_failure, "corruption vanished");
        }
        other => panic!("corrupted entry decoded cleanly: {other:?}"),
    }
    assert!(nav.next_entry().is_none());
}

#[test]
fn rollback_leaves_committed_prefix_intact() {
    let mut buf = vec![0u8; 512];
    let mut enc = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
    FieldListInit::standard().encode_init(&mut enc, None).unwrap();
    FieldEntry::new(1).encode(&mut enc, &Primitive::UInt(1)).unwrap();
    let committed = enc.encoded().to_vec();

    // Open an entry, nest a map, write into it, then abandon everything.
    FieldEntry::new(2).encode_init(&mut enc, 64).unwrap();
    MapInit::new(DataType::UInt, DataType::FieldList)
        .encode_init(&mut enc, None, None)
        .unwrap();
    MapEntry::new(MapAction::Add, Primitive::UInt(5))
        .encode_init(&mut enc, 16)
        .unwrap();
    FieldListInit::standard().encode_init(&mut enc, None).unwrap();
    FieldEntry::new(3).encode(&mut enc, &Primitive::UInt(3)).unwrap();
    FieldListInit::encode_complete(&mut enc, false).unwrap();
    MapEntry::encode_complete(&mut enc, false).unwrap();
    MapInit::encode_complete(&mut enc, false).unwrap();
    FieldEntry::encode_complete(&mut enc, false).unwrap();

    assert_eq!(enc.encoded(), &committed[..], "rollback must restore the exact prefix");

    FieldListInit::encode_complete(&mut enc, true).unwrap();
    let bytes = enc.encoded().to_vec();
    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    let list = FieldList::decode(&mut dec, None).unwrap();
    assert_eq!(list.count(), 1);
}

#[test]
fn deep_nesting_hits_the_level_limit() {
    let mut buf = vec![0u8; 4096];
    let mut enc = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
    let mut depth = 0usize;
    let result: Result<(), _> = loop {
        match FieldListInit::standard().encode_init(&mut enc, None) {
            Ok(()) => {
                depth += 1;
                match FieldEntry::new(1).encode_init(&mut enc, 512) {
                    Ok(()) => {}
                    Err(e) => break Err(e),
                }
            }
            Err(e) => break Err(e),
        }
    };
    assert!(matches!(result, Err(tickwire::CodecError::NestingTooDeep { .. })));
    assert_eq!(depth, tickwire::MAX_NESTING_DEPTH);
}

#[test]
fn empty_nested_payload_is_an_empty_container() {
    let mut buf = vec![0u8; 128];
    let mut enc = EncodeIterator::new(&mut buf, WIRE_VERSION).unwrap();
    MapInit::new(DataType::UInt, DataType::FieldList)
        .encode_init(&mut enc, None, None)
        .unwrap();
    MapEntry::new(MapAction::Add, Primitive::UInt(1))
        .encode_init(&mut enc, 0)
        .unwrap();
    MapEntry::encode_complete(&mut enc, true).unwrap();
    MapInit::encode_complete(&mut enc, true).unwrap();
    let bytes = enc.encoded().to_vec();

    let mut dec = DecodeIterator::new(&bytes, WIRE_VERSION).unwrap();
    let map = Map::decode(&mut dec).unwrap();
    let entry = map.iter().next_entry().unwrap().unwrap();
    let Payload::FieldList(inner) = entry.load() else {
        panic!("expected an (empty) field list");
    };
    assert_eq!(inner.count(), 0);
}
