//! String2Id / Id2String against the voice fixtures.

mod common;

use common::{voice_fixture, voice_meta};
use ttscart::compat::{
    filter_questions, id_to_string, string_to_id, FeatureCodecRegistry, PhoneTable,
};
use ttscart::io::text::{read_text_file, write_text_file};
use ttscart::MetaCart;

fn registry() -> FeatureCodecRegistry {
    FeatureCodecRegistry::with_defaults(&PhoneTable::load(voice_fixture("phones.txt")).unwrap())
}

#[test]
fn symbolic_file_encodes_to_fixture_meta() {
    let symbolic = read_text_file(&voice_fixture("questions_symbolic.txt")).unwrap();
    let ids = string_to_id(&symbolic, &registry()).unwrap();
    assert_eq!(&MetaCart::parse(&ids).unwrap(), voice_meta().as_ref());
}

#[test]
fn round_trip_through_files() {
    let registry = registry();
    let symbolic = read_text_file(&voice_fixture("questions_symbolic.txt")).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let ids_path = dir.path().join("ids.txt");
    write_text_file(&ids_path, &string_to_id(&symbolic, &registry).unwrap()).unwrap();

    let restored = id_to_string(&read_text_file(&ids_path).unwrap(), &registry).unwrap();
    assert_eq!(restored, symbolic);
}

#[test]
fn filtered_file_always_converts() {
    let registry = registry();
    let mut text = read_text_file(&voice_fixture("questions_symbolic.txt")).unwrap();
    text.push_str("4 LeftPhone a,zz\n5 Nasal yes\n");

    assert!(string_to_id(&text, &registry).is_err());

    let outcome = filter_questions(&text, &registry);
    assert_eq!(outcome.kept, 4);
    assert_eq!(outcome.dropped.len(), 2);
    assert!(string_to_id(&outcome.text, &registry).is_ok());
}
