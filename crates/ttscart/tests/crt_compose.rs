//! CRT composition from a unit list and pre-built tree files.

mod common;

use std::path::Path;

use common::{voice_meta, voice_tree, write_voice_dir};
use ttscart::io::crt::{CRT_VERSION, HEADER_SIZE, INDEX_ENTRY_SIZE};
use ttscart::{CartTreeManager, ComposeConfig, CrtError, CrtFile, FeatureKind, TtsUnitFeature};

fn config(dir: &Path, output: &str) -> ComposeConfig {
    ComposeConfig::builder()
        .unit_list(dir.join("units.txt"))
        .question_file(dir.join("questions.txt"))
        .tree_dir(dir.join("trees"))
        .output(dir.join(output))
        .language(1033)
        .build()
        .unwrap()
}

#[test]
fn composes_expected_layout() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_dir(dir.path(), "_sil_\na\nb\n");
    let config = config(dir.path(), "voice.crt");

    let summary = CartTreeManager::compose_crt_file(&config).unwrap();
    let header = summary.header;
    assert_eq!(header.version, CRT_VERSION);
    assert_eq!(header.feature_offset as usize, HEADER_SIZE);
    assert_eq!(header.cart_idx_offset, header.feature_offset + header.feature_size);
    assert_eq!(header.cart_idx_num, 2);
    assert_eq!(
        header.cart_data_offset as usize,
        header.cart_idx_offset as usize + 2 * INDEX_ENTRY_SIZE
    );

    let ids: Vec<i16> = summary.entries.iter().map(|e| e.unit_type_id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(summary.entries[0].start_offset, 0);
    assert_eq!(
        summary.entries[1].start_offset,
        summary.entries[0].size_in_bytes
    );

    let a_size = std::fs::metadata(dir.path().join("trees/a.tree")).unwrap().len();
    assert_eq!(summary.entries[0].size_in_bytes as u64, a_size);

    let bytes = std::fs::read(&config.output).unwrap();
    assert_eq!(
        bytes.len() as u64,
        header.cart_data_offset as u64 + summary.data_size()
    );
}

#[test]
fn composition_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_dir(dir.path(), "_sil_\na\nb\n");

    CartTreeManager::compose_crt_file(&config(dir.path(), "first.crt")).unwrap();
    CartTreeManager::compose_crt_file(&config(dir.path(), "second.crt")).unwrap();

    let first = std::fs::read(dir.path().join("first.crt")).unwrap();
    let second = std::fs::read(dir.path().join("second.crt")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn composed_file_reads_back() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_dir(dir.path(), "a\nb\n");
    let config = config(dir.path(), "voice.crt");
    CartTreeManager::compose_crt_file(&config).unwrap();

    let file = CrtFile::open(&config.output).unwrap();
    assert_eq!(file.meta().language(), 1033);
    assert_eq!(file.meta().len(), voice_meta().len());

    let manager = CartTreeManager::load_crt(&config.output).unwrap();
    assert_eq!(manager.len(), 2);
    for (unit_id, unit) in [(1, "a"), (2, "b")] {
        let expected = voice_tree(unit);
        let loaded = manager.tree(unit_id).unwrap();
        assert_eq!(loaded.to_text().unwrap(), expected.to_text().unwrap());
    }

    let stressed = TtsUnitFeature::default()
        .with(FeatureKind::LeftPhone, 1)
        .with(FeatureKind::Stress, 1);
    let leaf = manager.tree(1).unwrap().lookup(&stressed).unwrap();
    assert_eq!(leaf.ones().collect::<Vec<_>>(), vec![7]);
}

#[test]
fn misplaced_silence_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_dir(dir.path(), "a\n_sil_\nb\n");
    let config = config(dir.path(), "voice.crt");

    let err = CartTreeManager::compose_crt_file(&config).unwrap_err();
    assert!(
        matches!(err, CrtError::MisplacedSilence { line: 2, .. }),
        "got: {err:?}"
    );
    assert!(!config.output.exists());
}

#[test]
fn missing_tree_file_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_voice_dir(dir.path(), "a\nb\nc\n");
    let config = config(dir.path(), "voice.crt");

    let err = CartTreeManager::compose_crt_file(&config).unwrap_err();
    match err {
        CrtError::NotFound(path) => assert!(path.ends_with("trees/c.tree"), "path: {path:?}"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert!(!config.output.exists());
}

#[test]
fn missing_inputs_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), "voice.crt");
    let err = CartTreeManager::compose_crt_file(&config).unwrap_err();
    assert!(matches!(err, CrtError::NotFound(_)), "got: {err:?}");
}

#[test]
fn verify_rejects_corrupt_tree() {
    let dir = tempfile::tempdir().unwrap();
    let tree_dir = write_voice_dir(dir.path(), "a\nb\n");
    std::fs::write(tree_dir.join("b.tree"), [9u8, 9, 9]).unwrap();

    let unchecked = config(dir.path(), "unchecked.crt");
    assert!(CartTreeManager::compose_crt_file(&unchecked).is_ok());

    let checked = ComposeConfig {
        verify_trees: true,
        ..config(dir.path(), "checked.crt")
    };
    let err = CartTreeManager::compose_crt_file(&checked).unwrap_err();
    assert!(matches!(err, CrtError::Tree { ref unit, .. } if unit == "b"), "got: {err:?}");
    assert!(!checked.output.exists());
}
