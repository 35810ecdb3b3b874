//! Fixture helpers shared by the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ttscart::{CartTree, MetaCart};

/// Path of a file under `tests/test-cases/voice`.
pub fn voice_fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/test-cases/voice")
        .join(name)
}

pub fn voice_meta() -> Arc<MetaCart> {
    Arc::new(MetaCart::load(voice_fixture("questions.txt")).expect("load fixture questions"))
}

pub fn voice_tree(unit: &str) -> CartTree {
    CartTree::load_text(voice_fixture(&format!("{unit}.txt")), voice_meta())
        .expect("load fixture tree")
}

/// Lay out a voice directory: question file, unit list and `<unit>.tree` files
/// for units `a` and `b`.
pub fn write_voice_dir(dir: &Path, unit_list: &str) -> PathBuf {
    std::fs::copy(voice_fixture("questions.txt"), dir.join("questions.txt"))
        .expect("copy questions");
    std::fs::write(dir.join("units.txt"), unit_list).expect("write unit list");

    let tree_dir = dir.join("trees");
    std::fs::create_dir_all(&tree_dir).expect("create tree dir");
    for unit in ["a", "b"] {
        voice_tree(unit)
            .save_binary(tree_dir.join(format!("{unit}.tree")))
            .expect("save tree");
    }
    tree_dir
}
