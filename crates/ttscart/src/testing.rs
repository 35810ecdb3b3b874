//! Shared fixtures for unit and integration tests.

use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::meta::{FeatureKind, FeatureQuestion, MetaCart, TtsUnitFeature};
use crate::repr::question::Question;
use crate::repr::tree::CartTree;

/// Id-encoded question file matching [`sample_meta`].
pub const SAMPLE_QUESTIONS: &str = "\
0 LeftPhone 1,2
1 RightPhone 3
2 Stress 1
3 PosInWord 1,4
";

/// Four feature questions:
///
/// - 0: left phone in {1, 2}
/// - 1: right phone is 3
/// - 2: stressed
/// - 3: word position in {1, 4}
pub fn sample_meta() -> Arc<MetaCart> {
    let mut meta = MetaCart::new(1033);
    for question in [
        FeatureQuestion::new(0, FeatureKind::LeftPhone, [1, 2]),
        FeatureQuestion::new(1, FeatureKind::RightPhone, [3]),
        FeatureQuestion::new(2, FeatureKind::Stress, [1]),
        FeatureQuestion::new(3, FeatureKind::PosInWord, [1, 4]),
    ] {
        meta.insert(question).expect("sample questions are unique");
    }
    Arc::new(meta)
}

/// Bit set of `len` bits with `ones` set.
pub fn unit_set(len: usize, ones: &[usize]) -> FixedBitSet {
    let mut set = FixedBitSet::with_capacity(len);
    for &i in ones {
        set.insert(i);
    }
    set
}

/// Five-leaf tree over [`sample_meta`]:
///
/// ```text
/// 0 & ~2 ?
/// ├─ yes: 1 | 3 ?
/// │   ├─ yes: {0, 2}
/// │   └─ no:  {1}
/// └─ no:  2 ?
///     ├─ yes: {3}
///     └─ no:  3 ?
///         ├─ yes: {0, 1, 2, 3, 4, 5, 6, 7, 8, 9}
///         └─ no:  {}
/// ```
pub fn sample_tree() -> CartTree {
    let meta = sample_meta();
    let q = |text: &str| Question::parse(text, &meta).expect("valid sample question");

    let mut tree = CartTree::new(meta.clone());
    let root = tree.init_root();
    let (yes, no) = tree.apply_split(root, q("0&~2")).expect("root is a leaf");
    let (yy, yn) = tree.apply_split(yes, q("1|3")).expect("fresh leaf");
    let (ny, nn) = tree.apply_split(no, q("2")).expect("fresh leaf");
    let (nny, nnn) = tree.apply_split(nn, q("3")).expect("fresh leaf");

    tree.make_leaf(yy, unit_set(10, &[0, 2])).expect("leaf");
    tree.make_leaf(yn, unit_set(10, &[1])).expect("leaf");
    tree.make_leaf(ny, unit_set(10, &[3])).expect("leaf");
    tree.make_leaf(nny, unit_set(10, &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9]))
        .expect("leaf");
    tree.make_leaf(nnn, unit_set(10, &[])).expect("leaf");
    tree
}

/// Features covering every combination of the sample questions.
pub fn probe_features() -> Vec<TtsUnitFeature> {
    let mut probes = Vec::new();
    for left_phone in [0, 1, 2] {
        for right_phone in [0, 3] {
            for stress in [0, 1] {
                for pos_in_word in [0, 1, 4] {
                    probes.push(
                        TtsUnitFeature::default()
                            .with(FeatureKind::LeftPhone, left_phone)
                            .with(FeatureKind::RightPhone, right_phone)
                            .with(FeatureKind::Stress, stress)
                            .with(FeatureKind::PosInWord, pos_in_word),
                    );
                }
            }
        }
    }
    probes
}

/// Unit set reached by each probe.
pub fn routes(tree: &CartTree, probes: &[TtsUnitFeature]) -> Vec<FixedBitSet> {
    probes
        .iter()
        .map(|p| tree.lookup(p).expect("tree has a root").clone())
        .collect()
}
