//! Text and binary tree formats against the voice fixtures.

mod common;

use fixedbitset::FixedBitSet;

use common::{voice_fixture, voice_meta, voice_tree};
use ttscart::io::text::encode_utf16le;
use ttscart::{CartTree, FeatureKind, TtsUnitFeature, YesBranch};

fn set(len: usize, ones: &[usize]) -> FixedBitSet {
    let mut s = FixedBitSet::with_capacity(len);
    for &i in ones {
        s.insert(i);
    }
    s
}

fn probes() -> Vec<TtsUnitFeature> {
    let mut probes = Vec::new();
    for left_phone in 0..4 {
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

fn routes(tree: &CartTree) -> Vec<FixedBitSet> {
    probes()
        .iter()
        .map(|p| tree.lookup(p).unwrap().clone())
        .collect()
}

#[test]
fn fixture_pins_branch_convention() {
    let tree = voice_tree("a");
    assert_eq!(tree.yes_branch(), YesBranch::Left);
    assert_eq!(tree.n_nodes(), 5);
    assert_eq!(tree.depth(), 3);

    let unstressed = TtsUnitFeature::default().with(FeatureKind::LeftPhone, 1);
    let stressed = unstressed.with(FeatureKind::Stress, 1);
    let other = TtsUnitFeature::default();

    assert_eq!(tree.lookup(&unstressed).unwrap(), &set(8, &[0, 2]));
    assert_eq!(tree.lookup(&stressed).unwrap(), &set(8, &[7]));
    assert_eq!(tree.lookup(&other).unwrap(), &set(8, &[]));
}

#[test]
fn fixture_with_right_child_first() {
    let tree = voice_tree("b");
    let yes = TtsUnitFeature::default().with(FeatureKind::PosInWord, 4);
    assert_eq!(tree.lookup(&yes).unwrap(), &set(4, &[0, 1]));
    assert_eq!(tree.lookup(&TtsUnitFeature::default()).unwrap(), &set(4, &[3]));
}

#[test]
fn text_binary_text_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    for unit in ["a", "b"] {
        let tree = voice_tree(unit);

        let bin_path = dir.path().join(format!("{unit}.tree"));
        tree.save_binary(&bin_path).unwrap();
        let from_bin = CartTree::load_binary(&bin_path, voice_meta()).unwrap();
        assert_eq!(routes(&from_bin), routes(&tree));

        let txt_path = dir.path().join(format!("{unit}.txt"));
        from_bin.save_text(&txt_path).unwrap();
        let from_txt = CartTree::load_text(&txt_path, voice_meta()).unwrap();
        assert_eq!(routes(&from_txt), routes(&tree));
        assert_eq!(from_txt.to_text().unwrap(), tree.to_text().unwrap());
    }
}

#[test]
fn utf16_and_utf8_inputs_agree() {
    let utf8 = std::fs::read_to_string(voice_fixture("a.txt")).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a16.txt");
    std::fs::write(&path, encode_utf16le(&utf8.replace('\n', "\r\n"))).unwrap();

    let tree = CartTree::load_text(&path, voice_meta()).unwrap();
    assert_eq!(routes(&tree), routes(&voice_tree("a")));
}

#[test]
fn saved_text_is_canonical() {
    let text = voice_tree("a").to_text().unwrap();
    assert_eq!(
        text,
        "1 0 0&~2 *\r\n2 1 * B 8 05\r\n3 -1 2 *\r\n4 3 * B 8 80\r\n5 -3 * I 8 0\r\n"
    );
}
