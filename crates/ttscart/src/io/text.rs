//! Human-editable tree text format.
//!
//! One node per line:
//!
//! ```text
//! <index> <parent ref> <question logic or *> <unit set or *>
//! ```
//!
//! Indices count from 1 in file order. The parent reference is `0` for the
//! root, `+P` for the left child of node `P` and `-P` for its right child.
//! Branch lines carry question logic and `*` for the set; leaf lines carry `*`
//! for the logic and a unit set (see [`crate::repr::unit_set`]).
//!
//! Children may be listed before their parents. Saving renumbers nodes in
//! pre-order, so a saved file always lists parents first.
//!
//! Files are written as UTF-16LE with a byte-order mark and CRLF line endings.
//! Reading accepts UTF-16 in either byte order (detected by BOM) and falls back
//! to UTF-8.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fixedbitset::FixedBitSet;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::meta::MetaCart;
use crate::repr::question::{Question, QuestionError};
use crate::repr::tree::{CartNode, CartTree, NodeId, NodeKind, TreeError, TreeValidationError};
use crate::repr::unit_set::{compose_unit_set, parse_unit_set, UnitSetError};

/// Placeholder for the absent field of a node line.
pub const WILDCARD: &str = "*";

const UTF16LE_BOM: [u8; 2] = [0xFF, 0xFE];
const UTF16BE_BOM: [u8; 2] = [0xFE, 0xFF];
const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

static NODE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+)\s+(\S+)\s+(\S+)\s+(.*)$").expect("node line pattern is valid")
});

// =============================================================================
// Error types
// =============================================================================

/// Errors raised while reading or writing the text format.
#[derive(Debug, thiserror::Error)]
pub enum TextFormatError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid text encoding: {0}")]
    Encoding(String),
    #[error("line {line}: expected '<index> <parent> <logic> <set>', got {content:?}")]
    MalformedLine { line: usize, content: String },
    #[error("line {line}: invalid {field} {value:?}")]
    InvalidNumber {
        line: usize,
        field: &'static str,
        value: String,
    },
    #[error("line {line}: node index {index} out of sequence, expected {expected}")]
    IndexMismatch {
        line: usize,
        index: usize,
        expected: usize,
    },
    #[error("line {line}: {source}")]
    Question {
        line: usize,
        #[source]
        source: QuestionError,
    },
    #[error("line {line}: {source}")]
    UnitSet {
        line: usize,
        #[source]
        source: UnitSetError,
    },
    #[error("line {line}: node has {reason}")]
    InconsistentNode { line: usize, reason: &'static str },
    #[error("node {index}: parent reference {parent} out of range")]
    ParentOutOfRange { index: usize, parent: i64 },
    #[error("node {index}: {side} child of node {parent} is already assigned")]
    SlotOccupied {
        index: usize,
        parent: usize,
        side: &'static str,
    },
    #[error("node {index}: parent {parent} is a leaf")]
    LeafParent { index: usize, parent: usize },
    #[error("node {index}: second root node")]
    DuplicateRoot { index: usize },
    #[error("node {index}: branch has no {side} child")]
    MissingChild { index: usize, side: &'static str },
    #[error("no root node")]
    MissingRoot,
    #[error("invalid tree: {0}")]
    Validation(#[from] TreeValidationError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

// =============================================================================
// Encoding
// =============================================================================

/// Decode file bytes, honouring a UTF-16 or UTF-8 byte-order mark.
pub fn decode_text(bytes: &[u8]) -> Result<String, TextFormatError> {
    if let Some(rest) = bytes.strip_prefix(&UTF16LE_BOM) {
        decode_utf16(rest, u16::from_le_bytes)
    } else if let Some(rest) = bytes.strip_prefix(&UTF16BE_BOM) {
        decode_utf16(rest, u16::from_be_bytes)
    } else {
        let rest = bytes.strip_prefix(&UTF8_BOM).unwrap_or(bytes);
        String::from_utf8(rest.to_vec()).map_err(|e| TextFormatError::Encoding(e.to_string()))
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> Result<String, TextFormatError> {
    if bytes.len() % 2 != 0 {
        return Err(TextFormatError::Encoding(format!(
            "odd byte count {} in UTF-16 data",
            bytes.len()
        )));
    }
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| unit([c[0], c[1]])).collect();
    String::from_utf16(&units).map_err(|e| TextFormatError::Encoding(e.to_string()))
}

/// Encode as UTF-16LE with a byte-order mark.
pub fn encode_utf16le(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + text.len() * 2);
    out.extend_from_slice(&UTF16LE_BOM);
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Read a text file in any encoding accepted by [`decode_text`].
pub fn read_text_file(path: &Path) -> Result<String, TextFormatError> {
    let bytes = std::fs::read(path).map_err(|source| TextFormatError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_text(&bytes)
}

/// Write `text` as UTF-16LE with a byte-order mark.
pub fn write_text_file(path: &Path, text: &str) -> Result<(), TextFormatError> {
    std::fs::write(path, encode_utf16le(text)).map_err(|source| TextFormatError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// Parsing
// =============================================================================

/// A node line before parent references are resolved.
struct PendingNode {
    line: usize,
    parent_ref: i64,
    question: Option<Question>,
    unit_set: Option<FixedBitSet>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

fn parse_node_line(
    line: usize,
    text: &str,
    expected_index: usize,
    meta: &MetaCart,
) -> Result<PendingNode, TextFormatError> {
    let caps = NODE_LINE
        .captures(text)
        .ok_or_else(|| TextFormatError::MalformedLine {
            line,
            content: text.to_string(),
        })?;

    let index: usize = caps[1].parse().map_err(|_| TextFormatError::InvalidNumber {
        line,
        field: "node index",
        value: caps[1].to_string(),
    })?;
    if index != expected_index {
        return Err(TextFormatError::IndexMismatch {
            line,
            index,
            expected: expected_index,
        });
    }

    let parent_ref: i64 = caps[2].parse().map_err(|_| TextFormatError::InvalidNumber {
        line,
        field: "parent reference",
        value: caps[2].to_string(),
    })?;

    let question = match &caps[3] {
        WILDCARD => None,
        logic => Some(
            Question::parse(logic, meta)
                .map_err(|source| TextFormatError::Question { line, source })?,
        ),
    };
    let unit_set = match caps[4].trim() {
        WILDCARD => None,
        set => Some(parse_unit_set(set).map_err(|source| TextFormatError::UnitSet { line, source })?),
    };

    match (&question, &unit_set) {
        (Some(_), Some(_)) => Err(TextFormatError::InconsistentNode {
            line,
            reason: "both question logic and a unit set",
        }),
        (None, None) => Err(TextFormatError::InconsistentNode {
            line,
            reason: "neither question logic nor a unit set",
        }),
        _ => Ok(PendingNode {
            line,
            parent_ref,
            question,
            unit_set,
            left: None,
            right: None,
        }),
    }
}

/// Fill the child slots named by each node's parent reference, last node first.
///
/// Returns the root id.
fn resolve_parents(pending: &mut [PendingNode]) -> Result<NodeId, TextFormatError> {
    let n_nodes = pending.len();
    let mut root = None;

    for i in (0..n_nodes).rev() {
        let index = i + 1;
        let parent_ref = pending[i].parent_ref;
        if parent_ref == 0 {
            if root.is_some() {
                return Err(TextFormatError::DuplicateRoot { index });
            }
            root = Some(i as NodeId);
            continue;
        }

        let parent = usize::try_from(parent_ref.unsigned_abs()).unwrap_or(usize::MAX);
        if parent > n_nodes || parent == index {
            return Err(TextFormatError::ParentOutOfRange {
                index,
                parent: parent_ref,
            });
        }

        let target = &mut pending[parent - 1];
        if target.question.is_none() {
            return Err(TextFormatError::LeafParent { index, parent });
        }
        let (slot, side) = if parent_ref > 0 {
            (&mut target.left, "left")
        } else {
            (&mut target.right, "right")
        };
        if slot.is_some() {
            return Err(TextFormatError::SlotOccupied {
                index,
                parent,
                side,
            });
        }
        *slot = Some(i as NodeId);
    }

    root.ok_or(TextFormatError::MissingRoot)
}

impl CartTree {
    /// Parse a tree from text, checking question logic against `meta`.
    pub fn parse_text(content: &str, meta: Arc<MetaCart>) -> Result<Self, TextFormatError> {
        let mut pending = Vec::new();
        for (line_idx, raw) in content.lines().enumerate() {
            let text = raw.trim();
            if text.is_empty() {
                continue;
            }
            pending.push(parse_node_line(line_idx + 1, text, pending.len() + 1, &meta)?);
        }

        let root = resolve_parents(&mut pending)?;

        let nodes = pending
            .into_iter()
            .enumerate()
            .map(|(i, node)| -> Result<CartNode, TextFormatError> {
                let parent = (node.parent_ref != 0)
                    .then(|| (node.parent_ref.unsigned_abs() - 1) as NodeId);
                let kind = match (node.question, node.unit_set) {
                    (Some(question), _) => NodeKind::Branch {
                        question,
                        left: node.left.ok_or(TextFormatError::MissingChild {
                            index: i + 1,
                            side: "left",
                        })?,
                        right: node.right.ok_or(TextFormatError::MissingChild {
                            index: i + 1,
                            side: "right",
                        })?,
                    },
                    (None, Some(unit_set)) => NodeKind::Leaf { unit_set },
                    (None, None) => {
                        return Err(TextFormatError::InconsistentNode {
                            line: node.line,
                            reason: "neither question logic nor a unit set",
                        })
                    }
                };
                Ok(CartNode::new(parent, kind))
            })
            .collect::<Result<Vec<_>, TextFormatError>>()?;

        Ok(CartTree::from_parts(meta, nodes, root)?)
    }

    /// Load a tree text file.
    pub fn load_text(path: impl AsRef<Path>, meta: Arc<MetaCart>) -> Result<Self, TextFormatError> {
        let content = read_text_file(path.as_ref())?;
        Self::parse_text(&content, meta)
    }

    /// Render as text with pre-order numbering and CRLF line endings.
    pub fn to_text(&self) -> Result<String, TextFormatError> {
        if self.root().is_none() {
            return Err(TreeError::NoRoot.into());
        }

        let order = self.preorder();
        let mut position = vec![0usize; self.n_nodes()];
        for (pos, &id) in order.iter().enumerate() {
            position[id as usize] = pos + 1;
        }

        let mut out = String::new();
        for (pos, &id) in order.iter().enumerate() {
            let node = self.node(id).ok_or(TreeError::NodeOutOfBounds(id))?;
            let parent_ref = match node.parent() {
                None => 0,
                Some(parent) => {
                    let parent_pos = position[parent as usize] as i64;
                    let is_right = self
                        .node(parent)
                        .and_then(|p| p.children())
                        .is_some_and(|(_, right)| right == id);
                    if is_right {
                        -parent_pos
                    } else {
                        parent_pos
                    }
                }
            };
            let logic = node
                .question()
                .map_or_else(|| WILDCARD.to_string(), ToString::to_string);
            let set = node
                .unit_set()
                .map_or_else(|| WILDCARD.to_string(), compose_unit_set);
            // Writing to a String cannot fail.
            let _ = write!(out, "{} {} {} {}\r\n", pos + 1, parent_ref, logic, set);
        }
        Ok(out)
    }

    /// Save as UTF-16LE text.
    pub fn save_text(&self, path: impl AsRef<Path>) -> Result<(), TextFormatError> {
        let text = self.to_text()?;
        write_text_file(path.as_ref(), &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::{FeatureKind, TtsUnitFeature};
    use crate::testing::{probe_features, routes, sample_meta, sample_tree, unit_set};
    use rstest::rstest;

    /// Root asks feature 0; its right child is listed before its left child.
    const OUT_OF_ORDER: &str = "\
1 0 0 *
2 -1 * I 4 1 1
3 1 * B 4 05
";

    #[test]
    fn right_child_may_precede_left_child() {
        let tree = CartTree::parse_text(OUT_OF_ORDER, sample_meta()).unwrap();
        assert_eq!(tree.n_nodes(), 3);
        assert_eq!(tree.node(0).unwrap().children(), Some((2, 1)));

        let yes = TtsUnitFeature::default().with(FeatureKind::LeftPhone, 2);
        let no = TtsUnitFeature::default();
        assert_eq!(tree.lookup(&yes).unwrap(), &unit_set(4, &[0, 2]));
        assert_eq!(tree.lookup(&no).unwrap(), &unit_set(4, &[1]));
    }

    #[test]
    fn save_renumbers_in_preorder() {
        let tree = CartTree::parse_text(OUT_OF_ORDER, sample_meta()).unwrap();
        let text = tree.to_text().unwrap();
        assert_eq!(text, "1 0 0 *\r\n2 1 * B 4 05\r\n3 -1 * B 4 02\r\n");
    }

    #[test]
    fn text_round_trip_preserves_routing() {
        let tree = sample_tree();
        let text = tree.to_text().unwrap();
        let reloaded = CartTree::parse_text(&text, sample_meta()).unwrap();

        let probes = probe_features();
        assert_eq!(routes(&tree, &probes), routes(&reloaded, &probes));
        assert_eq!(reloaded.to_text().unwrap(), text);
    }

    #[test]
    fn utf16_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.txt");
        let tree = sample_tree();
        tree.save_text(&path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &UTF16LE_BOM);

        let reloaded = CartTree::load_text(&path, sample_meta()).unwrap();
        let probes = probe_features();
        assert_eq!(routes(&tree, &probes), routes(&reloaded, &probes));
    }

    #[test]
    fn decode_accepts_every_bom() {
        let text = "1 0 * I 2 0\r\n";
        assert_eq!(decode_text(&encode_utf16le(text)).unwrap(), text);

        let mut be = UTF16BE_BOM.to_vec();
        for unit in text.encode_utf16() {
            be.extend_from_slice(&unit.to_be_bytes());
        }
        assert_eq!(decode_text(&be).unwrap(), text);

        let mut utf8 = UTF8_BOM.to_vec();
        utf8.extend_from_slice(text.as_bytes());
        assert_eq!(decode_text(&utf8).unwrap(), text);
        assert_eq!(decode_text(text.as_bytes()).unwrap(), text);

        assert!(matches!(
            decode_text(&[0xFF, 0xFE, 0x31]),
            Err(TextFormatError::Encoding(_))
        ));
    }

    #[test]
    fn single_leaf_tree() {
        let tree = CartTree::parse_text("1 0 * I 256 2 3 200\n", sample_meta()).unwrap();
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(
            tree.lookup(&TtsUnitFeature::default()).unwrap(),
            &unit_set(256, &[3, 200])
        );
    }

    #[rstest]
    #[case::malformed("1 0 *\n")]
    #[case::bad_index("x 0 * I 2 0\n")]
    #[case::bad_parent("1 p * I 2 0\n")]
    #[case::unsupported_set("1 0 * X 8 00\n")]
    #[case::unknown_feature("1 0 9 *\n2 1 * I 2 0\n3 -1 * I 2 0\n")]
    #[case::both_fields("1 0 0 I 2 0\n")]
    #[case::neither_field("1 0 * *\n")]
    #[case::no_root("1 2 0 *\n2 1 0 *\n")]
    fn rejected_lines(#[case] text: &str) {
        assert!(CartTree::parse_text(text, sample_meta()).is_err());
    }

    #[test]
    fn oversized_unit_set_is_a_line_error() {
        let err = CartTree::parse_text("1 0 * I 18446744073709551615 0\n", sample_meta())
            .unwrap_err();
        assert!(
            matches!(
                err,
                TextFormatError::UnitSet {
                    line: 1,
                    source: UnitSetError::LengthTooLarge { .. }
                }
            ),
            "got: {err:?}"
        );
    }

    #[test]
    fn reports_structural_errors() {
        let meta = sample_meta();

        let err = CartTree::parse_text("1 0 * I 2 0\n3 1 * I 2 0\n", meta.clone()).unwrap_err();
        assert!(matches!(err, TextFormatError::IndexMismatch { line: 2, index: 3, expected: 2 }));

        let err = CartTree::parse_text("1 0 0 *\n2 1 * I 2 0\n3 1 * I 2 1 1\n", meta.clone())
            .unwrap_err();
        assert!(matches!(err, TextFormatError::SlotOccupied { index: 2, parent: 1, side: "left" }));

        let err = CartTree::parse_text("1 0 0 *\n2 5 * I 2 0\n", meta.clone()).unwrap_err();
        assert!(matches!(err, TextFormatError::ParentOutOfRange { index: 2, parent: 5 }));

        let err = CartTree::parse_text("1 0 * I 2 0\n2 0 * I 2 0\n", meta.clone()).unwrap_err();
        assert!(matches!(err, TextFormatError::DuplicateRoot { index: 1 }));

        let err = CartTree::parse_text("1 0 0 *\n2 1 * I 2 0\n", meta.clone()).unwrap_err();
        assert!(matches!(err, TextFormatError::MissingChild { index: 1, side: "right" }));

        let err = CartTree::parse_text("1 0 * I 2 0\n2 1 * I 2 0\n", meta.clone()).unwrap_err();
        assert!(matches!(err, TextFormatError::LeafParent { index: 2, parent: 1 }));

        let err = CartTree::parse_text("", meta).unwrap_err();
        assert!(matches!(err, TextFormatError::MissingRoot));
    }

    #[test]
    fn empty_tree_cannot_be_saved() {
        let tree = CartTree::new(sample_meta());
        assert!(matches!(tree.to_text(), Err(TextFormatError::Tree(TreeError::NoRoot))));
    }
}
