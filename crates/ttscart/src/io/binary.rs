//! Compact binary `.tree` format.
//!
//! Nodes are stored in pre-order (node, left subtree, right subtree) with all
//! integers little-endian:
//!
//! ```text
//! node   := kind:u8 (leaf | branch)
//! leaf   := 0x00 bit_len:u32 bits:[u8; ceil(bit_len / 8)]
//! branch := 0x01 term_count:u16 term* node node
//! term   := operand_count:u16 (negated:u8 feature_id:u32)*
//! ```
//!
//! Bit `i` of a leaf set lives in byte `i / 8` at position `i % 8`. Padding
//! bits in the last byte must be zero.
//!
//! Reading and writing use explicit stacks, so tree depth is bounded only by
//! memory.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use fixedbitset::FixedBitSet;

use crate::meta::MetaCart;
use crate::repr::question::{AndOperator, NotOperator, Question, QuestionError};
use crate::repr::tree::{CartNode, CartTree, NodeId, NodeKind, TreeError, TreeValidationError};
use crate::repr::unit_set::MAX_UNIT_SET_LEN;

const LEAF_TAG: u8 = 0;
const BRANCH_TAG: u8 = 1;

// =============================================================================
// Error types
// =============================================================================

/// Errors raised while reading or writing binary trees.
#[derive(Debug, thiserror::Error)]
pub enum BinaryFormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unexpected end of tree data")]
    Truncated,
    #[error("{0} trailing bytes after tree data")]
    TrailingBytes(usize),
    #[error("unknown node kind tag {0}")]
    UnknownNodeKind(u8),
    #[error("invalid negation flag {0}")]
    InvalidFlag(u8),
    #[error("node {node}: padding bits set in unit set of length {len}")]
    UnitSetPadding { node: NodeId, len: usize },
    #[error("node {node}: {source}")]
    Question {
        node: NodeId,
        #[source]
        source: QuestionError,
    },
    #[error("{what} count {count} does not fit the binary format")]
    TooLarge { what: &'static str, count: usize },
    #[error("invalid tree: {0}")]
    Validation(#[from] TreeValidationError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

// =============================================================================
// Primitive readers
// =============================================================================

fn read_array<const N: usize, R: Read>(reader: &mut R) -> Result<[u8; N], BinaryFormatError> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => BinaryFormatError::Truncated,
        _ => BinaryFormatError::Io(e),
    })?;
    Ok(buf)
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8, BinaryFormatError> {
    Ok(read_array::<1, _>(reader)?[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16, BinaryFormatError> {
    Ok(u16::from_le_bytes(read_array(reader)?))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32, BinaryFormatError> {
    Ok(u32::from_le_bytes(read_array(reader)?))
}

fn count_u16(what: &'static str, count: usize) -> Result<u16, BinaryFormatError> {
    u16::try_from(count).map_err(|_| BinaryFormatError::TooLarge { what, count })
}

// =============================================================================
// Node payloads
// =============================================================================

fn write_unit_set<W: Write>(writer: &mut W, set: &FixedBitSet) -> Result<(), BinaryFormatError> {
    let len = set.len();
    let bit_len = u32::try_from(len)
        .ok()
        .filter(|_| len <= MAX_UNIT_SET_LEN)
        .ok_or(BinaryFormatError::TooLarge {
            what: "unit set bit",
            count: len,
        })?;
    let mut bytes = vec![0u8; len.div_ceil(8)];
    for i in set.ones() {
        bytes[i / 8] |= 1 << (i % 8);
    }
    writer.write_all(&bit_len.to_le_bytes())?;
    writer.write_all(&bytes)?;
    Ok(())
}

fn read_unit_set<R: Read>(reader: &mut R, node: NodeId) -> Result<FixedBitSet, BinaryFormatError> {
    let len = read_u32(reader)? as usize;
    if len > MAX_UNIT_SET_LEN {
        return Err(BinaryFormatError::TooLarge {
            what: "unit set bit",
            count: len,
        });
    }

    // Grows with the data actually present, so a short blob fails cheaply.
    let n_bytes = len.div_ceil(8);
    let mut bytes = Vec::new();
    reader.by_ref().take(n_bytes as u64).read_to_end(&mut bytes)?;
    if bytes.len() < n_bytes {
        return Err(BinaryFormatError::Truncated);
    }

    let mut set = FixedBitSet::with_capacity(len);
    for (byte_idx, &byte) in bytes.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) == 0 {
                continue;
            }
            let index = byte_idx * 8 + bit;
            if index >= len {
                return Err(BinaryFormatError::UnitSetPadding { node, len });
            }
            set.insert(index);
        }
    }
    Ok(set)
}

fn write_question<W: Write>(writer: &mut W, question: &Question) -> Result<(), BinaryFormatError> {
    writer.write_all(&count_u16("term", question.terms().len())?.to_le_bytes())?;
    for term in question.terms() {
        writer.write_all(&count_u16("operand", term.operands().len())?.to_le_bytes())?;
        for op in term.operands() {
            writer.write_all(&[u8::from(op.negated)])?;
            writer.write_all(&op.feature_id.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_question<R: Read>(
    reader: &mut R,
    meta: &MetaCart,
    node: NodeId,
) -> Result<Question, BinaryFormatError> {
    let question_err = |source| BinaryFormatError::Question { node, source };

    let term_count = read_u16(reader)?;
    let mut terms = Vec::with_capacity(term_count as usize);
    for _ in 0..term_count {
        let operand_count = read_u16(reader)?;
        let mut operands = Vec::with_capacity(operand_count as usize);
        for _ in 0..operand_count {
            let negated = match read_u8(reader)? {
                0 => false,
                1 => true,
                other => return Err(BinaryFormatError::InvalidFlag(other)),
            };
            let feature_id = read_u32(reader)?;
            if !meta.contains(feature_id) {
                return Err(question_err(QuestionError::UnknownFeature(feature_id)));
            }
            operands.push(NotOperator {
                negated,
                feature_id,
            });
        }
        terms.push(AndOperator::new(operands));
    }
    Question::from_terms(terms).map_err(question_err)
}

// =============================================================================
// CartTree
// =============================================================================

/// A branch read from the stream whose children are still being read.
struct OpenBranch {
    id: NodeId,
    left: Option<NodeId>,
}

impl CartTree {
    /// Write the tree in pre-order.
    pub fn write_binary<W: Write>(&self, writer: &mut W) -> Result<(), BinaryFormatError> {
        if self.root().is_none() {
            return Err(TreeError::NoRoot.into());
        }

        for id in self.preorder() {
            let node = self.node(id).ok_or(TreeError::NodeOutOfBounds(id))?;
            match node.kind() {
                NodeKind::Leaf { unit_set } => {
                    writer.write_all(&[LEAF_TAG])?;
                    write_unit_set(writer, unit_set)?;
                }
                NodeKind::Branch { question, .. } => {
                    writer.write_all(&[BRANCH_TAG])?;
                    write_question(writer, question)?;
                }
            }
        }
        Ok(())
    }

    /// Read one tree from `reader`, leaving any following bytes unread.
    pub fn read_binary<R: Read>(reader: &mut R, meta: Arc<MetaCart>) -> Result<Self, BinaryFormatError> {
        let mut nodes: Vec<CartNode> = Vec::new();
        let mut open: Vec<OpenBranch> = Vec::new();

        loop {
            let id = nodes.len() as NodeId;
            let parent = open.last().map(|b| b.id);

            let tag = read_u8(reader)?;
            let kind = match tag {
                LEAF_TAG => NodeKind::Leaf {
                    unit_set: read_unit_set(reader, id)?,
                },
                BRANCH_TAG => NodeKind::Branch {
                    question: read_question(reader, &meta, id)?,
                    left: id,
                    right: id,
                },
                other => return Err(BinaryFormatError::UnknownNodeKind(other)),
            };
            nodes.push(CartNode::new(parent, kind));

            if let Some(top) = open.last_mut() {
                match top.left {
                    None => top.left = Some(id),
                    Some(left) => {
                        let parent_id = top.id;
                        open.pop();
                        nodes[parent_id as usize].link_children(left, id);
                    }
                }
            }

            // A branch is popped as soon as its right child starts, so an
            // empty stack after a leaf means the tree is complete.
            if tag == BRANCH_TAG {
                open.push(OpenBranch { id, left: None });
            }
            if open.is_empty() {
                break;
            }
        }

        Ok(CartTree::from_parts(meta, nodes, 0)?)
    }

    /// Encode into a fresh buffer.
    pub fn to_binary_bytes(&self) -> Result<Vec<u8>, BinaryFormatError> {
        let mut buf = Vec::new();
        self.write_binary(&mut buf)?;
        Ok(buf)
    }

    /// Decode a buffer holding exactly one tree.
    pub fn from_binary_bytes(bytes: &[u8], meta: Arc<MetaCart>) -> Result<Self, BinaryFormatError> {
        let mut cursor = bytes;
        let tree = Self::read_binary(&mut cursor, meta)?;
        if !cursor.is_empty() {
            return Err(BinaryFormatError::TrailingBytes(cursor.len()));
        }
        Ok(tree)
    }

    /// Save as a `.tree` file.
    pub fn save_binary(&self, path: impl AsRef<Path>) -> Result<(), BinaryFormatError> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_binary(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Load a `.tree` file.
    pub fn load_binary(path: impl AsRef<Path>, meta: Arc<MetaCart>) -> Result<Self, BinaryFormatError> {
        let bytes = std::fs::read(path)?;
        Self::from_binary_bytes(&bytes, meta)
    }
}
