//! Packed multi-tree CRT container.
//!
//! # Format Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header (256 bytes)                           │
//! ├──────────────────────────────────────────────┤
//! │ Metadata block (serialized MetaCart)         │
//! ├──────────────────────────────────────────────┤
//! │ Index table (12 bytes per unit)              │
//! ├──────────────────────────────────────────────┤
//! │ Tree data (concatenated binary trees)        │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Index entries point into the tree data
//! region relative to its start.

use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::binary::BinaryFormatError;
use crate::config::ConfigError;
use crate::meta::{MetaCart, MetaCartError};
use crate::repr::tree::CartTree;

// ============================================================================
// Constants
// ============================================================================

/// Format version written by default.
pub const CRT_VERSION: u32 = 1;

/// Size of the header in bytes.
pub const HEADER_SIZE: usize = 256;

/// Size of one index entry in bytes.
pub const INDEX_ENTRY_SIZE: usize = 12;

/// Unit name that may only appear first in a unit list.
pub const SILENCE_UNIT: &str = "_sil_";

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while composing or reading CRT files.
#[derive(Debug, thiserror::Error)]
pub enum CrtError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("file not found: {0}")]
    NotFound(PathBuf),
    #[error("{path}:{line}: _sil_ is only allowed as the first unit")]
    MisplacedSilence { path: PathBuf, line: usize },
    #[error("too many units: {0} exceeds the 16-bit unit id range")]
    TooManyUnits(usize),
    #[error("CRT layout does not fit 32-bit offsets")]
    OffsetOverflow,
    #[error("feature metadata: {0}")]
    Meta(#[from] MetaCartError),
    #[error("tree for unit {unit}: {source}")]
    Tree {
        unit: String,
        #[source]
        source: BinaryFormatError,
    },
    #[error("file truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("corrupt CRT file: {0}")]
    Corrupt(String),
    #[error("unit {0} is not in the CRT index")]
    UnknownUnit(i16),
    #[error("unit {0} appears more than once in the CRT index")]
    DuplicateUnit(i16),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

// ============================================================================
// Header
// ============================================================================

/// 256-byte CRT header.
///
/// # Layout
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     Version
/// 4       4     Metadata block offset
/// 8       4     Metadata block size
/// 12      4     Index table offset
/// 16      4     Number of index entries
/// 20      4     Reserved
/// 24      4     Tree data offset
/// 28      4     Reserved
/// 32      224   Padding (zero)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CrtHeader {
    pub version: u32,
    pub feature_offset: u32,
    pub feature_size: u32,
    pub cart_idx_offset: u32,
    pub cart_idx_num: u32,
    pub reserved1: u32,
    pub cart_data_offset: u32,
    pub reserved2: u32,
}

impl CrtHeader {
    /// Compute the layout for a metadata block and `n_entries` index entries.
    pub fn layout(version: u32, feature_size: usize, n_entries: usize) -> Result<Self, CrtError> {
        let feature_offset = HEADER_SIZE as u32;
        let feature_size = u32::try_from(feature_size).map_err(|_| CrtError::OffsetOverflow)?;
        let cart_idx_num = u32::try_from(n_entries).map_err(|_| CrtError::OffsetOverflow)?;
        let cart_idx_offset = feature_offset
            .checked_add(feature_size)
            .ok_or(CrtError::OffsetOverflow)?;
        let cart_data_offset = cart_idx_num
            .checked_mul(INDEX_ENTRY_SIZE as u32)
            .and_then(|size| cart_idx_offset.checked_add(size))
            .ok_or(CrtError::OffsetOverflow)?;

        Ok(Self {
            version,
            feature_offset,
            feature_size,
            cart_idx_offset,
            cart_idx_num,
            reserved1: 0,
            cart_data_offset,
            reserved2: 0,
        })
    }

    /// Serialize to 256 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        let fields = [
            self.version,
            self.feature_offset,
            self.feature_size,
            self.cart_idx_offset,
            self.cart_idx_num,
            self.reserved1,
            self.cart_data_offset,
            self.reserved2,
        ];
        for (i, value) in fields.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Parse from 256 bytes. Padding is ignored.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        let field = |i: usize| {
            u32::from_le_bytes([buf[i * 4], buf[i * 4 + 1], buf[i * 4 + 2], buf[i * 4 + 3]])
        };
        Self {
            version: field(0),
            feature_offset: field(1),
            feature_size: field(2),
            cart_idx_offset: field(3),
            cart_idx_num: field(4),
            reserved1: field(5),
            cart_data_offset: field(6),
            reserved2: field(7),
        }
    }
}

// ============================================================================
// Index Entry
// ============================================================================

/// One index entry: where a unit's tree lives in the tree data region.
///
/// # Layout
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       2     Unit id (i16)
/// 2       2     Padding
/// 4       4     Start offset (i32, relative to tree data)
/// 8       4     Size in bytes (i32)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CrtIndexEntry {
    pub unit_type_id: i16,
    pub start_offset: i32,
    pub size_in_bytes: i32,
}

impl CrtIndexEntry {
    pub fn to_bytes(&self) -> [u8; INDEX_ENTRY_SIZE] {
        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        buf[0..2].copy_from_slice(&self.unit_type_id.to_le_bytes());
        buf[4..8].copy_from_slice(&self.start_offset.to_le_bytes());
        buf[8..12].copy_from_slice(&self.size_in_bytes.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; INDEX_ENTRY_SIZE]) -> Self {
        Self {
            unit_type_id: i16::from_le_bytes([buf[0], buf[1]]),
            start_offset: i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            size_in_bytes: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }
    }
}

/// Header and index of a composed or opened CRT file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrtSummary {
    pub header: CrtHeader,
    pub entries: Vec<CrtIndexEntry>,
}

impl CrtSummary {
    /// Total size of the tree data region.
    pub fn data_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size_in_bytes as u64).sum()
    }
}

// ============================================================================
// Writing
// ============================================================================

/// Lay out a complete CRT file in memory.
///
/// `trees` pairs each unit id with its binary tree blob, in index order.
pub fn assemble<B: AsRef<[u8]>>(
    version: u32,
    meta_block: &[u8],
    trees: &[(i16, B)],
) -> Result<(Vec<u8>, CrtSummary), CrtError> {
    let header = CrtHeader::layout(version, meta_block.len(), trees.len())?;
    check_unique(trees.iter().map(|(id, _)| *id))?;

    let mut entries = Vec::with_capacity(trees.len());
    let mut offset = 0usize;
    for (unit_type_id, blob) in trees {
        let size = blob.as_ref().len();
        entries.push(CrtIndexEntry {
            unit_type_id: *unit_type_id,
            start_offset: i32::try_from(offset).map_err(|_| CrtError::OffsetOverflow)?,
            size_in_bytes: i32::try_from(size).map_err(|_| CrtError::OffsetOverflow)?,
        });
        offset += size;
    }

    let total = header.cart_data_offset as usize + offset;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(meta_block);
    for entry in &entries {
        out.extend_from_slice(&entry.to_bytes());
    }
    for (_, blob) in trees {
        out.extend_from_slice(blob.as_ref());
    }
    debug_assert_eq!(out.len(), total);

    Ok((out, CrtSummary { header, entries }))
}

fn check_unique(ids: impl Iterator<Item = i16>) -> Result<(), CrtError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(CrtError::DuplicateUnit(id));
        }
    }
    Ok(())
}

// ============================================================================
// Reading
// ============================================================================

/// A CRT file held in memory with its metadata decoded.
#[derive(Debug, Clone)]
pub struct CrtFile {
    header: CrtHeader,
    meta: Arc<MetaCart>,
    entries: Vec<CrtIndexEntry>,
    bytes: Vec<u8>,
}

/// Byte range `offset..offset + len`, checked against `total`.
fn region(offset: usize, len: usize, total: usize) -> Result<Range<usize>, CrtError> {
    let end = offset.checked_add(len).ok_or(CrtError::OffsetOverflow)?;
    if end > total {
        return Err(CrtError::Truncated {
            expected: end,
            actual: total,
        });
    }
    Ok(offset..end)
}

impl CrtFile {
    /// Read and check a CRT file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CrtError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => CrtError::NotFound(path.to_path_buf()),
            _ => CrtError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        Self::from_bytes(bytes)
    }

    /// Parse the header, metadata block and index, bounds-checking every entry.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CrtError> {
        let total = bytes.len();
        if total < HEADER_SIZE {
            return Err(CrtError::Truncated {
                expected: HEADER_SIZE,
                actual: total,
            });
        }
        let mut header_buf = [0u8; HEADER_SIZE];
        header_buf.copy_from_slice(&bytes[..HEADER_SIZE]);
        let header = CrtHeader::from_bytes(&header_buf);

        let meta_range = region(
            header.feature_offset as usize,
            header.feature_size as usize,
            total,
        )?;
        let meta = Arc::new(MetaCart::from_bytes(&bytes[meta_range])?);

        let index_range = region(
            header.cart_idx_offset as usize,
            header.cart_idx_num as usize * INDEX_ENTRY_SIZE,
            total,
        )?;
        let entries: Vec<CrtIndexEntry> = bytes[index_range]
            .chunks_exact(INDEX_ENTRY_SIZE)
            .map(|chunk| {
                let mut buf = [0u8; INDEX_ENTRY_SIZE];
                buf.copy_from_slice(chunk);
                CrtIndexEntry::from_bytes(&buf)
            })
            .collect();
        check_unique(entries.iter().map(|e| e.unit_type_id))?;

        let file = Self {
            header,
            meta,
            entries,
            bytes,
        };
        for entry in &file.entries {
            file.entry_range(entry)?;
        }
        Ok(file)
    }

    fn entry_range(&self, entry: &CrtIndexEntry) -> Result<Range<usize>, CrtError> {
        let (Ok(start), Ok(size)) = (
            usize::try_from(entry.start_offset),
            usize::try_from(entry.size_in_bytes),
        ) else {
            return Err(CrtError::Corrupt(format!(
                "unit {} has negative offset {} or size {}",
                entry.unit_type_id, entry.start_offset, entry.size_in_bytes
            )));
        };
        region(
            self.header.cart_data_offset as usize + start,
            size,
            self.bytes.len(),
        )
    }

    pub fn header(&self) -> &CrtHeader {
        &self.header
    }

    pub fn meta(&self) -> &Arc<MetaCart> {
        &self.meta
    }

    pub fn entries(&self) -> &[CrtIndexEntry] {
        &self.entries
    }

    pub fn entry(&self, unit_type_id: i16) -> Option<&CrtIndexEntry> {
        self.entries.iter().find(|e| e.unit_type_id == unit_type_id)
    }

    /// Raw binary tree of a unit.
    pub fn tree_bytes(&self, unit_type_id: i16) -> Result<&[u8], CrtError> {
        let entry = self
            .entry(unit_type_id)
            .ok_or(CrtError::UnknownUnit(unit_type_id))?;
        let range = self.entry_range(entry)?;
        Ok(&self.bytes[range])
    }

    /// Decode the tree of a unit against the file's metadata.
    pub fn load_tree(&self, unit_type_id: i16) -> Result<CartTree, CrtError> {
        let bytes = self.tree_bytes(unit_type_id)?;
        CartTree::from_binary_bytes(bytes, self.meta.clone()).map_err(|source| CrtError::Tree {
            unit: unit_type_id.to_string(),
            source,
        })
    }

    pub fn summary(&self) -> CrtSummary {
        CrtSummary {
            header: self.header,
            entries: self.entries.clone(),
        }
    }
}
