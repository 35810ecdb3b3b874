//! Per-unit tree collection and CRT composition.
//!
//! A voice owns one [`CartTree`] per unit type, all built against the same
//! [`MetaCart`]. [`CartTreeManager`] keys them by unit id and packs them into
//! a CRT file (see [`crate::io::crt`]), either from pre-built `.tree` files
//! named by a unit list or from the trees it holds.
//!
//! Unit ids are 1-based positions in the unit list. A leading `_sil_` entry
//! is skipped and does not consume an id.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{ComposeConfig, ConfigError};
use crate::io::crt::{assemble, CrtError, CrtFile, CrtSummary, SILENCE_UNIT};
use crate::io::text::decode_text;
use crate::meta::{MetaCart, MetaCartError};
use crate::repr::tree::CartTree;

// =============================================================================
// File helpers
// =============================================================================

fn read_file(path: &Path) -> Result<Vec<u8>, CrtError> {
    std::fs::read(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => CrtError::NotFound(path.to_path_buf()),
        _ => CrtError::Io {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn read_text(path: &Path) -> Result<String, CrtError> {
    decode_text(&read_file(path)?).map_err(|e| CrtError::Corrupt(format!("{}: {e}", path.display())))
}

/// Write `bytes` to a sibling temporary file, then rename it over `path`.
///
/// On failure the temporary file is removed and `path` is left untouched.
fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CrtError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| CrtError::Corrupt(format!("{} is not a file path", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(format!(".tmp.{}", std::process::id()));
    let tmp_path = path.with_file_name(tmp_name);

    let result = std::fs::File::create(&tmp_path)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&tmp_path, path));
    if let Err(source) = result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(CrtError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Read an id-encoded question file in any supported text encoding.
pub fn load_question_file(path: &Path) -> Result<MetaCart, CrtError> {
    MetaCart::load(path).map_err(|e| match e {
        MetaCartError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
            CrtError::NotFound(path)
        }
        other => other.into(),
    })
}

/// Unit names of a unit list, in order.
///
/// Lines are trimmed and blank lines skipped. `_sil_` is dropped when it is
/// the first unit and rejected anywhere else; `source` names the list in that
/// error.
pub fn parse_unit_list(content: &str, source: &Path) -> Result<Vec<String>, CrtError> {
    let mut units = Vec::new();
    let mut first = true;

    for (line_idx, raw) in content.lines().enumerate() {
        let name = raw.trim();
        if name.is_empty() {
            continue;
        }
        if name == SILENCE_UNIT {
            if !first {
                return Err(CrtError::MisplacedSilence {
                    path: source.to_path_buf(),
                    line: line_idx + 1,
                });
            }
        } else {
            units.push(name.to_string());
        }
        first = false;
    }

    Ok(units)
}

// =============================================================================
// CartTreeManager
// =============================================================================

/// Trees of a voice keyed by unit id, sharing one [`MetaCart`].
#[derive(Debug, Clone)]
pub struct CartTreeManager {
    meta: Arc<MetaCart>,
    trees: BTreeMap<i16, CartTree>,
}

impl CartTreeManager {
    pub fn new(meta: Arc<MetaCart>) -> Self {
        Self {
            meta,
            trees: BTreeMap::new(),
        }
    }

    /// Empty manager over the MetaCart of an id-encoded question file.
    pub fn from_question_file(path: impl AsRef<Path>) -> Result<Self, CrtError> {
        Ok(Self::new(Arc::new(load_question_file(path.as_ref())?)))
    }

    pub fn meta(&self) -> &Arc<MetaCart> {
        &self.meta
    }

    /// Add or replace the tree of `unit_id`, returning the previous one.
    pub fn insert_tree(&mut self, unit_id: i16, tree: CartTree) -> Option<CartTree> {
        self.trees.insert(unit_id, tree)
    }

    pub fn tree(&self, unit_id: i16) -> Option<&CartTree> {
        self.trees.get(&unit_id)
    }

    /// Trees ordered by unit id.
    pub fn trees(&self) -> impl Iterator<Item = (i16, &CartTree)> {
        self.trees.iter().map(|(&id, tree)| (id, tree))
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    // =========================================================================
    // Composition
    // =========================================================================

    /// Pack the pre-built tree files named by a unit list into one CRT file.
    ///
    /// Every input is read and checked before the output is written, so a
    /// failure leaves no output file behind.
    pub fn compose_crt_file(config: &ComposeConfig) -> Result<CrtSummary, CrtError> {
        let meta = load_question_file(&config.question_file)?.with_language(config.language);
        let meta_block = meta.to_bytes()?;
        let meta = Arc::new(meta);
        debug!(
            features = meta.len(),
            block_size = meta_block.len(),
            "encoded metadata block"
        );

        let units = parse_unit_list(&read_text(&config.unit_list)?, &config.unit_list)?;
        if units.len() > i16::MAX as usize {
            return Err(CrtError::TooManyUnits(units.len()));
        }

        let mut trees = Vec::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            let unit_id = i16::try_from(i + 1).map_err(|_| CrtError::TooManyUnits(units.len()))?;
            let path = config.tree_path(unit);
            let blob = read_file(&path)?;
            if config.verify_trees {
                CartTree::from_binary_bytes(&blob, meta.clone()).map_err(|source| {
                    CrtError::Tree {
                        unit: unit.clone(),
                        source,
                    }
                })?;
            }
            debug!(unit = %unit, unit_id, size = blob.len(), "packed unit tree");
            trees.push((unit_id, blob));
        }

        let (bytes, summary) = assemble(config.version, &meta_block, &trees)?;
        write_file(&config.output, &bytes)?;
        info!(
            output = %config.output.display(),
            units = trees.len(),
            size = bytes.len(),
            "composed CRT file"
        );
        Ok(summary)
    }

    /// Pack the trees held by this manager, in unit id order.
    pub fn compose_from_trees(
        &self,
        output: impl AsRef<Path>,
        version: u32,
    ) -> Result<CrtSummary, CrtError> {
        if version == 0 {
            return Err(ConfigError::InvalidVersion.into());
        }
        let output = output.as_ref();
        let meta_block = self.meta.to_bytes()?;

        let trees = self
            .trees
            .iter()
            .map(|(&unit_id, tree)| {
                tree.to_binary_bytes()
                    .map(|blob| (unit_id, blob))
                    .map_err(|source| CrtError::Tree {
                        unit: unit_id.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (bytes, summary) = assemble(version, &meta_block, &trees)?;
        write_file(output, &bytes)?;
        info!(
            output = %output.display(),
            units = trees.len(),
            size = bytes.len(),
            "composed CRT file from trees"
        );
        Ok(summary)
    }

    /// Load every tree indexed by a CRT file.
    pub fn load_crt(path: impl AsRef<Path>) -> Result<Self, CrtError> {
        let file = CrtFile::open(path)?;
        let mut manager = Self::new(file.meta().clone());
        for entry in file.entries() {
            let tree = file.load_tree(entry.unit_type_id)?;
            debug!(
                unit_id = entry.unit_type_id,
                nodes = tree.n_nodes(),
                leaves = tree.n_leaves(),
                "loaded unit tree"
            );
            manager.insert_tree(entry.unit_type_id, tree);
        }
        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::crt::INDEX_ENTRY_SIZE;
    use crate::io::text::write_text_file;
    use crate::testing::{sample_meta, sample_tree, SAMPLE_QUESTIONS};
    use rstest::rstest;

    #[rstest]
    #[case("a\nb\n", &["a", "b"])]
    #[case("_sil_\na\n\n  b  \n", &["a", "b"])]
    #[case("\n\n_sil_\r\nx\r\n", &["x"])]
    #[case("", &[])]
    fn unit_list_entries(#[case] content: &str, #[case] expected: &[&str]) {
        let units = parse_unit_list(content, Path::new("units.txt")).unwrap();
        assert_eq!(units, expected);
    }

    #[test]
    fn silence_only_first() {
        let err = parse_unit_list("a\n\n_sil_\nb\n", Path::new("units.txt")).unwrap_err();
        assert!(
            matches!(err, CrtError::MisplacedSilence { line: 3, .. }),
            "got: {err:?}"
        );
        assert!(err.to_string().starts_with("units.txt:3:"));
    }

    #[test]
    fn compose_from_trees_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.crt");

        let mut manager = CartTreeManager::new(sample_meta());
        manager.insert_tree(3, sample_tree());
        manager.insert_tree(1, sample_tree());
        let summary = manager.compose_from_trees(&path, 1).unwrap();
        let ids: Vec<i16> = summary.entries.iter().map(|e| e.unit_type_id).collect();
        assert_eq!(ids, vec![1, 3]);

        let loaded = CartTreeManager::load_crt(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.meta().as_ref(), sample_meta().as_ref());
        assert_eq!(
            loaded.tree(3).unwrap().to_text().unwrap(),
            sample_tree().to_text().unwrap()
        );
    }

    #[test]
    fn compose_from_trees_replaces_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.crt");
        std::fs::write(&path, b"stale").unwrap();

        let mut manager = CartTreeManager::new(sample_meta());
        manager.insert_tree(1, sample_tree());
        manager.compose_from_trees(&path, 1).unwrap();

        assert!(CrtFile::open(&path).is_ok());
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("voice.crt")]);
    }

    #[test]
    fn failed_write_leaves_no_temporary_file() {
        let dir = tempfile::tempdir().unwrap();
        // A directory in the way makes the final rename fail.
        let path = dir.path().join("voice.crt");
        std::fs::create_dir(&path).unwrap();

        let mut manager = CartTreeManager::new(sample_meta());
        manager.insert_tree(1, sample_tree());
        let err = manager.compose_from_trees(&path, 1).unwrap_err();
        assert!(matches!(err, CrtError::Io { .. }), "got: {err:?}");

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("voice.crt")]);
        assert!(path.is_dir());
    }

    #[test]
    fn load_crt_rejects_duplicate_index_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.crt");

        let mut manager = CartTreeManager::new(sample_meta());
        manager.insert_tree(1, sample_tree());
        manager.insert_tree(2, sample_tree());
        let summary = manager.compose_from_trees(&path, 1).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let second = summary.header.cart_idx_offset as usize + INDEX_ENTRY_SIZE;
        bytes[second..second + 2].copy_from_slice(&1i16.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        let err = CartTreeManager::load_crt(&path).unwrap_err();
        assert!(matches!(err, CrtError::DuplicateUnit(1)), "got: {err:?}");
    }

    #[test]
    fn question_file_loading_accepts_utf16() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.txt");
        write_text_file(&path, SAMPLE_QUESTIONS).unwrap();
        let meta = load_question_file(&path).unwrap();
        assert_eq!(meta.with_language(1033), *sample_meta());
    }

    #[test]
    fn compose_from_trees_rejects_version_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("voice.crt");
        let err = CartTreeManager::new(sample_meta())
            .compose_from_trees(&path, 0)
            .unwrap_err();
        assert!(matches!(err, CrtError::Config(ConfigError::InvalidVersion)));
        assert!(!path.exists());
    }
}
