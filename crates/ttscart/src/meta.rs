//! Feature metadata shared by every tree of a voice.
//!
//! A [`MetaCart`] maps the integer feature ids used inside question logic to
//! [`FeatureQuestion`]s: "is the unit's `kind` slot one of these values?".
//! It is loaded once from a CART question description file whose lines read
//!
//! ```text
//! <id> <kind name or kind id> <value>,<value>,...
//! ```
//!
//! and is then shared immutably (via `Arc`) by all trees built against it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::io::text::{read_text_file, TextFormatError};

// =============================================================================
// Error types
// =============================================================================

/// Errors raised while building or decoding a [`MetaCart`].
#[derive(Debug, thiserror::Error)]
pub enum MetaCartError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: expected '<id> <kind> <values>', got {content:?}")]
    MalformedLine { line: usize, content: String },
    #[error("line {line}: invalid feature id {value:?}")]
    InvalidId { line: usize, value: String },
    #[error("line {line}: unknown feature kind {kind:?}")]
    UnknownKind { line: usize, kind: String },
    #[error("line {line}: invalid feature value {value:?}")]
    InvalidValue { line: usize, value: String },
    #[error("line {line}: {source}")]
    Line {
        line: usize,
        #[source]
        source: Box<MetaCartError>,
    },
    #[error("cannot decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("feature {0} has no values")]
    NoValues(u32),
    #[error("duplicate feature id {0}")]
    DuplicateId(u32),
    #[error("unknown feature kind id {0} in metadata block")]
    UnknownKindId(u8),
    #[error("metadata encoding error: {0}")]
    Encoding(#[from] postcard::Error),
}

// =============================================================================
// Feature kinds and unit features
// =============================================================================

/// Unit feature slot a question can test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FeatureKind {
    LeftPhone = 0,
    RightPhone = 1,
    LeftTone = 2,
    RightTone = 3,
    PosInSentence = 4,
    PosInWord = 5,
    PosInSyllable = 6,
    Stress = 7,
    Emphasis = 8,
}

impl FeatureKind {
    /// All kinds, ordered by id.
    pub const ALL: [FeatureKind; 9] = [
        FeatureKind::LeftPhone,
        FeatureKind::RightPhone,
        FeatureKind::LeftTone,
        FeatureKind::RightTone,
        FeatureKind::PosInSentence,
        FeatureKind::PosInWord,
        FeatureKind::PosInSyllable,
        FeatureKind::Stress,
        FeatureKind::Emphasis,
    ];

    /// Stable numeric id used by id-encoded question files.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Convert from the numeric id, returning None for unknown values.
    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Name used by symbolic question files.
    pub fn name(self) -> &'static str {
        match self {
            FeatureKind::LeftPhone => "LeftPhone",
            FeatureKind::RightPhone => "RightPhone",
            FeatureKind::LeftTone => "LeftTone",
            FeatureKind::RightTone => "RightTone",
            FeatureKind::PosInSentence => "PosInSentence",
            FeatureKind::PosInWord => "PosInWord",
            FeatureKind::PosInSyllable => "PosInSyllable",
            FeatureKind::Stress => "Stress",
            FeatureKind::Emphasis => "Emphasis",
        }
    }

    /// Look a kind up by its name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    /// Accept either a numeric id or a name.
    pub fn parse(token: &str) -> Option<Self> {
        match token.parse::<u8>() {
            Ok(id) => Self::from_id(id),
            Err(_) => Self::from_name(token),
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Read-only access to the feature vector of one unit instance.
///
/// Values are the id-encoded forms: phone and tone ids from the voice's phone
/// table, enum ordinals for positional and prosodic slots.
pub trait UnitFeature {
    fn value(&self, kind: FeatureKind) -> i32;
}

/// Plain feature vector of a TTS unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TtsUnitFeature {
    pub left_phone: i32,
    pub right_phone: i32,
    pub left_tone: i32,
    pub right_tone: i32,
    pub pos_in_sentence: i32,
    pub pos_in_word: i32,
    pub pos_in_syllable: i32,
    pub stress: i32,
    pub emphasis: i32,
}

impl TtsUnitFeature {
    /// Return a copy with one slot replaced.
    pub fn with(mut self, kind: FeatureKind, value: i32) -> Self {
        *self.slot_mut(kind) = value;
        self
    }

    fn slot_mut(&mut self, kind: FeatureKind) -> &mut i32 {
        match kind {
            FeatureKind::LeftPhone => &mut self.left_phone,
            FeatureKind::RightPhone => &mut self.right_phone,
            FeatureKind::LeftTone => &mut self.left_tone,
            FeatureKind::RightTone => &mut self.right_tone,
            FeatureKind::PosInSentence => &mut self.pos_in_sentence,
            FeatureKind::PosInWord => &mut self.pos_in_word,
            FeatureKind::PosInSyllable => &mut self.pos_in_syllable,
            FeatureKind::Stress => &mut self.stress,
            FeatureKind::Emphasis => &mut self.emphasis,
        }
    }
}

impl UnitFeature for TtsUnitFeature {
    fn value(&self, kind: FeatureKind) -> i32 {
        match kind {
            FeatureKind::LeftPhone => self.left_phone,
            FeatureKind::RightPhone => self.right_phone,
            FeatureKind::LeftTone => self.left_tone,
            FeatureKind::RightTone => self.right_tone,
            FeatureKind::PosInSentence => self.pos_in_sentence,
            FeatureKind::PosInWord => self.pos_in_word,
            FeatureKind::PosInSyllable => self.pos_in_syllable,
            FeatureKind::Stress => self.stress,
            FeatureKind::Emphasis => self.emphasis,
        }
    }
}

// =============================================================================
// FeatureQuestion
// =============================================================================

/// One entry of the MetaCart: a set-membership test on a single slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureQuestion {
    pub id: u32,
    pub kind: FeatureKind,
    pub values: BTreeSet<i32>,
}

impl FeatureQuestion {
    pub fn new(id: u32, kind: FeatureKind, values: impl IntoIterator<Item = i32>) -> Self {
        Self {
            id,
            kind,
            values: values.into_iter().collect(),
        }
    }

    /// True iff the unit's value for this kind is in the value set.
    #[inline]
    pub fn test<F: UnitFeature + ?Sized>(&self, feature: &F) -> bool {
        self.values.contains(&feature.value(self.kind))
    }

    /// Human-readable form, e.g. `LeftPhone=3,5`.
    pub fn description(&self) -> String {
        let values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
        format!("{}={}", self.kind, values.join(","))
    }
}

// =============================================================================
// MetaCart
// =============================================================================

/// Feature-id table plus the language context of a voice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaCart {
    language: u32,
    features: BTreeMap<u32, FeatureQuestion>,
}

impl MetaCart {
    /// Create an empty table for the given language id.
    pub fn new(language: u32) -> Self {
        Self {
            language,
            features: BTreeMap::new(),
        }
    }

    /// Set the language id (builder pattern).
    pub fn with_language(mut self, language: u32) -> Self {
        self.language = language;
        self
    }

    /// Add a feature question. Ids must be unique and value sets non-empty.
    pub fn insert(&mut self, question: FeatureQuestion) -> Result<(), MetaCartError> {
        if question.values.is_empty() {
            return Err(MetaCartError::NoValues(question.id));
        }
        if self.features.contains_key(&question.id) {
            return Err(MetaCartError::DuplicateId(question.id));
        }
        self.features.insert(question.id, question);
        Ok(())
    }

    /// Load an id-encoded question description file.
    ///
    /// UTF-8 and UTF-16 files are accepted; see [`read_text_file`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MetaCartError> {
        let path = path.as_ref();
        let content = read_text_file(path).map_err(|e| match e {
            TextFormatError::Io { path, source } => MetaCartError::Io { path, source },
            other => MetaCartError::Decode {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })?;
        Self::parse(&content)
    }

    /// Parse an id-encoded question description.
    ///
    /// Blank lines and lines starting with `#` are skipped.
    pub fn parse(content: &str) -> Result<Self, MetaCartError> {
        let mut meta = MetaCart::default();

        for (line_idx, raw) in content.lines().enumerate() {
            let line = line_idx + 1;
            let trimmed = raw.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let mut parts = trimmed.split_whitespace();
            let (Some(id), Some(kind), Some(values), None) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                return Err(MetaCartError::MalformedLine {
                    line,
                    content: trimmed.to_string(),
                });
            };

            let id: u32 = id.parse().map_err(|_| MetaCartError::InvalidId {
                line,
                value: id.to_string(),
            })?;
            let kind = FeatureKind::parse(kind).ok_or_else(|| MetaCartError::UnknownKind {
                line,
                kind: kind.to_string(),
            })?;
            let values = values
                .split(',')
                .filter(|v| !v.is_empty())
                .map(|v| {
                    v.parse::<i32>().map_err(|_| MetaCartError::InvalidValue {
                        line,
                        value: v.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            meta.insert(FeatureQuestion::new(id, kind, values))
                .map_err(|source| MetaCartError::Line {
                    line,
                    source: Box::new(source),
                })?;
        }

        Ok(meta)
    }

    /// Language id of the voice.
    pub fn language(&self) -> u32 {
        self.language
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn contains(&self, id: u32) -> bool {
        self.features.contains_key(&id)
    }

    pub fn feature(&self, id: u32) -> Option<&FeatureQuestion> {
        self.features.get(&id)
    }

    /// Feature questions ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureQuestion> {
        self.features.values()
    }

    /// Evaluate feature `id` against a unit. Unknown ids never pass.
    #[inline]
    pub fn test<F: UnitFeature + ?Sized>(&self, id: u32, feature: &F) -> bool {
        debug_assert!(self.contains(id), "feature id {id} missing from MetaCart");
        self.features.get(&id).is_some_and(|q| q.test(feature))
    }

    /// Human-readable description of feature `id`.
    pub fn description(&self, id: u32) -> Option<String> {
        self.features.get(&id).map(FeatureQuestion::description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# id kind values
0 LeftPhone 3,5
1 4 1
2 Stress 1,2
";

    #[test]
    fn parse_names_and_ids() {
        let meta = MetaCart::parse(SAMPLE).unwrap();
        assert_eq!(meta.len(), 3);
        assert_eq!(meta.feature(0).unwrap().kind, FeatureKind::LeftPhone);
        assert_eq!(meta.feature(1).unwrap().kind, FeatureKind::PosInSentence);
        assert_eq!(meta.description(0).unwrap(), "LeftPhone=3,5");
        assert_eq!(meta.description(2).unwrap(), "Stress=1,2");
    }

    #[test]
    fn feature_test_is_set_membership() {
        let meta = MetaCart::parse(SAMPLE).unwrap();
        let unit = TtsUnitFeature::default().with(FeatureKind::LeftPhone, 5);
        assert!(meta.test(0, &unit));
        assert!(!meta.test(0, &unit.with(FeatureKind::LeftPhone, 4)));
        assert!(!meta.test(2, &unit));
    }

    #[test]
    fn parse_rejects_duplicates() {
        let err = MetaCart::parse("0 LeftPhone 1\n\n0 RightPhone 2\n").unwrap_err();
        assert!(
            matches!(&err, MetaCartError::Line { line: 3, source } if matches!(**source, MetaCartError::DuplicateId(0))),
            "got: {err:?}"
        );
        assert_eq!(err.to_string(), "line 3: duplicate feature id 0");
    }

    #[test]
    fn parse_rejects_empty_value_list() {
        let err = MetaCart::parse("0 LeftPhone 1\n1 Stress ,\n").unwrap_err();
        assert!(
            matches!(&err, MetaCartError::Line { line: 2, source } if matches!(**source, MetaCartError::NoValues(1))),
            "got: {err:?}"
        );
    }

    #[test]
    fn insert_rejects_duplicates() {
        let mut meta = MetaCart::new(0);
        meta.insert(FeatureQuestion::new(0, FeatureKind::LeftPhone, [1])).unwrap();
        let err = meta
            .insert(FeatureQuestion::new(0, FeatureKind::Stress, [1]))
            .unwrap_err();
        assert!(matches!(err, MetaCartError::DuplicateId(0)));
    }

    #[test]
    fn load_accepts_utf16_and_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let utf16 = dir.path().join("questions16.txt");
        let utf8 = dir.path().join("questions8.txt");
        crate::io::text::write_text_file(&utf16, &SAMPLE.replace('\n', "\r\n")).unwrap();
        std::fs::write(&utf8, SAMPLE).unwrap();

        let from_utf16 = MetaCart::load(&utf16).unwrap();
        assert_eq!(from_utf16, MetaCart::load(&utf8).unwrap());
        assert_eq!(from_utf16.len(), 3);
    }

    #[test]
    fn load_reports_missing_file_and_bad_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.txt");
        let err = MetaCart::load(&missing).unwrap_err();
        assert!(
            matches!(&err, MetaCartError::Io { path, source } if path == &missing && source.kind() == std::io::ErrorKind::NotFound),
            "got: {err:?}"
        );

        let odd = dir.path().join("odd.txt");
        std::fs::write(&odd, [0xFF, 0xFE, b'0']).unwrap();
        let err = MetaCart::load(&odd).unwrap_err();
        assert!(matches!(err, MetaCartError::Decode { .. }), "got: {err:?}");
    }

    #[test]
    fn parse_reports_line_numbers() {
        let err = MetaCart::parse("0 LeftPhone 1\n\n1 Nasal 2\n").unwrap_err();
        assert!(matches!(err, MetaCartError::UnknownKind { line: 3, .. }), "got: {err:?}");

        let err = MetaCart::parse("0 LeftPhone 1,x\n").unwrap_err();
        assert!(matches!(err, MetaCartError::InvalidValue { line: 1, .. }), "got: {err:?}");

        let err = MetaCart::parse("0 LeftPhone\n").unwrap_err();
        assert!(matches!(err, MetaCartError::MalformedLine { line: 1, .. }), "got: {err:?}");
    }

    #[test]
    fn feature_kind_ids_are_stable() {
        for kind in FeatureKind::ALL {
            assert_eq!(FeatureKind::from_id(kind.id()), Some(kind));
            assert_eq!(FeatureKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(FeatureKind::from_id(9), None);
        assert_eq!(FeatureKind::parse("7"), Some(FeatureKind::Stress));
    }
}
