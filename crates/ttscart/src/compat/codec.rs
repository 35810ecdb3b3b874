//! Symbol codecs for each feature kind.
//!
//! A [`FeatureCodec`] translates the value symbols of one feature kind to and
//! from the integer ids stored in id-encoded question files. The
//! [`FeatureCodecRegistry`] looks codecs up by kind name (symbolic files) or
//! kind id (id-encoded files) and can be extended with [`register`].
//!
//! [`register`]: FeatureCodecRegistry::register

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use super::phone_table::{PhoneTable, SymbolTable};
use crate::meta::FeatureKind;

type EncodeFn = Box<dyn Fn(&str) -> Option<i32> + Send + Sync>;
type DecodeFn = Box<dyn Fn(i32) -> Option<String> + Send + Sync>;

/// Symbols of the positional kinds (PosInSentence, PosInWord, PosInSyllable).
pub const POSITION_SYMBOLS: &[(&str, i32)] = &[
    ("Unknown", 0),
    ("Initial", 1),
    ("Medial", 2),
    ("Final", 3),
    ("Single", 4),
];

/// Symbols of the Stress kind.
pub const STRESS_SYMBOLS: &[(&str, i32)] = &[("None", 0), ("Primary", 1), ("Secondary", 2)];

/// Symbols of the Emphasis kind.
pub const EMPHASIS_SYMBOLS: &[(&str, i32)] = &[("None", 0), ("Emphasized", 1)];

// =============================================================================
// FeatureCodec
// =============================================================================

/// Encode/decode pair for the values of one feature kind.
pub struct FeatureCodec {
    kind: FeatureKind,
    name: String,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl FeatureCodec {
    pub fn new(
        kind: FeatureKind,
        name: impl Into<String>,
        encode: impl Fn(&str) -> Option<i32> + Send + Sync + 'static,
        decode: impl Fn(i32) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }

    /// Codec backed by a fixed symbol table.
    pub fn from_symbols(kind: FeatureKind, symbols: &[(&str, i32)]) -> Self {
        let to_id: HashMap<String, i32> = symbols.iter().map(|&(s, id)| (s.to_string(), id)).collect();
        let to_symbol: BTreeMap<i32, String> =
            symbols.iter().map(|&(s, id)| (id, s.to_string())).collect();
        Self::new(
            kind,
            kind.name(),
            move |symbol| to_id.get(symbol).copied(),
            move |id| to_symbol.get(&id).cloned(),
        )
    }

    /// Codec backed by a shared phone or tone table.
    pub fn from_table(kind: FeatureKind, table: Arc<SymbolTable>) -> Self {
        let decode_table = table.clone();
        Self::new(
            kind,
            kind.name(),
            move |symbol| table.id(symbol),
            move |id| decode_table.symbol(id).map(str::to_string),
        )
    }

    pub fn kind(&self) -> FeatureKind {
        self.kind
    }

    /// Kind name used by symbolic question files.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encode(&self, symbol: &str) -> Option<i32> {
        (self.encode)(symbol)
    }

    pub fn decode(&self, id: i32) -> Option<String> {
        (self.decode)(id)
    }
}

impl fmt::Debug for FeatureCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureCodec")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// FeatureCodecRegistry
// =============================================================================

/// Codecs keyed by kind name and kind id.
#[derive(Debug, Default)]
pub struct FeatureCodecRegistry {
    codecs: Vec<FeatureCodec>,
    by_name: HashMap<String, usize>,
    by_kind: HashMap<FeatureKind, usize>,
}

impl FeatureCodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry covering every [`FeatureKind`]: phone kinds from the phone
    /// table, tone kinds from the tone table, the rest from fixed symbol sets.
    pub fn with_defaults(table: &PhoneTable) -> Self {
        let phones = Arc::new(table.phones().clone());
        let tones = Arc::new(table.tones().clone());

        let mut registry = Self::new();
        registry.register(FeatureCodec::from_table(FeatureKind::LeftPhone, phones.clone()));
        registry.register(FeatureCodec::from_table(FeatureKind::RightPhone, phones));
        registry.register(FeatureCodec::from_table(FeatureKind::LeftTone, tones.clone()));
        registry.register(FeatureCodec::from_table(FeatureKind::RightTone, tones));
        for kind in [
            FeatureKind::PosInSentence,
            FeatureKind::PosInWord,
            FeatureKind::PosInSyllable,
        ] {
            registry.register(FeatureCodec::from_symbols(kind, POSITION_SYMBOLS));
        }
        registry.register(FeatureCodec::from_symbols(FeatureKind::Stress, STRESS_SYMBOLS));
        registry.register(FeatureCodec::from_symbols(FeatureKind::Emphasis, EMPHASIS_SYMBOLS));
        registry
    }

    /// Add a codec. A later codec replaces earlier ones with the same name or
    /// kind.
    pub fn register(&mut self, codec: FeatureCodec) {
        let idx = self.codecs.len();
        self.by_name.insert(codec.name.clone(), idx);
        self.by_kind.insert(codec.kind, idx);
        self.codecs.push(codec);
    }

    pub fn by_name(&self, name: &str) -> Option<&FeatureCodec> {
        self.by_name.get(name).map(|&i| &self.codecs[i])
    }

    pub fn by_kind(&self, kind: FeatureKind) -> Option<&FeatureCodec> {
        self.by_kind.get(&kind).map(|&i| &self.codecs[i])
    }

    /// Codec for a numeric kind id token, as written in id-encoded files.
    pub fn by_kind_id(&self, token: &str) -> Option<&FeatureCodec> {
        let kind = FeatureKind::from_id(token.parse().ok()?)?;
        self.by_kind(kind)
    }
}
