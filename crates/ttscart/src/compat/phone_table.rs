//! Phone and tone symbol tables of a voice.
//!
//! ```text
//! # comment
//! [phones]
//! sil 0
//! a   1
//! [tones]
//! t1  1
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::ConversionError;
use crate::io::text::read_text_file;

/// Bidirectional symbol <-> id map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    to_id: HashMap<String, i32>,
    to_symbol: BTreeMap<i32, String>,
}

impl SymbolTable {
    /// Add a mapping. Symbols and ids must both be unused.
    pub fn insert(&mut self, symbol: &str, id: i32) -> Result<(), (&'static str, String)> {
        if self.to_id.contains_key(symbol) {
            return Err(("symbol", symbol.to_string()));
        }
        if self.to_symbol.contains_key(&id) {
            return Err(("id", id.to_string()));
        }
        self.to_id.insert(symbol.to_string(), id);
        self.to_symbol.insert(id, symbol.to_string());
        Ok(())
    }

    pub fn id(&self, symbol: &str) -> Option<i32> {
        self.to_id.get(symbol).copied()
    }

    pub fn symbol(&self, id: i32) -> Option<&str> {
        self.to_symbol.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.to_symbol.len()
    }

    pub fn is_empty(&self) -> bool {
        self.to_symbol.is_empty()
    }

    /// `(id, symbol)` pairs ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &str)> {
        self.to_symbol.iter().map(|(&id, s)| (id, s.as_str()))
    }
}

#[derive(Clone, Copy)]
enum Section {
    Phones,
    Tones,
}

/// Phone and tone tables used by the context-phone and tone feature kinds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhoneTable {
    phones: SymbolTable,
    tones: SymbolTable,
}

impl PhoneTable {
    pub fn new(phones: SymbolTable, tones: SymbolTable) -> Self {
        Self { phones, tones }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConversionError> {
        Self::parse(&read_text_file(path.as_ref())?)
    }

    pub fn parse(content: &str) -> Result<Self, ConversionError> {
        let mut table = PhoneTable::default();
        let mut section = None;

        for (line_idx, raw) in content.lines().enumerate() {
            let line = line_idx + 1;
            let text = raw.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }

            if let Some(name) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
                section = Some(match name.trim() {
                    "phones" => Section::Phones,
                    "tones" => Section::Tones,
                    other => {
                        return Err(ConversionError::UnknownSection {
                            line,
                            name: other.to_string(),
                        })
                    }
                });
                continue;
            }

            let Some(section) = section else {
                return Err(ConversionError::NoSection { line });
            };

            let mut parts = text.split_whitespace();
            let (Some(symbol), Some(id), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err(ConversionError::MalformedLine {
                    line,
                    content: text.to_string(),
                });
            };
            let id: i32 = id.parse().map_err(|_| ConversionError::InvalidId {
                line,
                value: id.to_string(),
            })?;

            let target = match section {
                Section::Phones => &mut table.phones,
                Section::Tones => &mut table.tones,
            };
            target
                .insert(symbol, id)
                .map_err(|(what, value)| ConversionError::Duplicate { line, what, value })?;
        }

        Ok(table)
    }

    pub fn phones(&self) -> &SymbolTable {
        &self.phones
    }

    pub fn tones(&self) -> &SymbolTable {
        &self.tones
    }
}
