//! Conversion between symbolic and id-encoded CART question files.
//!
//! Question files list one feature question per line:
//!
//! ```text
//! <index> <feature kind> <value>,<value>,...
//! ```
//!
//! Symbolic files name kinds and values (`3 LeftPhone a,b`); id-encoded files,
//! the form [`MetaCart`](crate::MetaCart) loads, use numbers throughout
//! (`3 0 1,2`).

pub mod codec;
pub mod phone_table;
pub mod question_file;

pub use codec::{FeatureCodec, FeatureCodecRegistry};
pub use phone_table::{PhoneTable, SymbolTable};
pub use question_file::{filter_questions, id_to_string, string_to_id, DroppedQuestion, FilterOutcome};

use crate::io::text::TextFormatError;
use crate::meta::FeatureKind;

/// Errors raised by phone tables and question file conversion.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error(transparent)]
    Text(#[from] TextFormatError),
    #[error("line {line}: malformed line {content:?}")]
    MalformedLine { line: usize, content: String },
    #[error("line {line}: unknown section [{name}]")]
    UnknownSection { line: usize, name: String },
    #[error("line {line}: entry outside of a [phones] or [tones] section")]
    NoSection { line: usize },
    #[error("line {line}: duplicate {what} {value:?}")]
    Duplicate {
        line: usize,
        what: &'static str,
        value: String,
    },
    #[error("line {line}: invalid id {value:?}")]
    InvalidId { line: usize, value: String },
    #[error("line {line}: unknown {kind} symbol {symbol:?}")]
    UnknownSymbol {
        line: usize,
        kind: FeatureKind,
        symbol: String,
    },
    #[error("line {line}: unknown {kind} id {value:?}")]
    UnknownId {
        line: usize,
        kind: FeatureKind,
        value: String,
    },
}
