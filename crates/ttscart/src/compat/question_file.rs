//! String2Id, Id2String and question filtering.
//!
//! Blank lines and `#` comments are copied through. Lines whose feature kind
//! has no registered codec are copied through unchanged and logged; values of
//! a recognized kind must all translate.

use std::fmt::Write as _;

use tracing::{debug, warn};

use super::codec::{FeatureCodec, FeatureCodecRegistry};
use super::ConversionError;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToId,
    ToSymbol,
}

/// The three fields of a question line.
struct QuestionLine<'a> {
    index: &'a str,
    kind: &'a str,
    values: &'a str,
}

impl<'a> QuestionLine<'a> {
    fn split(text: &'a str) -> Option<Self> {
        let mut parts = text.split_whitespace();
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(index), Some(kind), Some(values), None) => Some(Self {
                index,
                kind,
                values,
            }),
            _ => None,
        }
    }

    fn values(&self) -> impl Iterator<Item = &'a str> {
        self.values.split(',').filter(|v| !v.is_empty())
    }
}

fn translate_value(
    codec: &FeatureCodec,
    value: &str,
    line: usize,
    direction: Direction,
) -> Result<String, ConversionError> {
    match direction {
        Direction::ToId => codec
            .encode(value)
            .map(|id| id.to_string())
            .ok_or_else(|| ConversionError::UnknownSymbol {
                line,
                kind: codec.kind(),
                symbol: value.to_string(),
            }),
        Direction::ToSymbol => value
            .parse::<i32>()
            .ok()
            .and_then(|id| codec.decode(id))
            .ok_or_else(|| ConversionError::UnknownId {
                line,
                kind: codec.kind(),
                value: value.to_string(),
            }),
    }
}

fn convert(
    text: &str,
    registry: &FeatureCodecRegistry,
    direction: Direction,
) -> Result<String, ConversionError> {
    let mut out = String::with_capacity(text.len());
    let mut converted = 0usize;

    for (line_idx, raw) in text.lines().enumerate() {
        let line = line_idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            out.push_str(trimmed);
            out.push('\n');
            continue;
        }

        let question = QuestionLine::split(trimmed).ok_or_else(|| ConversionError::MalformedLine {
            line,
            content: trimmed.to_string(),
        })?;

        let codec = match direction {
            Direction::ToId => registry.by_name(question.kind),
            Direction::ToSymbol => registry.by_kind_id(question.kind),
        };
        let Some(codec) = codec else {
            warn!(line, kind = question.kind, "unrecognized feature kind, line copied unchanged");
            out.push_str(trimmed);
            out.push('\n');
            continue;
        };

        let values = question
            .values()
            .map(|v| translate_value(codec, v, line, direction))
            .collect::<Result<Vec<_>, _>>()?;
        let kind = match direction {
            Direction::ToId => codec.kind().id().to_string(),
            Direction::ToSymbol => codec.name().to_string(),
        };
        // Writing to a String cannot fail.
        let _ = writeln!(out, "{} {} {}", question.index, kind, values.join(","));
        converted += 1;
    }

    debug!(lines = converted, "converted question lines");
    Ok(out)
}

/// Translate a symbolic question file to its id-encoded form.
pub fn string_to_id(text: &str, registry: &FeatureCodecRegistry) -> Result<String, ConversionError> {
    convert(text, registry, Direction::ToId)
}

/// Translate an id-encoded question file to its symbolic form.
pub fn id_to_string(text: &str, registry: &FeatureCodecRegistry) -> Result<String, ConversionError> {
    convert(text, registry, Direction::ToSymbol)
}

/// A question line removed by [`filter_questions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedQuestion {
    pub line: usize,
    pub content: String,
    pub reason: String,
}

/// Result of [`filter_questions`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOutcome {
    /// The kept lines, comments included.
    pub text: String,
    /// Number of question lines kept.
    pub kept: usize,
    pub dropped: Vec<DroppedQuestion>,
}

/// Keep the symbolic question lines that [`string_to_id`] can translate.
///
/// Malformed lines, unregistered kinds and lines with an unknown value are
/// dropped and reported. Blank lines are dropped silently.
pub fn filter_questions(text: &str, registry: &FeatureCodecRegistry) -> FilterOutcome {
    let mut outcome = FilterOutcome::default();

    for (line_idx, raw) in text.lines().enumerate() {
        let line = line_idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('#') {
            outcome.text.push_str(trimmed);
            outcome.text.push('\n');
            continue;
        }

        let reason = match QuestionLine::split(trimmed) {
            None => Some("malformed line".to_string()),
            Some(question) => match registry.by_name(question.kind) {
                None => Some(format!("unrecognized feature kind {:?}", question.kind)),
                Some(codec) => question
                    .values()
                    .find(|v| codec.encode(v).is_none())
                    .map(|v| format!("unknown {} symbol {:?}", codec.kind(), v)),
            },
        };

        match reason {
            None => {
                outcome.text.push_str(trimmed);
                outcome.text.push('\n');
                outcome.kept += 1;
            }
            Some(reason) => {
                warn!(line, %reason, "dropped question line");
                outcome.dropped.push(DroppedQuestion {
                    line,
                    content: trimmed.to_string(),
                    reason,
                });
            }
        }
    }

    outcome
}
