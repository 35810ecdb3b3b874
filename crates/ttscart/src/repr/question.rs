//! Branch questions: OR of ANDs of optionally negated feature tests.
//!
//! The text form joins terms with `|` and operands with `&`; a `~` prefix
//! negates an operand. `3&~7|12` reads "(3 and not 7) or 12", where each
//! number is a feature id of the tree's [`MetaCart`].
//!
//! Leaves carry no question. Text files mark that position with `*`, which is
//! never parsed into a [`Question`].

use std::fmt;

use crate::meta::{MetaCart, UnitFeature};

/// Errors raised while parsing or building a question.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionError {
    #[error("empty question logic")]
    Empty,
    #[error("question term has no operands")]
    EmptyTerm,
    #[error("invalid feature id {0:?} in question logic")]
    InvalidFeatureId(String),
    #[error("feature id {0} is not defined in the MetaCart")]
    UnknownFeature(u32),
}

// =============================================================================
// NotOperator
// =============================================================================

/// A single, optionally negated, feature test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotOperator {
    pub negated: bool,
    pub feature_id: u32,
}

impl NotOperator {
    pub fn new(feature_id: u32) -> Self {
        Self {
            negated: false,
            feature_id,
        }
    }

    pub fn negated(feature_id: u32) -> Self {
        Self {
            negated: true,
            feature_id,
        }
    }

    fn parse(token: &str, meta: &MetaCart) -> Result<Self, QuestionError> {
        let token = token.trim();
        let (negated, id) = match token.strip_prefix('~') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let feature_id: u32 = id
            .parse()
            .map_err(|_| QuestionError::InvalidFeatureId(token.to_string()))?;
        if !meta.contains(feature_id) {
            return Err(QuestionError::UnknownFeature(feature_id));
        }
        Ok(Self {
            negated,
            feature_id,
        })
    }

    /// Passes iff the feature test result differs from `negated`.
    #[inline]
    pub fn test<F: UnitFeature + ?Sized>(&self, meta: &MetaCart, feature: &F) -> bool {
        meta.test(self.feature_id, feature) != self.negated
    }

    fn describe(&self, meta: &MetaCart) -> String {
        let desc = meta
            .description(self.feature_id)
            .unwrap_or_else(|| self.feature_id.to_string());
        if self.negated {
            format!("~{desc}")
        } else {
            desc
        }
    }
}

impl fmt::Display for NotOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "~{}", self.feature_id)
        } else {
            write!(f, "{}", self.feature_id)
        }
    }
}

// =============================================================================
// AndOperator
// =============================================================================

/// Conjunction of feature tests. Operand order does not affect the result.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AndOperator {
    operands: Vec<NotOperator>,
}

impl AndOperator {
    pub fn new(operands: Vec<NotOperator>) -> Self {
        Self { operands }
    }

    fn parse(segment: &str, meta: &MetaCart) -> Result<Self, QuestionError> {
        let operands = segment
            .split('&')
            .filter(|t| !t.trim().is_empty())
            .map(|t| NotOperator::parse(t, meta))
            .collect::<Result<Vec<_>, _>>()?;
        if operands.is_empty() {
            return Err(QuestionError::EmptyTerm);
        }
        Ok(Self { operands })
    }

    pub fn operands(&self) -> &[NotOperator] {
        &self.operands
    }

    /// True iff every operand passes. An empty conjunction is true.
    #[inline]
    pub fn test<F: UnitFeature + ?Sized>(&self, meta: &MetaCart, feature: &F) -> bool {
        self.operands.iter().all(|op| op.test(meta, feature))
    }

    fn describe(&self, meta: &MetaCart) -> String {
        let parts: Vec<String> = self.operands.iter().map(|op| op.describe(meta)).collect();
        parts.join("&")
    }
}

impl fmt::Display for AndOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.operands.iter().enumerate() {
            if i > 0 {
                f.write_str("&")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

// =============================================================================
// Question
// =============================================================================

/// Disjunction of [`AndOperator`] terms. Always has at least one term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    terms: Vec<AndOperator>,
}

impl Question {
    /// Build a question from terms, rejecting empty questions and empty terms.
    ///
    /// Feature ids are not checked here; [`CartTree::apply_split`] checks them
    /// against the tree's [`MetaCart`].
    ///
    /// [`CartTree::apply_split`]: crate::repr::tree::CartTree::apply_split
    pub fn from_terms(terms: Vec<AndOperator>) -> Result<Self, QuestionError> {
        if terms.is_empty() {
            return Err(QuestionError::Empty);
        }
        if terms.iter().any(|t| t.operands.is_empty()) {
            return Err(QuestionError::EmptyTerm);
        }
        Ok(Self { terms })
    }

    /// Question on a single, non-negated feature.
    pub fn single(feature_id: u32) -> Self {
        Self {
            terms: vec![AndOperator::new(vec![NotOperator::new(feature_id)])],
        }
    }

    /// Parse question logic, checking every feature id against `meta`.
    pub fn parse(text: &str, meta: &MetaCart) -> Result<Self, QuestionError> {
        let terms = text
            .split('|')
            .filter(|s| !s.trim().is_empty())
            .map(|s| AndOperator::parse(s, meta))
            .collect::<Result<Vec<_>, _>>()?;
        if terms.is_empty() {
            return Err(QuestionError::Empty);
        }
        Ok(Self { terms })
    }

    pub fn terms(&self) -> &[AndOperator] {
        &self.terms
    }

    /// Every feature id referenced, in textual order.
    pub fn feature_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.terms
            .iter()
            .flat_map(|t| t.operands.iter().map(|op| op.feature_id))
    }

    /// True iff any term passes.
    #[inline]
    pub fn test<F: UnitFeature + ?Sized>(&self, meta: &MetaCart, feature: &F) -> bool {
        self.terms.iter().any(|t| t.test(meta, feature))
    }

    /// Render with feature descriptions in place of ids.
    pub fn describe(&self, meta: &MetaCart) -> String {
        let parts: Vec<String> = self.terms.iter().map(|t| t.describe(meta)).collect();
        parts.join("|")
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{term}")?;
        }
        Ok(())
    }
}
