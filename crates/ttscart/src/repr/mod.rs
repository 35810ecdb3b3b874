//! In-memory CART representations.
//!
//! - [`unit_set`]: textual codec for leaf unit sets
//! - [`question`]: branch questions and their evaluation
//! - [`tree`]: arena-backed decision tree

pub mod question;
pub mod tree;
pub mod unit_set;
