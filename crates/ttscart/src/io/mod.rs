//! On-disk formats.
//!
//! - [`text`]: human-editable UTF-16 node-per-line tree files
//! - [`binary`]: compact pre-order `.tree` files
//! - [`payload`]: serialized MetaCart block
//! - [`crt`]: packed multi-tree CRT container

pub mod binary;
pub mod crt;
pub mod payload;
pub mod text;

pub use binary::BinaryFormatError;
pub use crt::{CrtError, CrtFile, CrtHeader, CrtIndexEntry, CrtSummary};
pub use payload::{FeaturePayload, MetaPayload, MetaPayloadV1};
pub use text::TextFormatError;
