//! ttscart: CART decision trees for offline TTS voice building.
//!
//! Loads, traverses and saves the per-unit classification trees used for
//! candidate selection, and packs them into a single CRT container.
//!
//! # Key Types
//!
//! - [`MetaCart`] - Feature-id table that gives questions their meaning
//! - [`Question`] - OR-of-ANDs expression attached to a branch node
//! - [`CartTree`] - Arena-backed binary decision tree
//! - [`CartTreeManager`] - Per-unit trees plus CRT composition
//! - [`CrtFile`] - Reader for composed CRT containers
//!
//! # Formats
//!
//! Trees round-trip through a UTF-16 text format (see [`io::text`]) and a
//! compact binary format (see [`io::binary`]). The CRT layout lives in
//! [`io::crt`].

pub mod compat;
pub mod config;
pub mod io;
pub mod manager;
pub mod meta;
pub mod repr;
pub mod testing;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use config::{ComposeConfig, ConfigError};
pub use io::crt::{CrtError, CrtFile, CrtHeader, CrtIndexEntry, CrtSummary};
pub use manager::CartTreeManager;
pub use meta::{FeatureKind, FeatureQuestion, MetaCart, MetaCartError, TtsUnitFeature, UnitFeature};
pub use repr::question::{AndOperator, NotOperator, Question, QuestionError};
pub use repr::tree::{CartTree, NodeId, NodeKind, TreeError, TreeValidationError, YesBranch};
pub use repr::unit_set::{compose_unit_set, parse_unit_set, parse_unit_set_into, UnitSetError};
