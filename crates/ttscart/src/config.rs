//! CRT composition configuration with builder pattern.
//!
//! [`ComposeConfig`] names the inputs and output of
//! [`CartTreeManager::compose_crt_file`](crate::CartTreeManager::compose_crt_file)
//! and is built with `bon`, validated at build time.
//!
//! # Example
//!
//! ```
//! use ttscart::ComposeConfig;
//!
//! let config = ComposeConfig::builder()
//!     .unit_list("voice/units.txt")
//!     .question_file("voice/questions.txt")
//!     .tree_dir("voice/trees")
//!     .output("voice/voice.crt")
//!     .language(1033)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.tree_path("a"), std::path::Path::new("voice/trees/a.tree"));
//! ```

use std::path::PathBuf;

use bon::Builder;

use crate::io::crt::CRT_VERSION;

/// Extension of pre-built binary tree files.
pub const DEFAULT_TREE_EXTENSION: &str = "tree";

// =============================================================================
// ConfigError
// =============================================================================

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Format version must be at least 1.
    InvalidVersion,
    /// Tree file extension must not be empty.
    EmptyExtension,
    /// Tree file extension starts with a dot.
    DottedExtension(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidVersion => write!(f, "version must be at least 1"),
            Self::EmptyExtension => write!(f, "tree_extension must not be empty"),
            Self::DottedExtension(ext) => {
                write!(f, "tree_extension must not start with '.', got {:?}", ext)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// =============================================================================
// ComposeConfig
// =============================================================================

/// Inputs and output of CRT composition.
#[derive(Debug, Clone, Builder)]
#[builder(
    derive(Clone, Debug),
    finish_fn(vis = "", name = __build_internal)
)]
pub struct ComposeConfig {
    /// Unit list, one unit name per line.
    #[builder(into)]
    pub unit_list: PathBuf,

    /// Id-encoded CART question file.
    #[builder(into)]
    pub question_file: PathBuf,

    /// Directory holding `<unit>.<tree_extension>` files.
    #[builder(into)]
    pub tree_dir: PathBuf,

    /// CRT file to write.
    #[builder(into)]
    pub output: PathBuf,

    /// Value of the header's Version field. Default: [`CRT_VERSION`].
    #[builder(default = CRT_VERSION)]
    pub version: u32,

    /// Tree file extension, without the dot. Default: `tree`.
    #[builder(into, default = String::from(DEFAULT_TREE_EXTENSION))]
    pub tree_extension: String,

    /// Language id stored in the metadata block. Default: 0.
    #[builder(default)]
    pub language: u32,

    /// Decode every tree against the MetaCart before packing. Default: false.
    #[builder(default)]
    pub verify_trees: bool,
}

/// Custom finishing function that validates the config.
impl<S: compose_config_builder::IsComplete> ComposeConfigBuilder<S> {
    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for version 0 or a malformed tree extension.
    pub fn build(self) -> Result<ComposeConfig, ConfigError> {
        let config = self.__build_internal();
        config.validate()?;
        Ok(config)
    }
}

impl ComposeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 {
            return Err(ConfigError::InvalidVersion);
        }
        if self.tree_extension.is_empty() {
            return Err(ConfigError::EmptyExtension);
        }
        if self.tree_extension.starts_with('.') {
            return Err(ConfigError::DottedExtension(self.tree_extension.clone()));
        }
        Ok(())
    }

    /// Path of the tree file for `unit`.
    pub fn tree_path(&self, unit: &str) -> PathBuf {
        self.tree_dir.join(format!("{unit}.{}", self.tree_extension))
    }
}
