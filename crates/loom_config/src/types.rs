//! Configuration types deserialized from `loom.toml`.

use serde::Deserialize;

/// The top-level elaboration configuration.
///
/// Every section is optional; a missing file or an empty document yields
/// [`ElabConfig::default`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElabConfig {
    /// Settings for the finalization fixpoint.
    #[serde(default)]
    pub finalize: FinalizeConfig,
    /// Settings for output identifier generation.
    #[serde(default)]
    pub naming: NamingConfig,
    /// Clock domain defaults.
    #[serde(default)]
    pub domains: DomainConfig,
}

/// Controls the deferred-construction fixpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinalizeConfig {
    /// Maximum number of hook rounds per module before elaboration is
    /// declared non-terminating.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: usize,
}

impl Default for FinalizeConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
        }
    }
}

/// Controls how signal identities are turned into output identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamingConfig {
    /// Joins hierarchy prefixes, hints and numeric suffixes.
    #[serde(default = "default_separator")]
    pub separator: String,
    /// Identifier used for signals created without a name hint.
    #[serde(default = "default_hint")]
    pub default_hint: String,
    /// Whether collisions surviving hierarchical prefixing may be broken with
    /// a numeric suffix. When disabled such collisions are errors.
    #[serde(default = "default_true")]
    pub numeric_suffix: bool,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            separator: default_separator(),
            default_hint: default_hint(),
            numeric_suffix: true,
        }
    }
}

/// Clock domain defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainConfig {
    /// Domain used by memory ports that do not name one.
    #[serde(default = "default_memory_domain")]
    pub default_memory_domain: String,
    /// Declare a `sync` domain at the root when the design uses one that
    /// nothing declares. When false such a design is rejected.
    #[serde(default = "default_true")]
    pub create_sync: bool,
}

impl Default for DomainConfig {
    fn default() -> Self {
        Self {
            default_memory_domain: default_memory_domain(),
            create_sync: true,
        }
    }
}

fn default_max_rounds() -> usize {
    64
}

fn default_separator() -> String {
    "_".to_string()
}

fn default_hint() -> String {
    "sig".to_string()
}

fn default_true() -> bool {
    true
}

fn default_memory_domain() -> String {
    "sync".to_string()
}
