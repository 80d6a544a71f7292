//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ElabConfig;
use std::path::Path;

/// Name of the synthetic combinational domain; never a clock domain.
const COMB_DOMAIN: &str = "comb";

/// File name looked up inside a project directory.
pub const CONFIG_FILE_NAME: &str = "loom.toml";

/// Loads and validates `<project_dir>/loom.toml`.
///
/// A missing file is not an error: the defaults apply.
pub fn load_config(project_dir: &Path) -> Result<ElabConfig, ConfigError> {
    let config_path = project_dir.join(CONFIG_FILE_NAME);
    if !config_path.exists() {
        return Ok(ElabConfig::default());
    }
    let content = std::fs::read_to_string(&config_path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `loom.toml` document.
pub fn load_config_from_str(content: &str) -> Result<ElabConfig, ConfigError> {
    let config: ElabConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &ElabConfig) -> Result<(), ConfigError> {
    if config.finalize.max_rounds == 0 {
        return Err(invalid("finalize.max_rounds", "must be at least 1"));
    }
    if config.naming.separator.is_empty() {
        return Err(invalid("naming.separator", "must not be empty"));
    }
    if config.naming.default_hint.is_empty() {
        return Err(invalid("naming.default_hint", "must not be empty"));
    }
    if config.domains.default_memory_domain.is_empty() {
        return Err(invalid("domains.default_memory_domain", "must not be empty"));
    }
    if config.domains.default_memory_domain == COMB_DOMAIN {
        return Err(invalid(
            "domains.default_memory_domain",
            "memory ports cannot be clocked by the combinational domain",
        ));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_default() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, ElabConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[finalize]
max_rounds = 8

[naming]
separator = "$"
default_hint = "w"
numeric_suffix = false

[domains]
default_memory_domain = "mem"
create_sync = false
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.finalize.max_rounds, 8);
        assert_eq!(config.naming.separator, "$");
        assert_eq!(config.naming.default_hint, "w");
        assert!(!config.naming.numeric_suffix);
        assert_eq!(config.domains.default_memory_domain, "mem");
        assert!(!config.domains.create_sync);
    }

    #[test]
    fn zero_rounds_rejected() {
        let err = load_config_from_str("[finalize]\nmax_rounds = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::ValidationError { ref field, .. } if field == "finalize.max_rounds"
        ));
    }

    #[test]
    fn empty_separator_rejected() {
        let err = load_config_from_str("[naming]\nseparator = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn memory_domain_cannot_be_comb() {
        let err = load_config_from_str("[domains]\ndefault_memory_domain = \"comb\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config, ElabConfig::default());
    }

    #[test]
    fn loads_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[finalize]\nmax_rounds = 3\n",
        )
        .unwrap();
        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.finalize.max_rounds, 3);
    }
}
