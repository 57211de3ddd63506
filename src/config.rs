//! Configuration management for the record repository
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (repo.toml)
//! - Environment variables (LEXREPO__*)
//!
//! ## Example config file (repo.toml):
//! ```toml
//! [repository]
//! identity = "did:plc:ffion"
//! uri_scheme = "at"
//! clock_id = 7
//!
//! [listing]
//! default_limit = 50
//! max_limit = 100
//!
//! [validation]
//! unknown_fields = "permit"
//!
//! [schemas]
//! dir = "./lexicons"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::uri::DEFAULT_SCHEME;
use crate::validator::UnknownFields;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub listing: ListingConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub schemas: SchemasConfig,
}

/// Repository identity and key settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Opaque owner identity embedded in record URIs
    #[serde(default = "default_identity")]
    pub identity: String,

    #[serde(default = "default_scheme")]
    pub uri_scheme: String,

    /// Clock identifier mixed into generated keys (10 bits)
    #[serde(default)]
    pub clock_id: u16,
}

/// List paging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingConfig {
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Upper bound applied to caller-supplied limits
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
}

/// Validation settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub unknown_fields: UnknownFields,
}

/// Where schema documents come from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemasConfig {
    /// Directory of JSON schema documents; the bundled set is used when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions
fn default_identity() -> String {
    "did:example:local".to_string()
}

fn default_scheme() -> String {
    DEFAULT_SCHEME.to_string()
}

fn default_limit() -> usize {
    50
}

fn default_max_limit() -> usize {
    100
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            uri_scheme: default_scheme(),
            clock_id: 0,
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

impl RepoConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["repo.toml", ".repo.toml", "config/repo.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "lexicon-repo") {
            let xdg_config = config_dir.config_dir().join("repo.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("LEXREPO")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.listing.default_limit == 0 || self.listing.max_limit == 0 {
            return Err(ConfigError::Message(
                "listing limits must be positive".to_string(),
            ));
        }
        if self.repository.identity.is_empty() || self.repository.identity.contains('/') {
            return Err(ConfigError::Message(format!(
                "invalid repository identity {:?}",
                self.repository.identity
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RepoConfig::default();
        assert_eq!(config.listing.default_limit, 50);
        assert_eq!(config.listing.max_limit, 100);
        assert_eq!(config.repository.uri_scheme, "at");
        assert_eq!(config.validation.unknown_fields, UnknownFields::Permit);
        assert!(config.schemas.dir.is_none());
    }

    #[test]
    fn test_serialize_config() {
        let config = RepoConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[repository]"));
        assert!(toml_str.contains("[listing]"));
        assert!(toml_str.contains("unknown_fields = \"permit\""));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            r#"
[repository]
identity = "did:plc:ffion"
clock_id = 7

[listing]
max_limit = 25

[validation]
unknown_fields = "reject"
"#,
        )
        .unwrap();

        let config = RepoConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.repository.identity, "did:plc:ffion");
        assert_eq!(config.repository.clock_id, 7);
        assert_eq!(config.listing.max_limit, 25);
        assert_eq!(config.listing.default_limit, 50);
        assert_eq!(config.validation.unknown_fields, UnknownFields::Reject);
    }

    #[test]
    fn test_rejects_zero_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zero.toml");
        std::fs::write(&path, "[listing]\ndefault_limit = 0\n").unwrap();
        assert!(RepoConfig::load_from(Some(path.to_str().unwrap())).is_err());
    }
}
