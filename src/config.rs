//! Configuration management for API versioning
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (versioning.toml)
//! - Environment variables (VERSIONING__*)
//!
//! ## Example config file (versioning.toml):
//! ```toml
//! [api]
//! version_header = "x-api-version"
//! default_version = "head"
//! reject_unknown_versions = true
//!
//! [manifest]
//! path = "api/versions.json"
//!
//! [output]
//! format = "pretty"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration for API versioning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VersioningConfig {
    /// Request boundary settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Where the declarative manifest lives
    #[serde(default)]
    pub manifest: ManifestConfig,

    /// CLI output settings
    #[serde(default)]
    pub output: OutputConfig,
}

/// How requests pick their version
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Header carrying the requested version, read by
    /// `VersionedContext::from_headers`
    #[serde(default = "default_version_header")]
    pub version_header: String,

    /// Version assumed when a request carries none
    #[serde(default)]
    pub default_version: DefaultVersion,

    /// Reject versions that are not in the chain instead of falling back to
    /// the closest older one
    #[serde(default = "default_true")]
    pub reject_unknown_versions: bool,
}

/// Version assumed for requests without a version header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DefaultVersion {
    Head,
    Oldest,
    /// Pass traffic through untouched
    #[default]
    None,
}

/// Manifest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestConfig {
    /// Path to the manifest (JSON or TOML)
    #[serde(default = "default_manifest_path")]
    pub path: PathBuf,
}

/// Output configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

/// Output format for JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pretty,
    Compact,
}

impl OutputFormat {
    /// Render a value as JSON in this format
    pub fn render<T: Serialize>(&self, value: &T) -> serde_json::Result<String> {
        match self {
            OutputFormat::Pretty => serde_json::to_string_pretty(value),
            OutputFormat::Compact => serde_json::to_string(value),
        }
    }
}

// Default value functions
fn default_version_header() -> String {
    "x-api-version".to_string()
}

fn default_true() -> bool {
    true
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("versions.json")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            version_header: default_version_header(),
            default_version: DefaultVersion::None,
            reject_unknown_versions: true,
        }
    }
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: default_manifest_path(),
        }
    }
}

impl VersioningConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file on top of the defaults
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = [
            "versioning.toml",
            ".versioning.toml",
            "config/versioning.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "versioning") {
            let xdg_config = config_dir.config_dir().join("versioning.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (VERSIONING__API__DEFAULT_VERSION=head)
        builder = builder.add_source(
            Environment::with_prefix("VERSIONING")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Get the manifest path (resolves relative paths)
    pub fn manifest_path(&self) -> PathBuf {
        if self.manifest.path.is_absolute() {
            self.manifest.path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.manifest.path)
        }
    }
}
