//! Configuration management for the barbershop
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (barbershop.toml)
//! - Environment variables (BARBERSHOP__*)
//!
//! ## Example config file (barbershop.toml):
//! ```toml
//! [build]
//! strict = true
//!
//! [resolvers]
//! version = "specified-throw-or-newest"
//! locale = "match-or-first"
//!
//! [templates]
//! dir = "templates"
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

use crate::locale::{LocaleResolver, MatchOrFirst};
use crate::version::{SpecifiedOrNewest, SpecifiedThrowOrNewest, VersionResolver};

/// Main configuration for the barbershop
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BarbershopConfig {
    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Resolver policies used by every barber
    #[serde(default)]
    pub resolvers: ResolverConfig,

    /// Template loading settings
    #[serde(default)]
    pub templates: TemplatesConfig,
}

/// Build configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Treat build warnings as errors
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub version: VersionPolicy,

    #[serde(default)]
    pub locale: LocalePolicy,
}

/// Named version resolution policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionPolicy {
    #[default]
    SpecifiedOrNewest,
    SpecifiedThrowOrNewest,
}

impl VersionPolicy {
    pub fn resolver(&self) -> Arc<dyn VersionResolver> {
        match self {
            VersionPolicy::SpecifiedOrNewest => Arc::new(SpecifiedOrNewest),
            VersionPolicy::SpecifiedThrowOrNewest => Arc::new(SpecifiedThrowOrNewest),
        }
    }
}

/// Named locale resolution policies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalePolicy {
    #[default]
    MatchOrFirst,
}

impl LocalePolicy {
    pub fn resolver(&self) -> Arc<dyn LocaleResolver> {
        match self {
            LocalePolicy::MatchOrFirst => Arc::new(MatchOrFirst),
        }
    }
}

/// Template loading configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplatesConfig {
    /// Directory of template files, used when a manifest names none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl BarbershopConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = [
            "barbershop.toml",
            ".barbershop.toml",
            "config/barbershop.toml",
        ];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "barbershop") {
            let xdg_config = config_dir.config_dir().join("barbershop.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Load from environment variables (BARBERSHOP__*)
        builder = builder.add_source(
            Environment::with_prefix("BARBERSHOP")
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
}
