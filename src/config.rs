//! sqlweave configuration.
//!
//! Read from `./sqlweave.toml`, then `<config dir>/sqlweave/config.toml`,
//! falling back to defaults:
//!
//! ```toml
//! placeholder = "auto"          # auto | question | dollar
//!
//! [sources]
//! dir = "mappers"
//! extension = "xml"
//! duplicates = "override"       # override | reject
//!
//! [database]
//! url = "postgres://localhost/app"
//! max_connections = 5
//! ```
//!
//! `SQLWEAVE_DATABASE_URL` overrides `database.url`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::engine::{SqlWeave, SqlxDriver};
use crate::error::{MapperError, MapperResult};
use crate::registry::{DuplicatePolicy, Registry};
use crate::template::PlaceholderStyle;

pub const FILE_NAME: &str = "sqlweave.toml";
pub const DATABASE_URL_ENV: &str = "SQLWEAVE_DATABASE_URL";

/// Marker style setting; `auto` follows the database URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placeholder {
    #[default]
    Auto,
    Question,
    Dollar,
}

impl Placeholder {
    pub fn style(&self) -> Option<PlaceholderStyle> {
        match self {
            Self::Auto => None,
            Self::Question => Some(PlaceholderStyle::Question),
            Self::Dollar => Some(PlaceholderStyle::Dollar),
        }
    }
}

/// Where statement definitions are loaded from.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub dir: PathBuf,
    pub extension: String,
    pub duplicates: DuplicatePolicy,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("mappers"),
            extension: "xml".to_string(),
            duplicates: DuplicatePolicy::Override,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub placeholder: Placeholder,
    pub sources: SourcesConfig,
    pub database: DatabaseConfig,
}

impl Config {
    pub fn from_toml(content: &str) -> MapperResult<Self> {
        toml::from_str(content).map_err(|e| MapperError::Config(format!("invalid configuration: {}", e)))
    }

    pub fn from_file(path: &Path) -> MapperResult<Self> {
        Self::from_toml(&fs::read_to_string(path)?)
    }

    /// Load the first configuration file found, or defaults, then apply
    /// the environment override.
    pub fn load() -> MapperResult<Self> {
        let mut config = match Self::search_paths().into_iter().find(|p| p.is_file()) {
            Some(path) => {
                debug!(path = %path.display(), "loading configuration");
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        if let Ok(url) = std::env::var(DATABASE_URL_ENV) {
            if !url.is_empty() {
                config.database.url = Some(url);
            }
        }
        Ok(config)
    }

    /// Candidate configuration files, in lookup order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(FILE_NAME)];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("sqlweave").join("config.toml"));
        }
        paths
    }

    pub fn load_registry(&self) -> MapperResult<Registry> {
        Registry::load_dir(&self.sources.dir, &self.sources.extension, self.sources.duplicates)
    }

    /// Load the registry and, when a database URL is configured, connect.
    pub async fn open(&self) -> MapperResult<SqlWeave> {
        let mut builder = SqlWeave::builder().registry(self.load_registry()?);
        if let Some(url) = &self.database.url {
            builder = builder.driver(SqlxDriver::connect_with(url, self.database.max_connections).await?);
        }
        if let Some(style) = self.placeholder.style() {
            builder = builder.style(style);
        }
        Ok(builder.build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.placeholder, Placeholder::Auto);
        assert_eq!(config.sources.dir, PathBuf::from("mappers"));
        assert_eq!(config.sources.extension, "xml");
        assert_eq!(config.sources.duplicates, DuplicatePolicy::Override);
        assert_eq!(config.database.url, None);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml(
            r#"
            placeholder = "dollar"

            [sources]
            dir = "sql"
            duplicates = "reject"

            [database]
            url = "postgres://localhost/app"
            max_connections = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.placeholder.style(), Some(PlaceholderStyle::Dollar));
        assert_eq!(config.sources.dir, PathBuf::from("sql"));
        assert_eq!(config.sources.extension, "xml");
        assert_eq!(config.sources.duplicates, DuplicatePolicy::Reject);
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/app"));
        assert_eq!(config.database.max_connections, 10);
    }

    #[test]
    fn test_invalid_value() {
        let err = Config::from_toml("placeholder = \"colon\"").unwrap_err();
        assert!(matches!(err, MapperError::Config(_)));
    }

    #[test]
    fn test_search_paths_start_local() {
        assert_eq!(Config::search_paths()[0], PathBuf::from(FILE_NAME));
    }
}
