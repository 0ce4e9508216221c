use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::QuerysetError;

/// The collation for which the session character set is forced explicitly,
/// compensating for driver defaults that do not always honor the requested
/// charset.
pub const DEFAULT_UNICODE_COLLATION: &str = "utf8";

/// Top-level settings document: one connection block plus the table
/// descriptors keyed by tag.
///
/// ```json
/// {
///   "CONNECTION": {
///     "HOST": "127.0.0.1", "PORT": 3306,
///     "USER": "app", "PASSWORD": "secret",
///     "DATABASE": "app", "COLLATION": "utf8"
///   },
///   "TABLES": {
///     "items": {
///       "TABLE_NAME": "items",
///       "FIELDS": ["id", "title", {"name": "created", "alias": "created_at"}],
///       "FIELDS_MUTABLE": ["title"]
///     }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(rename = "CONNECTION")]
    pub connection: ConnectionConfig,
    #[serde(rename = "TABLES", default)]
    pub tables: HashMap<String, TableConfig>,
}

impl Settings {
    /// Parse a settings document from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::Configuration` if the document does not match
    /// the schema.
    pub fn from_json_str(json: &str) -> Result<Self, QuerysetError> {
        serde_json::from_str(json)
            .map_err(|e| QuerysetError::Configuration(format!("invalid settings document: {e}")))
    }

    /// Load a settings document from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::Configuration` if the file cannot be read or
    /// does not match the schema.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, QuerysetError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            QuerysetError::Configuration(format!(
                "cannot read settings file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json_str(&raw)
    }

    /// Look up the table descriptor registered under `tag`.
    ///
    /// # Errors
    ///
    /// Returns `QuerysetError::Configuration` if no such table is configured.
    pub fn table(&self, tag: &str) -> Result<&TableConfig, QuerysetError> {
        self.tables
            .get(tag)
            .ok_or_else(|| QuerysetError::Configuration(format!("no table configured for tag `{tag}`")))
    }
}

/// Connection parameters, immutable once loaded and shared read-only by
/// every connection spawned from them.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "HOST")]
    pub host: String,
    #[serde(rename = "PORT")]
    pub port: u16,
    #[serde(rename = "USER")]
    pub user: String,
    #[serde(rename = "PASSWORD")]
    pub password: String,
    #[serde(rename = "DATABASE")]
    pub database: String,
    #[serde(rename = "COLLATION", default = "default_collation")]
    pub collation: String,
    #[serde(rename = "SSL", default)]
    pub ssl: Option<SslConfig>,
}

fn default_collation() -> String {
    DEFAULT_UNICODE_COLLATION.to_string()
}

impl ConnectionConfig {
    /// Whether the session character set must be forced on every fresh
    /// connection (`SET NAMES` / `SET CHARACTER SET`).
    #[must_use]
    pub fn uses_default_unicode_collation(&self) -> bool {
        self.collation == DEFAULT_UNICODE_COLLATION
    }
}

/// Optional TLS material for the connection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SslConfig {
    #[serde(rename = "KEY", default)]
    pub key: Option<PathBuf>,
    #[serde(rename = "CERT", default)]
    pub cert: Option<PathBuf>,
    #[serde(rename = "CA", default)]
    pub ca: Option<PathBuf>,
}

/// Static metadata for one table: its name, the full field list used for
/// selects and inserts, and the mutable subset used for updates.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    #[serde(rename = "TABLE_NAME")]
    pub table_name: String,
    #[serde(rename = "FIELDS", default)]
    pub fields: Vec<FieldSpec>,
    // Older settings documents spell this FIELDS_MUTEABLE.
    #[serde(rename = "FIELDS_MUTABLE", alias = "FIELDS_MUTEABLE", default)]
    pub fields_mutable: Vec<String>,
}

/// A field entry: either a bare column name or a structured descriptor with
/// optional read/write formatting and a result alias.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Name(String),
    Descriptor(FieldDescriptor),
}

impl FieldSpec {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            FieldSpec::Name(name) => name,
            FieldSpec::Descriptor(desc) => &desc.name,
        }
    }
}

/// Structured field descriptor.
///
/// `read_format` wraps the quoted column in SELECT lists (for example
/// `UNIX_TIMESTAMP(%s)`), `write_format` wraps the value placeholder in
/// assignment lists, and `alias` renames the column in SELECT output.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub read_format: Option<String>,
    #[serde(default)]
    pub write_format: Option<String>,
}
