use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use sheetpump_core::CsvSettings;

use crate::error::Result;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exports: ExportConfig,
    pub imports: ImportConfig,
    pub temporary_files: TemporaryFilesConfig,
    pub transactions: TransactionConfig,
    pub filesystem: FilesystemConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Page size used when pulling rows from a query source
    pub chunk_size: usize,
    pub strict_null_comparison: bool,
    pub csv: CsvSettings,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            strict_null_comparison: false,
            csv: CsvSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Load values only, without formatting
    pub read_only: bool,
    pub chunk_size: usize,
    pub heading_row: HeadingRowConfig,
    pub csv: CsvSettings,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            read_only: true,
            chunk_size: 1000,
            heading_row: HeadingRowConfig::default(),
            csv: CsvSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadingRowConfig {
    pub formatter: HeadingFormatter,
}

/// How heading labels are normalised before they become record keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingFormatter {
    #[default]
    Slug,
    #[serde(rename = "none")]
    Raw,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporaryFilesConfig {
    /// Directory for local temporary files; the OS temp dir when unset
    pub local_path: Option<PathBuf>,
    /// When set, import sources are mirrored to this disk so chunks can
    /// re-fetch them on any worker
    pub remote_disk: Option<String>,
}

impl TemporaryFilesConfig {
    pub fn local_path(&self) -> PathBuf {
        self.local_path.clone().unwrap_or_else(env::temp_dir)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub handler: TransactionHandlerKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionHandlerKind {
    #[default]
    Null,
    Store,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    pub default_disk: String,
    /// Local disks by name, each rooted at a directory
    pub disks: BTreeMap<String, PathBuf>,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            default_disk: "local".to_string(),
            disks: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Load configuration from defaults plus environment overrides
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Self::default();

        if let Ok(size) = env::var("SHEETPUMP_EXPORT_CHUNK_SIZE") {
            config.exports.chunk_size = size.parse()?;
        }
        if let Ok(size) = env::var("SHEETPUMP_IMPORT_CHUNK_SIZE") {
            config.imports.chunk_size = size.parse()?;
        }
        if let Ok(path) = env::var("SHEETPUMP_TEMP_PATH") {
            config.temporary_files.local_path = Some(PathBuf::from(path));
        }
        if let Ok(handler) = env::var("SHEETPUMP_TRANSACTION_HANDLER") {
            config.transactions.handler = match handler.as_str() {
                "null" => TransactionHandlerKind::Null,
                "store" => TransactionHandlerKind::Store,
                other => anyhow::bail!("unknown transaction handler: {}", other),
            };
        }

        Ok(config)
    }
}
