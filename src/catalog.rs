//! Knowledge Catalog
//!
//! Static mapping from table name to its description and column descriptors.
//! Loaded once at startup and shared read-only (behind an `Arc`) by every
//! pipeline stage.
//!
//! Two on-disk shapes are accepted per table:
//!
//! ```json
//! {"orders": {"description": "...", "columns": [{"name": "order_id", "description": "...", "sample_values": ["..."]}]}}
//! {"orders": ["...", ["order_id: unique order identifier", "..."]]}
//! ```

use crate::error::{NlqError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sample_values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub table: String,
    pub description: String,
    pub columns: Vec<ColumnDescriptor>,
}

impl CatalogEntry {
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name)))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Object {
        description: String,
        #[serde(default)]
        columns: Vec<RawColumn>,
    },
    Tuple(String, Vec<RawColumn>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawColumn {
    Object {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default, alias = "samples")]
        sample_values: Vec<Value>,
    },
    Text(String),
}

impl From<RawColumn> for ColumnDescriptor {
    fn from(raw: RawColumn) -> Self {
        match raw {
            RawColumn::Object {
                name,
                description,
                sample_values,
            } => ColumnDescriptor {
                name: name.trim().to_string(),
                description: description.trim().to_string(),
                sample_values: sample_values
                    .iter()
                    .map(crate::normalizer::field_text)
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            RawColumn::Text(text) => {
                let (name, description) = text.split_once(':').unwrap_or((text.as_str(), ""));
                ColumnDescriptor {
                    name: name.trim().to_string(),
                    description: description.trim().to_string(),
                    sample_values: Vec::new(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct KnowledgeCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl KnowledgeCatalog {
    pub fn new(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| (entry.table.clone(), entry))
                .collect(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: HashMap<String, RawEntry> = serde_json::from_str(json)
            .map_err(|e| NlqError::Catalog(format!("Failed to parse knowledge catalog: {}", e)))?;

        let entries = raw.into_iter().map(|(table, entry)| {
            let (description, columns) = match entry {
                RawEntry::Object { description, columns } => (description, columns),
                RawEntry::Tuple(description, columns) => (description, columns),
            };
            CatalogEntry {
                table: table.trim().to_string(),
                description: description.trim().to_string(),
                columns: columns.into_iter().map(ColumnDescriptor::from).collect(),
            }
        });
        Ok(Self::new(entries))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
            .map_err(|e| NlqError::Catalog(format!("{} ({})", e, path.display())))
    }

    /// Load from `configured`, falling back to the same file name in the
    /// current directory and then next to the executable.
    pub fn load_with_fallbacks(configured: &Path) -> Result<(Self, PathBuf)> {
        let candidates = candidate_paths(configured);
        for path in &candidates {
            match Self::load(path) {
                Ok(catalog) => {
                    info!(path = %path.display(), tables = catalog.len(), "loaded knowledge catalog");
                    return Ok((catalog, path.clone()));
                }
                Err(NlqError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }

        let attempted: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
        Err(NlqError::Catalog(format!(
            "knowledge catalog not found; attempted: {}",
            attempted.join(", ")
        )))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn table_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Look up a table; absence is an invariant violation, not a soft miss.
    pub fn entry(&self, table: &str) -> Result<&CatalogEntry> {
        self.entries
            .get(table)
            .ok_or_else(|| NlqError::MissingCatalogEntry {
                table: table.to_string(),
            })
    }

    /// Serialized `{table: description}` slice, no columns.
    pub fn description_slice(&self, tables: &[String]) -> Result<String> {
        let mut slice = BTreeMap::new();
        for table in tables {
            slice.insert(table.as_str(), self.entry(table)?.description.as_str());
        }
        Ok(serde_json::to_string_pretty(&slice)?)
    }

    /// Serialized column descriptors for one table.
    pub fn render_columns(&self, table: &str) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.entry(table)?.columns)?)
    }
}

fn candidate_paths(configured: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![configured.to_path_buf()];
    let file_name = configured
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(crate::config::DEFAULT_KNOWLEDGEBASE));

    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd.join(&file_name));
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        candidates.push(exe_dir.join(&file_name));
    }
    candidates.dedup();
    candidates
}
