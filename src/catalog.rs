//! Schema Catalog
//!
//! Static table/field catalog produced offline by the schema scraper. Loaded
//! once at startup; any problem here is fatal for the process.

use crate::error::{AstroError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// One column of a catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default)]
    pub length: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub ucd: String,
    #[serde(default)]
    pub description: String,
}

/// One catalog table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: Vec<FieldInfo>,
}

impl TableInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Catalog {
    tables: Vec<TableInfo>,
}

impl Catalog {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        Self { tables }
    }

    /// Load the catalog from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AstroError::CatalogLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&raw)
            .map_err(|e| AstroError::CatalogLoad(format!("{}: {}", path.display(), e.detail())))?;
        info!(
            path = %path.display(),
            tables = catalog.tables.len(),
            "Loaded schema catalog"
        );
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let tables: Vec<TableInfo> = serde_json::from_str(raw)
            .map_err(|e| AstroError::CatalogLoad(format!("malformed catalog JSON: {}", e)))?;
        if tables.is_empty() {
            return Err(AstroError::CatalogLoad("catalog contains no tables".to_string()));
        }
        if let Some(unnamed) = tables.iter().position(|t| t.name.trim().is_empty()) {
            return Err(AstroError::CatalogLoad(format!(
                "table #{} has an empty name",
                unnamed
            )));
        }
        Ok(Self { tables })
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.tables)?)
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
