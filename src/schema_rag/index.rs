//! Schema Index
//!
//! Immutable, precomputed embeddings for every table and field in the catalog.
//! Loaded once per process and shared read-only between runs.

use crate::catalog::{Catalog, TableInfo};
use crate::error::{AstroError, Result};
use crate::schema_rag::embedder::{Embedder, Embedding};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Fields per table included in a table's embedding text.
pub const MAX_FIELDS_PER_TABLE_IN_CORPUS: usize = 30;

/// A table (field = None) or a single field of a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaElement {
    pub table: String,
    #[serde(default)]
    pub field: Option<String>,
    pub description: String,
    #[serde(default)]
    pub data_type: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    pub embedding: Embedding,
}

impl SchemaElement {
    pub fn is_table(&self) -> bool {
        self.field.is_none()
    }

    /// `Table` or `Table.field`
    pub fn qualified_name(&self) -> String {
        match &self.field {
            Some(field) => format!("{}.{}", self.table, field),
            None => self.table.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct IndexFile {
    model: String,
    dimension: usize,
    elements: Vec<SchemaElement>,
}

#[derive(Debug, Clone)]
pub struct SchemaIndex {
    model: String,
    dimension: usize,
    elements: Vec<Arc<SchemaElement>>,
}

impl SchemaIndex {
    /// Assemble an index from already-embedded elements.
    pub fn from_elements(
        model: impl Into<String>,
        dimension: usize,
        elements: Vec<SchemaElement>,
    ) -> Result<Self> {
        let model = model.into();
        if dimension == 0 {
            return Err(AstroError::CatalogLoad("index dimension must be positive".to_string()));
        }
        for element in &elements {
            if element.embedding.len() != dimension {
                return Err(AstroError::CatalogLoad(format!(
                    "element '{}' has {} dimensions, index declares {}",
                    element.qualified_name(),
                    element.embedding.len(),
                    dimension
                )));
            }
        }
        Ok(Self {
            model,
            dimension,
            elements: elements.into_iter().map(Arc::new).collect(),
        })
    }

    /// Embed every table and field of the catalog.
    pub async fn build(catalog: &Catalog, embedder: &dyn Embedder) -> Result<Self> {
        let mut elements = Vec::new();
        for table in catalog.tables() {
            let embedding = embedder.embed(&table_text(table)).await?;
            elements.push(SchemaElement {
                table: table.name.clone(),
                field: None,
                description: table.description.clone(),
                data_type: None,
                unit: None,
                embedding,
            });

            for field in &table.fields {
                let text = format!(
                    "Field: {}.{} (Type: {}, Unit: {}) Description: {}",
                    table.name, field.name, field.data_type, field.unit, field.description
                );
                let embedding = embedder.embed(&text).await?;
                elements.push(SchemaElement {
                    table: table.name.clone(),
                    field: Some(field.name.clone()),
                    description: field.description.clone(),
                    data_type: non_empty(&field.data_type),
                    unit: non_empty(&field.unit),
                    embedding,
                });
            }
            debug!(table = %table.name, fields = table.fields.len(), "Embedded table");
        }

        info!(
            model = embedder.model_id(),
            elements = elements.len(),
            "Built schema index"
        );
        Self::from_elements(embedder.model_id(), embedder.dimension(), elements)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AstroError::CatalogLoad(format!("cannot read index {}: {}", path.display(), e))
        })?;
        let file: IndexFile = serde_json::from_str(&raw).map_err(|e| {
            AstroError::CatalogLoad(format!("malformed index {}: {}", path.display(), e))
        })?;
        let index = Self::from_elements(file.model, file.dimension, file.elements)?;
        info!(
            path = %path.display(),
            model = %index.model,
            dimension = index.dimension,
            elements = index.elements.len(),
            "Loaded schema index"
        );
        Ok(index)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = IndexFile {
            model: self.model.clone(),
            dimension: self.dimension,
            elements: self.elements.iter().map(|e| e.as_ref().clone()).collect(),
        };
        std::fs::write(path, serde_json::to_string(&file)?)?;
        Ok(())
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Every element, in catalog order.
    pub fn lookup_all(&self) -> &[Arc<SchemaElement>] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

fn table_text(table: &TableInfo) -> String {
    let mut field_texts: Vec<String> = table
        .fields
        .iter()
        .take(MAX_FIELDS_PER_TABLE_IN_CORPUS)
        .map(|f| format!("{} ({}) {}", f.name, f.data_type, f.description))
        .collect();
    if table.fields.len() > MAX_FIELDS_PER_TABLE_IN_CORPUS {
        field_texts.push(format!(
            "... (and {} more fields)",
            table.fields.len() - MAX_FIELDS_PER_TABLE_IN_CORPUS
        ));
    }
    format!(
        "Table Name: {}. Description: {}. Fields: {}",
        table.name,
        table.description,
        field_texts.join("; ")
    )
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::FieldInfo;
    use crate::schema_rag::embedder::HashEmbedder;

    fn catalog() -> Catalog {
        Catalog::new(vec![TableInfo {
            name: "Star".to_string(),
            description: "Primary photometric objects classified as stars".to_string(),
            fields: vec![FieldInfo {
                name: "psfMag_g".to_string(),
                data_type: "real".to_string(),
                length: "4".to_string(),
                unit: "mag".to_string(),
                ucd: String::new(),
                description: "PSF magnitude in g".to_string(),
            }],
        }])
    }

    #[tokio::test]
    async fn test_build_creates_table_and_field_elements() {
        let index = SchemaIndex::build(&catalog(), &HashEmbedder::new(64)).await.unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.lookup_all()[0].is_table());
        assert_eq!(index.lookup_all()[1].qualified_name(), "Star.psfMag_g");
        assert_eq!(index.lookup_all()[1].unit.as_deref(), Some("mag"));
        assert_eq!(index.model(), "hash-sip13-v1-64");
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let index = SchemaIndex::build(&catalog(), &HashEmbedder::new(32)).await.unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        index.save(file.path()).unwrap();
        let loaded = SchemaIndex::load(file.path()).unwrap();
        assert_eq!(loaded.dimension(), 32);
        assert_eq!(loaded.lookup_all()[1].as_ref(), index.lookup_all()[1].as_ref());
    }

    #[test]
    fn test_inconsistent_dimensions_rejected() {
        let element = SchemaElement {
            table: "Star".to_string(),
            field: None,
            description: String::new(),
            data_type: None,
            unit: None,
            embedding: vec![0.5; 3],
        };
        let err = SchemaIndex::from_elements("m", 4, vec![element]).unwrap_err();
        assert!(matches!(err, AstroError::CatalogLoad(_)));
    }
}
