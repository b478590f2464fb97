//! The `TableSchema` / `ColumnSchema` data model shared by the schema
//! scanner and the lazy transformer.

use indexmap::IndexMap;

use crate::error::{DataMorphError, DataMorphResult};
use crate::format::ColumnType;

/// One column's observed shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub column_index: usize,
    /// Display formatting hint (e.g. a date/number format string) carried
    /// alongside the inferred type. No inference path populates this yet;
    /// it exists so a recipe or presentation layer has somewhere to put one.
    pub display_format: Option<String>,
}

impl ColumnSchema {
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool, column_index: usize) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable,
            column_index,
            display_format: None,
        }
    }
}

/// An ordered, name-indexed set of [`ColumnSchema`]s. Immutable once built;
/// refinement produces a new instance rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnSchema>,
    name_to_index: IndexMap<String, usize>,
}

impl TableSchema {
    /// Validates and builds a schema: names must be non-empty and unique,
    /// and `column_index` must equal each column's position.
    pub fn new(columns: Vec<ColumnSchema>) -> DataMorphResult<Self> {
        let mut name_to_index = IndexMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if col.name.is_empty() {
                return Err(DataMorphError::ArgumentInvalid(
                    "column name must be non-empty".into(),
                ));
            }
            if col.column_index != i {
                return Err(DataMorphError::ArgumentInvalid(format!(
                    "column {} has column_index {} but sits at position {i}",
                    col.name, col.column_index
                )));
            }
            if name_to_index.insert(col.name.clone(), i).is_some() {
                return Err(DataMorphError::ArgumentInvalid(format!(
                    "duplicate column name: {}",
                    col.name
                )));
            }
        }
        Ok(Self { columns, name_to_index })
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn column(&self, index: usize) -> Option<&ColumnSchema> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    pub fn column_named(&self, name: &str) -> Option<&ColumnSchema> {
        self.index_of(name).and_then(|i| self.columns.get(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_names() {
        let cols = vec![
            ColumnSchema::new("a", ColumnType::Text, false, 0),
            ColumnSchema::new("a", ColumnType::Text, false, 1),
        ];
        assert!(TableSchema::new(cols).is_err());
    }

    #[test]
    fn rejects_empty_name() {
        let cols = vec![ColumnSchema::new("", ColumnType::Text, false, 0)];
        assert!(TableSchema::new(cols).is_err());
    }

    #[test]
    fn rejects_mismatched_column_index() {
        let cols = vec![ColumnSchema::new("a", ColumnType::Text, false, 1)];
        assert!(TableSchema::new(cols).is_err());
    }

    #[test]
    fn lookup_by_name_and_index() {
        let cols = vec![
            ColumnSchema::new("a", ColumnType::Text, false, 0),
            ColumnSchema::new("b", ColumnType::WholeNumber, true, 1),
        ];
        let schema = TableSchema::new(cols).unwrap();
        assert_eq!(schema.index_of("b"), Some(1));
        assert_eq!(schema.column(0).unwrap().name, "a");
        assert!(schema.index_of("missing").is_none());
    }
}
