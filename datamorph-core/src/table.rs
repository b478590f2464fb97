//! The base, untransformed table source: a [`RowCache`] plus the current
//! schema snapshot, exposed both as a [`TableSource`] (for direct display)
//! and a [`RawRowSource`] (for the lazy transformer to build on top of).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;

use crate::cache::RowCache;
use crate::config::EngineConfig;
use crate::error::{DataMorphError, DataMorphResult};
use crate::format::SourceFormat;
use crate::indexer::RowIndexer;
use crate::reader::RowReader;
use crate::schema::TableSchema;
use crate::transformer::{extract_cell, format_cell, RawRowSource, TableSource};

/// Wires a cache-backed row source to the schema snapshot currently
/// published for it. The schema is read through a `watch::Receiver` rather
/// than a plain field: since `CachedTableSource` is shared (via `Arc`)
/// between the base view and any `LazyTransformer` built on top of it,
/// there's no `&mut self` moment to swap a schema field into -- reading
/// through the receiver lets every holder observe the schema scanner's
/// latest revision without needing one.
pub struct CachedTableSource {
    path: PathBuf,
    format: SourceFormat,
    config: EngineConfig,
    cache: RowCache,
    indexer: Arc<RowIndexer>,
    schema: watch::Receiver<Arc<TableSchema>>,
}

impl CachedTableSource {
    pub fn new(
        path: impl Into<PathBuf>,
        format: SourceFormat,
        config: EngineConfig,
        indexer: Arc<RowIndexer>,
        schema: watch::Receiver<Arc<TableSchema>>,
    ) -> DataMorphResult<Self> {
        let path = path.into();
        let reader = RowReader::new(&path, format, &config)?;
        let cache = RowCache::new(indexer.clone(), reader, &config);
        Ok(Self {
            path,
            format,
            config,
            cache,
            indexer,
            schema,
        })
    }

    fn current_schema(&self) -> Arc<TableSchema> {
        self.schema.borrow().clone()
    }
}

impl TableSource for CachedTableSource {
    fn rows(&self) -> usize {
        self.cache.total_rows()
    }

    fn columns(&self) -> usize {
        self.current_schema().len()
    }

    fn column_names(&self) -> Vec<String> {
        self.current_schema().columns().iter().map(|c| c.name.clone()).collect()
    }

    fn cell(&self, row: usize, col: usize) -> DataMorphResult<String> {
        if row >= self.rows() {
            return Err(DataMorphError::OutOfRange(format!("row {row} out of range")));
        }
        let schema = self.current_schema();
        let Some(column) = schema.column(col) else {
            return Err(DataMorphError::OutOfRange(format!("col {col} out of range")));
        };
        let raw_record = self.cache.get_row(row as i64);
        let raw = extract_cell(&raw_record, col, &column.name, self.format);
        Ok(format_cell(&raw, column.column_type))
    }
}

impl RawRowSource for CachedTableSource {
    fn total_rows(&self) -> usize {
        self.cache.total_rows()
    }

    fn schema(&self) -> Arc<TableSchema> {
        self.current_schema()
    }

    fn get_raw_record(&self, row: usize) -> Bytes {
        self.cache.get_row(row as i64)
    }

    fn format(&self) -> SourceFormat {
        self.format
    }

    fn indexer(&self) -> &Arc<RowIndexer> {
        &self.indexer
    }

    fn open_reader(&self) -> DataMorphResult<RowReader> {
        RowReader::new(&self.path, self.format, &self.config)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_scanner;
    use datamorph_test_utils::csv_fixture;

    #[test]
    fn presents_rows_and_columns_from_cache_and_schema() {
        let file = csv_fixture(5);
        let config = EngineConfig::default();
        let indexer = Arc::new(RowIndexer::new(file.path(), SourceFormat::Csv, &config));
        indexer.build_index().unwrap();
        let reader = RowReader::new(file.path(), SourceFormat::Csv, &config).unwrap();
        let schema = schema_scanner::initial_scan(&reader, SourceFormat::Csv, &config).unwrap();
        let (_tx, schema_rx) = watch::channel(schema);

        let source = CachedTableSource::new(file.path(), SourceFormat::Csv, config, indexer, schema_rx).unwrap();
        assert_eq!(source.rows(), 5);
        assert_eq!(source.columns(), 3);
        assert_eq!(source.cell(0, 0).unwrap(), "0");
        assert_eq!(source.cell(0, 1).unwrap(), "user0");
    }

    #[test]
    fn column_names_observe_schema_updates_published_after_construction() {
        let file = csv_fixture(5);
        let config = EngineConfig::default();
        let indexer = Arc::new(RowIndexer::new(file.path(), SourceFormat::Csv, &config));
        indexer.build_index().unwrap();
        let reader = RowReader::new(file.path(), SourceFormat::Csv, &config).unwrap();
        let schema = schema_scanner::initial_scan(&reader, SourceFormat::Csv, &config).unwrap();
        let (tx, schema_rx) = watch::channel(schema.clone());

        let source = CachedTableSource::new(file.path(), SourceFormat::Csv, config, indexer, schema_rx).unwrap();
        assert_eq!(source.column_names(), vec!["id", "name", "score"]);

        let mut columns = schema.columns().to_vec();
        columns[1].name = "username".to_string();
        let renamed = Arc::new(TableSchema::new(columns).unwrap());
        tx.send(renamed).unwrap();

        assert_eq!(source.column_names(), vec!["id", "username", "score"]);
    }
}
