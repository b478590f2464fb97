//! Background pass that turns the transformer's resolved [`FilterSpec`]s
//! into a filtered-row-index -> source-row-index mapping, using a reader
//! kept separate from the display cache so the two I/O paths don't share a
//! seek position.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::actions::{FilterSpec, Operator};
use crate::config::EngineConfig;
use crate::error::{DataMorphError, DataMorphResult};
use crate::format::{ColumnType, SourceFormat};
use crate::indexer::{wait_for_checkpoint, RowIndexer, NOT_READY};
use crate::reader::RowReader;
use crate::schema::TableSchema;
use crate::schema_scanner::{parse_float_lenient, parse_timestamp_lenient};
use crate::transformer::extract_cell;

/// Evaluates all `specs` against one raw record (AND semantics).
pub fn matches_all(record: &[u8], specs: &[FilterSpec], schema: &TableSchema, format: SourceFormat) -> bool {
    specs.iter().all(|spec| evaluate_filter(record, spec, schema, format))
}

fn evaluate_filter(record: &[u8], spec: &FilterSpec, schema: &TableSchema, format: SourceFormat) -> bool {
    let column_name = schema
        .column(spec.source_column_index)
        .map(|c| c.name.as_str())
        .unwrap_or("");
    let raw = extract_cell(record, spec.source_column_index, column_name, format);
    if raw == "<null>" || raw == "<error>" {
        return false;
    }

    use Operator::*;
    match spec.op {
        Equals => raw.eq_ignore_ascii_case(&spec.value),
        NotEquals => !raw.eq_ignore_ascii_case(&spec.value),
        Contains => raw.to_lowercase().contains(&spec.value.to_lowercase()),
        NotContains => !raw.to_lowercase().contains(&spec.value.to_lowercase()),
        StartsWith => raw.to_lowercase().starts_with(&spec.value.to_lowercase()),
        EndsWith => raw.to_lowercase().ends_with(&spec.value.to_lowercase()),
        GreaterThan | GreaterThanOrEqual | LessThan | LessThanOrEqual => match spec.effective_type {
            ColumnType::WholeNumber | ColumnType::FloatingPoint => {
                match (parse_float_lenient(raw.trim()), parse_float_lenient(spec.value.trim())) {
                    (Some(a), Some(b)) => compare(spec.op, a, b),
                    _ => false,
                }
            }
            ColumnType::Timestamp => {
                match (parse_timestamp_lenient(raw.trim()), parse_timestamp_lenient(spec.value.trim())) {
                    (Some(a), Some(b)) => compare(spec.op, a.and_utc().timestamp() as f64, b.and_utc().timestamp() as f64),
                    _ => false,
                }
            }
            _ => false,
        },
    }
}

fn compare(op: Operator, a: f64, b: f64) -> bool {
    match op {
        Operator::GreaterThan => a > b,
        Operator::GreaterThanOrEqual => a >= b,
        Operator::LessThan => a < b,
        Operator::LessThanOrEqual => a <= b,
        _ => unreachable!("compare only called for ordering operators"),
    }
}

/// Produces, in the background, the array of source row indices matching
/// every current [`FilterSpec`] (AND semantics).
pub struct FilterRowIndexer {
    filter_specs: Vec<FilterSpec>,
    schema: Arc<TableSchema>,
    indexer: Arc<RowIndexer>,
    reader: RowReader,
    format: SourceFormat,
    batch_size: usize,
    matched: Mutex<Vec<usize>>,
    total_matched: AtomicUsize,
}

impl FilterRowIndexer {
    pub fn new(
        filter_specs: Vec<FilterSpec>,
        schema: Arc<TableSchema>,
        indexer: Arc<RowIndexer>,
        reader: RowReader,
        format: SourceFormat,
        config: &EngineConfig,
    ) -> Self {
        Self {
            filter_specs,
            schema,
            indexer,
            reader,
            format,
            batch_size: config.filter_batch_size,
            matched: Mutex::new(Vec::new()),
            total_matched: AtomicUsize::new(0),
        }
    }

    /// Safe to read concurrently with [`Self::build_index`].
    pub fn total_matched_rows(&self) -> usize {
        self.total_matched.load(Ordering::Acquire)
    }

    /// Returns the source row for `filtered_row`, or `None` if that row
    /// hasn't been scanned yet.
    pub fn get_source_row(&self, filtered_row: usize) -> Option<usize> {
        let matched = self.matched.lock().expect("matched-rows lock poisoned");
        matched.get(filtered_row).copied()
    }

    /// Scans the whole file once, appending matches and yielding
    /// cooperatively every `config.filter_batch_size` records so the UI
    /// thread isn't starved. Advances a local byte cursor sequentially
    /// between batches rather than re-deriving a checkpoint per record, so
    /// total I/O across the scan stays proportional to the file size.
    #[instrument(skip(self, cancel))]
    pub async fn build_index(&self, cancel: CancellationToken) -> DataMorphResult<()> {
        let (checkpoint, skip) = wait_for_checkpoint(&self.indexer, 0).await;
        if checkpoint == NOT_READY {
            return Err(DataMorphError::InvalidState(
                "filter row indexer started before base index had any checkpoints".into(),
            ));
        }

        let mut cursor = checkpoint.byte_offset as u64;
        let mut skip = skip;
        let mut consumed = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(DataMorphError::Cancelled);
            }
            let (records, next_offset) = self.reader.read_sequential(cursor, skip, self.batch_size)?;
            if records.is_empty() {
                break;
            }
            for record in &records {
                if matches_all(record, &self.filter_specs, &self.schema, self.format) {
                    let mut matched = self.matched.lock().expect("matched-rows lock poisoned");
                    matched.push(consumed);
                    self.total_matched.store(matched.len(), Ordering::Release);
                }
                consumed += 1;
            }
            cursor = next_offset;
            skip = 0;
            tokio::task::yield_now().await;
        }
        debug!(total_matched = self.total_matched_rows(), "filter row index complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSchema;
    use datamorph_test_utils::write_temp_file;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn s5_filter_with_and_literal_scenario() {
        let file = write_temp_file(
            "Name,Age\nAlice,30\nBob,25\nAlice,20\nCharlie,30\n",
        );
        let config = EngineConfig::default();
        let indexer = Arc::new(RowIndexer::new(file.path(), SourceFormat::Csv, &config));
        indexer.build_index().unwrap();
        let reader = RowReader::new(file.path(), SourceFormat::Csv, &config).unwrap();
        let schema = Arc::new(
            TableSchema::new(vec![
                ColumnSchema::new("Name", ColumnType::Text, false, 0),
                ColumnSchema::new("Age", ColumnType::WholeNumber, false, 1),
            ])
            .unwrap(),
        );
        let specs = vec![
            FilterSpec {
                source_column_index: 0,
                effective_type: ColumnType::Text,
                op: Operator::Equals,
                value: "Alice".into(),
            },
            FilterSpec {
                source_column_index: 1,
                effective_type: ColumnType::WholeNumber,
                op: Operator::Equals,
                value: "30".into(),
            },
        ];
        let fi = FilterRowIndexer::new(specs, schema, indexer, reader, SourceFormat::Csv, &config);
        fi.build_index(CancellationToken::new()).await.unwrap();
        assert_eq!(fi.total_matched_rows(), 1);
        assert_eq!(fi.get_source_row(0), Some(0));
    }

    #[test]
    fn unscanned_filtered_row_is_none() {
        let file = write_temp_file("a\n");
        let config = EngineConfig::default();
        let indexer = Arc::new(RowIndexer::new(file.path(), SourceFormat::Csv, &config));
        indexer.build_index().unwrap();
        let reader = RowReader::new(file.path(), SourceFormat::Csv, &config).unwrap();
        let schema = Arc::new(TableSchema::new(vec![ColumnSchema::new("a", ColumnType::Text, false, 0)]).unwrap());
        let fi = FilterRowIndexer::new(Vec::new(), schema, indexer, reader, SourceFormat::Csv, &config);
        assert_eq!(fi.get_source_row(0), None);
    }
}
