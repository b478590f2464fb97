//! Projects a base row source through an ordered [`MorphAction`] stack into
//! a virtual, read-only table -- without rewriting or materializing any
//! underlying data.

use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::Value;

use crate::actions::{FilterSpec, MorphAction};
use crate::error::{DataMorphError, DataMorphResult};
use crate::filter_index::FilterRowIndexer;
use crate::format::{ColumnType, SourceFormat};
use crate::indexer::RowIndexer;
use crate::reader::RowReader;
use crate::scanner::split_csv_record;
use crate::schema::TableSchema;

/// The read-only table contract consumed by an external UI collaborator.
pub trait TableSource {
    fn rows(&self) -> usize;
    fn columns(&self) -> usize;
    fn column_names(&self) -> Vec<String>;
    fn cell(&self, row: usize, col: usize) -> DataMorphResult<String>;
}

/// What a row source needs to expose for the lazy transformer to build on
/// top of it: raw record bytes keyed by row, the schema those bytes were
/// scanned against, and the means to build a dedicated filter-indexer
/// reader (kept off the display cache's I/O path).
pub trait RawRowSource {
    fn total_rows(&self) -> usize;
    /// The schema to build against. Returned by value (cloning the `Arc` is
    /// cheap) since implementations backed by a live schema feed -- see
    /// `CachedTableSource` -- can only hand one out through a borrow guard
    /// with a lifetime shorter than `&self`.
    fn schema(&self) -> Arc<TableSchema>;
    fn get_raw_record(&self, row: usize) -> bytes::Bytes;
    fn format(&self) -> SourceFormat;
    fn indexer(&self) -> &Arc<RowIndexer>;
    fn open_reader(&self) -> DataMorphResult<RowReader>;
    fn path(&self) -> &std::path::Path;
}

/// Extracts and stringifies one cell from a raw record. For JSON Lines this
/// produces `"<null>"` for a missing key or JSON `null`, and `"<error>"` if
/// the record doesn't parse at all.
pub fn extract_cell(raw_record: &[u8], column_index: usize, column_name: &str, format: SourceFormat) -> String {
    match format {
        SourceFormat::Csv => split_csv_record(raw_record)
            .get(column_index)
            .cloned()
            .unwrap_or_default(),
        _ => match serde_json::from_slice::<Value>(raw_record) {
            Ok(Value::Object(map)) => match map.get(column_name) {
                None | Some(Value::Null) => "<null>".to_string(),
                Some(v) => json_scalar_to_string(v),
            },
            _ => "<error>".to_string(),
        },
    }
}

fn json_scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Formats a raw cell value according to its resolved output type. Parse
/// failures are not errors: they produce the literal string `"<invalid>"`.
/// Already-marked cells (`"<null>"`, `"<error>"`) pass through unchanged.
pub fn format_cell(raw: &str, column_type: ColumnType) -> String {
    if raw == "<null>" || raw == "<error>" {
        return raw.to_string();
    }
    match column_type {
        ColumnType::WholeNumber => raw
            .trim()
            .parse::<i64>()
            .map(|v| v.to_string())
            .unwrap_or_else(|_| "<invalid>".to_string()),
        ColumnType::FloatingPoint => parse_float(raw)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "<invalid>".to_string()),
        ColumnType::Boolean => {
            let trimmed = raw.trim();
            if trimmed.eq_ignore_ascii_case("true") {
                "true".to_string()
            } else if trimmed.eq_ignore_ascii_case("false") {
                "false".to_string()
            } else {
                "<invalid>".to_string()
            }
        }
        ColumnType::Timestamp => parse_timestamp(raw)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "<invalid>".to_string()),
        ColumnType::Text | ColumnType::JsonObject | ColumnType::JsonArray | ColumnType::Null => raw.to_string(),
    }
}

use crate::schema_scanner::{parse_float_lenient as parse_float, parse_timestamp_lenient as parse_timestamp};

#[derive(Clone)]
struct WorkingColumn {
    source_column_index: usize,
    source_name: String,
    name: String,
    column_type: ColumnType,
}

fn fold_action_stack(
    schema: &TableSchema,
    actions: &[MorphAction],
) -> (Vec<usize>, Vec<String>, Vec<String>, Vec<ColumnType>, Vec<FilterSpec>) {
    let mut working: Vec<WorkingColumn> = schema
        .columns()
        .iter()
        .enumerate()
        .map(|(i, c)| WorkingColumn {
            source_column_index: i,
            source_name: c.name.clone(),
            name: c.name.clone(),
            column_type: c.column_type,
        })
        .collect();
    let mut name_to_index: IndexMap<String, usize> =
        working.iter().enumerate().map(|(i, c)| (c.name.clone(), i)).collect();
    let mut filter_specs = Vec::new();

    for action in actions {
        match action {
            MorphAction::Rename { old, new } => {
                if let Some(idx) = name_to_index.shift_remove(old) {
                    working[idx].name = new.clone();
                    name_to_index.insert(new.clone(), idx);
                }
            }
            MorphAction::Delete { name } => {
                name_to_index.shift_remove(name);
            }
            MorphAction::Cast { name, target_type } => {
                if let Some(&idx) = name_to_index.get(name) {
                    working[idx].column_type = *target_type;
                }
            }
            MorphAction::Filter { name, op, value } => {
                if let Some(&idx) = name_to_index.get(name) {
                    filter_specs.push(FilterSpec {
                        source_column_index: working[idx].source_column_index,
                        effective_type: working[idx].column_type,
                        op: *op,
                        value: value.clone(),
                    });
                }
            }
        }
    }

    let remaining: Vec<usize> = name_to_index.values().copied().sorted().collect();

    let source_column_indices = remaining.iter().map(|&i| working[i].source_column_index).collect();
    let source_names = remaining.iter().map(|&i| working[i].source_name.clone()).collect();
    let output_names = remaining.iter().map(|&i| working[i].name.clone()).collect();
    let output_types = remaining.iter().map(|&i| working[i].column_type).collect();

    (source_column_indices, source_names, output_names, output_types, filter_specs)
}

/// A virtual projected table: a base row source plus a resolved, folded
/// action stack. Construction is pure and does no I/O; `cell()` reads
/// through to the base source and the (optionally attached) filter row
/// indexer.
pub struct LazyTransformer<S: RawRowSource> {
    base: Arc<S>,
    source_column_indices: Vec<usize>,
    source_names: Vec<String>,
    output_names: Vec<String>,
    output_types: Vec<ColumnType>,
    filter_specs: Vec<FilterSpec>,
    filter_indexer: OnceLock<Arc<FilterRowIndexer>>,
}

impl<S: RawRowSource> LazyTransformer<S> {
    /// Folds `actions` over `base`'s schema. If the result has any filter
    /// actions, [`Self::filter_specs`] is non-empty and the caller is
    /// expected to build and later [`Self::attach_filter_indexer`] a
    /// [`FilterRowIndexer`] before rows become visible.
    pub fn new(base: Arc<S>, actions: &[MorphAction]) -> Self {
        let schema = base.schema();
        let (source_column_indices, source_names, output_names, output_types, filter_specs) =
            fold_action_stack(&schema, actions);
        Self {
            base,
            source_column_indices,
            source_names,
            output_names,
            output_types,
            filter_specs,
            filter_indexer: OnceLock::new(),
        }
    }

    pub fn filter_specs(&self) -> &[FilterSpec] {
        &self.filter_specs
    }

    pub fn needs_filter_indexer(&self) -> bool {
        !self.filter_specs.is_empty()
    }

    /// Attaches the background-built filter row indexer. A no-op after the
    /// first call (a new action stack gets a freshly constructed transformer
    /// instead of re-attaching).
    pub fn attach_filter_indexer(&self, indexer: Arc<FilterRowIndexer>) {
        let _ = self.filter_indexer.set(indexer);
    }

    fn source_row(&self, row: usize) -> Option<usize> {
        if self.filter_specs.is_empty() {
            return Some(row);
        }
        self.filter_indexer.get().and_then(|fi| fi.get_source_row(row))
    }
}

impl<S: RawRowSource> TableSource for LazyTransformer<S> {
    fn rows(&self) -> usize {
        if self.filter_specs.is_empty() {
            self.base.total_rows()
        } else {
            self.filter_indexer.get().map(|fi| fi.total_matched_rows()).unwrap_or(0)
        }
    }

    fn columns(&self) -> usize {
        self.output_names.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.output_names.clone()
    }

    fn cell(&self, row: usize, col: usize) -> DataMorphResult<String> {
        if row >= self.rows() {
            return Err(DataMorphError::OutOfRange(format!("row {row} out of range")));
        }
        if col >= self.columns() {
            return Err(DataMorphError::OutOfRange(format!("col {col} out of range")));
        }
        let Some(source_row) = self.source_row(row) else {
            return Ok(String::new());
        };
        let raw_record = self.base.get_raw_record(source_row);
        let raw = extract_cell(
            &raw_record,
            self.source_column_indices[col],
            &self.source_names[col],
            self.base.format(),
        );
        Ok(format_cell(&raw, self.output_types[col]))
    }
}
