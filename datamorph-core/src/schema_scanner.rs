//! Seeds a [`TableSchema`] from a prefix of the file, then refines it
//! record-by-record as the rest of the file is scanned in the background.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::{DataMorphError, DataMorphResult};
use crate::format::{ColumnType, SourceFormat};
use crate::indexer::{wait_for_checkpoint, RowIndexer, NOT_READY};
use crate::reader::RowReader;
use crate::scanner::split_csv_record;
use crate::schema::{ColumnSchema, TableSchema};

#[derive(Default, Clone, Copy)]
struct ColumnBuildState {
    ty: ColumnType,
}

/// Produces the per-cell `(type, observed_missing)` pair for a CSV cell,
/// trying Boolean, then WholeNumber, then FloatingPoint, then Timestamp,
/// falling back to Text.
pub fn infer_csv_cell_type(cell: &str) -> (ColumnType, bool) {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return (ColumnType::Null, true);
    }
    if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
        return (ColumnType::Boolean, false);
    }
    if trimmed.parse::<i64>().is_ok() {
        return (ColumnType::WholeNumber, false);
    }
    if parse_float_lenient(trimmed).is_some() {
        return (ColumnType::FloatingPoint, false);
    }
    if parse_timestamp_lenient(trimmed).is_some() {
        return (ColumnType::Timestamp, false);
    }
    (ColumnType::Text, false)
}

pub(crate) fn parse_float_lenient(s: &str) -> Option<f64> {
    let lower = s.to_ascii_lowercase();
    if lower == "nan" || lower == "infinity" || lower == "-infinity" || lower == "inf" || lower == "-inf" {
        return s.parse::<f64>().ok().or(match lower.as_str() {
            "nan" => Some(f64::NAN),
            "infinity" | "inf" => Some(f64::INFINITY),
            "-infinity" | "-inf" => Some(f64::NEG_INFINITY),
            _ => None,
        });
    }
    let cleaned: String = s.chars().filter(|&c| c != ',').collect();
    cleaned.parse::<f64>().ok()
}

pub(crate) fn parse_timestamp_lenient(s: &str) -> Option<chrono::NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"];
    for fmt in FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}

/// Produces the `(type, is_null)` pair for a JSON Lines value.
///
/// Relies on `serde_json`'s `arbitrary_precision` feature to tell a real
/// fractional/exponential number apart from a bare integer literal too
/// large for `i64`/`u64`: with that feature enabled, `Number` preserves its
/// original text, so a big-integer literal (no `.`/`e`/`E`) that still
/// fails both `is_i64`/`is_u64` falls back to `Text` instead of being
/// silently rounded into an `f64` and typed `FloatingPoint`.
pub fn infer_json_value_type(value: &Value) -> (ColumnType, bool) {
    match value {
        Value::Null => (ColumnType::Null, true),
        Value::Bool(_) => (ColumnType::Boolean, false),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                (ColumnType::WholeNumber, false)
            } else if n.is_f64() {
                let text = n.to_string();
                if text.contains('.') || text.contains('e') || text.contains('E') {
                    (ColumnType::FloatingPoint, false)
                } else {
                    (ColumnType::Text, false)
                }
            } else {
                (ColumnType::Text, false)
            }
        }
        Value::String(_) => (ColumnType::Text, false),
        Value::Array(_) => (ColumnType::JsonArray, false),
        Value::Object(_) => (ColumnType::JsonObject, false),
    }
}

fn read_n_skipping_malformed(
    reader: &RowReader,
    mut skip: usize,
    n: usize,
) -> DataMorphResult<Vec<bytes::Bytes>> {
    let mut out = Vec::with_capacity(n);
    while out.len() < n {
        match reader.read_records(0, skip, 1) {
            Ok(v) if v.is_empty() => break,
            Ok(mut v) => {
                out.push(v.remove(0));
                skip += 1;
            }
            Err(DataMorphError::MalformedRecord { .. }) => skip += 1,
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}

/// Runs the initial, synchronous schema scan over the first
/// `config.schema_sample_size` records.
#[instrument(skip(reader, config))]
pub fn initial_scan(reader: &RowReader, format: SourceFormat, config: &EngineConfig) -> DataMorphResult<Arc<TableSchema>> {
    match format {
        SourceFormat::Csv => initial_scan_csv(reader, config),
        _ => initial_scan_jsonlines(reader, config),
    }
}

fn initial_scan_csv(reader: &RowReader, config: &EngineConfig) -> DataMorphResult<Arc<TableSchema>> {
    let header = reader.read_records(0, 0, 1)?;
    let Some(header) = header.into_iter().next() else {
        return TableSchema::new(Vec::new()).map(Arc::new);
    };
    let names = split_csv_record(&header);
    let mut states = vec![ColumnBuildState::default(); names.len()];
    let mut nullable = vec![false; names.len()];

    let data = reader.read_records(0, 1, config.schema_sample_size)?;
    for record in &data {
        let cells = split_csv_record(record);
        for i in 0..names.len() {
            let cell = cells.get(i).map(|s| s.as_str()).unwrap_or("");
            let (ty, missing) = infer_csv_cell_type(cell);
            if missing {
                nullable[i] = true;
            } else {
                states[i].ty = states[i].ty.merge(ty);
            }
        }
    }

    let columns = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| ColumnSchema::new(name, states[i].ty, nullable[i], i))
        .collect();
    debug!(columns = ?columns, "csv initial scan complete");
    TableSchema::new(columns).map(Arc::new)
}

fn initial_scan_jsonlines(reader: &RowReader, config: &EngineConfig) -> DataMorphResult<Arc<TableSchema>> {
    let records = read_n_skipping_malformed(reader, 0, config.schema_sample_size)?;
    let mut order: indexmap::IndexMap<String, (ColumnType, bool)> = indexmap::IndexMap::new();

    for record in &records {
        let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(record) else {
            continue;
        };
        for (key, value) in map.iter() {
            let (ty, is_null) = infer_json_value_type(value);
            let entry = order.entry(key.clone()).or_insert((ColumnType::Null, false));
            if is_null {
                entry.1 = true;
            } else {
                entry.0 = entry.0.merge(ty);
            }
        }
    }

    let columns = order
        .into_iter()
        .enumerate()
        .map(|(i, (name, (ty, nullable)))| ColumnSchema::new(name, ty, nullable, i))
        .collect();
    TableSchema::new(columns).map(Arc::new)
}

/// Applies one record's observations to `schema`, returning the *same* `Arc`
/// if nothing changed (copy-on-write). Malformed JSON Lines records are
/// skipped, yielding the unchanged schema.
pub fn refine_schema(schema: &Arc<TableSchema>, record: &[u8], format: SourceFormat) -> Arc<TableSchema> {
    let mut new_columns = schema.columns().to_vec();
    let mut appended = Vec::new();
    let mut changed = false;

    match format {
        SourceFormat::Csv => {
            let cells = split_csv_record(record);
            for (i, col) in new_columns.iter_mut().enumerate() {
                let cell = cells.get(i).map(|s| s.as_str()).unwrap_or("");
                let (ty, missing) = infer_csv_cell_type(cell);
                if missing {
                    if !col.nullable {
                        col.nullable = true;
                        changed = true;
                    }
                } else {
                    let merged = col.column_type.merge(ty);
                    if merged != col.column_type {
                        col.column_type = merged;
                        changed = true;
                    }
                }
            }
        }
        SourceFormat::JsonLines => {
            let Ok(value) = serde_json::from_slice::<Value>(record) else {
                return Arc::clone(schema);
            };
            let Value::Object(map) = value else {
                return Arc::clone(schema);
            };
            for (key, value) in map.iter() {
                let (ty, is_null) = infer_json_value_type(value);
                if let Some(idx) = schema.index_of(key) {
                    let col = &mut new_columns[idx];
                    if is_null {
                        if !col.nullable {
                            col.nullable = true;
                            changed = true;
                        }
                    } else {
                        let merged = col.column_type.merge(ty);
                        if merged != col.column_type {
                            col.column_type = merged;
                            changed = true;
                        }
                    }
                } else {
                    let idx = new_columns.len() + appended.len();
                    let resolved_type = if is_null { ColumnType::Null } else { ty };
                    appended.push(ColumnSchema::new(key.clone(), resolved_type, is_null, idx));
                    changed = true;
                }
            }
        }
        _ => return Arc::clone(schema),
    }

    if !changed {
        return Arc::clone(schema);
    }
    new_columns.extend(appended);
    match TableSchema::new(new_columns) {
        Ok(schema) => Arc::new(schema),
        Err(_) => Arc::clone(schema),
    }
}

/// Reads the remainder of the file (from `start_row` on) in batches,
/// refining `initial` as it goes and publishing the latest schema after
/// every batch (plus a final publication on completion or cancellation)
/// through `publish`. Tracks a local byte cursor and advances it
/// sequentially between batches instead of re-deriving a checkpoint per
/// record, the way [`RowIndexer::build_index`] tracks its own `abs_offset`.
#[instrument(skip(initial, indexer, reader, publish, cancel))]
pub async fn run_background_scan(
    initial: Arc<TableSchema>,
    indexer: Arc<RowIndexer>,
    reader: Arc<RowReader>,
    start_row: usize,
    format: SourceFormat,
    batch_size: usize,
    cancel: CancellationToken,
    publish: watch::Sender<Arc<TableSchema>>,
) -> DataMorphResult<()> {
    let mut schema = initial;

    let (checkpoint, skip) = wait_for_checkpoint(&indexer, start_row).await;
    if checkpoint == NOT_READY {
        let _ = publish.send(schema);
        return Ok(());
    }

    let mut cursor = checkpoint.byte_offset as u64;
    let mut skip = skip;

    loop {
        if cancel.is_cancelled() {
            let _ = publish.send(schema.clone());
            return Err(DataMorphError::Cancelled);
        }
        let (records, next_offset) = reader.read_sequential(cursor, skip, batch_size)?;
        if records.is_empty() {
            break;
        }
        for record in &records {
            schema = refine_schema(&schema, record, format);
        }
        cursor = next_offset;
        skip = 0;
        tokio::task::yield_now().await;
        let _ = publish.send(schema.clone());
    }

    let _ = publish.send(schema);
    debug!("background schema scan complete");
    Ok(())
}
