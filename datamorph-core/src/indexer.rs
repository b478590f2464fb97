//! Drives a [`RecordScanner`] over an entire file, maintaining a sparse set
//! of byte-offset checkpoints and a running row count that's safe to read
//! concurrently with the scan.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{debug, instrument};

use crate::config::EngineConfig;
use crate::error::{DataMorphError, DataMorphResult};
use crate::format::SourceFormat;
use crate::scanner::{CsvScanner, JsonLinesScanner, RecordScanner};

/// A `(byte_offset, checkpoint_row_index)` pair. `byte_offset` points to the
/// first byte of data row `checkpoint_row_index`.
///
/// `byte_offset == -1` is the "not ready" sentinel returned by
/// [`RowIndexer::get_checkpoint`] before a CSV index has any checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub byte_offset: i64,
    pub checkpoint_row_index: usize,
}

/// The "not ready" sentinel for [`RowIndexer::get_checkpoint`].
pub const NOT_READY: Checkpoint = Checkpoint {
    byte_offset: -1,
    checkpoint_row_index: 0,
};

/// Builds and serves a sparse row index for one file.
pub struct RowIndexer {
    path: PathBuf,
    format: SourceFormat,
    checkpoint_interval: usize,
    read_window_bytes: usize,
    checkpoints: Mutex<Vec<Checkpoint>>,
    total_rows: AtomicUsize,
}

impl RowIndexer {
    pub fn new(path: impl Into<PathBuf>, format: SourceFormat, config: &EngineConfig) -> Self {
        let initial = match format {
            SourceFormat::Csv => Vec::new(),
            _ => vec![Checkpoint {
                byte_offset: 0,
                checkpoint_row_index: 0,
            }],
        };
        Self {
            path: path.into(),
            format,
            checkpoint_interval: config.checkpoint_interval,
            read_window_bytes: config.read_window_bytes,
            checkpoints: Mutex::new(initial),
            total_rows: AtomicUsize::new(0),
        }
    }

    /// Current row count. Safe to call concurrently with [`Self::build_index`].
    pub fn total_rows(&self) -> usize {
        self.total_rows.load(Ordering::Acquire)
    }

    /// Returns the largest checkpoint with `checkpoint_row_index <= target_row`,
    /// clamped to the last available checkpoint, plus the residual row offset.
    /// Returns [`NOT_READY`] if the checkpoint list is empty.
    pub fn get_checkpoint(&self, target_row: usize) -> (Checkpoint, usize) {
        let checkpoints = self.checkpoints.lock().expect("checkpoint lock poisoned");
        if checkpoints.is_empty() {
            return (NOT_READY, 0);
        }
        let idx = match checkpoints.binary_search_by_key(&target_row, |c| c.checkpoint_row_index) {
            Ok(i) => i,
            Err(0) => 0,
            Err(i) => i - 1,
        };
        let cp = checkpoints[idx];
        let row_offset = target_row.saturating_sub(cp.checkpoint_row_index);
        (cp, row_offset)
    }

    fn push_checkpoint(&self, cp: Checkpoint) {
        let mut checkpoints = self.checkpoints.lock().expect("checkpoint lock poisoned");
        checkpoints.push(cp);
    }

    /// Runs one streaming pass of the file. Intended to run once on a
    /// dedicated background task; safe for other threads to call
    /// [`Self::total_rows`] / [`Self::get_checkpoint`] throughout.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn build_index(&self) -> DataMorphResult<()> {
        let mut file = File::open(&self.path)?;
        let mut buf = vec![0u8; self.read_window_bytes];

        let mut header_seen = !matches!(self.format, SourceFormat::Csv);
        let mut row_count = 0usize;
        let mut abs_offset: u64 = 0;
        let mut bytes_since_last_record: u64 = 0;

        let mut scanner: Box<dyn RecordScanner> = match self.format {
            SourceFormat::Csv => Box::new(CsvScanner::new()),
            _ => Box::new(JsonLinesScanner::new()),
        };

        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let mut local_pos = 0usize;
            while local_pos < n {
                let (completed, consumed) = scanner.find_next_line_length(&buf[local_pos..n]);
                local_pos += consumed;
                if completed {
                    bytes_since_last_record = 0;
                    let abs_end = abs_offset + local_pos as u64;
                    if !header_seen {
                        header_seen = true;
                        self.push_checkpoint(Checkpoint {
                            byte_offset: abs_end as i64,
                            checkpoint_row_index: 0,
                        });
                        debug!(byte_offset = abs_end, "header observed");
                    } else {
                        row_count += 1;
                        if row_count % self.checkpoint_interval == 0 {
                            self.push_checkpoint(Checkpoint {
                                byte_offset: abs_end as i64,
                                checkpoint_row_index: row_count,
                            });
                            self.total_rows.store(row_count, Ordering::Release);
                            debug!(row_count, byte_offset = abs_end, "checkpoint");
                        }
                    }
                } else {
                    bytes_since_last_record += consumed as u64;
                }
            }
            abs_offset += n as u64;
        }

        if bytes_since_last_record > 0 {
            let count_tail = match self.format {
                SourceFormat::Csv => header_seen,
                _ => true,
            };
            if count_tail {
                row_count += 1;
                if row_count % self.checkpoint_interval == 0 {
                    self.push_checkpoint(Checkpoint {
                        byte_offset: abs_offset as i64,
                        checkpoint_row_index: row_count,
                    });
                }
            }
        }

        self.total_rows.store(row_count, Ordering::Release);
        debug!(total_rows = row_count, "build_index complete");
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }
}

/// Polls [`RowIndexer::get_checkpoint`] until it has a real checkpoint for
/// `target_row`, yielding between attempts. A background pass that starts
/// scanning right after the file is opened may race the concurrent
/// [`RowIndexer::build_index`] pass, which hasn't necessarily reached
/// `target_row` (or pushed any checkpoint at all, for CSV) yet.
///
/// Bails out to the [`NOT_READY`] sentinel after enough attempts that a
/// genuinely checkpoint-less file (e.g. completely empty) doesn't spin
/// forever.
pub(crate) async fn wait_for_checkpoint(indexer: &RowIndexer, target_row: usize) -> (Checkpoint, usize) {
    const MAX_ATTEMPTS: usize = 10_000;
    for _ in 0..MAX_ATTEMPTS {
        let result = indexer.get_checkpoint(target_row);
        if result.0 != NOT_READY {
            return result;
        }
        tokio::task::yield_now().await;
    }
    (NOT_READY, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use datamorph_test_utils::{csv_fixture, csv_with_quoting, jsonl_fixture, write_temp_file};

    fn indexer_for(path: &Path, format: SourceFormat) -> RowIndexer {
        RowIndexer::new(path, format, &EngineConfig::default())
    }

    #[test]
    fn s1_csv_indexing_literal_scenario() {
        let file = write_temp_file("col1,col2\nval1,val2\nval3,val4\n");
        let idx = indexer_for(file.path(), SourceFormat::Csv);
        idx.build_index().unwrap();
        assert_eq!(idx.total_rows(), 2);
        assert_eq!(idx.get_checkpoint(0).0, Checkpoint { byte_offset: 10, checkpoint_row_index: 0 });
        assert_eq!(idx.get_checkpoint(1), (Checkpoint { byte_offset: 10, checkpoint_row_index: 0 }, 1));
    }

    #[test]
    fn csv_checkpoints_every_interval() {
        let file = csv_fixture(2500);
        let idx = RowIndexer::new(
            file.path(),
            SourceFormat::Csv,
            &EngineConfig::default().with_checkpoint_interval(1000),
        );
        idx.build_index().unwrap();
        assert_eq!(idx.total_rows(), 2500);
        let (cp_at_1000, offset) = idx.get_checkpoint(1000);
        assert_eq!(cp_at_1000.checkpoint_row_index, 1000);
        assert_eq!(offset, 0);
        let (cp_at_2400, offset) = idx.get_checkpoint(2400);
        assert_eq!(cp_at_2400.checkpoint_row_index, 2000);
        assert_eq!(offset, 400);
    }

    #[test]
    fn get_checkpoint_before_build_is_not_ready_sentinel_for_csv() {
        let file = csv_fixture(3);
        let idx = indexer_for(file.path(), SourceFormat::Csv);
        assert_eq!(idx.get_checkpoint(0), (NOT_READY, 0));
    }

    #[test]
    fn get_checkpoint_seeded_for_jsonlines_even_before_build() {
        let file = jsonl_fixture(3);
        let idx = indexer_for(file.path(), SourceFormat::JsonLines);
        let (cp, offset) = idx.get_checkpoint(0);
        assert_eq!(cp, Checkpoint { byte_offset: 0, checkpoint_row_index: 0 });
        assert_eq!(offset, 0);
    }

    #[test]
    fn quoted_newlines_do_not_inflate_row_count() {
        let file = csv_with_quoting();
        let idx = indexer_for(file.path(), SourceFormat::Csv);
        idx.build_index().unwrap();
        assert_eq!(idx.total_rows(), 3);
    }

    #[test]
    fn trailing_record_without_terminator_is_counted() {
        let file = write_temp_file("id\n1\n2\n3");
        let idx = indexer_for(file.path(), SourceFormat::Csv);
        idx.build_index().unwrap();
        assert_eq!(idx.total_rows(), 3);
    }

    #[test]
    fn jsonlines_total_rows_matches_record_count() {
        let file = jsonl_fixture(50);
        let idx = indexer_for(file.path(), SourceFormat::JsonLines);
        idx.build_index().unwrap();
        assert_eq!(idx.total_rows(), 50);
    }
}
