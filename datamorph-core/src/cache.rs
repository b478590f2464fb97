//! A sliding window of at most `cache_size` consecutive raw records, backed
//! by a [`RowReader`]. Intended for single-threaded (UI-thread) access while
//! the underlying [`RowIndexer`] may still be growing in the background.

use std::sync::Arc;
use std::sync::Mutex;

use bytes::Bytes;
use tracing::trace;

use crate::config::EngineConfig;
use crate::indexer::{RowIndexer, NOT_READY};
use crate::reader::RowReader;

struct Window {
    start_row: usize,
    rows: Vec<Bytes>,
}

impl Window {
    fn empty() -> Self {
        Self {
            start_row: 0,
            rows: Vec::new(),
        }
    }

    fn contains(&self, row: usize) -> bool {
        row >= self.start_row && row < self.start_row + self.rows.len()
    }
}

/// Row-index-keyed cache over a dedicated [`RowReader`].
pub struct RowCache {
    indexer: Arc<RowIndexer>,
    reader: RowReader,
    cache_size: usize,
    window: Mutex<Window>,
}

impl RowCache {
    pub fn new(indexer: Arc<RowIndexer>, reader: RowReader, config: &EngineConfig) -> Self {
        Self {
            indexer,
            reader,
            cache_size: config.cache_size,
            window: Mutex::new(Window::empty()),
        }
    }

    pub fn total_rows(&self) -> usize {
        self.indexer.total_rows()
    }

    /// Returns the record at `row`, or an empty buffer if `row` is outside
    /// `[0, total_rows())`. Never panics or errors.
    pub fn get_row(&self, row: i64) -> Bytes {
        let total = self.indexer.total_rows();
        if row < 0 || row as usize >= total {
            return Bytes::new();
        }
        let row = row as usize;

        {
            let window = self.window.lock().expect("cache window lock poisoned");
            if window.contains(row) {
                return window.rows[row - window.start_row].clone();
            }
        }

        let half = self.cache_size / 2;
        let max_start = total.saturating_sub(self.cache_size);
        let start_row = (row.saturating_sub(half)).min(max_start);

        let (checkpoint, row_offset) = self.indexer.get_checkpoint(start_row);
        if checkpoint == NOT_READY {
            return Bytes::new();
        }

        let count = self.cache_size.min(total - start_row);
        let records = match self
            .reader
            .read_records(checkpoint.byte_offset as u64, row_offset, count)
        {
            Ok(records) => records,
            Err(_) => return Bytes::new(),
        };

        trace!(start_row, fetched = records.len(), "cache window refilled");

        let mut window = self.window.lock().expect("cache window lock poisoned");
        window.start_row = start_row;
        window.rows = records;
        window
            .rows
            .get(row - window.start_row)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::SourceFormat;
    use datamorph_test_utils::csv_fixture;

    fn build(rows: usize, cache_size: usize) -> RowCache {
        let file = csv_fixture(rows);
        let config = EngineConfig::default().with_cache_size(cache_size);
        let indexer = Arc::new(RowIndexer::new(file.path(), SourceFormat::Csv, &config));
        indexer.build_index().unwrap();
        let reader = RowReader::new(file.path(), SourceFormat::Csv, &config).unwrap();
        // keep the temp file alive for the cache's lifetime by leaking the handle
        std::mem::forget(file);
        RowCache::new(indexer, reader, &config)
    }

    #[test]
    fn out_of_range_is_empty_never_panics() {
        let cache = build(10, 5);
        assert_eq!(cache.get_row(-1), Bytes::new());
        assert_eq!(cache.get_row(10), Bytes::new());
        assert_eq!(cache.get_row(1_000_000), Bytes::new());
    }

    #[test]
    fn hits_return_correct_row() {
        let cache = build(10, 5);
        let row3 = cache.get_row(3);
        assert_eq!(&row3[..], b"3,user3,4.5");
    }

    #[test]
    fn window_recenters_on_miss_and_stays_bounded() {
        let cache = build(1000, 200);
        let _ = cache.get_row(5);
        let _ = cache.get_row(900);
        let row = cache.get_row(900);
        assert_eq!(&row[..], b"900,user900,1350.0");
    }
}
