//! Reads a batch of raw records starting at a given `(byte_offset, skip)`,
//! re-scanning minimally from the nearest checkpoint rather than from the
//! start of the file. [`RowReader::read_sequential`] additionally reports
//! where the scan left off, so a background pass can keep advancing through
//! a file without returning to a checkpoint between batches.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

use crate::config::EngineConfig;
use crate::error::{DataMorphError, DataMorphResult};
use crate::format::SourceFormat;
use crate::scanner::{CsvScanner, JsonLinesScanner, RecordScanner};

/// Reads raw record batches from one file. Owns its own handle, separate
/// from any other reader over the same file, so that concurrent readers
/// (display cache, schema refiner, filter indexer) don't contend on seeks.
pub struct RowReader {
    format: SourceFormat,
    read_window_bytes: usize,
    handle: Mutex<Option<File>>,
    disposed: AtomicBool,
}

impl RowReader {
    pub fn new(path: impl AsRef<Path>, format: SourceFormat, config: &EngineConfig) -> DataMorphResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self {
            format,
            read_window_bytes: config.read_window_bytes,
            handle: Mutex::new(Some(file)),
            disposed: AtomicBool::new(false),
        })
    }

    /// Releases the underlying file handle. Further calls fail with
    /// [`DataMorphError::Disposed`].
    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        *self.handle.lock().expect("reader lock poisoned") = None;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn new_scanner(&self) -> Box<dyn RecordScanner> {
        match self.format {
            SourceFormat::Csv => Box::new(CsvScanner::new()),
            _ => Box::new(JsonLinesScanner::new()),
        }
    }

    /// Reads up to `max_count` records starting after skipping `skip`
    /// completed records from `byte_offset`. Each returned record has its
    /// trailing terminator (and optional CR) stripped.
    ///
    /// Returns an empty list when `byte_offset` is at/beyond EOF, or when
    /// `skip` exhausts the file before the collect phase begins.
    pub fn read_records(&self, byte_offset: u64, skip: usize, max_count: usize) -> DataMorphResult<Vec<Bytes>> {
        self.scan_records(byte_offset, skip, max_count, true).map(|(records, _)| records)
    }

    /// Like [`Self::read_records`] but skips JSON Lines validation (callers
    /// that tolerate malformed records downstream, like the schema refiner
    /// and the filter row indexer, don't need it) and additionally returns
    /// the byte offset immediately following the last record read. Passing
    /// that offset back in as `byte_offset` on the next call (with `skip:
    /// 0`) continues the scan sequentially, without re-deriving a
    /// checkpoint and re-skipping everything already consumed in it.
    pub fn read_sequential(&self, byte_offset: u64, skip: usize, max_count: usize) -> DataMorphResult<(Vec<Bytes>, u64)> {
        self.scan_records(byte_offset, skip, max_count, false)
    }

    fn scan_records(
        &self,
        byte_offset: u64,
        skip: usize,
        max_count: usize,
        validate: bool,
    ) -> DataMorphResult<(Vec<Bytes>, u64)> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(DataMorphError::Disposed);
        }
        let mut collected = Vec::new();
        if max_count == 0 {
            return Ok((collected, byte_offset));
        }

        let mut guard = self.handle.lock().expect("reader lock poisoned");
        let file = guard.as_mut().ok_or(DataMorphError::Disposed)?;
        file.seek(SeekFrom::Start(byte_offset))?;

        let mut scanner = self.new_scanner();
        let mut buf = vec![0u8; self.read_window_bytes];
        let mut pending: Vec<u8> = Vec::new();
        let mut record_start_offset = byte_offset;
        let mut abs_offset = byte_offset;
        let mut skipped = 0usize;

        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            let mut local_pos = 0usize;
            while local_pos < n {
                let (completed, consumed) = scanner.find_next_line_length(&buf[local_pos..n]);
                pending.extend_from_slice(&buf[local_pos..local_pos + consumed]);
                local_pos += consumed;
                if completed {
                    if skipped < skip {
                        skipped += 1;
                        pending.clear();
                        record_start_offset = abs_offset + local_pos as u64;
                    } else {
                        let record = strip_terminator(&pending);
                        if validate {
                            self.validate(record, record_start_offset)?;
                        }
                        collected.push(Bytes::copy_from_slice(record));
                        pending.clear();
                        record_start_offset = abs_offset + local_pos as u64;
                        if collected.len() == max_count {
                            return Ok((collected, record_start_offset));
                        }
                    }
                }
            }
            abs_offset += n as u64;
        }

        if !pending.is_empty() {
            if skipped < skip {
                // incomplete trailing bytes don't fulfill skip; nothing to collect.
            } else {
                let record = strip_terminator(&pending);
                if validate {
                    self.validate(record, record_start_offset)?;
                }
                collected.push(Bytes::copy_from_slice(record));
                record_start_offset = abs_offset;
            }
        }

        Ok((collected, record_start_offset))
    }

    fn validate(&self, record: &[u8], record_start_offset: u64) -> DataMorphResult<()> {
        if self.format != SourceFormat::JsonLines || record.is_empty() {
            return Ok(());
        }
        if let Err(e) = serde_json::from_slice::<serde_json::Value>(record) {
            return Err(DataMorphError::MalformedRecord {
                position: record_start_offset + e.column() as u64,
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}

fn strip_terminator(raw: &[u8]) -> &[u8] {
    let mut end = raw.len();
    if end > 0 && raw[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && raw[end - 1] == b'\r' {
            end -= 1;
        }
    }
    &raw[..end]
}
